mod args;
mod clean;

use clap::Parser;
use log::{info, warn};
use snafu::ErrorCompat;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let res = clean::run_cleaning(
        args.config.as_deref(),
        &args.overrides(),
        args.reference.as_deref(),
        args.print_summary,
    );

    match res {
        Ok(outcome) => {
            info!(
                "Done: {} retained, {} removed. Outputs: {:?}, {:?}, {:?}, {:?}",
                outcome.retained,
                outcome.removed,
                outcome.clean_path,
                outcome.removed_path,
                outcome.report_path,
                outcome.summary_path
            );
        }
        Err(e) => {
            warn!("Error occured {:?}", e);
            eprintln!("An error occured {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("trace: {}", bt);
            }
            std::process::exit(1);
        }
    }
}
