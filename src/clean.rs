pub mod config_reader;
mod export;
mod io_common;
mod io_csv;
mod io_excel;
mod report;

use log::{debug, info, warn};

use casm_scoring::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use text_diff::print_diff;

use crate::clean::config_reader::*;
use crate::clean::io_common::{build_respondents, ColumnLayout, SurveyTable};

#[derive(Debug, Snafu)]
pub enum CleanError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("The workbook {path} has no worksheet"))]
    EmptyExcel { path: String },
    #[snafu(display("Worksheet {name} not found in {path}"))]
    MissingWorksheet { name: String, path: String },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("The table {path} has no header row"))]
    EmptyTable { path: String },
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Required column {column:?} is missing from the input"))]
    MissingColumn { column: String },
    #[snafu(display("Error writing {path}"))]
    WritingCsv { source: csv::Error, path: String },
    #[snafu(display("Error writing {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The summary differs from the reference summary {path}"))]
    ReferenceMismatch { path: String },
    #[snafu(display("Invalid configuration: {message}"))]
    InvalidConfig { message: String },
    #[snafu(display("Error formatting the report"))]
    FormattingReport { source: std::fmt::Error },
    #[snafu(display("Pipeline error: {source}"))]
    Pipeline { source: PipelineErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type CleanResult<T> = Result<T, CleanError>;

/// The files written by a run, and the headline figures.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct CleanOutcome {
    pub retained: usize,
    pub removed: usize,
    pub clean_path: PathBuf,
    pub removed_path: PathBuf,
    pub report_path: PathBuf,
    pub summary_path: PathBuf,
}

fn read_table(path: &str, source: &FileSource) -> CleanResult<SurveyTable> {
    info!("Attempting to read survey file {:?}", path);
    if !Path::new(path).is_file() {
        whatever!("Input file {} not found", path)
    }
    let table = match source.provider()? {
        InputProvider::Xlsx => {
            io_excel::read_excel_table(path, source.excel_worksheet_name.as_deref())?
        }
        InputProvider::Csv => io_csv::read_csv_table(path)?,
    };
    info!(
        "Loaded {} records with {} columns from {}",
        table.rows.len(),
        table.header.len(),
        io_common::simplify_file_name(path)
    );
    Ok(table)
}

/// Loads the configuration, if any, and applies the command line values on top of it.
///
/// Paths of the file are relative to its directory, command line paths to the working
/// directory.
pub fn load_config(
    config_path: Option<&str>,
    overrides: &ConfigOverrides,
) -> CleanResult<CleanConfig> {
    let mut config = match config_path {
        Some(p) => {
            let mut config = read_config(p)?;
            if let Some(root) = Path::new(p).parent() {
                config.resolve_paths(root);
            }
            config
        }
        None => CleanConfig::default(),
    };
    config.apply_overrides(overrides);
    if config.source.file_path.is_empty() {
        return InvalidConfigSnafu {
            message: "no input file, use --input or source.filePath".to_string(),
        }
        .fail();
    }
    info!("config: {:?}", config);
    Ok(config)
}

fn write_text(path: &Path, contents: &str) -> CleanResult<()> {
    fs::write(path, contents).context(WritingFileSnafu {
        path: path.display().to_string(),
    })
}

/// Runs the cleaning from start to end.
///
/// Arguments:
/// * `config_path` the JSON configuration, if any
/// * `overrides` the values given on the command line
/// * `check_summary_path` a reference summary. The run fails if the computed summary differs.
/// * `print_summary` also prints the summary to the standard output
pub fn run_cleaning(
    config_path: Option<&str>,
    overrides: &ConfigOverrides,
    check_summary_path: Option<&str>,
    print_summary: bool,
) -> CleanResult<CleanOutcome> {
    let config = load_config(config_path, overrides)?;

    let catalog = config.catalog();
    catalog.validate().context(PipelineSnafu {})?;
    let rules = config.rules.to_rules()?;

    let input_p = PathBuf::from(config.source.file_path.as_str());
    let input_path = input_p.display().to_string();
    let table = read_table(input_path.as_str(), &config.source)?;

    // A missing identifier or demographic column stops the run.
    let layout = ColumnLayout::locate(&table, &config.source)?;
    let resolution = resolve(&table.header, &catalog);
    let respondents = build_respondents(&table, &layout, &resolution, &catalog);
    debug!("respondents: {:?}", respondents.len());

    let result = run_pipeline(&respondents, &resolution, &rules).context(PipelineSnafu {})?;

    let out_dir: PathBuf = match config.output_settings.output_directory.as_ref() {
        Some(d) => PathBuf::from(d),
        None => input_p
            .parent()
            .map(|x| x.to_path_buf())
            .unwrap_or_default(),
    };
    if !out_dir.as_os_str().is_empty() {
        fs::create_dir_all(&out_dir).context(WritingFileSnafu {
            path: out_dir.display().to_string(),
        })?;
    }
    let name = config.dataset_name();

    let clean_path = out_dir.join(format!("{}_clean.csv", name));
    let clean_table = export::retained_table(&table, &result, &catalog);
    io_csv::write_csv_table(&clean_path, &clean_table.table.header, &clean_table.table.rows)?;

    let removed_path = out_dir.join(format!("{}_removed.csv", name));
    let removed_table = export::removed_table(&table, &result);
    io_csv::write_csv_table(
        &removed_path,
        &removed_table.table.header,
        &removed_table.table.rows,
    )?;

    let mut summary = report::CleaningSummary::build(&name, &table, &result, &rules, &catalog);
    summary.warnings.extend(clean_table.renamed);
    summary.warnings.extend(removed_table.renamed);

    let report_path = out_dir.join(format!("{}_report.txt", name));
    let report_text = report::render_report(&summary)?;
    write_text(&report_path, report_text.as_str())?;

    let summary_js = report::build_summary_js(&summary)?;
    let pretty_js_stats =
        serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {})?;
    let summary_path = out_dir.join(format!("{}_summary.json", name));
    write_text(&summary_path, pretty_js_stats.as_str())?;
    if print_summary {
        println!("{}", pretty_js_stats);
    }
    info!(
        "Outputs written to {:?}: {} retained, {} removed",
        out_dir.display().to_string(),
        result.retained.len(),
        result.classification.removed.len()
    );

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats.as_ref(),
                "\n",
            );
            return ReferenceMismatchSnafu { path: summary_p }.fail();
        }
    }

    Ok(CleanOutcome {
        retained: result.retained.len(),
        removed: result.classification.removed.len(),
        clean_path,
        removed_path,
        report_path,
        summary_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // One line per respondent: ID, gender, grade, then the 143 items.
    fn write_survey(dir: &Path, rows: &[(&str, &str, &str, Vec<u32>)]) -> PathBuf {
        let mut s = String::from("ID,Genero,Grado,Colegio");
        for i in 1..=143 {
            write!(s, ",Pregunta_{}", i).unwrap();
        }
        s.push('\n');
        for (id, gender, grade, answers) in rows.iter() {
            write!(s, "{},{},{},Norte", id, gender, grade).unwrap();
            for a in answers.iter() {
                write!(s, ",{}", a).unwrap();
            }
            s.push('\n');
        }
        let p = dir.join("CASM83.csv");
        fs::write(&p, s).unwrap();
        p
    }

    fn engaged() -> Vec<u32> {
        (0..143).map(|i| 1 + (i % 3)).collect()
    }

    fn overrides_for(input: &Path) -> ConfigOverrides {
        ConfigOverrides {
            input: Some(input.display().to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn end_to_end_csv() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = write_survey(
            dir.path(),
            &[
                ("1", "0", "3", engaged()),
                ("2", "1", "4", vec![0; 143]),
                ("3", "1", "5", engaged()),
            ],
        );
        let out = run_cleaning(None, &overrides_for(&input), None, false).unwrap();
        assert_eq!(out.retained, 2);
        assert_eq!(out.removed, 1);

        let clean = fs::read_to_string(&out.clean_path).unwrap();
        let mut lines = clean.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("ID,Genero,Grado,Colegio,Pregunta_1,"));
        assert!(header.contains(",score_CCFM,pct_CCFM,"));
        assert!(header.ends_with(",dominant_area,dominant_score,dominant_area_name,dominant_tied"));
        assert!(lines.next().unwrap().starts_with("1,0,3,Norte,"));
        assert!(lines.next().unwrap().starts_with("3,1,5,Norte,"));
        assert!(lines.next().is_none());

        let removed = fs::read_to_string(&out.removed_path).unwrap();
        assert!(removed.lines().next().unwrap().ends_with(",removal_reason"));
        let reason = "Excess zeros (100.0%) | Low truthfulness (0/11) | Low consistency (0/11)";
        assert!(removed.contains(reason));

        let report = fs::read_to_string(&out.report_path).unwrap();
        assert!(report.contains("Total removed: 1"));
        assert!(report.contains("Retention rate: 66.67%"));

        let summary = read_summary(out.summary_path.to_str().unwrap()).unwrap();
        assert_eq!(summary["totalRecords"], 3);
        assert_eq!(summary["retainedRecords"], 2);
    }

    #[test]
    fn reference_summary_is_checked() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let input = write_survey(dir.path(), &[("1", "0", "3", engaged())]);
        let overrides = overrides_for(&input);
        let first = run_cleaning(None, &overrides, None, false).unwrap();
        let ref_dir = tempfile::tempdir().unwrap();
        let reference = ref_dir.path().join("reference.json");
        fs::copy(&first.summary_path, &reference).unwrap();
        let reference = reference.display().to_string();
        // The same input gives the same summary.
        assert!(run_cleaning(None, &overrides, Some(reference.as_str()), false).is_ok());

        let stricter = ConfigOverrides {
            zero_threshold: Some(10.0),
            ..overrides
        };
        let res = run_cleaning(None, &stricter, Some(reference.as_str()), false);
        assert!(matches!(res, Err(CleanError::ReferenceMismatch { .. })));
    }

    #[test]
    fn missing_required_column_is_fatal() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("survey.csv");
        fs::write(&p, "ID,Grado,Pregunta_1\n1,3,2\n").unwrap();
        let res = run_cleaning(None, &overrides_for(&p), None, false);
        match res {
            Err(CleanError::MissingColumn { column }) => assert_eq!(column, "Genero"),
            x => panic!("unexpected result {:?}", x),
        }
    }

    #[test]
    fn config_file_drives_the_run() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        write_survey(dir.path(), &[("7", "0", "2", engaged())]);
        let config_p = dir.path().join("config.json");
        fs::write(
            &config_p,
            r#"{
              "outputSettings": { "datasetName": "wave1", "outputDirectory": "out" },
              "source": { "filePath": "CASM83.csv" },
              "rules": { "truthfulnessThreshold": 4 }
            }"#,
        )
        .unwrap();
        let out = run_cleaning(
            Some(config_p.to_str().unwrap()),
            &ConfigOverrides::default(),
            None,
            false,
        )
        .unwrap();
        assert_eq!(out.clean_path, dir.path().join("out").join("wave1_clean.csv"));
        assert!(out.report_path.exists());
        let summary = read_summary(out.summary_path.to_str().unwrap()).unwrap();
        assert_eq!(summary["criteria"]["truthfulnessThreshold"], 4);
    }

    #[test]
    fn command_line_paths_ignore_the_config_directory() {
        let dir = tempfile::tempdir().unwrap();
        let conf_dir = dir.path().join("conf");
        fs::create_dir(&conf_dir).unwrap();
        let config_p = conf_dir.join("config.json");
        fs::write(
            &config_p,
            r#"{
              "outputSettings": { "outputDirectory": "res" },
              "source": { "filePath": "CASM83.csv" }
            }"#,
        )
        .unwrap();
        let config_path = config_p.to_str().unwrap();

        let config = load_config(Some(config_path), &ConfigOverrides::default()).unwrap();
        let expected_input = conf_dir.join("CASM83.csv").display().to_string();
        let expected_out = conf_dir.join("res").display().to_string();
        assert_eq!(config.source.file_path, expected_input);
        assert_eq!(config.output_settings.output_directory, Some(expected_out));

        let overrides = ConfigOverrides {
            input: Some("data.csv".to_string()),
            out: Some("out".to_string()),
            ..ConfigOverrides::default()
        };
        let config = load_config(Some(config_path), &overrides).unwrap();
        assert_eq!(config.source.file_path, "data.csv");
        assert_eq!(config.output_settings.output_directory, Some("out".to_string()));
        assert_eq!(config.dataset_name(), "data");
    }

    #[test]
    fn nonexistent_input() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("absent.xlsx");
        let res = run_cleaning(None, &overrides_for(&p), None, false);
        assert!(matches!(res, Err(CleanError::Whatever { .. })));
    }

    #[test]
    fn no_input_is_a_config_error() {
        let res = load_config(None, &ConfigOverrides::default());
        assert!(matches!(res, Err(CleanError::InvalidConfig { .. })));
    }
}
