use clap::Parser;

use crate::clean::config_reader::ConfigOverrides;

/// This is a cleaning and scoring program for the CASM-83 vocational interest questionnaire.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file describing the dataset and the cleaning rules.
    /// See the manual of the casm_scoring crate for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference summary in JSON format. If provided, casmclean will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (directory) Where the outputs are written. Defaults to the directory of the input.
    /// Setting this option overrides the directory that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) The survey data. Setting this option overrides what may be specified
    /// with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (xlsx or csv) The type of the input. Guessed from the file extension by default.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// When using an Excel file, the name of the worksheet to use. Defaults to the first one.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// (default ID) The column with the identifier of the respondent.
    #[clap(long, value_parser)]
    pub id_column: Option<String>,

    /// (default Genero) The column with the gender of the respondent.
    #[clap(long, value_parser)]
    pub gender_column: Option<String>,

    /// (default Grado) The column with the school grade of the respondent.
    #[clap(long, value_parser)]
    pub grade_column: Option<String>,

    /// (default Pregunta_) The prefix of the item columns.
    #[clap(long, value_parser)]
    pub item_prefix: Option<String>,

    /// The name used for the output files. Defaults to the name of the input file.
    #[clap(long, value_parser)]
    pub dataset_name: Option<String>,

    /// (default 70) Removes respondents with strictly more than this percentage of 0 answers.
    #[clap(long, value_parser)]
    pub zero_threshold: Option<f64>,

    /// (default 5) Minimum truthfulness score, for the 11 items of the subscale.
    #[clap(long, value_parser)]
    pub truthfulness_threshold: Option<u32>,

    /// (default 5) Minimum consistency score, for the 11 items of the subscale.
    #[clap(long, value_parser)]
    pub consistency_threshold: Option<u32>,

    /// If passed as an argument, the summary is also printed in JSON format to the standard output.
    #[clap(long, takes_value = false)]
    pub print_summary: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            input: self.input.clone(),
            input_type: self.input_type.clone(),
            excel_worksheet_name: self.excel_worksheet_name.clone(),
            id_column: self.id_column.clone(),
            gender_column: self.gender_column.clone(),
            grade_column: self.grade_column.clone(),
            item_prefix: self.item_prefix.clone(),
            out: self.out.clone(),
            dataset_name: self.dataset_name.clone(),
            zero_threshold: self.zero_threshold,
            truthfulness_threshold: self.truthfulness_threshold,
            consistency_threshold: self.consistency_threshold,
        }
    }
}
