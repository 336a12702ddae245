use crate::clean::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSettings {
    #[serde(rename = "datasetName")]
    pub dataset_name: Option<String>,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileSource {
    pub provider: Option<String>,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    #[serde(rename = "idColumn")]
    pub id_column: Option<String>,
    #[serde(rename = "genderColumn")]
    pub gender_column: Option<String>,
    #[serde(rename = "gradeColumn")]
    pub grade_column: Option<String>,
    #[serde(rename = "itemPrefix")]
    pub item_prefix: Option<String>,
}

/// The supported input formats.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum InputProvider {
    Xlsx,
    Csv,
}

impl FileSource {
    /// The provider, either given explicitly or guessed from the file extension.
    pub fn provider(&self) -> CleanResult<InputProvider> {
        let p = match self.provider.as_deref() {
            Some(p) => p.to_lowercase(),
            None => Path::new(self.file_path.as_str())
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default(),
        };
        match p.as_str() {
            "xlsx" | "excel" => Ok(InputProvider::Xlsx),
            "csv" => Ok(InputProvider::Csv),
            x => InvalidConfigSnafu {
                message: format!("unknown input provider {:?}", x),
            }
            .fail(),
        }
    }

    pub fn id_column(&self) -> &str {
        self.id_column.as_deref().unwrap_or("ID")
    }

    pub fn gender_column(&self) -> &str {
        self.gender_column.as_deref().unwrap_or("Genero")
    }

    pub fn grade_column(&self) -> &str {
        self.grade_column.as_deref().unwrap_or("Grado")
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulesConfig {
    #[serde(rename = "zeroThreshold")]
    pub zero_threshold: Option<f64>,
    #[serde(rename = "truthfulnessThreshold")]
    pub truthfulness_threshold: Option<u32>,
    #[serde(rename = "consistencyThreshold")]
    pub consistency_threshold: Option<u32>,
    #[serde(rename = "controlReferenceItems")]
    pub control_reference_items: Option<u32>,
}

impl RulesConfig {
    /// Fills the gaps with the defaults and checks the values.
    pub fn to_rules(&self) -> CleanResult<CleaningRules> {
        let d = CleaningRules::DEFAULT_RULES;
        let rules = CleaningRules {
            zero_threshold_pct: self.zero_threshold.unwrap_or(d.zero_threshold_pct),
            truthfulness_threshold: self
                .truthfulness_threshold
                .unwrap_or(d.truthfulness_threshold),
            consistency_threshold: self
                .consistency_threshold
                .unwrap_or(d.consistency_threshold),
            control_reference_items: self
                .control_reference_items
                .unwrap_or(d.control_reference_items),
        };
        if let Err(e) = rules.validate() {
            return InvalidConfigSnafu {
                message: e.to_string(),
            }
            .fail();
        }
        Ok(rules)
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct CleanConfig {
    #[serde(rename = "outputSettings", default)]
    pub output_settings: OutputSettings,
    #[serde(default)]
    pub source: FileSource,
    #[serde(default)]
    pub rules: RulesConfig,
}

impl CleanConfig {
    /// The canonical catalog, with the item prefix of the source.
    pub fn catalog(&self) -> ItemCatalog {
        let mut catalog = ItemCatalog::casm83();
        if let Some(prefix) = self.source.item_prefix.as_ref() {
            catalog.item_prefix = prefix.clone();
        }
        catalog
    }

    /// The name used for the output files. Defaults to the stem of the input file.
    pub fn dataset_name(&self) -> String {
        self.output_settings.dataset_name.clone().unwrap_or_else(|| {
            Path::new(self.source.file_path.as_str())
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("survey")
                .to_string()
        })
    }

    /// Makes the relative paths of the file relative to `root`, the directory of the file.
    pub fn resolve_paths(&mut self, root: &Path) {
        if !self.source.file_path.is_empty() {
            self.source.file_path = root
                .join(self.source.file_path.as_str())
                .display()
                .to_string();
        }
        if let Some(d) = self.output_settings.output_directory.as_mut() {
            *d = root.join(d.as_str()).display().to_string();
        }
    }

    pub fn apply_overrides(&mut self, o: &ConfigOverrides) {
        let src = &mut self.source;
        if let Some(x) = o.input.as_ref() {
            src.file_path = x.clone();
        }
        if let Some(x) = o.input_type.as_ref() {
            src.provider = Some(x.clone());
        }
        if let Some(x) = o.excel_worksheet_name.as_ref() {
            src.excel_worksheet_name = Some(x.clone());
        }
        if let Some(x) = o.id_column.as_ref() {
            src.id_column = Some(x.clone());
        }
        if let Some(x) = o.gender_column.as_ref() {
            src.gender_column = Some(x.clone());
        }
        if let Some(x) = o.grade_column.as_ref() {
            src.grade_column = Some(x.clone());
        }
        if let Some(x) = o.item_prefix.as_ref() {
            src.item_prefix = Some(x.clone());
        }
        if let Some(x) = o.out.as_ref() {
            self.output_settings.output_directory = Some(x.clone());
        }
        if let Some(x) = o.dataset_name.as_ref() {
            self.output_settings.dataset_name = Some(x.clone());
        }
        if let Some(x) = o.zero_threshold {
            self.rules.zero_threshold = Some(x);
        }
        if let Some(x) = o.truthfulness_threshold {
            self.rules.truthfulness_threshold = Some(x);
        }
        if let Some(x) = o.consistency_threshold {
            self.rules.consistency_threshold = Some(x);
        }
    }
}

/// Values passed on the command line. They take precedence over the configuration file.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub input: Option<String>,
    pub input_type: Option<String>,
    pub excel_worksheet_name: Option<String>,
    pub id_column: Option<String>,
    pub gender_column: Option<String>,
    pub grade_column: Option<String>,
    pub item_prefix: Option<String>,
    pub out: Option<String>,
    pub dataset_name: Option<String>,
    pub zero_threshold: Option<f64>,
    pub truthfulness_threshold: Option<u32>,
    pub consistency_threshold: Option<u32>,
}

pub fn read_config(path: &str) -> CleanResult<CleanConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: CleanConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> CleanResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}
