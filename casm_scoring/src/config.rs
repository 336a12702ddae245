// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;

/// The answer given to one item of the questionnaire.
///
/// Every item presents two activities. The respondent may mark one of them,
/// both of them or neither of them.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Response {
    /// No value recorded for this item.
    Missing,
    /// Code 0: neither activity is of interest.
    Neither,
    /// Code 1: the first activity.
    OptionA,
    /// Code 2: the second activity.
    OptionB,
    /// Code 3: both activities.
    Both,
    /// A recorded value outside of {0, 1, 2, 3}.
    /// The raw content is kept so that it can be reported.
    OutOfRange(String),
}

static MISSING_RESPONSE: Response = Response::Missing;

impl Response {
    /// Interprets a numeric cell.
    pub fn from_code(code: f64) -> Response {
        if code.is_nan() {
            return Response::Missing;
        }
        match code {
            x if x == 0.0 => Response::Neither,
            x if x == 1.0 => Response::OptionA,
            x if x == 2.0 => Response::OptionB,
            x if x == 3.0 => Response::Both,
            x => Response::OutOfRange(x.to_string()),
        }
    }

    /// Interprets the textual content of a cell.
    ///
    /// Empty cells and the usual spreadsheet markers for missing values (`nan`, `NA`)
    /// are treated as missing.
    pub fn parse(raw: &str) -> Response {
        let s = raw.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("na") {
            return Response::Missing;
        }
        // Out-of-range values keep the text of the cell.
        match s.parse::<f64>().map(Response::from_code) {
            Ok(Response::OutOfRange(_)) | Err(_) => Response::OutOfRange(s.to_string()),
            Ok(r) => r,
        }
    }

    /// The code in {0, 1, 2, 3}, if the response is in the valid domain.
    pub fn code(&self) -> Option<u32> {
        match self {
            Response::Neither => Some(0),
            Response::OptionA => Some(1),
            Response::OptionB => Some(2),
            Response::Both => Some(3),
            Response::Missing | Response::OutOfRange(_) => None,
        }
    }

    /// The contribution of this response to a subscale score.
    ///
    /// Missing values, 0 and out-of-range values all contribute nothing.
    pub fn score(&self) -> u32 {
        match self {
            Response::OptionA => 1,
            Response::OptionB => 2,
            Response::Both => 3,
            _ => 0,
        }
    }

    /// An explicit 0 is an answer (absence of interest), not an absence of data.
    pub fn is_answered(&self) -> bool {
        !matches!(self, Response::Missing)
    }
}

/// The gender of a respondent, recorded either as a binary code (0, 1) or as a label.
#[derive(Eq, PartialEq, Debug, Clone, Hash, PartialOrd, Ord)]
pub enum Gender {
    Female,
    Male,
    Unrecorded,
    /// A value that is neither one of the codes nor a known label.
    Other(String),
}

impl Gender {
    pub fn parse(raw: &str) -> Gender {
        let s = raw.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("nan") {
            return Gender::Unrecorded;
        }
        if let Ok(x) = s.parse::<f64>() {
            if x == 0.0 {
                return Gender::Female;
            } else if x == 1.0 {
                return Gender::Male;
            }
        }
        match s.to_lowercase().as_str() {
            "f" | "femenino" | "female" | "mujer" => Gender::Female,
            "m" | "masculino" | "male" | "hombre" => Gender::Male,
            _ => Gender::Other(s.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Gender::Female => "Femenino",
            Gender::Male => "Masculino",
            Gender::Unrecorded => "",
            Gender::Other(s) => s.as_str(),
        }
    }
}

/// Reads a grade cell. Zero, empty and unreadable values mean that the grade was not recorded.
pub fn parse_grade(raw: &str) -> Option<u32> {
    match raw.trim().parse::<f64>() {
        Ok(x) if x >= 1.0 && x.fract() == 0.0 => Some(x as u32),
        _ => None,
    }
}

/// One participant of the survey.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Respondent {
    pub id: String,
    pub gender: Gender,
    pub grade: Option<u32>,
    /// Responses keyed by item number. Items not present are missing.
    pub responses: BTreeMap<u32, Response>,
}

impl Respondent {
    pub fn response(&self, item: u32) -> &Response {
        self.responses.get(&item).unwrap_or(&MISSING_RESPONSE)
    }
}

// ******** Output data structures *********

/// A subscale of the catalog, restricted to the items found in the input.
#[derive(PartialEq, Debug, Clone)]
pub struct ResolvedSubscale {
    pub code: String,
    pub name: String,
    pub expected: usize,
    pub existing_items: Vec<u32>,
}

impl ResolvedSubscale {
    pub fn coverage_ratio(&self) -> f64 {
        if self.expected == 0 {
            0.0
        } else {
            self.existing_items.len() as f64 / self.expected as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.existing_items.len() == self.expected
    }
}

/// Conditions found while matching the input columns against the catalog.
/// None of them stops the pipeline.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CoverageWarning {
    /// Some of the items of a subscale are absent.
    Partial {
        code: String,
        existing: usize,
        expected: usize,
    },
    /// No item of this interest subscale is present. It is not scored.
    Excluded { code: String },
    /// No item of this control subscale is present. Every respondent fails it.
    ControlUnavailable { code: String },
    /// A column that looks like an item but is not part of the catalog. It is ignored.
    UncataloguedColumn { column: String },
    /// Fewer items than the full instrument.
    IncompleteInstrument { available: usize, expected: u32 },
}

impl Display for CoverageWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoverageWarning::Partial {
                code,
                existing,
                expected,
            } => write!(
                f,
                "subscale {}: {}/{} items available ({:.0}%)",
                code,
                existing,
                expected,
                (*existing as f64) * 100.0 / (*expected as f64)
            ),
            CoverageWarning::Excluded { code } => {
                write!(f, "subscale {}: no item available, excluded from scoring", code)
            }
            CoverageWarning::ControlUnavailable { code } => write!(
                f,
                "control subscale {}: no item available, every respondent fails it",
                code
            ),
            CoverageWarning::UncataloguedColumn { column } => {
                write!(f, "column {} is not an item of the catalog, ignored", column)
            }
            CoverageWarning::IncompleteInstrument {
                available,
                expected,
            } => write!(
                f,
                "the instrument has {} items but only {} are available, \
                 scores use the available items",
                expected, available
            ),
        }
    }
}

/// The result of matching the input columns against the catalog.
#[derive(PartialEq, Debug, Clone)]
pub struct SchemaResolution {
    /// The interest subscales with at least one item, in catalog order.
    pub interest: Vec<ResolvedSubscale>,
    /// The codes of the interest subscales without any item.
    pub excluded: Vec<String>,
    pub truthfulness: ResolvedSubscale,
    pub consistency: ResolvedSubscale,
    /// All the catalogued items found in the input, sorted.
    pub available_items: Vec<u32>,
    pub warnings: Vec<CoverageWarning>,
}

impl SchemaResolution {
    /// The coverage ratio of every subscale (interest subscales first, then controls).
    pub fn coverage(&self) -> Vec<(String, f64)> {
        self.interest
            .iter()
            .chain([&self.truthfulness, &self.consistency])
            .map(|s| (s.code.clone(), s.coverage_ratio()))
            .collect()
    }
}

/// Counts of each kind of response over the available items of one respondent.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct ResponseTally {
    pub available: u32,
    pub neither: u32,
    pub option_a: u32,
    pub option_b: u32,
    pub both: u32,
    pub missing: u32,
    pub out_of_range: u32,
}

impl ResponseTally {
    pub fn answered(&self) -> u32 {
        self.available - self.missing
    }

    /// Percentage of the available items. Zero when no item is available.
    pub fn percentage(&self, count: u32) -> f64 {
        if self.available == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.available as f64
        }
    }

    pub fn completion_rate(&self) -> f64 {
        self.percentage(self.answered())
    }
}

/// The outcome of one control subscale for one respondent.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct ControlCheck {
    pub score: u32,
    pub available_items: u32,
    /// The threshold after the proportional adjustment.
    pub threshold: u32,
    pub valid: bool,
}

#[derive(PartialEq, Debug, Clone)]
pub struct QualityScore {
    pub tally: ResponseTally,
    /// Percentage of 0 responses, not rounded.
    pub zero_pct: f64,
    pub completion_rate: f64,
    pub truthfulness: ControlCheck,
    pub consistency: ControlCheck,
    /// Every answered item is a 0 or a 3.
    pub atypical: bool,
}

/// A criterion that caused the removal of a respondent, with its measured value.
#[derive(PartialEq, Debug, Clone)]
pub enum RemovalReason {
    ExcessZeros(f64),
    LowTruthfulness { score: u32, items: u32 },
    LowConsistency { score: u32, items: u32 },
}

impl Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::ExcessZeros(pct) => write!(f, "Excess zeros ({:.1}%)", pct),
            RemovalReason::LowTruthfulness { score, items } => {
                write!(f, "Low truthfulness ({}/{})", score, items)
            }
            RemovalReason::LowConsistency { score, items } => {
                write!(f, "Low consistency ({}/{})", score, items)
            }
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Removal {
    /// Position of the respondent in the input.
    pub index: usize,
    pub id: String,
    /// Never empty.
    pub reasons: Vec<RemovalReason>,
}

impl Removal {
    pub fn reason_text(&self) -> String {
        self.reasons
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<String>>()
            .join(" | ")
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct Classification {
    /// Positions of the retained respondents, in input order.
    pub retained: Vec<usize>,
    /// Removed respondents, in input order.
    pub removed: Vec<Removal>,
    // Per criterion. A respondent may be counted under several criteria.
    pub removed_by_zeros: usize,
    pub removed_by_truthfulness: usize,
    pub removed_by_consistency: usize,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SubscaleScore {
    pub code: String,
    pub raw_score: u32,
    pub max_possible: u32,
    pub percentage: f64,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Dominant {
    pub code: String,
    pub name: String,
    pub raw_score: u32,
    /// All the codes sharing the maximum score, in catalog order, when there is more than one.
    pub tied: Vec<String>,
}

/// A retained respondent with all the derived statistics.
#[derive(PartialEq, Debug, Clone)]
pub struct EnrichedRespondent {
    pub index: usize,
    pub id: String,
    pub gender: Gender,
    pub grade: Option<u32>,
    pub tally: ResponseTally,
    pub pct_neither: f64,
    pub pct_option_a: f64,
    pub pct_option_b: f64,
    pub pct_both: f64,
    pub completion_rate: f64,
    /// One entry per resolved interest subscale, in catalog order.
    pub scores: Vec<SubscaleScore>,
    pub dominant: Option<Dominant>,
}

/// Item values outside of the response domain.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ValueDomainWarning {
    pub item: u32,
    /// Distinct raw values, sorted.
    pub values: Vec<String>,
}

impl Display for ValueDomainWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "item {}: values outside of [0, 1, 2, 3]: {}",
            self.item,
            self.values.join(", ")
        )
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct PipelineResult {
    pub resolution: SchemaResolution,
    /// One entry per input respondent.
    pub quality: Vec<QualityScore>,
    pub classification: Classification,
    pub retained: Vec<EnrichedRespondent>,
    pub domain_warnings: Vec<ValueDomainWarning>,
    /// Distinct gender values that are neither a code nor a known label.
    pub unknown_genders: Vec<String>,
    /// Identifiers that appear more than once.
    pub duplicate_ids: Vec<String>,
}

/// Errors that prevent the pipeline from running.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum PipelineErrors {
    EmptyCatalog,
    EmptySubscaleCode,
    DuplicateSubscale(String),
    OverlappingItem(u32),
    ItemOutOfRange(u32),
    InvalidRules(String),
    UnknownItem { respondent: String, item: u32 },
}

impl Error for PipelineErrors {}

impl Display for PipelineErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineErrors::EmptyCatalog => write!(f, "the catalog has no interest subscale"),
            PipelineErrors::EmptySubscaleCode => write!(f, "a subscale of the catalog has no code"),
            PipelineErrors::DuplicateSubscale(code) => {
                write!(f, "subscale {} is defined more than once", code)
            }
            PipelineErrors::OverlappingItem(item) => {
                write!(f, "item {} belongs to more than one subscale", item)
            }
            PipelineErrors::ItemOutOfRange(item) => {
                write!(f, "item {} is outside of the instrument", item)
            }
            PipelineErrors::InvalidRules(msg) => write!(f, "invalid cleaning rules: {}", msg),
            PipelineErrors::UnknownItem { respondent, item } => write!(
                f,
                "respondent {}: item {} is not available in this dataset",
                respondent, item
            ),
        }
    }
}

// ********* Configuration **********

/// A named group of items.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Subscale {
    pub code: String,
    pub name: String,
    pub items: Vec<u32>,
}

impl Subscale {
    pub fn new(code: &str, name: &str, items: &[u32]) -> Subscale {
        Subscale {
            code: code.to_string(),
            name: name.to_string(),
            items: items.to_vec(),
        }
    }
}

/// The mapping from subscales to items, and the naming convention of the item columns.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ItemCatalog {
    /// Item columns are named with this prefix followed by the item number.
    pub item_prefix: String,
    pub total_items: u32,
    /// The vocational interest subscales, in the order used to break ties.
    pub interest: Vec<Subscale>,
    pub truthfulness: Subscale,
    pub consistency: Subscale,
}

// The areas of the CASM-83 R2014, in the order of the answer sheet.
const CASM83_AREAS: [(&str, &str); 13] = [
    ("CCFM", "Ciencias Físico-Matemáticas"),
    ("CCSS", "Ciencias Sociales"),
    ("CCNA", "Ciencias Naturales"),
    ("CCCO", "Ciencias de la Comunicación"),
    ("ARTE", "Artes"),
    ("BURO", "Burocracia/Administrativo"),
    ("CCEP", "Ciencias Económico-Políticas"),
    ("HAA", "Humanidades y Arquitectura"),
    ("FINA", "Finanzas"),
    ("LING", "Lingüística"),
    ("JURI", "Jurídico"),
    ("VERA", "Veracidad"),
    ("CONS", "Consistencia"),
];

impl ItemCatalog {
    /// The CASM-83 R2014: 143 items, 11 per subscale.
    /// The items of a subscale are spaced by 13 on the answer sheet.
    pub fn casm83() -> ItemCatalog {
        let mut subscales: Vec<Subscale> = CASM83_AREAS
            .iter()
            .enumerate()
            .map(|(pos, (code, name))| {
                let items: Vec<u32> = (0..11).map(|j| pos as u32 + 1 + 13 * j).collect();
                Subscale::new(code, name, &items)
            })
            .collect();
        let consistency = subscales.remove(12);
        let truthfulness = subscales.remove(11);
        ItemCatalog {
            item_prefix: "Pregunta_".to_string(),
            total_items: 143,
            interest: subscales,
            truthfulness,
            consistency,
        }
    }

    pub fn item_column(&self, item: u32) -> String {
        format!("{}{}", self.item_prefix, item)
    }

    /// The item number of a column that follows the naming convention.
    pub fn item_from_column(&self, column: &str) -> Option<u32> {
        column
            .trim()
            .strip_prefix(self.item_prefix.as_str())
            .and_then(|s| s.parse::<u32>().ok())
    }

    pub fn all_subscales(&self) -> impl Iterator<Item = &Subscale> {
        self.interest
            .iter()
            .chain([&self.truthfulness, &self.consistency])
    }

    pub fn subscale_name(&self, code: &str) -> Option<&str> {
        self.all_subscales()
            .find(|s| s.code == code)
            .map(|s| s.name.as_str())
    }

    pub fn validate(&self) -> Result<(), PipelineErrors> {
        if self.interest.is_empty() {
            return Err(PipelineErrors::EmptyCatalog);
        }
        let mut codes: Vec<&str> = Vec::new();
        let mut items: Vec<u32> = Vec::new();
        for s in self.all_subscales() {
            if s.code.trim().is_empty() {
                return Err(PipelineErrors::EmptySubscaleCode);
            }
            if codes.contains(&s.code.as_str()) {
                return Err(PipelineErrors::DuplicateSubscale(s.code.clone()));
            }
            codes.push(s.code.as_str());
            for &item in s.items.iter() {
                if item == 0 || item > self.total_items {
                    return Err(PipelineErrors::ItemOutOfRange(item));
                }
                if items.contains(&item) {
                    return Err(PipelineErrors::OverlappingItem(item));
                }
                items.push(item);
            }
        }
        Ok(())
    }
}

/// The thresholds of the cleaning step.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct CleaningRules {
    /// A respondent is removed if strictly more than this percentage of the answers are 0.
    pub zero_threshold_pct: f64,
    /// Minimum truthfulness score, for the full control subscale.
    pub truthfulness_threshold: u32,
    /// Minimum consistency score, for the full control subscale.
    pub consistency_threshold: u32,
    /// The number of items the base thresholds are defined for.
    pub control_reference_items: u32,
}

impl CleaningRules {
    pub const DEFAULT_RULES: CleaningRules = CleaningRules {
        zero_threshold_pct: 70.0,
        truthfulness_threshold: 5,
        consistency_threshold: 5,
        control_reference_items: 11,
    };

    /// Scales a base threshold to the number of available items, rounding down.
    pub fn effective_threshold(&self, base: u32, available_items: u32) -> u32 {
        let scaled =
            base as u64 * available_items as u64 / self.control_reference_items.max(1) as u64;
        u32::try_from(scaled).unwrap_or(u32::MAX)
    }

    pub fn validate(&self) -> Result<(), PipelineErrors> {
        if !(0.0..=100.0).contains(&self.zero_threshold_pct) {
            return Err(PipelineErrors::InvalidRules(format!(
                "zero threshold must be a percentage, got {}",
                self.zero_threshold_pct
            )));
        }
        if self.control_reference_items == 0 {
            return Err(PipelineErrors::InvalidRules(
                "the control reference item count must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
