use std::collections::BTreeMap;
use std::path::Path;

use crate::clean::*;

/// The raw content of an input table, rendered as text.
/// Every row has as many cells as the header.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct SurveyTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl SurveyTable {
    /// Builds a table, padding the short rows with empty cells.
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> SurveyTable {
        let width = header.len();
        let rows = rows
            .into_iter()
            .map(|mut r| {
                if r.len() > width {
                    warn!(
                        "row with {} cells for {} columns, extra cells dropped",
                        r.len(),
                        width
                    );
                }
                r.resize(width, String::new());
                r
            })
            .collect();
        SurveyTable { header, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.trim() == name)
    }
}

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// The positions of the identifier and demographic columns.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct ColumnLayout {
    pub id: usize,
    pub gender: usize,
    pub grade: usize,
}

impl ColumnLayout {
    pub fn locate(table: &SurveyTable, source: &FileSource) -> CleanResult<ColumnLayout> {
        let find = |name: &str| {
            table
                .column_index(name)
                .context(MissingColumnSnafu { column: name })
        };
        Ok(ColumnLayout {
            id: find(source.id_column())?,
            gender: find(source.gender_column())?,
            grade: find(source.grade_column())?,
        })
    }
}

/// Turns the rows of the table into respondents. Only the available items are read.
pub fn build_respondents(
    table: &SurveyTable,
    layout: &ColumnLayout,
    resolution: &SchemaResolution,
    catalog: &ItemCatalog,
) -> Vec<Respondent> {
    // The first column wins if an item appears twice.
    let mut item_columns: BTreeMap<u32, usize> = BTreeMap::new();
    for (idx, h) in table.header.iter().enumerate() {
        if let Some(item) = catalog.item_from_column(h) {
            if resolution.available_items.binary_search(&item).is_ok() {
                if item_columns.contains_key(&item) {
                    warn!("item {} appears in several columns, using the first one", item);
                } else {
                    item_columns.insert(item, idx);
                }
            }
        }
    }

    table
        .rows
        .iter()
        .map(|row| {
            let grade_cell = row[layout.grade].as_str();
            let grade = parse_grade(grade_cell);
            if grade.is_none() && !grade_cell.trim().is_empty() && grade_cell.trim() != "0" {
                debug!("unreadable grade {:?}, treated as not recorded", grade_cell);
            }
            Respondent {
                id: row[layout.id].trim().to_string(),
                gender: Gender::parse(row[layout.gender].as_str()),
                grade,
                responses: item_columns
                    .iter()
                    .map(|(item, idx)| (*item, Response::parse(row[*idx].as_str())))
                    .collect(),
            }
        })
        .collect()
}
