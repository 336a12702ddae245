// Assembly of the output tables: the input columns followed by the derived columns.

use std::collections::HashSet;

use crate::clean::io_common::SurveyTable;
use crate::clean::*;

/// An output table, and the derived columns that had to be renamed.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ExportedTable {
    pub table: SurveyTable,
    pub renamed: Vec<String>,
}

/// Names the derived columns. A name already taken by an input column gets a suffix.
struct ColumnNamer {
    taken: HashSet<String>,
    renamed: Vec<String>,
}

impl ColumnNamer {
    fn new(header: &[String]) -> ColumnNamer {
        ColumnNamer {
            taken: header.iter().cloned().collect(),
            renamed: Vec::new(),
        }
    }

    fn name(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        while self.taken.contains(&name) {
            name = format!("{}_recomputed", name);
        }
        if name != base {
            let msg = format!("column {} already exists in the input, written as {}", base, name);
            warn!("{}", msg);
            self.renamed.push(msg);
        }
        self.taken.insert(name.clone());
        name
    }
}

fn tally_cells(t: &ResponseTally) -> [String; 4] {
    [
        t.neither.to_string(),
        t.option_a.to_string(),
        t.option_b.to_string(),
        t.both.to_string(),
    ]
}

fn fmt_num(x: f64) -> String {
    x.to_string()
}

/// The retained respondents, in input order, with their statistics and scores.
pub fn retained_table(
    table: &SurveyTable,
    result: &PipelineResult,
    catalog: &ItemCatalog,
) -> ExportedTable {
    let mut namer = ColumnNamer::new(&table.header);
    let mut derived: Vec<String> = [
        "total_neither",
        "total_option_a",
        "total_option_b",
        "total_both",
        "pct_neither",
        "pct_option_a",
        "pct_option_b",
        "pct_both",
        "answered_items",
        "completion_rate",
        "gender_label",
    ]
    .iter()
    .map(|n| namer.name(n))
    .collect();
    for s in result.resolution.interest.iter() {
        derived.push(namer.name(format!("score_{}", s.code).as_str()));
        derived.push(namer.name(format!("pct_{}", s.code).as_str()));
    }
    for n in ["dominant_area", "dominant_score", "dominant_area_name", "dominant_tied"] {
        derived.push(namer.name(n));
    }

    let header: Vec<String> = table.header.iter().cloned().chain(derived).collect();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for e in result.retained.iter() {
        let mut row = match table.rows.get(e.index) {
            Some(r) => r.clone(),
            None => {
                warn!("retained_table: no row at position {}", e.index);
                continue;
            }
        };
        let t = e.tally;
        row.extend(tally_cells(&t));
        row.extend([
            fmt_num(e.pct_neither),
            fmt_num(e.pct_option_a),
            fmt_num(e.pct_option_b),
            fmt_num(e.pct_both),
            t.answered().to_string(),
            fmt_num(e.completion_rate),
            e.gender.label().to_string(),
        ]);
        for s in e.scores.iter() {
            row.push(s.raw_score.to_string());
            row.push(fmt_num(s.percentage));
        }
        match e.dominant.as_ref() {
            Some(d) => row.extend([
                d.code.clone(),
                d.raw_score.to_string(),
                catalog
                    .subscale_name(d.code.as_str())
                    .unwrap_or(d.name.as_str())
                    .to_string(),
                d.tied.join(";"),
            ]),
            None => row.extend(vec![String::new(); 4]),
        }
        rows.push(row);
    }
    ExportedTable {
        table: SurveyTable { header, rows },
        renamed: namer.renamed,
    }
}

/// The removed respondents, in input order, with their response counts and the reasons
/// of the removal.
pub fn removed_table(table: &SurveyTable, result: &PipelineResult) -> ExportedTable {
    let mut namer = ColumnNamer::new(&table.header);
    let mut header = table.header.clone();
    for n in [
        "total_neither",
        "total_option_a",
        "total_option_b",
        "total_both",
        "removal_reason",
    ] {
        header.push(namer.name(n));
    }
    let rows: Vec<Vec<String>> = result
        .classification
        .removed
        .iter()
        .filter_map(|r| {
            let row = table.rows.get(r.index)?;
            let q = result.quality.get(r.index)?;
            let mut row = row.clone();
            row.extend(tally_cells(&q.tally));
            row.push(r.reason_text());
            Some(row)
        })
        .collect();
    ExportedTable {
        table: SurveyTable { header, rows },
        renamed: namer.renamed,
    }
}
