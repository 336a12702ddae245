// The cleaning report, as text and as JSON.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

use crate::clean::io_common::SurveyTable;
use crate::clean::*;

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Criteria {
    #[serde(rename = "zeroThreshold")]
    pub zero_threshold: f64,
    #[serde(rename = "truthfulnessThreshold")]
    pub truthfulness_threshold: u32,
    #[serde(rename = "consistencyThreshold")]
    pub consistency_threshold: u32,
    #[serde(rename = "controlReferenceItems")]
    pub control_reference_items: u32,
    #[serde(rename = "truthfulnessItems")]
    pub truthfulness_items: usize,
    #[serde(rename = "consistencyItems")]
    pub consistency_items: usize,
    #[serde(rename = "effectiveTruthfulnessThreshold")]
    pub effective_truthfulness_threshold: u32,
    #[serde(rename = "effectiveConsistencyThreshold")]
    pub effective_consistency_threshold: u32,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RemovedRecord {
    pub id: String,
    pub reason: String,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CountEntry {
    pub label: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AreaStats {
    pub code: String,
    pub name: String,
    /// Retained respondents with this area as dominant.
    #[serde(rename = "dominantCount")]
    pub dominant_count: usize,
    #[serde(rename = "dominantPercentage")]
    pub dominant_percentage: f64,
    #[serde(rename = "meanScore")]
    pub mean_score: f64,
    #[serde(rename = "meanPercentage")]
    pub mean_percentage: f64,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMeans {
    pub neither: f64,
    #[serde(rename = "optionA")]
    pub option_a: f64,
    #[serde(rename = "optionB")]
    pub option_b: f64,
    pub both: f64,
}

/// All the figures of the report.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CleaningSummary {
    pub dataset: String,
    #[serde(rename = "totalRecords")]
    pub total_records: usize,
    #[serde(rename = "totalItems")]
    pub total_items: u32,
    #[serde(rename = "availableItems")]
    pub available_items: usize,
    pub criteria: Criteria,
    #[serde(rename = "removedRecords")]
    pub removed_records: usize,
    #[serde(rename = "removedByZeros")]
    pub removed_by_zeros: usize,
    #[serde(rename = "removedByTruthfulness")]
    pub removed_by_truthfulness: usize,
    #[serde(rename = "removedByConsistency")]
    pub removed_by_consistency: usize,
    pub removed: Vec<RemovedRecord>,
    #[serde(rename = "retainedRecords")]
    pub retained_records: usize,
    #[serde(rename = "retentionRate")]
    pub retention_rate: f64,
    #[serde(rename = "meanCompletionRate")]
    pub mean_completion_rate: f64,
    #[serde(rename = "meanResponseTypes")]
    pub mean_response_types: ResponseMeans,
    #[serde(rename = "atypicalRecords")]
    pub atypical_records: usize,
    #[serde(rename = "genderDistribution")]
    pub gender_distribution: Vec<CountEntry>,
    #[serde(rename = "gradeDistribution")]
    pub grade_distribution: Vec<CountEntry>,
    /// In catalog order.
    pub areas: Vec<AreaStats>,
    pub warnings: Vec<String>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(count as f64 * 100.0 / total as f64)
    }
}

fn mean<I: Iterator<Item = f64>>(xs: I) -> f64 {
    let (sum, n) = xs.fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    if n == 0 {
        0.0
    } else {
        round2(sum / n as f64)
    }
}

/// Counts sorted by decreasing count. Equal counts keep the order of the keys.
fn distribution<K: Ord>(
    counts: BTreeMap<K, usize>,
    label: impl Fn(&K) -> String,
    total: usize,
) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> = counts
        .iter()
        .map(|(k, c)| CountEntry {
            label: label(k),
            count: *c,
            percentage: pct(*c, total),
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

impl CleaningSummary {
    pub fn build(
        dataset: &str,
        table: &SurveyTable,
        result: &PipelineResult,
        rules: &CleaningRules,
        catalog: &ItemCatalog,
    ) -> CleaningSummary {
        let res = &result.resolution;
        let cl = &result.classification;
        let kept = &result.retained;
        let n_kept = kept.len();
        let t_items = res.truthfulness.existing_items.len();
        let c_items = res.consistency.existing_items.len();

        let mut genders: BTreeMap<Gender, usize> = BTreeMap::new();
        let mut grades: BTreeMap<(bool, u32), usize> = BTreeMap::new();
        for e in kept.iter() {
            *genders.entry(e.gender.clone()).or_insert(0) += 1;
            // Unrecorded grades come last.
            let key = match e.grade {
                Some(g) => (false, g),
                None => (true, 0),
            };
            *grades.entry(key).or_insert(0) += 1;
        }

        let areas: Vec<AreaStats> = res
            .interest
            .iter()
            .enumerate()
            .map(|(idx, s)| {
                let area_scores: Vec<&SubscaleScore> =
                    kept.iter().filter_map(|e| e.scores.get(idx)).collect();
                let dominant_count = kept
                    .iter()
                    .filter(|e| e.dominant.as_ref().map(|d| d.code == s.code).unwrap_or(false))
                    .count();
                AreaStats {
                    code: s.code.clone(),
                    name: s.name.clone(),
                    dominant_count,
                    dominant_percentage: pct(dominant_count, n_kept),
                    mean_score: mean(area_scores.iter().map(|x| x.raw_score as f64)),
                    mean_percentage: mean(area_scores.iter().map(|x| x.percentage)),
                }
            })
            .collect();

        let mut warnings: Vec<String> = res.warnings.iter().map(|w| w.to_string()).collect();
        warnings.extend(result.domain_warnings.iter().map(|w| w.to_string()));
        warnings.extend(
            result
                .unknown_genders
                .iter()
                .map(|g| format!("unexpected gender value {:?}", g)),
        );
        warnings.extend(
            result
                .duplicate_ids
                .iter()
                .map(|id| format!("identifier {:?} appears more than once", id)),
        );

        CleaningSummary {
            dataset: dataset.to_string(),
            total_records: table.rows.len(),
            total_items: catalog.total_items,
            available_items: res.available_items.len(),
            criteria: Criteria {
                zero_threshold: rules.zero_threshold_pct,
                truthfulness_threshold: rules.truthfulness_threshold,
                consistency_threshold: rules.consistency_threshold,
                control_reference_items: rules.control_reference_items,
                truthfulness_items: t_items,
                consistency_items: c_items,
                effective_truthfulness_threshold: rules
                    .effective_threshold(rules.truthfulness_threshold, t_items as u32),
                effective_consistency_threshold: rules
                    .effective_threshold(rules.consistency_threshold, c_items as u32),
            },
            removed_records: cl.removed.len(),
            removed_by_zeros: cl.removed_by_zeros,
            removed_by_truthfulness: cl.removed_by_truthfulness,
            removed_by_consistency: cl.removed_by_consistency,
            removed: cl
                .removed
                .iter()
                .map(|r| RemovedRecord {
                    id: r.id.clone(),
                    reason: r.reason_text(),
                })
                .collect(),
            retained_records: n_kept,
            retention_rate: pct(n_kept, table.rows.len()),
            mean_completion_rate: mean(kept.iter().map(|e| e.completion_rate)),
            mean_response_types: ResponseMeans {
                neither: mean(kept.iter().map(|e| e.pct_neither)),
                option_a: mean(kept.iter().map(|e| e.pct_option_a)),
                option_b: mean(kept.iter().map(|e| e.pct_option_b)),
                both: mean(kept.iter().map(|e| e.pct_both)),
            },
            atypical_records: result.quality.iter().filter(|q| q.atypical).count(),
            gender_distribution: distribution(
                genders,
                |g| match g {
                    Gender::Unrecorded => "Unrecorded".to_string(),
                    g => g.label().to_string(),
                },
                n_kept,
            ),
            grade_distribution: distribution(
                grades,
                |(unrecorded, g)| {
                    if *unrecorded {
                        "Unrecorded".to_string()
                    } else {
                        g.to_string()
                    }
                },
                n_kept,
            ),
            areas,
            warnings,
        }
    }
}

pub fn build_summary_js(summary: &CleaningSummary) -> CleanResult<JSValue> {
    serde_json::to_value(summary).context(ParsingJsonSnafu {})
}

const RULE: &str = "----------------------------------------------------------------------";
const DOUBLE_RULE: &str = "======================================================================";

fn section(out: &mut String, title: &str) {
    out.push('\n');
    out.push_str(title);
    out.push('\n');
    out.push_str(RULE);
    out.push('\n');
}

pub fn render_report(s: &CleaningSummary) -> CleanResult<String> {
    let mut out = String::new();
    write_report(&mut out, s).context(FormattingReportSnafu {})?;
    Ok(out)
}

fn write_report(out: &mut String, s: &CleaningSummary) -> std::fmt::Result {
    writeln!(out, "{}", DOUBLE_RULE)?;
    writeln!(out, "CLEANING REPORT - {}", s.dataset)?;
    writeln!(out, "{}", DOUBLE_RULE)?;

    section(out, "1. ORIGINAL DATA");
    writeln!(out, "Total records: {}", s.total_records)?;
    writeln!(out, "Total items: {} (available: {})", s.total_items, s.available_items)?;

    let c = &s.criteria;
    section(out, "2. CLEANING CRITERIA");
    writeln!(
        out,
        "Criterion 1: more than {}% of the answers are 0 (no interest)",
        c.zero_threshold
    )?;
    writeln!(
        out,
        "Criterion 2: truthfulness below {} points \
         ({} of {} items available, adjusted threshold: {})",
        c.truthfulness_threshold,
        c.truthfulness_items,
        c.control_reference_items,
        c.effective_truthfulness_threshold
    )?;
    writeln!(
        out,
        "Criterion 3: consistency below {} points \
         ({} of {} items available, adjusted threshold: {})",
        c.consistency_threshold,
        c.consistency_items,
        c.control_reference_items,
        c.effective_consistency_threshold
    )?;

    section(out, "3. REMOVED RECORDS");
    writeln!(out, "Total removed: {}", s.removed_records)?;
    writeln!(out, "  By excess zeros: {}", s.removed_by_zeros)?;
    writeln!(out, "  By truthfulness: {}", s.removed_by_truthfulness)?;
    writeln!(out, "  By consistency: {}", s.removed_by_consistency)?;
    if !s.removed.is_empty() {
        writeln!(out, "\nRemoved records:")?;
        for r in s.removed.iter() {
            writeln!(out, "  - ID {}: {}", r.id, r.reason)?;
        }
    }

    section(out, "4. CLEAN DATA");
    writeln!(out, "Total records: {}", s.retained_records)?;
    writeln!(out, "Retention rate: {:.2}%", s.retention_rate)?;

    let m = &s.mean_response_types;
    section(out, "5. DESCRIPTIVE STATISTICS (CLEAN DATA)");
    writeln!(out, "Mean completion rate: {:.2}%", s.mean_completion_rate)?;
    writeln!(out, "Mean 'neither' answers (0): {:.2}%", m.neither)?;
    writeln!(out, "Mean 'first activity' answers (1): {:.2}%", m.option_a)?;
    writeln!(out, "Mean 'second activity' answers (2): {:.2}%", m.option_b)?;
    writeln!(out, "Mean 'both' answers (3): {:.2}%", m.both)?;
    writeln!(out, "Atypical pattern, only 0 and 3 (all records): {}", s.atypical_records)?;

    section(out, "6. GENDER DISTRIBUTION");
    for e in s.gender_distribution.iter() {
        writeln!(out, "{}: {} ({:.2}%)", e.label, e.count, e.percentage)?;
    }

    section(out, "7. GRADE DISTRIBUTION");
    for e in s.grade_distribution.iter() {
        writeln!(out, "Grade {}: {} ({:.2}%)", e.label, e.count, e.percentage)?;
    }

    section(out, "8. MOST FREQUENT DOMINANT AREAS");
    let mut popular: Vec<&AreaStats> = s.areas.iter().filter(|a| a.dominant_count > 0).collect();
    popular.sort_by(|a, b| b.dominant_count.cmp(&a.dominant_count));
    for a in popular.iter() {
        writeln!(
            out,
            "{}: {} respondents ({:.2}%)",
            a.name, a.dominant_count, a.dominant_percentage
        )?;
    }

    section(out, "9. MEAN SCORE PER AREA");
    for a in s.areas.iter() {
        writeln!(out, "{:<35} {:>6.2} points ({:>6.2}%)", a.name, a.mean_score, a.mean_percentage)?;
    }

    if !s.warnings.is_empty() {
        section(out, "10. WARNINGS");
        for w in s.warnings.iter() {
            writeln!(out, "  - {}", w)?;
        }
    }
    writeln!(out, "\n{}", DOUBLE_RULE)?;
    Ok(())
}
