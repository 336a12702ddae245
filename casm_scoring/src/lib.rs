mod config;
pub mod builder;
pub mod manual;

use log::{debug, info, warn};

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub use crate::config::*;

/// Matches the columns of the input against the catalog.
///
/// Interest subscales without any item are excluded from the scoring. Control subscales
/// are always kept, even when none of their items is present.
pub fn resolve(available_columns: &[String], catalog: &ItemCatalog) -> SchemaResolution {
    let present: HashSet<u32> = available_columns
        .iter()
        .filter_map(|c| catalog.item_from_column(c))
        .collect();
    let catalogued: HashSet<u32> = catalog
        .all_subscales()
        .flat_map(|s| s.items.iter().cloned())
        .collect();

    let mut warnings: Vec<CoverageWarning> = Vec::new();

    for column in available_columns.iter() {
        if let Some(item) = catalog.item_from_column(column) {
            if !catalogued.contains(&item) {
                warnings.push(CoverageWarning::UncataloguedColumn {
                    column: column.clone(),
                });
            }
        }
    }

    let restrict = |s: &Subscale| ResolvedSubscale {
        code: s.code.clone(),
        name: s.name.clone(),
        expected: s.items.len(),
        existing_items: s
            .items
            .iter()
            .filter(|item| present.contains(*item))
            .cloned()
            .collect(),
    };

    let mut interest: Vec<ResolvedSubscale> = Vec::new();
    let mut excluded: Vec<String> = Vec::new();
    for s in catalog.interest.iter() {
        let rs = restrict(s);
        if rs.existing_items.is_empty() {
            warnings.push(CoverageWarning::Excluded {
                code: rs.code.clone(),
            });
            excluded.push(rs.code);
        } else {
            if !rs.is_complete() {
                warnings.push(CoverageWarning::Partial {
                    code: rs.code.clone(),
                    existing: rs.existing_items.len(),
                    expected: rs.expected,
                });
            }
            interest.push(rs);
        }
    }

    let truthfulness = restrict(&catalog.truthfulness);
    let consistency = restrict(&catalog.consistency);
    for rs in [&truthfulness, &consistency] {
        if rs.expected > 0 && rs.existing_items.is_empty() {
            warnings.push(CoverageWarning::ControlUnavailable {
                code: rs.code.clone(),
            });
        } else if !rs.is_complete() {
            warnings.push(CoverageWarning::Partial {
                code: rs.code.clone(),
                existing: rs.existing_items.len(),
                expected: rs.expected,
            });
        }
    }

    let mut available_items: Vec<u32> = present.intersection(&catalogued).cloned().collect();
    available_items.sort_unstable();
    if (available_items.len() as u32) < catalog.total_items {
        warnings.push(CoverageWarning::IncompleteInstrument {
            available: available_items.len(),
            expected: catalog.total_items,
        });
    }

    for w in warnings.iter() {
        warn!("resolve: {}", w);
    }
    debug!(
        "resolve: {} items available, interest subscales: {:?}, excluded: {:?}",
        available_items.len(),
        interest.iter().map(|s| s.code.clone()).collect::<Vec<String>>(),
        excluded
    );

    SchemaResolution {
        interest,
        excluded,
        truthfulness,
        consistency,
        available_items,
        warnings,
    }
}

/// The sum of the scores of the given items.
fn subscale_score(respondent: &Respondent, items: &[u32]) -> u32 {
    items
        .iter()
        .map(|item| respondent.response(*item).score())
        .sum()
}

fn tally_responses(respondent: &Respondent, items: &[u32]) -> ResponseTally {
    items.iter().fold(
        ResponseTally {
            available: items.len() as u32,
            ..ResponseTally::default()
        },
        |mut t, item| {
            match respondent.response(*item) {
                Response::Missing => t.missing += 1,
                Response::Neither => t.neither += 1,
                Response::OptionA => t.option_a += 1,
                Response::OptionB => t.option_b += 1,
                Response::Both => t.both += 1,
                Response::OutOfRange(_) => t.out_of_range += 1,
            }
            t
        },
    )
}

fn check_control(
    respondent: &Respondent,
    subscale: &ResolvedSubscale,
    base_threshold: u32,
    rules: &CleaningRules,
) -> ControlCheck {
    let available_items = subscale.existing_items.len() as u32;
    let score = subscale_score(respondent, &subscale.existing_items);
    let threshold = rules.effective_threshold(base_threshold, available_items);
    // A catalog without items for this control has nothing to check.
    // A control whose items are all absent from the input fails, whatever the threshold.
    let valid = if subscale.expected == 0 {
        true
    } else if available_items == 0 {
        false
    } else {
        score >= threshold
    };
    ControlCheck {
        score,
        available_items,
        threshold,
        valid,
    }
}

fn is_atypical(respondent: &Respondent, items: &[u32]) -> bool {
    let mut answered = items
        .iter()
        .map(|item| respondent.response(*item))
        .filter(|r| r.is_answered())
        .peekable();
    if answered.peek().is_none() {
        return false;
    }
    answered.all(|r| matches!(r, Response::Neither | Response::Both))
}

/// Completion statistics and control scores for one respondent.
pub fn evaluate_respondent(
    respondent: &Respondent,
    resolution: &SchemaResolution,
    rules: &CleaningRules,
) -> QualityScore {
    let tally = tally_responses(respondent, &resolution.available_items);
    let qs = QualityScore {
        tally,
        zero_pct: tally.percentage(tally.neither),
        completion_rate: tally.completion_rate(),
        truthfulness: check_control(
            respondent,
            &resolution.truthfulness,
            rules.truthfulness_threshold,
            rules,
        ),
        consistency: check_control(
            respondent,
            &resolution.consistency,
            rules.consistency_threshold,
            rules,
        ),
        atypical: is_atypical(respondent, &resolution.available_items),
    };
    debug!("evaluate_respondent: {}: {:?}", respondent.id, qs);
    qs
}

/// Runs the quality evaluation on every respondent. The output is in input order.
pub fn evaluate_quality(
    respondents: &[Respondent],
    resolution: &SchemaResolution,
    rules: &CleaningRules,
) -> Vec<QualityScore> {
    let res: Vec<QualityScore> = respondents
        .iter()
        .map(|r| evaluate_respondent(r, resolution, rules))
        .collect();
    let (t, c) = (&resolution.truthfulness, &resolution.consistency);
    if !t.is_complete() || !c.is_complete() {
        let (t_items, c_items) = (t.existing_items.len() as u32, c.existing_items.len() as u32);
        info!(
            "evaluate_quality: thresholds adjusted to the available items: \
             truthfulness {} ({} items), consistency {} ({} items)",
            rules.effective_threshold(rules.truthfulness_threshold, t_items),
            t_items,
            rules.effective_threshold(rules.consistency_threshold, c_items),
            c_items
        );
    }
    res
}

/// The criteria that fire for one respondent, in a fixed order.
pub fn removal_reasons(quality: &QualityScore, rules: &CleaningRules) -> Vec<RemovalReason> {
    let mut reasons: Vec<RemovalReason> = Vec::new();
    if quality.zero_pct > rules.zero_threshold_pct {
        reasons.push(RemovalReason::ExcessZeros(quality.zero_pct));
    }
    if !quality.truthfulness.valid {
        reasons.push(RemovalReason::LowTruthfulness {
            score: quality.truthfulness.score,
            items: quality.truthfulness.available_items,
        });
    }
    if !quality.consistency.valid {
        reasons.push(RemovalReason::LowConsistency {
            score: quality.consistency.score,
            items: quality.consistency.available_items,
        });
    }
    reasons
}

/// Splits the respondents between retained and removed.
///
/// A respondent is removed as soon as one criterion fires, and is removed only once.
pub fn classify(
    respondents: &[Respondent],
    quality: &[QualityScore],
    rules: &CleaningRules,
) -> Classification {
    let mut res = Classification::default();
    for (index, (r, q)) in respondents.iter().zip(quality.iter()).enumerate() {
        let reasons = removal_reasons(q, rules);
        if reasons.is_empty() {
            res.retained.push(index);
            continue;
        }
        for reason in reasons.iter() {
            match reason {
                RemovalReason::ExcessZeros(_) => res.removed_by_zeros += 1,
                RemovalReason::LowTruthfulness { .. } => res.removed_by_truthfulness += 1,
                RemovalReason::LowConsistency { .. } => res.removed_by_consistency += 1,
            }
        }
        let removal = Removal {
            index,
            id: r.id.clone(),
            reasons,
        };
        debug!("classify: {} | {}", removal.id, removal.reason_text());
        res.removed.push(removal);
    }
    info!(
        "classify: {} retained, {} removed (zeros: {}, truthfulness: {}, consistency: {})",
        res.retained.len(),
        res.removed.len(),
        res.removed_by_zeros,
        res.removed_by_truthfulness,
        res.removed_by_consistency
    );
    res
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Score of one resolved interest subscale.
pub fn score_subscale(respondent: &Respondent, subscale: &ResolvedSubscale) -> SubscaleScore {
    let raw_score = subscale_score(respondent, &subscale.existing_items);
    let max_possible = subscale.existing_items.len() as u32 * 3;
    let percentage = if max_possible == 0 {
        0.0
    } else {
        round2(raw_score as f64 * 100.0 / max_possible as f64)
    };
    SubscaleScore {
        code: subscale.code.clone(),
        raw_score,
        max_possible,
        percentage,
    }
}

/// The subscale with the highest raw score. Ties go to the first subscale in catalog order,
/// and all the tied subscales are listed.
pub fn find_dominant(scores: &[SubscaleScore], subscales: &[ResolvedSubscale]) -> Option<Dominant> {
    let max_score = scores.iter().map(|s| s.raw_score).max()?;
    let tied: Vec<&SubscaleScore> = scores.iter().filter(|s| s.raw_score == max_score).collect();
    let first = tied.first()?;
    let name = subscales
        .iter()
        .find(|s| s.code == first.code)
        .map(|s| s.name.clone())
        .unwrap_or_default();
    Some(Dominant {
        code: first.code.clone(),
        name,
        raw_score: max_score,
        tied: if tied.len() > 1 {
            tied.iter().map(|s| s.code.clone()).collect()
        } else {
            vec![]
        },
    })
}

/// Computes the interest scores and the summary statistics of the retained respondents.
///
/// The tally and the completion rate come from the quality evaluation.
pub fn enrich(
    respondents: &[Respondent],
    classification: &Classification,
    resolution: &SchemaResolution,
    quality: &[QualityScore],
) -> Vec<EnrichedRespondent> {
    let mut res: Vec<EnrichedRespondent> = Vec::new();
    for &index in classification.retained.iter() {
        let (r, q) = match (respondents.get(index), quality.get(index)) {
            (Some(r), Some(q)) => (r, q),
            _ => {
                warn!("enrich: no respondent at position {}, skipping", index);
                continue;
            }
        };
        let scores: Vec<SubscaleScore> = resolution
            .interest
            .iter()
            .map(|s| score_subscale(r, s))
            .collect();
        let dominant = find_dominant(&scores, &resolution.interest);
        if let Some(d) = dominant.as_ref() {
            if !d.tied.is_empty() {
                debug!(
                    "enrich: {}: tie between {:?}, picking {}",
                    r.id, d.tied, d.code
                );
            }
        }
        let t = q.tally;
        res.push(EnrichedRespondent {
            index,
            id: r.id.clone(),
            gender: r.gender.clone(),
            grade: r.grade,
            tally: t,
            pct_neither: round2(t.percentage(t.neither)),
            pct_option_a: round2(t.percentage(t.option_a)),
            pct_option_b: round2(t.percentage(t.option_b)),
            pct_both: round2(t.percentage(t.both)),
            completion_rate: round2(q.completion_rate),
            scores,
            dominant,
        });
    }
    res
}

/// Lists, for every item, the values outside of the response domain.
pub fn scan_value_domain(
    respondents: &[Respondent],
    resolution: &SchemaResolution,
) -> Vec<ValueDomainWarning> {
    let mut found: BTreeMap<u32, BTreeSet<String>> = BTreeMap::new();
    for r in respondents.iter() {
        for item in resolution.available_items.iter() {
            if let Response::OutOfRange(raw) = r.response(*item) {
                found.entry(*item).or_default().insert(raw.clone());
            }
        }
    }
    let res: Vec<ValueDomainWarning> = found
        .into_iter()
        .map(|(item, values)| ValueDomainWarning {
            item,
            values: values.into_iter().collect(),
        })
        .collect();
    for w in res.iter() {
        warn!("scan_value_domain: {}", w);
    }
    res
}

/// The distinct gender values that are neither a code nor a known label.
pub fn scan_gender_domain(respondents: &[Respondent]) -> Vec<String> {
    let labels: BTreeSet<String> = respondents
        .iter()
        .filter_map(|r| match &r.gender {
            Gender::Other(s) => Some(s.clone()),
            _ => None,
        })
        .collect();
    for l in labels.iter() {
        warn!("scan_gender_domain: unexpected gender value {:?}", l);
    }
    labels.into_iter().collect()
}

fn find_duplicate_ids(respondents: &[Respondent]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut res: Vec<String> = Vec::new();
    for r in respondents.iter() {
        let c = counts.entry(r.id.as_str()).or_insert(0);
        *c += 1;
        if *c == 2 {
            warn!("duplicate respondent identifier {:?}, rows are kept by position", r.id);
            res.push(r.id.clone());
        }
    }
    res
}

/// Runs the whole cleaning pipeline: quality evaluation, filtering and enrichment.
///
/// Arguments:
/// * `respondents` the rows of the input, in order. They are not modified.
/// * `resolution` the output of [resolve] for the columns of the input
/// * `rules` the thresholds to apply
pub fn run_pipeline(
    respondents: &[Respondent],
    resolution: &SchemaResolution,
    rules: &CleaningRules,
) -> Result<PipelineResult, PipelineErrors> {
    rules.validate()?;
    info!(
        "Processing {:?} respondents, {:?} items, rules: {:?}",
        respondents.len(),
        resolution.available_items.len(),
        rules
    );

    let domain_warnings = scan_value_domain(respondents, resolution);
    let unknown_genders = scan_gender_domain(respondents);
    let duplicate_ids = find_duplicate_ids(respondents);

    let quality = evaluate_quality(respondents, resolution, rules);
    info!("run_pipeline: quality scored");

    let classification = classify(respondents, &quality, rules);
    info!("run_pipeline: validated and filtered");

    let retained = enrich(respondents, &classification, resolution, &quality);
    info!("run_pipeline: enriched {} respondents", retained.len());

    Ok(PipelineResult {
        resolution: resolution.clone(),
        quality,
        classification,
        retained,
        domain_warnings,
        unknown_genders,
        duplicate_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn columns(prefix: &str, items: &[u32]) -> Vec<String> {
        items.iter().map(|i| format!("{}{}", prefix, i)).collect()
    }

    // A = [1, 2], B = [3, 4], truthfulness V = [5, 6], no consistency items.
    fn small_catalog() -> ItemCatalog {
        ItemCatalog {
            item_prefix: "P".to_string(),
            total_items: 6,
            interest: vec![
                Subscale::new("A", "Area A", &[1, 2]),
                Subscale::new("B", "Area B", &[3, 4]),
            ],
            truthfulness: Subscale::new("V", "Truthfulness", &[5, 6]),
            consistency: Subscale::new("C", "Consistency", &[]),
        }
    }

    fn small_rules() -> CleaningRules {
        CleaningRules {
            zero_threshold_pct: 70.0,
            truthfulness_threshold: 1,
            consistency_threshold: 1,
            control_reference_items: 11,
        }
    }

    fn respondent(id: &str, codes: &[(u32, u32)]) -> Respondent {
        Respondent {
            id: id.to_string(),
            gender: Gender::Female,
            grade: Some(3),
            responses: codes
                .iter()
                .map(|(item, code)| (*item, Response::from_code(*code as f64)))
                .collect(),
        }
    }

    fn casm_respondent(id: &str, f: impl Fn(u32) -> Response) -> Respondent {
        Respondent {
            id: id.to_string(),
            gender: Gender::Male,
            grade: None,
            responses: (1..=143).map(|i| (i, f(i))).collect(),
        }
    }

    #[test]
    fn casm83_catalog_is_valid() {
        let c = ItemCatalog::casm83();
        assert_eq!(c.validate(), Ok(()));
        assert_eq!(c.interest.len(), 11);
        assert_eq!(c.interest[0].items, vec![1, 14, 27, 40, 53, 66, 79, 92, 105, 118, 131]);
        assert_eq!(c.interest[10].code, "JURI");
        assert_eq!(c.truthfulness.items[10], 142);
        assert_eq!(c.consistency.items[0], 13);
        let mut all: Vec<u32> = c.all_subscales().flat_map(|s| s.items.clone()).collect();
        all.sort_unstable();
        assert_eq!(all, (1..=143).collect::<Vec<u32>>());
    }

    #[test]
    fn catalog_rejects_overlap() {
        let mut c = small_catalog();
        c.interest[1].items.push(2);
        assert_eq!(c.validate(), Err(PipelineErrors::OverlappingItem(2)));
        let mut c = small_catalog();
        c.consistency.code = " ".to_string();
        assert_eq!(c.validate(), Err(PipelineErrors::EmptySubscaleCode));
        let mut c = small_catalog();
        c.interest[1].code = "A".to_string();
        assert_eq!(c.validate(), Err(PipelineErrors::DuplicateSubscale("A".to_string())));
    }

    #[test]
    fn response_parsing() {
        assert_eq!(Response::parse(""), Response::Missing);
        assert_eq!(Response::parse(" nan "), Response::Missing);
        assert_eq!(Response::parse("0"), Response::Neither);
        assert_eq!(Response::parse("2.0"), Response::OptionB);
        assert_eq!(Response::parse("5"), Response::OutOfRange("5".to_string()));
        assert_eq!(Response::parse("x"), Response::OutOfRange("x".to_string()));
        assert_eq!(Response::from_code(1.5), Response::OutOfRange("1.5".to_string()));
        assert_eq!(Response::from_code(f64::NAN), Response::Missing);
        assert_eq!(Response::parse("1e300"), Response::OutOfRange("1e300".to_string()));
        assert_eq!(Response::parse(" 7.0 "), Response::OutOfRange("7.0".to_string()));
        assert_eq!(Response::parse("-0"), Response::Neither);
        assert_eq!(Response::from_code(-1.0), Response::OutOfRange("-1".to_string()));
    }

    #[test]
    fn gender_and_grade_parsing() {
        assert_eq!(Gender::parse("0"), Gender::Female);
        assert_eq!(Gender::parse("1.0"), Gender::Male);
        assert_eq!(Gender::parse("Masculino"), Gender::Male);
        assert_eq!(Gender::parse(""), Gender::Unrecorded);
        assert_eq!(Gender::parse("2"), Gender::Other("2".to_string()));
        assert_eq!(parse_grade("4"), Some(4));
        assert_eq!(parse_grade("0"), None);
        assert_eq!(parse_grade(""), None);
    }

    #[test]
    fn resolve_partial_instrument() {
        let catalog = ItemCatalog::casm83();
        // Only the first 26 items: 2 items per subscale.
        let mut header = vec!["ID".to_string(), "Genero".to_string()];
        header.extend(columns("Pregunta_", &(1..=26).collect::<Vec<u32>>()));
        let res = resolve(&header, &catalog);
        assert_eq!(res.interest.len(), 11);
        assert_eq!(res.available_items.len(), 26);
        assert_eq!(res.interest[0].existing_items, vec![1, 14]);
        assert!((res.interest[0].coverage_ratio() - 2.0 / 11.0).abs() < 1e-12);
        assert_eq!(res.truthfulness.existing_items, vec![12, 25]);
        assert!(res.warnings.contains(&CoverageWarning::IncompleteInstrument {
            available: 26,
            expected: 143
        }));
    }

    #[test]
    fn resolve_excludes_empty_subscale() {
        let catalog = small_catalog();
        let header = columns("P", &[1, 2, 5, 6, 9]);
        let res = resolve(&header, &catalog);
        assert_eq!(res.interest.len(), 1);
        assert_eq!(res.excluded, vec!["B".to_string()]);
        assert!(res
            .warnings
            .contains(&CoverageWarning::Excluded { code: "B".to_string() }));
        assert!(res.warnings.contains(&CoverageWarning::UncataloguedColumn {
            column: "P9".to_string()
        }));
        assert_eq!(res.available_items, vec![1, 2, 5, 6]);
        let coverage = res.coverage();
        assert_eq!(coverage[0], ("A".to_string(), 1.0));
    }

    #[test]
    fn effective_threshold_rounds_down() {
        let rules = CleaningRules::DEFAULT_RULES;
        assert_eq!(rules.effective_threshold(5, 11), 5);
        assert_eq!(rules.effective_threshold(5, 2), 0);
        assert_eq!(rules.effective_threshold(5, 5), 2);
        assert_eq!(rules.effective_threshold(5, 0), 0);
    }

    #[test]
    fn end_to_end_small_example() {
        init_logger();
        let catalog = small_catalog();
        let res = resolve(&columns("P", &[1, 2, 3, 4, 5, 6]), &catalog);
        let r = respondent("1", &[(1, 1), (2, 2), (3, 0), (4, 0), (5, 1), (6, 1)]);
        let out = run_pipeline(&[r], &res, &small_rules()).unwrap();

        let q = &out.quality[0];
        assert!((q.zero_pct - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(q.truthfulness.score, 2);
        assert_eq!(q.truthfulness.threshold, 0);
        assert!(q.truthfulness.valid);
        assert!(q.consistency.valid);

        assert_eq!(out.classification.retained, vec![0]);
        assert!(out.classification.removed.is_empty());

        let e = &out.retained[0];
        assert_eq!(e.scores[0].raw_score, 3);
        assert_eq!(e.scores[0].max_possible, 6);
        assert_eq!(e.scores[0].percentage, 50.0);
        assert_eq!(e.scores[1].raw_score, 0);
        assert_eq!(e.scores[1].percentage, 0.0);
        let d = e.dominant.clone().unwrap();
        assert_eq!(d.code, "A");
        assert!(d.tied.is_empty());
    }

    #[test]
    fn zero_available_control_items_is_invalid() {
        let catalog = small_catalog();
        // No truthfulness item in the input.
        let res = resolve(&columns("P", &[1, 2, 3, 4]), &catalog);
        assert!(res.warnings.contains(&CoverageWarning::ControlUnavailable {
            code: "V".to_string()
        }));
        let r = respondent("1", &[(1, 3), (2, 3), (3, 3), (4, 3)]);
        let out = run_pipeline(&[r], &res, &CleaningRules::DEFAULT_RULES).unwrap();
        let q = &out.quality[0];
        assert_eq!(q.truthfulness.threshold, 0);
        assert_eq!(q.truthfulness.available_items, 0);
        assert!(!q.truthfulness.valid);
        assert_eq!(out.classification.removed.len(), 1);
        assert_eq!(
            out.classification.removed[0].reason_text(),
            "Low truthfulness (0/0)"
        );
    }

    #[test]
    fn all_missing_control_values_follow_the_arithmetic() {
        // The columns exist, the respondent did not answer them: the threshold applies.
        let catalog = small_catalog();
        let res = resolve(&columns("P", &[1, 2, 3, 4, 5, 6]), &catalog);
        let r = respondent("1", &[(1, 1), (2, 1), (3, 1), (4, 1)]);
        let q = evaluate_respondent(&r, &res, &small_rules());
        assert_eq!(q.truthfulness.score, 0);
        assert!(q.truthfulness.valid);
        assert_eq!(q.tally.missing, 2);
        assert_eq!(q.tally.answered(), 4);
    }

    #[test]
    fn removal_lists_every_criterion() {
        init_logger();
        let catalog = ItemCatalog::casm83();
        let header = columns("Pregunta_", &(1..=143).collect::<Vec<u32>>());
        let res = resolve(&header, &catalog);
        // Everything 0 except 3 points of truthfulness.
        let r = casm_respondent("7", |i| if i == 12 { Response::Both } else { Response::Neither });
        let out = run_pipeline(&[r], &res, &CleaningRules::DEFAULT_RULES).unwrap();
        let removed = &out.classification.removed;
        assert_eq!(removed.len(), 1);
        assert_eq!(
            removed[0].reason_text(),
            "Excess zeros (99.3%) | Low truthfulness (3/11) | Low consistency (0/11)"
        );
        assert_eq!(out.classification.removed_by_zeros, 1);
        assert_eq!(out.classification.removed_by_truthfulness, 1);
        assert_eq!(out.classification.removed_by_consistency, 1);
        assert!(out.retained.is_empty());
    }

    #[test]
    fn zero_threshold_is_strict() {
        let catalog = small_catalog();
        let res = resolve(&columns("P", &[1, 2, 3, 4, 5, 6]), &catalog);
        let rules = CleaningRules {
            zero_threshold_pct: 50.0,
            ..small_rules()
        };
        // Exactly 50% zeros: kept.
        let kept = respondent("a", &[(1, 0), (2, 0), (3, 0), (4, 1), (5, 1), (6, 1)]);
        // 66.67% zeros: removed.
        let removed = respondent("b", &[(1, 0), (2, 0), (3, 0), (4, 0), (5, 1), (6, 1)]);
        let out = run_pipeline(&[kept, removed], &res, &rules).unwrap();
        assert_eq!(out.classification.retained, vec![0]);
        assert_eq!(out.classification.removed[0].index, 1);
        assert_eq!(
            out.classification.removed[0].reasons,
            vec![RemovalReason::ExcessZeros(400.0 / 6.0)]
        );
    }

    #[test]
    fn partition_preserves_order() {
        let catalog = small_catalog();
        let res = resolve(&columns("P", &[1, 2, 3, 4, 5, 6]), &catalog);
        let rows: Vec<Respondent> = (0..10)
            .map(|i| {
                if i % 3 == 0 {
                    respondent(&i.to_string(), &[(1, 0), (2, 0), (3, 0), (4, 0), (5, 0), (6, 0)])
                } else {
                    respondent(&i.to_string(), &[(1, 1), (2, 2), (3, 3), (4, 1), (5, 2), (6, 3)])
                }
            })
            .collect();
        let out = run_pipeline(&rows, &res, &small_rules()).unwrap();
        let removed: Vec<usize> = out.classification.removed.iter().map(|r| r.index).collect();
        assert_eq!(removed, vec![0, 3, 6, 9]);
        assert_eq!(out.classification.retained, vec![1, 2, 4, 5, 7, 8]);
        let mut all: Vec<usize> = removed.clone();
        all.extend(out.classification.retained.iter());
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<usize>>());
        let ids: Vec<String> = out.retained.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["1", "2", "4", "5", "7", "8"]);
    }

    #[test]
    fn completion_rate_counts_explicit_zeros() {
        let catalog = small_catalog();
        let res = resolve(&columns("P", &[1, 2, 3, 4, 5, 6]), &catalog);
        let r = respondent("1", &[(1, 0), (2, 0), (5, 2)]);
        let q = evaluate_respondent(&r, &res, &small_rules());
        assert_eq!(q.tally.available, 6);
        assert_eq!(q.tally.neither, 2);
        assert_eq!(q.tally.missing, 3);
        assert_eq!(q.tally.answered(), 3);
        assert_eq!(q.tally.answered() + q.tally.missing, q.tally.available);
        assert_eq!(q.completion_rate, 50.0);
    }

    #[test]
    fn completion_rate_is_bounded() {
        let catalog = small_catalog();
        let res = resolve(&columns("P", &[1, 2, 3, 4, 5, 6]), &catalog);
        let rows = vec![
            respondent("empty", &[]),
            respondent("full", &[(1, 1), (2, 1), (3, 1), (4, 1), (5, 1), (6, 1)]),
            respondent("half", &[(1, 1), (2, 1), (3, 1)]),
        ];
        for q in evaluate_quality(&rows, &res, &small_rules()) {
            assert!(q.completion_rate >= 0.0 && q.completion_rate <= 100.0);
            assert_eq!(q.tally.answered() + q.tally.missing, q.tally.available);
        }
        let q = evaluate_respondent(&rows[0], &res, &small_rules());
        assert_eq!(q.completion_rate, 0.0);
    }

    #[test]
    fn no_available_items_gives_zero_percentages() {
        let catalog = small_catalog();
        let res = resolve(&["ID".to_string()], &catalog);
        assert!(res.interest.is_empty());
        let r = respondent("1", &[]);
        let q = evaluate_respondent(&r, &res, &small_rules());
        assert_eq!(q.zero_pct, 0.0);
        assert_eq!(q.completion_rate, 0.0);
        let sub = ResolvedSubscale {
            code: "A".to_string(),
            name: "Area A".to_string(),
            expected: 2,
            existing_items: vec![],
        };
        let s = score_subscale(&r, &sub);
        assert_eq!(s.max_possible, 0);
        assert_eq!(s.percentage, 0.0);
        assert_eq!(find_dominant(&[], &[]), None);
    }

    #[test]
    fn out_of_range_values_are_reported_and_score_zero() {
        let catalog = small_catalog();
        let res = resolve(&columns("P", &[1, 2, 3, 4, 5, 6]), &catalog);
        let mut r = respondent("1", &[(1, 3), (3, 1), (4, 1), (5, 1), (6, 1)]);
        r.responses.insert(2, Response::parse("7"));
        let out = run_pipeline(&[r], &res, &small_rules()).unwrap();
        assert_eq!(
            out.domain_warnings,
            vec![ValueDomainWarning {
                item: 2,
                values: vec!["7".to_string()]
            }]
        );
        let e = &out.retained[0];
        assert_eq!(e.scores[0].raw_score, 3);
        assert_eq!(e.tally.out_of_range, 1);
        assert_eq!(e.tally.answered(), 6);
    }

    #[test]
    fn tie_break_uses_catalog_order() {
        let catalog = small_catalog();
        let res = resolve(&columns("P", &[1, 2, 3, 4, 5, 6]), &catalog);
        let r = respondent("1", &[(1, 2), (2, 1), (3, 3), (4, 0), (5, 1), (6, 1)]);
        for _ in 0..5 {
            let out = run_pipeline(&[r.clone()], &res, &small_rules()).unwrap();
            let d = out.retained[0].dominant.clone().unwrap();
            assert_eq!(d.code, "A");
            assert_eq!(d.name, "Area A");
            assert_eq!(d.raw_score, 3);
            assert_eq!(d.tied, vec!["A".to_string(), "B".to_string()]);
        }
    }

    #[test]
    fn retained_output_is_stable_on_rerun() {
        init_logger();
        let catalog = ItemCatalog::casm83();
        let header = columns("Pregunta_", &(1..=143).collect::<Vec<u32>>());
        let res = resolve(&header, &catalog);
        let rows: Vec<Respondent> = (0..20u32)
            .map(|k| {
                casm_respondent(&k.to_string(), move |i| {
                    Response::from_code(((i * 7 + k * 3) % (1 + k % 4)) as f64)
                })
            })
            .collect();
        let rules = CleaningRules::DEFAULT_RULES;
        let first = run_pipeline(&rows, &res, &rules).unwrap();
        let kept: Vec<Respondent> = first
            .classification
            .retained
            .iter()
            .map(|i| rows[*i].clone())
            .collect();
        assert!(!kept.is_empty());
        let second = run_pipeline(&kept, &res, &rules).unwrap();
        assert!(second.classification.removed.is_empty());
        assert_eq!(second.retained.len(), kept.len());
        let first_scores: Vec<Vec<SubscaleScore>> =
            first.retained.iter().map(|e| e.scores.clone()).collect();
        let second_scores: Vec<Vec<SubscaleScore>> =
            second.retained.iter().map(|e| e.scores.clone()).collect();
        assert_eq!(first_scores, second_scores);
    }

    #[test]
    fn atypical_pattern_is_flagged() {
        let catalog = small_catalog();
        let res = resolve(&columns("P", &[1, 2, 3, 4, 5, 6]), &catalog);
        let atyp = respondent("1", &[(1, 0), (2, 3), (3, 3), (5, 3)]);
        let normal = respondent("2", &[(1, 0), (2, 3), (3, 1)]);
        let empty = respondent("3", &[]);
        let q = evaluate_quality(&[atyp, normal, empty], &res, &small_rules());
        assert!(q[0].atypical);
        assert!(!q[1].atypical);
        assert!(!q[2].atypical);
    }

    #[test]
    fn invalid_rules_are_rejected() {
        let catalog = small_catalog();
        let res = resolve(&columns("P", &[1]), &catalog);
        let rules = CleaningRules {
            control_reference_items: 0,
            ..CleaningRules::DEFAULT_RULES
        };
        assert!(matches!(
            run_pipeline(&[], &res, &rules),
            Err(PipelineErrors::InvalidRules(_))
        ));
    }

    #[test]
    fn huge_control_thresholds_do_not_overflow() {
        let rules = CleaningRules {
            truthfulness_threshold: 500_000_000,
            consistency_threshold: u32::MAX,
            ..CleaningRules::DEFAULT_RULES
        };
        assert_eq!(rules.effective_threshold(500_000_000, 11), 500_000_000);
        assert_eq!(rules.effective_threshold(u32::MAX, 11), u32::MAX);
        assert_eq!(rules.effective_threshold(u32::MAX, 5), 1_952_257_861);

        let catalog = ItemCatalog::casm83();
        let header = columns("Pregunta_", &(1..=143).collect::<Vec<u32>>());
        let res = resolve(&header, &catalog);
        let r = casm_respondent("1", |_| Response::Both);
        let out = run_pipeline(&[r], &res, &rules).unwrap();
        assert_eq!(out.quality[0].truthfulness.threshold, 500_000_000);
        assert_eq!(
            out.classification.removed[0].reason_text(),
            "Low truthfulness (33/11) | Low consistency (33/11)"
        );
    }

    #[test]
    fn duplicate_ids_are_reported() {
        let catalog = small_catalog();
        let res = resolve(&columns("P", &[1, 2, 3, 4, 5, 6]), &catalog);
        let rows = vec![
            respondent("1", &[(5, 1)]),
            respondent("1", &[(5, 1)]),
            respondent("1", &[(5, 1)]),
            respondent("2", &[(5, 1)]),
        ];
        let out = run_pipeline(&rows, &res, &small_rules()).unwrap();
        assert_eq!(out.duplicate_ids, vec!["1".to_string()]);
    }
}
