mod config;
pub mod builder;
pub mod design;
pub mod plans;

use log::{debug, info};

use std::collections::{BTreeMap, HashMap, HashSet};

pub use crate::config::*;
pub use crate::design::{generate_design, recommended_task_count};
pub use crate::plans::synthesize_plans;

/// The key under which a level is counted: `"AttributeName:Level"`.
pub fn level_key(attribute: &str, level: &str) -> String {
    format!("{}:{}", attribute, level)
}

/// Checks the structural invariants of a study's attributes.
///
/// At least one attribute, at least two distinct levels each, unique names,
/// at most one price attribute, and the fixed level pair on binary toggles.
pub fn validate_attributes(attributes: &[Attribute]) -> Result<(), ConjointError> {
    if attributes.is_empty() {
        return Err(ConjointError::NoAttributes);
    }
    let mut seen_names: HashSet<&str> = HashSet::new();
    let mut price_attrs = 0;
    for attr in attributes {
        if !seen_names.insert(attr.name.as_str()) {
            return Err(ConjointError::DuplicateAttribute {
                attribute: attr.name.clone(),
            });
        }
        let distinct: HashSet<&String> = attr.levels.iter().collect();
        if distinct.len() < 2 {
            return Err(ConjointError::InvalidLevels {
                attribute: attr.name.clone(),
            });
        }
        if attr.kind == AttributeKind::IncludedNotIncluded
            && attr.levels != AttributeKind::INCLUDED_LEVELS
        {
            return Err(ConjointError::InvalidIncludedLevels {
                attribute: attr.name.clone(),
            });
        }
        if attr.is_price_attribute {
            price_attrs += 1;
        }
    }
    if price_attrs > 1 {
        return Err(ConjointError::MultiplePriceAttributes);
    }
    Ok(())
}

/// Tallies, for every (attribute, level) pair, how often it appeared in a
/// chosen vs. a non-chosen alternative.
///
/// Responses that picked the "none" alternative carry no preference signal
/// and contribute nothing. Responses whose task is missing from the design
/// are skipped silently: one malformed row must not invalidate the batch.
pub fn aggregate_choices(responses: &[Response], design: &[Task]) -> LevelCounts {
    let tasks_by_id: HashMap<u32, &Task> = design.iter().map(|t| (t.id, t)).collect();
    let mut counts = LevelCounts::default();

    for resp in responses {
        let task = match tasks_by_id.get(&resp.task_id) {
            Some(t) => t,
            None => {
                debug!(
                    "aggregate_choices: no design entry for task {}, skipping response {}",
                    resp.task_id, resp.response_id
                );
                continue;
            }
        };
        if resp.selected_alt == task.none_alternative_id {
            continue;
        }
        for alt in &task.alternatives {
            let was_chosen = alt.id == resp.selected_alt;
            for (attr_name, level) in &alt.levels {
                if level == NONE_LEVEL {
                    continue;
                }
                let key = level_key(attr_name, level);
                if was_chosen {
                    *counts.chosen.entry(key).or_insert(0) += 1;
                } else {
                    *counts.not_chosen.entry(key).or_insert(0) += 1;
                }
            }
        }
    }
    counts
}

/// Converts chosen/not-chosen counts into zero-centered part-worth utilities
/// (clamped log-odds of the selection rate) and range-based attribute
/// importances normalized to sum to 100.
pub fn estimate_utilities(
    counts: &LevelCounts,
    attributes: &[Attribute],
) -> (BTreeMap<String, f64>, BTreeMap<String, f64>) {
    let mut utilities: BTreeMap<String, f64> = BTreeMap::new();
    let mut importances: BTreeMap<String, f64> = BTreeMap::new();

    for attr in attributes {
        let mut level_utils: Vec<f64> = Vec::with_capacity(attr.levels.len());
        for level in &attr.levels {
            let key = level_key(&attr.name, level);
            let chosen = counts.chosen.get(&key).cloned().unwrap_or(0);
            let not_chosen = counts.not_chosen.get(&key).cloned().unwrap_or(0);
            let total = chosen + not_chosen;

            // A level never shown to anyone is neutral, not infinitely bad.
            let utility = if total == 0 {
                0.0
            } else {
                let rate = (chosen as f64 / total as f64).clamp(0.01, 0.99);
                (rate / (1.0 - rate)).ln()
            };
            utilities.insert(key, utility);
            level_utils.push(utility);
        }

        // Zero-centering within the attribute makes utilities comparable
        // across attributes.
        let mean = level_utils.iter().sum::<f64>() / level_utils.len().max(1) as f64;
        let mut max_util = f64::NEG_INFINITY;
        let mut min_util = f64::INFINITY;
        for level in &attr.levels {
            let key = level_key(&attr.name, level);
            let centered = utilities[&key] - mean;
            utilities.insert(key, centered);
            max_util = max_util.max(centered);
            min_util = min_util.min(centered);
        }
        importances.insert(attr.name.clone(), max_util - min_util);
    }

    let total_importance: f64 = importances.values().sum();
    if total_importance > 0.0 {
        for imp in importances.values_mut() {
            *imp = *imp / total_importance * 100.0;
        }
    }
    (utilities, importances)
}

/// Orme's CBC sample-size heuristic at the 80% baseline, scaled to the 70%
/// and 90% tiers by squared z-ratios.
pub fn recommend_sample_size(
    total_levels: u32,
    tasks_per_respondent: u32,
    alternatives_per_task: u32,
) -> SampleSizeRecommendation {
    const Z70: f64 = 1.04;
    const Z80: f64 = 1.28;
    const Z90: f64 = 1.64;

    let tasks = tasks_per_respondent.max(1);
    let alts = alternatives_per_task.max(1);
    let n80 = (500.0 * total_levels as f64 / (tasks as f64 * alts as f64)).ceil();
    let n70 = (n80 * (Z70 * Z70) / (Z80 * Z80)).ceil();
    let n90 = (n80 * (Z90 * Z90) / (Z80 * Z80)).ceil();

    SampleSizeRecommendation {
        total_levels,
        tasks_per_respondent: tasks,
        alternatives_per_task: alts,
        n70: n70 as u64,
        n80: n80 as u64,
        n90: n90 as u64,
    }
}

/// Descriptive statistics over donation amounts. Non-positive amounts are
/// ignored; no donations yields `None`.
pub fn summarize_donations(donations: &[Donation]) -> Option<DonationStats> {
    let amounts: Vec<f64> = donations
        .iter()
        .map(|d| d.amount)
        .filter(|a| a.is_finite() && *a > 0.0)
        .collect();
    if amounts.is_empty() {
        return None;
    }
    let average = amounts.iter().sum::<f64>() / amounts.len() as f64;
    Some(DonationStats {
        count: amounts.len(),
        average,
        amounts,
    })
}

/// Runs the full conjoint analysis for one survey.
///
/// Arguments:
/// * `responses` the raw per-task selections collected against `design`
/// * `donations` donation-type answers, tracked descriptively only
/// * `attributes` the study's attribute definitions
/// * `design` the persisted design that was shown to every respondent
/// * `options` plan count, pricing strategy and optimization goal
pub fn run_conjoint_analysis(
    responses: &[Response],
    donations: &[Donation],
    attributes: &[Attribute],
    design: &[Task],
    options: &AnalysisOptions,
) -> Result<AnalysisOutcome, ConjointError> {
    validate_attributes(attributes)?;
    info!(
        "run_conjoint_analysis: {} responses, {} attributes, {} tasks",
        responses.len(),
        attributes.len(),
        design.len()
    );

    if responses.is_empty() {
        return Ok(AnalysisOutcome::NoResponses);
    }

    // Responses that picked "none" are excluded from the counting universe
    // and from the unique-respondent tally.
    let none_by_task: HashMap<u32, u32> = design
        .iter()
        .map(|t| (t.id, t.none_alternative_id))
        .collect();
    let preference_responses: Vec<Response> = responses
        .iter()
        .filter(|r| none_by_task.get(&r.task_id) != Some(&r.selected_alt))
        .cloned()
        .collect();
    debug!(
        "run_conjoint_analysis: {} of {} responses expressed a preference",
        preference_responses.len(),
        responses.len()
    );

    let unique_respondents: HashSet<&str> = preference_responses
        .iter()
        .map(|r| r.response_id.as_str())
        .collect();

    let counts = aggregate_choices(&preference_responses, design);
    let (utilities, importances) = estimate_utilities(&counts, attributes);

    let num_plans = options.num_plans.clamp(1, AnalysisOptions::MAX_PLANS);
    let synthesis = synthesize_plans(
        num_plans,
        attributes,
        &utilities,
        options.pricing_strategy,
        options.goal,
    );

    let total_levels = Attribute::total_level_count(attributes) as u32;
    let alternatives_per_task = design
        .first()
        .map(|t| {
            t.alternatives
                .iter()
                .filter(|a| a.id != t.none_alternative_id)
                .count() as u32
        })
        .filter(|n| *n > 0)
        .unwrap_or(2);
    let sample_size =
        recommend_sample_size(total_levels, design.len() as u32, alternatives_per_task);

    let currency = attributes
        .iter()
        .find(|a| a.is_price_attribute)
        .and_then(|a| a.currency.clone())
        .unwrap_or_else(|| "USD".to_string());

    Ok(AnalysisOutcome::Complete(AnalysisReport {
        utilities,
        importances,
        total_responses: unique_respondents.len(),
        plans: synthesis.plans,
        currency,
        sample_size,
        price_mismatch_warning: synthesis.warning,
        donations: summarize_donations(donations),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn study() -> Vec<Attribute> {
        let mut price = Attribute::standard("Price", &["$5", "$10", "$20"]);
        price.is_price_attribute = true;
        price.currency = Some("USD".to_string());
        vec![
            Attribute::standard("Storage", &["10GB", "100GB", "1TB"]),
            price,
        ]
    }

    fn alternative(id: u32, storage: &str, price: &str) -> Alternative {
        let mut levels = BTreeMap::new();
        levels.insert("Storage".to_string(), storage.to_string());
        levels.insert("Price".to_string(), price.to_string());
        Alternative { id, levels }
    }

    /// The one-task design of the worked example: Alt1 = (10GB, $5),
    /// Alt2 = (1TB, $20), Alt3 = none.
    fn example_design() -> Vec<Task> {
        vec![Task {
            id: 1,
            alternatives: vec![
                alternative(1, "10GB", "$5"),
                alternative(2, "1TB", "$20"),
                alternative(3, NONE_LEVEL, NONE_LEVEL),
            ],
            none_alternative_id: 3,
        }]
    }

    /// Ten respondents: 7 choose Alt1, 2 choose Alt2, 1 chooses none.
    fn example_responses() -> Vec<Response> {
        let mut responses = Vec::new();
        for i in 0..10 {
            let selected = if i < 7 {
                1
            } else if i < 9 {
                2
            } else {
                3
            };
            responses.push(Response {
                response_id: format!("r{}", i),
                survey_id: "s1".to_string(),
                task_id: 1,
                selected_alt: selected,
            });
        }
        responses
    }

    #[test]
    fn none_selections_contribute_no_counts() {
        let design = example_design();
        let only_none = vec![Response {
            response_id: "r".to_string(),
            survey_id: "s1".to_string(),
            task_id: 1,
            selected_alt: 3,
        }];
        let counts = aggregate_choices(&only_none, &design);
        assert!(counts.chosen.is_empty());
        assert!(counts.not_chosen.is_empty());
    }

    #[test]
    fn responses_for_unknown_tasks_are_skipped() {
        let design = example_design();
        let mut responses = example_responses();
        responses.push(Response {
            response_id: "stray".to_string(),
            survey_id: "s1".to_string(),
            task_id: 99,
            selected_alt: 1,
        });
        let with_stray = aggregate_choices(&responses, &design);
        let without = aggregate_choices(&example_responses(), &design);
        assert_eq!(with_stray, without);
    }

    #[test]
    fn worked_example_counts_and_utilities() {
        let attrs = study();
        let design = example_design();
        let counts = aggregate_choices(&example_responses(), &design);

        assert_eq!(counts.chosen["Storage:10GB"], 7);
        assert_eq!(counts.not_chosen["Storage:10GB"], 2);
        assert_eq!(counts.chosen["Storage:1TB"], 2);
        assert_eq!(counts.not_chosen["Storage:1TB"], 7);

        let (utilities, importances) = estimate_utilities(&counts, &attrs);
        let expected = (7.0f64 / 9.0 / (2.0 / 9.0)).ln(); // ln(3.5)
        assert!((utilities["Storage:10GB"] - expected).abs() < 1e-9);
        assert!((utilities["Storage:1TB"] + expected).abs() < 1e-9);
        assert!((utilities["Storage:100GB"]).abs() < 1e-9);

        assert!((importances["Storage"] - 50.0).abs() < 1e-9);
        assert!((importances["Price"] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn utilities_are_zero_centered_per_attribute() {
        let attrs = study();
        let counts = aggregate_choices(&example_responses(), &example_design());
        let (utilities, _) = estimate_utilities(&counts, &attrs);
        for attr in &attrs {
            let sum: f64 = attr
                .levels
                .iter()
                .map(|l| utilities[&level_key(&attr.name, l)])
                .sum();
            assert!(sum.abs() < 1e-9, "attribute {} not centered: {}", attr.name, sum);
        }
    }

    #[test]
    fn importances_sum_to_100_or_all_zero() {
        let attrs = study();
        let counts = aggregate_choices(&example_responses(), &example_design());
        let (_, importances) = estimate_utilities(&counts, &attrs);
        let sum: f64 = importances.values().sum();
        assert!((sum - 100.0).abs() < 1e-9);

        // With no observations at all, everything stays at zero.
        let (_, empty_importances) = estimate_utilities(&LevelCounts::default(), &attrs);
        assert!(empty_importances.values().all(|v| *v == 0.0));
    }

    #[test]
    fn extreme_rates_are_clamped() {
        let attrs = vec![Attribute::standard("A", &["x", "y"])];
        let mut counts = LevelCounts::default();
        counts.chosen.insert("A:x".to_string(), 10);
        counts.not_chosen.insert("A:y".to_string(), 10);
        let (utilities, _) = estimate_utilities(&counts, &attrs);
        for u in utilities.values() {
            assert!(u.is_finite());
        }
        let max_logit = (0.99f64 / 0.01).ln();
        assert!(utilities["A:x"].abs() <= max_logit);
    }

    #[test]
    fn sample_size_ordering_and_worked_example() {
        let rec = recommend_sample_size(6, 1, 2);
        assert_eq!(rec.n80, 1500);
        assert_eq!(rec.n70, 991);
        assert_eq!(rec.n90, 2463);
        assert!(rec.n70 <= rec.n80 && rec.n80 <= rec.n90);

        for levels in [2u32, 9, 24] {
            for tasks in [1u32, 5, 12] {
                for alts in [2u32, 3, 4] {
                    let r = recommend_sample_size(levels, tasks, alts);
                    assert!(r.n70 <= r.n80 && r.n80 <= r.n90);
                }
            }
        }
    }

    #[test]
    fn estimation_is_deterministic() {
        let attrs = study();
        let design = example_design();
        let responses = example_responses();
        let first = aggregate_choices(&responses, &design);
        let second = aggregate_choices(&responses, &design);
        assert_eq!(first, second);
        assert_eq!(
            estimate_utilities(&first, &attrs),
            estimate_utilities(&second, &attrs)
        );
    }

    #[test]
    fn full_analysis_of_the_worked_example() {
        let attrs = study();
        let outcome = run_conjoint_analysis(
            &example_responses(),
            &[],
            &attrs,
            &example_design(),
            &AnalysisOptions::DEFAULT_OPTIONS,
        )
        .unwrap();
        let report = match outcome {
            AnalysisOutcome::Complete(r) => r,
            AnalysisOutcome::NoResponses => panic!("expected a complete analysis"),
        };
        // The none-chooser is excluded from the respondent tally.
        assert_eq!(report.total_responses, 9);
        assert_eq!(report.plans.len(), 3);
        assert_eq!(report.currency, "USD");
        assert_eq!(report.sample_size.n80, 1500);
        assert!(report.donations.is_none());
    }

    #[test]
    fn zero_responses_is_a_distinguished_outcome() {
        let attrs = study();
        let outcome = run_conjoint_analysis(
            &[],
            &[],
            &attrs,
            &example_design(),
            &AnalysisOptions::DEFAULT_OPTIONS,
        )
        .unwrap();
        assert_eq!(outcome, AnalysisOutcome::NoResponses);
    }

    #[test]
    fn analysis_rejects_invalid_studies() {
        let no_attrs = run_conjoint_analysis(
            &example_responses(),
            &[],
            &[],
            &example_design(),
            &AnalysisOptions::DEFAULT_OPTIONS,
        );
        assert_eq!(no_attrs, Err(ConjointError::NoAttributes));

        let mut two_prices = study();
        two_prices[0].is_price_attribute = true;
        let res = run_conjoint_analysis(
            &example_responses(),
            &[],
            &two_prices,
            &example_design(),
            &AnalysisOptions::DEFAULT_OPTIONS,
        );
        assert_eq!(res, Err(ConjointError::MultiplePriceAttributes));
    }

    #[test]
    fn donation_summary() {
        let donations = vec![
            Donation {
                response_id: "d1".to_string(),
                amount: 5.0,
            },
            Donation {
                response_id: "d2".to_string(),
                amount: 15.0,
            },
            Donation {
                response_id: "d3".to_string(),
                amount: -2.0,
            },
        ];
        let stats = summarize_donations(&donations).unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.average - 10.0).abs() < 1e-9);
        assert!(summarize_donations(&[]).is_none());
    }
}
