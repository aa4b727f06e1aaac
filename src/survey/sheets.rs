//! Parsing and rendering of the workbook tables.
//!
//! Table layouts:
//! * `Attributes`: Name | Level | IsPriceAttribute | Currency. The attribute
//!   name carries forward over its level rows.
//! * `Design`: TaskID | AltID | one column per attribute. Task ids are
//!   serialized as `{surveyId}_task{N}`.
//! * `Responses`: Response ID | Survey ID | Task ID | Selected Alternative | Timestamp.
//! * `Donate`: Response ID | Survey ID | Amount | ...

use std::collections::BTreeMap;

use log::{debug, warn};

use conjoint_analysis::*;

/// Parses the Attributes table (header row included).
pub fn parse_attributes(rows: &[Vec<String>]) -> Vec<Attribute> {
    let mut attributes: Vec<Attribute> = Vec::new();
    let mut index_by_name: BTreeMap<String, usize> = BTreeMap::new();
    let mut last_name: Option<String> = None;

    for row in rows.iter().skip(1) {
        let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");
        let raw_name = cell(0);
        let raw_level = cell(1);
        let raw_is_price = cell(2);
        let raw_currency = cell(3);

        if !raw_name.is_empty() {
            last_name = Some(raw_name.to_string());
            if !index_by_name.contains_key(raw_name) {
                index_by_name.insert(raw_name.to_string(), attributes.len());
                attributes.push(Attribute {
                    name: raw_name.to_string(),
                    description: None,
                    kind: AttributeKind::Standard,
                    levels: Vec::new(),
                    is_price_attribute: false,
                    currency: None,
                });
            }
            if raw_is_price == "TRUE" {
                let idx = index_by_name[raw_name];
                attributes[idx].is_price_attribute = true;
                attributes[idx].currency = Some(if raw_currency.is_empty() {
                    "USD".to_string()
                } else {
                    raw_currency.to_string()
                });
            }
        }

        if !raw_level.is_empty() {
            if let Some(name) = &last_name {
                let idx = index_by_name[name];
                attributes[idx].levels.push(raw_level.to_string());
            }
        }
    }

    // Binary toggles are stored with the fixed level pair.
    for attr in attributes.iter_mut() {
        if attr.levels == AttributeKind::INCLUDED_LEVELS {
            attr.kind = AttributeKind::IncludedNotIncluded;
        }
    }
    attributes
}

// Stored levels may carry whitespace or a differently-cased none marker.
fn canonical_level(raw: &str) -> String {
    let val = raw.trim();
    if val.eq_ignore_ascii_case(NONE_LEVEL) {
        NONE_LEVEL.to_string()
    } else {
        val.to_string()
    }
}

fn parse_task_id(raw: &str, survey_id: &str) -> Option<u32> {
    let prefix = format!("{}_task", survey_id);
    raw.strip_prefix(prefix.as_str())?.parse::<u32>().ok()
}

/// Parses the Design table (header row included) back into tasks.
///
/// Rows belonging to other surveys are ignored. A stored task that lost its
/// "none" row gets a synthetic one appended, so aggregation can always tell
/// a none-selection apart.
pub fn parse_design(
    rows: &[Vec<String>],
    survey_id: &str,
    attributes: &[Attribute],
) -> Vec<Task> {
    let mut alts_by_task: BTreeMap<u32, Vec<Alternative>> = BTreeMap::new();

    for row in rows.iter().skip(1) {
        let task_id = match row.first().and_then(|c| parse_task_id(c, survey_id)) {
            Some(id) => id,
            None => continue,
        };
        let alt_id = match row.get(1).and_then(|c| c.trim().parse::<u32>().ok()) {
            Some(id) => id,
            None => {
                warn!("parse_design: task {} row without alternative id", task_id);
                continue;
            }
        };

        let mut levels: BTreeMap<String, String> = BTreeMap::new();
        for (j, attr) in attributes.iter().enumerate() {
            if let Some(cell) = row.get(j + 2) {
                let level = canonical_level(cell);
                if !level.is_empty() {
                    levels.insert(attr.name.clone(), level);
                }
            }
        }
        alts_by_task
            .entry(task_id)
            .or_default()
            .push(Alternative { id: alt_id, levels });
    }

    let mut tasks: Vec<Task> = Vec::new();
    for (task_id, mut alternatives) in alts_by_task {
        let none_id = alternatives
            .iter()
            .find(|a| a.is_none_alternative())
            .map(|a| a.id);
        let none_id = match none_id {
            Some(id) => id,
            None => {
                let next_id = alternatives.iter().map(|a| a.id).max().unwrap_or(0) + 1;
                debug!(
                    "parse_design: task {} has no none row, appending id {}",
                    task_id, next_id
                );
                let levels: BTreeMap<String, String> = attributes
                    .iter()
                    .map(|a| (a.name.clone(), NONE_LEVEL.to_string()))
                    .collect();
                alternatives.push(Alternative {
                    id: next_id,
                    levels,
                });
                next_id
            }
        };
        tasks.push(Task {
            id: task_id,
            alternatives,
            none_alternative_id: none_id,
        });
    }
    tasks
}

/// Renders a design as storable rows, header first.
pub fn design_rows(
    survey_id: &str,
    attributes: &[Attribute],
    tasks: &[Task],
) -> Vec<Vec<String>> {
    let mut header: Vec<String> = vec!["TaskID".to_string(), "AltID".to_string()];
    header.extend(attributes.iter().map(|a| a.name.clone()));

    let mut rows = vec![header];
    for task in tasks {
        for alt in &task.alternatives {
            let mut row: Vec<String> = vec![
                format!("{}_task{}", survey_id, task.id),
                alt.id.to_string(),
            ];
            for attr in attributes {
                row.push(alt.levels.get(&attr.name).cloned().unwrap_or_default());
            }
            rows.push(row);
        }
    }
    rows
}

/// Parses the Responses table (header row included), keeping only the rows
/// belonging to `survey_id`.
///
/// A workbook can hold responses for several surveys; a selection is only
/// meaningful against the design of the survey it was collected for, so rows
/// for other surveys are dropped here. Malformed rows are skipped, not fatal.
pub fn parse_responses(rows: &[Vec<String>], survey_id: &str) -> Vec<Response> {
    let prefix = format!("{}_task", survey_id);
    let mut responses: Vec<Response> = Vec::new();
    for row in rows.iter().skip(1) {
        let cell = |i: usize| row.get(i).map(|s| s.trim()).unwrap_or("");
        let raw_task = cell(2);
        // Task ids are stored either as "{surveyId}_task{N}" or as a bare number.
        let task_id = if let Some(suffix) = raw_task.strip_prefix(prefix.as_str()) {
            suffix.parse::<u32>().ok()
        } else if raw_task.contains("_task") || cell(1) != survey_id {
            debug!("parse_responses: skipping row for another survey {:?}", row);
            continue;
        } else {
            raw_task.parse::<u32>().ok()
        };
        let selected_alt = cell(3).parse::<u32>().ok();
        match (task_id, selected_alt) {
            (Some(task_id), Some(selected_alt)) if !cell(0).is_empty() => {
                responses.push(Response {
                    response_id: cell(0).to_string(),
                    survey_id: cell(1).to_string(),
                    task_id,
                    selected_alt,
                });
            }
            _ => {
                warn!("parse_responses: skipping malformed row {:?}", row);
            }
        }
    }
    responses
}

/// Parses the Donate table (header row included), keeping positive amounts.
pub fn parse_donations(rows: &[Vec<String>]) -> Vec<Donation> {
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let amount = row.get(2)?.trim().parse::<f64>().ok()?;
            if !(amount.is_finite() && amount > 0.0) {
                return None;
            }
            Some(Donation {
                response_id: row.first().cloned().unwrap_or_default(),
                amount,
            })
        })
        .collect()
}

/// Renders the human-readable analysis summary appended to the Analysis table.
pub fn analysis_rows(report: &AnalysisReport) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = vec![
        vec!["Conjoint Analysis Results".to_string()],
        vec![],
        vec![
            "Total Unique Respondents:".to_string(),
            report.total_responses.to_string(),
        ],
        vec![],
        vec!["Sample Size Guidance (Orme CBC rule, approximate)".to_string()],
        vec![
            "Total Levels".to_string(),
            report.sample_size.total_levels.to_string(),
        ],
        vec![
            "Tasks per Respondent (design)".to_string(),
            report.sample_size.tasks_per_respondent.to_string(),
        ],
        vec![
            "Alternatives per Task (excluding \"None\")".to_string(),
            report.sample_size.alternatives_per_task.to_string(),
        ],
        vec![],
        vec![
            "Target Confidence".to_string(),
            "Approx. Required Responses".to_string(),
        ],
        vec!["~70%".to_string(), report.sample_size.n70.to_string()],
        vec![
            "~80% (baseline)".to_string(),
            report.sample_size.n80.to_string(),
        ],
        vec!["~90%".to_string(), report.sample_size.n90.to_string()],
        vec![],
        vec!["Attribute Importances".to_string()],
        vec!["Attribute".to_string(), "Importance (%)".to_string()],
    ];

    for (attr, imp) in &report.importances {
        rows.push(vec![attr.clone(), format!("{:.2}", imp)]);
    }

    rows.push(vec![]);
    rows.push(vec!["Attribute Level Utilities".to_string()]);
    rows.push(vec!["Attribute:Level".to_string(), "Utility".to_string()]);
    for (key, util) in &report.utilities {
        rows.push(vec![key.clone(), format!("{:.3}", util)]);
    }

    if !report.plans.is_empty() {
        rows.push(vec![]);
        rows.push(vec!["Recommended Plans".to_string()]);
        rows.push(vec![
            "Plan Name".to_string(),
            "Suggested Price".to_string(),
            "Willingness to Pay".to_string(),
            "Features".to_string(),
        ]);
        for plan in &report.plans {
            let features: Vec<String> = plan
                .features
                .iter()
                .map(|(attr, level)| format!("{}: {}", attr, level))
                .collect();
            rows.push(vec![
                plan.name.clone(),
                format!("${}", plan.suggested_price),
                format!("${:.2}", plan.willingness_to_pay),
                features.join("; "),
            ]);
        }
    }

    if let Some(donations) = &report.donations {
        rows.push(vec![]);
        rows.push(vec!["Donation Statistics".to_string()]);
        rows.push(vec![
            "Total Donations:".to_string(),
            donations.count.to_string(),
        ]);
        rows.push(vec![
            "Average Donation:".to_string(),
            format!("${:.2}", donations.average),
        ]);
    }
    rows
}
