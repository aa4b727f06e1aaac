use log::{info, warn};

use conjoint_analysis::*;
use snafu::{prelude::*, Snafu};

use std::fs;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

pub mod sheets;
pub mod store;
pub mod token;

use crate::args::Args;
use crate::survey::sheets::*;
use crate::survey::store::{Store, XlsxStore};
use crate::survey::token::{SignedTokenCodec, SurveyRef, TokenResolver};

#[derive(Debug, Snafu)]
pub enum PlanError {
    #[snafu(display("Error opening workbook {path}"))]
    OpeningWorkbook {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Error accessing a JSON file"))]
    OpeningJson { source: std::io::Error },
    #[snafu(display("Error processing JSON content"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Invalid survey token"))]
    InvalidToken {},

    #[snafu(display("{source}"))]
    Study { source: ConjointError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type PlanResult<T> = Result<T, PlanError>;

// Table names inside the survey workbook.
const ATTRIBUTES_TABLE: &str = "Attributes";
const DESIGN_TABLE: &str = "Design";
const RESPONSES_TABLE: &str = "Responses";
const DONATE_TABLE: &str = "Donate";
const ANALYSIS_TABLE: &str = "Analysis";

pub mod config_reader {
    use std::fs;

    use log::debug;
    use serde::{Deserialize, Serialize};
    use serde_json::Value as JSValue;
    use snafu::{prelude::*, ResultExt};

    use conjoint_analysis::{OptimizationGoal, PricingStrategy};

    use crate::survey::{OpeningJsonSnafu, ParsingJsonSnafu, PlanResult};

    /// The JSON analysis configuration accepted with `--config`.
    #[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
    pub struct AnalysisConfig {
        #[serde(rename = "numPlans")]
        pub num_plans: Option<usize>,
        #[serde(rename = "pricingStrategy")]
        pub pricing_strategy: Option<String>,
        #[serde(rename = "goal")]
        pub goal: Option<String>,
        #[serde(rename = "numTasks")]
        pub num_tasks: Option<u32>,
        #[serde(rename = "altsPerTask")]
        pub alts_per_task: Option<u32>,
    }

    pub fn read_config(path: &str) -> PlanResult<AnalysisConfig> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu {})?;
        let config: AnalysisConfig =
            serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        debug!("read_config: {:?}", config);
        Ok(config)
    }

    pub fn parse_pricing_strategy(s: &str) -> PlanResult<PricingStrategy> {
        match s {
            "submitted" => Ok(PricingStrategy::Submitted),
            "suggested" => Ok(PricingStrategy::Suggested),
            x => whatever!("Unknown pricing strategy {:?} (use 'submitted' or 'suggested')", x),
        }
    }

    pub fn parse_goal(s: &str) -> PlanResult<OptimizationGoal> {
        match s {
            "revenue" => Ok(OptimizationGoal::Revenue),
            "purchases" => Ok(OptimizationGoal::Purchases),
            x => whatever!("Unknown goal {:?} (use 'revenue' or 'purchases')", x),
        }
    }

    pub fn read_summary(path: &str) -> PlanResult<JSValue> {
        let contents = fs::read_to_string(path).context(OpeningJsonSnafu {})?;
        let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
        Ok(js)
    }
}

use config_reader::*;

/// Reads and parses the study's attributes from the store.
pub fn load_attributes(store: &mut dyn Store) -> PlanResult<Vec<Attribute>> {
    let rows = store.read_table(ATTRIBUTES_TABLE)?;
    let rows = match rows {
        Some(rows) if rows.len() > 1 => rows,
        _ => whatever!(
            "No attributes found. Please configure attributes in the Attributes tab before running analysis."
        ),
    };
    let attributes = parse_attributes(&rows);
    if attributes.is_empty() {
        whatever!(
            "Parsed 0 attributes from the Attributes tab. Check that your Attributes sheet has names and levels configured."
        );
    }
    Ok(attributes)
}

/// Returns the survey's design, generating and persisting one only when no
/// usable design is stored yet.
///
/// A design is drawn exactly once per survey: every later call replays the
/// stored rows so all respondents see the same tasks and their selections
/// stay comparable.
pub fn load_or_generate_design(
    store: &mut dyn Store,
    survey_id: &str,
    attributes: &[Attribute],
    rules: &DesignRules,
) -> PlanResult<Vec<Task>> {
    let existing = store.read_table(DESIGN_TABLE)?;
    if let Some(rows) = &existing {
        if rows.len() > 1 {
            let tasks = parse_design(rows, survey_id, attributes);
            if !tasks.is_empty() {
                info!(
                    "load_or_generate_design: reusing stored design with {} tasks",
                    tasks.len()
                );
                return Ok(tasks);
            }
        }
    }

    let tasks = generate_design(attributes, rules).context(StudySnafu {})?;
    let mut rows = design_rows(survey_id, attributes, &tasks);
    let table_has_header = existing.map(|rows| !rows.is_empty()).unwrap_or(false);
    if table_has_header {
        // The table already holds rows for other surveys; skip our header.
        rows.remove(0);
    }
    store.ensure_table(DESIGN_TABLE)?;
    store.append_rows(DESIGN_TABLE, &rows)?;
    info!(
        "load_or_generate_design: generated and stored a design with {} tasks",
        tasks.len()
    );
    Ok(tasks)
}

fn plan_to_json(plan: &Plan) -> JSValue {
    json!({
        "name": plan.name,
        "features": plan.features,
        "suggestedPrice": plan.suggested_price,
        "willingnessToPay": plan.willingness_to_pay,
        "currency": plan.currency,
        "rationale": plan.rationale,
    })
}

fn no_responses_json() -> JSValue {
    json!({
        "noResponses": true,
        "message": "No survey responses have been collected yet. Share your survey links and come back once respondents have completed the survey.",
    })
}

fn report_to_json(report: &AnalysisReport) -> JSValue {
    let mut js = json!({
        "importances": report.importances,
        "utilities": report.utilities,
        "totalResponses": report.total_responses,
        "plans": report.plans.iter().map(plan_to_json).collect::<Vec<_>>(),
        "currency": report.currency,
        "sampleSize": {
            "totalLevels": report.sample_size.total_levels,
            "tasksPerRespondent": report.sample_size.tasks_per_respondent,
            "alternativesPerTask": report.sample_size.alternatives_per_task,
            "n70": report.sample_size.n70,
            "n80": report.sample_size.n80,
            "n90": report.sample_size.n90,
        },
    });
    if let Some(warning) = &report.price_mismatch_warning {
        js["priceMismatchWarning"] = json!(warning);
    }
    if let Some(donations) = &report.donations {
        js["donationData"] = json!({
            "count": donations.count,
            "average": donations.average,
            "amounts": donations.amounts,
        });
    }
    js
}

/// Runs the analysis for one survey against the store and returns the JSON
/// bundle. A summary is also appended to the Analysis table as a side effect.
pub fn run_survey_analysis(
    store: &mut dyn Store,
    survey_id: &str,
    options: &AnalysisOptions,
) -> PlanResult<JSValue> {
    let attributes = load_attributes(store)?;

    let design_rows = match store.read_table(DESIGN_TABLE)? {
        Some(rows) if rows.len() > 1 => rows,
        _ => whatever!(
            "No survey design found. The survey design is created when the survey is first loaded."
        ),
    };
    let design = parse_design(&design_rows, survey_id, &attributes);
    if design.is_empty() {
        whatever!("No valid design data found. Cannot calculate utilities without task design information.");
    }

    let responses = match store.read_table(RESPONSES_TABLE)? {
        Some(rows) if rows.len() > 1 => parse_responses(&rows, survey_id),
        _ => return Ok(no_responses_json()),
    };

    let donations = match store.read_table(DONATE_TABLE)? {
        Some(rows) => parse_donations(&rows),
        None => Vec::new(),
    };

    let outcome = run_conjoint_analysis(&responses, &donations, &attributes, &design, options)
        .context(StudySnafu {})?;
    let report = match outcome {
        AnalysisOutcome::NoResponses => return Ok(no_responses_json()),
        AnalysisOutcome::Complete(report) => report,
    };

    store.ensure_table(ANALYSIS_TABLE)?;
    store.append_rows(ANALYSIS_TABLE, &analysis_rows(&report))?;
    info!(
        "run_survey_analysis: analysis complete, {} unique respondents",
        report.total_responses
    );

    Ok(report_to_json(&report))
}

fn resolve_survey(args: &Args) -> PlanResult<SurveyRef> {
    if let Some(token) = &args.project_key {
        let secret = match std::env::var("PLANBUILDER_SECRET") {
            Ok(s) => s,
            Err(_) => {
                whatever!("The --project-key option requires the PLANBUILDER_SECRET environment variable")
            }
        };
        return SignedTokenCodec::new(&secret).resolve(token);
    }
    if let Some(input) = &args.input {
        return Ok(SurveyRef {
            sheet_id: input.clone(),
            survey_id: args.survey.clone(),
        });
    }
    whatever!("Either --input or --project-key must be provided")
}

fn assemble_options(args: &Args) -> PlanResult<(AnalysisOptions, DesignRules)> {
    let config = match &args.config {
        Some(path) => Some(read_config(path)?),
        None => None,
    };

    let mut options = AnalysisOptions::DEFAULT_OPTIONS;
    let mut rules = DesignRules::DEFAULT_RULES;

    if let Some(config) = &config {
        if let Some(n) = config.num_plans {
            options = options.with_num_plans(n);
        }
        if let Some(s) = &config.pricing_strategy {
            options.pricing_strategy = parse_pricing_strategy(s)?;
        }
        if let Some(g) = &config.goal {
            options.goal = parse_goal(g)?;
        }
        if let Some(n) = config.num_tasks {
            rules.num_tasks = n;
        }
        if let Some(n) = config.alts_per_task {
            rules.alts_per_task = n;
        }
    }

    if let Some(n) = args.num_plans {
        options = options.with_num_plans(n);
    }
    if let Some(s) = &args.pricing_strategy {
        options.pricing_strategy = parse_pricing_strategy(s)?;
    }
    if let Some(g) = &args.goal {
        options.goal = parse_goal(g)?;
    }
    if let Some(n) = args.num_tasks {
        rules.num_tasks = n;
    }
    Ok((options, rules))
}

/// The end-to-end CLI workflow: resolve the survey, load or generate its
/// design, run the analysis, emit the bundle, optionally check a reference.
pub fn run_workflow(args: &Args) -> PlanResult<()> {
    let survey = resolve_survey(args)?;
    let (options, rules) = assemble_options(args)?;
    info!("run_workflow: survey {:?}, options {:?}", survey, options);

    let mut store = XlsxStore::open(&survey.sheet_id)?;

    let attributes = load_attributes(&mut store)?;
    info!(
        "run_workflow: {} attributes, heuristic recommends {} tasks",
        attributes.len(),
        recommended_task_count(&attributes)
    );

    load_or_generate_design(&mut store, &survey.survey_id, &attributes, &rules)?;

    // A freshly generated design only lives in the overlay; export it so the
    // caller can persist it next to the workbook.
    if let Some(design_path) = &args.design_out {
        if let Some(rows) = store.pending().get(DESIGN_TABLE) {
            let js = json!({ "design": rows });
            let pretty = serde_json::to_string_pretty(&js).context(ParsingJsonSnafu {})?;
            fs::write(design_path, pretty).context(OpeningJsonSnafu {})?;
            info!("run_workflow: wrote generated design to {}", design_path);
        }
    }

    let bundle = run_survey_analysis(&mut store, &survey.survey_id, &options)?;
    let pretty = serde_json::to_string_pretty(&bundle).context(ParsingJsonSnafu {})?;

    match args.out.as_deref() {
        None | Some("stdout") => println!("{}", pretty),
        Some(path) => fs::write(path, &pretty).context(OpeningJsonSnafu {})?,
    }

    // The reference bundle, if provided for comparison
    if let Some(reference_path) = &args.reference {
        let reference = read_summary(reference_path)?;
        let pretty_reference =
            serde_json::to_string_pretty(&reference).context(ParsingJsonSnafu {})?;
        if pretty_reference != pretty {
            warn!("Found differences with the reference bundle");
            print_diff(pretty_reference.as_str(), pretty.as_str(), "\n");
            whatever!("Difference detected between computed bundle and reference bundle");
        }
    }

    Ok(())
}
