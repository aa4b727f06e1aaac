// ********* Input data structures ***********

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::Display;

/// The sentinel level assigned to every attribute of the "choose none"
/// alternative. It never enters any count or utility.
pub const NONE_LEVEL: &str = "None of these";

/// How an attribute presents its levels to respondents.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum AttributeKind {
    /// Free-form levels, at least two of them.
    Standard,
    /// A binary feature toggle. The levels are fixed to
    /// `["Not Included", "Included"]` and are not independently editable.
    IncludedNotIncluded,
}

impl AttributeKind {
    pub const INCLUDED_LEVELS: [&'static str; 2] = ["Not Included", "Included"];
}

/// A product feature under study, with the levels it can take.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Attribute {
    /// Unique within a study.
    pub name: String,
    pub description: Option<String>,
    pub kind: AttributeKind,
    /// Ordered, distinct, length >= 2.
    pub levels: Vec<String>,
    /// At most one attribute in a study may carry this flag.
    pub is_price_attribute: bool,
    /// ISO-4217 code. Only meaningful on the price attribute.
    pub currency: Option<String>,
}

impl Attribute {
    pub fn standard(name: &str, levels: &[&str]) -> Attribute {
        Attribute {
            name: name.to_string(),
            description: None,
            kind: AttributeKind::Standard,
            levels: levels.iter().map(|s| s.to_string()).collect(),
            is_price_attribute: false,
            currency: None,
        }
    }

    pub fn total_level_count(attributes: &[Attribute]) -> usize {
        attributes.iter().map(|a| a.levels.len()).sum()
    }
}

/// One product profile shown inside a choice task.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Alternative {
    /// Unique within its task, starting at 1.
    pub id: u32,
    /// Attribute name -> the level assigned to this alternative.
    pub levels: BTreeMap<String, String>,
}

impl Alternative {
    pub fn is_none_alternative(&self) -> bool {
        !self.levels.is_empty() && self.levels.values().all(|l| l == NONE_LEVEL)
    }
}

/// One choice task: a handful of alternatives plus the "none" option.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Task {
    /// Positive, starting at 1.
    pub id: u32,
    pub alternatives: Vec<Alternative>,
    pub none_alternative_id: u32,
}

/// A single task answer from one respondent sitting.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Response {
    /// Groups all the task answers of one respondent sitting.
    pub response_id: String,
    pub survey_id: String,
    pub task_id: u32,
    pub selected_alt: u32,
}

/// A donation-style answer. It ends the respondent session immediately and
/// never enters utility estimation; it is only tracked descriptively.
#[derive(PartialEq, Debug, Clone)]
pub struct Donation {
    pub response_id: String,
    pub amount: f64,
}

// ********* Configuration **********

/// Parameters for the design generator.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct DesignRules {
    /// Number of choice tasks per survey. Clamped to [MIN_TASKS, MAX_TASKS].
    pub num_tasks: u32,
    /// Real alternatives per task, excluding the synthetic "none".
    /// Floored at [MIN_ALTS](Self::MIN_ALTS).
    pub alts_per_task: u32,
    /// Redraw budget before a duplicate alternative is accepted as-is.
    pub max_duplicate_retries: u32,
}

impl DesignRules {
    pub const MIN_TASKS: u32 = 1;
    pub const MAX_TASKS: u32 = 10;
    /// A task needs at least two real alternatives to express a preference.
    pub const MIN_ALTS: u32 = 2;

    pub const DEFAULT_RULES: DesignRules = DesignRules {
        num_tasks: 5,
        alts_per_task: 3,
        max_duplicate_retries: 50,
    };
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum PricingStrategy {
    /// Use the researcher-submitted price levels directly where possible.
    Submitted,
    /// Derive prices from utilities around a base price.
    Suggested,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum OptimizationGoal {
    Revenue,
    Purchases,
}

/// Options for one analysis run.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct AnalysisOptions {
    /// Number of plans to synthesize, clamped to [1, 10].
    pub num_plans: usize,
    pub pricing_strategy: PricingStrategy,
    pub goal: OptimizationGoal,
}

impl AnalysisOptions {
    pub const MAX_PLANS: usize = 10;

    pub const DEFAULT_OPTIONS: AnalysisOptions = AnalysisOptions {
        num_plans: 3,
        pricing_strategy: PricingStrategy::Suggested,
        goal: OptimizationGoal::Revenue,
    };

    pub fn with_num_plans(self, num_plans: usize) -> AnalysisOptions {
        AnalysisOptions {
            num_plans: num_plans.clamp(1, Self::MAX_PLANS),
            ..self
        }
    }
}

// ******** Output data structures *********

/// Chosen / not-chosen tallies per `"Attribute:Level"` key.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct LevelCounts {
    pub chosen: BTreeMap<String, u64>,
    pub not_chosen: BTreeMap<String, u64>,
}

/// One synthesized pricing tier.
#[derive(PartialEq, Debug, Clone)]
pub struct Plan {
    pub name: String,
    /// Attribute name -> the level this plan ships with.
    pub features: BTreeMap<String, String>,
    pub suggested_price: f64,
    pub willingness_to_pay: f64,
    pub currency: String,
    pub rationale: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct PlanSynthesis {
    pub plans: Vec<Plan>,
    pub warning: Option<String>,
}

/// Recommended respondent counts at three confidence tiers.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct SampleSizeRecommendation {
    pub total_levels: u32,
    pub tasks_per_respondent: u32,
    pub alternatives_per_task: u32,
    pub n70: u64,
    pub n80: u64,
    pub n90: u64,
}

/// Descriptive statistics over donation amounts.
#[derive(PartialEq, Debug, Clone)]
pub struct DonationStats {
    pub count: usize,
    pub average: f64,
    pub amounts: Vec<f64>,
}

/// The full result bundle of one analysis run.
#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisReport {
    /// `"Attribute:Level"` -> zero-centered part-worth utility.
    pub utilities: BTreeMap<String, f64>,
    /// Attribute name -> importance percentage, summing to 100 (or all 0).
    pub importances: BTreeMap<String, f64>,
    /// Unique respondents among the responses that expressed a preference.
    pub total_responses: usize,
    pub plans: Vec<Plan>,
    pub currency: String,
    pub sample_size: SampleSizeRecommendation,
    pub price_mismatch_warning: Option<String>,
    pub donations: Option<DonationStats>,
}

/// Outcome of an analysis call. Zero collected responses is not an error:
/// callers render a friendly empty state instead of an error banner.
#[derive(PartialEq, Debug, Clone)]
pub enum AnalysisOutcome {
    NoResponses,
    Complete(AnalysisReport),
}

/// Errors that prevent an analysis or design generation from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ConjointError {
    NoAttributes,
    /// An attribute with fewer than two distinct levels.
    InvalidLevels {
        attribute: String,
    },
    DuplicateAttribute {
        attribute: String,
    },
    MultiplePriceAttributes,
    /// A binary attribute whose levels were edited away from the fixed pair.
    InvalidIncludedLevels {
        attribute: String,
    },
}

impl Error for ConjointError {}

impl Display for ConjointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConjointError::NoAttributes => write!(
                f,
                "No attributes found. Please configure attributes before running analysis."
            ),
            ConjointError::InvalidLevels { attribute } => write!(
                f,
                "Attribute \"{}\" needs at least two distinct levels.",
                attribute
            ),
            ConjointError::DuplicateAttribute { attribute } => {
                write!(f, "Attribute \"{}\" is defined more than once.", attribute)
            }
            ConjointError::MultiplePriceAttributes => {
                write!(f, "At most one attribute may be marked as the price attribute.")
            }
            ConjointError::InvalidIncludedLevels { attribute } => write!(
                f,
                "Attribute \"{}\" is an included/not-included toggle; its levels are fixed.",
                attribute
            ),
        }
    }
}
