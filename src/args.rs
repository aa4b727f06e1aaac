use clap::Parser;

/// Conjoint survey analysis for subscription-plan pricing.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The survey workbook (.xlsx) holding the Attributes, Design,
    /// Responses and Donate worksheets.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (opaque token) A signed project key resolving to the workbook and survey id.
    /// Requires the PLANBUILDER_SECRET environment variable. Alternative to --input.
    #[clap(short, long, value_parser)]
    pub project_key: Option<String>,

    /// Survey identifier used to namespace design rows inside the workbook.
    #[clap(short, long, value_parser, default_value = "survey1")]
    pub survey: String,

    /// (file path) A JSON analysis configuration (numPlans, pricingStrategy, goal,
    /// numTasks, altsPerTask). Individual flags below override it.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path, 'stdout' or empty) Where to write the analysis bundle in JSON format.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference bundle in JSON format. If provided, planbuilder will
    /// check that the computed bundle matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path) Where to write the generated design rows in JSON format, when a
    /// design was generated during this run.
    #[clap(long, value_parser)]
    pub design_out: Option<String>,

    /// Number of pricing plans to synthesize (1-10, default 3).
    #[clap(long, value_parser)]
    pub num_plans: Option<usize>,

    /// Pricing strategy: 'submitted' or 'suggested'.
    #[clap(long, value_parser)]
    pub pricing_strategy: Option<String>,

    /// Optimization goal: 'revenue' or 'purchases'.
    #[clap(long, value_parser)]
    pub goal: Option<String>,

    /// Number of choice tasks when a design has to be generated (1-10, default 5).
    #[clap(long, value_parser)]
    pub num_tasks: Option<u32>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
