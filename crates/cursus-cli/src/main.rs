//! cursus CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use cursus_core::insight::InsightKind;

mod commands;

#[derive(Parser)]
#[command(
    name = "cursus",
    version,
    about = "Academic evaluation and deliberation boards"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one student's transcript and evaluation
    Evaluate {
        /// Path to a cohort .toml file or directory
        #[arg(long)]
        cohort: PathBuf,

        /// Student ID
        #[arg(long)]
        student: String,

        /// Target average for a grade goal simulation
        #[arg(long)]
        goal: Option<f64>,

        /// Coefficients still to be graded, used with --goal
        #[arg(long, default_value = "1")]
        remaining_weight: u32,

        /// Ask the insight provider for personal advice
        #[arg(long)]
        advice: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Build the deliberation board of a cohort
    Board {
        /// Path to a cohort .toml file or directory
        #[arg(long)]
        cohort: PathBuf,

        /// Output format: json, html, all, none
        #[arg(long, default_value = "json")]
        format: String,

        /// Output directory (defaults to the configured output_dir)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Attach an AI dashboard summary to each board
        #[arg(long)]
        insights: bool,

        /// Insight provider name from the config
        #[arg(long)]
        provider: Option<String>,

        /// Insight model
        #[arg(long)]
        model: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate cohort TOML files
    Validate {
        /// Path to a cohort .toml file or directory
        #[arg(long)]
        cohort: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Compare two board reports
    Compare {
        /// Baseline report JSON
        #[arg(long)]
        baseline: PathBuf,

        /// Current report JSON
        #[arg(long)]
        current: PathBuf,

        /// Exit code 1 if any student's standing declined
        #[arg(long)]
        fail_on_decline: bool,

        /// Output format: text, json, markdown
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Ask the insight provider for one piece of text
    Insight {
        /// orientation, schedule, dashboard, class, student, grade-goal
        #[arg(long)]
        kind: InsightKind,

        /// Free-text context inserted into the prompt
        #[arg(long)]
        context: String,

        /// Insight provider name from the config
        #[arg(long)]
        provider: Option<String>,

        /// Insight model
        #[arg(long)]
        model: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example cohort
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn,cursus=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Evaluate {
            cohort,
            student,
            goal,
            remaining_weight,
            advice,
            config,
        } => {
            commands::evaluate::execute(cohort, student, goal, remaining_weight, advice, config)
                .await
        }
        Commands::Board {
            cohort,
            format,
            output,
            insights,
            provider,
            model,
            config,
        } => {
            commands::board::execute(cohort, format, output, insights, provider, model, config)
                .await
        }
        Commands::Validate { cohort, config } => commands::validate::execute(cohort, config),
        Commands::Compare {
            baseline,
            current,
            fail_on_decline,
            format,
        } => commands::compare::execute(baseline, current, fail_on_decline, format),
        Commands::Insight {
            kind,
            context,
            provider,
            model,
            config,
        } => commands::insight::execute(kind, context, provider, model, config).await,
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
