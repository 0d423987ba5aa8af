//! Sleuth CLI: run one research question from the terminal.

mod render;

use anyhow::Context;
use clap::Parser;
use sleuth_core::research::{ResearchCallback, ResearchPhase, ResearchService};
use sleuth_core::{QualityThreshold, ResourceContext, build_collaborators, load_config};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// How long in-flight searches get to finish on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Sleuth: iterative web research with quality-filtered sources
#[derive(Parser, Debug)]
#[command(name = "sleuth", version, about, long_about = None)]
struct Cli {
    /// Research question
    #[arg(required_unless_present = "show_config")]
    question: Option<String>,

    /// Number of initial search queries
    #[arg(long)]
    queries: Option<usize>,

    /// Maximum follow-up research loops
    #[arg(long)]
    loops: Option<usize>,

    /// Model used for reflection and the final answer
    #[arg(short, long)]
    model: Option<String>,

    /// Source quality threshold: any, medium, high, or a number in [0, 1]
    #[arg(long)]
    threshold: Option<QualityThreshold>,

    /// Print the full outcome as JSON
    #[arg(long)]
    json: bool,

    /// Workspace directory (for .sleuth/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,
}

/// Logs phase changes so long runs show progress on stderr.
struct LogProgress;

impl ResearchCallback for LogProgress {
    fn on_phase_change(&self, phase: &ResearchPhase, progress: f32) {
        tracing::info!(
            phase = phase.name(),
            progress = format!("{:.0}%", progress * 100.0),
            "Research progress"
        );
    }

    fn on_search_round(&self, loop_index: usize, succeeded: usize, failed: usize) {
        if failed > 0 {
            tracing::warn!(loop_index, succeeded, failed, "Some searches failed");
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "sleuth", "sleuth")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "sleuth.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut config = load_config(Some(workspace.as_path()))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Apply CLI overrides
    if let Some(queries) = cli.queries {
        config.research.initial_search_query_count = queries;
    }
    if let Some(loops) = cli.loops {
        config.research.max_research_loops = loops;
    }
    if let Some(threshold) = cli.threshold {
        config.research.quality_threshold = threshold;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if cli.show_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }
    let question = cli.question.unwrap_or_default();

    let resources = ResourceContext::start(&config).context("Failed to start worker pool")?;
    let collaborators = build_collaborators(&config, resources.http().clone())
        .context("Failed to set up research collaborators")?;
    let service = ResearchService::with_callback(
        resources,
        collaborators,
        &config.research,
        Arc::new(LogProgress),
    );

    let mut request = service.request(question);
    if let Some(model) = cli.model {
        request = request.with_model(model);
    }

    let result = service.conduct_research(request);
    service.shutdown(SHUTDOWN_GRACE);
    let outcome = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{}", render::render_outcome(&outcome));
    }
    Ok(())
}
