//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use learnpath_core::{BuildOutcome, LearningPathService, PathRequest, ProgressReporter};
use learnpath_shared::{AppConfig, WeightVector, init_config, load_config, load_config_from};
use tracing::info;

use crate::routes::{self, AppState};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LearnPath: adaptive learning paths through documentation.
#[derive(Parser)]
#[command(
    name = "learnpath",
    version,
    about = "Build concept graphs from documentation and find learning paths through them.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.learnpath/learnpath.toml).
    #[arg(long, global = true, env = "LEARNPATH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the HTTP service.
    Serve {
        /// Bind address (overrides `server.host`).
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides `server.port`).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Build a concept graph and print its summary.
    Build {
        /// Document URLs to ingest.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Build a concept graph and find a learning path through it.
    Path {
        /// Concept to start from.
        #[arg(long)]
        start: String,

        /// Concept to reach.
        #[arg(long)]
        goal: String,

        /// Weights as time,cognitive,prereq,interest (e.g. 0.3,0.3,0.2,0.2).
        #[arg(long)]
        weights: Option<String>,

        /// Document URLs to ingest.
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "learnpath=info,tower_http=info",
        1 => "learnpath=debug,tower_http=debug",
        _ => "learnpath=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve { host, port } => cmd_serve(resolve_config(cli.config)?, host, port).await,
        Command::Build { urls } => cmd_build(resolve_config(cli.config)?, &urls).await,
        Command::Path {
            start,
            goal,
            weights,
            urls,
        } => {
            let config = resolve_config(cli.config)?;
            cmd_path(config, &start, &goal, weights.as_deref(), &urls).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(cli.config).await,
        },
    }
}

fn resolve_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = routes::router(AppState::new(config)?);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre!("cannot bind {addr}: {e}"))?;
    info!(%addr, "learning path service listening");
    println!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}

async fn cmd_build(config: AppConfig, urls: &[String]) -> Result<()> {
    let service = LearningPathService::new(config)?;

    info!(urls = urls.len(), "building concept graph");
    let reporter = CliProgress::new();
    let outcome = service.build_graph(urls, &reporter).await?;

    print_outcome(&outcome);
    Ok(())
}

async fn cmd_path(
    config: AppConfig,
    start: &str,
    goal: &str,
    weights: Option<&str>,
    urls: &[String],
) -> Result<()> {
    let weights = weights.map(WeightVector::parse_csv).transpose()?;
    let service = LearningPathService::new(config)?;

    let reporter = CliProgress::new();
    let outcome = service.build_graph(urls, &reporter).await?;
    let Some(graph_id) = outcome.graph_id else {
        print_outcome(&outcome);
        return Err(eyre!("no topics found in the given URLs"));
    };

    let request = PathRequest {
        weights,
        graph_id: Some(graph_id),
        ..PathRequest::new(start, goal)
    };
    let path = service.find_path(&request).await?;

    println!();
    println!("  {}", path.path.join(" -> "));
    println!("  Hops: {}", path.hops);
    println!("  Cost: {:.4}", path.cost);
    println!();
    Ok(())
}

fn print_outcome(outcome: &BuildOutcome) {
    println!();
    match outcome.graph_id {
        Some(id) => println!("  Graph:    {id}"),
        None => println!("  No topics found."),
    }
    println!("  Concepts: {}", outcome.nodes.len());
    println!("  Edges:    {}", outcome.edges.len());
    if !outcome.warnings.is_empty() {
        println!("  Skipped:");
        for warning in &outcome.warnings {
            println!("    {} ({})", warning.url, warning.message);
        }
    }
    println!();
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<PathBuf>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _outcome: &BuildOutcome) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}
