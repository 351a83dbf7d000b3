//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use riskflow_client::HttpAnalysisClient;
use riskflow_core::{
    OutputKind, PipelineController, PipelineScripts, ProgressSink, StageOutcome, StageOutput,
    save_confirmation, save_output,
};
use riskflow_shared::{
    AppConfig, BackendSettings, Document, init_config, load_config, load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// riskflow: from requirements document to security risk report.
#[derive(Parser)]
#[command(
    name = "riskflow",
    version,
    about = "Extract, refine and approve features from a requirements document, then analyze its security risks.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.riskflow/riskflow.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Analysis backend base URL (overrides config and env).
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

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
    /// Run the interactive analysis workflow for a document.
    Run {
        /// Requirements document (PDF) to analyze.
        document: PathBuf,

        /// Directory for saved reports (defaults to [output].dir).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Generate a project summary only.
    Summarize {
        /// Requirements document (PDF) to summarize.
        document: PathBuf,

        /// Save the summary to modified_summary_report.txt.
        #[arg(long)]
        save: bool,

        /// Directory for the saved summary (defaults to [output].dir).
        #[arg(short, long)]
        out: Option<PathBuf>,
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

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "riskflow=info",
        1 => "riskflow=debug",
        _ => "riskflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let backend_url = cli.backend_url.as_deref();

    match cli.command {
        Command::Run { document, out } => {
            cmd_run(&config, backend_url, &document, out.as_deref()).await
        }
        Command::Summarize {
            document,
            save,
            out,
        } => cmd_summarize(&config, backend_url, &document, save, out.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config, backend_url).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

fn backend_settings(config: &AppConfig, backend_url: Option<&str>) -> Result<BackendSettings> {
    let settings = match backend_url {
        Some(url) => BackendSettings::resolve_with(config, Some(url))?,
        None => BackendSettings::resolve(config)?,
    };
    Ok(settings)
}

fn build_controller(config: &AppConfig, settings: &BackendSettings) -> Result<PipelineController> {
    let client = HttpAnalysisClient::new(settings)?;
    Ok(PipelineController::new(
        Arc::new(client),
        PipelineScripts::from_config(&config.progress),
    ))
}

fn output_dir(config: &AppConfig, out: Option<&Path>) -> PathBuf {
    out.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.output.dir))
}

fn read_document(path: &Path) -> Result<Document> {
    if !path.is_file() {
        return Err(eyre!("no document found at '{}'", path.display()));
    }
    Ok(Document::from_path(path)?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config: &AppConfig,
    backend_url: Option<&str>,
    document: &Path,
    out: Option<&Path>,
) -> Result<()> {
    let settings = backend_settings(config, backend_url)?;
    let controller = build_controller(config, &settings)?;
    let document = read_document(document)?;

    info!(
        base_url = %settings.base_url,
        project = %document.project_name,
        "starting analysis session"
    );

    crate::repl::run_session(&controller, document, &output_dir(config, out)).await
}

async fn cmd_summarize(
    config: &AppConfig,
    backend_url: Option<&str>,
    document: &Path,
    save: bool,
    out: Option<&Path>,
) -> Result<()> {
    let settings = backend_settings(config, backend_url)?;
    let controller = build_controller(config, &settings)?;
    let document = read_document(document)?;

    let cancel = CancelOnCtrlC::new();
    let output = controller
        .summarize(&document, &CliProgress::new(), cancel.token())
        .await;
    print_output(&output);

    match output.outcome {
        StageOutcome::Completed | StageOutcome::Degraded => {
            if save {
                let path = save_output(&output_dir(config, out), OutputKind::Summary, &output.text)?;
                println!("  {} ({})", save_confirmation(OutputKind::Summary), path.display());
            }
            Ok(())
        }
        _ => Err(eyre!("{}", output.status)),
    }
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig, backend_url: Option<&str>) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");

    let settings = backend_settings(config, backend_url)?;
    println!("# resolved backend: {}", settings.base_url);
    Ok(())
}

// ---------------------------------------------------------------------------
// Output rendering
// ---------------------------------------------------------------------------

/// Print a stage output the way the workflow presents it.
pub(crate) fn print_output(output: &StageOutput) {
    println!();
    println!("  {}:", output.kind.label());
    for line in output.text.lines() {
        println!("    {line}");
    }
    if output.status != output.text {
        println!();
        println!("  {}", output.status);
    }
    println!();
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cancels its token when Ctrl-C is pressed while it is alive.
pub(crate) struct CancelOnCtrlC {
    token: CancellationToken,
    watcher: JoinHandle<()>,
}

impl CancelOnCtrlC {
    pub(crate) fn new() -> Self {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                trigger.cancel();
            }
        });
        Self { token, watcher }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for CancelOnCtrlC {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

// ---------------------------------------------------------------------------
// CLI progress sink
// ---------------------------------------------------------------------------

/// CLI progress sink using an indicatif spinner.
pub(crate) struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressSink for CliProgress {
    fn phase(&self, index: usize, total: usize, label: &str) {
        self.spinner
            .set_message(format!("[{}/{total}] {label}", index + 1));
    }

    fn finished(&self, _status: &str) {
        self.spinner.finish_and_clear();
    }
}
