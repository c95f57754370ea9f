//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use kgpipe_core::{CollectConfig, CollectResult, ProgressReporter};
use kgpipe_datasets::{DatasetPromoter, OverwritePolicy, PromotionOutcome, Selection};
use kgpipe_runs::{LoggerRegistry, RunManager};
use kgpipe_shared::{KgPipeError, ProcessEnv, RunStatus, Settings, runs_base_dir};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kgpipe: knowledge-graph pipeline runs and datasets.
#[derive(Parser)]
#[command(
    name = "kgpipe",
    version,
    about = "Manage knowledge-graph pipeline runs, collect corpora, and promote datasets.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Run management.
    Run {
        #[command(subcommand)]
        action: RunAction,
    },

    /// Search the web for each query and write GraphRAG input files into a new run.
    Collect {
        /// Search queries.
        #[arg(required = true)]
        queries: Vec<String>,

        /// Optional run name appended to the run id.
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        runs: RunsDir,

        /// Fetch the source page when a search result has too little text.
        #[arg(long)]
        fetch_pages: bool,
    },

    /// Promote generated datasets to the final dataset directory.
    Promote(PromoteArgs),

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Run subcommands.
#[derive(Subcommand)]
pub(crate) enum RunAction {
    /// Create a new run directory.
    New {
        /// Optional run name appended to the run id.
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        runs: RunsDir,
    },
    /// List recorded runs, oldest first.
    List {
        #[command(flatten)]
        runs: RunsDir,

        /// Print the raw records as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Where runs live.
#[derive(Args)]
pub(crate) struct RunsDir {
    /// Runs base directory (defaults to $KGPIPE_RUNS_DIR or ./runs).
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Directory holding template assets (graphrag_data/prompts).
    #[arg(long, default_value = ".")]
    templates: PathBuf,
}

impl RunsDir {
    fn resolve(&self) -> Result<PathBuf> {
        match &self.base_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(runs_base_dir(&ProcessEnv)?),
        }
    }

    fn manager(&self) -> Result<RunManager> {
        Ok(RunManager::new(self.resolve()?, Arc::new(LoggerRegistry::new()))
            .with_template_root(&self.templates))
    }
}

/// Promotion flags. Without a selection flag the promotion is interactive.
#[derive(Args)]
#[command(group = clap::ArgGroup::new("selection").args(["all", "index", "file"]))]
pub(crate) struct PromoteArgs {
    /// Staging directory.
    #[arg(long, default_value = kgpipe_datasets::DEFAULT_STAGING_DIR)]
    staging: PathBuf,

    /// Final dataset directory.
    #[arg(long = "final", default_value = kgpipe_datasets::DEFAULT_FINAL_DIR)]
    final_dir: PathBuf,

    /// Promote every staged file.
    #[arg(long)]
    all: bool,

    /// Promote the file with this number in the listing (1-based).
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    index: Option<u64>,

    /// Promote the staged file with this name.
    #[arg(long)]
    file: Option<String>,

    /// Replace existing files in the final directory.
    #[arg(long)]
    overwrite: bool,
}

impl PromoteArgs {
    fn selection(&self) -> Option<Selection> {
        if self.all {
            Some(Selection::All)
        } else if let Some(index) = self.index {
            Some(Selection::Index(index as usize - 1))
        } else {
            self.file.clone().map(Selection::Name)
        }
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show resolved settings with API keys masked.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kgpipe=info",
        1 => "kgpipe=debug",
        _ => "kgpipe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
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
    match cli.command {
        Command::Run { action } => match action {
            RunAction::New { name, runs } => cmd_run_new(name.as_deref(), &runs),
            RunAction::List { runs, json } => cmd_run_list(&runs, json),
        },
        Command::Collect {
            queries,
            name,
            runs,
            fetch_pages,
        } => cmd_collect(queries, name.as_deref(), &runs, fetch_pages).await,
        Command::Promote(args) => cmd_promote(&args),
        Command::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Run commands
// ---------------------------------------------------------------------------

fn cmd_run_new(name: Option<&str>, runs: &RunsDir) -> Result<()> {
    let mut manager = runs.manager()?.with_console(false);
    let run_id = manager.create_new_run(name)?;
    let paths = manager.get_run_paths()?;

    println!();
    println!("  Run created!");
    println!("  ID:   {run_id}");
    println!("  Path: {}", paths.run_dir.display());
    println!();
    Ok(())
}

fn cmd_run_list(runs: &RunsDir, json: bool) -> Result<()> {
    let base_dir = runs.resolve()?;
    let records = RunManager::list_runs(&base_dir);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No runs recorded in {}", base_dir.display());
        return Ok(());
    }

    println!("{:<40} {:<10} {:<20} {}", "RUN", "STATUS", "CREATED", "COMPLETED");
    for record in &records {
        let completed = record
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<40} {:<10} {:<20} {}",
            record.run_id.to_string(),
            record.status.to_string(),
            record.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            completed
        );
        if record.status == RunStatus::Failed {
            if let Some(message) = &record.error_message {
                println!("{:<40} error: {message}", "");
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Collect
// ---------------------------------------------------------------------------

async fn cmd_collect(
    queries: Vec<String>,
    name: Option<&str>,
    runs: &RunsDir,
    fetch_pages: bool,
) -> Result<()> {
    let mut manager = runs.manager()?.with_console(false);
    let run_id = manager.create_new_run(name)?;
    let paths = manager.get_run_paths()?;

    info!(%run_id, queries = queries.len(), "collecting corpus");

    let outcome = async {
        let settings = Settings::for_run(&paths)?;
        let mut config = CollectConfig::from_settings(queries, &settings)?;
        config.fetch_pages = fetch_pages;

        let reporter = CliProgress::new();
        kgpipe_core::collect(&config, &settings, &manager, &reporter).await
    }
    .await;

    match outcome {
        Ok(result) => {
            manager.complete_run(true, None)?;

            println!();
            println!("  Collection complete!");
            println!("  Run:       {run_id}");
            println!("  Documents: {}", result.documents.len());
            println!("  Discarded: {}", result.discarded);
            println!("  Input:     {}", paths.graphrag_input.display());
            if let Some(file) = &result.result_file {
                println!("  Summary:   {}", file.display());
            }
            println!("  Time:      {:.1}s", result.elapsed_ms as f64 / 1000.0);
            println!();
            Ok(())
        }
        Err(e) => {
            error!(%run_id, error = %e, "collection failed");
            manager.complete_run(false, Some(&e.to_string()))?;
            Err(e.into())
        }
    }
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
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn query_done(&self, query: &str, current: usize, total: usize, kept: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {query}: {kept} documents"));
    }

    fn done(&self, _result: &CollectResult) {
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

// ---------------------------------------------------------------------------
// Promote
// ---------------------------------------------------------------------------

fn cmd_promote(args: &PromoteArgs) -> Result<()> {
    let promoter = DatasetPromoter::new(&args.staging, &args.final_dir);

    let Some(selection) = args.selection() else {
        let stdin = std::io::stdin();
        promoter.run_interactive(stdin.lock(), std::io::stdout())?;
        return Ok(());
    };

    let policy = if args.overwrite {
        OverwritePolicy::Always
    } else {
        OverwritePolicy::Never
    };

    match promote_selected(&promoter, &selection, policy) {
        Ok(()) => Ok(()),
        Err(KgPipeError::Validation { message }) => {
            println!("error: {message}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn promote_selected(
    promoter: &DatasetPromoter,
    selection: &Selection,
    policy: OverwritePolicy,
) -> kgpipe_shared::Result<()> {
    let files = promoter.list()?;
    if files.is_empty() {
        println!("no .jsonl files in {}", promoter.staging_dir().display());
        return Ok(());
    }

    match promoter.promote(&files, selection, policy, |_| Some(false))? {
        PromotionOutcome::Completed(report) => {
            for name in &report.skipped {
                println!("  skipped (exists): {name}");
            }
            for name in &report.promoted {
                println!("  promoted: {name} -> {}", display_dir(promoter.final_dir()));
            }
            println!("{}", report.summary());
        }
        PromotionOutcome::Cancelled => println!("cancelled"),
    }
    Ok(())
}

fn display_dir(dir: &Path) -> String {
    std::path::absolute(dir)
        .unwrap_or_else(|_| dir.to_path_buf())
        .display()
        .to_string()
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config_show() -> Result<()> {
    let settings = Settings::from_env()?;
    let toml_str = toml::to_string_pretty(&settings.redacted())
        .map_err(|e| eyre!("failed to render settings: {e}"))?;
    println!("{toml_str}");
    Ok(())
}
