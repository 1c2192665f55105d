use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use draftgate_core::{GateConfig, Threshold, analyze, fix};
use draftgate_oracle::{CommandOracle, QualityOracle};
use draftgate_runner::{Gate, StopSignal, run_batch};
use draftgate_store::{Journal, load_document, save_document, summarize};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod report;

/// Quality gate for generated article drafts.
#[derive(Parser, Debug)]
#[command(name = "draftgate", version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "DRAFTGATE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Minimum passing score, in (0, 1]
    #[arg(long, env = "DRAFTGATE_THRESHOLD", global = true)]
    threshold: Option<f64>,

    /// Oracle scorings per document, initial one included
    #[arg(long, env = "DRAFTGATE_MAX_ATTEMPTS", global = true)]
    max_attempts: Option<u32>,

    /// Result journal (NDJSON)
    #[arg(long, env = "DRAFTGATE_JOURNAL", global = true)]
    journal: Option<PathBuf>,

    #[arg(long, global = true)]
    oracle_timeout_secs: Option<u64>,

    /// Documents processed in parallel by `run`
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze documents and list rubric issues
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Apply one fix pass without scoring
    Fix {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print the fixed document instead of writing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Score one document with the oracle
    Score { file: PathBuf },

    /// Run documents through the full score/fix loop
    Run {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },

    /// Inspect the result journal
    Journal {
        #[command(subcommand)]
        command: JournalCommand,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand, Debug)]
enum JournalCommand {
    /// Aggregate outcomes across all entries
    Summary {
        #[arg(long)]
        json: bool,
    },
    /// Show the newest entries
    Tail {
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(2);
        }
    };

    match dispatch(cli.command, config).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// File config (or defaults), then flag overrides. Frozen after this.
fn build_config(cli: &Cli) -> Result<GateConfig> {
    let mut config = match &cli.config {
        Some(path) => GateConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GateConfig::default(),
    };
    if let Some(threshold) = cli.threshold {
        config.threshold = Threshold::new(threshold)?;
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(journal) = &cli.journal {
        config.journal.path = journal.clone();
    }
    if let Some(secs) = cli.oracle_timeout_secs {
        config.oracle.timeout_secs = secs;
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    config.validate()?;
    Ok(config)
}

async fn dispatch(command: Command, config: GateConfig) -> Result<ExitCode> {
    match command {
        Command::Check { files, json } => check(&files, &config, json),
        Command::Fix { files, dry_run } => fix_files(&files, &config, dry_run),
        Command::Score { file } => score(&file, &config).await,
        Command::Run { files, json } => run(files, config, json).await,
        Command::Journal { command } => journal(command, &config),
        Command::Config => {
            print!(
                "{}",
                toml::to_string_pretty(&config).context("serializing config")?
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[derive(Serialize)]
struct CheckReport {
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    issues: Vec<draftgate_core::Issue>,
}

fn check(files: &[PathBuf], config: &GateConfig, json: bool) -> Result<ExitCode> {
    let reports: Vec<CheckReport> = files
        .iter()
        .map(|path| match load_document(path) {
            Ok(doc) => CheckReport {
                path: path.clone(),
                error: None,
                issues: analyze(&doc, &config.rubric),
            },
            Err(err) => CheckReport {
                path: path.clone(),
                error: Some(err.to_string()),
                issues: Vec::new(),
            },
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for r in &reports {
            report::print_check(&r.path, r.error.as_deref(), &r.issues);
        }
    }

    let clean = reports
        .iter()
        .all(|r| r.error.is_none() && r.issues.is_empty());
    Ok(exit_code(clean))
}

fn fix_files(files: &[PathBuf], config: &GateConfig, dry_run: bool) -> Result<ExitCode> {
    let mut ok = true;
    for path in files {
        let mut doc = match load_document(path) {
            Ok(doc) => doc,
            Err(err) => {
                eprintln!("{}: {err}", path.display());
                ok = false;
                continue;
            }
        };
        let issues = analyze(&doc, &config.rubric);
        let fixes = fix::apply(&mut doc, &issues, &config.rubric);
        report::print_fix(path, &fixes);

        if dry_run {
            print!("{}", doc.serialize());
        } else if fixes.changed() {
            save_document(&doc).with_context(|| format!("saving {}", path.display()))?;
            info!(path = %path.display(), applied = fixes.applied.len(), "fixes written");
        }
    }
    Ok(exit_code(ok))
}

async fn score(path: &Path, config: &GateConfig) -> Result<ExitCode> {
    let oracle = CommandOracle::from_config(&config.oracle);
    match oracle.score(path).await {
        Ok(score) => {
            let verdict = if config.threshold.is_met_by(score) {
                "pass"
            } else {
                "below threshold"
            };
            println!(
                "{}: {score} ({verdict}, threshold {:.2})",
                path.display(),
                config.threshold.value()
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}: {err}", path.display());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(files: Vec<PathBuf>, config: GateConfig, json: bool) -> Result<ExitCode> {
    let concurrency = config.concurrency;
    let journal = Arc::new(Journal::from_config(&config.journal));
    let oracle: Arc<dyn QualityOracle> = Arc::new(CommandOracle::from_config(&config.oracle));
    let gate = Gate::new(config, oracle).with_journal(journal);

    let stop = StopSignal::new();
    let on_interrupt = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing documents already in progress");
            on_interrupt.raise();
        }
    });

    let summary = run_batch(&gate, &files, concurrency, &stop).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        report::print_batch(&summary);
    }
    Ok(exit_code(summary.all_passed()))
}

fn journal(command: JournalCommand, config: &GateConfig) -> Result<ExitCode> {
    let journal = Journal::from_config(&config.journal);
    let entries = journal
        .read_all()
        .with_context(|| format!("reading journal {}", journal.path().display()))?;

    match command {
        JournalCommand::Summary { json } => {
            let summary = summarize(&entries);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                report::print_journal_summary(&summary);
            }
        }
        JournalCommand::Tail { count } => {
            let start = entries.len().saturating_sub(count);
            for entry in &entries[start..] {
                report::print_journal_entry(entry);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
