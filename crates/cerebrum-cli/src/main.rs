//! `cerebrum` — the §6 CLI surface over `cerebrum-core`: `run`,
//! `ingest-file <path>`, `compact-store`, `dump-q`, `verify-consensus`.
//!
//! Exit codes follow spec.md §6 exactly: 0 OK, 1 config error, 2 store
//! open failure, 3 ingest failure in batch mode.

mod peers;

use cerebrum_core::config::{Config, LogLevel};
use cerebrum_core::ingest::IngestConfig;
use cerebrum_core::llm::MockLlmAdapter;
use cerebrum_core::orchestrator::Orchestrator;
use cerebrum_core::store::Store;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cerebrum")]
#[command(version = cerebrum_core::VERSION)]
#[command(about = "Cognition pipeline and knowledge store CLI for the Cerebrum assistant core")]
struct Cli {
    /// Overrides `CL_STORE_DIR` for this invocation.
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the pipeline: opens the store, loads the Q-table and ANN
    /// index, and ticks C1–C8 on the pipeline thread until killed.
    Run,
    /// Ingests a single capsule envelope (JSON) from disk through the
    /// full C10 stage sequence.
    IngestFile {
        /// Path to a `CapsuleEnvelope` JSON document.
        path: PathBuf,
        /// Sender id to verify/decrypt under; must be present in
        /// `<store_dir>/peers.json`.
        #[arg(long, default_value = "local")]
        sender_id: String,
    },
    /// Vacuums the KV store and re-snapshots the ANN index.
    CompactStore,
    /// Prints every `(state_key -> {action: value})` record in the
    /// Q-table sub-store as JSON lines.
    DumpQ,
    /// Recomputes the consensus root from durable leaves and compares
    /// it to the stored root.
    VerifyConsensus,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {e}", "config error:".red().bold());
            return ExitCode::from(1);
        }
    };
    if let Some(dir) = cli.store_dir {
        config.store_dir = dir;
    }

    init_tracing(config.log_level);

    match run_command(cli.command, config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}

fn init_tracing(level: LogLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_filter_directive()));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn run_command(command: Commands, config: Config) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Run => cmd_run(config),
        Commands::IngestFile { path, sender_id } => cmd_ingest_file(config, &path, &sender_id),
        Commands::CompactStore => cmd_compact_store(config),
        Commands::DumpQ => cmd_dump_q(config),
        Commands::VerifyConsensus => cmd_verify_consensus(config),
    }
}

fn open_store(config: &Config) -> anyhow::Result<Arc<Store>> {
    std::fs::create_dir_all(&config.store_dir)?;
    Ok(Arc::new(Store::open(&config.vector_store_dir())?))
}

fn cmd_run(config: Config) -> anyhow::Result<ExitCode> {
    let store = open_store(&config)?;
    let peer_entries = peers::load_peer_entries(&config.store_dir)?;
    let orchestrator = Orchestrator::new(config, store, Arc::new(MockLlmAdapter));

    if let Err(e) = orchestrator.load_q_table() {
        tracing::warn!(error = %e, "failed to load persisted q-table, starting empty");
    }
    for entry in &peer_entries {
        orchestrator.register_peer(&entry.sender_id, entry.verifying_key.to_owned(), entry.symmetric_key);
    }

    println!("{}", "cerebrum pipeline starting".green().bold());
    println!("store: {}", orchestrator.config().store_dir.display());

    let (pipeline_thread, autosave_thread) = orchestrator.spawn_background_threads();
    pipeline_thread.join().map_err(|_| anyhow::anyhow!("pipeline thread panicked"))?;
    autosave_thread.join().map_err(|_| anyhow::anyhow!("autosave thread panicked"))?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_ingest_file(config: Config, path: &std::path::Path, sender_id: &str) -> anyhow::Result<ExitCode> {
    let store = open_store(&config)?;
    let peer_entries = peers::load_peer_entries(&config.store_dir)?;
    let registry = peers::build_registry(&peer_entries);
    let envelope_json = std::fs::read_to_string(path)?;
    let ingest_config = IngestConfig::default();

    let report = cerebrum_core::ingest::ingest(
        &store,
        &registry,
        &ingest_config,
        &envelope_json,
        sender_id,
        &std::collections::HashMap::new(),
    );

    println!("{}", serde_json::to_string_pretty(&ReportView::from(&report))?);

    match report.result {
        cerebrum_core::ingest::IngestResult::Success | cerebrum_core::ingest::IngestResult::AlreadyExists => {
            Ok(ExitCode::SUCCESS)
        }
        _ => Ok(ExitCode::from(3)),
    }
}

fn cmd_compact_store(config: Config) -> anyhow::Result<ExitCode> {
    let store = open_store(&config)?;
    store.compact()?;
    println!("{}", "store compacted".green());
    Ok(ExitCode::SUCCESS)
}

fn cmd_dump_q(config: Config) -> anyhow::Result<ExitCode> {
    let store = open_store(&config)?;
    for key in store.iterate_q_keys()? {
        if let Some(blob) = store.get_q(&key)? {
            println!("{}", serde_json::json!({ "state_key": key, "actions": serde_json::from_str::<serde_json::Value>(&blob).unwrap_or(serde_json::Value::Null) }));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_verify_consensus(config: Config) -> anyhow::Result<ExitCode> {
    let store = open_store(&config)?;
    let ok = store.verify_consensus()?;
    if ok {
        println!("{}", "consensus root verified".green().bold());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}", "consensus root MISMATCH".red().bold());
        Ok(ExitCode::from(1))
    }
}

#[derive(serde::Serialize)]
struct ReportView {
    result: String,
    capsule_id: Option<String>,
    sanitization_applied: bool,
    detail: String,
}

impl From<&cerebrum_core::ingest::IngestReport> for ReportView {
    fn from(r: &cerebrum_core::ingest::IngestReport) -> Self {
        Self {
            result: format!("{:?}", r.result),
            capsule_id: r.capsule_id.clone(),
            sanitization_applied: r.sanitization_applied,
            detail: r.detail.clone(),
        }
    }
}
