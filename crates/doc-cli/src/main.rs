//! Thin `clap` shell over the `commands` free functions, in the style of
//! `meilitool`'s `Cli`/`Command` pair: a top-level `db_path` plus a
//! subcommand enum, with every subcommand delegating to a plain function
//! that also works as a library call.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use doc_index::QueryFilter;
use doc_search::FusionMethod;
use doc_types::{Error, ExtractionMode, ProcessingOptions, SourceHandle};

mod capabilities;
mod commands;
mod config;
mod engine;

use config::Config;
use engine::Engine;

#[derive(Parser)]
#[command(author, version, about = "Document ingestion and hybrid search engine", long_about = None)]
struct Cli {
    /// Root directory for on-disk state and `config.toml` (spec §6 `paths.*`).
    #[arg(long, default_value = "data.docs/")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingests a source (path or URL) for the first time or re-ingests it
    /// under change detection (spec §4.5/§4.6).
    Add {
        source: String,
        #[command(flatten)]
        options: OptionsArgs,
    },
    /// Equivalent to `add` with change detection always enabled; `--force`
    /// removes and re-adds unconditionally.
    Update {
        source: String,
        #[command(flatten)]
        options: OptionsArgs,
        #[arg(long)]
        force: bool,
    },
    /// Removes a document by source or by `DocumentId` (spec invariant I5).
    Remove { target: String },
    /// Hybrid/vector/keyword search over indexed chunks (spec §4.8).
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        #[arg(long, value_enum)]
        method: Option<FusionMethodArg>,
        /// `hybrid.alpha`/`hybrid.rrf_k` override for this query's fusion
        /// method, when `method` needs a parameter.
        #[arg(long)]
        alpha: Option<f32>,
        #[arg(long)]
        rrf_k: Option<f64>,
        /// Restrict results to these document ids (repeatable).
        #[arg(long = "doc-id")]
        doc_ids: Vec<String>,
    },
    /// Durable job queue operations (spec §4.7).
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },
    /// Document-count and consistency overview (spec §6 `status(detailed?)`).
    Status {
        #[arg(long)]
        detailed: bool,
    },
    /// Out-of-band repair/compaction/verification (spec §4.6/§6).
    Maintenance {
        #[command(subcommand)]
        command: MaintenanceCommand,
    },
    /// Reads or rewrites the on-disk `config.toml` (spec §6 config table).
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Args)]
struct OptionsArgs {
    #[arg(long, value_enum, default_value = "auto")]
    mode: ExtractionModeArg,
    #[arg(long, default_value = "")]
    prompt: String,
    #[arg(long)]
    chunk_size: Option<usize>,
    #[arg(long)]
    chunk_overlap: Option<usize>,
}

impl OptionsArgs {
    fn into_options(self, config: &Config) -> ProcessingOptions {
        ProcessingOptions {
            mode: self.mode.into(),
            prompt: self.prompt,
            chunk_size: self.chunk_size.unwrap_or(config.chunking.size),
            chunk_overlap: self.chunk_overlap.unwrap_or(config.chunking.overlap),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExtractionModeArg {
    Datasheet,
    Generic,
    Markdown,
    Auto,
}

impl From<ExtractionModeArg> for ExtractionMode {
    fn from(mode: ExtractionModeArg) -> Self {
        match mode {
            ExtractionModeArg::Datasheet => ExtractionMode::Datasheet,
            ExtractionModeArg::Generic => ExtractionMode::Generic,
            ExtractionModeArg::Markdown => ExtractionMode::Markdown,
            ExtractionModeArg::Auto => ExtractionMode::Auto,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FusionMethodArg {
    Rrf,
    Weighted,
    Adaptive,
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Runs the Worker Pool in the foreground until stdin reaches EOF.
    Start,
    /// Shows one job (`--job-id`) or a summary of the whole queue.
    Status {
        #[arg(long)]
        job_id: Option<u64>,
    },
    /// Cancels every `Pending` job without touching `Running` ones.
    Clear,
}

#[derive(Subcommand)]
enum MaintenanceCommand {
    Repair,
    Cleanup,
    ConsistencyCheck,
}

#[derive(Subcommand)]
enum ConfigCommand {
    List,
    Get { key: String },
    Set { key: String, value: String },
    Reset,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.kind().exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    let config_path = cli.db_path.join("config.toml");
    let config = Config::load_anchored(&config_path, &cli.db_path)?;

    match cli.command {
        Command::Config { command } => return run_config(command, config, &config_path),
        _ => {}
    }

    let engine = Engine::open(config)?;
    let (requeued, replayed) = engine.scheduler.recover()?;
    tracing::info!(requeued, replayed, "startup recovery complete");

    match cli.command {
        Command::Add { source, options } => {
            let options = options.into_options(&engine.config);
            let out = commands::add(&engine, SourceHandle::parse(&source), options)?;
            print_json(&out);
        }
        Command::Update { source, options, force } => {
            let options = options.into_options(&engine.config);
            let out = commands::update(&engine, SourceHandle::parse(&source), options, force)?;
            print_json(&out);
        }
        Command::Remove { target } => {
            let out = commands::remove(&engine, &target)?;
            print_json(&out);
        }
        Command::Search { query, top_k, method, alpha, rrf_k, doc_ids } => {
            let method = method.map(|m| resolve_method(m, &engine.config, alpha, rrf_k));
            let filter = if doc_ids.is_empty() {
                QueryFilter::default()
            } else {
                QueryFilter {
                    doc_ids: Some(doc_ids.into_iter().map(doc_types::DocumentId).collect()),
                }
            };
            let out = commands::search(&engine, &query, top_k, method, filter)?;
            print_json(&out);
        }
        Command::Queue { command } => match command {
            QueueCommand::Start => commands::queue_start(&engine)?,
            QueueCommand::Status { job_id } => print_json(&commands::queue_status(&engine, job_id)?),
            QueueCommand::Clear => {
                let n = commands::queue_clear(&engine)?;
                println!("cleared {n} pending job(s)");
            }
        },
        Command::Status { detailed } => print_json(&commands::status(&engine, detailed)?),
        Command::Maintenance { command } => {
            let out = match command {
                MaintenanceCommand::Repair => commands::maintenance_repair(&engine)?,
                MaintenanceCommand::Cleanup => commands::maintenance_cleanup(&engine)?,
                MaintenanceCommand::ConsistencyCheck => commands::maintenance_consistency_check(&engine)?,
            };
            print_json(&out);
        }
        Command::Config { .. } => unreachable!("handled before engine construction"),
    }
    Ok(())
}

fn run_config(command: ConfigCommand, mut config: Config, config_path: &std::path::Path) -> Result<(), Error> {
    match command {
        ConfigCommand::List => {
            for (key, value) in config.list() {
                println!("{key} = {value}");
            }
        }
        ConfigCommand::Get { key } => match config.get(&key) {
            Some(value) => println!("{value}"),
            None => return Err(Error::InvalidOptions(format!("unknown config key: {key}"))),
        },
        ConfigCommand::Set { key, value } => {
            config.set(&key, &value)?;
            config.save(config_path)?;
        }
        ConfigCommand::Reset => {
            config.reset();
            config.save(config_path)?;
        }
    }
    Ok(())
}

fn resolve_method(
    method: FusionMethodArg,
    config: &Config,
    alpha: Option<f32>,
    rrf_k: Option<f64>,
) -> FusionMethod {
    match method {
        FusionMethodArg::Rrf => FusionMethod::Rrf { k_rrf: rrf_k.unwrap_or(config.hybrid.rrf_k) },
        FusionMethodArg::Weighted => FusionMethod::Weighted { alpha: alpha.unwrap_or(config.hybrid.alpha) },
        FusionMethodArg::Adaptive => FusionMethod::Adaptive,
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(_) => println!("{value}"),
    }
}
