//! Scanledger CLI: run sources and inspect what they recorded.
//!
//! Usage:
//!   scanledger run [--trigger T] [--source PREFIX]... [--config F] [--db F]
//!   scanledger sources | objects PREFIX | events PREFIX
//!   scanledger annotate PREFIX PRIMARY [--secondary S] [TEXT]

use clap::{Parser, Subcommand, ValueEnum};
use scanledger::config::parse_log_level;
use scanledger::{
    load_descriptors, AppConfig, OpenStore, Orchestrator, RunTrigger, ScanState, SourceDescriptor,
    SqliteStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

const EXIT_OK: i32 = 0;
const EXIT_CONFIG: i32 = 1;
const EXIT_RUN_FAILED: i32 = 2;

const DEFAULT_CONFIG: &str = "scanledger.yaml";

#[derive(Parser)]
#[command(
    name = "scanledger",
    version,
    about = "Change detection for tabular source snapshots"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to the YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file (overrides the configuration)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Log level (overrides the configuration)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scan cycle, or the named sources
    Run {
        /// Which sources to run, by their run trigger
        #[arg(long, value_enum, default_value = "schedule")]
        trigger: Trigger,
        /// Run these sources regardless of trigger
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// List configured sources
    Sources,
    /// Print the stored objects of a source
    Objects { prefix: String },
    /// Print the events of a source
    Events { prefix: String },
    /// Set or clear the user data of an object
    Annotate {
        prefix: String,
        primary: String,
        #[arg(long, default_value = "")]
        secondary: String,
        /// New annotation; omit to clear it
        text: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Trigger {
    Once,
    Schedule,
    AlwaysAfterScan,
}

impl From<Trigger> for RunTrigger {
    fn from(t: Trigger) -> Self {
        match t {
            Trigger::Once => RunTrigger::Once,
            Trigger::Schedule => RunTrigger::Schedule,
            Trigger::AlwaysAfterScan => RunTrigger::AlwaysAfterScan,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, String> {
    match path {
        Some(path) => AppConfig::from_file(path).map_err(|e| e.to_string()),
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            AppConfig::from_file(DEFAULT_CONFIG).map_err(|e| e.to_string())
        }
        None => Ok(AppConfig::default()),
    }
}

fn init_tracing(level: &str) -> Result<(), String> {
    let level = parse_log_level(level).map_err(|e| e.to_string())?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to set tracing subscriber: {}", e))
}

fn open_store(config: &AppConfig, db: Option<PathBuf>) -> Result<Arc<SqliteStore>, String> {
    let path = db.unwrap_or_else(|| config.database_path());
    SqliteStore::open(&path)
        .map(Arc::new)
        .map_err(|e| format!("Failed to open database at {}: {}", path.display(), e))
}

fn load_sources(config: &AppConfig) -> Result<Vec<SourceDescriptor>, String> {
    if !config.sources_dir.is_dir() {
        return Ok(Vec::new());
    }
    load_descriptors(&config.sources_dir).map_err(|e| e.to_string())
}

fn report(state: &ScanState) {
    for r in &state.reports {
        match &r.execution_error {
            Some(e) => println!("{:<12}  skipped: {}", r.prefix, e),
            None => println!(
                "{:<12}  rows {:>5}  new {:>5}  updated {:>5}  events {:>5}",
                r.prefix, r.rows_received, r.inserted, r.updated, r.events_written
            ),
        }
    }
    for (prefix, e) in &state.failures {
        println!("{:<12}  FAILED: {}", prefix, e);
    }
}

async fn cmd_run(
    orchestrator: &Orchestrator<SqliteStore>,
    trigger: RunTrigger,
    sources: &[String],
) -> i32 {
    let state = if sources.is_empty() {
        orchestrator.run_cycle(trigger, |_| true).await
    } else {
        match orchestrator.run_named(sources).await {
            Ok(state) => state,
            Err(e) => {
                eprintln!("Error: {}", e);
                return EXIT_CONFIG;
            }
        }
    };
    report(&state);
    let mut failed = !state.is_success();

    if state.rescan_requested {
        info!("rescan requested; running always_after_scan sources");
        let rescan = orchestrator.run_cycle(RunTrigger::AlwaysAfterScan, |_| true).await;
        report(&rescan);
        failed |= !rescan.is_success();
    }

    if failed {
        EXIT_RUN_FAILED
    } else {
        EXIT_OK
    }
}

fn cmd_sources(descriptors: &[SourceDescriptor]) -> i32 {
    if descriptors.is_empty() {
        println!("No sources configured.");
        return EXIT_OK;
    }
    println!("{:<12}  {:<20}  {:<18}  {:<18}", "PREFIX", "NAME", "KIND", "RUN");
    println!("{}", "-".repeat(74));
    for d in descriptors {
        println!(
            "{:<12}  {:<20}  {:<18}  {:<18}",
            d.prefix,
            d.name(),
            format!("{:?}", d.kind),
            format!("{:?}", d.run)
        );
    }
    EXIT_OK
}

fn cmd_objects(store: &SqliteStore, prefix: &str) -> i32 {
    match store.objects(prefix) {
        Ok(objects) => {
            for o in objects {
                println!(
                    "{:>6}  {:<20}  {:<20}  {:<20}  {:<19}  {}",
                    o.index.unwrap_or_default(),
                    o.primary_id,
                    o.secondary_id,
                    o.status.as_str(),
                    o.changed_at,
                    o.user_data.as_deref().unwrap_or("")
                );
            }
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_CONFIG
        }
    }
}

fn cmd_events(store: &SqliteStore, prefix: &str) -> i32 {
    match store.events(prefix) {
        Ok(events) => {
            for e in events {
                match serde_json::to_string(&e) {
                    Ok(line) => println!("{}", line),
                    Err(err) => eprintln!("Error: {}", err),
                }
            }
            EXIT_OK
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_CONFIG
        }
    }
}

fn cmd_annotate(store: &SqliteStore, prefix: &str, primary: &str, secondary: &str, text: Option<&str>) -> i32 {
    match store.set_user_data(prefix, primary, secondary, text) {
        Ok(true) => {
            println!("Updated {}/{}/{}", prefix, primary, secondary);
            EXIT_OK
        }
        Ok(false) => {
            eprintln!("Error: object {}/{}/{} not found", prefix, primary, secondary);
            EXIT_CONFIG
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_CONFIG
        }
    }
}

fn run(cli: Cli) -> i32 {
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    if let Err(e) = init_tracing(level) {
        eprintln!("{}", e);
        return EXIT_CONFIG;
    }

    if let Commands::Sources = cli.command {
        return match load_sources(&config) {
            Ok(descriptors) => cmd_sources(&descriptors),
            Err(e) => {
                eprintln!("Error: {}", e);
                EXIT_CONFIG
            }
        };
    }

    let store = match open_store(&config, cli.db) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_CONFIG;
        }
    };

    match cli.command {
        Commands::Run { trigger, sources } => {
            let descriptors = match load_sources(&config) {
                Ok(descriptors) => descriptors,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return EXIT_CONFIG;
                }
            };
            info!(sources = descriptors.len(), "configuration loaded");

            let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Failed to create tokio runtime: {}", e);
                    return EXIT_CONFIG;
                }
            };
            let orchestrator = Orchestrator::new(
                store,
                Arc::new(config.settings_provider()),
                descriptors,
                config.rescan_table.clone(),
            );
            rt.block_on(cmd_run(&orchestrator, trigger.into(), &sources))
        }
        Commands::Objects { prefix } => cmd_objects(&store, &prefix),
        Commands::Events { prefix } => cmd_events(&store, &prefix),
        Commands::Annotate {
            prefix,
            primary,
            secondary,
            text,
        } => cmd_annotate(&store, &prefix, &primary, &secondary, text.as_deref()),
        Commands::Sources => EXIT_OK,
    }
}

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli));
}
