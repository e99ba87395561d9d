//! CLI entry point for the tripleviz triple store.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use tripleviz_core::{LogConfig, TriplevizConfig};
use tripleviz_graph::{GraphError, GraphStore};

mod commands;

use commands::Command;

#[derive(Parser)]
#[command(name = "tripleviz")]
#[command(about = "Graph visualization data kept as subject/predicate/object triples")]
struct Cli {
    /// Config file prefix (default: tripleviz).
    #[arg(short, long, default_value = "tripleviz", global = true)]
    config: String,

    /// SQLite database file. Overrides `store.path` from config.
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Exit status for a missing graph, node, edge, or visibility set.
const EXIT_NOT_FOUND: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log);

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let not_found = e
                .downcast_ref::<GraphError>()
                .is_some_and(GraphError::is_not_found);
            if !not_found {
                tracing::error!(error = %e, "Command failed");
            }
            eprintln!("Error: {e:#}");
            if not_found {
                ExitCode::from(EXIT_NOT_FOUND)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<TriplevizConfig> {
    let mut config = TriplevizConfig::load(&cli.config)?;
    if let Some(db) = &cli.db {
        config.store.path = Some(db.clone());
        config.validate()?;
    }
    Ok(config)
}

fn init_tracing(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(command: Command, config: &TriplevizConfig) -> anyhow::Result<()> {
    if config.store.path.is_none() {
        tracing::warn!("No store.path configured; using an in-memory store, nothing will persist");
    }
    let store = GraphStore::open(&config.store)?.with_query_config(config.query);
    let output = commands::execute(&store, command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
