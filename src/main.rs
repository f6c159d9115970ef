// ABOUTME: CLI entry point for mysql-clickhouse-sync
// ABOUTME: Parses commands, initializes logging and routes to handlers

use clap::{Parser, Subcommand};
use mysql_clickhouse_sync::commands;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mysql-clickhouse-sync")]
#[command(about = "Replicate MySQL tables into ClickHouse", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to the TOML configuration file
    #[arg(long, global = true, env = "SYNC_CONFIG", default_value = "sync.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run sync passes until interrupted
    Run {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },
    /// Verify that MySQL and ClickHouse are reachable
    Check,
    /// Show the persisted sync state of every configured table
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = mysql_clickhouse_sync::Config::load(&cli.config)?;

    match cli.command {
        Commands::Run { once } => commands::run(&config, once).await,
        Commands::Check => commands::check(&config).await,
        Commands::Status => commands::status(&config).await,
    }
}
