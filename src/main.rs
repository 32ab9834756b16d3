//! Fixhub - service-marketplace warranty core

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fixhub::{
    config::{get_data_dir, load_config},
    db::init_database,
    events::EventBus,
    sweep::{SweepConfig, Sweeper},
};

#[derive(Parser)]
#[command(name = "fixhub")]
#[command(author = "Fixhub Team")]
#[command(version = "0.1.0")]
#[command(about = "Warranty tracking, backjob disputes, and reconciliation for a service marketplace")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Database path (defaults to the platform data dir)
    #[arg(short, long)]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the reconciliation sweep daemon
    Serve,
    /// Run a single reconciliation pass and print the report
    Sweep,
    /// Initialize the database
    Init,
    /// Show configuration info
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fixhub=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config();

    // Determine database path
    let db_path = cli
        .database
        .or(config.database.path.clone())
        .unwrap_or_else(|| get_data_dir().join("data.db").to_string_lossy().to_string());

    let sweep_config = SweepConfig {
        interval: Duration::from_secs(config.sweeper.interval_seconds),
        batch_size: config.sweeper.batch_size,
    };

    match cli.command {
        Some(Commands::Init) => {
            println!("Initializing database at: {}", db_path);
            let _pool = init_database(&db_path).await?;
            println!("Database initialized successfully!");
            Ok(())
        }
        Some(Commands::Config) => {
            println!("Fixhub Configuration");
            println!("====================");
            println!("Data directory: {}", get_data_dir().display());
            println!("Database path: {}", db_path);
            println!(
                "Sweep interval: {}s (batch {})",
                config.sweeper.interval_seconds, config.sweeper.batch_size
            );
            Ok(())
        }
        Some(Commands::Sweep) => run_sweep_once(&db_path, sweep_config).await,
        _ => run_daemon(&db_path, sweep_config).await,
    }
}

async fn run_sweep_once(db_path: &str, sweep_config: SweepConfig) -> anyhow::Result<()> {
    let pool = init_database(db_path).await?;
    let sweeper = Sweeper::new(pool, EventBus::new(), sweep_config);

    match sweeper.try_run(Utc::now()).await? {
        Some(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        None => {
            println!("Sweep skipped: another run is in flight");
        }
    }

    Ok(())
}

async fn run_daemon(db_path: &str, sweep_config: SweepConfig) -> anyhow::Result<()> {
    tracing::info!("Initializing database at: {}", db_path);
    let pool = init_database(db_path).await?;

    let event_bus = EventBus::new();
    let sweeper = Arc::new(Sweeper::new(pool, event_bus, sweep_config));
    sweeper.start().await;

    tracing::info!("Reconciliation daemon running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}
