use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wanimirror_cli::config::Config;
use wanimirror_cli::serve::{self, AppState};
use wanimirror_client::WaniKaniClient;
use wanimirror_storage::{migrations, MirrorStore, SqliteStore};
use wanimirror_sync::query::QueryService;
use wanimirror_sync::{SyncError, SyncService, Upstream};

/// Personal mirror of a WaniKani account: periodic pull, local SQLite
/// store, bearer-authenticated read API.
#[derive(Parser)]
#[command(name = "wanimirror", version, about = "Personal WaniKani progress mirror")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations and start the read/trigger API server (default)
    Serve,
    /// Run one full sync and exit non-zero if any step failed
    Sync,
    /// Apply pending schema migrations and print the final version
    Migrate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            process::exit(1);
        }
    };
    init_tracing(&config.log_level);

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => cmd_serve(config).await,
        Commands::Sync => cmd_sync(config).await,
        Commands::Migrate => cmd_migrate(config).await,
    };
    if let Err(error) = result {
        tracing::error!(error = %error, "fatal");
        process::exit(1);
    }
}

fn init_tracing(level: &str) {
    // RUST_LOG overrides LOG_LEVEL for per-module filtering.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn cmd_serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteStore::open(&config.database_path).await?);
    let version = migrations::current_version(store.pool()).await?;
    tracing::info!(version, path = %config.database_path, "store ready");

    if config.local_api_token.is_none() {
        tracing::warn!("LOCAL_API_TOKEN is not set; the read API is open");
    }

    let client = Arc::new(WaniKaniClient::new(config.wanikani_api_token.clone()));
    let sync = Arc::new(SyncService::new(store.clone(), client));
    let state = Arc::new(AppState {
        store: store.clone(),
        sync: sync.clone(),
        query: QueryService::new(store.clone()),
        local_api_token: config.local_api_token.clone(),
    });

    if config.sync_interval_minutes > 0 {
        spawn_periodic_sync(sync, config.sync_interval_minutes);
    }

    serve::start_server(state, config.api_port).await?;
    store.close().await;
    Ok(())
}

/// Background schedule: an immediate sync on startup, then one per
/// interval. A tick that collides with a manual sync is skipped.
fn spawn_periodic_sync<S: MirrorStore, U: Upstream>(
    sync: Arc<SyncService<S, U>>,
    interval_minutes: u64,
) {
    tokio::spawn(async move {
        let period = Duration::from_secs(interval_minutes * 60);
        tracing::info!(interval_minutes, "scheduled sync enabled");
        loop {
            match sync.sync_all().await {
                Ok(run) if run.is_success() => {
                    tracing::info!("scheduled sync complete");
                }
                Ok(run) => {
                    tracing::warn!(error = ?run.error, "scheduled sync failed");
                }
                Err(SyncError::InProgress) => {
                    tracing::info!("scheduled sync skipped, another sync is running");
                }
                Err(error) => {
                    tracing::warn!(error = %error, "scheduled sync could not start");
                }
            }
            tokio::time::sleep(period).await;
        }
    });
}

async fn cmd_sync(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteStore::open(&config.database_path).await?);
    let client = Arc::new(WaniKaniClient::new(config.wanikani_api_token.clone()));
    let sync = SyncService::new(store.clone(), client);

    let run = sync.sync_all().await?;
    for result in &run.results {
        match &result.error_message {
            None => println!(
                "{:<12} {:>6} records  ok",
                result.data_type.as_str(),
                result.records_updated
            ),
            Some(message) => println!("{:<12}      -  failed: {message}", result.data_type.as_str()),
        }
    }
    store.close().await;

    match run.error {
        None => Ok(()),
        Some(error) => Err(error.into()),
    }
}

async fn cmd_migrate(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open(&config.database_path).await?;
    let version = migrations::current_version(store.pool()).await?;
    println!("schema version {version} ({})", config.database_path);
    store.close().await;
    Ok(())
}
