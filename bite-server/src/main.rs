//! Bite Share matching server
//!
//! Matches surplus food donations with requesters and streams volunteer
//! positions to observers while a delivery is in flight.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use bite_core::clock::SystemClock;
use bite_core::config::{ConfigStore, SweeperConfig};
use bite_core::directory::{PgUserDirectory, UserDirectory};
use bite_core::events::engine_event_channel;
use bite_core::matching::MatchingApi;
use bite_core::processors::LifecycleSweeper;
use bite_core::store::{EntityStore, MemoryStore, PgStore};
use bite_core::tracking::TrackingHub;
use clap::Parser;
use config::runtime::DirectorySettings;
use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Bite Share - food donation matching and live delivery tracking
#[derive(Parser, Debug)]
#[command(name = "bite-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./bite-config.toml", env = "BITE_CONFIG")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Keep all state in memory instead of PostgreSQL (development only)
    #[arg(long, default_value = "false")]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting bite-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let (store, directory, db_pool) = if args.in_memory {
        tracing::warn!("Running with in-memory storage; all state is lost on exit");
        let DirectorySettings::Static(directory) = loaded_config.directory else {
            anyhow::bail!("--in-memory requires directory.source = \"static\"");
        };
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let directory: Arc<dyn UserDirectory> = Arc::new(directory);
        (store, directory, None)
    } else {
        let db_pool = connect_database(args.migrate).await?;
        let store: Arc<dyn EntityStore> = Arc::new(PgStore::new(db_pool.clone()));
        let directory: Arc<dyn UserDirectory> = match loaded_config.directory {
            DirectorySettings::Database => Arc::new(PgUserDirectory::new(db_pool.clone())),
            DirectorySettings::Static(directory) => Arc::new(directory),
        };
        (store, directory, Some(db_pool))
    };

    let (events_tx, _events_rx) = engine_event_channel();
    let clock = Arc::new(SystemClock);
    let hub = Arc::new(TrackingHub::new(loaded_config.engine.hub));
    let api = Arc::new(MatchingApi::new(
        store.clone(),
        directory,
        hub,
        clock.clone(),
        events_tx.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_config = ConfigStore::<SweeperConfig>::new(loaded_config.engine.sweeper);
    let sweeper = LifecycleSweeper::new(store, clock, events_tx.clone());
    let sweeper_handle = tokio::spawn(sweeper.run(
        shutdown_rx.clone(),
        sweeper_config.clone(),
        sweeper_config.subscribe(),
    ));

    let state = AppState::new(api, events_tx, loaded_config.auth, shutdown_rx);

    let reload_notify =
        spawn_config_reload_handler(state.clone(), config_loader, sweeper_config);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop background work before tearing down storage.
    reload_notify.notify_one();
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_handle.await {
        tracing::error!(error = %e, "Sweeper task panicked");
    }

    if let Some(db_pool) = db_pool {
        tracing::info!("Closing database connections...");
        db_pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

async fn connect_database(migrate: bool) -> anyhow::Result<PgPool> {
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    Ok(db_pool)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
