//! wshd-engine: local-first practice capture and sync service
//!
//! Records instrument input into a durable local store with no network
//! dependency, and reconciles that history with the remote store once an
//! identity is established or connectivity returns.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use wshd_common::config::{ensure_root_folder, resolve_remote_base_url, resolve_root_folder, RuntimeSettings};
use wshd_common::db::{init_database, sessions};
use wshd_common::events::EventBus;
use wshd_engine::sync::RemoteClient;
use wshd_engine::AppState;

#[derive(Parser, Debug)]
#[command(name = "wshd-engine", about = "Woodshed practice capture and sync engine")]
struct Args {
    /// Root data folder (falls back to WSHD_ROOT_FOLDER, config file, OS default)
    #[arg(long)]
    root_folder: Option<String>,

    /// Remote store base URL (falls back to WSHD_REMOTE_URL, config file, default)
    #[arg(long)]
    remote_url: Option<String>,

    /// Listen port
    #[arg(long, default_value_t = 5731)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Starting wshd-engine");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref());
    let db_path = ensure_root_folder(&root_folder)?;
    info!("Database: {}", db_path.display());

    let db = init_database(&db_path).await?;

    // Any session left active by a previous run will never time out; close it
    let closed = sessions::close_stale_sessions(&db).await?;
    if closed > 0 {
        info!(closed, "Closed stale sessions from previous run");
    }

    let settings = RuntimeSettings::load(&db).await?;

    let remote_url = resolve_remote_base_url(args.remote_url.as_deref());
    info!("Remote store: {}", remote_url);
    let remote = Arc::new(RemoteClient::new(remote_url, settings.upload_timeout_ms)?);

    let event_bus = EventBus::new(1000);
    let state = AppState::new(db, settings, event_bus, remote);

    let shutdown = CancellationToken::new();
    state.connectivity.spawn(shutdown.clone());
    wshd_engine::spawn_event_dispatcher(state.clone());

    let app = wshd_engine::build_router(state);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("Listening on http://127.0.0.1:{}", args.port);

    axum::serve(listener, app).await?;
    shutdown.cancel();

    Ok(())
}
