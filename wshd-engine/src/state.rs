//! Shared application state
//!
//! One instance per process, cloned into handlers and background tasks.
//! Components are clone-cheap handles over `Arc`-held internals.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use wshd_common::config::RuntimeSettings;
use wshd_common::events::EventBus;

use crate::capture::LifecycleManager;
use crate::export::ExportAssembler;
use crate::replay::ReplayService;
use crate::sync::engine::MigrationOptions;
use crate::sync::{ConnectivityMonitor, MigrationEngine, RemoteClient};

/// Default grace window for the cosmetic "back online" flag
const OFFLINE_GRACE_WINDOW: Duration = Duration::from_secs(3);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub settings: RuntimeSettings,
    pub event_bus: EventBus,
    pub lifecycle: LifecycleManager,
    pub migration: MigrationEngine,
    pub connectivity: ConnectivityMonitor,
    pub replay: ReplayService,
    pub export: ExportAssembler,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire up all components against one database pool and remote endpoint
    pub fn new(
        db: SqlitePool,
        settings: RuntimeSettings,
        event_bus: EventBus,
        remote: Arc<RemoteClient>,
    ) -> Self {
        let lifecycle = LifecycleManager::new(
            db.clone(),
            event_bus.clone(),
            Duration::from_millis(settings.inactivity_timeout_ms),
        );

        let migration = MigrationEngine::new(
            db.clone(),
            remote.clone(),
            event_bus.clone(),
            MigrationOptions {
                batch_size: settings.migration_batch_size.max(1),
                max_retries: settings.upload_max_retries.max(1),
            },
        );

        let connectivity = ConnectivityMonitor::new(
            remote.clone(),
            event_bus.clone(),
            Duration::from_millis(settings.connectivity_probe_interval_ms),
            OFFLINE_GRACE_WINDOW,
        );

        let replay = ReplayService::new(
            db.clone(),
            remote.clone(),
            Duration::from_millis(settings.deletion_poll_interval_ms),
        );

        let export = ExportAssembler::new(db.clone(), remote, settings.export_compress_threshold);

        Self {
            db,
            settings,
            event_bus,
            lifecycle,
            migration,
            connectivity,
            replay,
            export,
            startup_time: Utc::now(),
        }
    }
}
