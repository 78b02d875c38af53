//! wshd-engine library interface
//!
//! Local-first practice capture with eventual-consistency migration to a
//! remote store. Exposes the component APIs for integration testing.

pub mod api;
pub mod capture;
pub mod error;
pub mod export;
pub mod replay;
pub mod state;
pub mod sync;

pub use crate::error::{ApiError, ApiResult};
pub use crate::state::AppState;

use axum::Router;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use wshd_common::events::WshdEvent;

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::capture_routes())
        .merge(api::migration_routes())
        .merge(api::replay_routes())
        .merge(api::export_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Spawn the single event dispatcher.
///
/// All side-effect wiring between components goes through here: reconnect
/// edges and identity transitions become explicit messages consumed in one
/// place, instead of components observing each other's state.
pub fn spawn_event_dispatcher(state: AppState) -> JoinHandle<()> {
    let mut rx = state.event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(WshdEvent::Reconnected { .. }) => {
                    state.migration.on_reconnected().await;
                }
                Ok(WshdEvent::Authenticated { user_id, .. }) => {
                    state.migration.set_identity(Some(user_id)).await;
                }
                Ok(WshdEvent::SignedOut { .. }) => {
                    state.migration.set_identity(None).await;
                }
                Ok(event) => {
                    debug!(event_type = event.event_type(), "Event observed");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event dispatcher lagged behind the bus");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
