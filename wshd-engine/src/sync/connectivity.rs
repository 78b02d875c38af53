//! Connectivity monitor
//!
//! Probes the remote store's health endpoint and publishes a `Reconnected`
//! event exactly once per offline→online transition. Also keeps a transient
//! "was offline" flag for user-facing "back online" messaging; the flag is
//! cosmetic and has no bearing on sync correctness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use wshd_common::events::{EventBus, WshdEvent};

use crate::sync::remote::RemoteClient;

#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    remote: Arc<RemoteClient>,
    event_bus: EventBus,
    probe_interval: Duration,
    grace_window: Duration,
    online: AtomicBool,
    was_offline: AtomicBool,
}

impl ConnectivityMonitor {
    pub fn new(
        remote: Arc<RemoteClient>,
        event_bus: EventBus,
        probe_interval: Duration,
        grace_window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                remote,
                event_bus,
                probe_interval,
                grace_window,
                // Start offline: the first successful probe counts as a
                // reconnect edge, which re-triggers migration after restart.
                online: AtomicBool::new(false),
                was_offline: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the probe loop; cancelled via the token
    pub fn spawn(&self, token: CancellationToken) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.inner.probe_interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Connectivity monitor stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let up = monitor.inner.remote.health().await;
                        monitor.observe(up);
                    }
                }
            }
        })
    }

    /// Feed one observation into the edge detector.
    ///
    /// Emits `Reconnected` only on the offline→online edge, never while
    /// already online.
    pub fn observe(&self, up: bool) {
        if up {
            let was_online = self.inner.online.swap(true, Ordering::SeqCst);
            if !was_online {
                info!("Connectivity restored");
                self.inner.was_offline.store(true, Ordering::SeqCst);
                self.inner.event_bus.emit(WshdEvent::Reconnected { timestamp: Utc::now() });

                // Auto-clear the cosmetic flag after the grace window
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(inner.grace_window).await;
                    inner.was_offline.store(false, Ordering::SeqCst);
                });
            }
        } else if self.inner.online.swap(false, Ordering::SeqCst) {
            info!("Connectivity lost");
        }
    }

    pub fn online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Transient "back online" flag, auto-cleared after the grace window
    pub fn was_offline(&self) -> bool {
        self.inner.was_offline.load(Ordering::SeqCst)
    }
}
