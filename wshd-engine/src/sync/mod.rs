//! Migration/sync: remote store client, connectivity monitor and the
//! eventual-consistency migration engine.

pub mod connectivity;
pub mod engine;
pub mod remote;

pub use connectivity::ConnectivityMonitor;
pub use engine::MigrationEngine;
pub use remote::{RemoteClient, RemoteError};
