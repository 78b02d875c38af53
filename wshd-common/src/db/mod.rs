//! Local store: durable on-device tables for sessions and events
//!
//! Single-writer discipline: the lifecycle manager is the only writer of
//! `status` (and the active pointer it tracks in memory); the migration
//! engine is the only writer of `sync_status` and `remote_id`.

pub mod events;
pub mod init;
pub mod models;
pub mod sessions;

pub use init::init_database;
