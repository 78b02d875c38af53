//! # Woodshed Common Library
//!
//! Shared code for the Woodshed capture/sync engine:
//! - Database models and queries (local store)
//! - Event types (WshdEvent enum) and EventBus
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
