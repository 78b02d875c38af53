//! HTTP API handlers for wshd-engine

pub mod capture;
pub mod export;
pub mod health;
pub mod migration;
pub mod replay;

pub use capture::capture_routes;
pub use export::export_routes;
pub use health::health_routes;
pub use migration::migration_routes;
pub use replay::replay_routes;
