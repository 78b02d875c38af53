//! Configuration loading and root folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Resolve the root data folder, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. `WSHD_ROOT_FOLDER` environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("WSHD_ROOT_FOLDER") {
        return PathBuf::from(path);
    }

    if let Some(value) = config_file_value("root_folder") {
        return PathBuf::from(value);
    }

    default_root_folder()
}

/// Resolve the remote store base URL, same priority order as the root folder:
/// CLI argument, `WSHD_REMOTE_URL`, config file `remote_base_url`, compiled default.
pub fn resolve_remote_base_url(cli_arg: Option<&str>) -> String {
    if let Some(url) = cli_arg {
        return url.trim_end_matches('/').to_string();
    }

    if let Ok(url) = std::env::var("WSHD_REMOTE_URL") {
        return url.trim_end_matches('/').to_string();
    }

    if let Some(value) = config_file_value("remote_base_url") {
        return value.trim_end_matches('/').to_string();
    }

    "http://127.0.0.1:5740".to_string()
}

/// Create the root folder if missing and return the database path within it
pub fn ensure_root_folder(root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    Ok(root.join("woodshed.db"))
}

/// Read a single string key from the platform config file, if present
fn config_file_value(key: &str) -> Option<String> {
    let path = config_file_path().ok()?;
    let content = std::fs::read_to_string(path).ok()?;
    let config = toml::from_str::<toml::Value>(&content).ok()?;
    config.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Get default configuration file path for the platform
fn config_file_path() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("woodshed").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/woodshed/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("woodshed"))
        .unwrap_or_else(|| PathBuf::from("./woodshed_data"))
}

/// Runtime settings backed by the `settings` table.
///
/// Missing or NULL rows fall back to the compiled defaults that
/// `init_database` seeds on first run.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeSettings {
    /// Inactivity timeout for the session lifecycle debounce timer
    pub inactivity_timeout_ms: u64,
    /// Bounded upload concurrency for the migration engine
    pub migration_batch_size: usize,
    /// Replay loader remote-existence poll interval
    pub deletion_poll_interval_ms: u64,
    /// Session count at/above which exports are gzip-compressed
    pub export_compress_threshold: usize,
    /// Connectivity monitor probe interval
    pub connectivity_probe_interval_ms: u64,
    /// Per-session upload timeout
    pub upload_timeout_ms: u64,
    /// Per-session upload attempts before marking the session failed
    pub upload_max_retries: u32,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            inactivity_timeout_ms: 300_000, // 5 minutes
            migration_batch_size: 4,
            deletion_poll_interval_ms: 5_000,
            export_compress_threshold: 100,
            connectivity_probe_interval_ms: 5_000,
            upload_timeout_ms: 30_000,
            upload_max_retries: 3,
        }
    }
}

impl RuntimeSettings {
    /// Load settings from the database, falling back to defaults per key
    pub async fn load(pool: &sqlx::SqlitePool) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            inactivity_timeout_ms: setting_u64(pool, "inactivity_timeout_ms", defaults.inactivity_timeout_ms).await?,
            migration_batch_size: setting_u64(pool, "migration_batch_size", defaults.migration_batch_size as u64).await? as usize,
            deletion_poll_interval_ms: setting_u64(pool, "deletion_poll_interval_ms", defaults.deletion_poll_interval_ms).await?,
            export_compress_threshold: setting_u64(pool, "export_compress_threshold", defaults.export_compress_threshold as u64).await? as usize,
            connectivity_probe_interval_ms: setting_u64(pool, "connectivity_probe_interval_ms", defaults.connectivity_probe_interval_ms).await?,
            upload_timeout_ms: setting_u64(pool, "upload_timeout_ms", defaults.upload_timeout_ms).await?,
            upload_max_retries: setting_u64(pool, "upload_max_retries", defaults.upload_max_retries as u64).await? as u32,
        })
    }
}

async fn setting_u64(pool: &sqlx::SqlitePool, key: &str, default: u64) -> Result<u64> {
    let value: Option<i64> = sqlx::query_scalar(
        "SELECT CAST(value AS INTEGER) FROM settings WHERE key = ?",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(value.map(|v| v.max(0) as u64).unwrap_or(default))
}
