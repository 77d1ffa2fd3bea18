//! Configuration loader
//!
//! Loads integration configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `ORBIT_MASTER_SECRET`: Credential vault master secret (required)
//! - `ORBIT_<PROVIDER>_CLIENT_ID` / `ORBIT_<PROVIDER>_CLIENT_SECRET` /
//!   `ORBIT_<PROVIDER>_REDIRECT_URI`: OAuth client registration per
//!   provider (e.g. `ORBIT_GOOGLE_DRIVE_CLIENT_ID`)
//! - `ORBIT_NEXTCLOUD_BASE_URL`: Nextcloud server base URL
//! - `ORBIT_SYNC_MAX_CONCURRENT`: Parallel connections per sync sweep
//! - `ORBIT_SYNC_LEASE_TTL`: Sync lease TTL in seconds
//! - `ORBIT_SYNC_PREFIX`: Optional destination prefix override
//!
//! ## File Locations
//! The loader probes `./config.{json,toml}` and `./orbit.{json,toml}` in
//! the working directory, its parents (2 levels), and next to the
//! executable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use orbit_domain::{
    IntegrationConfig, OrbitError, Provider, ProviderCredentials, Result, SyncSettings,
    VaultConfig,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the master
/// secret is missing there, falls back to loading from a config file.
///
/// # Errors
/// Returns `OrbitError::Config` if configuration cannot be loaded from
/// either source or is malformed.
pub fn load() -> Result<IntegrationConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// The master secret is required; providers are included when their
/// client id and secret are both present (Nextcloud when its base URL
/// is).
///
/// # Errors
/// Returns `OrbitError::Config` when `ORBIT_MASTER_SECRET` is missing or
/// a numeric variable does not parse.
pub fn load_from_env() -> Result<IntegrationConfig> {
    let master_secret = env_var("ORBIT_MASTER_SECRET")?;

    let mut providers = HashMap::new();
    for provider in Provider::all() {
        if let Some(creds) = provider_from_env(provider) {
            providers.insert(provider, creds);
        }
    }

    let mut sync = SyncSettings::default();
    if let Some(value) = env_parse::<usize>("ORBIT_SYNC_MAX_CONCURRENT")? {
        sync.max_concurrent_connections = value;
    }
    if let Some(value) = env_parse::<i64>("ORBIT_SYNC_LEASE_TTL")? {
        sync.lease_ttl_secs = value;
    }
    sync.destination_prefix_override = std::env::var("ORBIT_SYNC_PREFIX").ok();

    Ok(IntegrationConfig { vault: VaultConfig { master_secret }, providers, sync })
}

fn provider_from_env(provider: Provider) -> Option<ProviderCredentials> {
    let prefix = format!("ORBIT_{}", provider.as_str().to_ascii_uppercase());
    let client_id = std::env::var(format!("{prefix}_CLIENT_ID")).ok();
    let client_secret = std::env::var(format!("{prefix}_CLIENT_SECRET")).ok();
    let redirect_uri = std::env::var(format!("{prefix}_REDIRECT_URI")).ok();
    let base_url = std::env::var(format!("{prefix}_BASE_URL")).ok();

    if provider == Provider::Nextcloud {
        // The CalDAV provider needs only a server to probe against.
        return base_url.map(|base_url| ProviderCredentials {
            client_id: client_id.unwrap_or_default(),
            client_secret: client_secret.unwrap_or_default(),
            redirect_uri: redirect_uri.unwrap_or_default(),
            base_url: Some(base_url),
        });
    }

    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret)) => Some(ProviderCredentials {
            client_id,
            client_secret,
            redirect_uri: redirect_uri.unwrap_or_default(),
            base_url,
        }),
        _ => None,
    }
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `OrbitError::Config` if no file is found or parsing fails.
pub fn load_from_file(path: Option<PathBuf>) -> Result<IntegrationConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(OrbitError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            OrbitError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| OrbitError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<IntegrationConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| OrbitError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| OrbitError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(OrbitError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("orbit.json"),
            cwd.join("orbit.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
            cwd.join("../../config.json"),
            cwd.join("../../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("orbit.json"),
                exe_dir.join("orbit.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| OrbitError::Config(format!("Missing required environment variable: {key}")))
}

/// Parse an optional numeric environment variable
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| OrbitError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}
