//! Application-level configuration: JSON file on disk overlaid by environment variables.

use std::{env, fs, io::ErrorKind, path::PathBuf, str::FromStr};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TABLETOP_RELAY_CONFIG_PATH";
const DEFAULT_DM_PASSWORD: &str = "dm";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017";
const DEFAULT_COUCH_BASE_URL: &str = "http://localhost:5984";
const DEFAULT_COUCH_DB: &str = "tabletop_relay";

/// Which record store backs the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// MongoDB, one collection per kind.
    Mongo,
    /// CouchDB, one database.
    Couch,
    /// Process-local store, lost on exit.
    Memory,
    /// Run purely in memory with no mirror at all.
    #[default]
    None,
}

/// Unrecognised `STORE_BACKEND` value.
#[derive(Debug, Error)]
#[error("unknown store backend `{0}` (expected mongo, couch, memory or none)")]
pub struct UnknownBackend(String);

impl FromStr for StoreBackend {
    type Err = UnknownBackend;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StoreBackend::Mongo),
            "couch" | "couchdb" => Ok(StoreBackend::Couch),
            "memory" => Ok(StoreBackend::Memory),
            "none" | "" => Ok(StoreBackend::None),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Shared secret granting the DM role.
    pub dm_password: String,
    /// HTTP listen port.
    pub port: u16,
    /// Record store to mirror the board into.
    pub store_backend: StoreBackend,
    /// MongoDB connection string.
    pub mongo_uri: String,
    /// Database name; falls back to the one in the URI.
    pub mongo_db: Option<String>,
    /// CouchDB server URL.
    pub couch_base_url: String,
    /// CouchDB database name.
    pub couch_db: String,
    /// Optional basic-auth user.
    pub couch_username: Option<String>,
    /// Optional basic-auth password.
    pub couch_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dm_password: DEFAULT_DM_PASSWORD.into(),
            port: DEFAULT_PORT,
            store_backend: StoreBackend::default(),
            mongo_uri: DEFAULT_MONGO_URI.into(),
            mongo_db: None,
            couch_base_url: DEFAULT_COUCH_BASE_URL.into(),
            couch_db: DEFAULT_COUCH_DB.into(),
            couch_username: None,
            couch_password: None,
        }
    }
}

impl AppConfig {
    /// Load the configuration file (if any) and apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::from_file();
        config.apply_overrides(|key| env::var(key).ok());

        if config.dm_password == DEFAULT_DM_PASSWORD {
            warn!("DM_PASSWORD not set; using the built-in default password");
        }
        config
    }

    fn from_file() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded configuration file");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Overlay values from `lookup` (the process environment in production).
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(password) = non_empty("DM_PASSWORD") {
            self.dm_password = password;
        }

        if let Some(raw) = non_empty("PORT").or_else(|| non_empty("SERVER_PORT")) {
            match raw.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(err) => warn!(value = %raw, error = %err, "ignoring invalid port"),
            }
        }

        if let Some(raw) = non_empty("STORE_BACKEND") {
            match raw.parse::<StoreBackend>() {
                Ok(backend) => self.store_backend = backend,
                Err(err) => warn!(error = %err, "ignoring STORE_BACKEND"),
            }
        }

        if let Some(uri) = non_empty("MONGO_URI") {
            self.mongo_uri = uri;
        }
        if let Some(db) = non_empty("MONGO_DB") {
            self.mongo_db = Some(db);
        }
        if let Some(url) = non_empty("COUCH_BASE_URL") {
            self.couch_base_url = url;
        }
        if let Some(db) = non_empty("COUCH_DB") {
            self.couch_db = db;
        }
        if let Some(username) = non_empty("COUCH_USERNAME") {
            self.couch_username = Some(username);
        }
        if let Some(password) = non_empty("COUCH_PASSWORD") {
            self.couch_password = Some(password);
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    dm_password: Option<String>,
    port: Option<u16>,
    store_backend: Option<StoreBackend>,
    mongo_uri: Option<String>,
    mongo_db: Option<String>,
    couch_base_url: Option<String>,
    couch_db: Option<String>,
    couch_username: Option<String>,
    couch_password: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            dm_password: raw.dm_password.unwrap_or(defaults.dm_password),
            port: raw.port.unwrap_or(defaults.port),
            store_backend: raw.store_backend.unwrap_or(defaults.store_backend),
            mongo_uri: raw.mongo_uri.unwrap_or(defaults.mongo_uri),
            mongo_db: raw.mongo_db,
            couch_base_url: raw.couch_base_url.unwrap_or(defaults.couch_base_url),
            couch_db: raw.couch_db.unwrap_or(defaults.couch_db),
            couch_username: raw.couch_username,
            couch_password: raw.couch_password,
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn overlay(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).cloned());
        config
    }

    #[test]
    fn defaults_without_environment() {
        let config = overlay(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.dm_password, "dm");
        assert_eq!(config.store_backend, StoreBackend::None);
    }

    #[test]
    fn environment_overrides_file_values() {
        let config = overlay(&[
            ("DM_PASSWORD", "hunter2"),
            ("SERVER_PORT", "9000"),
            ("STORE_BACKEND", "couchdb"),
            ("COUCH_DB", "maps"),
        ]);
        assert_eq!(config.dm_password, "hunter2");
        assert_eq!(config.port, 9000);
        assert_eq!(config.store_backend, StoreBackend::Couch);
        assert_eq!(config.couch_db, "maps");
    }

    #[test]
    fn port_prefers_port_over_server_port() {
        let config = overlay(&[("PORT", "7000"), ("SERVER_PORT", "9000")]);
        assert_eq!(config.port, 7000);
    }

    #[test]
    fn invalid_values_are_ignored() {
        let config = overlay(&[("PORT", "http"), ("STORE_BACKEND", "sqlite"), ("DM_PASSWORD", "")]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.store_backend, StoreBackend::None);
        assert_eq!(config.dm_password, "dm");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"store_backend":"memory","port":3000}"#).unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.port, 3000);
        assert_eq!(config.couch_db, "tabletop_relay");
    }
}
