//! Configuration Management
//!
//! Loads and saves named database connections and validation settings.
//!
//! # Configuration Locations
//! - Local: `.mindsql/config.json` (per-project, team-shareable)
//! - Global: `<config_dir>/mindsql/config.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit command-line parameters (highest priority)
//! 2. Local config file
//! 3. Global config file
//!
//! Both files share one format:
//! ```json
//! {
//!   "connections": {
//!     "shop": { "engine": "postgres", "host": "localhost", "port": 5432,
//!               "user": "app", "database": "shop", "password_env": "SHOP_PW" }
//!   },
//!   "default": "shop",
//!   "schema_file": ".mindsql/schema.txt",
//!   "parse_failure": "lenient"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::ConnectionConfig;
use crate::error::{MindsqlError, Result};
use crate::schema::sync::DEFAULT_SCHEMA_FILE;
use crate::validate::ParseFailurePolicy;

/// Contents of one config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MindsqlConfig {
    /// Named connections
    #[serde(default)]
    pub connections: BTreeMap<String, StoredConnection>,

    /// Name of the connection used when none is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Where the schema description is persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<PathBuf>,

    /// How the validator treats SQL it cannot parse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_failure: Option<ParseFailurePolicy>,
}

/// Saved connection; the password may live in an environment variable instead
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConnection {
    #[serde(flatten)]
    pub config: ConnectionConfig,

    /// Environment variable holding the password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredConnection {
    /// Connection config with the password filled in from the environment if needed
    pub fn resolve(&self) -> Result<ConnectionConfig> {
        let mut config = self.config.clone();

        if let Some(env_var) = &self.password_env {
            let password = std::env::var(env_var).map_err(|_| {
                MindsqlError::config_error(format!(
                    "Environment variable {env_var} not found for password"
                ))
            })?;
            config.password = Some(password);
        }

        Ok(config)
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigLocation {
    Local,
    Global,
}

impl MindsqlConfig {
    /// Read a config file; a missing file is an empty config
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            MindsqlError::config_error(format!("Could not read {}: {e}", path.display()))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            MindsqlError::config_error(format!("Invalid config file {}: {e}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                MindsqlError::config_error(format!("Could not create config directory: {e}"))
            })?;
        }

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| MindsqlError::config_error(format!("Could not serialize config: {e}")))?;

        fs::write(path, contents)
            .map_err(|e| MindsqlError::config_error(format!("Could not write config file: {e}")))
    }

    /// Overlay `local` on `self`: local connections replace same-named ones and local
    /// settings win where set
    #[must_use]
    pub fn merged_with(mut self, local: Self) -> Self {
        self.connections.extend(local.connections);
        self.default = local.default.or(self.default);
        self.schema_file = local.schema_file.or(self.schema_file);
        self.parse_failure = local.parse_failure.or(self.parse_failure);
        self
    }

    /// Resolve `name`, or the default connection when `name` is `None`
    pub fn resolve(&self, name: Option<&str>) -> Result<ConnectionConfig> {
        let name = match name {
            Some(n) => n,
            None => self.default.as_deref().ok_or_else(|| {
                MindsqlError::config_error(format!(
                    "No default connection set. Available connections: {:?}. \
                     Specify one with --name or run 'mindsql connect'.",
                    self.connections.keys().collect::<Vec<_>>()
                ))
            })?,
        };

        let stored = self.connections.get(name).ok_or_else(|| {
            MindsqlError::config_error(format!(
                "Connection '{name}' not found. Available connections: {:?}",
                self.connections.keys().collect::<Vec<_>>()
            ))
        })?;

        stored.resolve()
    }

    /// Add or replace a connection; the first one saved becomes the default
    pub fn upsert(&mut self, name: &str, stored: StoredConnection) {
        if self.connections.is_empty() {
            self.default = Some(name.to_string());
        }
        self.connections.insert(name.to_string(), stored);
    }

    /// Schema description path, falling back to the default location
    #[must_use]
    pub fn schema_file(&self) -> PathBuf {
        self.schema_file.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_FILE))
    }

    #[must_use]
    pub fn parse_failure(&self) -> ParseFailurePolicy {
        self.parse_failure.unwrap_or_default()
    }
}

/// Path to the local config file (`.mindsql/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        MindsqlError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".mindsql").join("config.json"))
}

/// Path to the global config file (`<config_dir>/mindsql/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| MindsqlError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("mindsql").join("config.json"))
}

fn config_path(location: ConfigLocation) -> Result<PathBuf> {
    match location {
        ConfigLocation::Local => local_config_path(),
        ConfigLocation::Global => global_config_path(),
    }
}

/// Global config overlaid with the local one
pub fn load_with_precedence() -> Result<MindsqlConfig> {
    let global = MindsqlConfig::load(&global_config_path()?)?;
    let local = MindsqlConfig::load(&local_config_path()?)?;
    Ok(global.merged_with(local))
}

/// Resolve a saved connection by name, or the default one
pub fn resolve_connection(name: Option<&str>) -> Result<ConnectionConfig> {
    load_with_precedence()?.resolve(name)
}

/// Save a connection to the local or global config file
pub fn save_connection(
    name: &str,
    config: ConnectionConfig,
    password_env: Option<String>,
    location: ConfigLocation,
) -> Result<()> {
    let path = config_path(location)?;
    save_connection_to(&path, name, config, password_env)
}

/// Save a connection into the config file at `path`
///
/// With `password_env` set, the password itself is not written.
pub fn save_connection_to(
    path: &Path,
    name: &str,
    mut config: ConnectionConfig,
    password_env: Option<String>,
) -> Result<()> {
    let mut file = MindsqlConfig::load(path)?;

    if password_env.is_some() {
        config.password = None;
    }
    file.upsert(name, StoredConnection { config, password_env });

    file.save(path)?;
    tracing::info!(connection = name, file = %path.display(), "connection saved");
    Ok(())
}

/// All resolvable connections, by name
///
/// Connections whose password variable is missing are skipped.
pub fn list_connections() -> Result<Vec<(String, ConnectionConfig)>> {
    let merged = load_with_precedence()?;

    let mut connections = Vec::new();
    for (name, stored) in &merged.connections {
        match stored.resolve() {
            Ok(config) => connections.push((name.clone(), config)),
            Err(_) => {
                // Error details may name credentials
                tracing::warn!(connection = %name, "could not resolve connection");
            }
        }
    }

    Ok(connections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DatabaseType;
    use pretty_assertions::assert_eq;

    fn postgres(host: &str) -> ConnectionConfig {
        ConnectionConfig::postgres(
            host.to_string(),
            5432,
            "app".to_string(),
            "pass".to_string(),
            "shop".to_string(),
        )
    }

    fn stored(config: ConnectionConfig) -> StoredConnection {
        StoredConnection { config, password_env: None }
    }

    #[test]
    fn test_config_serialization() {
        let mut config = MindsqlConfig::default();
        config.upsert("shop", stored(postgres("localhost")));

        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"default\": \"shop\""));
        assert!(json.contains("localhost"));
        assert!(!json.contains("schema_file"));
    }

    #[test]
    fn test_stored_connection_resolve_direct_password() {
        let resolved = stored(postgres("localhost")).resolve().unwrap();
        assert_eq!(resolved.password, Some("pass".to_string()));
    }

    #[test]
    fn test_stored_connection_resolve_env_var() {
        std::env::set_var("MINDSQL_TEST_PASSWORD", "secret");

        let mut config = postgres("localhost");
        config.password = None;
        let stored = StoredConnection {
            config,
            password_env: Some("MINDSQL_TEST_PASSWORD".to_string()),
        };

        assert_eq!(stored.resolve().unwrap().password, Some("secret".to_string()));

        std::env::remove_var("MINDSQL_TEST_PASSWORD");
    }

    #[test]
    fn test_stored_connection_resolve_missing_env_var() {
        let stored = StoredConnection {
            config: postgres("localhost"),
            password_env: Some("MINDSQL_NONEXISTENT_VAR".to_string()),
        };

        let err = stored.resolve().unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.message().contains("Environment variable MINDSQL_NONEXISTENT_VAR not found"));
    }

    #[test]
    fn test_first_connection_becomes_default() {
        let mut config = MindsqlConfig::default();
        config.upsert("first", stored(postgres("a")));
        config.upsert("second", stored(postgres("b")));

        assert_eq!(config.default.as_deref(), Some("first"));
        assert_eq!(config.resolve(None).unwrap().host.as_deref(), Some("a"));
        assert_eq!(config.resolve(Some("second")).unwrap().host.as_deref(), Some("b"));
    }

    #[test]
    fn test_resolve_errors_list_available() {
        let empty = MindsqlConfig::default();
        assert!(empty.resolve(None).unwrap_err().message().contains("No default connection"));

        let mut config = MindsqlConfig::default();
        config.upsert("shop", stored(postgres("a")));
        let message = config.resolve(Some("nope")).unwrap_err().message();
        assert!(message.contains("Connection 'nope' not found"));
        assert!(message.contains("shop"));
    }

    #[test]
    fn test_local_overrides_global() {
        let mut global = MindsqlConfig::default();
        global.upsert("shared", stored(postgres("global-host")));
        global.upsert("global-only", stored(postgres("g")));
        global.parse_failure = Some(ParseFailurePolicy::Strict);

        let mut local = MindsqlConfig::default();
        local.upsert("shared", stored(postgres("local-host")));
        local.schema_file = Some(PathBuf::from("ctx/schema.txt"));

        let merged = global.merged_with(local);
        assert_eq!(merged.connections.len(), 2);
        assert_eq!(merged.default.as_deref(), Some("shared"));
        assert_eq!(merged.resolve(Some("shared")).unwrap().host.as_deref(), Some("local-host"));
        assert_eq!(merged.schema_file(), PathBuf::from("ctx/schema.txt"));
        assert_eq!(merged.parse_failure(), ParseFailurePolicy::Strict);
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = MindsqlConfig::default();
        assert_eq!(config.schema_file(), PathBuf::from(DEFAULT_SCHEMA_FILE));
        assert_eq!(config.parse_failure(), ParseFailurePolicy::Lenient);
    }

    #[test]
    fn test_save_and_load_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".mindsql").join("config.json");

        save_connection_to(&path, "local", ConnectionConfig::sqlite("shop.db".into()), None)
            .unwrap();
        save_connection_to(
            &path,
            "prod",
            postgres("db.internal"),
            Some("PROD_PASSWORD".to_string()),
        )
        .unwrap();

        let loaded = MindsqlConfig::load(&path).unwrap();
        assert_eq!(loaded.default.as_deref(), Some("local"));
        assert_eq!(loaded.connections["local"].config.engine, DatabaseType::SQLite);

        let prod = &loaded.connections["prod"];
        assert_eq!(prod.password_env.as_deref(), Some("PROD_PASSWORD"));
        assert_eq!(prod.config.password, None);
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = MindsqlConfig::load(&dir.path().join("absent.json")).unwrap();
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = MindsqlConfig::load(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }
}
