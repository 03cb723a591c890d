//! Configuration for the database pool and the HTTP server.
//!
//! Sources, lowest to highest precedence: built-in defaults, the TOML file
//! (`~/.dsenvios/config.toml` or an explicit path), then environment
//! variables. Command-line flags are layered on top by the binary.
//!
//! ```toml
//! [database]
//! host = "db.internal"
//! max_connections = 20
//! queue = "fail"
//!
//! [server]
//! port = 8080
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// What a lease request does when every connection is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// Queue up to the acquire timeout
    #[default]
    Wait,
    /// Fail immediately with pool exhaustion
    #[serde(alias = "fail")]
    FailFast,
}

impl std::str::FromStr for QueueMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wait" | "queue" => Ok(Self::Wait),
            "fail" | "fail_fast" | "failfast" => Ok(Self::FailFast),
            other => Err(CoreError::config(format!(
                "unknown queue mode '{}' (expected 'wait' or 'fail')",
                other
            ))),
        }
    }
}

/// Connection pool construction parameters
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Pool capacity (max concurrently leased connections)
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    pub statement_timeout_ms: u64,
    /// Idle connections older than this are pinged before reuse
    pub validate_after_idle_ms: u64,
    pub queue: QueueMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "dsenvios".to_string(),
            max_connections: 10,
            acquire_timeout_ms: 5_000,
            statement_timeout_ms: 30_000,
            validate_after_idle_ms: 30_000,
            queue: QueueMode::Wait,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }

    pub fn validate_after_idle(&self) -> Duration {
        Duration::from_millis(self.validate_after_idle_ms)
    }
}

// Hand-written so the password never reaches logs.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .field("validate_after_idle_ms", &self.validate_after_idle_ms)
            .field("queue", &self.queue)
            .finish()
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Allow any origin (default: localhost only)
    pub cors_permissive: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3005,
            cors_permissive: false,
        }
    }
}

impl HttpConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Full configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: HttpConfig,
}

impl AppConfig {
    /// Load defaults, the config file, and the process environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    tracing::debug!(path = ?default_path, "no config file, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Config file path: ~/.dsenvios/config.toml
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dsenvios/config.toml")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| CoreError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| CoreError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `DB_*` and `PORT` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = &mut self.database;
        if let Some(v) = lookup("DB_HOST") {
            db.host = v;
        }
        if let Some(v) = lookup("DB_PORT") {
            db.port = parse_env("DB_PORT", &v)?;
        }
        if let Some(v) = lookup("DB_USER") {
            db.user = v;
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            db.password = v;
        }
        if let Some(v) = lookup("DB_NAME") {
            db.database = v;
        }
        if let Some(v) = lookup("DB_POOL_SIZE") {
            db.max_connections = parse_env("DB_POOL_SIZE", &v)?;
        }
        if let Some(v) = lookup("DB_QUEUE") {
            db.queue = v.parse()?;
        }
        if let Some(v) = lookup("DB_ACQUIRE_TIMEOUT_MS") {
            db.acquire_timeout_ms = parse_env("DB_ACQUIRE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("DB_STATEMENT_TIMEOUT_MS") {
            db.statement_timeout_ms = parse_env("DB_STATEMENT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = parse_env("PORT", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let db = &self.database;
        if db.max_connections == 0 {
            return Err(CoreError::config(
                "database.max_connections must be at least 1 (DB_POOL_SIZE)",
            ));
        }
        if db.acquire_timeout_ms == 0 {
            return Err(CoreError::config(
                "database.acquire_timeout_ms must be greater than 0 (DB_ACQUIRE_TIMEOUT_MS)",
            ));
        }
        if db.statement_timeout_ms == 0 {
            return Err(CoreError::config(
                "database.statement_timeout_ms must be greater than 0 (DB_STATEMENT_TIMEOUT_MS)",
            ));
        }
        if db.host.trim().is_empty() || db.database.trim().is_empty() {
            return Err(CoreError::config("database.host and database.database are required"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CoreError::config(format!("{} has an invalid value: '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.queue, QueueMode::Wait);
        assert_eq!(config.server.bind_addr(), "127.0.0.1:3005");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [database]
            host = "db.internal"
            queue = "fail"

            [server]
            port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.queue, QueueMode::FailFast);
        assert_eq!(config.database.user, "postgres");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn env_overrides_file() {
        let mut config = AppConfig::from_toml("[database]\nmax_connections = 3\n").unwrap();
        config
            .apply_env(env(&[
                ("DB_POOL_SIZE", "25"),
                ("DB_QUEUE", "fail"),
                ("DB_PASSWORD", "s3cret"),
                ("PORT", "9000"),
            ]))
            .unwrap();
        assert_eq!(config.database.max_connections, 25);
        assert_eq!(config.database.queue, QueueMode::FailFast);
        assert_eq!(config.database.password, "s3cret");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn bad_env_value_is_reported() {
        let mut config = AppConfig::default();
        let err = config.apply_env(env(&[("DB_PORT", "abc")])).unwrap_err();
        assert!(err.to_string().contains("DB_PORT"));

        let err = config.apply_env(env(&[("DB_QUEUE", "sometimes")])).unwrap_err();
        assert!(err.to_string().contains("queue mode"));
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config { .. })));
    }

    #[test]
    fn debug_redacts_password() {
        let mut config = DatabaseConfig::default();
        config.password = "hunter2".into();
        let out = format!("{:?}", config);
        assert!(!out.contains("hunter2"));
        assert!(out.contains("***"));
    }

    #[test]
    fn load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[database]\ndatabase = \"envios_test\"\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.database.database, "envios_test");

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            AppConfig::from_file(&missing),
            Err(CoreError::ConfigRead { .. })
        ));

        fs::write(&path, "[database\n").unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(CoreError::ConfigParse { .. })
        ));
    }
}
