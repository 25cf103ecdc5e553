use crate::client::{ConnectOptions, DEFAULT_MAX_RECONNECTS, DEFAULT_RECONNECT, DEFAULT_TIMEOUT};
use log::LevelFilter;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE_ENV_VAR: &str = "PUSH_CONFIG_FILE";
pub const CONFIG_FILE_DEFAULT: &str = "push_config_debug.json";
pub const DEFAULT_DB_ADDRESS: &str = "127.0.0.1:60501";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Empty db address for EWS")]
    EmptyAddress,
}

/// Durations are stored as integer nanoseconds.
fn duration_from_nanos<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_nanos)
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    #[serde(deserialize_with = "duration_from_nanos")]
    pub timeout: Duration,
    #[serde(deserialize_with = "duration_from_nanos")]
    pub reconnect: Duration,
    pub max_reconnects: u32,
    pub user: String,
    pub pass: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            reconnect: DEFAULT_RECONNECT,
            max_reconnects: DEFAULT_MAX_RECONNECTS,
            user: String::new(),
            pass: String::new(),
        }
    }
}

impl DbConfig {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            timeout: self.timeout,
            reconnect: self.reconnect,
            max_reconnects: self.max_reconnects,
            user: self.user.clone(),
            pass: self.pass.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub silent: bool,
    pub verbose: bool,
}

impl LogConfig {
    pub fn level_filter(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub db_connect: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_connect: DEFAULT_DB_ADDRESS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EwsConfig {
    #[serde(flatten)]
    pub log: LogConfig,
    #[serde(flatten)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub db: DbConfig,
    pub ews: EwsConfig,
}

impl PushConfig {
    /// The file named by `PUSH_CONFIG_FILE`, or the default file name.
    pub fn path_from_env() -> PathBuf {
        match std::env::var_os(CONFIG_FILE_ENV_VAR) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(CONFIG_FILE_DEFAULT),
        }
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::from_path(Self::path_from_env())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PushConfig =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ews.server.db_connect.is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_full_document() {
        let file = write_config(
            r#"{
                "db": {
                    "timeout": 2000000000,
                    "reconnect": 500000000,
                    "max_reconnects": 7,
                    "user": "bench",
                    "pass": "secret"
                },
                "ews": {
                    "db_connect": "10.0.0.5:3301",
                    "silent": true,
                    "verbose": true
                }
            }"#,
        );
        let config = PushConfig::from_path(file.path()).unwrap();
        assert_eq!(config.db.timeout, Duration::from_secs(2));
        assert_eq!(config.db.reconnect, Duration::from_millis(500));
        assert_eq!(config.db.max_reconnects, 7);
        assert_eq!(config.ews.server.db_connect, "10.0.0.5:3301");
        assert!(config.ews.log.silent);
        assert_eq!(config.ews.log.level_filter(), LevelFilter::Debug);

        let options = config.db.connect_options();
        assert!(options.has_credentials());
        assert_eq!(options.user, "bench");
    }

    #[test]
    fn test_missing_fields_keep_defaults() {
        let file = write_config(r#"{ "ews": { "verbose": false } }"#);
        let config = PushConfig::from_path(file.path()).unwrap();
        assert_eq!(config, PushConfig::default());
        assert_eq!(config.ews.server.db_connect, DEFAULT_DB_ADDRESS);
        assert_eq!(config.db.timeout, Duration::from_millis(5000));
        assert!(!config.db.connect_options().has_credentials());
    }

    #[test]
    fn test_empty_address_rejected() {
        let file = write_config(r#"{ "ews": { "db_connect": "" } }"#);
        assert!(matches!(
            PushConfig::from_path(file.path()),
            Err(ConfigError::EmptyAddress)
        ));
    }

    #[test]
    fn test_malformed_file() {
        let file = write_config("{ not json");
        assert!(matches!(
            PushConfig::from_path(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PushConfig::from_path(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
