//! Configuration management
//!
//! Settings come from an optional TOML file layered with `TABLOAD_*`
//! environment variables (nested keys use `__`, e.g.
//! `TABLOAD_SINK__PASSWORD`). A `.env` file is read first.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::loader::{TabularLoader, DEFAULT_TABLE_PREFIX};
use crate::pipeline::PipelineOptions;
use crate::storage::{StorageConfig, StorageLocation};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TABLOAD";

/// Default number of files processed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Default grace period for in-flight files after cancellation.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Default MySQL port.
pub const DEFAULT_SINK_PORT: u16 = 3306;

/// Default maximum sink connections in the pool.
pub const DEFAULT_SINK_MAX_CONNECTIONS: u32 = 5;

/// Default sink connection timeout in seconds.
pub const DEFAULT_SINK_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Location string such as `s3://bucket/prefix/`
    pub storage_location: String,
    pub staging_directory: PathBuf,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Delete each staged file once it has been processed
    #[serde(default)]
    pub remove_staged_files: bool,
    #[serde(default)]
    pub storage: StorageConfig,
    pub sink: SinkConfig,
}

/// Relational sink connection parameters
#[derive(Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub host: String,
    #[serde(default = "default_sink_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
    #[serde(default = "default_sink_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_sink_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl std::fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_shutdown_grace_secs() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}

fn default_table_prefix() -> String {
    DEFAULT_TABLE_PREFIX.to_string()
}

fn default_delimiter() -> String {
    ",".to_string()
}

fn default_sink_port() -> u16 {
    DEFAULT_SINK_PORT
}

fn default_sink_max_connections() -> u32 {
    DEFAULT_SINK_MAX_CONNECTIONS
}

fn default_sink_connect_timeout_secs() -> u64 {
    DEFAULT_SINK_CONNECT_TIMEOUT_SECS
}

impl Config {
    /// Load from `path` (if given) and the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.location()?;
        self.delimiter_byte()?;

        if self.staging_directory.as_os_str().is_empty() {
            return Err(ConfigError::Missing("staging_directory"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                setting: "concurrency",
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.sink.host.trim().is_empty() {
            return Err(ConfigError::Missing("sink.host"));
        }
        if self.sink.username.trim().is_empty() {
            return Err(ConfigError::Missing("sink.username"));
        }
        if self.sink.database.trim().is_empty() {
            return Err(ConfigError::Missing("sink.database"));
        }
        if self.sink.port == 0 {
            return Err(ConfigError::Invalid {
                setting: "sink.port",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.sink.max_connections == 0 {
            return Err(ConfigError::Invalid {
                setting: "sink.max_connections",
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn location(&self) -> Result<StorageLocation, ConfigError> {
        StorageLocation::parse(&self.storage_location)
    }

    pub fn delimiter_byte(&self) -> Result<u8, ConfigError> {
        match self.delimiter.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(ConfigError::Invalid {
                setting: "delimiter",
                reason: format!("'{}' is not a single ASCII character", self.delimiter),
            }),
        }
    }

    pub fn loader(&self) -> Result<TabularLoader, ConfigError> {
        Ok(TabularLoader::new(self.table_prefix.clone(), self.delimiter_byte()?))
    }

    pub fn pipeline_options(&self) -> Result<PipelineOptions, ConfigError> {
        Ok(PipelineOptions {
            location: self.location()?,
            staging_directory: self.staging_directory.clone(),
            concurrency: self.concurrency,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            remove_staged_files: self.remove_staged_files,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const MINIMAL: &str = r#"
        storage_location = "s3://querys-hoteles/"
        staging_directory = "/tmp/csv_files"

        [sink]
        host = "127.0.0.1"
        username = "root"
        password = "secret"
        database = "prod"
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.table_prefix, "table_from_");
        assert_eq!(config.sink.port, DEFAULT_SINK_PORT);
        assert_eq!(config.delimiter_byte().unwrap(), b',');
        assert!(!config.remove_staged_files);

        let location = config.location().unwrap();
        assert_eq!(location.bucket, "querys-hoteles");
        assert_eq!(location.prefix, "");
    }

    #[test]
    fn test_malformed_location_is_config_error() {
        let toml = MINIMAL.replace("s3://querys-hoteles/", "querys-hoteles");
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLocation { .. }));
    }

    #[test]
    fn test_missing_sink_section_fails() {
        let toml = r#"
            storage_location = "s3://b/"
            staging_directory = "/tmp/x"
        "#;
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Source(_)));
    }

    #[test]
    fn test_validation_rules() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();

        config.concurrency = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { setting: "concurrency", .. })
        ));
        config.concurrency = 2;

        config.sink.database = " ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("sink.database"))));
        config.sink.database = "prod".to_string();

        config.delimiter = ";;".to_string();
        assert!(config.validate().is_err());
        config.delimiter = "\t".to_string();
        assert_eq!(config.delimiter_byte().unwrap(), b'\t');

        config.sink.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pool_smaller_than_concurrency_is_valid() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.sink.max_connections = 2;
        config.concurrency = 8;
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline_options().unwrap().concurrency, 8);
    }

    #[test]
    fn test_pipeline_options() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.shutdown_grace_secs = 5;
        let options = config.pipeline_options().unwrap();
        assert_eq!(options.location.bucket, "querys-hoteles");
        assert_eq!(options.shutdown_grace, Duration::from_secs(5));
        assert_eq!(options.staging_directory, PathBuf::from("/tmp/csv_files"));
    }

    #[test]
    fn test_sink_debug_redacts_password() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        let printed = format!("{:?}", config.sink);
        assert!(!printed.contains("secret"));
    }

    #[test]
    #[serial]
    fn test_load_file_with_env_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        std::env::set_var("TABLOAD_SINK__DATABASE", "staging");
        std::env::set_var("TABLOAD_CONCURRENCY", "3");
        let result = Config::load(Some(file.path()));
        std::env::remove_var("TABLOAD_SINK__DATABASE");
        std::env::remove_var("TABLOAD_CONCURRENCY");

        let config = result.unwrap();
        assert_eq!(config.sink.database, "staging");
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.sink.host, "127.0.0.1");
    }
}
