//! Server configuration: a TOML file, overridden from the command line or
//! the environment.

use crate::model::InvalidTableName;
use crate::model::TableName;
use dropshot::ConfigDropshot;
use dropshot::ConfigLogging;
use dropshot::ConfigLoggingLevel;
use serde::Deserialize;
use serde::Deserializer;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    TableName(#[from] InvalidTableName),
    #[error("no database URL configured (set database.url or DATABASE_URL)")]
    MissingDatabaseUrl,
}

#[derive(Deserialize)]
pub struct Config {
    #[serde(
        default = "default_dropshot",
        deserialize_with = "deserialize_dropshot"
    )]
    pub dropshot: ConfigDropshot,
    #[serde(default = "default_log")]
    pub log: ConfigLogging,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub table_name: TableName,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
    pub statement_timeout_ms: u64,
    /// Create the counter table at startup if it does not exist
    pub create_table: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: None,
            table_name: TableName::default(),
            max_connections: 8,
            connection_timeout_secs: 5,
            statement_timeout_ms: 5000,
            create_table: false,
        }
    }
}

impl DatabaseConfig {
    pub fn url(&self) -> Result<&str, ConfigError> {
        self.url.as_deref().ok_or(ConfigError::MissingDatabaseUrl)
    }
}

/// Settings that take precedence over the config file
#[derive(Debug, Default)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub table_name: Option<String>,
    pub bind_address: Option<SocketAddr>,
}

fn default_dropshot() -> ConfigDropshot {
    ConfigDropshot {
        bind_address: SocketAddr::from(([127, 0, 0, 1], 12344)),
        ..Default::default()
    }
}

/// Parses a `[dropshot]` section, taking the bind address from
/// `default_dropshot()` when the section leaves it out.  Dropshot's own
/// default would otherwise bind an ephemeral port.
fn deserialize_dropshot<'de, D>(
    deserializer: D,
) -> Result<ConfigDropshot, D::Error>
where
    D: Deserializer<'de>,
{
    let mut table = toml::value::Table::deserialize(deserializer)?;
    if !table.contains_key("bind_address") {
        table.insert(
            String::from("bind_address"),
            toml::Value::String(default_dropshot().bind_address.to_string()),
        );
    }
    toml::Value::Table(table).try_into().map_err(serde::de::Error::custom)
}

fn default_log() -> ConfigLogging {
    ConfigLogging::StderrTerminal { level: ConfigLoggingLevel::Info }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dropshot: default_dropshot(),
            log: default_log(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::Io { path: path.to_path_buf(), source }
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply(&mut self, overrides: Overrides) -> Result<(), ConfigError> {
        if let Some(url) = overrides.database_url {
            self.database.url = Some(url);
        }
        if let Some(table_name) = overrides.table_name {
            self.database.table_name = TableName::try_from(table_name)?;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.dropshot.bind_address = bind_address;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::Config;
    use super::ConfigError;
    use super::DatabaseConfig;
    use super::Overrides;
    use dropshot::ConfigLogging;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.dropshot.bind_address.to_string(), "127.0.0.1:12344");
        assert_eq!(config.database, DatabaseConfig::default());
        assert_eq!(config.database.table_name.as_str(), "visitors");
        assert!(matches!(
            config.database.url(),
            Err(ConfigError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn test_full_file() {
        let file = write_config(
            r#"
            [dropshot]
            bind_address = "0.0.0.0:8080"

            [log]
            mode = "file"
            level = "debug"
            path = "/dev/stdout"
            if_exists = "append"

            [database]
            url = "postgresql://root@127.0.0.1:5432/counter"
            table_name = "visitors_terraform"
            max_connections = 2
            connection_timeout_secs = 1
            statement_timeout_ms = 250
            create_table = true
            "#,
        );
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.dropshot.bind_address.to_string(), "0.0.0.0:8080");
        assert!(matches!(config.log, ConfigLogging::File { .. }));
        assert_eq!(
            config.database.url().unwrap(),
            "postgresql://root@127.0.0.1:5432/counter"
        );
        assert_eq!(config.database.table_name.as_str(), "visitors_terraform");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.database.connection_timeout_secs, 1);
        assert_eq!(config.database.statement_timeout_ms, 250);
        assert!(config.database.create_table);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
            [database]
            table_name = "hits"
            "#,
        );
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.dropshot.bind_address.to_string(), "127.0.0.1:12344");
        assert!(matches!(config.log, ConfigLogging::StderrTerminal { .. }));
        assert_eq!(config.database.table_name.as_str(), "hits");
        assert_eq!(config.database.max_connections, 8);
        assert!(!config.database.create_table);
    }

    #[test]
    fn test_bad_table_name_in_file() {
        let file = write_config(
            r#"
            [database]
            table_name = "drop table; --"
            "#,
        );
        let error = Config::from_file(file.path()).err().unwrap();
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_partial_dropshot_section_keeps_default_address() {
        let file = write_config(
            r#"
            [dropshot]
            request_body_max_bytes = 4096
            "#,
        );
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.dropshot.bind_address.to_string(), "127.0.0.1:12344");
        assert_eq!(config.dropshot.request_body_max_bytes, 4096);
    }

    #[test]
    fn test_bad_bind_address_in_file() {
        let file = write_config(
            r#"
            [dropshot]
            bind_address = "not an address"
            "#,
        );
        let error = Config::from_file(file.path()).err().unwrap();
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such.toml");
        let error = Config::from_file(&path).err().unwrap();
        assert!(matches!(error, ConfigError::Io { .. }));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply(Overrides {
                database_url: Some("postgresql://db/counter".to_string()),
                table_name: Some("visitors_env".to_string()),
                bind_address: Some("127.0.0.1:9000".parse().unwrap()),
            })
            .unwrap();
        assert_eq!(config.database.url().unwrap(), "postgresql://db/counter");
        assert_eq!(config.database.table_name.as_str(), "visitors_env");
        assert_eq!(config.dropshot.bind_address.to_string(), "127.0.0.1:9000");

        // Nothing set means nothing changes.
        config.apply(Overrides::default()).unwrap();
        assert_eq!(config.database.table_name.as_str(), "visitors_env");

        let error = config
            .apply(Overrides {
                table_name: Some("visitors-env".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(error, ConfigError::TableName(_)));
        assert_eq!(config.database.table_name.as_str(), "visitors_env");
    }
}
