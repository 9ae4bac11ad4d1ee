//! Runtime configuration.
//!
//! Settings come from a dotenv-style key-value file plus the process environment.
//! Keys are grouped by section prefix: `API_BCRA_*` for the upstream API,
//! `REDSHIFT_*` for the warehouse and `ETL_*` for job tuning.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::database::LoadMode;
use crate::error::ConfigError;
use crate::models::DEFAULT_LOOKBACK_DAYS;

pub const API_SECTION: &str = "API_BCRA";
pub const WAREHOUSE_SECTION: &str = "REDSHIFT";
pub const ETL_SECTION: &str = "ETL";

pub const DEFAULT_BASE_URL: &str = "https://api.estadisticasbcra.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const DEFAULT_TABLE: &str = "bcra";

/// Warehouse flavour, selects the connection driver and DDL dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Redshift,
    Postgres,
    Sqlite,
}

impl Driver {
    pub fn default_port(self) -> u16 {
        match self {
            Driver::Redshift => 5439,
            Driver::Postgres => 5432,
            Driver::Sqlite => 0,
        }
    }

    pub fn default_schema(self) -> &'static str {
        match self {
            Driver::Redshift | Driver::Postgres => "public",
            Driver::Sqlite => "main",
        }
    }
}

impl FromStr for Driver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redshift" => Ok(Driver::Redshift),
            "postgres" | "postgresql" => Ok(Driver::Postgres),
            "sqlite" => Ok(Driver::Sqlite),
            other => Err(other.to_string()),
        }
    }
}

/// Upstream API settings
#[derive(Debug)]
pub struct ApiConfig {
    pub token: SecretString,
    pub base_url: String,
    pub timeout: Duration,
}

/// Warehouse connection and destination table
#[derive(Debug)]
pub struct WarehouseConfig {
    pub driver: Driver,
    pub host: String,
    pub port: u16,
    /// Database name, or the database file path for sqlite
    pub database: String,
    pub user: String,
    pub password: SecretString,
    pub schema: String,
    pub table: String,
}

impl WarehouseConfig {
    /// Connection URL with the password masked, safe to log
    pub fn redacted_url(&self) -> String {
        match self.driver {
            Driver::Sqlite => format!("sqlite:{}", self.database),
            Driver::Redshift | Driver::Postgres => format!(
                "postgres://{}:***@{}:{}/{}",
                self.user, self.host, self.port, self.database
            ),
        }
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Configuration for one ETL run
#[derive(Debug)]
pub struct Config {
    pub api: ApiConfig,
    pub warehouse: WarehouseConfig,
    pub batch_size: usize,
    pub lookback_days: u32,
    pub load_mode: LoadMode,
}

impl Config {
    /// Load configuration from an env file (or `.env` if present) and the environment.
    /// Variables already set in the environment take precedence over the file.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        let file_values = match env_file {
            Some(path) => read_env_file(path)?,
            // Load .env file if it exists
            None => match dotenvy::dotenv_iter() {
                Ok(iter) => iter.filter_map(Result::ok).collect(),
                Err(_) => HashMap::new(),
            },
        };

        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| file_values.get(key).cloned())
        })
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |section: &str, key: &str| {
            lookup(&format!("{section}_{key}")).filter(|v| !v.trim().is_empty())
        };
        let require = |section: &str, key: &str| {
            get(section, key).ok_or_else(|| ConfigError::Missing(format!("{section}_{key}")))
        };

        let api = ApiConfig {
            token: SecretString::from(require(API_SECTION, "API_TOKEN")?),
            base_url: get(API_SECTION, "BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(parse_or(
                API_SECTION,
                "TIMEOUT_SECS",
                get(API_SECTION, "TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )?),
        };

        let driver = match get(WAREHOUSE_SECTION, "DRIVER") {
            Some(raw) => raw.parse().map_err(|value| ConfigError::Invalid {
                key: format!("{WAREHOUSE_SECTION}_DRIVER"),
                value,
            })?,
            None => Driver::Redshift,
        };

        let warehouse = match driver {
            Driver::Sqlite => WarehouseConfig {
                driver,
                host: String::new(),
                port: 0,
                database: get(WAREHOUSE_SECTION, "DB").unwrap_or_else(|| "bcra.db".to_string()),
                user: String::new(),
                password: SecretString::from(String::new()),
                schema: get(WAREHOUSE_SECTION, "SCHEMA")
                    .unwrap_or_else(|| driver.default_schema().to_string()),
                table: get(WAREHOUSE_SECTION, "TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            },
            Driver::Redshift | Driver::Postgres => WarehouseConfig {
                driver,
                host: require(WAREHOUSE_SECTION, "HOST")?,
                port: parse_or(
                    WAREHOUSE_SECTION,
                    "PORT",
                    get(WAREHOUSE_SECTION, "PORT"),
                    driver.default_port(),
                )?,
                database: require(WAREHOUSE_SECTION, "DB")?,
                user: require(WAREHOUSE_SECTION, "USER")?,
                password: SecretString::from(require(WAREHOUSE_SECTION, "PASSWORD")?),
                schema: get(WAREHOUSE_SECTION, "SCHEMA")
                    .unwrap_or_else(|| driver.default_schema().to_string()),
                table: get(WAREHOUSE_SECTION, "TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
            },
        };
        validate_identifier(&format!("{WAREHOUSE_SECTION}_SCHEMA"), &warehouse.schema)?;
        validate_identifier(&format!("{WAREHOUSE_SECTION}_TABLE"), &warehouse.table)?;

        let batch_size: usize = parse_or(
            ETL_SECTION,
            "BATCH_SIZE",
            get(ETL_SECTION, "BATCH_SIZE"),
            DEFAULT_BATCH_SIZE,
        )?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: format!("{ETL_SECTION}_BATCH_SIZE"),
                value: "0".to_string(),
            });
        }

        let lookback_days: u32 = parse_or(
            ETL_SECTION,
            "LOOKBACK_DAYS",
            get(ETL_SECTION, "LOOKBACK_DAYS"),
            DEFAULT_LOOKBACK_DAYS,
        )?;
        // A one day look-back leaves an empty window
        if lookback_days < 2 {
            return Err(ConfigError::Invalid {
                key: format!("{ETL_SECTION}_LOOKBACK_DAYS"),
                value: lookback_days.to_string(),
            });
        }

        let load_mode = match get(ETL_SECTION, "LOAD_MODE") {
            Some(raw) => raw.parse().map_err(|value| ConfigError::Invalid {
                key: format!("{ETL_SECTION}_LOAD_MODE"),
                value,
            })?,
            None => LoadMode::Replace,
        };

        Ok(Config {
            api,
            warehouse,
            batch_size,
            lookback_days,
            load_mode,
        })
    }
}

/// Parse a dotenv-style file into key-value pairs without touching the process environment
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let file_error = |source| ConfigError::File {
        path: path.display().to_string(),
        source,
    };
    dotenvy::from_path_iter(path)
        .map_err(file_error)?
        .map(|item| item.map_err(file_error))
        .collect()
}

fn parse_or<T: FromStr>(
    section: &str,
    key: &str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: format!("{section}_{key}"),
            value,
        }),
        None => Ok(default),
    }
}

/// Schema and table names are interpolated into DDL, so only plain identifiers pass
fn validate_identifier(key: &str, value: &str) -> Result<(), ConfigError> {
    let mut chars = value.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}
