//! Settings loading and validation
//!
//! Handles:
//! - Layered TOML files (`default.toml` then `user.toml`)
//! - `NEXTCLOUD_*` environment overrides (a `.env` file is honoured)
//! - Instance definitions, as tables or as compact `name; user; password; url` lines
//! - InfluxDB connection settings

use crate::error::ConfigError;
use figment::providers::{Env, Format, Toml};
use figment::value::{Uncased, UncasedStr};
use figment::Figment;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const ENV_PREFIX: &str = "NEXTCLOUD_";
pub const DEFAULT_FILES: [&str; 2] = ["default.toml", "user.toml"];

/// Validated, immutable settings for one daemon run
#[derive(Debug, Clone)]
pub struct Settings {
    pub instances: Vec<InstanceConfig>,
    pub request_timeout: Duration,
    pub reporting_interval: Duration,
    pub log_level: String,
    pub influxdb: InfluxConfig,
}

/// One Nextcloud server to poll, with request options resolved
#[derive(Clone, PartialEq)]
pub struct InstanceConfig {
    pub name: String,
    pub user: String,
    pub password: String,
    pub url: String,
    pub timeout: Duration,
    pub verify_ssl: bool,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub ssl: bool,
    pub verify_ssl: bool,
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8086,
            username: None,
            password: None,
            database: "nextcloud".to_string(),
            ssl: false,
            verify_ssl: true,
        }
    }
}

impl InfluxConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl fmt::Debug for InstanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceConfig")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"********")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .field("verify_ssl", &self.verify_ssl)
            .finish()
    }
}

impl fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("database", &self.database)
            .field("ssl", &self.ssl)
            .field("verify_ssl", &self.verify_ssl)
            .finish()
    }
}

/// Settings as written in files, before validation
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSettings {
    instances: Option<InstancesDef>,
    request_timeout: u64,
    request_verify_ssl: bool,
    reporting_interval: u64,
    log_level: String,
    influxdb: InfluxConfig,
}

impl Default for RawSettings {
    fn default() -> Self {
        Self {
            instances: None,
            request_timeout: 10,
            request_verify_ssl: true,
            reporting_interval: 60,
            log_level: "info".to_string(),
            influxdb: InfluxConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InstancesDef {
    Compact(String),
    List(Vec<InstanceDef>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InstanceDef {
    Compact(String),
    Table(InstanceTable),
}

#[derive(Debug, Deserialize)]
struct InstanceTable {
    name: String,
    user: String,
    password: String,
    url: String,
    timeout: Option<u64>,
    verify_ssl: Option<bool>,
}

impl Settings {
    /// Load settings from the given files, `.env` and the process environment
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Ok si .env n'existe pas
        Self::from_figment(Self::figment(paths))
    }

    /// Settings files in order, then `NEXTCLOUD_*` variables on top
    pub fn figment<P: AsRef<Path>>(paths: &[P]) -> Figment {
        let figment = paths.iter().fold(Figment::new(), |figment, path| {
            let path = path.as_ref();
            // Toml::file would also search parent directories
            if !path.exists() {
                debug!("Settings file {} not found, skipping", path.display());
                return figment;
            }
            debug!("Loading settings from {}", path.display());
            figment.merge(Toml::file(path))
        });

        figment.merge(Env::prefixed(ENV_PREFIX).map(env_key))
    }

    /// Extract and validate
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let raw: RawSettings = figment.extract()?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        if raw.request_timeout == 0 {
            return Err(invalid("REQUEST_TIMEOUT", "must be greater than zero"));
        }
        if raw.reporting_interval == 0 {
            return Err(invalid("REPORTING_INTERVAL", "must be greater than zero"));
        }
        if raw.log_level.parse::<tracing::Level>().is_err() {
            return Err(invalid(
                "LOG_LEVEL",
                &format!("unknown level `{}`", raw.log_level),
            ));
        }
        if raw.influxdb.database.trim().is_empty() {
            return Err(invalid("INFLUXDB_DATABASE", "must not be empty"));
        }

        let request_timeout = Duration::from_secs(raw.request_timeout);
        let defs = match raw.instances {
            None => return Err(ConfigError::MissingInstances),
            Some(InstancesDef::Compact(text)) => compact_lines(&text)
                .map(|line| InstanceDef::Compact(line.to_string()))
                .collect(),
            Some(InstancesDef::List(defs)) => defs,
        };

        let mut instances = Vec::with_capacity(defs.len());
        let mut seen = HashSet::new();
        for def in defs {
            let table = match def {
                InstanceDef::Table(table) => table,
                InstanceDef::Compact(line) => parse_compact(&line)?,
            };
            if table.name.trim().is_empty() || table.url.trim().is_empty() {
                return Err(ConfigError::InvalidInstance(table.name));
            }
            if !seen.insert(table.name.clone()) {
                return Err(ConfigError::DuplicateInstance(table.name));
            }

            instances.push(InstanceConfig {
                timeout: table
                    .timeout
                    .filter(|t| *t > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(request_timeout),
                verify_ssl: table.verify_ssl.unwrap_or(raw.request_verify_ssl),
                name: table.name,
                user: table.user,
                password: table.password,
                url: table.url,
            });
        }

        if instances.is_empty() {
            return Err(ConfigError::MissingInstances);
        }

        Ok(Settings {
            instances,
            request_timeout,
            reporting_interval: Duration::from_secs(raw.reporting_interval),
            log_level: raw.log_level.to_lowercase(),
            influxdb: raw.influxdb,
        })
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn compact_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

fn parse_compact(line: &str) -> Result<InstanceTable, ConfigError> {
    let parts: Vec<&str> = line.split("; ").map(str::trim).collect();
    match parts.as_slice() {
        [name, user, password, url] => Ok(InstanceTable {
            name: name.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            url: url.to_string(),
            timeout: None,
            verify_ssl: None,
        }),
        _ => Err(ConfigError::InvalidInstance(line.to_string())),
    }
}

/// `INFLUXDB_PORT` -> `influxdb.port`, other keys stay flat
fn env_key(key: &UncasedStr) -> Uncased<'_> {
    let key = key.as_str().to_ascii_lowercase();
    match key.strip_prefix("influxdb_") {
        Some(field) => format!("influxdb.{field}").into(),
        None => key.into(),
    }
}
