//! Process configuration, read once from the environment at startup.
//!
//! `DATABASE` is required and picks the backend; every other variable has a
//! default or is only needed by the backend that reads it.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tokio::time::Duration;
use tracing::{info, warn};

use crate::middleware::RateLimitConfig;
use crate::store::Backend;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE is not set; expected `mongodb` or `firestore`")]
    MissingBackend,

    #[error("unknown DATABASE `{0}`; expected `mongodb` or `firestore`")]
    UnknownBackend(String),

    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Deployment environment name, `development` unless `APP_ENV` says otherwise.
    pub env: String,
    pub log: LogConfig,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub enum DatabaseConfig {
    MongoDb(MongoConfig),
    Firestore(FirestoreConfig),
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    /// Falls back to the database named in the URI, then `test`.
    pub database: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// `host:port` of a Firestore emulator. Takes precedence over credentials.
    pub emulator_host: Option<String>,
    pub service_account: Option<ServiceAccountKey>,
}

#[derive(Clone)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn backend(&self) -> Backend {
        match self {
            DatabaseConfig::MongoDb(_) => Backend::MongoDb,
            DatabaseConfig::Firestore(_) => Backend::Firestore,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, which maps a variable name to
    /// its value. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let env = or_default(&var, "APP_ENV", "development");
        let log = LogConfig::from_lookup(&var);

        let backend: Backend = var("DATABASE").ok_or(ConfigError::MissingBackend)?.parse()?;
        let database = match backend {
            Backend::MongoDb => DatabaseConfig::MongoDb(MongoConfig {
                uri: var("MONGO_URI").ok_or(ConfigError::Missing("MONGO_URI"))?,
                database: var("MONGO_DATABASE"),
            }),
            Backend::Firestore => DatabaseConfig::Firestore(firestore_config(&var)?),
        };

        let rate_limit = RateLimitConfig::new(
            positive(parse_or(&var, "RATE_LIMIT_MAX", 100)?, "RATE_LIMIT_MAX")?,
            Duration::from_millis(positive(parse_or(&var, "RATE_LIMIT_WINDOW_MS", 60_000)?, "RATE_LIMIT_WINDOW_MS")?),
        );

        Ok(Self {
            host: or_default(&var, "HOST", "0.0.0.0"),
            port: parse_or(&var, "PORT", 8080)?,
            env,
            log,
            database,
            rate_limit,
        })
    }

    /// `host:port`, with IPv6 hosts bracketed.
    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn is_development(&self) -> bool {
        self.env == "development"
    }
}

impl LogConfig {
    /// Logging settings alone, so the subscriber can be installed before the
    /// rest of the configuration is read and validated.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// `LOG_LEVEL` wins when set; otherwise `debug` in development and
    /// `warn` anywhere else.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let development = var("APP_ENV").is_none_or(|env| env == "development");
        let level = var("LOG_LEVEL")
            .unwrap_or_else(|| (if development { "debug" } else { "warn" }).to_owned());
        let dir = var("LOG_DIR").unwrap_or_else(|| "logs".to_owned()).into();
        Self { level, dir }
    }
}

fn firestore_config(var: &impl Fn(&str) -> Option<String>) -> Result<FirestoreConfig, ConfigError> {
    let project_id = var("FIREBASE_PROJECT_ID").ok_or(ConfigError::Missing("FIREBASE_PROJECT_ID"))?;
    let emulator_host = var("FIRESTORE_EMULATOR_HOST");

    let service_account = match (var("FIREBASE_CLIENT_EMAIL"), var("FIREBASE_PRIVATE_KEY")) {
        (Some(client_email), Some(private_key)) => Some(ServiceAccountKey {
            client_email,
            // Keys pasted into .env files carry literal `\n` sequences.
            private_key: private_key.replace("\\n", "\n"),
            token_uri: or_default(var, "FIREBASE_TOKEN_URI", DEFAULT_TOKEN_URI),
        }),
        (None, None) => None,
        (None, Some(_)) => return Err(ConfigError::Missing("FIREBASE_CLIENT_EMAIL")),
        (Some(_), None) => return Err(ConfigError::Missing("FIREBASE_PRIVATE_KEY")),
    };

    match (&emulator_host, &service_account) {
        (None, None) => Err(ConfigError::Missing("FIREBASE_CLIENT_EMAIL and FIREBASE_PRIVATE_KEY")),
        (Some(host), _) => {
            info!("using Firestore emulator at {host}");
            Ok(FirestoreConfig { project_id, emulator_host, service_account })
        }
        (None, Some(_)) => Ok(FirestoreConfig { project_id, emulator_host, service_account }),
    }
}

fn or_default(var: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_owned()
    })
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + fmt::Display,
    T::Err: fmt::Display,
{
    match var(key) {
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            warn!("invalid {key} value `{raw}`: {e}");
            ConfigError::Invalid { key, reason: e.to_string() }
        }),
    }
}

/// A zero limit or window would switch rate limiting off.
fn positive<T>(value: T, key: &'static str) -> Result<T, ConfigError>
where
    T: PartialEq + Default,
{
    if value == T::default() {
        warn!("invalid {key} value: must be greater than zero");
        return Err(ConfigError::Invalid { key, reason: "must be greater than zero".into() });
    }
    Ok(value)
}
