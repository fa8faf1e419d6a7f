//! Service configuration loaded from the environment (and `.env` via dotenvy).
//!
//! Everything the service needs at startup lives in [`AppConfig`], which is
//! handed to the token service and the router at construction. Nothing is
//! read from the environment after that.

use std::env;
use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;

use crate::models::{Role, User};

/// Demo secret used when `TRAVEL_JWT_SECRET` is unset.
pub const DEFAULT_JWT_SECRET: &str = "horse battery staple";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}' ({reason})")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// When set, logs go to a daily rolling file in this directory instead of stdout.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub users: Vec<User>,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            data_dir: PathBuf::from("travel_data"),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl: Duration::hours(1),
            users: default_users(),
            log: LogConfig::default(),
        }
    }
}

/// The two built-in demo accounts.
pub fn default_users() -> Vec<User> {
    vec![
        User::new("Alice", "password", Role::Admin),
        User::new("Bob", "password", Role::User),
    ]
}

impl AppConfig {
    /// Load `.env` (if present) and build the config from `TRAVEL_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the config from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("TRAVEL_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("TRAVEL_PORT") {
            config.port = port.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidVar {
                    name: "TRAVEL_PORT",
                    value: port.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(dir) = lookup("TRAVEL_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(secret) = lookup("TRAVEL_JWT_SECRET") {
            if secret.is_empty() {
                return Err(ConfigError::InvalidVar {
                    name: "TRAVEL_JWT_SECRET",
                    value: secret,
                    reason: "must not be empty".to_string(),
                });
            }
            config.jwt_secret = secret;
        }
        if let Some(ttl) = lookup("TRAVEL_TOKEN_TTL_SECS") {
            let secs: i64 = ttl.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidVar {
                    name: "TRAVEL_TOKEN_TTL_SECS",
                    value: ttl.clone(),
                    reason: e.to_string(),
                }
            })?;
            if secs <= 0 {
                return Err(ConfigError::InvalidVar {
                    name: "TRAVEL_TOKEN_TTL_SECS",
                    value: ttl,
                    reason: "must be positive".to_string(),
                });
            }
            config.token_ttl = Duration::seconds(secs);
        }
        if let Some(users) = lookup("TRAVEL_USERS") {
            config.users = parse_users(&users)?;
        }
        if let Some(format) = lookup("TRAVEL_LOG_FORMAT") {
            config.log.format = match format.as_str() {
                "pretty" => LogFormat::Pretty,
                "json" => LogFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        name: "TRAVEL_LOG_FORMAT",
                        value: format,
                        reason: "expected 'pretty' or 'json'".to_string(),
                    })
                }
            };
        }
        if let Some(dir) = lookup("TRAVEL_LOG_DIR") {
            config.log.dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

/// Parse `name:password:role` entries separated by commas.
fn parse_users(raw: &str) -> Result<Vec<User>, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidVar {
        name: "TRAVEL_USERS",
        value: raw.to_string(),
        reason,
    };

    let mut users = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.splitn(3, ':').collect();
        if parts.len() != 3 || parts[0].is_empty() {
            return Err(invalid(format!("entry '{}' is not name:password:role", entry)));
        }
        let role: Role = parts[2].parse().map_err(invalid)?;
        users.push(User::new(parts[0], parts[1], role));
    }

    if users.is_empty() {
        return Err(invalid("no users listed".to_string()));
    }
    Ok(users)
}
