//! Startup configuration.
//!
//! All options come from environment variables, read once at startup;
//! there is no hot reload. Only the upstream API token is required.

use std::env;

pub const DEFAULT_DATABASE_PATH: &str = "./wanikani.db";
pub const DEFAULT_API_PORT: u16 = 8080;
pub const DEFAULT_LOG_LEVEL: &str = "info";

const VALID_LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token for upstream fetches (`WANIKANI_API_TOKEN`).
    pub wanikani_api_token: String,
    /// Bearer token required on read-API requests (`LOCAL_API_TOKEN`).
    /// `None` leaves the API open; a warning is logged at startup.
    pub local_api_token: Option<String>,
    /// Local store location (`DATABASE_PATH`).
    pub database_path: String,
    /// TCP port of the read/trigger API (`API_PORT`).
    pub api_port: u16,
    /// Log verbosity (`LOG_LEVEL`): debug, info, warn, or error.
    pub log_level: String,
    /// Scheduled background sync period (`SYNC_INTERVAL_MINUTES`).
    /// 0 disables scheduling; syncs then run only via `POST /api/sync`.
    pub sync_interval_minutes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("WANIKANI_API_TOKEN is required")]
    MissingUpstreamToken,

    #[error("invalid {name} {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary lookup function. Tests use this to
    /// avoid mutating process-global environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let wanikani_api_token = lookup("WANIKANI_API_TOKEN")
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingUpstreamToken)?;

        let local_api_token = lookup("LOCAL_API_TOKEN").filter(|t| !t.is_empty());

        let database_path =
            lookup("DATABASE_PATH").unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let api_port = match lookup("API_PORT") {
            None => DEFAULT_API_PORT,
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "API_PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
        };

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        if !VALID_LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(ConfigError::Invalid {
                name: "LOG_LEVEL",
                value: log_level,
                reason: format!("must be one of {}", VALID_LOG_LEVELS.join(", ")),
            });
        }

        let sync_interval_minutes = match lookup("SYNC_INTERVAL_MINUTES") {
            None => 0,
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                name: "SYNC_INTERVAL_MINUTES",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
        };

        Ok(Self {
            wanikani_api_token,
            local_api_token,
            database_path,
            api_port,
            log_level,
            sync_interval_minutes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |name| map.get(name).map(|v| v.to_string())
    }

    #[test]
    fn upstream_token_is_required() {
        let err = Config::from_lookup(lookup(&[])).expect_err("must fail");
        assert!(matches!(err, ConfigError::MissingUpstreamToken));

        let err =
            Config::from_lookup(lookup(&[("WANIKANI_API_TOKEN", "")])).expect_err("must fail");
        assert!(matches!(err, ConfigError::MissingUpstreamToken));
    }

    #[test]
    fn defaults_apply_when_optionals_are_absent() {
        let config =
            Config::from_lookup(lookup(&[("WANIKANI_API_TOKEN", "wk-token")])).expect("valid");
        assert_eq!(config.wanikani_api_token, "wk-token");
        assert_eq!(config.local_api_token, None);
        assert_eq!(config.database_path, DEFAULT_DATABASE_PATH);
        assert_eq!(config.api_port, DEFAULT_API_PORT);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.sync_interval_minutes, 0);
    }

    #[test]
    fn empty_local_token_means_open_api() {
        let config = Config::from_lookup(lookup(&[
            ("WANIKANI_API_TOKEN", "wk-token"),
            ("LOCAL_API_TOKEN", ""),
        ]))
        .expect("valid");
        assert_eq!(config.local_api_token, None);
    }

    #[test]
    fn invalid_port_and_log_level_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("WANIKANI_API_TOKEN", "wk-token"),
            ("API_PORT", "eighty"),
        ]))
        .expect_err("must fail");
        assert!(matches!(err, ConfigError::Invalid { name: "API_PORT", .. }));

        let err = Config::from_lookup(lookup(&[
            ("WANIKANI_API_TOKEN", "wk-token"),
            ("LOG_LEVEL", "verbose"),
        ]))
        .expect_err("must fail");
        assert!(matches!(err, ConfigError::Invalid { name: "LOG_LEVEL", .. }));
    }

    #[test]
    fn overrides_take_effect() {
        let config = Config::from_lookup(lookup(&[
            ("WANIKANI_API_TOKEN", "wk-token"),
            ("LOCAL_API_TOKEN", "local-secret"),
            ("DATABASE_PATH", "/var/lib/wanimirror/mirror.db"),
            ("API_PORT", "9090"),
            ("LOG_LEVEL", "debug"),
            ("SYNC_INTERVAL_MINUTES", "60"),
        ]))
        .expect("valid");
        assert_eq!(config.local_api_token.as_deref(), Some("local-secret"));
        assert_eq!(config.database_path, "/var/lib/wanimirror/mirror.db");
        assert_eq!(config.api_port, 9090);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.sync_interval_minutes, 60);
    }
}
