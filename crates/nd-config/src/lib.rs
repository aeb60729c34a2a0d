//! Daemon settings, loaded from the YAML config file described in spec §6.
//!
//! This crate only produces a typed [`Settings`] value; standing up the
//! HTTP listener, debug endpoints, or a CLI from those settings is an
//! external collaborator's job (spec §1).

pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level settings, one field per row of spec §6's config table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Bind address of the external HTTP listener (owned by an external
    /// collaborator; carried here only because it's part of the file).
    pub listen: String,

    /// Enables debug endpoints iff non-empty.
    #[serde(rename = "debug-password")]
    pub debug_password: Option<String>,

    /// Base URL used to build object/incident URLs.
    #[serde(rename = "icingaweb2-url")]
    pub icingaweb2_url: String,

    /// Plugin directory root (spec §4.E: `{plugin_dir}/{type}`).
    #[serde(rename = "channels-dir")]
    pub channels_dir: String,

    /// Timeout in seconds for outbound API calls.
    #[serde(rename = "api-timeout")]
    pub api_timeout_secs: u64,

    pub database: DatabaseConfig,

    pub logging: LoggingConfig,

    /// Ambient: how often the runtime config store polls for changes
    /// (spec §4.D describes the fetch/apply mechanics but not a default
    /// cadence; the daemon needs one to actually run).
    pub config_poll_interval_secs: u64,

    /// Ambient: the 10-minute backlog window from spec §4.D, exposed so
    /// it's tunable instead of hard-coded.
    pub config_backlog_secs: u64,
}

impl Settings {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn config_poll_interval(&self) -> Duration {
        Duration::from_secs(self.config_poll_interval_secs)
    }

    pub fn config_backlog(&self) -> Duration {
        Duration::from_secs(self.config_backlog_secs)
    }

    pub fn debug_enabled(&self) -> bool {
        self.debug_password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:5680".to_string(),
            debug_password: None,
            icingaweb2_url: String::new(),
            channels_dir: "/etc/notifyd/channels".to_string(),
            api_timeout_secs: 30,
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            config_poll_interval_secs: 60,
            config_backlog_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            database: "notifications".to_string(),
            user: "notifications".to_string(),
            password: String::new(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub output: String,
    pub interval_secs: u64,
    /// Per-component level overrides, e.g. `{"nd_plugin": "debug"}".
    pub overrides: std::collections::BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: "text".to_string(),
            interval_secs: 20,
            overrides: std::collections::BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.api_timeout(), Duration::from_secs(30));
        assert!(!s.debug_enabled());
    }

    #[test]
    fn debug_enabled_requires_non_empty_password() {
        let mut s = Settings::default();
        s.debug_password = Some(String::new());
        assert!(!s.debug_enabled());
        s.debug_password = Some("hunter2".to_string());
        assert!(s.debug_enabled());
    }

    #[test]
    fn parses_minimal_yaml() {
        let yaml = r#"
listen: "0.0.0.0:5680"
icingaweb2-url: "https://icinga.example.com"
channels-dir: "/etc/notifyd/channels"
api-timeout: 45
database:
  host: db.internal
  port: 5432
  database: notify
  user: notify
  password: secret
logging:
  level: debug
  output: json
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.listen, "0.0.0.0:5680");
        assert_eq!(settings.api_timeout_secs, 45);
        assert_eq!(settings.database.host, "db.internal");
        assert_eq!(settings.logging.level, "debug");
    }
}
