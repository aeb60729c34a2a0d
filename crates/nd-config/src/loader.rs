//! Config file loader: find a file, parse it as YAML, apply env overrides.

use crate::{ConfigError, Settings};
use std::env;
use std::path::PathBuf;
use tracing::info;

const CONFIG_PATHS: &[&str] = &[
    "config.yml",
    "config.yaml",
    "notifyd.yml",
    "./config/notifyd.yml",
    "/etc/notifyd/config.yml",
];

pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    pub fn load(&self) -> Result<Settings, ConfigError> {
        let mut settings = Settings::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "loading configuration from file");
            settings = Self::from_file(&path)?;
        }

        self.apply_env_overrides(&mut settings);
        Ok(settings)
    }

    fn from_file(path: &PathBuf) -> Result<Settings, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("NOTIFYD_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for path in CONFIG_PATHS {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    fn apply_env_overrides(&self, settings: &mut Settings) {
        if let Ok(val) = env::var("NOTIFYD_LISTEN") {
            settings.listen = val;
        }
        if let Ok(val) = env::var("NOTIFYD_DEBUG_PASSWORD") {
            settings.debug_password = Some(val);
        }
        if let Ok(val) = env::var("NOTIFYD_ICINGAWEB2_URL") {
            settings.icingaweb2_url = val;
        }
        if let Ok(val) = env::var("NOTIFYD_CHANNELS_DIR") {
            settings.channels_dir = val;
        }
        if let Ok(val) = env::var("NOTIFYD_API_TIMEOUT") {
            if let Ok(secs) = val.parse() {
                settings.api_timeout_secs = secs;
            }
        }
        if let Ok(val) = env::var("NOTIFYD_DATABASE_HOST") {
            settings.database.host = val;
        }
        if let Ok(val) = env::var("NOTIFYD_DATABASE_PORT") {
            if let Ok(port) = val.parse() {
                settings.database.port = port;
            }
        }
        if let Ok(val) = env::var("NOTIFYD_DATABASE_USER") {
            settings.database.user = val;
        }
        if let Ok(val) = env::var("NOTIFYD_DATABASE_PASSWORD") {
            settings.database.password = val;
        }
        if let Ok(val) = env::var("NOTIFYD_LOG_LEVEL") {
            settings.logging.level = val;
        }
        if let Ok(val) = env::var("NOTIFYD_LOG_OUTPUT") {
            settings.logging.output = val;
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "listen: \"0.0.0.0:9000\"\napi-timeout: 15\nchannels-dir: /opt/channels\n"
        )
        .unwrap();

        let loader = ConfigLoader::with_path(file.path());
        let settings = loader.load().unwrap();
        assert_eq!(settings.listen, "0.0.0.0:9000");
        assert_eq!(settings.api_timeout_secs, 15);
        assert_eq!(settings.channels_dir, "/opt/channels");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loader = ConfigLoader::with_path("/nonexistent/path/notifyd.yml");
        let settings = loader.load().unwrap();
        assert_eq!(settings.listen, Settings::default().listen);
    }
}
