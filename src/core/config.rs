use std::env;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_idle_timeout() -> u64 {
    30
}

/// Runtime configuration, loaded from an optional TOML file and overridden
/// by environment variables.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Credential for the text-generation backend.
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Consumer-side hardening: a live stream with no chunk for this many
    /// seconds is failed rather than awaited forever.
    #[serde(default = "default_idle_timeout")]
    pub stream_idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            bind: default_bind(),
            stream_idle_timeout_secs: default_idle_timeout(),
        }
    }
}

/// Errors that can occur when loading configuration from disk.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse config at {}: {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl Config {
    /// Load configuration from the default location and apply environment
    /// overrides. A missing file yields defaults, not an error.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from_path(&path)?,
            _ => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "permacommons", "pundit")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(key) = non_empty_env("PUNDIT_API_KEY").or_else(|| non_empty_env("OPENAI_API_KEY"))
        {
            self.api_key = Some(key);
        }
        if let Some(url) =
            non_empty_env("PUNDIT_BASE_URL").or_else(|| non_empty_env("OPENAI_BASE_URL"))
        {
            self.base_url = url;
        }
        if let Some(model) = non_empty_env("PUNDIT_MODEL") {
            self.model = model;
        }
        if let Some(bind) = non_empty_env("PUNDIT_BIND") {
            self.bind = bind;
        }
        if let Some(secs) = non_empty_env("PUNDIT_IDLE_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.stream_idle_timeout_secs = secs;
            }
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn missing_fields_take_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).expect("create config");
        writeln!(file, "model = \"gpt-4o\"").expect("write config");

        let config = Config::load_from_path(&path).expect("load config");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.bind, "127.0.0.1:3000");
        assert_eq!(config.stream_idle_timeout_secs, 30);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn invalid_toml_reports_parse_error_with_path() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "model = [broken").expect("write config");

        let err = Config::load_from_path(&path).expect_err("parse should fail");
        let message = err.to_string();
        assert!(message.contains("Failed to parse config"));
        assert!(message.contains("config.toml"));
        assert!(err.source().is_some());
    }

    #[test]
    fn missing_file_reports_read_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("absent.toml");

        let err = Config::load_from_path(&path).expect_err("read should fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
