//! Configuration loading from TOML files

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use margo_source::SourceConfig;

/// Global configuration for margo
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub lake: LakeConfig,
    pub source: SourceSection,
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LakeConfig {
    pub root: PathBuf,
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./lake"),
        }
    }
}

/// `[source]` section of the config file. The api key may be given as a
/// `${VAR}` reference so the secret stays out of the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub url: String,
    pub database: String,
    pub username: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            database: String::new(),
            username: String::new(),
            api_key: std::env::var("MARGO_API_KEY").ok(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default: usize,
    pub max: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            default: cpus.min(8),
            max: 16,
        }
    }
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./margo.toml (current directory)
    /// 2. ~/.config/margo/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("margo.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "margo") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Validated connection settings for commands that talk to the ERP.
    pub fn source(&self) -> Result<SourceConfig> {
        if self.source.url.is_empty() {
            anyhow::bail!("[source] url is not configured");
        }
        if self.source.database.is_empty() {
            anyhow::bail!("[source] database is not configured");
        }
        if self.source.username.is_empty() {
            anyhow::bail!("[source] username is not configured");
        }
        let api_key = self
            .source
            .api_key
            .clone()
            .context("[source] api_key is not configured (set MARGO_API_KEY or the config key)")?;
        Ok(SourceConfig {
            url: self.source.url.clone(),
            database: self.source.database.clone(),
            username: self.source.username.clone(),
            api_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.lake.root, PathBuf::from("./lake"));
        assert!(config.workers.default >= 1);
    }

    #[test]
    fn expand_env_var_simple() {
        std::env::set_var("MARGO_TEST_VAR", "test_value");
        assert_eq!(
            expand_env_var("${MARGO_TEST_VAR}"),
            Some("test_value".to_string())
        );
        std::env::remove_var("MARGO_TEST_VAR");
    }

    #[test]
    fn expand_env_var_literal() {
        assert_eq!(expand_env_var("literal"), Some("literal".to_string()));
    }

    #[test]
    fn expand_env_var_missing() {
        assert_eq!(expand_env_var("${NONEXISTENT_VAR_12345}"), None);
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[lake]
root = "/srv/lake"

[source]
url = "https://erp.example.com"
database = "prod"
username = "etl"
api_key = "secret"

[workers]
default = 4
max = 8
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.lake.root, PathBuf::from("/srv/lake"));
        assert_eq!(config.workers.default, 4);
        assert_eq!(config.workers.max, 8);

        let source = config.source().unwrap();
        assert_eq!(source.database, "prod");
        assert_eq!(source.api_key, "secret");
    }

    #[test]
    fn source_requires_url() {
        let config = Config::default();
        assert!(config.source().is_err());
    }
}
