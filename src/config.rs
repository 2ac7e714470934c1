// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Provides sensible defaults so the daemon starts with no config at all
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub i18n: I18nConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Shared secret clients must present on registration. None accepts all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub correlation_ttl_secs: u64,
    #[serde(default = "default_ttl_secs")]
    pub auth_token_ttl_secs: u64,
    /// Fail command execution when a declared middleware is unregistered
    #[serde(default)]
    pub strict_middleware: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default = "default_enabled_plugins")]
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I18nConfig {
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Directory of `<lang>.toml` translation files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translations_dir: Option<String>,
}

fn default_execution_timeout_secs() -> u64 {
    30
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_enabled_plugins() -> Vec<String> {
    vec!["ping".to_string()]
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            client_secret: None,
            execution_timeout_secs: default_execution_timeout_secs(),
            correlation_ttl_secs: default_ttl_secs(),
            auth_token_ttl_secs: default_ttl_secs(),
            strict_middleware: false,
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_plugins(),
        }
    }
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            default_language: default_language(),
            translations_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable
    /// overrides. A missing file yields the defaults.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {path}"))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {path}"))?
        } else {
            Config {
                server: ServerConfig::default(),
                plugins: PluginsConfig::default(),
                i18n: I18nConfig::default(),
            }
        };

        // Override with environment variables if present
        if let Ok(val) = std::env::var("WRANGLE_CLIENT_SECRET") {
            if !val.is_empty() {
                config.server.client_secret = Some(val);
            }
        }
        if let Ok(val) = std::env::var("WRANGLE_PLUGINS") {
            config.plugins.enabled = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(val) = std::env::var("WRANGLE_TRANSLATIONS_DIR") {
            config.i18n.translations_dir = Some(val);
        }

        Ok(config)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.server.execution_timeout_secs)
    }

    pub fn correlation_ttl(&self) -> Duration {
        Duration::from_secs(self.server.correlation_ttl_secs)
    }

    pub fn auth_token_ttl(&self) -> Duration {
        Duration::from_secs(self.server.auth_token_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_file_missing() {
        let config = Config::load("/definitely/not/here.toml").unwrap();
        assert_eq!(config.server.execution_timeout_secs, 30);
        assert_eq!(config.plugins.enabled, vec!["ping"]);
        assert!(!config.server.strict_middleware);
    }

    #[test]
    fn test_parses_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
client_secret = "hunter2"
execution_timeout_secs = 5
strict_middleware = true

[plugins]
enabled = ["ping", "status"]
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.client_secret.as_deref(), Some("hunter2"));
        assert_eq!(config.execution_timeout(), Duration::from_secs(5));
        assert!(config.server.strict_middleware);
        assert_eq!(config.plugins.enabled, vec!["ping", "status"]);
    }
}
