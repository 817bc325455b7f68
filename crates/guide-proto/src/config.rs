use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Base URL of the schedule API.
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,
    /// Days of lookahead fetched for the primary channel.
    #[serde(default = "default_primary_lookahead_days")]
    pub primary_lookahead_days: i64,
    /// Days of lookahead fetched for the secondary channel (shorter window).
    #[serde(default = "default_secondary_lookahead_days")]
    pub secondary_lookahead_days: i64,
    /// Dimensions substituted into airing image templates.
    #[serde(default = "default_tile_width")]
    pub tile_width: u32,
    #[serde(default = "default_tile_height")]
    pub tile_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the provider activation service.
    #[serde(default = "default_activation_base_url")]
    pub base_url: String,
    /// TOML directory of provider display names and logos.
    #[serde(default = "default_providers_toml")]
    pub providers_toml: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            session_file: default_session_file(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            primary_lookahead_days: default_primary_lookahead_days(),
            secondary_lookahead_days: default_secondary_lookahead_days(),
            tile_width: default_tile_width(),
            tile_height: default_tile_height(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: default_activation_base_url(),
            providers_toml: default_providers_toml(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::ENGINE_TCP_PORT
}

fn default_session_file() -> PathBuf {
    platform::data_dir().join("session.json")
}

fn default_catalog_base_url() -> String {
    "https://guide-api.example.net/v1".to_string()
}

fn default_primary_lookahead_days() -> i64 {
    2
}

fn default_secondary_lookahead_days() -> i64 {
    1
}

fn default_tile_width() -> u32 {
    480
}

fn default_tile_height() -> u32 {
    270
}

fn default_activation_base_url() -> String {
    "https://activation.example.net/v1".to_string()
}

fn default_providers_toml() -> PathBuf {
    platform::config_dir().join("providers.toml")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.bind_address, "127.0.0.1");
        assert_eq!(config.engine.port, platform::ENGINE_TCP_PORT);
        assert!(config.catalog.primary_lookahead_days > config.catalog.secondary_lookahead_days);
        assert!(config.catalog.base_url.starts_with("https://"));
        assert!(config.auth.providers_toml.ends_with("guide/providers.toml"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [catalog]
            base_url = "https://stage.example.net/v1"
            "#,
        )
        .unwrap();
        assert_eq!(config.catalog.base_url, "https://stage.example.net/v1");
        assert_eq!(config.catalog.primary_lookahead_days, 2);
        assert_eq!(config.engine.port, platform::ENGINE_TCP_PORT);
    }
}
