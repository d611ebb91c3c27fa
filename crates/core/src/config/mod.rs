//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (CAG_*)
//! 2. TOML config file (if CAG_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Backing store selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// SQLite file at `db_path`.
    Sqlite,
    /// Process-local map, lost on restart.
    Memory,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (CAG_*)
/// 2. TOML config file (if CAG_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    ///
    /// Set via CAG_BIND_ADDR environment variable.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Which backing store holds cache and history.
    ///
    /// Set via CAG_STORE environment variable (`sqlite` or `memory`).
    #[serde(default = "default_store")]
    pub store: StoreKind,

    /// Path to SQLite database.
    ///
    /// Set via CAG_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Google Generative Language API key.
    ///
    /// Set via CAG_GOOGLE_API_KEY environment variable.
    /// Required only when a generation actually reaches the model.
    #[serde(default)]
    pub google_api_key: Option<String>,

    /// Model identifier passed to the generation backend.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Base URL for the generation backend.
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    /// User-Agent string for crawl requests.
    ///
    /// Set via CAG_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per crawl.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Upper bound for one crawl call, in milliseconds.
    #[serde(default = "default_crawl_timeout_ms")]
    pub crawl_timeout_ms: u64,

    /// Upper bound for one generation call, in milliseconds.
    #[serde(default = "default_generate_timeout_ms")]
    pub generate_timeout_ms: u64,

    /// Lifetime of cached crawl results, in seconds.
    #[serde(default = "default_crawl_ttl_secs")]
    pub crawl_ttl_secs: u64,

    /// Lifetime of cached model responses, in seconds.
    #[serde(default = "default_llm_ttl_secs")]
    pub llm_ttl_secs: u64,

    /// Requests per client per minute across all limited routes.
    #[serde(default = "default_general_per_minute")]
    pub general_per_minute: u32,

    /// Requests per client per minute on crawl-like routes.
    #[serde(default = "default_expensive_per_minute")]
    pub expensive_per_minute: u32,

    /// Number of prior turns folded into a CAG prompt.
    #[serde(default = "default_history_context_turns")]
    pub history_context_turns: usize,

    /// Share one upstream call between concurrent misses on the same key.
    #[serde(default)]
    pub single_flight: bool,

    /// Resolve crawl hosts and reject private/reserved answers.
    #[serde(default = "default_true")]
    pub resolve_dns: bool,

    /// Extra hostnames the URL guard always rejects.
    ///
    /// Set via CAG_DENYLIST_DOMAINS environment variable as an array, e.g. `[a.example,b.example]`.
    #[serde(default)]
    pub denylist_domains: Vec<String>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".into()
}

fn default_store() -> StoreKind {
    StoreKind::Sqlite
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./cag-cache.sqlite")
}

fn default_llm_model() -> String {
    "gemini-2.0-flash".into()
}

fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

fn default_user_agent() -> String {
    "cag-gateway/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_crawl_timeout_ms() -> u64 {
    20_000
}

fn default_generate_timeout_ms() -> u64 {
    60_000
}

fn default_crawl_ttl_secs() -> u64 {
    7_200
}

fn default_llm_ttl_secs() -> u64 {
    3_600
}

fn default_general_per_minute() -> u32 {
    30
}

fn default_expensive_per_minute() -> u32 {
    5
}

fn default_history_context_turns() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            store: default_store(),
            db_path: default_db_path(),
            google_api_key: None,
            llm_model: default_llm_model(),
            llm_base_url: default_llm_base_url(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            crawl_timeout_ms: default_crawl_timeout_ms(),
            generate_timeout_ms: default_generate_timeout_ms(),
            crawl_ttl_secs: default_crawl_ttl_secs(),
            llm_ttl_secs: default_llm_ttl_secs(),
            general_per_minute: default_general_per_minute(),
            expensive_per_minute: default_expensive_per_minute(),
            history_context_turns: default_history_context_turns(),
            single_flight: false,
            resolve_dns: true,
            denylist_domains: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn crawl_timeout(&self) -> Duration {
        Duration::from_millis(self.crawl_timeout_ms)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_millis(self.generate_timeout_ms)
    }

    pub fn crawl_ttl(&self) -> Duration {
        Duration::from_secs(self.crawl_ttl_secs)
    }

    pub fn llm_ttl(&self) -> Duration {
        Duration::from_secs(self.llm_ttl_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `CAG_`
    /// 2. TOML file from `CAG_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("CAG_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("CAG_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check if the Google API key is available (for deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the key is not set.
    pub fn require_google_api_key(&self) -> Result<&str, ConfigError> {
        self.google_api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::Missing {
                field: "google_api_key".into(),
                hint: "Set CAG_GOOGLE_API_KEY environment variable".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8000");
        assert_eq!(config.store, StoreKind::Sqlite);
        assert_eq!(config.db_path, PathBuf::from("./cag-cache.sqlite"));
        assert_eq!(config.user_agent, "cag-gateway/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.crawl_ttl_secs, 7_200);
        assert_eq!(config.llm_ttl_secs, 3_600);
        assert_eq!(config.general_per_minute, 30);
        assert_eq!(config.expensive_per_minute, 5);
        assert_eq!(config.history_context_turns, 5);
        assert!(!config.single_flight);
        assert!(config.resolve_dns);
        assert!(config.google_api_key.is_none());
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.crawl_timeout(), Duration::from_millis(20_000));
        assert_eq!(config.generate_timeout(), Duration::from_millis(60_000));
        assert!(config.llm_ttl() < config.crawl_ttl());
    }

    #[test]
    fn test_require_google_api_key_missing() {
        let config = AppConfig::default();
        assert!(matches!(config.require_google_api_key(), Err(ConfigError::Missing { .. })));

        let config = AppConfig { google_api_key: Some(String::new()), ..Default::default() };
        assert!(matches!(config.require_google_api_key(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_require_google_api_key_present() {
        let config = AppConfig { google_api_key: Some("test-key".into()), ..Default::default() };
        assert_eq!(config.require_google_api_key().unwrap(), "test-key");
    }

    #[test]
    fn test_store_kind_from_toml() {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string("store = \"memory\"\nexpensive_per_minute = 2"))
            .extract()
            .unwrap();
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.expensive_per_minute, 2);
    }
}
