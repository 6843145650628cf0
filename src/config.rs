//! Configuration file parser for ~/.config/threatwire/config.toml.
//!
//! The config file is optional. A missing file yields `Config::default()`,
//! which carries the built-in source list and keyword taxonomy. Unknown keys
//! are accepted by serde but logged as warnings to surface typos.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::analysis::Taxonomy;
use crate::util::is_web_url;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// Values parsed but are inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Sources
// ============================================================================

/// How a source is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    /// RSS, Atom or JSON Feed document
    #[serde(alias = "rss")]
    Feed,
    /// Plain HTML page mined for article-like blocks
    #[serde(alias = "html")]
    PageScrape,
}

/// One configured news source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    pub url: String,
    pub mode: FetchMode,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl SourceConfig {
    pub fn new(id: &str, name: &str, url: &str, mode: FetchMode) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            url: url.to_owned(),
            mode,
            enabled: true,
        }
    }
}

pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new(
            "security_affairs",
            "Security Affairs",
            "https://securityaffairs.com/feed",
            FetchMode::Feed,
        ),
        SourceConfig::new(
            "bleeping_computer",
            "BleepingComputer",
            "https://www.bleepingcomputer.com/feed/",
            FetchMode::Feed,
        ),
        SourceConfig::new(
            "hacker_news_rss",
            "The Hacker News",
            "https://feeds.feedburner.com/TheHackersNews",
            FetchMode::Feed,
        ),
        SourceConfig::new(
            "cyware",
            "Cyware",
            "https://cyware.com/allnews.rss",
            FetchMode::Feed,
        ),
    ]
}

pub fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file path. `None` places `threats.db` next to the config file.
    pub database_path: Option<String>,

    /// Cap on entries or page blocks taken from one source per run.
    pub max_items_per_source: usize,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Randomized pre-request delay bounds in milliseconds.
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,

    /// Fixed pause between consecutive sources in milliseconds.
    pub source_pause_ms: u64,

    /// Background ingest interval in minutes. 0 = manual trigger only.
    pub refresh_interval_minutes: u64,

    /// Pool of User-Agent strings rotated across requests.
    pub user_agents: Vec<String>,

    pub sources: Vec<SourceConfig>,

    pub taxonomy: Taxonomy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            max_items_per_source: 20,
            request_timeout_secs: 30,
            min_delay_ms: 1000,
            max_delay_ms: 3000,
            source_pause_ms: 2000,
            refresh_interval_minutes: 0,
            user_agents: default_user_agents(),
            sources: default_sources(),
            taxonomy: Taxonomy::default(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "database_path",
        "max_items_per_source",
        "request_timeout_secs",
        "min_delay_ms",
        "max_delay_ms",
        "source_pause_ms",
        "refresh_interval_minutes",
        "user_agents",
        "sources",
        "taxonomy",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)`
    /// - Inconsistent values → `Err(ConfigError::Invalid)`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        tracing::info!(
            sources = config.sources.len(),
            enabled = config.enabled_sources().count(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Reject settings the fetcher cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "user_agents must contain at least one entry".into(),
            ));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        if self.max_items_per_source == 0 {
            return Err(ConfigError::Invalid(
                "max_items_per_source must be at least 1".into(),
            ));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate source id: {}",
                    source.id
                )));
            }
            if !is_web_url(&source.url) {
                return Err(ConfigError::Invalid(format!(
                    "source {} has a non-http(s) url: {}",
                    source.id, source.url
                )));
            }
        }
        Ok(())
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_minutes > 0)
            .then(|| Duration::from_secs(self.refresh_interval_minutes.saturating_mul(60)))
    }
}

// ============================================================================
// Tests
// ============================================================================
