//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::IdentityPolicy;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Search query handed to the listing source
    #[serde(default)]
    pub scraping: ScrapingConfig,

    /// Where batches come from
    #[serde(default)]
    pub source: SourceConfig,

    /// Persisted store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Notification sink settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.scraping.results_wanted == 0 {
            return Err(AppError::validation("scraping.results_wanted must be > 0"));
        }
        if self.scraping.sites.is_empty() {
            return Err(AppError::validation("scraping.sites is empty"));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        match self.source.kind {
            SourceKind::Http if self.source.endpoint.trim().is_empty() => {
                return Err(AppError::validation(
                    "source.endpoint is required for the http source",
                ));
            }
            SourceKind::File if self.source.path.as_os_str().is_empty() => {
                return Err(AppError::validation(
                    "source.path is required for the file source",
                ));
            }
            _ => {}
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(AppError::validation("store.path is empty"));
        }
        if self.store.lock_timeout_secs == 0 {
            return Err(AppError::validation("store.lock_timeout_secs must be > 0"));
        }
        if self.notify.timeout_secs == 0 {
            return Err(AppError::validation("notify.timeout_secs must be > 0"));
        }
        if let Some(webhook) = self.notify.webhook() {
            url::Url::parse(webhook).map_err(|e| {
                AppError::validation(format!("notify.webhook_url is not a URL: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Search parameters for one fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapingConfig {
    #[serde(default)]
    pub search_term: String,

    #[serde(default)]
    pub location: String,

    /// Maximum number of listings requested per site
    #[serde(default = "defaults::results_wanted")]
    pub results_wanted: u32,

    /// Only listings posted within this many hours
    #[serde(default = "defaults::hours_old")]
    pub hours_old: u32,

    /// Country/region code understood by the source
    #[serde(default = "defaults::country_code")]
    pub country_code: String,

    /// Source-site identifiers to query
    #[serde(default = "defaults::sites")]
    pub sites: Vec<String>,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            location: String::new(),
            results_wanted: defaults::results_wanted(),
            hours_old: defaults::hours_old(),
            country_code: defaults::country_code(),
            sites: defaults::sites(),
        }
    }
}

/// Kind of listing source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Scraping service reached over HTTP
    #[default]
    Http,
    /// Batch read from a local JSON file
    File,
}

/// Listing source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Scraping service endpoint (http source)
    #[serde(default)]
    pub endpoint: String,

    /// Batch file (file source)
    #[serde(default)]
    pub path: PathBuf,

    /// Upper bound for one fetch, in seconds
    #[serde(default = "defaults::fetch_timeout")]
    pub timeout_secs: u64,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            endpoint: String::new(),
            path: PathBuf::new(),
            timeout_secs: defaults::fetch_timeout(),
            user_agent: defaults::user_agent(),
        }
    }
}

/// Store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Keyed SQLite table
    #[default]
    Sqlite,
    /// Whole-file CSV snapshot
    Csv,
}

/// Persisted store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default = "defaults::store_path")]
    pub path: PathBuf,

    /// Identity policy; fixed for the lifetime of a store
    #[serde(default)]
    pub identity: IdentityPolicy,

    /// How long to wait for the snapshot writer lock
    #[serde(default = "defaults::lock_timeout")]
    pub lock_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: defaults::store_path(),
            identity: IdentityPolicy::default(),
            lock_timeout_secs: defaults::lock_timeout(),
        }
    }
}

/// Notification sink settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Webhook URL; empty disables notifications
    #[serde(default)]
    pub webhook_url: String,

    /// Upper bound for one dispatch, in seconds
    #[serde(default = "defaults::notify_timeout")]
    pub timeout_secs: u64,

    /// Message template, see [`ListingRecord::format`](crate::models::ListingRecord::format)
    #[serde(default = "defaults::message_template")]
    pub template: String,
}

impl NotifyConfig {
    /// Configured webhook, if any.
    pub fn webhook(&self) -> Option<&str> {
        let url = self.webhook_url.trim();
        (!url.is_empty()).then_some(url)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            timeout_secs: defaults::notify_timeout(),
            template: defaults::message_template(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Append log output to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            file: None,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn results_wanted() -> u32 {
        20
    }
    pub fn hours_old() -> u32 {
        72
    }
    pub fn country_code() -> String {
        "USA".into()
    }
    pub fn sites() -> Vec<String> {
        vec!["glassdoor".into(), "linkedin".into()]
    }
    pub fn fetch_timeout() -> u64 {
        120
    }
    pub fn user_agent() -> String {
        concat!("jobwatch/", env!("CARGO_PKG_VERSION")).into()
    }
    pub fn store_path() -> PathBuf {
        PathBuf::from("data/jobs.db")
    }
    pub fn lock_timeout() -> u64 {
        30
    }
    pub fn notify_timeout() -> u64 {
        10
    }
    pub fn message_template() -> String {
        "**New Job Added!**\n**Title:** {title}\n**Company:** {company}\n**Location:** {location}\n🔗 [Apply Here]({job_url})".into()
    }
    pub fn log_level() -> String {
        "info".into()
    }
}
