//! Environment driven configuration.
//!
//! Call `dotenvy::dotenv()` before [`Config::from_env`] to pick up a `.env`
//! file. Every variable is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::traits::{ProductSelectors, ScraperConfig};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// A cookie applied to every outbound session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
struct CookieFile {
    #[serde(default)]
    cookies: Vec<Cookie>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub product_ttl: Duration,
    pub delivery_ttl: Duration,
    /// Where raw markup is archived; kept in memory when unset
    pub archive_dir: Option<PathBuf>,
    /// Where report fixtures are written
    pub report_dir: PathBuf,
    pub cookies: Vec<Cookie>,
    pub referral_tag: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub http_timeout: Duration,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            product_ttl: Duration::from_secs(300),
            delivery_ttl: Duration::from_secs(24 * 60 * 60),
            archive_dir: None,
            report_dir: PathBuf::from("reports"),
            cookies: Vec::new(),
            referral_tag: None,
            discord_webhook_url: None,
            http_timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let cookies = match non_empty_var("PRODUCT_COOKIES_FILE") {
            Some(path) => load_cookies(Path::new(&path))?,
            None => Vec::new(),
        };

        let config = Self {
            product_ttl: secs_var("PRODUCT_CACHE_TTL_SECS")?.unwrap_or(defaults.product_ttl),
            delivery_ttl: secs_var("DELIVERY_TTL_SECS")?.unwrap_or(defaults.delivery_ttl),
            archive_dir: non_empty_var("PRODUCT_ARCHIVE_PATH").map(PathBuf::from),
            report_dir: non_empty_var("PRODUCT_REPORT_PATH").map_or(defaults.report_dir, PathBuf::from),
            cookies,
            referral_tag: non_empty_var("REFERRAL_TAG"),
            discord_webhook_url: non_empty_var("DISCORD_WEBHOOK_URL"),
            http_timeout: secs_var("HTTP_TIMEOUT_SECS")?.unwrap_or(defaults.http_timeout),
            user_agent: non_empty_var("USER_AGENT").unwrap_or(defaults.user_agent),
        };

        if config.archive_dir.is_none() {
            warn!("PRODUCT_ARCHIVE_PATH not set - raw markup will only be kept in memory");
        }
        info!("Loaded {} session cookies", config.cookies.len());

        Ok(config)
    }

    /// Scraper settings for Amazon product pages
    pub fn scraper_config(&self) -> ScraperConfig {
        ScraperConfig {
            name: "Amazon".to_string(),
            base_url: "https://www.amazon.com".to_string(),
            user_agent: self.user_agent.clone(),
            timeout: self.http_timeout,
            cookies: self.cookies.clone(),
            selectors: ProductSelectors::default(),
            out_of_stock_text: "Currently unavailable.".to_string(),
        }
    }
}

/// Reads `{ "cookies": [{ "name": ..., "value": ... }] }`
pub fn load_cookies(path: &Path) -> Result<Vec<Cookie>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cookie file {}", path.display()))?;
    parse_cookies(&data).with_context(|| format!("Failed to parse cookie file {}", path.display()))
}

fn parse_cookies(data: &str) -> Result<Vec<Cookie>> {
    let file: CookieFile = serde_json::from_str(data)?;
    Ok(file.cookies)
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn secs_var(name: &str) -> Result<Option<Duration>> {
    non_empty_var(name)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .with_context(|| format!("{name} must be a whole number of seconds, got {v:?}"))
        })
        .transpose()
}
