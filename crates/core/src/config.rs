use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Session lifecycle tuning: rotation threshold, restart cooldown and the
/// per-unit attempt budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Successful operations after which the browser is recycled.
    #[serde(default = "default_max_operations")]
    pub max_operations: u32,
    #[serde(default = "default_restart_cooldown_secs")]
    pub restart_cooldown_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_operations() -> u32 {
    15
}

fn default_restart_cooldown_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    2
}

impl SessionConfig {
    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
            restart_cooldown_secs: default_restart_cooldown_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// "chrome" or "edge".
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_page_load_timeout_secs")]
    pub page_load_timeout_secs: u64,
    /// Upper bound on a single CDP round trip.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    /// Load `base_url` once on every fresh session before real work starts.
    #[serde(default = "default_true")]
    pub warmup: bool,
}

fn default_engine() -> String {
    "chrome".to_string()
}

fn default_true() -> bool {
    true
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_page_load_timeout_secs() -> u64 {
    60
}

fn default_command_timeout_secs() -> u64 {
    30
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            headless: true,
            window_width: default_window_width(),
            window_height: default_window_height(),
            page_load_timeout_secs: default_page_load_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            warmup: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default = "default_max_scrolls")]
    pub max_scrolls: u32,
    #[serde(default = "default_scroll_pause_ms")]
    pub scroll_pause_ms: u64,
    #[serde(default = "default_listing_timeout_secs")]
    pub listing_timeout_secs: u64,
    /// Pause after the result surface appears, before the first scroll.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_max_scrolls() -> u32 {
    15
}

fn default_scroll_pause_ms() -> u64 {
    1500
}

fn default_listing_timeout_secs() -> u64 {
    20
}

fn default_settle_ms() -> u64 {
    4000
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_scrolls: default_max_scrolls(),
            scroll_pause_ms: default_scroll_pause_ms(),
            listing_timeout_secs: default_listing_timeout_secs(),
            settle_ms: default_settle_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    #[serde(default = "default_detail_timeout_secs")]
    pub detail_timeout_secs: u64,
}

fn default_detail_timeout_secs() -> u64 {
    15
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            detail_timeout_secs: default_detail_timeout_secs(),
        }
    }
}

/// CSS selectors for the map site. Defaults match the current Google Maps
/// markup; override them in config when the markup shifts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    #[serde(default = "default_feed_selector")]
    pub feed: String,
    #[serde(default = "default_listing_anchor_selector")]
    pub listing_anchor: String,
    #[serde(default = "default_card_selector")]
    pub card: String,
    #[serde(default = "default_detail_title_selector")]
    pub detail_title: String,
    #[serde(default = "default_phone_selector")]
    pub phone: String,
    #[serde(default = "default_website_selector")]
    pub website: String,
}

fn default_feed_selector() -> String {
    "div[role=\"feed\"]".to_string()
}

fn default_listing_anchor_selector() -> String {
    "a.hfpxzc".to_string()
}

fn default_card_selector() -> String {
    "div.Nv2PK".to_string()
}

fn default_detail_title_selector() -> String {
    "h1.DUwDvf".to_string()
}

fn default_phone_selector() -> String {
    "[data-item-id^=\"phone\"]".to_string()
}

fn default_website_selector() -> String {
    "a[data-item-id=\"authority\"]".to_string()
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            feed: default_feed_selector(),
            listing_anchor: default_listing_anchor_selector(),
            card: default_card_selector(),
            detail_title: default_detail_title_selector(),
            phone: default_phone_selector(),
            website: default_website_selector(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Search keywords, in the order they are crawled.
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub target_locations: Vec<String>,
    #[serde(default = "default_harvest_file")]
    pub harvest_file: String,
    #[serde(default)]
    pub enriched_file: Option<String>,
    /// Older configs name the lead sheet this way.
    #[serde(default)]
    pub csv_filename: Option<String>,
    #[serde(default = "default_progress_file")]
    pub progress_file: String,
    /// Seconds.
    #[serde(default = "default_search_cooldown")]
    pub cooldown_between_searches: f64,
    /// Seconds.
    #[serde(default = "default_click_cooldown")]
    pub cooldown_between_clicks: f64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_phone_locale")]
    pub phone_locale: String,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub enrich: EnrichConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
}

fn default_harvest_file() -> String {
    "harvested_links.csv".to_string()
}

fn default_enriched_file() -> String {
    "enriched_leads.csv".to_string()
}

fn default_progress_file() -> String {
    "progress.json".to_string()
}

fn default_search_cooldown() -> f64 {
    3.0
}

fn default_click_cooldown() -> f64 {
    2.0
}

fn default_base_url() -> String {
    "https://www.google.com/maps".to_string()
}

fn default_phone_locale() -> String {
    "IN".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            target_locations: Vec::new(),
            harvest_file: default_harvest_file(),
            enriched_file: None,
            csv_filename: None,
            progress_file: default_progress_file(),
            cooldown_between_searches: default_search_cooldown(),
            cooldown_between_clicks: default_click_cooldown(),
            base_url: default_base_url(),
            phone_locale: default_phone_locale(),
            session: SessionConfig::default(),
            browser: BrowserConfig::default(),
            harvest: HarvestConfig::default(),
            enrich: EnrichConfig::default(),
            selectors: SelectorConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        debug!(
            path = %path.display(),
            keywords = config.categories.len(),
            locations = config.target_locations.len(),
            "Config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.categories.iter().all(|c| c.trim().is_empty()) {
            return Err(Error::Config("`categories` must list at least one keyword".into()));
        }
        if self.target_locations.iter().all(|l| l.trim().is_empty()) {
            return Err(Error::Config(
                "`target_locations` must list at least one location".into(),
            ));
        }
        if self.session.max_attempts == 0 {
            return Err(Error::Config("`session.max_attempts` must be at least 1".into()));
        }
        for (key, secs) in [
            ("cooldown_between_searches", self.cooldown_between_searches),
            ("cooldown_between_clicks", self.cooldown_between_clicks),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(Error::Config(format!("`{}` must be a non-negative number", key)));
            }
        }
        Ok(())
    }

    pub fn harvest_path(&self) -> PathBuf {
        PathBuf::from(&self.harvest_file)
    }

    pub fn enriched_path(&self) -> PathBuf {
        self.enriched_file
            .clone()
            .or_else(|| self.csv_filename.clone())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(default_enriched_file()))
    }

    pub fn progress_path(&self) -> PathBuf {
        PathBuf::from(&self.progress_file)
    }

    pub fn search_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_between_searches.max(0.0))
    }

    pub fn click_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.cooldown_between_clicks.max(0.0))
    }
}
