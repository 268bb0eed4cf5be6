//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and scraping behavior settings
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Polling cadence and backoff settings
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Property lifecycle and persistence settings
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Listing filters
    #[serde(default)]
    pub filters: FilterConfig,

    /// Monitored search targets
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
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
        if self.scraper.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(AppError::validation("scraper.user_agents is empty"));
        }
        if self.scraper.timeout_secs == 0 {
            return Err(AppError::validation("scraper.timeout_secs must be > 0"));
        }
        if self.scraper.page_size == 0 {
            return Err(AppError::validation("scraper.page_size must be > 0"));
        }
        if self.scraper.max_pages == 0 {
            return Err(AppError::validation("scraper.max_pages must be > 0"));
        }
        if self.scraper.max_concurrent == 0 {
            return Err(AppError::validation("scraper.max_concurrent must be > 0"));
        }
        if self.schedule.active_min_secs > self.schedule.active_max_secs {
            return Err(AppError::validation(
                "schedule.active_min_secs must not exceed active_max_secs",
            ));
        }
        if self.schedule.idle_min_secs > self.schedule.idle_max_secs {
            return Err(AppError::validation(
                "schedule.idle_min_secs must not exceed idle_max_secs",
            ));
        }
        if self.schedule.max_scrapes_in_flight == 0 {
            return Err(AppError::validation(
                "schedule.max_scrapes_in_flight must be > 0",
            ));
        }
        if self.tracking.retention_days == 0 {
            return Err(AppError::validation("tracking.retention_days must be > 0"));
        }
        if self.targets.is_empty() {
            return Err(AppError::validation("No targets defined"));
        }
        for target in &self.targets {
            if target.id.trim().is_empty() {
                return Err(AppError::validation("target.id is empty"));
            }
            if target.search_url.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "target {} has no search_url",
                    target.id
                )));
            }
            if target.webhook_url.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "target {} has no webhook_url",
                    target.id
                )));
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            schedule: ScheduleConfig::default(),
            tracking: TrackingConfig::default(),
            filters: FilterConfig::default(),
            targets: Vec::new(),
        }
    }
}

/// HTTP client and scraping behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// User-Agent pool; one entry is picked per cycle
    #[serde(default = "defaults::user_agents")]
    pub user_agents: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between page requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent page requests within one target
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Listings per result page (the portal's pagination step)
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Hard cap on result pages fetched per cycle
    #[serde(default = "defaults::max_pages")]
    pub max_pages: usize,

    /// CSS selectors for the result markup
    #[serde(default)]
    pub selectors: SelectorConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agents: defaults::user_agents(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            page_size: defaults::page_size(),
            max_pages: defaults::max_pages(),
            selectors: SelectorConfig::default(),
        }
    }
}

/// CSS selectors for one result card and its fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Selector for one listing card
    #[serde(default = "defaults::card_selector")]
    pub card: String,

    /// Selector for the listing link element
    #[serde(default = "defaults::link_selector")]
    pub link: String,

    /// Attribute carrying the listing URL
    #[serde(default = "defaults::link_attr")]
    pub link_attr: String,

    /// Selector for the price element
    #[serde(default = "defaults::price_selector")]
    pub price: String,

    /// Selector for the address element
    #[serde(default = "defaults::address_selector")]
    pub address: String,

    /// Selector for the property-type element
    #[serde(default = "defaults::property_type_selector")]
    pub property_type: String,

    /// Selector for the status badge ("Under offer", "Sold STC")
    #[serde(default = "defaults::status_selector")]
    pub status: String,

    /// Selector for the added/reduced date line
    #[serde(default = "defaults::date_selector")]
    pub date: String,

    /// Selector for the main photo element
    #[serde(default = "defaults::image_selector")]
    pub image: String,

    /// Attribute carrying the photo URL
    #[serde(default = "defaults::image_attr")]
    pub image_attr: String,

    /// Selector for the agent link element
    #[serde(default = "defaults::agent_selector")]
    pub agent: String,

    /// Selector for the total result count element
    #[serde(default = "defaults::result_count_selector")]
    pub result_count: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            card: defaults::card_selector(),
            link: defaults::link_selector(),
            link_attr: defaults::link_attr(),
            price: defaults::price_selector(),
            address: defaults::address_selector(),
            property_type: defaults::property_type_selector(),
            status: defaults::status_selector(),
            date: defaults::date_selector(),
            image: defaults::image_selector(),
            image_attr: defaults::image_attr(),
            agent: defaults::agent_selector(),
            result_count: defaults::result_count_selector(),
        }
    }
}

/// Polling cadence, active windows and blocked backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local time-of-day windows with the short interval, "HH:MM-HH:MM"
    #[serde(default = "defaults::active_windows")]
    pub active_windows: Vec<String>,

    /// Interval bounds inside an active window, seconds
    #[serde(default = "defaults::active_min")]
    pub active_min_secs: u64,
    #[serde(default = "defaults::active_max")]
    pub active_max_secs: u64,

    /// Interval bounds outside active windows, seconds
    #[serde(default = "defaults::idle_min")]
    pub idle_min_secs: u64,
    #[serde(default = "defaults::idle_max")]
    pub idle_max_secs: u64,

    /// Ceiling for the blocked-response backoff, seconds
    #[serde(default = "defaults::backoff_max")]
    pub blocked_backoff_max_secs: u64,

    /// Cap on simultaneous outbound scrapes across all targets
    #[serde(default = "defaults::scrapes_in_flight")]
    pub max_scrapes_in_flight: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            active_windows: defaults::active_windows(),
            active_min_secs: defaults::active_min(),
            active_max_secs: defaults::active_max(),
            idle_min_secs: defaults::idle_min(),
            idle_max_secs: defaults::idle_max(),
            blocked_backoff_max_secs: defaults::backoff_max(),
            max_scrapes_in_flight: defaults::scrapes_in_flight(),
        }
    }
}

/// Property lifecycle and persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Directory holding one property-map file per target
    #[serde(default = "defaults::state_dir")]
    pub state_dir: String,

    /// Days a vanished property is kept before its record and artifact go
    #[serde(default = "defaults::retention_days")]
    pub retention_days: u32,

    /// Maximum allowed drop percentage before a scrape is treated as suspect
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,

    /// Minimum active baseline before the drop check applies
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            state_dir: defaults::state_dir(),
            retention_days: defaults::retention_days(),
            max_drop_percent: defaults::max_drop_percent(),
            min_baseline: defaults::min_baseline(),
        }
    }
}

/// Banned property-type lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Types excluded on a whole-string match
    #[serde(default = "defaults::banned_types")]
    pub banned_types: Vec<String>,

    /// Terms excluded on a substring match
    #[serde(default = "defaults::banned_type_terms")]
    pub banned_type_terms: Vec<String>,
}

impl FilterConfig {
    /// Whether a property type falls in a banned category.
    ///
    /// Exact terms match the whole type, substring terms match anywhere,
    /// both case-insensitively.
    pub fn is_banned(&self, property_type: &str) -> bool {
        let normalized = property_type.trim().to_lowercase();
        if normalized.is_empty() {
            return false;
        }
        if self
            .banned_types
            .iter()
            .any(|t| t.to_lowercase() == normalized)
        {
            return true;
        }
        self.banned_type_terms
            .iter()
            .any(|t| !t.is_empty() && normalized.contains(&t.to_lowercase()))
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            banned_types: defaults::banned_types(),
            banned_type_terms: defaults::banned_type_terms(),
        }
    }
}

/// One monitored search with its notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Stable identifier, also the state file name
    pub id: String,

    /// Portal search URL (page one; pagination is appended)
    pub search_url: String,

    /// Webhook endpoint receiving this target's notifications
    pub webhook_url: String,

    /// Optional display name for log output
    #[serde(default)]
    pub name: Option<String>,
}

impl TargetConfig {
    /// Display name falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

mod defaults {
    // Scraper defaults
    pub fn user_agents() -> Vec<String> {
        vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0".into(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0".into(),
        ]
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        350
    }
    pub fn max_concurrent() -> usize {
        2
    }
    pub fn page_size() -> usize {
        24
    }
    pub fn max_pages() -> usize {
        5
    }

    // Selector defaults (portal result markup)
    pub fn card_selector() -> String {
        "div.propertyCard:not(.propertyCard--featured)".into()
    }
    pub fn link_selector() -> String {
        "a.propertyCard-link".into()
    }
    pub fn link_attr() -> String {
        "href".into()
    }
    pub fn price_selector() -> String {
        "div.propertyCard-priceValue".into()
    }
    pub fn address_selector() -> String {
        "address.propertyCard-address".into()
    }
    pub fn property_type_selector() -> String {
        "h2.propertyCard-title".into()
    }
    pub fn status_selector() -> String {
        "span.propertyCard-tagTitle".into()
    }
    pub fn date_selector() -> String {
        "span.propertyCard-branchSummary-addedOrReduced".into()
    }
    pub fn image_selector() -> String {
        "img.propertyCard-img".into()
    }
    pub fn image_attr() -> String {
        "src".into()
    }
    pub fn agent_selector() -> String {
        "div.propertyCard-branchLogo a".into()
    }
    pub fn result_count_selector() -> String {
        "span.searchHeader-resultCount".into()
    }

    // Schedule defaults
    pub fn active_windows() -> Vec<String> {
        vec!["07:30-09:30".into(), "17:00-22:00".into()]
    }
    pub fn active_min() -> u64 {
        540
    }
    pub fn active_max() -> u64 {
        660
    }
    pub fn idle_min() -> u64 {
        900
    }
    pub fn idle_max() -> u64 {
        2700
    }
    pub fn backoff_max() -> u64 {
        3600
    }
    pub fn scrapes_in_flight() -> usize {
        2
    }

    // Tracking defaults
    pub fn state_dir() -> String {
        "data/state".into()
    }
    pub fn retention_days() -> u32 {
        14
    }
    pub fn max_drop_percent() -> u8 {
        50
    }
    pub fn min_baseline() -> usize {
        10
    }

    // Filter defaults
    pub fn banned_types() -> Vec<String> {
        vec![
            "park home".into(),
            "mobile home".into(),
            "houseboat".into(),
            "garage".into(),
            "parking".into(),
            "land".into(),
            "plot".into(),
        ]
    }
    pub fn banned_type_terms() -> Vec<String> {
        vec![
            "retirement".into(),
            "shared ownership".into(),
            "park home".into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_target() -> Config {
        Config {
            targets: vec![TargetConfig {
                id: "test".into(),
                search_url: "https://portal.example/find?area=BS1".into(),
                webhook_url: "https://hooks.example/abc".into(),
                name: None,
            }],
            ..Config::default()
        }
    }

    #[test]
    fn validate_config_with_target_ok() {
        assert!(config_with_target().validate().is_ok());
    }

    #[test]
    fn validate_rejects_no_targets() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_user_agents() {
        let mut config = config_with_target();
        config.scraper.user_agents = vec!["  ".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_interval_bounds() {
        let mut config = config_with_target();
        config.schedule.active_min_secs = 700;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_target_without_webhook() {
        let mut config = config_with_target();
        config.targets[0].webhook_url = "".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn banned_exact_match_is_case_insensitive() {
        let filters = FilterConfig::default();
        assert!(filters.is_banned("Park Home"));
        assert!(filters.is_banned("LAND"));
        assert!(!filters.is_banned("Detached house"));
    }

    #[test]
    fn banned_substring_match_is_case_insensitive() {
        let filters = FilterConfig::default();
        assert!(filters.is_banned("2 bedroom Retirement flat"));
        assert!(filters.is_banned("Shared Ownership apartment"));
        assert!(!filters.is_banned("3 bedroom terraced house"));
    }

    #[test]
    fn empty_type_is_not_banned() {
        let filters = FilterConfig::default();
        assert!(!filters.is_banned("   "));
    }
}
