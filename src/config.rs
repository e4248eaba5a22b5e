//! Resolver Configuration
//!
//! Timeouts, selectors and site details for region resolution. Every field has a
//! default so a config file only needs to name what it changes.

use crate::error::{BrowserError, Result};
use crate::session::Locator;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Selector list for the control that opens the country/region chooser
pub const DEFAULT_LOCATION_SELECTOR: &str = concat!(
    ".location-selector, .region-selector, .country-selector, ",
    "[data-testid=\"location-selector\"], [data-testid=\"region-selector\"], ",
    "[data-testid=\"country-selector\"], ",
    "button:has-text(\"Location\"), button:has-text(\"Region\"), button:has-text(\"Country\"), ",
    ".header-location, .country-selector-button, .location-button"
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Page to fall back to when the current URL cannot be used for re-navigation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_url: Option<String>,

    /// Domain for location cookies; the current page host when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie_domain: Option<String>,

    /// Selector list for the location-selector control
    pub location_selector: String,

    /// Bound on waiting for the region option to appear
    pub step_timeout_ms: u64,

    /// Bound on each network-idle wait
    pub network_idle_timeout_ms: u64,

    /// Pause between UI attempts
    pub retry_delay_ms: u64,

    /// Retries used when the caller does not pass a count
    pub default_max_retries: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            shop_url: None,
            cookie_domain: None,
            location_selector: DEFAULT_LOCATION_SELECTOR.to_string(),
            step_timeout_ms: 5_000,
            network_idle_timeout_ms: 5_000,
            retry_delay_ms: 1_000,
            default_max_retries: 2,
        }
    }
}

impl ResolverConfig {
    /// Load a config from a JSON file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            BrowserError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: ResolverConfig = serde_json::from_str(&content).map_err(|e| {
            BrowserError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.location_selector_locator().is_empty() {
            return Err(BrowserError::Config(
                "location_selector must name at least one selector".to_string(),
            ));
        }

        if self.step_timeout_ms == 0 || self.network_idle_timeout_ms == 0 {
            return Err(BrowserError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }

        if let Some(shop_url) = &self.shop_url {
            url::Url::parse(shop_url)
                .map_err(|e| BrowserError::Config(format!("Invalid shop_url {}: {}", shop_url, e)))?;
        }

        Ok(())
    }

    pub fn location_selector_locator(&self) -> Locator {
        Locator::parse(&self.location_selector)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn network_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.network_idle_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
