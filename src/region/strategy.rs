//! Region Change Strategies
//!
//! Each strategy is one self-contained technique for making a session present as
//! the target region. Steps return `Result` so the resolver decides what a
//! failure means; none of them retries on its own.

use super::detector;
use super::signal::LocationState;
use super::target::TargetRegion;
use crate::config::ResolverConfig;
use crate::error::{BrowserError, Result};
use crate::session::{BrowserSession, Locator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use url::Url;

/// Technique used by a change attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyMethod {
    SetCookies,
    NavigateWithParam,
    UiSelect,
    /// Last-resort navigation carrying every override parameter
    ForcedNavigation,
}

impl StrategyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyMethod::SetCookies => "set-cookies",
            StrategyMethod::NavigateWithParam => "navigate-with-param",
            StrategyMethod::UiSelect => "ui-select",
            StrategyMethod::ForcedNavigation => "forced-navigation",
        }
    }
}

impl fmt::Display for StrategyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one change attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// The region was verified right after the attempt
    Succeeded,
    Failed,
    /// Completed without error but did not verify the region
    Indeterminate,
}

/// One try at altering session state
#[derive(Debug, Clone, Serialize)]
pub struct ChangeAttempt {
    pub method: StrategyMethod,

    /// Attempt number within its strategy (1-indexed)
    pub attempt: u32,

    pub outcome: AttemptOutcome,

    pub duration: Duration,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChangeAttempt {
    /// Record a non-verifying step: completion is indeterminate, any error is a failure
    pub fn from_step(method: StrategyMethod, attempt: u32, started: Instant, result: &Result<()>) -> Self {
        let (outcome, error) = match result {
            Ok(()) => (AttemptOutcome::Indeterminate, None),
            Err(e) => (AttemptOutcome::Failed, Some(e.to_string())),
        };

        Self {
            method,
            attempt,
            outcome,
            duration: started.elapsed(),
            error,
        }
    }

    /// Record a verifying step
    pub fn from_verified(
        method: StrategyMethod,
        attempt: u32,
        started: Instant,
        result: &Result<LocationState>,
    ) -> Self {
        let (outcome, error) = match result {
            Ok(state) if state.is_target_region => (AttemptOutcome::Succeeded, None),
            Ok(_) => (AttemptOutcome::Failed, None),
            Err(e) => (AttemptOutcome::Failed, Some(e.to_string())),
        };

        Self {
            method,
            attempt,
            outcome,
            duration: started.elapsed(),
            error,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.outcome == AttemptOutcome::Failed
    }
}

/// Write one cookie per location key, reload, and wait for the network to settle
pub async fn set_location_cookies<S>(session: &S, target: &TargetRegion, config: &ResolverConfig) -> Result<()>
where
    S: BrowserSession + ?Sized,
{
    let domain = match &config.cookie_domain {
        Some(domain) => domain.clone(),
        None => current_host(session).await?,
    };

    let cookies = target.location_cookies(Some(&domain));
    log::info!(
        "Setting {} location cookies for {} on {}",
        cookies.len(),
        target.code(),
        domain
    );

    session.set_cookies(&cookies).await?;
    session.reload().await?;
    session.wait_for_network_idle(config.network_idle_timeout()).await
}

/// Re-navigate to the current page with `params` replacing its query string
pub async fn navigate_with_params<S>(
    session: &S,
    params: &[(&str, String)],
    config: &ResolverConfig,
) -> Result<()>
where
    S: BrowserSession + ?Sized,
{
    let base = navigation_base(session, config).await?;
    let url = with_query(&base, params);
    log::info!("Navigating to {}", url);

    session.goto(url.as_str()).await?;
    session.wait_for_network_idle(config.network_idle_timeout()).await
}

/// One pass through the site's own location chooser, verified afterwards
pub async fn select_region_in_ui<S>(
    session: &S,
    target: &TargetRegion,
    location_selector: &Locator,
    config: &ResolverConfig,
) -> Result<LocationState>
where
    S: BrowserSession + ?Sized,
{
    log::debug!("Clicking location selector {}", location_selector);
    session.click(location_selector).await?;

    log::debug!("Waiting for {} option", target.code());
    session
        .wait_for_selector(target.option_locator(), config.step_timeout())
        .await?;

    session.click(target.option_locator()).await?;
    session.wait_for_network_idle(config.network_idle_timeout()).await?;

    Ok(detector::detect(session, target, location_selector).await)
}

/// Page the URL strategies start from: the current http(s) page, else the configured shop
async fn navigation_base<S>(session: &S, config: &ResolverConfig) -> Result<Url>
where
    S: BrowserSession + ?Sized,
{
    if let Ok(current) = session.current_url().await {
        if let Ok(url) = Url::parse(&current) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(url);
            }
        }
    }

    let shop_url = config.shop_url.as_deref().ok_or_else(|| {
        BrowserError::NavigationFailed(
            "Current page is not a web page and no shop_url is configured".to_string(),
        )
    })?;

    Url::parse(shop_url)
        .map_err(|e| BrowserError::NavigationFailed(format!("Invalid shop_url {}: {}", shop_url, e)))
}

async fn current_host<S>(session: &S) -> Result<String>
where
    S: BrowserSession + ?Sized,
{
    let current = session.current_url().await?;
    Url::parse(&current)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .ok_or_else(|| BrowserError::Cookie(format!("No cookie domain derivable from {}", current)))
}

/// Same path, query replaced by `params`, fragment dropped
pub fn with_query(base: &Url, params: &[(&str, String)]) -> Url {
    let mut url = base.clone();
    url.set_fragment(None);
    url.set_query(None);
    url.query_pairs_mut()
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
    url
}
