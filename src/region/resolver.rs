//! Location Resolver
//!
//! Brings a browser session to a target region by layering strategies:
//!
//! 1. location cookies, then URL parameters (never retried, never verified on their own)
//! 2. a check; if the session already presents as the target, stop
//! 3. the site's location chooser, retried up to `max_retries` more times
//! 4. one forced navigation with every override parameter, then a last check
//!
//! No step failure escapes. The only failure a caller sees is `success == false`.

use super::detector;
use super::report::{ResolutionReport, ResolveState};
use super::signal::{LocationSignal, LocationState};
use super::strategy::{self, ChangeAttempt, StrategyMethod};
use super::target::TargetRegion;
use crate::config::ResolverConfig;
use crate::error::Result;
use crate::session::{BrowserSession, Locator};
use std::time::Instant;

pub struct LocationResolver {
    config: ResolverConfig,
    location_selector: Locator,
}

impl Default for LocationResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl LocationResolver {
    pub fn new(config: ResolverConfig) -> Self {
        let location_selector = config.location_selector_locator();
        Self {
            config,
            location_selector,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Whether the session currently presents as `target`
    pub async fn is_target_region<S>(&self, session: &S, target: &TargetRegion) -> bool
    where
        S: BrowserSession + ?Sized,
    {
        self.location_state(session, target).await.is_target_region
    }

    /// Like [`is_target_region`](Self::is_target_region), keeping the deciding signal
    pub async fn location_state<S>(&self, session: &S, target: &TargetRegion) -> LocationState
    where
        S: BrowserSession + ?Sized,
    {
        detector::detect(session, target, &self.location_selector).await
    }

    pub async fn current_location<S>(&self, session: &S, target: &TargetRegion) -> Option<String>
    where
        S: BrowserSession + ?Sized,
    {
        detector::current_location(session, target, &self.location_selector).await
    }

    pub async fn collect_signals<S>(&self, session: &S, target: &TargetRegion) -> Vec<LocationSignal>
    where
        S: BrowserSession + ?Sized,
    {
        detector::collect_signals(session, target, &self.location_selector).await
    }

    /// Write location cookies and reload. True when every step completed;
    /// the resulting region is not checked.
    pub async fn apply_cookie_strategy<S>(&self, session: &S, target: &TargetRegion) -> bool
    where
        S: BrowserSession + ?Sized,
    {
        !self.cookie_step(session, target).await.is_failure()
    }

    /// Re-navigate with region query parameters. True when navigation completed;
    /// the resulting region is not checked.
    pub async fn apply_url_parameter_strategy<S>(&self, session: &S, target: &TargetRegion) -> bool
    where
        S: BrowserSession + ?Sized,
    {
        !self.param_step(session, target).await.is_failure()
    }

    /// Use the site's location chooser, at most `max_retries + 1` times
    pub async fn apply_ui_strategy<S>(&self, session: &S, target: &TargetRegion, max_retries: u32) -> bool
    where
        S: BrowserSession + ?Sized,
    {
        let mut report = ResolutionReport::new(target.code().to_string(), max_retries);
        self.ui_steps(session, target, max_retries, &mut report)
            .await
            .is_target_region
    }

    /// Look up `code` and resolve it, returning only the verdict
    pub async fn resolve_region<S>(&self, session: &S, code: &str, max_retries: u32) -> Result<bool>
    where
        S: BrowserSession + ?Sized,
    {
        let target = TargetRegion::from_code(code)?;
        Ok(self.resolve(session, &target, max_retries).await.success)
    }

    /// Run the full strategy sequence against `session`
    pub async fn resolve<S>(&self, session: &S, target: &TargetRegion, max_retries: u32) -> ResolutionReport
    where
        S: BrowserSession + ?Sized,
    {
        let started = Instant::now();
        let mut report = ResolutionReport::new(target.code().to_string(), max_retries);
        log::info!(
            "Resolving location to {} ({} UI retries)",
            target.code(),
            max_retries
        );

        let cookies = self.cookie_step(session, target).await;
        log::info!("Location cookies set: {}", !cookies.is_failure());
        report.add_attempt(cookies);
        report.advance(ResolveState::CookieApplied);

        let params = self.param_step(session, target).await;
        log::info!("Navigation with region parameters: {}", !params.is_failure());
        report.add_attempt(params);
        report.advance(ResolveState::ParamApplied);

        let state = self.location_state(session, target).await;
        if state.is_target_region {
            log::info!("Location is {} after cookies and parameters", target.code());
            report.finish(true, state.matched, false, started.elapsed());
            return report;
        }

        let state = self.ui_steps(session, target, max_retries, &mut report).await;
        if state.is_target_region {
            report.finish(true, state.matched, false, started.elapsed());
            return report;
        }

        report.advance(ResolveState::FinalForcedNav);
        let step_started = Instant::now();
        let forced = strategy::navigate_with_params(session, &target.forced_params(), &self.config).await;
        report.add_attempt(ChangeAttempt::from_step(
            StrategyMethod::ForcedNavigation,
            1,
            step_started,
            &forced,
        ));

        // A final step that timed out counts as a failed check; other errors still get measured
        let state = match forced {
            Err(e) if e.is_timeout() => {
                log::warn!(
                    "[{}] final navigation timed out, treating location as not {}: {}",
                    StrategyMethod::ForcedNavigation,
                    target.code(),
                    e
                );
                LocationState::unmatched()
            }
            Err(e) => {
                log::warn!("[{}] final navigation failed: {}", StrategyMethod::ForcedNavigation, e);
                self.location_state(session, target).await
            }
            Ok(()) => self.location_state(session, target).await,
        };

        log::info!(
            "Final location check - is {}: {}",
            target.code(),
            state.is_target_region
        );
        report.finish(state.is_target_region, state.matched, true, started.elapsed());
        report
    }

    async fn cookie_step<S>(&self, session: &S, target: &TargetRegion) -> ChangeAttempt
    where
        S: BrowserSession + ?Sized,
    {
        let started = Instant::now();
        let result = strategy::set_location_cookies(session, target, &self.config).await;
        if let Err(e) = &result {
            log::warn!("[{}] attempt 1 failed: {}", StrategyMethod::SetCookies, e);
        }
        ChangeAttempt::from_step(StrategyMethod::SetCookies, 1, started, &result)
    }

    async fn param_step<S>(&self, session: &S, target: &TargetRegion) -> ChangeAttempt
    where
        S: BrowserSession + ?Sized,
    {
        let started = Instant::now();
        let result = strategy::navigate_with_params(session, &target.url_params(), &self.config).await;
        if let Err(e) = &result {
            log::warn!("[{}] attempt 1 failed: {}", StrategyMethod::NavigateWithParam, e);
        }
        ChangeAttempt::from_step(StrategyMethod::NavigateWithParam, 1, started, &result)
    }

    /// Returns the state from the first verified attempt, or an unmatched state
    async fn ui_steps<S>(
        &self,
        session: &S,
        target: &TargetRegion,
        max_retries: u32,
        report: &mut ResolutionReport,
    ) -> LocationState
    where
        S: BrowserSession + ?Sized,
    {
        let total = max_retries.saturating_add(1);

        for i in 0..total {
            report.advance(ResolveState::UiRetrying { attempt: i });
            log::info!("[{}] attempt {}/{}", StrategyMethod::UiSelect, i + 1, total);

            let started = Instant::now();
            let result =
                strategy::select_region_in_ui(session, target, &self.location_selector, &self.config).await;
            report.add_attempt(ChangeAttempt::from_verified(
                StrategyMethod::UiSelect,
                i + 1,
                started,
                &result,
            ));

            match result {
                Ok(state) if state.is_target_region => {
                    log::info!("Location is {} after UI attempt {}", target.code(), i + 1);
                    return state;
                }
                Ok(_) => log::info!(
                    "[{}] attempt {}/{}: location still not {}",
                    StrategyMethod::UiSelect,
                    i + 1,
                    total,
                    target.code()
                ),
                Err(e) => log::warn!(
                    "[{}] attempt {}/{} failed: {}",
                    StrategyMethod::UiSelect,
                    i + 1,
                    total,
                    e
                ),
            }

            if i < max_retries && !self.config.retry_delay().is_zero() {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }

        LocationState::unmatched()
    }
}
