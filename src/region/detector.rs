//! Region Detection
//!
//! Reads location signals from a live session in a fixed precedence order and
//! decides whether the session presents as the target region.

use super::signal::{LocationSignal, LocationState, SignalSource};
use super::target::{TargetRegion, LOCATION_KEYS, URL_PARAM_KEYS};
use crate::error::{BrowserError, Result};
use crate::session::{BrowserSession, Locator};

/// Precedence used by [`detect`]: explicit UI state, then network-visible state,
/// then content heuristics
pub const DETECTION_ORDER: [SignalSource; 7] = [
    SignalSource::ButtonText,
    SignalSource::UrlParam,
    SignalSource::Cookie,
    SignalSource::LocalStorage,
    SignalSource::PageMarker,
    SignalSource::UrlPath,
    SignalSource::TitleText,
];

/// Scan sources in [`DETECTION_ORDER`], stopping at the first matching signal.
///
/// A source that cannot be read counts as silent; the scan moves on.
pub async fn detect<S>(session: &S, target: &TargetRegion, location_selector: &Locator) -> LocationState
where
    S: BrowserSession + ?Sized,
{
    for source in DETECTION_ORDER {
        let signals = match read_source(session, source, target, location_selector).await {
            Ok(signals) => signals,
            Err(e) => {
                log::debug!("Could not read {} signal: {}", source, e);
                continue;
            }
        };

        for signal in &signals {
            log::debug!("Observed {}", signal);
        }

        let state = LocationState::evaluate(signals, target);
        if let Some(signal) = &state.matched {
            log::info!("Location is {} according to {}", target.code(), signal);
            return state;
        }
    }

    log::info!("No {} indicators found", target.code());
    LocationState::unmatched()
}

/// Every readable signal, without short-circuiting. Used for diagnostics.
pub async fn collect_signals<S>(
    session: &S,
    target: &TargetRegion,
    location_selector: &Locator,
) -> Vec<LocationSignal>
where
    S: BrowserSession + ?Sized,
{
    let mut all = Vec::new();

    for source in DETECTION_ORDER
        .iter()
        .copied()
        .chain(std::iter::once(SignalSource::HttpHeader))
    {
        match read_source(session, source, target, location_selector).await {
            Ok(signals) => all.extend(signals),
            Err(e) => log::debug!("Could not read {} signal: {}", source, e),
        }
    }

    all
}

/// Best-effort normalised location: selector text as shown, otherwise a
/// two-letter code from the URL, cookies or local storage
pub async fn current_location<S>(
    session: &S,
    target: &TargetRegion,
    location_selector: &Locator,
) -> Option<String>
where
    S: BrowserSession + ?Sized,
{
    for source in [
        SignalSource::ButtonText,
        SignalSource::UrlParam,
        SignalSource::Cookie,
        SignalSource::LocalStorage,
    ] {
        let Ok(signals) = read_source(session, source, target, location_selector).await else {
            continue;
        };

        for signal in signals {
            match source {
                SignalSource::ButtonText => return Some(signal.value),
                SignalSource::UrlParam => {
                    let is_country_key = signal.key.as_deref().is_some_and(|k| {
                        k.eq_ignore_ascii_case("country") || k.eq_ignore_ascii_case("countryCode")
                    });
                    if is_country_key && is_country_code(&signal.value) {
                        return Some(signal.value.to_ascii_uppercase());
                    }
                }
                _ => {
                    if is_country_code(&signal.value) {
                        return Some(signal.value.to_ascii_uppercase());
                    }
                    if target.matches(&signal.value) {
                        return Some(target.code().to_string());
                    }
                }
            }
        }
    }

    None
}

fn is_country_code(value: &str) -> bool {
    value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic())
}

async fn read_source<S>(
    session: &S,
    source: SignalSource,
    target: &TargetRegion,
    location_selector: &Locator,
) -> Result<Vec<LocationSignal>>
where
    S: BrowserSession + ?Sized,
{
    let signals: Vec<LocationSignal> = match source {
        SignalSource::ButtonText => session
            .text_content(location_selector)
            .await?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|t| LocationSignal::new(source, t))
            .into_iter()
            .collect(),

        SignalSource::UrlParam => {
            let current = session.current_url().await?;
            let parsed = url::Url::parse(&current).map_err(|e| {
                BrowserError::NavigationFailed(format!("Unparseable URL {}: {}", current, e))
            })?;
            parsed
                .query_pairs()
                .filter(|(k, _)| URL_PARAM_KEYS.iter().any(|key| key.eq_ignore_ascii_case(k)))
                .map(|(k, v)| LocationSignal::keyed(source, k, v))
                .collect()
        }

        SignalSource::Cookie => session
            .cookies()
            .await?
            .into_iter()
            .filter(|c| LOCATION_KEYS.iter().any(|key| key.eq_ignore_ascii_case(&c.name)))
            .map(|c| LocationSignal::keyed(source, c.name, c.value))
            .collect(),

        SignalSource::LocalStorage => session
            .local_storage(&LOCATION_KEYS)
            .await?
            .into_iter()
            .map(|(k, v)| LocationSignal::keyed(source, k, v))
            .collect(),

        SignalSource::PageMarker => {
            let mut visible = Vec::new();
            for marker in target.page_markers() {
                match session.is_visible(marker).await {
                    Ok(true) => visible.push(LocationSignal::new(source, marker.as_str())),
                    Ok(false) => {}
                    Err(e) => log::debug!("Marker {} unreadable: {}", marker, e),
                }
            }
            visible
        }

        SignalSource::UrlPath => vec![LocationSignal::new(source, session.current_url().await?)],

        SignalSource::TitleText => vec![LocationSignal::new(source, session.title().await?)],

        SignalSource::HttpHeader => session
            .navigator_language()
            .await?
            .map(|lang| LocationSignal::keyed(source, "Accept-Language", lang))
            .into_iter()
            .collect(),
    };

    Ok(signals)
}
