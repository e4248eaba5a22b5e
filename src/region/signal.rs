//! Location Signals
//!
//! Observations of where a session currently appears to be.

use super::target::TargetRegion;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel a location signal was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalSource {
    /// Visible text of the location-selector control
    ButtonText,
    /// Country/region query parameter of the current URL
    UrlParam,
    Cookie,
    LocalStorage,
    /// A visible region-specific element (currency, phone prefix, postcode label)
    PageMarker,
    UrlPath,
    /// Language the browser advertises in Accept-Language
    HttpHeader,
    TitleText,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::ButtonText => "button-text",
            SignalSource::UrlParam => "url-param",
            SignalSource::Cookie => "cookie",
            SignalSource::LocalStorage => "local-storage",
            SignalSource::PageMarker => "page-marker",
            SignalSource::UrlPath => "url-path",
            SignalSource::HttpHeader => "http-header",
            SignalSource::TitleText => "title-text",
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single raw observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSignal {
    pub source: SignalSource,

    /// Key the value was found under (cookie name, query key), when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    pub value: String,
}

impl LocationSignal {
    pub fn new(source: SignalSource, value: impl Into<String>) -> Self {
        Self {
            source,
            key: None,
            value: value.into(),
        }
    }

    pub fn keyed(source: SignalSource, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            source,
            key: Some(key.into()),
            value: value.into(),
        }
    }

    /// Whether this signal says the session presents as `target`.
    ///
    /// Text-valued sources are tested against the region pattern. URL paths and
    /// titles are tested for the region's markers. Page markers are only ever
    /// observed when visible, so they always count.
    pub fn matches(&self, target: &TargetRegion) -> bool {
        match self.source {
            SignalSource::PageMarker => true,
            SignalSource::UrlPath => target
                .path_markers()
                .iter()
                .any(|m| self.value.contains(m.as_str())),
            SignalSource::TitleText => target
                .title_markers()
                .iter()
                .any(|m| self.value.contains(m.as_str())),
            _ => target.matches(&self.value),
        }
    }
}

impl fmt::Display for LocationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}[{}]={}", self.source, key, self.value),
            None => write!(f, "{}={}", self.source, self.value),
        }
    }
}

/// Outcome of scanning signals against a target region
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationState {
    pub is_target_region: bool,

    /// The signal that decided it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<LocationSignal>,
}

impl LocationState {
    pub fn unmatched() -> Self {
        Self {
            is_target_region: false,
            matched: None,
        }
    }

    /// First matching signal wins; later ones are never consulted
    pub fn evaluate<I>(signals: I, target: &TargetRegion) -> Self
    where
        I: IntoIterator<Item = LocationSignal>,
    {
        signals
            .into_iter()
            .find(|s| s.matches(target))
            .map(|s| Self {
                is_target_region: true,
                matched: Some(s),
            })
            .unwrap_or_else(Self::unmatched)
    }
}
