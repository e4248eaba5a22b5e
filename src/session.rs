//! Browser Session Capabilities
//!
//! The narrow set of browser operations region detection and resolution need.
//! `ChromeDriver` implements it over CDP; tests implement it with scripted fakes.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A cookie as seen by (or written into) a browser session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,

    /// Cookie domain (e.g. ".example.com")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    #[serde(default = "default_cookie_path")]
    pub path: String,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: default_cookie_path(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

/// One alternative inside a locator: a CSS selector, optionally narrowed to
/// elements whose text contains `text`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorCandidate {
    pub css: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// An element locator made of alternatives tried in order.
///
/// Parsed from selector lists in the form sites and configs usually carry them:
/// comma separated CSS, where any entry may end in `:has-text("...")`.
///
/// ```
/// use region_webdriver::Locator;
///
/// let locator = Locator::parse(r#".country-selector, button:has-text("Region")"#);
/// assert_eq!(locator.candidates().len(), 2);
/// assert_eq!(locator.candidates()[1].text.as_deref(), Some("Region"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    raw: String,
    candidates: Vec<LocatorCandidate>,
}

impl Locator {
    pub fn parse(selector: &str) -> Self {
        let candidates = split_top_level(selector)
            .into_iter()
            .filter_map(|part| parse_candidate(&part))
            .collect();

        Self {
            raw: selector.trim().to_string(),
            candidates,
        }
    }

    /// A single plain CSS selector
    pub fn css(selector: &str) -> Self {
        Self {
            raw: selector.to_string(),
            candidates: vec![LocatorCandidate {
                css: selector.to_string(),
                text: None,
            }],
        }
    }

    /// A single CSS selector narrowed by contained text
    pub fn with_text(selector: &str, text: &str) -> Self {
        Self {
            raw: format!("{}:has-text(\"{}\")", selector, text),
            candidates: vec![LocatorCandidate {
                css: selector.to_string(),
                text: Some(text.to_string()),
            }],
        }
    }

    pub fn candidates(&self) -> &[LocatorCandidate] {
        &self.candidates
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split on commas that are not inside quotes, parentheses or brackets
fn split_top_level(selector: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in selector.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' | '[' => {
                    depth += 1;
                    current.push(c);
                }
                ')' | ']' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    parts.push(current);

    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn parse_candidate(part: &str) -> Option<LocatorCandidate> {
    const HAS_TEXT: &str = ":has-text(";

    let Some(start) = part.find(HAS_TEXT) else {
        return Some(LocatorCandidate {
            css: part.to_string(),
            text: None,
        });
    };

    let css = part[..start].trim();
    let inner = part[start + HAS_TEXT.len()..].trim_end();
    let inner = inner.strip_suffix(')')?.trim();
    let text = inner
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(inner);

    Some(LocatorCandidate {
        css: if css.is_empty() { "*" } else { css }.to_string(),
        text: Some(text.to_string()),
    })
}

/// Browser operations consumed by region detection and the resolution strategies.
///
/// Every method is one awaited round trip against a live session. Waits take an
/// explicit bound and fail with `BrowserError::Timeout` when it elapses.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to `url` and wait for the load event
    async fn goto(&self, url: &str) -> Result<()>;

    /// Reload the current page
    async fn reload(&self) -> Result<()>;

    /// Click the first visible element matching `locator`
    async fn click(&self, locator: &Locator) -> Result<()>;

    /// Wait until an element matching `locator` is visible
    async fn wait_for_selector(&self, locator: &Locator, timeout: Duration) -> Result<()>;

    /// Wait until the document is loaded and no new resources arrive for a short quiet window
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()>;

    async fn cookies(&self) -> Result<Vec<SessionCookie>>;

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()>;

    /// Read the given local-storage keys; absent keys are omitted
    async fn local_storage(&self, keys: &[&str]) -> Result<BTreeMap<String, String>>;

    async fn current_url(&self) -> Result<String>;

    async fn title(&self) -> Result<String>;

    async fn is_visible(&self, locator: &Locator) -> Result<bool>;

    /// Trimmed text of the first element matching `locator`, if any
    async fn text_content(&self, locator: &Locator) -> Result<Option<String>>;

    /// Language the browser advertises (drives the Accept-Language header)
    async fn navigator_language(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_selector_list() {
        let locator = Locator::parse(".location-selector, .region-selector, [data-testid=\"a,b\"]");

        let css: Vec<&str> = locator
            .candidates()
            .iter()
            .map(|c| c.css.as_str())
            .collect();
        assert_eq!(
            css,
            vec![".location-selector", ".region-selector", "[data-testid=\"a,b\"]"]
        );
        assert!(locator.candidates().iter().all(|c| c.text.is_none()));
    }

    #[test]
    fn test_parse_has_text() {
        let locator = Locator::parse(r#"a:has-text("United Kingdom"), li:has-text('UK, GB')"#);

        assert_eq!(locator.candidates().len(), 2);
        assert_eq!(locator.candidates()[0].css, "a");
        assert_eq!(
            locator.candidates()[0].text.as_deref(),
            Some("United Kingdom")
        );
        assert_eq!(locator.candidates()[1].css, "li");
        assert_eq!(locator.candidates()[1].text.as_deref(), Some("UK, GB"));
    }

    #[test]
    fn test_parse_bare_has_text_matches_any_element() {
        let locator = Locator::parse(r#":has-text("Post Code")"#);
        assert_eq!(locator.candidates()[0].css, "*");
    }

    #[test]
    fn test_parse_empty() {
        assert!(Locator::parse("  , ,").is_empty());
    }

    #[test]
    fn test_with_text_display() {
        let locator = Locator::with_text("span", "GBP");
        assert_eq!(locator.to_string(), r#"span:has-text("GBP")"#);
    }
}
