//! Target Regions
//!
//! What "presenting as a region" means for a session: the text pattern that
//! identifies it, the values written into cookies and URLs to request it, and the
//! page content that betrays it.

use crate::error::{BrowserError, Result};
use crate::session::{Locator, SessionCookie};
use regex::Regex;

/// Cookie and local-storage keys sites commonly use for location
pub const LOCATION_KEYS: [&str; 5] = ["country", "countryCode", "locale", "location", "region"];

/// Query parameters that carry a country/region request
pub const URL_PARAM_KEYS: [&str; 4] = ["country", "countryCode", "locale", "region"];

/// Extra query parameter only sent on the final forced navigation
pub const FORCE_PARAM_KEY: &str = "forceCountry";

#[derive(Debug, Clone)]
pub struct TargetRegion {
    code: String,
    name: String,
    aliases: Vec<String>,
    locale: String,
    pattern: Regex,
    option_locator: Locator,
    page_markers: Vec<Locator>,
    path_markers: Vec<String>,
    title_markers: Vec<String>,
}

impl TargetRegion {
    /// United Kingdom (`GB`, also known as `UK`)
    pub fn gb() -> Self {
        Self {
            code: "GB".to_string(),
            name: "United Kingdom".to_string(),
            aliases: vec!["UK".to_string()],
            locale: "en_GB".to_string(),
            pattern: region_pattern("GB", "United Kingdom", &["UK"]),
            option_locator: Locator::parse(concat!(
                "[data-testid=\"country-GB\"], [data-testid=\"country-UK\"], ",
                "[data-country=\"GB\"], [data-country=\"UK\"], ",
                "a:has-text(\"United Kingdom\"), a:has-text(\"UK\"), ",
                "button:has-text(\"United Kingdom\"), button:has-text(\"UK\"), ",
                ".country-option:has-text(\"United Kingdom\"), .country-option:has-text(\"UK\"), ",
                "li:has-text(\"United Kingdom\"), li:has-text(\"UK\")"
            )),
            page_markers: vec![
                Locator::with_text("p", "United Kingdom"),
                Locator::with_text("p", "UK"),
                Locator::with_text("span", "United Kingdom"),
                Locator::with_text("span", "UK"),
                Locator::with_text("span", "\u{a3}"),
                Locator::with_text("span", "GBP"),
                Locator::css("a[href^=\"tel:+44\"]"),
                Locator::with_text("p", "Post Code"),
            ],
            path_markers: vec![
                "/uk/".to_string(),
                "/gb/".to_string(),
                "country=GB".to_string(),
                "country=UK".to_string(),
            ],
            title_markers: vec!["UK".to_string(), "United Kingdom".to_string()],
        }
    }

    /// United States (`US`)
    pub fn us() -> Self {
        Self {
            code: "US".to_string(),
            name: "United States".to_string(),
            aliases: vec!["USA".to_string()],
            locale: "en_US".to_string(),
            pattern: region_pattern("US", "United States", &["USA"]),
            option_locator: Locator::parse(concat!(
                "[data-testid=\"country-US\"], [data-country=\"US\"], ",
                "a:has-text(\"United States\"), button:has-text(\"United States\"), ",
                ".country-option:has-text(\"United States\"), li:has-text(\"United States\")"
            )),
            page_markers: vec![
                Locator::with_text("span", "United States"),
                Locator::with_text("span", "USD"),
                Locator::css("a[href^=\"tel:+1\"]"),
                Locator::with_text("p", "ZIP Code"),
            ],
            path_markers: vec![
                "/us/".to_string(),
                "country=US".to_string(),
            ],
            title_markers: vec!["USA".to_string(), "United States".to_string()],
        }
    }

    /// Look up a region by ISO 3166 alpha-2 code (case-insensitive).
    ///
    /// `GB`/`UK` and `US` carry site markers; any other two-letter code gets a
    /// generic region matched by its code alone.
    pub fn from_code(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_uppercase();

        match code.as_str() {
            "GB" | "UK" => Ok(Self::gb()),
            "US" => Ok(Self::us()),
            _ if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) => {
                Ok(Self::generic(&code))
            }
            _ => Err(BrowserError::InvalidRegion(code)),
        }
    }

    fn generic(code: &str) -> Self {
        Self {
            code: code.to_string(),
            name: code.to_string(),
            aliases: Vec::new(),
            locale: format!("en_{}", code),
            pattern: region_pattern(code, code, &[]),
            option_locator: Locator::parse(&format!(
                "[data-testid=\"country-{code}\"], [data-country=\"{code}\"]"
            )),
            page_markers: Vec::new(),
            path_markers: vec![
                format!("/{}/", code.to_ascii_lowercase()),
                format!("country={}", code),
            ],
            title_markers: Vec::new(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// BCP 47 form of the locale (`en-GB`)
    pub fn language_tag(&self) -> String {
        self.locale.replace('_', "-")
    }

    pub fn option_locator(&self) -> &Locator {
        &self.option_locator
    }

    pub fn page_markers(&self) -> &[Locator] {
        &self.page_markers
    }

    pub fn path_markers(&self) -> &[String] {
        &self.path_markers
    }

    pub fn title_markers(&self) -> &[String] {
        &self.title_markers
    }

    /// Whether free text names this region
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Value written under a location key
    pub fn value_for_key(&self, key: &str) -> &str {
        if key.eq_ignore_ascii_case("locale") {
            &self.locale
        } else {
            &self.code
        }
    }

    /// One cookie per known location key
    pub fn location_cookies(&self, domain: Option<&str>) -> Vec<SessionCookie> {
        LOCATION_KEYS
            .iter()
            .map(|key| {
                let cookie = SessionCookie::new(*key, self.value_for_key(key));
                match domain {
                    Some(domain) => cookie.with_domain(domain),
                    None => cookie,
                }
            })
            .collect()
    }

    /// Query parameters requesting this region
    pub fn url_params(&self) -> Vec<(&'static str, String)> {
        URL_PARAM_KEYS
            .iter()
            .map(|key| (*key, self.value_for_key(key).to_string()))
            .collect()
    }

    /// Every override parameter at once, for the last-resort navigation
    pub fn forced_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![(FORCE_PARAM_KEY, self.code.clone())];
        params.extend(self.url_params());
        params
    }
}

/// Case-insensitive match on any term, not glued to other letters
/// (`en_GB` matches, `Ukraine` does not)
fn region_pattern(code: &str, name: &str, aliases: &[&str]) -> Regex {
    let alternatives = [code, name]
        .iter()
        .chain(aliases)
        .map(|t| {
            t.split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s*")
        })
        .collect::<Vec<_>>()
        .join("|");

    Regex::new(&format!(r"(?i)(?:^|[^a-z])(?:{})(?:[^a-z]|$)", alternatives))
        .expect("region pattern built from escaped terms is valid")
}
