// spider_chrome re-exports chromiumoxide API
use crate::error::{BrowserError, Result};
use crate::geo::GeolocationSettings;
use crate::session::{BrowserSession, Locator, SessionCookie};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide_fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on a single navigation
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// How often bounded waits re-check the page
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// No new resources for this long counts as network idle
const IDLE_WINDOW: Duration = Duration::from_millis(500);

pub struct ChromeDriver {
    browser: Browser,
    temp_dir: Option<PathBuf>,
}

/// Connection mode for Chrome browser
pub enum ConnectionMode {
    /// Sandboxed mode - launches Chrome using system installation
    Sandboxed {
        chrome_path: Option<String>,
        no_sandbox: bool,
        headless: bool,
    },
    /// Advanced mode - connects to existing Chrome on debug port
    DebugPort(u16),
}

#[derive(Debug, Deserialize)]
struct TextLookup {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoadProgress {
    #[serde(rename = "readyState")]
    ready_state: String,
    resources: usize,
}

impl ChromeDriver {
    /// Helper method to get the current active page, excluding Chrome's new-tab-page
    async fn get_active_page(&self) -> Result<chromiumoxide::page::Page> {
        let pages = self.browser.pages().await?;

        // Filter out chrome://new-tab-page/ and return the first real page
        // If no real pages exist, return the last page (most recently created)
        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if !url.starts_with("chrome://") {
                    return Ok(page.clone());
                }
            }
        }

        if let Some(page) = pages.last() {
            return Ok(page.clone());
        }

        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to create page: {}", e)))
    }

    /// Create new ChromeDriver with specified connection mode
    pub async fn new(mode: ConnectionMode) -> Result<Self> {
        let (browser, temp_dir) = match mode {
            ConnectionMode::Sandboxed {
                chrome_path,
                no_sandbox,
                headless,
            } => {
                // Unique profile per instance so parallel sessions never share cookies or storage
                let unique_id = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                let temp_dir = std::env::temp_dir()
                    .join(format!("region-webdriver-{}-{}", std::process::id(), unique_id));
                std::fs::create_dir_all(&temp_dir).map_err(|e| {
                    BrowserError::LaunchFailed(format!("Failed to create temp directory: {}", e))
                })?;

                let mut config = if headless {
                    BrowserConfig::builder()
                } else {
                    BrowserConfig::builder().with_head()
                };

                config = config.user_data_dir(&temp_dir);

                // Linux AppArmor workaround
                if no_sandbox {
                    config = config.arg("--no-sandbox");
                }

                if let Some(path) = chrome_path {
                    config = config.chrome_executable(path);
                } else {
                    match Self::ensure_chrome_installed().await {
                        Ok(path) => {
                            config = config.chrome_executable(path);
                        }
                        Err(e) => {
                            log::warn!("Auto-download failed ({}), trying system Chrome...", e);
                        }
                    }
                }

                let config = config.build().map_err(|e| {
                    BrowserError::LaunchFailed(format!(
                        "{}. \n\n\
                         Chrome not found. You can:\n\
                         - Install Chrome: https://www.google.com/chrome/\n\
                         - Ubuntu/Debian: sudo apt install chromium-browser\n\
                         - Or specify path: --chrome-path /path/to/chrome\n\
                         - Linux sandbox issue? Try: --no-sandbox",
                        e
                    ))
                })?;

                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

                tokio::spawn(async move {
                    while (handler.next().await).is_some() {
                        // Handle browser events
                    }
                });

                (browser, Some(temp_dir))
            }
            ConnectionMode::DebugPort(port) => {
                let url = format!("http://localhost:{}", port);
                let (browser, mut handler) = Browser::connect(&url).await.map_err(|e| {
                    BrowserError::ConnectionFailed(format!(
                        "Failed to connect to Chrome on port {}. \
                             Make sure Chrome is running with --remote-debugging-port={}: {}",
                        port, port, e
                    ))
                })?;

                tokio::spawn(async move {
                    while (handler.next().await).is_some() {
                        // Handle browser events
                    }
                });

                (browser, None)
            }
        };

        Ok(Self { browser, temp_dir })
    }

    /// Navigate to a URL and wait for it to load
    pub async fn navigate(&self, url: &str) -> Result<()> {
        // Normalize URL - add https:// if no protocol specified
        let normalized_url = if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
            && !url.starts_with("about:")
            && !url.starts_with("data:")
        {
            log::debug!("Normalizing URL: {} -> https://{}", url, url);
            format!("https://{}", url)
        } else {
            url.to_string()
        };

        log::info!("Navigating to: {}", normalized_url);
        let page = self.get_active_page().await?;

        match tokio::time::timeout(NAVIGATION_TIMEOUT, page.goto(normalized_url.as_str())).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                // "oneshot canceled" means the browser connection is dead
                if e.to_string().contains("oneshot canceled") {
                    Err(BrowserError::NavigationFailed(
                        "Browser connection lost. The browser may have been closed or crashed."
                            .to_string(),
                    ))
                } else {
                    Err(BrowserError::NavigationFailed(format!(
                        "Failed to navigate to {}: {}",
                        normalized_url, e
                    )))
                }
            }
            Err(_) => Err(BrowserError::timeout(
                format!("navigation to {}", normalized_url),
                NAVIGATION_TIMEOUT,
            )),
        }
    }

    /// Take a screenshot of the current page
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        let page = self.get_active_page().await?;

        page.screenshot(chromiumoxide::page::ScreenshotParams::default())
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to take screenshot: {}", e)))
    }

    /// Take a screenshot and save to file
    pub async fn screenshot_to_file(&self, path: &Path) -> Result<()> {
        let screenshot_data = self.screenshot().await?;

        tokio::fs::write(path, screenshot_data)
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to write screenshot: {}", e)))?;

        Ok(())
    }

    /// Execute JavaScript and return a specific type
    pub async fn execute_script_typed<T: serde::de::DeserializeOwned>(
        &self,
        script: &str,
    ) -> Result<T> {
        let page = self.get_active_page().await?;

        let result = page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;

        result
            .into_value()
            .map_err(|e| BrowserError::Script(format!("Failed to deserialize result: {}", e)))
    }

    /// Make the browser itself present as a region: geolocation, locale, and the
    /// Accept-Language header sent with every request
    pub async fn apply_geolocation(&self, settings: &GeolocationSettings) -> Result<()> {
        use chromiumoxide::cdp::browser_protocol::browser::{GrantPermissionsParams, PermissionType};
        use chromiumoxide::cdp::browser_protocol::emulation::{
            SetGeolocationOverrideParams, SetLocaleOverrideParams, SetUserAgentOverrideParams,
        };

        let page = self.get_active_page().await?;

        self.browser
            .execute(GrantPermissionsParams::new(vec![PermissionType::Geolocation]))
            .await?;

        page.execute(
            SetGeolocationOverrideParams::builder()
                .latitude(settings.latitude)
                .longitude(settings.longitude)
                .accuracy(settings.accuracy)
                .build(),
        )
        .await?;

        page.execute(
            SetLocaleOverrideParams::builder()
                .locale(settings.locale.replace('-', "_"))
                .build(),
        )
        .await?;

        let user_agent: String = self.execute_script_typed("navigator.userAgent").await?;
        let params = SetUserAgentOverrideParams::builder()
            .user_agent(user_agent)
            .accept_language(settings.locale.clone())
            .build()
            .map_err(BrowserError::Other)?;
        page.execute(params).await?;

        log::info!(
            "Browser geolocation set to {} ({}, {})",
            settings.locale,
            settings.latitude,
            settings.longitude
        );
        Ok(())
    }

    /// Close the browser connection
    pub async fn close(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| BrowserError::Other(e.to_string()))?;
        Ok(())
    }

    /// Ensure Chrome is installed, downloading if necessary
    async fn ensure_chrome_installed() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| BrowserError::Other("Cannot determine cache directory".to_string()))?
            .join("region-webdriver")
            .join("chrome");

        tokio::fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to create cache dir: {}", e)))?;

        let revision_info_path = cache_dir.join(".downloaded");
        if revision_info_path.exists() {
            if let Some(executable) = Self::find_chrome_in_cache(&cache_dir) {
                return Ok(executable);
            }
        }

        log::info!("Downloading Chrome for Testing (first time only, ~150MB)...");
        let fetcher = BrowserFetcher::new(
            BrowserFetcherOptions::builder()
                .with_path(&cache_dir)
                .build()
                .map_err(|e| BrowserError::Other(format!("Fetcher config failed: {}", e)))?,
        );

        let info = fetcher
            .fetch()
            .await
            .map_err(|e| BrowserError::Other(format!("Chrome download failed: {}", e)))?;

        tokio::fs::write(&revision_info_path, "downloaded")
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to write marker: {}", e)))?;

        log::info!("Chrome downloaded to {}", info.executable_path.display());

        Ok(info.executable_path)
    }

    fn find_chrome_in_cache(cache_dir: &Path) -> Option<PathBuf> {
        [
            "chrome",
            "chrome.exe",
            "Google Chrome.app/Contents/MacOS/Google Chrome",
            "chrome-linux/chrome",
            "chrome-mac/Chromium.app/Contents/MacOS/Chromium",
            "chrome-win/chrome.exe",
        ]
        .iter()
        .map(|p| cache_dir.join(p))
        .find(|p| p.exists())
    }

    async fn poll_until_visible(&self, locator: &Locator) -> Result<()> {
        loop {
            if self.is_visible(locator).await? {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Resolves once the document is complete and the resource count has held
    /// still for `IDLE_WINDOW`
    async fn poll_until_idle(&self) -> Result<()> {
        let mut last_count = None;
        let mut quiet_since = tokio::time::Instant::now();

        loop {
            let progress: LoadProgress = self.execute_script_typed(LOAD_PROGRESS_SCRIPT).await?;

            if last_count != Some(progress.resources) {
                last_count = Some(progress.resources);
                quiet_since = tokio::time::Instant::now();
            } else if progress.ready_state == "complete" && quiet_since.elapsed() >= IDLE_WINDOW {
                return Ok(());
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Run a locator script; `action` is the body run with `find(onlyVisible)` in scope
    async fn run_locator<T: serde::de::DeserializeOwned>(
        &self,
        locator: &Locator,
        action: &str,
    ) -> Result<T> {
        self.execute_script_typed(&locator_script(locator, action)?)
            .await
    }
}

/// In-page lookup for a locator. Text filters match case-insensitively, like
/// `:has-text()` does in Playwright selectors.
fn locator_script(locator: &Locator, action: &str) -> Result<String> {
    let candidates = serde_json::to_string(locator.candidates())
        .map_err(|e| BrowserError::Script(format!("Failed to encode locator: {}", e)))?;

    Ok(format!(
        r#"(() => {{
            const candidates = {candidates};
            const isVisible = (el) => {{
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                return style.visibility !== 'hidden' && style.display !== 'none'
                    && rect.width > 0 && rect.height > 0;
            }};
            const find = (onlyVisible) => {{
                for (const c of candidates) {{
                    let nodes;
                    try {{ nodes = document.querySelectorAll(c.css); }} catch (e) {{ continue; }}
                    for (const el of nodes) {{
                        if (c.text && !(el.textContent || '').toLowerCase().includes(c.text.toLowerCase())) continue;
                        if (onlyVisible && !isVisible(el)) continue;
                        return el;
                    }}
                }}
                return null;
            }};
            {action}
        }})()"#
    ))
}

const CLICK_ACTION: &str = r#"
    const el = find(true);
    if (!el) return false;
    el.scrollIntoView({ block: 'center' });
    el.click();
    return true;
"#;

const VISIBLE_ACTION: &str = "return find(true) !== null;";

// Wrapped in an object: a bare null result carries no value over CDP
const TEXT_ACTION: &str = r#"
    const el = find(false);
    return { text: el ? (el.textContent || '').trim() : null };
"#;

const LOAD_PROGRESS_SCRIPT: &str = r#"(() => ({
    readyState: document.readyState,
    resources: performance.getEntriesByType('resource').length
}))()"#;

#[async_trait]
impl BrowserSession for ChromeDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        self.navigate(url).await
    }

    async fn reload(&self) -> Result<()> {
        let page = self.get_active_page().await?;

        match tokio::time::timeout(NAVIGATION_TIMEOUT, page.reload()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::NavigationFailed(format!("Reload failed: {}", e))),
            Err(_) => Err(BrowserError::timeout("page reload", NAVIGATION_TIMEOUT)),
        }
    }

    async fn click(&self, locator: &Locator) -> Result<()> {
        let clicked: bool = self.run_locator(locator, CLICK_ACTION).await?;
        if clicked {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(locator.to_string()))
        }
    }

    async fn wait_for_selector(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.poll_until_visible(locator))
            .await
            .map_err(|_| BrowserError::timeout(format!("selector {}", locator), timeout))?
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.poll_until_idle())
            .await
            .map_err(|_| BrowserError::timeout("network idle", timeout))?
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>> {
        let page = self.get_active_page().await?;
        let cookies = page
            .get_cookies()
            .await
            .map_err(|e| BrowserError::Cookie(e.to_string()))?;

        Ok(cookies
            .into_iter()
            .map(|c| SessionCookie {
                name: c.name,
                value: c.value,
                domain: Some(c.domain),
                path: c.path,
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()> {
        let page = self.get_active_page().await?;
        let current_url = page.url().await?.unwrap_or_default();

        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let mut builder = CookieParam::builder()
                .name(cookie.name.clone())
                .value(cookie.value.clone())
                .path(cookie.path.clone());
            builder = match &cookie.domain {
                Some(domain) => builder.domain(domain.clone()),
                None => builder.url(current_url.clone()),
            };
            params.push(builder.build().map_err(BrowserError::Cookie)?);
        }

        page.set_cookies(params)
            .await
            .map_err(|e| BrowserError::Cookie(e.to_string()))?;
        Ok(())
    }

    async fn local_storage(&self, keys: &[&str]) -> Result<BTreeMap<String, String>> {
        let keys = serde_json::to_string(keys)
            .map_err(|e| BrowserError::Script(format!("Failed to encode keys: {}", e)))?;

        self.execute_script_typed(&format!(
            r#"(() => {{
                const out = {{}};
                for (const key of {keys}) {{
                    const value = window.localStorage.getItem(key);
                    if (value !== null) out[key] = value;
                }}
                return out;
            }})()"#
        ))
        .await
    }

    async fn current_url(&self) -> Result<String> {
        let page = self.get_active_page().await?;

        page.url()
            .await
            .map_err(|e| BrowserError::Other(e.to_string()))?
            .ok_or(BrowserError::NoPage)
    }

    async fn title(&self) -> Result<String> {
        let page = self.get_active_page().await?;

        let title = page
            .get_title()
            .await
            .map_err(|e| BrowserError::Other(e.to_string()))?;

        Ok(title.unwrap_or_default())
    }

    async fn is_visible(&self, locator: &Locator) -> Result<bool> {
        self.run_locator(locator, VISIBLE_ACTION).await
    }

    async fn text_content(&self, locator: &Locator) -> Result<Option<String>> {
        let lookup: TextLookup = self.run_locator(locator, TEXT_ACTION).await?;
        Ok(lookup.text)
    }

    async fn navigator_language(&self) -> Result<Option<String>> {
        self.execute_script_typed("navigator.language").await
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if let Some(temp_dir) = &self.temp_dir {
            if temp_dir.exists() {
                let _ = std::fs::remove_dir_all(temp_dir);
            }
        }
    }
}
