//! Thin CDP driver over a single browser page.
//!
//! One driver owns one browser and one page; the pipeline shares it
//! sequentially across search, scoring, and retrieval steps. A second,
//! disposable headless driver is used only for invisible session
//! verification.

use std::path::Path;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cookies::CookieRecord;
use crate::error::{BrowserError, BrowserResult};

/// Default navigation timeout.
const NAV_TIMEOUT: Duration = Duration::from_secs(20);

/// Interval between element-presence polls in `wait_for`.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A single browser session with one active page.
pub struct PlatformBrowser {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    nav_timeout: Duration,
}

impl PlatformBrowser {
    /// Launch a browser and open a blank page.
    pub async fn launch(headless: bool) -> BrowserResult<Self> {
        let mut builder = BrowserConfig::builder().window_size(1440, 900);
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::launch)?;

        let (browser, mut handler) = Browser::launch(config).await?;

        // The handler stream must be driven for the CDP connection to work.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "CDP handler event error");
                }
            }
        });

        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            page,
            handler_task,
            nav_timeout: NAV_TIMEOUT,
        })
    }

    /// Override the per-navigation timeout.
    pub fn with_nav_timeout(mut self, timeout: Duration) -> Self {
        self.nav_timeout = timeout;
        self
    }

    /// Navigate the page and wait for the load to settle.
    pub async fn goto(&self, url: &str) -> BrowserResult<()> {
        let nav = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, BrowserError>(())
        };

        tokio::time::timeout(self.nav_timeout, nav)
            .await
            .map_err(|_| BrowserError::timeout(format!("navigation to {}", url)))?
    }

    /// Current page URL.
    pub async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    /// Page title from document metadata.
    pub async fn title(&self) -> BrowserResult<Option<String>> {
        Ok(self.page.get_title().await?)
    }

    /// Visible text of the whole document body.
    pub async fn body_text(&self) -> BrowserResult<String> {
        self.eval_value("document.body ? document.body.innerText : ''")
            .await
    }

    /// Inner text of the first element matching the selector.
    pub async fn text_of(&self, selector: &str) -> BrowserResult<Option<String>> {
        match self.page.find_element(selector).await {
            Ok(element) => Ok(element.inner_text().await?),
            Err(_) => Ok(None),
        }
    }

    /// Whether an element matching the selector exists.
    pub async fn exists(&self, selector: &str) -> bool {
        self.page.find_element(selector).await.is_ok()
    }

    /// Poll for an element to appear, up to `timeout`.
    pub async fn wait_for(&self, selector: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.exists(selector).await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    /// Click the first element matching the selector.
    pub async fn click(&self, selector: &str) -> BrowserResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::element_not_found(selector.to_string()))?;
        element.click().await?;
        Ok(())
    }

    /// Click the first element that exists out of a selector list.
    ///
    /// Returns the selector that was clicked, or `None` if nothing matched.
    pub async fn click_first(&self, selectors: &[&str]) -> Option<String> {
        for selector in selectors {
            if self.exists(selector).await && self.click(selector).await.is_ok() {
                return Some(selector.to_string());
            }
        }
        None
    }

    /// Collect `href` attributes of elements matching the selector.
    pub async fn collect_links(&self, selector: &str) -> BrowserResult<Vec<String>> {
        let elements = self.page.find_elements(selector).await.unwrap_or_default();
        let mut links = Vec::new();
        for element in elements {
            if let Ok(Some(href)) = element.attribute("href").await {
                if !href.is_empty() {
                    links.push(href);
                }
            }
        }
        Ok(links)
    }

    /// Evaluate a JS expression and decode its value.
    pub async fn eval_value<T: DeserializeOwned>(&self, expression: &str) -> BrowserResult<T> {
        let result = self.page.evaluate(expression).await?;
        Ok(result.into_value()?)
    }

    /// Evaluate a JS expression for its side effects only.
    pub async fn eval(&self, expression: &str) -> BrowserResult<()> {
        self.page.evaluate(expression).await?;
        Ok(())
    }

    /// Screenshot of the first element matching the selector.
    pub async fn screenshot_element(&self, selector: &str) -> BrowserResult<Vec<u8>> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::element_not_found(selector.to_string()))?;
        element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| BrowserError::screenshot(e.to_string()))
    }

    /// Screenshot of a fixed viewport region.
    pub async fn screenshot_region(
        &self,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> BrowserResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(Viewport {
                x,
                y,
                width,
                height,
                scale: 1.0,
            })
            .build();

        self.page
            .screenshot(params)
            .await
            .map_err(|e| BrowserError::screenshot(e.to_string()))
    }

    /// All cookies visible to the current page.
    pub async fn cookies(&self) -> BrowserResult<Vec<CookieRecord>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies.iter().map(CookieRecord::from_cdp).collect())
    }

    /// Inject cookie records into the browser.
    pub async fn set_cookies(&self, records: &[CookieRecord]) -> BrowserResult<()> {
        let mut params = Vec::with_capacity(records.len());
        for record in records {
            match record.to_cdp_param() {
                Ok(param) => params.push(param),
                Err(e) => warn!(cookie = %record.name, error = %e, "Skipping bad cookie record"),
            }
        }
        if !params.is_empty() {
            self.page.set_cookies(params).await?;
        }
        Ok(())
    }

    /// Route completed downloads into the given directory.
    pub async fn allow_downloads_to(&self, dir: &Path) -> BrowserResult<()> {
        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(dir.display().to_string())
            .build()
            .map_err(BrowserError::launch)?;
        self.page.execute(params).await?;
        Ok(())
    }

    /// Tear down page, then browser, then the handler task.
    pub async fn close(mut self) {
        if let Err(e) = self.page.close().await {
            debug!(error = %e, "Page close failed during teardown");
        }
        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "Browser close failed during teardown");
        }
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}
