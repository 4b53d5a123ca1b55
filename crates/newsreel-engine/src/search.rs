//! Candidate search and deep analysis.
//!
//! Issues a platform search for one cleaned query, collects result links,
//! and visits each candidate page to extract structured metadata. A
//! failed candidate is skipped, never fatal to the batch. Screenshots are
//! captured through an explicit per-run cache owned by this component.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use newsreel_browser::PlatformBrowser;
use newsreel_models::Candidate;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::extract;
use crate::retry::{retry_async, RetryConfig};

/// Result links recognized on the search page, in priority order.
const RESULT_LINK_SELECTORS: &[&str] = &[
    "a[data-testid='search-result']",
    "a[href*='/video/']",
];

/// Affordances that expand a collapsed shot-list section.
const SHOT_LIST_TOGGLE_SELECTORS: &[&str] = &[
    "[data-testid='shot-list-toggle']",
    "button[aria-controls*='shot-list']",
    ".shot-list summary",
];

/// Screenshot subjects on a candidate page, in priority order.
const SCREENSHOT_SELECTORS: &[&str] = &[
    "video",
    ".video-player",
    "[data-testid='player']",
    ".preview-image img",
];

/// Viewport region used when no screenshot subject matches.
const SCREENSHOT_REGION: (f64, f64, f64, f64) = (0.0, 120.0, 960.0, 540.0);

/// Screenshot cache keyed by candidate URL, owned by the search component
/// and cleared between pipeline runs.
#[derive(Debug, Default)]
pub struct ScreenshotCache {
    entries: HashMap<String, Vec<u8>>,
}

impl ScreenshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<&Vec<u8>> {
        self.entries.get(url)
    }

    pub fn insert(&mut self, url: impl Into<String>, image: Vec<u8>) {
        self.entries.insert(url.into(), image);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all cached screenshots (end-of-run lifecycle call).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Searches the platform and deep-analyzes candidates.
pub struct CandidateSearch {
    config: EngineConfig,
    cache: ScreenshotCache,
}

impl CandidateSearch {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            cache: ScreenshotCache::new(),
        }
    }

    /// Clear the per-run screenshot cache.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Search one query and deep-analyze up to `limit` candidates.
    pub async fn search(
        &self,
        driver: &PlatformBrowser,
        query: &str,
        limit: usize,
        priority: u32,
    ) -> EngineResult<Vec<Candidate>> {
        let cleaned = extract::clean_query(query);
        if cleaned.is_empty() {
            return Err(EngineError::search_failed(format!(
                "Query empty after cleaning: {:?}",
                query
            )));
        }

        let search_url = build_search_url(&self.config.platform_base_url, &cleaned)?;

        // The platform intermittently answers searches with gateway errors;
        // those are worth a bounded retry, anything else is not.
        let retry_config = RetryConfig::new("platform_search")
            .with_max_retries(self.config.retry_attempts)
            .with_base_delay(Duration::from_millis(800));

        let search_url_ref = &search_url;
        let cleaned_ref = &cleaned;
        retry_async(
            &retry_config,
            || {
                let search_url = search_url_ref;
                let cleaned = cleaned_ref;
                async move {
                    driver.goto(search_url).await?;
                    let text = driver.body_text().await.unwrap_or_default();
                    if looks_like_gateway_error(&text) {
                        return Err(EngineError::search_failed(format!(
                            "Platform gateway error for query {:?}",
                            cleaned
                        )));
                    }
                    Ok(())
                }
            },
            |e: &EngineError| e.is_transient(),
        )
        .await
        .into_result()?;

        let mut links: Vec<String> = Vec::new();
        for selector in RESULT_LINK_SELECTORS {
            links.extend(driver.collect_links(selector).await?);
        }

        let mut seen = HashSet::new();
        let mut candidates: Vec<Candidate> = Vec::new();
        for href in links {
            let Some(absolute) = absolutize(&self.config.platform_base_url, &href) else {
                continue;
            };
            if seen.insert(absolute.clone()) {
                candidates.push(Candidate::new(absolute, cleaned.clone(), priority));
                if candidates.len() >= limit {
                    break;
                }
            }
        }

        info!(
            query = %cleaned,
            found = candidates.len(),
            "Collected search result links"
        );

        // Deep-analyze sequentially; a dead candidate is dropped from the
        // batch after its retry budget.
        let mut analyzed = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            match self.deep_analyze(driver, &mut candidate).await {
                Ok(()) => analyzed.push(candidate),
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "Skipping candidate that failed to load");
                }
            }
        }

        Ok(analyzed)
    }

    /// Search and attach a representative screenshot to every candidate.
    pub async fn search_with_screenshots(
        &mut self,
        driver: &PlatformBrowser,
        query: &str,
        limit: usize,
        priority: u32,
    ) -> EngineResult<Vec<Candidate>> {
        let mut candidates = self.search(driver, query, limit, priority).await?;
        for candidate in &mut candidates {
            candidate.screenshot = self.capture_screenshot(driver, &candidate.url).await;
        }
        Ok(candidates)
    }

    /// Visit a candidate page and extract structured metadata.
    async fn deep_analyze(
        &self,
        driver: &PlatformBrowser,
        candidate: &mut Candidate,
    ) -> EngineResult<()> {
        let retry_config = RetryConfig::new("candidate_visit")
            .with_max_retries(self.config.retry_attempts)
            .with_base_delay(Duration::from_millis(600));

        let url = candidate.url.clone();
        let url_ref = &url;
        retry_async(
            &retry_config,
            || {
                let url = url_ref;
                async move { driver.goto(url).await.map_err(EngineError::from) }
            },
            |e: &EngineError| e.is_transient(),
        )
        .await
        .into_result()?;

        // Expand a collapsed shot-list section before reading the page.
        if let Some(selector) = driver.click_first(SHOT_LIST_TOGGLE_SELECTORS).await {
            debug!(selector = %selector, "Expanded shot-list section");
        }

        let title = match driver.text_of("h1").await? {
            Some(h1) if !h1.trim().is_empty() => h1.trim().to_string(),
            _ => driver
                .title()
                .await?
                .unwrap_or_default()
                .trim()
                .to_string(),
        };

        let page_text = driver.body_text().await?;

        candidate.title = title;
        candidate.description = extract::description_block(&page_text, &candidate.title);
        candidate.shot_list = extract::shot_list_block(&page_text);
        candidate.duration = extract::duration_token(&page_text);
        candidate.mandatory_credit = extract::mandatory_credit(&page_text);
        candidate.page_text = Some(page_text);

        Ok(())
    }

    /// Capture (or reuse) a representative screenshot for a candidate page.
    ///
    /// Tries the video element first, then fallback subjects, then a fixed
    /// viewport region. Failures return `None`; validation just skips the
    /// candidate.
    pub async fn capture_screenshot(
        &mut self,
        driver: &PlatformBrowser,
        url: &str,
    ) -> Option<Vec<u8>> {
        if let Some(cached) = self.cache.get(url) {
            debug!(url = %url, "Screenshot cache hit");
            return Some(cached.clone());
        }

        let current = driver.current_url().await.unwrap_or_default();
        if current != url {
            if let Err(e) = driver.goto(url).await {
                warn!(url = %url, error = %e, "Navigation for screenshot failed");
                return None;
            }
        }

        for selector in SCREENSHOT_SELECTORS {
            if let Ok(image) = driver.screenshot_element(selector).await {
                self.cache.insert(url, image.clone());
                return Some(image);
            }
        }

        let (x, y, w, h) = SCREENSHOT_REGION;
        match driver.screenshot_region(x, y, w, h).await {
            Ok(image) => {
                self.cache.insert(url, image.clone());
                Some(image)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Viewport screenshot failed");
                None
            }
        }
    }
}

/// Merge candidates from several queries, de-duplicating by URL and
/// retaining the earliest (most specific) query priority.
pub fn dedupe_candidates(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut by_url: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Candidate> = Vec::new();

    for candidate in candidates {
        match by_url.get(&candidate.url) {
            Some(&idx) => {
                if candidate.query_priority < merged[idx].query_priority {
                    let url = candidate.url.clone();
                    merged[idx] = candidate;
                    by_url.insert(url, idx);
                }
            }
            None => {
                by_url.insert(candidate.url.clone(), merged.len());
                merged.push(candidate);
            }
        }
    }

    merged
}

/// Build the platform search URL for a cleaned query.
fn build_search_url(base_url: &str, query: &str) -> EngineResult<String> {
    let mut url = Url::parse(base_url)
        .map_err(|e| EngineError::search_failed(format!("Bad platform URL: {}", e)))?;
    url.set_path("/search");
    url.query_pairs_mut().clear().append_pair("q", query);
    Ok(url.to_string())
}

/// Resolve a result link against the platform base.
fn absolutize(base_url: &str, href: &str) -> Option<String> {
    let base = Url::parse(base_url).ok()?;
    let joined = base.join(href).ok()?;
    Some(joined.to_string())
}

/// Whether page text looks like an upstream gateway failure.
fn looks_like_gateway_error(page_text: &str) -> bool {
    let text = page_text.to_lowercase();
    text.contains("502 bad gateway")
        || text.contains("504 gateway time-out")
        || text.contains("504 gateway timeout")
        || text.contains("503 service unavailable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_search_url() {
        let url = build_search_url("https://platform.example", "putin moscow").unwrap();
        assert_eq!(url, "https://platform.example/search?q=putin+moscow");
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(
            absolutize("https://platform.example", "/video/123").unwrap(),
            "https://platform.example/video/123"
        );
        assert_eq!(
            absolutize("https://platform.example", "https://other.example/v/9").unwrap(),
            "https://other.example/v/9"
        );
        assert!(absolutize("not a url", "/video/123").is_none());
    }

    #[test]
    fn test_gateway_error_detection() {
        assert!(looks_like_gateway_error("ERROR 502 Bad Gateway\nnginx"));
        assert!(looks_like_gateway_error("504 Gateway Time-out"));
        assert!(!looks_like_gateway_error("12 results for putin moscow"));
    }

    #[test]
    fn test_dedupe_retains_earliest_priority() {
        let candidates = vec![
            Candidate::new("https://p.example/video/1", "specific query", 0),
            Candidate::new("https://p.example/video/2", "generic query", 1),
            Candidate::new("https://p.example/video/1", "generic query", 1),
            Candidate::new("https://p.example/video/3", "generic query", 1),
        ];

        let merged = dedupe_candidates(candidates);
        assert_eq!(merged.len(), 3);

        let first = merged.iter().find(|c| c.url.ends_with("/video/1")).unwrap();
        assert_eq!(first.query_priority, 0);
        assert_eq!(first.source_query, "specific query");
    }

    #[test]
    fn test_dedupe_upgrades_to_lower_priority() {
        let candidates = vec![
            Candidate::new("https://p.example/video/1", "generic", 2),
            Candidate::new("https://p.example/video/1", "specific", 0),
        ];

        let merged = dedupe_candidates(candidates);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].query_priority, 0);
    }

    #[test]
    fn test_screenshot_cache_lifecycle() {
        let mut cache = ScreenshotCache::new();
        assert!(cache.is_empty());

        cache.insert("https://p.example/video/1", vec![1, 2, 3]);
        assert_eq!(cache.get("https://p.example/video/1"), Some(&vec![1, 2, 3]));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("https://p.example/video/1").is_none());
    }
}
