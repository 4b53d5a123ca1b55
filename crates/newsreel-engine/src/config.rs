//! Engine configuration.

use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Licensing platform base URL
    pub platform_base_url: String,
    /// Maximum result links collected per search query
    pub search_result_limit: usize,
    /// Maximum generated queries actually searched
    pub max_queries: usize,
    /// Retry attempts for the search request and per-candidate visits
    pub retry_attempts: u32,
    /// Candidates passed to the visual validator after text scoring
    pub visual_top_n: usize,
    /// Pacing delay between vision model calls
    pub visual_pacing: Duration,
    /// Library polling interval while a clip is being prepared
    pub library_poll_interval: Duration,
    /// Maximum minutes to wait in the library for a prepared clip
    pub max_library_wait_minutes: u64,
    /// Per-navigation timeout
    pub nav_timeout: Duration,
    /// Timeout for a direct file transfer to complete
    pub download_timeout: Duration,
    /// Directory completed downloads land in
    pub download_dir: String,
    /// Run the primary browser headless (headful is needed for login)
    pub headless: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            platform_base_url: "https://app.newsflare.com".to_string(),
            search_result_limit: 8,
            max_queries: 4,
            retry_attempts: 3,
            visual_top_n: 3,
            visual_pacing: Duration::from_millis(1500),
            library_poll_interval: Duration::from_secs(5),
            max_library_wait_minutes: 4,
            nav_timeout: Duration::from_secs(20),
            download_timeout: Duration::from_secs(120),
            download_dir: "/tmp/newsreel/downloads".to_string(),
            headless: false,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            platform_base_url: std::env::var("NEWSREEL_PLATFORM_URL")
                .unwrap_or(defaults.platform_base_url),
            search_result_limit: env_parse("NEWSREEL_SEARCH_LIMIT", defaults.search_result_limit),
            max_queries: env_parse("NEWSREEL_MAX_QUERIES", defaults.max_queries),
            retry_attempts: env_parse("NEWSREEL_RETRY_ATTEMPTS", defaults.retry_attempts),
            visual_top_n: env_parse("NEWSREEL_VISUAL_TOP_N", defaults.visual_top_n),
            visual_pacing: Duration::from_millis(env_parse(
                "NEWSREEL_VISUAL_PACING_MS",
                defaults.visual_pacing.as_millis() as u64,
            )),
            library_poll_interval: Duration::from_secs(env_parse(
                "NEWSREEL_LIBRARY_POLL_SECS",
                defaults.library_poll_interval.as_secs(),
            )),
            max_library_wait_minutes: env_parse(
                "NEWSREEL_LIBRARY_WAIT_MINUTES",
                defaults.max_library_wait_minutes,
            ),
            nav_timeout: Duration::from_secs(env_parse(
                "NEWSREEL_NAV_TIMEOUT_SECS",
                defaults.nav_timeout.as_secs(),
            )),
            download_timeout: Duration::from_secs(env_parse(
                "NEWSREEL_DOWNLOAD_TIMEOUT_SECS",
                defaults.download_timeout.as_secs(),
            )),
            download_dir: std::env::var("NEWSREEL_DOWNLOAD_DIR").unwrap_or(defaults.download_dir),
            headless: env_parse("NEWSREEL_HEADLESS", defaults.headless),
        }
    }

    /// Maximum library wait as a duration.
    pub fn max_library_wait(&self) -> Duration {
        Duration::from_secs(self.max_library_wait_minutes * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.visual_top_n, 3);
        assert_eq!(config.max_library_wait(), Duration::from_secs(240));
        assert_eq!(config.library_poll_interval, Duration::from_secs(5));
    }
}
