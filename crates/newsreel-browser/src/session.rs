//! Platform session management.
//!
//! Owns the persisted cookie jar for the licensing platform, verifies
//! session validity, and drives the interactive login flow. Login state is
//! detected from the DOM: a profile affordance means signed in, a sign-in
//! affordance means the platform wants re-authentication.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cookies::CookieStore;
use crate::driver::PlatformBrowser;
use crate::error::BrowserResult;

/// How often login state is polled during the interactive flow.
const LOGIN_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// How long the interactive login flow waits before giving up.
const LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Affordances that indicate the platform is asking for sign-in.
const SIGN_IN_SELECTORS: &[&str] = &[
    "a[href*='signin']",
    "a[href*='sign-in']",
    "a[href*='login']",
    "button[data-testid='sign-in']",
    "form[action*='login']",
];

/// Affordances that indicate an authenticated user.
const PROFILE_SELECTORS: &[&str] = &[
    "[data-testid='user-menu']",
    "[data-testid='account-menu']",
    "a[href*='/account']",
    ".user-avatar",
    ".account-menu",
];

/// Result of an invisible (headless) session check.
#[derive(Debug, Clone, Copy)]
pub struct HeadlessVerification {
    /// The saved session is valid
    pub valid: bool,
    /// The caller should run the interactive login flow
    pub needs_login: bool,
}

/// Manages the persisted platform session.
pub struct SessionManager {
    store: CookieStore,
    base_url: String,
    poll_interval: Duration,
    login_timeout: Duration,
}

impl SessionManager {
    /// Create a session manager for the given platform base URL.
    pub fn new(store: CookieStore, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: LOGIN_POLL_INTERVAL,
            login_timeout: LOGIN_TIMEOUT,
        }
    }

    /// Override polling cadence (used by tests).
    pub fn with_timing(mut self, poll_interval: Duration, login_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.login_timeout = login_timeout;
        self
    }

    /// The cookie store backing this session.
    pub fn store(&self) -> &CookieStore {
        &self.store
    }

    fn account_url(&self) -> String {
        format!("{}/account", self.base_url)
    }

    fn sign_in_url(&self) -> String {
        format!("{}/signin", self.base_url)
    }

    /// Whether a persisted session exists on disk.
    pub fn has_session(&self) -> bool {
        self.store.exists()
    }

    /// Load the persisted jar into the given browser.
    ///
    /// Returns false when the jar was empty.
    pub async fn restore(&self, driver: &PlatformBrowser) -> BrowserResult<bool> {
        let records = self.store.load().await?;
        if records.is_empty() {
            return Ok(false);
        }
        driver.set_cookies(&records).await?;
        debug!(count = records.len(), "Restored cookies into browser");
        Ok(true)
    }

    /// Persist the browser's current cookies to disk.
    pub async fn persist_from(&self, driver: &PlatformBrowser) -> BrowserResult<()> {
        let records = driver.cookies().await?;
        self.store.save(&records).await
    }

    /// Navigate to the account page and inspect the DOM for login state.
    pub async fn verify(&self, driver: &PlatformBrowser) -> BrowserResult<bool> {
        driver.goto(&self.account_url()).await?;
        Ok(self.detect_signed_in(driver).await)
    }

    /// Verify the saved session in a disposable headless browser, so the
    /// check never disturbs a visible window.
    ///
    /// The headless browser is always torn down, whatever the outcome.
    pub async fn verify_headless(&self) -> BrowserResult<HeadlessVerification> {
        if !self.has_session() {
            return Ok(HeadlessVerification {
                valid: false,
                needs_login: true,
            });
        }

        let driver = PlatformBrowser::launch(true).await?;

        let outcome = async {
            self.restore(&driver).await?;
            self.verify(&driver).await
        }
        .await;

        driver.close().await;

        let valid = outcome?;
        Ok(HeadlessVerification {
            valid,
            needs_login: !valid,
        })
    }

    /// Run the interactive login flow.
    ///
    /// Navigates to the sign-in page; if the session is already valid the
    /// cookies are persisted and `true` is returned immediately. Otherwise
    /// polls login state, invoking `on_status` on each poll. On timeout the
    /// cookies captured so far are still saved and `false` is returned —
    /// callers treat that as "retry later", not as unrecoverable.
    pub async fn login<F: FnMut(&str)>(
        &self,
        driver: &PlatformBrowser,
        mut on_status: F,
    ) -> BrowserResult<bool> {
        driver.goto(&self.sign_in_url()).await?;

        if self.detect_signed_in(driver).await {
            self.persist_from(driver).await?;
            on_status("Already signed in");
            info!("Session already valid, cookies refreshed");
            return Ok(true);
        }

        on_status("Waiting for sign-in in the browser window");
        let deadline = tokio::time::Instant::now() + self.login_timeout;

        loop {
            tokio::time::sleep(self.poll_interval).await;

            if self.detect_signed_in(driver).await {
                self.persist_from(driver).await?;
                on_status("Signed in");
                info!("Login detected, session persisted");
                return Ok(true);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                // Save whatever the browser captured; a partial jar can
                // still shorten the next login.
                if let Err(e) = self.persist_from(driver).await {
                    warn!(error = %e, "Failed to persist cookies after login timeout");
                }
                on_status("Sign-in timed out");
                warn!(
                    timeout_secs = self.login_timeout.as_secs(),
                    "Login flow timed out"
                );
                return Ok(false);
            }

            let remaining = deadline.duration_since(now).as_secs();
            on_status(&format!("Still waiting for sign-in ({}s left)", remaining));
        }
    }

    async fn detect_signed_in(&self, driver: &PlatformBrowser) -> bool {
        for selector in PROFILE_SELECTORS {
            if driver.exists(selector).await {
                return true;
            }
        }
        for selector in SIGN_IN_SELECTORS {
            if driver.exists(selector).await {
                return false;
            }
        }
        // Neither affordance found; assume logged out rather than risk
        // driving the download flow against an expired session.
        false
    }
}
