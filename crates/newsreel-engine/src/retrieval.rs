//! Retrieval orchestration: the platform download protocol.
//!
//! Per candidate: open the page, dismiss interstitial popups, open the
//! download modal, accept the usage-restrictions checkbox (four escalating
//! strategies), confirm, then either catch a direct file transfer or wait
//! for asynchronous preparation in the personal library. The top-level
//! policy tries the best-ranked candidate with waiting allowed and falls
//! back through the rest with waiting disabled.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use newsreel_browser::PlatformBrowser;
use newsreel_models::{Candidate, CandidateAttempt, DownloadOutcome, RetrievalReport};

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::library::{self, LibraryEntry, LibraryPoll, LibraryWaitPolicy, LibraryWaitResult};

/// Interstitial popups dismissed before touching the page.
const POPUP_DISMISS_SELECTORS: &[&str] = &[
    "#onetrust-accept-btn-handler",
    "button[aria-label='Close']",
    ".modal-backdrop .close",
    ".newsletter-popup .dismiss",
];

/// Primary download affordances on a candidate page.
const DOWNLOAD_BUTTON_SELECTORS: &[&str] = &[
    "button[data-testid='download']",
    "a[data-testid='download']",
    "button.download-button",
    "a[href*='download']",
];

/// The download modal container.
const MODAL_SELECTOR: &str = "[role='dialog'], .modal";

/// The usage-restrictions checkbox inside the modal.
const RESTRICTIONS_CHECKBOX: &str = "[role='dialog'] input[type='checkbox'], .modal input[type='checkbox']";

/// Label associated with the restrictions checkbox.
const RESTRICTIONS_LABEL: &str = "[role='dialog'] label, .modal label";

/// A row wrapping the checkbox, clicked as a last resort.
const RESTRICTIONS_ROW: &str =
    "[role='dialog'] .terms-row, .modal .terms-row, .modal .checkbox-row";

/// Markers for the "preparing your video" modal.
const PREPARING_MARKERS: &[&str] = &["preparing your video", "we are preparing", "being prepared"];

static VIDEO_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/video/([A-Za-z0-9_-]+)").unwrap());

/// Partial-transfer suffixes that mean a download is still in flight.
const PARTIAL_SUFFIXES: &[&str] = &[".crdownload", ".part", ".tmp"];

/// JS: read the personal library rows as structured entries.
const LIBRARY_ENTRIES_JS: &str = r#"
Array.from(document.querySelectorAll("[data-testid='library-entry'], .library-item")).map(row => ({
    video_id: row.getAttribute('data-video-id'),
    title: (row.querySelector('.title, h3')?.innerText || '').trim(),
    ready: !!row.querySelector("[data-testid='library-download'], .download-ready, a[download]")
}))
"#;

/// Escalating strategies for the usage-restrictions checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckboxStrategy {
    DirectClick,
    LabelClick,
    ForceDom,
    RowClick,
}

const CHECKBOX_STRATEGIES: &[CheckboxStrategy] = &[
    CheckboxStrategy::DirectClick,
    CheckboxStrategy::LabelClick,
    CheckboxStrategy::ForceDom,
    CheckboxStrategy::RowClick,
];

/// Drives the platform download flow for ranked candidates.
pub struct RetrievalOrchestrator {
    config: EngineConfig,
}

impl RetrievalOrchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Try every ranked candidate until one download succeeds.
    ///
    /// The best-ranked candidate is allowed to wait out asynchronous
    /// preparation; fallbacks are direct-download-only so a bad primary
    /// does not cost minutes per alternative.
    pub async fn download_ranked(
        &self,
        driver: &PlatformBrowser,
        candidates: &[Candidate],
    ) -> RetrievalReport {
        run_fallback(candidates, |index, candidate, allow_wait| async move {
            info!(
                rank = index + 1,
                url = %candidate.url,
                allow_wait = allow_wait,
                "Attempting candidate download"
            );
            self.download_candidate(driver, candidate, allow_wait).await
        })
        .await
    }

    /// Attempt to download one candidate.
    pub async fn download_candidate(
        &self,
        driver: &PlatformBrowser,
        candidate: &Candidate,
        allow_wait: bool,
    ) -> DownloadOutcome {
        match self.try_download(driver, candidate, allow_wait).await {
            Ok(outcome) => outcome,
            Err(e) => DownloadOutcome::Failure {
                reason: e.to_string(),
            },
        }
    }

    async fn try_download(
        &self,
        driver: &PlatformBrowser,
        candidate: &Candidate,
        allow_wait: bool,
    ) -> EngineResult<DownloadOutcome> {
        driver.goto(&candidate.url).await?;

        // Best-effort: interstitials must not block the download control.
        if let Some(selector) = driver.click_first(POPUP_DISMISS_SELECTORS).await {
            debug!(selector = %selector, "Dismissed interstitial popup");
        }

        if driver.click_first(DOWNLOAD_BUTTON_SELECTORS).await.is_none() {
            return Ok(DownloadOutcome::Failure {
                reason: "no download control on candidate page".to_string(),
            });
        }

        if !driver.wait_for(MODAL_SELECTOR, Duration::from_secs(5)).await {
            return Ok(DownloadOutcome::Failure {
                reason: "download modal did not open".to_string(),
            });
        }

        if !self.accept_restrictions(driver).await {
            // All four strategies failed; the confirm click may still work.
            warn!(url = %candidate.url, "Could not check usage-restrictions box, proceeding anyway");
        }

        let download_dir = PathBuf::from(&self.config.download_dir);
        tokio::fs::create_dir_all(&download_dir).await?;
        driver.allow_downloads_to(&download_dir).await?;
        let before = snapshot_dir(&download_dir).await;

        if !self.click_modal_confirm(driver).await {
            return Ok(DownloadOutcome::Failure {
                reason: "download confirm button not found".to_string(),
            });
        }

        // Give the platform a beat to either start the transfer or swap
        // in the preparation modal.
        tokio::time::sleep(Duration::from_secs(2)).await;

        if self.preparation_detected(driver).await {
            let video_id = extract_video_id(&candidate.url).unwrap_or_default();

            if !allow_wait {
                info!(url = %candidate.url, "Preparation required, skipping wait for this candidate");
                return Ok(DownloadOutcome::NeedsAsyncPreparation {
                    video_id,
                    title: candidate.title.clone(),
                });
            }

            return self
                .wait_in_library(driver, candidate, &video_id, &download_dir, &before)
                .await;
        }

        match await_download(&download_dir, &before, self.config.download_timeout).await {
            Some(path) => Ok(success_outcome(path, false)),
            None => Ok(DownloadOutcome::Failure {
                reason: "file transfer did not complete".to_string(),
            }),
        }
    }

    /// Accept the usage-restrictions checkbox via escalating strategies.
    ///
    /// The first strategy that results in a checked box wins.
    async fn accept_restrictions(&self, driver: &PlatformBrowser) -> bool {
        for strategy in CHECKBOX_STRATEGIES {
            let attempted = match strategy {
                CheckboxStrategy::DirectClick => driver.click(RESTRICTIONS_CHECKBOX).await.is_ok(),
                CheckboxStrategy::LabelClick => driver.click(RESTRICTIONS_LABEL).await.is_ok(),
                CheckboxStrategy::ForceDom => driver
                    .eval(
                        r#"(() => {
                            const box = document.querySelector("[role='dialog'] input[type='checkbox'], .modal input[type='checkbox']");
                            if (!box) return;
                            box.checked = true;
                            box.dispatchEvent(new Event('input', { bubbles: true }));
                            box.dispatchEvent(new Event('change', { bubbles: true }));
                        })()"#,
                    )
                    .await
                    .is_ok(),
                CheckboxStrategy::RowClick => driver.click(RESTRICTIONS_ROW).await.is_ok(),
            };

            if attempted && self.checkbox_checked(driver).await {
                debug!(strategy = ?strategy, "Usage-restrictions checkbox accepted");
                return true;
            }
        }
        false
    }

    async fn checkbox_checked(&self, driver: &PlatformBrowser) -> bool {
        driver
            .eval_value::<bool>(
                r#"!!document.querySelector("[role='dialog'] input[type='checkbox'], .modal input[type='checkbox']")?.checked"#,
            )
            .await
            .unwrap_or(false)
    }

    /// Click the modal's confirm button, identified by text or style.
    async fn click_modal_confirm(&self, driver: &PlatformBrowser) -> bool {
        driver
            .eval_value::<bool>(
                r#"(() => {
                    const modal = document.querySelector("[role='dialog'], .modal");
                    if (!modal) return false;
                    const buttons = Array.from(modal.querySelectorAll('button, a.button'));
                    const byText = buttons.find(b => /download|confirm|accept|continue/i.test(b.innerText));
                    const target = byText || buttons.find(b => b.className.includes('primary'));
                    if (!target) return false;
                    target.click();
                    return true;
                })()"#,
            )
            .await
            .unwrap_or(false)
    }

    /// Whether the "preparing your video" modal replaced the download.
    async fn preparation_detected(&self, driver: &PlatformBrowser) -> bool {
        let Ok(Some(text)) = driver.text_of(MODAL_SELECTOR).await else {
            return false;
        };
        let text = text.to_lowercase();
        PREPARING_MARKERS.iter().any(|marker| text.contains(marker))
    }

    /// Poll the personal library until the prepared clip is ready, then
    /// download it from there.
    async fn wait_in_library(
        &self,
        driver: &PlatformBrowser,
        candidate: &Candidate,
        video_id: &str,
        download_dir: &Path,
        before: &HashSet<PathBuf>,
    ) -> EngineResult<DownloadOutcome> {
        let library_url = format!(
            "{}/library",
            self.config.platform_base_url.trim_end_matches('/')
        );
        let policy = LibraryWaitPolicy::new(
            self.config.library_poll_interval,
            self.config.max_library_wait(),
        );

        info!(
            video_id = video_id,
            max_minutes = self.config.max_library_wait_minutes,
            "Waiting for prepared clip in library"
        );

        let id_filter = (!video_id.is_empty()).then_some(video_id);
        let library_url_ref = &library_url;
        let title_ref = candidate.title.as_str();
        let wait_result = library::wait_for_ready(&policy, || {
            let library_url = library_url_ref;
            let title = title_ref;
            async move { self.poll_library(driver, library_url, id_filter, title).await }
        })
        .await;

        match wait_result {
            LibraryWaitResult::TimedOut { waited } => Ok(DownloadOutcome::Timeout {
                waited_minutes: (waited.as_secs() + 59) / 60,
            }),
            LibraryWaitResult::Ready => {
                if !self
                    .click_library_download(driver, id_filter, &candidate.title)
                    .await
                {
                    return Ok(DownloadOutcome::Failure {
                        reason: "ready library entry had no download control".to_string(),
                    });
                }

                match await_download(download_dir, before, self.config.download_timeout).await {
                    Some(path) => Ok(success_outcome(path, true)),
                    None => Ok(DownloadOutcome::Failure {
                        reason: "library transfer did not complete".to_string(),
                    }),
                }
            }
        }
    }

    /// One library poll: navigate, read entries, match, classify.
    async fn poll_library(
        &self,
        driver: &PlatformBrowser,
        library_url: &str,
        video_id: Option<&str>,
        title: &str,
    ) -> LibraryPoll {
        if let Err(e) = driver.goto(library_url).await {
            warn!(error = %e, "Library page navigation failed during poll");
            return LibraryPoll::NotFound;
        }

        let entries: Vec<LibraryEntry> = match driver.eval_value(LIBRARY_ENTRIES_JS).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to read library entries");
                return LibraryPoll::NotFound;
            }
        };

        match library::find_entry(&entries, video_id, title) {
            Some(entry) if entry.ready => LibraryPoll::Ready,
            Some(_) => LibraryPoll::Preparing,
            None => LibraryPoll::NotFound,
        }
    }

    /// Click the matched entry's download control.
    async fn click_library_download(
        &self,
        driver: &PlatformBrowser,
        video_id: Option<&str>,
        title: &str,
    ) -> bool {
        let keywords = library::title_keywords(title);
        let script = format!(
            r#"(() => {{
                const rows = Array.from(document.querySelectorAll("[data-testid='library-entry'], .library-item"));
                const id = {id};
                const keywords = {keywords};
                const matches = row => {{
                    if (id && row.getAttribute('data-video-id') === id) return true;
                    const text = (row.querySelector('.title, h3')?.innerText || '').toLowerCase();
                    return keywords.filter(k => text.includes(k)).length >= Math.min(2, keywords.length);
                }};
                const row = rows.find(matches);
                if (!row) return false;
                const control = row.querySelector("[data-testid='library-download'], .download-ready, a[download]");
                if (!control) return false;
                control.click();
                return true;
            }})()"#,
            id = serde_json::to_string(&video_id).unwrap_or_else(|_| "null".into()),
            keywords = serde_json::to_string(&keywords).unwrap_or_else(|_| "[]".into()),
        );

        driver.eval_value::<bool>(&script).await.unwrap_or(false)
    }
}

/// The fallback loop, separated from page access so the policy is
/// testable with scripted attempt closures.
///
/// Only the first candidate may wait for asynchronous preparation; every
/// skipped candidate gets exactly one reason entry.
pub async fn run_fallback<'a, F, Fut>(candidates: &'a [Candidate], mut attempt: F) -> RetrievalReport
where
    F: FnMut(usize, &'a Candidate, bool) -> Fut,
    Fut: Future<Output = DownloadOutcome> + 'a,
{
    if candidates.is_empty() {
        return RetrievalReport::empty();
    }

    let mut attempts: Vec<CandidateAttempt> = Vec::new();

    for (index, candidate) in candidates.iter().enumerate() {
        let allow_wait = index == 0;
        let outcome = attempt(index, candidate, allow_wait).await;

        if outcome.is_success() {
            return RetrievalReport { outcome, attempts };
        }

        warn!(
            url = %candidate.url,
            reason = %outcome.skip_reason(),
            "Candidate download failed, falling back"
        );
        attempts.push(CandidateAttempt {
            url: candidate.url.clone(),
            title: candidate.title.clone(),
            reason: outcome.skip_reason(),
        });
    }

    RetrievalReport {
        outcome: DownloadOutcome::Failure {
            reason: format!("all {} ranked candidates failed", candidates.len()),
        },
        attempts,
    }
}

/// Extract the platform-assigned video ID from a candidate URL.
pub fn extract_video_id(url: &str) -> Option<String> {
    if let Some(captures) = VIDEO_ID_PATTERN.captures(url) {
        return Some(captures[1].to_string());
    }
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains('.'))
        .map(String::from)
}

/// Wait for a completed file transfer in the download directory.
///
/// A file counts as complete when it is new relative to the snapshot,
/// non-empty, and carries no partial-transfer suffix.
pub async fn await_download(
    dir: &Path,
    before: &HashSet<PathBuf>,
    timeout: Duration,
) -> Option<PathBuf> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if let Some(path) = completed_download(dir, before).await {
            return Some(path);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Snapshot the current contents of the download directory.
pub async fn snapshot_dir(dir: &Path) -> HashSet<PathBuf> {
    let mut entries = HashSet::new();
    if let Ok(mut reader) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = reader.next_entry().await {
            entries.insert(entry.path());
        }
    }
    entries
}

async fn completed_download(dir: &Path, before: &HashSet<PathBuf>) -> Option<PathBuf> {
    let mut reader = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = reader.next_entry().await {
        let path = entry.path();
        if before.contains(&path) {
            continue;
        }
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            continue;
        }
        if let Ok(meta) = entry.metadata().await {
            if meta.is_file() && meta.len() > 0 {
                return Some(path);
            }
        }
    }
    None
}

fn success_outcome(path: PathBuf, from_library_fallback: bool) -> DownloadOutcome {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    DownloadOutcome::Success {
        path,
        filename,
        from_library_fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            extract_video_id("https://p.example/video/abc-123").unwrap(),
            "abc-123"
        );
        assert_eq!(
            extract_video_id("https://p.example/clips/xyz789/").unwrap(),
            "xyz789"
        );
        assert!(extract_video_id("https://p.example/").is_none());
    }

    fn candidate(url: &str, title: &str) -> Candidate {
        let mut c = Candidate::new(url, "q", 0);
        c.title = title.to_string();
        c
    }

    #[tokio::test]
    async fn test_fallback_skips_async_primary_and_records_one_reason() {
        let candidates = vec![
            candidate("https://p.example/video/1", "Primary"),
            candidate("https://p.example/video/2", "Backup"),
        ];
        let calls = AtomicU32::new(0);

        let report = run_fallback(&candidates, |index, _candidate, allow_wait| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match index {
                    0 => {
                        assert!(allow_wait);
                        DownloadOutcome::NeedsAsyncPreparation {
                            video_id: "1".into(),
                            title: "Primary".into(),
                        }
                    }
                    _ => {
                        assert!(!allow_wait);
                        DownloadOutcome::Success {
                            path: PathBuf::from("/tmp/clip.mp4"),
                            filename: "clip.mp4".into(),
                            from_library_fallback: false,
                        }
                    }
                }
            }
        })
        .await;

        assert!(report.outcome.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].url, "https://p.example/video/1");
        assert_eq!(
            report.attempts[0].reason,
            "requires asynchronous preparation"
        );
    }

    #[tokio::test]
    async fn test_fallback_exhaustion_reports_all_reasons() {
        let candidates = vec![
            candidate("https://p.example/video/1", "A"),
            candidate("https://p.example/video/2", "B"),
            candidate("https://p.example/video/3", "C"),
        ];

        let report = run_fallback(&candidates, |index, _candidate, _allow_wait| async move {
            match index {
                0 => DownloadOutcome::Timeout { waited_minutes: 4 },
                _ => DownloadOutcome::Failure {
                    reason: "boom".into(),
                },
            }
        })
        .await;

        assert!(!report.outcome.is_success());
        assert_eq!(report.attempts.len(), 3);
        assert!(report.attempts[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_fallback_empty_candidates() {
        let report = run_fallback(&[], |_i, _c, _w| async {
            DownloadOutcome::Failure {
                reason: "unreachable".into(),
            }
        })
        .await;
        assert!(!report.outcome.is_success());
        assert!(report.attempts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_download_sees_completed_file() {
        let dir = tempfile::tempdir().unwrap();
        let before = snapshot_dir(dir.path()).await;

        let target = dir.path().join("clip.mp4");
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            tokio::fs::write(&target, b"video bytes").await.unwrap();
        });

        let found = await_download(dir.path(), &before, Duration::from_secs(10)).await;
        writer.await.unwrap();

        assert!(found.is_some());
        assert_eq!(found.unwrap().file_name().unwrap(), "clip.mp4");
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_download_ignores_partials_and_preexisting() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("old.mp4"), b"old").await.unwrap();
        let before = snapshot_dir(dir.path()).await;

        tokio::fs::write(dir.path().join("clip.mp4.crdownload"), b"partial")
            .await
            .unwrap();

        let found = await_download(dir.path(), &before, Duration::from_secs(2)).await;
        assert!(found.is_none());
    }
}
