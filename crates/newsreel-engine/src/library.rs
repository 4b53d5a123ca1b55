//! Library-wait state machine.
//!
//! After the platform accepts a download that needs asynchronous
//! preparation, the clip eventually appears in the user's personal
//! library. This module polls for it with a bounded window. The wait loop
//! is driven by a single probe closure returning a tagged [`LibraryPoll`],
//! decoupled from page access so it is testable with a paused clock.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

/// One poll of the library page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryPoll {
    /// The entry is ready to download.
    Ready,
    /// The entry exists but is still being prepared.
    Preparing,
    /// No matching entry yet.
    NotFound,
}

/// Terminal result of the wait loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryWaitResult {
    /// The entry became ready within the window.
    Ready,
    /// The window elapsed first.
    TimedOut { waited: Duration },
}

/// Polling policy for the wait loop.
#[derive(Debug, Clone)]
pub struct LibraryWaitPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl LibraryWaitPolicy {
    pub fn new(poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            poll_interval,
            max_wait,
        }
    }
}

/// Poll until the probe reports `Ready` or the window elapses.
///
/// `NotFound` is treated like `Preparing`: the entry may simply not have
/// appeared yet, so polling continues until the deadline.
pub async fn wait_for_ready<F, Fut>(policy: &LibraryWaitPolicy, mut probe: F) -> LibraryWaitResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LibraryPoll>,
{
    let start = tokio::time::Instant::now();
    let deadline = start + policy.max_wait;
    let mut polls = 0u32;

    loop {
        if tokio::time::Instant::now() >= deadline {
            let waited = start.elapsed();
            warn!(polls = polls, waited_secs = waited.as_secs(), "Library wait window elapsed");
            return LibraryWaitResult::TimedOut { waited };
        }

        polls += 1;
        match probe().await {
            LibraryPoll::Ready => {
                debug!(polls = polls, "Library entry ready");
                return LibraryWaitResult::Ready;
            }
            LibraryPoll::Preparing => {
                debug!(polls = polls, "Library entry still preparing");
            }
            LibraryPoll::NotFound => {
                debug!(polls = polls, "Library entry not visible yet");
            }
        }

        tokio::time::sleep(policy.poll_interval).await;
    }
}

/// One row in the personal library, as read off the page.
#[derive(Debug, Clone, Deserialize)]
pub struct LibraryEntry {
    /// Platform-assigned video ID, when the row exposes one
    #[serde(default)]
    pub video_id: Option<String>,

    /// Row title
    pub title: String,

    /// Whether the row shows a usable download control
    #[serde(default)]
    pub ready: bool,
}

/// Maximum keywords extracted from a title for fuzzy matching.
const MAX_TITLE_KEYWORDS: usize = 5;

/// Minimum keyword overlap for a fuzzy title match.
const MIN_KEYWORD_OVERLAP: usize = 2;

/// Extract up to five significant keywords from a title.
pub fn title_keywords(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .filter(|word| word.len() >= 4)
        .take(MAX_TITLE_KEYWORDS)
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|word| !word.is_empty())
        .collect()
}

/// Whether an entry title overlaps the extracted keywords enough to count
/// as the same clip.
pub fn fuzzy_title_match(entry_title: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let entry = entry_title.to_lowercase();
    let overlap = keywords.iter().filter(|k| entry.contains(k.as_str())).count();
    overlap >= MIN_KEYWORD_OVERLAP.min(keywords.len())
}

/// Locate the entry for a video: exact platform-ID match preferred,
/// fuzzy title overlap as the fallback.
pub fn find_entry<'a>(
    entries: &'a [LibraryEntry],
    video_id: Option<&str>,
    title: &str,
) -> Option<&'a LibraryEntry> {
    if let Some(id) = video_id {
        if let Some(entry) = entries
            .iter()
            .find(|e| e.video_id.as_deref() == Some(id))
        {
            return Some(entry);
        }
    }

    let keywords = title_keywords(title);
    entries
        .iter()
        .find(|e| fuzzy_title_match(&e.title, &keywords))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_always_preparing_times_out_within_window() {
        let policy = LibraryWaitPolicy::new(Duration::from_secs(5), Duration::from_secs(60));
        let polls = AtomicU32::new(0);

        let result = wait_for_ready(&policy, || {
            polls.fetch_add(1, Ordering::SeqCst);
            async { LibraryPoll::Preparing }
        })
        .await;

        match result {
            LibraryWaitResult::TimedOut { waited } => {
                assert!(waited >= Duration::from_secs(60));
                assert!(waited <= Duration::from_secs(65));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        // 60s window at 5s cadence: bounded, never unbounded polling.
        assert_eq!(polls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_poll() {
        let policy = LibraryWaitPolicy::new(Duration::from_secs(5), Duration::from_secs(240));
        let polls = AtomicU32::new(0);

        let result = wait_for_ready(&policy, || {
            let n = polls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    LibraryPoll::Preparing
                } else {
                    LibraryPoll::Ready
                }
            }
        })
        .await;

        assert_eq!(result, LibraryWaitResult::Ready);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_keeps_polling() {
        let policy = LibraryWaitPolicy::new(Duration::from_secs(5), Duration::from_secs(20));
        let polls = AtomicU32::new(0);

        let result = wait_for_ready(&policy, || {
            let n = polls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    LibraryPoll::NotFound
                } else {
                    LibraryPoll::Ready
                }
            }
        })
        .await;

        assert_eq!(result, LibraryWaitResult::Ready);
    }

    fn entry(id: Option<&str>, title: &str, ready: bool) -> LibraryEntry {
        LibraryEntry {
            video_id: id.map(String::from),
            title: title.to_string(),
            ready,
        }
    }

    #[test]
    fn test_title_keywords_capped_at_five() {
        let keywords =
            title_keywords("Massive flooding strikes coastal towns across southern Spain today");
        assert_eq!(keywords.len(), 5);
        assert_eq!(keywords[0], "massive");
    }

    #[test]
    fn test_fuzzy_match_needs_two_keywords() {
        let keywords = title_keywords("Putin receives Venezuelan delegation Moscow");
        assert!(fuzzy_title_match("putin moscow meeting (prepared)", &keywords));
        assert!(!fuzzy_title_match("moscow traffic report", &keywords));
        assert!(!fuzzy_title_match("unrelated entry", &keywords));
    }

    #[test]
    fn test_find_entry_prefers_exact_id() {
        let entries = vec![
            entry(None, "Putin receives Venezuelan delegation", true),
            entry(Some("v42"), "Totally different title", false),
        ];

        let by_id = find_entry(&entries, Some("v42"), "Putin receives Venezuelan delegation");
        assert_eq!(by_id.unwrap().video_id.as_deref(), Some("v42"));

        let by_title = find_entry(&entries, None, "Putin receives Venezuelan delegation");
        assert!(by_title.unwrap().video_id.is_none());

        assert!(find_entry(&entries, Some("v99"), "no overlap at all").is_none());
    }
}
