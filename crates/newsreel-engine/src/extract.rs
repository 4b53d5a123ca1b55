//! Pure extraction strategies over candidate page text.
//!
//! Each strategy returns `Option<String>` and is tried in a fixed
//! priority order by the search component, with an explicit no-match
//! terminal value. Nothing here touches a live browser, so every
//! strategy is unit-testable on plain strings.

use once_cell::sync::Lazy;
use regex::Regex;

static LABEL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[A-Za-z]+:\s*").unwrap());
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static SHOT_LIST_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)shot\s*list").unwrap());
static META_DATA_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)meta\s*data").unwrap());
static SHOT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:\d+[.)]\s+|\d{1,2}:\d{2}\s+).+$").unwrap());

static DURATION_LABELED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)duration\s*:?\s*(\d{1,2}:\d{2}(?::\d{2})?)").unwrap());
static DURATION_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2}:\d{2}(?::\d{2})?)\b").unwrap());

static CREDIT_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)mandatory\s+credit\s*:?\s*").unwrap());
static CREDIT_TERMINATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[;|\n]|\busage\s+restrictions?\b").unwrap());

/// Clean a raw search query: strip a leading `label:` prefix and
/// non-word characters, collapse whitespace.
///
/// Cleaning is idempotent; an already-clean query comes back unchanged.
pub fn clean_query(raw: &str) -> String {
    let stripped = LABEL_PREFIX.replace(raw, "");
    let wordy = NON_WORD.replace_all(&stripped, " ");
    WHITESPACE.replace_all(&wordy, " ").trim().to_string()
}

/// Descriptive text block between the title and the shot-list marker.
pub fn description_block(page_text: &str, title: &str) -> Option<String> {
    let shot_list_start = SHOT_LIST_MARKER.find(page_text).map(|m| m.start());

    let after_title = if title.is_empty() {
        None
    } else {
        page_text
            .to_lowercase()
            .find(&title.to_lowercase())
            .map(|pos| pos + title.len())
    };

    let (start, end) = match (after_title, shot_list_start) {
        (Some(start), Some(end)) if start < end => (start, end),
        (None, Some(end)) => (0, end),
        (Some(start), None) => (start, page_text.len()),
        _ => return None,
    };

    let block = page_text.get(start..end)?.trim();
    if block.is_empty() {
        None
    } else {
        Some(block.to_string())
    }
}

/// Shot-list block between the shot-list and meta-data markers, with a
/// pattern-based fallback over numbered/timestamped lines.
pub fn shot_list_block(page_text: &str) -> Option<String> {
    if let Some(marker) = SHOT_LIST_MARKER.find(page_text) {
        let rest = &page_text[marker.end()..];
        let end = META_DATA_MARKER.find(rest).map(|m| m.start()).unwrap_or(rest.len());
        let block = rest[..end].trim();
        if !block.is_empty() {
            return Some(block.to_string());
        }
    }

    // Secondary strategy: a run of shot-like lines without the marker.
    let lines: Vec<&str> = SHOT_LINE
        .find_iter(page_text)
        .map(|m| m.as_str().trim())
        .collect();
    if lines.len() >= 2 {
        return Some(lines.join("\n"));
    }

    None
}

/// Duration token, preferring an explicit `Duration:` label over a bare
/// timecode anywhere on the page.
pub fn duration_token(page_text: &str) -> Option<String> {
    if let Some(captures) = DURATION_LABELED.captures(page_text) {
        return Some(captures[1].to_string());
    }
    DURATION_BARE
        .captures(page_text)
        .map(|captures| captures[1].to_string())
}

/// Mandatory-credit string: the text after the label, truncated at the
/// first separator, semicolon, or usage-restriction clause.
pub fn mandatory_credit(page_text: &str) -> Option<String> {
    let label = CREDIT_LABEL.find(page_text)?;
    let rest = &page_text[label.end()..];

    let end = CREDIT_TERMINATOR
        .find(rest)
        .map(|m| m.start())
        .unwrap_or(rest.len());

    let credit = rest[..end].trim().trim_end_matches(&['.', ','][..]).trim();
    if credit.is_empty() {
        None
    } else {
        Some(credit.to_string())
    }
}
