//! Download outcomes and retrieval reports.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::analysis::SearchAnalysis;
use crate::candidate::Candidate;

/// Result of attempting to download one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// File landed on disk.
    Success {
        path: PathBuf,
        filename: String,
        /// True when the file came from the personal library after
        /// asynchronous preparation rather than a direct download.
        from_library_fallback: bool,
    },

    /// The platform requires asynchronous preparation and the caller
    /// opted not to wait.
    NeedsAsyncPreparation { video_id: String, title: String },

    /// The library wait window elapsed before the clip became ready.
    Timeout { waited_minutes: u64 },

    /// Download failed for another reason.
    Failure { reason: String },
}

impl DownloadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Success { .. })
    }

    /// Short human-readable reason used in per-candidate skip logs.
    pub fn skip_reason(&self) -> String {
        match self {
            DownloadOutcome::Success { .. } => "success".to_string(),
            DownloadOutcome::NeedsAsyncPreparation { .. } => {
                "requires asynchronous preparation".to_string()
            }
            DownloadOutcome::Timeout { waited_minutes } => {
                format!("timed out after {} minutes in library", waited_minutes)
            }
            DownloadOutcome::Failure { reason } => reason.clone(),
        }
    }
}

/// One entry in the per-candidate skip log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAttempt {
    pub url: String,
    pub title: String,
    pub reason: String,
}

/// Aggregate result of the retrieval fallback loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalReport {
    /// Final outcome (success from some candidate, or aggregate failure)
    pub outcome: DownloadOutcome,

    /// Skip reasons for every candidate tried before the final outcome
    #[serde(default)]
    pub attempts: Vec<CandidateAttempt>,
}

impl RetrievalReport {
    /// Report for the case where no candidates were available at all.
    pub fn empty() -> Self {
        Self {
            outcome: DownloadOutcome::Failure {
                reason: "no candidates to download".to_string(),
            },
            attempts: Vec::new(),
        }
    }
}

/// Result of matching a segment: ranked candidates plus the analysis
/// context they were ranked against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// Candidates in final rank order
    pub videos: Vec<Candidate>,

    /// The generated analysis, returned for UI display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<SearchAnalysis>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_format() {
        let outcome = DownloadOutcome::NeedsAsyncPreparation {
            video_id: "v123".to_string(),
            title: "Flood aftermath".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "needs_async_preparation");
        assert_eq!(json["video_id"], "v123");
    }

    #[test]
    fn test_timeout_skip_reason() {
        let outcome = DownloadOutcome::Timeout { waited_minutes: 4 };
        assert_eq!(outcome.skip_reason(), "timed out after 4 minutes in library");
        assert!(!outcome.is_success());
    }
}
