//! Progress message types.
//!
//! These drive the caller's UI progress indicator; each update carries a
//! stage name, optional current/total counts, and a free-text status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline stage names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Generating the search analysis
    Analyzing,
    /// Issuing platform searches
    Searching,
    /// Running the text relevance scorer
    Scoring,
    /// Visual validation of top candidates
    Validating,
    /// Combining scores and ordering candidates
    Ranking,
    /// Driving the platform download flow
    Downloading,
    /// Polling the personal library for a prepared clip
    WaitingLibrary,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::Searching => "searching",
            PipelineStage::Scoring => "scoring",
            PipelineStage::Validating => "validating",
            PipelineStage::Ranking => "ranking",
            PipelineStage::Downloading => "downloading",
            PipelineStage::WaitingLibrary => "waiting_library",
        }
    }
}

/// Progress update envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressUpdate {
    /// A pipeline stage started
    Stage {
        stage: PipelineStage,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Item-level progress within a stage
    Item {
        stage: PipelineStage,
        current: u32,
        total: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Free-text status line
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Non-fatal error surfaced to the UI
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressUpdate {
    /// Create a stage-started update.
    pub fn stage(stage: PipelineStage, message: impl Into<String>) -> Self {
        ProgressUpdate::Stage {
            stage,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an item-progress update.
    pub fn item(stage: PipelineStage, current: u32, total: u32) -> Self {
        ProgressUpdate::Item {
            stage,
            current,
            total,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Create an item-progress update with a status message.
    pub fn item_with_message(
        stage: PipelineStage,
        current: u32,
        total: u32,
        message: impl Into<String>,
    ) -> Self {
        ProgressUpdate::Item {
            stage,
            current,
            total,
            message: Some(message.into()),
            timestamp: Utc::now(),
        }
    }

    /// Create a log update.
    pub fn log(message: impl Into<String>) -> Self {
        ProgressUpdate::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create an error update.
    pub fn error(message: impl Into<String>) -> Self {
        ProgressUpdate::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_wire_format() {
        let update = ProgressUpdate::stage(PipelineStage::Searching, "query 1 of 3");
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "stage");
        assert_eq!(json["stage"], "searching");
        assert_eq!(json["message"], "query 1 of 3");
    }

    #[test]
    fn test_item_omits_empty_message() {
        let update = ProgressUpdate::item(PipelineStage::Validating, 2, 3);
        let json = serde_json::to_string(&update).unwrap();
        assert!(!json.contains("\"message\""));
    }
}
