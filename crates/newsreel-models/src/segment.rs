//! News segment input model.

use serde::{Deserialize, Serialize};

/// A news segment produced by the upstream script-alignment step.
///
/// Immutable for the duration of one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Segment headline
    pub headline: String,

    /// Descriptive text for the segment
    pub text: String,
}

impl Segment {
    /// Create a new segment.
    pub fn new(headline: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            headline: headline.into(),
            text: text.into(),
        }
    }

    /// Combined headline + text, used when building model prompts.
    pub fn full_text(&self) -> String {
        format!("{}\n{}", self.headline, self.text)
    }
}
