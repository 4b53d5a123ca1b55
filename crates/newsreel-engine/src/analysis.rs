//! Query/analysis generation for a news segment.
//!
//! One hosted text-model call per segment produces the search analysis:
//! ranked queries, primary visual subject, country, person requirement,
//! and must-show/avoid lists. Parse failures are not retried here; they
//! surface as a pipeline-level failure for the segment.

use tracing::{info, warn};

use newsreel_models::{SearchAnalysis, Segment};

use crate::error::{EngineError, EngineResult};
use crate::model::ModelClient;

/// Advisory result of the optional person-confirmation call.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct PersonConfirmation {
    /// Whether the pictured person is the named individual
    pub is_person: bool,
    /// Model confidence in [0, 1]
    #[serde(default)]
    pub confidence: f32,
    /// Free-text notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// Generates the per-segment search analysis.
pub struct SegmentAnalyzer {
    model: ModelClient,
}

impl SegmentAnalyzer {
    pub fn new(model: ModelClient) -> Self {
        Self { model }
    }

    /// Analyze a segment into search queries and scoring context.
    pub async fn analyze(&self, segment: &Segment) -> EngineResult<SearchAnalysis> {
        let prompt = build_analysis_prompt(segment);
        let analysis: SearchAnalysis = self.model.generate(&prompt).await?;

        if analysis.queries.is_empty() {
            return Err(EngineError::model_failed(
                "Analysis contained no search queries",
            ));
        }

        info!(
            main_subject = %analysis.main_subject,
            queries = analysis.queries.len(),
            person_mode = analysis.person_mode(),
            "Segment analysis generated"
        );

        Ok(analysis)
    }

    /// Optional advisory identity check against a screenshot of the
    /// segment itself. Only runs when a named person is required; any
    /// failure degrades to `None` rather than affecting the pipeline.
    pub async fn confirm_person(
        &self,
        screenshot: &[u8],
        analysis: &SearchAnalysis,
    ) -> Option<PersonConfirmation> {
        let person = analysis.required_person()?;

        let prompt = format!(
            r#"Look at this image. Is the person shown {person}?
{description}
Return ONLY a single JSON object with this schema:
{{
  "is_person": true,
  "confidence": 0.0,
  "notes": "short justification"
}}"#,
            person = person,
            description = analysis
                .person_description
                .as_deref()
                .map(|d| format!("For reference: {}", d))
                .unwrap_or_default(),
        );

        match self.model.generate_vision(&prompt, screenshot).await {
            Ok(confirmation) => Some(confirmation),
            Err(e) => {
                warn!(error = %e, "Person confirmation call failed, continuing without it");
                None
            }
        }
    }
}

/// Build the strict-JSON analysis instruction for a segment.
fn build_analysis_prompt(segment: &Segment) -> String {
    format!(
        r#"You prepare footage searches for a news video editor. Analyze this news segment:

HEADLINE: {headline}

TEXT: {text}

IMPORTANT: You must strictly follow this output format.
Return ONLY a single JSON object with this schema:
{{
  "main_subject": "the primary visual subject of the segment",
  "country": "country the segment is about, or null",
  "has_important_person": false,
  "person_name": "full name, only when a specific named person must appear",
  "person_description": "short visual description of that person",
  "key_visuals": ["visual elements expected in matching footage"],
  "must_show": ["elements the footage must show"],
  "avoid": ["elements the footage must avoid"],
  "queries": ["search query 1", "search query 2"]
}}

Additional instructions:
- Return ONLY a single JSON object and nothing else.
- Queries must be short (1-3 words) and ordered most specific first,
  most generic last.
- Set has_important_person to true ONLY when the story requires a
  specific named person to be visible on screen.
- key_visuals, must_show and avoid must be short literal phrases.
"#,
        headline = segment.headline,
        text = segment.text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_segment() {
        let segment = Segment::new("Putin meets Yvan Gil", "Talks in Moscow on Tuesday.");
        let prompt = build_analysis_prompt(&segment);
        assert!(prompt.contains("Putin meets Yvan Gil"));
        assert!(prompt.contains("Talks in Moscow"));
        assert!(prompt.contains("has_important_person"));
    }

    #[tokio::test]
    async fn test_confirm_person_skipped_without_requirement() {
        let analyzer = SegmentAnalyzer::new(ModelClient::new("k", "http://127.0.0.1:1"));
        let analysis = SearchAnalysis::default();
        // No person required: no call is made, regardless of the bad URL.
        assert!(analyzer.confirm_person(&[0u8], &analysis).await.is_none());
    }
}
