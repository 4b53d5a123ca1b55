//! Visual validation of top candidates.
//!
//! One vision-model call per candidate, bounded to the top-N after text
//! scoring, with a pacing delay between calls. Person mode asks a direct
//! identity question; footage mode asks for topical/contextual relevance.
//! A reply that fails to parse degrades to a conservative default rather
//! than failing the candidate.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use newsreel_models::{
    Candidate, ContextMatch, PersonMatch, Recommendation, SearchAnalysis, VisualAnalysis,
};

use crate::model::ModelClient;

/// Upward adjustment when context is exact and the country agrees.
const EXACT_CONTEXT_BONUS: u8 = 10;

/// Downward adjustment when the country mismatches a high-scoring reply.
const COUNTRY_MISMATCH_PENALTY: u8 = 15;

/// Score above which a country mismatch is treated as suspicious.
const COUNTRY_MISMATCH_THRESHOLD: u8 = 80;

/// Raw person-mode reply.
#[derive(Debug, Deserialize)]
struct PersonReply {
    person_match: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    relevance_score: u8,
    #[serde(default)]
    notes: Option<String>,
}

/// Raw footage-mode reply.
#[derive(Debug, Deserialize)]
struct FootageReply {
    context_match: ContextMatch,
    #[serde(default)]
    country_match: Option<bool>,
    #[serde(default)]
    relevance_score: u8,
    recommendation: Recommendation,
    #[serde(default)]
    notes: Option<String>,
}

/// Validates candidate screenshots against the segment analysis.
pub struct VisualValidator {
    model: ModelClient,
    top_n: usize,
    pacing: Duration,
}

impl VisualValidator {
    pub fn new(model: ModelClient, top_n: usize, pacing: Duration) -> Self {
        Self {
            model,
            top_n,
            pacing,
        }
    }

    /// Validate the first `top_n` candidates that carry a screenshot.
    ///
    /// Candidates are expected in text-score order; results are attached
    /// in place. Calls are paced to respect model rate limits.
    pub async fn validate_top(
        &self,
        candidates: &mut [Candidate],
        analysis: &SearchAnalysis,
        requires_person: bool,
    ) {
        let mut validated = 0usize;

        for candidate in candidates.iter_mut() {
            if validated >= self.top_n {
                break;
            }
            let Some(screenshot) = candidate.screenshot.clone() else {
                debug!(url = %candidate.url, "No screenshot, skipping visual validation");
                continue;
            };

            if validated > 0 {
                tokio::time::sleep(self.pacing).await;
            }

            let visual = self
                .validate(&screenshot, candidate, analysis, requires_person)
                .await;
            info!(
                url = %candidate.url,
                score = visual.relevance_score,
                recommendation = visual.recommendation.as_str(),
                "Visual validation complete"
            );
            candidate.visual = Some(visual);
            validated += 1;
        }
    }

    /// Validate one screenshot.
    async fn validate(
        &self,
        screenshot: &[u8],
        candidate: &Candidate,
        analysis: &SearchAnalysis,
        requires_person: bool,
    ) -> VisualAnalysis {
        if requires_person {
            let prompt = build_person_prompt(analysis, candidate);
            match self.model.generate_vision::<PersonReply>(&prompt, screenshot).await {
                Ok(reply) => person_analysis(reply),
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "Person validation unparseable, using conservative default");
                    VisualAnalysis::conservative_default()
                }
            }
        } else {
            let prompt = build_footage_prompt(analysis, candidate);
            match self.model.generate_vision::<FootageReply>(&prompt, screenshot).await {
                Ok(reply) => footage_analysis(reply),
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "Footage validation unparseable, using conservative default");
                    VisualAnalysis::conservative_default()
                }
            }
        }
    }
}

/// Map a person-mode reply onto the shared analysis type.
fn person_analysis(reply: PersonReply) -> VisualAnalysis {
    let person_match = match reply.person_match.to_lowercase().as_str() {
        "confirmed" | "yes" | "true" => PersonMatch::Confirmed,
        "possible" | "maybe" => PersonMatch::Possible,
        _ => PersonMatch::No,
    };

    VisualAnalysis {
        person_match: Some(person_match),
        context_match: None,
        country_match: None,
        relevance_score: reply.relevance_score.min(100),
        confidence: reply.confidence.clamp(0.0, 1.0),
        recommendation: match person_match {
            PersonMatch::Confirmed => Recommendation::Accept,
            PersonMatch::Possible => Recommendation::Review,
            PersonMatch::No => Recommendation::Reject,
        },
        notes: reply.notes,
    }
}

/// Map a footage-mode reply, applying the context/country adjustments.
fn footage_analysis(reply: FootageReply) -> VisualAnalysis {
    let adjusted = adjust_footage_score(
        reply.relevance_score.min(100),
        reply.context_match,
        reply.country_match,
    );

    VisualAnalysis {
        person_match: None,
        context_match: Some(reply.context_match),
        country_match: reply.country_match,
        relevance_score: adjusted,
        confidence: 0.0,
        recommendation: reply.recommendation,
        notes: reply.notes,
    }
}

/// Raw score adjustment: exact context with country agreement bumps the
/// score; a country mismatch undercuts a nominally high one.
fn adjust_footage_score(score: u8, context: ContextMatch, country_match: Option<bool>) -> u8 {
    if context == ContextMatch::Exact && country_match == Some(true) {
        return score.saturating_add(EXACT_CONTEXT_BONUS).min(100);
    }
    if country_match == Some(false) && score >= COUNTRY_MISMATCH_THRESHOLD {
        return score.saturating_sub(COUNTRY_MISMATCH_PENALTY);
    }
    score
}

fn build_person_prompt(analysis: &SearchAnalysis, candidate: &Candidate) -> String {
    let person = analysis.required_person().unwrap_or("the named person");
    format!(
        r#"This is a frame from a news footage clip titled "{title}".
Is the person shown {person}?
{description}
IMPORTANT: You must strictly follow this output format.
Return ONLY a single JSON object with this schema:
{{
  "person_match": "confirmed" | "possible" | "no",
  "confidence": 0.0,
  "relevance_score": 0,
  "notes": "short justification"
}}
- relevance_score is 0-100 for how usable this clip is for a story about {person}.
"#,
        title = candidate.title,
        person = person,
        description = analysis
            .person_description
            .as_deref()
            .map(|d| format!("For reference: {}", d))
            .unwrap_or_default(),
    )
}

fn build_footage_prompt(analysis: &SearchAnalysis, candidate: &Candidate) -> String {
    format!(
        r#"This is a frame from a news footage clip titled "{title}".
Judge its relevance for a story about: {subject}
Country: {country}
Expected visuals: {visuals}
Must avoid: {avoid}
IMPORTANT: You must strictly follow this output format.
Return ONLY a single JSON object with this schema:
{{
  "context_match": "exact" | "related" | "loose" | "none",
  "country_match": true,
  "relevance_score": 0,
  "recommendation": "ACCEPT" | "REVIEW" | "REJECT",
  "notes": "short justification"
}}
- relevance_score is 0-100.
"#,
        title = candidate.title,
        subject = analysis.main_subject,
        country = analysis.country.as_deref().unwrap_or("unspecified"),
        visuals = analysis.key_visuals.join(", "),
        avoid = analysis.avoid.join(", "),
    )
}
