//! Footage candidate models.

use serde::{Deserialize, Serialize};

/// A single footage item returned by a platform search, progressively
/// enriched with metadata and scores as it moves through the pipeline.
///
/// Identity is the platform URL; candidates are de-duplicated by URL
/// across queries, retaining the earliest query priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Platform detail-page URL (candidate identity)
    pub url: String,

    /// Clip title
    pub title: String,

    /// Descriptive text block from the detail page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Shot list block from the detail page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shot_list: Option<String>,

    /// Required attribution string for licensed footage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mandatory_credit: Option<String>,

    /// Duration token as shown on the page (e.g. "01:24")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Raw page text captured during deep analysis
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_text: Option<String>,

    /// Representative screenshot (PNG), captured for visual validation
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,

    /// The generated query that produced this candidate
    pub source_query: String,

    /// Priority of the source query (0 = most specific)
    pub query_priority: u32,

    /// Text relevance score, attached by the scorer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_score: Option<TextScore>,

    /// Visual validation result, attached for the top-N candidates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual: Option<VisualAnalysis>,

    /// Combined final score, attached by the ranker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<u8>,
}

impl Candidate {
    /// Create a bare candidate from a search hit.
    pub fn new(url: impl Into<String>, source_query: impl Into<String>, priority: u32) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            description: None,
            shot_list: None,
            mandatory_credit: None,
            duration: None,
            page_text: None,
            screenshot: None,
            source_query: source_query.into(),
            query_priority: priority,
            text_score: None,
            visual: None,
            final_score: None,
        }
    }

    /// Text score value, 0 when unscored.
    pub fn text_score_value(&self) -> u8 {
        self.text_score.as_ref().map(|s| s.score).unwrap_or(0)
    }
}

/// Result of the deterministic text relevance scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextScore {
    /// Relevance score in [0, 100]
    pub score: u8,

    /// Whether the required person's name was found in candidate metadata
    pub person_match_in_text: bool,

    /// Which scoring rules fired, with their deltas
    #[serde(default)]
    pub signals: Vec<ScoreSignal>,
}

/// A single scoring rule that fired, recorded for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSignal {
    /// Rule name (e.g. "country_in_title")
    pub rule: String,

    /// Points added or removed
    pub delta: i32,
}

impl ScoreSignal {
    pub fn new(rule: impl Into<String>, delta: i32) -> Self {
        Self {
            rule: rule.into(),
            delta,
        }
    }
}

/// Person identity verdict from the visual validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonMatch {
    /// The pictured person is the named individual
    Confirmed,
    /// Possibly the named individual
    Possible,
    /// Not the named individual
    No,
}

/// Topical context verdict from the visual validator (footage mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMatch {
    Exact,
    Related,
    Loose,
    None,
}

impl ContextMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMatch::Exact => "exact",
            ContextMatch::Related => "related",
            ContextMatch::Loose => "loose",
            ContextMatch::None => "none",
        }
    }
}

/// Validator recommendation tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Accept,
    Review,
    Reject,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Accept => "ACCEPT",
            Recommendation::Review => "REVIEW",
            Recommendation::Reject => "REJECT",
        }
    }
}

/// Visual validation result for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualAnalysis {
    /// Person identity verdict (person mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_match: Option<PersonMatch>,

    /// Topical context verdict (footage mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_match: Option<ContextMatch>,

    /// Whether the footage matches the declared country (footage mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_match: Option<bool>,

    /// Visual relevance score in [0, 100]
    pub relevance_score: u8,

    /// Model confidence in [0, 1]
    #[serde(default)]
    pub confidence: f32,

    /// Validator recommendation
    pub recommendation: Recommendation,

    /// Free-text notes from the validator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl VisualAnalysis {
    /// Conservative default used when the model reply cannot be parsed.
    pub fn conservative_default() -> Self {
        Self {
            person_match: None,
            context_match: None,
            country_match: None,
            relevance_score: 30,
            confidence: 0.0,
            recommendation: Recommendation::Review,
            notes: None,
        }
    }
}
