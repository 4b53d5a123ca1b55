//! Search analysis generated once per segment by the hosted text model.

use serde::{Deserialize, Serialize};

/// Analysis of a news segment used to drive search and scoring.
///
/// Generated once per segment and read-only thereafter. Every collection
/// and optional field carries a serde default so partially-malformed model
/// JSON still decodes into something usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchAnalysis {
    /// Primary visual subject of the segment
    #[serde(default)]
    pub main_subject: String,

    /// Country the segment is about, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Whether a specific named person must appear in the footage
    #[serde(default)]
    pub has_important_person: bool,

    /// Name of the required person
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_name: Option<String>,

    /// Short visual description of the required person
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_description: Option<String>,

    /// Key visual elements expected in matching footage
    #[serde(default)]
    pub key_visuals: Vec<String>,

    /// Elements the footage must show
    #[serde(default)]
    pub must_show: Vec<String>,

    /// Elements the footage must avoid
    #[serde(default)]
    pub avoid: Vec<String>,

    /// Search queries ordered specific to generic
    #[serde(default)]
    pub queries: Vec<String>,
}

impl SearchAnalysis {
    /// The required person's name, when person mode is active.
    pub fn required_person(&self) -> Option<&str> {
        if self.has_important_person {
            self.person_name.as_deref().filter(|n| !n.is_empty())
        } else {
            None
        }
    }

    /// Whether the pipeline should run in person mode.
    pub fn person_mode(&self) -> bool {
        self.required_person().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_partial_model_json() {
        let analysis: SearchAnalysis =
            serde_json::from_str(r#"{"main_subject": "flood damage", "queries": ["flood"]}"#)
                .unwrap();
        assert_eq!(analysis.main_subject, "flood damage");
        assert_eq!(analysis.queries, vec!["flood"]);
        assert!(!analysis.has_important_person);
        assert!(analysis.must_show.is_empty());
    }

    #[test]
    fn test_required_person_needs_flag_and_name() {
        let mut analysis = SearchAnalysis {
            has_important_person: true,
            person_name: Some("Vladimir Putin".to_string()),
            ..Default::default()
        };
        assert_eq!(analysis.required_person(), Some("Vladimir Putin"));
        assert!(analysis.person_mode());

        analysis.person_name = None;
        assert_eq!(analysis.required_person(), None);
        assert!(!analysis.person_mode());

        analysis.person_name = Some(String::new());
        assert_eq!(analysis.required_person(), None);
    }
}
