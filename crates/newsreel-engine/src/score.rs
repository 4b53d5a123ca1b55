//! Deterministic text relevance scorer.
//!
//! Scores a deeply-analyzed candidate against the generated analysis.
//! The function is pure: it returns the score plus a structured breakdown
//! of which rules fired, and logging stays with the caller.
//!
//! Point values are a tuned default policy, centralized here so policy
//! changes never touch control flow.

use newsreel_models::{Candidate, ScoreSignal, SearchAnalysis, TextScore};

const SUBJECT_3_WORDS: i32 = 40;
const SUBJECT_2_WORDS: i32 = 25;
const SUBJECT_1_WORD: i32 = 10;
const COUNTRY_PRESENT: i32 = 20;
const COUNTRY_IN_TITLE: i32 = 10;
const KEY_VISUAL_PHRASE: i32 = 20;
const KEY_VISUAL_WORD: i32 = 8;
const MUST_SHOW_PHRASE: i32 = 30;
const MUST_SHOW_TWO_WORDS: i32 = 20;
const MUST_SHOW_ONE_WORD: i32 = 10;
const TOPIC_KEYWORD: i32 = 10;
const TOPIC_CAP: i32 = 25;
const HOT_TOPIC_PENALTY: i32 = -25;
const AVOID_PENALTY: i32 = -15;
const PERSON_FULL_NAME: i32 = 60;
const PERSON_SURNAME: i32 = 50;
const PERSON_FRAGMENT: i32 = 40;
const PERSON_MISSING: i32 = -20;

/// Topic keyword sets; a keyword only counts when it also appears in the
/// declared main subject.
const TOPIC_SETS: &[(&str, &[&str])] = &[
    (
        "military",
        &[
            "military", "army", "troops", "soldiers", "tanks", "missile", "airstrike", "navy",
            "drone",
        ],
    ),
    (
        "disaster",
        &[
            "flood", "earthquake", "wildfire", "hurricane", "storm", "tsunami", "landslide",
            "disaster",
        ],
    ),
    (
        "protest",
        &["protest", "demonstration", "riot", "rally", "march", "unrest"],
    ),
    (
        "economy",
        &[
            "economy", "inflation", "market", "trade", "tariff", "recession", "currency",
        ],
    ),
    (
        "politics",
        &[
            "election", "parliament", "president", "minister", "summit", "sanctions", "vote",
            "government",
        ],
    ),
];

/// Geopolitical terms that drag in unrelated footage when they show up in
/// a title; penalized unless the declared subject is actually about them.
const HOT_TOPICS: &[&str] = &[
    "ukraine",
    "gaza",
    "israel",
    "russia",
    "china",
    "taiwan",
    "north korea",
    "iran",
    "syria",
];

/// Words too common to count as significant matches.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "from", "that", "this", "over", "into", "after", "near", "their",
    "during", "about",
];

/// Score a candidate against the analysis.
///
/// Deterministic and side-effect free; always returns a score in [0, 100].
pub fn score_candidate(candidate: &Candidate, analysis: &SearchAnalysis) -> TextScore {
    let haystack = candidate_haystack(candidate);
    let title = candidate.title.to_lowercase();
    let subject = analysis.main_subject.to_lowercase();

    let mut total: i32 = 0;
    let mut signals: Vec<ScoreSignal> = Vec::new();
    let mut fire = |signals: &mut Vec<ScoreSignal>, total: &mut i32, rule: &str, delta: i32| {
        *total += delta;
        signals.push(ScoreSignal::new(rule, delta));
    };

    let required_person = analysis.required_person();

    // Subject-term overlap only matters when no named person carries the
    // segment; person stories are scored on the person rules below.
    if required_person.is_none() {
        let matched = significant_words(&subject)
            .filter(|word| haystack.contains(word))
            .count();
        let delta = match matched {
            0 => 0,
            1 => SUBJECT_1_WORD,
            2 => SUBJECT_2_WORDS,
            _ => SUBJECT_3_WORDS,
        };
        if delta > 0 {
            fire(&mut signals, &mut total, "subject_overlap", delta);
        }
    }

    if let Some(country) = analysis.country.as_deref() {
        let country = country.to_lowercase();
        if !country.is_empty() && haystack.contains(&country) {
            fire(&mut signals, &mut total, "country_present", COUNTRY_PRESENT);
            if title.contains(&country) {
                fire(&mut signals, &mut total, "country_in_title", COUNTRY_IN_TITLE);
            }
        }
    }

    for visual in &analysis.key_visuals {
        let phrase = visual.to_lowercase();
        if phrase.is_empty() {
            continue;
        }
        if haystack.contains(&phrase) {
            fire(&mut signals, &mut total, "key_visual_phrase", KEY_VISUAL_PHRASE);
        } else {
            for word in significant_words(&phrase) {
                if haystack.contains(word) {
                    fire(&mut signals, &mut total, "key_visual_word", KEY_VISUAL_WORD);
                }
            }
        }
    }

    for item in &analysis.must_show {
        let phrase = item.to_lowercase();
        if phrase.is_empty() {
            continue;
        }
        if haystack.contains(&phrase) {
            fire(&mut signals, &mut total, "must_show_phrase", MUST_SHOW_PHRASE);
        } else {
            let matched = significant_words(&phrase)
                .filter(|word| haystack.contains(word))
                .count();
            let delta = match matched {
                0 => 0,
                1 => MUST_SHOW_ONE_WORD,
                _ => MUST_SHOW_TWO_WORDS,
            };
            if delta > 0 {
                fire(&mut signals, &mut total, "must_show_words", delta);
            }
        }
    }

    // Topic bonus, capped; only keywords the declared subject is about.
    let mut topic_bonus = 0;
    for (_topic, keywords) in TOPIC_SETS {
        for keyword in *keywords {
            if subject.contains(keyword) && haystack.contains(keyword) {
                topic_bonus += TOPIC_KEYWORD;
            }
        }
    }
    if topic_bonus > 0 {
        fire(
            &mut signals,
            &mut total,
            "topic_keywords",
            topic_bonus.min(TOPIC_CAP),
        );
    }

    for hot in HOT_TOPICS {
        if title.contains(hot) && !subject.contains(hot) {
            fire(&mut signals, &mut total, "unrelated_hot_topic", HOT_TOPIC_PENALTY);
        }
    }

    for avoided in &analysis.avoid {
        let phrase = avoided.to_lowercase();
        if !phrase.is_empty() && haystack.contains(&phrase) {
            fire(&mut signals, &mut total, "avoided_element", AVOID_PENALTY);
        }
    }

    // Named-person requirement; the only punitive rule in the taxonomy.
    let mut person_match_in_text = false;
    if let Some(name) = required_person {
        let name = name.to_lowercase();
        let words: Vec<&str> = name.split_whitespace().collect();
        let surname = words.last().copied().unwrap_or("");

        if haystack.contains(&name) {
            person_match_in_text = true;
            fire(&mut signals, &mut total, "person_full_name", PERSON_FULL_NAME);
        } else if surname.len() >= 3 && haystack.contains(surname) {
            person_match_in_text = true;
            fire(&mut signals, &mut total, "person_surname", PERSON_SURNAME);
        } else if words
            .iter()
            .any(|word| word.len() >= 3 && haystack.contains(*word))
        {
            person_match_in_text = true;
            fire(&mut signals, &mut total, "person_fragment", PERSON_FRAGMENT);
        } else {
            fire(&mut signals, &mut total, "person_missing", PERSON_MISSING);
        }
    }

    TextScore {
        score: total.clamp(0, 100) as u8,
        person_match_in_text,
        signals,
    }
}

/// Lowercased concatenation of everything the scorer reads.
fn candidate_haystack(candidate: &Candidate) -> String {
    let mut haystack = String::new();
    haystack.push_str(&candidate.title);
    haystack.push('\n');
    if let Some(description) = &candidate.description {
        haystack.push_str(description);
        haystack.push('\n');
    }
    if let Some(shot_list) = &candidate.shot_list {
        haystack.push_str(shot_list);
        haystack.push('\n');
    }
    if let Some(page_text) = &candidate.page_text {
        haystack.push_str(page_text);
    }
    haystack.to_lowercase()
}

/// Words worth matching individually: 4+ characters, not a stopword.
fn significant_words(phrase: &str) -> impl Iterator<Item = &str> {
    phrase
        .split_whitespace()
        .filter(|word| word.len() >= 4 && !STOPWORDS.contains(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate_with_text(title: &str, shot_list: &str) -> Candidate {
        let mut candidate = Candidate::new("https://example.com/clip/1", "query", 0);
        candidate.title = title.to_string();
        candidate.shot_list = Some(shot_list.to_string());
        candidate
    }

    fn footage_analysis() -> SearchAnalysis {
        SearchAnalysis {
            main_subject: "flood damage houses".to_string(),
            country: Some("Spain".to_string()),
            key_visuals: vec!["flooded street".to_string()],
            must_show: vec!["rescue boats".to_string()],
            queries: vec!["flood spain".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_deterministic_and_in_range() {
        let candidate = candidate_with_text(
            "Spain flood damage",
            "flooded street, rescue boats on the avenue",
        );
        let analysis = footage_analysis();

        let first = score_candidate(&candidate, &analysis);
        let second = score_candidate(&candidate, &analysis);
        assert_eq!(first.score, second.score);
        assert!(first.score <= 100);
        assert!(!first.signals.is_empty());
    }

    #[test]
    fn test_subject_overlap_tiers() {
        let analysis = SearchAnalysis {
            main_subject: "orchard damage houses".to_string(),
            queries: vec!["q".into()],
            ..Default::default()
        };

        let one = score_candidate(&candidate_with_text("orchard report", ""), &analysis);
        let two = score_candidate(&candidate_with_text("orchard damage report", ""), &analysis);
        let three =
            score_candidate(&candidate_with_text("orchard damage to houses", ""), &analysis);

        assert_eq!(one.score, 10);
        assert_eq!(two.score, 25);
        assert_eq!(three.score, 40);
    }

    #[test]
    fn test_country_title_bonus() {
        let analysis = SearchAnalysis {
            country: Some("Spain".to_string()),
            queries: vec!["q".into()],
            ..Default::default()
        };

        let in_body = score_candidate(&candidate_with_text("floods", "filmed in spain"), &analysis);
        let in_title = score_candidate(&candidate_with_text("Spain floods", ""), &analysis);

        assert_eq!(in_body.score, 20);
        assert_eq!(in_title.score, 30);
    }

    #[test]
    fn test_key_visual_phrase_vs_words() {
        let analysis = SearchAnalysis {
            key_visuals: vec!["flooded street".to_string()],
            queries: vec!["q".into()],
            ..Default::default()
        };

        let phrase = score_candidate(
            &candidate_with_text("", "a flooded street downtown"),
            &analysis,
        );
        let word = score_candidate(&candidate_with_text("", "the street was dry"), &analysis);

        assert_eq!(phrase.score, 20);
        assert_eq!(word.score, 8);
    }

    #[test]
    fn test_must_show_tiers() {
        let analysis = SearchAnalysis {
            must_show: vec!["rescue boats helicopters".to_string()],
            queries: vec!["q".into()],
            ..Default::default()
        };

        let full = score_candidate(
            &candidate_with_text("", "rescue boats helicopters overhead"),
            &analysis,
        );
        let two = score_candidate(
            &candidate_with_text("", "boats and a rescue team"),
            &analysis,
        );
        let one = score_candidate(&candidate_with_text("", "boats in harbour"), &analysis);

        assert_eq!(full.score, 30);
        assert_eq!(two.score, 20);
        assert_eq!(one.score, 10);
    }

    #[test]
    fn test_topic_bonus_requires_subject_agreement() {
        let about_protest = SearchAnalysis {
            main_subject: "protest in paris".to_string(),
            queries: vec!["q".into()],
            ..Default::default()
        };
        let about_weather = SearchAnalysis {
            main_subject: "summer heatwave".to_string(),
            queries: vec!["q".into()],
            ..Default::default()
        };

        let candidate = candidate_with_text("", "protest march through the city");

        let related = score_candidate(&candidate, &about_protest);
        let unrelated = score_candidate(&candidate, &about_weather);

        assert!(related.score > 0);
        assert_eq!(unrelated.score, 0);
    }

    #[test]
    fn test_topic_bonus_capped() {
        let analysis = SearchAnalysis {
            main_subject: "military army troops tanks missile".to_string(),
            queries: vec!["q".into()],
            ..Default::default()
        };
        let candidate = candidate_with_text("", "military army troops tanks missile");
        let score = score_candidate(&candidate, &analysis);

        let topic_signal = score
            .signals
            .iter()
            .find(|s| s.rule == "topic_keywords")
            .unwrap();
        assert_eq!(topic_signal.delta, 25);
    }

    #[test]
    fn test_unrelated_hot_topic_penalty() {
        let analysis = SearchAnalysis {
            main_subject: "farm subsidies".to_string(),
            must_show: vec!["tractor".to_string()],
            queries: vec!["q".into()],
            ..Default::default()
        };

        let clean = score_candidate(&candidate_with_text("Tractor convoy", "tractor"), &analysis);
        let tainted = score_candidate(
            &candidate_with_text("Tractor convoy near Ukraine border", "tractor"),
            &analysis,
        );

        assert_eq!(clean.score as i32 - 25, tainted.score as i32);
    }

    #[test]
    fn test_person_rules() {
        let analysis = SearchAnalysis {
            main_subject: "diplomatic meeting".to_string(),
            has_important_person: true,
            person_name: Some("Vladimir Putin".to_string()),
            queries: vec!["q".into()],
            ..Default::default()
        };

        let full = score_candidate(
            &candidate_with_text("", "vladimir putin greets delegation"),
            &analysis,
        );
        let surname = score_candidate(&candidate_with_text("", "putin at kremlin"), &analysis);
        let fragment = score_candidate(&candidate_with_text("", "vladimir speaks"), &analysis);
        let missing = score_candidate(&candidate_with_text("", "empty kremlin hall"), &analysis);

        assert_eq!(full.score, 60);
        assert!(full.person_match_in_text);
        assert_eq!(surname.score, 50);
        assert_eq!(fragment.score, 40);
        assert_eq!(missing.score, 0); // clamped from -20
        assert!(!missing.person_match_in_text);
        assert_eq!(
            missing.signals.iter().find(|s| s.rule == "person_missing").unwrap().delta,
            -20
        );
    }

    #[test]
    fn test_person_absence_scores_at_least_20_lower() {
        let analysis = SearchAnalysis {
            main_subject: "diplomatic meeting".to_string(),
            country: Some("Russia".to_string()),
            has_important_person: true,
            person_name: Some("Vladimir Putin".to_string()),
            queries: vec!["q".into()],
            ..Default::default()
        };

        let without = candidate_with_text("Kremlin meeting", "delegations in moscow russia");
        let mut with = without.clone();
        with.shot_list = Some(format!("{} vladimir putin", without.shot_list.as_deref().unwrap()));

        let absent = score_candidate(&without, &analysis);
        let present = score_candidate(&with, &analysis);

        assert!(present.score as i32 - absent.score as i32 >= 20);
    }

    #[test]
    fn test_no_subject_overlap_in_person_mode() {
        let analysis = SearchAnalysis {
            main_subject: "kremlin meeting hall".to_string(),
            has_important_person: true,
            person_name: Some("Vladimir Putin".to_string()),
            queries: vec!["q".into()],
            ..Default::default()
        };

        let score = score_candidate(
            &candidate_with_text("", "kremlin meeting hall wide shot"),
            &analysis,
        );
        assert!(score.signals.iter().all(|s| s.rule != "subject_overlap"));
    }

    #[test]
    fn test_avoid_penalty() {
        let analysis = SearchAnalysis {
            must_show: vec!["stadium".to_string()],
            avoid: vec!["cartoon".to_string()],
            queries: vec!["q".into()],
            ..Default::default()
        };

        let clean = score_candidate(&candidate_with_text("", "stadium crowd"), &analysis);
        let tainted =
            score_candidate(&candidate_with_text("", "stadium cartoon replay"), &analysis);
        assert!(tainted.score < clean.score);
    }
}
