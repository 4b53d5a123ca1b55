//! Final ranking: combines text and visual scores and orders candidates.

use std::cmp::Reverse;

use newsreel_models::{Candidate, PersonMatch};

const TEXT_WEIGHT: f64 = 0.6;
const VISUAL_WEIGHT: f64 = 0.4;
const PERSON_CONFIRMED_BONUS: i32 = 25;
const PERSON_POSSIBLE_BONUS: i32 = 10;
const PERSON_POSSIBLE_MIN_CONFIDENCE: f32 = 0.6;
const PERSON_MISMATCH_PENALTY: i32 = -30;
const FOOTAGE_STRONG_BONUS: i32 = 15;
const FOOTAGE_STRONG_THRESHOLD: u8 = 80;
const FOOTAGE_WEAK_PENALTY: i32 = -20;
const FOOTAGE_WEAK_THRESHOLD: u8 = 60;
const TEXT_PERSON_BONUS: i32 = 20;

/// Combined final score for one candidate.
///
/// `round(text*0.6 + visual*0.4)` when a visual score exists, else the
/// text score, plus mode-specific adjustments, clamped to [0, 100].
pub fn final_score(candidate: &Candidate, person_mode: bool) -> u8 {
    let text = candidate.text_score_value() as i32;

    let mut score = match &candidate.visual {
        Some(visual) => {
            let combined = text as f64 * TEXT_WEIGHT + visual.relevance_score as f64 * VISUAL_WEIGHT;
            combined.round() as i32
        }
        None => text,
    };

    if let Some(visual) = &candidate.visual {
        if person_mode {
            match visual.person_match {
                Some(PersonMatch::Confirmed) => score += PERSON_CONFIRMED_BONUS,
                Some(PersonMatch::Possible)
                    if visual.confidence >= PERSON_POSSIBLE_MIN_CONFIDENCE =>
                {
                    score += PERSON_POSSIBLE_BONUS
                }
                Some(PersonMatch::No) => score += PERSON_MISMATCH_PENALTY,
                _ => {}
            }
        } else {
            if visual.relevance_score >= FOOTAGE_STRONG_THRESHOLD {
                score += FOOTAGE_STRONG_BONUS;
            } else if visual.relevance_score < FOOTAGE_WEAK_THRESHOLD {
                score += FOOTAGE_WEAK_PENALTY;
            }
        }
    }

    if candidate
        .text_score
        .as_ref()
        .map(|t| t.person_match_in_text)
        .unwrap_or(false)
    {
        score += TEXT_PERSON_BONUS;
    }

    score.clamp(0, 100) as u8
}

/// Compute final scores and order the candidate list in place.
///
/// In person mode, confirmed matches sort before possible matches before
/// the rest, then by score within each tier. This is a hard override of
/// pure score ordering: a candidate with an unresolved person mismatch
/// never outranks a confirmed match, whatever its raw score.
pub fn rank_candidates(candidates: &mut [Candidate], person_mode: bool) {
    for candidate in candidates.iter_mut() {
        candidate.final_score = Some(final_score(candidate, person_mode));
    }

    if person_mode {
        candidates.sort_by_key(|c| (person_tier(c), Reverse(c.final_score.unwrap_or(0))));
    } else {
        candidates.sort_by_key(|c| Reverse(c.final_score.unwrap_or(0)));
    }
}

/// Sort tier for person mode: confirmed, then possible, then everything else.
fn person_tier(candidate: &Candidate) -> u8 {
    match candidate.visual.as_ref().and_then(|v| v.person_match) {
        Some(PersonMatch::Confirmed) => 0,
        Some(PersonMatch::Possible) => 1,
        _ => 2,
    }
}
