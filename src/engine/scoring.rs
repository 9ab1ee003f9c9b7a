// src/engine/scoring.rs

use crate::models::event::EventType;

/// Weighted sum over event-type frequencies. Advisory only: this never
/// blocks submission, it is surfaced to human reviewers.
pub fn suspicious_score(type_counts: &[(EventType, i64)]) -> i64 {
    type_counts
        .iter()
        .map(|(event_type, count)| event_type.weight() * count)
        .sum()
}
