// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;

/// Frozen copy of the session's integrity signals, stored on the attempt at
/// submit time so later session mutations cannot change the audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProctorFlags {
    pub mode: String,
    pub warning_count: i32,
    pub events_count: i32,
    pub snapshots_count: i32,
    pub started_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
    pub suspicious_score: i64,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    /// Answers map. Key: question id from the paper. Value: selected option
    /// index (into the shuffled option order the student saw).
    pub answers: HashMap<i64, i64>,
    pub proctor_session_id: Option<i64>,
}

/// DTO returned after grading.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub attempt_no: i32,
    pub score_percent: i32,
    pub passed: bool,
    pub submitted_at: DateTime<Utc>,
    pub result_release_at: DateTime<Utc>,
    pub result_visible: bool,
}

/// Latest-attempt summary used for eligibility and result views.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LatestAttemptRow {
    pub id: i64,
    pub attempt_no: i32,
    pub score_percent: i32,
    pub passed: bool,
    pub submitted_at: DateTime<Utc>,
    pub result_release_at: DateTime<Utc>,
}
