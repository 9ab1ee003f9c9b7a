// src/models/session.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Proctor session lifecycle. The only legal transitions are
/// `Active -> Submitted` (normal completion) and `Active -> Ended`
/// (superseded or administratively closed). Closed states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Submitted,
    Ended,
}

/// Why a requested transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The session is already in a terminal state.
    AlreadyClosed(SessionStatus),
    /// The target state is not reachable from any state (e.g. re-entering ACTIVE).
    Invalid,
}

impl SessionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(SessionStatus::Active),
            "SUBMITTED" => Some(SessionStatus::Submitted),
            "ENDED" => Some(SessionStatus::Ended),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Submitted => "SUBMITTED",
            SessionStatus::Ended => "ENDED",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }

    /// Typed transition check. The database guard (`WHERE status = 'ACTIVE'`)
    /// remains the atomic arbiter under concurrency; this keeps the legal
    /// moves exhaustive in one place.
    pub fn transition(self, to: SessionStatus) -> Result<SessionStatus, TransitionError> {
        match (self, to) {
            (SessionStatus::Active, SessionStatus::Submitted)
            | (SessionStatus::Active, SessionStatus::Ended) => Ok(to),
            (SessionStatus::Submitted, _) | (SessionStatus::Ended, _) => {
                Err(TransitionError::AlreadyClosed(self))
            }
            (SessionStatus::Active, SessionStatus::Active) => Err(TransitionError::Invalid),
        }
    }
}

/// Proctoring intensity configured on the exam, not chosen by the student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProctorMode {
    Basic,
    Webcam,
}

impl ProctorMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "WEBCAM" => ProctorMode::Webcam,
            _ => ProctorMode::Basic,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProctorMode::Basic => "BASIC",
            ProctorMode::Webcam => "WEBCAM",
        }
    }
}

/// Human review verdict on a session. Advisory bookkeeping only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewStatus {
    Pending,
    Cleared,
    Flagged,
}

impl ReviewStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ReviewStatus::Pending),
            "CLEARED" => Some(ReviewStatus::Cleared),
            "FLAGGED" => Some(ReviewStatus::Flagged),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::Cleared => "CLEARED",
            ReviewStatus::Flagged => "FLAGGED",
        }
    }
}

/// Optional client-reported context attached at session start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub fingerprint: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Full session row as persisted.
#[derive(Debug, FromRow)]
pub struct ProctorSessionRow {
    pub id: i64,
    pub user_id: i64,
    pub exam_id: i64,
    pub status: String,
    pub mode: String,
    pub screenshare_enabled: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_event_at: DateTime<Utc>,
    pub warning_count: i32,
    pub events_count: i32,
    pub snapshots_count: i32,
    pub suspicious_score: i64,
    pub review_status: String,
    pub review_notes: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub fingerprint: Option<String>,
    pub paper: Option<serde_json::Value>,
    pub paper_hash: Option<String>,
}

impl ProctorSessionRow {
    /// Status strings come from our own writes; anything else is corruption.
    pub fn status(&self) -> Result<SessionStatus, String> {
        SessionStatus::parse(&self.status)
            .ok_or_else(|| format!("session {} has unknown status '{}'", self.id, self.status))
    }
}

/// Compact summary returned by the "fetch active session" operation.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[sqlx(rename = "id")]
    pub session_id: i64,
    pub mode: String,
    pub warning_count: i32,
    pub started_at: DateTime<Utc>,
    pub screenshare_enabled: bool,
}

/// Row shape for a stored snapshot.
#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProctorSnapshotRow {
    pub id: i64,
    pub file_path: String,
    pub snapshot_type: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_reaches_both_terminal_states() {
        assert_eq!(
            SessionStatus::Active.transition(SessionStatus::Submitted),
            Ok(SessionStatus::Submitted)
        );
        assert_eq!(
            SessionStatus::Active.transition(SessionStatus::Ended),
            Ok(SessionStatus::Ended)
        );
    }

    #[test]
    fn closed_states_are_terminal() {
        for closed in [SessionStatus::Submitted, SessionStatus::Ended] {
            for target in [
                SessionStatus::Active,
                SessionStatus::Submitted,
                SessionStatus::Ended,
            ] {
                assert_eq!(
                    closed.transition(target),
                    Err(TransitionError::AlreadyClosed(closed))
                );
            }
        }
    }

    #[test]
    fn active_cannot_reenter_active() {
        assert_eq!(
            SessionStatus::Active.transition(SessionStatus::Active),
            Err(TransitionError::Invalid)
        );
    }

    #[test]
    fn status_strings_round_trip() {
        for s in [
            SessionStatus::Active,
            SessionStatus::Submitted,
            SessionStatus::Ended,
        ] {
            assert_eq!(SessionStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(SessionStatus::parse("PAUSED"), None);
    }
}
