// src/models/event.rs

use serde::{Deserialize, Serialize};

/// Client-observed integrity signal types.
///
/// The taxonomy is closed here, but the wire format stays an open string:
/// tags we have not seen before land in `Unknown` (weight 0, never a
/// violation), so new client-side detectors can ship before the server
/// learns to weight them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Start,
    Heartbeat,
    TabHidden,
    WindowBlur,
    FullscreenExit,
    CopyAttempt,
    PasteAttempt,
    RightClick,
    NavAway,
    DevtoolsSuspected,
    KeyCombo,
    Printscreen,
    Resize,
    MultiTab,
    NetworkOffline,
    NetworkOnline,
    ScreenshareDenied,
    ScreenshareStopped,
    ScreenshareStarted,
    WebcamStarted,
    WebcamDenied,
    AutoSubmit,
    Unknown(String),
}

impl EventType {
    pub fn parse(tag: &str) -> Self {
        match tag.to_uppercase().as_str() {
            "START" => EventType::Start,
            "HEARTBEAT" => EventType::Heartbeat,
            "TAB_HIDDEN" => EventType::TabHidden,
            "WINDOW_BLUR" => EventType::WindowBlur,
            "FULLSCREEN_EXIT" => EventType::FullscreenExit,
            "COPY_ATTEMPT" => EventType::CopyAttempt,
            "PASTE_ATTEMPT" => EventType::PasteAttempt,
            "RIGHT_CLICK" => EventType::RightClick,
            "NAV_AWAY" => EventType::NavAway,
            "DEVTOOLS_SUSPECTED" => EventType::DevtoolsSuspected,
            "KEY_COMBO" => EventType::KeyCombo,
            "PRINTSCREEN" => EventType::Printscreen,
            "RESIZE" => EventType::Resize,
            "MULTI_TAB" => EventType::MultiTab,
            "NETWORK_OFFLINE" => EventType::NetworkOffline,
            "NETWORK_ONLINE" => EventType::NetworkOnline,
            "SCREENSHARE_DENIED" => EventType::ScreenshareDenied,
            "SCREENSHARE_STOPPED" => EventType::ScreenshareStopped,
            "SCREENSHARE_STARTED" => EventType::ScreenshareStarted,
            "WEBCAM_STARTED" => EventType::WebcamStarted,
            "WEBCAM_DENIED" => EventType::WebcamDenied,
            "AUTO_SUBMIT" => EventType::AutoSubmit,
            other => EventType::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::Start => "START",
            EventType::Heartbeat => "HEARTBEAT",
            EventType::TabHidden => "TAB_HIDDEN",
            EventType::WindowBlur => "WINDOW_BLUR",
            EventType::FullscreenExit => "FULLSCREEN_EXIT",
            EventType::CopyAttempt => "COPY_ATTEMPT",
            EventType::PasteAttempt => "PASTE_ATTEMPT",
            EventType::RightClick => "RIGHT_CLICK",
            EventType::NavAway => "NAV_AWAY",
            EventType::DevtoolsSuspected => "DEVTOOLS_SUSPECTED",
            EventType::KeyCombo => "KEY_COMBO",
            EventType::Printscreen => "PRINTSCREEN",
            EventType::Resize => "RESIZE",
            EventType::MultiTab => "MULTI_TAB",
            EventType::NetworkOffline => "NETWORK_OFFLINE",
            EventType::NetworkOnline => "NETWORK_ONLINE",
            EventType::ScreenshareDenied => "SCREENSHARE_DENIED",
            EventType::ScreenshareStopped => "SCREENSHARE_STOPPED",
            EventType::ScreenshareStarted => "SCREENSHARE_STARTED",
            EventType::WebcamStarted => "WEBCAM_STARTED",
            EventType::WebcamDenied => "WEBCAM_DENIED",
            EventType::AutoSubmit => "AUTO_SUBMIT",
            EventType::Unknown(tag) => tag,
        }
    }

    /// Whether this event bumps the session's warning counter.
    pub fn is_violation(&self) -> bool {
        self.weight() > 0
    }

    /// Contribution of one occurrence to the suspicious score.
    /// Heuristic constants; unknown and benign types count zero.
    pub fn weight(&self) -> i64 {
        match self {
            EventType::TabHidden => 3,
            EventType::WindowBlur => 2,
            EventType::FullscreenExit => 5,
            EventType::CopyAttempt => 4,
            EventType::PasteAttempt => 4,
            EventType::RightClick => 1,
            EventType::NavAway => 5,
            EventType::DevtoolsSuspected => 6,
            EventType::KeyCombo => 3,
            EventType::Printscreen => 4,
            EventType::MultiTab => 6,
            EventType::ScreenshareDenied => 3,
            EventType::ScreenshareStopped => 6,
            EventType::Start
            | EventType::Heartbeat
            | EventType::Resize
            | EventType::NetworkOffline
            | EventType::NetworkOnline
            | EventType::ScreenshareStarted
            | EventType::WebcamStarted
            | EventType::WebcamDenied
            | EventType::AutoSubmit
            | EventType::Unknown(_) => 0,
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        EventType::parse(&s)
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row shape for a stored proctor event.
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProctorEventRow {
    pub id: i64,
    pub event_type: String,
    pub meta: Option<serde_json::Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_set_matches_weighted_types() {
        let violations = [
            "TAB_HIDDEN",
            "WINDOW_BLUR",
            "FULLSCREEN_EXIT",
            "COPY_ATTEMPT",
            "PASTE_ATTEMPT",
            "RIGHT_CLICK",
            "NAV_AWAY",
            "DEVTOOLS_SUSPECTED",
            "KEY_COMBO",
            "PRINTSCREEN",
            "MULTI_TAB",
            "SCREENSHARE_DENIED",
            "SCREENSHARE_STOPPED",
        ];
        for tag in violations {
            assert!(EventType::parse(tag).is_violation(), "{tag} should violate");
        }
        for tag in ["START", "HEARTBEAT", "RESIZE", "WEBCAM_DENIED", "AUTO_SUBMIT"] {
            assert!(!EventType::parse(tag).is_violation(), "{tag} is benign");
        }
    }

    #[test]
    fn unknown_tags_round_trip_and_score_zero() {
        let t = EventType::parse("gaze_offscreen");
        assert_eq!(t, EventType::Unknown("GAZE_OFFSCREEN".to_string()));
        assert_eq!(t.as_str(), "GAZE_OFFSCREEN");
        assert_eq!(t.weight(), 0);
        assert!(!t.is_violation());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(EventType::parse("tab_hidden"), EventType::TabHidden);
        assert_eq!(EventType::parse("Multi_Tab"), EventType::MultiTab);
    }

    #[test]
    fn strongest_signals_weigh_six() {
        assert_eq!(EventType::DevtoolsSuspected.weight(), 6);
        assert_eq!(EventType::MultiTab.weight(), 6);
        assert_eq!(EventType::ScreenshareStopped.weight(), 6);
        assert_eq!(EventType::RightClick.weight(), 1);
    }
}
