// src/engine/eligibility.rs

use chrono::{DateTime, Duration, Utc};

/// Slice of the latest attempt the retake rule needs.
#[derive(Debug, Clone)]
pub struct PriorAttempt {
    pub attempt_no: i32,
    pub passed: bool,
    pub result_release_at: Option<DateTime<Utc>>,
}

/// Why a retake is not (yet) allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetakeBlock {
    /// A pass is terminal: no further attempts at this target, ever.
    AlreadyPassed,
    /// Cooldown window still open. Carries the exact instant it lifts.
    CooldownActive { next_allowed_at: DateTime<Utc> },
}

impl RetakeBlock {
    pub fn reason(&self) -> String {
        match self {
            RetakeBlock::AlreadyPassed => {
                "You already passed this exam. Retake not allowed.".to_string()
            }
            RetakeBlock::CooldownActive { next_allowed_at } => format!(
                "Retake cooldown active. You can retake after {}.",
                next_allowed_at.format("%Y-%m-%d %H:%M")
            ),
        }
    }

    pub fn next_allowed_at(&self) -> Option<DateTime<Utc>> {
        match self {
            RetakeBlock::AlreadyPassed => None,
            RetakeBlock::CooldownActive { next_allowed_at } => Some(*next_allowed_at),
        }
    }
}

/// Retake rule over the latest attempt.
///
/// The cooldown is anchored to result release, not submission, so waiting
/// for grading never shortens the wait: a failed attempt may be retried from
/// `result_release_at + retake_gap_days` onwards (inclusive).
pub fn check_retake(
    latest: Option<&PriorAttempt>,
    now: DateTime<Utc>,
    retake_gap_days: i64,
) -> Result<(), RetakeBlock> {
    let Some(latest) = latest else {
        return Ok(());
    };

    if latest.passed {
        return Err(RetakeBlock::AlreadyPassed);
    }

    if let Some(release) = latest.result_release_at {
        let next_allowed_at = release + Duration::days(retake_gap_days);
        if now < next_allowed_at {
            return Err(RetakeBlock::CooldownActive { next_allowed_at });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn no_prior_attempt_is_eligible() {
        assert_eq!(check_retake(None, at(1, 0), 3), Ok(()));
    }

    #[test]
    fn pass_is_terminal_regardless_of_elapsed_time() {
        let latest = PriorAttempt {
            attempt_no: 1,
            passed: true,
            result_release_at: Some(at(1, 0)),
        };
        assert_eq!(
            check_retake(Some(&latest), at(28, 0), 3),
            Err(RetakeBlock::AlreadyPassed)
        );
    }

    #[test]
    fn cooldown_blocks_before_and_lifts_at_release_plus_gap() {
        let release = at(10, 12);
        let latest = PriorAttempt {
            attempt_no: 1,
            passed: false,
            result_release_at: Some(release),
        };
        let lifts = at(13, 12);

        let blocked = check_retake(Some(&latest), at(13, 11), 3).unwrap_err();
        assert_eq!(
            blocked,
            RetakeBlock::CooldownActive {
                next_allowed_at: lifts
            }
        );
        assert_eq!(blocked.next_allowed_at(), Some(lifts));

        // Boundary instant is allowed.
        assert_eq!(check_retake(Some(&latest), lifts, 3), Ok(()));
        assert_eq!(check_retake(Some(&latest), at(20, 0), 3), Ok(()));
    }

    #[test]
    fn failed_attempt_without_release_time_is_not_blocked() {
        let latest = PriorAttempt {
            attempt_no: 2,
            passed: false,
            result_release_at: None,
        };
        assert_eq!(check_retake(Some(&latest), at(1, 0), 3), Ok(()));
    }

    #[test]
    fn cooldown_is_anchored_to_release_not_submission() {
        // Submitted day 1, released day 4 (3-day release delay), gap 3 days:
        // cooldown lifts day 7, i.e. submitted + 6 days. Day 6 must fail.
        let release = at(4, 0);
        let latest = PriorAttempt {
            attempt_no: 1,
            passed: false,
            result_release_at: Some(release),
        };
        let blocked = check_retake(Some(&latest), at(6, 0), 3).unwrap_err();
        assert_eq!(blocked.next_allowed_at(), Some(at(7, 0)));
    }
}
