// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::{
    engine::{
        eligibility::{self, PriorAttempt},
        grading, scoring,
    },
    error::AppError,
    models::{
        attempt::{AttemptResult, LatestAttemptRow, ProctorFlags, SubmitAttemptRequest},
        event::EventType,
        exam::ExamConfigRow,
        paper::GeneratedPaper,
        question::Question,
        session::{ProctorSessionRow, SessionStatus},
    },
    state::AppState,
    utils::jwt::Claims,
};

const ENROLLMENT_OK: [&str; 3] = ["PAID", "ACTIVE", "COMPLETED"];

pub(crate) async fn load_exam(pool: &PgPool, exam_id: i64) -> Result<ExamConfigRow, AppError> {
    sqlx::query_as::<_, ExamConfigRow>(
        r#"
        SELECT id, course_id, subject_id, title, duration_minutes, questions,
               passing_score, proctor_required, proctor_mode, proctor_screenshare_required
        FROM exams WHERE id = $1
        "#,
    )
    .bind(exam_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Exam not configured".to_string()))
}

/// Course-level gate: enrollment in good standing plus the content-progress
/// oracle. The retake rule is checked separately (`retake_gate`).
pub(crate) async fn ensure_course_eligible(
    pool: &PgPool,
    user_id: i64,
    course_id: i64,
) -> Result<(), AppError> {
    let enrollment: Option<String> =
        sqlx::query_scalar("SELECT status FROM enrollments WHERE user_id = $1 AND course_id = $2")
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(pool)
            .await?;

    let Some(status) = enrollment else {
        return Err(AppError::Eligibility {
            reason: "You are not enrolled in this course.".to_string(),
            next_allowed_at: None,
        });
    };
    if !ENROLLMENT_OK.contains(&status.as_str()) {
        return Err(AppError::Eligibility {
            reason: format!(
                "Course is not activated yet (status: {status}). Complete profile + payment first."
            ),
            next_allowed_at: None,
        });
    }

    if !is_course_content_completed(pool, user_id, course_id).await? {
        return Err(AppError::Eligibility {
            reason: "Complete all course lessons (learning content) to unlock exams.".to_string(),
            next_allowed_at: None,
        });
    }

    Ok(())
}

/// Content-progress oracle. A course with no published lessons counts as
/// complete; otherwise every lesson must be completed.
async fn is_course_content_completed(
    pool: &PgPool,
    user_id: i64,
    course_id: i64,
) -> Result<bool, AppError> {
    let progress: Option<(i32, i32)> = sqlx::query_as(
        "SELECT total_lessons, completed_lessons FROM course_progress
         WHERE user_id = $1 AND course_id = $2",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(pool)
    .await?;

    Ok(match progress {
        Some((total, completed)) => total == 0 || completed >= total,
        None => true,
    })
}

pub(crate) async fn prior_attempt(
    pool: &PgPool,
    user_id: i64,
    exam_id: i64,
) -> Result<Option<PriorAttempt>, AppError> {
    let row: Option<(i32, bool, Option<chrono::DateTime<Utc>>)> = sqlx::query_as(
        "SELECT attempt_no, passed, result_release_at FROM exam_attempts
         WHERE user_id = $1 AND exam_id = $2 ORDER BY attempt_no DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(exam_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(attempt_no, passed, result_release_at)| PriorAttempt {
        attempt_no,
        passed,
        result_release_at,
    }))
}

/// Applies the retake rule (pass-terminal, release-anchored cooldown).
pub(crate) fn retake_gate(
    latest: Option<&PriorAttempt>,
    retake_gap_days: i64,
) -> Result<(), AppError> {
    eligibility::check_retake(latest, Utc::now(), retake_gap_days).map_err(|block| {
        AppError::Eligibility {
            reason: block.reason(),
            next_allowed_at: block.next_allowed_at(),
        }
    })
}

async fn latest_attempt_row(
    pool: &PgPool,
    user_id: i64,
    exam_id: i64,
) -> Result<Option<LatestAttemptRow>, AppError> {
    Ok(sqlx::query_as::<_, LatestAttemptRow>(
        "SELECT id, attempt_no, score_percent, passed, submitted_at, result_release_at
         FROM exam_attempts
         WHERE user_id = $1 AND exam_id = $2 ORDER BY attempt_no DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(exam_id)
    .fetch_optional(pool)
    .await?)
}

/// Lists exams for the student's enrolled courses, each with an eligibility
/// verdict and the latest attempt (result hidden until release).
pub async fn list_exams(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    #[derive(sqlx::FromRow)]
    struct ExamListRow {
        id: i64,
        course_id: i64,
        subject_id: Option<i64>,
        title: String,
        duration_minutes: i32,
    }

    let exams = sqlx::query_as::<_, ExamListRow>(
        "SELECT e.id, e.course_id, e.subject_id, e.title, e.duration_minutes
         FROM exams e
         JOIN enrollments en ON en.course_id = e.course_id
         WHERE en.user_id = $1 AND en.status IN ('PAID', 'ACTIVE', 'COMPLETED')
         ORDER BY e.course_id DESC, e.id ASC",
    )
    .bind(user_id)
    .fetch_all(&state.pool)
    .await?;

    let now = Utc::now();
    let mut out = Vec::with_capacity(exams.len());
    for exam in exams {
        let mut eligible = true;
        let mut reason = String::new();

        match ensure_course_eligible(&state.pool, user_id, exam.course_id).await {
            Ok(()) => {
                let latest = prior_attempt(&state.pool, user_id, exam.id).await?;
                if let Err(AppError::Eligibility { reason: r, .. }) =
                    retake_gate(latest.as_ref(), state.config.retake_gap_days)
                {
                    eligible = false;
                    reason = r;
                }
            }
            Err(AppError::Eligibility { reason: r, .. }) => {
                eligible = false;
                reason = r;
            }
            Err(e) => return Err(e),
        }

        let latest_row = latest_attempt_row(&state.pool, user_id, exam.id).await?;
        let latest_json = latest_row.map(|a| {
            let visible = now > a.result_release_at;
            serde_json::json!({
                "attemptNo": a.attempt_no,
                "scorePercent": if visible { Some(a.score_percent) } else { None },
                "passed": if visible { Some(a.passed) } else { None },
                "submittedAt": a.submitted_at,
                "resultReleaseAt": a.result_release_at,
                "resultVisible": visible,
            })
        });

        out.push(serde_json::json!({
            "examId": exam.id,
            "courseId": exam.course_id,
            "subjectId": exam.subject_id,
            "title": exam.title,
            "durationMinutes": exam.duration_minutes,
            "eligible": eligible,
            "eligibilityReason": reason,
            "latestAttempt": latest_json,
        }));
    }

    Ok(Json(serde_json::json!({
        "exams": out,
        "rules": {
            "resultReleaseDays": state.config.result_release_days,
            "retakeGapDays": state.config.retake_gap_days,
        }
    })))
}

/// Exam metadata for the pre-exam screen. Questions are never returned here;
/// they are provided only through the session-scoped paper endpoint.
pub async fn exam_info(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = load_exam(&state.pool, exam_id).await?;
    ensure_course_eligible(&state.pool, claims.user_id(), exam.course_id).await?;

    Ok(Json(serde_json::json!({
        "exam": {
            "examId": exam.id,
            "title": exam.title,
            "durationMinutes": exam.duration_minutes,
            "questionCount": exam.question_count(),
            "proctorRequired": exam.proctor_required,
        }
    })))
}

/// Submits an attempt: grades against the session's embedded paper, freezes
/// the proctoring signals onto the attempt, closes the session and schedules
/// result release (and the retake cooldown on failure).
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();
    let exam = load_exam(&state.pool, exam_id).await?;

    ensure_course_eligible(&state.pool, user_id, exam.course_id).await?;

    let latest = prior_attempt(&state.pool, user_id, exam_id).await?;
    retake_gate(latest.as_ref(), state.config.retake_gap_days)?;

    if state.config.proctor_required && req.proctor_session_id.is_none() {
        return Err(AppError::BadRequest(
            "Proctoring session is required to submit this exam.".to_string(),
        ));
    }

    let mut session: Option<ProctorSessionRow> = None;
    let mut suspicious_score: i64 = 0;
    let mut proctor_flags: Option<serde_json::Value> = None;

    let questions: Vec<Question> = if let Some(session_id) = req.proctor_session_id {
        let sess = sqlx::query_as::<_, ProctorSessionRow>(
            "SELECT * FROM exam_proctor_sessions WHERE id = $1 AND user_id = $2 AND exam_id = $3",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(exam_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid proctor session.".to_string()))?;

        let status = sess.status().map_err(AppError::Integrity)?;
        if !status.is_active() {
            return Err(AppError::Conflict(
                "Proctor session is not active.".to_string(),
            ));
        }

        // Grade against the paper this session actually served.
        let paper_value = sess.paper.clone().ok_or_else(|| {
            AppError::Integrity(format!("active session {} has no embedded paper", sess.id))
        })?;
        let paper: GeneratedPaper = serde_json::from_value(paper_value).map_err(|e| {
            AppError::Integrity(format!("session {} paper is corrupt: {e}", sess.id))
        })?;

        let type_counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT event_type, COUNT(*) FROM exam_proctor_events
             WHERE session_id = $1 GROUP BY event_type",
        )
        .bind(session_id)
        .fetch_all(&state.pool)
        .await?;
        let type_counts: Vec<(EventType, i64)> = type_counts
            .into_iter()
            .map(|(tag, count)| (EventType::parse(&tag), count))
            .collect();
        suspicious_score = scoring::suspicious_score(&type_counts);

        proctor_flags = Some(serde_json::to_value(ProctorFlags {
            mode: sess.mode.clone(),
            warning_count: sess.warning_count,
            events_count: sess.events_count,
            snapshots_count: sess.snapshots_count,
            started_at: sess.started_at,
            last_event_at: sess.last_event_at,
            suspicious_score,
        })
        .map_err(|e| AppError::InternalServerError(e.to_string()))?);

        session = Some(sess);
        paper.questions
    } else {
        // Non-proctored fallback: grade against the configured bank.
        exam.bank()
            .map_err(|e| AppError::Integrity(format!("exam {} bank is corrupt: {e}", exam.id)))?
    };

    let outcome = grading::grade(&questions, &req.answers);
    let passed = grading::passed(outcome.score_percent, exam.effective_passing_score());

    let now = Utc::now();
    let result_release_at = now + Duration::days(state.config.result_release_days);
    let cooldown_until =
        (!passed).then(|| result_release_at + Duration::days(state.config.retake_gap_days));

    let mut tx = state.pool.begin().await?;

    if let Some(sess) = &session {
        // Atomic ACTIVE -> SUBMITTED; a concurrent submit loses here.
        let updated = sqlx::query(
            "UPDATE exam_proctor_sessions
             SET status = $1, ended_at = $2, last_event_at = $2, suspicious_score = $3
             WHERE id = $4 AND status = 'ACTIVE'",
        )
        .bind(SessionStatus::Submitted.as_str())
        .bind(now)
        .bind(suspicious_score)
        .bind(sess.id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::Conflict(
                "Proctor session is not active.".to_string(),
            ));
        }
    }

    let attempt_no: i32 = sqlx::query_scalar::<_, i32>(
        "SELECT COALESCE(MAX(attempt_no), 0) + 1 FROM exam_attempts
         WHERE user_id = $1 AND exam_id = $2",
    )
    .bind(user_id)
    .bind(exam_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO exam_attempts
            (user_id, exam_id, attempt_no, started_at, submitted_at, score_percent, passed,
             evaluated_at, result_release_at, cooldown_until, retake_gap_days,
             proctor_session_id, proctor_warning_count, proctor_flags)
        VALUES ($1, $2, $3, $4, $4, $5, $6, $4, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(user_id)
    .bind(exam_id)
    .bind(attempt_no)
    .bind(now)
    .bind(outcome.score_percent)
    .bind(passed)
    .bind(result_release_at)
    .bind(cooldown_until)
    .bind(state.config.retake_gap_days as i32)
    .bind(session.as_ref().map(|s| s.id))
    .bind(session.as_ref().map(|s| s.warning_count).unwrap_or(0))
    .bind(proctor_flags)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id,
        exam_id,
        attempt_no,
        score = outcome.score_percent,
        passed,
        suspicious_score,
        "exam attempt submitted"
    );

    Ok(Json(AttemptResult {
        attempt_no,
        score_percent: outcome.score_percent,
        passed,
        submitted_at: now,
        result_release_at,
        result_visible: false,
    }))
}

/// Latest result for an exam, gated on release time.
pub async fn latest_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let Some(latest) = latest_attempt_row(&state.pool, claims.user_id(), exam_id).await? else {
        return Ok(Json(serde_json::json!({ "status": "NO_ATTEMPT" })));
    };

    let now = Utc::now();
    if now < latest.result_release_at {
        return Ok(Json(serde_json::json!({
            "status": "PENDING",
            "resultReleaseAt": latest.result_release_at,
        })));
    }

    Ok(Json(serde_json::json!({
        "status": "RELEASED",
        "result": latest,
    })))
}
