// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        event::ProctorEventRow,
        exam::{CreateExamRequest, UpdateExamRequest},
        session::{ProctorSnapshotRow, ReviewStatus},
    },
};

/// Creates an exam configuration (question bank + proctoring settings).
/// Admin only.
pub async fn create_exam(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let questions_json = serde_json::to_value(&payload.questions)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO exams
            (course_id, subject_id, title, duration_minutes, questions, passing_score,
             proctor_required, proctor_mode, proctor_screenshare_required)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(payload.course_id)
    .bind(payload.subject_id)
    .bind(&payload.title)
    .bind(payload.duration_minutes.unwrap_or(30))
    .bind(questions_json)
    .bind(payload.passing_score)
    .bind(payload.proctor_required.unwrap_or(true))
    .bind(payload.proctor_mode.as_deref().unwrap_or("BASIC"))
    .bind(payload.proctor_screenshare_required.unwrap_or(false))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create exam: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Updates an exam configuration by ID. Fields are optional.
/// Admin only.
pub async fn update_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    if payload.title.is_none()
        && payload.duration_minutes.is_none()
        && payload.questions.is_none()
        && payload.passing_score.is_none()
        && payload.proctor_required.is_none()
        && payload.proctor_mode.is_none()
        && payload.proctor_screenshare_required.is_none()
    {
        return Ok(StatusCode::OK);
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE exams SET ");
    let mut separated = builder.separated(", ");

    if let Some(title) = payload.title {
        separated.push("title = ");
        separated.push_bind_unseparated(title);
    }

    if let Some(duration_minutes) = payload.duration_minutes {
        separated.push("duration_minutes = ");
        separated.push_bind_unseparated(duration_minutes);
    }

    if let Some(questions) = payload.questions {
        let questions_json = serde_json::to_value(questions)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        separated.push("questions = ");
        separated.push_bind_unseparated(questions_json);
    }

    if let Some(passing_score) = payload.passing_score {
        separated.push("passing_score = ");
        separated.push_bind_unseparated(passing_score);
    }

    if let Some(proctor_required) = payload.proctor_required {
        separated.push("proctor_required = ");
        separated.push_bind_unseparated(proctor_required);
    }

    if let Some(proctor_mode) = payload.proctor_mode {
        separated.push("proctor_mode = ");
        separated.push_bind_unseparated(proctor_mode);
    }

    if let Some(screenshare) = payload.proctor_screenshare_required {
        separated.push("proctor_screenshare_required = ");
        separated.push_bind_unseparated(screenshare);
    }

    separated.push("updated_at = NOW()");

    builder.push(" WHERE id = ");
    builder.push_bind(id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update exam: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Exam not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Full exam configuration including the question bank (with answers).
/// Admin only.
pub async fn get_exam(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    #[derive(Serialize, sqlx::FromRow)]
    #[serde(rename_all = "camelCase")]
    struct AdminExamRow {
        id: i64,
        course_id: i64,
        subject_id: Option<i64>,
        title: String,
        duration_minutes: i32,
        questions: serde_json::Value,
        passing_score: Option<i32>,
        proctor_required: bool,
        proctor_mode: String,
        proctor_screenshare_required: bool,
    }

    let exam = sqlx::query_as::<_, AdminExamRow>(
        "SELECT id, course_id, subject_id, title, duration_minutes, questions, passing_score,
                proctor_required, proctor_mode, proctor_screenshare_required
         FROM exams WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Exam not found".to_string()))?;

    Ok(Json(serde_json::json!({ "exam": exam })))
}

/// All submitted attempts with their frozen proctoring signals.
/// Admin only.
pub async fn list_results(State(pool): State<PgPool>) -> Result<impl IntoResponse, AppError> {
    #[derive(Serialize, sqlx::FromRow)]
    #[serde(rename_all = "camelCase")]
    struct ResultRow {
        id: i64,
        user_id: i64,
        exam_id: i64,
        exam_title: String,
        attempt_no: i32,
        score_percent: i32,
        passed: bool,
        submitted_at: DateTime<Utc>,
        evaluated_at: DateTime<Utc>,
        result_release_at: DateTime<Utc>,
        proctor_session_id: Option<i64>,
        proctor_warning_count: i32,
        proctor_flags: Option<serde_json::Value>,
    }

    let rows = sqlx::query_as::<_, ResultRow>(
        "SELECT a.id, a.user_id, a.exam_id, e.title AS exam_title, a.attempt_no,
                a.score_percent, a.passed, a.submitted_at, a.evaluated_at, a.result_release_at,
                a.proctor_session_id, a.proctor_warning_count, a.proctor_flags
         FROM exam_attempts a
         JOIN exams e ON e.id = a.exam_id
         ORDER BY a.id DESC",
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list results: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(serde_json::json!({ "results": rows })))
}

#[derive(Debug, Deserialize)]
pub struct SessionFilter {
    pub user_id: Option<i64>,
    pub status: Option<String>,
    pub review: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
struct SessionListRow {
    #[sqlx(rename = "id")]
    session_id: i64,
    user_id: i64,
    exam_id: i64,
    status: String,
    mode: String,
    screenshare_enabled: bool,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    warning_count: i32,
    events_count: i32,
    snapshots_count: i32,
    suspicious_score: i64,
    review_status: String,
}

/// Lists proctor sessions with optional filters, newest first, capped at 200.
/// Admin only.
pub async fn list_sessions(
    State(pool): State<PgPool>,
    Query(filter): Query<SessionFilter>,
) -> Result<impl IntoResponse, AppError> {
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT id, user_id, exam_id, status, mode, screenshare_enabled, started_at, ended_at,
                warning_count, events_count, snapshots_count, suspicious_score, review_status
         FROM exam_proctor_sessions WHERE TRUE",
    );

    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ");
        builder.push_bind(user_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status.to_uppercase());
    }
    if let Some(review) = filter.review {
        builder.push(" AND review_status = ");
        builder.push_bind(review.to_uppercase());
    }
    if let Some(from) = filter.from {
        builder.push(" AND started_at >= ");
        builder.push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND started_at <= ");
        builder.push_bind(to);
    }

    builder.push(" ORDER BY id DESC LIMIT 200");

    let sessions: Vec<SessionListRow> = builder
        .build_query_as()
        .fetch_all(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list proctor sessions: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

/// Session detail: the session, its ordered event stream, its snapshots and
/// the linked attempt (if submitted). Admin only.
pub async fn session_detail(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    #[derive(Serialize, sqlx::FromRow)]
    #[serde(rename_all = "camelCase")]
    struct SessionDetailRow {
        #[sqlx(rename = "id")]
        session_id: i64,
        user_id: i64,
        exam_id: i64,
        status: String,
        mode: String,
        screenshare_enabled: bool,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        last_event_at: DateTime<Utc>,
        warning_count: i32,
        events_count: i32,
        snapshots_count: i32,
        suspicious_score: i64,
        review_status: String,
        review_notes: Option<String>,
        ip_address: Option<String>,
        user_agent: Option<String>,
        fingerprint: Option<String>,
        paper_hash: Option<String>,
    }

    let session = sqlx::query_as::<_, SessionDetailRow>(
        "SELECT id, user_id, exam_id, status, mode, screenshare_enabled, started_at, ended_at,
                last_event_at, warning_count, events_count, snapshots_count, suspicious_score,
                review_status, review_notes, ip_address, user_agent, fingerprint, paper_hash
         FROM exam_proctor_sessions WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

    let events = sqlx::query_as::<_, ProctorEventRow>(
        "SELECT id, event_type, meta, created_at
         FROM exam_proctor_events WHERE session_id = $1 ORDER BY id ASC",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    let snapshots = sqlx::query_as::<_, ProctorSnapshotRow>(
        "SELECT id, file_path, snapshot_type, created_at
         FROM exam_proctor_snapshots WHERE session_id = $1 ORDER BY id DESC",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    #[derive(Serialize, sqlx::FromRow)]
    #[serde(rename_all = "camelCase")]
    struct LinkedAttemptRow {
        #[sqlx(rename = "id")]
        attempt_id: i64,
        attempt_no: i32,
        score_percent: i32,
        passed: bool,
        submitted_at: DateTime<Utc>,
        result_release_at: DateTime<Utc>,
    }

    let attempt = sqlx::query_as::<_, LinkedAttemptRow>(
        "SELECT id, attempt_no, score_percent, passed, submitted_at, result_release_at
         FROM exam_attempts WHERE proctor_session_id = $1 ORDER BY id DESC LIMIT 1",
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?;

    Ok(Json(serde_json::json!({
        "session": session,
        "events": events,
        "snapshots": snapshots,
        "attempt": attempt,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub review_status: String,
    #[serde(default)]
    pub review_notes: Option<String>,
}

/// Records a human review verdict on a session. Admin only.
pub async fn set_review(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    let status = ReviewStatus::parse(&req.review_status.trim().to_uppercase())
        .ok_or_else(|| AppError::BadRequest("Invalid reviewStatus".to_string()))?;

    let result = sqlx::query(
        "UPDATE exam_proctor_sessions SET review_status = $1, review_notes = $2 WHERE id = $3",
    )
    .bind(status.as_str())
    .bind(req.review_notes.filter(|n| !n.is_empty()))
    .bind(id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Session not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}
