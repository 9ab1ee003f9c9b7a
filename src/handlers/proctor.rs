// src/handlers/proctor.rs

use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use sqlx::PgPool;

use crate::{
    engine::paper,
    error::AppError,
    models::{
        event::EventType,
        paper::{GeneratedPaper, PublicPaper},
        session::{ClientInfo, ProctorMode, ProctorSessionRow, SessionStatus, SessionSummary},
    },
    state::AppState,
    utils::jwt::Claims,
};

use super::exam::{ensure_course_eligible, load_exam, prior_attempt, retake_gate};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub client_info: Option<ClientInfo>,
}

/// Starts a proctoring session: runs the eligibility gate, force-ends any
/// prior ACTIVE session for this (user, exam), generates the randomized
/// paper exactly once and embeds it (with its hash) in the new session.
pub async fn start_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
    headers: HeaderMap,
    payload: Option<Json<StartSessionRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();
    let exam = load_exam(&state.pool, exam_id).await?;

    ensure_course_eligible(&state.pool, user_id, exam.course_id).await?;
    let latest = prior_attempt(&state.pool, user_id, exam_id).await?;
    retake_gate(latest.as_ref(), state.config.retake_gap_days)?;

    // Proctoring settings come from the exam configuration, never the client.
    let mode = ProctorMode::parse(&exam.proctor_mode);
    let screenshare_enabled = exam.proctor_screenshare_required;

    let bank = exam
        .bank()
        .map_err(|e| AppError::Integrity(format!("exam {} bank is corrupt: {e}", exam.id)))?;

    // Fresh 31-bit seed; the PRNG instance lives only for this generation.
    let seed: u32 = rand::thread_rng().gen_range(0..(1u32 << 31));
    let generated = paper::generate(
        &bank,
        state.config.questions_per_attempt,
        seed,
        exam.duration_minutes,
    );
    let paper_hash = paper::content_hash(&generated)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    let paper_json = serde_json::to_value(&generated)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let client_info = payload.and_then(|Json(p)| p.client_info);
    let fingerprint = client_info.as_ref().and_then(|c| c.fingerprint.clone());
    let client_info_json = client_info
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    let ip_address = client_ip(&headers);
    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let now = Utc::now();
    let mut tx = state.pool.begin().await?;

    // Supersede any previous ACTIVE session in the same transaction as the
    // insert; the partial unique index backs this up under races.
    sqlx::query(
        "UPDATE exam_proctor_sessions
         SET status = $1, ended_at = $2, last_event_at = $2
         WHERE user_id = $3 AND exam_id = $4 AND status = 'ACTIVE'",
    )
    .bind(SessionStatus::Ended.as_str())
    .bind(now)
    .bind(user_id)
    .bind(exam_id)
    .execute(&mut *tx)
    .await?;

    let session_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO exam_proctor_sessions
            (user_id, exam_id, status, mode, screenshare_enabled, started_at, last_event_at,
             ip_address, user_agent, fingerprint, client_info, paper, paper_hash)
        VALUES ($1, $2, 'ACTIVE', $3, $4, $5, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(exam_id)
    .bind(mode.as_str())
    .bind(screenshare_enabled)
    .bind(now)
    .bind(ip_address)
    .bind(user_agent)
    .bind(fingerprint)
    .bind(client_info_json)
    .bind(paper_json)
    .bind(&paper_hash)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(session_id, user_id, exam_id, seed, "proctor session started");

    Ok(Json(serde_json::json!({
        "sessionId": session_id,
        "startedAt": now,
        "mode": mode.as_str(),
        "screenshareEnabled": screenshare_enabled,
    })))
}

/// Returns the student's ACTIVE session for this exam, if any (resume flow).
pub async fn active_session(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let active = sqlx::query_as::<_, SessionSummary>(
        "SELECT id, mode, warning_count, started_at, screenshare_enabled
         FROM exam_proctor_sessions
         WHERE user_id = $1 AND exam_id = $2 AND status = 'ACTIVE'
         ORDER BY id DESC LIMIT 1",
    )
    .bind(claims.user_id())
    .bind(exam_id)
    .fetch_optional(&pool)
    .await?;

    Ok(Json(serde_json::json!({ "active": active })))
}

async fn load_own_session(
    pool: &PgPool,
    session_id: i64,
    user_id: i64,
) -> Result<ProctorSessionRow, AppError> {
    sqlx::query_as::<_, ProctorSessionRow>(
        "SELECT * FROM exam_proctor_sessions WHERE id = $1 AND user_id = $2",
    )
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Proctor session not found".to_string()))
}

fn require_active(session: &ProctorSessionRow) -> Result<(), AppError> {
    let status = session.status().map_err(AppError::Integrity)?;
    if !status.is_active() {
        return Err(AppError::Conflict(
            "Proctor session is not active".to_string(),
        ));
    }
    Ok(())
}

/// Serves the session's randomized paper with answers stripped. An ACTIVE
/// session without a decodable paper is an invariant violation.
pub async fn fetch_paper(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let session = load_own_session(&pool, session_id, claims.user_id()).await?;
    require_active(&session)?;

    let paper_value = session.paper.clone().ok_or_else(|| {
        AppError::Integrity(format!(
            "active session {} has no embedded paper",
            session.id
        ))
    })?;
    let paper: GeneratedPaper = serde_json::from_value(paper_value)
        .map_err(|e| AppError::Integrity(format!("session {} paper is corrupt: {e}", session.id)))?;

    Ok(Json(serde_json::json!({
        "paper": PublicPaper::from(&paper),
        "paperHash": session.paper_hash,
    })))
}

#[derive(Debug, Deserialize)]
pub struct LogEventRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}

/// Appends one integrity event and bumps the session counters atomically.
/// The counter update is guarded on ACTIVE so a session closed by a
/// concurrent submit cannot absorb late events.
pub async fn log_event(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    Json(req): Json<LogEventRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.event_type.trim().is_empty() {
        return Err(AppError::BadRequest("type is required".to_string()));
    }

    let session = load_own_session(&pool, session_id, claims.user_id()).await?;
    require_active(&session)?;

    let event_type = EventType::parse(&req.event_type);
    let is_violation = event_type.is_violation();
    let now = Utc::now();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO exam_proctor_events (session_id, event_type, meta, created_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(session_id)
    .bind(event_type.as_str())
    .bind(&req.meta)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let updated = sqlx::query(
        "UPDATE exam_proctor_sessions
         SET events_count = events_count + 1,
             warning_count = warning_count + $1,
             last_event_at = $2
         WHERE id = $3 AND status = 'ACTIVE'",
    )
    .bind(if is_violation { 1i32 } else { 0i32 })
    .bind(now)
    .bind(session_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        // Session closed between the check and the increment; drop the event.
        tx.rollback().await?;
        return Err(AppError::Conflict(
            "Proctor session is not active".to_string(),
        ));
    }

    tx.commit().await?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "isViolation": is_violation,
    })))
}

/// Stores a webcam/screen snapshot under the session's upload folder and
/// bumps the snapshot counter. Best-effort from the client's perspective;
/// retries simply append.
pub async fn upload_snapshot(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let session = load_own_session(&state.pool, session_id, claims.user_id()).await?;
    require_active(&session)?;

    let mut file: Option<(String, Vec<u8>)> = None;
    let mut snapshot_type = "WEBCAM".to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        match field.name() {
            Some("snapshot") => {
                let file_name = field.file_name().unwrap_or("snapshot.jpg").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("snapshotType") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                if value.to_uppercase() == "SCREEN" {
                    snapshot_type = "SCREEN".to_string();
                }
            }
            _ => {}
        }
    }

    let Some((file_name, bytes)) = file else {
        return Err(AppError::BadRequest("snapshot file is required".to_string()));
    };
    if bytes.len() > state.config.snapshot_max_bytes {
        return Err(AppError::BadRequest("snapshot file too large".to_string()));
    }

    let ext = std::path::Path::new(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg");
    let dest_name = format!(
        "{}_{}.{}",
        Utc::now().timestamp_millis(),
        &uuid::Uuid::new_v4().simple().to_string()[..8],
        ext
    );

    let session_dir = std::path::Path::new(&state.config.upload_dir)
        .join("proctor")
        .join(session_id.to_string());
    tokio::fs::create_dir_all(&session_dir)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    tokio::fs::write(session_dir.join(&dest_name), &bytes)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let rel_path = format!("proctor/{}/{}", session_id, dest_name);
    let now = Utc::now();

    let mut tx = state.pool.begin().await?;

    sqlx::query(
        "INSERT INTO exam_proctor_snapshots (session_id, file_path, snapshot_type, created_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(session_id)
    .bind(&rel_path)
    .bind(&snapshot_type)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let updated = sqlx::query(
        "UPDATE exam_proctor_sessions
         SET snapshots_count = snapshots_count + 1, last_event_at = $1
         WHERE id = $2 AND status = 'ACTIVE'",
    )
    .bind(now)
    .bind(session_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(AppError::Conflict(
            "Proctor session is not active".to_string(),
        ));
    }

    tx.commit().await?;

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// First address in X-Forwarded-For, or none.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
