// src/routes.rs

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Method,
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, exam, proctor},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, student_middleware},
};

/// Assembles the main application router.
///
/// * Student surface under /api (auth + student role).
/// * Admin surface under /api/admin (auth + admin role).
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    // Snapshot uploads carry webcam frames; everything else stays on the
    // default body limit.
    let snapshot_limit = state.config.snapshot_max_bytes + 64 * 1024;

    let exam_routes = Router::new()
        .route("/exams", get(exam::list_exams))
        .route("/exams/{exam_id}", get(exam::exam_info))
        .route("/exams/{exam_id}/submit", post(exam::submit_attempt))
        .route("/exams/{exam_id}/result", get(exam::latest_result))
        .route("/exams/{exam_id}/proctor/start", post(proctor::start_session))
        .route("/exams/{exam_id}/proctor/active", get(proctor::active_session));

    let session_routes = Router::new()
        .route("/proctor/sessions/{session_id}/paper", get(proctor::fetch_paper))
        .route("/proctor/sessions/{session_id}/event", post(proctor::log_event))
        .route(
            "/proctor/sessions/{session_id}/snapshot",
            post(proctor::upload_snapshot).layer(DefaultBodyLimit::max(snapshot_limit)),
        );

    let student_routes = exam_routes
        .merge(session_routes)
        .layer(middleware::from_fn(student_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/exams", post(admin::create_exam))
        .route(
            "/exams/{exam_id}",
            get(admin::get_exam).put(admin::update_exam),
        )
        .route("/results", get(admin::list_results))
        .route("/proctor/sessions", get(admin::list_sessions))
        .route("/proctor/sessions/{id}", get(admin::session_detail))
        .route("/proctor/sessions/{id}/review", post(admin::set_review))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api", student_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
