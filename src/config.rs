// src/config.rs

use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,

    /// Days between submission and result visibility.
    pub result_release_days: i64,
    /// Days a failed attempt must wait after result release before a retake.
    pub retake_gap_days: i64,
    /// Questions drawn per generated paper. 0 = use the whole bank.
    pub questions_per_attempt: usize,
    /// When true, submitting without a proctor session is rejected.
    pub proctor_required: bool,

    pub upload_dir: String,
    pub snapshot_max_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let result_release_days = env_parse("RESULT_RELEASE_DAYS", 3);
        let retake_gap_days = env_parse("RETAKE_GAP_DAYS", 3);
        let questions_per_attempt = env_parse("EXAM_QUESTIONS_PER_ATTEMPT", 0usize);
        let proctor_required = env::var("PROCTOR_REQUIRED")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        let snapshot_max_bytes = env_parse("PROCTOR_SNAPSHOT_MAX_BYTES", 2_000_000usize);

        Self {
            database_url,
            jwt_secret,
            rust_log,
            result_release_days,
            retake_gap_days,
            questions_per_attempt,
            proctor_required,
            upload_dir,
            snapshot_max_bytes,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
