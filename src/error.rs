use ntex::http::StatusCode;
use ntex::web::{HttpResponse, WebResponseError};
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Db(rusqlite::Error),
    NotFound(String),
    BadRequest(String),
    ScoreJumpTooLarge {
        current: i64,
        proposed: i64,
        max_increase: i64,
    },
    SubmissionTooFrequent {
        retry_after_secs: i64,
    },
    TimestampTooOld {
        age_secs: i64,
        max_age_secs: i64,
    },
    TimestampTooFuture {
        skew_secs: i64,
        max_skew_secs: i64,
    },
    DuplicateSubmission,
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Db(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ScoreJumpTooLarge {
                current,
                proposed,
                max_increase,
            } => write!(
                f,
                "Score increase too dramatic: {} -> {}. Max allowed increase: {}",
                current, proposed, max_increase
            ),
            AppError::SubmissionTooFrequent { retry_after_secs } => write!(
                f,
                "Too frequent score submissions. Please wait {}s between submissions",
                retry_after_secs
            ),
            AppError::TimestampTooOld {
                age_secs,
                max_age_secs,
            } => write!(
                f,
                "Request too old: age {}s, maximum {}s",
                age_secs, max_age_secs
            ),
            AppError::TimestampTooFuture {
                skew_secs,
                max_skew_secs,
            } => write!(
                f,
                "Request timestamp too far in future: skew {}s, maximum {}s",
                skew_secs, max_skew_secs
            ),
            AppError::DuplicateSubmission => write!(f, "Duplicate request"),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl WebResponseError for AppError {
    fn error_response(&self, _: &ntex::web::HttpRequest) -> HttpResponse {
        let (status, body) = match self {
            AppError::Db(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Database error" }),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": msg }),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": msg }),
            ),
            AppError::ScoreJumpTooLarge {
                current,
                proposed,
                max_increase,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({
                    "error": "Score increase too dramatic",
                    "code": "SCORE_JUMP_TOO_LARGE",
                    "current": current,
                    "proposed": proposed,
                    "max_increase": max_increase,
                }),
            ),
            AppError::SubmissionTooFrequent { retry_after_secs } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({
                    "error": "Too frequent score submissions",
                    "code": "SUBMISSION_TOO_FREQUENT",
                    "retry_after_secs": retry_after_secs,
                }),
            ),
            AppError::TimestampTooOld {
                age_secs,
                max_age_secs,
            } => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "Request too old",
                    "code": "TIMESTAMP_TOO_OLD",
                    "age_secs": age_secs,
                    "max_age_secs": max_age_secs,
                }),
            ),
            AppError::TimestampTooFuture {
                skew_secs,
                max_skew_secs,
            } => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "Request timestamp too far in future",
                    "code": "TIMESTAMP_TOO_FUTURE",
                    "skew_secs": skew_secs,
                    "max_skew_secs": max_skew_secs,
                }),
            ),
            AppError::DuplicateSubmission => (
                StatusCode::CONFLICT,
                serde_json::json!({
                    "error": "Duplicate request",
                    "code": "IDEMPOTENT_CONFLICT",
                }),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Internal error" }),
            ),
        };
        HttpResponse::build(status).json(&body)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Db(e)
    }
}
