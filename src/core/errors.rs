use spin_sdk::http::Response;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SocialError {
    #[error("{0}")]
    Validation(String),
    #[error("You must be signed in")]
    Unauthenticated,
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidOperation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Store error: {0}")]
    Store(String),
}

pub type SocialResult<T> = Result<T, SocialError>;

impl SocialError {
    pub fn status(&self) -> u16 {
        match self {
            SocialError::Validation(_) => 400,
            SocialError::Unauthenticated => 401,
            SocialError::Unauthorized(_) => 403,
            SocialError::NotFound(_) => 404,
            SocialError::Conflict(_) => 409,
            SocialError::InvalidOperation(_) => 422,
            SocialError::Store(_) => 500,
        }
    }
}

impl From<SocialError> for Response {
    fn from(err: SocialError) -> Self {
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
        });
        Response::builder()
            .status(err.status())
            .header("Content-Type", "application/json")
            .body(body.to_string().into_bytes())
            .build()
    }
}

/// Uniqueness violations are the expected outcome of racing toggles and
/// first-sight identity inserts, so they surface as `Conflict` instead of a
/// store fault.
impl From<rusqlite::Error> for SocialError {
    fn from(err: rusqlite::Error) -> Self {
        if is_unique_violation(&err) {
            SocialError::Conflict("Conflicting update, please retry".to_string())
        } else {
            SocialError::Store(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SocialError {
    fn from(err: serde_json::Error) -> Self {
        SocialError::Validation(format!("Malformed request body: {}", err))
    }
}

pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}
