/// Engine error taxonomy
///
/// Every failure the campaign engine can observe maps onto one of these variants.
/// The interpreter decides per variant whether to back off, carry on, or exit;
/// the HTTP layer maps them onto status codes.

use axum::http::StatusCode;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Campaign, flow, lead or activity absent
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// No active sender of the user has quota left today
    #[error("no sender capacity left for user {0}")]
    CapacityExhausted(String),

    /// Lead query failed; retried with the fetch backoff
    #[error("lead fetch failed: {0}")]
    LeadFetch(String),

    /// Mail dispatch rejected the message
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Execution state points at something the flow does not contain
    #[error("malformed execution state: {0}")]
    MalformedState(String),

    #[error("invalid flow: {0}")]
    InvalidFlow(String),

    /// Campaign status does not allow the requested lifecycle action
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// HTTP status used when the error reaches an API caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::InvalidFlow(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::InvalidTransition(_) => StatusCode::CONFLICT,
            EngineError::CapacityExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            EngineError::SendFailed(_) => StatusCode::BAD_GATEWAY,
            EngineError::LeadFetch(_)
            | EngineError::MalformedState(_)
            | EngineError::Storage(_)
            | EngineError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_map_to_client_statuses() {
        assert_eq!(EngineError::not_found("campaign", "c1").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            EngineError::InvalidTransition("already sending".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngineError::InvalidFlow("empty".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            EngineError::not_found("activity", "m-1").to_string(),
            "activity not found: m-1"
        );
    }
}
