use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DevnodeError>;

#[derive(Error, Debug)]
pub enum DevnodeError {
    #[error("Note not found: {0}")]
    NotFound(String),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Data already verified")]
    AlreadyVerified,

    #[error("Signer declined the transaction")]
    SignerRejected,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<safenote_sdk::SdkError> for DevnodeError {
    fn from(err: safenote_sdk::SdkError) -> Self {
        DevnodeError::InvalidRequest(err.to_string())
    }
}

impl IntoResponse for DevnodeError {
    fn into_response(self) -> Response {
        let status = match &self {
            DevnodeError::NotFound(_) | DevnodeError::UnknownTransaction(_) => {
                StatusCode::NOT_FOUND
            }
            DevnodeError::AlreadyVerified => StatusCode::CONFLICT,
            DevnodeError::SignerRejected => StatusCode::FORBIDDEN,
            DevnodeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            DevnodeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DevnodeError::AlreadyVerified.into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            DevnodeError::SignerRejected.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            DevnodeError::NotFound("note-1".into()).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
