use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use chats_db::AttachmentInsertError;
use chats_types::ValidationError;
use chats_types::api::ErrorResponse;

/// Every way a request can fail. Each variant maps to one status code and a
/// client-safe message; internal detail is only logged.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("refresh token not found")]
    TokenNotFound,

    #[error("Token is invalid or has expired")]
    TokenExpiredOrInvalid,

    #[error("Authentication credentials were not provided or are invalid")]
    Unauthenticated,

    #[error("You do not have permission to perform this action")]
    PermissionDenied,

    #[error("Not found")]
    NotFound,

    #[error("Failed to store message attachments")]
    AttachmentPersist(anyhow::Error),

    #[error("Internal server error")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::InvalidCredentials
            | ApiError::TokenNotFound
            | ApiError::TokenExpiredOrInvalid => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::AttachmentPersist(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if err.downcast_ref::<AttachmentInsertError>().is_some() {
            ApiError::AttachmentPersist(err)
        } else {
            ApiError::Internal(err)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Validation(v) => ErrorResponse {
                error: v.message.clone(),
                field: Some(v.field.to_string()),
            },
            ApiError::AttachmentPersist(e) | ApiError::Internal(e) => {
                error!("{}: {:#}", self, e);
                ErrorResponse {
                    error: self.to_string(),
                    field: None,
                }
            }
            _ => ErrorResponse {
                error: self.to_string(),
                field: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
