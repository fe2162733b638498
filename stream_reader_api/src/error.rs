use crate::api::ErrorDto;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use stream_reader::error::ReaderError;
use tracing::{debug, error};

#[derive(Debug)]
pub enum ApplicationError {
    BadRequest {
        message: &'static str,
        error: anyhow::Error,
    },
    NotFound {
        message: &'static str,
        error: anyhow::Error,
    },
    Internal {
        message: &'static str,
        error: anyhow::Error,
    },
}

impl ApplicationError {
    pub fn bad_request(message: &'static str, error: anyhow::Error) -> Self {
        ApplicationError::BadRequest { message, error }
    }

    /// Unknown connection ids become 404, everything else is reported as `message` with 500.
    pub fn from_reader(message: &'static str, error: ReaderError) -> Self {
        if matches!(error, ReaderError::NotFound(_)) {
            ApplicationError::NotFound {
                message: "Connection not found",
                error: error.into(),
            }
        } else {
            ApplicationError::Internal {
                message,
                error: error.into(),
            }
        }
    }
}

impl IntoResponse for ApplicationError {
    fn into_response(self) -> Response {
        let (status, message, error) = match self {
            ApplicationError::BadRequest { message, error } => {
                (StatusCode::BAD_REQUEST, message, error)
            }
            ApplicationError::NotFound { message, error } => (StatusCode::NOT_FOUND, message, error),
            ApplicationError::Internal { message, error } => {
                error!("{message}: {error:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, message, error)
            }
        };

        if !status.is_server_error() {
            debug!("{message}: {error:#}");
        }

        let body = Json(ErrorDto {
            error: message.to_owned(),
            details: format!("{error:#}"),
        });

        (status, body).into_response()
    }
}
