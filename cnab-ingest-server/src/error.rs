//! RFC 7807 `application/problem+json` mapping for [`IngestError`] (§7).

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use cnab_ingest_logic::IngestError;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Problem {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'static str,
    status: u16,
    detail: String,
}

/// Newtype so this crate can impl the foreign [`ResponseError`] trait on
/// the logic crate's error type.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub IngestError);

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            IngestError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            IngestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            IngestError::DuplicateFile { .. } => StatusCode::CONFLICT,
            IngestError::UnprocessableContent { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::NotFound { .. } => StatusCode::NOT_FOUND,
            IngestError::StorageFailure(_) | IngestError::QueueFailure(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            IngestError::TransientStateError(_) => StatusCode::CONFLICT,
            IngestError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self.0, "request failed");
        } else {
            tracing::warn!(error = ?self.0, "request rejected");
        }

        let problem = Problem {
            kind: "about:blank",
            title: status.canonical_reason().unwrap_or("Error"),
            status: status.as_u16(),
            detail: self.0.to_string(),
        };
        HttpResponse::build(status)
            .content_type("application/problem+json")
            .json(problem)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
