use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::departures::SourceError;
use crate::export::{ExportError, SkipReason};
use crate::ftp::UploadError;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl AppError {
    fn operational(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn bad_request(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::operational(StatusCode::UNAUTHORIZED, "AUTH_UNAUTHORIZED", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::CONFLICT, code, message)
    }

    pub fn unprocessable(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::UNPROCESSABLE_ENTITY, code, message)
    }

    /// The FTP server, not this service, refused the request.
    pub fn bad_gateway(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::BAD_GATEWAY, code, message)
    }

    /// Logged in full, answered with a generic message.
    pub fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.to_string(),
            is_operational: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            self.message.clone()
        } else {
            "Internal server error".to_string()
        };

        if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Internal API error");
        }

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: exposed_message,
                trace_id: None,
            }),
        )
            .into_response()
    }
}

// Validation and conflict messages are safe to expose.
impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match &value {
            StoreError::Validation(msg) => AppError::bad_request("VALIDATION_ERROR", msg),
            StoreError::Conflict { .. } => AppError::conflict("CONFLICT", &value.to_string()),
            StoreError::NotFound { .. } => AppError::not_found(&value.to_string()),
            _ => AppError::internal(&value.to_string()),
        }
    }
}

impl From<SourceError> for AppError {
    fn from(value: SourceError) -> Self {
        AppError::internal(&value.to_string())
    }
}

impl From<ExportError> for AppError {
    fn from(value: ExportError) -> Self {
        match &value {
            ExportError::Skipped(SkipReason::DuplicateDate(_)) => {
                AppError::conflict("EXPORT_EXISTS", &value.to_string())
            }
            ExportError::Skipped(SkipReason::NoRecipients) => {
                AppError::unprocessable("EXPORT_EMPTY", &value.to_string())
            }
            ExportError::Skipped(_) => AppError::bad_request("EXPORT_NOT_CONFIGURED", &value.to_string()),
            ExportError::Store(inner) if inner.is_conflict() => {
                AppError::conflict("CONFLICT", &value.to_string())
            }
            ExportError::RetryFailed(_) => AppError::conflict("EXPORT_RETRY_FAILED", &value.to_string()),
            ExportError::DayOffsetOutOfRange(_) => {
                AppError::bad_request("EXPORT_NOT_CONFIGURED", &value.to_string())
            }
            _ => AppError::internal(&value.to_string()),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(value: UploadError) -> Self {
        let message = value.to_string();
        match value {
            UploadError::NotConfigured
            | UploadError::NoAttachment
            | UploadError::FileNotFound
            | UploadError::EmptyFile => AppError::bad_request("UPLOAD_PRECONDITION", &message),
            UploadError::ExportNotFound(_) => AppError::not_found(&message),
            UploadError::Ftp(_) => AppError::bad_gateway("FTP_UPLOAD_FAILED", &message),
            UploadError::Store(inner) => AppError::from(inner),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}
