use crate::auth::LoginError;
use crate::prescriptions::{AssetFailure, PrescriptionError};
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Bad input. Always raised before any store is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Missing or invalid session")]
    Unauthorized,

    #[error("Invalid or expired link")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Failed to upload prescription. Please try again.")]
    UploadFailed,

    #[error("Failed to delete prescription.")]
    DeleteFailed,

    #[error("Failed to preview prescription.")]
    PreviewFailed,

    #[error("Failed to download prescription.")]
    DownloadFailed,

    #[error("Request failed. Please try again.")]
    RequestFailed(#[source] StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            other => AppError::RequestFailed(other),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::RequestFailed(StoreError::Database(err))
    }
}

impl From<LoginError> for AppError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::Validation(err) => AppError::Validation(err),
            LoginError::Store(err) => err.into(),
        }
    }
}

impl From<PrescriptionError> for AppError {
    fn from(err: PrescriptionError) -> Self {
        match err {
            PrescriptionError::Validation(err) => AppError::Validation(err),
            PrescriptionError::NotOwned => AppError::NotFound("Prescription"),
            PrescriptionError::UploadFailed(_) => AppError::UploadFailed,
            // Another delete got to the row first.
            PrescriptionError::DeleteFailed(AssetFailure::Record(StoreError::NotFound(what))) => {
                AppError::NotFound(what)
            }
            PrescriptionError::DeleteFailed(_) => AppError::DeleteFailed,
            PrescriptionError::PreviewFailed(_) => AppError::PreviewFailed,
            PrescriptionError::DownloadFailed(_) => AppError::DownloadFailed,
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UploadFailed
            | AppError::DeleteFailed
            | AppError::PreviewFailed
            | AppError::DownloadFailed
            | AppError::RequestFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                AppError::RequestFailed(source) => {
                    tracing::error!(error = %source, "request failed")
                }
                other => tracing::error!(error = %other, "request failed"),
            }
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_404() {
        let err: AppError = StoreError::NotFound("Medicine").into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Medicine not found");
    }

    #[test]
    fn validation_message_is_passed_through() {
        let err: AppError = ValidationError::new("File too large").into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "File too large");
    }

    #[test]
    fn database_errors_are_request_failures() {
        let err: AppError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, AppError::RequestFailed(_)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
