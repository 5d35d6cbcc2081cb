//! Prescription documents: a blob in the [`BlobStore`] plus a metadata row in
//! [`PrescriptionRecords`], kept in lock-step.
//!
//! Uploads write the blob first and the row second. If the row cannot be
//! written the blob is removed again; a failure of that removal is logged and
//! otherwise ignored, so a double failure can leave an orphaned blob behind.
//! Deletes go the other way round and never drop a row whose blob is still
//! present.

use crate::error::ValidationError;
use crate::models::{NewPrescription, Prescription};
use crate::session::Session;
use crate::storage::{BlobError, BlobStore};
use crate::store::{PrescriptionRecords, StoreError};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "application/pdf"];
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024; // 10MB
pub const PREVIEW_TTL: Duration = Duration::from_secs(300);

const PATH_TOKEN_LENGTH: usize = 6;
const MAX_EXTENSION_LENGTH: usize = 16;

#[derive(Debug, Error)]
pub enum PrescriptionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("prescription belongs to another user")]
    NotOwned,
    #[error("upload failed: {0}")]
    UploadFailed(#[source] AssetFailure),
    #[error("delete failed: {0}")]
    DeleteFailed(#[source] AssetFailure),
    #[error("preview failed: {0}")]
    PreviewFailed(#[source] BlobError),
    #[error("download failed: {0}")]
    DownloadFailed(#[source] BlobError),
}

/// Which collaborator let an operation down.
#[derive(Debug, Error)]
pub enum AssetFailure {
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Record(#[from] StoreError),
}

/// A file as received from the client.
#[derive(Debug, Clone, Copy)]
pub struct UploadFile<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub url: String,
    pub file_name: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaPhase {
    Validated,
    BlobStored,
    Recorded,
    Compensated,
}

/// Progress of a single upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSaga {
    pub phase: SagaPhase,
    pub path: String,
    pub record_id: Option<Uuid>,
}

impl UploadSaga {
    fn begin(path: String) -> Self {
        Self {
            phase: SagaPhase::Validated,
            path,
            record_id: None,
        }
    }

    fn advance(&mut self, phase: SagaPhase) {
        tracing::debug!(path = %self.path, from = ?self.phase, to = ?phase, "upload saga");
        self.phase = phase;
    }
}

pub fn validate_upload(file: &UploadFile<'_>) -> Result<(), ValidationError> {
    if !ALLOWED_CONTENT_TYPES.contains(&file.content_type) {
        return Err(ValidationError::new(
            "Invalid file type. Please upload a JPG, PNG, WebP, or PDF file.",
        ));
    }
    if file.data.len() > MAX_FILE_SIZE {
        return Err(ValidationError::new(
            "File too large. Please upload a file smaller than 10MB.",
        ));
    }
    Ok(())
}

/// Text after the last `.`, or the whole name when there is none, reduced to
/// ASCII alphanumerics so it is safe inside a path and a URL. Anything empty
/// or longer than [`MAX_EXTENSION_LENGTH`] becomes `bin`.
fn file_extension(file_name: &str) -> String {
    let raw = file_name.rsplit('.').next().unwrap_or(file_name);
    let ext: String = raw.chars().filter(char::is_ascii_alphanumeric).collect();
    if ext.is_empty() || ext.len() > MAX_EXTENSION_LENGTH {
        "bin".to_string()
    } else {
        ext
    }
}

/// `{owner}/{millis}-{token}.{ext}`. Collisions are possible in theory only.
pub fn derive_storage_path(owner: Uuid, file_name: &str, now: DateTime<Utc>) -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(PATH_TOKEN_LENGTH)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();

    format!(
        "{}/{}-{}.{}",
        owner,
        now.timestamp_millis(),
        token,
        file_extension(file_name)
    )
}

#[derive(Clone)]
pub struct PrescriptionCoordinator {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn PrescriptionRecords>,
}

impl PrescriptionCoordinator {
    pub fn new(blobs: Arc<dyn BlobStore>, records: Arc<dyn PrescriptionRecords>) -> Self {
        Self { blobs, records }
    }

    fn ensure_owner(session: &Session, record: &Prescription) -> Result<(), PrescriptionError> {
        if record.user_id == session.owner_id() {
            Ok(())
        } else {
            Err(PrescriptionError::NotOwned)
        }
    }

    pub async fn list(&self, session: &Session) -> Result<Vec<Prescription>, StoreError> {
        self.records.list_prescriptions(session.owner_id()).await
    }

    pub async fn find(&self, session: &Session, id: Uuid) -> Result<Prescription, StoreError> {
        self.records.get_prescription(session.owner_id(), id).await
    }

    pub async fn upload(
        &self,
        session: &Session,
        file: UploadFile<'_>,
    ) -> Result<Prescription, PrescriptionError> {
        validate_upload(&file)?;

        let owner = session.owner_id();
        let mut saga = UploadSaga::begin(derive_storage_path(owner, file.file_name, Utc::now()));

        if let Err(err) = self.blobs.put(&saga.path, file.data).await {
            tracing::warn!(path = %saga.path, error = %err, "failed to store prescription blob");
            return Err(PrescriptionError::UploadFailed(err.into()));
        }
        saga.advance(SagaPhase::BlobStored);

        let record = NewPrescription {
            user_id: owner,
            file_name: file.file_name,
            file_path: &saga.path,
            file_size: Some(file.data.len() as i64),
        };

        let inserted = self.records.insert_prescription(record).await;
        match inserted {
            Ok(prescription) => {
                saga.record_id = Some(prescription.id);
                saga.advance(SagaPhase::Recorded);
                tracing::info!(
                    user_id = %owner,
                    prescription_id = %prescription.id,
                    bytes = file.data.len(),
                    "prescription uploaded"
                );
                Ok(prescription)
            }
            Err(err) => {
                tracing::warn!(path = %saga.path, error = %err, "failed to record prescription, removing blob");
                if let Err(cleanup) = self.blobs.remove(&saga.path).await {
                    tracing::warn!(path = %saga.path, error = %cleanup, "orphaned prescription blob");
                }
                saga.advance(SagaPhase::Compensated);
                Err(PrescriptionError::UploadFailed(err.into()))
            }
        }
    }

    pub async fn delete(&self, session: &Session, record: &Prescription) -> Result<(), PrescriptionError> {
        Self::ensure_owner(session, record)?;

        self.blobs
            .remove(&record.file_path)
            .await
            .map_err(|err| PrescriptionError::DeleteFailed(err.into()))?;

        self.records
            .delete_prescription(record.user_id, record.id)
            .await
            .map_err(|err| PrescriptionError::DeleteFailed(err.into()))?;

        tracing::info!(prescription_id = %record.id, "prescription deleted");
        Ok(())
    }

    pub async fn preview(&self, session: &Session, record: &Prescription) -> Result<Preview, PrescriptionError> {
        Self::ensure_owner(session, record)?;

        let url = self
            .blobs
            .sign(&record.file_path, PREVIEW_TTL)
            .await
            .map_err(PrescriptionError::PreviewFailed)?;

        Ok(Preview {
            url,
            file_name: record.file_name.clone(),
            expires_in: PREVIEW_TTL.as_secs(),
        })
    }

    pub async fn download(&self, session: &Session, record: &Prescription) -> Result<Vec<u8>, PrescriptionError> {
        Self::ensure_owner(session, record)?;

        self.blobs
            .get(&record.file_path)
            .await
            .map_err(PrescriptionError::DownloadFailed)
    }
}
