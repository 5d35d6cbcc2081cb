use crate::auth::{login, revoke_auth_token};
use crate::error::{AppError, ValidationError};
use crate::extract::{RecordId, SignedLink};
use crate::health::{schedule, AppointmentSchedule, MedicineStatus};
use crate::models::{Appointment, AppointmentForm, MedicineForm, Prescription, User};
use crate::prescriptions::{Preview, UploadFile};
use crate::session::Session;
use crate::storage::BlobError;
use crate::AppState;
use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

#[derive(Deserialize)]
pub struct LoginRequest {
    phone: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    user: User,
}

pub async fn login_user(
    State(state): State<AppState>,
    Json(login_data): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let session = login(&state.conn, &login_data.phone).await?;
    Ok(Json(LoginResponse {
        token: session.token,
        user: session.user,
    }))
}

pub async fn logout_user(
    State(state): State<AppState>,
    session: Session,
) -> Result<StatusCode, AppError> {
    revoke_auth_token(&state.conn, &session.token).await?;
    tracing::info!(user_id = %session.owner_id(), "session closed");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn current_user(session: Session) -> Json<User> {
    Json(session.user)
}

pub async fn list_medicines(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<MedicineStatus>>, AppError> {
    let today = Utc::now().date_naive();
    let medicines = state.store.list_medicines(session.owner_id()).await?;
    Ok(Json(
        medicines
            .into_iter()
            .map(|medicine| MedicineStatus::new(medicine, today))
            .collect(),
    ))
}

pub async fn create_medicine(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<MedicineForm>,
) -> Result<(StatusCode, Json<MedicineStatus>), AppError> {
    let new = form.validate()?;
    let medicine = state.store.insert_medicine(session.owner_id(), new).await?;
    tracing::info!(user_id = %session.owner_id(), medicine_id = %medicine.id, "medicine added");
    Ok((
        StatusCode::CREATED,
        Json(MedicineStatus::new(medicine, Utc::now().date_naive())),
    ))
}

pub async fn delete_medicine(
    State(state): State<AppState>,
    session: Session,
    RecordId(medicine_id): RecordId,
) -> Result<StatusCode, AppError> {
    state
        .store
        .delete_medicine(session.owner_id(), medicine_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_appointments(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<AppointmentSchedule>, AppError> {
    let appointments = state.store.list_appointments(session.owner_id()).await?;
    Ok(Json(schedule(appointments, Utc::now().date_naive())))
}

pub async fn create_appointment(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<AppointmentForm>,
) -> Result<(StatusCode, Json<Appointment>), AppError> {
    let new = form.validate()?;
    let appointment = state
        .store
        .insert_appointment(session.owner_id(), new)
        .await?;
    tracing::info!(user_id = %session.owner_id(), appointment_id = %appointment.id, "appointment added");
    Ok((StatusCode::CREATED, Json(appointment)))
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    session: Session,
    RecordId(appointment_id): RecordId,
) -> Result<StatusCode, AppError> {
    state
        .store
        .delete_appointment(session.owner_id(), appointment_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_prescriptions(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Vec<Prescription>>, AppError> {
    Ok(Json(state.prescriptions.list(&session).await?))
}

/// Takes the first multipart field that carries a file name.
pub async fn upload_prescription(
    State(state): State<AppState>,
    session: Session,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Prescription>), AppError> {
    let unreadable = |_| ValidationError::new("Failed to read multipart data");

    while let Some(field) = multipart.next_field().await.map_err(unreadable)? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(unreadable)?;

        let file = UploadFile {
            file_name: &file_name,
            content_type: &content_type,
            data: &data,
        };
        let prescription = state.prescriptions.upload(&session, file).await?;
        return Ok((StatusCode::CREATED, Json(prescription)));
    }

    Err(ValidationError::new("No file uploaded").into())
}

pub async fn delete_prescription(
    State(state): State<AppState>,
    session: Session,
    RecordId(prescription_id): RecordId,
) -> Result<StatusCode, AppError> {
    let prescription = state.prescriptions.find(&session, prescription_id).await?;
    state.prescriptions.delete(&session, &prescription).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn preview_prescription(
    State(state): State<AppState>,
    session: Session,
    RecordId(prescription_id): RecordId,
) -> Result<Json<Preview>, AppError> {
    let prescription = state.prescriptions.find(&session, prescription_id).await?;
    Ok(Json(state.prescriptions.preview(&session, &prescription).await?))
}

fn attachment_header(file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

pub async fn download_prescription(
    State(state): State<AppState>,
    session: Session,
    RecordId(prescription_id): RecordId,
) -> Result<Response, AppError> {
    let prescription = state.prescriptions.find(&session, prescription_id).await?;
    let data = state.prescriptions.download(&session, &prescription).await?;

    let mime_type = mime_guess::from_path(&prescription.file_name).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime_type.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                attachment_header(&prescription.file_name),
            ),
        ],
        data,
    )
        .into_response())
}

/// Target of the links handed out by preview.
pub async fn serve_signed_blob(
    State(state): State<AppState>,
    Path(path): Path<String>,
    link: SignedLink,
) -> Result<Response, AppError> {
    if !state.blobs.verify_link(&path, link.expires, &link.signature) {
        return Err(AppError::Forbidden);
    }

    let file = match state.blobs.open(&path).await {
        Ok(file) => file,
        Err(BlobError::NotFound(_)) => return Err(AppError::NotFound("File")),
        Err(BlobError::InvalidPath(_)) => return Err(AppError::Forbidden),
        Err(err) => {
            tracing::error!(path = %path, error = %err, "failed to open blob");
            return Err(AppError::DownloadFailed);
        }
    };

    let mime_type = mime_guess::from_path(&path).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime_type.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static("private, max-age=300"),
            ),
        ],
        body,
    )
        .into_response())
}
