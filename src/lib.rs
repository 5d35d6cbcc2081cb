pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod health;
pub mod models;
pub mod prescriptions;
pub mod session;
pub mod storage;
pub mod store;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{delete, get, post},
    Router,
};
use config::Config;
use db::DbConnection;
use prescriptions::{PrescriptionCoordinator, MAX_FILE_SIZE};
use std::sync::Arc;
use storage::{FsBlobStore, UrlSigner};
use store::SqliteStore;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub conn: DbConnection,
    pub store: SqliteStore,
    pub blobs: Arc<FsBlobStore>,
    pub prescriptions: PrescriptionCoordinator,
}

impl AppState {
    pub fn new(conn: DbConnection, config: &Config) -> Result<Self, hmac::digest::InvalidLength> {
        let store = SqliteStore::new(conn.clone());
        let blobs = Arc::new(FsBlobStore::new(
            config.blob_root.clone(),
            config.public_url.clone(),
            UrlSigner::new(&config.signing_secret)?,
        ));
        let prescriptions = PrescriptionCoordinator::new(blobs.clone(), Arc::new(store.clone()));

        Ok(Self {
            conn,
            store,
            blobs,
            prescriptions,
        })
    }
}

impl FromRef<AppState> for DbConnection {
    fn from_ref(state: &AppState) -> Self {
        state.conn.clone()
    }
}

pub fn app(state: AppState) -> Router {
    // Oversized files must reach validation rather than be cut off by the body limit.
    let upload_limit = DefaultBodyLimit::max(MAX_FILE_SIZE * 2);

    Router::new()
        .route("/login", post(handlers::login_user))
        .route("/logout", post(handlers::logout_user))
        .route("/me", get(handlers::current_user))
        .route(
            "/medicines",
            get(handlers::list_medicines).post(handlers::create_medicine),
        )
        .route("/medicines/:medicine_id", delete(handlers::delete_medicine))
        .route(
            "/appointments",
            get(handlers::list_appointments).post(handlers::create_appointment),
        )
        .route(
            "/appointments/:appointment_id",
            delete(handlers::delete_appointment),
        )
        .route(
            "/prescriptions",
            get(handlers::list_prescriptions)
                .post(handlers::upload_prescription)
                .layer(upload_limit),
        )
        .route(
            "/prescriptions/:prescription_id",
            delete(handlers::delete_prescription),
        )
        .route(
            "/prescriptions/:prescription_id/preview",
            get(handlers::preview_prescription),
        )
        .route(
            "/prescriptions/:prescription_id/download",
            get(handlers::download_prescription),
        )
        .route("/blobs/*path", get(handlers::serve_signed_blob))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
