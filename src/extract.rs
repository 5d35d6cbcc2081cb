use crate::error::{AppError, ValidationError};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query},
    http::request::Parts,
};
use serde::Deserialize;
use uuid::Uuid;

/// The `:id` segment of a record route. A malformed id is a JSON 400 like
/// every other bad input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for RecordId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<Uuid>::from_request_parts(parts, state).await {
            Ok(Path(id)) => Ok(RecordId(id)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "rejected record id");
                Err(ValidationError::new("Invalid record id").into())
            }
        }
    }
}

/// Query of a link issued by preview. Missing or garbled parameters are
/// treated like a bad signature.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedLink {
    pub expires: i64,
    pub signature: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for SignedLink
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<SignedLink>::from_request_parts(parts, state).await {
            Ok(Query(link)) => Ok(link),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "rejected link query");
                Err(AppError::Forbidden)
            }
        }
    }
}
