use crate::auth::verify_auth_token;
use crate::db::DbConnection;
use crate::error::AppError;
use crate::models::User;
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use uuid::Uuid;

/// An authenticated user together with the token that proves it.
///
/// Created by a successful login, destroyed by logout, and rebuilt from the
/// `auth_tokens` table on every request. Handlers receive it as an extractor
/// and pass it into every data access call, which scopes the call to
/// [`Session::owner_id`].
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

impl Session {
    pub fn owner_id(&self) -> Uuid {
        self.user.id
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    DbConnection: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let conn = DbConnection::from_ref(state);

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        verify_auth_token(&conn, token)
            .await?
            .ok_or(AppError::Unauthorized)
    }
}
