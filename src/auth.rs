use crate::db::{self, parse_timestamp, parse_uuid, DbConnection};
use crate::error::ValidationError;
use crate::models::User;
use crate::session::Session;
use chrono::Utc;
use rand::Rng;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

const TOKEN_LENGTH: usize = 32;

/// Strips whitespace and dashes. `"+1 234-567-8900"` becomes `"+12345678900"`.
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Accepts an optional leading `+` followed by 10 to 15 digits, after normalization.
pub fn validate_phone(phone: &str) -> Result<String, ValidationError> {
    let normalized = normalize_phone(phone);
    let digits = normalized.strip_prefix('+').unwrap_or(&normalized);

    if (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(normalized)
    } else {
        Err(ValidationError::new(
            "Please enter a valid phone number (10-15 digits).",
        ))
    }
}

/// Identity key for a normalized phone: the digits alone, so a leading `+` is formatting.
fn phone_key(normalized: &str) -> &str {
    normalized.strip_prefix('+').unwrap_or(normalized)
}

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(0, row.get(0)?)?,
        phone: row.get(1)?,
        created_at: parse_timestamp(2, row.get(2)?)?,
    })
}

/// Looks the phone up and creates the user when it is new.
pub async fn find_or_create_user(conn: &DbConnection, phone: &str) -> Result<User, rusqlite::Error> {
    let key = phone_key(phone);
    let conn = conn.lock().await;

    let existing = conn
        .query_row(
            "SELECT id, phone, created_at FROM users WHERE phone_digits = ?",
            [key],
            map_user,
        )
        .optional()?;

    if let Some(user) = existing {
        return Ok(user);
    }

    let user = User {
        id: Uuid::new_v4(),
        phone: phone.to_string(),
        created_at: db::now(),
    };
    conn.execute(
        "INSERT INTO users (id, phone, phone_digits, created_at) VALUES (?, ?, ?, ?)",
        params![
            user.id.to_string(),
            user.phone,
            key,
            db::timestamp(user.created_at)
        ],
    )?;
    tracing::info!(user_id = %user.id, "created user");

    Ok(user)
}

pub async fn create_auth_token(conn: &DbConnection, user_id: &Uuid) -> Result<String, rusqlite::Error> {
    let token = generate_token();

    conn.lock().await.execute(
        "INSERT INTO auth_tokens (token, user_id, created_at) VALUES (?, ?, ?)",
        params![token, user_id.to_string(), db::timestamp(Utc::now())],
    )?;

    Ok(token)
}

/// Validates the phone, resolves the user and opens a session for them.
pub async fn login(conn: &DbConnection, phone: &str) -> Result<Session, LoginError> {
    let phone = validate_phone(phone)?;
    let user = find_or_create_user(conn, &phone).await?;
    let token = create_auth_token(conn, &user.id).await?;
    tracing::info!(user_id = %user.id, "session opened");
    Ok(Session { token, user })
}

/// Rebuilds the session a token belongs to. Unknown tokens and rows that no
/// longer parse or point at a missing user all come back as `None`.
pub async fn verify_auth_token(conn: &DbConnection, token: &str) -> Result<Option<Session>, rusqlite::Error> {
    let conn = conn.lock().await;

    let user_id = conn
        .query_row(
            "SELECT user_id FROM auth_tokens WHERE token = ?",
            [token],
            |row| row.get::<_, String>(0),
        )
        .optional()?;

    let Some(user_id) = user_id else {
        return Ok(None);
    };

    let user_id = match Uuid::parse_str(&user_id) {
        Ok(id) => id,
        Err(err) => {
            tracing::warn!(error = %err, "discarding session with unparseable user id");
            return Ok(None);
        }
    };

    let user = match conn
        .query_row(
            "SELECT id, phone, created_at FROM users WHERE id = ?",
            [user_id.to_string()],
            map_user,
        )
        .optional()
    {
        Ok(user) => user,
        Err(rusqlite::Error::FromSqlConversionFailure(..)) => {
            tracing::warn!(%user_id, "discarding session with corrupt user record");
            None
        }
        Err(err) => return Err(err),
    };

    Ok(user.map(|user| Session {
        token: token.to_string(),
        user,
    }))
}

pub async fn revoke_auth_token(conn: &DbConnection, token: &str) -> Result<(), rusqlite::Error> {
    conn.lock()
        .await
        .execute("DELETE FROM auth_tokens WHERE token = ?", [token])?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Failed to check user. Please try again.")]
    Store(#[from] rusqlite::Error),
}
