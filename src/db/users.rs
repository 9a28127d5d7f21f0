use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::User;
use crate::pagination::Page;

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub full_name: Option<&'a str>,
    pub is_active: bool,
    pub is_superuser: bool,
}

/// Fields a user update may touch. `None` leaves the column unchanged;
/// `full_name: Some(None)` clears it.
#[derive(Debug, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub full_name: Option<Option<String>>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
}

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    new: &NewUser<'_>,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (email, password_hash, full_name, is_active, is_superuser)
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(new.email)
    .bind(new.password_hash)
    .bind(new.full_name)
    .bind(new.is_active)
    .bind(new.is_superuser)
    .fetch_one(executor)
    .await
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list(pool: &PgPool, page: Page) -> Result<(Vec<User>, i64), sqlx::Error> {
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
    )
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    Ok((users, row.0))
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    patch: &UserPatch,
) -> Result<Option<User>, sqlx::Error> {
    // Setting a password activates the account unless the caller says otherwise,
    // and voids any outstanding password-set link.
    let is_active = patch
        .is_active
        .or(patch.password_hash.as_ref().map(|_| true));

    sqlx::query_as::<_, User>(
        "UPDATE users SET
            email = COALESCE($2, email),
            full_name = CASE WHEN $3 THEN $4 ELSE full_name END,
            password_hash = COALESCE($5, password_hash),
            password_set_token_hash = CASE WHEN $5::text IS NULL THEN password_set_token_hash END,
            password_set_token_expires = CASE WHEN $5::text IS NULL THEN password_set_token_expires END,
            is_active = COALESCE($6, is_active),
            is_superuser = COALESCE($7, is_superuser),
            updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(patch.email.as_deref())
    .bind(patch.full_name.is_some())
    .bind(patch.full_name.clone().flatten())
    .bind(patch.password_hash.as_deref())
    .bind(is_active)
    .bind(patch.is_superuser)
    .fetch_optional(pool)
    .await
}

/// Consume a password-set token: set the password, activate the account and
/// drop the stored token. Matches only while `token_hash` is the stored,
/// unexpired digest, so a token is accepted at most once.
pub async fn consume_password_set_token(
    pool: &PgPool,
    id: Uuid,
    token_hash: &str,
    password_hash: &str,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET
            password_hash = $3,
            is_active = true,
            password_set_token_hash = NULL,
            password_set_token_expires = NULL,
            updated_at = now()
         WHERE id = $1
           AND password_set_token_hash = $2
           AND password_set_token_expires > now()
         RETURNING *",
    )
    .bind(id)
    .bind(token_hash)
    .bind(password_hash)
    .fetch_optional(pool)
    .await
}

/// Store the digest of a freshly issued password-set token, replacing any
/// earlier one. The account stays inactive until the token is consumed.
pub async fn store_password_set_token(
    pool: &PgPool,
    id: Uuid,
    token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET
            password_set_token_hash = $2,
            password_set_token_expires = $3,
            is_active = false,
            updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(token_hash)
    .bind(expires_at)
    .fetch_optional(pool)
    .await
}

pub async fn activate(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>(
        "UPDATE users SET is_active = true, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("DELETE FROM users WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(pool)
        .await
}
