pub mod auth;
pub mod images;
pub mod patients;
pub mod predictions;
pub mod users;

use axum::Router;
use axum::routing::{get, post};
use serde::{Deserialize, Deserializer};

use crate::error::AppError;
use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Auth
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/verify-email/{token}", post(auth::verify_email))
        .route("/api/v1/auth/set-password", post(auth::set_password))
        .route("/api/v1/auth/test-token", post(auth::test_token))
        .route("/api/v1/whoami", get(users::whoami))
        // Users
        .route("/api/v1/users", get(users::list).post(users::create))
        .route("/api/v1/users/me", get(users::me).put(users::update_me))
        .route(
            "/api/v1/users/{id}",
            get(users::get).put(users::update).delete(users::delete),
        )
        .route(
            "/api/v1/users/{id}/password-set",
            post(users::reissue_password_set),
        )
        // Patients
        .route("/api/v1/patients", get(patients::list).post(patients::create))
        .route(
            "/api/v1/patients/{id}",
            get(patients::get)
                .put(patients::update)
                .delete(patients::delete),
        )
        // Images
        .route("/api/v1/images", get(images::list).post(images::upload))
        .route(
            "/api/v1/images/{id}",
            get(images::get).delete(images::delete),
        )
        .route("/api/v1/images/{id}/view", get(images::view))
        // Predictions
        .route(
            "/api/v1/predictions",
            get(predictions::list).post(predictions::create),
        )
        .route(
            "/api/v1/predictions/{id}",
            get(predictions::get).delete(predictions::delete),
        )
}

/// Deserialize a field that distinguishes "absent" (`None`) from an explicit
/// JSON `null` (`Some(None)`). Use with `#[serde(default)]`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Map a failed user INSERT/UPDATE: duplicate email is `Conflict`, an
/// active account without a password is `BadRequest`.
pub(crate) fn user_write_error(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict("The user with this email already exists in the system".to_string())
        }
        sqlx::Error::Database(ref db_err) if db_err.is_check_violation() => {
            AppError::BadRequest("An active user must have a password".to_string())
        }
        _ => AppError::Database(err),
    }
}
