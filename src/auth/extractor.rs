use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;

use crate::auth::jwt;
use crate::db;
use crate::error::AppError;
use crate::models::User;
use crate::state::SharedState;

/// The user named by a valid access token, whatever its status.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// A `CurrentUser` whose account is active.
#[derive(Debug, Clone)]
pub struct ActiveUser(pub User);

/// An active superuser.
#[derive(Debug, Clone)]
pub struct Superuser(pub User);

impl CurrentUser {
    pub fn require_active(self) -> Result<ActiveUser, AppError> {
        if self.0.is_active {
            Ok(ActiveUser(self.0))
        } else {
            Err(AppError::Forbidden("Inactive user".to_string()))
        }
    }
}

impl ActiveUser {
    pub fn require_superuser(self) -> Result<Superuser, AppError> {
        if self.0.is_superuser {
            Ok(Superuser(self.0))
        } else {
            Err(AppError::Forbidden(
                "The user doesn't have enough privileges".to_string(),
            ))
        }
    }

    /// Superusers may act on anyone's rows, everyone else only on their own.
    pub fn can_access(&self, owner_id: uuid::Uuid) -> bool {
        self.0.is_superuser || self.0.id == owner_id
    }
}

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized("Not authenticated".to_string()))?;

        let user_id = jwt::verify_access(bearer.token(), &state.config.jwt_secret)
            .map_err(|e| {
                tracing::debug!("Rejected access token: {e}");
                AppError::Unauthorized("Could not validate credentials".to_string())
            })?;

        let user = db::users::find_by_id(&state.pool, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok(CurrentUser(user))
    }
}

impl FromRequestParts<SharedState> for ActiveUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        CurrentUser::from_request_parts(parts, state)
            .await?
            .require_active()
    }
}

impl FromRequestParts<SharedState> for Superuser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        ActiveUser::from_request_parts(parts, state)
            .await?
            .require_superuser()
    }
}
