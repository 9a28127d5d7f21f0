use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::{self, TokenKind};
use crate::auth::{ActiveUser, Superuser, password};
use crate::db;
use crate::db::users::{NewUser, UserPatch};
use crate::email::EmailTemplate;
use crate::error::AppError;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::models::User;
use crate::pagination::{Page, PageParams, Paginated};
use crate::state::SharedState;

use super::auth::{MessageResponse, validate_email};
use super::{double_option, user_write_error};

#[derive(Serialize)]
pub struct WhoAmI {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub password: Option<String>,
    pub full_name: Option<String>,
    #[serde(default)]
    pub is_superuser: bool,
}

#[derive(Deserialize)]
pub struct UpdateMe {
    pub email: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub full_name: Option<Option<String>>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub full_name: Option<Option<String>>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
}

fn user_not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

fn build_patch(
    email: Option<String>,
    full_name: Option<Option<String>>,
    password: Option<String>,
) -> Result<UserPatch, AppError> {
    let email = email.as_deref().map(validate_email).transpose()?;
    let password_hash = match password {
        Some(pw) => {
            password::validate_length(&pw).map_err(AppError::BadRequest)?;
            Some(password::hash(&pw).map_err(AppError::Internal)?)
        }
        None => None,
    };
    Ok(UserPatch {
        email,
        full_name,
        password_hash,
        ..Default::default()
    })
}

/// Issue a password-set token for `user`, store its digest (deactivating the
/// account until it is used) and email the link.
async fn send_password_set(state: &SharedState, user: &User) -> Result<User, AppError> {
    let token = jwt::issue(
        TokenKind::PasswordSet,
        &user.email,
        jwt::EMAIL_TOKEN_TTL,
        &state.config.jwt_secret,
    )
    .map_err(AppError::Internal)?;

    let expires_at = Utc::now()
        + chrono::Duration::from_std(jwt::EMAIL_TOKEN_TTL)
            .map_err(|e| AppError::Internal(format!("Token TTL out of range: {e}")))?;

    let user = db::users::store_password_set_token(
        &state.pool,
        user.id,
        &password::hash_token(&token),
        expires_at,
    )
    .await?
    .ok_or_else(user_not_found)?;

    let url = format!("{}/set-password?token={token}", state.config.base_url);
    state
        .notify(&user.email, EmailTemplate::PasswordSet, &[("password_set_url", &url)])
        .await;

    Ok(user)
}

pub async fn whoami(ActiveUser(user): ActiveUser) -> Json<WhoAmI> {
    Json(WhoAmI {
        id: user.id,
        email: user.email,
        full_name: user.full_name,
        is_active: user.is_active,
        is_superuser: user.is_superuser,
    })
}

pub async fn list(
    _admin: Superuser,
    State(state): State<SharedState>,
    AppQuery(params): AppQuery<PageParams>,
) -> Result<Json<Paginated<User>>, AppError> {
    let page = Page::from(&params);
    let (users, total) = db::users::list(&state.pool, page).await?;
    Ok(Json(Paginated::new(users, total, page)))
}

pub async fn create(
    Superuser(admin): Superuser,
    State(state): State<SharedState>,
    AppJson(req): AppJson<CreateUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let email = validate_email(&req.email)?;

    let pw_hash = match req.password.as_deref() {
        Some(pw) => {
            password::validate_length(pw).map_err(AppError::BadRequest)?;
            Some(password::hash(pw).map_err(AppError::Internal)?)
        }
        None => None,
    };

    let user = db::users::create(
        &state.pool,
        &NewUser {
            email: &email,
            password_hash: pw_hash.as_deref(),
            full_name: req.full_name.as_deref(),
            is_active: pw_hash.is_some(),
            is_superuser: req.is_superuser,
        },
    )
    .await
    .map_err(user_write_error)?;

    let user = if user.password_hash.is_none() {
        send_password_set(&state, &user).await?
    } else {
        user
    };

    tracing::info!(user_id = %user.id, created_by = %admin.id, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn me(ActiveUser(user): ActiveUser) -> Json<User> {
    Json(user)
}

pub async fn update_me(
    ActiveUser(user): ActiveUser,
    State(state): State<SharedState>,
    AppJson(req): AppJson<UpdateMe>,
) -> Result<Json<User>, AppError> {
    let patch = build_patch(req.email, req.full_name, req.password)?;

    let user = db::users::update(&state.pool, user.id, &patch)
        .await
        .map_err(user_write_error)?
        .ok_or_else(user_not_found)?;
    Ok(Json(user))
}

pub async fn get(
    ActiveUser(caller): ActiveUser,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<User>, AppError> {
    if caller.id == id {
        return Ok(Json(caller));
    }
    if !caller.is_superuser {
        return Err(AppError::Forbidden(
            "The user doesn't have enough privileges".to_string(),
        ));
    }

    let user = db::users::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(user))
}

pub async fn update(
    _admin: Superuser,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(req): AppJson<UpdateUser>,
) -> Result<Json<User>, AppError> {
    let mut patch = build_patch(req.email, req.full_name, req.password)?;
    patch.is_active = req.is_active;
    patch.is_superuser = req.is_superuser;

    let user = db::users::update(&state.pool, id, &patch)
        .await
        .map_err(user_write_error)?
        .ok_or_else(user_not_found)?;
    Ok(Json(user))
}

pub async fn delete(
    Superuser(admin): Superuser,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<User>, AppError> {
    if admin.id == id {
        return Err(AppError::BadRequest(
            "Superusers are not allowed to delete themselves".to_string(),
        ));
    }

    let user = db::users::delete(&state.pool, id)
        .await
        .map_err(|e| AppError::from_delete(e, "User"))?
        .ok_or_else(user_not_found)?;

    tracing::info!(user_id = %user.id, deleted_by = %admin.id, "User deleted");
    Ok(Json(user))
}

pub async fn reissue_password_set(
    _admin: Superuser,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = db::users::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(user_not_found)?;

    send_password_set(&state, &user).await?;

    Ok(Json(MessageResponse {
        message: format!("Password set link sent to {}", user.email),
    }))
}
