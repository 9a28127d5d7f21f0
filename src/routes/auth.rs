use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::jwt::{self, TokenKind};
use crate::auth::{CurrentUser, password};
use crate::db;
use crate::db::users::NewUser;
use crate::email::EmailTemplate;
use crate::error::AppError;
use crate::extract::{AppForm, AppJson, AppPath};
use crate::models::User;
use crate::state::SharedState;

use super::user_write_error;

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub grant_type: Option<String>,
    pub scope: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub scope: String,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct SetPasswordRequest {
    pub token: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub(crate) fn validate_email(email: &str) -> Result<String, AppError> {
    let email = email.trim();
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !well_formed {
        return Err(AppError::BadRequest(format!("Invalid email address '{email}'")));
    }
    Ok(email.to_string())
}

pub async fn login(
    State(state): State<SharedState>,
    AppForm(form): AppForm<LoginForm>,
) -> Result<Json<TokenResponse>, AppError> {
    if let Some(grant_type) = form.grant_type.as_deref().filter(|g| !g.is_empty()) {
        if grant_type != "password" {
            return Err(AppError::BadRequest("Unsupported grant type".to_string()));
        }
    }

    if state.login_limiter.check(&form.username).is_err() {
        return Err(AppError::RateLimited(
            "Too many login attempts. Please try again later.".to_string(),
        ));
    }

    let user = db::users::find_by_email(&state.pool, &form.username).await?;

    // Accounts without a password cannot log in until one is set.
    let Some((user, hash)) = user.and_then(|u| u.password_hash.clone().map(|h| (u, h))) else {
        state.login_limiter.record_failure(&form.username);
        return Err(AppError::Unauthorized("Incorrect email or password".to_string()));
    };

    let valid = password::verify(&form.password, &hash).map_err(AppError::Internal)?;
    if !valid {
        state.login_limiter.record_failure(&form.username);
        return Err(AppError::Unauthorized("Incorrect email or password".to_string()));
    }
    state.login_limiter.reset(&form.username);

    let access_token = jwt::issue_access(
        user.id,
        state.config.access_token_ttl,
        &state.config.jwt_secret,
    )
    .map_err(AppError::Internal)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
        scope: form.scope.unwrap_or_default(),
    }))
}

pub async fn register(
    State(state): State<SharedState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let email = validate_email(&req.email)?;
    password::validate_length(&req.password).map_err(AppError::BadRequest)?;

    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;

    let user = db::users::create(
        &state.pool,
        &NewUser {
            email: &email,
            password_hash: Some(&pw_hash),
            full_name: req.full_name.as_deref(),
            is_active: false,
            is_superuser: false,
        },
    )
    .await
    .map_err(user_write_error)?;

    let token = jwt::issue(
        TokenKind::EmailVerification,
        &user.id.to_string(),
        jwt::EMAIL_TOKEN_TTL,
        &state.config.jwt_secret,
    )
    .map_err(AppError::Internal)?;

    let url = format!("{}/verify?token={token}", state.config.base_url);
    state
        .notify(&user.email, EmailTemplate::Verification, &[("verification_url", &url)])
        .await;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn verify_email(
    State(state): State<SharedState>,
    AppPath(token): AppPath<String>,
) -> Result<Json<User>, AppError> {
    let claims = jwt::verify(&token, TokenKind::EmailVerification, &state.config.jwt_secret)
        .map_err(|e| {
            tracing::debug!("Rejected verification token: {e}");
            AppError::BadRequest("Invalid or expired token".to_string())
        })?;

    let user_id = claims
        .sub
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid or expired token".to_string()))?;

    let user = db::users::find_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user.is_active {
        return Err(AppError::BadRequest("Email already verified".to_string()));
    }

    let user = db::users::activate(&state.pool, user.id)
        .await
        .map_err(user_write_error)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %user.id, "Email verified");
    Ok(Json(user))
}

pub async fn set_password(
    State(state): State<SharedState>,
    AppJson(req): AppJson<SetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let invalid = || AppError::BadRequest("Invalid or expired token".to_string());

    let claims = jwt::verify(&req.token, TokenKind::PasswordSet, &state.config.jwt_secret)
        .map_err(|e| {
            tracing::debug!("Rejected password-set token: {e}");
            invalid()
        })?;

    if !claims.sub.eq_ignore_ascii_case(req.email.trim()) {
        return Err(invalid());
    }

    let user = db::users::find_by_email(&state.pool, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let stored_valid = match (&user.password_set_token_hash, user.password_set_token_expires) {
        (Some(digest), Some(expires)) => {
            expires > Utc::now() && password::token_matches(&req.token, digest)
        }
        _ => false,
    };
    if !stored_valid {
        return Err(invalid());
    }

    password::validate_length(&req.password).map_err(AppError::BadRequest)?;
    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;

    // A concurrent request may have consumed the token since the check above.
    db::users::consume_password_set_token(
        &state.pool,
        user.id,
        &password::hash_token(&req.token),
        &pw_hash,
    )
    .await?
    .ok_or_else(invalid)?;

    tracing::info!(user_id = %user.id, "Password set");
    Ok(Json(MessageResponse {
        message: "Password set successfully".to_string(),
    }))
}

pub async fn test_token(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}
