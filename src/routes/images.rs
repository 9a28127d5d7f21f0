use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::auth::ActiveUser;
use crate::db;
use crate::error::AppError;
use crate::extract::{AppPath, AppQuery};
use crate::intake::{parser, validate};
use crate::models::ImageSummary;
use crate::pagination::{Page, PageParams, Paginated};
use crate::state::SharedState;

fn image_not_found() -> AppError {
    AppError::NotFound("Image not found".to_string())
}

pub async fn list(
    _user: ActiveUser,
    State(state): State<SharedState>,
    AppQuery(params): AppQuery<PageParams>,
) -> Result<Json<Paginated<ImageSummary>>, AppError> {
    let page = Page::from(&params);
    let (images, total) = db::images::list(&state.pool, page).await?;
    Ok(Json(Paginated::new(images, total, page)))
}

pub async fn upload(
    ActiveUser(user): ActiveUser,
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let mut form = parser::parse_multipart(&headers, body)
        .await
        .map_err(AppError::BadRequest)?;
    let file = form.take_file().map_err(AppError::BadRequest)?;

    let content_type = validate::validate_image(&file.filename, file.content_type.as_deref(), &file.data)
        .map_err(AppError::BadRequest)?;

    let image = db::images::create(&state.pool, &file.filename, content_type, &file.data).await?;

    tracing::info!(image_id = %image.id, uploaded_by = %user.id, "Image uploaded");
    Ok((StatusCode::CREATED, Json(json!({ "id": image.id }))))
}

pub async fn get(
    _user: ActiveUser,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ImageSummary>, AppError> {
    let image = db::images::find_summary(&state.pool, id)
        .await?
        .ok_or_else(image_not_found)?;
    Ok(Json(image))
}

/// Raw image bytes. Unauthenticated so the URL can be used in an `<img>` tag.
pub async fn view(
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let image = db::images::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(image_not_found)?;

    Ok(([(header::CONTENT_TYPE, image.content_type)], image.data))
}

pub async fn delete(
    ActiveUser(user): ActiveUser,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<ImageSummary>, AppError> {
    let image = db::images::delete(&state.pool, id)
        .await
        .map_err(|e| AppError::from_delete(e, "Image"))?
        .ok_or_else(image_not_found)?;

    tracing::info!(image_id = %image.id, deleted_by = %user.id, "Image deleted");
    Ok(Json(image))
}
