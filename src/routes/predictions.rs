use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::ActiveUser;
use crate::db;
use crate::db::predictions::PredictionFilter;
use crate::error::AppError;
use crate::extract::{AppPath, AppQuery};
use crate::intake::parser;
use crate::intake::pipeline::{self, PredictionUpload};
use crate::models::{Prediction, PredictionDetail};
use crate::pagination::{Page, PageParams, Paginated};
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub has_tumor: Option<bool>,
    pub patient_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Clone, Copy)]
enum Bound {
    Lower,
    Upper,
}

/// Parse a `created_from`/`created_to` value. RFC 3339 timestamps are taken
/// as given; a bare `YYYY-MM-DD` covers the whole UTC day.
fn parse_bound(raw: &str, bound: Bound) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date '{raw}': expected YYYY-MM-DD or RFC 3339"))?;
    let time = match bound {
        Bound::Lower => NaiveTime::MIN,
        Bound::Upper => NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)
            .ok_or_else(|| "Invalid end-of-day time".to_string())?,
    };
    Ok(date.and_time(time).and_utc())
}

/// Build the listing filter, applying the ownership rule: non-superusers
/// only ever see their own predictions.
fn build_filter(query: &ListQuery, caller: &ActiveUser) -> Result<PredictionFilter, AppError> {
    let created_from = query
        .created_from
        .as_deref()
        .map(|raw| parse_bound(raw, Bound::Lower))
        .transpose()
        .map_err(AppError::BadRequest)?;
    let created_to = query
        .created_to
        .as_deref()
        .map(|raw| parse_bound(raw, Bound::Upper))
        .transpose()
        .map_err(AppError::BadRequest)?;

    if let (Some(from), Some(to)) = (created_from, created_to) {
        if from > to {
            return Err(AppError::BadRequest(
                "created_from must not be after created_to".to_string(),
            ));
        }
    }

    let owner_id = if caller.0.is_superuser {
        query.owner_id
    } else {
        match query.owner_id {
            Some(owner) if owner != caller.0.id => {
                return Err(AppError::Forbidden(
                    "Not enough permissions to list another user's predictions".to_string(),
                ));
            }
            _ => Some(caller.0.id),
        }
    };

    Ok(PredictionFilter {
        has_tumor: query.has_tumor,
        patient_id: query.patient_id,
        owner_id,
        created_from,
        created_to,
    })
}

fn prediction_not_found() -> AppError {
    AppError::NotFound("Prediction not found".to_string())
}

fn forbidden() -> AppError {
    AppError::Forbidden("Not enough permissions".to_string())
}

pub async fn list(
    caller: ActiveUser,
    State(state): State<SharedState>,
    AppQuery(query): AppQuery<ListQuery>,
) -> Result<Json<Paginated<PredictionDetail>>, AppError> {
    let filter = build_filter(&query, &caller)?;
    let page = Page::from(&PageParams {
        page: query.page,
        size: query.size,
    });

    let (items, total) = db::predictions::list(&state.pool, &filter, page).await?;
    Ok(Json(Paginated::new(items, total, page)))
}

pub async fn create(
    ActiveUser(user): ActiveUser,
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<PredictionDetail>), AppError> {
    let form = parser::parse_multipart(&headers, body)
        .await
        .map_err(AppError::BadRequest)?;
    let upload = PredictionUpload::from_form(form).map_err(AppError::BadRequest)?;

    let detail = pipeline::run(&state, &user, upload).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get(
    caller: ActiveUser,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<PredictionDetail>, AppError> {
    let detail = db::predictions::find_detail(&state.pool, id)
        .await?
        .ok_or_else(prediction_not_found)?;

    if !caller.can_access(detail.prediction.owner_id) {
        return Err(forbidden());
    }
    Ok(Json(detail))
}

pub async fn delete(
    caller: ActiveUser,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Prediction>, AppError> {
    let prediction = db::predictions::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(prediction_not_found)?;

    if !caller.can_access(prediction.owner_id) {
        return Err(forbidden());
    }

    let deleted = db::predictions::delete(&state.pool, prediction.id)
        .await?
        .ok_or_else(prediction_not_found)?;

    tracing::info!(prediction_id = %deleted.id, deleted_by = %caller.0.id, "Prediction deleted");
    Ok(Json(deleted))
}
