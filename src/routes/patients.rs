use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::ActiveUser;
use crate::db;
use crate::db::patients::{NewPatient, PatientFilter, PatientPatch};
use crate::error::AppError;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::models::Patient;
use crate::pagination::{Page, PageParams, Paginated};
use crate::state::SharedState;

use super::double_option;

#[derive(Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreatePatient {
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub external_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdatePatient {
    pub full_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "double_option")]
    pub external_id: Option<Option<String>>,
}

fn patient_not_found() -> AppError {
    AppError::NotFound("Patient not found".to_string())
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("full_name must not be empty".to_string()));
    }
    Ok(())
}

pub async fn list(
    _user: ActiveUser,
    State(state): State<SharedState>,
    AppQuery(query): AppQuery<ListQuery>,
) -> Result<Json<Paginated<Patient>>, AppError> {
    let page = Page::from(&PageParams {
        page: query.page,
        size: query.size,
    });
    let filter = PatientFilter {
        search: query.search,
    };
    let (patients, total) = db::patients::list(&state.pool, &filter, page).await?;
    Ok(Json(Paginated::new(patients, total, page)))
}

pub async fn create(
    ActiveUser(user): ActiveUser,
    State(state): State<SharedState>,
    AppJson(req): AppJson<CreatePatient>,
) -> Result<(StatusCode, Json<Patient>), AppError> {
    validate_name(&req.full_name)?;

    let patient = db::patients::create(
        &state.pool,
        &NewPatient {
            full_name: req.full_name.trim(),
            birth_date: req.birth_date,
            external_id: req.external_id.as_deref(),
        },
    )
    .await?;

    tracing::info!(patient_id = %patient.id, created_by = %user.id, "Patient created");
    Ok((StatusCode::CREATED, Json(patient)))
}

pub async fn get(
    _user: ActiveUser,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Patient>, AppError> {
    let patient = db::patients::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(patient_not_found)?;
    Ok(Json(patient))
}

pub async fn update(
    _user: ActiveUser,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(req): AppJson<UpdatePatient>,
) -> Result<Json<Patient>, AppError> {
    if let Some(ref name) = req.full_name {
        validate_name(name)?;
    }

    let patch = PatientPatch {
        full_name: req.full_name.map(|n| n.trim().to_string()),
        birth_date: req.birth_date,
        external_id: req.external_id,
    };

    let patient = db::patients::update(&state.pool, id, &patch)
        .await?
        .ok_or_else(patient_not_found)?;
    Ok(Json(patient))
}

pub async fn delete(
    ActiveUser(user): ActiveUser,
    State(state): State<SharedState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<Patient>, AppError> {
    let patient = db::patients::delete(&state.pool, id)
        .await
        .map_err(|e| AppError::from_delete(e, "Patient"))?
        .ok_or_else(patient_not_found)?;

    tracing::info!(patient_id = %patient.id, deleted_by = %user.id, "Patient deleted");
    Ok(Json(patient))
}
