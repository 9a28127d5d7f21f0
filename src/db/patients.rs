use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Patient;
use crate::pagination::Page;

pub struct NewPatient<'a> {
    pub full_name: &'a str,
    pub birth_date: NaiveDate,
    pub external_id: Option<&'a str>,
}

/// `external_id: Some(None)` clears the column.
#[derive(Debug, Default)]
pub struct PatientPatch {
    pub full_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub external_id: Option<Option<String>>,
}

#[derive(Debug, Default)]
pub struct PatientFilter {
    /// Case-insensitive substring of the full name or external id.
    pub search: Option<String>,
}

pub async fn create(pool: &PgPool, new: &NewPatient<'_>) -> Result<Patient, sqlx::Error> {
    sqlx::query_as::<_, Patient>(
        "INSERT INTO patients (full_name, birth_date, external_id)
         VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(new.full_name)
    .bind(new.birth_date)
    .bind(new.external_id)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Patient>, sqlx::Error> {
    sqlx::query_as::<_, Patient>("SELECT * FROM patients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list(
    pool: &PgPool,
    filter: &PatientFilter,
    page: Page,
) -> Result<(Vec<Patient>, i64), sqlx::Error> {
    let pattern = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(super::contains_pattern);

    let patients = sqlx::query_as::<_, Patient>(
        "SELECT * FROM patients
         WHERE ($1::text IS NULL OR full_name ILIKE $1 OR external_id ILIKE $1)
         ORDER BY full_name, id
         LIMIT $2 OFFSET $3",
    )
    .bind(pattern.as_deref())
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM patients
         WHERE ($1::text IS NULL OR full_name ILIKE $1 OR external_id ILIKE $1)",
    )
    .bind(pattern.as_deref())
    .fetch_one(pool)
    .await?;

    Ok((patients, row.0))
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    patch: &PatientPatch,
) -> Result<Option<Patient>, sqlx::Error> {
    sqlx::query_as::<_, Patient>(
        "UPDATE patients SET
            full_name = COALESCE($2, full_name),
            birth_date = COALESCE($3, birth_date),
            external_id = CASE WHEN $4 THEN $5 ELSE external_id END,
            updated_at = now()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(patch.full_name.as_deref())
    .bind(patch.birth_date)
    .bind(patch.external_id.is_some())
    .bind(patch.external_id.clone().flatten())
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<Patient>, sqlx::Error> {
    sqlx::query_as::<_, Patient>("DELETE FROM patients WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(pool)
        .await
}
