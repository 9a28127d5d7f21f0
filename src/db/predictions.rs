use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::analysis::AnalysisResult;
use crate::models::{Prediction, PredictionDetail, PredictionRow};
use crate::pagination::Page;

pub struct NewPrediction<'a> {
    pub image_id: Uuid,
    pub owner_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub notes: Option<&'a str>,
    pub result: &'a AnalysisResult,
}

/// `notes: Some(None)` clears the notes.
#[derive(Debug, Default)]
pub struct PredictionPatch {
    pub description: Option<String>,
    pub conclusions: Option<String>,
    pub recommendations: Option<String>,
    pub medical_context: Option<String>,
    pub notes: Option<Option<String>>,
    pub confidence: Option<f64>,
    pub has_tumor: Option<bool>,
}

/// Listing filter. Both time bounds are inclusive.
#[derive(Debug, Default, Clone)]
pub struct PredictionFilter {
    pub has_tumor: Option<bool>,
    pub patient_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

const DETAIL_SELECT: &str = "SELECT p.*, \
    pt.full_name AS patient_full_name, \
    pt.birth_date AS patient_birth_date, \
    pt.external_id AS patient_external_id, \
    u.email AS owner_email, \
    u.full_name AS owner_full_name \
    FROM predictions p \
    LEFT JOIN patients pt ON pt.id = p.patient_id \
    LEFT JOIN users u ON u.id = p.owner_id";

pub async fn create(pool: &PgPool, new: &NewPrediction<'_>) -> Result<Prediction, sqlx::Error> {
    sqlx::query_as::<_, Prediction>(
        "INSERT INTO predictions (
            image_id, owner_id, patient_id, notes,
            description, conclusions, recommendations, medical_context,
            confidence, has_tumor, segmentation_mask
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING *",
    )
    .bind(new.image_id)
    .bind(new.owner_id)
    .bind(new.patient_id)
    .bind(new.notes)
    .bind(&new.result.description)
    .bind(&new.result.conclusions)
    .bind(&new.result.recommendations)
    .bind(&new.result.medical_context)
    .bind(new.result.confidence)
    .bind(new.result.has_tumor)
    .bind(new.result.segmentation_mask.as_deref())
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Prediction>, sqlx::Error> {
    sqlx::query_as::<_, Prediction>("SELECT * FROM predictions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_detail(pool: &PgPool, id: Uuid) -> Result<Option<PredictionDetail>, sqlx::Error> {
    let row = sqlx::query_as::<_, PredictionRow>(&format!("{DETAIL_SELECT} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(PredictionDetail::from))
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &PredictionFilter) {
    qb.push(" WHERE TRUE");
    if let Some(has_tumor) = filter.has_tumor {
        qb.push(" AND p.has_tumor = ").push_bind(has_tumor);
    }
    if let Some(patient_id) = filter.patient_id {
        qb.push(" AND p.patient_id = ").push_bind(patient_id);
    }
    if let Some(owner_id) = filter.owner_id {
        qb.push(" AND p.owner_id = ").push_bind(owner_id);
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND p.created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        qb.push(" AND p.created_at <= ").push_bind(to);
    }
}

pub async fn list(
    pool: &PgPool,
    filter: &PredictionFilter,
    page: Page,
) -> Result<(Vec<PredictionDetail>, i64), sqlx::Error> {
    let mut qb = QueryBuilder::<Postgres>::new(DETAIL_SELECT);
    push_filter(&mut qb, filter);
    qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());

    let rows = qb
        .build_query_as::<PredictionRow>()
        .fetch_all(pool)
        .await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM predictions p");
    push_filter(&mut count, filter);
    let total: (i64,) = count.build_query_as().fetch_one(pool).await?;

    Ok((rows.into_iter().map(PredictionDetail::from).collect(), total.0))
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    patch: &PredictionPatch,
) -> Result<Option<Prediction>, sqlx::Error> {
    sqlx::query_as::<_, Prediction>(
        "UPDATE predictions SET
            description = COALESCE($2, description),
            conclusions = COALESCE($3, conclusions),
            recommendations = COALESCE($4, recommendations),
            medical_context = COALESCE($5, medical_context),
            notes = CASE WHEN $6 THEN $7 ELSE notes END,
            confidence = COALESCE($8, confidence),
            has_tumor = COALESCE($9, has_tumor),
            updated_at = clock_timestamp()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(patch.description.as_deref())
    .bind(patch.conclusions.as_deref())
    .bind(patch.recommendations.as_deref())
    .bind(patch.medical_context.as_deref())
    .bind(patch.notes.is_some())
    .bind(patch.notes.clone().flatten())
    .bind(patch.confidence)
    .bind(patch.has_tumor)
    .fetch_optional(pool)
    .await
}

pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM predictions")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<Prediction>, sqlx::Error> {
    sqlx::query_as::<_, Prediction>("DELETE FROM predictions WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(pool)
        .await
}
