use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PatientSummary;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub image_id: Uuid,
    pub owner_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub description: String,
    pub conclusions: String,
    pub recommendations: String,
    pub medical_context: String,
    pub notes: Option<String>,
    pub confidence: f64,
    pub has_tumor: bool,
    pub segmentation_mask: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
}

/// A prediction with its patient and owner resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionDetail {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub patient: Option<PatientSummary>,
    pub owner: Option<OwnerSummary>,
}

/// Flat row produced by the joined prediction queries.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PredictionRow {
    #[sqlx(flatten)]
    pub prediction: Prediction,
    pub patient_full_name: Option<String>,
    pub patient_birth_date: Option<NaiveDate>,
    pub patient_external_id: Option<String>,
    pub owner_email: Option<String>,
    pub owner_full_name: Option<String>,
}

impl From<PredictionRow> for PredictionDetail {
    fn from(row: PredictionRow) -> Self {
        let patient = match (
            row.prediction.patient_id,
            row.patient_full_name,
            row.patient_birth_date,
        ) {
            (Some(id), Some(full_name), Some(birth_date)) => Some(PatientSummary {
                id,
                full_name,
                birth_date,
                external_id: row.patient_external_id,
            }),
            _ => None,
        };

        let owner = row.owner_email.map(|email| OwnerSummary {
            id: row.prediction.owner_id,
            email,
            full_name: row.owner_full_name,
        });

        PredictionDetail {
            prediction: row.prediction,
            patient,
            owner,
        }
    }
}
