use uuid::Uuid;

use crate::db;
use crate::db::predictions::NewPrediction;
use crate::error::AppError;
use crate::models::{PredictionDetail, User};
use crate::state::SharedState;

use super::parser::{UploadForm, UploadedFile};
use super::validate;

/// The fields of a prediction request, lifted out of the multipart form.
#[derive(Debug)]
pub struct PredictionUpload {
    pub file: UploadedFile,
    pub notes: Option<String>,
    pub patient_id: Option<Uuid>,
}

impl PredictionUpload {
    pub fn from_form(mut form: UploadForm) -> Result<Self, String> {
        let patient_id = form
            .text("patient_id")
            .map(|raw| {
                raw.parse::<Uuid>()
                    .map_err(|_| format!("Invalid patient_id '{raw}'"))
            })
            .transpose()?;
        let notes = form.text("notes").map(str::to_string);
        let file = form.take_file()?;

        Ok(Self {
            file,
            notes,
            patient_id,
        })
    }
}

/// Validate, store the image, analyze it and store the prediction. The first
/// failing step ends the run. An image stored before a failed analysis is kept.
pub async fn run(
    state: &SharedState,
    owner: &User,
    upload: PredictionUpload,
) -> Result<PredictionDetail, AppError> {
    if let Some(patient_id) = upload.patient_id {
        db::patients::find_by_id(&state.pool, patient_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Patient not found".to_string()))?;
    }

    let file = &upload.file;
    let content_type =
        validate::validate_image(&file.filename, file.content_type.as_deref(), &file.data)
            .map_err(AppError::BadRequest)?;

    let image = db::images::create(&state.pool, &file.filename, content_type, &file.data).await?;
    tracing::info!(image_id = %image.id, size = file.data.len(), "Stored upload");

    let timeout = state.config.analysis.timeout;
    let analysis = state.analyzer.analyze(&file.data, content_type);
    let result = match tokio::time::timeout(timeout, analysis).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => return Err(AppError::AnalysisFailed(format!("image {}: {e}", image.id))),
        Err(_) => {
            return Err(AppError::AnalysisFailed(format!(
                "image {}: timed out after {}s",
                image.id,
                timeout.as_secs()
            )));
        }
    };

    let prediction = db::predictions::create(
        &state.pool,
        &NewPrediction {
            image_id: image.id,
            owner_id: owner.id,
            patient_id: upload.patient_id,
            notes: upload.notes.as_deref(),
            result: &result,
        },
    )
    .await?;

    tracing::info!(
        prediction_id = %prediction.id,
        has_tumor = prediction.has_tumor,
        confidence = prediction.confidence,
        "Prediction stored"
    );

    db::predictions::find_detail(&state.pool, prediction.id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("Prediction {} vanished", prediction.id)))
}
