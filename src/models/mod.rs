mod image;
mod patient;
mod prediction;
mod user;

pub use image::{Image, ImageSummary};
pub use patient::{Patient, PatientSummary};
pub use prediction::{OwnerSummary, Prediction, PredictionDetail};
pub(crate) use prediction::PredictionRow;
pub use user::User;
