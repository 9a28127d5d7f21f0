//! The image-analysis collaborator.
//!
//! `ImageAnalyzer` is what the prediction pipeline talks to. The production
//! implementation is a `VisionAnalyzer` wrapping a `VisionModel` (a raw
//! chat-completions call returning text) and decoding its answer strictly.

pub mod decode;
pub mod openrouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use openrouter::OpenRouterVision;

/// Structured result of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub description: String,
    pub conclusions: String,
    pub recommendations: String,
    pub medical_context: String,
    pub confidence: f64,
    pub has_tumor: bool,
    #[serde(default)]
    pub segmentation_mask: Option<String>,
}

#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, image: &[u8], content_type: &str) -> Result<AnalysisResult, String>;
}

/// A vision-capable language model: one prompt plus one image in, text out.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        image: &[u8],
        content_type: &str,
    ) -> Result<String, String>;

    fn model_name(&self) -> &str;
}

pub const ANALYSIS_PROMPT: &str = r#"Analyze this brain MRI image. Determine whether it shows signs of a tumor or other pathology.

Reply with JSON ONLY, using exactly this structure:
{
  "description": "what is visible in the image",
  "conclusions": "analysis of the findings",
  "recommendations": "recommended next steps",
  "medical_context": "relevant medical context",
  "confidence": a number from 0 to 1,
  "has_tumor": true or false,
  "segmentation_mask": null
}"#;

pub struct VisionAnalyzer<M> {
    model: M,
}

impl<M: VisionModel> VisionAnalyzer<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M: VisionModel> ImageAnalyzer for VisionAnalyzer<M> {
    async fn analyze(&self, image: &[u8], content_type: &str) -> Result<AnalysisResult, String> {
        let text = self
            .model
            .complete(ANALYSIS_PROMPT, image, content_type)
            .await?;

        decode::decode_result(&text).map_err(|e| {
            tracing::warn!(model = self.model.model_name(), "Undecodable analysis reply: {e}");
            e
        })
    }
}
