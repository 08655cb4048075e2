pub mod assistant;
pub mod gemini;
pub mod retry;
pub mod vision;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// One piece of a multimodal request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PromptPart {
    Text(String),
    InlineImage {
        mime_type: String,
        base64_data: String,
    },
}

/// A configured generative model. Single request, single text response, no streaming.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, parts: &[PromptPart]) -> Result<String, ModelError>;
}
