use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerativeModel, PromptPart};
use crate::error::ModelError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate; empty when the model produced none.
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

fn to_gemini_parts(parts: &[PromptPart]) -> Vec<GeminiPart<'_>> {
    parts
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => GeminiPart::Text { text },
            PromptPart::InlineImage {
                mime_type,
                base64_data,
            } => GeminiPart::Inline {
                inline_data: InlineData {
                    mime_type,
                    data: base64_data,
                },
            },
        })
        .collect()
}

/// Connection settings shared by every model handle.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Checks that `model` exists and is visible to this API key.
    pub async fn probe(&self, model: &str) -> Result<(), ModelError> {
        let url = format!("{}/models/{}", self.base_url, model);

        let response = self
            .http
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    pub fn model(&self, name: &str) -> GeminiModel {
        GeminiModel {
            client: self.clone(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiModel {
    client: GeminiClient,
    name: String,
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, parts: &[PromptPart]) -> Result<String, ModelError> {
        let request = GenerateRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: to_gemini_parts(parts),
            }],
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.client.base_url, self.name
        );

        let response = self
            .client
            .http
            .post(&url)
            .header("x-goog-api-key", &self.client.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;

        Ok(body.into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_matches_generate_content_shape() {
        let parts = vec![
            PromptPart::Text("describe".to_string()),
            PromptPart::InlineImage {
                mime_type: "image/png".to_string(),
                base64_data: "AAAA".to_string(),
            },
        ];
        let request = GenerateRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: to_gemini_parts(&parts),
            }],
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "text": "describe" },
                        { "inline_data": { "mime_type": "image/png", "data": "AAAA" } }
                    ]
                }]
            })
        );
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(body.into_text(), "{\"a\":1}");
    }

    #[test]
    fn blocked_response_yields_empty_text() {
        let body: GenerateResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();
        assert_eq!(body.into_text(), "");
    }
}
