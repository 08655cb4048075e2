//! Image → inventory record extraction.
//!
//! The model is told to answer with a bare JSON object, but it still wraps the
//! object in prose or code fences from time to time. The response is normalised by
//! slicing from the first `{` to the last `}` before parsing. That slice is not a
//! real parser: stray braces in the surrounding prose will break it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GenerativeModel, PromptPart};
use crate::media::UploadedImage;

pub const ITEM_KEY: &str = "elemento_identificado";
pub const QUANTITY_KEY: &str = "cantidad_aproximada";
pub const CONDITION_KEY: &str = "estado_condicion";
pub const FEATURES_KEY: &str = "caracteristicas_distintivas";
pub const CATEGORY_KEY: &str = "posible_categoria_de_inventario";
pub const BRAND_KEY: &str = "marca_modelo_sugerido";

pub const RECORD_KEYS: [&str; 6] = [
    ITEM_KEY,
    QUANTITY_KEY,
    CONDITION_KEY,
    FEATURES_KEY,
    CATEGORY_KEY,
    BRAND_KEY,
];

pub const BRAND_NOT_VISIBLE: &str = "not visible";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    #[serde(rename = "elemento_identificado")]
    pub identified_item: String,
    #[serde(rename = "cantidad_aproximada")]
    pub approximate_quantity: u64,
    #[serde(rename = "estado_condicion")]
    pub condition: String,
    #[serde(rename = "caracteristicas_distintivas")]
    pub distinctive_features: String,
    #[serde(rename = "posible_categoria_de_inventario")]
    pub category: String,
    #[serde(rename = "marca_modelo_sugerido")]
    pub brand_or_model: String,
}

/// Outcome of one extraction call. Raw model text is kept on every parse failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Success(Value),
    MalformedResponse(String),
    NoJsonFound(String),
    TransportError(String),
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success(_))
    }

    /// Typed view of a successful extraction. `None` for failures; `Some(Err(_))`
    /// when the object parsed but does not fit the six-field schema.
    pub fn record(&self) -> Option<Result<InventoryRecord, serde_json::Error>> {
        match self {
            ExtractionResult::Success(value) => Some(InventoryRecord::deserialize(value)),
            _ => None,
        }
    }

    /// Schema keys absent from a successful extraction.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        match self {
            ExtractionResult::Success(Value::Object(map)) => RECORD_KEYS
                .iter()
                .copied()
                .filter(|key| !map.contains_key(*key))
                .collect(),
            ExtractionResult::Success(_) => RECORD_KEYS.to_vec(),
            _ => Vec::new(),
        }
    }
}

pub fn build_prompt(hint: &str) -> String {
    format!(
        "Analyze this image of an inventory item.\n\
         Additional description from the detection system: \"{hint}\"\n\
         \n\
         Act as an expert cataloguer. Your only output must be a valid JSON object with exactly these keys:\n\
         - \"{ITEM_KEY}\": (string) The specific, descriptive name of the object.\n\
         - \"{QUANTITY_KEY}\": (integer) The number of units you can see. If there is only one, use 1.\n\
         - \"{CONDITION_KEY}\": (string) The apparent condition (e.g. \"New in packaging\", \"Used, light marks\", \"Loose component\").\n\
         - \"{FEATURES_KEY}\": (string) A comma-separated list of key visual features (e.g. \"Red, metal housing, USB-C connector\").\n\
         - \"{CATEGORY_KEY}\": (string) The most logical inventory category (e.g. \"Electronic components\", \"Hardware\", \"Office supplies\").\n\
         - \"{BRAND_KEY}\": (string) The brand and/or model if visible (e.g. \"Sony WH-1000XM4\"). Otherwise \"{BRAND_NOT_VISIBLE}\".\n\
         \n\
         IMPORTANT: Reply with the JSON object only. No extra text, no explanations, no ```json fences."
    )
}

/// Slice from the first `{` to the last `}` inclusive.
pub fn locate_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    // "} ... {" has both braces but no object; the empty slice fails to parse
    Some(text.get(start..=end).unwrap_or(""))
}

/// Turns raw model text into an extraction result.
pub fn parse_response(raw: &str) -> ExtractionResult {
    if raw.is_empty() {
        return ExtractionResult::TransportError("empty response".to_string());
    }

    let Some(candidate) = locate_json_object(raw) else {
        log::error!("No JSON object found in model response. Raw: {}", raw);
        return ExtractionResult::NoJsonFound(raw.to_string());
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => ExtractionResult::Success(value),
        Err(e) => {
            log::error!("Model returned malformed JSON ({}). Raw: {}", e, raw);
            ExtractionResult::MalformedResponse(raw.to_string())
        }
    }
}

pub struct VisionPipeline<'a> {
    model: &'a dyn GenerativeModel,
}

impl<'a> VisionPipeline<'a> {
    pub fn new(model: &'a dyn GenerativeModel) -> Self {
        Self { model }
    }

    /// Single attempt; transport failures are not retried.
    pub async fn extract(&self, image: &UploadedImage, hint: &str) -> ExtractionResult {
        let parts = vec![
            PromptPart::Text(build_prompt(hint)),
            image.to_prompt_part(),
        ];

        match self.model.generate(&parts).await {
            Ok(text) => parse_response(&text),
            Err(e) => {
                log::error!("Image analysis with {} failed: {}", self.model.model_name(), e);
                ExtractionResult::TransportError(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn prompt_embeds_hint_and_every_key() {
        let prompt = build_prompt("Pallet of \"boxes\" near dock 3");
        assert!(prompt.contains("Pallet of \"boxes\" near dock 3"));
        for key in RECORD_KEYS {
            assert!(prompt.contains(&format!("\"{}\"", key)), "missing {}", key);
        }
        assert!(prompt.contains("```json"));
    }

    #[test]
    fn object_surrounded_by_prose_is_extracted() {
        let raw = "Sure! Here is the result: {\"a\": {\"b\": [1, 2]}, \"c\": \"x\"} Hope it helps.";
        assert_eq!(
            parse_response(raw),
            ExtractionResult::Success(json!({"a": {"b": [1, 2]}, "c": "x"}))
        );
    }

    #[test]
    fn text_without_braces_is_no_json_found_verbatim() {
        let raw = "  I cannot identify this item.\n";
        assert_eq!(
            parse_response(raw),
            ExtractionResult::NoJsonFound(raw.to_string())
        );
        assert_eq!(
            parse_response("only an opening {"),
            ExtractionResult::NoJsonFound("only an opening {".to_string())
        );
        assert_eq!(
            parse_response("only a closing }"),
            ExtractionResult::NoJsonFound("only a closing }".to_string())
        );
    }

    #[test]
    fn invalid_slice_is_malformed_verbatim() {
        let raw = "{\"elemento_identificado\": \"box\", }";
        assert_eq!(
            parse_response(raw),
            ExtractionResult::MalformedResponse(raw.to_string())
        );
    }

    #[test]
    fn reversed_braces_are_malformed() {
        let raw = "} nothing here {";
        assert_eq!(
            parse_response(raw),
            ExtractionResult::MalformedResponse(raw.to_string())
        );
    }

    #[test]
    fn stray_closing_brace_after_object_breaks_the_slice() {
        // Known limitation of brace slicing
        let raw = "{\"a\": \"x\"} trailing note with a stray }";
        assert!(matches!(
            parse_response(raw),
            ExtractionResult::MalformedResponse(_)
        ));
    }

    #[test]
    fn empty_text_is_transport_error() {
        assert_eq!(
            parse_response(""),
            ExtractionResult::TransportError("empty response".to_string())
        );
        assert_eq!(
            parse_response("  \n"),
            ExtractionResult::NoJsonFound("  \n".to_string())
        );
    }

    #[test]
    fn fenced_record_strips_fence_and_types_cleanly() {
        let raw = "```json\n{\"elemento_identificado\":\"box\",\"cantidad_aproximada\":1,\
                   \"estado_condicion\":\"New\",\"caracteristicas_distintivas\":\"brown, cardboard\",\
                   \"posible_categoria_de_inventario\":\"Packaging\",\
                   \"marca_modelo_sugerido\":\"not visible\"}\n```";
        let result = parse_response(raw);
        assert!(result.is_success());
        assert!(result.missing_keys().is_empty());

        let record = result.record().unwrap().unwrap();
        assert_eq!(
            record,
            InventoryRecord {
                identified_item: "box".to_string(),
                approximate_quantity: 1,
                condition: "New".to_string(),
                distinctive_features: "brown, cardboard".to_string(),
                category: "Packaging".to_string(),
                brand_or_model: "not visible".to_string(),
            }
        );
    }

    #[test]
    fn loose_success_reports_missing_keys() {
        let result = parse_response("{\"elemento_identificado\": \"drill\"}");
        assert!(result.is_success());
        assert_eq!(result.missing_keys().len(), 5);
        assert!(result.record().unwrap().is_err());
    }

    #[test]
    fn negative_quantity_does_not_fit_the_record() {
        let result = ExtractionResult::Success(json!({
            "elemento_identificado": "bolt",
            "cantidad_aproximada": -3,
            "estado_condicion": "New",
            "caracteristicas_distintivas": "steel",
            "posible_categoria_de_inventario": "Hardware",
            "marca_modelo_sugerido": "not visible"
        }));
        assert!(result.missing_keys().is_empty());
        assert!(result.record().unwrap().is_err());
    }

    #[test]
    fn failures_have_no_record_view() {
        let result = ExtractionResult::NoJsonFound("nope".to_string());
        assert!(result.record().is_none());
        assert!(result.missing_keys().is_empty());
    }
}
