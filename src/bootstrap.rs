use async_trait::async_trait;
use reqwest::Client;

use crate::ai::gemini::GeminiClient;
use crate::ai::GenerativeModel;
use crate::config::AppConfig;
use crate::error::{ConfigError, ModelError};
use crate::tasks::firestore::FirestoreClient;
use crate::tasks::DocumentStore;

/// Clients built once at startup and handed to every pipeline by reference.
pub struct Services {
    pub config: AppConfig,
    pub model: Box<dyn GenerativeModel>,
    pub store: Box<dyn DocumentStore>,
}

#[async_trait]
pub trait ModelProbe: Send + Sync {
    async fn probe(&self, model: &str) -> Result<(), ModelError>;
}

#[async_trait]
impl ModelProbe for GeminiClient {
    async fn probe(&self, model: &str) -> Result<(), ModelError> {
        GeminiClient::probe(self, model).await
    }
}

/// First candidate, in order, that the probe accepts.
pub async fn select_model(
    probe: &dyn ModelProbe,
    candidates: &[String],
) -> Result<String, ConfigError> {
    for name in candidates {
        match probe.probe(name).await {
            Ok(()) => {
                log::info!("Vision model '{}' initialized", name);
                return Ok(name.clone());
            }
            Err(e) => {
                log::warn!("Model '{}' unavailable or incompatible: {}", name, e);
            }
        }
    }

    Err(ConfigError::NoModelAvailable {
        tried: candidates.to_vec(),
    })
}

pub async fn connect(config: AppConfig) -> Result<Services, ConfigError> {
    let secrets = config.secrets()?;

    let http = Client::builder()
        .user_agent(concat!("rpa-dashboard/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ConfigError::Http(e.to_string()))?;

    let store = FirestoreClient::new(
        http.clone(),
        &config.firestore_base_url,
        secrets.service_account,
    )?;

    let gemini = GeminiClient::new(http, &config.gemini_base_url, &secrets.gemini_api_key);
    let model_name = select_model(&gemini, &config.model_candidates).await?;

    Ok(Services {
        model: Box::new(gemini.model(&model_name)),
        store: Box::new(store),
        config,
    })
}
