use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::retry::RetryPolicy;
use crate::error::ConfigError;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub model_candidates: Vec<String>,
    /// Service-account JSON, either inline as an object or as a string holding raw
    /// or base64-encoded JSON.
    pub firebase_credentials: Option<serde_json::Value>,
    pub firestore_base_url: String,
    pub task_collection: String,
    pub assistant_max_attempts: u32,
    pub assistant_base_delay_secs: u64,
    pub max_image_width: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model_candidates: vec![
                "gemini-1.5-flash-latest".to_string(),
                "gemini-1.5-pro-latest".to_string(),
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-pro".to_string(),
            ],
            firebase_credentials: None,
            firestore_base_url: "https://firestore.googleapis.com/v1".to_string(),
            task_collection: "rpa_tasks".to_string(),
            assistant_max_attempts: 3,
            assistant_base_delay_secs: 2,
            max_image_width: 1280,
        }
    }
}

/// Where `config.json` lives: `$RPA_DASHBOARD_HOME`, else the platform config dir.
pub fn config_dir() -> PathBuf {
    if let Ok(home) = std::env::var("RPA_DASHBOARD_HOME") {
        if !home.is_empty() {
            return PathBuf::from(home);
        }
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rpa-dashboard")
}

impl AppConfig {
    pub fn load(config_dir: &Path) -> Self {
        let mut config = Self::load_file(config_dir);

        // Secrets from the environment win over anything on disk
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                config.gemini_api_key = key;
            }
        }
        if let Ok(creds) = std::env::var("FIREBASE_CREDENTIALS") {
            if !creds.trim().is_empty() {
                config.firebase_credentials = Some(serde_json::Value::String(creds));
            }
        }

        config
    }

    /// Reads `config.json` without consulting the environment. A missing file is
    /// created with defaults.
    pub fn load_file(config_dir: &Path) -> Self {
        let config_path = config_dir.join("config.json");
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                    log::warn!("Ignoring unreadable {}: {}", config_path.display(), e);
                    Self::default()
                }),
                Err(e) => {
                    log::warn!("Failed to read {}: {}", config_path.display(), e);
                    Self::default()
                }
            }
        } else {
            let c = Self::default();
            c.save(config_dir);
            c
        }
    }

    pub fn save(&self, config_dir: &Path) {
        if let Err(e) = std::fs::create_dir_all(config_dir) {
            log::warn!("Failed to create {}: {}", config_dir.display(), e);
            return;
        }
        let config_path = config_dir.join("config.json");
        if let Ok(content) = serde_json::to_string_pretty(self) {
            std::fs::write(config_path, content).ok();
        }
    }

    /// Startup validation. Nothing touches the network here.
    pub fn secrets(&self) -> Result<Secrets, ConfigError> {
        let api_key = self.gemini_api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let raw = self
            .firebase_credentials
            .as_ref()
            .ok_or(ConfigError::MissingStoreCredential)?;

        Ok(Secrets {
            gemini_api_key: api_key.to_string(),
            service_account: ServiceAccount::from_value(raw)?,
        })
    }

    pub fn assistant_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::linear(
            self.assistant_max_attempts,
            Duration::from_secs(self.assistant_base_delay_secs),
        )
    }
}

#[derive(Debug, Clone)]
pub struct Secrets {
    pub gemini_api_key: String,
    pub service_account: ServiceAccount,
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

// Keeps the private key out of logs.
impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let object = match value {
            serde_json::Value::Object(_) => value.clone(),
            serde_json::Value::String(s) => decode_credential_blob(s)?,
            serde_json::Value::Null => return Err(ConfigError::MissingStoreCredential),
            other => {
                return Err(ConfigError::InvalidStoreCredential(format!(
                    "expected an object or a string, got {}",
                    other
                )))
            }
        };

        let mut account: ServiceAccount = serde_json::from_value(object)
            .map_err(|e| ConfigError::InvalidStoreCredential(e.to_string()))?;

        for (name, field) in [
            ("project_id", &account.project_id),
            ("client_email", &account.client_email),
            ("private_key", &account.private_key),
        ] {
            if field.trim().is_empty() {
                return Err(ConfigError::InvalidStoreCredential(format!("{} is empty", name)));
            }
        }

        // Secret stores often flatten the PEM onto one line with escaped newlines
        account.private_key = account.private_key.replace("\\n", "\n");
        Ok(account)
    }
}

fn decode_credential_blob(blob: &str) -> Result<serde_json::Value, ConfigError> {
    let blob = blob.trim();
    if blob.is_empty() {
        return Err(ConfigError::MissingStoreCredential);
    }

    let json = if blob.starts_with('{') {
        blob.to_string()
    } else {
        let bytes = STANDARD
            .decode(blob)
            .map_err(|e| ConfigError::InvalidStoreCredential(format!("bad base64: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| ConfigError::InvalidStoreCredential(format!("not UTF-8: {}", e)))?
    };

    serde_json::from_str(&json)
        .map_err(|e| ConfigError::InvalidStoreCredential(format!("bad JSON: {}", e)))
}
