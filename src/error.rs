use thiserror::Error;

/// Startup-time failures. The binary exits non-zero on any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Gemini API key not configured (set GEMINI_API_KEY or gemini_api_key in config.json)")]
    MissingApiKey,

    #[error("Firebase service-account credentials not configured (set FIREBASE_CREDENTIALS or firebase_credentials in config.json)")]
    MissingStoreCredential,

    #[error("Invalid Firebase credentials: {0}")]
    InvalidStoreCredential(String),

    #[error("No compatible Gemini model could be initialized (tried: {})", .tried.join(", "))]
    NoModelAvailable { tried: Vec<String> },

    #[error("Failed to build HTTP client: {0}")]
    Http(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to write document: {0}")]
    Write(String),

    #[error("Failed to read documents: {0}")]
    Read(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Gemini request failed: {0}")]
    Request(String),

    #[error("Gemini API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse Gemini response: {0}")]
    Decode(String),
}
