pub mod ai;
pub mod bootstrap;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod media;
pub mod tasks;

pub use ai::vision::{ExtractionResult, InventoryRecord};
pub use bootstrap::Services;
pub use config::AppConfig;
pub use error::{ConfigError, ModelError, StoreError};

/// Loads configuration, validates secrets and builds the shared clients.
pub async fn start() -> Result<Services, ConfigError> {
    let config_dir = config::config_dir();
    let app_config = AppConfig::load(&config_dir);
    log::info!("Configuration loaded from {}", config_dir.display());
    bootstrap::connect(app_config).await
}
