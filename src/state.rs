use async_openai::config::{AzureConfig, OpenAIConfig};
use log::{info, warn};
use std::sync::Arc;

use crate::chat_service::ChatService;
use crate::config::InferenceConfig;

/// Backends are optional: an unconfigured one answers its routes with a
/// server error instead of keeping the server from starting.
#[derive(Clone, Default)]
pub struct AppState {
    pub azure: Option<Arc<ChatService<AzureConfig>>>,
    pub openai: Option<Arc<ChatService<OpenAIConfig>>>,
}

impl AppState {
    pub fn from_env() -> Self {
        match InferenceConfig::from_env() {
            Ok(config) => {
                info!(
                    "Chat backends configured for {} at {}",
                    config.deployment, config.endpoint
                );
                Self::from_config(&config)
            }
            Err(e) => {
                warn!("{}; chat routes will be unavailable", e);
                Self::default()
            }
        }
    }

    pub fn from_config(config: &InferenceConfig) -> Self {
        Self {
            azure: Some(Arc::new(ChatService::azure(config))),
            openai: Some(Arc::new(ChatService::openai_compatible(config))),
        }
    }
}
