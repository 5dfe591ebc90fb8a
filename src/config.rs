use std::env;
use thiserror::Error;

pub const DEFAULT_API_VERSION: &str = "2025-04-01-preview";
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_CHAT_API_URL: &str = "http://127.0.0.1:3000/api/chat/stream";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

pub const SYSTEM_PROMPT: &str = r#"Assistant helps the user with cooking questions. Be brief in your answers. Answer only plain text, DO NOT use Markdown.

After your answer, ALWAYS generate 3 very brief follow-up questions that the user would likely ask next, based on the context.
Enclose the follow-up questions in double angle brackets. Example:
<<What ingredients I need to bake cookies?>>
<<What flavour can I use in my cookies?>>
<<How long should I put it in the oven?>>

Do no repeat questions that have already been asked.
Make sure the last question ends with ">>".
"#;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVar(String),
}

/// Connection settings for the inference endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    pub endpoint: String,
    pub deployment: String,
    pub api_key: String,
    pub api_version: String,
    pub system_prompt: String,
    pub temperature: f32,
}

impl InferenceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: required("AZURE_AI_ENDPOINT")?,
            deployment: required("AZURE_AI_DEPLOYMENT_NAME")?,
            api_key: required("AZURE_AI_API_KEY")?,
            api_version: optional("AZURE_AI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            system_prompt: optional("CHAT_SYSTEM_PROMPT")
                .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
            temperature: DEFAULT_TEMPERATURE,
        })
    }
}

pub fn server_addr() -> String {
    optional("SERVER_ADDR").unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string())
}

pub fn chat_api_url() -> String {
    optional("CHAT_API_URL").unwrap_or_else(|| DEFAULT_CHAT_API_URL.to_string())
}

fn required(var: &str) -> Result<String, ConfigError> {
    optional(var).ok_or_else(|| ConfigError::MissingEnvironmentVar(var.to_string()))
}

// empty counts as unset
fn optional(var: &str) -> Option<String> {
    env::var(var).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
pub(crate) mod test_env {
    use once_cell::sync::Lazy;
    use std::collections::HashMap;
    use std::env;
    use tokio::sync::Mutex;

    // global mutex for environment variable operations
    pub static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    /// Sets or clears variables for the lifetime of the guard.
    pub struct EnvVarGuard {
        previous_values: HashMap<String, Option<String>>,
    }

    impl EnvVarGuard {
        pub fn new(vars: &[(&str, Option<&str>)]) -> Self {
            let mut previous_values = HashMap::new();
            for (var, value) in vars {
                previous_values.insert(var.to_string(), env::var(var).ok());
                match value {
                    Some(value) => env::set_var(var, value),
                    None => env::remove_var(var),
                }
            }
            Self { previous_values }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            for (var, value) in &self.previous_values {
                match value {
                    Some(value) => env::set_var(var, value),
                    None => env::remove_var(var),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_env::{EnvVarGuard, ENV_MUTEX};
    use super::*;

    #[tokio::test]
    async fn test_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().await;
        let _guard = EnvVarGuard::new(&[
            ("AZURE_AI_ENDPOINT", Some("https://example.openai.azure.com")),
            ("AZURE_AI_DEPLOYMENT_NAME", Some("gpt-4o-mini")),
            ("AZURE_AI_API_KEY", Some("test_key")),
            ("AZURE_AI_API_VERSION", None),
            ("CHAT_SYSTEM_PROMPT", None),
        ]);

        let config = InferenceConfig::from_env().expect("Config should load");
        assert_eq!(config.endpoint, "https://example.openai.azure.com");
        assert_eq!(config.deployment, "gpt-4o-mini");
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.system_prompt, SYSTEM_PROMPT);
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let _lock = ENV_MUTEX.lock().await;
        let _guard = EnvVarGuard::new(&[
            ("AZURE_AI_ENDPOINT", None),
            ("AZURE_AI_DEPLOYMENT_NAME", Some("gpt-4o-mini")),
            ("AZURE_AI_API_KEY", Some("test_key")),
        ]);

        assert_eq!(
            InferenceConfig::from_env(),
            Err(ConfigError::MissingEnvironmentVar("AZURE_AI_ENDPOINT".to_string()))
        );
    }

    #[tokio::test]
    async fn test_blank_value_counts_as_missing() {
        let _lock = ENV_MUTEX.lock().await;
        let _guard = EnvVarGuard::new(&[
            ("AZURE_AI_ENDPOINT", Some("https://example.openai.azure.com")),
            ("AZURE_AI_DEPLOYMENT_NAME", Some("  ")),
            ("AZURE_AI_API_KEY", Some("test_key")),
        ]);

        let result = InferenceConfig::from_env();
        assert!(
            matches!(result, Err(ConfigError::MissingEnvironmentVar(ref var)) if var == "AZURE_AI_DEPLOYMENT_NAME"),
            "Blank deployment should be reported missing: {:?}",
            result
        );
    }

    #[tokio::test]
    async fn test_overrides() {
        let _lock = ENV_MUTEX.lock().await;
        let _guard = EnvVarGuard::new(&[
            ("SERVER_ADDR", Some("0.0.0.0:8080")),
            ("CHAT_API_URL", None),
        ]);

        assert_eq!(server_addr(), "0.0.0.0:8080");
        assert_eq!(chat_api_url(), DEFAULT_CHAT_API_URL);
    }
}
