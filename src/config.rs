// src/config.rs
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

impl Config {
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        Config {
            provider: ProviderConfig::from_env(),
            host,
            port,
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let api_key = env::var("PROVIDER_API_KEY").ok().filter(|k| !k.is_empty());
        let base_url = env::var("PROVIDER_URL")
            .unwrap_or_else(|_| "https://api.imagepipe.dev/v1".to_string());
        let model = env::var("PROVIDER_MODEL").unwrap_or_else(|_| "flux-schnell".to_string());

        ProviderConfig {
            api_key,
            base_url,
            model,
        }
    }

    pub fn with_credentials(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}
