//! Provider selection and service construction

use super::anthropic::AnthropicService;
use super::openai::{OpenAIService, OpenAiSettings};
use super::LlmService;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum LlmConfigError {
    #[error("unknown LLM provider {0:?} (expected nebius, openrouter, ollama, openai or anthropic)")]
    UnknownProvider(String),

    #[error("{provider} requires {var} to be set")]
    MissingApiKey {
        provider: ProviderKind,
        var: &'static str,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Nebius,
    OpenRouter,
    Ollama,
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Result<Self, LlmConfigError> {
        match value.trim().to_lowercase().as_str() {
            "nebius" => Ok(Self::Nebius),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(LlmConfigError::UnknownProvider(value.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nebius => "nebius",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
        }
    }

    /// Environment variable holding the API key, if the provider needs one
    pub fn key_var(self) -> Option<&'static str> {
        match self {
            Self::Nebius => Some("NEBIUS_API_KEY"),
            Self::OpenRouter => Some("OPENROUTER_API_KEY"),
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Ollama => None,
        }
    }

    fn model_var(self) -> &'static str {
        match self {
            Self::Nebius => "NEBIUS_MODEL",
            Self::OpenRouter => "OPENROUTER_MODEL",
            Self::Ollama => "OLLAMA_MODEL",
            Self::OpenAi => "OPENAI_MODEL",
            Self::Anthropic => "ANTHROPIC_MODEL",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::Nebius => "zai-org/GLM-4.5",
            Self::OpenRouter => "anthropic/claude-sonnet-4",
            Self::Ollama => "qwen3:4b",
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::Nebius => "https://api.studio.nebius.com/v1/",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Ollama => "http://localhost:11434/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider configuration, read once from the environment
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    /// `LLM_MODEL`: overrides the provider's model variable
    pub model: Option<String>,
    /// `LLM_BASE_URL`: overrides the provider's endpoint
    pub base_url: Option<String>,
    pub nebius_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// Per-provider model variables (`NEBIUS_MODEL`, `OLLAMA_MODEL`, ...)
    pub provider_models: Vec<(ProviderKind, String)>,
    pub openrouter_site_url: Option<String>,
    pub openrouter_site_title: Option<String>,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, LlmConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LlmConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let provider = get("LLM_PROVIDER")
            .map(|p| ProviderKind::parse(&p))
            .transpose()?
            .unwrap_or_default();

        let provider_models = [
            ProviderKind::Nebius,
            ProviderKind::OpenRouter,
            ProviderKind::Ollama,
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
        ]
        .into_iter()
        .filter_map(|kind| get(kind.model_var()).map(|model| (kind, model)))
        .collect();

        Ok(Self {
            provider,
            model: get("LLM_MODEL"),
            base_url: get("LLM_BASE_URL"),
            nebius_api_key: get("NEBIUS_API_KEY"),
            openrouter_api_key: get("OPENROUTER_API_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            anthropic_api_key: get("ANTHROPIC_API_KEY"),
            provider_models,
            openrouter_site_url: get("OPENROUTER_SITE_URL"),
            openrouter_site_title: get("OPENROUTER_SITE_TITLE"),
        })
    }

    fn api_key(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::Nebius => self.nebius_api_key.as_deref(),
            ProviderKind::OpenRouter => self.openrouter_api_key.as_deref(),
            ProviderKind::OpenAi => self.openai_api_key.as_deref(),
            ProviderKind::Anthropic => self.anthropic_api_key.as_deref(),
            ProviderKind::Ollama => None,
        }
    }

    /// Model used for `provider` when a request names none
    pub fn model_for(&self, provider: ProviderKind) -> String {
        if provider == self.provider {
            if let Some(model) = &self.model {
                return model.clone();
            }
        }
        self.provider_models
            .iter()
            .find(|(kind, _)| *kind == provider)
            .map_or_else(|| provider.default_model().to_string(), |(_, m)| m.clone())
    }

    fn base_url_for(&self, provider: ProviderKind) -> String {
        match &self.base_url {
            Some(url) if provider == self.provider => url.clone(),
            _ => provider.default_base_url().to_string(),
        }
    }

    /// Build the service for `provider` and `model`.
    ///
    /// Fails when the provider needs an API key and none is configured; there
    /// is no offline fallback.
    pub fn build(
        &self,
        provider: ProviderKind,
        model: &str,
    ) -> Result<Arc<dyn LlmService>, LlmConfigError> {
        let api_key = match provider.key_var() {
            Some(var) => Some(
                self.api_key(provider)
                    .ok_or(LlmConfigError::MissingApiKey { provider, var })?
                    .to_string(),
            ),
            None => None,
        };
        let base_url = self.base_url_for(provider);

        let service: Arc<dyn LlmService> = match provider {
            ProviderKind::Anthropic => Arc::new(AnthropicService::new(
                api_key.unwrap_or_default(),
                model.to_string(),
                &base_url,
                REQUEST_TIMEOUT,
            )?),
            ProviderKind::Nebius
            | ProviderKind::OpenRouter
            | ProviderKind::Ollama
            | ProviderKind::OpenAi => {
                let mut headers = Vec::new();
                if provider == ProviderKind::OpenRouter {
                    if let Some(url) = &self.openrouter_site_url {
                        headers.push(("HTTP-Referer".to_string(), url.clone()));
                    }
                    if let Some(title) = &self.openrouter_site_title {
                        headers.push(("X-Title".to_string(), title.clone()));
                    }
                }
                Arc::new(OpenAIService::new(OpenAiSettings {
                    base_url,
                    api_key: api_key.or_else(|| {
                        (provider == ProviderKind::Ollama).then(|| "ollama".to_string())
                    }),
                    model: model.to_string(),
                    headers,
                    supports_required_tool_choice: provider != ProviderKind::Ollama,
                    timeout: REQUEST_TIMEOUT,
                })?)
            }
        };

        Ok(service)
    }
}

/// The configured default service plus on-demand overrides
pub struct ModelRegistry {
    config: LlmConfig,
    provider: ProviderKind,
    model: String,
    default: Arc<dyn LlmService>,
}

impl ModelRegistry {
    /// Build the default service, failing fast on missing credentials.
    pub fn new(config: LlmConfig) -> Result<Self, LlmConfigError> {
        let provider = config.provider;
        let model = config.model_for(provider);
        let default = config.build(provider, &model)?;
        Ok(Self {
            config,
            provider,
            model,
            default,
        })
    }

    /// Registry serving a fixed service, for tests
    #[cfg(test)]
    pub fn with_service(service: Arc<dyn LlmService>) -> Self {
        let model = service.model_id().to_string();
        Self {
            config: LlmConfig::default(),
            provider: ProviderKind::default(),
            model,
            default: service,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn default_model_id(&self) -> &str {
        &self.model
    }

    pub fn default(&self) -> Arc<dyn LlmService> {
        self.default.clone()
    }

    /// Service for a request that may name its own provider or model.
    pub fn resolve(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<Arc<dyn LlmService>, LlmConfigError> {
        let provider = provider
            .filter(|p| !p.trim().is_empty())
            .map(ProviderKind::parse)
            .transpose()?
            .unwrap_or(self.provider);
        let model = match model.filter(|m| !m.trim().is_empty()) {
            Some(model) => model.to_string(),
            None if provider == self.provider => self.model.clone(),
            None => self.config.model_for(provider),
        };

        if provider == self.provider && model == self.model {
            return Ok(self.default());
        }
        tracing::info!(provider = %provider, model = %model, "Building LLM service for request override");
        self.config.build(provider, &model)
    }
}
