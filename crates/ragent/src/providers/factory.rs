use super::{
    base::Provider,
    configs::{OllamaProviderConfig, OpenAiProviderConfig, ProviderConfig, ProviderCredentials},
    ollama::OllamaProvider,
    openai::OpenAiProvider,
};
use crate::errors::{RagError, RagResult};
use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

#[derive(EnumIter, Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    OpenAi,
    Ollama,
}

impl FromStr for ProviderType {
    type Err = RagError;

    fn from_str(s: &str) -> RagResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAi),
            "ollama" => Ok(ProviderType::Ollama),
            other => {
                let known: Vec<String> = ProviderType::iter().map(|p| p.to_string()).collect();
                Err(RagError::configuration(format!(
                    "unknown model provider '{}' (expected one of: {})",
                    other,
                    known.join(", ")
                )))
            }
        }
    }
}

/// A `provider:model` identifier such as `openai:gpt-4.1`. A bare model name means openai.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelId {
    pub provider: ProviderType,
    pub model: String,
}

impl FromStr for ModelId {
    type Err = RagError;

    fn from_str(s: &str) -> RagResult<Self> {
        let (provider, model) = match s.split_once(':') {
            Some((provider, model)) => (provider.parse()?, model.trim()),
            None => (ProviderType::OpenAi, s.trim()),
        };
        if model.is_empty() {
            return Err(RagError::configuration(format!(
                "model identifier '{}' does not name a model",
                s
            )));
        }
        Ok(ModelId {
            provider,
            model: model.to_string(),
        })
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Resolve a model identifier into a concrete provider configuration
pub fn resolve_model(
    id: &ModelId,
    credentials: &ProviderCredentials,
    temperature: Option<f32>,
) -> RagResult<ProviderConfig> {
    match id.provider {
        ProviderType::OpenAi => {
            let api_key = credentials
                .openai_api_key
                .clone()
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| {
                    RagError::configuration(format!(
                        "model '{}' needs an OpenAI API key (set RAG_OPENAI__API_KEY or OPENAI_API_KEY)",
                        id
                    ))
                })?;
            Ok(ProviderConfig::OpenAi(OpenAiProviderConfig {
                host: credentials.openai_host.clone(),
                api_key,
                model: id.model.clone(),
                temperature,
                max_tokens: None,
            }))
        }
        ProviderType::Ollama => Ok(ProviderConfig::Ollama(OllamaProviderConfig {
            host: credentials.ollama_host.clone(),
            model: id.model.clone(),
            temperature,
            max_tokens: None,
        })),
    }
}

/// Build the provider for a resolved model
pub fn get_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Arc::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Ollama(ollama_config) => Ok(Arc::new(OllamaProvider::new(ollama_config)?)),
    }
}
