use config::{Config, Environment};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::errors::{RagError, RagResult};
use crate::prompt_template::{PromptSet, PromptTemplate};
use crate::providers::configs::ProviderCredentials;
use crate::providers::embedding::{Embedder, HashingEmbedder, OpenAiEmbedder, HASHING_DIMENSIONS};
use crate::providers::factory::{resolve_model, ModelId, ProviderType};
use crate::providers::{ollama, openai};
use crate::retrieval::vector_store::{IndexSource, VectorStore};

pub const ENV_PREFIX: &str = "RAG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

impl From<ConfigError> for RagError {
    fn from(err: ConfigError) -> Self {
        RagError::Configuration(err.to_string())
    }
}

/// The environment variable that sets a dotted configuration key
pub fn to_env_var(field: &str) -> String {
    format!("{}_{}", ENV_PREFIX, field.replace('.', "__").to_uppercase())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub host: String,
    pub api_key: Option<String>,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            host: openai::OPENAI_HOST.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub host: String,
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            host: ollama::OLLAMA_HOST.to_string(),
        }
    }
}

/// Model identifiers in `provider:model` form
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub chat: String,
    pub grader: String,
    /// `openai:<model>`, `ollama:<model>` or `hashing[:dimensions]`
    pub embedding: String,
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            chat: "openai:gpt-4.1".to_string(),
            grader: "openai:gpt-4.1".to_string(),
            embedding: "openai:text-embedding-3-large".to_string(),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrieverSettings {
    pub name: String,
    pub description: String,
    pub top_k: usize,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            name: "retrieve_RAG".to_string(),
            description: "Search and return information about EOG performance.".to_string(),
            top_k: 4,
        }
    }
}

/// Prompt overrides. Inline text wins over `dir`, which wins over the built-in templates.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    pub dir: Option<PathBuf>,
    pub grade: Option<String>,
    pub rewrite: Option<String>,
    pub generate: Option<String>,
}

impl PromptSettings {
    pub fn prompt_set(&self) -> RagResult<PromptSet> {
        let mut prompts = match &self.dir {
            Some(dir) => PromptSet::from_dir(dir)?,
            None => PromptSet::default(),
        };
        if let Some(grade) = &self.grade {
            prompts.grade = PromptTemplate::new("grade", grade);
        }
        if let Some(rewrite) = &self.rewrite {
            prompts.rewrite = PromptTemplate::new("rewrite", rewrite);
        }
        if let Some(generate) = &self.generate {
            prompts.generate = PromptTemplate::new("generate", generate);
        }
        Ok(prompts)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub persist_directory: PathBuf,
    pub collection: String,
    /// Source PDF used when no persisted index exists
    pub document: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            persist_directory: PathBuf::from("chromadb"),
            collection: "EOG_2024_Annual_Report".to_string(),
            document: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_rewrites: usize,
    pub service_timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rewrites: 3,
            service_timeout_secs: 120,
        }
    }
}

impl AgentSettings {
    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub openai: OpenAiSettings,
    #[serde(default)]
    pub ollama: OllamaSettings,
    #[serde(default)]
    pub models: ModelSettings,
    #[serde(default)]
    pub retriever: RetrieverSettings,
    #[serde(default)]
    pub prompts: PromptSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    /// Read `.env` if present, then load from the environment
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Settings = match config.try_deserialize() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                let error_str = err.to_string();
                return Err(if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    }
                } else if let config::ConfigError::NotFound(field) = &err {
                    ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    }
                } else {
                    ConfigError::Other(err)
                });
            }
        };

        if settings.openai.api_key.is_none() {
            settings.openai.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        Ok(settings)
    }

    pub fn credentials(&self) -> ProviderCredentials {
        ProviderCredentials {
            openai_host: self.openai.host.clone(),
            openai_api_key: self.openai.api_key.clone(),
            ollama_host: self.ollama.host.clone(),
        }
    }

    /// The source document, or the variable to set when it is missing
    pub fn document(&self) -> Result<&Path, ConfigError> {
        self.store
            .document
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar {
                env_var: to_env_var("store.document"),
            })
    }

    /// Fail fast on anything that would only surface mid-turn
    pub fn validate(&self) -> RagResult<()> {
        self.prompts.prompt_set()?.validate()?;

        if self.retriever.name.trim().is_empty() {
            return Err(RagError::configuration("the retriever tool name is empty"));
        }
        if self.retriever.description.trim().is_empty() {
            return Err(RagError::configuration(
                "the retriever tool description is empty",
            ));
        }
        if self.retriever.top_k == 0 {
            return Err(RagError::configuration("retriever.top_k must be at least 1"));
        }
        if self.agent.max_rewrites == 0 {
            return Err(RagError::configuration(
                "agent.max_rewrites must be at least 1",
            ));
        }
        if self.agent.service_timeout_secs == 0 {
            return Err(RagError::configuration(
                "agent.service_timeout_secs must be greater than zero",
            ));
        }

        let credentials = self.credentials();
        for model in [&self.models.chat, &self.models.grader] {
            resolve_model(&model.parse::<ModelId>()?, &credentials, Some(self.models.temperature))?;
        }
        self.embedder()?;
        Ok(())
    }

    pub fn embedder(&self) -> RagResult<Arc<dyn Embedder>> {
        let spec = self.models.embedding.trim();
        if let Some(rest) = spec.strip_prefix("hashing") {
            let dimensions = match rest.strip_prefix(':') {
                Some(dims) => dims.parse().map_err(|_| {
                    RagError::configuration(format!("invalid hashing dimensions in '{}'", spec))
                })?,
                None if rest.is_empty() => HASHING_DIMENSIONS,
                None => {
                    return Err(RagError::configuration(format!(
                        "unknown embedding model '{}'",
                        spec
                    )))
                }
            };
            return Ok(Arc::new(HashingEmbedder::new(dimensions)));
        }

        let id: ModelId = spec.parse()?;
        let embedder = match id.provider {
            ProviderType::OpenAi => {
                let api_key = self
                    .openai
                    .api_key
                    .clone()
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| {
                        RagError::configuration(format!(
                            "embedding model '{}' needs an OpenAI API key (set {} or OPENAI_API_KEY)",
                            id,
                            to_env_var("openai.api_key")
                        ))
                    })?;
                OpenAiEmbedder::new(&self.openai.host, api_key, &id.model)
            }
            // ollama serves the same embeddings endpoint without a key
            ProviderType::Ollama => OpenAiEmbedder::new(&self.ollama.host, "", &id.model),
        }
        .map_err(|e| RagError::configuration(e.to_string()))?;
        Ok(Arc::new(embedder))
    }

    /// The configured store, building from the source document when nothing is persisted
    pub fn vector_store(&self) -> RagResult<VectorStore> {
        let source = match &self.store.document {
            Some(path) => IndexSource::Pdf {
                path: path.clone(),
                splitter: Default::default(),
            },
            None => IndexSource::Persisted,
        };
        Ok(VectorStore::new(self.embedder()?, source)
            .persist_to(&self.store.persist_directory, &self.store.collection)
            .with_top_k(self.retriever.top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("RAG_") || key == "OPENAI_API_KEY" {
                env::remove_var(&key);
            }
        }
    }

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("models.chat"), "RAG_MODELS__CHAT");
        assert_eq!(to_env_var("store.document"), "RAG_STORE__DOCUMENT");
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clean_env();
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.retriever.name, "retrieve_RAG");
        assert_eq!(settings.retriever.top_k, 4);
        assert_eq!(settings.models.chat, "openai:gpt-4.1");
        assert_eq!(settings.models.temperature, 0.0);
        assert_eq!(settings.store.collection, "EOG_2024_Annual_Report");
        assert_eq!(settings.store.persist_directory, PathBuf::from("chromadb"));
        assert_eq!(settings.agent.max_rewrites, 3);
        assert_eq!(settings.agent.service_timeout(), Duration::from_secs(120));
        assert!(settings.openai.api_key.is_none());
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("RAG_MODELS__CHAT", "ollama:qwen2.5");
        env::set_var("RAG_AGENT__MAX_REWRITES", "5");
        env::set_var("RAG_RETRIEVER__TOP_K", "6");
        env::set_var("RAG_STORE__DOCUMENT", "docs/report.pdf");
        env::set_var("OPENAI_API_KEY", "sk-fallback");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.models.chat, "ollama:qwen2.5");
        assert_eq!(settings.agent.max_rewrites, 5);
        assert_eq!(settings.retriever.top_k, 6);
        assert_eq!(settings.document().unwrap(), Path::new("docs/report.pdf"));
        assert_eq!(settings.openai.api_key.as_deref(), Some("sk-fallback"));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_explicit_key_wins_over_fallback() {
        clean_env();
        env::set_var("RAG_OPENAI__API_KEY", "sk-explicit");
        env::set_var("OPENAI_API_KEY", "sk-fallback");
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.openai.api_key.as_deref(), Some("sk-explicit"));
        clean_env();
    }

    #[test]
    fn test_missing_document_names_env_var() {
        let settings = Settings::default();
        let err = settings.document().unwrap_err();
        assert!(err.to_string().contains("RAG_STORE__DOCUMENT"));
    }

    fn offline() -> Settings {
        let mut settings = Settings::default();
        settings.models.chat = "ollama:qwen2.5".to_string();
        settings.models.grader = "ollama:qwen2.5".to_string();
        settings.models.embedding = "hashing".to_string();
        settings
    }

    #[test]
    fn test_validate_offline_settings() {
        offline().validate().unwrap();
    }

    #[test]
    fn test_validate_fails_fast() {
        let mut settings = offline();
        settings.agent.max_rewrites = 0;
        assert!(matches!(settings.validate(), Err(RagError::Configuration(_))));

        let mut settings = offline();
        settings.prompts.generate = Some("Answer: {question}".to_string());
        assert!(settings.validate().is_err());

        let mut settings = offline();
        settings.retriever.name = " ".to_string();
        assert!(settings.validate().is_err());

        let mut settings = offline();
        settings.models.grader = "unknown:model".to_string();
        assert!(settings.validate().is_err());

        // openai models need a key
        let mut settings = offline();
        settings.models.chat = "openai:gpt-4.1".to_string();
        assert!(settings.validate().is_err());

        let mut settings = offline();
        settings.models.embedding = "hashing:lots".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_prompt_overrides() {
        let mut settings = offline();
        settings.prompts.rewrite = Some("Rephrase {question}".to_string());
        let prompts = settings.prompts.prompt_set().unwrap();
        assert_eq!(prompts.rewrite.source(), "Rephrase {{ question }}");
        assert_eq!(prompts.grade, PromptSet::default().grade);
    }

    #[tokio::test]
    async fn test_vector_store_without_document_requires_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = offline();
        settings.store.persist_directory = dir.path().to_path_buf();
        let store = settings.vector_store().unwrap();
        assert!(matches!(store.len().await, Err(RagError::Configuration(_))));
    }
}
