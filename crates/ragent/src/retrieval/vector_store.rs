use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::chunker::{split_documents, SplitterConfig};
use super::pdf::load_pdf;
use super::{DocumentStore, RetrievedPassage, SourceDocument};
use crate::errors::{RagError, RagResult, Service};
use crate::providers::embedding::{cosine_similarity, Embedder};

pub const DEFAULT_TOP_K: usize = 4;
pub const INDEX_FILE: &str = "index.json";
const EMBED_BATCH: usize = 64;

/// Where the index comes from when nothing has been persisted yet
#[derive(Debug, Clone)]
pub enum IndexSource {
    /// Only ever load; a missing index is a configuration error
    Persisted,
    /// Chunks that are already split and ready to embed
    Chunks(Vec<SourceDocument>),
    /// A PDF to load and split on first use
    Pdf { path: PathBuf, splitter: SplitterConfig },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    text: String,
    #[serde(default)]
    metadata: HashMap<String, Value>,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedIndex {
    model: String,
    entries: Vec<IndexEntry>,
}

/// An in-memory embedding index with optional on-disk persistence.
///
/// The index is loaded or built exactly once, the first time it is needed.
/// Callers racing on that first use all wait for the same initialization, and
/// afterwards searches only read shared state.
pub struct VectorStore {
    embedder: Arc<dyn Embedder>,
    source: IndexSource,
    location: Option<PathBuf>,
    top_k: usize,
    index: OnceCell<PersistedIndex>,
}

impl VectorStore {
    pub fn new(embedder: Arc<dyn Embedder>, source: IndexSource) -> Self {
        Self {
            embedder,
            source,
            location: None,
            top_k: DEFAULT_TOP_K,
            index: OnceCell::new(),
        }
    }

    /// Persist under `{directory}/{collection}/index.json`
    pub fn persist_to<P: AsRef<Path>>(mut self, directory: P, collection: &str) -> Self {
        self.location = Some(directory.as_ref().join(collection).join(INDEX_FILE));
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn index_path(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Number of indexed chunks, initializing the index if needed
    pub async fn len(&self) -> RagResult<usize> {
        Ok(self.index().await?.entries.len())
    }

    pub async fn is_empty(&self) -> RagResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Build the index from the configured source and persist it, replacing any saved copy
    /// and whatever this store had already loaded
    pub async fn rebuild(&mut self) -> RagResult<usize> {
        let index = self.build().await?;
        self.persist(&index).await?;
        let chunks = index.entries.len();
        self.index = OnceCell::new_with(Some(index));
        Ok(chunks)
    }

    async fn index(&self) -> RagResult<&PersistedIndex> {
        self.index.get_or_try_init(|| self.load_or_build()).await
    }

    async fn load_or_build(&self) -> RagResult<PersistedIndex> {
        if let Some(path) = self.location.as_ref().filter(|path| path.exists()) {
            let index = self.load(path).await?;
            info!(path = %path.display(), chunks = index.entries.len(), "loaded persisted index");
            return Ok(index);
        }

        let index = self.build().await?;
        self.persist(&index).await?;
        Ok(index)
    }

    async fn load(&self, path: &Path) -> RagResult<PersistedIndex> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RagError::unavailable(Service::DocumentStore, e))?;
        let index: PersistedIndex = serde_json::from_slice(&bytes).map_err(|e| {
            RagError::unavailable(
                Service::DocumentStore,
                format!("corrupt index at {}: {}", path.display(), e),
            )
        })?;
        if index.model != self.embedder.model() {
            return Err(RagError::configuration(format!(
                "index at {} was built with '{}' but the configured embedding model is '{}'",
                path.display(),
                index.model,
                self.embedder.model()
            )));
        }
        Ok(index)
    }

    async fn build(&self) -> RagResult<PersistedIndex> {
        let chunks = match &self.source {
            IndexSource::Persisted => {
                return Err(RagError::configuration(match &self.location {
                    Some(path) => format!("no index found at {}; run ingestion first", path.display()),
                    None => "no index location or source documents configured".to_string(),
                }))
            }
            IndexSource::Chunks(chunks) => chunks.clone(),
            IndexSource::Pdf { path, splitter } => {
                let path = path.clone();
                let pages = tokio::task::spawn_blocking(move || load_pdf(&path))
                    .await
                    .map_err(|e| RagError::unavailable(Service::DocumentStore, e))??;
                split_documents(&pages, *splitter)
            }
        };

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = self
                .embedder
                .embed(&texts)
                .await
                .map_err(|e| RagError::from_provider(Service::Embedding, e))?;
            if embeddings.len() != batch.len() {
                return Err(RagError::unavailable(
                    Service::Embedding,
                    format!("expected {} embeddings, got {}", batch.len(), embeddings.len()),
                ));
            }
            entries.extend(batch.iter().zip(embeddings).map(|(chunk, embedding)| IndexEntry {
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
                embedding,
            }));
        }

        info!(chunks = entries.len(), model = self.embedder.model(), "built index");
        Ok(PersistedIndex {
            model: self.embedder.model().to_string(),
            entries,
        })
    }

    async fn persist(&self, index: &PersistedIndex) -> RagResult<()> {
        let Some(path) = &self.location else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RagError::unavailable(Service::DocumentStore, e))?;
        }
        let bytes = serde_json::to_vec(index)
            .map_err(|e| RagError::unavailable(Service::DocumentStore, e))?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes)
            .await
            .map_err(|e| RagError::unavailable(Service::DocumentStore, e))?;
        tokio::fs::rename(&staging, path)
            .await
            .map_err(|e| RagError::unavailable(Service::DocumentStore, e))?;
        debug!(path = %path.display(), "persisted index");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for VectorStore {
    async fn search(&self, query: &str) -> RagResult<Vec<RetrievedPassage>> {
        let index = self.index().await?;
        let query_embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| RagError::from_provider(Service::Embedding, e))?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::unavailable(Service::Embedding, "no embedding for query"))?;

        let mut scored: Vec<(usize, f32)> = index
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(&query_embedding, &entry.embedding)))
            .collect();
        // stable sort: equal scores keep insertion order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(self.top_k)
            .map(|(i, score)| {
                let entry = &index.entries[i];
                RetrievedPassage {
                    text: entry.text.clone(),
                    metadata: entry.metadata.clone(),
                    score,
                }
            })
            .collect())
    }
}
