pub mod chunker;
pub mod pdf;
pub mod tool;
pub mod vector_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::errors::RagResult;

pub use chunker::{split_documents, SplitterConfig};
pub use pdf::load_pdf;
pub use tool::{RetrieverTool, EMPTY_RESULT};
pub use vector_store::{IndexSource, VectorStore};

/// A unit of source text together with where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl SourceDocument {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A passage returned by a search, with its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub score: f32,
}

/// Semantic search over an indexed corpus.
///
/// Results come back ordered by descending score. Two searches with the same
/// query against an unchanged index return the same passages in the same order.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn search(&self, query: &str) -> RagResult<Vec<RetrievedPassage>>;
}
