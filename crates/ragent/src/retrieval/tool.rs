use indoc::indoc;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{DocumentStore, RetrievedPassage};
use crate::errors::{RagError, RagResult};
use crate::models::tool::Tool;

/// Tool output when a search finds nothing
pub const EMPTY_RESULT: &str = "No relevant documents were found.";

/// Exposes a document store to tool-aware completion as a single `query` tool.
#[derive(Clone)]
pub struct RetrieverTool {
    name: String,
    description: String,
    store: Arc<dyn DocumentStore>,
}

impl RetrieverTool {
    pub fn new<N, D>(name: N, description: D, store: Arc<dyn DocumentStore>) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            store,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tool(&self) -> Tool {
        Tool::new(
            self.name.clone(),
            self.description.clone(),
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": indoc! {r#"
                            The search query. Phrase it as the information you are
                            looking for rather than as a question.
                        "#}.trim(),
                    }
                }
            }),
        )
    }

    /// Run the tool with the arguments a model produced
    pub async fn invoke(&self, arguments: &Value) -> RagResult<String> {
        let query = arguments
            .get("query")
            .and_then(|q| q.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                RagError::MalformedToolCall(format!(
                    "{} expects a non-empty string 'query', got {}",
                    self.name, arguments
                ))
            })?;

        let passages = self.store.search(query).await?;
        Ok(format_passages(&passages))
    }

    /// Search without going through a tool call
    pub async fn simple_query(&self, query: &str) -> RagResult<Vec<RetrievedPassage>> {
        self.store.search(query).await
    }
}

pub fn format_passages(passages: &[RetrievedPassage]) -> String {
    if passages.is_empty() {
        return EMPTY_RESULT.to_string();
    }
    passages
        .iter()
        .map(|passage| passage.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}
