use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
};
use http_body_util::BodyExt;
use ragent::{
    agent::{AgentConfig, RagAgent},
    errors::{RagError, RagResult, Service},
    models::{message::Message, tool::Tool, tool::ToolCall},
    providers::embedding::HashingEmbedder,
    retrieval::{
        DocumentStore, IndexSource, RetrievedPassage, RetrieverTool, SourceDocument, VectorStore,
    },
    services::{GenerationService, GradeVerdict, GradingService},
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Greets "hello!", retrieves for anything else
struct StubGenerator;

#[async_trait]
impl GenerationService for StubGenerator {
    async fn complete_tool_aware(&self, history: &[Message], tools: &[Tool]) -> RagResult<Message> {
        if history[0].text() == "hello!" {
            return Ok(Message::assistant().with_text("Hello! Ask me about the report."));
        }
        Ok(Message::assistant().with_tool_request(
            format!("call_{}", history.len()),
            Ok(ToolCall::new(&tools[0].name, json!({"query": "culture"}))),
        ))
    }

    async fn complete(&self, prompt: &str) -> RagResult<Message> {
        let reply = if prompt.contains("improved question") {
            "How does the CEO describe the company culture?"
        } else {
            "The CEO calls culture a competitive advantage."
        };
        Ok(Message::assistant().with_text(reply))
    }
}

struct StubGrader(Mutex<VecDeque<GradeVerdict>>);

#[async_trait]
impl GradingService for StubGrader {
    async fn grade(&self, _: &str, _: &str) -> RagResult<GradeVerdict> {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RagError::MalformedVerdict("no scripted verdict".to_string()))
    }
}

struct OfflineStore;

#[async_trait]
impl DocumentStore for OfflineStore {
    async fn search(&self, _: &str) -> RagResult<Vec<RetrievedPassage>> {
        Err(RagError::unavailable(Service::DocumentStore, "index offline"))
    }
}

pub fn test_state(verdicts: Vec<GradeVerdict>, store_fails: bool) -> AppState {
    let store: Arc<dyn DocumentStore> = if store_fails {
        Arc::new(OfflineStore)
    } else {
        Arc::new(VectorStore::new(
            Arc::new(HashingEmbedder::default()),
            IndexSource::Chunks(vec![
                SourceDocument::new("Our culture is our competitive advantage."),
                SourceDocument::new("Production grew in the Delaware Basin."),
            ]),
        ))
    };
    let agent = RagAgent::new(
        Arc::new(StubGenerator),
        Arc::new(StubGrader(Mutex::new(verdicts.into()))),
        RetrieverTool::new("retrieve_RAG", "Search the report.", store),
        AgentConfig::default(),
    )
    .unwrap();
    AppState::new(agent)
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
