use crate::{error::ApiError, state::AppState};
use axum::{extract::State, routing::post, Json, Router};
use ragent::{errors::RagError, retrieval::RetrievedPassage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub passages: Vec<RetrievedPassage>,
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(RagError::InvalidInput("query is empty".to_string()).into());
    }
    let passages = state.agent.retriever().simple_query(query).await?;
    Ok(Json(SearchResponse { passages }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/search", post(handler))
        .with_state(state)
}
