use crate::{error::ApiError, state::AppState};
use axum::{extract::State, routing::post, Json, Router};
use ragent::{
    agent::Node,
    conversation::{ConversationState, WireConversation, WireMessage},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub messages: Vec<WireMessage>,
    pub trace: Vec<Node>,
    pub rewrites: usize,
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<WireConversation>,
) -> Result<Json<ReplyResponse>, ApiError> {
    let mut conversation = ConversationState::from_wire(request)?;
    let report = state.agent.run_turn(&mut conversation).await?;

    Ok(Json(ReplyResponse {
        messages: conversation.to_wire().messages,
        trace: report.visited,
        rewrites: report.rewrites,
    }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/reply", post(handler))
        .with_state(state)
}
