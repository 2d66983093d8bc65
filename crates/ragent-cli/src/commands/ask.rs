use anyhow::{anyhow, Context, Result};
use cliclack::spinner;
use ragent::conversation::{ConversationState, WireConversation};
use ragent::errors::RagError;
use std::fs;
use std::path::{Path, PathBuf};

use super::{build_agent, load_settings};
use crate::render;

pub async fn execute(question: Option<String>, input: Option<PathBuf>, json: bool) -> Result<()> {
    let mut state = load_input(question, input.as_deref())?;
    let settings = load_settings()?;
    let agent = build_agent(&settings)?;

    let spin = spinner();
    spin.start("awaiting reply");
    let result = agent.run_turn(&mut state).await;
    spin.stop("");
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state.to_wire())?);
        return Ok(());
    }

    if let Some(answer) = state.last_assistant() {
        render::message(answer)?;
    }
    render::trace(&report);
    Ok(())
}

/// Seed the turn from a question or from a wire JSON file
fn load_input(question: Option<String>, input: Option<&Path>) -> Result<ConversationState> {
    match (question, input) {
        (Some(question), _) => Ok(ConversationState::new(question)?),
        (None, Some(path)) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let wire: WireConversation = serde_json::from_str(&raw)
                .map_err(|e| RagError::InvalidInput(format!("{}: {}", path.display(), e)))?;
            Ok(ConversationState::from_wire(wire)?)
        }
        (None, None) => Err(anyhow!("pass a question or --input FILE")),
    }
}
