use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{RagError, RagResult};
use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::ToolCall;

/// A message as exchanged with callers of a turn:
/// `{"role": "user", "content": "hello!"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl WireMessage {
    pub fn new<R: Into<String>, C: Into<String>>(role: R, content: C) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let tool_calls = message
            .tool_requests()
            .into_iter()
            .filter_map(|request| {
                request.tool_call.as_ref().ok().map(|call| WireToolCall {
                    id: request.id.clone(),
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                })
            })
            .collect();
        let tool_call_id = message
            .content
            .iter()
            .find_map(|content| content.as_tool_response().map(|r| r.id.clone()));

        WireMessage {
            role: message.role.as_str().to_string(),
            content: message.text(),
            tool_calls,
            tool_call_id,
        }
    }
}

impl TryFrom<WireMessage> for Message {
    type Error = RagError;

    fn try_from(wire: WireMessage) -> RagResult<Self> {
        let role: Role = wire.role.parse().map_err(RagError::InvalidInput)?;
        let message = match role {
            Role::User => Message::user().with_text(wire.content),
            Role::Assistant => {
                let mut message = Message::assistant();
                if !wire.content.is_empty() {
                    message = message.with_text(wire.content);
                }
                for call in wire.tool_calls {
                    message = message
                        .with_tool_request(call.id, Ok(ToolCall::new(call.name, call.arguments)));
                }
                message
            }
            Role::Tool => Message::tool()
                .with_tool_response(wire.tool_call_id.unwrap_or_default(), Ok(wire.content)),
        };
        Ok(message)
    }
}

/// Serializable form of a whole turn: `{"messages": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireConversation {
    pub messages: Vec<WireMessage>,
}

/// The ordered message history a single turn operates on.
///
/// `messages[0]` is always the original user question. Later messages are only
/// ever appended; nothing removes or edits them.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    /// Start a conversation from a single user question
    pub fn new<S: Into<String>>(question: S) -> RagResult<Self> {
        Self::from_messages(vec![Message::user().with_text(question)])
    }

    /// Seed a conversation from existing messages, validating the anchor question
    pub fn from_messages(messages: Vec<Message>) -> RagResult<Self> {
        let first = messages
            .first()
            .ok_or_else(|| RagError::InvalidInput("conversation has no messages".to_string()))?;
        if first.role != Role::User {
            return Err(RagError::InvalidInput(format!(
                "first message must come from the user, found {}",
                first.role.as_str()
            )));
        }
        if first.text().trim().is_empty() {
            return Err(RagError::InvalidInput(
                "the user question is empty".to_string(),
            ));
        }
        Ok(Self { messages })
    }

    pub fn from_wire(wire: WireConversation) -> RagResult<Self> {
        let messages = wire
            .messages
            .into_iter()
            .map(Message::try_from)
            .collect::<RagResult<Vec<_>>>()?;
        Self::from_messages(messages)
    }

    pub fn to_wire(&self) -> WireConversation {
        WireConversation {
            messages: self.messages.iter().map(WireMessage::from).collect(),
        }
    }

    /// The original user question
    pub fn question(&self) -> String {
        self.messages[0].text()
    }

    /// The content of the most recent message, used as context for grading and answering
    pub fn context(&self) -> String {
        self.messages
            .last()
            .map(|message| message.text())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> &Message {
        // from_messages guarantees at least one message and nothing removes them
        &self.messages[self.messages.len() - 1]
    }

    /// Append a message produced by a node
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The most recent assistant message that carries text, i.e. the turn's output
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|message| {
            message.role == Role::Assistant
                && message
                    .content
                    .iter()
                    .any(|c| matches!(c, MessageContent::Text(t) if !t.text.is_empty()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_wire_input() -> RagResult<()> {
        let wire: WireConversation =
            serde_json::from_value(json!({"messages": [{"role": "user", "content": "hello!"}]}))
                .unwrap();
        let state = ConversationState::from_wire(wire)?;
        assert_eq!(state.len(), 1);
        assert_eq!(state.question(), "hello!");
        assert_eq!(state.context(), "hello!");
        Ok(())
    }

    #[test]
    fn test_rejects_empty_or_non_user_start() {
        assert!(matches!(
            ConversationState::from_messages(vec![]),
            Err(RagError::InvalidInput(_))
        ));
        assert!(matches!(
            ConversationState::from_messages(vec![Message::assistant().with_text("hi")]),
            Err(RagError::InvalidInput(_))
        ));
        assert!(matches!(
            ConversationState::new("   "),
            Err(RagError::InvalidInput(_))
        ));

        let wire = WireConversation {
            messages: vec![WireMessage::new("narrator", "once upon a time")],
        };
        assert!(matches!(
            ConversationState::from_wire(wire),
            Err(RagError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_context_follows_last_message() -> RagResult<()> {
        let mut state = ConversationState::new("What does the CEO say about culture?")?;
        state.append(
            Message::assistant()
                .with_tool_request("call_1", Ok(ToolCall::new("retrieve_RAG", json!({"query": "culture"})))),
        );
        state.append(Message::tool().with_tool_response("call_1", Ok("Our culture is our edge.".to_string())));

        assert_eq!(state.question(), "What does the CEO say about culture?");
        assert_eq!(state.context(), "Our culture is our edge.");
        assert!(state.last_assistant().is_none());

        state.append(Message::assistant().with_text("The CEO calls culture an edge."));
        assert_eq!(
            state.last_assistant().map(|m| m.text()),
            Some("The CEO calls culture an edge.".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_wire_output_carries_tool_calls() -> RagResult<()> {
        let mut state = ConversationState::new("culture?")?;
        state.append(
            Message::assistant()
                .with_tool_request("call_9", Ok(ToolCall::new("retrieve_RAG", json!({"query": "culture"})))),
        );
        state.append(Message::tool().with_tool_response("call_9", Ok("passage".to_string())));

        let wire = state.to_wire();
        assert_eq!(wire.messages[1].role, "assistant");
        assert_eq!(wire.messages[1].tool_calls[0].name, "retrieve_RAG");
        assert_eq!(wire.messages[2].role, "tool");
        assert_eq!(wire.messages[2].tool_call_id.as_deref(), Some("call_9"));

        let reparsed = ConversationState::from_wire(wire)?;
        assert_eq!(reparsed.context(), "passage");
        Ok(())
    }
}
