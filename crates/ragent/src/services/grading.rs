use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::errors::{RagError, RagResult, Service};
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::prompt_template::{PromptTemplate, PromptVars};
use crate::providers::base::Provider;

pub const GRADE_TOOL_NAME: &str = "GradeDocuments";

/// Binary relevance of a context to a question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradeVerdict {
    Yes,
    No,
}

impl FromStr for GradeVerdict {
    type Err = RagError;

    fn from_str(s: &str) -> RagResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(GradeVerdict::Yes),
            "no" => Ok(GradeVerdict::No),
            _ => Err(RagError::MalformedVerdict(s.to_string())),
        }
    }
}

/// Judges whether a context is relevant to a question
#[async_trait]
pub trait GradingService: Send + Sync {
    async fn grade(&self, question: &str, context: &str) -> RagResult<GradeVerdict>;
}

/// Grading backed by a chat model asked for structured output
pub struct ProviderGrader {
    provider: Arc<dyn Provider>,
    template: PromptTemplate,
}

impl ProviderGrader {
    pub fn new(provider: Arc<dyn Provider>, template: PromptTemplate) -> Self {
        Self { provider, template }
    }

    fn grade_tool() -> Tool {
        Tool::new(
            GRADE_TOOL_NAME,
            "Binary score for relevance check on retrieved documents.",
            json!({
                "type": "object",
                "required": ["binary_score"],
                "properties": {
                    "binary_score": {
                        "type": "string",
                        "enum": ["yes", "no"],
                        "description": "Relevance score 'yes' or 'no'"
                    }
                }
            }),
        )
    }
}

#[async_trait]
impl GradingService for ProviderGrader {
    async fn grade(&self, question: &str, context: &str) -> RagResult<GradeVerdict> {
        let prompt = self.template.render(&PromptVars {
            question,
            context: Some(context),
        })?;

        let (reply, _) = self
            .provider
            .complete("", &[Message::user().with_text(prompt)], &[Self::grade_tool()])
            .await
            .map_err(|e| RagError::from_provider(Service::Grading, e))?;

        let verdict = parse_verdict(&reply)?;
        debug!(?verdict, "graded context");
        Ok(verdict)
    }
}

/// Read a verdict from the grade tool call, a JSON body, or a bare yes/no
pub fn parse_verdict(reply: &Message) -> RagResult<GradeVerdict> {
    if let Some(request) = reply.tool_requests().first() {
        let call = request
            .tool_call
            .as_ref()
            .map_err(|e| RagError::MalformedVerdict(e.to_string()))?;
        if call.name != GRADE_TOOL_NAME {
            return Err(RagError::MalformedVerdict(format!(
                "grader called unexpected tool '{}'",
                call.name
            )));
        }
        return call
            .str_argument("binary_score")
            .ok_or_else(|| RagError::MalformedVerdict(call.arguments.to_string()))?
            .parse();
    }

    let text = reply.text();
    if let Ok(Value::Object(body)) = serde_json::from_str::<Value>(text.trim()) {
        return body
            .get("binary_score")
            .and_then(|score| score.as_str())
            .ok_or_else(|| RagError::MalformedVerdict(text.clone()))?
            .parse();
    }
    text.parse()
}
