//! The retrieval agent's control loop.
//!
//! A turn starts at [`Node::Decide`] and walks the state machine below until it
//! reaches [`Node::Terminal`]:
//!
//! ```text
//! decide --(no tool call)--> respond --> terminal
//!   |
//!   +--(tool call)--> retrieve --> grade --(yes)--> answer --> terminal
//!                                    |
//!                                    +--(no)--> rewrite --> decide
//! ```
//!
//! Every node appends at most one delta to the conversation and only after the
//! service call it depends on has succeeded, so a failed turn leaves the state
//! at its last successful append.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use strum_macros::Display;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::conversation::ConversationState;
use crate::errors::{RagError, RagResult, Service};
use crate::models::message::{Message, ToolRequest};
use crate::prompt_template::{PromptSet, PromptVars};
use crate::providers::factory::{get_provider, resolve_model, ModelId};
use crate::retrieval::{DocumentStore, RetrieverTool};
use crate::services::{
    GenerationService, GradeVerdict, GradingService, ProviderGenerator, ProviderGrader,
};
use crate::settings::Settings;

pub const DEFAULT_MAX_REWRITES: usize = 3;
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(120);

/// States of the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Decide,
    Retrieve,
    Grade,
    Rewrite,
    Answer,
    Respond,
    Terminal,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_rewrites: usize,
    pub service_timeout: Duration,
    pub prompts: PromptSet,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rewrites: DEFAULT_MAX_REWRITES,
            service_timeout: DEFAULT_SERVICE_TIMEOUT,
            prompts: PromptSet::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> RagResult<()> {
        if self.max_rewrites == 0 {
            return Err(RagError::configuration("max_rewrites must be at least 1"));
        }
        if self.service_timeout.is_zero() {
            return Err(RagError::configuration("service timeout must be non-zero"));
        }
        self.prompts.validate()
    }
}

/// What a completed turn went through
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    /// Nodes executed in order, excluding the terminal state
    pub visited: Vec<Node>,
    pub rewrites: usize,
}

impl TurnReport {
    pub fn count(&self, node: Node) -> usize {
        self.visited.iter().filter(|visited| **visited == node).count()
    }
}

/// Routes a conversation between the generation, grading and retrieval services
pub struct RagAgent {
    generator: Arc<dyn GenerationService>,
    grader: Arc<dyn GradingService>,
    retriever: RetrieverTool,
    config: AgentConfig,
}

impl RagAgent {
    pub fn new(
        generator: Arc<dyn GenerationService>,
        grader: Arc<dyn GradingService>,
        retriever: RetrieverTool,
        config: AgentConfig,
    ) -> RagResult<Self> {
        config.validate()?;
        Ok(Self {
            generator,
            grader,
            retriever,
            config,
        })
    }

    /// Wire provider-backed services from settings around an existing store
    pub fn from_settings(settings: &Settings, store: Arc<dyn DocumentStore>) -> RagResult<Self> {
        settings.validate()?;
        let credentials = settings.credentials();
        let temperature = Some(settings.models.temperature);
        let prompts = settings.prompts.prompt_set()?;

        let chat = resolve_model(&settings.models.chat.parse::<ModelId>()?, &credentials, temperature)?;
        let grader = resolve_model(&settings.models.grader.parse::<ModelId>()?, &credentials, temperature)?;
        let chat = get_provider(chat).map_err(|e| RagError::configuration(e.to_string()))?;
        let grader = get_provider(grader).map_err(|e| RagError::configuration(e.to_string()))?;

        let retriever = RetrieverTool::new(
            settings.retriever.name.clone(),
            settings.retriever.description.clone(),
            store,
        );
        Self::new(
            Arc::new(ProviderGenerator::new(chat)),
            Arc::new(ProviderGrader::new(grader, prompts.grade.clone())),
            retriever,
            AgentConfig {
                max_rewrites: settings.agent.max_rewrites,
                service_timeout: settings.agent.service_timeout(),
                prompts,
            },
        )
    }

    pub fn retriever(&self) -> &RetrieverTool {
        &self.retriever
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one turn to completion, appending to `state` as nodes succeed
    pub async fn run_turn(&self, state: &mut ConversationState) -> RagResult<TurnReport> {
        let mut report = TurnReport::default();
        let mut node = Node::Decide;

        while node != Node::Terminal {
            debug!(%node, messages = state.len(), "entering node");
            report.visited.push(node);
            node = self.step(node, state, &mut report.rewrites).await?;
        }

        info!(
            nodes = report.visited.len(),
            rewrites = report.rewrites,
            messages = state.len(),
            "turn complete"
        );
        Ok(report)
    }

    /// Convenience wrapper that owns the state for the caller
    pub async fn reply(
        &self,
        mut state: ConversationState,
    ) -> RagResult<(ConversationState, TurnReport)> {
        let report = self.run_turn(&mut state).await?;
        Ok((state, report))
    }

    /// Execute a single node and return the one that follows it
    async fn step(
        &self,
        node: Node,
        state: &mut ConversationState,
        rewrites: &mut usize,
    ) -> RagResult<Node> {
        match node {
            Node::Decide => self.decide(state).await,
            Node::Retrieve => self.retrieve(state).await,
            Node::Grade => self.grade(state, *rewrites).await,
            Node::Rewrite => {
                self.rewrite(state).await?;
                *rewrites += 1;
                warn!(rewrites = *rewrites, max = self.config.max_rewrites, "context not relevant, rewrote question");
                Ok(Node::Decide)
            }
            Node::Answer => self.answer(state).await,
            Node::Respond => Ok(Node::Terminal),
            Node::Terminal => Ok(Node::Terminal),
        }
    }

    async fn decide(&self, state: &mut ConversationState) -> RagResult<Node> {
        let tools = [self.retriever.tool()];
        let reply = self
            .call(
                Service::Generation,
                self.generator.complete_tool_aware(state.messages(), &tools),
            )
            .await?;

        if !reply.has_tool_request() {
            state.append(reply);
            return Ok(Node::Respond);
        }

        for request in reply.tool_requests() {
            let call = request
                .tool_call
                .as_ref()
                .map_err(|e| RagError::MalformedToolCall(e.to_string()))?;
            if call.name != self.retriever.name() {
                return Err(RagError::configuration(format!(
                    "model requested unknown tool '{}'",
                    call.name
                )));
            }
        }
        state.append(reply);
        Ok(Node::Retrieve)
    }

    async fn retrieve(&self, state: &mut ConversationState) -> RagResult<Node> {
        let requests: Vec<ToolRequest> = state
            .last()
            .tool_requests()
            .into_iter()
            .cloned()
            .collect();

        // run every request before appending so a failure leaves no partial results
        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            let call = request
                .tool_call
                .map_err(|e| RagError::MalformedToolCall(e.to_string()))?;
            debug!(tool = %call.name, arguments = %call.arguments, "retrieving");
            let output = self
                .call(Service::DocumentStore, self.retriever.invoke(&call.arguments))
                .await?;
            responses.push(Message::tool().with_tool_response(request.id, Ok(output)));
        }

        for response in responses {
            state.append(response);
        }
        Ok(Node::Grade)
    }

    async fn grade(&self, state: &ConversationState, rewrites: usize) -> RagResult<Node> {
        let question = state.question();
        let context = state.context();
        let verdict = self
            .call(Service::Grading, self.grader.grade(&question, &context))
            .await?;
        debug!(?verdict, "graded context");

        match verdict {
            GradeVerdict::Yes => Ok(Node::Answer),
            GradeVerdict::No if rewrites >= self.config.max_rewrites => {
                Err(RagError::UnboundedRewriteLoop { rewrites })
            }
            GradeVerdict::No => Ok(Node::Rewrite),
        }
    }

    async fn rewrite(&self, state: &mut ConversationState) -> RagResult<()> {
        let question = state.question();
        let prompt = self.config.prompts.rewrite.render(&PromptVars {
            question: &question,
            context: None,
        })?;
        let reply = self
            .call(Service::Generation, self.generator.complete(&prompt))
            .await?;
        state.append(Message::user().with_text(reply.text()));
        Ok(())
    }

    async fn answer(&self, state: &mut ConversationState) -> RagResult<Node> {
        let question = state.question();
        let context = state.context();
        let prompt = self.config.prompts.generate.render(&PromptVars {
            question: &question,
            context: Some(&context),
        })?;
        let reply = self
            .call(Service::Generation, self.generator.complete(&prompt))
            .await?;
        state.append(Message::assistant().with_text(reply.text()));
        Ok(Node::Terminal)
    }

    async fn call<T, F>(&self, service: Service, future: F) -> RagResult<T>
    where
        F: Future<Output = RagResult<T>>,
    {
        match timeout(self.config.service_timeout, future).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Timeout {
                service,
                millis: self.config.service_timeout.as_millis() as u64,
            }),
        }
    }
}
