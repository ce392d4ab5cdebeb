//! The brain: one request through the whole agent chain
//!
//! GUARDRAIL → REMEMBER USER → REWRITE → KNOWLEDGE SEARCH → CLASSIFY → TOOL →
//! REMEMBER ASSISTANT
//!
//! Every outbound model call contributes to the usage returned to the caller.

use crate::agent::{AgentContext, AgentManager};
use crate::intent::{Intent, CLASSIFIER_AGENT};
use crate::knowledge::{join_documents, KnowledgeBase};
use crate::memory::{LongTermMemory, ShortTermMemory};
use crate::models::{AgentOutcome, BrainRequest, Role, Usage};
use crate::tools::{ToolRegistry, ToolRequest};
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

pub const GUARDRAIL_AGENT: &str = "input_guardrail";
pub const REWRITER_AGENT: &str = "rewriter";
pub const USER_AGENT_NAME: &str = "user";
pub const GUARDRAIL_DENIED: &str = "DENIED";
pub const KNOWLEDGE_TOP_N: usize = 5;

pub struct Brain {
    agents: Arc<AgentManager>,
    tools: ToolRegistry,
    knowledge: Arc<KnowledgeBase>,
    short_term: Arc<dyn ShortTermMemory>,
    long_term: Arc<LongTermMemory>,
    denied_response: String,
}

impl Brain {
    pub fn new(
        agents: Arc<AgentManager>,
        tools: ToolRegistry,
        knowledge: Arc<KnowledgeBase>,
        short_term: Arc<dyn ShortTermMemory>,
        long_term: Arc<LongTermMemory>,
        denied_response: impl Into<String>,
    ) -> Self {
        Self {
            agents,
            tools,
            knowledge,
            short_term,
            long_term,
            denied_response: denied_response.into(),
        }
    }

    pub async fn handle(&self, request: &BrainRequest) -> Result<AgentOutcome> {
        let start = Instant::now();
        let request_id = Uuid::new_v4();
        let scope = request.scope();
        let ctx = AgentContext::new(scope.clone());

        info!(
            %request_id,
            user_id = %request.user_id,
            session_id = %request.session_id,
            "Brain request received"
        );

        let guardrail = self.agents.run(GUARDRAIL_AGENT, &request.message, &ctx).await?;
        if guardrail.reply.as_text().map(str::trim) == Some(GUARDRAIL_DENIED) {
            info!(%request_id, user_id = %request.user_id, "Message denied by guardrail");
            return Ok(AgentOutcome::new(&self.denied_response, guardrail.usage));
        }

        self.short_term
            .append(&scope, Role::User, &request.message)
            .await?;
        let user_memory = self
            .long_term
            .remember(&scope, USER_AGENT_NAME, Role::User, &request.message, Usage::zero())
            .await?;

        let rewritten = self.agents.run(REWRITER_AGENT, &request.message, &ctx).await?;
        let rewritten_text = rewritten.reply.clone().into_text();
        debug!(rewritten = %rewritten_text, "Message rewritten");

        let (documents, search_usage) = self
            .knowledge
            .search(&rewritten_text, KNOWLEDGE_TOP_N)
            .await?;

        let classified = self.agents.run(CLASSIFIER_AGENT, &rewritten_text, &ctx).await?;
        let intent = Intent::from_reply(&classified.reply);
        info!(intent = %intent, documents = documents.len(), "Message routed");

        let mut tool_request = ToolRequest::new(scope.clone(), &request.client_hash, &rewritten_text);
        if intent == Intent::UserManual {
            tool_request = tool_request.with_context(join_documents(&documents));
        }

        let tool = self.tools.get(intent)?;
        let answer = tool.run(&tool_request).await?;
        let response = answer.reply.into_text();

        self.short_term
            .append(&scope, Role::Assistant, &response)
            .await?;

        let usage = guardrail.usage
            + user_memory
            + rewritten.usage
            + search_usage
            + classified.usage
            + answer.usage;

        let total = self
            .long_term
            .remember(&scope, tool.name(), Role::Assistant, &response, usage)
            .await?;

        info!(
            %request_id,
            intent = %intent,
            tokens = total.tokens_total,
            cost_usd = total.cost_usd,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Brain request completed"
        );

        Ok(AgentOutcome::new(response, total))
    }

    /// Run one tool directly, without guardrail or memory writes
    pub async fn run_tool(&self, intent: Intent, request: &ToolRequest) -> Result<AgentOutcome> {
        let tool = self.tools.get(intent)?;
        let result = tool.run(request).await?;

        info!(
            tool = tool.name(),
            tokens = result.usage.tokens_total,
            cost_usd = result.usage.cost_usd,
            "Tool request completed"
        );

        Ok(result.into())
    }
}
