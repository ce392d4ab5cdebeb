//! Configured LLM agents
//!
//! An agent is one model call with a fixed prompt. Depending on its
//! configuration the system message also carries recent turns, recalled
//! long-term memories and caller-supplied context:
//!
//! PROMPT → SHORT-TERM MEMORY? → LONG-TERM MEMORY? → CONTEXT? → MODEL

use crate::config::{read_text, AgentCatalog, AgentConfig};
use crate::error::BrainError;
use crate::llm::{ChatMessage, ChatModel, ChatRequest, ResponseSchema};
use crate::memory::{LongTermMemory, ShortTermMemory};
use crate::models::{AgentReply, AgentResult, MemoryScope, Role, Usage};
use crate::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const HISTORY_HEADER: &str = "Conversation history (reference only, do not continue):";

/// Per-call inputs that are not part of the agent configuration
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub scope: MemoryScope,
    pub context_text: Option<String>,
}

impl AgentContext {
    pub fn new(scope: MemoryScope) -> Self {
        Self {
            scope,
            context_text: None,
        }
    }

    pub fn with_context(mut self, context_text: impl Into<String>) -> Self {
        self.context_text = Some(context_text.into());
        self
    }
}

pub struct Agent {
    name: String,
    config: AgentConfig,
    system_prompt: String,
    chat: Arc<dyn ChatModel>,
    short_term: Arc<dyn ShortTermMemory>,
    long_term: Arc<LongTermMemory>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        config: AgentConfig,
        prompt_dir: &Path,
        chat: Arc<dyn ChatModel>,
        short_term: Arc<dyn ShortTermMemory>,
        long_term: Arc<LongTermMemory>,
    ) -> Result<Self> {
        let prompt_path = prompt_dir.join(format!("{}.txt", config.prompt_name));
        let system_prompt = read_text(&prompt_path)?.trim().to_string();

        Ok(Self {
            name: name.into(),
            config,
            system_prompt,
            chat,
            short_term,
            long_term,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub async fn run(&self, input: &str, ctx: &AgentContext) -> Result<AgentResult> {
        if !self.config.enabled {
            debug!(agent = %self.name, "Agent disabled, echoing input");
            return Ok(AgentResult::text(input, Usage::zero()));
        }

        let start = Instant::now();
        let (system, recall_usage) = self.system_message(input, ctx).await?;

        let request = ChatRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            messages: vec![ChatMessage::system(system), ChatMessage::user(input)],
            response_schema: self.config.response_schema.clone().map(|schema| ResponseSchema {
                name: self.name.clone(),
                schema,
            }),
        };

        let completion = self.chat.complete(request).await?;
        let reply = self.parse_reply(completion.content)?;
        let usage = completion.usage + recall_usage;

        info!(
            agent = %self.name,
            model = %self.config.model,
            tokens = usage.tokens_total,
            cost_usd = usage.cost_usd,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Agent completed"
        );

        Ok(AgentResult { reply, usage })
    }

    fn parse_reply(&self, content: String) -> Result<AgentReply> {
        if self.config.response_schema.is_none() {
            return Ok(AgentReply::Text(content));
        }

        serde_json::from_str(content.trim())
            .map(AgentReply::Structured)
            .map_err(|e| BrainError::InvalidStructuredOutput {
                agent: self.name.clone(),
                detail: e.to_string(),
            })
    }

    /// System message plus the embedding usage spent on recall
    async fn system_message(&self, input: &str, ctx: &AgentContext) -> Result<(String, Usage)> {
        let mut sections = vec![self.system_prompt.clone()];
        let mut usage = Usage::zero();

        if self.config.use_memory_history {
            let turns = self.short_term.recent(&ctx.scope).await?;
            if !turns.is_empty() {
                let lines: Vec<String> = turns
                    .iter()
                    .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
                    .collect();
                sections.push(format!(
                    "=== SHORT-TERM MEMORY ===\n{}\n{}",
                    HISTORY_HEADER,
                    lines.join("\n")
                ));
            }

            let (records, recall_usage) = self
                .long_term
                .recall(&ctx.scope, input, self.long_term.search_k())
                .await?;
            usage += recall_usage;

            if !records.is_empty() {
                let lines: Vec<String> = records
                    .iter()
                    .map(|record| {
                        let label = record.role.unwrap_or(Role::Assistant).label();
                        format!("{}: {}", label, record.message)
                    })
                    .collect();
                sections.push(format!(
                    "=== LONG-TERM MEMORY ===\n{}\n{}",
                    HISTORY_HEADER,
                    lines.join("\n")
                ));
            }
        }

        if self.config.use_context {
            if let Some(context) = ctx
                .context_text
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
            {
                sections.push(format!("=== CONTEXT ===\n{}", context));
            }
        }

        Ok((sections.join("\n\n"), usage))
    }
}

/// Every agent of the catalog, built once
pub struct AgentManager {
    agents: HashMap<String, Agent>,
}

impl AgentManager {
    pub fn new(
        catalog: &AgentCatalog,
        prompt_dir: &Path,
        chat: Arc<dyn ChatModel>,
        short_term: Arc<dyn ShortTermMemory>,
        long_term: Arc<LongTermMemory>,
    ) -> Result<Self> {
        let mut agents = HashMap::new();

        for (name, config) in catalog.agents() {
            let agent = Agent::new(
                name.clone(),
                config.clone(),
                prompt_dir,
                chat.clone(),
                short_term.clone(),
                long_term.clone(),
            )?;
            agents.insert(name.clone(), agent);
        }

        info!(agents = agents.len(), "Agents loaded");
        Ok(Self { agents })
    }

    pub fn get(&self, name: &str) -> Result<&Agent> {
        self.agents
            .get(name)
            .ok_or_else(|| BrainError::AgentNotFound(name.to_string()))
    }

    pub async fn run(&self, name: &str, input: &str, ctx: &AgentContext) -> Result<AgentResult> {
        self.get(name)?.run(input, ctx).await
    }
}
