//! Tool agents and the intent-keyed registry
//!
//! Each tool answers one kind of question. The brain picks a tool from the
//! registry by intent; the HTTP layer also exposes some tools directly.

pub mod alarms;

use crate::agent::{AgentContext, AgentManager};
use crate::error::BrainError;
use crate::intent::Intent;
use crate::models::{AgentResult, MemoryScope};
use crate::Result;
use alarms::{format_alarms, AlarmSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub use alarms::{DeviceAlarm, HttpAlarmSource};

pub const ASK_DEVICE_NAME: &str = "Please provide the device name so I can look up its alarms.";

/// Input shared by every tool
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub scope: MemoryScope,
    pub client_hash: String,
    pub message: String,
    pub context_text: Option<String>,
}

impl ToolRequest {
    pub fn new(scope: MemoryScope, client_hash: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            scope,
            client_hash: client_hash.into(),
            message: message.into(),
            context_text: None,
        }
    }

    pub fn with_context(mut self, context_text: impl Into<String>) -> Self {
        self.context_text = Some(context_text.into());
        self
    }

    fn agent_context(&self) -> AgentContext {
        let ctx = AgentContext::new(self.scope.clone());
        match &self.context_text {
            Some(text) => ctx.with_context(text.clone()),
            None => ctx,
        }
    }
}

#[async_trait]
pub trait ToolAgent: Send + Sync {
    /// Agent name the tool's answers are recorded under
    fn name(&self) -> &'static str;
    async fn run(&self, request: &ToolRequest) -> Result<AgentResult>;
}

//
// ================= Registry =================
//

pub struct ToolRegistry {
    tools: HashMap<Intent, Arc<dyn ToolAgent>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// The three standard tools
    pub fn with_defaults(agents: Arc<AgentManager>, alarms: Arc<dyn AlarmSource>) -> Self {
        let mut registry = Self::new();
        registry.register(Intent::UserManual, Arc::new(UserManualTool::new(agents.clone())));
        registry.register(
            Intent::DeviceAlarms,
            Arc::new(DeviceAlarmsTool::new(agents.clone(), alarms)),
        );
        registry.register(Intent::EnergyOnly, Arc::new(EnergyOnlyTool::new(agents)));
        registry
    }

    pub fn register(&mut self, intent: Intent, tool: Arc<dyn ToolAgent>) {
        self.tools.insert(intent, tool);
    }

    pub fn get(&self, intent: Intent) -> Result<Arc<dyn ToolAgent>> {
        self.tools
            .get(&intent)
            .cloned()
            .ok_or_else(|| BrainError::ToolError(format!("No tool registered for {}", intent)))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Tools =================
//

/// Answers from manual excerpts supplied as context
pub struct UserManualTool {
    agents: Arc<AgentManager>,
}

impl UserManualTool {
    pub fn new(agents: Arc<AgentManager>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl ToolAgent for UserManualTool {
    fn name(&self) -> &'static str {
        Intent::UserManual.agent_name()
    }

    async fn run(&self, request: &ToolRequest) -> Result<AgentResult> {
        self.agents
            .run(self.name(), &request.message, &request.agent_context())
            .await
    }
}

/// Extracts device and date from the message, then reports that device's alarms
pub struct DeviceAlarmsTool {
    agents: Arc<AgentManager>,
    alarms: Arc<dyn AlarmSource>,
}

impl DeviceAlarmsTool {
    pub fn new(agents: Arc<AgentManager>, alarms: Arc<dyn AlarmSource>) -> Self {
        Self { agents, alarms }
    }
}

#[async_trait]
impl ToolAgent for DeviceAlarmsTool {
    fn name(&self) -> &'static str {
        Intent::DeviceAlarms.agent_name()
    }

    async fn run(&self, request: &ToolRequest) -> Result<AgentResult> {
        let extracted = self
            .agents
            .run(self.name(), &request.message, &request.agent_context())
            .await?;

        let device_name = extracted.reply.field("device_name").unwrap_or("").trim();
        if device_name.is_empty() {
            return Ok(AgentResult::text(ASK_DEVICE_NAME, extracted.usage));
        }

        let end_time = match extracted.reply.field("end_time").map(str::trim) {
            Some(date) if !date.is_empty() => date.to_string(),
            _ => chrono::Local::now().format("%Y-%m-%d").to_string(),
        };

        let all = self.alarms.fetch(&request.client_hash, &end_time).await?;
        let matching: Vec<&DeviceAlarm> = all.iter().filter(|a| a.name == device_name).collect();

        info!(
            device = device_name,
            end_time = %end_time,
            total = all.len(),
            matching = matching.len(),
            "Device alarms resolved"
        );

        Ok(AgentResult::text(
            format_alarms(device_name, &end_time, &matching),
            extracted.usage,
        ))
    }
}

/// General energy questions
pub struct EnergyOnlyTool {
    agents: Arc<AgentManager>,
}

impl EnergyOnlyTool {
    pub fn new(agents: Arc<AgentManager>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl ToolAgent for EnergyOnlyTool {
    fn name(&self) -> &'static str {
        Intent::EnergyOnly.agent_name()
    }

    async fn run(&self, request: &ToolRequest) -> Result<AgentResult> {
        self.agents
            .run(self.name(), &request.message, &request.agent_context())
            .await
    }
}
