//! Core data models for the agent brain

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

//
// ================= Usage =================
//

/// Token and cost counters for one or more outbound model calls.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub tokens_prompt: u64,
    pub tokens_completion: u64,
    pub tokens_total: u64,
    pub cost_usd: f64,
}

impl Usage {
    pub fn new(tokens_prompt: u64, tokens_completion: u64, cost_usd: f64) -> Self {
        Self {
            tokens_prompt,
            tokens_completion,
            tokens_total: tokens_prompt + tokens_completion,
            cost_usd,
        }
    }

    /// Embeddings consume prompt tokens only.
    pub fn embedding(total_tokens: u64, cost_usd: f64) -> Self {
        Self::new(total_tokens, 0, cost_usd)
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, other: Usage) -> Usage {
        Usage {
            tokens_prompt: self.tokens_prompt + other.tokens_prompt,
            tokens_completion: self.tokens_completion + other.tokens_completion,
            tokens_total: self.tokens_total + other.tokens_total,
            cost_usd: self.cost_usd + other.cost_usd,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Usage) {
        *self = *self + other;
    }
}

impl Sum for Usage {
    fn sum<I: Iterator<Item = Usage>>(iter: I) -> Usage {
        iter.fold(Usage::zero(), Add::add)
    }
}

//
// ================= Conversation =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    /// Label used when rendering history into a prompt
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies whose memory an operation reads or writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryScope {
    pub user_id: String,
    pub session_id: String,
}

impl MemoryScope {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Key of the short-term memory list for this session
    pub fn session_key(&self) -> String {
        format!("user:{}:session:{}", self.user_id, self.session_id)
    }
}

//
// ================= Agent Output =================
//

/// Raw reply of an agent: free text, or JSON when the agent has a schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AgentReply {
    Text(String),
    Structured(serde_json::Value),
}

impl AgentReply {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AgentReply::Text(text) => Some(text),
            AgentReply::Structured(_) => None,
        }
    }

    /// Read a string field from a structured reply
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            AgentReply::Structured(value) => value.get(name).and_then(|v| v.as_str()),
            AgentReply::Text(_) => None,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            AgentReply::Text(text) => text,
            AgentReply::Structured(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentResult {
    pub reply: AgentReply,
    pub usage: Usage,
}

impl AgentResult {
    pub fn text(text: impl Into<String>, usage: Usage) -> Self {
        Self {
            reply: AgentReply::Text(text.into()),
            usage,
        }
    }
}

/// Final answer returned to API callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentOutcome {
    pub response: String,
    #[serde(flatten)]
    pub usage: Usage,
}

impl AgentOutcome {
    pub fn new(response: impl Into<String>, usage: Usage) -> Self {
        Self {
            response: response.into(),
            usage,
        }
    }
}

impl From<AgentResult> for AgentOutcome {
    fn from(result: AgentResult) -> Self {
        Self {
            response: result.reply.into_text(),
            usage: result.usage,
        }
    }
}

//
// ================= Requests =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainRequest {
    pub user_id: String,
    pub session_id: String,
    pub client_hash: String,
    pub message: String,
}

impl BrainRequest {
    pub fn scope(&self) -> MemoryScope {
        MemoryScope::new(&self.user_id, &self.session_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserManualRequest {
    pub user_id: String,
    pub session_id: String,
    pub client_hash: String,
    pub context: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAlarmsRequest {
    pub user_id: String,
    pub session_id: String,
    pub client_hash: String,
    pub message: String,
}

//
// ================= Retrieval =================
//

/// Knowledge-base chunk returned by similarity search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarDocument {
    pub id: i64,
    pub file_name: Option<String>,
    pub application: Option<String>,
    pub content: String,
    pub score: f64,
}

/// Long-term memory record returned by similarity search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecalledMemory {
    pub id: i64,
    pub user_id: String,
    pub session_id: Option<String>,
    pub agent_name: Option<String>,
    pub role: Option<Role>,
    pub message: String,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_sum() {
        let total: Usage = vec![
            Usage::new(10, 5, 0.001),
            Usage::embedding(7, 0.0002),
            Usage::zero(),
        ]
        .into_iter()
        .sum();

        assert_eq!(total.tokens_prompt, 17);
        assert_eq!(total.tokens_completion, 5);
        assert_eq!(total.tokens_total, 22);
        assert!((total.cost_usd - 0.0012).abs() < 1e-12);
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let outcome = AgentOutcome::new("hello", Usage::new(3, 2, 0.5));
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["response"], "hello");
        assert_eq!(json["tokens_prompt"], 3);
        assert_eq!(json["tokens_completion"], 2);
        assert_eq!(json["tokens_total"], 5);
        assert_eq!(json["cost_usd"], 0.5);
    }

    #[test]
    fn test_session_key() {
        let scope = MemoryScope::new("u1", "s9");
        assert_eq!(scope.session_key(), "user:u1:session:s9");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("USER"), Some(Role::User));
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), None);
    }

    #[test]
    fn test_structured_reply_field() {
        let reply = AgentReply::Structured(serde_json::json!({ "intent": "user_manual" }));
        assert_eq!(reply.field("intent"), Some("user_manual"));
        assert_eq!(reply.field("missing"), None);
        assert_eq!(AgentReply::Text("x".into()).field("intent"), None);
    }
}
