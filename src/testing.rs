//! Scripted collaborators for unit tests

use crate::config::AgentCatalog;
use crate::error::BrainError;
use crate::llm::{ChatCompletion, ChatModel, ChatRequest, Embedder, Embedding};
use crate::models::Usage;
use crate::tools::alarms::{AlarmSource, DeviceAlarm};
use crate::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tempfile::TempDir;

pub const TEST_DIMENSIONS: usize = 32;

/// Every scripted chat reply costs this much
pub fn chat_usage() -> Usage {
    Usage::new(10, 5, 0.001)
}

//
// ================= Embeddings =================
//

/// Bag-of-words hashing embedder: one token per word, free of charge.
/// Identical text always maps to the identical vector.
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            dimensions: TEST_DIMENSIONS,
        }
    }

    fn bucket(&self, word: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dimensions as u64) as usize
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut words = 0u64;
        for word in text.split_whitespace() {
            vector[self.bucket(&word.to_lowercase())] += 1.0;
            words += 1;
        }

        Ok(Embedding {
            vector,
            usage: Usage::embedding(words, 0.0),
        })
    }
}

//
// ================= Chat =================
//

/// Replies keyed by the prompt name found at the start of the system
/// message. Test prompt files contain `prompt:{name}`.
///
/// Each key holds a queue; the last reply repeats once the queue drains.
pub struct MockChatModel {
    replies: Mutex<HashMap<String, VecDeque<String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatModel {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, prompt_name: &str, content: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(prompt_name.to_string())
            .or_default()
            .push_back(content.to_string());
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Prompt names in call order
    pub fn calls(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| prompt_name_of(r))
            .collect()
    }
}

fn prompt_name_of(request: &ChatRequest) -> Option<String> {
    let system = request.messages.first()?;
    let first_line = system.content.lines().next()?;
    first_line.strip_prefix("prompt:").map(str::to_string)
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion> {
        let name = prompt_name_of(&request)
            .ok_or_else(|| BrainError::LlmError("request without test prompt".to_string()))?;
        self.requests.lock().unwrap().push(request);

        let mut replies = self.replies.lock().unwrap();
        let queue = replies
            .get_mut(&name)
            .ok_or_else(|| BrainError::LlmError(format!("no scripted reply for {}", name)))?;

        let content = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };

        Ok(ChatCompletion {
            content,
            usage: chat_usage(),
        })
    }
}

//
// ================= Alarms =================
//

pub struct MockAlarmSource {
    alarms: Vec<DeviceAlarm>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockAlarmSource {
    pub fn new(alarms: Vec<DeviceAlarm>) -> Self {
        Self {
            alarms,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(client_hash, end_time)` of every fetch
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlarmSource for MockAlarmSource {
    async fn fetch(&self, client_hash: &str, end_time: &str) -> Result<Vec<DeviceAlarm>> {
        self.calls
            .lock()
            .unwrap()
            .push((client_hash.to_string(), end_time.to_string()));
        Ok(self.alarms.clone())
    }
}

pub fn alarm(device: &str, component: &str) -> DeviceAlarm {
    DeviceAlarm {
        name: device.to_string(),
        component_name: component.to_string(),
        output: "gearbox_oil_temperature".to_string(),
        status: serde_json::json!("critical"),
        total_above_threshold: serde_json::json!(12),
        rank_text: "High".to_string(),
    }
}

//
// ================= Catalog and prompts =================
//

pub const CATALOG_JSON: &str = r#"{
    "brain_agents": {
        "input_guardrail": { "model": "gpt-4o-mini", "enabled": true, "prompt_name": "input_guardrail", "temperature": 0.0 },
        "rewriter": { "model": "gpt-4o-mini", "enabled": true, "prompt_name": "rewriter", "temperature": 0.0, "use_memory_history": true },
        "intent_classifier": {
            "model": "gpt-4o-mini", "enabled": true, "prompt_name": "intent_classifier", "temperature": 0.0,
            "response_schema": {
                "type": "object",
                "properties": { "intent": { "type": "string" } },
                "required": ["intent"],
                "additionalProperties": false
            }
        }
    },
    "tool_agents": {
        "user_manual": { "model": "gpt-4o", "enabled": true, "prompt_name": "user_manual", "temperature": 0.2, "use_context": true },
        "device_alarms": {
            "model": "gpt-4o-mini", "enabled": true, "prompt_name": "device_alarms", "temperature": 0.0,
            "response_schema": {
                "type": "object",
                "properties": { "device_name": { "type": "string" }, "end_time": { "type": "string" } },
                "required": ["device_name", "end_time"],
                "additionalProperties": false
            }
        },
        "energy_only": { "model": "gpt-4o", "enabled": true, "prompt_name": "energy_only", "temperature": 0.3, "use_memory_history": true }
    },
    "short_term_memory": { "memory_size": 4, "ttl_seconds": 600 },
    "long_term_memory": { "rag_search_k": 2 },
    "embeddings": { "model": "text-embedding-3-small", "dimensions": 32 },
    "guardrail_denied_response": "Sorry, I can only help with energy topics."
}"#;

pub fn catalog() -> AgentCatalog {
    AgentCatalog::from_json(CATALOG_JSON).unwrap()
}

/// Prompt directory with one `prompt:{name}` file per catalog agent
pub fn prompt_dir(catalog: &AgentCatalog) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (_, config) in catalog.agents() {
        let path = dir.path().join(format!("{}.txt", config.prompt_name));
        std::fs::write(path, format!("prompt:{}\n", config.prompt_name)).unwrap();
    }
    dir
}

/// Brain over in-memory backends, an empty knowledge base and `alarms`
pub fn brain(chat: MockChatModel, alarms: Vec<DeviceAlarm>) -> crate::pipeline::Brain {
    use crate::agent::AgentManager;
    use crate::knowledge::{InMemoryKnowledgeStore, KnowledgeBase};
    use crate::memory::{InMemoryLongTermStore, InMemoryShortTermMemory, LongTermMemory};
    use crate::tools::ToolRegistry;
    use std::sync::Arc;

    let catalog = catalog();
    // Prompts are read once, so the directory can go away afterwards
    let prompts = prompt_dir(&catalog);
    let embedder = Arc::new(MockEmbedder::new());

    let short_term = Arc::new(InMemoryShortTermMemory::new(
        catalog.short_term_memory.memory_size,
        catalog.short_term_memory.ttl(),
    ));
    let long_term = Arc::new(LongTermMemory::new(
        embedder.clone(),
        Arc::new(InMemoryLongTermStore::new(TEST_DIMENSIONS)),
        catalog.long_term_memory.rag_search_k,
    ));
    let agents = Arc::new(
        AgentManager::new(
            &catalog,
            prompts.path(),
            Arc::new(chat),
            short_term.clone(),
            long_term.clone(),
        )
        .unwrap(),
    );

    crate::pipeline::Brain::new(
        agents.clone(),
        ToolRegistry::with_defaults(agents, Arc::new(MockAlarmSource::new(alarms))),
        Arc::new(KnowledgeBase::new(
            embedder,
            Arc::new(InMemoryKnowledgeStore::new(TEST_DIMENSIONS)),
        )),
        short_term,
        long_term,
        catalog.guardrail_denied_response.clone(),
    )
}

//
// ================= Postgres =================
//

pub const TEST_PG_DSN_VAR: &str = "AGENT_TEST_PG_DSN";

/// Pool for tests that need a real server; `None` when the DSN is unset
pub async fn test_pool() -> Option<sqlx::PgPool> {
    let dsn = std::env::var(TEST_PG_DSN_VAR).ok()?;
    Some(
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&dsn)
            .await
            .unwrap(),
    )
}
