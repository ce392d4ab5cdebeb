//! Process settings and the agent catalog
//!
//! Settings come from the environment (after `.env` is loaded); the agent
//! catalog is a JSON file read once at startup.

use crate::error::BrainError;
use crate::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_SHORT_TERM_TTL_SECS: u64 = 600;
pub const DEFAULT_DENIED_RESPONSE: &str =
    "The message is outside the agent's guidelines. Please try again.";

/// Process-level settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub database_url: Option<String>,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub agent_config_path: PathBuf,
    pub prompt_dir: PathBuf,
    pub alarms_api_url: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => raw
                .parse()
                .map_err(|_| BrainError::ConfigError(format!("Invalid PORT value: {}", raw)))?,
            Err(_) => DEFAULT_PORT,
        };

        let database_url = env::var("DATABASE_URL")
            .or_else(|_| env::var("POSTGRES_URL"))
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            port,
            database_url,
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
            agent_config_path: env::var("AGENT_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/agent_config.json")),
            prompt_dir: env::var("PROMPT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("prompts")),
            alarms_api_url: env::var("ALARMS_API_URL").ok().filter(|v| !v.trim().is_empty()),
            cors_origins: parse_origins(&env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".into())),
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

//
// ================= Agent Catalog =================
//

/// Per-agent model settings
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub model: String,
    pub enabled: bool,
    pub prompt_name: String,
    pub temperature: f32,
    #[serde(default)]
    pub use_context: bool,
    #[serde(default)]
    pub use_memory_history: bool,
    /// JSON schema for structured output; absent means free text
    #[serde(default)]
    pub response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShortTermMemoryConfig {
    pub memory_size: usize,
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
}

impl ShortTermMemoryConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

fn default_ttl() -> u64 {
    DEFAULT_SHORT_TERM_TTL_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct LongTermMemoryConfig {
    pub rag_search_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimensions: usize,
}

/// The full agent catalog file
#[derive(Debug, Clone, Deserialize)]
pub struct AgentCatalog {
    #[serde(default)]
    pub brain_agents: BTreeMap<String, AgentConfig>,
    #[serde(default)]
    pub tool_agents: BTreeMap<String, AgentConfig>,
    pub short_term_memory: ShortTermMemoryConfig,
    pub long_term_memory: LongTermMemoryConfig,
    pub embeddings: EmbeddingsConfig,
    #[serde(default = "default_denied_response")]
    pub guardrail_denied_response: String,
}

fn default_denied_response() -> String {
    DEFAULT_DENIED_RESPONSE.to_string()
}

impl AgentCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = read_text(path)?;
        Self::from_json(&raw)
            .map_err(|e| BrainError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let catalog: AgentCatalog = serde_json::from_str(raw)
            .map_err(|e| BrainError::ConfigError(format!("Invalid agent catalog: {}", e)))?;

        if catalog.embeddings.dimensions == 0 {
            return Err(BrainError::ConfigError(
                "embeddings.dimensions must be greater than zero".to_string(),
            ));
        }

        Ok(catalog)
    }

    /// All agents, brain agents first
    pub fn agents(&self) -> impl Iterator<Item = (&String, &AgentConfig)> {
        self.brain_agents.iter().chain(self.tool_agents.iter())
    }
}

/// Read a UTF-8 file, reporting the missing path in the error
pub fn read_text(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(BrainError::ConfigError(format!(
            "File not found: {}",
            path.display()
        )));
    }
    Ok(std::fs::read_to_string(path)?)
}
