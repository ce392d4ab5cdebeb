//! LLM provider seam
//!
//! Agents talk to a [`ChatModel`]; memory and the knowledge base talk to an
//! [`Embedder`]. The OpenAI client implements both.

use crate::models::Usage;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod openai;
pub mod pricing;

pub use openai::OpenAiClient;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// JSON schema the reply must follow
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
    pub response_schema: Option<ResponseSchema>,
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Usage,
}

#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub usage: Usage,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this embedder returns
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Embedding>;
}
