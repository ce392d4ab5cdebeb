//! Error types for the agent brain

use thiserror::Error;

/// Result type alias for brain operations
pub type Result<T> = std::result::Result<T, BrainError>;

#[derive(Error, Debug)]
pub enum BrainError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Invalid structured output from agent '{agent}': {detail}")]
    InvalidStructuredOutput { agent: String, detail: String },

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Memory error: {0}")]
    MemoryError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Ingestion error: {0}")]
    IngestError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BrainError {
    pub(crate) fn database(context: &str, err: sqlx::Error) -> Self {
        BrainError::DatabaseError(format!("{}: {}", context, err))
    }
}
