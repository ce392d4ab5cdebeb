//! Postgres connection and schema bootstrap
//!
//! Schema creation runs once per process, on first use, the same way for
//! every store that shares the pool.

use crate::error::BrainError;
use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    dimensions: usize,
    schema_ready: Arc<OnceCell<()>>,
}

impl Database {
    /// Lazily connecting pool; nothing touches the network until first use
    pub fn connect_lazy(url: &str, dimensions: usize) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_lazy(url)
            .map_err(|e| BrainError::database("Failed to create connection pool", e))?;

        Ok(Self {
            pool,
            dimensions,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Pool with the schema guaranteed to exist
    pub async fn pool(&self) -> Result<&PgPool> {
        self.schema_ready
            .get_or_try_init(|| async {
                for statement in schema_statements(self.dimensions) {
                    sqlx::query(&statement).execute(&self.pool).await?;
                }
                info!(dimensions = self.dimensions, "Agent schema ready");
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| BrainError::database("Failed to initialize agent schema", e))?;

        Ok(&self.pool)
    }
}

fn schema_statements(dimensions: usize) -> Vec<String> {
    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        "CREATE SCHEMA IF NOT EXISTS agent".to_string(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS agent.long_term_memory (
              id BIGSERIAL PRIMARY KEY,
              user_id TEXT NOT NULL,
              session_id TEXT,
              agent_name TEXT,
              role TEXT,
              message TEXT,
              embedding vector({dimensions}),
              created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
              usage_info JSONB
            )
            "#
        ),
        r#"
        CREATE INDEX IF NOT EXISTS long_term_memory_embedding_idx
        ON agent.long_term_memory USING hnsw (embedding vector_cosine_ops)
        "#
        .to_string(),
        r#"
        CREATE INDEX IF NOT EXISTS long_term_memory_user_idx
        ON agent.long_term_memory (user_id)
        "#
        .to_string(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS agent.agent_knowledge_embeddings (
              id BIGSERIAL PRIMARY KEY,
              application TEXT,
              file_name TEXT,
              content TEXT,
              embedding vector({dimensions}),
              content_hash TEXT,
              CONSTRAINT embeddings_content_hash_key UNIQUE (content_hash)
            )
            "#
        ),
        r#"
        CREATE INDEX IF NOT EXISTS embeddings_embedding_idx
        ON agent.agent_knowledge_embeddings USING hnsw (embedding vector_cosine_ops)
        "#
        .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS agent.short_term_sessions (
          memory_key TEXT PRIMARY KEY,
          expires_at TIMESTAMPTZ NOT NULL
        )
        "#
        .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS agent.short_term_memory (
          id BIGSERIAL PRIMARY KEY,
          memory_key TEXT NOT NULL,
          role TEXT NOT NULL,
          content TEXT NOT NULL,
          created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#
        .to_string(),
        r#"
        CREATE INDEX IF NOT EXISTS short_term_memory_key_idx
        ON agent.short_term_memory (memory_key, id)
        "#
        .to_string(),
    ]
}
