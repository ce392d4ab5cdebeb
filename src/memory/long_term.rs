//! Long-term memory: every message persisted with its embedding and
//! recalled by cosine similarity within the same user.

use super::similarity::{cosine_similarity, top_k};
use crate::db::Database;
use crate::error::BrainError;
use crate::llm::Embedder;
use crate::models::{MemoryScope, RecalledMemory, Role, Usage};
use crate::Result;
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::types::Json;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A message about to be persisted
#[derive(Debug, Clone)]
pub struct NewMemoryRecord {
    pub user_id: String,
    pub session_id: String,
    pub agent_name: String,
    pub role: Role,
    pub message: String,
    pub embedding: Vec<f32>,
    pub usage: Usage,
}

#[async_trait]
pub trait LongTermStore: Send + Sync {
    async fn insert(&self, record: NewMemoryRecord) -> Result<i64>;

    /// Most similar records of `user_id`, best first
    async fn search(
        &self,
        user_id: &str,
        embedding: &[f32],
        top_n: usize,
    ) -> Result<Vec<RecalledMemory>>;
}

fn check_dimensions(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(BrainError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

//
// ================= In-memory backend =================
//

pub struct InMemoryLongTermStore {
    dimensions: usize,
    records: Arc<RwLock<Vec<(i64, NewMemoryRecord)>>>,
}

impl InMemoryLongTermStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Snapshot of everything stored, in insertion order
    pub async fn records(&self) -> Vec<NewMemoryRecord> {
        self.records
            .read()
            .await
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }
}

#[async_trait]
impl LongTermStore for InMemoryLongTermStore {
    async fn insert(&self, record: NewMemoryRecord) -> Result<i64> {
        check_dimensions(self.dimensions, record.embedding.len())?;

        let mut records = self.records.write().await;
        let id = records.len() as i64 + 1;
        records.push((id, record));
        Ok(id)
    }

    async fn search(
        &self,
        user_id: &str,
        embedding: &[f32],
        top_n: usize,
    ) -> Result<Vec<RecalledMemory>> {
        check_dimensions(self.dimensions, embedding.len())?;

        let records = self.records.read().await;
        let scored: Vec<_> = records
            .iter()
            .filter(|(_, record)| record.user_id == user_id)
            .map(|(id, record)| (cosine_similarity(&record.embedding, embedding), (id, record)))
            .collect();

        Ok(top_k(scored, top_n)
            .into_iter()
            .map(|(score, (id, record))| RecalledMemory {
                id: *id,
                user_id: record.user_id.clone(),
                session_id: Some(record.session_id.clone()),
                agent_name: Some(record.agent_name.clone()),
                role: Some(record.role),
                message: record.message.clone(),
                score,
            })
            .collect())
    }
}

//
// ================= Postgres + pgvector backend =================
//

pub struct PgLongTermStore {
    db: Database,
}

impl PgLongTermStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LongTermStore for PgLongTermStore {
    async fn insert(&self, record: NewMemoryRecord) -> Result<i64> {
        check_dimensions(self.db.dimensions(), record.embedding.len())?;
        let pool = self.db.pool().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO agent.long_term_memory
              (user_id, session_id, agent_name, role, message, embedding, usage_info)
            VALUES
              ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.session_id)
        .bind(&record.agent_name)
        .bind(record.role.as_str())
        .bind(&record.message)
        .bind(Vector::from(record.embedding))
        .bind(Json(record.usage))
        .fetch_one(pool)
        .await
        .map_err(|e| BrainError::database("Failed to insert long-term memory", e))?;

        row.try_get("id")
            .map_err(|e| BrainError::database("Failed to read long-term memory id", e))
    }

    async fn search(
        &self,
        user_id: &str,
        embedding: &[f32],
        top_n: usize,
    ) -> Result<Vec<RecalledMemory>> {
        check_dimensions(self.db.dimensions(), embedding.len())?;
        let pool = self.db.pool().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, session_id, agent_name, role, message,
                   1 - (embedding <=> $1) AS cosine_similarity
            FROM agent.long_term_memory
            WHERE user_id = $2
            ORDER BY embedding <=> $1
            LIMIT $3
            "#,
        )
        .bind(Vector::from(embedding.to_vec()))
        .bind(user_id)
        .bind(top_n as i64)
        .fetch_all(pool)
        .await
        .map_err(|e| BrainError::database("Failed to search long-term memory", e))?;

        rows.iter().map(recalled_from_row).collect()
    }
}

/// Decode one search row; only an unknown role is tolerated (read as none)
fn recalled_from_row(row: &PgRow) -> Result<RecalledMemory> {
    let decode = |e| BrainError::database("Failed to decode long-term memory row", e);

    Ok(RecalledMemory {
        id: row.try_get("id").map_err(decode)?,
        user_id: row.try_get("user_id").map_err(decode)?,
        session_id: row.try_get("session_id").map_err(decode)?,
        agent_name: row.try_get("agent_name").map_err(decode)?,
        role: row
            .try_get::<Option<String>, _>("role")
            .map_err(decode)?
            .and_then(|r| Role::parse(&r)),
        message: row
            .try_get::<Option<String>, _>("message")
            .map_err(decode)?
            .unwrap_or_default(),
        score: row.try_get("cosine_similarity").map_err(decode)?,
    })
}

//
// ================= Provider =================
//

/// Embeds messages on the way in and queries on the way out.
pub struct LongTermMemory {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn LongTermStore>,
    search_k: usize,
}

impl LongTermMemory {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn LongTermStore>, search_k: usize) -> Self {
        Self {
            embedder,
            store,
            search_k,
        }
    }

    /// Default number of records agents recall
    pub fn search_k(&self) -> usize {
        self.search_k
    }

    /// Persist a message; returns `usage` plus the embedding cost, which is
    /// also what gets stored as the record's usage info.
    pub async fn remember(
        &self,
        scope: &MemoryScope,
        agent_name: &str,
        role: Role,
        message: &str,
        usage: Usage,
    ) -> Result<Usage> {
        let embedding = self.embedder.embed(message).await?;
        check_dimensions(self.embedder.dimensions(), embedding.vector.len())?;

        info!(
            role = %role,
            agent = agent_name,
            tokens = embedding.usage.tokens_total,
            cost_usd = embedding.usage.cost_usd,
            "Long-term memory write"
        );

        let total = usage + embedding.usage;

        self.store
            .insert(NewMemoryRecord {
                user_id: scope.user_id.clone(),
                session_id: scope.session_id.clone(),
                agent_name: agent_name.to_string(),
                role,
                message: message.to_string(),
                embedding: embedding.vector,
                usage: total,
            })
            .await?;

        Ok(total)
    }

    /// Records of the scope's user most similar to `query`
    pub async fn recall(
        &self,
        scope: &MemoryScope,
        query: &str,
        top_n: usize,
    ) -> Result<(Vec<RecalledMemory>, Usage)> {
        let embedding = self.embedder.embed(query).await?;
        check_dimensions(self.embedder.dimensions(), embedding.vector.len())?;

        let records = self
            .store
            .search(&scope.user_id, &embedding.vector, top_n)
            .await?;

        debug!(user_id = %scope.user_id, hits = records.len(), "Long-term memory recall");

        Ok((records, embedding.usage))
    }
}
