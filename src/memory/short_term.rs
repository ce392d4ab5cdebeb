//! Short-term memory: recent turns of one session, expiring after a TTL
//!
//! Every write refreshes the expiry of the whole session. Once a session has
//! expired it reads as empty and the next write starts a fresh list.

use crate::db::Database;
use crate::error::BrainError;
use crate::models::{MemoryScope, Role};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// A single message in the recent conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ShortTermMemory: Send + Sync {
    /// Append a turn and refresh the session expiry
    async fn append(&self, scope: &MemoryScope, role: Role, content: &str) -> Result<()>;

    /// Newest turns of the session, oldest first
    async fn recent(&self, scope: &MemoryScope) -> Result<Vec<ConversationTurn>>;
}

//
// ================= In-memory backend =================
//

struct SessionBuffer {
    turns: VecDeque<ConversationTurn>,
    expires_at: Instant,
}

/// Process-local short-term memory for development and tests
pub struct InMemoryShortTermMemory {
    sessions: Arc<RwLock<HashMap<String, SessionBuffer>>>,
    window: usize,
    ttl: Duration,
}

impl InMemoryShortTermMemory {
    pub fn new(window: usize, ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            window,
            ttl,
        }
    }

    /// Drop every expired session
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, buffer| buffer.expires_at > now);
        before - sessions.len()
    }
}

#[async_trait]
impl ShortTermMemory for InMemoryShortTermMemory {
    async fn append(&self, scope: &MemoryScope, role: Role, content: &str) -> Result<()> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        let buffer = sessions
            .entry(scope.session_key())
            .or_insert_with(|| SessionBuffer {
                turns: VecDeque::with_capacity(self.window),
                expires_at: now,
            });

        if buffer.expires_at <= now {
            buffer.turns.clear();
        }

        buffer.turns.push_back(ConversationTurn::new(role, content));
        while buffer.turns.len() > self.window {
            buffer.turns.pop_front();
        }
        buffer.expires_at = now + self.ttl;

        Ok(())
    }

    async fn recent(&self, scope: &MemoryScope) -> Result<Vec<ConversationTurn>> {
        let sessions = self.sessions.read().await;

        match sessions.get(&scope.session_key()) {
            Some(buffer) if buffer.expires_at > Instant::now() => {
                let skip = buffer.turns.len().saturating_sub(self.window);
                Ok(buffer.turns.iter().skip(skip).cloned().collect())
            }
            _ => Ok(Vec::new()),
        }
    }
}

//
// ================= Postgres backend =================
//

pub struct PgShortTermMemory {
    db: Database,
    window: usize,
    ttl: Duration,
}

impl PgShortTermMemory {
    pub fn new(db: Database, window: usize, ttl: Duration) -> Self {
        Self { db, window, ttl }
    }

    /// Delete turns and sessions whose expiry has passed
    pub async fn purge_expired(&self) -> Result<u64> {
        let pool = self.db.pool().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM agent.short_term_memory m
            USING agent.short_term_sessions s
            WHERE m.memory_key = s.memory_key AND s.expires_at <= NOW()
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| BrainError::database("Failed to purge short-term turns", e))?
        .rows_affected();

        sqlx::query("DELETE FROM agent.short_term_sessions WHERE expires_at <= NOW()")
            .execute(pool)
            .await
            .map_err(|e| BrainError::database("Failed to purge short-term sessions", e))?;

        Ok(deleted)
    }
}

#[async_trait]
impl ShortTermMemory for PgShortTermMemory {
    async fn append(&self, scope: &MemoryScope, role: Role, content: &str) -> Result<()> {
        let pool = self.db.pool().await?;
        let key = scope.session_key();

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| BrainError::database("Failed to begin short-term transaction", e))?;

        // An expired session restarts empty
        sqlx::query(
            r#"
            DELETE FROM agent.short_term_memory
            WHERE memory_key = $1
              AND EXISTS (
                SELECT 1 FROM agent.short_term_sessions s
                WHERE s.memory_key = $1 AND s.expires_at <= NOW()
              )
            "#,
        )
        .bind(&key)
        .execute(&mut *tx)
        .await
        .map_err(|e| BrainError::database("Failed to reset expired session", e))?;

        sqlx::query(
            r#"
            INSERT INTO agent.short_term_memory (memory_key, role, content, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&key)
        .bind(role.as_str())
        .bind(content)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| BrainError::database("Failed to insert short-term turn", e))?;

        sqlx::query(
            r#"
            INSERT INTO agent.short_term_sessions (memory_key, expires_at)
            VALUES ($1, NOW() + make_interval(secs => $2))
            ON CONFLICT (memory_key) DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&key)
        .bind(self.ttl.as_secs_f64())
        .execute(&mut *tx)
        .await
        .map_err(|e| BrainError::database("Failed to refresh session expiry", e))?;

        tx.commit()
            .await
            .map_err(|e| BrainError::database("Failed to commit short-term turn", e))?;

        debug!(key = %key, role = %role, "Short-term turn stored");
        Ok(())
    }

    async fn recent(&self, scope: &MemoryScope) -> Result<Vec<ConversationTurn>> {
        let pool = self.db.pool().await?;

        let rows = sqlx::query(
            r#"
            SELECT role, content, created_at FROM (
              SELECT m.id, m.role, m.content, m.created_at
              FROM agent.short_term_memory m
              JOIN agent.short_term_sessions s ON s.memory_key = m.memory_key
              WHERE m.memory_key = $1 AND s.expires_at > NOW()
              ORDER BY m.id DESC
              LIMIT $2
            ) latest
            ORDER BY id ASC
            "#,
        )
        .bind(scope.session_key())
        .bind(self.window as i64)
        .fetch_all(pool)
        .await
        .map_err(|e| BrainError::database("Failed to load short-term memory", e))?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(turn) = turn_from_row(row)? {
                turns.push(turn);
            }
        }

        Ok(turns)
    }
}

/// Decode one stored turn; a row with an unknown role is skipped
fn turn_from_row(row: &PgRow) -> Result<Option<ConversationTurn>> {
    let decode = |e| BrainError::database("Failed to decode short-term turn", e);

    let raw_role: String = row.try_get("role").map_err(decode)?;
    let Some(role) = Role::parse(&raw_role) else {
        warn!(role = %raw_role, "Skipping short-term turn with unknown role");
        return Ok(None);
    };

    Ok(Some(ConversationTurn {
        role,
        content: row.try_get("content").map_err(decode)?,
        timestamp: row.try_get("created_at").map_err(decode)?,
    }))
}
