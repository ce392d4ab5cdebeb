//! Knowledge base of embedded manual chunks
//!
//! Searched with the rewritten user message; the best chunks become the
//! context of the user-manual agent.

use crate::db::Database;
use crate::error::BrainError;
use crate::llm::Embedder;
use crate::memory::similarity::{cosine_similarity, top_k};
use crate::models::{SimilarDocument, Usage};
use crate::Result;
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// A chunk ready to be stored
#[derive(Debug, Clone)]
pub struct NewKnowledgeChunk {
    pub application: String,
    pub file_name: String,
    pub content: String,
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Most similar chunks, best first
    async fn search(&self, embedding: &[f32], top_n: usize) -> Result<Vec<SimilarDocument>>;

    async fn contains_hash(&self, content_hash: &str) -> Result<bool>;

    /// Store all chunks or none
    async fn insert_batch(&self, chunks: Vec<NewKnowledgeChunk>) -> Result<usize>;
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

pub struct InMemoryKnowledgeStore {
    dimensions: usize,
    chunks: Arc<RwLock<Vec<NewKnowledgeChunk>>>,
}

impl InMemoryKnowledgeStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            chunks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn search(&self, embedding: &[f32], top_n: usize) -> Result<Vec<SimilarDocument>> {
        check_dimensions(self.dimensions, embedding.len())?;

        let chunks = self.chunks.read().await;
        let scored: Vec<_> = chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| (cosine_similarity(&chunk.embedding, embedding), (index, chunk)))
            .collect();

        Ok(top_k(scored, top_n)
            .into_iter()
            .map(|(score, (index, chunk))| SimilarDocument {
                id: index as i64 + 1,
                file_name: Some(chunk.file_name.clone()),
                application: Some(chunk.application.clone()),
                content: chunk.content.clone(),
                score,
            })
            .collect())
    }

    async fn contains_hash(&self, content_hash: &str) -> Result<bool> {
        let chunks = self.chunks.read().await;
        Ok(chunks.iter().any(|c| c.content_hash == content_hash))
    }

    async fn insert_batch(&self, batch: Vec<NewKnowledgeChunk>) -> Result<usize> {
        for chunk in &batch {
            check_dimensions(self.dimensions, chunk.embedding.len())?;
        }

        let mut chunks = self.chunks.write().await;
        if let Some(dup) = batch
            .iter()
            .find(|new| chunks.iter().any(|c| c.content_hash == new.content_hash))
        {
            return Err(BrainError::DatabaseError(format!(
                "duplicate content hash {}",
                dup.content_hash
            )));
        }

        let count = batch.len();
        chunks.extend(batch);
        Ok(count)
    }
}

//
// ================= Postgres + pgvector backend =================
//

pub struct PgKnowledgeStore {
    db: Database,
}

impl PgKnowledgeStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl KnowledgeStore for PgKnowledgeStore {
    async fn search(&self, embedding: &[f32], top_n: usize) -> Result<Vec<SimilarDocument>> {
        check_dimensions(self.db.dimensions(), embedding.len())?;
        let pool = self.db.pool().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, file_name, application, content,
                   1 - (embedding <=> $1) AS cosine_similarity
            FROM agent.agent_knowledge_embeddings
            ORDER BY embedding <=> $1
            LIMIT $2
            "#,
        )
        .bind(Vector::from(embedding.to_vec()))
        .bind(top_n as i64)
        .fetch_all(pool)
        .await
        .map_err(|e| BrainError::database("Failed to search knowledge base", e))?;

        rows.iter().map(document_from_row).collect()
    }

    async fn contains_hash(&self, content_hash: &str) -> Result<bool> {
        let pool = self.db.pool().await?;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM agent.agent_knowledge_embeddings WHERE content_hash = $1",
        )
        .bind(content_hash)
        .fetch_one(pool)
        .await
        .map_err(|e| BrainError::database("Failed to check content hash", e))?;

        Ok(count > 0)
    }

    async fn insert_batch(&self, chunks: Vec<NewKnowledgeChunk>) -> Result<usize> {
        for chunk in &chunks {
            check_dimensions(self.db.dimensions(), chunk.embedding.len())?;
        }
        let pool = self.db.pool().await?;

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| BrainError::database("Failed to begin knowledge transaction", e))?;

        let count = chunks.len();
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO agent.agent_knowledge_embeddings
                  (application, file_name, content, embedding, content_hash)
                VALUES
                  ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&chunk.application)
            .bind(&chunk.file_name)
            .bind(&chunk.content)
            .bind(Vector::from(chunk.embedding))
            .bind(&chunk.content_hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                BrainError::database(
                    &format!("Failed to insert chunk of {}", chunk.file_name),
                    e,
                )
            })?;
        }

        // Dropping an uncommitted transaction rolls it back
        tx.commit()
            .await
            .map_err(|e| BrainError::database("Failed to commit knowledge chunks", e))?;

        Ok(count)
    }
}

fn document_from_row(row: &PgRow) -> Result<SimilarDocument> {
    let decode = |e| BrainError::database("Failed to decode knowledge row", e);

    Ok(SimilarDocument {
        id: row.try_get("id").map_err(decode)?,
        file_name: row.try_get("file_name").map_err(decode)?,
        application: row.try_get("application").map_err(decode)?,
        content: row
            .try_get::<Option<String>, _>("content")
            .map_err(decode)?
            .unwrap_or_default(),
        score: row.try_get("cosine_similarity").map_err(decode)?,
    })
}

//
// ================= Search =================
//

pub struct KnowledgeBase {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KnowledgeStore>,
}

impl KnowledgeBase {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Embed `query` and return the closest chunks with the embedding usage
    pub async fn search(&self, query: &str, top_n: usize) -> Result<(Vec<SimilarDocument>, Usage)> {
        let embedding = self.embedder.embed(query).await?;
        check_dimensions(self.embedder.dimensions(), embedding.vector.len())?;

        let documents = self.store.search(&embedding.vector, top_n).await?;

        info!(
            hits = documents.len(),
            tokens = embedding.usage.tokens_total,
            cost_usd = embedding.usage.cost_usd,
            "Knowledge search"
        );

        Ok((documents, embedding.usage))
    }
}

/// Concatenate document contents into agent context text
pub fn join_documents(documents: &[SimilarDocument]) -> String {
    documents
        .iter()
        .map(|doc| doc.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockEmbedder, TEST_DIMENSIONS};

    async fn seeded_base() -> KnowledgeBase {
        let embedder = Arc::new(MockEmbedder::new());
        let store = Arc::new(InMemoryKnowledgeStore::new(TEST_DIMENSIONS));

        let mut batch = Vec::new();
        for (i, text) in [
            "reset the inverter by holding the power button",
            "yaw motor maintenance schedule",
            "blade pitch calibration procedure",
        ]
        .iter()
        .enumerate()
        {
            batch.push(NewKnowledgeChunk {
                application: "user_manual".to_string(),
                file_name: format!("manual_{}", i),
                content: text.to_string(),
                content_hash: format!("hash-{}", i),
                embedding: embedder.embed(text).await.unwrap().vector,
            });
        }
        store.insert_batch(batch).await.unwrap();

        KnowledgeBase::new(embedder, store)
    }

    #[tokio::test]
    async fn test_search_returns_best_match_first() {
        let base = seeded_base().await;

        let (docs, usage) = base
            .search("blade pitch calibration procedure", 2)
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].file_name.as_deref(), Some("manual_2"));
        assert!(docs[0].score >= docs[1].score);
        assert_eq!(usage.tokens_completion, 0);
        assert!(usage.tokens_prompt > 0);
    }

    #[tokio::test]
    async fn test_contains_hash_and_duplicate_batch() {
        let base = seeded_base().await;
        let store = base.store();

        assert!(store.contains_hash("hash-1").await.unwrap());
        assert!(!store.contains_hash("hash-9").await.unwrap());

        let dup = NewKnowledgeChunk {
            application: "user_manual".to_string(),
            file_name: "again".to_string(),
            content: "x".to_string(),
            content_hash: "hash-0".to_string(),
            embedding: vec![0.0; TEST_DIMENSIONS],
        };
        assert!(store.insert_batch(vec![dup]).await.is_err());
    }

    #[test]
    fn test_join_documents() {
        let docs = vec![
            SimilarDocument {
                id: 1,
                file_name: None,
                application: None,
                content: "first".to_string(),
                score: 0.9,
            },
            SimilarDocument {
                id: 2,
                file_name: None,
                application: None,
                content: "second".to_string(),
                score: 0.8,
            },
        ];
        assert_eq!(join_documents(&docs), "first\n\nsecond");
        assert_eq!(join_documents(&[]), "");
    }

    #[tokio::test]
    #[ignore = "Requires external Postgres. Set AGENT_TEST_PG_DSN to run."]
    async fn test_row_decoding_reports_type_mismatches() {
        let Some(pool) = testing::test_pool().await else {
            eprintln!("Skipping row decoding; set AGENT_TEST_PG_DSN to run this test.");
            return;
        };

        let row = sqlx::query(
            "SELECT 3::int8 AS id, 'inverter'::text AS file_name, NULL::text AS application, \
             'Hold reset'::text AS content, 0.9::float8 AS cosine_similarity",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        let doc = document_from_row(&row).unwrap();
        assert_eq!(doc.id, 3);
        assert_eq!(doc.application, None);
        assert_eq!(doc.content, "Hold reset");

        let row = sqlx::query(
            "SELECT 3::int4 AS id, 'inverter'::text AS file_name, NULL::text AS application, \
             42 AS content, 0.9::float8 AS cosine_similarity",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(matches!(
            document_from_row(&row),
            Err(BrainError::DatabaseError(_))
        ));
    }
}
