//! Knowledge-base ingestion of markdown manuals
//!
//! READ → STRIP FRONT MATTER → PREPARE → SPLIT → HASH → SKIP KNOWN → EMBED → INSERT
//!
//! Chunks of every file are inserted in one batch, so a failure anywhere
//! leaves the knowledge base untouched.

pub mod splitter;
pub mod text;

use crate::knowledge::{KnowledgeStore, NewKnowledgeChunk};
use crate::llm::Embedder;
use crate::models::Usage;
use crate::Result;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub use splitter::RecursiveSplitter;
pub use text::{prepare_text, strip_front_matter};

pub const DEFAULT_APPLICATION: &str = "user_manual";

/// Hex SHA-256 of a chunk, used to skip content already stored
pub fn content_hash(chunk: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub usage: Usage,
}

pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KnowledgeStore>,
    splitter: RecursiveSplitter,
    application: String,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            embedder,
            store,
            splitter: RecursiveSplitter::markdown(),
            application: DEFAULT_APPLICATION.to_string(),
        }
    }

    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    pub fn with_splitter(mut self, splitter: RecursiveSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    /// Cleaned chunks of one raw markdown document
    pub fn chunk_document(&self, raw: &str) -> Vec<String> {
        let cleaned = prepare_text(&strip_front_matter(raw));
        self.splitter.split(&cleaned)
    }

    /// Ingest every `.md` file directly inside `dir`
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestReport> {
        let files = markdown_files(dir)?;
        info!(dir = %dir.display(), files = files.len(), "Ingesting manuals");

        let mut report = IngestReport::default();
        let mut batch = Vec::new();
        let mut seen = HashSet::new();

        for path in files {
            let raw = std::fs::read_to_string(&path)?;
            let file_name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let chunks = self.chunk_document(&raw);
            info!(file = %file_name, chunks = chunks.len(), "File chunked");
            report.files += 1;
            report.chunks += chunks.len();

            for (index, chunk) in chunks.into_iter().enumerate() {
                let hash = content_hash(&chunk);

                if seen.contains(&hash) || self.store.contains_hash(&hash).await? {
                    debug!(file = %file_name, index, "Chunk already stored, skipping");
                    report.skipped += 1;
                    continue;
                }

                let embedding = self.embedder.embed(&chunk).await?;
                report.usage += embedding.usage;
                seen.insert(hash.clone());

                batch.push(NewKnowledgeChunk {
                    application: self.application.clone(),
                    file_name: file_name.clone(),
                    content: chunk,
                    content_hash: hash,
                    embedding: embedding.vector,
                });
            }
        }

        report.inserted = if batch.is_empty() {
            0
        } else {
            self.store.insert_batch(batch).await?
        };

        info!(
            files = report.files,
            inserted = report.inserted,
            skipped = report.skipped,
            tokens = report.usage.tokens_total,
            cost_usd = report.usage.cost_usd,
            "Ingestion committed"
        );

        Ok(report)
    }
}

fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
