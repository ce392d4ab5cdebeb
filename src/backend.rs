//! Storage backend selection and brain assembly
//!
//! With a database URL every store lives in Postgres; without one (or when
//! the pool cannot be created) everything falls back to process memory.

use crate::agent::AgentManager;
use crate::config::{AgentCatalog, Settings};
use crate::db::Database;
use crate::knowledge::{InMemoryKnowledgeStore, KnowledgeBase, KnowledgeStore, PgKnowledgeStore};
use crate::llm::OpenAiClient;
use crate::memory::{
    InMemoryLongTermStore, InMemoryShortTermMemory, LongTermMemory, LongTermStore,
    PgLongTermStore, PgShortTermMemory, ShortTermMemory,
};
use crate::pipeline::Brain;
use crate::tools::{HttpAlarmSource, ToolRegistry};
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub enum ShortTermBackend {
    Postgres(Arc<PgShortTermMemory>),
    InMemory(Arc<InMemoryShortTermMemory>),
}

impl ShortTermBackend {
    pub fn memory(&self) -> Arc<dyn ShortTermMemory> {
        match self {
            ShortTermBackend::Postgres(memory) => memory.clone(),
            ShortTermBackend::InMemory(memory) => memory.clone(),
        }
    }

    pub async fn purge_expired(&self) -> Result<u64> {
        match self {
            ShortTermBackend::Postgres(memory) => memory.purge_expired().await,
            ShortTermBackend::InMemory(memory) => Ok(memory.purge_expired().await as u64),
        }
    }
}

pub struct Backends {
    pub database: Option<Database>,
    pub short_term: ShortTermBackend,
    pub long_term: Arc<dyn LongTermStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
}

impl Backends {
    pub fn in_memory(catalog: &AgentCatalog) -> Self {
        let dimensions = catalog.embeddings.dimensions;
        Self {
            database: None,
            short_term: ShortTermBackend::InMemory(Arc::new(InMemoryShortTermMemory::new(
                catalog.short_term_memory.memory_size,
                catalog.short_term_memory.ttl(),
            ))),
            long_term: Arc::new(InMemoryLongTermStore::new(dimensions)),
            knowledge: Arc::new(InMemoryKnowledgeStore::new(dimensions)),
        }
    }

    pub fn postgres(db: Database, catalog: &AgentCatalog) -> Self {
        Self {
            short_term: ShortTermBackend::Postgres(Arc::new(PgShortTermMemory::new(
                db.clone(),
                catalog.short_term_memory.memory_size,
                catalog.short_term_memory.ttl(),
            ))),
            long_term: Arc::new(PgLongTermStore::new(db.clone())),
            knowledge: Arc::new(PgKnowledgeStore::new(db.clone())),
            database: Some(db),
        }
    }

    pub fn from_settings(settings: &Settings, catalog: &AgentCatalog) -> Self {
        if let Some(url) = &settings.database_url {
            match Database::connect_lazy(url, catalog.embeddings.dimensions) {
                Ok(db) => {
                    info!("Storage backend: postgres");
                    return Self::postgres(db, catalog);
                }
                Err(error) => {
                    warn!(
                        "Failed to initialize postgres backend, falling back to in-memory: {}",
                        error
                    );
                }
            }
        }

        info!("Storage backend: in-memory");
        Self::in_memory(catalog)
    }

    /// Periodically drop expired short-term sessions
    pub fn spawn_purge_task(&self, every: Duration) -> JoinHandle<()> {
        let short_term = self.short_term.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match short_term.purge_expired().await {
                    Ok(purged) => debug!(purged, "Expired short-term sessions purged"),
                    Err(error) => warn!("Short-term purge failed: {}", error),
                }
            }
        })
    }
}

/// Wire agents, tools, memory and the knowledge base into a brain
pub fn build_brain(
    settings: &Settings,
    catalog: &AgentCatalog,
    backends: &Backends,
    openai: Arc<OpenAiClient>,
) -> Result<Brain> {
    let short_term = backends.short_term.memory();
    let long_term = Arc::new(LongTermMemory::new(
        openai.clone(),
        backends.long_term.clone(),
        catalog.long_term_memory.rag_search_k,
    ));

    let agents = Arc::new(AgentManager::new(
        catalog,
        &settings.prompt_dir,
        openai.clone(),
        short_term.clone(),
        long_term.clone(),
    )?);

    if settings.alarms_api_url.is_none() {
        warn!("ALARMS_API_URL not set; device alarm lookups will fail");
    }
    let alarms = Arc::new(HttpAlarmSource::new(
        openai.http_client(),
        settings.alarms_api_url.clone(),
    ));

    Ok(Brain::new(
        agents.clone(),
        ToolRegistry::with_defaults(agents, alarms),
        Arc::new(KnowledgeBase::new(openai, backends.knowledge.clone())),
        short_term,
        long_term,
        catalog.guardrail_denied_response.clone(),
    ))
}
