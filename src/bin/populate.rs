//! Load markdown manuals into the knowledge base

use agent_ai_brain::{
    config::AgentCatalog,
    db::Database,
    ingest::{Ingestor, DEFAULT_APPLICATION},
    knowledge::PgKnowledgeStore,
    llm::OpenAiClient,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "populate", about = "Embed markdown manuals into the knowledge base")]
struct Args {
    /// Folder holding the `.md` manuals
    #[arg(long, default_value = "manuals")]
    dir: PathBuf,

    /// Application tag stored with every chunk
    #[arg(long, default_value = DEFAULT_APPLICATION)]
    application: String,

    #[arg(long, env = "AGENT_CONFIG_PATH", default_value = "config/agent_config.json")]
    config: PathBuf,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let catalog = AgentCatalog::load(&args.config)?;

    let openai = Arc::new(OpenAiClient::new(
        args.openai_api_key,
        &args.openai_base_url,
        catalog.embeddings.model.clone(),
        catalog.embeddings.dimensions,
    )?);
    let db = Database::connect_lazy(&args.database_url, catalog.embeddings.dimensions)?;

    let ingestor = Ingestor::new(openai, Arc::new(PgKnowledgeStore::new(db)))
        .with_application(args.application);

    let report = ingestor.ingest_dir(&args.dir).await?;

    info!(
        "Done: {} files, {} chunks, {} inserted, {} skipped, {} tokens, ${:.6}",
        report.files,
        report.chunks,
        report.inserted,
        report.skipped,
        report.usage.tokens_total,
        report.usage.cost_usd
    );

    Ok(())
}
