use agent_ai_brain::{
    api::start_server,
    backend::{build_brain, Backends},
    config::{AgentCatalog, Settings},
    llm::OpenAiClient,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    if settings.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY not set; every model call will fail");
    }

    let catalog = AgentCatalog::load(&settings.agent_config_path)?;

    info!("Agent AI Brain - API Server");
    info!("Port: {}", settings.port);
    info!("Agent catalog: {}", settings.agent_config_path.display());

    let openai = Arc::new(OpenAiClient::new(
        settings.openai_api_key.clone(),
        &settings.openai_base_url,
        catalog.embeddings.model.clone(),
        catalog.embeddings.dimensions,
    )?);

    let backends = Backends::from_settings(&settings, &catalog);
    let brain = Arc::new(build_brain(&settings, &catalog, &backends, openai)?);
    let _purge = backends.spawn_purge_task(PURGE_INTERVAL);

    info!("Brain initialized");
    start_server(brain, settings.port, &settings.cors_origins).await?;

    Ok(())
}
