use reasoning_agent::{
    agent::Agent,
    api::start_server,
    audit::AuditLog,
    config::AgentConfig,
    llm::GeminiClient,
    tools::create_default_registry,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    if std::env::var("GEMINI_API_KEY").map_or(true, |k| k.trim().is_empty()) {
        eprintln!("GEMINI_API_KEY not set in .env; runs will fail at the model call");
    }

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    let config = AgentConfig::from_env()?;

    info!("Reasoning Agent - API Server");
    info!(port = api_port, max_iterations = config.max_iterations, "Configuration loaded");

    // Create components
    let model = GeminiClient::new(
        std::env::var("GEMINI_API_KEY").unwrap_or_default(),
        std::env::var("GEMINI_MODEL")
            .unwrap_or_else(|_| reasoning_agent::llm::gemini::DEFAULT_MODEL.to_string()),
    )?;
    let audit_log = Arc::new(AuditLog::new());

    let agent = Arc::new(
        Agent::new(Arc::new(model), Arc::new(create_default_registry()), config)
            .with_audit_log(audit_log.clone()),
    );

    info!("Agent initialized");

    start_server(agent, audit_log, api_port).await?;

    Ok(())
}
