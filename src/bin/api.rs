use policy_intake_advisor::{
    analysis::AnalysisOrchestrator,
    api::start_server,
    extract::HttpDocumentExtractor,
    intake::{InMemorySessionStore, IntakeEngine},
    narrative::GeminiNarrator,
    store::build_profile_sink,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
        eprintln!("📌 Narrative generation will fall back to the template script");
        String::new()
    });

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("🚀 Policy Intake Advisor - API Server");
    info!("📍 Port: {}", api_port);

    // Create components
    let extractor = Arc::new(HttpDocumentExtractor::new());
    let narrator = Arc::new(GeminiNarrator::new(gemini_api_key));
    let sink = build_profile_sink();

    let orchestrator = Arc::new(AnalysisOrchestrator::new(extractor, narrator, sink));
    let engine = Arc::new(IntakeEngine::new(
        Arc::new(InMemorySessionStore::new()),
        orchestrator,
    ));

    info!("✅ Intake engine initialized");
    info!("📡 Starting API server...");

    // Start API server
    start_server(engine, api_port).await?;

    Ok(())
}
