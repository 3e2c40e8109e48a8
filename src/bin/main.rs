use policy_intake_advisor::{
    analysis::AnalysisOrchestrator,
    extract::MockExtractor,
    intake::{InMemorySessionStore, IntakeEngine},
    narrative::MockNarrator,
    store::InMemoryProfileSink,
};
use std::sync::Arc;
use tracing::info;

/// Offline demo: drives a scripted intake conversation against mock
/// collaborators and prints every exchange.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Policy Intake Advisor demo starting");

    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        Arc::new(MockExtractor::sample_coverage()),
        Arc::new(MockNarrator),
        Arc::new(InMemoryProfileSink::new()),
    ));
    let engine = IntakeEngine::new(Arc::new(InMemorySessionStore::new()), orchestrator);

    let user_id = "demo-user";
    let script = [
        "我是保險經紀人",
        "保障型",
        "3000",
        "30",
        "男",
        "2",
        "http://example.test/policy",
    ];

    for message in script {
        println!("\n>>> {}", message);
        match engine.advance(user_id, message).await.as_text() {
            Some(reply) => println!("<<< {}", reply),
            None => println!("<<< (no reply)"),
        }
    }

    Ok(())
}
