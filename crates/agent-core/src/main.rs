//! agent-core binary entry point: `tracing-subscriber` init from `RUST_LOG`
//! (falling back to a crate-scoped default), configuration from the
//! environment, then serve until Ctrl+C, shutting down gracefully.

use agent_core::config::AgentConfig;
use agent_core::lifecycle::LifecycleController;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_core=info".into()),
        )
        .init();

    let config = AgentConfig::from_env();

    let mut controller = LifecycleController::build(config).expect("failed to initialize agent state");
    controller.start().await.expect("failed to start agent listeners");

    tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received, draining connections...");

    controller.stop().await;
    tracing::info!("agent-core shut down cleanly");
}
