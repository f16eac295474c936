//! Commit coordinator node.
//!
//! Run with: cargo run -p coordinator-node
//!
//! Configure through `COORDINATOR_BIND_ADDR`, `COORDINATOR_ABORT_TIMEOUT_SECS`
//! and `COORDINATOR_DEADLINE_POLICY` (`fixed` or `reset`), then:
//!
//! ```text
//! curl -X POST localhost:8080/session
//! curl -X PUT -H "x-session-id: <id>" localhost:8080/prepare
//! curl -X PUT -H "x-session-id: <id>" localhost:8080/commit
//! curl localhost:8080/sessions
//! ```

use std::sync::Arc;

use anyhow::Context;
use coordinator_core::CoordinatorConfig;
use coordinator_session::{SessionManager, storage::MemoryStorage};
use coordinator_transport::http::create_router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = CoordinatorConfig::from_env().context("invalid coordinator configuration")?;
    tracing::info!(
        abort_timeout = ?config.abort_timeout,
        deadline_policy = ?config.deadline_policy,
        "Loaded configuration"
    );

    let manager = Arc::new(SessionManager::new(MemoryStorage::new(), &config));
    let app = create_router(manager);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
