//! Governance operator host
//!
//! Serves the proposal registry over HTTP, runs the periodic expiry sweep and
//! forwards emitted pheromones to the log until an event bus picks them up.

use chrono::Utc;
use proposal_governance::config::Settings;
use proposal_governance::governance::PheromoneRecord;
use proposal_governance::routes::create_router;
use proposal_governance::state::{AppState, SharedState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting Proposal Governance Engine...");

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "📋 Configuration loaded: auto-merge threshold={}, velocity increment={}, half-life={}h",
        settings.governance.auto_merge_threshold,
        settings.governance.velocity_increment,
        settings.governance.velocity_half_life_hours
    );

    let (state, pheromones) = AppState::new(settings.clone());
    let state: SharedState = Arc::new(state);

    tokio::spawn(forward_pheromones(pheromones));
    tokio::spawn(expiry_sweep(
        state.clone(),
        Duration::from_secs(settings.governance.expiry_sweep_interval_secs),
    ));

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints:");
    info!("   POST   /api/proposals                    - Submit a proposal");
    info!("   GET    /api/proposals                    - List proposals (?namespace=)");
    info!("   GET    /api/proposals/{{name}}             - Get a proposal");
    info!("   DELETE /api/proposals/{{name}}             - Delete a proposal");
    info!("   POST   /api/proposals/{{name}}/approve     - Approve");
    info!("   POST   /api/proposals/{{name}}/reject      - Reject");
    info!("   POST   /api/proposals/{{name}}/merge       - Merge an approved proposal");
    info!("   POST   /api/proposals/{{name}}/validation  - T-gent verdict");
    info!("   POST   /api/proposals/expire             - Run an expiry sweep now");
    info!("   GET    /api/velocity                     - Current velocity penalty");
    info!("   POST   /api/velocity/decay               - Decay velocity");
    info!("   POST   /api/velocity/reset               - Reset velocity");
    info!("");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,proposal_governance=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Periodically expire proposals whose ttl has elapsed
async fn expiry_sweep(state: SharedState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let expired = state.registry.write().await.expire_proposals(Utc::now());
        if !expired.is_empty() {
            debug!("Expiry sweep transitioned {:?}", expired);
        }
    }
}

/// Drain emitted pheromones; delivery to the event bus happens outside this engine
async fn forward_pheromones(mut rx: UnboundedReceiver<PheromoneRecord>) {
    while let Some(record) = rx.recv().await {
        match serde_json::to_string(&record) {
            Ok(json) => info!("🐜 Pheromone {} intensity={:.2}: {}", record.metadata.name, record.spec.intensity, json),
            Err(e) => info!("🐜 Pheromone {} (unserializable: {})", record.metadata.name, e),
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
