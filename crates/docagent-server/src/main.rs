//! docagent HTTP Server
//!
//! Axum-based server exposing the documentation agents over ACP-style REST
//! endpoints, with server-sent events for streamed runs.

mod acp;
mod adapter;
mod agents;
mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{routing::{get, post}, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docagent_core::{ModelFactory, SessionManager};
use docagent_runtime::{ChatModelFactory, McpConnector};

use crate::config::ServerConfig;
use crate::handlers::{create_run, get_agent, health_check, list_agents, ping};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env()?;

    let connector = McpConnector::new(config.tool_server.clone());
    let models = ChatModelFactory::from_name(&config.model_name, config.generation_options())
        .with_ollama(config.ollama.clone());

    // Verify the model backend
    let backend = match models.create() {
        Ok(model) => Some(model),
        Err(e) => {
            tracing::warn!("⚠ Model '{}' unusable: {}", config.model_name, e);
            None
        }
    };
    if let Some(model) = &backend {
        if model.backend_available().await {
            tracing::info!("✓ Connected to model backend at {}", config.ollama.base_url());
            if let Ok(available) = model.list_models().await {
                for info in available {
                    tracing::info!("  Model: {}", info.name);
                }
            }
        } else {
            tracing::warn!("⚠ Model backend not available - runs will fail");
            tracing::warn!("  Make sure Ollama is running: ollama serve");
        }
    }

    let session = Arc::new(SessionManager::new(Arc::new(connector), Arc::new(models)));

    // Warm the session up in the background; requests initialize on demand
    let warmup = Arc::clone(&session);
    tokio::spawn(async move {
        if let Err(e) = warmup.initialize().await {
            tracing::warn!("⚠ Session warm-up failed, will retry on first request: {}", e);
        }
    });

    let mut state = AppState::new(Arc::clone(&session));
    if let Some(model) = backend {
        state = state.with_backend(model);
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 docagent server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("  Model:       {}", config.model_name);
    tracing::info!("  Tool server: {} {}", config.tool_server.command, config.tool_server.args.join(" "));
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /ping           - Liveness check");
    tracing::info!("  GET  /health         - Health check");
    tracing::info!("  GET  /agents         - List agents");
    tracing::info!("  GET  /agents/{{name}}  - Describe an agent");
    tracing::info!("  POST /runs           - Run an agent (sync or stream)");
    tracing::info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped, releasing session");
    session.cleanup().await?;

    Ok(())
}

/// Build the HTTP router over the shared state
pub fn build_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health_check))
        .route("/agents", get(list_agents))
        .route("/agents/{name}", get(get_agent))
        .route("/runs", post(create_run))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
