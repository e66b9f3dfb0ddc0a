//! Renovation Router - two-role voice assistant backend
//!
//! Routes each user message to Bob (intake and planning) or Alice
//! (technical specialist), handing context across transfers so the caller
//! gets exactly one reply per turn.

mod api;
mod db;
mod llm;
mod runtime;
mod state_machine;
mod system_prompt;
mod tools;

use api::{create_router, AppState};
use db::{Database, MemoryStore};
use llm::{LlmConfig, ModelRegistry};
use runtime::{DatabaseStorage, StateStore, DEFAULT_MAX_TOKENS};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use system_prompt::PromptSet;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "renovation_router=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let db_path = std::env::var("RENO_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.renovation-router/conversations.db")
    });

    let port: u16 = std::env::var("RENO_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let max_tokens: u32 = std::env::var("RENO_MAX_TOKENS")
        .ok()
        .and_then(|t| t.parse().ok())
        .unwrap_or(DEFAULT_MAX_TOKENS);

    // Initialize conversation store
    let store: Arc<dyn StateStore> = if db_path == ":memory:" {
        tracing::warn!("Using in-process store; conversations are lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        if let Some(parent) = PathBuf::from(&db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %db_path, "Opening database");
        Arc::new(DatabaseStorage::new(Database::open(&db_path)?))
    };

    // Role prompts
    let prompts = match std::env::var("RENO_PROMPTS_DIR") {
        Ok(dir) => PromptSet::load(&PathBuf::from(dir)),
        Err(_) => PromptSet::default(),
    };

    // Initialize LLM registry
    let llm_config = LlmConfig::from_env();
    let llm_registry = Arc::new(ModelRegistry::new(&llm_config));

    if llm_registry.has_models() {
        tracing::info!(
            models = ?llm_registry.available_models(),
            default = %llm_registry.default_model_id(),
            "LLM registry initialized"
        );
    } else {
        tracing::warn!("No LLM API key configured. Set OPENAI_API_KEY.");
    }

    // Create application state
    let state = AppState::new(store, llm_registry, prompts, max_tokens);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Renovation router listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
