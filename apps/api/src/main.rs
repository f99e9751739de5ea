mod config;
mod documents;
mod errors;
mod llm_client;
mod ranking;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::ranking::engine::RankingEngine;
use crate::ranking::prompts::PromptTemplates;
use crate::ranking::sink::CsvFileSink;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Ranker API v{}", env!("CARGO_PKG_VERSION"));

    // Prompt templates (built-in defaults, optionally overridden from disk)
    let prompts = PromptTemplates::load(config.prompt_templates_dir.as_deref())?;

    // Initialize LLM client
    let llm = LlmClient::new(config.llm.clone(), prompts.system.clone())?;
    info!("LLM client initialized (model: {})", llm.model());

    let engine = RankingEngine::new(
        Arc::new(llm),
        Arc::new(prompts),
        config.budgets,
        config.scoring_concurrency,
    );
    info!(
        "Attempt budgets: criteria={} headers={} scoring={}, scoring concurrency {}",
        config.budgets.criteria,
        config.budgets.headers,
        config.budgets.scoring,
        config.scoring_concurrency
    );

    let sink = Arc::new(CsvFileSink::new(&config.scores_csv_path));
    info!("Score tables will be written to {}", sink.path().display());

    // Build app state
    let state = AppState {
        engine,
        sink,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS origins once a frontend host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
