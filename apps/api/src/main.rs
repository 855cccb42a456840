mod assessment;
mod config;
mod errors;
mod gateway;
mod interview;
mod llm_client;
mod routes;
mod speech;
mod state;
mod store;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::gateway::RemoteGateway;
use crate::interview::machine::SessionPolicy;
use crate::interview::orchestrator::{SessionRegistry, SessionRetention};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::speech::SpeechClient;
use crate::state::AppState;
use crate::store::open_store;
use crate::store::usage::UsageCredits;

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

    info!("Starting Simu API v{}", env!("CARGO_PKG_VERSION"));

    // Key-value store for usage credits and handoff records
    let store = open_store(&config.store_backend).await?;
    info!("Store initialized ({:?})", config.store_backend);

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone(), config.remote_timeout)?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Speech is optional; without it voice sessions fall back on notices
    let speech = match &config.deepgram_api_key {
        Some(key) => Some(SpeechClient::new(key.clone(), config.remote_timeout)?),
        None => {
            warn!("DEEPGRAM_API_KEY not set; transcription and speech synthesis are unavailable");
            None
        }
    };

    let gateway = Arc::new(RemoteGateway::new(llm, speech, config.remote_timeout));

    let policy = SessionPolicy {
        auto_advance: Some(config.auto_advance).filter(|d| !d.is_zero()),
        empty_response: config.empty_response_policy,
    };
    info!(
        "Session policy: auto-advance {:?}, blank answers {:?}",
        policy.auto_advance, policy.empty_response
    );

    let sessions = SessionRegistry::default();
    let retention = SessionRetention {
        idle_timeout: config.session_idle_timeout,
        closed_grace: config.session_closed_grace,
        sweep_every: config.session_sweep_every,
    };
    sessions.spawn_reaper(retention);
    info!(
        "Session reaper: sweep every {:?}, idle after {:?}, closed grace {:?}",
        retention.sweep_every, retention.idle_timeout, retention.closed_grace
    );

    // Build app state
    let state = AppState {
        gateway,
        credits: UsageCredits::new(store.clone(), config.free_trial_credits),
        store,
        sessions,
        policy,
        assessment_style: config.assessment_style,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the web client's domain

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
