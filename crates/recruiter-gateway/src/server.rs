//! HTTP server: `/predict`, status endpoints and the session sweeper

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json,
};
use recruiter_agent::{CompletionSettings, KnowledgeStore, Router, SessionRegistry, SessionStore};
use recruiter_core::{
    Error, LlmConfig, PredictRequest, PredictResponse, RecruiterConfig, SessionKey,
};
use recruiter_llm::{ChatProvider, MockBehavior, MockProvider, OpenAiCompatProvider};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

const STATUS_MESSAGE: &str = "API do Agente de Recrutamento da Decision está online.";
const INTERNAL_ERROR_DETAIL: &str = "Ocorreu um erro interno no servidor.";
const UNAVAILABLE_DETAIL: &str = "Serviço temporariamente indisponível. Tente novamente em instantes.";

pub struct AppState {
    pub router: Router,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            started_at: Instant::now(),
        }
    }
}

/// Service error as seen by an HTTP caller. The body never carries the
/// underlying error; that goes to the log.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = if self.0.is_unavailable() {
            (StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_DETAIL)
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_DETAIL)
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

/// Chat provider for the configured endpoint, or an echoing mock when offline.
pub fn provider_from_config(
    config: &LlmConfig,
    offline: bool,
) -> anyhow::Result<Arc<dyn ChatProvider>> {
    if offline {
        info!("offline mode: replies come from the mock provider");
        return Ok(Arc::new(MockProvider::constant(MockBehavior::Echo)));
    }

    let api_key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("{} not set", config.api_key_env))?;

    Ok(Arc::new(
        OpenAiCompatProvider::new(api_key)
            .with_base_url(&config.base_url)
            .with_timeout(config.timeout()),
    ))
}

/// Load the knowledge tables and wire the router. Fails if any table is
/// missing or malformed.
pub fn build_state(
    config: &RecruiterConfig,
    provider: Arc<dyn ChatProvider>,
) -> anyhow::Result<Arc<AppState>> {
    let knowledge = KnowledgeStore::load(&config.data.dir)
        .with_context(|| format!("loading data from {}", config.data.dir.display()))?;
    let sessions: Arc<dyn SessionStore> = Arc::new(SessionRegistry::from_config(&config.sessions));
    let router = Router::new(
        Arc::new(knowledge),
        sessions,
        provider,
        CompletionSettings::from(&config.llm),
    );
    Ok(Arc::new(AppState::new(router)))
}

pub fn build_app(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically evict idle sessions until `cancel` fires.
pub fn spawn_session_sweeper(
    sessions: Arc<dyn SessionStore>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = sessions.evict_idle();
                    if !evicted.is_empty() {
                        debug!(evicted = evicted.len(), live = sessions.len(), "idle sweep");
                    }
                }
            }
        }
    })
}

pub async fn start_gateway(
    config: RecruiterConfig,
    provider: Arc<dyn ChatProvider>,
) -> anyhow::Result<()> {
    let state = build_state(&config, provider)?;
    let knowledge = state.router.knowledge();
    info!(
        postings = knowledge.postings().len(),
        candidacies = knowledge.candidacies().len(),
        profiles = knowledge.profiles().len(),
        "knowledge store ready"
    );

    let cancel = CancellationToken::new();
    let sweeper = spawn_session_sweeper(
        state.router.sessions().clone(),
        config.sessions.sweep_interval(),
        cancel.clone(),
    );

    let app = build_app(state);

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind.to_addr(), config.server.port)
        .parse()
        .context("invalid bind address")?;

    info!("Recruiter v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", bind_addr);
    info!("  Model: {}", config.llm.model);
    info!(
        "  Sessions: capacity {}, idle ttl {}s",
        config.sessions.capacity, config.sessions.idle_ttl_secs
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    cancel.cancel();
    let _ = sweeper.await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received SIGINT, shutting down");
    }
}

async fn predict_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ApiError> {
    let key = SessionKey::new(request.session_id.clone());
    let agent_reply = state.router.handle(&key, &request.user_input).await?;
    Ok(Json(PredictResponse {
        session_id: request.session_id,
        agent_reply,
    }))
}

async fn index_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "message": STATUS_MESSAGE }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.router.sessions();
    let knowledge = state.router.knowledge();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "sessions": sessions.len(),
        "session_capacity": sessions.capacity(),
        "postings": knowledge.postings().len(),
        "candidacies": knowledge.candidacies().len(),
        "profiles": knowledge.profiles().len(),
    }))
}
