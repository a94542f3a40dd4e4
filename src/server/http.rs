//! HTTP surface of the inference server
//!
//! Stateless-per-request handlers wrapping the retrieval + generation
//! pipeline, plus streaming and control endpoints. Boot loads the document
//! index and constructs the local backend before the port is bound, so a
//! successful /health implies /generate is serviceable.

use crate::config::Config;
use crate::core::types::{
    AddKeyRequest, GenerateRequest, GenerateResponse, HealthResponse, SetThinkRequest,
    ShutdownResponse,
};
use crate::llm::{self, ChatMessage, CompletionBackend, LlmError, RemoteBackend};
use crate::retrieval::{prompt, DocumentIndex, KeywordIndex};
use crate::server::stream::StreamRegistry;
use anyhow::Result;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tower_http::cors::{Any, CorsLayer};

/// Shared application state
pub struct AppState {
    config: Config,
    index: Arc<dyn DocumentIndex>,
    local: Arc<dyn CompletionBackend>,
    remote: RwLock<Option<Arc<dyn CompletionBackend>>>,
    think_default: RwLock<bool>,
    streams: StreamRegistry,
    shutdown: Notify,
}

impl AppState {
    pub fn new(
        config: Config,
        index: Arc<dyn DocumentIndex>,
        local: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            config,
            index,
            local,
            remote: RwLock::new(None),
            think_default: RwLock::new(false),
            streams: StreamRegistry::new(),
            shutdown: Notify::new(),
        }
    }
}

/// Build the router
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate", post(handle_generate))
        .route("/generateStream", post(handle_generate_stream))
        .route("/setThink", post(handle_set_think))
        .route("/addKey", post(handle_add_key))
        .route("/health", get(handle_health))
        .route("/shutdown", get(handle_shutdown))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve the endpoint on an already-bound listener until shutdown
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<AppState>) -> Result<()> {
    tracing::info!(
        "Inference server listening on {}",
        listener.local_addr()?
    );

    let shutdown_state = state.clone();
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            shutdown_state.shutdown.notified().await;
            tracing::info!("Inference server shutting down");
        })
        .await?;

    Ok(())
}

/// Boot the inference server: load the index, construct the backend, bind
pub async fn run_inference_server(
    host: &str,
    port: u16,
    backend_name: Option<&str>,
    docs_dir: Option<&Path>,
    config: Config,
) -> Result<()> {
    // Boot is synchronous by design: the index and backend exist before the
    // port accepts connections, which is what readiness probing relies on.
    let index: Arc<dyn DocumentIndex> = match docs_dir
        .map(Path::to_path_buf)
        .or_else(|| config.retrieval.docs_dir.as_ref().map(Into::into))
    {
        Some(dir) => Arc::new(KeywordIndex::load_dir(&dir)?),
        None => {
            tracing::warn!("No docs directory configured, answering without retrieval context");
            Arc::new(KeywordIndex::empty())
        }
    };

    let backend_name = backend_name
        .unwrap_or(config.llm.default_backend.as_str())
        .to_string();
    let local = llm::create_backend(&backend_name, &config.llm)?;
    tracing::info!("Using completion backend: {}", local.name());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let state = Arc::new(AppState::new(config, index, local));

    serve(listener, state).await
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

async fn handle_set_think(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetThinkRequest>,
) -> impl IntoResponse {
    *state.think_default.write().await = req.think;
    tracing::info!("Think default set to {}", req.think);
    Json(json!({ "status": "ok" }))
}

async fn handle_add_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddKeyRequest>,
) -> impl IntoResponse {
    let backend = RemoteBackend::new(req.key, state.config.llm.remote.clone());
    *state.remote.write().await = Some(Arc::new(backend));
    tracing::info!("Remote API credential installed");
    Json(json!({ "status": "ok" }))
}

async fn handle_shutdown(State(state): State<Arc<AppState>>) -> Json<ShutdownResponse> {
    // Delay the notification so this response flushes before the listener
    // stops accepting.
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        state.shutdown.notify_one();
    });

    Json(ShutdownResponse {
        status: "shutting_down".to_string(),
    })
}

async fn handle_generate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Response {
    let messages = assemble_messages(&state, &req).await;
    let backend = match select_backend(&state, req.use_api).await {
        Ok(backend) => backend,
        Err(e) => return error_response(e),
    };

    match backend.complete(&messages).await {
        Ok(content) => (StatusCode::OK, Json(GenerateResponse { content })).into_response(),
        Err(e) => {
            tracing::error!("Generation failed: {}", e);
            error_response(e)
        }
    }
}

async fn handle_generate_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateRequest>,
) -> Response {
    let messages = assemble_messages(&state, &req).await;
    let backend = match select_backend(&state, req.use_api).await {
        Ok(backend) => backend,
        Err(e) => return error_response(e),
    };

    // Generation runs in the background writing into the session buffer;
    // the response body drains the buffer and returns immediately.
    let (writer, reader) = state.streams.open();
    tokio::spawn(async move {
        let chunk_writer = writer.clone();
        let result = backend
            .complete_streaming(
                &messages,
                Box::new(move |chunk| {
                    chunk_writer.push(chunk);
                }),
            )
            .await;

        if let Err(e) = result {
            tracing::error!("Streaming generation failed: {}", e);
            writer.push(format!("[error] {}", e));
        }
        writer.finish();
    });

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(reader),
    )
        .into_response()
}

/// Build the grounded message list for one request
async fn assemble_messages(state: &AppState, req: &GenerateRequest) -> Vec<ChatMessage> {
    // Either surface can enable thinking: the per-request flag or the
    // server-side default set through /setThink.
    let think = req.think || *state.think_default.read().await;
    let prompt_text = prompt::build_prompt(
        state.index.as_ref(),
        &req.content,
        req.mrml_scene.as_deref(),
        think,
        state.config.retrieval.top_k,
    );
    vec![ChatMessage::user(prompt_text)]
}

async fn select_backend(
    state: &AppState,
    use_api: bool,
) -> Result<Arc<dyn CompletionBackend>, LlmError> {
    if use_api {
        state.remote.read().await.clone().ok_or_else(|| {
            LlmError::Unauthorized(
                "no remote API key configured; install one via /addKey".to_string(),
            )
        })
    } else {
        Ok(state.local.clone())
    }
}

fn error_response(e: LlmError) -> Response {
    let status = StatusCode::from_u16(e.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
