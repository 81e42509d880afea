use crate::config::Config;
use crate::corpus::{normalize_name, CorpusSource};
use crate::error::{RelsubsError, Result};
use crate::recommender::{GenerationFailure, GenerationOutcome, GraphRequest, Recommender};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// HTTP front for graph generation
pub struct GraphServer<C: CorpusSource + Send + 'static> {
    state: AppState<C>,
    host: String,
}

impl<C: CorpusSource + Send + 'static> GraphServer<C> {
    pub fn new(recommender: Recommender<C>, config: &Config) -> Self {
        Self {
            state: AppState {
                recommender: Arc::new(Mutex::new(recommender)),
                allowed_origins: config.http_server.allowed_origins.clone(),
                default_depth: config.graph.default_depth,
                depth_limit: config.graph.depth_limit,
                reuse_artifacts: config.graph.reuse_artifacts,
            },
            host: config.http_server.host.clone(),
        }
    }

    /// Run the HTTP server
    pub async fn run(&self, port: u16) -> Result<()> {
        let app = self.create_router();

        let addr = format!("{}:{}", self.host, port);
        log::info!("Starting graph server on http://{}", addr);
        log::info!("Graph endpoint: http://{}/graph?seed=<name>", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            let error_msg = if e.kind() == std::io::ErrorKind::AddrInUse {
                format!(
                    "Port {} is already in use. Stop the other process or set http_server.port in config.toml",
                    port
                )
            } else {
                format!("Failed to bind to {}: {}", addr, e)
            };
            RelsubsError::Io(std::io::Error::new(e.kind(), error_msg))
        })?;

        axum::serve(listener, app).await.map_err(|e| {
            RelsubsError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("HTTP server error: {}", e),
            ))
        })?;

        Ok(())
    }

    /// Create the axum router
    pub fn create_router(&self) -> Router {
        let allowed_origins = &self.state.allowed_origins;

        // Empty list: local use, any origin.
        let cors = if allowed_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .route("/graph", get(handle_graph::<C>))
            .route("/health", get(handle_health))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors),
            )
            .with_state(self.state.clone())
    }
}

/// Application state shared across handlers
struct AppState<C: CorpusSource + Send + 'static> {
    recommender: Arc<Mutex<Recommender<C>>>,
    allowed_origins: Vec<String>,
    default_depth: u32,
    depth_limit: u32,
    reuse_artifacts: bool,
}

impl<C: CorpusSource + Send + 'static> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            recommender: Arc::clone(&self.recommender),
            allowed_origins: self.allowed_origins.clone(),
            default_depth: self.default_depth,
            depth_limit: self.depth_limit,
            reuse_artifacts: self.reuse_artifacts,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphParams {
    seed: Option<String>,
    depth: Option<u32>,
    /// Any non-empty value enables adult content.
    nsfw: Option<String>,
}

enum GraphReply {
    Document(Value),
    Failure(GenerationFailure),
}

async fn handle_graph<C: CorpusSource + Send + 'static>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Query(params): Query<GraphParams>,
) -> Response {
    if let Err(response) = validate_origin(&headers, &state.allowed_origins) {
        return response;
    }

    let Some(raw_seed) = params.seed.as_deref() else {
        return error_response(StatusCode::BAD_REQUEST, "missing 'seed' parameter");
    };
    let seed = match normalize_name(raw_seed) {
        Ok(seed) => seed,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let depth = params
        .depth
        .unwrap_or(state.default_depth)
        .clamp(1, state.depth_limit.max(1));
    let allow_nsfw = params.nsfw.as_deref().is_some_and(|v| !v.is_empty());
    let request = GraphRequest::new(seed, depth).with_nsfw(allow_nsfw);

    let recommender = Arc::clone(&state.recommender);
    let reuse_artifacts = state.reuse_artifacts;
    let joined = tokio::task::spawn_blocking(move || -> Result<GraphReply> {
        let mut recommender = recommender
            .lock()
            .map_err(|_| RelsubsError::Internal("recommender lock poisoned".to_string()))?;

        if reuse_artifacts {
            if let Some(path) = recommender.existing_artifact(&request) {
                log::debug!("Serving existing artifact {}", path.display());
                return Ok(GraphReply::Document(read_document(&path)?));
            }
        }

        match recommender.generate_graph(&request)? {
            GenerationOutcome::Success(artifacts) => {
                Ok(GraphReply::Document(read_document(&artifacts.paths.json)?))
            }
            GenerationOutcome::Failure(reason) => Ok(GraphReply::Failure(reason)),
        }
    })
    .await;

    match joined {
        Ok(Ok(GraphReply::Document(doc))) => (StatusCode::OK, Json(doc)).into_response(),
        Ok(Ok(GraphReply::Failure(reason))) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "status": "Failure",
                "message": reason.to_string()
            })),
        )
            .into_response(),
        Ok(Err(e)) => {
            log::error!("Graph generation failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
        Err(e) => {
            log::error!("Graph worker task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "graph worker task failed")
        }
    }
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "relsubs",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

fn read_document(path: &Path) -> Result<Value> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "status": "Failure",
            "message": message
        })),
    )
        .into_response()
}

fn validate_origin(
    headers: &HeaderMap,
    allowed_origins: &[String],
) -> std::result::Result<(), Response> {
    if allowed_origins.is_empty() {
        return Ok(());
    }

    // Non-browser clients send no Origin header.
    let Some(origin) = headers.get("origin").and_then(|h| h.to_str().ok()) else {
        return Ok(());
    };

    if allowed_origins.iter().any(|allowed| origin == allowed) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": "Origin not allowed",
                "message": format!("Origin '{}' is not in the allowed origins list", origin)
            })),
        )
            .into_response())
    }
}
