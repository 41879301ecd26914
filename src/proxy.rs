// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// HTTP front end
//
// Responsibilities:
// - Bearer credential extraction
// - Request forwarding via injected ChatService trait
// - Model listing and health endpoints
// - Error responses in the OpenAI error envelope
// - 404 for unknown paths

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;

use crate::adapter::{serialize_error, AdapterError};
use crate::session::SessionError;
use crate::stream::StreamInterrupted;
use crate::upstream::UpstreamError;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Response produced by the chat service.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl ProxyResponse {
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body: Body::from(value.to_string()),
        }
    }

    /// A `text/event-stream` response over `body`.
    pub fn event_stream(body: Body) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        Self {
            status: StatusCode::OK,
            headers,
            body,
        }
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> axum::response::Response {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Errors surfaced to the client.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("shared credential is not configured")]
    SharedUnavailable,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Interrupted(#[from] StreamInterrupted),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingCredential => StatusCode::UNAUTHORIZED,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::UnknownModel(_) => StatusCode::NOT_FOUND,
            GatewayError::SharedUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Upstream(UpstreamError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Upstream(_) | GatewayError::Interrupted(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<AdapterError> for GatewayError {
    fn from(e: AdapterError) -> Self {
        GatewayError::BadRequest(e.to_string())
    }
}

impl From<SessionError> for GatewayError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::SharedUnavailable => GatewayError::SharedUnavailable,
            SessionError::Upstream(e) => GatewayError::Upstream(e),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = serialize_error(&self.to_string(), status.as_u16());
        (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body,
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Trait: ChatService (dependency injection point)
// ---------------------------------------------------------------------------

/// Handles one chat-completions call for an already-extracted credential.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait::async_trait]
pub trait ChatService: Send + Sync {
    async fn complete(&self, credential: String, body: Bytes) -> Result<ProxyResponse, GatewayError>;

    /// Model identifiers advertised on `/v1/models`.
    fn models(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Credential extraction
// ---------------------------------------------------------------------------

/// The bearer credential from `Authorization`, if present and non-empty.
pub fn bearer_credential(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, rest) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let credential = rest.trim();
    (!credential.is_empty()).then(|| credential.to_string())
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn ChatService>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health -> {"status":"ok"}
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /v1/models
pub async fn list_models(State(state): State<AppState>) -> Json<serde_json::Value> {
    let data: Vec<serde_json::Value> = state
        .service
        .models()
        .into_iter()
        .map(|id| {
            serde_json::json!({
                "id": id,
                "object": "model",
                "created": 0,
                "owned_by": "chatrelay"
            })
        })
        .collect();
    Json(serde_json::json!({"object": "list", "data": data}))
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    request: Request<Body>,
) -> axum::response::Response {
    let Some(credential) = bearer_credential(request.headers()) else {
        return GatewayError::MissingCredential.into_response();
    };

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            return GatewayError::BadRequest(format!("failed to read request body: {e}"))
                .into_response()
        }
    };

    match state.service.complete(credential, body).await {
        Ok(resp) => resp.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn not_found() -> axum::response::Response {
    let body = serialize_error("unknown path", 404);
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router. The chat service is injected.
pub fn build_router(service: Arc<dyn ChatService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .fallback(not_found)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
