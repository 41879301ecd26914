// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Upstream client
//
// Responsibilities:
// - Log in with the configured shared credentials and return a bearer token
// - Create conversations and return their identifiers
// - Start a generation and hand back the raw NDJSON body as a byte stream
// - Map HTTP, transport and timeout failures to UpstreamError
//
// The trait is the injection point: the session orchestrator and engine
// never touch reqwest directly.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use serde_json::{json, Value};

use crate::config::{Credentials, UpstreamConfig};

/// Raw upstream response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// Longest upstream error body kept for logs and error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Which upstream call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Login,
    Conversation,
    Generate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Login => "login",
            Stage::Conversation => "conversation",
            Stage::Generate => "generate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream {stage} returned HTTP {status}")]
    Status { stage: Stage, status: u16, body: String },

    #[error("upstream {stage} request failed: {message}")]
    Transport { stage: Stage, message: String },

    #[error("upstream {stage} request timed out")]
    Timeout { stage: Stage },

    #[error("upstream {stage} rejected: {message}")]
    Rejected { stage: Stage, message: String },
}

impl UpstreamError {
    pub fn stage(&self) -> Stage {
        match self {
            UpstreamError::Status { stage, .. }
            | UpstreamError::Transport { stage, .. }
            | UpstreamError::Timeout { stage }
            | UpstreamError::Rejected { stage, .. } => *stage,
        }
    }

    fn from_reqwest(stage: Stage, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout { stage }
        } else {
            UpstreamError::Transport {
                stage,
                message: e.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Trait: UpstreamApi (dependency injection point)
// ---------------------------------------------------------------------------

/// One generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub token: String,
    pub prompt: String,
    pub conversation_id: String,
    pub variant: u32,
    pub stream: bool,
}

/// The three upstream operations the gateway depends on.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Obtain a bearer token for the shared-default identity.
    async fn login(&self) -> Result<String, UpstreamError>;

    /// Create a conversation and return its identifier.
    async fn create_conversation(
        &self,
        token: &str,
        title: &str,
        variant: u32,
    ) -> Result<String, UpstreamError>;

    /// Start a generation. The body is returned unread.
    async fn generate(&self, request: GenerateRequest) -> Result<ByteStream, UpstreamError>;
}

// ---------------------------------------------------------------------------
// Reqwest implementation
// ---------------------------------------------------------------------------

pub struct HttpUpstream {
    client: reqwest::Client,
    config: UpstreamConfig,
    credentials: Option<Credentials>,
}

impl HttpUpstream {
    pub fn new(client: reqwest::Client, config: UpstreamConfig, credentials: Option<Credentials>) -> Self {
        Self {
            client,
            config,
            credentials,
        }
    }

    /// POST a JSON body and return the parsed JSON response.
    async fn post_json(
        &self,
        stage: Stage,
        path: &str,
        token: Option<&str>,
        body: Value,
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        let mut req = self
            .client
            .post(self.config.url(path))
            .json(&body)
            .timeout(timeout);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(stage, e))?;
        let resp = check_status(stage, resp).await?;

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| UpstreamError::from_reqwest(stage, e))?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|_| UpstreamError::Rejected {
            stage,
            message: "response is not JSON".to_string(),
        })?;

        if let Some(message) = embedded_error(&value) {
            return Err(UpstreamError::Rejected { stage, message });
        }
        Ok(value)
    }
}

#[async_trait]
impl UpstreamApi for HttpUpstream {
    async fn login(&self) -> Result<String, UpstreamError> {
        let Some(credentials) = &self.credentials else {
            return Err(UpstreamError::Rejected {
                stage: Stage::Login,
                message: "no credentials configured".to_string(),
            });
        };

        let body = json!({
            "username": credentials.username,
            "password": credentials.password,
        });
        let value = self
            .post_json(
                Stage::Login,
                &self.config.login_path,
                None,
                body,
                self.config.login_timeout,
            )
            .await?;

        token_from(&value).ok_or_else(|| UpstreamError::Rejected {
            stage: Stage::Login,
            message: "response carries no token".to_string(),
        })
    }

    async fn create_conversation(
        &self,
        token: &str,
        title: &str,
        variant: u32,
    ) -> Result<String, UpstreamError> {
        let body = json!({"title": title, "assistantType": variant});
        let value = self
            .post_json(
                Stage::Conversation,
                &self.config.conversation_path,
                Some(token),
                body,
                self.config.conversation_timeout,
            )
            .await?;

        conversation_id_from(&value).ok_or_else(|| UpstreamError::Rejected {
            stage: Stage::Conversation,
            message: "response carries no conversation id".to_string(),
        })
    }

    async fn generate(&self, request: GenerateRequest) -> Result<ByteStream, UpstreamError> {
        let body = json!({
            "prompt": request.prompt,
            "conversationId": request.conversation_id,
            "assistantType": request.variant,
            "stream": request.stream,
        });

        // Generation has no client-side timeout.
        let resp = self
            .client
            .post(self.config.url(&self.config.generate_path))
            .bearer_auth(&request.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(Stage::Generate, e))?;
        let resp = check_status(Stage::Generate, resp).await?;

        let stream = resp
            .bytes_stream()
            .map_err(|e| UpstreamError::from_reqwest(Stage::Generate, e));
        Ok(Box::pin(stream))
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

async fn check_status(stage: Stage, resp: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        stage,
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    })
}

/// A non-zero `code` in an otherwise successful response.
fn embedded_error(value: &Value) -> Option<String> {
    let code = match value.get("code") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    };
    if code == 0 {
        return None;
    }
    let message = ["message", "msg", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .unwrap_or("unknown error");
    Some(format!("code {code}: {message}"))
}

/// Token at `token`, `data.token`, `data.accessToken`, or `data` itself.
fn token_from(value: &Value) -> Option<String> {
    let data = value.get("data");
    value
        .get("token")
        .or_else(|| data.and_then(|d| d.get("token")))
        .or_else(|| data.and_then(|d| d.get("accessToken")))
        .or(data)
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Identifier at `conversationId`, `id`, `data.conversationId`, `data.id`,
/// or `data` itself. Numbers are rendered in decimal.
fn conversation_id_from(value: &Value) -> Option<String> {
    let data = value.get("data");
    [
        value.get("conversationId"),
        value.get("id"),
        data.and_then(|d| d.get("conversationId")),
        data.and_then(|d| d.get("id")),
        data,
    ]
    .into_iter()
    .flatten()
    .find_map(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
