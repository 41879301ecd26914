// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Chat engine
//
// Wires the components together for one chat-completions call:
// - Parse request via the inbound adapter
// - Model check
// - Session/token resolution (may answer in-band commands directly)
// - Prompt translation
// - Generation upstream
// - Streaming: SSE through the stream processor
// - Buffered: one chat.completion built from the same pipeline

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::StreamExt;
use uuid::Uuid;

use crate::adapter::parse_chat_request;
use crate::config::Config;
use crate::prompt::build_prompt;
use crate::proxy::{ChatService, GatewayError, ProxyResponse};
use crate::session::{Orchestrator, Resolution, SessionError, SessionSettings};
use crate::store::Clock;
use crate::stream::{
    ChunkEncoder, CompletionBuilder, FinishReason, ResponseMeta, StreamProcessor, Unit,
};
use crate::toolcall::Normalizer;
use crate::upstream::{GenerateRequest, UpstreamApi, UpstreamError};

// ---------------------------------------------------------------------------
// Request context for structured logging
// ---------------------------------------------------------------------------

struct RequestContext {
    request_id: String,
    model: String,
    stream: bool,
    shared: bool,
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

pub struct EngineDeps {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub upstream: Arc<dyn UpstreamApi>,
    pub processor: StreamProcessor,
}

// ---------------------------------------------------------------------------
// ChatEngine
// ---------------------------------------------------------------------------

/// Chat service that runs the full translation pipeline.
pub struct ChatEngine {
    deps: EngineDeps,
}

impl ChatEngine {
    pub fn new_with(deps: EngineDeps) -> Self {
        Self { deps }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.deps.orchestrator
    }
}

#[async_trait]
impl ChatService for ChatEngine {
    async fn complete(&self, credential: String, body: Bytes) -> Result<ProxyResponse, GatewayError> {
        let started = Instant::now();

        // 1) Parse
        let request = parse_chat_request(&body).map_err(|e| {
            tracing::debug!(error = %e, "rejected request body");
            e
        })?;

        let ctx = RequestContext {
            request_id: Uuid::new_v4().to_string(),
            model: request.model.clone(),
            stream: request.stream,
            shared: self.deps.orchestrator.is_shared(&credential),
        };

        tracing::debug!(
            request_id = %ctx.request_id,
            model = %ctx.model,
            stream = ctx.stream,
            shared = ctx.shared,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "processing request"
        );

        // 2) Model check
        if !self.deps.config.supports_model(&request.model) {
            tracing::info!(request_id = %ctx.request_id, model = %ctx.model, "unknown model");
            return Err(GatewayError::UnknownModel(request.model));
        }

        // 3) Session/token resolution
        let resolution = self
            .deps
            .orchestrator
            .resolve(&credential, &request)
            .await
            .map_err(|e| {
                log_session_failure(&ctx, &e);
                e
            })?;

        let (token, conversation_id, variant, fresh) = match resolution {
            Resolution::Reply(text) => {
                tracing::info!(
                    request_id = %ctx.request_id,
                    model = %ctx.model,
                    "answered in-band command"
                );
                return Ok(self.reply_response(&ctx, text));
            }
            Resolution::Proceed {
                token,
                conversation_id,
                variant,
                fresh,
            } => (token, conversation_id, variant, fresh),
        };

        // 4) Prompt
        let prompt = build_prompt(&request.messages, &request.tools, fresh);

        // 5) Generate
        let generate = GenerateRequest {
            token,
            prompt,
            conversation_id: conversation_id.clone(),
            variant,
            stream: request.stream,
        };
        let upstream = self.deps.upstream.generate(generate).await.map_err(|e| {
            log_upstream_failure(&ctx, &e);
            e
        })?;

        tracing::info!(
            request_id = %ctx.request_id,
            model = %ctx.model,
            conversation = %conversation_id,
            variant,
            fresh,
            latency_ms = started.elapsed().as_secs_f64() * 1000.0,
            "generation started"
        );

        // 6) Translate the response
        let meta = ResponseMeta::new(&request.model);
        if request.stream {
            let frames = self.deps.processor.process(upstream, meta);
            let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
            return Ok(ProxyResponse::event_stream(body));
        }

        let completion = self.deps.processor.collect(upstream, &meta).await.map_err(|e| {
            tracing::warn!(
                request_id = %ctx.request_id,
                model = %ctx.model,
                conversation = %conversation_id,
                error = %e,
                "buffered generation interrupted"
            );
            e
        })?;
        tracing::debug!(
            request_id = %ctx.request_id,
            latency_ms = started.elapsed().as_secs_f64() * 1000.0,
            "buffered completion built"
        );
        Ok(ProxyResponse::json(StatusCode::OK, &completion))
    }

    fn models(&self) -> Vec<String> {
        self.deps.config.models.clone()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build the engine and its orchestrator from loaded config.
pub fn build_engine(config: Arc<Config>, upstream: Arc<dyn UpstreamApi>, clock: Arc<dyn Clock>) -> ChatEngine {
    let orchestrator = Orchestrator::new(upstream.clone(), SessionSettings::from_config(&config), clock);
    let processor = StreamProcessor::new(Arc::new(Normalizer::default()), config.stream);
    ChatEngine::new_with(EngineDeps {
        config,
        orchestrator: Arc::new(orchestrator),
        upstream,
        processor,
    })
}

impl ChatEngine {
    /// Informational reply, shaped like any other completion.
    fn reply_response(&self, ctx: &RequestContext, text: String) -> ProxyResponse {
        let meta = ResponseMeta::new(&ctx.model);
        let units = [Unit::Content(text), Unit::Finish(FinishReason::Stop)];

        if ctx.stream {
            let chunk_chars = self.deps.processor.settings().argument_chunk_chars;
            let mut encoder = ChunkEncoder::new(meta, chunk_chars);
            let frames: Vec<Result<Bytes, Infallible>> = units
                .iter()
                .flat_map(|unit| encoder.encode(unit))
                .map(Ok)
                .collect();
            return ProxyResponse::event_stream(Body::from_stream(futures_util::stream::iter(frames)));
        }

        let mut builder = CompletionBuilder::new();
        for unit in units {
            builder.push(unit);
        }
        ProxyResponse::json(StatusCode::OK, &builder.build(&meta))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn log_session_failure(ctx: &RequestContext, e: &SessionError) {
    match e {
        SessionError::Upstream(e) => log_upstream_failure(ctx, e),
        SessionError::SharedUnavailable => tracing::warn!(
            request_id = %ctx.request_id,
            model = %ctx.model,
            "shared credential requested but not configured"
        ),
    }
}

fn log_upstream_failure(ctx: &RequestContext, e: &UpstreamError) {
    let status = match e {
        UpstreamError::Status { status, .. } => Some(*status),
        _ => None,
    };
    tracing::warn!(
        request_id = %ctx.request_id,
        model = %ctx.model,
        stage = %e.stage(),
        status,
        error = %e,
        "upstream call failed"
    );
}
