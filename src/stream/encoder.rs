// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Output encoder
//
// Renders aggregator units as OpenAI chat-completion SSE frames, or
// assembles them into a single chat-completion object for non-streaming
// requests.

use bytes::Bytes;
use serde_json::{json, Value};

use crate::toolcall::ToolCallDescriptor;

use super::types::{FinishReason, Unit};

/// The SSE frame that ends every streamed response.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Identity shared by every frame of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub id: String,
    pub model: String,
    pub created: i64,
}

impl ResponseMeta {
    pub fn new(model: impl Into<String>) -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("chatcmpl-{}", &simple[..24]),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
        }
    }
}

/// Text shown to the client for an upstream error line.
pub fn upstream_error_text(code: i64, message: &str) -> String {
    format!("[upstream error {code}] {message}")
}

/// Text shown to the client when the upstream stream broke off.
pub fn interrupted_text(reason: &str) -> String {
    format!("[stream interrupted] {reason}")
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// Stateful SSE encoder for one response.
pub struct ChunkEncoder {
    meta: ResponseMeta,
    argument_chunk_chars: usize,
    role_sent: bool,
    next_tool_index: usize,
}

impl ChunkEncoder {
    pub fn new(meta: ResponseMeta, argument_chunk_chars: usize) -> Self {
        Self {
            meta,
            argument_chunk_chars: argument_chunk_chars.max(1),
            role_sent: false,
            next_tool_index: 0,
        }
    }

    /// Render one unit as zero or more SSE frames.
    pub fn encode(&mut self, unit: &Unit) -> Vec<Bytes> {
        match unit {
            Unit::Content(text) => vec![self.content_frame(text)],
            Unit::UpstreamError { code, message } => {
                vec![self.content_frame(&upstream_error_text(*code, message))]
            }
            Unit::ToolCalls(calls) => calls.iter().flat_map(|call| self.tool_call_frames(call)).collect(),
            Unit::Interrupted(reason) => vec![self.content_frame(&interrupted_text(reason))],
            Unit::Finish(reason) => vec![
                self.frame(json!({}), Some(*reason)),
                Bytes::from_static(DONE_FRAME.as_bytes()),
            ],
        }
    }

    fn content_frame(&mut self, text: &str) -> Bytes {
        let delta = if self.take_first() {
            json!({"role": "assistant", "content": text})
        } else {
            json!({"content": text})
        };
        self.frame(delta, None)
    }

    fn tool_call_frames(&mut self, call: &ToolCallDescriptor) -> Vec<Bytes> {
        let index = self.next_tool_index;
        self.next_tool_index += 1;

        let mut opening = json!({
            "tool_calls": [{
                "index": index,
                "id": call.id,
                "type": call.kind,
                "function": {"name": call.name, "arguments": ""}
            }]
        });
        if self.take_first() {
            opening["role"] = json!("assistant");
            opening["content"] = Value::Null;
        }

        let mut frames = vec![self.frame(opening, None)];
        for slice in char_slices(&call.arguments, self.argument_chunk_chars) {
            let delta = json!({
                "tool_calls": [{"index": index, "function": {"arguments": slice}}]
            });
            frames.push(self.frame(delta, None));
        }
        frames
    }

    fn take_first(&mut self) -> bool {
        !std::mem::replace(&mut self.role_sent, true)
    }

    fn frame(&self, delta: Value, finish: Option<FinishReason>) -> Bytes {
        let chunk = json!({
            "id": self.meta.id,
            "object": "chat.completion.chunk",
            "created": self.meta.created,
            "model": self.meta.model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish.map(|r| r.as_str()),
            }]
        });
        Bytes::from(format!("data: {chunk}\n\n"))
    }
}

/// Split `s` into pieces of at most `size` characters.
fn char_slices(s: &str, size: usize) -> Vec<&str> {
    let mut slices = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in s.char_indices() {
        if count == size {
            slices.push(&s[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < s.len() {
        slices.push(&s[start..]);
    }
    slices
}

// ---------------------------------------------------------------------------
// Buffered
// ---------------------------------------------------------------------------

/// Collects units into one `chat.completion` response body.
#[derive(Debug, Default)]
pub struct CompletionBuilder {
    content: String,
    tool_calls: Vec<ToolCallDescriptor>,
    interrupted: Option<String>,
    finish: Option<FinishReason>,
}

impl CompletionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unit: Unit) {
        match unit {
            Unit::Content(text) => self.content.push_str(&text),
            Unit::UpstreamError { code, message } => {
                if !self.content.is_empty() && !self.content.ends_with('\n') {
                    self.content.push('\n');
                }
                self.content.push_str(&upstream_error_text(code, &message));
                self.content.push('\n');
            }
            Unit::ToolCalls(calls) => self.tool_calls.extend(calls),
            Unit::Interrupted(reason) => self.interrupted = Some(reason),
            Unit::Finish(reason) => self.finish = Some(reason),
        }
    }

    /// Why the upstream stream broke off, if it did.
    pub fn interrupted(&self) -> Option<&str> {
        self.interrupted.as_deref()
    }

    pub fn build(self, meta: &ResponseMeta) -> Value {
        let finish = self.finish.unwrap_or(FinishReason::Stop);
        let mut message = json!({"role": "assistant"});

        message["content"] = if self.content.is_empty() && !self.tool_calls.is_empty() {
            Value::Null
        } else {
            Value::String(self.content)
        };

        if !self.tool_calls.is_empty() {
            message["tool_calls"] = self
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": call.kind,
                        "function": {"name": call.name, "arguments": call.arguments}
                    })
                })
                .collect();
        }

        json!({
            "id": meta.id,
            "object": "chat.completion",
            "created": meta.created,
            "model": meta.model,
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": finish.as_str(),
            }]
        })
    }
}
