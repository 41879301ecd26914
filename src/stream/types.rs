// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Frames decoded from the upstream NDJSON stream, units the aggregator
// emits, and the knobs that shape both.

use crate::toolcall::ToolCallDescriptor;
use std::fmt;

// ---------------------------------------------------------------------------
// Upstream frames
// ---------------------------------------------------------------------------

/// One decoded upstream line.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamFrame {
    /// A text delta (`msgItem.theContent`).
    Delta(String),
    /// A line whose `code` is non-zero.
    Error { code: i64, message: String },
}

// ---------------------------------------------------------------------------
// Aggregator output
// ---------------------------------------------------------------------------

/// Why a response finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::ToolCalls => "tool_calls",
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something the encoder must render for the client, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    /// Plain assistant text.
    Content(String),
    /// An upstream error line, rendered inline as a warning.
    UpstreamError { code: i64, message: String },
    /// Normalized tool calls detected at end of stream.
    ToolCalls(Vec<ToolCallDescriptor>),
    /// The upstream transport failed before the stream ended. Comes right
    /// before `Finish`.
    Interrupted(String),
    /// Terminal unit; nothing follows it.
    Finish(FinishReason),
}

/// A buffered response whose upstream stream broke off part way.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("upstream stream interrupted: {0}")]
pub struct StreamInterrupted(pub String);

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// What to do when an upstream line carries a non-zero `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamErrorPolicy {
    /// Emit a warning content unit and keep reading.
    #[default]
    Inline,
    /// Emit a warning content unit and stop reading the stream.
    Terminate,
}

/// Default number of characters per tool-call arguments frame.
pub const DEFAULT_ARGUMENT_CHUNK_CHARS: usize = 64;

/// Per-response stream settings, taken from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub argument_chunk_chars: usize,
    pub upstream_error: UpstreamErrorPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            argument_chunk_chars: DEFAULT_ARGUMENT_CHUNK_CHARS,
            upstream_error: UpstreamErrorPolicy::Inline,
        }
    }
}
