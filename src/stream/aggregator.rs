// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Content aggregator / mode detector
//
// Decides, frame by frame, whether model text is streamed to the client
// immediately or held back as a possible tool-call payload. At end of
// stream it either emits normalized tool calls or flushes held text.
// No I/O happens here; the processor drives it.

use crate::toolcall::{opening, Normalizer, Opening};

use super::types::{FinishReason, Unit, UpstreamErrorPolicy, UpstreamFrame};

/// Whether text is being streamed or buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Text,
    /// Buffering until end of stream. Never reverts within one response.
    ToolCandidate,
}

/// Per-response aggregation state.
#[derive(Debug, Clone)]
pub struct Aggregator {
    accumulated: String,
    mode: Mode,
    /// Bytes of `accumulated` already emitted as content.
    sent: usize,
    policy: UpstreamErrorPolicy,
    halted: bool,
}

impl Aggregator {
    pub fn new(policy: UpstreamErrorPolicy) -> Self {
        Self {
            accumulated: String::new(),
            mode: Mode::Text,
            sent: 0,
            policy,
            halted: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    /// True once an error frame has stopped the stream under
    /// `UpstreamErrorPolicy::Terminate`. Further frames are ignored.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Apply one upstream frame and return the units to emit now.
    pub fn consume(&mut self, frame: UpstreamFrame) -> Vec<Unit> {
        if self.halted {
            return Vec::new();
        }

        match frame {
            UpstreamFrame::Error { code, message } => {
                if self.policy == UpstreamErrorPolicy::Terminate {
                    self.halted = true;
                }
                vec![Unit::UpstreamError { code, message }]
            }
            UpstreamFrame::Delta(text) => {
                self.accumulated.push_str(&text);
                self.advance()
            }
        }
    }

    fn advance(&mut self) -> Vec<Unit> {
        if self.mode == Mode::ToolCandidate {
            return Vec::new();
        }

        if self.sent == 0 {
            match opening(&self.accumulated) {
                Opening::Match => {
                    tracing::debug!(buffered = self.accumulated.len(), "tool call opening detected; buffering");
                    self.mode = Mode::ToolCandidate;
                    return Vec::new();
                }
                Opening::Possible => return Vec::new(),
                Opening::NoMatch => {}
            }
        }

        self.take_unsent()
            .map(|text| vec![Unit::Content(text)])
            .unwrap_or_default()
    }

    fn take_unsent(&mut self) -> Option<String> {
        if self.sent >= self.accumulated.len() {
            return None;
        }
        let text = self.accumulated[self.sent..].to_string();
        self.sent = self.accumulated.len();
        Some(text)
    }

    /// Resolve the response at end of stream.
    ///
    /// Tool calls anywhere in the accumulated text win, even if earlier
    /// text was already streamed. Otherwise any held text is flushed
    /// unchanged and the response stops normally.
    pub fn finish(mut self, normalizer: &Normalizer) -> Vec<Unit> {
        if let Some(calls) = normalizer.detect(&self.accumulated) {
            return vec![
                Unit::ToolCalls(calls),
                Unit::Finish(FinishReason::ToolCalls),
            ];
        }

        if self.mode == Mode::ToolCandidate {
            tracing::debug!(len = self.accumulated.len(), "buffered text had no tool calls; flushing as content");
        }

        let mut units = Vec::with_capacity(2);
        if let Some(text) = self.take_unsent() {
            units.push(Unit::Content(text));
        }
        units.push(Unit::Finish(FinishReason::Stop));
        units
    }
}
