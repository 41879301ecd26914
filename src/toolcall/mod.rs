// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Tool call detection and normalization
//
// Responsibilities:
// - Find a tool-call payload the model wrote into its text output
// - Try an ordered list of detection strategies, first success wins
// - Canonicalize every call: id, kind, name, arguments as JSON text
// - Early "does this look like a tool call opening" check for streaming

mod extract;
mod strategy;

pub use extract::extract_balanced;
pub use strategy::{BareCallStrategy, DetectionStrategy, FencedBlockStrategy, ToolCallsFieldStrategy};

use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Descriptor
// ---------------------------------------------------------------------------

/// A normalized tool call, ready to be encoded for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallDescriptor {
    pub id: String,
    /// Always "function" unless the model supplied an explicit type.
    pub kind: String,
    pub name: String,
    /// Syntactically valid JSON text.
    pub arguments: String,
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Runs detection strategies in order and returns the first success.
pub struct Normalizer {
    strategies: Vec<Box<dyn DetectionStrategy>>,
}

impl Normalizer {
    pub fn with_strategies(strategies: Vec<Box<dyn DetectionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Detect tool calls in `text`.
    ///
    /// `None` means "no call detected", which is the common outcome for
    /// plain prose and not an error.
    pub fn detect(&self, text: &str) -> Option<Vec<ToolCallDescriptor>> {
        if !text.contains('{') {
            return None;
        }
        self.strategies.iter().find_map(|strategy| {
            let calls = strategy.attempt(text)?;
            tracing::debug!(strategy = strategy.name(), calls = calls.len(), "tool calls detected");
            Some(calls)
        })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::with_strategies(vec![
            Box::new(ToolCallsFieldStrategy),
            Box::new(FencedBlockStrategy::new()),
            Box::new(BareCallStrategy::new()),
        ])
    }
}

/// Normalize the `tool_calls` array of a parsed object.
///
/// Returns `None` unless at least one entry is call-like.
pub(crate) fn calls_from_container(value: &Value) -> Option<Vec<ToolCallDescriptor>> {
    let calls: Vec<_> = value
        .get("tool_calls")?
        .as_array()?
        .iter()
        .filter_map(normalize_call)
        .collect();
    if calls.is_empty() {
        None
    } else {
        Some(calls)
    }
}

/// Normalize one call-like object.
///
/// Accepts `{"name", "arguments"}`, `{"function": {"name", "arguments"}}`
/// and `"parameters"` in place of `"arguments"`. Objects without a string
/// name are rejected.
pub(crate) fn normalize_call(value: &Value) -> Option<ToolCallDescriptor> {
    let obj = value.as_object()?;
    let function = obj.get("function").and_then(Value::as_object);

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| function?.get("name")?.as_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())?;

    let raw_args = obj
        .get("arguments")
        .or_else(|| function.and_then(|f| f.get("arguments")))
        .or_else(|| obj.get("parameters"));

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .unwrap_or_else(generate_call_id);

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or("function")
        .to_string();

    Some(ToolCallDescriptor {
        id,
        kind,
        name: name.to_string(),
        arguments: canonical_arguments(raw_args),
    })
}

/// Render arguments as JSON text.
///
/// Live values are serialized; strings that already hold JSON are kept
/// verbatim; any other string becomes a JSON string literal.
pub(crate) fn canonical_arguments(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "{}".to_string(),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                "{}".to_string()
            } else if serde_json::from_str::<Value>(trimmed).is_ok() {
                trimmed.to_string()
            } else {
                Value::String(s.clone()).to_string()
            }
        }
        Some(other) => other.to_string(),
    }
}

fn generate_call_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!("call_{}", &simple[..24])
}

// ---------------------------------------------------------------------------
// Streaming opening heuristic
// ---------------------------------------------------------------------------

/// Result of checking whether text begins like a tool-call payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opening {
    /// Text opens with `{"tool_calls"` or `{"name"`, optionally fenced.
    Match,
    /// Text so far is a strict prefix of such an opening.
    Possible,
    NoMatch,
}

const OPENING_KEYS: [&str; 2] = ["\"tool_calls\"", "\"name\""];

/// Classify the start of a (possibly incomplete) model response.
pub fn opening(text: &str) -> Opening {
    let mut rest = text.trim_start();
    if rest.is_empty() {
        return Opening::Possible;
    }

    // Optional code fence with a language tag.
    if rest.starts_with('`') {
        let ticks = rest.chars().take_while(|&c| c == '`').count();
        if ticks < 3 {
            return if ticks == rest.len() {
                Opening::Possible
            } else {
                Opening::NoMatch
            };
        }
        rest = &rest[3..];
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        rest = rest[tag_len..].trim_start();
        if rest.is_empty() {
            return Opening::Possible;
        }
    }

    let Some(after_brace) = rest.strip_prefix('{') else {
        return Opening::NoMatch;
    };
    let body = after_brace.trim_start();
    if body.is_empty() {
        return Opening::Possible;
    }

    for key in OPENING_KEYS {
        if body.starts_with(key) {
            return Opening::Match;
        }
        if key.starts_with(body) {
            return Opening::Possible;
        }
    }
    Opening::NoMatch
}
