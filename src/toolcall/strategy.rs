// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Detection strategies, tried in order by the Normalizer.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::extract::extract_balanced;
use super::{calls_from_container, normalize_call, ToolCallDescriptor};

/// One way of finding tool calls in model output.
///
/// Implementations return `None` when they find nothing they can use;
/// that is expected and never an error.
pub trait DetectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn attempt(&self, text: &str) -> Option<Vec<ToolCallDescriptor>>;
}

// ---------------------------------------------------------------------------
// "tool_calls" field
// ---------------------------------------------------------------------------

/// Finds a `"tool_calls"` key and the object enclosing it.
///
/// For each occurrence of the key, walks backward through preceding `{`
/// characters (nearest first). Objects that close before the key are
/// skipped; the first object that encloses the key and parses decides
/// that occurrence.
pub struct ToolCallsFieldStrategy;

const TOOL_CALLS_MARKER: &str = "\"tool_calls\"";

/// Upper bound on `{` candidates tried per occurrence of the key.
const MAX_OPENINGS_PER_MARKER: usize = 64;

impl DetectionStrategy for ToolCallsFieldStrategy {
    fn name(&self) -> &'static str {
        "tool_calls_field"
    }

    fn attempt(&self, text: &str) -> Option<Vec<ToolCallDescriptor>> {
        for (marker_pos, _) in text.match_indices(TOOL_CALLS_MARKER) {
            let openings = text[..marker_pos]
                .rmatch_indices('{')
                .take(MAX_OPENINGS_PER_MARKER);
            for (open, _) in openings {
                let Some(candidate) = extract_balanced(text, open) else {
                    continue;
                };
                if open + candidate.len() <= marker_pos {
                    continue;
                }
                let Ok(value) = serde_json::from_str::<Value>(candidate) else {
                    continue;
                };
                if let Some(calls) = calls_from_container(&value) {
                    return Some(calls);
                }
                // Innermost enclosing object has no usable calls.
                break;
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Fenced code block
// ---------------------------------------------------------------------------

/// Parses the body of each fenced code block.
///
/// Accepts either a `tool_calls` object or a single call object.
pub struct FencedBlockStrategy {
    fence: &'static Regex,
}

impl FencedBlockStrategy {
    pub fn new() -> Self {
        static FENCE: OnceLock<Regex> = OnceLock::new();
        let fence = FENCE.get_or_init(|| {
            Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)(?:```|\z)")
                .expect("fence pattern compiles")
        });
        Self { fence }
    }
}

impl Default for FencedBlockStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionStrategy for FencedBlockStrategy {
    fn name(&self) -> &'static str {
        "fenced_block"
    }

    fn attempt(&self, text: &str) -> Option<Vec<ToolCallDescriptor>> {
        for caps in self.fence.captures_iter(text) {
            let Some(body) = caps.get(1) else { continue };
            let Some(candidate) = extract_balanced(body.as_str(), 0) else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<Value>(candidate) else {
                continue;
            };
            if let Some(calls) = calls_from_container(&value) {
                return Some(calls);
            }
            if let Some(call) = normalize_call(&value) {
                return Some(vec![call]);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Bare single call
// ---------------------------------------------------------------------------

/// Finds one bare `{"name": ..., "arguments": ...}` object.
pub struct BareCallStrategy {
    opening: &'static Regex,
}

impl BareCallStrategy {
    pub fn new() -> Self {
        static OPENING: OnceLock<Regex> = OnceLock::new();
        let opening = OPENING
            .get_or_init(|| Regex::new(r#"\{\s*"name"\s*:"#).expect("bare call pattern compiles"));
        Self { opening }
    }
}

impl Default for BareCallStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionStrategy for BareCallStrategy {
    fn name(&self) -> &'static str {
        "bare_call"
    }

    fn attempt(&self, text: &str) -> Option<Vec<ToolCallDescriptor>> {
        for m in self.opening.find_iter(text) {
            let Some(candidate) = extract_balanced(text, m.start()) else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<Value>(candidate) else {
                continue;
            };
            let has_arguments = value.get("arguments").is_some() || value.get("parameters").is_some();
            if !has_arguments {
                continue;
            }
            if let Some(call) = normalize_call(&value) {
                return Some(vec![call]);
            }
        }
        None
    }
}
