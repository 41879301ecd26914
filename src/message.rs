// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Internal chat request representation
//
// The inbound adapter produces a `ChatRequest`; the session orchestrator
// and prompt builder read from it. Nothing here knows about the wire
// format on either side.

use serde::{Deserialize, Serialize};

/// The role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call the assistant made in an earlier turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments text, as the client sent it.
    pub arguments: String,
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    /// Text content. Content-part arrays are flattened to their text.
    pub content: String,
    /// Tool calls requested by the assistant. Empty for other roles.
    pub tool_calls: Vec<ToolCall>,
    /// For tool result messages: the call this responds to.
    pub tool_call_id: Option<String>,
    /// Optional participant or tool name.
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }
}

/// A function the client offers to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    /// JSON schema of the arguments, if given.
    pub parameters: Option<serde_json::Value>,
}

/// A parsed chat-completions request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub stream: bool,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
}

impl ChatRequest {
    /// The most recent user message, if any.
    pub fn latest_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }
}
