// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Inbound OpenAI adapter
//
// Responsibilities:
// - Parse an OpenAI chat-completions request body into a ChatRequest
// - Flatten content-part arrays into plain text
// - Keep assistant tool calls and tool result links for prompt rendering
// - Serialize error responses in the OpenAI error envelope

use serde_json::Value;

use crate::message::{ChatRequest, Message, Role, ToolCall, ToolSpec};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing an inbound request body.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid role: {0}")]
    InvalidRole(String),

    #[error("invalid request format: {0}")]
    InvalidFormat(String),
}

// ---------------------------------------------------------------------------
// Request parsing
// ---------------------------------------------------------------------------

/// Parse an OpenAI chat completion request.
///
/// Expected input shape:
/// ```json
/// {
///   "model": "assistant",
///   "stream": true,
///   "messages": [
///     {"role": "system", "content": "..."},
///     {"role": "user", "content": [{"type": "text", "text": "..."}]},
///     {"role": "assistant", "content": null, "tool_calls": [...]},
///     {"role": "tool", "tool_call_id": "call_1", "content": "..."}
///   ],
///   "tools": [{"type": "function", "function": {"name": "...", "parameters": {}}}]
/// }
/// ```
pub fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, AdapterError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AdapterError::InvalidJson("empty request body".to_string()));
    }

    let root: Value =
        serde_json::from_slice(body).map_err(|e| AdapterError::InvalidJson(e.to_string()))?;
    if !root.is_object() {
        return Err(AdapterError::InvalidFormat(
            "request body is not a JSON object".to_string(),
        ));
    }

    let model = root
        .get("model")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| AdapterError::MissingField("model".to_string()))?
        .to_string();

    let stream = match root.get("stream") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(AdapterError::InvalidFormat(
                "stream is not a boolean".to_string(),
            ))
        }
    };

    let messages_arr = root
        .get("messages")
        .ok_or_else(|| AdapterError::MissingField("messages".to_string()))?
        .as_array()
        .ok_or_else(|| AdapterError::InvalidFormat("messages is not an array".to_string()))?;
    if messages_arr.is_empty() {
        return Err(AdapterError::InvalidFormat(
            "messages must not be empty".to_string(),
        ));
    }

    let messages = messages_arr
        .iter()
        .map(parse_message)
        .collect::<Result<Vec<_>, _>>()?;

    let tools = match root.get("tools") {
        Some(Value::Array(arr)) => arr.iter().map(parse_tool).collect::<Result<Vec<_>, _>>()?,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(AdapterError::InvalidFormat(
                "tools is not an array".to_string(),
            ))
        }
    };

    Ok(ChatRequest {
        model,
        stream,
        messages,
        tools,
    })
}

fn parse_role(role: &str) -> Result<Role, AdapterError> {
    match role {
        "system" | "developer" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" | "function" => Ok(Role::Tool),
        other => Err(AdapterError::InvalidRole(other.to_string())),
    }
}

fn parse_message(value: &Value) -> Result<Message, AdapterError> {
    let role_str = value
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::MissingField("messages[].role".to_string()))?;
    let role = parse_role(role_str)?;

    let content = flatten_content(value.get("content"));

    let tool_calls = match value.get("tool_calls") {
        Some(Value::Array(arr)) => parse_tool_calls(arr)?,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(AdapterError::InvalidFormat(
                "tool_calls is not an array".to_string(),
            ))
        }
    };

    Ok(Message {
        role,
        content,
        tool_calls,
        tool_call_id: value
            .get("tool_call_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        name: value.get("name").and_then(Value::as_str).map(str::to_string),
    })
}

/// Content may be a string, null, or an array of typed parts.
fn flatten_content(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                Value::Object(_) => part.get("text").and_then(Value::as_str),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}

fn parse_tool_calls(tool_calls: &[Value]) -> Result<Vec<ToolCall>, AdapterError> {
    let mut result = Vec::with_capacity(tool_calls.len());

    for tc in tool_calls {
        let function = tc
            .get("function")
            .ok_or_else(|| AdapterError::MissingField("tool_calls[].function".to_string()))?;

        let name = function
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::MissingField("tool_calls[].function.name".to_string()))?
            .to_string();

        let arguments = match function.get("arguments") {
            None | Some(Value::Null) => "{}".to_string(),
            Some(Value::String(s)) if s.trim().is_empty() => "{}".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        result.push(ToolCall {
            id: tc
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name,
            arguments,
        });
    }

    Ok(result)
}

/// Accepts `{"type":"function","function":{...}}` and the flat `{name, ...}` form.
fn parse_tool(value: &Value) -> Result<ToolSpec, AdapterError> {
    let def = value.get("function").unwrap_or(value);
    let name = def
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AdapterError::MissingField("tools[].function.name".to_string()))?
        .to_string();

    Ok(ToolSpec {
        name,
        description: def
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        parameters: def.get("parameters").filter(|p| !p.is_null()).cloned(),
    })
}

// ---------------------------------------------------------------------------
// Error serialization
// ---------------------------------------------------------------------------

/// Serialize an error into the OpenAI error envelope.
pub fn serialize_error(error: &str, status: u16) -> Vec<u8> {
    let error_type = if status == 401 {
        "authentication_error"
    } else if status >= 500 {
        "server_error"
    } else if status >= 400 {
        "invalid_request_error"
    } else {
        "error"
    };

    let response = serde_json::json!({
        "error": {
            "message": error,
            "type": error_type,
            "param": null,
            "code": null
        }
    });

    serde_json::to_vec(&response).unwrap_or_else(|_| {
        format!(r#"{{"error":{{"message":"{error}","type":"server_error"}}}}"#).into_bytes()
    })
}
