// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Prompt translation
//
// The upstream generation endpoint takes a single prompt string and keeps
// conversation history on its side. For a fresh conversation the whole
// message list is rendered; otherwise only the system messages and the
// turns after the last assistant reply are sent.

use crate::message::{Message, Role, ToolSpec};

/// Render the upstream prompt for one request.
pub fn build_prompt(messages: &[Message], tools: &[ToolSpec], fresh: bool) -> String {
    let selected = select_messages(messages, fresh);

    if tools.is_empty() {
        if let [only] = selected.as_slice() {
            if only.role == Role::User {
                return only.content.clone();
            }
        }
    }

    let mut sections = Vec::with_capacity(selected.len() + 1);
    if !tools.is_empty() {
        sections.push(tools_preamble(tools));
    }
    sections.extend(selected.iter().map(|m| render_message(m)));
    sections.join("\n\n")
}

fn select_messages(messages: &[Message], fresh: bool) -> Vec<&Message> {
    let last_assistant = messages.iter().rposition(|m| m.role == Role::Assistant);
    match last_assistant {
        Some(idx) if !fresh => messages
            .iter()
            .enumerate()
            .filter(|(i, m)| *i > idx || m.role == Role::System)
            .map(|(_, m)| m)
            .collect(),
        _ => messages.iter().collect(),
    }
}

fn render_message(message: &Message) -> String {
    match message.role {
        Role::System => format!("System: {}", message.content),
        Role::User => format!("User: {}", message.content),
        Role::Assistant if message.tool_calls.is_empty() => {
            format!("Assistant: {}", message.content)
        }
        Role::Assistant => {
            let calls: Vec<serde_json::Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    let arguments = serde_json::from_str::<serde_json::Value>(&call.arguments)
                        .unwrap_or_else(|_| serde_json::Value::String(call.arguments.clone()));
                    serde_json::json!({"name": call.name, "arguments": arguments})
                })
                .collect();
            let payload = serde_json::json!({"tool_calls": calls});
            if message.content.trim().is_empty() {
                format!("Assistant: {payload}")
            } else {
                format!("Assistant: {}\n{payload}", message.content)
            }
        }
        // Older clients name the tool instead of citing a call id.
        Role::Tool => match message.tool_call_id.as_ref().or(message.name.as_ref()) {
            Some(label) => format!("Tool result [{label}]: {}", message.content),
            None => format!("Tool result: {}", message.content),
        },
    }
}

fn tools_preamble(tools: &[ToolSpec]) -> String {
    let mut out = String::from("You can call the following tools:\n");
    for tool in tools {
        out.push_str("\n- ");
        out.push_str(&tool.name);
        if let Some(description) = tool.description.as_deref().filter(|d| !d.is_empty()) {
            out.push_str(": ");
            out.push_str(description);
        }
        if let Some(parameters) = &tool.parameters {
            out.push_str("\n  parameters: ");
            out.push_str(&parameters.to_string());
        }
    }
    out.push_str(
        "\n\nTo call a tool, reply with only a JSON object of the form \
         {\"tool_calls\":[{\"name\":\"<tool name>\",\"arguments\":{...}}]} and no other text. \
         Otherwise answer normally.",
    );
    out
}
