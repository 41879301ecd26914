// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Upstream NDJSON line decoder
//
// Buffers raw bytes across reads, splits on '\n', and parses each complete
// line independently. Malformed lines are dropped without failing the
// stream.

use serde_json::Value;

use super::types::UpstreamFrame;

/// Incremental decoder for the upstream newline-delimited JSON stream.
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Bytes after the last newline seen so far.
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns frames for every line it completed.
    ///
    /// Bytes are split before UTF-8 decoding, so a multibyte character cut
    /// across two reads is reassembled intact.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<UpstreamFrame> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(|&b| b == b'\n')
            .filter_map(|line| parse_line(&String::from_utf8_lossy(line)))
            .collect()
    }

    /// Decode whatever is left once the upstream stream has ended.
    pub fn finish(&mut self) -> Vec<UpstreamFrame> {
        let rest = std::mem::take(&mut self.pending);
        parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Parse one upstream line into a frame.
///
/// Returns `None` for blank lines, `[DONE]` markers, lines that are not
/// JSON objects, and objects with neither an error code nor text.
pub fn parse_line(line: &str) -> Option<UpstreamFrame> {
    let mut trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix("data:") {
        trimmed = rest.trim_start();
    }
    if trimmed.is_empty() || trimmed == "[DONE]" {
        return None;
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v @ Value::Object(_)) => v,
        Ok(_) => return None,
        Err(e) => {
            tracing::debug!(error = %e, len = trimmed.len(), "skipping malformed upstream line");
            return None;
        }
    };

    frame_from_value(&value)
}

/// Interpret a parsed upstream record.
pub fn frame_from_value(value: &Value) -> Option<UpstreamFrame> {
    let code = error_code(value);
    if code != 0 {
        let message = ["message", "msg", "error"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str))
            .or_else(|| content_of(value))
            .filter(|m| !m.is_empty())
            .unwrap_or("unknown upstream error")
            .to_string();
        return Some(UpstreamFrame::Error { code, message });
    }

    content_of(value)
        .filter(|text| !text.is_empty())
        .map(|text| UpstreamFrame::Delta(text.to_string()))
}

/// Read `code` as a number or numeric string; absent or unreadable is 0.
fn error_code(value: &Value) -> i64 {
    match value.get("code") {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn content_of(value: &Value) -> Option<&str> {
    value
        .get("msgItem")
        .or_else(|| value.get("data").and_then(|d| d.get("msgItem")))?
        .get("theContent")?
        .as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(s: &str) -> UpstreamFrame {
        UpstreamFrame::Delta(s.to_string())
    }

    #[test]
    fn complete_lines_are_decoded() {
        let mut decoder = LineDecoder::new();
        let frames = decoder.push(
            b"{\"msgItem\":{\"theContent\":\"Hel\"}}\n{\"msgItem\":{\"theContent\":\"lo\"}}\n",
        );
        assert_eq!(frames, vec![delta("Hel"), delta("lo")]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn fragment_is_carried_to_next_chunk() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"{\"msgItem\":{\"the").is_empty());
        assert!(decoder.pending_len() > 0);
        let frames = decoder.push(b"Content\":\"Hi\"}}\n{\"msg");
        assert_eq!(frames, vec![delta("Hi")]);
        let frames = decoder.push(b"Item\":{\"theContent\":\"!\"}}\n");
        assert_eq!(frames, vec![delta("!")]);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let line = "{\"msgItem\":{\"theContent\":\"你好\"}}\n".as_bytes();
        // Split inside the three-byte encoding of '你'.
        let cut = line.iter().position(|&b| b >= 0x80).unwrap() + 1;
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(&line[..cut]).is_empty());
        assert_eq!(decoder.push(&line[cut..]), vec![delta("你好")]);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut decoder = LineDecoder::new();
        let frames = decoder.push(b"\n  \r\n{\"msgItem\":{\"theContent\":\"a\"}}\r\n\n");
        assert_eq!(frames, vec![delta("a")]);
    }

    #[test]
    fn malformed_line_does_not_abort_stream() {
        let mut decoder = LineDecoder::new();
        let frames = decoder.push(
            b"{\"msgItem\":{\"theContent\":\"a\"}}\n{not json\n[1,2]\n{\"msgItem\":{\"theContent\":\"b\"}}\n",
        );
        assert_eq!(frames, vec![delta("a"), delta("b")]);
    }

    #[test]
    fn finish_decodes_unterminated_last_line() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"{\"msgItem\":{\"theContent\":\"tail\"}}").is_empty());
        assert_eq!(decoder.finish(), vec![delta("tail")]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn nonzero_code_becomes_error_frame() {
        let frame = parse_line(r#"{"code":500,"message":"model offline"}"#).unwrap();
        assert_eq!(
            frame,
            UpstreamFrame::Error {
                code: 500,
                message: "model offline".to_string()
            }
        );
    }

    #[test]
    fn string_code_and_msg_field() {
        let frame = parse_line(r#"{"code":"4001","msg":"quota exceeded"}"#).unwrap();
        assert_eq!(
            frame,
            UpstreamFrame::Error {
                code: 4001,
                message: "quota exceeded".to_string()
            }
        );
    }

    #[test]
    fn error_without_message_gets_placeholder() {
        let frame = parse_line(r#"{"code":7}"#).unwrap();
        assert_eq!(
            frame,
            UpstreamFrame::Error {
                code: 7,
                message: "unknown upstream error".to_string()
            }
        );
    }

    #[test]
    fn zero_code_with_content_is_delta() {
        let frame = parse_line(r#"{"code":0,"msgItem":{"theContent":"ok"}}"#).unwrap();
        assert_eq!(frame, delta("ok"));
    }

    #[test]
    fn sse_prefix_and_done_marker_tolerated() {
        assert_eq!(
            parse_line(r#"data: {"msgItem":{"theContent":"x"}}"#),
            Some(delta("x"))
        );
        assert_eq!(parse_line("data: [DONE]"), None);
    }

    #[test]
    fn records_without_text_are_dropped() {
        assert_eq!(parse_line(r#"{"code":0,"msgItem":{"theContent":""}}"#), None);
        assert_eq!(parse_line(r#"{"event":"heartbeat"}"#), None);
    }
}
