// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Balanced JSON object extraction from free-form text.

/// Return the first complete JSON object at or after byte index `start`.
///
/// Scans from the first `{` at or after `start`, tracking brace depth.
/// Characters inside double-quoted strings never change the depth, and a
/// backslash escapes the character that follows it. Returns `None` if no
/// `{` exists or the text ends before depth returns to zero.
///
/// The returned slice is only *balanced*; callers still parse it.
pub fn extract_balanced(text: &str, start: usize) -> Option<&str> {
    if start >= text.len() {
        return None;
    }
    let mut start = start;
    while !text.is_char_boundary(start) {
        start += 1;
    }

    let open = start + text[start..].find('{')?;
    let bytes = text.as_bytes();

    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    // Structural characters are ASCII, so scanning bytes is safe for UTF-8.
    for (offset, &b) in bytes[open..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..=open + offset]);
                }
            }
            _ => {}
        }
    }

    None
}
