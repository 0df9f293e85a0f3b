//! Best-effort extraction of a JSON payload embedded in model prose.
//!
//! Providers frequently wrap the requested JSON in commentary ("Sure! Here is
//! the result: {...} Hope that helps") or markdown fences. The contract here
//! is narrow: find the first balanced `{...}` or `[...]` span that parses as
//! JSON. Callers get an opaque `serde_json::Value`; schema validation is
//! theirs.

use serde_json::Value;

/// Returns the first well-formed JSON object or array found in `text`,
/// parsed. Balanced spans that fail to parse (brace-bearing prose) do not end
/// the scan; it resumes past their opening delimiter.
pub fn first_json_payload(text: &str) -> Option<Value> {
    let mut rest = text;
    while let Some(start) = rest.find(['{', '[']) {
        if let Some(span) = balanced_span(&rest[start..]) {
            if let Ok(value) = serde_json::from_str(span) {
                return Some(value);
            }
        }
        rest = &rest[start + 1..];
    }
    None
}

/// Scans `text` (which starts with `{` or `[`) for the end of the balanced
/// span, tracking nesting and string literals so delimiters inside strings
/// are ignored.
fn balanced_span(text: &str) -> Option<&str> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => stack.push(c),
            '}' | ']' => {
                let open = stack.pop()?;
                if (c == '}') != (open == '{') {
                    return None; // mismatched nesting, not JSON
                }
                if stack.is_empty() {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None // ran out of input before the span closed
}
