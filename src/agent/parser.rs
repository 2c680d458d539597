//! Extraction of `<tool_call>` directives from model text.

use crate::tools::{ToolInvocation, TOOL_CALL_CLOSE, TOOL_CALL_OPEN};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Extract every well-formed tool call, in order of appearance.
///
/// Spans that cannot be decoded even after repair are skipped. An opening tag
/// without a matching close ends the scan.
pub fn parse_tool_calls(text: &str) -> Vec<ToolInvocation> {
    let mut calls = Vec::new();
    let mut search_from = 0;

    while let Some(start) = text[search_from..].find(TOOL_CALL_OPEN) {
        let body_start = search_from + start + TOOL_CALL_OPEN.len();

        let Some(close_offset) = text[body_start..].find(TOOL_CALL_CLOSE) else {
            debug!("Unterminated tool call at byte {}, ignoring the rest", body_start);
            break;
        };
        let body = &text[body_start..body_start + close_offset];
        search_from = body_start + close_offset + TOOL_CALL_CLOSE.len();

        match parse_span(body) {
            Some(call) => {
                info!("Parsed tool call: {}", call.name);
                calls.push(call);
            }
            None => debug!("Skipping malformed tool call: {}", body.trim()),
        }
    }

    calls
}

/// Remove tool-call spans, including an unterminated trailing one, and stray closing tags.
pub fn strip_tool_calls(text: &str) -> String {
    let mut current = text.to_string();
    // Removing a span can join fragments into a new tag, so repeat until stable
    loop {
        let mut next = remove_spans(&current);
        if next == current {
            next = next.replace(TOOL_CALL_CLOSE, "");
            if next == current {
                return current.trim().to_string();
            }
        }
        current = next;
    }
}

fn remove_spans(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(TOOL_CALL_OPEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + TOOL_CALL_OPEN.len()..];
        match after.find(TOOL_CALL_CLOSE) {
            Some(end) => rest = &after[end + TOOL_CALL_CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_span(body: &str) -> Option<ToolInvocation> {
    let body = strip_code_fence(body.trim());
    let value = decode_lenient(body)?;
    invocation_from_value(value)
}

fn decode_lenient(text: &str) -> Option<Value> {
    serde_json::from_str(text)
        .ok()
        .or_else(|| serde_json::from_str(&repair_json(text)).ok())
}

fn strip_code_fence(body: &str) -> &str {
    let Some(inner) = body.strip_prefix("```") else {
        return body;
    };
    // Drop the info string (```json) up to the first newline
    let inner = match inner.find('\n') {
        Some(newline) => &inner[newline + 1..],
        None => inner,
    };
    inner.trim_end().strip_suffix("```").unwrap_or(inner).trim()
}

fn invocation_from_value(value: Value) -> Option<ToolInvocation> {
    let Value::Object(mut object) = value else {
        return None;
    };

    let name = object.get("name")?.as_str()?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let arguments = match object.remove("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        // Some models double-encode the arguments object
        Some(Value::String(encoded)) => match decode_lenient(&encoded)? {
            Value::Object(map) => map,
            _ => return None,
        },
        Some(_) => return None,
    };

    Some(ToolInvocation { name, arguments })
}

/// Best-effort rewrite of almost-JSON into JSON.
///
/// Handles trailing commas, unquoted keys, single-quoted strings, Python
/// literals (`True`, `False`, `None`), bare-word values, raw newlines in
/// strings, and unclosed strings or brackets.
pub fn repair_json(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                i = copy_string(&chars, i, &mut out);
                continue;
            }
            '{' | '[' => {
                stack.push(if c == '{' { '}' } else { ']' });
                out.push(c);
            }
            '}' | ']' => {
                drop_trailing_comma(&mut out);
                if stack.last() == Some(&c) {
                    stack.pop();
                }
                out.push(c);
            }
            ',' | ':' => out.push(c),
            c if c.is_whitespace() => out.push(c),
            _ => {
                let expect_key = stack.last() == Some(&'}')
                    && matches!(last_significant(&out), Some('{') | Some(','));
                i = copy_bare_word(&chars, i, expect_key, &mut out);
                continue;
            }
        }
        i += 1;
    }

    drop_trailing_comma(&mut out);
    if last_significant(&out) == Some(':') {
        out.push_str("null");
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

fn last_significant(out: &str) -> Option<char> {
    out.chars().rev().find(|c| !c.is_whitespace())
}

fn drop_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    if out[..trimmed_len].ends_with(',') {
        out.truncate(trimmed_len - 1);
    }
}

/// Copy a quoted string starting at `start` as a double-quoted JSON string.
/// Returns the index after the closing quote; an unclosed string is closed.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    out.push('"');

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if next == '\'' {
                out.push('\'');
            } else {
                out.push('\\');
                out.push(next);
            }
            i += 2;
            continue;
        }
        if c == quote {
            out.push('"');
            return i + 1;
        }
        match c {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
        i += 1;
    }

    out.push('"');
    i
}

/// Copy an unquoted token as a key, literal, number or string value.
fn copy_bare_word(chars: &[char], start: usize, expect_key: bool, out: &mut String) -> usize {
    let stops: &[char] = if expect_key {
        &[':', ',', '{', '}', '[', ']', '"', '\'', '\n']
    } else {
        &[',', '}', ']', '\n']
    };

    let mut end = start;
    while end < chars.len() && !stops.contains(&chars[end]) {
        end += 1;
    }

    let raw: String = chars[start..end].iter().collect();
    let word = raw.trim_end();
    let trailing_ws = &raw[word.len()..];

    if expect_key {
        out.push_str(&Value::String(word.to_string()).to_string());
    } else {
        match word {
            "true" | "True" => out.push_str("true"),
            "false" | "False" => out.push_str("false"),
            "null" | "None" | "none" => out.push_str("null"),
            w if serde_json::from_str::<serde_json::Number>(w).is_ok() => out.push_str(w),
            w => out.push_str(&Value::String(w.to_string()).to_string()),
        }
    }
    out.push_str(trailing_ws);
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(call: &ToolInvocation) -> Value {
        Value::Object(call.arguments.clone())
    }

    #[test]
    fn test_single_call() {
        let text = r#"Let me look.
<tool_call>
{"name": "get_video_transcript", "arguments": {"video_url": "https://youtu.be/dQw4w9WgXcQ"}}
</tool_call>"#;
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_video_transcript");
        assert_eq!(args(&calls[0]), json!({"video_url": "https://youtu.be/dQw4w9WgXcQ"}));
    }

    #[test]
    fn test_multiple_calls_keep_order() {
        let text = r#"<tool_call>{"name": "b", "arguments": {}}</tool_call> and
<tool_call>{"name": "a", "arguments": {"x": 1}}</tool_call><tool_call>{"name": "c"}</tool_call>"#;
        let names: Vec<String> = parse_tool_calls(text).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_malformed_span_is_skipped() {
        let text = r#"<tool_call>{"name": "ok1", "arguments": {}}</tool_call>
<tool_call>this is not json at all {{{</tool_call>
<tool_call>{"arguments": {"q": 1}}</tool_call>
<tool_call>["name", "x"]</tool_call>
<tool_call>{"name": "ok2", "arguments": {}}</tool_call>"#;
        let names: Vec<String> = parse_tool_calls(text).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["ok1", "ok2"]);
    }

    #[test]
    fn test_unterminated_span_ends_scan() {
        let text = r#"<tool_call>{"name": "first"}</tool_call>
<tool_call>{"name": "second"}
<tool_call>{"name": "third"}</tool_call>"#;
        // The second opening tag pairs with the third span's close, which is malformed
        let names: Vec<String> = parse_tool_calls(text).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["first"]);

        let dangling = r#"<tool_call>{"name": "a"}</tool_call> then <tool_call>{"name": "b"}"#;
        assert_eq!(parse_tool_calls(dangling).len(), 1);
    }

    #[test]
    fn test_no_calls() {
        assert!(parse_tool_calls("Hello! How can I help?").is_empty());
        assert!(parse_tool_calls("").is_empty());
    }

    #[test]
    fn test_arguments_variants() {
        let text = r#"<tool_call>{"name": "s", "arguments": "{\"query\": \"rust\"}"}</tool_call>
<tool_call>{"name": "n", "arguments": null}</tool_call>
<tool_call>{"name": "bad", "arguments": [1, 2]}</tool_call>
<tool_call>{"name": "  ", "arguments": {}}</tool_call>"#;
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(args(&calls[0]), json!({"query": "rust"}));
        assert!(calls[1].arguments.is_empty());
    }

    #[test]
    fn test_code_fenced_body() {
        let text = "<tool_call>\n```json\n{\"name\": \"web_search\", \"arguments\": {\"query\": \"x\"}}\n```\n</tool_call>";
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "web_search");
    }

    #[test]
    fn test_lenient_repairs() {
        let cases = [
            (r#"{"name": "web_search", "arguments": {"query": "rust",},}"#, json!({"query": "rust"})),
            (
                r#"{name: 'get_video_info', arguments: {video_url: 'https://youtu.be/dQw4w9WgXcQ'}}"#,
                json!({"video_url": "https://youtu.be/dQw4w9WgXcQ"}),
            ),
            (
                r#"{"name": "t", "arguments": {"flag": True, "other": None, "n": 3}}"#,
                json!({"flag": true, "other": null, "n": 3}),
            ),
            (
                r#"{"name": "t", "arguments": {"query": hello world, "url": https://x.y/z}}"#,
                json!({"query": "hello world", "url": "https://x.y/z"}),
            ),
            (r#"{"name": "t", "arguments": {"query": "rust""#, json!({"query": "rust"})),
            (r#"{"name": "t", "arguments": {"query": "it's"#, json!({"query": "it's"})),
            (r#"{'name': 't', 'arguments': {'q': 'say "hi"'}}"#, json!({"q": "say \"hi\""})),
        ];

        for (body, expected) in cases {
            let text = format!("<tool_call>{}</tool_call>", body);
            let calls = parse_tool_calls(&text);
            assert_eq!(calls.len(), 1, "failed to parse {}", body);
            assert_eq!(args(&calls[0]), expected, "wrong arguments for {}", body);
        }
    }

    #[test]
    fn test_repair_leaves_valid_json_valid() {
        let valid = r#"{"a": [1, 2.5, -3e2], "b": {"c": "d, e: f"}, "g": true}"#;
        let repaired: Value = serde_json::from_str(&repair_json(valid)).unwrap();
        assert_eq!(repaired, serde_json::from_str::<Value>(valid).unwrap());
    }

    #[test]
    fn test_parse_is_idempotent() {
        let text = r#"x <tool_call>{"name": "a", "arguments": {"k": 'v'}}</tool_call> y"#;
        assert_eq!(parse_tool_calls(text), parse_tool_calls(text));
    }

    #[test]
    fn test_strip_tool_calls() {
        let text = "Answer first. <tool_call>{\"name\": \"a\"}</tool_call> More text.\n<tool_call>{\"name\": \"b\"";
        let stripped = strip_tool_calls(text);
        assert_eq!(stripped, "Answer first.  More text.");
        assert!(parse_tool_calls(&stripped).is_empty());
        assert_eq!(strip_tool_calls(&stripped), stripped);

        assert_eq!(strip_tool_calls("no calls here "), "no calls here");
        assert_eq!(strip_tool_calls("stray </tool_call> close"), "stray  close");

        let nested = "<tool<tool_call>{}</tool_call>_call>{\"name\": \"x\"}</tool_call>done";
        assert_eq!(strip_tool_calls(nested), "done");
    }
}
