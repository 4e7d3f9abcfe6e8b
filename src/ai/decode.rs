// decode.rs - Turns provider response bodies into `RawProviderResult`.
//
// Both providers answer with a text-encoded JSON document wrapped inside an
// outer envelope. The envelope differs per provider; the inner document has
// the shared `violations[] / summary / confidence` shape. Models are sloppy
// with that inner document (code fences, prose around it, nulls), so fields
// are read by hand from a `Value` rather than derived.

use serde_json::Value;

use super::types::{RawProviderResult, RawViolation};

/// Outcome of decoding a provider body.
///   `Decoded::Ok(result)` - the body held a usable structured payload
///   `Decoded::Malformed(reason)` - it did not; the caller decides what that means
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Ok(RawProviderResult),
    Malformed(String),
}

impl Decoded {
    pub fn is_ok(&self) -> bool {
        matches!(self, Decoded::Ok(_))
    }
}

/// Decode a tool-invocation response.
///
/// Accepted envelopes:
///   `{"content":[{"type":"text","text":"{...}"}]}`
///   `{"result":{"content":[...]}}`
///   `{"result":"{...}"}`
///   a bare `{"violations":[...], ...}` object
pub fn decode_tool_response(body: &str) -> Decoded {
    let outer: Value = match serde_json::from_str(body.trim()) {
        Ok(v) => v,
        Err(e) => return Decoded::Malformed(format!("invalid JSON envelope: {}", e)),
    };

    if looks_like_result(&outer) {
        return from_value(&outer, body);
    }

    let envelope = outer.get("result").unwrap_or(&outer);
    if let Some(text) = envelope.as_str() {
        return decode_structured_text(text);
    }
    if looks_like_result(envelope) {
        return from_value(envelope, body);
    }

    match envelope.get("content").and_then(|c| c.as_array()) {
        Some(parts) => {
            let text: String = parts
                .iter()
                .filter(|p| p.get("type").and_then(|t| t.as_str()).unwrap_or("text") == "text")
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect();
            if text.trim().is_empty() {
                Decoded::Malformed("tool response carried no text content".into())
            } else {
                decode_structured_text(&text)
            }
        }
        None => Decoded::Malformed("tool response has no content".into()),
    }
}

/// Decode a chat-completion response (`choices[0].message.content`).
pub fn decode_chat_response(body: &str) -> Decoded {
    let outer: Value = match serde_json::from_str(body.trim()) {
        Ok(v) => v,
        Err(e) => return Decoded::Malformed(format!("invalid JSON envelope: {}", e)),
    };

    let content = match outer.pointer("/choices/0/message/content") {
        Some(c) => c,
        None => return Decoded::Malformed("chat response has no message content".into()),
    };

    // Content is either a plain string or an array of typed parts.
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect(),
        _ => String::new(),
    };

    if text.trim().is_empty() {
        return Decoded::Malformed("chat message content is empty".into());
    }
    decode_structured_text(&text)
}

/// Decode the inner text-encoded document, tolerating markdown fences and
/// prose before or after the JSON object.
pub fn decode_structured_text(text: &str) -> Decoded {
    let stripped = strip_code_fence(text);
    let json_slice = match (stripped.find('{'), stripped.rfind('}')) {
        (Some(start), Some(end)) if end > start => &stripped[start..=end],
        _ => return Decoded::Malformed("no JSON object in provider text".into()),
    };

    match serde_json::from_str::<Value>(json_slice) {
        Ok(v) if looks_like_result(&v) => from_value(&v, text),
        Ok(v) => match v.get("analysis") {
            Some(inner) if looks_like_result(inner) => from_value(inner, text),
            _ => Decoded::Malformed("JSON object lacks violations and summary".into()),
        },
        Err(e) => Decoded::Malformed(format!("invalid JSON in provider text: {}", e)),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn looks_like_result(v: &Value) -> bool {
    v.is_object() && (v.get("violations").is_some() || v.get("summary").is_some())
}

fn from_value(v: &Value, raw_text: &str) -> Decoded {
    let violations = match v.get("violations") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(violation_from_value).collect(),
        Some(_) => return Decoded::Malformed("`violations` is not an array".into()),
    };

    Decoded::Ok(RawProviderResult {
        violations,
        summary: string_field(v, &["summary", "compliance"]).unwrap_or_default(),
        confidence: number_field(v, "confidence").unwrap_or(0.0),
        category: string_field(v, &["category"]),
        narration: None,
        error: None,
        raw_text: raw_text.to_string(),
    })
}

fn violation_from_value(v: &Value) -> Option<RawViolation> {
    if let Some(text) = v.as_str() {
        return Some(RawViolation {
            issue: text.to_string(),
            ..Default::default()
        });
    }

    let code = string_field(v, &["code", "codeReference", "code_reference"]);
    let issue = string_field(v, &["issue", "description", "title"]);
    if code.is_none() && issue.is_none() {
        return None;
    }

    let id = match v.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Some(RawViolation {
        id,
        code,
        issue: issue.unwrap_or_default(),
        severity: string_field(v, &["severity"]),
        category: string_field(v, &["category"]),
    })
}

fn string_field(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| v.get(*k).and_then(|s| s.as_str()))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn number_field(v: &Value, key: &str) -> Option<f64> {
    match v.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}
