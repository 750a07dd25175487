//! Payload elision for oracle input and log lines
//!
//! Images and other binary-ish blobs travel through step results as data
//! URIs or long base64 strings. They are replaced by a short marker before
//! anything is handed to the oracle or written to a log. The stored step
//! result keeps the original.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

lazy_static! {
    static ref DATA_URI: Regex =
        Regex::new(r"^data:(?P<mime>[\w.+-]+/[\w.+-]+)?(;[\w=.+-]+)*;base64,").unwrap();
    static ref BASE64_BODY: Regex = Regex::new(r"^[A-Za-z0-9+/\r\n]+={0,2}$").unwrap();
}

/// Strings at or below this length are never considered binary
const MIN_BINARY_LEN: usize = 256;

fn elide_string(s: &str, threshold: usize) -> Option<String> {
    if let Some(caps) = DATA_URI.captures(s) {
        let mime = caps
            .name("mime")
            .map(|m| m.as_str())
            .unwrap_or("application/octet-stream");
        return Some(format!("[elided {} payload, {} bytes]", mime, s.len()));
    }
    if s.len() > MIN_BINARY_LEN.max(threshold / 4) && BASE64_BODY.is_match(s) {
        return Some(format!("[elided base64 payload, {} bytes]", s.len()));
    }
    if s.len() > threshold {
        let mut cut = threshold.min(s.len());
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        return Some(format!(
            "{}... [elided {} more bytes]",
            &s[..cut],
            s.len() - cut
        ));
    }
    None
}

/// Copy of `value` with large or binary strings replaced by markers
pub fn elide_payloads(value: &Value, threshold: usize) -> Value {
    match value {
        Value::String(s) => match elide_string(s, threshold) {
            Some(marker) => Value::String(marker),
            None => value.clone(),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| elide_payloads(item, threshold))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), elide_payloads(v, threshold)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

/// Whether anything in `value` would be elided
pub fn contains_large_payload(value: &Value, threshold: usize) -> bool {
    match value {
        Value::String(s) => elide_string(s, threshold).is_some(),
        Value::Array(items) => items.iter().any(|v| contains_large_payload(v, threshold)),
        Value::Object(map) => map.values().any(|v| contains_large_payload(v, threshold)),
        _ => false,
    }
}
