//! JSONP script bodies: `callbackName({...});`

use crate::error::{FinderError, Result};
use serde_json::Value;

/// A decoded JSONP invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonpCall {
    pub callback: String,
    pub payload: Value,
}

/// Decode the callback name and JSON argument from a JSONP body.
///
/// Tolerates the `/**/` prefix and `typeof cb === 'function' && cb(...)`
/// guard some providers emit.
pub fn parse(body: &str) -> Result<JsonpCall> {
    let body = body.trim().trim_start_matches("/**/").trim();

    let open = body
        .find('(')
        .ok_or_else(|| malformed("no call expression", body))?;
    let close = body
        .rfind(')')
        .filter(|&i| i > open)
        .ok_or_else(|| malformed("unterminated call", body))?;

    let callback = body[..open]
        .split(|c: char| c.is_whitespace() || c == '&')
        .filter(|s| !s.is_empty())
        .next_back()
        .unwrap_or("")
        .to_string();

    if callback.is_empty()
        || !callback
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
    {
        return Err(malformed("invalid callback name", body));
    }

    let payload = serde_json::from_str(body[open + 1..close].trim())
        .map_err(|e| FinderError::MalformedResponse(format!("JSONP payload: {}", e)))?;

    Ok(JsonpCall { callback, payload })
}

fn malformed(what: &str, body: &str) -> FinderError {
    let preview: String = body.chars().take(60).collect();
    FinderError::MalformedResponse(format!("JSONP {}: '{}'", what, preview))
}
