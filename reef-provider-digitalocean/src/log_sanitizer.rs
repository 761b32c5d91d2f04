//! Log sanitization utilities
//!
//! Request and response bodies are logged at debug level. Secrets returned
//! by the API (Spaces secret keys, BGP auth keys, BYOIP signatures) are
//! masked and long bodies are truncated before they reach the log.

/// Maximum number of bytes to include in truncated log output.
const TRUNCATE_LIMIT: usize = 512;

/// JSON keys whose values are never logged
const SECRET_KEYS: [&str; 5] = ["secret_key", "auth_key", "signature", "token", "user_data"];

const MASK: &str = "(redacted)";

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i > 0 && !s.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

/// Truncate a string for safe logging.
pub fn truncate_for_log(s: &str) -> String {
    if s.len() <= TRUNCATE_LIMIT {
        s.to_string()
    } else {
        format!(
            "{}... [truncated, total {} bytes]",
            &s[..floor_char_boundary(s, TRUNCATE_LIMIT)],
            s.len()
        )
    }
}

fn redact_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if SECRET_KEYS.contains(&key.as_str()) && !v.is_null() {
                    *v = serde_json::Value::String(MASK.to_string());
                } else {
                    redact_value(v);
                }
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}

/// Mask secret fields of a JSON body, then truncate it.
/// Non-JSON bodies are only truncated.
pub fn sanitize_body(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(mut json) => {
            redact_value(&mut json);
            truncate_for_log(&json.to_string())
        }
        Err(_) => truncate_for_log(body),
    }
}

pub fn sanitize_json(body: &serde_json::Value) -> String {
    let mut json = body.clone();
    redact_value(&mut json);
    truncate_for_log(&json.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_string_unchanged() {
        let s = "hello world";
        assert_eq!(truncate_for_log(s), s);
    }

    #[test]
    fn over_limit_truncated() {
        let s = "a".repeat(TRUNCATE_LIMIT + 100);
        let result = truncate_for_log(&s);
        assert!(result.contains(&format!("total {} bytes]", TRUNCATE_LIMIT + 100)));
        assert!(result.len() < s.len());
    }

    #[test]
    fn multibyte_chars_safe() {
        let s = "é".repeat(400);
        assert!(truncate_for_log(&s).contains("... [truncated, total"));
    }

    #[test]
    fn secrets_are_masked_recursively() {
        let body = r#"{"key":{"name":"ci","access_key":"DO00AB","secret_key":"s3cr3t"},"bgp":[{"auth_key":"k"}]}"#;
        let sanitized = sanitize_body(body);
        assert!(!sanitized.contains("s3cr3t"));
        assert!(!sanitized.contains("\"k\""));
        assert!(sanitized.contains("DO00AB"));
    }

    #[test]
    fn non_json_is_truncated_only() {
        assert_eq!(sanitize_body("plain text"), "plain text");
    }
}
