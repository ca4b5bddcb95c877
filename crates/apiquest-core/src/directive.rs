//! Extraction of request directives from free-form assistant text.
//!
//! Assistant output is untrusted: every fenced ```json segment is tried in
//! order and the first object carrying a truthy `ready` field decides the
//! result. Later segments are never consulted, even when that object is not a
//! usable request. Nothing in here returns an error; a segment that does not
//! parse is simply skipped.

use std::collections::BTreeMap;

use apiquest_schema::{Directive, HttpMethod};
use serde_json::{Map, Value};

const FENCE: &str = "```";

/// Return the first actionable directive embedded in `text`, if any.
pub fn extract(text: &str) -> Option<Directive> {
    for (index, segment) in json_segments(text).into_iter().enumerate() {
        let value = match serde_json::from_str::<Value>(segment) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("skipping json segment {index}: {e}");
                continue;
            }
        };
        let Some(object) = value.as_object() else {
            continue;
        };
        if !object.get("ready").is_some_and(is_truthy) {
            continue;
        }
        let directive = directive_from_object(object);
        match &directive {
            Some(directive) => tracing::debug!(
                method = %directive.method,
                url = %directive.url,
                "extracted directive from segment {index}"
            ),
            None => tracing::debug!("segment {index} is ready but not a usable request"),
        }
        return directive;
    }
    None
}

/// Bodies of fenced code segments tagged `json`, in textual order.
pub fn json_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after = &rest[open + FENCE.len()..];
        let line_end = after.find('\n').unwrap_or(after.len());
        let info = &after[..line_end];

        // Single-line form: ```json {...}```
        if let Some(close) = info.find(FENCE) {
            let inline = &info[..close];
            let (tag, body) = split_tag(inline);
            if is_json_tag(tag) {
                segments.push(body.trim());
            }
            rest = &after[close + FENCE.len()..];
            continue;
        }

        if line_end == after.len() {
            break;
        }
        let body = &after[line_end + 1..];
        let Some(close) = body.find(FENCE) else {
            break;
        };
        let (tag, _) = split_tag(info);
        if is_json_tag(tag) {
            segments.push(body[..close].trim());
        }
        rest = &body[close + FENCE.len()..];
    }

    segments
}

fn split_tag(info: &str) -> (&str, &str) {
    let info = info.trim_start();
    match info.find(|c: char| c.is_whitespace() || c == '{' || c == '[') {
        Some(pos) => (&info[..pos], &info[pos..]),
        None => (info, ""),
    }
}

fn is_json_tag(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("json")
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn directive_from_object(object: &Map<String, Value>) -> Option<Directive> {
    let url = object.get("url")?.as_str()?.trim();
    if url.is_empty() {
        return None;
    }

    let method = match object.get("method") {
        None | Some(Value::Null) => HttpMethod::default(),
        Some(Value::String(m)) => m.parse::<HttpMethod>().ok()?,
        Some(_) => return None,
    };

    let mut headers = BTreeMap::new();
    if let Some(raw) = object.get("headers") {
        match raw {
            Value::Object(map) => {
                for (key, value) in map {
                    let value = match value {
                        Value::Null => continue,
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    headers.insert(key.clone(), value);
                }
            }
            Value::Null => {}
            _ => return None,
        }
    }

    let payload = object
        .get("payload")
        .or_else(|| object.get("body"))
        .cloned()
        .unwrap_or(Value::Null);

    let bearer_token = match object.get("bearerToken") {
        Some(Value::String(token)) if !token.is_empty() => Some(token.clone()),
        _ => None,
    };

    Some(Directive {
        ready: true,
        url: url.to_string(),
        method,
        headers,
        payload,
        bearer_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_first_ready_segment_after_not_ready_one() {
        let text = "Use this:\n```json\n{\"ready\":false}\n```\n```json\n{\"ready\":true,\"url\":\"https://x\",\"method\":\"POST\"}\n```";
        let directive = extract(text).unwrap();
        assert_eq!(directive.url, "https://x");
        assert_eq!(directive.method, HttpMethod::Post);
        assert!(directive.ready);
    }

    #[test]
    fn malformed_segments_before_the_ready_one_are_skipped() {
        let text = "```json\n{not json\n```\nsome prose\n```json\n[1,2,3]\n```\n```json\n{\"ready\":true,\"url\":\"https://api.example.com/orders\",\"method\":\"get\"}\n```";
        let directive = extract(text).unwrap();
        assert_eq!(directive.url, "https://api.example.com/orders");
        assert_eq!(directive.method, HttpMethod::Get);
    }

    #[test]
    fn first_of_several_ready_segments_wins() {
        let text = "```json\n{\"ready\":true,\"url\":\"https://first\"}\n```\n```json\n{\"ready\":true,\"url\":\"https://second\"}\n```";
        assert_eq!(extract(text).unwrap().url, "https://first");
    }

    #[test]
    fn unusable_ready_segment_hides_later_ones() {
        let bad_method = "```json\n{\"ready\":true,\"method\":\"TRACE\",\"url\":\"https://first\"}\n```\n```json\n{\"ready\":true,\"url\":\"https://second\"}\n```";
        assert!(extract(bad_method).is_none());

        let no_url = "```json\n{\"ready\":true}\n```\n```json\n{\"ready\":true,\"url\":\"https://second\"}\n```";
        assert!(extract(no_url).is_none());
    }

    #[test]
    fn total_over_degenerate_inputs() {
        for text in [
            "",
            "plain prose",
            "```json\n```",
            "```json\n{\"url\":\"https://x\"}\n```",
            "```json\n{\"ready\":true}\n```",
            "```json\n{\"ready\":true,\"url\":\"https://x\",\"method\":\"TRACE\"}\n```",
            "```json\n{\"ready\":0,\"url\":\"https://x\"}\n```",
            "```json\n{\"ready\":true,\"url\":\"https://x\"}",
            "```",
            "```json",
            "\u{0}\u{1}```json\n\u{ffff}\n```",
        ] {
            assert!(extract(text).is_none(), "expected none for {text:?}");
        }
    }

    #[test]
    fn non_json_fences_are_ignored() {
        let text = "```python\n{\"ready\":true,\"url\":\"https://x\"}\n```";
        assert!(extract(text).is_none());
    }

    #[test]
    fn tag_is_case_insensitive() {
        let text = "```JSON\n{\"ready\":true,\"url\":\"https://x\"}\n```";
        assert!(extract(text).is_some());
    }

    #[test]
    fn single_line_fence_is_recognised() {
        let text = "run ```json {\"ready\":true,\"url\":\"https://x\"}``` now";
        assert_eq!(extract(text).unwrap().url, "https://x");
    }

    #[test]
    fn missing_method_defaults_to_post() {
        let text = "```json\n{\"ready\":true,\"url\":\"https://x\"}\n```";
        assert_eq!(extract(text).unwrap().method, HttpMethod::Post);
    }

    #[test]
    fn carries_headers_payload_and_bearer_token() {
        let text = r#"```json
{
  "ready": true,
  "url": "https://api.example.com/pay",
  "method": "put",
  "headers": {"X-Merchant-ID": "m-1", "X-Retry": 2, "X-Null": null},
  "payload": {"amount": 100},
  "bearerToken": "secret"
}
```"#;
        let directive = extract(text).unwrap();
        assert_eq!(directive.method, HttpMethod::Put);
        assert_eq!(directive.headers.get("X-Merchant-ID").unwrap(), "m-1");
        assert_eq!(directive.headers.get("X-Retry").unwrap(), "2");
        assert!(!directive.headers.contains_key("X-Null"));
        assert_eq!(directive.payload["amount"], 100);
        assert_eq!(directive.bearer_token.as_deref(), Some("secret"));
    }

    #[test]
    fn null_bearer_token_is_absent() {
        let text = "```json\n{\"ready\":true,\"url\":\"https://x\",\"bearerToken\":null}\n```";
        assert!(extract(text).unwrap().bearer_token.is_none());
    }

    #[test]
    fn json_segments_lists_only_json_bodies() {
        let text = "```json\n{\"a\":1}\n```\n```rust\nfn main() {}\n```\n```json\n{\"b\":2}\n```";
        assert_eq!(json_segments(text), vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn truthy_ready_markers() {
        assert!(is_truthy(&Value::Bool(true)));
        assert!(is_truthy(&serde_json::json!(1)));
        assert!(is_truthy(&serde_json::json!("yes")));
        assert!(!is_truthy(&serde_json::json!("")));
        assert!(!is_truthy(&Value::Null));
    }
}
