//! Execution of one live HTTP request against an arbitrary endpoint.
//!
//! Headers and body arrive as editable JSON text and are parsed right before
//! sending. Every failure, including unparseable input, becomes an
//! [`Outcome::Failure`]; nothing here panics or propagates transport errors.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use apiquest_schema::{
    Directive, FailureDetail, FailureKind, HttpMethod, Outcome, StaticValidation,
};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = concat!("apiquest/", env!("CARGO_PKG_VERSION"));

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// A user-editable request. `headers` and `body` hold JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub url: String,
    pub method: HttpMethod,
    pub headers: String,
    pub body: String,
}

impl RequestSpec {
    pub fn new(url: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            url: url.into(),
            method,
            headers: "{}".to_string(),
            body: String::new(),
        }
    }

    pub fn with_headers(mut self, headers: impl Into<String>) -> Self {
        self.headers = headers.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Pre-fill from a directive. A bearer token becomes an `Authorization`
    /// header unless one is already present.
    pub fn from_directive(directive: &Directive) -> Self {
        let mut headers = directive.headers.clone();
        if let Some(token) = &directive.bearer_token {
            let has_auth = headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case("authorization"));
            if !has_auth {
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
        }
        Self {
            url: directive.url.clone(),
            method: directive.method,
            headers: render_headers(&headers),
            body: render_body(&directive.payload),
        }
    }

    pub fn from_static(validation: &StaticValidation) -> Self {
        Self {
            url: validation.endpoint.clone(),
            method: validation.method,
            headers: render_headers(&validation.headers),
            body: render_body(&validation.body),
        }
    }

    /// Parse the header text. Empty text means no headers.
    pub fn parse_headers(&self) -> Result<Vec<(String, String)>, String> {
        if self.headers.trim().is_empty() {
            return Ok(vec![]);
        }
        let value: Value = serde_json::from_str(&self.headers).map_err(|e| e.to_string())?;
        let Value::Object(map) = value else {
            return Err("expected a JSON object of header names to values".to_string());
        };
        let mut headers = Vec::with_capacity(map.len());
        for (name, value) in map {
            let value = match value {
                Value::Null => continue,
                Value::String(s) => s,
                Value::Object(_) | Value::Array(_) => {
                    return Err(format!("header {name} must be a string"));
                }
                other => other.to_string(),
            };
            headers.push((name, value));
        }
        Ok(headers)
    }

    /// Parse the body text. Empty text or `null` means no body.
    pub fn parse_body(&self) -> Result<Option<Value>, String> {
        if self.body.trim().is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(&self.body).map_err(|e| e.to_string())?;
        Ok((!value.is_null()).then_some(value))
    }
}

fn render_headers(headers: &BTreeMap<String, String>) -> String {
    serde_json::to_string_pretty(headers).unwrap_or_else(|_| "{}".to_string())
}

fn render_body(payload: &Value) -> String {
    if payload.is_null() {
        return String::new();
    }
    serde_json::to_string_pretty(payload).unwrap_or_default()
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("a request is already in flight")]
pub struct RequestInFlight;

/// Resets the in-flight flag when the request future completes or is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Harness {
    client: reqwest::Client,
    timeout_secs: u64,
    in_flight: AtomicBool,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(&HarnessConfig::default())
    }
}

impl Harness {
    pub fn new(config: &HarnessConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_default();
        Self {
            client,
            timeout_secs: config.timeout_secs,
            in_flight: AtomicBool::new(false),
        }
    }

    /// True while a request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Perform exactly one HTTP call. Rejected, not queued, when another call
    /// on this harness has not resolved yet.
    pub async fn execute(&self, spec: &RequestSpec) -> Result<Outcome, RequestInFlight> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(RequestInFlight)?;
        Ok(self.send(spec).await)
    }

    async fn send(&self, spec: &RequestSpec) -> Outcome {
        let raw_url = spec.url.trim();
        let url = match reqwest::Url::parse(raw_url) {
            Ok(url) => url,
            Err(e) => return Outcome::malformed_input(format!("Invalid URL {raw_url:?}: {e}")),
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Outcome::malformed_input(format!(
                "Only http:// and https:// URLs are supported: {raw_url}"
            ));
        }

        let headers = match spec.parse_headers() {
            Ok(headers) => headers,
            Err(e) => return Outcome::malformed_input(format!("Headers are not valid JSON: {e}")),
        };
        let body = match spec.parse_body() {
            Ok(body) => body,
            Err(e) => return Outcome::malformed_input(format!("Body is not valid JSON: {e}")),
        };

        let mut req = self.client.request(to_reqwest_method(spec.method), url);
        for (name, value) in &headers {
            let name = match HeaderName::from_bytes(name.as_bytes()) {
                Ok(name) => name,
                Err(_) => return Outcome::malformed_input(format!("Invalid header name: {name}")),
            };
            let value = match HeaderValue::from_str(value) {
                Ok(value) => value,
                Err(_) => {
                    return Outcome::malformed_input(format!("Invalid value for header {name}"))
                }
            };
            req = req.header(name, value);
        }
        if let Some(body) = body.as_ref().filter(|_| spec.method.carries_body()) {
            req = req.json(body);
        }

        tracing::info!(method = %spec.method, url = raw_url, "executing request");

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("Request timed out after {}s: {raw_url}", self.timeout_secs)
                } else if e.is_connect() {
                    format!("Connection failed: {raw_url} ({e})")
                } else {
                    format!("Request failed: {e}")
                };
                tracing::warn!("{message}");
                return Outcome::Failure(FailureDetail {
                    kind: FailureKind::Transport,
                    status: e.status().map(|s| s.as_u16()),
                    message,
                    body: None,
                });
            }
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(status = status.as_u16(), "failed to read response body: {e}");
                let kind = if status.is_success() {
                    FailureKind::MalformedResponse
                } else {
                    FailureKind::Status
                };
                return Outcome::Failure(FailureDetail {
                    kind,
                    status: Some(status.as_u16()),
                    message: format!("Failed to read response body: {e}"),
                    body: None,
                });
            }
        };

        if status.is_success() {
            tracing::info!(status = status.as_u16(), "request succeeded");
            let body = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            };
            Outcome::Success {
                status: status.as_u16(),
                body,
            }
        } else {
            tracing::warn!(status = status.as_u16(), "request returned non-success status");
            Outcome::Failure(FailureDetail {
                kind: FailureKind::Status,
                status: Some(status.as_u16()),
                message: format!("HTTP {status}"),
                body: (!text.is_empty()).then_some(text),
            })
        }
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive() -> Directive {
        Directive {
            ready: true,
            url: "https://api.example.com/pay".into(),
            method: HttpMethod::Post,
            headers: BTreeMap::from([("X-Merchant-ID".to_string(), "m-1".to_string())]),
            payload: serde_json::json!({"amount": 100}),
            bearer_token: Some("tok".into()),
        }
    }

    #[test]
    fn from_directive_adds_bearer_header() {
        let spec = RequestSpec::from_directive(&directive());
        let headers = spec.parse_headers().unwrap();
        assert!(headers.contains(&("Authorization".to_string(), "Bearer tok".to_string())));
        assert!(headers.contains(&("X-Merchant-ID".to_string(), "m-1".to_string())));
        assert_eq!(spec.parse_body().unwrap().unwrap()["amount"], 100);
    }

    #[test]
    fn from_directive_keeps_existing_authorization() {
        let mut d = directive();
        d.headers
            .insert("authorization".to_string(), "Basic abc".to_string());
        let spec = RequestSpec::from_directive(&d);
        let headers = spec.parse_headers().unwrap();
        assert_eq!(
            headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case("authorization"))
                .count(),
            1
        );
        assert!(headers.contains(&("authorization".to_string(), "Basic abc".to_string())));
    }

    #[test]
    fn null_payload_renders_empty_body() {
        let mut d = directive();
        d.payload = Value::Null;
        let spec = RequestSpec::from_directive(&d);
        assert_eq!(spec.body, "");
        assert_eq!(spec.parse_body().unwrap(), None);
    }

    #[test]
    fn header_text_must_be_an_object() {
        let spec = RequestSpec::new("https://x", HttpMethod::Get).with_headers("[1,2]");
        assert!(spec.parse_headers().is_err());

        let spec = RequestSpec::new("https://x", HttpMethod::Get).with_headers("   ");
        assert!(spec.parse_headers().unwrap().is_empty());

        let spec = RequestSpec::new("https://x", HttpMethod::Get)
            .with_headers(r#"{"X-Count": 3, "X-Flag": true, "X-Skip": null}"#);
        let headers = spec.parse_headers().unwrap();
        assert_eq!(headers.len(), 2);
        assert!(headers.contains(&("X-Count".to_string(), "3".to_string())));
    }

    #[test]
    fn nested_header_values_are_rejected() {
        let spec = RequestSpec::new("https://x", HttpMethod::Get)
            .with_headers(r#"{"X-Nested": {"a": 1}}"#);
        assert!(spec.parse_headers().unwrap_err().contains("X-Nested"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_failure_outcome() {
        let harness = Harness::default();
        let spec = RequestSpec::new("https://api.example.com", HttpMethod::Post).with_body("{oops");
        let outcome = harness.execute(&spec).await.unwrap();
        match outcome {
            Outcome::Failure(detail) => {
                assert_eq!(detail.kind, FailureKind::MalformedInput);
                assert!(detail.message.starts_with("Body is not valid JSON"));
                assert!(detail.status.is_none());
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!harness.is_busy());
    }

    #[tokio::test]
    async fn unsupported_scheme_is_rejected_before_sending() {
        let harness = Harness::default();
        let spec = RequestSpec::new("ftp://files.example.com", HttpMethod::Get);
        let outcome = harness.execute(&spec).await.unwrap();
        assert!(matches!(
            outcome,
            Outcome::Failure(FailureDetail {
                kind: FailureKind::MalformedInput,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn relative_url_is_malformed_input() {
        let harness = Harness::default();
        let spec = RequestSpec::new("/orders", HttpMethod::Get);
        let outcome = harness.execute(&spec).await.unwrap();
        let Outcome::Failure(detail) = outcome else {
            panic!("expected failure");
        };
        assert!(detail.message.contains("Invalid URL"));
    }

    #[test]
    fn in_flight_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let first = InFlightGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(InFlightGuard::acquire(&flag).is_none());
        drop(first);
        assert!(InFlightGuard::acquire(&flag).is_some());
    }
}
