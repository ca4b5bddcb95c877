use std::time::Duration;

use anyhow::{anyhow, Result};
use apiquest_schema::QuestContext;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::{ApiError, InitResponse, TurnRequest};
use crate::{AssistantReply, AssistantService};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Client for the external conversational guide service.
///
/// Endpoints, relative to `api_base`:
/// - `POST /sessions` -> `{ "id": ... }`
/// - `POST /sessions/{id}/start` with the quest context -> `{ "response": ... }`
/// - `POST /sessions/{id}/messages` with `{ "message": ... }` -> `{ "response": ... }`
#[derive(Debug, Clone)]
pub struct HttpAssistant {
    client: reqwest::Client,
    api_key: Option<String>,
    api_base: String,
}

impl HttpAssistant {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.filter(|k| !k.is_empty()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.api_base);
        let mut req = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<ApiError>(&text).ok();
            return Err(format_api_error(status, &text, parsed));
        }

        resp.json::<R>()
            .await
            .map_err(|e| anyhow!("assistant service returned an unreadable body: {e}"))
    }
}

#[async_trait]
impl AssistantService for HttpAssistant {
    async fn init(&self) -> Result<String> {
        let body: InitResponse = self.post("/sessions", &serde_json::json!({})).await?;
        if body.id.trim().is_empty() {
            anyhow::bail!("assistant service returned an empty session id");
        }
        tracing::debug!(session_id = %body.id, "assistant session initialised");
        Ok(body.id)
    }

    async fn start(&self, session_id: &str, context: &QuestContext) -> Result<AssistantReply> {
        self.post(&format!("/sessions/{session_id}/start"), context)
            .await
    }

    async fn reply(&self, session_id: &str, text: &str) -> Result<AssistantReply> {
        self.post(
            &format!("/sessions/{session_id}/messages"),
            &TurnRequest { message: text },
        )
        .await
    }

    async fn health(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/health", self.api_base))
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("assistant service unhealthy ({})", resp.status()))
        }
    }
}

fn format_api_error(status: StatusCode, raw: &str, parsed: Option<ApiError>) -> anyhow::Error {
    let detail = parsed.and_then(|e| e.error.or(e.message));
    match detail {
        Some(detail) => anyhow!("assistant service error ({status}): {detail}"),
        None if raw.trim().is_empty() => anyhow!("assistant service error ({status})"),
        None => anyhow!("assistant service error ({status}): {}", raw.trim()),
    }
}
