pub mod http;
pub mod scripted;
pub mod types;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use apiquest_schema::QuestContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use http::HttpAssistant;
pub use scripted::ScriptedGuide;
pub use types::AssistantReply;

/// The external conversational service guiding a learner through a quest.
#[async_trait]
pub trait AssistantService: Send + Sync {
    /// Handshake: obtain a fresh session id.
    async fn init(&self) -> Result<String>;
    /// First assistant message for a quest.
    async fn start(&self, session_id: &str, context: &QuestContext) -> Result<AssistantReply>;
    /// Answer one user turn.
    async fn reply(&self, session_id: &str, text: &str) -> Result<AssistantReply>;
    /// Release anything held for `session_id`. Called when a session is
    /// closed or replaced.
    fn end(&self, _session_id: &str) {}
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// Assistant Configuration
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AssistantKind {
    /// Built-in offline guide
    #[default]
    Scripted,
    /// Remote service over HTTP
    Http,
}

fn default_timeout_secs() -> u64 {
    http::DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantConfig {
    #[serde(default)]
    pub kind: AssistantKind,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            kind: AssistantKind::Scripted,
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AssistantConfig {
    pub fn http(base_url: impl Into<String>) -> Self {
        Self {
            kind: AssistantKind::Http,
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Create an assistant from configuration.
pub fn create_assistant(config: &AssistantConfig) -> Result<Arc<dyn AssistantService>> {
    let assistant: Arc<dyn AssistantService> = match config.kind {
        AssistantKind::Scripted => Arc::new(ScriptedGuide::new()),
        AssistantKind::Http => {
            let base_url = config
                .base_url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| anyhow!("http assistant requires base_url"))?;
            Arc::new(HttpAssistant::new(
                base_url,
                config.api_key.clone(),
                config.timeout_secs,
            ))
        }
    };
    tracing::info!("Using {:?} assistant", config.kind);
    Ok(assistant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_scripted() {
        let config = AssistantConfig::default();
        assert_eq!(config.kind, AssistantKind::Scripted);
        assert!(create_assistant(&config).is_ok());
    }

    #[test]
    fn http_config_requires_base_url() {
        let config = AssistantConfig {
            kind: AssistantKind::Http,
            ..AssistantConfig::default()
        };
        let err = create_assistant(&config).err().unwrap();
        assert!(err.to_string().contains("requires base_url"));
    }

    #[test]
    fn http_config_builds_client() {
        let config = AssistantConfig::http("https://guide.example.com").with_api_key("k");
        assert!(create_assistant(&config).is_ok());
    }

    #[test]
    fn config_deserializes_from_yaml_like_json() {
        let config: AssistantConfig =
            serde_json::from_str(r#"{"kind":"http","base_url":"http://localhost:9000"}"#).unwrap();
        assert_eq!(config.kind, AssistantKind::Http);
        assert_eq!(config.timeout_secs, http::DEFAULT_TIMEOUT_SECS);
    }

    #[tokio::test]
    async fn default_health_returns_ok() {
        let guide = ScriptedGuide::new();
        assert!(guide.health().await.is_ok());
    }
}
