use serde::{Deserialize, Serialize};

/// Text answer from the assistant service for one turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantReply {
    pub response: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl AssistantReply {
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            suggestions: vec![],
        }
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct InitResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TurnRequest<'a> {
    pub message: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
