use std::fmt;

use apiquest_schema::{FailureKind, Outcome};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    AssistantUnreachable,
    RequestFailed,
    MalformedInput,
    SessionLost,
    Info,
    Success,
}

/// A user-visible banner. Each failure class maps to a distinct kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub detail: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            detail: detail.into(),
        }
    }

    pub fn info(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(NoticeKind::Info, title, detail)
    }

    pub fn success(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(NoticeKind::Success, title, detail)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind,
            NoticeKind::AssistantUnreachable
                | NoticeKind::RequestFailed
                | NoticeKind::MalformedInput
                | NoticeKind::SessionLost
        )
    }

    pub fn for_outcome(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success { status, .. } => {
                Self::success("API call succeeded", format!("The endpoint answered {status}."))
            }
            Outcome::Failure(detail) => match detail.kind {
                FailureKind::MalformedInput => {
                    Self::new(NoticeKind::MalformedInput, "Invalid request", &detail.message)
                }
                _ => {
                    let mut text = detail.message.clone();
                    if let Some(body) = detail.body.as_deref().filter(|b| !b.is_empty()) {
                        text.push_str(&format!("\n{body}"));
                    }
                    Self::new(NoticeKind::RequestFailed, "API call failed", text)
                }
            },
        }
    }
}

impl From<&SessionError> for Notice {
    fn from(err: &SessionError) -> Self {
        let detail = err.to_string();
        match err {
            SessionError::Handshake(_) | SessionError::AssistantUnavailable(_) => {
                Notice::new(NoticeKind::AssistantUnreachable, "Could not reach assistant", detail)
            }
            SessionError::NoSession | SessionError::Closed => {
                Notice::new(NoticeKind::SessionLost, "Session lost", detail)
            }
            SessionError::EmptyInput
            | SessionError::UnknownMessage(_)
            | SessionError::UnknownSuggestion(_)
            | SessionError::NoDirective(_) => {
                Notice::new(NoticeKind::MalformedInput, "Invalid input", detail)
            }
            SessionError::RequestInFlight => {
                Notice::new(NoticeKind::RequestFailed, "Request in progress", detail)
            }
            SessionError::Busy
            | SessionError::NoQuest
            | SessionError::NoStaticValidation(_)
            | SessionError::NotValidated(_)
            | SessionError::TrackComplete
            | SessionError::WrongQuest { .. } => Notice::info("Not now", detail),
        }
    }
}

impl From<SessionError> for Notice {
    fn from(err: SessionError) -> Self {
        Notice::from(&err)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{}: {}", self.title, self.detail)
        }
    }
}
