use thiserror::Error;

/// Failures surfaced by a conversation session or the quest runner.
///
/// None of these leave a session stuck: after any of them the session is
/// back in an interactable state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("still waiting for the assistant; try again once it has replied")]
    Busy,
    #[error("a request is already in flight; wait for it to finish")]
    RequestInFlight,
    #[error("message is empty")]
    EmptyInput,
    #[error("no assistant session is established; reopen the quest to reconnect")]
    NoSession,
    #[error("could not start an assistant session: {0}")]
    Handshake(String),
    #[error("could not reach the assistant: {0}")]
    AssistantUnavailable(String),
    #[error("session is closed")]
    Closed,
    #[error("message {0} has no actionable request")]
    NoDirective(usize),
    #[error("no message at index {0}")]
    UnknownMessage(usize),
    #[error("no quest is open")]
    NoQuest,
    #[error("quest {0} has no static validation endpoint")]
    NoStaticValidation(String),
    #[error("quest {0} has not been validated yet")]
    NotValidated(String),
    #[error("track is already complete; reset to start again")]
    TrackComplete,
    #[error("quest {expected} is the current quest, not {got}")]
    WrongQuest { expected: String, got: String },
    #[error("no suggestion at index {0}")]
    UnknownSuggestion(usize),
}
