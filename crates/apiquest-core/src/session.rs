//! One quest's conversation with the assistant.
//!
//! The session owns an append-only message log and a small state machine:
//!
//! ```text
//! Uninitialized -> Active <-> Pending
//!        \           |
//!         `------> Closed
//! ```
//!
//! `submit` is the one-call form. Callers that need to interleave other work
//! with the outbound call drive the same machine with `begin_submit` followed
//! by `complete_submit` or `fail_submit`. A ticket issued before `close` or
//! a re-`open` is stale and can no longer touch the log.

use std::fmt;
use std::sync::Arc;

use apiquest_provider::{AssistantReply, AssistantService};
use apiquest_schema::{Message, Outcome, QuestContext, Sender};
use serde::{Deserialize, Serialize};

use crate::directive;
use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Active,
    Pending,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Active => "active",
            SessionState::Pending => "pending",
            SessionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionOptions {
    /// Send a summary of each executed request back to the assistant.
    #[serde(default)]
    pub forward_outcomes: bool,
}

/// An outbound turn that has been appended but not yet answered.
#[derive(Debug)]
pub struct PendingTurn {
    epoch: u64,
    session_id: String,
    text: String,
    user_index: usize,
}

impl PendingTurn {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Log index of the user message this turn appended.
    pub fn user_index(&self) -> usize {
        self.user_index
    }
}

pub struct ConversationSession {
    assistant: Arc<dyn AssistantService>,
    options: SessionOptions,
    id: Option<String>,
    messages: Vec<Message>,
    state: SessionState,
    epoch: u64,
}

impl ConversationSession {
    pub fn new(assistant: Arc<dyn AssistantService>, options: SessionOptions) -> Self {
        Self {
            assistant,
            options,
            id: None,
            messages: Vec::new(),
            state: SessionState::Uninitialized,
            epoch: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == SessionState::Pending
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// The most recent assistant message and its log index.
    pub fn latest_assistant(&self) -> Option<(usize, &Message)> {
        self.messages
            .iter()
            .enumerate()
            .rev()
            .find(|(_, m)| m.sender == Sender::Assistant)
    }

    /// Start a fresh conversation for `context`, discarding any previous log.
    ///
    /// On handshake failure the session is left `Active` with no id, so a
    /// later submission is rejected with [`SessionError::NoSession`].
    pub async fn open(&mut self, context: &QuestContext) -> Result<(), SessionError> {
        self.epoch += 1;
        self.messages.clear();
        self.release();
        self.state = SessionState::Pending;

        let id = match self.assistant.init().await {
            Ok(id) => id,
            Err(e) => return Err(self.handshake_failed(format!("{e:#}"))),
        };
        let reply = match self.assistant.start(&id, context).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.handshake_failed(format!("{e:#}"))),
        };

        tracing::info!(
            session_id = %id,
            quest_id = %context.quest.id,
            "assistant session opened"
        );
        self.id = Some(id);
        self.push_reply(reply);
        self.state = SessionState::Active;
        Ok(())
    }

    fn handshake_failed(&mut self, detail: String) -> SessionError {
        tracing::warn!("assistant handshake failed: {detail}");
        self.id = None;
        self.state = SessionState::Active;
        SessionError::Handshake(detail)
    }

    /// Append `text` as a user message and enter `Pending`.
    pub fn begin_submit(&mut self, text: &str) -> Result<PendingTurn, SessionError> {
        match self.state {
            SessionState::Closed => return Err(SessionError::Closed),
            SessionState::Pending => {
                tracing::debug!("submission rejected while pending");
                return Err(SessionError::Busy);
            }
            SessionState::Uninitialized | SessionState::Active => {}
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        let Some(session_id) = self.id.clone() else {
            tracing::warn!("submission rejected: no assistant session");
            return Err(SessionError::NoSession);
        };

        self.messages.push(Message::user(text));
        self.state = SessionState::Pending;
        tracing::debug!(session_id = %session_id, "user message appended");

        Ok(PendingTurn {
            epoch: self.epoch,
            session_id,
            text: text.to_string(),
            user_index: self.messages.len() - 1,
        })
    }

    /// Append the assistant's answer to `turn`. Returns its log index.
    pub fn complete_submit(
        &mut self,
        turn: PendingTurn,
        reply: AssistantReply,
    ) -> Result<usize, SessionError> {
        if !self.owns(&turn) {
            tracing::debug!("dropping reply for a discarded session");
            return Err(SessionError::Closed);
        }
        let index = self.push_reply(reply);
        self.state = SessionState::Active;
        Ok(index)
    }

    /// Resolve `turn` as failed. No assistant message is appended.
    pub fn fail_submit(&mut self, turn: PendingTurn, error: impl fmt::Display) -> SessionError {
        if !self.owns(&turn) {
            return SessionError::Closed;
        }
        tracing::warn!(session_id = %turn.session_id, "assistant turn failed: {error}");
        self.state = SessionState::Active;
        SessionError::AssistantUnavailable(error.to_string())
    }

    fn owns(&self, turn: &PendingTurn) -> bool {
        turn.epoch == self.epoch && self.state == SessionState::Pending
    }

    /// Send one user turn and wait for the reply. Returns the index of the
    /// appended assistant message.
    pub async fn submit(&mut self, text: &str) -> Result<usize, SessionError> {
        let turn = self.begin_submit(text)?;
        let result = self.assistant.reply(&turn.session_id, &turn.text).await;
        match result {
            Ok(reply) => self.complete_submit(turn, reply),
            Err(e) => Err(self.fail_submit(turn, format!("{e:#}"))),
        }
    }

    /// Submit suggestion `choice` of the latest assistant message.
    pub async fn submit_suggestion(&mut self, choice: usize) -> Result<usize, SessionError> {
        let text = self
            .latest_assistant()
            .and_then(|(_, m)| m.suggestions.get(choice))
            .cloned()
            .ok_or(SessionError::UnknownSuggestion(choice))?;
        self.submit(&text).await
    }

    /// Attach `outcome` to the actionable message at `index`, replacing any
    /// earlier outcome from a previous explicit test.
    pub fn record_outcome(&mut self, index: usize, outcome: Outcome) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        let message = self
            .messages
            .get_mut(index)
            .ok_or(SessionError::UnknownMessage(index))?;
        if !message.is_actionable() {
            return Err(SessionError::NoDirective(index));
        }
        if message.outcome.is_some() {
            tracing::debug!(index, "replacing earlier outcome");
        }
        message.outcome = Some(outcome);
        Ok(())
    }

    pub fn append_note(&mut self, index: usize, note: impl Into<String>) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::Closed);
        }
        let message = self
            .messages
            .get_mut(index)
            .ok_or(SessionError::UnknownMessage(index))?;
        message.notes.push(note.into());
        Ok(())
    }

    /// Best-effort: tell the assistant how the request at `index` went.
    ///
    /// Returns the index of the assistant's answer when forwarding is enabled
    /// and succeeded. Failures are logged and otherwise ignored.
    pub async fn forward_outcome(&mut self, index: usize) -> Option<usize> {
        if !self.options.forward_outcomes {
            return None;
        }
        let summary = self.messages.get(index)?.outcome.as_ref()?.summary();
        match self.submit(&summary).await {
            Ok(reply_index) => Some(reply_index),
            Err(e) => {
                tracing::warn!(index, "could not forward outcome to assistant: {e}");
                None
            }
        }
    }

    /// Discard the log and session id. Outstanding tickets become stale.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        tracing::info!(
            session_id = self.id.as_deref().unwrap_or("-"),
            messages = self.messages.len(),
            "session closed"
        );
        self.epoch += 1;
        self.messages.clear();
        self.release();
        self.state = SessionState::Closed;
    }

    fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.assistant.end(&id);
        }
    }

    fn push_reply(&mut self, reply: AssistantReply) -> usize {
        let directive = directive::extract(&reply.response);
        self.messages.push(Message::assistant(
            reply.response,
            directive,
            reply.suggestions,
        ));
        self.messages.len() - 1
    }
}
