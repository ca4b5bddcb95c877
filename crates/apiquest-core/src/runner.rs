//! Per-quest orchestration: one session, one harness and the track's
//! progression controller, driven by discrete user actions.

use std::sync::Arc;

use apiquest_bus::BusPublisher;
use apiquest_provider::AssistantService;
use apiquest_schema::{BusinessIntent, Outcome, Quest, QuestContext, Track};

use crate::error::SessionError;
use crate::harness::{Harness, HarnessConfig, RequestSpec};
use crate::progression::{CompletionReport, ProgressSummary, ProgressionController};
use crate::session::{ConversationSession, SessionOptions};

/// How a quest is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestMode {
    /// The quest carries a fixed validation request.
    Static,
    /// Validation relies on directives produced during the conversation.
    Dynamic,
}

impl QuestMode {
    pub fn for_quest(quest: &Quest) -> Self {
        if quest.validation.is_some() {
            QuestMode::Static
        } else {
            QuestMode::Dynamic
        }
    }
}

pub struct QuestRunner {
    session: ConversationSession,
    harness: Harness,
    controller: ProgressionController,
    intent: Option<BusinessIntent>,
    open: Option<Quest>,
}

impl QuestRunner {
    /// Enter `track`. The `first-steps` badge is awarded here.
    pub fn new(
        assistant: Arc<dyn AssistantService>,
        track: Arc<Track>,
        harness: &HarnessConfig,
        options: SessionOptions,
        publisher: BusPublisher,
    ) -> Self {
        let mut controller = ProgressionController::new(track, publisher);
        controller.enter_track();
        Self {
            session: ConversationSession::new(assistant, options),
            harness: Harness::new(harness),
            controller,
            intent: None,
            open: None,
        }
    }

    pub fn with_intent(mut self, intent: Option<BusinessIntent>) -> Self {
        self.intent = intent;
        self
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn controller(&self) -> &ProgressionController {
        &self.controller
    }

    pub fn open_quest_ref(&self) -> Option<&Quest> {
        self.open.as_ref()
    }

    pub fn mode(&self) -> Option<QuestMode> {
        self.open.as_ref().map(QuestMode::for_quest)
    }

    pub fn summary(&self) -> ProgressSummary {
        self.controller.summary()
    }

    pub fn can_continue(&self) -> bool {
        self.open.is_some() && self.controller.can_continue()
    }

    /// Open the controller's current quest, replacing any open session.
    ///
    /// A handshake failure still leaves the quest open: static validation
    /// works without an assistant, and reopening retries the handshake.
    pub async fn open_quest(&mut self) -> Result<&Quest, SessionError> {
        let quest = self
            .controller
            .current_quest()
            .cloned()
            .ok_or(SessionError::TrackComplete)?;
        let context = QuestContext {
            track_id: self.controller.track().id.clone(),
            quest: quest.clone(),
            intent: self.intent.clone(),
        };
        tracing::info!(quest_id = %quest.id, mode = ?QuestMode::for_quest(&quest), "opening quest");
        let opened = self.open.insert(quest);
        self.session.open(&context).await?;
        Ok(opened)
    }

    fn require_open(&self) -> Result<&Quest, SessionError> {
        self.open.as_ref().ok_or(SessionError::NoQuest)
    }

    pub async fn send(&mut self, text: &str) -> Result<usize, SessionError> {
        self.require_open()?;
        self.session.submit(text).await
    }

    pub async fn send_suggestion(&mut self, choice: usize) -> Result<usize, SessionError> {
        self.require_open()?;
        self.session.submit_suggestion(choice).await
    }

    /// Execute the directive on message `index`, optionally hand-edited.
    pub async fn test_message(
        &mut self,
        index: usize,
        edited: Option<RequestSpec>,
    ) -> Result<Outcome, SessionError> {
        self.require_open()?;
        let message = self
            .session
            .message(index)
            .ok_or(SessionError::UnknownMessage(index))?;
        if !message.is_actionable() {
            return Err(SessionError::NoDirective(index));
        }
        let spec = match (edited, &message.directive) {
            (Some(spec), _) => spec,
            (None, Some(directive)) => RequestSpec::from_directive(directive),
            (None, None) => return Err(SessionError::NoDirective(index)),
        };

        let outcome = self
            .harness
            .execute(&spec)
            .await
            .map_err(|_| SessionError::RequestInFlight)?;
        self.session.record_outcome(index, outcome.clone())?;
        if let Some(message) = self.session.message(index) {
            self.controller.observe_outcome(message);
        }
        self.session.forward_outcome(index).await;
        Ok(outcome)
    }

    /// Execute the open quest's static validation request. Quests without
    /// one are validated through directives only, edited or not.
    pub async fn validate_static(
        &mut self,
        edited: Option<RequestSpec>,
    ) -> Result<Outcome, SessionError> {
        let quest = self.require_open()?;
        let Some(validation) = &quest.validation else {
            return Err(SessionError::NoStaticValidation(quest.id.clone()));
        };
        let spec = edited.unwrap_or_else(|| RequestSpec::from_static(validation));

        let outcome = self
            .harness
            .execute(&spec)
            .await
            .map_err(|_| SessionError::RequestInFlight)?;
        self.controller.signal_static_validation(outcome.is_success());
        Ok(outcome)
    }

    /// The explicit continue action. Closes the session on success.
    pub fn continue_quest(&mut self) -> Result<CompletionReport, SessionError> {
        let quest_id = self.require_open()?.id.clone();
        let report = self.controller.confirm_completion(&quest_id)?;
        self.exit_quest();
        Ok(report)
    }

    pub fn exit_quest(&mut self) {
        if let Some(quest) = self.open.take() {
            tracing::info!(quest_id = %quest.id, "leaving quest");
        }
        self.session.close();
    }

    /// Clear all progress for this track.
    pub fn reset(&mut self) {
        self.exit_quest();
        self.controller.reset();
    }
}
