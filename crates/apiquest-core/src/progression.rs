//! Quest progression: XP, badges and the pointer into the active track.
//!
//! A quest only advances after an observed success followed by an explicit
//! `confirm_completion`. Badges are never revoked; only `reset` clears them.

use std::sync::Arc;

use apiquest_bus::BusPublisher;
use apiquest_schema::{BadgeId, Message, Outcome, ProgressState, Quest, QuestEvent, Track};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionReport {
    pub quest_id: String,
    /// Zero when the quest had already been completed.
    pub xp_awarded: u32,
    pub new_badges: Vec<BadgeId>,
    pub track_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSummary {
    pub track_id: String,
    pub track_name: String,
    pub quests_completed: usize,
    pub xp_earned: u32,
    pub badges: Vec<BadgeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub track_name: String,
    pub current_index: usize,
    pub total_quests: usize,
    pub xp_earned: u32,
    pub total_xp: u32,
    pub quest_percent: u8,
    pub xp_percent: u8,
    pub badges: Vec<BadgeId>,
}

impl ProgressSummary {
    pub fn badge_names(&self) -> Vec<&'static str> {
        self.badges.iter().map(BadgeId::display_name).collect()
    }
}

fn percent(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    ((part.min(whole) as f64 / whole as f64) * 100.0).round() as u8
}

pub struct ProgressionController {
    track: Arc<Track>,
    state: ProgressState,
    /// Quest whose success has been observed and awaits confirmation.
    validated: Option<String>,
    publisher: BusPublisher,
}

impl ProgressionController {
    pub fn new(track: Arc<Track>, publisher: BusPublisher) -> Self {
        Self {
            track,
            state: ProgressState::default(),
            validated: None,
            publisher,
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    /// Mark the track as entered. Awards `first-steps`.
    pub fn enter_track(&mut self) {
        tracing::info!(track_id = %self.track.id, "entered track");
        self.award(BadgeId::FirstSteps);
    }

    pub fn current_quest(&self) -> Option<&Quest> {
        self.track.quests.get(self.state.current_quest_index)
    }

    pub fn is_track_complete(&self) -> bool {
        self.state.current_quest_index >= self.track.quests.len()
    }

    /// True once the current quest has an observed success awaiting confirmation.
    pub fn can_continue(&self) -> bool {
        match (self.current_quest(), &self.validated) {
            (Some(quest), Some(id)) => &quest.id == id,
            _ => false,
        }
    }

    /// Record a pass/fail decision from a static validation request.
    pub fn signal_static_validation(&mut self, passed: bool) {
        self.set_validated(passed);
    }

    /// Inspect a tested message. Only a success on an actionable message counts.
    /// Returns whether the current quest can now be continued.
    pub fn observe_outcome(&mut self, message: &Message) -> bool {
        if !message.is_actionable() {
            return self.can_continue();
        }
        match &message.outcome {
            Some(Outcome::Success { .. }) => self.set_validated(true),
            Some(Outcome::Failure(_)) => self.set_validated(false),
            None => {}
        }
        self.can_continue()
    }

    fn set_validated(&mut self, passed: bool) {
        let Some(quest) = self.current_quest() else {
            return;
        };
        if passed {
            tracing::debug!(quest_id = %quest.id, "quest validated");
            self.validated = Some(quest.id.clone());
        } else {
            self.validated = None;
        }
    }

    /// The explicit "continue" action.
    ///
    /// Confirming an already completed quest is a no-op that reports zero XP.
    pub fn confirm_completion(&mut self, quest_id: &str) -> Result<CompletionReport, SessionError> {
        if self.state.completed_quests.iter().any(|id| id == quest_id) {
            return Ok(CompletionReport {
                quest_id: quest_id.to_string(),
                xp_awarded: 0,
                new_badges: vec![],
                track_complete: self.is_track_complete(),
            });
        }
        let quest = self
            .current_quest()
            .cloned()
            .ok_or(SessionError::TrackComplete)?;
        if quest.id != quest_id {
            return Err(SessionError::WrongQuest {
                expected: quest.id,
                got: quest_id.to_string(),
            });
        }
        if self.validated.as_deref() != Some(quest_id) {
            return Err(SessionError::NotValidated(quest_id.to_string()));
        }

        self.validated = None;
        self.state.completed_quests.push(quest.id.clone());
        self.state.xp_earned = self.state.xp_earned.saturating_add(quest.xp_reward);
        self.state.current_quest_index += 1;
        tracing::info!(
            track_id = %self.track.id,
            quest_id = %quest.id,
            xp = quest.xp_reward,
            xp_total = self.state.xp_earned,
            "quest completed"
        );
        self.emit(QuestEvent::QuestCompleted {
            trace_id: Uuid::new_v4(),
            track_id: self.track.id.clone(),
            quest_id: quest.id.clone(),
            xp_reward: quest.xp_reward,
            xp_total: self.state.xp_earned,
            at: Utc::now(),
        });

        let mut new_badges = Vec::new();
        if self.state.current_quest_index == 1 && self.award(BadgeId::CodeWarrior) {
            new_badges.push(BadgeId::CodeWarrior);
        }
        let track_complete = self.is_track_complete();
        if track_complete {
            if self.award(BadgeId::ApiMaster) {
                new_badges.push(BadgeId::ApiMaster);
            }
            tracing::info!(track_id = %self.track.id, "track completed");
            self.emit(QuestEvent::TrackCompleted {
                track_id: self.track.id.clone(),
                quests_completed: self.state.completed_quests.len(),
                xp_earned: self.state.xp_earned,
                badges: self.state.badges.clone(),
            });
        }

        Ok(CompletionReport {
            quest_id: quest.id,
            xp_awarded: quest.xp_reward,
            new_badges,
            track_complete,
        })
    }

    /// Clear all progress. The track must be entered again afterwards.
    pub fn reset(&mut self) {
        tracing::info!(track_id = %self.track.id, "progress reset");
        self.state = ProgressState::default();
        self.validated = None;
        self.emit(QuestEvent::TrackReset {
            track_id: self.track.id.clone(),
        });
    }

    pub fn summary(&self) -> ProgressSummary {
        let total_quests = self.track.quests.len();
        let total_xp = self.track.total_xp();
        ProgressSummary {
            track_name: self.track.name.clone(),
            current_index: self.state.current_quest_index.min(total_quests),
            total_quests,
            xp_earned: self.state.xp_earned,
            total_xp,
            quest_percent: percent(self.state.current_quest_index as u64, total_quests as u64),
            xp_percent: percent(self.state.xp_earned as u64, total_xp as u64),
            badges: self.state.badges.clone(),
        }
    }

    /// Final tally, available once the track is complete.
    pub fn track_summary(&self) -> Option<TrackSummary> {
        self.is_track_complete().then(|| TrackSummary {
            track_id: self.track.id.clone(),
            track_name: self.track.name.clone(),
            quests_completed: self.state.completed_quests.len(),
            xp_earned: self.state.xp_earned,
            badges: self.state.badges.clone(),
        })
    }

    fn award(&mut self, badge: BadgeId) -> bool {
        if self.state.badges.contains(&badge) {
            return false;
        }
        self.state.badges.push(badge);
        tracing::info!(track_id = %self.track.id, badge = %badge, "badge awarded");
        self.emit(QuestEvent::BadgeAwarded {
            track_id: self.track.id.clone(),
            badge,
            at: Utc::now(),
        });
        true
    }

    fn emit(&self, event: QuestEvent) {
        if !self.publisher.try_publish(event) {
            tracing::debug!("quest event dropped: bus busy");
        }
    }
}
