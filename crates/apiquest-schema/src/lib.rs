use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
}

/// HTTP verbs a directive or a static validation may use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether a request body is sent for this verb.
    pub fn carries_body(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(anyhow!("unsupported http method: {other}")),
        }
    }
}

/// A machine-actionable request embedded in assistant text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Directive {
    pub ready: bool,
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, rename = "bearerToken", skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Headers, body or url text could not be parsed before sending.
    MalformedInput,
    /// No HTTP response at all (dns, connect, timeout, tls).
    Transport,
    /// The endpoint answered with a non-2xx status.
    Status,
    /// A 2xx answer whose body could not be read.
    MalformedResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureDetail {
    pub kind: FailureKind,
    #[serde(default)]
    pub status: Option<u16>,
    pub message: String,
    #[serde(default)]
    pub body: Option<String>,
}

/// Result of executing one HTTP request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        status: u16,
        body: serde_json::Value,
    },
    Failure(FailureDetail),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn malformed_input(message: impl Into<String>) -> Self {
        Outcome::Failure(FailureDetail {
            kind: FailureKind::MalformedInput,
            status: None,
            message: message.into(),
            body: None,
        })
    }

    /// One-line summary suitable for forwarding back to the assistant.
    pub fn summary(&self) -> String {
        match self {
            Outcome::Success { status, body } => {
                format!("API call succeeded ({status}) with response: {body}")
            }
            Outcome::Failure(detail) => {
                let mut text = match detail.status {
                    Some(status) => format!("API call failed ({status}): {}", detail.message),
                    None => format!("API call failed: {}", detail.message),
                };
                if let Some(body) = detail.body.as_deref().filter(|b| !b.is_empty()) {
                    text.push_str(&format!("\nResponse body: {body}"));
                }
                text
            }
        }
    }
}

/// One turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub content: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub directive: Option<Directive>,
    /// Quick replies offered with an assistant message
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    /// Replay notes added after the outcome was recorded
    #[serde(default)]
    pub notes: Vec<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            content: content.into(),
            at: Utc::now(),
            directive: None,
            suggestions: vec![],
            outcome: None,
            notes: vec![],
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        directive: Option<Directive>,
        suggestions: Vec<String>,
    ) -> Self {
        Self {
            sender: Sender::Assistant,
            content: content.into(),
            at: Utc::now(),
            directive,
            suggestions,
            outcome: None,
            notes: vec![],
        }
    }

    /// True when this message carries a directive that may be executed.
    pub fn is_actionable(&self) -> bool {
        self.sender == Sender::Assistant && self.directive.as_ref().is_some_and(|d| d.ready)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        };
        f.write_str(label)
    }
}

/// Static request used to validate a quest when no directive is produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaticValidation {
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub objective: String,
    #[serde(default)]
    pub description: String,
    pub difficulty: Difficulty,
    pub xp_reward: u32,
    pub language: String,
    pub code_snippet: String,
    pub expected_output: String,
    #[serde(default)]
    pub validation: Option<StaticValidation>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrackLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// Ordered quests for one language.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    pub level: TrackLevel,
    pub quests: Vec<Quest>,
}

impl Track {
    /// Sum of all rewards, saturating at `u32::MAX`.
    pub fn total_xp(&self) -> u32 {
        self.quests
            .iter()
            .fold(0u32, |total, q| total.saturating_add(q.xp_reward))
    }

    /// Sum of all rewards, or `None` when it does not fit in a `u32`.
    pub fn checked_total_xp(&self) -> Option<u32> {
        self.quests
            .iter()
            .try_fold(0u32, |total, q| total.checked_add(q.xp_reward))
    }

    pub fn quest(&self, id: &str) -> Option<&Quest> {
        self.quests.iter().find(|q| q.id == id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum BadgeId {
    FirstSteps,
    CodeWarrior,
    ApiMaster,
}

impl BadgeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeId::FirstSteps => "first-steps",
            BadgeId::CodeWarrior => "code-warrior",
            BadgeId::ApiMaster => "api-master",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BadgeId::FirstSteps => "First Steps",
            BadgeId::CodeWarrior => "Code Warrior",
            BadgeId::ApiMaster => "API Master",
        }
    }
}

impl fmt::Display for BadgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProgressState {
    /// Completed quest ids in completion order, no duplicates
    pub completed_quests: Vec<String>,
    pub xp_earned: u32,
    /// Awarded badges in award order, no duplicates
    pub badges: Vec<BadgeId>,
    pub current_quest_index: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Upi,
    Netbanking,
    Points,
    Wallet,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 5] = [
        PaymentMethod::Card,
        PaymentMethod::Upi,
        PaymentMethod::Netbanking,
        PaymentMethod::Points,
        PaymentMethod::Wallet,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "Credit/Debit Cards",
            PaymentMethod::Upi => "UPI Payments",
            PaymentMethod::Netbanking => "Net Banking",
            PaymentMethod::Points => "Loyalty Points",
            PaymentMethod::Wallet => "Digital Wallets",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "card" => Ok(PaymentMethod::Card),
            "upi" => Ok(PaymentMethod::Upi),
            "netbanking" => Ok(PaymentMethod::Netbanking),
            "points" => Ok(PaymentMethod::Points),
            "wallet" => Ok(PaymentMethod::Wallet),
            other => Err(anyhow!("unknown payment method: {other}")),
        }
    }
}

/// The learner's stated integration goal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessIntent {
    pub goal: String,
    pub payment_methods: Vec<PaymentMethod>,
}

/// Everything the assistant is told about the quest at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestContext {
    pub track_id: String,
    pub quest: Quest,
    #[serde(default)]
    pub intent: Option<BusinessIntent>,
}

/// Events emitted by the progression controller for external bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QuestEvent {
    QuestCompleted {
        trace_id: Uuid,
        track_id: String,
        quest_id: String,
        xp_reward: u32,
        xp_total: u32,
        at: DateTime<Utc>,
    },
    BadgeAwarded {
        track_id: String,
        badge: BadgeId,
        at: DateTime<Utc>,
    },
    TrackCompleted {
        track_id: String,
        quests_completed: usize,
        xp_earned: u32,
        badges: Vec<BadgeId>,
    },
    TrackReset {
        track_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_method_parses_case_insensitively() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!(" Delete ".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn directive_serde_uses_bearer_token_key() {
        let directive = Directive {
            ready: true,
            url: "https://x".into(),
            method: HttpMethod::Post,
            headers: BTreeMap::new(),
            payload: serde_json::json!({"amount": 100}),
            bearer_token: Some("tok".into()),
        };
        let json = serde_json::to_value(&directive).unwrap();
        assert_eq!(json["bearerToken"], "tok");
        assert_eq!(json["method"], "POST");
    }

    #[test]
    fn outcome_summary_mentions_status_and_body() {
        let outcome = Outcome::Failure(FailureDetail {
            kind: FailureKind::Status,
            status: Some(401),
            message: "HTTP 401 Unauthorized".into(),
            body: Some("{\"error\":\"bad token\"}".into()),
        });
        let summary = outcome.summary();
        assert!(summary.contains("401"));
        assert!(summary.contains("bad token"));
        assert!(!outcome.is_success());
    }

    #[test]
    fn outcome_success_serde_is_tagged() {
        let outcome = Outcome::Success {
            status: 200,
            body: serde_json::json!({"ok": true}),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["result"], "success");
        assert_eq!(json["status"], 200);
    }

    #[test]
    fn user_message_is_never_actionable() {
        let msg = Message::user("hi");
        assert_eq!(msg.sender, Sender::User);
        assert!(!msg.is_actionable());
    }

    #[test]
    fn badge_ids_serialize_kebab_case() {
        let json = serde_json::to_string(&BadgeId::CodeWarrior).unwrap();
        assert_eq!(json, "\"code-warrior\"");
        assert_eq!(BadgeId::ApiMaster.display_name(), "API Master");
    }

    #[test]
    fn track_total_xp_sums_rewards() {
        let quest = |id: &str, xp| Quest {
            id: id.into(),
            title: id.into(),
            objective: String::new(),
            description: String::new(),
            difficulty: Difficulty::Easy,
            xp_reward: xp,
            language: "Python".into(),
            code_snippet: String::new(),
            expected_output: String::new(),
            validation: None,
        };
        let track = Track {
            id: "python".into(),
            name: "Python".into(),
            icon: String::new(),
            description: String::new(),
            level: TrackLevel::Beginner,
            quests: vec![quest("a", 100), quest("b", 200)],
        };
        assert_eq!(track.total_xp(), 300);
        assert_eq!(track.checked_total_xp(), Some(300));
        assert!(track.quest("b").is_some());
        assert!(track.quest("c").is_none());

        let huge = Track {
            quests: vec![quest("a", u32::MAX), quest("b", 1)],
            ..track
        };
        assert_eq!(huge.total_xp(), u32::MAX);
        assert_eq!(huge.checked_total_xp(), None);
    }
}
