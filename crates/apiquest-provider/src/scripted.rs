//! Offline guide that answers from quest content alone.
//!
//! Used when no assistant service is configured, and as a deterministic
//! assistant in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use apiquest_schema::{Directive, Quest, QuestContext};
use async_trait::async_trait;

use crate::{AssistantReply, AssistantService};

#[derive(Debug, Clone, Default)]
pub struct ScriptedGuide {
    sessions: Arc<Mutex<HashMap<String, QuestContext>>>,
}

impl ScriptedGuide {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions started and not yet ended.
    pub fn active_sessions(&self) -> usize {
        self.sessions().len()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, QuestContext>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn greeting(context: &QuestContext) -> AssistantReply {
        let mut text = format!(
            "Hello! I'm your guide for the \"{}\" quest. Ready to get started?",
            context.quest.title
        );
        if let Some(intent) = &context.intent {
            text.push_str(&format!(
                "\nThis quest moves you toward your goal: {}.",
                intent.goal
            ));
        }
        AssistantReply::text(text).with_suggestions([
            "Show me the code",
            "What's the objective?",
            "Tell me more about this quest",
        ])
    }

    fn answer(quest: &Quest, text: &str) -> AssistantReply {
        let lower = text.to_lowercase();

        if lower.starts_with("api call succeeded") {
            return AssistantReply::text(
                "Great work, the live call succeeded! Continue when you're ready to claim your XP.",
            );
        }
        if lower.starts_with("api call failed") {
            return AssistantReply::text(
                "That call didn't go through. Check the url, headers and body, then test it again.",
            )
            .with_suggestions(["Show me the code"]);
        }

        if lower.contains("code") {
            return AssistantReply::text(code_answer(quest))
                .with_suggestions(["What's the expected output?"]);
        }
        if lower.contains("objective") {
            return AssistantReply::text(format!(
                "The main objective is: \"{}\". Let me know when you're ready for the code.",
                quest.objective
            ))
            .with_suggestions(["I'm ready for the code", "What's the expected output?"]);
        }
        if lower.contains("output") {
            return AssistantReply::text(format!(
                "The expected output is a success message, like this:\n```\n{}\n```",
                quest.expected_output
            ))
            .with_suggestions(["Show me the code", "How do I test this?"]);
        }
        if lower.contains("more") && !quest.description.is_empty() {
            return AssistantReply::text(quest.description.clone())
                .with_suggestions(["Show me the code", "What's the objective?"]);
        }

        AssistantReply::text(
            "I can help you with the code, objective, or expected output. What would you like to know?",
        )
        .with_suggestions([
            "Show me the code",
            "What's the objective?",
            "What's the expected output?",
        ])
    }
}

fn code_answer(quest: &Quest) -> String {
    let mut text = format!(
        "Here is the code snippet for this quest in {}. You can copy it and then test it live.\n\n```{}\n{}\n```",
        quest.language,
        quest.language.to_lowercase(),
        quest.code_snippet
    );

    if let Some(validation) = &quest.validation {
        let directive = Directive {
            ready: true,
            url: validation.endpoint.clone(),
            method: validation.method,
            headers: validation.headers.clone(),
            payload: validation.body.clone(),
            bearer_token: None,
        };
        match serde_json::to_string_pretty(&directive) {
            Ok(json) => text.push_str(&format!(
                "\n\nWhen you're ready, run this request:\n```json\n{json}\n```"
            )),
            Err(e) => tracing::warn!("failed to render directive for {}: {e}", quest.id),
        }
    }

    text
}

#[async_trait]
impl AssistantService for ScriptedGuide {
    async fn init(&self) -> Result<String> {
        Ok(format!("scripted-{}", uuid::Uuid::new_v4()))
    }

    async fn start(&self, session_id: &str, context: &QuestContext) -> Result<AssistantReply> {
        let reply = Self::greeting(context);
        self.sessions()
            .insert(session_id.to_string(), context.clone());
        Ok(reply)
    }

    async fn reply(&self, session_id: &str, text: &str) -> Result<AssistantReply> {
        let sessions = self.sessions();
        let context = sessions
            .get(session_id)
            .ok_or_else(|| anyhow!("unknown session: {session_id}"))?;
        Ok(Self::answer(&context.quest, text))
    }

    fn end(&self, session_id: &str) {
        self.sessions().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiquest_schema::{Difficulty, HttpMethod, StaticValidation};

    fn quest(validation: Option<StaticValidation>) -> Quest {
        Quest {
            id: "python-auth".into(),
            title: "Authentication Token".into(),
            objective: "Generate an access token".into(),
            description: "Learn how to authenticate.".into(),
            difficulty: Difficulty::Medium,
            xp_reward: 200,
            language: "Python".into(),
            code_snippet: "print('hi')".into(),
            expected_output: "token: abc".into(),
            validation,
        }
    }

    fn context(validation: Option<StaticValidation>) -> QuestContext {
        QuestContext {
            track_id: "python".into(),
            quest: quest(validation),
            intent: None,
        }
    }

    #[tokio::test]
    async fn start_greets_with_quest_title() {
        let guide = ScriptedGuide::new();
        let id = guide.init().await.unwrap();
        let reply = guide.start(&id, &context(None)).await.unwrap();
        assert!(reply.response.contains("\"Authentication Token\" quest"));
        assert_eq!(reply.suggestions.len(), 3);
    }

    #[tokio::test]
    async fn ended_session_is_forgotten() {
        let guide = ScriptedGuide::new();
        let id = guide.init().await.unwrap();
        guide.start(&id, &context(None)).await.unwrap();
        assert_eq!(guide.active_sessions(), 1);

        guide.end(&id);
        assert_eq!(guide.active_sessions(), 0);
        assert!(guide.reply(&id, "hello").await.is_err());
    }

    #[tokio::test]
    async fn reply_before_start_fails() {
        let guide = ScriptedGuide::new();
        let err = guide.reply("nope", "hello").await.unwrap_err();
        assert!(err.to_string().contains("unknown session"));
    }

    #[tokio::test]
    async fn code_reply_embeds_directive_when_quest_has_validation() {
        let guide = ScriptedGuide::new();
        let id = guide.init().await.unwrap();
        let validation = StaticValidation {
            endpoint: "https://sandbox.example.com/auth/token".into(),
            method: HttpMethod::Post,
            headers: Default::default(),
            body: serde_json::json!({"merchant_id": "m-1"}),
        };
        guide.start(&id, &context(Some(validation))).await.unwrap();

        let reply = guide.reply(&id, "Show me the code").await.unwrap();
        assert!(reply.response.contains("```python"));
        assert!(reply.response.contains("```json"));
        assert!(reply.response.contains("\"ready\": true"));
        assert!(reply.response.contains("sandbox.example.com/auth/token"));
    }

    #[tokio::test]
    async fn code_reply_without_validation_has_no_json_block() {
        let guide = ScriptedGuide::new();
        let id = guide.init().await.unwrap();
        guide.start(&id, &context(None)).await.unwrap();

        let reply = guide.reply(&id, "code please").await.unwrap();
        assert!(!reply.response.contains("```json"));
    }

    #[tokio::test]
    async fn keyword_routing_matches_objective_and_output() {
        let guide = ScriptedGuide::new();
        let id = guide.init().await.unwrap();
        guide.start(&id, &context(None)).await.unwrap();

        let objective = guide.reply(&id, "What's the objective?").await.unwrap();
        assert!(objective.response.contains("Generate an access token"));

        let output = guide.reply(&id, "expected OUTPUT?").await.unwrap();
        assert!(output.response.contains("token: abc"));

        let fallback = guide.reply(&id, "hmm").await.unwrap();
        assert!(fallback.response.contains("I can help you"));
    }

    #[tokio::test]
    async fn forwarded_outcomes_get_acknowledged() {
        let guide = ScriptedGuide::new();
        let id = guide.init().await.unwrap();
        guide.start(&id, &context(None)).await.unwrap();

        let ok = guide
            .reply(&id, "API call succeeded (200) with response: {\"code\":1}")
            .await
            .unwrap();
        assert!(ok.response.contains("succeeded"));

        let failed = guide.reply(&id, "API call failed: timeout").await.unwrap();
        assert!(failed.response.contains("didn't go through"));
    }
}
