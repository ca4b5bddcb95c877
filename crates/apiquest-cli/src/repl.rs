use std::io::Write;

use anyhow::Result;
use apiquest_core::{Notice, ProgressSummary, RequestSpec, TrackSummary};
use apiquest_schema::{Message, Outcome, Sender};

/// One line of input inside a quest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Say(String),
    /// Zero-based suggestion index of the latest assistant message
    Suggestion(usize),
    /// Test a message's directive; `None` picks the latest actionable one
    Test(Option<usize>),
    /// Edit then test a message's request, or the static request when `None`
    Edit(Option<usize>),
    Validate,
    Continue,
    Status,
    Code,
    Reset,
    Help,
    Exit,
    Empty,
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplCommand::Empty;
        }
        if line == "quit" || line == "exit" {
            return ReplCommand::Exit;
        }
        let Some(command) = line.strip_prefix('/') else {
            return ReplCommand::Say(line.to_string());
        };

        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next().map(str::parse::<usize>);

        match (name, arg) {
            ("s" | "suggest", Some(Ok(n))) if n > 0 => ReplCommand::Suggestion(n - 1),
            ("test" | "t", None) => ReplCommand::Test(None),
            ("test" | "t", Some(Ok(n))) => ReplCommand::Test(Some(n)),
            ("edit", None) => ReplCommand::Edit(None),
            ("edit", Some(Ok(n))) => ReplCommand::Edit(Some(n)),
            ("validate" | "v", None) => ReplCommand::Validate,
            ("continue" | "c", None) => ReplCommand::Continue,
            ("status", None) => ReplCommand::Status,
            ("code", None) => ReplCommand::Code,
            ("reset", None) => ReplCommand::Reset,
            ("help" | "?", None) => ReplCommand::Help,
            ("exit" | "quit" | "q", None) => ReplCommand::Exit,
            _ => ReplCommand::Unknown(line.to_string()),
        }
    }
}

pub const HELP: &str = "\
Type a message to talk to your guide, or use a command:
  /s N          send suggestion N
  /test [N]     run the request in message #N (default: latest)
  /edit [N]     edit then run message #N's request, or the quest's validation request
  /validate     run the quest's validation request
  /continue     claim XP and move to the next quest
  /status       show progress
  /code         show this quest's code snippet
  /reset        clear all progress and pick a track again
  /exit         leave";

pub fn prompt(label: &str) -> Result<Option<String>> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut input = String::new();
    if std::io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim_end_matches(['\r', '\n']).to_string()))
}

/// Ask for each request field, keeping the current value on empty input.
pub fn edit_spec(mut spec: RequestSpec) -> Result<Option<RequestSpec>> {
    println!("Editing request. Press enter to keep the current value.");

    let Some(url) = prompt(&format!("url [{}]: ", spec.url))? else {
        return Ok(None);
    };
    if !url.trim().is_empty() {
        spec.url = url.trim().to_string();
    }

    let Some(method) = prompt(&format!("method [{}]: ", spec.method))? else {
        return Ok(None);
    };
    if !method.trim().is_empty() {
        match method.parse::<apiquest_schema::HttpMethod>() {
            Ok(method) => spec.method = method,
            Err(e) => println!("{e}; keeping {}", spec.method),
        }
    }

    println!("headers (JSON):\n{}", spec.headers);
    let Some(headers) = prompt("new headers: ")? else {
        return Ok(None);
    };
    if !headers.trim().is_empty() {
        spec.headers = headers;
    }

    if spec.body.is_empty() {
        println!("body (JSON): <none>");
    } else {
        println!("body (JSON):\n{}", spec.body);
    }
    let Some(body) = prompt("new body: ")? else {
        return Ok(None);
    };
    if !body.trim().is_empty() {
        spec.body = body;
    }

    Ok(Some(spec))
}

pub fn print_message(index: usize, message: &Message) {
    match message.sender {
        Sender::User => println!("#{index} you> {}", message.content),
        Sender::Assistant => {
            println!("#{index} guide> {}", message.content);
            if message.is_actionable() {
                println!("    [request ready: /test {index}  or  /edit {index}]");
            }
            for (i, suggestion) in message.suggestions.iter().enumerate() {
                println!("    /s {}  {suggestion}", i + 1);
            }
        }
    }
}

pub fn print_messages_from(messages: &[Message], from: usize) {
    for (index, message) in messages.iter().enumerate().skip(from) {
        print_message(index, message);
    }
}

pub fn print_notice(notice: &Notice) {
    if notice.is_failure() {
        eprintln!("! {notice}");
    } else {
        println!("* {notice}");
    }
}

pub fn print_outcome(outcome: &Outcome) {
    print_notice(&Notice::for_outcome(outcome));
    if let Outcome::Success { body, .. } = outcome {
        if !body.is_null() {
            let rendered = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
            println!("{rendered}");
        }
    }
}

pub fn print_summary(summary: &ProgressSummary) {
    println!(
        "{}: quest {}/{} ({}%), XP {}/{} ({}%)",
        summary.track_name,
        summary.current_index,
        summary.total_quests,
        summary.quest_percent,
        summary.xp_earned,
        summary.total_xp,
        summary.xp_percent
    );
    if !summary.badges.is_empty() {
        println!("Badges: {}", summary.badge_names().join(", "));
    }
}

pub fn print_track_summary(summary: &TrackSummary) {
    println!("Track {} complete!", summary.track_name);
    println!("  quests completed: {}", summary.quests_completed);
    println!("  XP earned: {}", summary.xp_earned);
    let badges: Vec<_> = summary.badges.iter().map(|b| b.display_name()).collect();
    println!("  badges: {}", badges.join(", "));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            ReplCommand::parse("  show me the code "),
            ReplCommand::Say("show me the code".into())
        );
        assert_eq!(ReplCommand::parse(""), ReplCommand::Empty);
    }

    #[test]
    fn suggestions_are_one_based() {
        assert_eq!(ReplCommand::parse("/s 1"), ReplCommand::Suggestion(0));
        assert!(matches!(ReplCommand::parse("/s 0"), ReplCommand::Unknown(_)));
    }

    #[test]
    fn test_and_edit_take_optional_index() {
        assert_eq!(ReplCommand::parse("/test"), ReplCommand::Test(None));
        assert_eq!(ReplCommand::parse("/test 4"), ReplCommand::Test(Some(4)));
        assert_eq!(ReplCommand::parse("/edit"), ReplCommand::Edit(None));
        assert_eq!(ReplCommand::parse("/edit 2"), ReplCommand::Edit(Some(2)));
        assert!(matches!(ReplCommand::parse("/test x"), ReplCommand::Unknown(_)));
    }

    #[test]
    fn exit_aliases() {
        for line in ["quit", "exit", "/exit", "/q"] {
            assert_eq!(ReplCommand::parse(line), ReplCommand::Exit);
        }
    }

    #[test]
    fn unknown_commands_are_reported() {
        assert_eq!(
            ReplCommand::parse("/dance"),
            ReplCommand::Unknown("/dance".into())
        );
    }
}
