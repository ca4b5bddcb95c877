use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod repl;

use apiquest_bus::{EventBus, Topic};
use apiquest_core::directive;
use apiquest_core::intent;
use apiquest_core::*;
use apiquest_provider::create_assistant;
use apiquest_schema::{BusinessIntent, HttpMethod, Track};
use repl::{
    edit_spec, print_messages_from, print_notice, print_outcome, print_summary,
    print_track_summary, prompt, ReplCommand, HELP,
};

#[derive(Parser)]
#[command(name = "apiquest", version, about = "Guided API-integration quests")]
struct Cli {
    #[arg(
        long,
        default_value = "~/.apiquest",
        help = "Config root directory (contains config/ and logs/)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Play a quest track interactively")]
    Play {
        #[arg(long, help = "Track id (python, nodejs, java, ...)")]
        track: Option<String>,
        #[arg(long, help = "Integration goal, or the number of a suggested goal")]
        intent: Option<String>,
        #[arg(long, help = "Comma separated payment methods: card,upi,netbanking,points,wallet")]
        methods: Option<String>,
    },
    #[command(about = "List available tracks")]
    Tracks,
    #[command(about = "List the quests of a track")]
    Quests {
        #[arg(help = "Track id")]
        track: String,
    },
    #[command(about = "Execute one HTTP request and print its outcome")]
    Send {
        #[arg(help = "Request URL")]
        url: String,
        #[arg(long, short = 'X', default_value = "GET", help = "HTTP method")]
        method: String,
        #[arg(long, default_value = "{}", help = "Headers as a JSON object")]
        headers: String,
        #[arg(long, default_value = "", help = "Body as JSON")]
        body: String,
    },
    #[command(about = "Extract the request directive from assistant text")]
    Extract {
        #[arg(help = "File to read (stdin when omitted)")]
        file: Option<PathBuf>,
    },
    #[command(about = "Validate config files")]
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Expand ~ to home directory
    if cli.config_root.starts_with("~") {
        if let Some(home) = std::env::var_os("HOME") {
            cli.config_root = PathBuf::from(home).join(
                cli.config_root
                    .strip_prefix("~")
                    .unwrap_or(&cli.config_root),
            );
        }
    }

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "apiquest.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Validate => {
            let config = load_config(&cli.config_root.join("config"))?;
            let catalog = build_catalog(&config)?;
            println!(
                "Config valid. assistant: {:?}, {} extra tracks, {} tracks total.",
                config.main.assistant.kind,
                config.tracks.len(),
                catalog.tracks().len()
            );
        }
        Commands::Tracks => {
            let config = load_config(&cli.config_root.join("config"))?;
            let catalog = build_catalog(&config)?;
            println!(
                "{:<14} {:<4} {:<16} {:<14} {:<8} {:<6}",
                "TRACK", "", "NAME", "LEVEL", "QUESTS", "XP"
            );
            println!("{}", "-".repeat(66));
            for track in catalog.tracks() {
                println!(
                    "{:<14} {:<4} {:<16} {:<14} {:<8} {:<6}",
                    track.id,
                    track.icon,
                    track.name,
                    format!("{:?}", track.level),
                    track.quests.len(),
                    track.total_xp()
                );
            }
        }
        Commands::Quests { track } => {
            let config = load_config(&cli.config_root.join("config"))?;
            let catalog = build_catalog(&config)?;
            let track = catalog
                .track(&track)
                .ok_or_else(|| anyhow!("track not found: {track}"))?;
            println!("{} {} - {}", track.icon, track.name, track.description);
            for (i, quest) in track.quests.iter().enumerate() {
                let mode = match QuestMode::for_quest(quest) {
                    QuestMode::Static => "static",
                    QuestMode::Dynamic => "dynamic",
                };
                println!(
                    "{}. {} [{}, {} XP, {}]",
                    i + 1,
                    quest.title,
                    quest.difficulty,
                    quest.xp_reward,
                    mode
                );
                println!("   {}", quest.objective);
            }
        }
        Commands::Send {
            url,
            method,
            headers,
            body,
        } => {
            let config = load_config(&cli.config_root.join("config"))?;
            let method: HttpMethod = method.parse()?;
            let spec = RequestSpec::new(url, method)
                .with_headers(headers)
                .with_body(body);
            let harness = Harness::new(&config.main.harness);
            let outcome = harness
                .execute(&spec)
                .await
                .map_err(|e| anyhow!("{e}"))?;
            print_outcome(&outcome);
            if let apiquest_schema::Outcome::Failure(detail) = &outcome {
                println!("{}", serde_json::to_string_pretty(detail)?);
            }
        }
        Commands::Extract { file } => {
            let text = read_input(file.as_deref())?;
            let segments = directive::json_segments(&text).len();
            match directive::extract(&text) {
                Some(found) => println!("{}", serde_json::to_string_pretty(&found)?),
                None => println!("No actionable directive found ({segments} json segments)."),
            }
        }
        Commands::Play {
            track,
            intent,
            methods,
        } => {
            run_play(&cli.config_root, track, intent, methods).await?;
        }
    }

    Ok(())
}

fn build_catalog(config: &QuestConfig) -> Result<Catalog> {
    Ok(Catalog::builtin()?.with_tracks(config.tracks.clone()))
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}

async fn spawn_event_logger(bus: &EventBus) {
    for topic in [
        Topic::QuestCompleted,
        Topic::BadgeAwarded,
        Topic::TrackCompleted,
        Topic::TrackReset,
    ] {
        let mut rx = bus.subscribe(topic).await;
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                tracing::info!(?event, "quest event");
            }
        });
    }
}

fn ask_intent(goal: Option<String>, methods: Option<String>) -> Result<Option<BusinessIntent>> {
    let goal = match goal {
        Some(goal) => goal,
        None => {
            println!("What do you want to build? Pick a number or describe it (enter to skip):");
            for (i, suggestion) in intent::SUGGESTED_INTENTS.iter().enumerate() {
                println!("  {}. {} ({})", i + 1, suggestion.text, suggestion.category);
            }
            match prompt("goal> ")? {
                Some(goal) if !goal.trim().is_empty() => goal,
                _ => return Ok(None),
            }
        }
    };

    let methods = match methods {
        Some(methods) => intent::parse_methods(&methods)?,
        None => loop {
            let names: Vec<_> = apiquest_schema::PaymentMethod::ALL
                .iter()
                .map(|m| format!("{m:?}").to_lowercase())
                .collect();
            let Some(line) = prompt(&format!("payment methods ({})> ", names.join(",")))? else {
                return Ok(None);
            };
            match intent::parse_methods(&line) {
                Ok(methods) if !methods.is_empty() => break methods,
                Ok(_) => println!("Select at least one payment method."),
                Err(e) => println!("{e}"),
            }
        },
    };

    let captured = intent::capture(&goal, &methods)?;
    let names: Vec<_> = captured
        .payment_methods
        .iter()
        .map(|m| m.display_name())
        .collect();
    println!("Goal: {} ({})", captured.goal, names.join(", "));
    Ok(Some(captured))
}

fn choose_track(catalog: &Catalog, wanted: Option<String>) -> Result<Option<Arc<Track>>> {
    if let Some(id) = wanted {
        return catalog
            .track(&id)
            .map(Some)
            .ok_or_else(|| anyhow!("track not found: {id}"));
    }
    println!("Choose your language:");
    for (i, track) in catalog.tracks().iter().enumerate() {
        println!(
            "  {}. {} {} ({:?}) - {}",
            i + 1,
            track.icon,
            track.name,
            track.level,
            track.description
        );
    }
    loop {
        let Some(line) = prompt("track> ")? else {
            return Ok(None);
        };
        let line = line.trim();
        if line == "quit" || line == "exit" {
            return Ok(None);
        }
        let by_number = line
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| catalog.tracks().get(i).cloned());
        match by_number.or_else(|| catalog.track(line)) {
            Some(track) => return Ok(Some(track)),
            None => println!("Unknown track: {line}"),
        }
    }
}

async fn open_and_greet(runner: &mut QuestRunner) {
    match runner.open_quest().await {
        Ok(quest) => {
            println!();
            println!(
                "=== {} [{}, {} XP] ===",
                quest.title, quest.difficulty, quest.xp_reward
            );
            println!("{}", quest.objective);
        }
        Err(e) => print_notice(&Notice::from(&e)),
    }
    print_messages_from(runner.session().messages(), 0);
}

fn latest_actionable(runner: &QuestRunner) -> Option<usize> {
    runner
        .session()
        .messages()
        .iter()
        .rposition(|m| m.is_actionable())
}

async fn run_test(runner: &mut QuestRunner, index: usize, edited: Option<RequestSpec>) {
    let before = runner.session().messages().len();
    match runner.test_message(index, edited).await {
        Ok(outcome) => {
            print_outcome(&outcome);
            print_messages_from(runner.session().messages(), before);
            if runner.can_continue() {
                println!("Quest validated. Type /continue to claim your XP.");
            }
        }
        Err(e) => print_notice(&Notice::from(&e)),
    }
}

async fn run_validate(runner: &mut QuestRunner, edited: Option<RequestSpec>) {
    match runner.validate_static(edited).await {
        Ok(outcome) => {
            print_outcome(&outcome);
            if runner.can_continue() {
                println!("Quest validated. Type /continue to claim your XP.");
            }
        }
        Err(e) => print_notice(&Notice::from(&e)),
    }
}

async fn run_play(
    root: &Path,
    track: Option<String>,
    goal: Option<String>,
    methods: Option<String>,
) -> Result<()> {
    let config = load_config(&root.join("config"))?;
    let catalog = build_catalog(&config)?;
    let bus = EventBus::new(64);
    spawn_event_logger(&bus).await;

    let intent = ask_intent(goal, methods)?;
    let mut wanted = track;

    'tracks: loop {
        let Some(track) = choose_track(&catalog, wanted.take())? else {
            return Ok(());
        };
        let assistant = create_assistant(&config.main.assistant)?;
        let mut runner = QuestRunner::new(
            assistant,
            track,
            &config.main.harness,
            config.main.session.clone(),
            bus.publisher(),
        )
        .with_intent(intent.clone());

        println!("Type /help for commands.");
        open_and_greet(&mut runner).await;

        loop {
            let Some(line) = prompt("> ")? else {
                runner.exit_quest();
                return Ok(());
            };
            match ReplCommand::parse(&line) {
                ReplCommand::Empty => {}
                ReplCommand::Help => println!("{HELP}"),
                ReplCommand::Exit => {
                    runner.exit_quest();
                    return Ok(());
                }
                ReplCommand::Unknown(line) => println!("Unknown command: {line} (try /help)"),
                ReplCommand::Say(text) => {
                    let before = runner.session().messages().len();
                    let result = runner.send(&text).await;
                    print_messages_from(runner.session().messages(), before + 1);
                    if let Err(e) = result {
                        print_notice(&Notice::from(&e));
                    }
                }
                ReplCommand::Suggestion(choice) => {
                    let before = runner.session().messages().len();
                    match runner.send_suggestion(choice).await {
                        Ok(_) => print_messages_from(runner.session().messages(), before),
                        Err(e) => print_notice(&Notice::from(&e)),
                    }
                }
                ReplCommand::Test(index) => match index.or_else(|| latest_actionable(&runner)) {
                    Some(index) => run_test(&mut runner, index, None).await,
                    None => println!("No request to test yet. Ask your guide for the code."),
                },
                ReplCommand::Edit(Some(index)) => {
                    let spec = runner
                        .session()
                        .message(index)
                        .and_then(|m| m.directive.as_ref())
                        .map(RequestSpec::from_directive);
                    match spec {
                        Some(spec) => {
                            if let Some(edited) = edit_spec(spec)? {
                                run_test(&mut runner, index, Some(edited)).await;
                            }
                        }
                        None => print_notice(&Notice::from(&SessionError::NoDirective(index))),
                    }
                }
                ReplCommand::Edit(None) => {
                    let spec = runner
                        .open_quest_ref()
                        .and_then(|q| q.validation.as_ref())
                        .map(RequestSpec::from_static);
                    match spec {
                        Some(spec) => {
                            if let Some(edited) = edit_spec(spec)? {
                                run_validate(&mut runner, Some(edited)).await;
                            }
                        }
                        None => println!("This quest has no validation request."),
                    }
                }
                ReplCommand::Validate => run_validate(&mut runner, None).await,
                ReplCommand::Status => print_summary(&runner.summary()),
                ReplCommand::Code => match runner.open_quest_ref() {
                    Some(quest) => println!(
                        "```{}\n{}\n```",
                        quest.language.to_lowercase(),
                        quest.code_snippet
                    ),
                    None => println!("No quest is open."),
                },
                ReplCommand::Reset => {
                    runner.reset();
                    println!("Progress cleared.");
                    continue 'tracks;
                }
                ReplCommand::Continue => match runner.continue_quest() {
                    Ok(report) => {
                        println!("+{} XP", report.xp_awarded);
                        for badge in &report.new_badges {
                            println!("Badge unlocked: {}", badge.display_name());
                        }
                        if report.track_complete {
                            if let Some(summary) = runner.controller().track_summary() {
                                print_track_summary(&summary);
                            }
                            let again = prompt("Start over? (y/N) ")?.unwrap_or_default();
                            if again.trim().eq_ignore_ascii_case("y") {
                                runner.reset();
                                continue 'tracks;
                            }
                            return Ok(());
                        }
                        print_summary(&runner.summary());
                        open_and_greet(&mut runner).await;
                    }
                    Err(e) => print_notice(&Notice::from(&e)),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_play_with_flags() {
        let cli = Cli::try_parse_from([
            "apiquest", "play", "--track", "python", "--intent", "2", "--methods", "card,upi",
        ])
        .unwrap();
        match cli.command.unwrap() {
            Commands::Play {
                track,
                intent,
                methods,
            } => {
                assert_eq!(track.as_deref(), Some("python"));
                assert_eq!(intent.as_deref(), Some("2"));
                assert_eq!(methods.as_deref(), Some("card,upi"));
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn parses_send_with_method_and_body() {
        let cli = Cli::try_parse_from([
            "apiquest",
            "send",
            "https://api.example.com/pay",
            "-X",
            "POST",
            "--body",
            "{\"amount\":1}",
        ])
        .unwrap();
        assert!(matches!(
            cli.command.unwrap(),
            Commands::Send { ref method, ref headers, .. } if method == "POST" && headers == "{}"
        ));
    }

    #[test]
    fn parses_extract_without_file() {
        let cli = Cli::try_parse_from(["apiquest", "extract"]).unwrap();
        assert!(matches!(cli.command.unwrap(), Commands::Extract { file: None }));
    }

    #[test]
    fn parses_quests_subcommand() {
        let cli = Cli::try_parse_from(["apiquest", "quests", "java"]).unwrap();
        assert!(matches!(cli.command.unwrap(), Commands::Quests { ref track } if track == "java"));
    }

    #[test]
    fn no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["apiquest"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config_root, PathBuf::from("~/.apiquest"));
    }

    #[test]
    fn read_input_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reply.txt");
        std::fs::write(&path, "```json\n{\"ready\":true,\"url\":\"https://x\"}\n```").unwrap();
        let text = read_input(Some(&path)).unwrap();
        assert!(directive::extract(&text).is_some());
    }

    #[test]
    fn workspace_config_builds_catalog() {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config");
        let config = load_config(&root).unwrap();
        let catalog = build_catalog(&config).unwrap();
        assert!(catalog.track("http-basics").is_some());
        assert_eq!(catalog.tracks().len(), 4);
    }
}
