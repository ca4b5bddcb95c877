use std::{collections::HashSet, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use apiquest_provider::{AssistantConfig, AssistantKind};
use apiquest_schema::Track;
use serde::{Deserialize, Serialize};

use crate::harness::HarnessConfig;
use crate::session::SessionOptions;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub name: String,
    pub env: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "apiquest".to_string(),
            env: "dev".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MainConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub harness: HarnessConfig,
    #[serde(default)]
    pub session: SessionOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuestConfig {
    pub main: MainConfig,
    /// Extra tracks from `quests.d/`, merged over the built-in catalog.
    #[serde(default)]
    pub tracks: Vec<Track>,
}

pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

/// Load `main.yaml` and `quests.d/*.yaml` from `root`. Both are optional.
pub fn load_config(root: &Path) -> Result<QuestConfig> {
    let main_path = root.join("main.yaml");
    let mut main: MainConfig = if main_path.exists() {
        read_yaml_file(&main_path)?
    } else {
        tracing::debug!("no main.yaml under {}, using defaults", root.display());
        MainConfig::default()
    };

    let quests_dir = root.join("quests.d");
    let mut tracks = if quests_dir.is_dir() {
        read_yaml_dir::<Track>(&quests_dir)?
    } else {
        Vec::new()
    };

    resolve_main_env(&mut main);
    resolve_tracks_env(&mut tracks);

    let config = QuestConfig { main, tracks };
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &QuestConfig) -> Result<()> {
    let assistant = &config.main.assistant;
    if assistant.kind == AssistantKind::Http
        && assistant
            .base_url
            .as_deref()
            .map_or(true, |u| u.trim().is_empty())
    {
        return Err(anyhow!("assistant.kind is http but assistant.base_url is not set"));
    }
    if assistant.timeout_secs == 0 {
        return Err(anyhow!("assistant.timeout_secs must be greater than zero"));
    }
    if config.main.harness.timeout_secs == 0 {
        return Err(anyhow!("harness.timeout_secs must be greater than zero"));
    }

    let mut seen = HashSet::new();
    for track in &config.tracks {
        if !seen.insert(track.id.as_str()) {
            return Err(anyhow!("duplicate track id: {}", track.id));
        }
        if track.quests.is_empty() {
            return Err(anyhow!("track {} has no quests", track.id));
        }

        let mut quest_ids = HashSet::new();
        for quest in &track.quests {
            if !quest_ids.insert(quest.id.as_str()) {
                return Err(anyhow!("duplicate quest id in track {}: {}", track.id, quest.id));
            }
            if quest.xp_reward == 0 {
                return Err(anyhow!("quest {} must award positive xp", quest.id));
            }
        }
        if track.checked_total_xp().is_none() {
            return Err(anyhow!("track {} total xp overflows u32", track.id));
        }
    }

    Ok(())
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

fn read_yaml_dir<T>(dir: &Path) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to read config dir: {}", dir.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read dir entry: {}", dir.display()))?;
        let path = entry.path();
        if matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml" | "yml")
        ) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        items.push(read_yaml_file::<T>(&path)?);
    }
    Ok(items)
}

fn resolve_opt(value: &mut Option<String>) {
    if let Some(v) = value {
        *v = resolve_env_var(v);
    }
}

fn resolve_main_env(main: &mut MainConfig) {
    main.app.name = resolve_env_var(&main.app.name);
    main.app.env = resolve_env_var(&main.app.env);
    resolve_opt(&mut main.assistant.base_url);
    resolve_opt(&mut main.assistant.api_key);
    if main.assistant.api_key.as_deref() == Some("") {
        main.assistant.api_key = None;
    }
    main.harness.user_agent = resolve_env_var(&main.harness.user_agent);
}

fn resolve_tracks_env(tracks: &mut [Track]) {
    for track in tracks {
        for quest in &mut track.quests {
            if let Some(validation) = &mut quest.validation {
                validation.endpoint = resolve_env_var(&validation.endpoint);
                for value in validation.headers.values_mut() {
                    *value = resolve_env_var(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn fixture_config_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config")
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const TRACK_YAML: &str = r#"
id: go
name: Go
level: Intermediate
quests:
  - id: go-setup
    title: Setup
    objective: Install the module
    difficulty: Easy
    xp_reward: 50
    language: Go
    code_snippet: "package main"
    expected_output: ok
    validation:
      endpoint: "${APIQUEST_TEST_ENDPOINT_BASE}/health"
      method: GET
"#;

    #[test]
    fn load_config_from_workspace_fixtures() {
        let config = load_config(&fixture_config_root()).unwrap();
        assert_eq!(config.main.app.name, "apiquest");
        assert_eq!(config.main.assistant.kind, AssistantKind::Scripted);
        assert!(config.main.session.forward_outcomes);
        assert_eq!(config.tracks.len(), 1);
        assert_eq!(config.tracks[0].id, "http-basics");
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config, QuestConfig::default());
        assert_eq!(config.main.harness.timeout_secs, 30);
    }

    #[test]
    fn loads_main_and_extra_tracks() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("APIQUEST_TEST_ENDPOINT_BASE", "https://sandbox.example.com");
        write(
            dir.path(),
            "main.yaml",
            "app:\n  name: quest\n  env: test\nassistant:\n  kind: http\n  base_url: http://localhost:9000\nharness:\n  timeout_secs: 5\nsession:\n  forward_outcomes: true\n",
        );
        write(dir.path(), "quests.d/go.yaml", TRACK_YAML);
        write(dir.path(), "quests.d/notes.txt", "ignored");

        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.main.assistant.kind, AssistantKind::Http);
        assert_eq!(config.main.harness.timeout_secs, 5);
        assert!(config.main.session.forward_outcomes);
        assert_eq!(config.tracks.len(), 1);
        let validation = config.tracks[0].quests[0].validation.as_ref().unwrap();
        assert_eq!(validation.endpoint, "https://sandbox.example.com/health");
    }

    #[test]
    fn invalid_yaml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.yaml", "assistant: [unclosed");
        let err = load_config(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("main.yaml"));
    }

    #[test]
    fn validate_config_rejects_http_without_base_url() {
        let mut config = QuestConfig::default();
        config.main.assistant.kind = AssistantKind::Http;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn validate_config_rejects_zero_timeout() {
        let mut config = QuestConfig::default();
        config.main.harness.timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn validate_config_rejects_bad_tracks() {
        let track: Track = serde_yaml::from_str(TRACK_YAML).unwrap();

        let mut config = QuestConfig {
            tracks: vec![track.clone(), track.clone()],
            ..Default::default()
        };
        assert!(validate_config(&config)
            .unwrap_err()
            .to_string()
            .contains("duplicate track id"));

        let mut empty = track.clone();
        empty.quests.clear();
        config.tracks = vec![empty];
        assert!(validate_config(&config)
            .unwrap_err()
            .to_string()
            .contains("no quests"));

        let mut zero = track.clone();
        zero.quests[0].xp_reward = 0;
        config.tracks = vec![zero];
        assert!(validate_config(&config).is_err());

        let mut dup = track;
        dup.quests.push(dup.quests[0].clone());
        config.tracks = vec![dup];
        assert!(validate_config(&config)
            .unwrap_err()
            .to_string()
            .contains("duplicate quest id"));
    }

    #[test]
    fn validate_config_rejects_overflowing_track_xp() {
        let mut track: Track = serde_yaml::from_str(TRACK_YAML).unwrap();
        track.quests[0].xp_reward = u32::MAX;
        let mut second = track.quests[0].clone();
        second.id = "go-second".into();
        second.xp_reward = 1;
        track.quests.push(second);

        let config = QuestConfig {
            tracks: vec![track],
            ..Default::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn resolve_env_var_unclosed_bracket() {
        assert_eq!(resolve_env_var("prefix_${UNCLOSED"), "prefix_${UNCLOSED");
    }

    #[test]
    fn resolve_env_var_missing_env_returns_empty() {
        assert_eq!(resolve_env_var("val=${APIQUEST_NONEXISTENT_VAR_XYZ}"), "val=");
    }

    #[test]
    fn resolve_env_var_returns_raw_when_not_placeholder() {
        assert_eq!(resolve_env_var("plain-value"), "plain-value");
    }
}
