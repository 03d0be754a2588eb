use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings document for the tester.
///
/// Loaded once at startup and handed to the lifecycle manager, the model
/// manager and the request engine. Every section and key is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ollama_settings: OllamaSettings,
    pub prompt_settings: PromptSettings,
    pub sampling: SamplingInputs,
}

/// How a missing model gets installed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullStrategy {
    /// Run `<executable> pull <model>` and wait for it to exit.
    #[default]
    Cli,
    /// Use the server's `/api/pull` endpoint and stream progress.
    Api,
}

/// Connection and bring-up settings for the model server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    /// Default model identifier. Empty means "pick the first installed one".
    pub model: String,
    pub base_url: String,
    /// Executable used for `serve` and `pull`.
    pub executable: String,
    pub pull_strategy: PullStrategy,
    pub startup_attempts: u32,
    pub startup_interval_ms: u64,
    pub probe_timeout_ms: u64,
}

impl OllamaSettings {
    pub fn startup_interval(&self) -> Duration {
        Duration::from_millis(self.startup_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for OllamaSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            base_url: "http://localhost:11434".to_string(),
            executable: "ollama".to_string(),
            pull_strategy: PullStrategy::default(),
            startup_attempts: 10,
            startup_interval_ms: 1000,
            probe_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Filter applied to responses when none is given explicitly.
    pub regex_pattern: String,
    pub system_prompt: String,
}

/// Free-text sampling fields, as typed by the user.
///
/// The `sampling` section of the settings document provides their initial
/// values; coercion to numbers happens when the request is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingInputs {
    #[serde(deserialize_with = "text_or_number")]
    pub temperature: String,
    #[serde(deserialize_with = "text_or_number")]
    pub top_p: String,
    #[serde(deserialize_with = "text_or_number")]
    pub top_k: String,
    #[serde(deserialize_with = "text_or_number")]
    pub repeat_penalty: String,
    #[serde(deserialize_with = "text_or_number")]
    pub seed: String,
    #[serde(deserialize_with = "text_or_number")]
    pub num_predict: String,
}

/// Accepts `temperature: 0.2` as well as `temperature: "0.2"`.
fn text_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrNumber {
        Int(i64),
        Float(f64),
        Text(String),
        Null(()),
    }

    Ok(match TextOrNumber::deserialize(deserializer)? {
        TextOrNumber::Int(value) => value.to_string(),
        TextOrNumber::Float(value) => value.to_string(),
        TextOrNumber::Text(value) => value,
        TextOrNumber::Null(()) => String::new(),
    })
}

impl Default for SamplingInputs {
    fn default() -> Self {
        Self {
            temperature: "0.9".to_string(),
            top_p: "0.9".to_string(),
            top_k: "40".to_string(),
            repeat_penalty: "1.1".to_string(),
            seed: String::new(),
            num_predict: "-1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text. An empty document yields the defaults.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load configuration from `config.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Self {
        Self::load("config.yaml").unwrap_or_default()
    }
}
