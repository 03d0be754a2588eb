use crate::config::SamplingInputs;
use crate::error::{Result, TesterError};
use crate::provider::{ChatRequest, Message, OutputMode, SamplingOptions};

/// Placeholder entry of a model picker; never a real model.
pub const INSTALL_NEW_PLACEHOLDER: &str = "Install new...";

/// Role-tagged prompt texts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptInputs {
    pub system: String,
    pub assistant: String,
    pub user: String,
}

impl PromptInputs {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            user: text.into(),
            ..Self::default()
        }
    }
}

/// Builds a chat request from the prompt texts and the free-text sampling fields.
///
/// Texts are trimmed and empty ones dropped; the user text is mandatory.
/// Messages go out in system, assistant, user order.
pub fn build_request(
    prompts: &PromptInputs,
    sampling: &SamplingInputs,
    model: &str,
    output: OutputMode,
) -> Result<ChatRequest> {
    let user = prompts.user.trim();
    if user.is_empty() {
        return Err(TesterError::EmptyUserPrompt);
    }

    let model = model.trim();
    if model.is_empty() || model == INSTALL_NEW_PLACEHOLDER {
        return Err(TesterError::NoModelSelected);
    }

    let mut messages = Vec::with_capacity(3);
    let system = prompts.system.trim();
    if !system.is_empty() {
        messages.push(Message::system(system));
    }
    let assistant = prompts.assistant.trim();
    if !assistant.is_empty() {
        messages.push(Message::assistant(assistant));
    }
    messages.push(Message::user(user));

    Ok(ChatRequest::new(model, messages)
        .with_options(parse_sampling(sampling)?)
        .with_output(output))
}

/// Coerces the sampling fields to their numeric types.
pub fn parse_sampling(sampling: &SamplingInputs) -> Result<SamplingOptions> {
    Ok(SamplingOptions {
        temperature: parse_float("temperature", &sampling.temperature)?,
        top_p: parse_float("top_p", &sampling.top_p)?,
        top_k: parse_int("top_k", &sampling.top_k)?,
        repeat_penalty: parse_float("repeat_penalty", &sampling.repeat_penalty)?,
        num_predict: parse_int("num_predict", &sampling.num_predict)?,
        seed: parse_seed(&sampling.seed),
    })
}

/// Only plain digits set a seed; anything else leaves it unset.
pub fn parse_seed(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn parse_float(name: &'static str, text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| invalid(name, text))
}

// Integer fields also take "40.0" and drop the fraction.
fn parse_int(name: &'static str, text: &str) -> Result<i64> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && value.abs() < i64::MAX as f64)
        .map(|value| value.trunc() as i64)
        .ok_or_else(|| invalid(name, text))
}

fn invalid(name: &'static str, text: &str) -> TesterError {
    TesterError::InvalidOption {
        name,
        value: text.to_string(),
    }
}
