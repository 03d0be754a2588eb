//! Errors surfaced to the presentation layer.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TesterError {
    #[error("Model server did not start after {attempts} attempts")]
    ConnectionUnavailable { attempts: u32 },

    #[error("Could not get the models: {0}")]
    ModelListFailed(String),

    #[error("Failed to install model '{model}': {detail}")]
    ModelPullFailed { model: String, detail: String },

    #[error("User prompt is required")]
    EmptyUserPrompt,

    #[error("Invalid value for {name}: '{value}'")]
    InvalidOption { name: &'static str, value: String },

    #[error("Please select a valid model")]
    NoModelSelected,

    #[error("Failed to get response: {0}")]
    RequestFailed(String),

    #[error("[Invalid regular expression]: {0}")]
    InvalidPattern(String),

    #[error("A request is already in progress")]
    RequestInFlight,
}

pub type Result<T> = std::result::Result<T, TesterError>;
