//! ollama-tester-core - Prompt testing against a local Ollama server
//!
//! Provides the pieces behind the tester:
//! - Server lifecycle (probe, `ollama serve`, bounded wait)
//! - Installed-model checks and on-demand pulls
//! - Chat request construction and dispatch
//! - Regex filtering of responses
//! - Application state driven by worker events
//!
//! ## Primary API
//!
//! Presentation layers should drive everything through [`Controller`].

// Public modules
pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod launcher;
pub mod models;
pub mod provider;
pub mod server_manager;

// Public exports
pub use app::{AppEvent, AppState, Controller};
pub use chat::{apply_filter, build_request, FilterResult, PromptInputs, RequestEngine};
pub use config::{Config, OllamaSettings, PromptSettings, PullStrategy, SamplingInputs};
pub use error::TesterError;
pub use launcher::{LaunchError, Launcher, OllamaLauncher};
pub use models::{ModelManager, ModelStatus};
pub use server_manager::{ConnectionState, ServerManager};

// Provider exports
pub use provider::{
    ChatRequest, ChatResponse, Message, ModelServer, OllamaProvider, OutputMode, ProviderError,
    PullProgress, Role, SamplingOptions,
};
