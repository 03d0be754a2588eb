//! Model-server abstraction layer.
//!
//! [`ModelServer`] is the HTTP side of the server (probe, list, pull, chat);
//! the process side (`serve`, `pull` through the executable) lives in
//! [`crate::launcher`].

mod types;
pub mod ollama;

// Re-export common types
pub use types::{
    ChatRequest,
    ChatResponse,
    Message,
    ModelServer,
    OutputMode,
    ProviderError,
    PullProgress,
    Result,
    Role,
    SamplingOptions,
};

pub use ollama::OllamaProvider;
