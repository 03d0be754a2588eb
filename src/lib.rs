//! ollama-tester - Send prompts to a local Ollama server and filter the answers
//!
//! Convenience wrapper crate that re-exports `ollama-tester-core`.
//!
//! # Quick Start
//!
//! ```no_run
//! use ollama_tester::{Config, Controller, OutputMode, PromptInputs};
//!
//! # async fn example() -> Result<(), ollama_tester::TesterError> {
//! let config = Config::load_or_default();
//! let sampling = config.sampling.clone();
//! let mut controller = Controller::from_config(config);
//!
//! let _ = controller.start_connection().await;
//! controller.drain();
//! controller.submit(&PromptInputs::user("Name three primes"), &sampling, OutputMode::Text)?;
//! while controller.state().busy {
//!     controller.next_event().await;
//! }
//! println!("{}", controller.state().response_text());
//! # Ok(())
//! # }
//! ```

// Re-export core
pub use ollama_tester_core::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use ollama_tester_core::{
        apply_filter, build_request, AppEvent, AppState, Config, Controller, FilterResult,
        OutputMode, PromptInputs, TesterError,
    };
}
