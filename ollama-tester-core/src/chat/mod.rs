//! Chat request construction, dispatch and response filtering.

mod builder;
mod engine;
pub mod filter;

pub use builder::{build_request, parse_sampling, parse_seed, PromptInputs, INSTALL_NEW_PLACEHOLDER};
pub use engine::RequestEngine;
pub use filter::{apply_filter, FilterResult};
