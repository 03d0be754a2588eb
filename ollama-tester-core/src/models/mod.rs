//! Installed-model checks and on-demand installs.

mod manager;

pub use manager::{is_installed, ModelManager, ModelStatus};
