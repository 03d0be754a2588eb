//! Application state and the controller that owns it.

mod controller;
mod state;

pub use controller::{Controller, EventSender};
pub use state::{AppEvent, AppState};
