//! Bring-up of the model server: probe, spawn, poll.

use crate::config::OllamaSettings;
use crate::launcher::Launcher;
use crate::provider::ModelServer;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Liveness of the connection to the model server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Unknown,
    Down,
    Starting,
    Ready,
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unknown => "unknown",
            ConnectionState::Down => "down",
            ConnectionState::Starting => "starting",
            ConnectionState::Ready => "ready",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Keeps the model server reachable.
///
/// `ensure_running` probes first and only spawns `serve` when the probe
/// fails, then polls every `interval` up to `attempts` times. The spawned
/// process is never stopped, even when the wait runs out.
pub struct ServerManager {
    server: Arc<dyn ModelServer>,
    launcher: Arc<dyn Launcher>,
    attempts: u32,
    interval: Duration,
    state: Mutex<ConnectionState>,
}

impl ServerManager {
    pub fn new(
        settings: &OllamaSettings,
        server: Arc<dyn ModelServer>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            server,
            launcher,
            attempts: settings.startup_attempts,
            interval: settings.startup_interval(),
            state: Mutex::new(ConnectionState::Unknown),
        }
    }

    /// Overrides the bring-up wait loop.
    pub fn with_startup(mut self, attempts: u32, interval: Duration) -> Self {
        self.attempts = attempts;
        self.interval = interval;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Short-timeout status probe. Never fails.
    pub async fn is_reachable(&self) -> bool {
        self.server.probe().await
    }

    /// Makes sure the server answers, starting it if needed.
    ///
    /// `on_state` sees every transition in order. Returns `true` as soon as a
    /// probe succeeds and `false` once the spawn fails or the attempts run out.
    pub async fn ensure_running(&self, mut on_state: impl FnMut(ConnectionState) + Send) -> bool {
        if self.is_reachable().await {
            self.transition(ConnectionState::Ready, &mut on_state);
            return true;
        }

        self.transition(ConnectionState::Down, &mut on_state);

        if let Err(e) = self.launcher.spawn_serve() {
            warn!(error = %e, "Could not start model server");
            self.transition(ConnectionState::Error, &mut on_state);
            return false;
        }

        self.transition(ConnectionState::Starting, &mut on_state);

        for attempt in 1..=self.attempts {
            if self.is_reachable().await {
                info!(attempt, "Model server is up");
                self.transition(ConnectionState::Ready, &mut on_state);
                return true;
            }
            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        warn!(attempts = self.attempts, "Model server did not come up");
        self.transition(ConnectionState::Error, &mut on_state);
        false
    }

    fn transition(&self, next: ConnectionState, on_state: &mut impl FnMut(ConnectionState)) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
        on_state(next);
    }
}
