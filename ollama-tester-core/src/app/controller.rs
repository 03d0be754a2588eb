//! Owner of the application state.
//!
//! Worker tasks never touch [`AppState`]; they send [`AppEvent`]s over an
//! unbounded channel and the main loop applies them with [`Controller::drain`]
//! or [`Controller::next_event`].

use super::state::{AppEvent, AppState};
use crate::chat::{build_request, FilterResult, PromptInputs, RequestEngine};
use crate::config::{Config, SamplingInputs};
use crate::error::{Result, TesterError};
use crate::launcher::{Launcher, OllamaLauncher};
use crate::models::ModelStatus;
use crate::provider::{ModelServer, OllamaProvider, OutputMode};
use crate::server_manager::ServerManager;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

pub type EventSender = mpsc::UnboundedSender<AppEvent>;

/// Sends [`AppEvent::Idle`] when dropped, so `busy` is cleared on every exit path.
struct IdleGuard(EventSender);

impl Drop for IdleGuard {
    fn drop(&mut self) {
        let _ = self.0.send(AppEvent::Idle);
    }
}

fn forward_status(sender: EventSender) -> impl FnMut(ModelStatus) + Send {
    move |status| {
        let _ = sender.send(AppEvent::ModelStatus(status));
    }
}

pub struct Controller {
    config: Config,
    server_manager: Arc<ServerManager>,
    engine: Arc<RequestEngine>,
    state: AppState,
    sender: EventSender,
    receiver: mpsc::UnboundedReceiver<AppEvent>,
}

impl Controller {
    pub fn new(config: Config, server: Arc<dyn ModelServer>, launcher: Arc<dyn Launcher>) -> Self {
        let settings = &config.ollama_settings;
        let server_manager = Arc::new(ServerManager::new(
            settings,
            Arc::clone(&server),
            Arc::clone(&launcher),
        ));
        let engine = Arc::new(RequestEngine::new(settings, server, launcher));
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = AppState::with_model(settings.model.trim());

        Self {
            config,
            server_manager,
            engine,
            state,
            sender,
            receiver,
        }
    }

    /// Controller wired to the Ollama HTTP API and executable named in `config`.
    pub fn from_config(config: Config) -> Self {
        let server = Arc::new(OllamaProvider::new(&config.ollama_settings));
        let launcher = Arc::new(OllamaLauncher::new(config.ollama_settings.executable.clone()));
        Self::new(config, server, launcher)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn select_model(&mut self, model: impl Into<String>) {
        self.state.selected_model = model.into();
    }

    /// Probes the server and starts it if needed.
    pub fn start_connection(&self) -> JoinHandle<()> {
        let manager = Arc::clone(&self.server_manager);
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let states = sender.clone();
            let ready = manager
                .ensure_running(move |state| {
                    let _ = states.send(AppEvent::Connection(state));
                })
                .await;

            if !ready {
                let _ = sender.send(AppEvent::Failed(TesterError::ConnectionUnavailable {
                    attempts: manager.attempts(),
                }));
            }
        })
    }

    /// Reloads the installed model list.
    pub fn refresh_models(&self) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let sender = self.sender.clone();

        tokio::spawn(async move {
            let models = engine
                .models()
                .list_installed_models(forward_status(sender.clone()))
                .await;
            let _ = sender.send(AppEvent::ModelsLoaded(models));
        })
    }

    /// Installs `model` and reloads the model list afterwards.
    pub fn install_model(&self, model: impl Into<String>) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let sender = self.sender.clone();
        let model = model.into();

        tokio::spawn(async move {
            let models = engine.models();
            let result = match models.install_model(&model, forward_status(sender.clone())).await {
                Ok(()) => models.installed_models(forward_status(sender.clone())).await,
                Err(e) => Err(e),
            };

            // A failed reload leaves the previous model list in place.
            let event = match result {
                Ok(models) => AppEvent::ModelsLoaded(models),
                Err(e) => AppEvent::Failed(e),
            };
            let _ = sender.send(event);
        })
    }

    /// Validates the inputs and starts a chat request for the selected model.
    ///
    /// Validation errors are returned right away and nothing is sent. While a
    /// request is in flight further submits fail with `RequestInFlight`.
    pub fn submit(
        &mut self,
        prompts: &PromptInputs,
        sampling: &SamplingInputs,
        output: OutputMode,
    ) -> Result<JoinHandle<()>> {
        if self.state.busy {
            return Err(TesterError::RequestInFlight);
        }

        let request = build_request(prompts, sampling, &self.state.selected_model, output)?;

        self.state.busy = true;
        self.state.last_error = None;

        let engine = Arc::clone(&self.engine);
        let sender = self.sender.clone();
        let guard = IdleGuard(sender.clone());

        Ok(tokio::spawn(async move {
            let _guard = guard;
            let result = engine.run(&request, forward_status(sender.clone())).await;

            let event = match result {
                Ok(response) => AppEvent::ResponseReady(response),
                Err(e) => AppEvent::Failed(e),
            };
            let _ = sender.send(event);
        }))
    }

    /// Filters the current response and records the outcome for display.
    pub fn apply_filter(&mut self, pattern: &str) -> Result<FilterResult> {
        let result = crate::chat::apply_filter(self.state.response_text(), pattern);
        self.state.filter_output = Some(match &result {
            Ok(filtered) => filtered.to_string(),
            Err(e) => e.to_string(),
        });
        result
    }

    /// Clears response, filter output and error.
    pub fn clear(&mut self) {
        self.state.response = None;
        self.state.filter_output = None;
        self.state.last_error = None;
    }

    /// Applies every pending event without waiting. Returns how many were applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.receiver.try_recv() {
            self.apply(&event);
            applied += 1;
        }
        applied
    }

    /// Waits for the next event and applies it.
    ///
    /// The controller keeps a sender of its own, so the channel never closes
    /// and there is always another event to wait for.
    pub async fn next_event(&mut self) -> AppEvent {
        let Some(event) = self.receiver.recv().await else {
            unreachable!("event channel closed while the controller holds a sender");
        };
        self.apply(&event);
        event
    }

    fn apply(&mut self, event: &AppEvent) {
        debug!(?event, "Applying event");
        self.state.apply(event);
    }
}
