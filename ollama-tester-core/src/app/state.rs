use crate::error::TesterError;
use crate::models::ModelStatus;
use crate::provider::ChatResponse;
use crate::server_manager::ConnectionState;

/// Messages sent from worker tasks to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Connection(ConnectionState),
    ModelsLoaded(Vec<String>),
    ModelStatus(ModelStatus),
    ResponseReady(ChatResponse),
    Failed(TesterError),
    /// The in-flight request is over, whatever its outcome.
    Idle,
}

/// Everything the presentation layer shows.
///
/// Only the controller mutates it, by applying [`AppEvent`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub connection: ConnectionState,
    pub models: Vec<String>,
    pub selected_model: String,
    pub model_status: Option<ModelStatus>,
    pub response: Option<ChatResponse>,
    pub filter_output: Option<String>,
    pub last_error: Option<String>,
    pub busy: bool,
}

impl AppState {
    pub fn with_model(model: impl Into<String>) -> Self {
        Self {
            selected_model: model.into(),
            ..Self::default()
        }
    }

    /// Text of the last response, empty when there is none.
    pub fn response_text(&self) -> &str {
        self.response.as_ref().map_or("", |r| r.text.as_str())
    }

    pub fn apply(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Connection(state) => self.connection = *state,
            AppEvent::ModelsLoaded(models) => {
                self.models = models.clone();
                if self.selected_model.is_empty() {
                    if let Some(first) = models.first() {
                        self.selected_model = first.clone();
                    }
                }
            }
            AppEvent::ModelStatus(status) => self.model_status = Some(status.clone()),
            AppEvent::ResponseReady(response) => {
                self.response = Some(response.clone());
                self.filter_output = None;
                self.last_error = None;
            }
            // The previous response stays as it was.
            AppEvent::Failed(error) => self.last_error = Some(error.to_string()),
            AppEvent::Idle => self.busy = false,
        }
    }
}
