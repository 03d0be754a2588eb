//! Request orchestration: make sure the model is there, then send.

use super::filter::{self, FilterResult};
use crate::config::OllamaSettings;
use crate::error::{Result, TesterError};
use crate::launcher::Launcher;
use crate::models::{ModelManager, ModelStatus};
use crate::provider::{ChatRequest, ChatResponse, ModelServer};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sends chat requests to the model server.
///
/// # Examples
///
/// ```no_run
/// use ollama_tester_core::chat::{build_request, PromptInputs, RequestEngine};
/// use ollama_tester_core::config::Config;
/// use ollama_tester_core::provider::OutputMode;
///
/// # async fn example() -> Result<(), ollama_tester_core::TesterError> {
/// let config = Config::load_or_default();
/// let engine = RequestEngine::from_settings(&config.ollama_settings);
///
/// let prompts = PromptInputs::user("2+2?");
/// let request = build_request(&prompts, &config.sampling, "llama3", OutputMode::Text)?;
/// let response = engine.run(&request, |status| println!("model: {}", status)).await?;
/// println!("{}", engine.apply_filter(&response, r"(\d+)")?);
/// # Ok(())
/// # }
/// ```
pub struct RequestEngine {
    server: Arc<dyn ModelServer>,
    models: ModelManager,
}

impl RequestEngine {
    pub fn new(
        settings: &OllamaSettings,
        server: Arc<dyn ModelServer>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        let models = ModelManager::new(settings, Arc::clone(&server), launcher);
        Self { server, models }
    }

    /// Engine talking to a real Ollama server and executable.
    pub fn from_settings(settings: &OllamaSettings) -> Self {
        let server = Arc::new(crate::provider::OllamaProvider::new(settings));
        let launcher = Arc::new(crate::launcher::OllamaLauncher::new(settings.executable.clone()));
        Self::new(settings, server, launcher)
    }

    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    /// Ensures the request's model is installed, then sends the request.
    pub async fn run(
        &self,
        request: &ChatRequest,
        on_status: impl FnMut(ModelStatus) + Send,
    ) -> Result<ChatResponse> {
        self.models.ensure_model_exists(&request.model, on_status).await?;
        self.send(request).await
    }

    /// Dispatches `request` to the chat endpoint.
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        info!(model = %request.model, messages = request.messages.len(), "Sending chat request");
        debug!(options = ?request.options, "Sampling options");

        let payload = self.server.chat(request).await.map_err(|e| {
            warn!(error = %e, "Chat request failed");
            TesterError::RequestFailed(e.to_string())
        })?;

        ChatResponse::from_payload(payload, request.output)
            .map_err(|e| TesterError::RequestFailed(e.to_string()))
    }

    /// Filters the response text with `pattern`.
    pub fn apply_filter(&self, response: &ChatResponse, pattern: &str) -> Result<FilterResult> {
        filter::apply_filter(&response.text, pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{build_request, PromptInputs};
    use crate::config::SamplingInputs;
    use crate::launcher::Result as LaunchResult;
    use crate::provider::{OutputMode, ProviderError, PullProgress, Result as ProviderResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedServer {
        reply: Mutex<Option<ProviderResult<serde_json::Value>>>,
        chats: AtomicUsize,
        last_request: Mutex<Option<ChatRequest>>,
    }

    impl ScriptedServer {
        fn replying(reply: ProviderResult<serde_json::Value>) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
                chats: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ModelServer for ScriptedServer {
        async fn probe(&self) -> bool {
            true
        }

        async fn list_models(&self) -> ProviderResult<Vec<String>> {
            Ok(vec!["llama3:latest".to_string()])
        }

        async fn pull<'a>(
            &'a self,
            _model: &str,
            _progress: Box<dyn FnMut(PullProgress) + Send + 'a>,
        ) -> ProviderResult<()> {
            Ok(())
        }

        async fn chat(&self, request: &ChatRequest) -> ProviderResult<serde_json::Value> {
            self.chats.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            self.reply.lock().unwrap().take().unwrap_or(Ok(serde_json::Value::Null))
        }
    }

    #[derive(Default)]
    struct NoopLauncher {
        pulls: AtomicUsize,
    }

    #[async_trait]
    impl Launcher for NoopLauncher {
        fn spawn_serve(&self) -> LaunchResult<()> {
            Ok(())
        }

        async fn pull(&self, _model: &str) -> LaunchResult<()> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn engine(server: Arc<ScriptedServer>, launcher: Arc<NoopLauncher>) -> RequestEngine {
        RequestEngine::new(&OllamaSettings::default(), server, launcher)
    }

    fn request(model: &str, output: OutputMode) -> ChatRequest {
        let prompts = PromptInputs::user("2+2?");
        build_request(&prompts, &SamplingInputs::default(), model, output).unwrap()
    }

    #[tokio::test]
    async fn test_run_text_mode() {
        let server = Arc::new(ScriptedServer::replying(Ok(json!({
            "model": "llama3",
            "message": {"role": "assistant", "content": "The answer is 4"},
            "done": true
        }))));
        let engine = engine(server.clone(), Arc::new(NoopLauncher::default()));

        let response = engine.run(&request("llama3", OutputMode::Text), |_| {}).await.unwrap();
        assert_eq!(response.text, "The answer is 4");
        assert!(response.payload.is_none());

        let sent = server.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.options.num_predict, -1);
    }

    #[tokio::test]
    async fn test_run_json_mode() {
        let payload = json!({"message": {"role": "assistant", "content": "4"}, "eval_count": 3});
        let server = Arc::new(ScriptedServer::replying(Ok(payload.clone())));
        let engine = engine(server, Arc::new(NoopLauncher::default()));

        let response = engine.run(&request("llama3", OutputMode::Json), |_| {}).await.unwrap();
        assert_eq!(response.payload, Some(payload));
        assert!(response.text.contains("\"eval_count\": 3"));
    }

    #[tokio::test]
    async fn test_run_pulls_missing_model() {
        let server = Arc::new(ScriptedServer::replying(Ok(json!({"message": {"content": "hi"}}))));
        let launcher = Arc::new(NoopLauncher::default());
        let engine = engine(server, launcher.clone());

        let mut statuses = Vec::new();
        engine.run(&request("mistral", OutputMode::Text), |s| statuses.push(s)).await.unwrap();

        assert_eq!(launcher.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(statuses.last(), Some(&ModelStatus::Ready));
    }

    #[tokio::test]
    async fn test_transport_error_is_request_failed() {
        let reply = Err(ProviderError::Api("model crashed".to_string()));
        let server = Arc::new(ScriptedServer::replying(reply));
        let engine = engine(server, Arc::new(NoopLauncher::default()));

        let err = engine.send(&request("llama3", OutputMode::Text)).await.unwrap_err();
        assert_eq!(err, TesterError::RequestFailed("API error: model crashed".to_string()));
    }

    #[tokio::test]
    async fn test_reply_without_content_is_request_failed() {
        let server = Arc::new(ScriptedServer::replying(Ok(json!({"done": true}))));
        let engine = engine(server, Arc::new(NoopLauncher::default()));

        let err = engine.send(&request("llama3", OutputMode::Text)).await.unwrap_err();
        assert!(matches!(err, TesterError::RequestFailed(_)));
    }

    #[tokio::test]
    async fn test_filter_over_response() {
        let reply = Ok(json!({"message": {"content": "1-2\n3-4"}}));
        let server = Arc::new(ScriptedServer::replying(reply));
        let engine = engine(server, Arc::new(NoopLauncher::default()));

        let response = engine.send(&request("llama3", OutputMode::Text)).await.unwrap();
        let filtered = engine.apply_filter(&response, r"(\d+)-(\d+)").unwrap();
        assert_eq!(filtered.to_string(), "1 | 2\n3 | 4");
    }
}
