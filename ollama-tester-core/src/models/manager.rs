use crate::config::{OllamaSettings, PullStrategy};
use crate::error::{Result, TesterError};
use crate::launcher::Launcher;
use crate::provider::{ModelServer, PullProgress};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Progress of a model check or install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelStatus {
    Connecting,
    Pulling,
    Downloading { completed: u64, total: u64 },
    Ready,
    Error(String),
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelStatus::Connecting => f.write_str("connecting"),
            ModelStatus::Pulling => f.write_str("pulling"),
            ModelStatus::Downloading { completed, total } => {
                let percent = if *total == 0 { 0 } else { completed * 100 / total };
                write!(f, "downloading {}%", percent)
            }
            ModelStatus::Ready => f.write_str("ready"),
            ModelStatus::Error(detail) => write!(f, "error: {}", detail),
        }
    }
}

impl From<&PullProgress> for ModelStatus {
    fn from(event: &PullProgress) -> Self {
        match (event.completed, event.total) {
            (Some(completed), Some(total)) => ModelStatus::Downloading { completed, total },
            _ => ModelStatus::Pulling,
        }
    }
}

/// True when `model` names an entry of `installed`, allowing the implicit `:latest` tag.
pub fn is_installed(installed: &[String], model: &str) -> bool {
    installed.iter().any(|name| {
        name == model
            || (!model.contains(':') && name.strip_suffix(":latest") == Some(model))
            || model.strip_suffix(":latest") == Some(name.as_str())
    })
}

/// Lists installed models and installs missing ones.
pub struct ModelManager {
    server: Arc<dyn ModelServer>,
    launcher: Arc<dyn Launcher>,
    strategy: PullStrategy,
}

impl ModelManager {
    pub fn new(
        settings: &OllamaSettings,
        server: Arc<dyn ModelServer>,
        launcher: Arc<dyn Launcher>,
    ) -> Self {
        Self {
            server,
            launcher,
            strategy: settings.pull_strategy,
        }
    }

    pub fn with_strategy(mut self, strategy: PullStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Installed model identifiers. Failures are reported through `on_status`
    /// and yield an empty list.
    pub async fn list_installed_models(
        &self,
        on_status: impl FnMut(ModelStatus) + Send,
    ) -> Vec<String> {
        self.installed_models(on_status).await.unwrap_or_default()
    }

    /// Like [`list_installed_models`](Self::list_installed_models), but hands
    /// the failure back as `ModelListFailed`.
    pub async fn installed_models(
        &self,
        mut on_status: impl FnMut(ModelStatus) + Send,
    ) -> Result<Vec<String>> {
        self.server.list_models().await.map_err(|e| {
            warn!(error = %e, "Could not list installed models");
            let error = TesterError::ModelListFailed(e.to_string());
            on_status(ModelStatus::Error(error.to_string()));
            error
        })
    }

    /// Pulls `model` unless it is already installed.
    pub async fn ensure_model_exists(
        &self,
        model: &str,
        mut on_status: impl FnMut(ModelStatus) + Send,
    ) -> Result<()> {
        on_status(ModelStatus::Connecting);

        let installed = self
            .installed_models(&mut on_status)
            .await
            .map_err(|e| TesterError::ModelPullFailed {
                model: model.to_string(),
                detail: e.to_string(),
            })?;

        if is_installed(&installed, model) {
            on_status(ModelStatus::Ready);
            return Ok(());
        }

        info!(model, "Model not installed, pulling");
        self.install_model(model, on_status).await
    }

    /// Pulls `model` unconditionally.
    pub async fn install_model(
        &self,
        model: &str,
        mut on_status: impl FnMut(ModelStatus) + Send,
    ) -> Result<()> {
        on_status(ModelStatus::Pulling);

        let outcome = match self.strategy {
            PullStrategy::Cli => self.launcher.pull(model).await.map_err(|e| e.to_string()),
            PullStrategy::Api => self
                .server
                .pull(model, Box::new(|event: PullProgress| on_status(ModelStatus::from(&event))))
                .await
                .map_err(|e| e.to_string()),
        };

        match outcome {
            Ok(()) => {
                info!(model, "Model installed");
                on_status(ModelStatus::Ready);
                Ok(())
            }
            Err(detail) => {
                warn!(model, error = %detail, "Model install failed");
                on_status(ModelStatus::Error(detail.clone()));
                Err(TesterError::ModelPullFailed {
                    model: model.to_string(),
                    detail,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{LaunchError, Result as LaunchResult};
    use crate::provider::{ChatRequest, ProviderError, Result as ProviderResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeServer {
        models: Option<Vec<String>>,
        api_pulls: AtomicUsize,
    }

    impl FakeServer {
        fn with_models(models: &[&str]) -> Self {
            Self {
                models: Some(models.iter().map(|m| m.to_string()).collect()),
                api_pulls: AtomicUsize::new(0),
            }
        }

        fn unreachable() -> Self {
            Self {
                models: None,
                api_pulls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelServer for FakeServer {
        async fn probe(&self) -> bool {
            self.models.is_some()
        }

        async fn list_models(&self) -> ProviderResult<Vec<String>> {
            self.models
                .clone()
                .ok_or_else(|| ProviderError::Api("connection refused".to_string()))
        }

        async fn pull<'a>(
            &'a self,
            _model: &str,
            mut progress: Box<dyn FnMut(PullProgress) + Send + 'a>,
        ) -> ProviderResult<()> {
            self.api_pulls.fetch_add(1, Ordering::SeqCst);
            progress(PullProgress {
                status: "pulling manifest".to_string(),
                ..PullProgress::default()
            });
            progress(PullProgress {
                status: "pulling abc".to_string(),
                total: Some(200),
                completed: Some(50),
                ..PullProgress::default()
            });
            Ok(())
        }

        async fn chat(&self, _request: &ChatRequest) -> ProviderResult<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    #[derive(Default)]
    struct FakeLauncher {
        pulls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Launcher for FakeLauncher {
        fn spawn_serve(&self) -> LaunchResult<()> {
            Ok(())
        }

        async fn pull(&self, model: &str) -> LaunchResult<()> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LaunchError::Exited {
                    command: format!("ollama pull {}", model),
                    status: "exit status: 1".to_string(),
                });
            }
            Ok(())
        }
    }

    fn manager(server: Arc<FakeServer>, launcher: Arc<FakeLauncher>) -> ModelManager {
        ModelManager::new(&OllamaSettings::default(), server, launcher)
    }

    #[test]
    fn test_is_installed_latest_tag() {
        let installed = vec!["llama3:latest".to_string(), "mistral:7b".to_string()];
        assert!(is_installed(&installed, "llama3"));
        assert!(is_installed(&installed, "llama3:latest"));
        assert!(is_installed(&installed, "mistral:7b"));
        assert!(!is_installed(&installed, "mistral"));
        assert!(!is_installed(&installed, "llama3:8b"));
    }

    #[test]
    fn test_status_display() {
        let status = ModelStatus::Downloading {
            completed: 50,
            total: 200,
        };
        assert_eq!(status.to_string(), "downloading 25%");
        assert_eq!(ModelStatus::Ready.to_string(), "ready");
    }

    #[tokio::test]
    async fn test_list_failure_is_empty_with_error_status() {
        let launcher = Arc::new(FakeLauncher::default());
        let manager = manager(Arc::new(FakeServer::unreachable()), launcher);

        let mut statuses = Vec::new();
        let models = manager.list_installed_models(|s| statuses.push(s)).await;

        assert!(models.is_empty());
        assert!(matches!(statuses.as_slice(), [ModelStatus::Error(_)]));
    }

    #[tokio::test]
    async fn test_installed_model_is_not_pulled() {
        let server = Arc::new(FakeServer::with_models(&["llama3:latest"]));
        let launcher = Arc::new(FakeLauncher::default());
        let manager = manager(server.clone(), launcher.clone());

        let mut statuses = Vec::new();
        manager.ensure_model_exists("llama3", |s| statuses.push(s)).await.unwrap();

        assert_eq!(launcher.pulls.load(Ordering::SeqCst), 0);
        assert_eq!(server.api_pulls.load(Ordering::SeqCst), 0);
        assert_eq!(statuses, vec![ModelStatus::Connecting, ModelStatus::Ready]);
    }

    #[tokio::test]
    async fn test_missing_model_is_pulled_with_cli() {
        let launcher = Arc::new(FakeLauncher::default());
        let manager = manager(Arc::new(FakeServer::with_models(&[])), launcher.clone());

        let mut statuses = Vec::new();
        manager.ensure_model_exists("llama3", |s| statuses.push(s)).await.unwrap();

        assert_eq!(launcher.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(
            statuses,
            vec![ModelStatus::Connecting, ModelStatus::Pulling, ModelStatus::Ready]
        );
    }

    #[tokio::test]
    async fn test_missing_model_is_pulled_with_api() {
        let server = Arc::new(FakeServer::with_models(&["mistral:7b"]));
        let launcher = Arc::new(FakeLauncher::default());
        let manager = manager(server.clone(), launcher.clone()).with_strategy(PullStrategy::Api);

        let mut statuses = Vec::new();
        manager.ensure_model_exists("llama3", |s| statuses.push(s)).await.unwrap();

        assert_eq!(server.api_pulls.load(Ordering::SeqCst), 1);
        assert_eq!(launcher.pulls.load(Ordering::SeqCst), 0);
        assert!(statuses.contains(&ModelStatus::Downloading { completed: 50, total: 200 }));
        assert_eq!(statuses.last(), Some(&ModelStatus::Ready));
    }

    #[tokio::test]
    async fn test_pull_failure() {
        let launcher = Arc::new(FakeLauncher {
            fail: true,
            ..FakeLauncher::default()
        });
        let manager = manager(Arc::new(FakeServer::with_models(&[])), launcher);

        let mut statuses = Vec::new();
        let err = manager.ensure_model_exists("llama3", |s| statuses.push(s)).await.unwrap_err();

        assert!(matches!(err, TesterError::ModelPullFailed { ref model, .. } if model == "llama3"));
        assert!(matches!(statuses.last(), Some(ModelStatus::Error(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_check() {
        let launcher = Arc::new(FakeLauncher::default());
        let manager = manager(Arc::new(FakeServer::unreachable()), launcher.clone());

        let mut statuses = Vec::new();
        let result = manager.ensure_model_exists("llama3", |s| statuses.push(s)).await;

        match result {
            Err(TesterError::ModelPullFailed { detail, .. }) => {
                assert_eq!(detail, "Could not get the models: API error: connection refused");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(launcher.pulls.load(Ordering::SeqCst), 0);
        assert!(matches!(statuses.as_slice(), [ModelStatus::Connecting, ModelStatus::Error(_)]));
    }

    #[tokio::test]
    async fn test_installed_models_reports_list_failure() {
        let launcher = Arc::new(FakeLauncher::default());
        let manager = manager(Arc::new(FakeServer::unreachable()), launcher);

        let mut statuses = Vec::new();
        let err = manager.installed_models(|s| statuses.push(s)).await.unwrap_err();

        assert!(matches!(err, TesterError::ModelListFailed(_)));
        assert_eq!(statuses, vec![ModelStatus::Error(err.to_string())]);
    }
}
