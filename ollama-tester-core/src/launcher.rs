//! Process boundary of the model server: `serve` and `pull` through its executable.

use async_trait::async_trait;
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{0} is not installed or not in PATH")]
    NotInstalled(String),

    #[error("Failed to run {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Exited { command: String, status: String },
}

pub type Result<T> = std::result::Result<T, LaunchError>;

/// Starts the server process and installs models through the executable.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start `<executable> serve` detached. Returns once the process is spawned.
    fn spawn_serve(&self) -> Result<()>;

    /// Run `<executable> pull <model>` to completion.
    async fn pull(&self, model: &str) -> Result<()>;
}

/// Launcher backed by the `ollama` binary (or whatever `executable` names).
#[derive(Debug, Clone)]
pub struct OllamaLauncher {
    executable: String,
}

impl OllamaLauncher {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Checks whether the executable can be found on `PATH`.
    pub fn is_installed(&self) -> bool {
        #[cfg(windows)]
        let finder = "where";
        #[cfg(not(windows))]
        let finder = "which";

        Command::new(finder)
            .arg(&self.executable)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn spawn_error(&self, source: std::io::Error) -> LaunchError {
        if source.kind() == std::io::ErrorKind::NotFound {
            LaunchError::NotInstalled(self.executable.clone())
        } else {
            LaunchError::Spawn {
                executable: self.executable.clone(),
                source,
            }
        }
    }
}

impl Default for OllamaLauncher {
    fn default() -> Self {
        Self::new("ollama")
    }
}

#[async_trait]
impl Launcher for OllamaLauncher {
    fn spawn_serve(&self) -> Result<()> {
        info!(executable = %self.executable, "Starting model server");

        // The child handle is dropped on purpose: the server outlives us.
        let child = Command::new(&self.executable)
            .arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        debug!(pid = child.id(), "Model server spawned");
        Ok(())
    }

    async fn pull(&self, model: &str) -> Result<()> {
        info!(executable = %self.executable, model, "Pulling model");

        let status = tokio::process::Command::new(&self.executable)
            .arg("pull")
            .arg(model)
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !status.success() {
            return Err(LaunchError::Exited {
                command: format!("{} pull {}", self.executable, model),
                status: status.to_string(),
            });
        }

        Ok(())
    }
}

/// Setup guidance shown when the executable is missing.
pub fn installation_help() -> String {
    let mut help = String::from("Ollama not found!\n\n  Install Ollama:\n");

    #[cfg(target_os = "macos")]
    {
        help.push_str("   • macOS:  curl -fsSL https://ollama.ai/install.sh | sh\n");
        help.push_str("   • Or:     brew install ollama\n");
    }

    #[cfg(target_os = "linux")]
    {
        help.push_str("   • Linux:  curl -fsSL https://ollama.ai/install.sh | sh\n");
    }

    #[cfg(target_os = "windows")]
    {
        help.push_str("   • Windows: Download from https://ollama.ai/download\n");
    }

    help.push_str("\n  After installation, pull a model:\n");
    help.push_str("   ollama pull llama3.2:3b\n");
    help
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING: &str = "ollama-tester-definitely-missing-binary";

    #[test]
    fn test_missing_executable_is_not_installed() {
        let launcher = OllamaLauncher::new(MISSING);
        assert!(!launcher.is_installed());
    }

    #[test]
    fn test_spawn_missing_executable() {
        let launcher = OllamaLauncher::new(MISSING);
        let err = launcher.spawn_serve().unwrap_err();
        assert!(matches!(err, LaunchError::NotInstalled(ref exe) if exe == MISSING));
    }

    #[tokio::test]
    async fn test_pull_missing_executable() {
        let launcher = OllamaLauncher::new(MISSING);
        let err = launcher.pull("llama3").await.unwrap_err();
        assert!(matches!(err, LaunchError::NotInstalled(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pull_nonzero_exit() {
        // `false pull llama3` ignores its arguments and exits with 1.
        let launcher = OllamaLauncher::new("false");
        let err = launcher.pull("llama3").await.unwrap_err();
        assert!(matches!(
            err,
            LaunchError::Exited { ref command, .. } if command == "false pull llama3"
        ));
    }

    #[test]
    fn test_installation_help_mentions_pull() {
        assert!(installation_help().contains("ollama pull"));
    }
}
