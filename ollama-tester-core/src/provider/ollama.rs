//! Ollama provider implementation.
//!
//! HTTP client for the Ollama API that implements the [`ModelServer`] trait.

use super::types::*;
use crate::config::OllamaSettings;
use async_trait::async_trait;

use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Ollama HTTP API provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    /// The base URL of the Ollama server (e.g., "http://localhost:11434")
    base_url: String,
    probe_timeout: Duration,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Creates a provider for the server described by `settings`.
    pub fn new(settings: &OllamaSettings) -> Self {
        Self::with_base_url(settings.base_url.clone(), settings.probe_timeout())
    }

    pub fn with_base_url(base_url: impl Into<String>, probe_timeout: Duration) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            probe_timeout,
            http_client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new(&OllamaSettings::default())
    }
}

#[async_trait]
impl ModelServer for OllamaProvider {
    async fn probe(&self) -> bool {
        let result = self
            .http_client
            .get(&self.base_url)
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %self.base_url, error = %e, "Probe failed");
                false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.http_client.get(&url).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let tags = response.json::<TagsResponse>().await?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| m.model.unwrap_or(m.name))
            .collect())
    }

    async fn pull<'a>(
        &'a self,
        model: &str,
        mut progress: Box<dyn FnMut(PullProgress) + Send + 'a>,
    ) -> Result<()> {
        let url = format!("{}/api/pull", self.base_url);
        let body = serde_json::json!({ "model": model, "stream": true });

        let response = self.http_client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();
                handle_pull_line(&line, &mut progress)?;
            }
        }

        // Final line without a trailing newline.
        if !buffer.is_empty() {
            handle_pull_line(&buffer, &mut progress)?;
        }

        Ok(())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<serde_json::Value> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self.http_client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(ProviderError::Api(format!("{}: {}", status, error_text)));
        }

        Ok(response.json::<serde_json::Value>().await?)
    }
}

fn handle_pull_line<F: FnMut(PullProgress)>(line: &[u8], progress: &mut F) -> Result<()> {
    let line_str = String::from_utf8_lossy(line);
    let line_str = line_str.trim();

    if line_str.is_empty() {
        return Ok(());
    }

    let event = serde_json::from_str::<PullProgress>(line_str)?;
    if let Some(error) = &event.error {
        return Err(ProviderError::Api(error.clone()));
    }
    progress(event);
    Ok(())
}

// Ollama-specific response types (internal)

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    model: Option<String>,
}
