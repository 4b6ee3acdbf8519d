pub mod assistant;
pub mod chat;
pub mod transcribe;

pub use assistant::{AssistantClient, ThreadStore};
pub use chat::ChatClient;
pub use transcribe::WhisperTranscriber;

use crate::channels::MediaContent;
use crate::config::{LlmConfig, LlmMode};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// What the user sent, after any media has been downloaded or transcribed.
#[derive(Debug, Clone)]
pub enum UserInput {
    Text(String),
    Image(MediaContent),
    /// Text recognised from a voice message.
    Transcript(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Model returned no content")]
    EmptyResponse,
    #[error("Run ended with status '{status}'{}", detail_suffix(.detail))]
    RunFailed {
        status: String,
        detail: Option<String>,
    },
    #[error("Run {run_id} still pending after {waited_secs}s")]
    RunTimeout { run_id: String, waited_secs: u64 },
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

/// Produces the reply text for one inbound message.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate_reply(&self, user_id: &str, input: &UserInput) -> Result<String, LlmError>;

    fn name(&self) -> &str;
}

/// Speech-to-text for voice messages.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &MediaContent) -> Result<String, LlmError>;
}

/// Build the reply generator selected by `llm.mode`.
pub fn build_generator(config: &LlmConfig) -> Result<Arc<dyn ReplyGenerator>, LlmError> {
    let generator: Arc<dyn ReplyGenerator> = match config.mode {
        LlmMode::Chat => Arc::new(ChatClient::new(config)?),
        LlmMode::Assistant => Arc::new(AssistantClient::new(config)?),
    };
    tracing::info!("Using {} reply generator", generator.name());
    Ok(generator)
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, LlmError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Pass 2xx responses through; turn anything else into `LlmError::Api`.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!("LLM API error {}: {}", status, body);
    Err(LlmError::Api {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn base_url(config: &LlmConfig) -> String {
    config.base_url.trim_end_matches('/').to_string()
}
