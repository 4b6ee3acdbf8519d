//! Assistants API client.
//!
//! Conversation context lives in vendor-hosted threads, one per user. The
//! only local state is the `user id -> thread id` map, which is lost on
//! restart.

use super::{base_url, check_status, http_client, LlmError, ReplyGenerator, UserInput};
use crate::channels::MediaContent;
use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_VALUE: &str = "assistants=v2";

/// Run statuses that mean "keep polling".
const PENDING_STATUSES: &[&str] = &["queued", "in_progress", "cancelling"];

/// Thread id for one user; `None` until the first thread is created.
type ThreadSlot = Arc<Mutex<Option<String>>>;

/// In-memory map of user id to thread id.
///
/// Each user has their own slot lock. The map lock is only held to find the
/// slot, never across a request.
#[derive(Default)]
pub struct ThreadStore {
    slots: Mutex<HashMap<String, ThreadSlot>>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, user_id: &str) -> ThreadSlot {
        self.slots
            .lock()
            .await
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    pub async fn get(&self, user_id: &str) -> Option<String> {
        let slot = self.slots.lock().await.get(user_id).cloned()?;
        let thread = slot.lock().await;
        thread.clone()
    }

    pub async fn insert(&self, user_id: &str, thread_id: &str) {
        let slot = self.slot(user_id).await;
        *slot.lock().await = Some(thread_id.to_string());
    }

    /// Number of users with a thread.
    pub async fn len(&self) -> usize {
        let slots: Vec<ThreadSlot> = self.slots.lock().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub struct AssistantClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    assistant_id: String,
    image_prompt: String,
    poll_interval: Duration,
    run_timeout: Duration,
    threads: ThreadStore,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Run {
    id: String,
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    #[serde(default)]
    content: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessagePart {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

#[derive(Debug, Serialize)]
struct NewMessage {
    role: &'static str,
    content: Value,
}

/// User message text wrapped around a voice-message transcript.
pub fn transcript_message(transcript: &str) -> String {
    format!(
        "This is a transcription of an audio message I sent: '{}'. Please respond to what I said.",
        transcript
    )
}

impl AssistantClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let assistant = &config.assistant;
        Ok(Self {
            http: http_client(config.request_timeout_secs)?,
            api_key: config.api_key.clone(),
            base_url: base_url(config),
            assistant_id: assistant.assistant_id.clone().unwrap_or_default(),
            image_prompt: assistant.image_prompt.clone(),
            poll_interval: Duration::from_millis(assistant.poll_interval_ms),
            run_timeout: Duration::from_secs(assistant.run_timeout_secs),
            threads: ThreadStore::new(),
        })
    }

    /// Override run polling cadence and deadline.
    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.run_timeout = timeout;
        self
    }

    pub fn threads(&self) -> &ThreadStore {
        &self.threads
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER, BETA_VALUE)
    }

    /// Thread for `user_id`, created on first contact. Only that user's slot
    /// stays locked during creation, so concurrent first messages share one
    /// thread while other users are not held up.
    async fn thread_for(&self, user_id: &str) -> Result<String, LlmError> {
        let slot = self.threads.slot(user_id).await;
        let mut thread = slot.lock().await;
        if let Some(ref id) = *thread {
            return Ok(id.clone());
        }

        let response = self
            .request(reqwest::Method::POST, "/threads")
            .json(&json!({}))
            .send()
            .await?;
        let created: Created = check_status(response).await?.json().await?;
        tracing::info!("Created thread {} for user {}", created.id, user_id);
        *thread = Some(created.id.clone());
        Ok(created.id)
    }

    async fn upload_image(&self, image: &MediaContent) -> Result<String, LlmError> {
        let extension = match image.mime_type.as_str() {
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "jpg",
        };
        let part = reqwest::multipart::Part::bytes(image.data.clone())
            .file_name(format!("image.{}", extension))
            .mime_str(&image.mime_type)?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "vision")
            .part("file", part);

        let response = self
            .request(reqwest::Method::POST, "/files")
            .multipart(form)
            .send()
            .await?;
        let file: Created = check_status(response).await?.json().await?;
        tracing::debug!("Uploaded image as file {}", file.id);
        Ok(file.id)
    }

    async fn message_content(&self, input: &UserInput) -> Result<Value, LlmError> {
        Ok(match input {
            UserInput::Text(text) => Value::String(text.clone()),
            UserInput::Transcript(transcript) => Value::String(transcript_message(transcript)),
            UserInput::Image(image) => {
                let file_id = self.upload_image(image).await?;
                json!([
                    {"type": "text", "text": self.image_prompt},
                    {"type": "image_file", "image_file": {"file_id": file_id}}
                ])
            }
        })
    }

    async fn add_message(&self, thread_id: &str, content: Value) -> Result<(), LlmError> {
        let body = NewMessage {
            role: "user",
            content,
        };
        let response = self
            .request(reqwest::Method::POST, &format!("/threads/{}/messages", thread_id))
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn start_run(&self, thread_id: &str) -> Result<Run, LlmError> {
        let response = self
            .request(reqwest::Method::POST, &format!("/threads/{}/runs", thread_id))
            .json(&json!({ "assistant_id": self.assistant_id }))
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, LlmError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/threads/{}/runs/{}", thread_id, run_id),
            )
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Poll until the run leaves the pending states or the deadline passes.
    async fn wait_for_run(&self, thread_id: &str, mut run: Run) -> Result<Run, LlmError> {
        let started = Instant::now();
        while PENDING_STATUSES.contains(&run.status.as_str()) {
            if started.elapsed() >= self.run_timeout {
                tracing::warn!("Run {} timed out in status {}", run.id, run.status);
                return Err(LlmError::RunTimeout {
                    run_id: run.id,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
            run = self.get_run(thread_id, &run.id).await?;
        }
        Ok(run)
    }

    async fn latest_reply(&self, thread_id: &str) -> Result<String, LlmError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/threads/{}/messages", thread_id))
            .query(&[("order", "desc"), ("limit", "1")])
            .send()
            .await?;
        let list: MessageList = check_status(response).await?.json().await?;

        list.data
            .into_iter()
            .next()
            .and_then(|m| {
                m.content.into_iter().find_map(|part| match part {
                    MessagePart::Text { text } => Some(text.value),
                    MessagePart::Other => None,
                })
            })
            .filter(|t| !t.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl ReplyGenerator for AssistantClient {
    async fn generate_reply(&self, user_id: &str, input: &UserInput) -> Result<String, LlmError> {
        let thread_id = self.thread_for(user_id).await?;
        let content = self.message_content(input).await?;
        self.add_message(&thread_id, content).await?;

        let run = self.start_run(&thread_id).await?;
        tracing::debug!("Started run {} on thread {}", run.id, thread_id);
        let run = self.wait_for_run(&thread_id, run).await?;

        if run.status != "completed" {
            return Err(LlmError::RunFailed {
                status: run.status,
                detail: run.last_error.map(|e| e.message),
            });
        }
        self.latest_reply(&thread_id).await
    }

    fn name(&self) -> &str {
        "assistant"
    }
}
