//! In-memory collaborators for conductor and router tests.

use crate::channels::{DeliveryError, MediaContent, MessagingClient, ReplyTarget};
use crate::llm::{LlmError, ReplyGenerator, Transcriber, UserInput};
use async_trait::async_trait;
use std::sync::Mutex;

/// Records every send; optionally fails the first `fail_sends` of them.
#[derive(Default)]
pub struct MockMessenger {
    pub sent: Mutex<Vec<(ReplyTarget, Vec<String>)>>,
    pub fetched: Mutex<Vec<String>>,
    pub content: Option<MediaContent>,
    pub fail_sends: Mutex<usize>,
    /// Fail the next send as if the reply went out but a later push did not.
    pub fail_after_reply: Mutex<bool>,
}

impl MockMessenger {
    pub fn with_content(data: &[u8], mime_type: &str) -> Self {
        Self {
            content: Some(MediaContent {
                data: data.to_vec(),
                mime_type: mime_type.to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn failing_sends(self, n: usize) -> Self {
        *self.fail_sends.lock().unwrap() = n;
        self
    }

    pub fn failing_after_reply(self) -> Self {
        *self.fail_after_reply.lock().unwrap() = true;
        self
    }

    pub fn sent(&self) -> Vec<(ReplyTarget, Vec<String>)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingClient for MockMessenger {
    async fn send(&self, target: &ReplyTarget, messages: &[String]) -> Result<(), DeliveryError> {
        if std::mem::take(&mut *self.fail_after_reply.lock().unwrap()) {
            return Err(DeliveryError::Partial {
                delivered: 5,
                source: Box::new(DeliveryError::Api {
                    status: 429,
                    body: "You have reached your monthly limit.".into(),
                }),
            });
        }
        {
            let mut remaining = self.fail_sends.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DeliveryError::Api {
                    status: 400,
                    body: "Invalid reply token".into(),
                });
            }
        }
        self.sent
            .lock()
            .unwrap()
            .push((target.clone(), messages.to_vec()));
        Ok(())
    }

    async fn fetch_content(&self, message_id: &str) -> Result<MediaContent, DeliveryError> {
        self.fetched.lock().unwrap().push(message_id.to_string());
        self.content.clone().ok_or(DeliveryError::Api {
            status: 404,
            body: "Not found".into(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Replies with a fixed text, or fails with `EmptyResponse` when `reply` is `None`.
pub struct MockGenerator {
    pub reply: Option<String>,
    pub inputs: Mutex<Vec<(String, UserInput)>>,
}

impl MockGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<(String, UserInput)> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplyGenerator for MockGenerator {
    async fn generate_reply(&self, user_id: &str, input: &UserInput) -> Result<String, LlmError> {
        self.inputs
            .lock()
            .unwrap()
            .push((user_id.to_string(), input.clone()));
        self.reply.clone().ok_or(LlmError::EmptyResponse)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct MockTranscriber {
    pub transcript: Option<String>,
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio: &MediaContent) -> Result<String, LlmError> {
        self.transcript.clone().ok_or(LlmError::Api {
            status: 400,
            body: "Invalid file format.".into(),
        })
    }
}
