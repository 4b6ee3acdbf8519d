use crate::channels::line::webhook::{MessageContent, MessageEvent, WebhookEvent};
use crate::channels::line::LineClient;
use crate::channels::{DeliveryError, MessagingClient, ReplyTarget, Segmenter};
use crate::config::{Config, RepliesConfig};
use crate::llm::{self, ReplyGenerator, Transcriber, UserInput, WhisperTranscriber};
use anyhow::Context;
use std::sync::Arc;

/// How many characters of an error are shown to the user after an image failure.
const ERROR_DETAIL_CHARS: usize = 100;

/// Per-event orchestration: download media, ask the model, segment the
/// reply and deliver it, falling back to an apology on failure.
pub struct Conductor {
    messenger: Arc<dyn MessagingClient>,
    generator: Arc<dyn ReplyGenerator>,
    transcriber: Arc<dyn Transcriber>,
    segmenter: Segmenter,
    replies: RepliesConfig,
}

impl Conductor {
    pub fn new(
        messenger: Arc<dyn MessagingClient>,
        generator: Arc<dyn ReplyGenerator>,
        transcriber: Arc<dyn Transcriber>,
        segmenter: Segmenter,
        replies: RepliesConfig,
    ) -> Self {
        Self {
            messenger,
            generator,
            transcriber,
            segmenter,
            replies,
        }
    }

    /// Wire up the LINE client and the configured model clients.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let messenger = LineClient::new(&config.line).context("building LINE client")?;
        let generator = llm::build_generator(&config.llm).context("building reply generator")?;
        let transcriber =
            WhisperTranscriber::new(&config.llm).context("building transcriber")?;
        let segmenter = Segmenter::new(config.line.max_message_len)?;

        Ok(Self::new(
            Arc::new(messenger),
            generator,
            Arc::new(transcriber),
            segmenter,
            config.replies.clone(),
        ))
    }

    pub async fn handle_event(&self, event: WebhookEvent) {
        match event {
            WebhookEvent::Message(message) => self.handle_message(&message).await,
            WebhookEvent::Other => tracing::debug!("Ignoring non-message event"),
        }
    }

    async fn handle_message(&self, event: &MessageEvent) {
        if matches!(event.message, MessageContent::Unsupported) {
            tracing::debug!("Ignoring unsupported message type");
            return;
        }

        let session_id = event.source.session_id().unwrap_or("anonymous");
        let target = event.reply_target();
        tracing::info!("[line] {} message from {}", event.message.kind(), session_id);

        let outcome = match self.reply_for(session_id, &event.message).await {
            Ok(reply) => self.deliver(&target, &reply).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            tracing::error!("Failed to answer {} message: {:#}", event.message.kind(), e);
            let apology = self.apology(&event.message, &e);
            let Some(target) = apology_target(&target, &e) else {
                tracing::warn!("Reply token spent and nowhere to push the apology");
                return;
            };
            if let Err(e) = self.messenger.send(&target, &[apology]).await {
                tracing::error!("Failed to send apology: {}", e);
            }
        }
    }

    /// Reply text for one message, before segmentation.
    async fn reply_for(&self, session_id: &str, content: &MessageContent) -> anyhow::Result<String> {
        match content {
            MessageContent::Text { text, .. } => {
                let reply = self
                    .generator
                    .generate_reply(session_id, &UserInput::Text(text.clone()))
                    .await?;
                Ok(reply)
            }
            MessageContent::Image { id } => {
                let image = self
                    .messenger
                    .fetch_content(id)
                    .await
                    .context("downloading image")?;
                let reply = self
                    .generator
                    .generate_reply(session_id, &UserInput::Image(image))
                    .await?;
                Ok(reply)
            }
            MessageContent::Audio { id, .. } => {
                let audio = self
                    .messenger
                    .fetch_content(id)
                    .await
                    .context("downloading audio")?;
                let transcript = self
                    .transcriber
                    .transcribe(&audio)
                    .await
                    .context("transcribing audio")?;
                tracing::info!("Transcription: {}", truncate(&transcript, 80));
                let reply = self
                    .generator
                    .generate_reply(session_id, &UserInput::Transcript(transcript.clone()))
                    .await?;
                Ok(format_audio_reply(&transcript, &reply))
            }
            MessageContent::Unsupported => anyhow::bail!("unsupported message type"),
        }
    }

    async fn deliver(&self, target: &ReplyTarget, reply: &str) -> anyhow::Result<()> {
        let chunks = self.segmenter.split(reply);
        if chunks.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            "Sending {} chunk(s) via {}",
            chunks.len(),
            self.messenger.name()
        );
        self.messenger.send(target, &chunks).await?;
        Ok(())
    }

    fn apology(&self, content: &MessageContent, error: &anyhow::Error) -> String {
        match content {
            MessageContent::Image { .. } => format!(
                "{} Technical details: {}",
                self.replies.image_error,
                truncate_chars(&error.to_string(), ERROR_DETAIL_CHARS)
            ),
            MessageContent::Audio { .. } => self.replies.audio_error.clone(),
            _ => self.replies.text_error.clone(),
        }
    }
}

/// Where the apology goes. Once part of the reply went out with the reply
/// token, the apology has to be pushed instead.
fn apology_target(target: &ReplyTarget, error: &anyhow::Error) -> Option<ReplyTarget> {
    let spent = error
        .downcast_ref::<DeliveryError>()
        .is_some_and(DeliveryError::reply_token_spent);
    if !spent {
        return Some(target.clone());
    }
    target.push_to.as_ref().map(|to| ReplyTarget {
        reply_token: None,
        push_to: Some(to.clone()),
    })
}

/// Reply to a voice message: the transcript followed by the model's answer.
pub fn format_audio_reply(transcript: &str, response: &str) -> String {
    format!("📝 Transcription: {}\n\n✨ Response: {}", transcript, response)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", truncate_chars(s, max))
    }
}
