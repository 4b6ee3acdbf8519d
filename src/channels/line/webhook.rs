//! LINE webhook payload types.
//!
//! Only the fields the relay reads are modelled; everything else in the
//! payload is ignored by serde.

use crate::channels::ReplyTarget;
use serde::Deserialize;

/// Body of a webhook request.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WebhookEvent {
    Message(MessageEvent),
    /// Follow, unfollow, postback, join... nothing to answer.
    #[serde(other)]
    Other,
}

impl WebhookEvent {
    /// LINE's id for this event, used to correlate logs with redeliveries.
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Message(event) => event.webhook_event_id.as_deref(),
            Self::Other => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub source: EventSource,
    pub message: MessageContent,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub webhook_event_id: Option<String>,
}

impl MessageEvent {
    /// Where replies to this event go: the reply token first, then a push
    /// to the conversation it came from.
    pub fn reply_target(&self) -> ReplyTarget {
        ReplyTarget {
            reply_token: self.reply_token.clone(),
            push_to: self.source.conversation_id().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
}

impl EventSource {
    /// Id used to key per-user state; groups and rooms fall back to their own id.
    pub fn session_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or(self.group_id.as_deref())
            .or(self.room_id.as_deref())
    }

    /// Push destination: the group or room the event came from, else the user.
    pub fn conversation_id(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or(self.room_id.as_deref())
            .or(self.user_id.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageContent {
    Text {
        id: String,
        text: String,
    },
    Image {
        id: String,
    },
    Audio {
        id: String,
        /// Length in milliseconds.
        #[serde(default)]
        duration: Option<u64>,
    },
    /// Video, file, location, sticker...
    #[serde(other)]
    Unsupported,
}

impl MessageContent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Audio { .. } => "audio",
            Self::Unsupported => "unsupported",
        }
    }
}
