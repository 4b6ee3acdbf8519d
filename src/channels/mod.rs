pub mod line;
pub mod segment;

pub use segment::{split_message, SegmentError, Segmenter};

use async_trait::async_trait;

/// Where an outbound reply should be delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyTarget {
    /// Single-use token from the inbound event.
    pub reply_token: Option<String>,
    /// User, group or room id used once the reply token is spent.
    pub push_to: Option<String>,
}

/// Downloaded attachment bytes (image or audio).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaContent {
    pub data: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Messaging API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("No push destination for {remaining} remaining message(s)")]
    NoPushTarget { remaining: usize },
    #[error("Delivered {delivered} message(s) before failing: {source}")]
    Partial {
        delivered: usize,
        source: Box<DeliveryError>,
    },
}

impl DeliveryError {
    /// Some messages already went out with the reply token, so it cannot be
    /// used again.
    pub fn reply_token_spent(&self) -> bool {
        matches!(self, Self::Partial { delivered, .. } if *delivered > 0)
    }
}

/// Messaging platform client. Implement for each platform the relay talks to.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Deliver `messages` to `target` as separate messages, in order.
    async fn send(&self, target: &ReplyTarget, messages: &[String]) -> Result<(), DeliveryError>;

    /// Download the binary content attached to an inbound message.
    async fn fetch_content(&self, message_id: &str) -> Result<MediaContent, DeliveryError>;

    /// Channel name (e.g. "line").
    fn name(&self) -> &str;
}
