pub mod signature;
pub mod webhook;

use super::{DeliveryError, MediaContent, MessagingClient, ReplyTarget};
use crate::config::LineConfig;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// LINE Messaging API client for replies, pushes and content downloads.
pub struct LineClient {
    http: reqwest::Client,
    access_token: String,
    api_base: String,
    data_api_base: String,
    max_per_request: usize,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum LineMessage<'a> {
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<LineMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<LineMessage<'a>>,
}

fn text_messages(batch: &[String]) -> Vec<LineMessage<'_>> {
    batch.iter().map(|text| LineMessage::Text { text }).collect()
}

impl LineClient {
    pub fn new(config: &LineConfig) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            access_token: config.channel_access_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            data_api_base: config.data_api_base.trim_end_matches('/').to_string(),
            max_per_request: config.max_messages_per_request.max(1),
        })
    }

    /// Answer an event with its reply token. Tokens are single-use.
    pub async fn reply(&self, reply_token: &str, batch: &[String]) -> Result<(), DeliveryError> {
        let body = ReplyRequest {
            reply_token,
            messages: text_messages(batch),
        };
        let url = format!("{}/v2/bot/message/reply", self.api_base);
        self.post(&url, &body).await
    }

    /// Send messages to a user, group or room without a reply token.
    pub async fn push(&self, to: &str, batch: &[String]) -> Result<(), DeliveryError> {
        let body = PushRequest {
            to,
            messages: text_messages(batch),
        };
        let url = format!("{}/v2/bot/message/push", self.api_base);
        self.post(&url, &body).await
    }

    async fn post<T: Serialize>(&self, url: &str, body: &T) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DeliveryError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl MessagingClient for LineClient {
    async fn send(&self, target: &ReplyTarget, messages: &[String]) -> Result<(), DeliveryError> {
        let mut batches = messages.chunks(self.max_per_request);
        let mut sent = 0;

        if let Some(ref token) = target.reply_token {
            if let Some(first) = batches.next() {
                self.reply(token, first).await?;
                sent = first.len();
            }
        }

        for batch in batches {
            let pushed = match target.push_to.as_deref() {
                Some(to) => self.push(to, batch).await,
                None => Err(DeliveryError::NoPushTarget {
                    remaining: messages.len() - sent,
                }),
            };
            if let Err(e) = pushed {
                return Err(if sent > 0 {
                    DeliveryError::Partial {
                        delivered: sent,
                        source: Box::new(e),
                    }
                } else {
                    e
                });
            }
            sent += batch.len();
        }

        tracing::debug!("Delivered {} message(s) via LINE", messages.len());
        Ok(())
    }

    async fn fetch_content(&self, message_id: &str) -> Result<MediaContent, DeliveryError> {
        let url = format!("{}/v2/bot/message/{}/content", self.data_api_base, message_id);
        tracing::info!("Downloading content from {}", url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let response = check_status(response).await?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = response.bytes().await?.to_vec();
        tracing::info!("Downloaded {} bytes ({})", data.len(), mime_type);

        Ok(MediaContent { data, mime_type })
    }

    fn name(&self) -> &str {
        "line"
    }
}
