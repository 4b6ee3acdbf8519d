//! Stateless Chat Completions client.
//!
//! Every message is answered on its own: text and transcripts go to the chat
//! model, images to the vision model as a base64 data URL.

use super::{base_url, check_status, http_client, LlmError, ReplyGenerator, UserInput};
use crate::channels::MediaContent;
use crate::config::{ChatConfig, LlmConfig};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

pub struct ChatClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    config: ChatConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: MessageBody<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageBody<'a> {
    Text(String),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `data:<mime>;base64,<bytes>` URL for inline images.
fn data_url(image: &MediaContent) -> String {
    format!("data:{};base64,{}", image.mime_type, BASE64.encode(&image.data))
}

/// User prompt wrapped around a voice-message transcript.
pub fn transcript_prompt(transcript: &str) -> String {
    format!(
        "This is a transcription of audio: {}\n\nPlease respond to this.",
        transcript
    )
}

impl ChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client(config.request_timeout_secs)?,
            api_key: config.api_key.clone(),
            base_url: base_url(config),
            config: config.chat.clone(),
        })
    }

    fn build_request<'a>(&'a self, input: &'a UserInput) -> ChatRequest<'a> {
        let cfg = &self.config;
        match input {
            UserInput::Text(text) => ChatRequest {
                model: &cfg.model,
                messages: vec![
                    system(&cfg.system_prompt),
                    user(MessageBody::Text(text.clone())),
                ],
                max_tokens: cfg.max_tokens,
                temperature: Some(cfg.temperature),
            },
            UserInput::Transcript(transcript) => ChatRequest {
                model: &cfg.model,
                messages: vec![
                    system(&cfg.transcript_system_prompt),
                    user(MessageBody::Text(transcript_prompt(transcript))),
                ],
                max_tokens: cfg.max_tokens,
                temperature: Some(cfg.temperature),
            },
            UserInput::Image(image) => ChatRequest {
                model: &cfg.vision_model,
                messages: vec![
                    system(&cfg.vision_system_prompt),
                    user(MessageBody::Parts(vec![
                        ContentPart::Text {
                            text: &cfg.vision_prompt,
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: data_url(image),
                            },
                        },
                    ])),
                ],
                max_tokens: cfg.vision_max_tokens,
                temperature: None,
            },
        }
    }
}

fn system(prompt: &str) -> ChatMessage<'_> {
    ChatMessage {
        role: "system",
        content: MessageBody::Text(prompt.to_string()),
    }
}

fn user(content: MessageBody<'_>) -> ChatMessage<'_> {
    ChatMessage {
        role: "user",
        content,
    }
}

#[async_trait]
impl ReplyGenerator for ChatClient {
    async fn generate_reply(&self, user_id: &str, input: &UserInput) -> Result<String, LlmError> {
        let request = self.build_request(input);
        tracing::debug!("Chat completion for {} with model {}", user_id, request.model);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response: ChatResponse = check_status(response).await?.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }

    fn name(&self) -> &str {
        "chat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use mockito::Matcher;
    use serde_json::json;

    fn client(base: &str) -> ChatClient {
        let toml = format!(
            "[line]\nchannel_secret = \"s\"\nchannel_access_token = \"t\"\n\n[llm]\napi_key = \"sk-test\"\nbase_url = \"{}\"\n",
            base
        );
        ChatClient::new(&parse_config(&toml).unwrap().llm).unwrap()
    }

    fn completion(content: &str) -> String {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_text_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({"model": "gpt-4o", "max_tokens": 2000})),
                Matcher::Regex(r#""role":"system","content":"You are a helpful assistant"#.into()),
                Matcher::Regex(r#""role":"user","content":"Hello""#.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion("Hi there!"))
            .create_async()
            .await;

        let reply = client(&server.url())
            .generate_reply("U1", &UserInput::Text("Hello".into()))
            .await
            .unwrap();
        assert_eq!(reply, "Hi there!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_image_uses_vision_model_and_data_url() {
        let mut server = mockito::Server::new_async().await;
        let image = MediaContent {
            data: b"png-bytes".to_vec(),
            mime_type: "image/png".into(),
        };
        let expected_url = format!("data:image/png;base64,{}", BASE64.encode(b"png-bytes"));
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({"model": "gpt-4o", "max_tokens": 5000})),
                Matcher::Regex(r#""type":"image_url""#.into()),
                Matcher::Regex(expected_url),
            ]))
            .with_status(200)
            .with_body(completion("A cat holding a sign."))
            .create_async()
            .await;

        let reply = client(&server.url())
            .generate_reply("U1", &UserInput::Image(image))
            .await
            .unwrap();
        assert_eq!(reply, "A cat holding a sign.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_transcript_is_wrapped() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::Regex(
                "This is a transcription of audio: what time is it".into(),
            ))
            .with_status(200)
            .with_body(completion("It is noon."))
            .create_async()
            .await;

        let reply = client(&server.url())
            .generate_reply("U1", &UserInput::Transcript("what time is it".into()))
            .await
            .unwrap();
        assert_eq!(reply, "It is noon.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .generate_reply("U1", &UserInput::Text("Hello".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": {"message": "Rate limit reached"}}"#)
            .create_async()
            .await;

        let err = client(&server.url())
            .generate_reply("U1", &UserInput::Text("Hello".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 429, ref body } if body.contains("Rate limit")));
    }

    #[test]
    fn test_transcript_prompt() {
        assert_eq!(
            transcript_prompt("hi"),
            "This is a transcription of audio: hi\n\nPlease respond to this."
        );
    }
}
