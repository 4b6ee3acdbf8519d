use super::{base_url, check_status, http_client, LlmError, Transcriber};
use crate::channels::MediaContent;
use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::Deserialize;

/// Whisper transcription over the OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct WhisperTranscriber {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    language: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// File extension Whisper uses to detect the container format.
fn audio_extension(mime_type: &str) -> &'static str {
    let base = mime_type.split(';').next().unwrap_or_default().trim();
    match base {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        "audio/webm" => "webm",
        // LINE voice messages are AAC in an m4a container.
        _ => "m4a",
    }
}

impl WhisperTranscriber {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            http: http_client(config.request_timeout_secs)?,
            api_key: config.api_key.clone(),
            base_url: base_url(config),
            model: config.transcription.model.clone(),
            language: config.transcription.language.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &MediaContent) -> Result<String, LlmError> {
        let file_part = reqwest::multipart::Part::bytes(audio.data.clone())
            .file_name(format!("audio.{}", audio_extension(&audio.mime_type)))
            .mime_str(&audio.mime_type)?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(ref lang) = self.language {
            form = form.text("language", lang.clone());
        }

        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        let result: TranscriptionResponse = check_status(response).await?.json().await?;

        let text = result.text.trim().to_string();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        tracing::info!("Transcribed {} bytes of audio", audio.data.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use mockito::Matcher;

    fn transcriber(base: &str, language: Option<&str>) -> WhisperTranscriber {
        let lang = language
            .map(|l| format!("\n[llm.transcription]\nlanguage = \"{}\"\n", l))
            .unwrap_or_default();
        let toml = format!(
            "[line]\nchannel_secret = \"s\"\nchannel_access_token = \"t\"\n\n[llm]\napi_key = \"sk-test\"\nbase_url = \"{}\"\n{}",
            base, lang
        );
        WhisperTranscriber::new(&parse_config(&toml).unwrap().llm).unwrap()
    }

    fn m4a() -> MediaContent {
        MediaContent {
            data: vec![0, 0, 0, 24, b'f', b't', b'y', b'p'],
            mime_type: "audio/x-m4a".into(),
        }
    }

    #[tokio::test]
    async fn test_transcribe_multipart() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/audio/transcriptions")
            .match_header("authorization", "Bearer sk-test")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".into()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"filename="audio.m4a""#.into()),
                Matcher::Regex("whisper-1".into()),
                Matcher::Regex(r#"name="language"\r\n\r\nth"#.into()),
            ]))
            .with_status(200)
            .with_body(r#"{"text": " สวัสดีครับ "}"#)
            .create_async()
            .await;

        let text = transcriber(&server.url(), Some("th"))
            .transcribe(&m4a())
            .await
            .unwrap();
        assert_eq!(text, "สวัสดีครับ");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_transcript_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/transcriptions")
            .with_status(200)
            .with_body(r#"{"text": "   "}"#)
            .create_async()
            .await;

        let err = transcriber(&server.url(), None)
            .transcribe(&m4a())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/audio/transcriptions")
            .with_status(400)
            .with_body(r#"{"error": {"message": "Invalid file format."}}"#)
            .create_async()
            .await;

        let err = transcriber(&server.url(), None)
            .transcribe(&m4a())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 400, .. }));
    }

    #[test]
    fn test_audio_extension() {
        assert_eq!(audio_extension("audio/mpeg"), "mp3");
        assert_eq!(audio_extension("audio/wav"), "wav");
        assert_eq!(audio_extension("audio/ogg; codecs=opus"), "ogg");
        assert_eq!(audio_extension("audio/x-m4a"), "m4a");
        assert_eq!(audio_extension("application/octet-stream"), "m4a");
    }
}
