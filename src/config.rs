use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Environment variable not set: ${0}")]
    MissingEnvVar(String),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub line: LineConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub replies: RepliesConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Webhook path registered in the LINE console. `POST /` is always accepted too.
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            webhook_path: default_webhook_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// LINE
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct LineConfig {
    pub channel_secret: String,
    pub channel_access_token: String,
    #[serde(default = "default_line_api_base")]
    pub api_base: String,
    #[serde(default = "default_line_data_api_base")]
    pub data_api_base: String,
    /// Per-message character limit used when segmenting replies.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: i64,
    /// Message objects per reply/push request (LINE allows up to 5).
    #[serde(default = "default_max_messages_per_request")]
    pub max_messages_per_request: usize,
    #[serde(default = "default_line_timeout_secs")]
    pub request_timeout_secs: u64,
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmMode {
    /// Stateless Chat Completions, one request per message.
    #[default]
    Chat,
    /// Hosted Assistants with one thread per user.
    Assistant,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub mode: LlmMode,
    /// API key (supports ${ENV_VAR} expansion)
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    #[serde(default = "default_vision_system_prompt")]
    pub vision_system_prompt: String,
    #[serde(default = "default_vision_prompt")]
    pub vision_prompt: String,
    #[serde(default = "default_vision_max_tokens")]
    pub vision_max_tokens: u32,
    #[serde(default = "default_transcript_system_prompt")]
    pub transcript_system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            vision_model: default_vision_model(),
            vision_system_prompt: default_vision_system_prompt(),
            vision_prompt: default_vision_prompt(),
            vision_max_tokens: default_vision_max_tokens(),
            transcript_system_prompt: default_transcript_system_prompt(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_image_prompt")]
    pub image_prompt: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            assistant_id: None,
            poll_interval_ms: default_poll_interval_ms(),
            run_timeout_secs: default_run_timeout_secs(),
            image_prompt: default_image_prompt(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscriptionConfig {
    #[serde(default = "default_transcription_model")]
    pub model: String,
    /// ISO 639-1 hint, e.g. "th". Auto-detected when unset.
    #[serde(default)]
    pub language: Option<String>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: default_transcription_model(),
            language: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Apology texts sent when a message cannot be answered.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RepliesConfig {
    #[serde(default = "default_text_error")]
    pub text_error: String,
    #[serde(default = "default_image_error")]
    pub image_error: String,
    #[serde(default = "default_audio_error")]
    pub audio_error: String,
}

impl Default for RepliesConfig {
    fn default() -> Self {
        Self {
            text_error: default_text_error(),
            image_error: default_image_error(),
            audio_error: default_audio_error(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_webhook_path() -> String {
    "/callback".to_string()
}

fn default_line_api_base() -> String {
    "https://api.line.me".to_string()
}

fn default_line_data_api_base() -> String {
    "https://api-data.line.me".to_string()
}

fn default_max_message_len() -> i64 {
    crate::channels::segment::DEFAULT_MAX_MESSAGE_LEN as i64
}

fn default_max_messages_per_request() -> usize {
    5
}

fn default_line_timeout_secs() -> u64 {
    30
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Keep your responses concise and clear.".to_string()
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_vision_model() -> String {
    "gpt-4o".to_string()
}

fn default_vision_system_prompt() -> String {
    "You are a helpful assistant analyzing images. First describe what's in the image, \
     including any text content. Then respond to any questions or requests found in the image text."
        .to_string()
}

fn default_vision_prompt() -> String {
    "1. Describe what's in this image in detail, including any text content.\n\
     2. If there are any questions or requests in the image, please respond to them."
        .to_string()
}

fn default_vision_max_tokens() -> u32 {
    5000
}

fn default_transcript_system_prompt() -> String {
    "You are a helpful assistant responding to transcribed audio. Keep your responses concise and clear."
        .to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_run_timeout_secs() -> u64 {
    120
}

fn default_image_prompt() -> String {
    "Please analyze this image and describe what you see in detail. If there's any text in the \
     image, include it in your response. If there are any questions or requests in the image, \
     please respond to them."
        .to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_text_error() -> String {
    "Sorry, I encountered an error. Please try again later.".to_string()
}

fn default_image_error() -> String {
    "Sorry, I encountered an error processing your image.".to_string()
}

fn default_audio_error() -> String {
    "Sorry, I encountered an error processing your audio. Please try again later.".to_string()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Expand `${VAR_NAME}` patterns in a string using environment variables.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    let mut result = input.to_string();
    let captures: Vec<(String, String)> = re
        .captures_iter(input)
        .map(|cap| (cap[0].to_string(), cap[1].to_string()))
        .collect();
    for (full_match, var_name) in captures {
        let value = std::env::var(&var_name)
            .map_err(|_| ConfigError::MissingEnvVar(var_name.clone()))?;
        result = result.replace(&full_match, &value);
    }
    Ok(result)
}

/// Default config directory: ~/.linebridge/
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".linebridge")
}

/// Resolve the config file path, defaulting to `~/.linebridge/config.toml`.
pub fn config_path(path: Option<&Path>) -> PathBuf {
    match path {
        Some(p) => p.to_path_buf(),
        None => config_dir().join("config.toml"),
    }
}

/// Load config from `~/.linebridge/config.toml` (or a custom path).
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = config_path(path);

    if !config_path.exists() {
        return Err(ConfigError::NotFound(config_path));
    }

    let raw = std::fs::read_to_string(&config_path)?;
    parse_config(&raw)
}

/// Parse and validate a config string (after reading from file).
pub fn parse_config(raw: &str) -> Result<Config, ConfigError> {
    let expanded = expand_env_vars(raw)?;
    let config: Config = toml::from_str(&expanded)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.line.max_message_len <= 0 {
            return Err(ConfigError::Invalid(format!(
                "line.max_message_len must be positive, got {}",
                self.line.max_message_len
            )));
        }
        if !(1..=5).contains(&self.line.max_messages_per_request) {
            return Err(ConfigError::Invalid(format!(
                "line.max_messages_per_request must be between 1 and 5, got {}",
                self.line.max_messages_per_request
            )));
        }
        if !self.server.webhook_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "server.webhook_path must start with '/', got {:?}",
                self.server.webhook_path
            )));
        }
        if self.llm.mode == LlmMode::Assistant
            && self
                .llm
                .assistant
                .assistant_id
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(ConfigError::Invalid(
                "llm.assistant.assistant_id is required when llm.mode = \"assistant\"".into(),
            ));
        }
        Ok(())
    }

    /// Socket address the webhook server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

/// Template written by `linebridge init`.
pub const CONFIG_TEMPLATE: &str = r#"[server]
bind = "127.0.0.1"
port = 8080
webhook_path = "/callback"

[line]
channel_secret = "${LINE_CHANNEL_SECRET}"
channel_access_token = "${LINE_CHANNEL_ACCESS_TOKEN}"
max_message_len = 5000

[llm]
# "chat" for stateless completions, "assistant" for per-user threads
mode = "chat"
api_key = "${OPENAI_API_KEY}"

[llm.chat]
model = "gpt-4o"
max_tokens = 2000
temperature = 0.7

[llm.assistant]
# assistant_id = "asst_..."
poll_interval_ms = 1000
run_timeout_secs = 120

[llm.transcription]
model = "whisper-1"
"#;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
