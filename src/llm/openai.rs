#[cfg(test)]
use std::collections::VecDeque;
#[cfg(test)]
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4-vision-preview";
pub(crate) const DEFAULT_MAX_TOKENS: u32 = 300;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    pub default_max_tokens: u32,
    pub timeout: Duration,
}

impl Default for OpenAiClientConfig {
    fn default() -> Self {
        Self {
            api_key: env_api_key(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            default_max_tokens: DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl OpenAiClientConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(base) = std::env::var("OPENAI_BASE_URL") {
            cfg.base_url = base;
        }
        if let Ok(max) = std::env::var("OPENAI_MAX_TOKENS") {
            if let Ok(parsed) = max.parse::<u32>() {
                cfg.default_max_tokens = parsed;
            }
        }
        if let Ok(timeout) = std::env::var("OPENAI_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                cfg.timeout = Duration::from_secs(parsed);
            }
        }
        cfg
    }
}

// OPENAI_TOKEN is the older name some .env files still carry
fn env_api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .or_else(|_| std::env::var("OPENAI_TOKEN"))
        .ok()
        .filter(|k| !k.trim().is_empty())
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: HttpClient,
    cfg: OpenAiClientConfig,
}

impl OpenAiClient {
    pub fn new(cfg: OpenAiClientConfig) -> Result<Self, OpenAiError> {
        let http = HttpClient::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(OpenAiError::http)?;
        Ok(Self { http, cfg })
    }

    fn resolve_api_key(&self) -> Result<String, OpenAiError> {
        if let Some(key) = &self.cfg.api_key {
            return Ok(key.clone());
        }
        env_api_key().ok_or(OpenAiError::MissingApiKey)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        )
    }

    fn build_api_request(&self, req: &ChatCompletionRequest) -> ApiChatCompletionRequest {
        ApiChatCompletionRequest {
            model: req
                .model
                .clone()
                .unwrap_or_else(|| self.cfg.default_model.clone()),
            max_tokens: req.max_tokens.unwrap_or(self.cfg.default_max_tokens),
            messages: req
                .messages
                .iter()
                .map(|m| ApiChatMessage {
                    role: m.role.as_api_str().to_string(),
                    content: m.content.iter().map(ApiContentPart::from).collect(),
                })
                .collect(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, OpenAiError>;
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, OpenAiError> {
        if request.messages.is_empty() {
            return Err(OpenAiError::EmptyMessages);
        }

        let api_key = self.resolve_api_key()?;
        let api_request = self.build_api_request(&request);
        let endpoint = self.endpoint();

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(OpenAiError::from_reqwest)?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(OpenAiError::from_reqwest)?;

        decode_response(status, &bytes)
    }
}

/// The envelope carries either `choices` or an `error` object; the error wins
/// even on a 2xx status.
pub(crate) fn decode_response(
    status: StatusCode,
    bytes: &[u8],
) -> Result<ChatCompletionResponse, OpenAiError> {
    let parsed = match serde_json::from_slice::<ApiChatCompletionResponse>(bytes) {
        Ok(parsed) => parsed,
        Err(err) if status.is_success() => return Err(OpenAiError::Decode(err)),
        Err(_) => {
            return Err(OpenAiError::Status {
                status,
                body: String::from_utf8_lossy(bytes).into_owned(),
            })
        }
    };

    if let Some(error) = parsed.error {
        return Err(OpenAiError::Api { status, error });
    }
    if !status.is_success() {
        return Err(OpenAiError::Status {
            status,
            body: String::from_utf8_lossy(bytes).into_owned(),
        });
    }

    // only the first choice counts
    let first = parsed.choices.into_iter().next().ok_or(OpenAiError::NoChoices)?;

    Ok(ChatCompletionResponse {
        content: first.message.content.unwrap_or_default(),
        usage: parsed.usage.map(|usage| UsageMetrics {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }),
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Vec<ContentPart>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    ImageUrl(String),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChatRole {
    User,
}

impl ChatRole {
    fn as_api_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
        }
    }
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: Vec<ContentPart>) -> Self {
        Self { role, content }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatCompletionResponse {
    pub content: String,
    pub usage: Option<UsageMetrics>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UsageMetrics {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

#[derive(Debug)]
pub enum OpenAiError {
    MissingApiKey,
    EmptyMessages,
    Http(reqwest::Error),
    Timeout,
    /// The service answered with its own `error` object.
    Api {
        status: StatusCode,
        error: ApiErrorBody,
    },
    /// Non-2xx without a recognizable error object (proxies, gateways).
    Status {
        status: StatusCode,
        body: String,
    },
    NoChoices,
    #[cfg(test)]
    MockQueueEmpty,
    Decode(serde_json::Error),
}

impl OpenAiError {
    fn http(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OpenAiError::Timeout
        } else {
            OpenAiError::Http(err)
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        Self::http(err)
    }

    /// Message reported by the remote service itself, if any.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            OpenAiError::Api { error, .. } => Some(error.message.as_str()),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpenAiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenAiError::MissingApiKey => write!(f, "OPENAI_API_KEY is not set"),
            OpenAiError::EmptyMessages => {
                write!(f, "chat completion requires at least one message")
            }
            OpenAiError::Http(err) => write!(f, "http error: {err}"),
            OpenAiError::Timeout => write!(f, "request timed out"),
            OpenAiError::Api { status, error } => {
                write!(f, "api error {status}: {}", error.message)
            }
            OpenAiError::Status { status, body } => {
                write!(f, "unexpected status {status}: {}", body.trim())
            }
            OpenAiError::NoChoices => write!(f, "completion response carried no choices"),
            #[cfg(test)]
            OpenAiError::MockQueueEmpty => {
                write!(f, "mock client response queue is empty")
            }
            OpenAiError::Decode(err) => write!(f, "decode error: {err}"),
        }
    }
}

impl std::error::Error for OpenAiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpenAiError::Http(err) => Some(err),
            OpenAiError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub param: Option<Value>,
    #[serde(default)]
    pub code: Option<Value>,
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockClient {
    responses: Mutex<VecDeque<Result<ChatCompletionResponse, OpenAiError>>>,
    calls: Mutex<Vec<ChatCompletionRequest>>,
}

#[cfg(test)]
impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(
        &self,
        resp: Result<ChatCompletionResponse, OpenAiError>,
    ) {
        self.responses.lock().unwrap().push_back(resp);
    }

    pub fn push_reply(&self, content: &str) {
        self.push_response(Ok(ChatCompletionResponse { content: content.to_string(), usage: None }));
    }

    pub fn calls(&self) -> Vec<ChatCompletionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for MockClient {
    async fn chat_completion(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, OpenAiError> {
        self.calls.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OpenAiError::MockQueueEmpty))
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ApiChatCompletionRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiChatMessage>,
}

#[derive(Debug, Clone, Serialize)]
struct ApiChatMessage {
    role: String,
    content: Vec<ApiContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    Text { text: String },
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Clone, Serialize)]
struct ApiImageUrl {
    url: String,
}

impl From<&ContentPart> for ApiContentPart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => ApiContentPart::Text { text: text.clone() },
            ContentPart::ImageUrl(url) => ApiContentPart::ImageUrl { image_url: ApiImageUrl { url: url.clone() } },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ApiChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ApiChatChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiChatChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

#[cfg(test)]
impl OpenAiClient {
    pub(crate) fn build_request_for_tests(
        &self,
        req: &ChatCompletionRequest,
    ) -> ApiChatCompletionRequest {
        self.build_api_request(req)
    }
}
