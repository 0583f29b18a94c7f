use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::llm::openai::{
    ChatCompletionResponse, LlmClient, OpenAiClient, OpenAiClientConfig, OpenAiError, UsageMetrics,
};
use crate::telemetry;
use crate::telemetry::ops::extract::Phase as ExtractPhase;

pub mod reply;
pub mod request;
pub mod statblock;

pub use reply::{ExtractionReply, ReplyParseError};
pub use request::ExtractionRequest;
pub use statblock::{ArityError, Statblock};

/// Four ways an extraction can fail; callers need to tell them apart.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("completion request failed: {0}")]
    Transport(#[source] OpenAiError),
    #[error("completion service reported an error: {message}")]
    RemoteApi {
        message: String,
        #[source]
        source: OpenAiError,
    },
    #[error("model could not read a statblock:{0}")]
    ModelFailure(String),
    #[error("could not parse model reply: {0}")]
    Parse(#[from] ReplyParseError),
    #[error("model reply has the wrong shape: {0}")]
    Arity(#[from] ArityError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transport,
    RemoteApi,
    ModelFailure,
    Parse,
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Transport(_) => ErrorKind::Transport,
            ExtractError::RemoteApi { .. } => ErrorKind::RemoteApi,
            ExtractError::ModelFailure(_) => ErrorKind::ModelFailure,
            ExtractError::Parse(_) | ExtractError::Arity(_) => ErrorKind::Parse,
        }
    }
}

impl From<OpenAiError> for ExtractError {
    fn from(err: OpenAiError) -> Self {
        match err.remote_message().map(str::to_string) {
            Some(message) => ExtractError::RemoteApi { message, source: err },
            None => ExtractError::Transport(err),
        }
    }
}

/// Fields pulled out of one successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extracted {
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statblock: Option<Statblock>,
}

/// One network exchange; returns the first choice's text.
pub async fn complete(
    client: &dyn LlmClient,
    request: &ExtractionRequest,
) -> Result<ChatCompletionResponse, ExtractError> {
    Ok(client.chat_completion(request.to_chat_request()).await?)
}

/// Reply text -> fields. With `strict`, anything but five fields is an error;
/// otherwise the statblock view is filled only when the arity fits.
pub fn interpret(raw: &str, strict: bool) -> Result<Extracted, ExtractError> {
    let fields = match reply::parse(raw)? {
        ExtractionReply::Failure(reason) => return Err(ExtractError::ModelFailure(reason)),
        ExtractionReply::Record(fields) => fields,
    };
    let statblock = match Statblock::try_from(fields.clone()) {
        Ok(sb) => Some(sb),
        Err(err) if strict => return Err(err.into()),
        Err(_) => None,
    };
    Ok(Extracted { fields, statblock })
}

#[derive(Args, Debug)]
pub struct ExtractCmd {
    /// Image urls to send, in order
    #[arg(required = true, num_args = 1..)]
    urls: Vec<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    max_tokens: Option<u32>,
    /// Require exactly five fields in the reply
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Serialize)]
struct ExtractResult<'a> {
    model: &'a str,
    images: &'a [String],
    #[serde(flatten)]
    extracted: &'a Extracted,
    usage: Option<UsageDto>,
}

#[derive(Serialize)]
pub struct UsageDto {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl From<UsageMetrics> for UsageDto {
    fn from(u: UsageMetrics) -> Self {
        UsageDto { prompt_tokens: u.prompt_tokens, completion_tokens: u.completion_tokens, total_tokens: u.total_tokens }
    }
}

pub async fn run(args: ExtractCmd) -> Result<()> {
    let log = telemetry::extract();
    let _g = log
        .root_span_kv([
            ("images", args.urls.len().to_string()),
            ("model", format!("{:?}", args.model)),
            ("max_tokens", format!("{:?}", args.max_tokens)),
            ("strict", args.strict.to_string()),
        ])
        .entered();

    for u in &args.urls {
        if Url::parse(u).is_err() { bail!("Invalid URL: {}", u); }
    }

    let client_cfg = OpenAiClientConfig::from_env();
    let request = {
        let _s = log.span(&ExtractPhase::Build).entered();
        ExtractionRequest::build(&args.urls)
            .with_model(args.model.clone().unwrap_or_else(|| client_cfg.default_model.clone()))
            .with_max_tokens(args.max_tokens.unwrap_or(client_cfg.default_max_tokens))
    };

    let client = OpenAiClient::new(client_cfg).context("init OpenAI client")?;

    let response = {
        let _s = log.span_kv(&ExtractPhase::Complete, [("model", request.model_id.clone())]).entered();
        log.info(format!("🧠 Sending {} image(s) to {}", request.image_urls.len(), request.model_id));
        match complete(&client, &request).await {
            Ok(resp) => resp,
            Err(err) => {
                log.warn(format!("⚠️  {err}"));
                return Err(anyhow::Error::new(err).context("call OpenAI chat completion"));
            }
        }
    };

    let extracted = {
        let _s = log.span(&ExtractPhase::Parse).entered();
        match interpret(&response.content, args.strict) {
            Ok(x) => x,
            Err(err) => {
                log.warn(format!("⚠️  {err}"));
                return Err(anyhow::Error::new(err).context("interpret model reply"));
            }
        }
    };
    log.info(format!("📜 {:?}", extracted.fields));

    let _s = log.span(&ExtractPhase::Output).entered();
    let result = ExtractResult {
        model: &request.model_id,
        images: &request.image_urls,
        extracted: &extracted,
        usage: response.usage.map(UsageDto::from),
    };
    log.result(&result)?;
    Ok(())
}
