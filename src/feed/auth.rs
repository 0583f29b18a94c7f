use reqwest::Client;
use serde::Deserialize;
use totp_rs::{Algorithm, Secret, TOTP};

use super::FeedError;
use crate::config::RedditConfig;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

#[derive(Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

fn totp_for(secret: &str) -> Result<TOTP, FeedError> {
    let normalized: String = secret.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_uppercase();
    let bytes = Secret::Encoded(normalized)
        .to_bytes()
        .map_err(|e| FeedError::Totp(format!("{e:?}")))?;
    // reddit secrets can be shorter than the 128 bits `TOTP::new` insists on
    Ok(TOTP::new_unchecked(Algorithm::SHA1, 6, 1, 30, bytes))
}

/// Six-digit code for `secret` at `unix_time`.
pub fn totp_code_at(secret: &str, unix_time: u64) -> Result<String, FeedError> {
    Ok(totp_for(secret)?.generate(unix_time))
}

/// Reddit takes the 2FA code appended to the password as `password:code`.
pub fn grant_password(password: &str, totp_secret: Option<&str>) -> Result<String, FeedError> {
    let Some(secret) = totp_secret else { return Ok(password.to_string()) };
    let code = totp_for(secret)?
        .generate_current()
        .map_err(|e| FeedError::Totp(e.to_string()))?;
    Ok(format!("{password}:{code}"))
}

pub async fn fetch_token(http: &Client, cfg: &RedditConfig) -> Result<AccessToken, FeedError> {
    let password = grant_password(&cfg.password, cfg.totp_secret.as_deref())?;
    let form = [
        ("grant_type", "password"),
        ("username", cfg.username.as_str()),
        ("password", password.as_str()),
    ];

    let response = http
        .post(TOKEN_URL)
        .basic_auth(&cfg.client_id, Some(&cfg.client_secret))
        .form(&form)
        .send()
        .await?;

    let status = response.status();
    let bytes = response.bytes().await?;
    if !status.is_success() {
        return Err(FeedError::Status { status, body: String::from_utf8_lossy(&bytes).into_owned() });
    }
    parse_token(&bytes)
}

fn parse_token(bytes: &[u8]) -> Result<AccessToken, FeedError> {
    let body: TokenResponse = serde_json::from_slice(bytes)?;
    if let Some(err) = body.error {
        return Err(FeedError::Auth(err));
    }
    match body.access_token {
        Some(value) if !value.is_empty() => Ok(AccessToken { value, expires_in: body.expires_in }),
        _ => Err(FeedError::Auth("token response carried no access_token".into())),
    }
}
