use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder};

use super::auth::{self, AccessToken};
use super::types::{Listing, Post};
use super::{FeedError, FeedSource, ListingQuery};
use crate::config::RedditConfig;

const OAUTH_BASE_URL: &str = "https://oauth.reddit.com";
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Authenticated reddit session; the token lives as long as the client.
pub struct RedditClient {
    http: Client,
    token: AccessToken,
    base_url: String,
}

impl RedditClient {
    pub async fn connect(cfg: &RedditConfig) -> Result<Self, FeedError> {
        let http = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        let token = auth::fetch_token(&http, cfg).await?;
        tracing::debug!(expires_in = ?token.expires_in, "reddit token acquired");
        Ok(Self { http, token, base_url: OAUTH_BASE_URL.to_string() })
    }

    fn listing_url(&self, query: &ListingQuery) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), query.path())
    }

    fn listing_request(&self, query: &ListingQuery) -> RequestBuilder {
        self.http
            .get(self.listing_url(query))
            .query(&[("limit", query.limit)])
            .bearer_auth(&self.token.value)
    }

    async fn fetch_raw(&self, query: &ListingQuery) -> Result<Bytes, FeedError> {
        let response = self.listing_request(query).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(FeedError::Status { status, body: String::from_utf8_lossy(&bytes).into_owned() });
        }
        Ok(bytes)
    }
}

pub fn decode_listing(bytes: &[u8]) -> Result<Vec<Post>, FeedError> {
    let listing: Listing = serde_json::from_slice(bytes)?;
    Ok(listing.into_posts())
}

#[async_trait]
impl FeedSource for RedditClient {
    async fn fetch_listing(&self, query: &ListingQuery) -> Result<Vec<Post>, FeedError> {
        let bytes = self.fetch_raw(query).await?;
        decode_listing(&bytes)
    }
}
