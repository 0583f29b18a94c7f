use async_trait::async_trait;
use clap::ValueEnum;
use reqwest::StatusCode;
use thiserror::Error;

pub mod auth;
pub mod reddit;
pub mod types;

pub use reddit::RedditClient;
pub use types::{GalleryItem, ImageVariant, MediaMetadata, Post};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("invalid TOTP secret: {0}")]
    Totp(String),
    #[error("reddit authentication failed: {0}")]
    Auth(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("reddit returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("could not decode listing: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Sort {
    Hot,
    New,
    Top,
    Rising,
}

impl Sort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sort::Hot => "hot",
            Sort::New => "new",
            Sort::Top => "top",
            Sort::Rising => "rising",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingQuery {
    pub subreddit: String,
    pub sort: Sort,
    pub limit: u32,
}

impl ListingQuery {
    /// Relative listing path, e.g. `r/monsteraday/hot`.
    pub fn path(&self) -> String {
        let sub = self.subreddit.trim_start_matches("r/").trim_matches('/');
        format!("r/{}/{}", sub, self.sort.as_str())
    }
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_listing(&self, query: &ListingQuery) -> Result<Vec<Post>, FeedError>;
}

/// Fixed in-memory listing for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct StaticFeed {
    pub posts: Vec<Post>,
}

#[cfg(test)]
#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch_listing(&self, query: &ListingQuery) -> Result<Vec<Post>, FeedError> {
        Ok(self.posts.iter().take(query.limit as usize).cloned().collect())
    }
}
