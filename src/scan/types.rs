use serde::Serialize;

use crate::extract::{ErrorKind, ExtractError, Extracted, UsageDto};
use crate::feed::Post;
use crate::gallery::ResolvedImageSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    /// No media metadata: not a gallery post.
    Skipped,
    /// Dry run: request built, not sent.
    Planned,
    Extracted,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Serialize)]
pub struct PostOutcome {
    pub id: String,
    pub title: String,
    pub permalink: String,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_media: Vec<String>,
    #[serde(flatten)]
    pub extracted: Option<Extracted>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PostError>,
}

impl PostOutcome {
    pub fn skipped(post: &Post) -> Self {
        Self::new(post, PostStatus::Skipped, ResolvedImageSet::default())
    }

    pub fn new(post: &Post, status: PostStatus, images: ResolvedImageSet) -> Self {
        PostOutcome {
            id: post.id.clone(),
            title: post.title.clone(),
            permalink: post.permalink.clone(),
            status,
            images: images.urls,
            missing_media: images.missing,
            extracted: None,
            usage: None,
            error: None,
        }
    }

    pub fn fail(&mut self, err: &ExtractError) {
        self.status = PostStatus::Failed;
        self.error = Some(PostError { kind: err.kind(), message: err.to_string() });
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanTotals {
    pub posts: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub planned: usize,
    pub failed: usize,
}

#[derive(Serialize)]
pub struct ScanReport {
    pub listing: String,
    pub model: String,
    pub dry_run: bool,
    pub totals: ScanTotals,
    pub posts: Vec<PostOutcome>,
}

impl ScanReport {
    pub fn push(&mut self, outcome: PostOutcome) {
        self.totals.posts += 1;
        match outcome.status {
            PostStatus::Skipped => self.totals.skipped += 1,
            PostStatus::Planned => self.totals.planned += 1,
            PostStatus::Extracted => self.totals.extracted += 1,
            PostStatus::Failed => self.totals.failed += 1,
        }
        self.posts.push(outcome);
    }
}
