use anyhow::{bail, Context, Result};
use clap::Args;
use thiserror::Error;

use crate::config::RedditConfig;
use crate::extract::{self, ExtractError, Extracted, ExtractionRequest, UsageDto};
use crate::feed::{FeedError, FeedSource, ListingQuery, RedditClient, Sort};
use crate::gallery;
use crate::llm::openai::{LlmClient, OpenAiClient, OpenAiClientConfig};
use crate::telemetry;
use crate::telemetry::ctx::LogCtx;
use crate::telemetry::ops::scan::{Phase as ScanPhase, Scan};

pub mod types;

use types::{PostOutcome, PostStatus, ScanReport, ScanTotals};

#[derive(Args, Debug)]
pub struct ScanCmd {
    #[arg(long, default_value = "monsteraday")]
    subreddit: String,
    #[arg(long, value_enum, default_value_t = Sort::Hot)]
    sort: Sort,
    #[arg(long, default_value_t = 1)]
    limit: u32,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    max_tokens: Option<u32>,
    /// Require exactly five fields in every reply
    #[arg(long, default_value_t = false)]
    strict: bool,
    /// Record per-post failures and continue instead of stopping the run
    #[arg(long, default_value_t = false)]
    keep_going: bool,
    /// Resolve images and build requests without calling the model
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("could not fetch listing: {0}")]
    Feed(#[from] FeedError),
    #[error("post {title:?}: {source}")]
    Post {
        title: String,
        #[source]
        source: ExtractError,
    },
}

#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub query: ListingQuery,
    pub model: String,
    pub max_tokens: u32,
    pub strict: bool,
    pub keep_going: bool,
    pub dry_run: bool,
}

pub async fn run(args: ScanCmd) -> Result<()> {
    let log = telemetry::scan();
    let _g = log
        .root_span_kv([
            ("subreddit", args.subreddit.clone()),
            ("sort", args.sort.as_str().to_string()),
            ("limit", args.limit.to_string()),
            ("model", format!("{:?}", args.model)),
            ("strict", args.strict.to_string()),
            ("keep_going", args.keep_going.to_string()),
            ("dry_run", args.dry_run.to_string()),
        ])
        .entered();

    let reddit_cfg = RedditConfig::from_env()?;
    let feed = {
        let _s = log.span(&ScanPhase::Authenticate).entered();
        RedditClient::connect(&reddit_cfg)
            .await
            .context("authenticate with reddit")?
    };

    let client_cfg = OpenAiClientConfig::from_env();
    let opts = ScanOptions {
        query: ListingQuery { subreddit: args.subreddit, sort: args.sort, limit: args.limit },
        model: args.model.unwrap_or_else(|| client_cfg.default_model.clone()),
        max_tokens: args.max_tokens.unwrap_or(client_cfg.default_max_tokens),
        strict: args.strict,
        keep_going: args.keep_going,
        dry_run: args.dry_run,
    };
    let client = OpenAiClient::new(client_cfg).context("init OpenAI client")?;

    let report = scan_posts(&feed, &client, &opts, &log).await?;

    let ScanTotals { posts, extracted, skipped, planned, failed } = report.totals.clone();
    log.totals(posts, extracted, skipped, failed);

    let _s = log.span(&ScanPhase::Emit).entered();
    if opts.dry_run {
        log.info(format!("📝 Dry run: {planned} request(s) built, none sent"));
        log.plan(&report)?;
    } else {
        log.result(&report)?;
    }

    if failed > 0 {
        log.error(format!("❌ {failed} post(s) failed"));
        bail!("{failed} of {posts} post(s) failed");
    }
    Ok(())
}

/// Fetch one listing and run every gallery post through the pipeline, one
/// post at a time. Fail-fast unless `keep_going`.
pub async fn scan_posts(
    feed: &dyn FeedSource,
    llm: &dyn LlmClient,
    opts: &ScanOptions,
    log: &LogCtx<Scan>,
) -> Result<ScanReport, ScanError> {
    let posts = {
        let _s = log
            .span_kv(&ScanPhase::FetchListing, [("path", opts.query.path()), ("limit", opts.query.limit.to_string())])
            .entered();
        feed.fetch_listing(&opts.query).await?
    };
    log.info(format!("📡 {} post(s) from {}", posts.len(), opts.query.path()));

    let mut report = ScanReport {
        listing: opts.query.path(),
        model: opts.model.clone(),
        dry_run: opts.dry_run,
        totals: ScanTotals::default(),
        posts: Vec::with_capacity(posts.len()),
    };

    for post in &posts {
        let _p = log.span_kv(&ScanPhase::Post, [("id", post.id.clone())]).entered();

        let images = {
            let _s = log.span(&ScanPhase::Resolve).entered();
            gallery::resolve(post)
        };
        let Some(images) = images else {
            log.info_kv("↩️ skip", [("title", post.title.clone()), ("reason", "no-gallery".to_string())]);
            report.push(PostOutcome::skipped(post));
            continue;
        };

        log.debug(format!("resolved {} image(s), {} missing", images.len(), images.missing.len()));
        for media_id in &images.missing {
            log.warn_kv("⚠️  gallery item without metadata, skipping image", [("media_id", media_id.clone())]);
        }
        if images.is_empty() {
            log.warn_kv("⚠️  gallery resolved to no images; sending instruction only", [("title", post.title.clone())]);
        }
        log.post_header(&post.title, &images.urls);

        let request = {
            let _s = log.span(&ScanPhase::Build).entered();
            ExtractionRequest::build(&images.urls)
                .with_model(opts.model.clone())
                .with_max_tokens(opts.max_tokens)
        };

        if opts.dry_run {
            report.push(PostOutcome::new(post, PostStatus::Planned, images));
            continue;
        }

        let mut outcome = PostOutcome::new(post, PostStatus::Extracted, images);
        match extract_post(llm, &request, opts.strict, log).await {
            Ok((extracted, usage)) => {
                log.info(format!("📜 {:?}", extracted.fields));
                outcome.extracted = Some(extracted);
                outcome.usage = usage;
            }
            Err(err) => {
                log.warn_kv(&format!("⚠️  {err}"), [("title", post.title.clone()), ("kind", format!("{:?}", err.kind()))]);
                if !opts.keep_going {
                    return Err(ScanError::Post { title: post.title.clone(), source: err });
                }
                outcome.fail(&err);
            }
        }
        report.push(outcome);
    }

    Ok(report)
}

async fn extract_post(
    llm: &dyn LlmClient,
    request: &ExtractionRequest,
    strict: bool,
    log: &LogCtx<Scan>,
) -> Result<(Extracted, Option<UsageDto>), ExtractError> {
    let response = {
        let _s = log.span_kv(&ScanPhase::Complete, [("images", request.image_urls.len().to_string())]).entered();
        extract::complete(llm, request).await?
    };
    let extracted = {
        let _s = log.span(&ScanPhase::Parse).entered();
        extract::interpret(&response.content, strict)?
    };
    Ok((extracted, response.usage.map(UsageDto::from)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;

    use crate::extract::ErrorKind;
    use crate::feed::{GalleryItem, ImageVariant, MediaMetadata, Post, StaticFeed};
    use crate::llm::openai::{ContentPart, MockClient, OpenAiError};

    fn text_post(id: &str) -> Post {
        Post {
            id: id.into(),
            title: format!("Discussion {id}"),
            author: "mod".into(),
            permalink: format!("/r/monsteraday/comments/{id}/"),
            url: "https://www.reddit.com/r/monsteraday".into(),
            gallery_items: vec![],
            media_metadata: None,
        }
    }

    fn gallery_post(id: &str, media: &[(&str, &str)]) -> Post {
        let mut metadata = HashMap::new();
        for (media_id, url) in media {
            metadata.insert(
                media_id.to_string(),
                MediaMetadata {
                    id: media_id.to_string(),
                    preview_variants: vec![ImageVariant { width: 960, height: 960, url: url.to_string() }],
                    original_variant: ImageVariant { width: 2000, height: 2000, url: format!("https://i.redd.it/{media_id}.png") },
                },
            );
        }
        Post {
            id: id.into(),
            title: format!("Monster {id}"),
            author: "someone".into(),
            permalink: format!("/r/monsteraday/comments/{id}/"),
            url: format!("https://www.reddit.com/gallery/{id}"),
            gallery_items: media.iter().map(|(m, _)| GalleryItem { media_id: m.to_string() }).collect(),
            media_metadata: Some(metadata),
        }
    }

    fn opts() -> ScanOptions {
        ScanOptions {
            query: ListingQuery { subreddit: "monsteraday".into(), sort: Sort::Hot, limit: 10 },
            model: "gpt-4-vision-preview".into(),
            max_tokens: 300,
            strict: false,
            keep_going: false,
            dry_run: false,
        }
    }

    const OWLBEAR: &str = "\"Owlbear\",\"3\",\"13\",\"Beast\",\"Large\"";

    struct BrokenFeed;

    #[async_trait]
    impl FeedSource for BrokenFeed {
        async fn fetch_listing(&self, _query: &ListingQuery) -> Result<Vec<Post>, FeedError> {
            Err(FeedError::Auth("invalid_grant".into()))
        }
    }

    #[tokio::test]
    async fn non_gallery_posts_issue_no_requests() {
        let feed = StaticFeed {
            posts: vec![text_post("a"), gallery_post("b", &[("m1", "https://preview.redd.it/m1.png?width=960&amp;s=x")]), text_post("c")],
        };
        let mock = MockClient::new();
        mock.push_reply(OWLBEAR);

        let report = scan_posts(&feed, &mock, &opts(), &telemetry::scan()).await.unwrap();

        assert_eq!(mock.calls().len(), 1);
        assert_eq!(report.totals.posts, 3);
        assert_eq!(report.totals.skipped, 2);
        assert_eq!(report.totals.extracted, 1);

        let extracted = &report.posts[1];
        assert_eq!(extracted.status, PostStatus::Extracted);
        assert_eq!(extracted.images, vec!["https://preview.redd.it/m1.png?width=960&s=x".to_string()]);
        assert_eq!(extracted.extracted.as_ref().unwrap().statblock.as_ref().unwrap().size, "Large");

        let parts = &mock.calls()[0].messages[0].content;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], ContentPart::ImageUrl("https://preview.redd.it/m1.png?width=960&s=x".into()));
    }

    #[tokio::test]
    async fn first_failure_aborts_the_run() {
        let feed = StaticFeed {
            posts: vec![gallery_post("a", &[("m1", "https://p/1.png")]), gallery_post("b", &[("m2", "https://p/2.png")])],
        };
        let mock = MockClient::new();
        mock.push_reply("error: no statblock visible");
        mock.push_reply(OWLBEAR);

        let err = scan_posts(&feed, &mock, &opts(), &telemetry::scan()).await.err().unwrap();

        assert_eq!(mock.calls().len(), 1);
        match err {
            ScanError::Post { title, source } => {
                assert_eq!(title, "Monster a");
                assert_eq!(source.kind(), ErrorKind::ModelFailure);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn keep_going_records_failures_and_continues() {
        let feed = StaticFeed {
            posts: vec![
                gallery_post("a", &[("m1", "https://p/1.png")]),
                gallery_post("b", &[("m2", "https://p/2.png")]),
                gallery_post("c", &[("m3", "https://p/3.png")]),
            ],
        };
        let mock = MockClient::new();
        mock.push_reply("\"Owlbear,3");
        mock.push_response(Err(OpenAiError::Timeout));
        mock.push_reply(OWLBEAR);
        let mut o = opts();
        o.keep_going = true;

        let report = scan_posts(&feed, &mock, &o, &telemetry::scan()).await.unwrap();

        assert_eq!(mock.calls().len(), 3);
        assert_eq!(report.totals.failed, 2);
        assert_eq!(report.totals.extracted, 1);
        assert_eq!(report.posts[0].error.as_ref().unwrap().kind, ErrorKind::Parse);
        assert_eq!(report.posts[1].error.as_ref().unwrap().kind, ErrorKind::Transport);
        assert!(report.posts[2].error.is_none());
    }

    #[tokio::test]
    async fn remote_api_error_is_surfaced_with_message() {
        let feed = StaticFeed { posts: vec![gallery_post("a", &[("m1", "https://p/1.png")])] };
        let mock = MockClient::new();
        mock.push_response(Err(OpenAiError::Api {
            status: reqwest::StatusCode::BAD_REQUEST,
            error: crate::llm::openai::ApiErrorBody {
                message: "Invalid image.".into(),
                r#type: Some("invalid_request_error".into()),
                param: None,
                code: None,
            },
        }));

        let err = scan_posts(&feed, &mock, &opts(), &telemetry::scan()).await.err().unwrap();
        let ScanError::Post { source, .. } = err else { panic!("expected post error") };
        assert_eq!(source.kind(), ErrorKind::RemoteApi);
        assert!(source.to_string().contains("Invalid image."));
    }

    #[tokio::test]
    async fn dry_run_builds_but_never_calls_the_model() {
        let feed = StaticFeed {
            posts: vec![gallery_post("a", &[("m1", "https://p/1.png"), ("m2", "https://p/2.png")]), text_post("b")],
        };
        let mock = MockClient::new();
        let mut o = opts();
        o.dry_run = true;

        let report = scan_posts(&feed, &mock, &o, &telemetry::scan()).await.unwrap();

        assert!(mock.calls().is_empty());
        assert_eq!(report.totals.planned, 1);
        assert_eq!(report.totals.skipped, 1);
        assert_eq!(report.posts[0].images.len(), 2);
        assert!(report.dry_run);
        assert_eq!(report.listing, "r/monsteraday/hot");
    }

    #[tokio::test]
    async fn gallery_with_only_missing_metadata_still_sends_one_request() {
        let mut post = gallery_post("a", &[("m1", "https://p/1.png")]);
        post.gallery_items.push(GalleryItem { media_id: "ghost".into() });
        post.media_metadata = Some(HashMap::new());
        let feed = StaticFeed { posts: vec![post] };
        let mock = MockClient::new();
        mock.push_reply(OWLBEAR);

        let report = scan_posts(&feed, &mock, &opts(), &telemetry::scan()).await.unwrap();

        assert_eq!(mock.calls().len(), 1);
        assert_eq!(mock.calls()[0].messages[0].content.len(), 1);
        assert_eq!(report.posts[0].missing_media, vec!["m1".to_string(), "ghost".to_string()]);
    }

    #[tokio::test]
    async fn strict_mode_turns_short_records_into_failures() {
        let feed = StaticFeed { posts: vec![gallery_post("a", &[("m1", "https://p/1.png")])] };
        let mock = MockClient::new();
        mock.push_reply("\"Owlbear\",\"3\"");
        let mut o = opts();
        o.strict = true;

        let err = scan_posts(&feed, &mock, &o, &telemetry::scan()).await.err().unwrap();
        let ScanError::Post { source, .. } = err else { panic!("expected post error") };
        assert_eq!(source.kind(), ErrorKind::Parse);
    }

    #[tokio::test]
    async fn feed_failure_aborts_before_any_request() {
        let mock = MockClient::new();
        let err = scan_posts(&BrokenFeed, &mock, &opts(), &telemetry::scan()).await.err().unwrap();
        assert!(matches!(err, ScanError::Feed(FeedError::Auth(_))));
        assert!(mock.calls().is_empty());
    }
}
