// Gallery metadata -> ordered, display-ready image urls

use std::collections::HashMap;

use serde::Serialize;

use crate::feed::{GalleryItem, MediaMetadata, Post};

/// Smallest preview width worth sending to the model.
pub const MIN_PREVIEW_WIDTH: u32 = 640;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedImageSet {
    pub urls: Vec<String>,
    /// Gallery media ids that had no metadata entry; skipped, not fatal.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<String>,
}

impl ResolvedImageSet {
    pub fn len(&self) -> usize { self.urls.len() }
    pub fn is_empty(&self) -> bool { self.urls.is_empty() }
}

/// `None` for posts that are not galleries (no media metadata at all).
pub fn resolve(post: &Post) -> Option<ResolvedImageSet> {
    let metadata = post.media_metadata.as_ref()?;
    Some(resolve_items(&post.gallery_items, metadata))
}

pub fn resolve_items(items: &[GalleryItem], metadata: &HashMap<String, MediaMetadata>) -> ResolvedImageSet {
    let mut out = ResolvedImageSet::default();
    for item in items {
        match metadata.get(&item.media_id) {
            Some(meta) => out.urls.push(decode_url(select_url(meta))),
            None => out.missing.push(item.media_id.clone()),
        }
    }
    out
}

/// First preview at least `MIN_PREVIEW_WIDTH` wide, in feed order; else the original.
/// Not the widest: feed order decides.
pub fn select_url(meta: &MediaMetadata) -> &str {
    meta.preview_variants
        .iter()
        .find(|v| v.width >= MIN_PREVIEW_WIDTH)
        .map(|v| v.url.as_str())
        .unwrap_or(meta.original_variant.url.as_str())
}

pub fn decode_url(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ImageVariant;

    fn variant(width: u32, url: &str) -> ImageVariant {
        ImageVariant { width, height: width, url: url.to_string() }
    }

    fn meta(id: &str, previews: Vec<ImageVariant>, original: &str) -> MediaMetadata {
        MediaMetadata { id: id.to_string(), preview_variants: previews, original_variant: variant(4000, original) }
    }

    fn gallery_post(ids: &[&str], entries: Vec<MediaMetadata>) -> Post {
        Post {
            id: "p1".into(),
            title: "Owlbear".into(),
            author: "a".into(),
            permalink: "/r/monsteraday/comments/p1/".into(),
            url: "https://www.reddit.com/gallery/p1".into(),
            gallery_items: ids.iter().map(|id| GalleryItem { media_id: id.to_string() }).collect(),
            media_metadata: Some(entries.into_iter().map(|m| (m.id.clone(), m)).collect()),
        }
    }

    #[test]
    fn picks_first_wide_enough_preview_not_widest() {
        let m = meta("a", vec![variant(320, "small"), variant(800, "U1"), variant(1200, "U2")], "orig");
        assert_eq!(select_url(&m), "U1");
    }

    #[test]
    fn exactly_640_qualifies() {
        let m = meta("a", vec![variant(639, "narrow"), variant(640, "edge")], "orig");
        assert_eq!(select_url(&m), "edge");
    }

    #[test]
    fn falls_back_to_original_when_all_previews_narrow() {
        let m = meta("a", vec![variant(108, "x"), variant(216, "y"), variant(320, "z")], "orig");
        assert_eq!(select_url(&m), "orig");
        let empty = meta("b", vec![], "orig-b");
        assert_eq!(select_url(&empty), "orig-b");
    }

    #[test]
    fn feed_order_wins_over_width_order() {
        let m = meta("a", vec![variant(1200, "wide-first"), variant(800, "narrower")], "orig");
        assert_eq!(select_url(&m), "wide-first");
    }

    #[test]
    fn decodes_html_entities() {
        assert_eq!(
            decode_url("https://preview.redd.it/x.png?width=960&amp;format=png&amp;s=abc"),
            "https://preview.redd.it/x.png?width=960&format=png&s=abc"
        );
        assert_eq!(decode_url("https://i.redd.it/plain.png"), "https://i.redd.it/plain.png");
    }

    #[test]
    fn preserves_gallery_order_and_decodes() {
        let post = gallery_post(
            &["b", "a"],
            vec![
                meta("a", vec![variant(960, "https://p/a?w=960&amp;s=1")], "orig-a"),
                meta("b", vec![], "https://i/b.png"),
            ],
        );
        let set = resolve(&post).unwrap();
        assert_eq!(set.urls, vec!["https://i/b.png".to_string(), "https://p/a?w=960&s=1".to_string()]);
        assert!(set.missing.is_empty());
    }

    #[test]
    fn missing_metadata_entries_are_skipped() {
        let post = gallery_post(&["a", "ghost", "b"], vec![meta("a", vec![], "A"), meta("b", vec![], "B")]);
        let set = resolve(&post).unwrap();
        assert_eq!(set.urls, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(set.missing, vec!["ghost".to_string()]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn non_gallery_post_resolves_to_none() {
        let mut post = gallery_post(&["a"], vec![meta("a", vec![], "A")]);
        post.media_metadata = None;
        assert!(resolve(&post).is_none());
    }

    #[test]
    fn metadata_without_gallery_items_is_empty_set() {
        let post = gallery_post(&[], vec![meta("a", vec![], "A")]);
        let set = resolve(&post).unwrap();
        assert!(set.is_empty());
    }
}
