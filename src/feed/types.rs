use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One image inside a gallery post, in the order the feed returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryItem {
    pub media_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageVariant {
    pub width: u32,
    pub height: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaMetadata {
    pub id: String,
    pub preview_variants: Vec<ImageVariant>,
    pub original_variant: ImageVariant,
}

/// A decoded listing entry. `media_metadata == None` means "not a gallery post".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub author: String,
    pub permalink: String,
    pub url: String,
    pub gallery_items: Vec<GalleryItem>,
    pub media_metadata: Option<HashMap<String, MediaMetadata>>,
}

// Reddit wire format. Field names follow the API (`p`/`s` renditions with `x`/`y`/`u`).

#[derive(Debug, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
pub struct ListingChild {
    pub data: RawPost,
}

#[derive(Debug, Deserialize)]
pub struct RawPost {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub gallery_data: Option<RawGalleryData>,
    #[serde(default)]
    pub media_metadata: Option<HashMap<String, RawMediaMetadata>>,
}

#[derive(Debug, Deserialize)]
pub struct RawGalleryData {
    #[serde(default)]
    pub items: Vec<RawGalleryItem>,
}

#[derive(Debug, Deserialize)]
pub struct RawGalleryItem {
    pub media_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RawMediaMetadata {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "p")]
    pub previews: Vec<RawVariant>,
    #[serde(default, rename = "s")]
    pub source: Option<RawVariant>,
}

#[derive(Debug, Deserialize)]
pub struct RawVariant {
    #[serde(default, rename = "x")]
    pub width: u32,
    #[serde(default, rename = "y")]
    pub height: u32,
    // animated media carry `gif`/`mp4` instead of `u`
    #[serde(default, rename = "u")]
    pub url: Option<String>,
}

impl RawVariant {
    fn into_variant(self) -> Option<ImageVariant> {
        let url = self.url?;
        Some(ImageVariant { width: self.width, height: self.height, url })
    }
}

impl RawMediaMetadata {
    /// None when the entry has no still source rendition (failed upload, animation).
    pub fn into_metadata(self, key: &str) -> Option<MediaMetadata> {
        let original_variant = self.source?.into_variant()?;
        let preview_variants = self
            .previews
            .into_iter()
            .filter_map(RawVariant::into_variant)
            .collect();
        Some(MediaMetadata {
            id: self.id.unwrap_or_else(|| key.to_string()),
            preview_variants,
            original_variant,
        })
    }
}

impl From<RawPost> for Post {
    fn from(raw: RawPost) -> Self {
        let gallery_items = raw
            .gallery_data
            .map(|g| g.items.into_iter().map(|i| GalleryItem { media_id: i.media_id }).collect())
            .unwrap_or_default();

        let media_metadata = raw.media_metadata.map(|entries| {
            entries
                .into_iter()
                .filter_map(|(key, meta)| {
                    let status = meta.status.clone();
                    match meta.into_metadata(&key) {
                        Some(m) => Some((key, m)),
                        None => {
                            tracing::debug!(media_id = %key, status = ?status, "dropping media entry without a still source");
                            None
                        }
                    }
                })
                .collect()
        });

        Post {
            id: raw.id,
            title: raw.title,
            author: raw.author,
            permalink: raw.permalink,
            url: raw.url,
            gallery_items,
            media_metadata,
        }
    }
}

impl Listing {
    pub fn into_posts(self) -> Vec<Post> {
        self.data.children.into_iter().map(|c| Post::from(c.data)).collect()
    }
}
