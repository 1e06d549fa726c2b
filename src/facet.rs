//! Rich-text facets (`app.bsky.richtext.facet`). Bluesky doesn't linkify post
//! text on its own: a URL is only clickable when a facet marks its byte range.

use serde::{Deserialize, Serialize};

/// Annotates a byte range of a post's text with one or more features.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<Feature>,
}

/// A half-open range of UTF-8 byte offsets into the post text.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "$type")]
pub enum Feature {
    /// Makes the range a hyperlink to `uri`.
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
}

/// Returns a link facet covering the first occurrence of `url` in `text`, or
/// nothing if `text` doesn't contain it.
pub fn link_facets(text: &str, url: &str) -> Vec<Facet> {
    if url.is_empty() {
        return Vec::new();
    }
    match text.find(url) {
        Some(start) => vec![Facet {
            index: ByteSlice {
                byte_start: start,
                byte_end: start + url.len(),
            },
            features: vec![Feature::Link {
                uri: url.to_owned(),
            }],
        }],
        None => Vec::new(),
    }
}
