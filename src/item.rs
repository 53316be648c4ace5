//! Data model shared by the feed core, the Item Source and the viewer.
//!
//! Wire names follow the feed service (`feed_id`, `paper_id`, `summary`, ...);
//! the Rust side uses the names the feed core reasons about.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Deserializer, Serialize};

/// One entry of the feed.
///
/// Everything but `bookmarked` is fixed once the item leaves the Item Source.
/// `bookmarked` is only written by the bookmark coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "WireFeedItem")]
pub struct FeedItem {
    /// Stable within a session.
    pub id: String,
    /// Stable across sessions; the bookmark key.
    pub content_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub body: String,
    /// Locator of the narrated audio (see [`crate::media`]).
    pub media_url: String,
    pub external_url: String,
    pub bookmarked: bool,
}

impl FeedItem {
    /// Authors joined for one-line display.
    pub fn author_line(&self) -> String {
        self.authors.join(", ")
    }
}

#[derive(Deserialize)]
struct WireFeedItem {
    #[serde(deserialize_with = "string_or_number")]
    feed_id: String,
    #[serde(deserialize_with = "string_or_number")]
    paper_id: String,
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    audio_base64: Option<String>,
    #[serde(default)]
    paper_url: String,
    #[serde(default)]
    is_bookmarked: bool,
}

impl From<WireFeedItem> for FeedItem {
    fn from(w: WireFeedItem) -> Self {
        let media_url = match (w.audio_url, w.audio_base64) {
            (Some(url), _) if !url.is_empty() => url,
            (_, Some(b64)) if !b64.is_empty() => inline_audio_locator(&b64),
            _ => String::new(),
        };
        Self {
            id: w.feed_id,
            content_id: w.paper_id,
            title: w.title,
            authors: w.authors,
            body: w.summary,
            media_url,
            external_url: w.paper_url,
            bookmarked: w.is_bookmarked,
        }
    }
}

/// Wrap a raw base64 audio payload into a `data:` URI.
fn inline_audio_locator(b64: &str) -> String {
    format!("data:audio/mpeg;base64,{b64}")
}

/// Build an inline locator from raw audio bytes (used by tests and fixtures).
pub fn inline_audio_from_bytes(bytes: &[u8]) -> String {
    inline_audio_locator(&BASE64.encode(bytes))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Number(i64),
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match IdRepr::deserialize(d)? {
        IdRepr::Text(s) => s,
        IdRepr::Number(n) => n.to_string(),
    })
}

/// `{ "items": [...] }` envelope used by list endpoints.
#[derive(Debug, Deserialize)]
pub struct ItemsEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// A saved bookmark, as listed by the bookmark service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Bookmark {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "references_date")]
    pub saved_at: String,
}

/// Per-user generation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Settings {
    #[serde(default, alias = "voice_type")]
    pub character_voice: Option<u32>,
    #[serde(default)]
    pub additional_prompt: Option<String>,
}

/// Partial settings update; unset fields are left untouched by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_voice: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_prompt: Option<String>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.character_voice.is_none() && self.additional_prompt.is_none()
    }
}

#[cfg(test)]
pub(crate) fn test_item(id: &str) -> FeedItem {
    FeedItem {
        id: id.to_string(),
        content_id: format!("paper-{id}"),
        title: format!("Title {id}"),
        authors: vec!["Ada".into(), "Grace".into()],
        body: format!("Summary of {id}."),
        media_url: format!("https://media.invalid/{id}.mp3"),
        external_url: format!("https://arxiv.invalid/abs/{id}"),
        bookmarked: false,
    }
}
