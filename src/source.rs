//! Item Source: the remote feed / bookmark / settings service.
//!
//! The feed core never talks to the network itself. It asks for work through
//! effects, and the runtime calls an [`ItemSource`] on a background thread.
//! Every call may fail; callers treat all [`SourceError`] variants alike.

use std::time::Duration;

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::item::{Bookmark, FeedItem, ItemsEnvelope, Settings, SettingsUpdate};
use crate::media;

pub type UserId = u64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("{endpoint}: server answered {code}")]
    Status { endpoint: String, code: u16 },
    #[error("{endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint}: unreadable response: {message}")]
    Decode { endpoint: String, message: String },
    #[error("media: {0}")]
    Media(String),
}

impl SourceError {
    fn from_ureq(endpoint: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => SourceError::Status {
                endpoint: endpoint.to_string(),
                code,
            },
            other => SourceError::Transport {
                endpoint: endpoint.to_string(),
                message: other.to_string(),
            },
        }
    }

    fn decode(endpoint: &str, err: impl std::fmt::Display) -> Self {
        SourceError::Decode {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        }
    }
}

/// Remote collaborator consumed by the feed core.
///
/// Implementations block; the runtime runs each call on its own thread.
pub trait ItemSource: Send + Sync {
    fn fetch_initial_batch(&self, user: UserId) -> Result<Vec<FeedItem>, SourceError>;
    /// Kick off personalized feed generation. The ack carries no data.
    fn begin_generation(&self, user: UserId) -> Result<(), SourceError>;
    fn fetch_next_item(&self, user: UserId) -> Result<FeedItem, SourceError>;
    fn fetch_bookmarks(&self, user: UserId) -> Result<Vec<Bookmark>, SourceError>;
    fn add_bookmark(&self, content_id: &str, user: UserId) -> Result<(), SourceError>;
    fn remove_bookmark(&self, content_id: &str, user: UserId) -> Result<(), SourceError>;
    fn fetch_settings(&self, user: UserId) -> Result<Settings, SourceError>;
    fn update_settings(
        &self,
        user: UserId,
        update: &SettingsUpdate,
    ) -> Result<Settings, SourceError>;
    fn search_items(&self, query: &str) -> Result<Vec<FeedItem>, SourceError>;
    /// Turn a media locator into playable bytes (download or decode).
    fn resolve_media(&self, locator: &str) -> Result<Vec<u8>, SourceError>;
}

#[derive(Serialize)]
struct InitialRequest<'a> {
    uuid: &'a str,
    voice_type: u32,
}

#[derive(Serialize)]
struct BookmarkRequest<'a> {
    paper_id: &'a str,
}

/// HTTP client for the feed service.
pub struct HttpSource {
    agent: ureq::Agent,
    base_url: String,
    device_id: String,
    voice_type: u32,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration, device_id: &str, voice_type: u32) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            device_id: device_id.to_string(),
            voice_type,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl ItemSource for HttpSource {
    fn fetch_initial_batch(&self, user: UserId) -> Result<Vec<FeedItem>, SourceError> {
        let endpoint = "feed/initial";
        let url = self.url(&format!("feed/initial/{user}"));
        debug!("source: POST {url}");
        let body = InitialRequest {
            uuid: &self.device_id,
            voice_type: self.voice_type,
        };
        let mut resp = self
            .agent
            .post(&url)
            .send_json(&body)
            .map_err(|e| SourceError::from_ureq(endpoint, e))?;
        let env: ItemsEnvelope<FeedItem> = resp
            .body_mut()
            .read_json()
            .map_err(|e| SourceError::decode(endpoint, e))?;
        Ok(env.items)
    }

    fn begin_generation(&self, user: UserId) -> Result<(), SourceError> {
        let url = self.url(&format!("feed/generate/{user}"));
        debug!("source: POST {url}");
        self.agent
            .post(&url)
            .send_empty()
            .map_err(|e| SourceError::from_ureq("feed/generate", e))?;
        Ok(())
    }

    fn fetch_next_item(&self, user: UserId) -> Result<FeedItem, SourceError> {
        let endpoint = "feed/next";
        let url = self.url(&format!("feed/next/{user}"));
        debug!("source: GET {url}");
        let mut resp = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| SourceError::from_ureq(endpoint, e))?;
        resp.body_mut()
            .read_json()
            .map_err(|e| SourceError::decode(endpoint, e))
    }

    fn fetch_bookmarks(&self, user: UserId) -> Result<Vec<Bookmark>, SourceError> {
        let endpoint = "bookmarks";
        let url = self.url(&format!("bookmarks/{user}"));
        debug!("source: GET {url}");
        let mut resp = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| SourceError::from_ureq(endpoint, e))?;
        let env: ItemsEnvelope<Bookmark> = resp
            .body_mut()
            .read_json()
            .map_err(|e| SourceError::decode(endpoint, e))?;
        Ok(env.items)
    }

    fn add_bookmark(&self, content_id: &str, user: UserId) -> Result<(), SourceError> {
        let url = self.url(&format!("bookmarks/{user}"));
        debug!("source: POST {url} paper_id={content_id}");
        self.agent
            .post(&url)
            .send_json(&BookmarkRequest {
                paper_id: content_id,
            })
            .map_err(|e| SourceError::from_ureq("bookmarks/add", e))?;
        Ok(())
    }

    fn remove_bookmark(&self, content_id: &str, user: UserId) -> Result<(), SourceError> {
        let url = self.url(&format!("bookmarks/{user}"));
        debug!("source: DELETE {url} paper_id={content_id}");
        self.agent
            .delete(&url)
            .force_send_body()
            .send_json(&BookmarkRequest {
                paper_id: content_id,
            })
            .map_err(|e| SourceError::from_ureq("bookmarks/remove", e))?;
        Ok(())
    }

    fn fetch_settings(&self, user: UserId) -> Result<Settings, SourceError> {
        let endpoint = "settings";
        let url = self.url(&format!("settings/{user}"));
        debug!("source: GET {url}");
        let mut resp = self
            .agent
            .get(&url)
            .call()
            .map_err(|e| SourceError::from_ureq(endpoint, e))?;
        resp.body_mut()
            .read_json()
            .map_err(|e| SourceError::decode(endpoint, e))
    }

    fn update_settings(
        &self,
        user: UserId,
        update: &SettingsUpdate,
    ) -> Result<Settings, SourceError> {
        let endpoint = "settings/update";
        let url = self.url(&format!("settings/{user}"));
        debug!("source: PATCH {url}");
        let mut resp = self
            .agent
            .patch(&url)
            .send_json(update)
            .map_err(|e| SourceError::from_ureq(endpoint, e))?;
        resp.body_mut()
            .read_json()
            .map_err(|e| SourceError::decode(endpoint, e))
    }

    fn search_items(&self, query: &str) -> Result<Vec<FeedItem>, SourceError> {
        let endpoint = "search";
        let url = self.url("search");
        debug!("source: GET {url} q={query:?}");
        let mut resp = self
            .agent
            .get(&url)
            .query("q", query)
            .call()
            .map_err(|e| SourceError::from_ureq(endpoint, e))?;
        let env: ItemsEnvelope<FeedItem> = resp
            .body_mut()
            .read_json()
            .map_err(|e| SourceError::decode(endpoint, e))?;
        Ok(env.items)
    }

    fn resolve_media(&self, locator: &str) -> Result<Vec<u8>, SourceError> {
        match media::classify(locator) {
            media::Locator::Remote(url) => {
                debug!("source: GET {url} (media)");
                let mut resp = self
                    .agent
                    .get(url)
                    .call()
                    .map_err(|e| SourceError::from_ureq("media", e))?;
                resp.body_mut()
                    .with_config()
                    .limit(media::MAX_MEDIA_BYTES)
                    .read_to_vec()
                    .map_err(|e| SourceError::Media(e.to_string()))
            }
            other => media::resolve_local(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let src = HttpSource::new("http://127.0.0.1:8000/api/", Duration::from_secs(1), "dev", 3);
        assert_eq!(src.url("feed/next/1"), "http://127.0.0.1:8000/api/feed/next/1");
    }

    #[test]
    fn status_error_keeps_code() {
        let err = SourceError::from_ureq("feed/next", ureq::Error::StatusCode(404));
        assert_eq!(
            err,
            SourceError::Status {
                endpoint: "feed/next".into(),
                code: 404
            }
        );
        assert_eq!(err.to_string(), "feed/next: server answered 404");
    }

    #[test]
    fn inline_media_resolves_without_network() {
        let src = HttpSource::new("http://127.0.0.1:1", Duration::from_millis(10), "dev", 3);
        let bytes = src.resolve_media("data:audio/mpeg;base64,AAEC").unwrap();
        assert_eq!(bytes, vec![0, 1, 2]);
    }
}
