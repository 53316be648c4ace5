//! Media locator resolution.
//!
//! A feed item's `media_url` is one of:
//!   - `data:<mime>;base64,<payload>`: audio shipped inline with the item
//!   - `http://` / `https://`: downloaded by the Item Source
//!   - anything else: a local file path (fixtures, offline caches)

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::source::SourceError;

/// Upper bound for a downloaded audio track.
pub const MAX_MEDIA_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum Locator<'a> {
    Empty,
    Inline(&'a str),
    Remote(&'a str),
    File(&'a str),
}

pub fn classify(locator: &str) -> Locator<'_> {
    let trimmed = locator.trim();
    if trimmed.is_empty() {
        Locator::Empty
    } else if let Some(rest) = trimmed.strip_prefix("data:") {
        Locator::Inline(rest)
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Locator::Remote(trimmed)
    } else {
        Locator::File(trimmed)
    }
}

/// Resolve locators that need no network access.
pub fn resolve_local(locator: Locator<'_>) -> Result<Vec<u8>, SourceError> {
    match locator {
        Locator::Empty => Err(SourceError::Media("item has no audio".into())),
        Locator::Inline(rest) => decode_data_uri(rest),
        Locator::File(path) => {
            std::fs::read(path).map_err(|e| SourceError::Media(format!("{path}: {e}")))
        }
        Locator::Remote(url) => Err(SourceError::Media(format!(
            "{url}: remote media needs a network source"
        ))),
    }
}

/// Decode the part of a `data:` URI after the scheme.
fn decode_data_uri(rest: &str) -> Result<Vec<u8>, SourceError> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| SourceError::Media("malformed data URI".into()))?;
    if !meta.ends_with(";base64") {
        return Err(SourceError::Media(format!(
            "unsupported data URI encoding: {meta}"
        )));
    }
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| SourceError::Media(format!("bad base64 audio: {e}")))?;
    if bytes.is_empty() {
        return Err(SourceError::Media("empty audio payload".into()));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_variants() {
        assert_eq!(classify(""), Locator::Empty);
        assert_eq!(classify("  "), Locator::Empty);
        assert_eq!(classify("data:audio/mpeg;base64,AA=="), Locator::Inline("audio/mpeg;base64,AA=="));
        assert_eq!(classify("https://a.invalid/x.mp3"), Locator::Remote("https://a.invalid/x.mp3"));
        assert_eq!(classify("/tmp/x.mp3"), Locator::File("/tmp/x.mp3"));
    }

    #[test]
    fn inline_decodes() {
        let bytes = resolve_local(classify("data:audio/mpeg;base64,aGVsbG8=")).unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn inline_without_base64_marker_is_rejected() {
        let err = resolve_local(classify("data:text/plain,hello")).unwrap_err();
        assert!(matches!(err, SourceError::Media(m) if m.contains("unsupported")));
    }

    #[test]
    fn empty_locator_is_a_media_error() {
        assert!(matches!(
            resolve_local(Locator::Empty),
            Err(SourceError::Media(_))
        ));
    }

    #[test]
    fn missing_file_is_a_media_error() {
        let err = resolve_local(classify("/nonexistent/feedcast/track.mp3")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/feedcast/track.mp3"));
    }
}
