use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

pub mod youtube;

use crate::{Result, TranscoderError};

/// Raw audio bytes as they arrive from the network
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Hosts accepted as YouTube video locations
const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
];

/// Path prefixes that carry the video id as the next segment
const ID_PATH_PREFIXES: &[&str] = &["shorts", "embed", "v", "live"];

const VIDEO_ID_LEN: usize = 11;

/// A validated reference to a single YouTube video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    /// URL exactly as supplied
    original: String,

    /// 11-character platform video id
    video_id: String,
}

impl SourceReference {
    /// Validate `input` and extract its video id. Performs no I/O.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TranscoderError::InvalidSourceUrl("empty input".to_string()));
        }

        let invalid = || TranscoderError::InvalidSourceUrl(trimmed.to_string());

        let parsed = Url::parse(trimmed).map_err(|_| invalid())?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid());
        }

        let host = parsed.host_str().ok_or_else(invalid)?.to_lowercase();
        let mut segments = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter();

        let candidate = if host == "youtu.be" {
            segments.next().map(str::to_string)
        } else if YOUTUBE_HOSTS.contains(&host.as_str()) {
            match segments.next() {
                Some("watch") => parsed
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned()),
                Some(prefix) if ID_PATH_PREFIXES.contains(&prefix) => segments.next().map(str::to_string),
                _ => None,
            }
        } else {
            None
        };

        let video_id = candidate.filter(|id| is_valid_video_id(id)).ok_or_else(invalid)?;

        Ok(Self {
            original: trimmed.to_string(),
            video_id,
        })
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Canonical watch URL handed to external tools
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}

impl std::fmt::Display for SourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.watch_url())
    }
}

fn is_valid_video_id(id: &str) -> bool {
    id.len() == VIDEO_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Whether `input` is an accepted YouTube video URL
pub fn is_valid_source_url(input: &str) -> bool {
    SourceReference::parse(input).is_ok()
}

/// Information about a video, fetched without downloading it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: String,

    /// Duration in whole seconds
    pub duration: u64,

    pub author: String,

    pub thumbnail: Option<String>,

    pub view_count: Option<u64>,

    /// Formats offered by the platform, in the order it reported them
    pub formats: Vec<FormatCandidate>,
}

/// One downloadable rendition of the media
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormatCandidate {
    pub format_id: String,

    /// Container/extension, e.g. `webm` or `m4a`
    pub container: String,

    /// Average audio bitrate in kbit/s
    pub audio_bitrate: Option<f64>,

    /// True when the rendition carries no video track
    pub audio_only: bool,

    /// Audio codec as reported by the platform (`opus`, `mp4a.40.2`, ...)
    pub audio_codec: Option<String>,

    /// Direct media location
    pub url: Option<String>,

    /// Headers the platform expects on the media request
    #[serde(default)]
    pub http_headers: HashMap<String, String>,
}

/// Metadata lookup for a source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataService: Send + Sync {
    async fn fetch_metadata(&self, source: &SourceReference) -> Result<MediaMetadata>;
}

/// Opens the byte stream for a chosen format
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DownloadProvider: Send + Sync {
    async fn open_stream(&self, source: &SourceReference, format: &FormatCandidate) -> Result<ByteStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_youtube_shapes() {
        let urls = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
            "http://m.youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?si=abc",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/live/dQw4w9WgXcQ",
            "  https://www.youtube.com/v/dQw4w9WgXcQ  ",
        ];

        for url in urls {
            let source = SourceReference::parse(url).unwrap_or_else(|e| panic!("{url}: {e}"));
            assert_eq!(source.video_id(), "dQw4w9WgXcQ");
        }
    }

    #[test]
    fn test_rejects_malformed_input() {
        let inputs = [
            "",
            "   ",
            "not a url",
            "ftp://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://vimeo.com/123456",
            "https://www.youtube.com/watch?v=short",
            "https://www.youtube.com/watch?v=dQw4w9WgXc!",
            "https://www.youtube.com/playlist?list=PL123",
            "https://notyoutube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/",
        ];

        for input in inputs {
            assert!(
                matches!(SourceReference::parse(input), Err(TranscoderError::InvalidSourceUrl(_))),
                "accepted {input:?}"
            );
        }
    }

    #[test]
    fn test_watch_url_is_canonical() {
        let source = SourceReference::parse("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(source.watch_url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(source.original(), "https://youtu.be/dQw4w9WgXcQ");
        assert!(is_valid_source_url("https://youtu.be/dQw4w9WgXcQ"));
    }
}
