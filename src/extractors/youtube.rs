use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;

use super::{ByteStream, DownloadProvider, FormatCandidate, MediaMetadata, MetadataService, SourceReference};
use crate::{Result, TranscoderError};

/// YouTube metadata via yt-dlp, audio bytes via a plain HTTP stream
pub struct YoutubeExtractor {
    yt_dlp_path: String,
    client: Client,
}

impl YoutubeExtractor {
    pub fn new(yt_dlp_path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            client: Client::new(),
        }
    }

    /// Get video information using yt-dlp
    async fn get_video_info(&self, source: &SourceReference) -> Result<Value> {
        tracing::debug!("Extracting video info for: {}", source);

        let output = Command::new(&self.yt_dlp_path)
            .args(["--dump-json", "--no-playlist", "--no-warnings"])
            .arg(source.watch_url())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TranscoderError::MetadataFetchFailed(format!("could not run {}: {}", self.yt_dlp_path, e)))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(TranscoderError::MetadataFetchFailed(format!("yt-dlp failed: {}", error.trim())));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| TranscoderError::MetadataFetchFailed(format!("invalid yt-dlp output: {}", e)))
    }
}

/// Build [`MediaMetadata`] from yt-dlp's `--dump-json` document
pub fn parse_video_info(info: &Value) -> Result<MediaMetadata> {
    let duration = info["duration"]
        .as_f64()
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| TranscoderError::MetadataFetchFailed("duration unavailable (live stream?)".to_string()))?;

    let title = info["title"].as_str().unwrap_or("Untitled").to_string();
    let author = info["uploader"]
        .as_str()
        .or_else(|| info["channel"].as_str())
        .unwrap_or("Unknown")
        .to_string();

    let formats = info["formats"]
        .as_array()
        .map(|formats| formats.iter().filter_map(parse_format).collect())
        .unwrap_or_default();

    Ok(MediaMetadata {
        title,
        duration: duration as u64,
        author,
        thumbnail: info["thumbnail"].as_str().map(str::to_string),
        view_count: info["view_count"].as_u64(),
        formats,
    })
}

fn parse_format(format: &Value) -> Option<FormatCandidate> {
    let format_id = format["format_id"].as_str()?.to_string();
    let container = format["ext"].as_str().unwrap_or_default().to_lowercase();

    let codec = |key: &str| format[key].as_str().filter(|c| *c != "none").map(str::to_string);
    let audio_codec = codec("acodec");
    let video_codec = codec("vcodec");

    let http_headers = format["http_headers"]
        .as_object()
        .map(|headers| {
            headers
                .iter()
                .filter_map(|(name, value)| value.as_str().map(|v| (name.clone(), v.to_string())))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();

    Some(FormatCandidate {
        format_id,
        container,
        audio_bitrate: format["abr"].as_f64(),
        audio_only: audio_codec.is_some() && video_codec.is_none(),
        audio_codec,
        url: format["url"].as_str().map(str::to_string),
        http_headers,
    })
}

#[async_trait]
impl MetadataService for YoutubeExtractor {
    async fn fetch_metadata(&self, source: &SourceReference) -> Result<MediaMetadata> {
        let info = self.get_video_info(source).await?;
        parse_video_info(&info)
    }
}

#[async_trait]
impl DownloadProvider for YoutubeExtractor {
    async fn open_stream(&self, source: &SourceReference, format: &FormatCandidate) -> Result<ByteStream> {
        let url = format.url.as_deref().ok_or_else(|| {
            TranscoderError::DownloadStreamError(format!("format {} has no media URL", format.format_id))
        })?;

        tracing::debug!("Opening audio stream for {} (format {})", source, format.format_id);

        let mut request = self.client.get(url);
        for (name, value) in &format.http_headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranscoderError::DownloadStreamError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranscoderError::DownloadStreamError(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)));

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_info() -> Value {
        json!({
            "title": "Never Gonna Give You Up",
            "duration": 212.0,
            "uploader": "Rick Astley",
            "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg",
            "view_count": 1_500_000_000u64,
            "formats": [
                { "format_id": "sb0", "ext": "mhtml", "acodec": "none", "vcodec": "none" },
                {
                    "format_id": "140", "ext": "m4a", "acodec": "mp4a.40.2", "vcodec": "none",
                    "abr": 129.5, "url": "https://rr.example/140",
                    "http_headers": { "User-Agent": "Mozilla/5.0" }
                },
                {
                    "format_id": "251", "ext": "webm", "acodec": "opus", "vcodec": "none",
                    "abr": 135.2, "url": "https://rr.example/251"
                },
                {
                    "format_id": "18", "ext": "mp4", "acodec": "mp4a.40.2", "vcodec": "avc1.42001E",
                    "abr": 96.0, "url": "https://rr.example/18"
                }
            ]
        })
    }

    #[test]
    fn test_parse_video_info() {
        let metadata = parse_video_info(&sample_info()).unwrap();

        assert_eq!(metadata.title, "Never Gonna Give You Up");
        assert_eq!(metadata.duration, 212);
        assert_eq!(metadata.author, "Rick Astley");
        assert_eq!(metadata.view_count, Some(1_500_000_000));
        assert_eq!(metadata.formats.len(), 4);

        let audio_only: Vec<_> = metadata
            .formats
            .iter()
            .filter(|f| f.audio_only)
            .map(|f| f.format_id.as_str())
            .collect();
        assert_eq!(audio_only, vec!["140", "251"]);

        let m4a = &metadata.formats[1];
        assert_eq!(m4a.container, "m4a");
        assert_eq!(m4a.http_headers.get("User-Agent").map(String::as_str), Some("Mozilla/5.0"));
    }

    #[test]
    fn test_missing_duration_fails() {
        let info = json!({ "title": "Live now", "formats": [] });
        assert!(matches!(
            parse_video_info(&info),
            Err(TranscoderError::MetadataFetchFailed(_))
        ));
    }

    #[test]
    fn test_author_falls_back_to_channel() {
        let info = json!({ "title": "t", "duration": 10, "channel": "Some Channel" });
        let metadata = parse_video_info(&info).unwrap();
        assert_eq!(metadata.author, "Some Channel");
        assert!(metadata.formats.is_empty());
    }

    #[tokio::test]
    async fn test_missing_yt_dlp_reports_metadata_failure() {
        let extractor = YoutubeExtractor::new("/nonexistent/yt-dlp");
        let source = SourceReference::parse("https://youtu.be/dQw4w9WgXcQ").unwrap();
        let result = extractor.fetch_metadata(&source).await;
        assert!(matches!(result, Err(TranscoderError::MetadataFetchFailed(_))));
    }
}
