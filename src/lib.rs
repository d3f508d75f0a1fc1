//! Voicenote Transcoder - turn YouTube audio into compact Opus voice notes
//!
//! This library validates a YouTube reference, checks its duration against a
//! configured ceiling, downloads the best audio-only stream and pipes it through
//! an external encoder (ffmpeg) to produce a mono 48 kHz Opus/Ogg file that a
//! chat client can send as a voice message.

use std::path::PathBuf;

pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod transcode;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use extractors::{DownloadProvider, FormatCandidate, MediaMetadata, MetadataService, SourceReference};
pub use transcode::{AudioPipeline, CancelToken};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, TranscoderError>;

/// Error types specific to the transcoder
#[derive(thiserror::Error, Debug)]
pub enum TranscoderError {
    #[error("Invalid YouTube URL: {0}")]
    InvalidSourceUrl(String),

    #[error("Failed to get video info: {0}")]
    MetadataFetchFailed(String),

    #[error(
        "Video is too long. Maximum allowed duration is {limit} seconds ({}). This video is {actual} seconds long.",
        human_duration(.limit)
    )]
    DurationExceeded { limit: u64, actual: u64 },

    #[error("No suitable audio format found")]
    NoSuitableFormat,

    #[error("YouTube download error: {0}")]
    DownloadStreamError(String),

    #[error("Encoder execution error: {0}")]
    EncoderSpawnError(String),

    #[error("Encoder process exited with {}", describe_exit(.code))]
    EncoderRuntimeError { code: Option<i32> },

    #[error("Encoder stdin error: {0}")]
    EncoderStdinError(String),

    #[error("Converted audio file was not created: {}", .0.display())]
    OutputMissing(PathBuf),

    #[error("Converted audio file is empty: {}", .0.display())]
    OutputEmpty(PathBuf),

    #[error("File operation failed: {0}")]
    FileSystemError(#[from] std::io::Error),

    #[error("Conversion cancelled")]
    Cancelled,
}

fn human_duration(seconds: &u64) -> String {
    utils::format_duration(*seconds as f64)
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
