use crate::config::EncoderConfig;
use crate::extractors::{FormatCandidate, MediaMetadata};
use crate::{Result, TranscoderError};

use super::job::PipelinePath;

/// Reject media longer than `max_duration_secs`. No side effects.
pub fn check_duration(metadata: &MediaMetadata, max_duration_secs: u64) -> Result<()> {
    if metadata.duration > max_duration_secs {
        return Err(TranscoderError::DurationExceeded {
            limit: max_duration_secs,
            actual: metadata.duration,
        });
    }
    Ok(())
}

/// Highest-bitrate audio-only format. Unknown bitrates rank last; the
/// earliest candidate wins a tie.
pub fn select_audio_format(formats: &[FormatCandidate]) -> Result<&FormatCandidate> {
    formats
        .iter()
        .filter(|format| format.audio_only)
        .fold(None::<&FormatCandidate>, |best, candidate| match best {
            Some(current) if bitrate(current) >= bitrate(candidate) => Some(current),
            _ => Some(candidate),
        })
        .ok_or(TranscoderError::NoSuitableFormat)
}

fn bitrate(format: &FormatCandidate) -> f64 {
    format.audio_bitrate.unwrap_or(-1.0)
}

/// Decide between verbatim copy and re-encoding for the chosen format
pub fn choose_path(format: &FormatCandidate, encoder: &EncoderConfig) -> PipelinePath {
    let container_ok = encoder
        .passthrough_containers
        .iter()
        .any(|c| c.eq_ignore_ascii_case(&format.container));

    // A reported codec must match the target; an unreported one is trusted.
    let codec_ok = format
        .audio_codec
        .as_deref()
        .map_or(true, |codec| codec_matches(codec, &encoder.codec));

    if container_ok && codec_ok {
        PipelinePath::DirectCopy
    } else {
        PipelinePath::Transcode
    }
}

/// `libopus` encodes `opus`, `libvorbis` encodes `vorbis`, and so on
fn codec_matches(source_codec: &str, target_codec: &str) -> bool {
    let family = |codec: &str| {
        let codec = codec.to_ascii_lowercase();
        let codec = codec.strip_prefix("lib").map(str::to_string).unwrap_or(codec);
        codec.split('.').next().unwrap_or_default().to_string()
    };
    family(source_codec) == family(target_codec)
}

/// File extension for the artifact produced by `path`
pub fn output_extension<'a>(path: PipelinePath, format: &'a FormatCandidate, encoder: &'a EncoderConfig) -> &'a str {
    match path {
        PipelinePath::DirectCopy => &format.container,
        PipelinePath::Transcode => &encoder.container,
    }
}
