use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};

use crate::config::EncoderConfig;
use crate::utils::check_command_available;

/// Most encoder diagnostics kept for logging
const STDERR_LIMIT: u64 = 16 * 1024;

/// Arguments for reading raw audio on stdin and writing the voice-note file.
/// Every value is a separate argument; nothing passes through a shell.
pub fn encoder_args(config: &EncoderConfig, output_path: &Path) -> Vec<OsString> {
    let sample_rate = config.sample_rate.to_string();
    let channels = config.channels.to_string();
    let bitrate = format!("{}k", config.bitrate_kbps);

    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-loglevel",
        "warning",
        "-i",
        "pipe:0",
        "-vn",
        "-c:a",
        config.codec.as_str(),
        "-ar",
        sample_rate.as_str(),
        "-ac",
        channels.as_str(),
        "-b:a",
        bitrate.as_str(),
        "-f",
        config.container.as_str(),
        "-y",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    args.push(output_path.as_os_str().to_owned());
    args
}

/// Start the encoder with piped stdin. The child is killed if dropped.
pub fn spawn_encoder(config: &EncoderConfig, output_path: &Path) -> std::io::Result<Child> {
    tracing::debug!("Starting {} for {}", config.program, output_path.display());

    Command::new(&config.program)
        .args(encoder_args(config, output_path))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

/// Collect encoder diagnostics so a full stderr pipe never stalls it
pub async fn collect_stderr(stderr: ChildStderr) -> String {
    let mut buf = Vec::new();
    let mut limited = stderr.take(STDERR_LIMIT);
    if let Err(e) = limited.read_to_end(&mut buf).await {
        tracing::debug!("Failed to read encoder stderr: {}", e);
    }

    // Keep draining past the limit without storing anything.
    let mut rest = limited.into_inner();
    let _ = tokio::io::copy(&mut rest, &mut tokio::io::sink()).await;

    String::from_utf8_lossy(&buf).trim().to_string()
}

/// Whether the encoder executable exists and runs
pub async fn check_encoder_available(config: &EncoderConfig) -> bool {
    check_command_available(&config.program, "-version").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_args() {
        let args = encoder_args(&EncoderConfig::default(), Path::new("/tmp/a b.ogg"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(
            args,
            vec![
                "-hide_banner", "-loglevel", "warning", "-i", "pipe:0", "-vn", "-c:a", "libopus", "-ar",
                "48000", "-ac", "1", "-b:a", "96k", "-f", "ogg", "-y", "/tmp/a b.ogg",
            ]
        );
    }

    #[test]
    fn test_hostile_path_stays_one_argument() {
        let path = PathBuf::from("/tmp/x\"; rm -rf ~; echo \".ogg");
        let args = encoder_args(&EncoderConfig::default(), &path);
        assert_eq!(args.last().unwrap(), path.as_os_str());
    }

    #[test]
    fn test_configured_target_is_used() {
        let config = EncoderConfig {
            codec: "libvorbis".into(),
            sample_rate: 44100,
            channels: 2,
            bitrate_kbps: 64,
            ..EncoderConfig::default()
        };
        let args: Vec<String> = encoder_args(&config, Path::new("o.ogg"))
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert!(args.windows(2).any(|w| w == ["-c:a", "libvorbis"]));
        assert!(args.windows(2).any(|w| w == ["-ar", "44100"]));
        assert!(args.windows(2).any(|w| w == ["-ac", "2"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "64k"]));
    }

    #[tokio::test]
    async fn test_missing_encoder_is_unavailable_and_fails_to_spawn() {
        let config = EncoderConfig {
            program: "/nonexistent/ffmpeg".into(),
            ..EncoderConfig::default()
        };
        assert!(!check_encoder_available(&config).await);
        assert!(spawn_encoder(&config, Path::new("/tmp/never.ogg")).is_err());
    }
}
