use std::process::Stdio;

use crate::config::Config;

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '_' => c,
            _ => '_',
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// Generate a unique filename from a base name, the current time and a random token
pub fn generate_unique_filename(base_name: &str, extension: &str) -> String {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
    let random_suffix = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();

    let base = sanitize_filename(base_name);
    let base = if base.is_empty() { "audio".to_string() } else { base };

    format!("{}_{}_{}_{}.{}", "voicenote", base, timestamp, random_suffix, extension)
}

/// Check if the current environment has the external tools the pipeline drives
pub async fn check_dependencies(config: &Config) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(&config.download.yt_dlp_path, "--version").await {
        missing.push(format!(
            "{} - required for YouTube metadata",
            config.download.yt_dlp_path
        ));
    }

    if !check_command_available(&config.encoder.program, "-version").await {
        missing.push(format!(
            "{} - required for Opus conversion",
            config.encoder.program
        ));
    }

    missing
}

/// Check if a command can be started and exits successfully
pub async fn check_command_available(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30.0), "30s");
        assert_eq!(format_duration(90.0), "1m 30s");
        assert_eq!(format_duration(300.0), "5m 0s");
        assert_eq!(format_duration(3661.0), "1h 1m 1s");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(sanitize_filename("a/b?c"), "a_b_c");
        assert_eq!(sanitize_filename("\"; rm -rf /"), "rm_-rf");
        assert_eq!(sanitize_filename("../.."), "");
    }

    #[test]
    fn test_generate_unique_filename() {
        let first = generate_unique_filename("dQw4w9WgXcQ", "ogg");
        let second = generate_unique_filename("dQw4w9WgXcQ", "ogg");

        assert!(first.starts_with("voicenote_dQw4w9WgXcQ_"));
        assert!(first.ends_with(".ogg"));
        assert_ne!(first, second);

        assert!(generate_unique_filename("", "webm").starts_with("voicenote_audio_"));
    }

    #[tokio::test]
    async fn test_missing_command_is_unavailable() {
        assert!(!check_command_available("/nonexistent/tool", "--version").await);
    }
}
