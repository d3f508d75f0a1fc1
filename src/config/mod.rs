use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Admission limits
    pub limits: LimitsConfig,

    /// Encoder (ffmpeg) settings
    pub encoder: EncoderConfig,

    /// Download settings
    pub download: DownloadConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Longest video accepted, in seconds
    pub max_duration_secs: u64,

    /// Maximum concurrent conversions per pipeline
    pub max_concurrent_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Encoder executable
    pub program: String,

    /// Target audio codec passed to `-c:a`
    pub codec: String,

    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Output channel count
    pub channels: u8,

    /// Constant bitrate in kbit/s
    pub bitrate_kbps: u32,

    /// Output container passed to `-f`, also used as the file extension
    pub container: String,

    /// Source containers that are saved verbatim instead of re-encoded
    pub passthrough_containers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// yt-dlp executable used for metadata queries
    pub yt_dlp_path: String,

    /// Chunks buffered between the download and the encoder
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for produced voice notes (system temp dir if unset)
    pub output_dir: Option<PathBuf>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 300,
            max_concurrent_jobs: 3,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            codec: "libopus".to_string(),
            sample_rate: 48000,
            channels: 1,
            bitrate_kbps: 96,
            container: "ogg".to_string(),
            passthrough_containers: vec!["ogg".to_string(), "webm".to_string()],
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            channel_capacity: 16,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults
    pub async fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let config_path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            tracing::debug!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else if explicit_path.is_some() {
            anyhow::bail!("Config file not found: {}", config_path.display());
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub async fn save(&self, explicit_path: Option<&Path>) -> Result<PathBuf> {
        let config_path = match explicit_path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("voicenote").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_concurrent_jobs == 0 {
            anyhow::bail!("limits.max_concurrent_jobs must be at least 1");
        }

        if self.download.channel_capacity == 0 {
            anyhow::bail!("download.channel_capacity must be at least 1");
        }

        if self.encoder.program.trim().is_empty() {
            anyhow::bail!("encoder.program must be configured");
        }

        if self.encoder.codec.trim().is_empty() || self.encoder.container.trim().is_empty() {
            anyhow::bail!("encoder.codec and encoder.container must be configured");
        }

        if self.encoder.sample_rate == 0 || self.encoder.channels == 0 || self.encoder.bitrate_kbps == 0 {
            anyhow::bail!("encoder sample rate, channel count and bitrate must be non-zero");
        }

        Ok(())
    }

    /// Directory where voice notes are written
    pub fn output_dir(&self) -> PathBuf {
        self.app
            .output_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("voicenote"))
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Max Duration: {}s", self.limits.max_duration_secs);
        println!("  Max Concurrent Jobs: {}", self.limits.max_concurrent_jobs);
        println!("  Encoder: {}", self.encoder.program);
        println!(
            "  Target: {} in {}, {} Hz, {} ch, {} kbit/s",
            self.encoder.codec,
            self.encoder.container,
            self.encoder.sample_rate,
            self.encoder.channels,
            self.encoder.bitrate_kbps
        );
        println!("  Passthrough: {}", self.encoder.passthrough_containers.join(", "));
        println!("  yt-dlp: {}", self.download.yt_dlp_path);
        println!("  Output Dir: {}", self.output_dir().display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_voice_note_target() {
        let config = Config::default();
        assert_eq!(config.limits.max_duration_secs, 300);
        assert_eq!(config.encoder.codec, "libopus");
        assert_eq!(config.encoder.sample_rate, 48000);
        assert_eq!(config.encoder.channels, 1);
        assert_eq!(config.encoder.bitrate_kbps, 96);
        assert_eq!(config.encoder.container, "ogg");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str("limits:\n  max_duration_secs: 600\n").unwrap();
        assert_eq!(config.limits.max_duration_secs, 600);
        assert_eq!(config.limits.max_concurrent_jobs, 3);
        assert_eq!(config.encoder.container, "ogg");
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.download.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_then_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.encoder.bitrate_kbps = 64;
        config.save(Some(&path)).await.unwrap();

        let loaded = Config::load(Some(&path)).await.unwrap();
        assert_eq!(loaded.encoder.bitrate_kbps, 64);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = tokio_test::block_on(Config::load(Some(&dir.path().join("absent.yaml"))));
        assert!(result.is_err());
    }
}
