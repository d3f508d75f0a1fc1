use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "voicenote",
    about = "Voicenote Transcoder - Turn YouTube audio into Opus voice notes",
    version,
    long_about = "Downloads the best audio-only stream of a YouTube video and converts it into a mono 48 kHz Opus/Ogg file suitable for sending as a chat voice message. Videos longer than the configured limit are rejected before anything is downloaded."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "FILE", env = "VOICENOTE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download a YouTube video's audio and convert it into a voice note
    Convert {
        /// YouTube URL (youtube.com/watch, youtu.be, shorts, embed or live links)
        #[arg(value_name = "URL")]
        url: String,

        /// Copy the finished voice note to this path
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Keep the working artifact instead of deleting it afterwards
        #[arg(long)]
        keep: bool,

        /// Abort the conversion after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Override the maximum allowed duration in seconds
        #[arg(long, value_name = "SECS", env = "MAX_AUDIO_DURATION")]
        max_duration: Option<u64>,
    },

    /// Show metadata for a YouTube video without downloading it
    Info {
        /// YouTube URL
        #[arg(value_name = "URL")]
        url: String,

        /// Print the metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the external tools are installed
    Check,

    /// Show or create the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Write a default configuration file
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_convert() {
        let cli = Cli::try_parse_from([
            "voicenote",
            "convert",
            "https://youtu.be/dQw4w9WgXcQ",
            "-o",
            "note.ogg",
            "--timeout",
            "60",
            "--max-duration",
            "120",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Convert { url, output, keep, timeout, max_duration } => {
                assert_eq!(url, "https://youtu.be/dQw4w9WgXcQ");
                assert_eq!(output, Some(PathBuf::from("note.ogg")));
                assert!(!keep);
                assert_eq!(timeout, Some(60));
                assert_eq!(max_duration, Some(120));
            }
            _ => panic!("expected convert"),
        }
    }

    #[test]
    fn test_config_flags_conflict() {
        assert!(Cli::try_parse_from(["voicenote", "config", "--show", "--init"]).is_err());
    }
}
