use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voicenote_transcoder::{output, utils, AudioPipeline, CancelToken, Cli, Commands, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = match cli.command {
        Commands::Config { init: true, .. } => Config::default(),
        _ => Config::load(cli.config.as_deref()).await?,
    };

    match cli.command {
        Commands::Convert {
            url,
            output,
            keep,
            timeout,
            max_duration,
        } => {
            if let Some(max_duration) = max_duration {
                config.limits.max_duration_secs = max_duration;
            }
            warn_missing_dependencies(&config).await;

            let pipeline = AudioPipeline::new(config);
            let cancel = CancelToken::new();

            if let Some(secs) = timeout {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    tracing::warn!("Timed out after {}s, cancelling", secs);
                    cancel.cancel();
                });
            }

            let progress = spinner(cli.quiet);
            progress.set_message("Downloading and converting audio...");
            tracing::info!("Starting conversion for URL: {}", url);

            let artifact = match pipeline.download_and_convert_audio_with_cancel(&url, &cancel).await {
                Ok(artifact) => artifact,
                Err(e) => {
                    progress.finish_and_clear();
                    return Err(e.into());
                }
            };
            progress.finish_with_message("Conversion complete");

            deliver(&pipeline, &artifact, output.as_deref(), keep).await?;
        }
        Commands::Info { url, json } => {
            warn_missing_dependencies(&config).await;

            let pipeline = AudioPipeline::new(config);
            let metadata = pipeline.get_metadata(&url).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            } else {
                println!("{}", style(&metadata.title).bold());
                println!("  Author:   {}", metadata.author);
                println!("  Duration: {}", utils::format_duration(metadata.duration as f64));
                if let Some(views) = metadata.view_count {
                    println!("  Views:    {}", views);
                }
                if let Some(thumbnail) = &metadata.thumbnail {
                    println!("  Thumbnail: {}", thumbnail);
                }
                println!("  Audio-only formats: {}", metadata.formats.iter().filter(|f| f.audio_only).count());
            }
        }
        Commands::Check => {
            let missing = utils::check_dependencies(&config).await;
            if missing.is_empty() {
                println!("{} All external tools are available", style("✓").green());
            } else {
                for dep in &missing {
                    println!("{} {}", style("✗").red(), dep);
                }
                anyhow::bail!("{} required tool(s) missing", missing.len());
            }
        }
        Commands::Config { show, init } => {
            if init {
                let path = config.save(cli.config.as_deref()).await?;
                println!("Configuration written to: {}", path.display());
            } else if show {
                config.display();
            } else {
                config.display();
                println!();
                println!("Run `voicenote config --init` to write these settings to a file.");
            }
        }
    }

    Ok(())
}

fn init_tracing(cli: &Cli) {
    let default_filter = if cli.verbose {
        "voicenote=debug,voicenote_transcoder=debug"
    } else {
        "voicenote=info,voicenote_transcoder=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let json_layer = cli
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!cli.log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

async fn warn_missing_dependencies(config: &Config) {
    let missing = utils::check_dependencies(config).await;
    if !missing.is_empty() {
        eprintln!("{}", style("⚠️  Dependency check warnings:").yellow());
        for dep in missing {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }
}

fn spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        progress.set_style(spinner_style);
    }
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}

/// Copy the artifact to `destination` and release it unless asked to keep it.
/// Without a destination the artifact itself is the result and stays put.
async fn deliver(pipeline: &AudioPipeline, artifact: &Path, destination: Option<&Path>, keep: bool) -> Result<()> {
    match destination {
        Some(destination) => {
            let copied = output::save_to_file(artifact, destination).await;
            if !keep {
                pipeline.cleanup(artifact);
            }
            copied?;
            println!("Voice note saved to: {}", destination.display());
        }
        None => {
            println!("Voice note ready: {}", artifact.display());
        }
    }
    Ok(())
}
