use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};

use crate::config::Config;
use crate::extractors::youtube::YoutubeExtractor;
use crate::extractors::{ByteStream, DownloadProvider, FormatCandidate, MediaMetadata, MetadataService, SourceReference};
use crate::output;
use crate::{Result, TranscoderError};

pub mod encoder;
pub mod job;
pub mod plan;
pub mod stream;

pub use job::{JobState, PipelineEvent, PipelinePath, TranscodeJob};

/// How long to wait for encoder diagnostics after a failed run
const STDERR_GRACE: Duration = Duration::from_secs(2);

/// Cooperative cancellation for a running conversion
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Main download-and-convert pipeline
pub struct AudioPipeline {
    config: Config,
    metadata: Arc<dyn MetadataService>,
    downloads: Arc<dyn DownloadProvider>,
    admission: Arc<Semaphore>,
}

impl AudioPipeline {
    /// Create a pipeline backed by yt-dlp metadata and HTTP downloads
    pub fn new(config: Config) -> Self {
        let youtube = Arc::new(YoutubeExtractor::new(config.download.yt_dlp_path.clone()));
        Self::with_services(config, youtube.clone(), youtube)
    }

    /// Create a pipeline with explicit metadata and download services
    pub fn with_services(
        config: Config,
        metadata: Arc<dyn MetadataService>,
        downloads: Arc<dyn DownloadProvider>,
    ) -> Self {
        let permits = config.limits.max_concurrent_jobs.max(1);
        Self {
            config,
            metadata,
            downloads,
            admission: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Fetch metadata only; nothing is downloaded
    pub async fn get_metadata(&self, url: &str) -> Result<MediaMetadata> {
        let source = SourceReference::parse(url)?;
        self.metadata.fetch_metadata(&source).await
    }

    /// Whether the configured encoder can be executed
    pub async fn check_encoder_available(&self) -> bool {
        encoder::check_encoder_available(&self.config.encoder).await
    }

    /// Best-effort removal of an artifact the caller has finished with
    pub fn cleanup(&self, artifact: &Path) {
        output::remove_artifact(artifact);
    }

    /// Download `url` and convert it into a voice note, returning its path.
    /// The caller owns the file and should [`cleanup`](Self::cleanup) it.
    pub async fn download_and_convert_audio(&self, url: &str) -> Result<PathBuf> {
        self.download_and_convert_audio_with_cancel(url, &CancelToken::new()).await
    }

    /// Like [`download_and_convert_audio`](Self::download_and_convert_audio),
    /// aborting with [`TranscoderError::Cancelled`] when `cancel` fires
    pub async fn download_and_convert_audio_with_cancel(&self, url: &str, cancel: &CancelToken) -> Result<PathBuf> {
        let source = SourceReference::parse(url)?;
        let mut job = TranscodeJob::new(source);

        let outcome = match self.run_job(&mut job, cancel).await {
            Ok(path) => output::verify_artifact(&path).await.map(|size| {
                tracing::info!(
                    job = %job.id(),
                    "Voice note ready: {} ({})",
                    path.display(),
                    crate::utils::format_file_size(size)
                );
                path
            }),
            Err(e) => Err(e),
        };

        if outcome.is_err() {
            if let Some(path) = job.output_path() {
                output::remove_artifact(path);
            }
        }

        outcome
    }

    async fn run_job(&self, job: &mut TranscodeJob, cancel: &CancelToken) -> Result<PathBuf> {
        let source = job.source().clone();

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TranscoderError::Cancelled),
            permit = self.admission.acquire() => permit.map_err(|_| TranscoderError::Cancelled)?,
        };

        tracing::info!(job = %job.id(), "Downloading audio from: {}", source);

        let metadata = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TranscoderError::Cancelled),
            metadata = self.metadata.fetch_metadata(&source) => metadata?,
        };
        job.advance(JobState::MetadataFetched);

        tracing::info!(job = %job.id(), "Video title: {}", metadata.title);
        tracing::info!(job = %job.id(), "Duration: {} seconds", metadata.duration);

        plan::check_duration(&metadata, self.config.limits.max_duration_secs)?;
        job.advance(JobState::GateChecked);

        let format = plan::select_audio_format(&metadata.formats)?;
        let path = plan::choose_path(format, &self.config.encoder);
        tracing::info!(
            job = %job.id(),
            "Using audio format {}: {}kbps {} ({:?})",
            format.format_id,
            format.audio_bitrate.map(|b| b.round() as u64).unwrap_or_default(),
            format.container,
            path
        );

        let output_dir = self.config.output_dir();
        tokio::fs::create_dir_all(&output_dir).await?;
        let output_dir = tokio::fs::canonicalize(&output_dir).await?;
        let extension = plan::output_extension(path, format, &self.config.encoder);
        job.assign_output(output::artifact_path(&output_dir, &source, extension), path);
        job.advance(JobState::Running);

        match path {
            PipelinePath::DirectCopy => self.run_direct_copy(job, format, cancel).await,
            PipelinePath::Transcode => self.run_transcode(job, format, cancel).await,
        }
    }

    async fn open_stream(&self, job: &mut TranscodeJob, format: &FormatCandidate, cancel: &CancelToken) -> Result<ByteStream> {
        let source = job.source().clone();
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TranscoderError::Cancelled),
            stream = self.downloads.open_stream(&source, format) => stream,
        };
        opened.map_err(|e| job.fail(e))
    }

    async fn run_direct_copy(&self, job: &mut TranscodeJob, format: &FormatCandidate, cancel: &CancelToken) -> Result<PathBuf> {
        let output_path = self.running_output(job)?;
        let stream = self.open_stream(job, format, cancel).await?;

        let file = tokio::fs::File::create(&output_path)
            .await
            .map_err(|e| job.fail(TranscoderError::FileSystemError(e)))?;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::channel(self.config.download.channel_capacity.max(1));

        let pump = tokio::spawn(stream::pump_download(stream, data_tx, events_tx.clone()));
        let writer = tokio::spawn(stream::write_file(file, data_rx, events_tx));

        let outcome = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => PipelineEvent::Cancelled,
                event = events_rx.recv() => event.unwrap_or_else(|| {
                    PipelineEvent::CopyFailed(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "copy stopped without reporting a result",
                    ))
                }),
            };
            if let Some(outcome) = job.handle(event) {
                break outcome;
            }
        };

        pump.abort();
        writer.abort();
        let _ = writer.await;

        outcome
    }

    async fn run_transcode(&self, job: &mut TranscodeJob, format: &FormatCandidate, cancel: &CancelToken) -> Result<PathBuf> {
        let output_path = self.running_output(job)?;
        let stream = self.open_stream(job, format, cancel).await?;

        let mut child = encoder::spawn_encoder(&self.config.encoder, &output_path)
            .map_err(|e| job.fail(TranscoderError::EncoderSpawnError(e.to_string())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| job.fail(TranscoderError::EncoderStdinError("encoder stdin was not captured".into())))?;
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(encoder::collect_stderr(stderr)));

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::channel(self.config.download.channel_capacity.max(1));

        let pump = tokio::spawn(stream::pump_download(stream, data_tx, events_tx.clone()));
        let feed = tokio::spawn(stream::feed_encoder(stdin, data_rx, events_tx));

        let mut exited = false;
        let outcome = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => PipelineEvent::Cancelled,
                Some(event) = events_rx.recv() => event,
                status = child.wait(), if !exited => {
                    exited = true;
                    match status {
                        Ok(status) => PipelineEvent::EncoderExited(status.code()),
                        Err(e) => {
                            tracing::warn!(job = %job.id(), "Failed to wait for encoder: {}", e);
                            PipelineEvent::EncoderExited(None)
                        }
                    }
                }
            };
            if let Some(outcome) = job.handle(event) {
                break outcome;
            }
        };

        pump.abort();
        feed.abort();

        if !exited {
            if let Err(e) = child.start_kill() {
                tracing::debug!(job = %job.id(), "Encoder already gone: {}", e);
            }
            let _ = child.wait().await;
        }

        if let Some(task) = stderr_task {
            if matches!(outcome, Err(TranscoderError::EncoderRuntimeError { .. })) {
                if let Ok(Ok(diagnostics)) = tokio::time::timeout(STDERR_GRACE, task).await {
                    if !diagnostics.is_empty() {
                        tracing::warn!(job = %job.id(), "Encoder output: {}", diagnostics);
                    }
                }
            } else {
                task.abort();
            }
        }

        outcome
    }

    fn running_output(&self, job: &mut TranscodeJob) -> Result<PathBuf> {
        match (job.state(), job.output_path()) {
            (JobState::Running, Some(path)) => Ok(path.to_path_buf()),
            (state, _) => Err(job.fail(TranscoderError::FileSystemError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("job cannot run from state {:?}", state),
            )))),
        }
    }
}
