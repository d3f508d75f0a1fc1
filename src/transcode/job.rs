use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::extractors::SourceReference;
use crate::{Result, TranscoderError};

/// Lifecycle of a job. Variants are ordered; a job only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    Idle,
    MetadataFetched,
    GateChecked,
    Running,
    Settled,
}

/// How the audio reaches the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePath {
    /// Source container is already acceptable; bytes are written verbatim
    DirectCopy,
    /// Source bytes are piped through the encoder
    Transcode,
}

/// Something that happened on one of the job's I/O legs while running
#[derive(Debug)]
pub enum PipelineEvent {
    /// Download delivered a chunk of this many bytes
    Chunk(usize),
    /// Download stream ended cleanly
    DownloadEnded,
    DownloadFailed(String),
    /// Direct-copy writer flushed everything it received
    CopyFinished,
    CopyFailed(io::Error),
    StdinFailed(io::Error),
    /// Encoder exited; `None` when killed by a signal
    EncoderExited(Option<i32>),
    Cancelled,
}

/// One execution of the pipeline, from validated source to settled outcome.
///
/// The outcome is handed out exactly once: the first decisive event settles
/// the job and every later event is ignored.
#[derive(Debug)]
pub struct TranscodeJob {
    id: Uuid,
    source: SourceReference,
    output_path: Option<PathBuf>,
    path: Option<PipelinePath>,
    state: JobState,
    settled: bool,
    bytes_received: u64,
}

impl TranscodeJob {
    pub fn new(source: SourceReference) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            output_path: None,
            path: None,
            state: JobState::Idle,
            settled: false,
            bytes_received: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &SourceReference {
        &self.source
    }

    /// Artifact location, once assigned
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Fix where and how the artifact is produced. Only before running.
    pub fn assign_output(&mut self, output_path: PathBuf, path: PipelinePath) {
        if self.state >= JobState::Running {
            tracing::warn!(job = %self.id, "Output already fixed, ignoring {}", output_path.display());
            return;
        }
        self.output_path = Some(output_path);
        self.path = Some(path);
    }

    /// Move to `next`. Refuses to go backwards, to leave `Settled`, or to
    /// start running without an assigned output.
    pub fn advance(&mut self, next: JobState) -> bool {
        let unplanned = next >= JobState::Running && self.output_path.is_none();
        if next <= self.state || self.settled || unplanned {
            tracing::warn!(job = %self.id, "Refusing state change {:?} -> {:?}", self.state, next);
            return false;
        }
        self.state = next;
        true
    }

    /// Apply an event. Returns the outcome only for the event that settled the job.
    pub fn handle(&mut self, event: PipelineEvent) -> Option<Result<PathBuf>> {
        if self.settled {
            tracing::debug!(job = %self.id, "Ignoring {:?} after settlement", event);
            return None;
        }
        if self.state != JobState::Running {
            tracing::warn!(job = %self.id, "Ignoring {:?} in state {:?}", event, self.state);
            return None;
        }

        match event {
            PipelineEvent::Chunk(len) => {
                self.bytes_received += len as u64;
                tracing::trace!(job = %self.id, "Downloaded: {:.2} MB", self.bytes_received as f64 / 1_048_576.0);
                None
            }
            PipelineEvent::DownloadEnded => {
                tracing::debug!(job = %self.id, "Download finished after {} bytes", self.bytes_received);
                None
            }
            PipelineEvent::DownloadFailed(message) => {
                self.settle(Err(TranscoderError::DownloadStreamError(message)))
            }
            PipelineEvent::CopyFinished => match self.path {
                Some(PipelinePath::DirectCopy) => self.settle_success(),
                _ => None,
            },
            PipelineEvent::CopyFailed(e) => self.settle(Err(TranscoderError::FileSystemError(e))),
            PipelineEvent::StdinFailed(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                // Encoder stopped reading early; its exit code decides the outcome.
                tracing::debug!(job = %self.id, "Encoder closed its input early: {}", e);
                None
            }
            PipelineEvent::StdinFailed(e) => {
                self.settle(Err(TranscoderError::EncoderStdinError(e.to_string())))
            }
            PipelineEvent::EncoderExited(Some(0)) => self.settle_success(),
            PipelineEvent::EncoderExited(code) => {
                self.settle(Err(TranscoderError::EncoderRuntimeError { code }))
            }
            PipelineEvent::Cancelled => self.settle(Err(TranscoderError::Cancelled)),
        }
    }

    /// Settle with a failure found outside the event loop and hand it back
    pub fn fail(&mut self, error: TranscoderError) -> TranscoderError {
        if self.settle_flag() {
            tracing::info!(job = %self.id, "Job failed: {}", error);
        } else {
            tracing::warn!(job = %self.id, "Late failure after settlement: {}", error);
        }
        error
    }

    fn settle_success(&mut self) -> Option<Result<PathBuf>> {
        let path = self.output_path.clone()?;
        self.settle(Ok(path))
    }

    fn settle(&mut self, outcome: Result<PathBuf>) -> Option<Result<PathBuf>> {
        if !self.settle_flag() {
            return None;
        }

        match &outcome {
            Ok(path) => tracing::info!(job = %self.id, "Audio converted successfully: {}", path.display()),
            Err(e) => tracing::info!(job = %self.id, "Job failed: {}", e),
        }
        Some(outcome)
    }

    /// Check-and-set of the settled flag
    fn settle_flag(&mut self) -> bool {
        if self.settled {
            return false;
        }
        self.settled = true;
        self.state = JobState::Settled;
        true
    }
}
