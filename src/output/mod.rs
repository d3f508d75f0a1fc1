use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::extractors::SourceReference;
use crate::utils::generate_unique_filename;
use crate::{Result, TranscoderError};

/// Unique artifact location for one job inside `output_dir`
pub fn artifact_path(output_dir: &Path, source: &SourceReference, extension: &str) -> PathBuf {
    output_dir.join(generate_unique_filename(source.video_id(), extension))
}

/// Confirm a nominally successful job left a non-empty file behind
pub async fn verify_artifact(path: &Path) -> Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if !metadata.is_file() => Err(TranscoderError::OutputMissing(path.to_path_buf())),
        Ok(metadata) if metadata.len() == 0 => Err(TranscoderError::OutputEmpty(path.to_path_buf())),
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(TranscoderError::OutputMissing(path.to_path_buf())),
        Err(e) => Err(TranscoderError::FileSystemError(e)),
    }
}

/// Best-effort removal of an artifact. Returns whether a file was deleted.
pub fn remove_artifact(path: &Path) -> bool {
    match fs_err::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed artifact {}", path.display());
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!("Failed to delete {}: {}", path.display(), e);
            false
        }
    }
}

/// Copy an artifact to a caller-chosen destination
pub async fn save_to_file(artifact: &Path, destination: &Path) -> anyhow::Result<()> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent)?;
        }
    }

    fs_err::copy(artifact, destination)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_verify_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.ogg");
        assert!(matches!(
            verify_artifact(&missing).await,
            Err(TranscoderError::OutputMissing(_))
        ));

        let empty = dir.path().join("empty.ogg");
        fs_err::write(&empty, b"").unwrap();
        assert!(matches!(
            verify_artifact(&empty).await,
            Err(TranscoderError::OutputEmpty(_))
        ));

        let full = dir.path().join("full.ogg");
        fs_err::write(&full, b"OggS").unwrap();
        assert_eq!(verify_artifact(&full).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_verify_directory_is_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            verify_artifact(dir.path()).await,
            Err(TranscoderError::OutputMissing(_))
        ));
    }

    #[test]
    fn test_remove_artifact_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.ogg");
        fs_err::write(&path, b"OggS").unwrap();

        assert!(remove_artifact(&path));
        assert!(!path.exists());
        assert!(!remove_artifact(&path));
    }

    #[test]
    fn test_artifact_paths_are_unique_per_job() {
        let dir = Path::new("/tmp/voicenote");
        let source = SourceReference::parse("https://youtu.be/dQw4w9WgXcQ").unwrap();

        let first = artifact_path(dir, &source, "ogg");
        let second = artifact_path(dir, &source, "ogg");

        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(dir));
        assert_eq!(first.extension().and_then(|e| e.to_str()), Some("ogg"));
    }

    #[tokio::test]
    async fn test_save_to_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("note.ogg");
        fs_err::write(&artifact, b"OggS data").unwrap();

        let destination = dir.path().join("out").join("song.ogg");
        save_to_file(&artifact, &destination).await.unwrap();
        assert_eq!(fs_err::read(&destination).unwrap(), b"OggS data");
    }
}
