//! Source-artifact disposition
//!
//! After a job completes, the original downloaded artifact is either moved
//! into the processed-artifacts area, copied there, or deleted outright.
//! Disposition runs exactly once per job and its failures are housekeeping
//! problems only: the orchestrator logs them and never demotes a job that
//! already succeeded.

use rede_common::types::DispositionPolicy;
use rede_common::{PipelineError, Result};
use std::path::Path;
use tracing::{debug, info};

/// Apply `policy` to a staging artifact.
///
/// - `Move`: relocate into `processed_dir` (rename, with a copy-and-remove
///   fallback for cross-filesystem staging layouts).
/// - `Copy`: duplicate into `processed_dir`, then remove the staging copy.
/// - `Delete`: remove the staging copy without retention.
pub fn dispose(artifact: &Path, policy: DispositionPolicy, processed_dir: &Path) -> Result<()> {
    let file_name = artifact
        .file_name()
        .ok_or_else(|| disposition_error(artifact, "artifact has no file name"))?;

    match policy {
        DispositionPolicy::Move => {
            std::fs::create_dir_all(processed_dir)
                .map_err(|e| disposition_error(artifact, &e.to_string()))?;
            let target = processed_dir.join(file_name);
            if std::fs::rename(artifact, &target).is_err() {
                // Rename fails across filesystems; fall back to copy+remove.
                std::fs::copy(artifact, &target)
                    .map_err(|e| disposition_error(artifact, &e.to_string()))?;
                std::fs::remove_file(artifact)
                    .map_err(|e| disposition_error(artifact, &e.to_string()))?;
            }
            info!(artifact = %artifact.display(), target = %target.display(), "artifact moved");
        },
        DispositionPolicy::Copy => {
            std::fs::create_dir_all(processed_dir)
                .map_err(|e| disposition_error(artifact, &e.to_string()))?;
            let target = processed_dir.join(file_name);
            std::fs::copy(artifact, &target)
                .map_err(|e| disposition_error(artifact, &e.to_string()))?;
            std::fs::remove_file(artifact)
                .map_err(|e| disposition_error(artifact, &e.to_string()))?;
            info!(artifact = %artifact.display(), target = %target.display(), "artifact copied");
        },
        DispositionPolicy::Delete => {
            std::fs::remove_file(artifact)
                .map_err(|e| disposition_error(artifact, &e.to_string()))?;
            debug!(artifact = %artifact.display(), "artifact deleted");
        },
    }

    Ok(())
}

fn disposition_error(path: &Path, reason: &str) -> PipelineError {
    PipelineError::Disposition {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staged_artifact(dir: &TempDir) -> std::path::PathBuf {
        let staging = dir.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        let artifact = staging.join("TAXASSESSOR_0001.zip");
        std::fs::write(&artifact, b"archive bytes").unwrap();
        artifact
    }

    #[test]
    fn test_move_relocates_artifact() {
        let dir = TempDir::new().unwrap();
        let artifact = staged_artifact(&dir);
        let processed = dir.path().join("processed");

        dispose(&artifact, DispositionPolicy::Move, &processed).unwrap();

        assert!(!artifact.exists());
        assert!(processed.join("TAXASSESSOR_0001.zip").exists());
    }

    #[test]
    fn test_copy_duplicates_and_clears_staging() {
        let dir = TempDir::new().unwrap();
        let artifact = staged_artifact(&dir);
        let processed = dir.path().join("processed");

        dispose(&artifact, DispositionPolicy::Copy, &processed).unwrap();

        assert!(!artifact.exists());
        let retained = processed.join("TAXASSESSOR_0001.zip");
        assert_eq!(std::fs::read(retained).unwrap(), b"archive bytes");
    }

    #[test]
    fn test_delete_removes_without_retention() {
        let dir = TempDir::new().unwrap();
        let artifact = staged_artifact(&dir);
        let processed = dir.path().join("processed");

        dispose(&artifact, DispositionPolicy::Delete, &processed).unwrap();

        assert!(!artifact.exists());
        assert!(!processed.exists());
    }

    #[test]
    fn test_missing_artifact_is_disposition_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("staging").join("gone.zip");

        let err = dispose(&missing, DispositionPolicy::Delete, dir.path()).unwrap_err();
        assert_eq!(err.kind(), "disposition");
    }
}
