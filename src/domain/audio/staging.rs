use super::model::StagedArtifact;
use crate::domain::identity::AUDIO_EXTENSION;
use std::path::{Path, PathBuf};

/// Local directory of rendered audio, keyed by artifact stem.
///
/// Write-once: nothing here is ever evicted.
#[derive(Debug, Clone)]
pub struct StagingCache {
    dir: PathBuf,
}

impl StagingCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, AUDIO_EXTENSION))
    }

    /// The staged artifact, if present and non-empty.
    /// A zero-byte file is the remains of a failed write and does not count.
    pub async fn lookup(&self, stem: &str) -> Option<StagedArtifact> {
        let path = self.path_for(stem);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Some(StagedArtifact {
                fingerprint: stem.to_string(),
                local_path: path,
                size_bytes: meta.len(),
            }),
            _ => None,
        }
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }
}
