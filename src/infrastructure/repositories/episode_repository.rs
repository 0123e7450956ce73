use crate::domain::episode::{
    episode_key, DeleteReceipt, EpisodeDocument, EpisodeListing, SaveReceipt,
    SentenceUpdateReceipt,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::config::EpisodeStoreConfig;
use chrono::Utc;
use fs2::FileExt;
use serde_json::error::Category;
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// File-backed episode documents, one `EP{id}.json` per episode.
///
/// Every mutation holds an exclusive advisory lock on `EP{id}.lock` for its
/// whole read-modify-write sequence. The lock is a real OS file lock, so it
/// also serializes writers in other processes. All methods block and must run
/// off the async runtime.
pub struct EpisodeRepository {
    storage_dir: PathBuf,
    write_lock_timeout: Duration,
    read_lock_timeout: Duration,
    poll_interval: Duration,
}

/// Held lock on an episode; released on drop
struct EpisodeLock {
    file: File,
}

impl Drop for EpisodeLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl EpisodeRepository {
    pub fn new(config: &EpisodeStoreConfig) -> Self {
        Self {
            storage_dir: config.storage_dir.clone(),
            write_lock_timeout: config.write_lock_timeout(),
            read_lock_timeout: config.read_lock_timeout(),
            poll_interval: config.lock_poll_interval(),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    fn document_path(&self, episode_id: i64) -> PathBuf {
        self.storage_dir
            .join(format!("{}.json", episode_key(episode_id)))
    }

    fn lock_path(&self, episode_id: i64) -> PathBuf {
        self.storage_dir
            .join(format!("{}.lock", episode_key(episode_id)))
    }

    /// Poll for the exclusive lock until `timeout` elapses
    fn acquire(&self, episode_id: i64, timeout: Duration) -> AppResult<EpisodeLock> {
        let lock_path = self.lock_path(episode_id);
        let deadline = Instant::now() + timeout;

        loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;

            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    // A delete may have unlinked the lock file while we waited on it
                    if lock_file_is_current(&file, &lock_path) {
                        return Ok(EpisodeLock { file });
                    }
                    continue;
                }
                Err(e) if is_contended(&e) => {}
                Err(e) => return Err(AppError::Io(e)),
            }

            if Instant::now() >= deadline {
                tracing::warn!(
                    episode_id = episode_id,
                    timeout_secs = timeout.as_secs_f64(),
                    "Episode lock not acquired"
                );
                return Err(AppError::LockTimeout(format!(
                    "Could not acquire lock for episode {} within {} seconds",
                    episode_id,
                    timeout.as_secs_f64()
                )));
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn load(&self, episode_id: i64) -> AppResult<Option<EpisodeDocument>> {
        let path = self.document_path(episode_id);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(AppError::Io(e)),
        };

        parse_document(&raw).map(Some).map_err(|e| {
            tracing::error!(episode_id = episode_id, error = %e, "Episode document is malformed");
            AppError::Integrity(format!("Episode {}: {}", episode_id, e))
        })
    }

    /// Write through a temp file in the same directory, then rename over the target
    fn store(&self, document: &EpisodeDocument) -> AppResult<PathBuf> {
        let path = self.document_path(document.episode_id);
        let tmp_path = self.storage_dir.join(format!(
            ".{}.{}.tmp",
            episode_key(document.episode_id),
            Uuid::new_v4()
        ));

        let body = serde_json::to_vec_pretty(document)
            .map_err(|e| AppError::Internal(format!("Failed to serialize episode: {}", e)))?;

        if let Err(e) = write_and_rename(&tmp_path, &path, &body) {
            let _ = fs::remove_file(&tmp_path);
            return Err(AppError::Io(e));
        }
        Ok(path)
    }

    /// Create or fully replace an episode document
    pub fn save(
        &self,
        episode_id: i64,
        sentences: Vec<Value>,
        metadata: Map<String, Value>,
    ) -> AppResult<SaveReceipt> {
        fs::create_dir_all(&self.storage_dir)?;
        let _lock = self.acquire(episode_id, self.write_lock_timeout)?;

        let document = match self.load(episode_id)? {
            Some(existing) => existing.replaced_by(sentences, metadata),
            None => EpisodeDocument::new(episode_id, sentences, metadata),
        };
        let file_path = self.store(&document)?;

        tracing::info!(
            episode_id = episode_id,
            sentence_count = document.sentences.len(),
            version = document.version,
            "Saved episode"
        );

        Ok(SaveReceipt {
            episode_id,
            file_path,
            sentence_count: document.sentences.len(),
            version: document.version,
            saved_at: document.updated_at,
        })
    }

    /// Full replacement; identical to [`EpisodeRepository::save`]
    pub fn update_episode(
        &self,
        episode_id: i64,
        sentences: Vec<Value>,
        metadata: Map<String, Value>,
    ) -> AppResult<SaveReceipt> {
        self.save(episode_id, sentences, metadata)
    }

    pub fn read(&self, episode_id: i64) -> AppResult<EpisodeDocument> {
        if !self.exists(episode_id) {
            return Err(not_found(episode_id));
        }

        let _lock = self.acquire(episode_id, self.read_lock_timeout)?;
        let document = self.load(episode_id)?.ok_or_else(|| not_found(episode_id))?;

        tracing::debug!(episode_id = episode_id, version = document.version, "Read episode");
        Ok(document)
    }

    /// Replace one sentence in place; the sentence count never changes
    pub fn update_sentence(
        &self,
        episode_id: i64,
        sentence_index: usize,
        sentence: Value,
    ) -> AppResult<SentenceUpdateReceipt> {
        if !self.exists(episode_id) {
            return Err(not_found(episode_id));
        }

        let _lock = self.acquire(episode_id, self.write_lock_timeout)?;
        let mut document = self.load(episode_id)?.ok_or_else(|| not_found(episode_id))?;

        let count = document.sentences.len();
        let slot = document.sentences.get_mut(sentence_index).ok_or_else(|| {
            if count == 0 {
                AppError::BadRequest(format!("Episode {} has no sentences", episode_id))
            } else {
                AppError::BadRequest(format!(
                    "Sentence index {} out of range (0-{})",
                    sentence_index,
                    count - 1
                ))
            }
        })?;
        *slot = sentence;
        document.updated_at = Utc::now();
        document.version += 1;

        self.store(&document)?;

        tracing::info!(
            episode_id = episode_id,
            sentence_index = sentence_index,
            version = document.version,
            "Updated sentence"
        );

        Ok(SentenceUpdateReceipt {
            episode_id,
            sentence_index,
            version: document.version,
            updated_at: document.updated_at,
        })
    }

    /// Remove the document and its lock file
    pub fn delete(&self, episode_id: i64) -> AppResult<DeleteReceipt> {
        if !self.exists(episode_id) {
            return Err(not_found(episode_id));
        }

        let lock = self.acquire(episode_id, self.write_lock_timeout)?;
        match fs::remove_file(self.document_path(episode_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found(episode_id)),
            Err(e) => return Err(AppError::Io(e)),
        }

        // Unlink while still holding the lock; waiters notice the stale inode and retry
        if let Err(e) = fs::remove_file(self.lock_path(episode_id)) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(episode_id = episode_id, error = %e, "Failed to remove lock file");
            }
        }
        drop(lock);

        tracing::info!(episode_id = episode_id, "Deleted episode");
        Ok(DeleteReceipt {
            episode_id,
            deleted_at: Utc::now(),
        })
    }

    /// Every `EP{id}.json` in the storage directory, sorted by id
    pub fn list(&self) -> AppResult<Vec<EpisodeListing>> {
        let entries = match fs::read_dir(&self.storage_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut listings = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(episode_id) = parse_episode_file_name(&file_name) else {
                continue;
            };

            let file_size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let parsed = fs::read(entry.path())
                .map_err(|e| e.to_string())
                .and_then(|raw| parse_document(&raw));

            listings.push(match parsed {
                Ok(doc) => EpisodeListing::Summary {
                    episode_id,
                    file_name,
                    sentence_count: doc.sentences.len(),
                    version: doc.version,
                    created_at: doc.created_at,
                    updated_at: doc.updated_at,
                    file_size_bytes,
                },
                Err(error) => {
                    tracing::warn!(episode_id = episode_id, error = %error, "Could not read episode");
                    EpisodeListing::Unreadable {
                        episode_id,
                        file_name,
                        error,
                        file_size_bytes,
                    }
                }
            });
        }

        listings.sort_by_key(EpisodeListing::episode_id);
        tracing::debug!(count = listings.len(), "Listed episodes");
        Ok(listings)
    }

    pub fn exists(&self, episode_id: i64) -> bool {
        self.document_path(episode_id).is_file()
    }
}

fn write_and_rename(tmp_path: &Path, path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut tmp = File::create(tmp_path)?;
    tmp.write_all(body)?;
    tmp.sync_all()?;
    fs::rename(tmp_path, path)
}

fn not_found(episode_id: i64) -> AppError {
    AppError::NotFound(format!("Episode {} not found", episode_id))
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(unix)]
fn lock_file_is_current(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(on_disk)) => held.ino() == on_disk.ino() && held.dev() == on_disk.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn lock_file_is_current(_file: &File, path: &Path) -> bool {
    path.exists()
}

/// Distinguishes unparseable bytes from well-formed JSON that is not an episode
fn parse_document(raw: &[u8]) -> Result<EpisodeDocument, String> {
    serde_json::from_slice(raw).map_err(|e| match e.classify() {
        Category::Data => format!("Malformed document: {}", e),
        Category::Io | Category::Syntax | Category::Eof => format!("Invalid JSON: {}", e),
    })
}

/// `EP12.json` -> `Some(12)`
fn parse_episode_file_name(file_name: &str) -> Option<i64> {
    file_name
        .strip_prefix("EP")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}
