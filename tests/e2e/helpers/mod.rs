use async_trait::async_trait;
use lingohow_backend::container::AppContainer;
use lingohow_backend::infrastructure::config::{
    Config, CosConfig, EpisodeStoreConfig, Environment, LogFormat, PipelineConfig, R2Config,
    StagingConfig,
};
use lingohow_backend::infrastructure::repositories::{SpeechSynthesizer, TextGenerator};
use lingohow_backend::infrastructure::storage::{
    BlockingObjectStore, ListPage, ObjectStore, StoreError,
};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Bytes written by the fake synthesizer; any non-empty payload is valid audio here
pub const FAKE_MP3: &[u8] = &[0xFF, 0xFB, 0x90, 0x00, 0x00, 0x00, 0x00, 0x00];

/// In-memory bucket usable as either store.
///
/// Listings are served in small pages so callers have to follow tokens.
pub struct MemoryStore {
    name: String,
    objects: Mutex<BTreeSet<String>>,
    uploads: Mutex<Vec<String>>,
    page_size: usize,
    reject_puts: bool,
}

impl MemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: Mutex::new(BTreeSet::new()),
            uploads: Mutex::new(Vec::new()),
            page_size: 2,
            reject_puts: false,
        }
    }

    pub fn rejecting_uploads(name: &str) -> Self {
        Self {
            reject_puts: true,
            ..Self::new(name)
        }
    }

    pub fn seed(&self, key: &str) {
        self.objects.lock().unwrap().insert(key.to_string());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains(key)
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    fn page(&self, prefix: &str, token: Option<String>) -> ListPage {
        let start: usize = token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let matching: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        let end = (start + self.page_size).min(matching.len());
        let has_more = end < matching.len();
        ListPage {
            keys: matching[start.min(end)..end].to_vec(),
            next_token: has_more.then(|| end.to_string()),
            has_more,
        }
    }

    fn store(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        if self.reject_puts {
            return Err(StoreError::Rejected {
                status: 403,
                message: "AccessDenied".to_string(),
            });
        }
        let bytes = std::fs::read(local_path).map_err(|e| StoreError::LocalFile(e.to_string()))?;
        assert!(!bytes.is_empty(), "uploaded an empty artifact for {}", key);

        self.objects.lock().unwrap().insert(key.to_string());
        self.uploads.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StoreError> {
        Ok(self.page(prefix, continuation_token))
    }

    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.contains(key))
    }

    async fn put(&self, local_path: &Path, key: &str, _content_type: &str) -> Result<(), StoreError> {
        self.store(local_path, key)
    }
}

impl BlockingObjectStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_page(&self, prefix: &str, marker: Option<String>) -> Result<ListPage, StoreError> {
        Ok(self.page(prefix, marker))
    }

    fn head(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.contains(key))
    }

    fn put(&self, local_path: &Path, key: &str, _content_type: &str) -> Result<(), StoreError> {
        self.store(local_path, key)
    }
}

/// Writes a fixed payload for every request; texts listed in `hang_on` never finish
#[derive(Default)]
pub struct ScriptedSynthesizer {
    hang_on: HashSet<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedSynthesizer {
    pub fn hanging_on(texts: &[&str]) -> Self {
        Self {
            hang_on: texts.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn spoken_texts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(text, _)| text.clone()).collect()
    }

    pub fn voices(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, voice)| voice.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str, output_path: &Path) -> Result<(), String> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), voice.to_string()));

        if self.hang_on.contains(text) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        tokio::fs::write(output_path, FAKE_MP3)
            .await
            .map_err(|e| format!("Failed to write audio file: {}", e))
    }
}

/// Deterministic enrichment; any text containing "unlucky" fails translation
pub struct FakeGenerator;

impl TextGenerator for FakeGenerator {
    fn translate(&self, text: &str) -> Result<String, String> {
        if text.contains("unlucky") {
            return Err("translation backend unavailable".to_string());
        }
        Ok(format!("[zh] {}", text))
    }

    fn phonetic(&self, text: &str) -> Result<String, String> {
        Ok(format!("/{}/", text.to_lowercase()))
    }

    fn highlight(&self, text: &str, _translation: &str) -> Result<Vec<String>, String> {
        Ok(text
            .split_whitespace()
            .filter(|w| w.len() > 4)
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .collect())
    }
}

pub struct TestContext {
    pub container: AppContainer,
    pub store_a: Arc<MemoryStore>,
    pub store_b: Option<Arc<MemoryStore>>,
    pub synthesizer: Arc<ScriptedSynthesizer>,
    pub config: Config,
    _dir: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self::build(ScriptedSynthesizer::default(), Some(MemoryStore::new("cos")))
    }

    pub fn with_synthesizer(synthesizer: ScriptedSynthesizer) -> Self {
        Self::build(synthesizer, Some(MemoryStore::new("cos")))
    }

    pub fn with_store_b(store_b: MemoryStore) -> Self {
        Self::build(ScriptedSynthesizer::default(), Some(store_b))
    }

    /// Store B credentials missing: the container gets no store B at all
    pub fn without_store_b() -> Self {
        Self::build(ScriptedSynthesizer::default(), None)
    }

    fn build(synthesizer: ScriptedSynthesizer, store_b: Option<MemoryStore>) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = test_config(dir.path(), store_b.is_some());

        let synthesizer = Arc::new(synthesizer);
        let store_a = Arc::new(MemoryStore::new("r2"));
        let store_b = store_b.map(Arc::new);

        let container = AppContainer::from_parts(
            config.clone(),
            synthesizer.clone(),
            Some(store_a.clone() as Arc<dyn ObjectStore>),
            store_b
                .clone()
                .map(|store| store as Arc<dyn BlockingObjectStore>),
        );

        Self {
            container,
            store_a,
            store_b,
            synthesizer,
            config,
            _dir: dir,
        }
    }

    pub fn store_b(&self) -> &MemoryStore {
        self.store_b.as_deref().expect("store B is not configured in this context")
    }

    pub fn sentence_dir(&self) -> &Path {
        &self.config.staging.sentence_dir
    }

    pub fn episode_dir(&self) -> &Path {
        &self.config.episodes.storage_dir
    }
}

fn test_config(root: &Path, with_store_b: bool) -> Config {
    let cos = if with_store_b {
        CosConfig {
            secret_id: "test-secret-id".to_string(),
            secret_key: "test-secret-key".to_string(),
            bucket: "lingohow-1250000000".to_string(),
            region: "ap-shanghai".to_string(),
        }
    } else {
        CosConfig::default()
    };

    Config {
        aws_region: "us-east-1".to_string(),
        environment: Environment::Development,
        log_format: LogFormat::Pretty,
        r2: R2Config {
            bucket: "lingohow".to_string(),
            access_key_id: "test-access-key".to_string(),
            secret_access_key: "test-secret".to_string(),
            endpoint_url: "https://test.r2.cloudflarestorage.com".to_string(),
            account_id: "test".to_string(),
        },
        cos,
        pipeline: PipelineConfig {
            max_concurrent_audio: 3,
            max_concurrent_r2: 4,
            max_workers_cos: 2,
            max_workers_enhancement: 2,
            audio_timeout_seconds: 1,
            max_retries: 0,
            retry_delay_ms: 10,
            r2_teardown_grace_ms: 0,
            voice: "Joanna".to_string(),
        },
        staging: StagingConfig {
            sentence_dir: root.join("audio/sentences"),
            phrase_dir: root.join("audio/expressionss"),
        },
        episodes: EpisodeStoreConfig {
            storage_dir: root.join("episodes"),
            write_lock_timeout_secs: 5,
            read_lock_timeout_secs: 5,
            lock_poll_interval_ms: 5,
        },
        batch_input_file: None,
    }
}

pub fn staged_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{}.mp3", stem))
}
