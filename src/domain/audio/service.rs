use super::error::AudioSyncError;
use super::model::{
    BatchRecord, ItemResult, PresenceRecord, StagedArtifact, StoreKind, SynthesisOutcome,
    UploadOutcome,
};
use super::oracle::ExistenceOracle;
use super::replication::{ReplicationEngine, ReplicationReport, ReplicationSettings, UploadRequest};
use super::report::{
    BatchReport, BatchStatistics, MissingBreakdown, PresenceReport, SentencePresence,
    TimingStats, UploadStats,
};
use super::staging::StagingCache;
use super::synthesis::{SynthesisJob, SynthesisPool, SynthesisSettings};
use crate::domain::identity::{
    clean_phrase_filename, fingerprint, format_phrase_for_tts, phrase_fingerprint, ArtifactClass,
};
use crate::infrastructure::config::{CosConfig, PipelineConfig, R2Config, StagingConfig};
use crate::infrastructure::repositories::SpeechSynthesizer;
use crate::infrastructure::storage::{BlockingObjectStore, ObjectStore};
use crate::infrastructure::worker_pool::BlockingPool;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of syncing one phrase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseSyncResult {
    pub phrase: String,
    pub clean_filename: String,
    /// Hash of `clean_filename`, the phrase's join key outside the stores
    pub fingerprint: String,
    pub formatted_for_tts: String,
    pub audio_generated: bool,
    pub audio_existed_locally: bool,
    pub existed_in_store_a: bool,
    pub existed_in_store_b: bool,
    pub uploaded_store_a: bool,
    pub uploaded_store_b: bool,
    pub store_a_key: String,
    pub store_b_key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unconfigured_stores: Vec<StoreKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Dependencies the audio pipeline is built from
pub struct AudioSyncDeps {
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub store_a: Option<Arc<dyn ObjectStore>>,
    pub store_b: Option<Arc<dyn BlockingObjectStore>>,
    pub r2: R2Config,
    pub cos: CosConfig,
    pub pipeline: PipelineConfig,
    pub staging: StagingConfig,
}

pub struct AudioSyncService {
    oracle: ExistenceOracle,
    sentence_cache: StagingCache,
    phrase_cache: StagingCache,
    synthesis: SynthesisPool,
    replication: ReplicationEngine,
    configured: HashSet<StoreKind>,
    r2: R2Config,
    cos: CosConfig,
    default_voice: String,
}

/// A normalized input item; `stem` names its artifact
#[derive(Debug, Clone)]
struct PipelineItem {
    stem: String,
    text: String,
    spoken_text: String,
}

/// One input row; `item` is `None` when the text was empty
struct PipelineRow {
    item: Option<PipelineItem>,
    episode_id: Option<i64>,
    episode_sequence: Option<i64>,
}

impl AudioSyncService {
    pub fn new(deps: AudioSyncDeps) -> Self {
        // Store B listing, head checks and uploads share one bounded pool
        let store_b_pool = BlockingPool::new(deps.pipeline.max_workers_cos);

        let mut configured = HashSet::new();
        if deps.store_a.is_some() {
            configured.insert(StoreKind::A);
        }
        if deps.store_b.is_some() {
            configured.insert(StoreKind::B);
        }

        Self {
            oracle: ExistenceOracle::new(
                deps.store_a.clone(),
                deps.store_b.clone(),
                store_b_pool.clone(),
            ),
            sentence_cache: StagingCache::new(&deps.staging.sentence_dir),
            phrase_cache: StagingCache::new(&deps.staging.phrase_dir),
            synthesis: SynthesisPool::new(
                deps.synthesizer,
                SynthesisSettings::from(&deps.pipeline),
            ),
            replication: ReplicationEngine::new(
                deps.store_a,
                deps.store_b,
                store_b_pool,
                ReplicationSettings::from(&deps.pipeline),
            ),
            configured,
            r2: deps.r2,
            cos: deps.cos,
            default_voice: deps.pipeline.voice,
        }
    }

    fn cache(&self, class: ArtifactClass) -> &StagingCache {
        match class {
            ArtifactClass::Sentence => &self.sentence_cache,
            ArtifactClass::Phrase => &self.phrase_cache,
        }
    }

    fn public_url(&self, store: StoreKind, key: &str) -> Option<String> {
        if !self.configured.contains(&store) {
            return None;
        }
        match store {
            StoreKind::A => self.r2.public_url(key),
            StoreKind::B => self.cos.public_url(key),
        }
    }

    fn unconfigured_among(&self, stores: &[StoreKind]) -> Vec<StoreKind> {
        stores
            .iter()
            .copied()
            .filter(|store| !self.configured.contains(store))
            .collect()
    }

    async fn run_pipeline(
        &self,
        class: ArtifactClass,
        rows: Vec<PipelineRow>,
    ) -> Result<BatchReport, AudioSyncError> {
        let started = Instant::now();
        let cache = self.cache(class);

        let mut seen = HashSet::new();
        let unique: Vec<PipelineItem> = rows
            .iter()
            .filter_map(|row| row.item.as_ref())
            .filter(|item| seen.insert(item.stem.clone()))
            .cloned()
            .collect();
        let skipped_empty = rows.iter().filter(|row| row.item.is_none()).count();

        tracing::info!(
            class = ?class,
            total_items = rows.len(),
            unique_items = unique.len(),
            skipped_empty = skipped_empty,
            "Starting audio sync"
        );

        // 1. Presence in both stores
        let stems: Vec<String> = unique.iter().map(|item| item.stem.clone()).collect();
        let (presence, store_status) = self.oracle.check_bulk(class, &stems).await;
        let presence_by_stem: HashMap<&str, &PresenceRecord> = presence
            .iter()
            .map(|record| (record.fingerprint.as_str(), record))
            .collect();

        let pending: Vec<(&PipelineItem, &PresenceRecord)> = unique
            .iter()
            .zip(presence.iter())
            .filter(|(_, record)| !record.fully_present())
            .collect();

        // 2. Local staging
        let lookups = join_all(pending.iter().map(|(item, _)| cache.lookup(&item.stem))).await;
        let mut staged: HashMap<String, StagedArtifact> = HashMap::new();
        let mut jobs = Vec::new();
        for ((item, _), lookup) in pending.iter().zip(lookups) {
            match lookup {
                Some(artifact) => {
                    staged.insert(item.stem.clone(), artifact);
                }
                None => jobs.push(SynthesisJob {
                    fingerprint: item.stem.clone(),
                    text: item.spoken_text.clone(),
                    voice: self.default_voice.clone(),
                    output_path: cache.path_for(&item.stem),
                }),
            }
        }

        // 3. Generation
        if !jobs.is_empty() {
            cache.ensure_dir().await.map_err(|e| {
                AudioSyncError::Staging(format!("{}: {}", cache.dir().display(), e))
            })?;
        }
        let generation_started = Instant::now();
        let synthesis: HashMap<String, SynthesisOutcome> = self
            .synthesis
            .run(jobs)
            .await
            .into_iter()
            .map(|outcome| (outcome.fingerprint.clone(), outcome))
            .collect();
        let generation_time = generation_started.elapsed();

        // 4. Replication of everything now on disk
        let requests: Vec<UploadRequest> = pending
            .iter()
            .filter_map(|(item, record)| {
                let artifact = staged.get(&item.stem).cloned().or_else(|| {
                    synthesis
                        .get(&item.stem)
                        .and_then(|outcome| outcome.artifact.clone())
                })?;
                Some(UploadRequest {
                    artifact,
                    key: class.object_key(&item.stem),
                    targets: record.missing_from(),
                })
            })
            .collect();
        let replication = self.replication.replicate(&requests).await;
        let uploads: HashMap<(&str, StoreKind), &UploadOutcome> = replication
            .outcomes()
            .map(|outcome| ((outcome.fingerprint.as_str(), outcome.store), outcome))
            .collect();

        // 5. Reconciliation
        let items: Vec<ItemResult> = rows
            .iter()
            .filter_map(|row| {
                let item = row.item.as_ref()?;
                let absent = PresenceRecord::absent(&item.stem);
                let record = presence_by_stem.get(item.stem.as_str()).copied().unwrap_or(&absent);
                Some(self.item_result(
                    class,
                    item,
                    row,
                    record,
                    staged.contains_key(&item.stem),
                    synthesis.get(&item.stem),
                    &uploads,
                ))
            })
            .collect();

        let newly_generated = synthesis.values().filter(|o| o.generated()).count();
        let statistics = BatchStatistics {
            total_items: rows.len(),
            unique_items: unique.len(),
            skipped_empty,
            already_present: presence.iter().filter(|r| r.fully_present()).count(),
            missing: MissingBreakdown::from_records(&presence),
            newly_generated,
            already_staged: staged.len(),
            generation_failed: synthesis.len() - newly_generated,
            store_a: UploadStats::from_report(&replication.store_a),
            store_b: UploadStats::from_report(&replication.store_b),
            timing: TimingStats::new(
                generation_time,
                newly_generated,
                replication.duration,
                replication.outcomes().count(),
                started.elapsed(),
            ),
        };

        log_statistics(&statistics, &replication);

        Ok(BatchReport {
            items,
            statistics,
            store_status,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn item_result(
        &self,
        class: ArtifactClass,
        item: &PipelineItem,
        row: &PipelineRow,
        record: &PresenceRecord,
        existed_locally: bool,
        synthesis: Option<&SynthesisOutcome>,
        uploads: &HashMap<(&str, StoreKind), &UploadOutcome>,
    ) -> ItemResult {
        let key = class.object_key(&item.stem);
        let upload = |store: StoreKind| uploads.get(&(item.stem.as_str(), store)).copied();
        let uploaded = |store: StoreKind| upload(store).map(|o| o.success).unwrap_or(false);

        let mut errors = Vec::new();
        if let Some(error) = synthesis.and_then(|o| o.error.as_ref()) {
            errors.push(format!("generation failed: {}", error));
        }
        for store in StoreKind::ALL {
            if let Some(error) = upload(store).and_then(|o| o.error.as_ref()) {
                errors.push(format!("{} upload failed: {}", store, error));
            }
        }

        let url = |store: StoreKind| {
            if record.exists_in(store) || uploaded(store) {
                self.public_url(store, &key)
            } else {
                None
            }
        };

        ItemResult {
            fingerprint: item.stem.clone(),
            text: item.text.clone(),
            spoken_text: item.spoken_text.clone(),
            generated: synthesis.map(SynthesisOutcome::generated).unwrap_or(false),
            existed_locally,
            existed_in_store_a: record.exists_in_store_a,
            existed_in_store_b: record.exists_in_store_b,
            uploaded_store_a: uploaded(StoreKind::A),
            uploaded_store_b: uploaded(StoreKind::B),
            unconfigured_stores: self.unconfigured_among(&record.missing_from()),
            store_a_url: url(StoreKind::A),
            store_b_url: url(StoreKind::B),
            episode_id: row.episode_id,
            episode_sequence: row.episode_sequence,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        }
    }
}

fn log_statistics(statistics: &BatchStatistics, replication: &ReplicationReport) {
    tracing::info!(
        total_items = statistics.total_items,
        already_present = statistics.already_present,
        newly_generated = statistics.newly_generated,
        already_staged = statistics.already_staged,
        generation_failed = statistics.generation_failed,
        store_a_uploaded = statistics.store_a.successful,
        store_a_failed = statistics.store_a.failed,
        store_b_uploaded = statistics.store_b.successful,
        store_b_failed = statistics.store_b.failed,
        total_secs = format!("{:.2}", statistics.timing.total_seconds),
        "Audio sync completed"
    );

    for store in StoreKind::ALL {
        let report = replication.for_store(store);
        if !report.configured && report.skipped_unconfigured > 0 {
            tracing::warn!(
                store = %store,
                skipped = report.skipped_unconfigured,
                "Uploads skipped: configuration incomplete"
            );
        }
    }
}

#[async_trait]
pub trait AudioSyncApi: Send + Sync {
    /// Make sure every sentence has audio in both stores.
    ///
    /// Never fails because of a single item; per-item problems are reported
    /// on the item. Fails only when the staging directory is unusable.
    async fn sync_batch(&self, records: Vec<BatchRecord>) -> Result<BatchReport, AudioSyncError>;

    /// Same pipeline for phrase audio, keyed by the clean phrase filename
    async fn sync_phrases(&self, phrases: Vec<String>) -> Result<BatchReport, AudioSyncError>;

    /// Sync one phrase using point lookups instead of listings
    async fn sync_phrase(
        &self,
        phrase: &str,
        voice: Option<&str>,
        check_existing: bool,
    ) -> Result<PhraseSyncResult, AudioSyncError>;

    /// Presence of each sentence, grouped by episode; nothing is generated
    async fn check_presence(&self, records: &[BatchRecord]) -> Result<PresenceReport, AudioSyncError>;
}

#[async_trait]
impl AudioSyncApi for AudioSyncService {
    async fn sync_batch(&self, records: Vec<BatchRecord>) -> Result<BatchReport, AudioSyncError> {
        let rows = records
            .into_iter()
            .map(|record| {
                let text = record.text.trim();
                PipelineRow {
                    item: (!text.is_empty()).then(|| PipelineItem {
                        stem: fingerprint(text),
                        text: text.to_string(),
                        spoken_text: text.to_string(),
                    }),
                    episode_id: record.episode_id,
                    episode_sequence: record.episode_sequence,
                }
            })
            .collect();

        self.run_pipeline(ArtifactClass::Sentence, rows).await
    }

    async fn sync_phrases(&self, phrases: Vec<String>) -> Result<BatchReport, AudioSyncError> {
        let rows = phrases
            .iter()
            .map(|phrase| {
                let phrase = phrase.trim();
                let stem = clean_phrase_filename(phrase);
                PipelineRow {
                    item: (!stem.is_empty()).then(|| PipelineItem {
                        stem,
                        text: phrase.to_string(),
                        spoken_text: format_phrase_for_tts(phrase),
                    }),
                    episode_id: None,
                    episode_sequence: None,
                }
            })
            .collect();

        self.run_pipeline(ArtifactClass::Phrase, rows).await
    }

    async fn sync_phrase(
        &self,
        phrase: &str,
        voice: Option<&str>,
        check_existing: bool,
    ) -> Result<PhraseSyncResult, AudioSyncError> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(AudioSyncError::Invalid("Phrase must not be empty".to_string()));
        }
        let clean_filename = clean_phrase_filename(phrase);
        if clean_filename.is_empty() {
            return Err(AudioSyncError::Invalid(format!(
                "Phrase '{}' has no characters usable in a filename",
                phrase
            )));
        }

        let class = ArtifactClass::Phrase;
        let key = class.object_key(&clean_filename);
        let presence = if check_existing {
            self.oracle.check_point(class, &clean_filename).await
        } else {
            PresenceRecord::absent(&clean_filename)
        };

        let mut result = PhraseSyncResult {
            phrase: phrase.to_string(),
            clean_filename: clean_filename.clone(),
            fingerprint: phrase_fingerprint(phrase),
            formatted_for_tts: format_phrase_for_tts(phrase),
            audio_generated: false,
            audio_existed_locally: false,
            existed_in_store_a: presence.exists_in_store_a,
            existed_in_store_b: presence.exists_in_store_b,
            uploaded_store_a: false,
            uploaded_store_b: false,
            store_a_key: key.clone(),
            store_b_key: key.clone(),
            unconfigured_stores: self.unconfigured_among(&presence.missing_from()),
            local_path: None,
            error: None,
        };

        if presence.fully_present() {
            tracing::info!(phrase = %phrase, key = %key, "Phrase audio already in both stores");
            return Ok(result);
        }

        let artifact = match self.phrase_cache.lookup(&clean_filename).await {
            Some(artifact) => {
                result.audio_existed_locally = true;
                artifact
            }
            None => {
                self.phrase_cache.ensure_dir().await.map_err(|e| {
                    AudioSyncError::Staging(format!("{}: {}", self.phrase_cache.dir().display(), e))
                })?;
                let outcome = self
                    .synthesis
                    .synthesize_one(SynthesisJob {
                        fingerprint: clean_filename.clone(),
                        text: result.formatted_for_tts.clone(),
                        voice: voice.unwrap_or(self.default_voice.as_str()).to_string(),
                        output_path: self.phrase_cache.path_for(&clean_filename),
                    })
                    .await;
                match outcome.artifact {
                    Some(artifact) => {
                        result.audio_generated = true;
                        artifact
                    }
                    None => {
                        result.error = outcome.error;
                        return Ok(result);
                    }
                }
            }
        };
        result.local_path = Some(artifact.local_path.clone());

        let replication = self
            .replication
            .replicate(&[UploadRequest {
                artifact,
                key,
                targets: presence.missing_from(),
            }])
            .await;

        result.uploaded_store_a = replication.store_a.outcomes.iter().any(|o| o.success);
        result.uploaded_store_b = replication.store_b.outcomes.iter().any(|o| o.success);

        let errors: Vec<String> = replication
            .outcomes()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{} upload failed: {}", o.store, e)))
            .collect();
        if !errors.is_empty() {
            result.error = Some(errors.join("; "));
        }

        Ok(result)
    }

    async fn check_presence(&self, records: &[BatchRecord]) -> Result<PresenceReport, AudioSyncError> {
        let keyed: Vec<(&BatchRecord, String)> = records
            .iter()
            .filter(|record| !record.text.trim().is_empty())
            .map(|record| (record, fingerprint(&record.text)))
            .collect();

        let mut seen = HashSet::new();
        let stems: Vec<String> = keyed
            .iter()
            .map(|(_, fp)| fp.clone())
            .filter(|fp| seen.insert(fp.clone()))
            .collect();

        let (presence, store_status) = self.oracle.check_bulk(ArtifactClass::Sentence, &stems).await;
        let by_stem: HashMap<&str, &PresenceRecord> = presence
            .iter()
            .map(|record| (record.fingerprint.as_str(), record))
            .collect();

        let rows = keyed
            .into_iter()
            .map(|(record, fp)| {
                let found = by_stem.get(fp.as_str());
                SentencePresence {
                    episode_id: record.episode_id,
                    episode_sequence: record.episode_sequence,
                    text: record.text.trim().to_string(),
                    exists_in_store_a: found.map(|r| r.exists_in_store_a).unwrap_or(false),
                    exists_in_store_b: found.map(|r| r.exists_in_store_b).unwrap_or(false),
                    fingerprint: fp,
                }
            })
            .collect();

        Ok(PresenceReport::group_by_episode(rows, store_status))
    }
}
