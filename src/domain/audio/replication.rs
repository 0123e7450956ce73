use super::model::{StagedArtifact, StoreKind, UploadOutcome};
use crate::domain::identity::AUDIO_CONTENT_TYPE;
use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::storage::{BlockingObjectStore, ObjectStore};
use crate::infrastructure::worker_pool::BlockingPool;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// One staged artifact and the stores that still lack it
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub artifact: StagedArtifact,
    pub key: String,
    pub targets: Vec<StoreKind>,
}

impl UploadRequest {
    fn targets(&self, store: StoreKind) -> bool {
        self.targets.contains(&store)
    }
}

#[derive(Debug, Clone)]
pub struct ReplicationSettings {
    pub store_a_concurrency: usize,
    pub teardown_grace: Duration,
}

impl From<&PipelineConfig> for ReplicationSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            store_a_concurrency: config.max_concurrent_r2.max(1),
            teardown_grace: config.r2_teardown_grace(),
        }
    }
}

/// Result of one store's sub-pipeline
#[derive(Debug, Clone, Serialize)]
pub struct StoreUploadReport {
    pub store: StoreKind,
    pub configured: bool,
    pub outcomes: Vec<UploadOutcome>,
    /// Uploads not attempted because the store has no usable credentials
    pub skipped_unconfigured: usize,
    pub duration: Duration,
}

impl StoreUploadReport {
    fn empty(store: StoreKind, configured: bool) -> Self {
        Self {
            store,
            configured,
            outcomes: Vec::new(),
            skipped_unconfigured: 0,
            duration: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplicationReport {
    pub store_a: StoreUploadReport,
    pub store_b: StoreUploadReport,
    pub duration: Duration,
}

impl ReplicationReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.store_a.outcomes.iter().chain(self.store_b.outcomes.iter())
    }

    pub fn for_store(&self, store: StoreKind) -> &StoreUploadReport {
        match store {
            StoreKind::A => &self.store_a,
            StoreKind::B => &self.store_b,
        }
    }
}

/// Uploads artifacts to whichever stores lack them.
///
/// The two stores are independent sub-pipelines running side by side. Store A
/// shares one client across a batch under a per-batch semaphore; store B's
/// blocking client is only ever called from the worker pool.
pub struct ReplicationEngine {
    store_a: Option<Arc<dyn ObjectStore>>,
    store_b: Option<Arc<dyn BlockingObjectStore>>,
    pool: BlockingPool,
    settings: ReplicationSettings,
}

impl ReplicationEngine {
    pub fn new(
        store_a: Option<Arc<dyn ObjectStore>>,
        store_b: Option<Arc<dyn BlockingObjectStore>>,
        pool: BlockingPool,
        settings: ReplicationSettings,
    ) -> Self {
        Self {
            store_a,
            store_b,
            pool,
            settings,
        }
    }

    pub async fn replicate(&self, requests: &[UploadRequest]) -> ReplicationReport {
        let started = Instant::now();
        let (store_a, store_b) =
            tokio::join!(self.upload_store_a(requests), self.upload_store_b(requests));

        let report = ReplicationReport {
            store_a,
            store_b,
            duration: started.elapsed(),
        };

        tracing::info!(
            requests = requests.len(),
            store_a_uploads = report.store_a.outcomes.len(),
            store_b_uploads = report.store_b.outcomes.len(),
            latency_ms = report.duration.as_millis(),
            "Replication finished"
        );
        report
    }

    async fn upload_store_a(&self, requests: &[UploadRequest]) -> StoreUploadReport {
        let wanted: Vec<&UploadRequest> =
            requests.iter().filter(|r| r.targets(StoreKind::A)).collect();
        if wanted.is_empty() {
            return StoreUploadReport::empty(StoreKind::A, self.store_a.is_some());
        }

        let Some(store) = &self.store_a else {
            return unconfigured_report(StoreKind::A, wanted.len());
        };

        let started = Instant::now();
        // Bound is scoped to this batch; concurrent batches get their own semaphore
        let permits = Arc::new(Semaphore::new(self.settings.store_a_concurrency));

        let handles = wanted.iter().map(|request| {
            let store = store.clone();
            let permits = permits.clone();
            let fingerprint = request.artifact.fingerprint.clone();
            let path = request.artifact.local_path.clone();
            let key = request.key.clone();

            tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return UploadOutcome::failed(&fingerprint, StoreKind::A, "upload limiter closed")
                    }
                };
                match store.put(&path, &key, AUDIO_CONTENT_TYPE).await {
                    Ok(()) => UploadOutcome::succeeded(&fingerprint, StoreKind::A),
                    Err(e) => {
                        tracing::warn!(store = %StoreKind::A, key = %key, error = %e, "Upload failed");
                        UploadOutcome::failed(&fingerprint, StoreKind::A, e.to_string())
                    }
                }
            })
        });

        let outcomes = join_all(handles)
            .await
            .into_iter()
            .zip(wanted.iter())
            .map(|(joined, request)| {
                joined.unwrap_or_else(|e| {
                    UploadOutcome::failed(
                        &request.artifact.fingerprint,
                        StoreKind::A,
                        format!("upload task failed: {}", e),
                    )
                })
            })
            .collect();

        // Let in-flight connection teardown finish before the batch lets go of the client
        tokio::time::sleep(self.settings.teardown_grace).await;

        StoreUploadReport {
            store: StoreKind::A,
            configured: true,
            outcomes,
            skipped_unconfigured: 0,
            duration: started.elapsed(),
        }
    }

    async fn upload_store_b(&self, requests: &[UploadRequest]) -> StoreUploadReport {
        let wanted: Vec<&UploadRequest> =
            requests.iter().filter(|r| r.targets(StoreKind::B)).collect();
        if wanted.is_empty() {
            return StoreUploadReport::empty(StoreKind::B, self.store_b.is_some());
        }

        let Some(store) = &self.store_b else {
            return unconfigured_report(StoreKind::B, wanted.len());
        };

        let started = Instant::now();
        let uploads = wanted.iter().map(|request| {
            let store = store.clone();
            let fingerprint = request.artifact.fingerprint.clone();
            let path = request.artifact.local_path.clone();
            let key = request.key.clone();

            async move {
                let log_key = key.clone();
                match self
                    .pool
                    .run(move || store.put(&path, &key, AUDIO_CONTENT_TYPE))
                    .await
                {
                    Ok(Ok(())) => UploadOutcome::succeeded(&fingerprint, StoreKind::B),
                    Ok(Err(e)) => {
                        tracing::warn!(store = %StoreKind::B, key = %log_key, error = %e, "Upload failed");
                        UploadOutcome::failed(&fingerprint, StoreKind::B, e.to_string())
                    }
                    Err(e) => UploadOutcome::failed(&fingerprint, StoreKind::B, e.to_string()),
                }
            }
        });

        let outcomes = join_all(uploads).await;

        StoreUploadReport {
            store: StoreKind::B,
            configured: true,
            outcomes,
            skipped_unconfigured: 0,
            duration: started.elapsed(),
        }
    }
}

fn unconfigured_report(store: StoreKind, wanted: usize) -> StoreUploadReport {
    tracing::warn!(
        store = %store,
        skipped = wanted,
        "Store configuration incomplete, skipping uploads"
    );
    StoreUploadReport {
        store,
        configured: false,
        outcomes: Vec::new(),
        skipped_unconfigured: wanted,
        duration: Duration::ZERO,
    }
}
