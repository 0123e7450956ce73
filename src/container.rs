use crate::domain::audio::{AudioSyncDeps, AudioSyncService};
use crate::domain::enhancement::EnhancementService;
use crate::domain::episode::{EpisodeService, EpisodeServiceApi};
use crate::infrastructure::config::Config;
use crate::infrastructure::repositories::{
    EpisodeRepository, PollySynthesizer, SpeechSynthesizer, TextGenerator,
};
use crate::infrastructure::storage::{BlockingObjectStore, CosStore, ObjectStore, R2Store};
use crate::infrastructure::worker_pool::BlockingPool;
use std::sync::Arc;

/// Every long-lived service, built once at startup and passed by reference
pub struct AppContainer {
    pub config: Arc<Config>,
    pub audio_sync: Arc<AudioSyncService>,
    pub episodes: Arc<EpisodeService>,
    enhancement_pool: BlockingPool,
}

impl AppContainer {
    /// Wire the production collaborators: Polly, R2 and COS
    pub async fn build(config: Config) -> Self {
        tracing::info!("Initializing AWS Polly client with region: {}", config.aws_region);
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.aws_region.clone()))
            .load()
            .await;
        let polly_client = Arc::new(aws_sdk_polly::Client::new(&aws_config));
        let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(PollySynthesizer::new(polly_client));

        let store_a: Option<Arc<dyn ObjectStore>> = match config.r2.require() {
            Ok(()) => Some(Arc::new(R2Store::new(&config.r2))),
            Err(e) => {
                tracing::warn!(error = %e, "Store A uploads will be skipped");
                None
            }
        };

        let store_b: Option<Arc<dyn BlockingObjectStore>> = match config.cos.require() {
            Ok(()) => {
                tracing::info!(bucket = %config.cos.bucket, region = %config.cos.region, "COS client configured");
                Some(Arc::new(CosStore::new(&config.cos)))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Store B uploads will be skipped");
                None
            }
        };

        Self::from_parts(config, synthesizer, store_a, store_b)
    }

    /// Wire the container from explicit collaborators
    pub fn from_parts(
        config: Config,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        store_a: Option<Arc<dyn ObjectStore>>,
        store_b: Option<Arc<dyn BlockingObjectStore>>,
    ) -> Self {
        let audio_sync = Arc::new(AudioSyncService::new(AudioSyncDeps {
            synthesizer,
            store_a,
            store_b,
            r2: config.r2.clone(),
            cos: config.cos.clone(),
            pipeline: config.pipeline.clone(),
            staging: config.staging.clone(),
        }));

        let episode_repo = Arc::new(EpisodeRepository::new(&config.episodes));
        let enhancement_pool = BlockingPool::new(config.pipeline.max_workers_enhancement);
        tracing::info!(
            episode_dir = %episode_repo.storage_dir().display(),
            enhancement_workers = enhancement_pool.size(),
            "Services wired"
        );
        let episodes = Arc::new(EpisodeService::new(episode_repo));

        Self {
            enhancement_pool,
            config: Arc::new(config),
            audio_sync,
            episodes,
        }
    }

    /// Enhancement over the shared pool, saving into this container's episode store
    pub fn enhancement_service(&self, generator: Arc<dyn TextGenerator>) -> EnhancementService {
        let episodes: Arc<dyn EpisodeServiceApi> = self.episodes.clone();
        EnhancementService::new(generator, self.enhancement_pool.clone(), Some(episodes))
    }
}
