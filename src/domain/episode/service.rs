use super::error::EpisodeServiceError;
use super::model::{
    DeleteReceipt, EpisodeDocument, EpisodeListing, SaveReceipt, SentenceUpdateReceipt,
};
use crate::error::AppResult;
use crate::infrastructure::repositories::EpisodeRepository;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct EpisodeService {
    repo: Arc<EpisodeRepository>,
}

impl EpisodeService {
    pub fn new(repo: Arc<EpisodeRepository>) -> Self {
        Self { repo }
    }

    /// Run a repository call on the blocking pool; lock polling sleeps the thread
    async fn blocking<T, F>(&self, f: F) -> Result<T, EpisodeServiceError>
    where
        F: FnOnce(&EpisodeRepository) -> AppResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || f(&repo))
            .await
            .map_err(|e| EpisodeServiceError::Dependency(format!("episode task failed: {}", e)))?
            .map_err(|e| {
                if e.is_retryable() {
                    tracing::debug!(error = %e, "Episode call failed; caller may retry");
                }
                EpisodeServiceError::from(e)
            })
    }
}

#[async_trait]
pub trait EpisodeServiceApi: Send + Sync {
    /// Create the document or replace it wholesale, bumping its version
    async fn save_episode(
        &self,
        episode_id: i64,
        sentences: Vec<Value>,
        metadata: Map<String, Value>,
    ) -> Result<SaveReceipt, EpisodeServiceError>;

    async fn update_episode(
        &self,
        episode_id: i64,
        sentences: Vec<Value>,
        metadata: Map<String, Value>,
    ) -> Result<SaveReceipt, EpisodeServiceError>;

    async fn read_episode(&self, episode_id: i64) -> Result<EpisodeDocument, EpisodeServiceError>;

    async fn update_sentence(
        &self,
        episode_id: i64,
        sentence_index: usize,
        sentence: Value,
    ) -> Result<SentenceUpdateReceipt, EpisodeServiceError>;

    async fn delete_episode(&self, episode_id: i64) -> Result<DeleteReceipt, EpisodeServiceError>;

    async fn list_episodes(&self) -> Result<Vec<EpisodeListing>, EpisodeServiceError>;

    async fn episode_exists(&self, episode_id: i64) -> Result<bool, EpisodeServiceError>;
}

#[async_trait]
impl EpisodeServiceApi for EpisodeService {
    async fn save_episode(
        &self,
        episode_id: i64,
        sentences: Vec<Value>,
        metadata: Map<String, Value>,
    ) -> Result<SaveReceipt, EpisodeServiceError> {
        self.blocking(move |repo| repo.save(episode_id, sentences, metadata))
            .await
    }

    async fn update_episode(
        &self,
        episode_id: i64,
        sentences: Vec<Value>,
        metadata: Map<String, Value>,
    ) -> Result<SaveReceipt, EpisodeServiceError> {
        self.blocking(move |repo| repo.update_episode(episode_id, sentences, metadata))
            .await
    }

    async fn read_episode(&self, episode_id: i64) -> Result<EpisodeDocument, EpisodeServiceError> {
        self.blocking(move |repo| repo.read(episode_id)).await
    }

    async fn update_sentence(
        &self,
        episode_id: i64,
        sentence_index: usize,
        sentence: Value,
    ) -> Result<SentenceUpdateReceipt, EpisodeServiceError> {
        self.blocking(move |repo| repo.update_sentence(episode_id, sentence_index, sentence))
            .await
    }

    async fn delete_episode(&self, episode_id: i64) -> Result<DeleteReceipt, EpisodeServiceError> {
        self.blocking(move |repo| repo.delete(episode_id)).await
    }

    async fn list_episodes(&self) -> Result<Vec<EpisodeListing>, EpisodeServiceError> {
        self.blocking(|repo| repo.list()).await
    }

    async fn episode_exists(&self, episode_id: i64) -> Result<bool, EpisodeServiceError> {
        self.blocking(move |repo| Ok(repo.exists(episode_id))).await
    }
}
