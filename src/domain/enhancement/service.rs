use crate::domain::episode::EpisodeServiceApi;
use crate::domain::identity::enhancement_fingerprint;
use crate::infrastructure::repositories::TextGenerator;
use crate::infrastructure::worker_pool::BlockingPool;
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::{Arc, OnceLock};

/// Characters of the source paragraph kept in episode metadata
const ORIGINAL_TEXT_PREVIEW: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedSentence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<i64>,
    /// 1-based position in the paragraph
    pub episode_sequence: usize,
    pub text: String,
    pub translation: String,
    pub phonetic: String,
    pub highlights: Vec<String>,
    /// 16-hex enhancement fingerprint, distinct from the audio key
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-sentence enrichment fanned out over a bounded blocking pool
pub struct EnhancementService {
    generator: Arc<dyn TextGenerator>,
    pool: BlockingPool,
    episodes: Option<Arc<dyn EpisodeServiceApi>>,
}

impl EnhancementService {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        pool: BlockingPool,
        episodes: Option<Arc<dyn EpisodeServiceApi>>,
    ) -> Self {
        Self {
            generator,
            pool,
            episodes,
        }
    }

    /// Enrich each sentence; results keep input order.
    /// A failing sentence comes back with empty fields and its error.
    pub async fn enhance(&self, sentences: Vec<String>, episode_id: Option<i64>) -> Vec<EnhancedSentence> {
        let tasks = sentences.into_iter().enumerate().map(|(idx, text)| {
            let generator = self.generator.clone();
            async move {
                let fallback_text = text.clone();
                match self
                    .pool
                    .run(move || enhance_one(generator.as_ref(), idx, text, episode_id))
                    .await
                {
                    Ok(sentence) => sentence,
                    Err(e) => failed(idx, fallback_text, episode_id, e.to_string()),
                }
            }
        });

        join_all(tasks).await
    }

    /// Split a paragraph, enrich every sentence and, with an episode id, save
    /// the result as that episode's document. A failed save is logged only.
    pub async fn enhance_paragraph(&self, paragraph: &str, episode_id: Option<i64>) -> Vec<EnhancedSentence> {
        let sentences = split_into_sentences(paragraph);
        tracing::info!(sentence_count = sentences.len(), "Split paragraph into sentences");
        if sentences.is_empty() {
            return Vec::new();
        }

        let enhanced = self.enhance(sentences, episode_id).await;

        if let (Some(episode_id), Some(episodes)) = (episode_id, &self.episodes) {
            let documents: Vec<Value> = enhanced
                .iter()
                .filter_map(|s| serde_json::to_value(s).ok())
                .collect();
            let mut metadata = Map::new();
            metadata.insert("source".to_string(), json!("paragraph_generation"));
            metadata.insert("original_text".to_string(), json!(preview(paragraph)));

            match episodes.save_episode(episode_id, documents, metadata).await {
                Ok(receipt) => tracing::info!(
                    episode_id = episode_id,
                    version = receipt.version,
                    "Saved enhanced sentences to episode"
                ),
                Err(e) => tracing::error!(episode_id = episode_id, error = %e, "Failed to save episode"),
            }
        }

        enhanced
    }
}

fn enhance_one(
    generator: &dyn TextGenerator,
    idx: usize,
    text: String,
    episode_id: Option<i64>,
) -> EnhancedSentence {
    let result = generator.translate(&text).and_then(|translation| {
        let phonetic = generator.phonetic(&text)?;
        let highlights = generator.highlight(&text, &translation)?;
        Ok((translation, phonetic, highlights))
    });

    match result {
        Ok((translation, phonetic, highlights)) => EnhancedSentence {
            episode_id,
            episode_sequence: idx + 1,
            fingerprint: enhancement_fingerprint(&text),
            text,
            translation,
            phonetic,
            highlights,
            error: None,
        },
        Err(e) => {
            tracing::error!(sentence = idx + 1, error = %e, "Failed to enhance sentence");
            failed(idx, text, episode_id, e)
        }
    }
}

fn failed(idx: usize, text: String, episode_id: Option<i64>, error: String) -> EnhancedSentence {
    EnhancedSentence {
        episode_id,
        episode_sequence: idx + 1,
        fingerprint: enhancement_fingerprint(&text),
        text,
        translation: String::new(),
        phonetic: String::new(),
        highlights: Vec::new(),
        error: Some(error),
    }
}

fn sentence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^.!?…]+[.!?…]*").expect("sentence pattern is valid"))
}

/// Split on terminal punctuation, keeping it with its sentence
pub fn split_into_sentences(paragraph: &str) -> Vec<String> {
    sentence_pattern()
        .find_iter(paragraph)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .collect()
}

fn preview(text: &str) -> String {
    if text.chars().count() > ORIGINAL_TEXT_PREVIEW {
        let head: String = text.chars().take(ORIGINAL_TEXT_PREVIEW).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
