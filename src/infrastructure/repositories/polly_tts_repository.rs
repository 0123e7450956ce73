use super::tts_repository::SpeechSynthesizer;
use async_trait::async_trait;
use aws_sdk_polly::{
    types::{Engine, OutputFormat, VoiceId},
    Client as PollyClient,
};
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// AWS Polly has a limit of 3000 characters per request
const MAX_BATCH_SIZE: usize = 3000;

fn sentence_boundary() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([.!?]+\s+)").expect("sentence pattern is valid"))
}

/// AWS Polly synthesizer writing neural MP3 audio to disk
pub struct PollySynthesizer {
    polly_client: Arc<PollyClient>,
}

impl PollySynthesizer {
    pub fn new(polly_client: Arc<PollyClient>) -> Self {
        Self { polly_client }
    }

    /// Call AWS Polly to synthesize a single text batch
    async fn call_polly(&self, text: &str, voice: &str) -> Result<Vec<u8>, String> {
        let voice_id = VoiceId::from(voice);
        let engine = Engine::Neural;

        tracing::debug!(
            voice = voice,
            engine = ?engine,
            text_length = text.len(),
            "Calling AWS Polly synthesize_speech"
        );

        let result = self
            .polly_client
            .synthesize_speech()
            .text(text)
            .voice_id(voice_id)
            .output_format(OutputFormat::Mp3)
            .engine(engine)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = ?e,
                    error_display = %e,
                    voice = voice,
                    text_length = text.len(),
                    "AWS Polly synthesize_speech failed"
                );
                format!("AWS Polly error: {}", e)
            })?;

        let audio_stream = result.audio_stream.collect().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to collect audio stream from Polly response");
            format!("Failed to read audio stream: {}", e)
        })?;

        Ok(audio_stream.into_bytes().to_vec())
    }
}

/// Split text into batches that respect sentence boundaries.
/// Each batch is at most `MAX_BATCH_SIZE` bytes.
fn split_into_batches(text: &str) -> Vec<String> {
    if text.len() <= MAX_BATCH_SIZE {
        return vec![text.to_string()];
    }

    let mut batches = Vec::new();
    let mut current_batch = String::new();
    let mut last_end = 0;

    for mat in sentence_boundary().find_iter(text) {
        let sentence = &text[last_end..mat.end()];
        if !current_batch.is_empty() && current_batch.len() + sentence.len() > MAX_BATCH_SIZE {
            batches.push(current_batch.trim().to_string());
            current_batch = String::new();
        }
        current_batch.push_str(sentence);
        last_end = mat.end();
    }

    if last_end < text.len() {
        let remaining = &text[last_end..];

        if !current_batch.is_empty() && current_batch.len() + remaining.len() > MAX_BATCH_SIZE {
            batches.push(current_batch.trim().to_string());
            current_batch = String::new();
        }

        // No boundary to split on; fall back to fixed-size chunks
        if remaining.len() > MAX_BATCH_SIZE {
            let chars: Vec<char> = remaining.chars().collect();
            for chunk in chars.chunks(MAX_BATCH_SIZE) {
                batches.push(chunk.iter().collect());
            }
        } else {
            current_batch.push_str(remaining);
        }
    }

    if !current_batch.is_empty() {
        batches.push(current_batch.trim().to_string());
    }

    batches
}

#[async_trait]
impl SpeechSynthesizer for PollySynthesizer {
    async fn synthesize(&self, text: &str, voice: &str, output_path: &Path) -> Result<(), String> {
        let start_time = std::time::Instant::now();
        let batches = split_into_batches(text);

        let mut audio = Vec::new();
        for batch in &batches {
            audio.extend(self.call_polly(batch, voice).await?);
        }

        tokio::fs::write(output_path, &audio)
            .await
            .map_err(|e| format!("Failed to write {}: {}", output_path.display(), e))?;

        tracing::info!(
            provider = "polly",
            latency_ms = start_time.elapsed().as_millis(),
            characters_count = text.len(),
            batch_count = batches.len(),
            audio_size_bytes = audio.len(),
            path = %output_path.display(),
            "TTS synthesis completed"
        );

        Ok(())
    }
}
