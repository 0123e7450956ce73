use super::model::{StagedArtifact, SynthesisOutcome};
use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::repositories::SpeechSynthesizer;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One artifact to render
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    pub fingerprint: String,
    /// Normalized text handed to the backend
    pub text: String,
    pub voice: String,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    pub concurrency: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl From<&PipelineConfig> for SynthesisSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            concurrency: config.max_concurrent_audio.max(1),
            timeout: config.audio_timeout(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        }
    }
}

/// Bounded-concurrency synthesis with a per-attempt timeout and fixed-delay retries
pub struct SynthesisPool {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    settings: SynthesisSettings,
}

impl SynthesisPool {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, settings: SynthesisSettings) -> Self {
        Self {
            synthesizer,
            settings,
        }
    }

    /// Render every job; outcomes come back in completion order.
    /// A failing job never cancels its siblings.
    pub async fn run(&self, jobs: Vec<SynthesisJob>) -> Vec<SynthesisOutcome> {
        if jobs.is_empty() {
            return Vec::new();
        }

        tracing::info!(
            jobs = jobs.len(),
            concurrency = self.settings.concurrency,
            "Starting audio generation"
        );

        stream::iter(jobs)
            .map(|job| self.synthesize_one(job))
            .buffer_unordered(self.settings.concurrency)
            .collect()
            .await
    }

    pub async fn synthesize_one(&self, job: SynthesisJob) -> SynthesisOutcome {
        let max_attempts = self.settings.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let started = Instant::now();
            // A timed-out attempt may still be writing; it only ever touches its own part file
            let part_path = part_path_for(&job.output_path);
            let result = tokio::time::timeout(
                self.settings.timeout,
                self.synthesizer.synthesize(&job.text, &job.voice, &part_path),
            )
            .await;

            let published = match result {
                Ok(Ok(())) => match non_empty_size(&part_path).await {
                    Some(size_bytes) => tokio::fs::rename(&part_path, &job.output_path)
                        .await
                        .map(|_| size_bytes)
                        .map_err(|e| format!("Failed to stage audio file: {}", e)),
                    None => Err("Synthesis produced an empty audio file".to_string()),
                },
                Ok(Err(e)) => Err(e),
                Err(_) => Err(format!(
                    "Synthesis timed out after {}s",
                    self.settings.timeout.as_secs_f64()
                )),
            };

            match published {
                Ok(size_bytes) => {
                    tracing::info!(
                        fingerprint = %job.fingerprint,
                        attempt = attempt,
                        size_bytes = size_bytes,
                        latency_ms = started.elapsed().as_millis(),
                        "Audio generated"
                    );
                    return SynthesisOutcome {
                        fingerprint: job.fingerprint.clone(),
                        artifact: Some(StagedArtifact {
                            fingerprint: job.fingerprint,
                            local_path: job.output_path,
                            size_bytes,
                        }),
                        attempts: attempt,
                        error: None,
                    };
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&part_path).await;
                    last_error = e;
                }
            }

            tracing::warn!(
                fingerprint = %job.fingerprint,
                attempt = attempt,
                max_attempts = max_attempts,
                error = %last_error,
                "Audio generation attempt failed"
            );

            if attempt < max_attempts {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }

        // Leave nothing behind that a later run could mistake for a staged file
        let _ = tokio::fs::remove_file(&job.output_path).await;

        tracing::error!(
            fingerprint = %job.fingerprint,
            attempts = max_attempts,
            error = %last_error,
            "Audio generation failed"
        );

        SynthesisOutcome {
            fingerprint: job.fingerprint,
            artifact: None,
            attempts: max_attempts,
            error: Some(last_error),
        }
    }
}

/// `sentences/ab12.mp3` -> `sentences/.ab12.mp3.<uuid>.part`
fn part_path_for(output_path: &Path) -> PathBuf {
    let file_name = output_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    output_path.with_file_name(format!(".{}.{}.part", file_name, Uuid::new_v4()))
}

async fn non_empty_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Some(meta.len()),
        _ => None,
    }
}
