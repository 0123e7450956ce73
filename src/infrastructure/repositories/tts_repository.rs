use async_trait::async_trait;
use std::path::Path;

/// Speech synthesis backend.
///
/// Implementations handle provider-specific text limits themselves and write
/// a complete MP3 stream to `output_path`, replacing any existing file.
/// Callers enforce their own timeout by dropping the future.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str, output_path: &Path) -> Result<(), String>;
}
