pub mod phrase;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

pub use phrase::{clean_phrase_filename, format_phrase_for_tts, phrase_fingerprint};

/// Length of the audio fingerprint in hex characters
pub const AUDIO_FINGERPRINT_LEN: usize = 8;

/// Length of the enhancement fingerprint in hex characters
pub const ENHANCEMENT_FINGERPRINT_LEN: usize = 16;

pub const AUDIO_EXTENSION: &str = "mp3";
pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Audio fingerprint for a sentence: first 8 hex chars of md5(trim(text)).
///
/// This is the join key across the staging directory, both object stores and
/// the episode documents. Check and upload steps must call this same function.
pub fn fingerprint(text: &str) -> String {
    truncated_md5(text.trim(), AUDIO_FINGERPRINT_LEN)
}

/// Fingerprint used by sentence enhancement.
///
/// Kept separate from [`fingerprint`]: the two lengths form distinct identity
/// spaces and a 16-char value is never looked up in the audio stores.
pub fn enhancement_fingerprint(text: &str) -> String {
    truncated_md5(text.trim(), ENHANCEMENT_FINGERPRINT_LEN)
}

pub(crate) fn truncated_md5(input: &str, len: usize) -> String {
    let mut hasher = Md5::new();
    hasher.update(input.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(len);
    digest
}

/// Kind of audio artifact; each class lives under its own key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactClass {
    Sentence,
    Phrase,
}

impl ArtifactClass {
    pub fn key_prefix(&self) -> &'static str {
        match self {
            ArtifactClass::Sentence => "audio/sentences/",
            ArtifactClass::Phrase => "audio/expressionss/",
        }
    }

    /// Object key for an artifact stem (fingerprint or clean phrase filename)
    pub fn object_key(&self, stem: &str) -> String {
        format!("{}{}.{}", self.key_prefix(), stem, AUDIO_EXTENSION)
    }

    /// Inverse of [`ArtifactClass::object_key`]; `None` for keys outside this class
    pub fn stem_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        let stem = key
            .strip_prefix(self.key_prefix())?
            .strip_suffix(AUDIO_EXTENSION)?
            .strip_suffix('.')?;
        if stem.is_empty() || stem.contains('/') {
            None
        } else {
            Some(stem)
        }
    }
}
