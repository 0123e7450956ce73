use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Persisted sentence collection for one episode.
///
/// `version` increases by one on every successful write and `created_at`
/// never changes after the first save. Older documents may carry naive
/// timestamps (taken as UTC) and no `version` at all (taken as 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeDocument {
    pub episode_id: i64,
    pub sentences: Vec<Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

/// RFC3339, or an ISO-8601 timestamp without offset read as UTC
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

impl EpisodeDocument {
    pub fn new(episode_id: i64, sentences: Vec<Value>, metadata: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            episode_id,
            sentences,
            metadata,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Next revision of this document with new content
    pub fn replaced_by(&self, sentences: Vec<Value>, metadata: Map<String, Value>) -> Self {
        Self {
            episode_id: self.episode_id,
            sentences,
            metadata,
            created_at: self.created_at,
            updated_at: Utc::now(),
            version: self.version + 1,
        }
    }
}

/// File name stem of an episode document, e.g. `EP7`
pub fn episode_key(episode_id: i64) -> String {
    format!("EP{}", episode_id)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveReceipt {
    pub episode_id: i64,
    pub file_path: PathBuf,
    pub sentence_count: usize,
    pub version: u64,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceUpdateReceipt {
    pub episode_id: i64,
    pub sentence_index: usize,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteReceipt {
    pub episode_id: i64,
    pub deleted_at: DateTime<Utc>,
}

/// One entry of a directory listing.
///
/// A document that cannot be parsed is still listed, with the parse error,
/// so one bad file never hides the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EpisodeListing {
    Summary {
        episode_id: i64,
        file_name: String,
        sentence_count: usize,
        version: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        file_size_bytes: u64,
    },
    Unreadable {
        episode_id: i64,
        file_name: String,
        error: String,
        file_size_bytes: u64,
    },
}

impl EpisodeListing {
    pub fn episode_id(&self) -> i64 {
        match self {
            Self::Summary { episode_id, .. } | Self::Unreadable { episode_id, .. } => *episode_id,
        }
    }
}
