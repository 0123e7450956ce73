use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One of the two replication targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StoreKind {
    /// Cloudflare R2, async client
    #[serde(rename = "store_a")]
    A,
    /// Tencent COS, blocking client
    #[serde(rename = "store_b")]
    B,
}

impl StoreKind {
    pub const ALL: [StoreKind; 2] = [StoreKind::A, StoreKind::B];

    pub fn label(&self) -> &'static str {
        match self {
            StoreKind::A => "store_a",
            StoreKind::B => "store_b",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One input row of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    #[serde(alias = "en")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_sequence: Option<i64>,
}

impl BatchRecord {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            episode_id: None,
            episode_sequence: None,
        }
    }

    pub fn in_episode(mut self, episode_id: i64, episode_sequence: i64) -> Self {
        self.episode_id = Some(episode_id);
        self.episode_sequence = Some(episode_sequence);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub fingerprint: String,
    pub exists_in_store_a: bool,
    pub exists_in_store_b: bool,
}

impl PresenceRecord {
    pub fn absent(fingerprint: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            exists_in_store_a: false,
            exists_in_store_b: false,
        }
    }

    pub fn fully_present(&self) -> bool {
        self.exists_in_store_a && self.exists_in_store_b
    }

    pub fn exists_in(&self, store: StoreKind) -> bool {
        match store {
            StoreKind::A => self.exists_in_store_a,
            StoreKind::B => self.exists_in_store_b,
        }
    }

    /// Stores an upload must target
    pub fn missing_from(&self) -> Vec<StoreKind> {
        StoreKind::ALL
            .into_iter()
            .filter(|store| !self.exists_in(*store))
            .collect()
    }
}

/// A non-empty audio file in the staging directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedArtifact {
    pub fingerprint: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub fingerprint: String,
    pub store: StoreKind,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn succeeded(fingerprint: &str, store: StoreKind) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            store,
            success: true,
            error: None,
        }
    }

    pub fn failed(fingerprint: &str, store: StoreKind, error: impl Into<String>) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            store,
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOutcome {
    pub fingerprint: String,
    pub artifact: Option<StagedArtifact>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SynthesisOutcome {
    pub fn generated(&self) -> bool {
        self.artifact.is_some()
    }
}

/// Per-item line of a batch report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub fingerprint: String,
    pub text: String,
    /// Text actually sent to synthesis
    pub spoken_text: String,
    pub generated: bool,
    pub existed_locally: bool,
    pub existed_in_store_a: bool,
    pub existed_in_store_b: bool,
    pub uploaded_store_a: bool,
    pub uploaded_store_b: bool,
    /// Stores that needed the artifact but have no usable credentials
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unconfigured_stores: Vec<StoreKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_a_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_b_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_sequence: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemResult {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// What the existence check learned about one store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub store: StoreKind,
    pub configured: bool,
    pub known_objects: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_error: Option<String>,
}
