use super::model::{ItemResult, PresenceRecord, StoreKind, StoreStatus};
use super::replication::StoreUploadReport;
use crate::domain::episode::episode_key;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// `numerator / denominator`, 0.0 for an empty denominator
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadStats {
    pub store: StoreKind,
    pub configured: bool,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped_unconfigured: usize,
    pub success_rate: f64,
}

impl UploadStats {
    pub fn from_report(report: &StoreUploadReport) -> Self {
        let total = report.outcomes.len();
        let successful = report.outcomes.iter().filter(|o| o.success).count();
        Self {
            store: report.store,
            configured: report.configured,
            total,
            successful,
            failed: total - successful,
            skipped_unconfigured: report.skipped_unconfigured,
            success_rate: ratio(successful as f64, total as f64),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    pub generation_seconds: f64,
    pub upload_seconds: f64,
    pub total_seconds: f64,
    /// Generated items per second of generation time
    pub generation_throughput: f64,
    /// Upload attempts per second of upload time
    pub upload_throughput: f64,
}

impl TimingStats {
    pub fn new(
        generation: Duration,
        generated: usize,
        upload: Duration,
        uploads: usize,
        total: Duration,
    ) -> Self {
        Self {
            generation_seconds: generation.as_secs_f64(),
            upload_seconds: upload.as_secs_f64(),
            total_seconds: total.as_secs_f64(),
            generation_throughput: ratio(generated as f64, generation.as_secs_f64()),
            upload_throughput: ratio(uploads as f64, upload.as_secs_f64()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingBreakdown {
    pub fully_present: usize,
    pub missing_store_a_only: usize,
    pub missing_store_b_only: usize,
    pub missing_both: usize,
}

impl MissingBreakdown {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a PresenceRecord>) -> Self {
        let mut breakdown = Self::default();
        for record in records {
            match (record.exists_in_store_a, record.exists_in_store_b) {
                (true, true) => breakdown.fully_present += 1,
                (false, true) => breakdown.missing_store_a_only += 1,
                (true, false) => breakdown.missing_store_b_only += 1,
                (false, false) => breakdown.missing_both += 1,
            }
        }
        breakdown
    }

    pub fn missing_store_a(&self) -> usize {
        self.missing_store_a_only + self.missing_both
    }

    pub fn missing_store_b(&self) -> usize {
        self.missing_store_b_only + self.missing_both
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    /// Input rows, including duplicates and empty text
    pub total_items: usize,
    pub unique_items: usize,
    pub skipped_empty: usize,
    pub already_present: usize,
    pub missing: MissingBreakdown,
    pub newly_generated: usize,
    pub already_staged: usize,
    pub generation_failed: usize,
    pub store_a: UploadStats,
    pub store_b: UploadStats,
    pub timing: TimingStats,
}

impl BatchStatistics {
    pub fn uploads(&self, store: StoreKind) -> &UploadStats {
        match store {
            StoreKind::A => &self.store_a,
            StoreKind::B => &self.store_b,
        }
    }
}

/// Externally visible result of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub items: Vec<ItemResult>,
    pub statistics: BatchStatistics,
    pub store_status: Vec<StoreStatus>,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &ItemResult> {
        self.items.iter().filter(|item| item.is_failure())
    }

    pub fn item(&self, fingerprint: &str) -> Option<&ItemResult> {
        self.items.iter().find(|item| item.fingerprint == fingerprint)
    }
}

/// Presence of one input sentence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentencePresence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_sequence: Option<i64>,
    pub text: String,
    pub fingerprint: String,
    pub exists_in_store_a: bool,
    pub exists_in_store_b: bool,
}

impl SentencePresence {
    fn as_record(&self) -> PresenceRecord {
        PresenceRecord {
            fingerprint: self.fingerprint.clone(),
            exists_in_store_a: self.exists_in_store_a,
            exists_in_store_b: self.exists_in_store_b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodePresence {
    /// `EP{id}`, or `unassigned` for rows without an episode
    pub episode_key: String,
    pub total: usize,
    pub fully_present: usize,
    pub missing: usize,
    pub in_store_a: usize,
    pub in_store_b: usize,
    pub sentences: Vec<SentencePresence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceReport {
    pub episodes: Vec<EpisodePresence>,
    pub missing: MissingBreakdown,
    pub store_status: Vec<StoreStatus>,
}

pub const UNASSIGNED_EPISODE: &str = "unassigned";

impl PresenceReport {
    /// Group rows by episode id; episodes ascend, rows follow `episode_sequence`
    pub fn group_by_episode(rows: Vec<SentencePresence>, store_status: Vec<StoreStatus>) -> Self {
        let missing = MissingBreakdown::from_records(&rows.iter().map(SentencePresence::as_record).collect::<Vec<_>>());

        let mut grouped: BTreeMap<Option<i64>, Vec<SentencePresence>> = BTreeMap::new();
        for row in rows {
            grouped.entry(row.episode_id).or_default().push(row);
        }

        let mut episodes: Vec<EpisodePresence> = grouped
            .into_iter()
            .map(|(episode_id, mut sentences)| {
                sentences.sort_by_key(|s| s.episode_sequence.unwrap_or(i64::MAX));
                let fully_present = sentences
                    .iter()
                    .filter(|s| s.exists_in_store_a && s.exists_in_store_b)
                    .count();
                EpisodePresence {
                    episode_key: episode_id
                        .map(episode_key)
                        .unwrap_or_else(|| UNASSIGNED_EPISODE.to_string()),
                    total: sentences.len(),
                    fully_present,
                    missing: sentences.len() - fully_present,
                    in_store_a: sentences.iter().filter(|s| s.exists_in_store_a).count(),
                    in_store_b: sentences.iter().filter(|s| s.exists_in_store_b).count(),
                    sentences,
                }
            })
            .collect();

        // BTreeMap puts None first; rows without an episode go last
        if episodes
            .first()
            .is_some_and(|e| e.episode_key == UNASSIGNED_EPISODE)
        {
            episodes.rotate_left(1);
        }

        Self {
            episodes,
            missing,
            store_status,
        }
    }

    pub fn episode(&self, episode_key: &str) -> Option<&EpisodePresence> {
        self.episodes.iter().find(|e| e.episode_key == episode_key)
    }
}
