pub mod error;
pub mod model;
pub mod oracle;
pub mod replication;
pub mod report;
pub mod service;
pub mod staging;
pub mod synthesis;

pub use error::AudioSyncError;
pub use model::{
    BatchRecord, ItemResult, PresenceRecord, StagedArtifact, StoreKind, StoreStatus,
    SynthesisOutcome, UploadOutcome,
};
pub use oracle::ExistenceOracle;
pub use replication::{ReplicationEngine, ReplicationReport, StoreUploadReport, UploadRequest};
pub use report::{BatchReport, BatchStatistics, PresenceReport, UploadStats};
pub use service::{AudioSyncApi, AudioSyncDeps, AudioSyncService, PhraseSyncResult};
pub use staging::StagingCache;
pub use synthesis::{SynthesisJob, SynthesisPool};
