pub mod cos_store;
pub mod r2_store;
pub mod sigv4;

use async_trait::async_trait;
use std::path::Path;

pub use cos_store::CosStore;
pub use r2_store::R2Store;

/// One page of a prefix listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Token (or marker) to pass back for the following page
    pub next_token: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("request rejected by store ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("local file error: {0}")]
    LocalFile(String),
}

/// Object store with a native async client (store A).
///
/// `head` answers `Ok(false)` for a missing object and keeps `Err` for
/// transport or authorization failures.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &str;

    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StoreError>;

    async fn head(&self, key: &str) -> Result<bool, StoreError>;

    async fn put(&self, local_path: &Path, key: &str, content_type: &str) -> Result<(), StoreError>;
}

/// Object store whose client blocks the calling thread (store B).
///
/// Callers must run these methods on a worker pool, never on the async
/// coordinator.
pub trait BlockingObjectStore: Send + Sync {
    fn name(&self) -> &str;

    fn list_page(&self, prefix: &str, marker: Option<String>) -> Result<ListPage, StoreError>;

    fn head(&self, key: &str) -> Result<bool, StoreError>;

    fn put(&self, local_path: &Path, key: &str, content_type: &str) -> Result<(), StoreError>;
}
