//! Existence checks against both object stores.
//!
//! Bulk mode lists a class prefix once per store and answers membership from
//! memory; point mode issues one head request per store. A store without
//! credentials is reported as empty, never as an error.

use super::model::{PresenceRecord, StoreKind, StoreStatus};
use crate::domain::identity::ArtifactClass;
use crate::infrastructure::storage::{BlockingObjectStore, ListPage, ObjectStore, StoreError};
use crate::infrastructure::worker_pool::BlockingPool;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Full set of stems found under a prefix in one store
#[derive(Debug, Clone, Default)]
pub struct StoreInventory {
    pub stems: HashSet<String>,
    pub status: Option<StoreStatus>,
}

pub struct ExistenceOracle {
    store_a: Option<Arc<dyn ObjectStore>>,
    store_b: Option<Arc<dyn BlockingObjectStore>>,
    pool: BlockingPool,
}

impl ExistenceOracle {
    pub fn new(
        store_a: Option<Arc<dyn ObjectStore>>,
        store_b: Option<Arc<dyn BlockingObjectStore>>,
        pool: BlockingPool,
    ) -> Self {
        Self {
            store_a,
            store_b,
            pool,
        }
    }

    /// Bulk presence for `stems`, one record per stem in input order
    pub async fn check_bulk(
        &self,
        class: ArtifactClass,
        stems: &[String],
    ) -> (Vec<PresenceRecord>, Vec<StoreStatus>) {
        let (inventory_a, inventory_b) =
            tokio::join!(self.inventory_a(class), self.inventory_b(class));

        let records = stems
            .iter()
            .map(|stem| PresenceRecord {
                fingerprint: stem.clone(),
                exists_in_store_a: inventory_a.stems.contains(stem),
                exists_in_store_b: inventory_b.stems.contains(stem),
            })
            .collect();

        let statuses = [inventory_a, inventory_b]
            .into_iter()
            .filter_map(|inventory| inventory.status)
            .collect();

        (records, statuses)
    }

    /// Point presence for a single stem; both stores are asked concurrently
    pub async fn check_point(&self, class: ArtifactClass, stem: &str) -> PresenceRecord {
        let key = class.object_key(stem);
        let (in_a, in_b) = tokio::join!(self.head_a(&key), self.head_b(&key));

        PresenceRecord {
            fingerprint: stem.to_string(),
            exists_in_store_a: in_a,
            exists_in_store_b: in_b,
        }
    }

    async fn head_a(&self, key: &str) -> bool {
        let Some(store) = &self.store_a else {
            return false;
        };
        match store.head(key).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(store = %StoreKind::A, key = %key, error = %e, "Head check failed, treating as absent");
                false
            }
        }
    }

    async fn head_b(&self, key: &str) -> bool {
        let Some(store) = self.store_b.clone() else {
            return false;
        };
        let owned_key = key.to_string();
        match self.pool.run(move || store.head(&owned_key)).await {
            Ok(Ok(exists)) => exists,
            Ok(Err(e)) => {
                tracing::warn!(store = %StoreKind::B, key = %key, error = %e, "Head check failed, treating as absent");
                false
            }
            Err(e) => {
                tracing::warn!(store = %StoreKind::B, key = %key, error = %e, "Head check did not run");
                false
            }
        }
    }

    pub async fn inventory_a(&self, class: ArtifactClass) -> StoreInventory {
        let Some(store) = &self.store_a else {
            tracing::warn!(store = %StoreKind::A, "Store not configured, assuming it holds nothing");
            return unconfigured(StoreKind::A);
        };

        let started = Instant::now();
        let prefix = class.key_prefix();
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        let error = loop {
            let page = match store.list_page(prefix, token.clone()).await {
                Ok(page) => page,
                Err(e) => break Some(e),
            };
            pages += 1;
            let previous = token.take();
            let (next, done) = advance(StoreKind::A, page, previous, &mut keys);
            if done {
                break None;
            }
            token = next;
        };

        finish_inventory(StoreKind::A, class, keys, error, pages, started)
    }

    pub async fn inventory_b(&self, class: ArtifactClass) -> StoreInventory {
        let Some(store) = self.store_b.clone() else {
            tracing::warn!(store = %StoreKind::B, "Store not configured, assuming it holds nothing");
            return unconfigured(StoreKind::B);
        };

        let started = Instant::now();
        let prefix = class.key_prefix();

        // The whole pagination loop runs on one worker; every call in it blocks
        let listed = self
            .pool
            .run(move || {
                let mut keys = Vec::new();
                let mut marker: Option<String> = None;
                let mut pages = 0usize;
                loop {
                    let page = match store.list_page(prefix, marker.clone()) {
                        Ok(page) => page,
                        Err(e) => return (keys, Some(e), pages),
                    };
                    pages += 1;
                    let previous = marker.take();
                    let (next, done) = advance(StoreKind::B, page, previous, &mut keys);
                    if done {
                        return (keys, None, pages);
                    }
                    marker = next;
                }
            })
            .await;

        match listed {
            Ok((keys, error, pages)) => {
                finish_inventory(StoreKind::B, class, keys, error, pages, started)
            }
            Err(e) => finish_inventory(
                StoreKind::B,
                class,
                Vec::new(),
                Some(StoreError::Transport(e.to_string())),
                0,
                started,
            ),
        }
    }
}

/// Collect a page's keys and decide whether to fetch another.
/// Stops on the last page, on a missing token, and on a token that repeats.
fn advance(
    store: StoreKind,
    page: ListPage,
    previous: Option<String>,
    keys: &mut Vec<String>,
) -> (Option<String>, bool) {
    keys.extend(page.keys);
    if !page.has_more {
        return (None, true);
    }
    match page.next_token {
        Some(next) if previous.as_deref() != Some(next.as_str()) => (Some(next), false),
        Some(_) => {
            tracing::warn!(store = %store, "Listing returned the same token twice, stopping");
            (None, true)
        }
        None => {
            tracing::warn!(store = %store, "Listing reported more pages without a token, stopping");
            (None, true)
        }
    }
}

fn unconfigured(store: StoreKind) -> StoreInventory {
    StoreInventory {
        stems: HashSet::new(),
        status: Some(StoreStatus {
            store,
            configured: false,
            known_objects: 0,
            listing_error: None,
        }),
    }
}

fn finish_inventory(
    store: StoreKind,
    class: ArtifactClass,
    keys: Vec<String>,
    error: Option<StoreError>,
    pages: usize,
    started: Instant,
) -> StoreInventory {
    let stems: HashSet<String> = keys
        .iter()
        .filter_map(|key| class.stem_from_key(key))
        .map(str::to_string)
        .collect();

    // A failed listing counts as an empty store; the error is kept on the status
    let (stems, listing_error) = match error {
        Some(e) => {
            tracing::error!(store = %store, error = %e, pages = pages, "Listing failed, assuming store holds nothing");
            (HashSet::new(), Some(e.to_string()))
        }
        None => (stems, None),
    };

    tracing::info!(
        store = %store,
        prefix = class.key_prefix(),
        pages = pages,
        known_objects = stems.len(),
        latency_ms = started.elapsed().as_millis(),
        "Store inventory collected"
    );

    StoreInventory {
        status: Some(StoreStatus {
            store,
            configured: true,
            known_objects: stems.len(),
            listing_error,
        }),
        stems,
    }
}
