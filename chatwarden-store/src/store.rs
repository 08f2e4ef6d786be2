// chatwarden-store/src/store.rs
//! `RecordStore`: a write-back cache over a [`KeyedBlobStore`].
//!
//! Each named collection is hydrated from the durable medium exactly once per
//! process and then served from memory. Mutations replace the cached value
//! synchronously and schedule a debounced flush; a burst of updates within
//! the debounce window collapses into a single durable write carrying only
//! the final value. Compound mutations go through [`RecordStore::update_collection`],
//! which applies the caller's transform under the store lock so concurrent
//! read-modify-write sequences can never overwrite each other. A collection whose durable blob fails to decode is
//! poisoned: both reads and writes are refused so surviving history can never
//! be overwritten by an engine that lost it.
//!
//! License: MIT OR Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::blob::{BlobRef, KeyedBlobStore};
use crate::table::{decode_records, encode_records, CodecError, TableRecord};

/// Errors surfaced by the record store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The durable blob for this collection is unparsable. Fatal for the
    /// collection: the store refuses further use rather than silently
    /// treating it as empty.
    #[error("collection '{name}' has an undecodable durable blob and is disabled: {detail}")]
    Poisoned { name: String, detail: String },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("blob store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

struct CollectionState<T> {
    blob: BlobRef,
    records: Vec<T>,
    dirty: bool,
    pending: Option<JoinHandle<()>>,
    poisoned: Option<String>,
}

struct Inner<T: TableRecord> {
    blobs: Arc<dyn KeyedBlobStore>,
    debounce: Duration,
    collections: Mutex<HashMap<String, CollectionState<T>>>,
}

/// Cache-plus-debounced-flush persistence for collections of `T`.
///
/// Cheap to clone; all clones share the same cache and timers.
pub struct RecordStore<T: TableRecord> {
    inner: Arc<Inner<T>>,
}

impl<T: TableRecord> Clone for RecordStore<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: TableRecord> RecordStore<T> {
    pub fn new(blobs: Arc<dyn KeyedBlobStore>, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                blobs,
                debounce,
                collections: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the current (cached) contents of the named collection,
    /// hydrating it from the durable medium on first access. An unknown name
    /// is created empty and persisted rather than treated as an error.
    pub async fn collection(&self, name: &str) -> Result<Vec<T>, StoreError> {
        let mut map = self.inner.collections.lock().await;
        let state = self.hydrated(&mut map, name).await?;
        Ok(state.records.clone())
    }

    /// Replaces the cached value and (re)schedules a debounced flush.
    ///
    /// Subsequent reads see the new value synchronously. A newly scheduled
    /// flush cancels any prior pending timer for this name, so only the final
    /// value of a burst reaches the durable medium.
    pub async fn set_collection(&self, name: &str, records: Vec<T>) -> Result<(), StoreError> {
        self.update_collection(name, |current| {
            *current = records;
            ((), true)
        })
        .await
    }

    /// Atomically transforms the cached contents of the named collection.
    ///
    /// The transform runs while the store lock is held, so no other reader or
    /// writer can observe (or clobber) an intermediate state: a whole
    /// read-modify-write sequence expressed as one transform is atomic with
    /// respect to every other call on any clone of this store. The transform
    /// returns its own output plus whether it changed the records; a change
    /// (re)schedules a debounced flush exactly like [`set_collection`](Self::set_collection).
    pub async fn update_collection<R>(
        &self,
        name: &str,
        mutate: impl FnOnce(&mut Vec<T>) -> (R, bool),
    ) -> Result<R, StoreError> {
        let mut map = self.inner.collections.lock().await;
        let state = self.hydrated(&mut map, name).await?;
        let (out, changed) = mutate(&mut state.records);
        if changed {
            state.dirty = true;
            if let Some(prior) = state.pending.take() {
                prior.abort();
                debug!(target: "chatwarden_store", "coalesced pending flush for '{name}'");
            }
            state.pending = Some(self.spawn_flush_timer(name));
        }
        Ok(out)
    }

    /// Serializes the cached value and performs one atomic replace of the
    /// durable blob. No-op when the cache is clean. On a transient backend
    /// failure the cache stays authoritative and another debounced attempt is
    /// scheduled.
    pub async fn flush(&self, name: &str) -> Result<(), StoreError> {
        self.flush_inner(name).await
    }

    /// Graceful-shutdown path: synchronously executes every pending flush.
    pub async fn flush_all(&self) -> Result<(), StoreError> {
        let mut map = self.inner.collections.lock().await;
        let mut first_err = None;
        for (name, state) in map.iter_mut() {
            if let Some(pending) = state.pending.take() {
                pending.abort();
            }
            if !state.dirty {
                continue;
            }
            let encoded = encode_records(&state.records);
            match self.inner.blobs.replace_blob(&state.blob, &encoded).await {
                Ok(()) => state.dirty = false,
                Err(e) => {
                    error!(target: "chatwarden_store", "shutdown flush of '{name}' failed: {e:#}");
                    first_err.get_or_insert(StoreError::Backend(e));
                }
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Whether a flush timer is currently armed for the named collection.
    pub async fn has_pending_flush(&self, name: &str) -> bool {
        let map = self.inner.collections.lock().await;
        map.get(name).is_some_and(|s| s.pending.is_some())
    }

    fn spawn_flush_timer(&self, name: &str) -> JoinHandle<()> {
        let store = self.clone();
        let name = name.to_string();
        let debounce = self.inner.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(e) = store.flush_inner(&name).await {
                warn!(target: "chatwarden_store", "debounced flush of '{name}' failed: {e}");
            }
        })
    }

    async fn flush_inner(&self, name: &str) -> Result<(), StoreError> {
        // The collections lock is held across the write, so at most one flush
        // is ever in flight and a timer can only be aborted while it is still
        // sleeping or queued on this lock, never mid-write.
        let mut map = self.inner.collections.lock().await;
        let Some(state) = map.get_mut(name) else {
            return Ok(());
        };
        if let Some(detail) = &state.poisoned {
            return Err(StoreError::Poisoned { name: name.to_string(), detail: detail.clone() });
        }
        state.pending = None;
        if !state.dirty {
            return Ok(());
        }

        let encoded = encode_records(&state.records);
        match self.inner.blobs.replace_blob(&state.blob, &encoded).await {
            Ok(()) => {
                state.dirty = false;
                debug!(
                    target: "chatwarden_store",
                    "flushed collection '{name}' ({} records)",
                    state.records.len()
                );
                Ok(())
            }
            Err(e) => {
                // Cache stays authoritative; retry after another debounce.
                state.pending = Some(self.spawn_flush_timer(name));
                Err(StoreError::Backend(e))
            }
        }
    }

    async fn hydrated<'a>(
        &self,
        map: &'a mut HashMap<String, CollectionState<T>>,
        name: &str,
    ) -> Result<&'a mut CollectionState<T>, StoreError> {
        if !map.contains_key(name) {
            let state = self.hydrate(name).await?;
            map.insert(name.to_string(), state);
        }
        let state = map.get_mut(name).expect("hydrated above");
        if let Some(detail) = &state.poisoned {
            return Err(StoreError::Poisoned { name: name.to_string(), detail: detail.clone() });
        }
        Ok(state)
    }

    async fn hydrate(&self, name: &str) -> Result<CollectionState<T>, StoreError> {
        match self.inner.blobs.find_by_name(name).await? {
            Some(blob) => {
                let content = self.inner.blobs.read_blob(&blob).await?;
                match decode_records::<T>(&content) {
                    Ok(records) => {
                        debug!(
                            target: "chatwarden_store",
                            "hydrated collection '{name}' ({} records)",
                            records.len()
                        );
                        Ok(CollectionState {
                            blob,
                            records,
                            dirty: false,
                            pending: None,
                            poisoned: None,
                        })
                    }
                    Err(e) => {
                        error!(
                            target: "chatwarden_store",
                            "collection '{name}' is undecodable and will be disabled: {e}"
                        );
                        Ok(CollectionState {
                            blob,
                            records: Vec::new(),
                            dirty: false,
                            pending: None,
                            poisoned: Some(e.to_string()),
                        })
                    }
                }
            }
            None => {
                let empty = encode_records::<T>(&[]);
                let blob = self.inner.blobs.create_if_absent(name, &empty).await?;
                debug!(target: "chatwarden_store", "created empty collection '{name}'");
                Ok(CollectionState {
                    blob,
                    records: Vec::new(),
                    dirty: false,
                    pending: None,
                    poisoned: None,
                })
            }
        }
    }
}
