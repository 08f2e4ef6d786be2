// chatwarden-store/src/blob.rs
//! The durable-medium contract and its adapters.
//!
//! The moderation engine treats persistence as a flat `name -> blob` store.
//! [`FileBlobStore`] is the production default; [`MemoryBlobStore`] backs the
//! test suite and exposes a write counter so flush coalescing can be asserted.
//!
//! License: MIT OR Apache-2.0

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Opaque handle to a durable blob, resolved from a collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobRef {
    pub name: String,
}

impl BlobRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An addressable blob store: the only contract the engine has with its
/// durable medium.
///
/// `replace_blob` must be atomic — after a crash the medium holds either the
/// previous content or the new content, never a partial write.
#[async_trait]
pub trait KeyedBlobStore: Send + Sync {
    /// Looks up an existing blob by name.
    async fn find_by_name(&self, name: &str) -> Result<Option<BlobRef>>;

    /// Creates the named blob with `initial` content if it does not exist,
    /// returning a handle either way.
    async fn create_if_absent(&self, name: &str, initial: &str) -> Result<BlobRef>;

    /// Reads the full content of a blob.
    async fn read_blob(&self, blob: &BlobRef) -> Result<String>;

    /// Atomically replaces the full content of a blob.
    async fn replace_blob(&self, blob: &BlobRef, content: &str) -> Result<()>;
}

/// Flat-file adapter: one file per collection under a root directory.
///
/// Replacement writes a sibling temp file and renames it over the target,
/// which is atomic on POSIX filesystems.
#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        // Collection names come from code, not users, but keep them
        // filesystem-safe anyway.
        let safe: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.tsv"))
    }
}

#[async_trait]
impl KeyedBlobStore for FileBlobStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<BlobRef>> {
        let path = self.path_for(name);
        match tokio::fs::metadata(&path).await {
            Ok(_) => Ok(Some(BlobRef::new(name))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to stat blob {}", path.display())),
        }
    }

    async fn create_if_absent(&self, name: &str, initial: &str) -> Result<BlobRef> {
        if let Some(existing) = self.find_by_name(name).await? {
            return Ok(existing);
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create blob root {}", self.root.display()))?;
        let blob = BlobRef::new(name);
        self.replace_blob(&blob, initial).await?;
        Ok(blob)
    }

    async fn read_blob(&self, blob: &BlobRef) -> Result<String> {
        let path = self.path_for(&blob.name);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read blob {}", path.display()))
    }

    async fn replace_blob(&self, blob: &BlobRef, content: &str) -> Result<()> {
        let path = self.path_for(&blob.name);
        let tmp = path.with_extension("tsv.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("failed to write temp blob {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to commit blob {}", path.display()))
    }
}

/// In-memory adapter for tests.
///
/// Tracks how many durable writes occurred so coalescing behaviour can be
/// asserted precisely.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `replace_blob` calls observed since construction.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current durable content for a name, if the blob exists.
    pub fn snapshot(&self, name: &str) -> Option<String> {
        self.blobs.lock().expect("blob map poisoned").get(name).cloned()
    }

    /// Seeds a blob directly, bypassing the trait. Used to simulate
    /// pre-existing (or corrupted) durable state.
    pub fn seed(&self, name: &str, content: &str) {
        self.blobs
            .lock()
            .expect("blob map poisoned")
            .insert(name.to_string(), content.to_string());
    }
}

#[async_trait]
impl KeyedBlobStore for MemoryBlobStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<BlobRef>> {
        let blobs = self.blobs.lock().expect("blob map poisoned");
        Ok(blobs.contains_key(name).then(|| BlobRef::new(name)))
    }

    async fn create_if_absent(&self, name: &str, initial: &str) -> Result<BlobRef> {
        let mut blobs = self.blobs.lock().expect("blob map poisoned");
        if !blobs.contains_key(name) {
            blobs.insert(name.to_string(), initial.to_string());
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(BlobRef::new(name))
    }

    async fn read_blob(&self, blob: &BlobRef) -> Result<String> {
        let blobs = self.blobs.lock().expect("blob map poisoned");
        blobs
            .get(&blob.name)
            .cloned()
            .with_context(|| format!("blob '{}' does not exist", blob.name))
    }

    async fn replace_blob(&self, blob: &BlobRef, content: &str) -> Result<()> {
        let mut blobs = self.blobs.lock().expect("blob map poisoned");
        blobs.insert(blob.name.clone(), content.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
