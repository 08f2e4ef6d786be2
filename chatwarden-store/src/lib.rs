// chatwarden-store/src/lib.rs
//! # ChatWarden Store
//!
//! `chatwarden-store` provides the persistence layer for the ChatWarden
//! moderation engine. The durable medium is deliberately abstract: production
//! deployments piggyback on whatever blob-shaped primitive the host platform
//! offers (a pinned message, an attachment, a flat file), so everything here
//! is written against a small `name -> blob` contract rather than a database.
//!
//! ## Modules
//!
//! * `blob`: The [`KeyedBlobStore`] trait plus the [`FileBlobStore`] and
//!   [`MemoryBlobStore`] adapters.
//! * `table`: A tab-separated blob codec with dynamically inferred column
//!   types, and the [`TableRecord`] trait persisted records implement.
//! * `store`: [`RecordStore`], a write-back cache over a `KeyedBlobStore`
//!   with debounced, coalescing flushes.
//!
//! ## Design Principles
//!
//! * **Cache is authoritative:** once a collection is dirty, readers always
//!   see the in-memory value; the durable blob only catches up on flush.
//! * **Coalesced writes:** bursts of updates within the debounce window
//!   produce exactly one durable write carrying the final value.
//! * **Atomic replacement:** a flush replaces the whole blob in one
//!   operation; the durable medium never holds a partially written table.
//!
//! License: MIT OR Apache-2.0

pub mod blob;
pub mod store;
pub mod table;

pub use blob::{BlobRef, FileBlobStore, KeyedBlobStore, MemoryBlobStore};
pub use store::{RecordStore, StoreError};
pub use table::{Cell, CodecError, Table, TableRecord};
