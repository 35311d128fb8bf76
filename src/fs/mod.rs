//! The dispatcher boundary: the contract the (out-of-scope) kernel
//! bridge is driven through. A single async trait with no default
//! methods, returning real results instead of promise-keeper callbacks,
//! since every operation here genuinely resolves to a value the bridge
//! needs.
//!
//! Every method returns a future; nothing here may assume synchronous
//! completion. The notification methods (`file_created` and friends)
//! carry no data back beyond success or failure — they complete once
//! the overlay has recorded the change.

use async_trait::async_trait;

use crate::error::Result;
use crate::hash::Hash;
use crate::model::EntryKind;

/// One entry as returned by [`Dispatcher::opendir`]: enough to populate
/// a directory listing without fetching the entry's own content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

/// The result of [`Dispatcher::lookup`]: identifies what a path
/// currently resolves to, without reading its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub hash: Hash,
    pub kind: EntryKind,
    pub size: u64,
}

/// The boundary between the kernel/filesystem bridge and this core.
/// No method has a default body: every implementation lives entirely
/// outside this crate.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Lists the entries of the directory at `path`.
    async fn opendir(&self, path: &str) -> Result<Vec<EntryMetadata>>;

    /// Resolves `path` to its current hash, kind, and size, or `None`
    /// if nothing exists there.
    async fn lookup(&self, path: &str) -> Result<Option<LookupResult>>;

    /// Reports whether `path` is currently accessible.
    async fn access(&self, path: &str) -> Result<bool>;

    /// Reads the full content at `path`.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// A new file was created at `path`.
    async fn file_created(&self, path: &str) -> Result<()>;

    /// A new directory was created at `path`.
    async fn dir_created(&self, path: &str) -> Result<()>;

    /// The file at `path` was modified.
    async fn file_modified(&self, path: &str) -> Result<()>;

    /// A file moved from `old` to `new`.
    async fn file_renamed(&self, old: &str, new: &str) -> Result<()>;

    /// The file at `path` was deleted.
    async fn file_deleted(&self, path: &str) -> Result<()>;

    /// The directory at `path` was deleted.
    async fn dir_deleted(&self, path: &str) -> Result<()>;
}
