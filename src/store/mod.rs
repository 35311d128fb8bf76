//! Backing stores: the abstraction that turns a [`RootId`] into trees
//! and blobs, and the caching [`ObjectStore`] layered above it.

mod empty;
mod fake;
mod object_store;

pub use empty::EmptyBackingStore;
pub use fake::FakeBackingStore;
pub use object_store::{FetchContext, ObjectStore};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::hash::{Hash, RootId};
use crate::model::{Blob, Tree};

/// Priority attached to a fetch request, threaded through to whatever
/// sits behind the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FetchPriority {
    Low,
    Normal,
    High,
}

impl Default for FetchPriority {
    fn default() -> Self {
        FetchPriority::Normal
    }
}

/// Where a fetched tree or blob actually came from: already resident in
/// memory, served out of a local persistent cache, or pulled over the
/// wire from the remote backend. `getRootTree` never reports this (the
/// interface table only attributes it to `getTree`/`getBlob`); every
/// other caller that cares whether a fetch was free or not reads it off
/// the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Memory,
    LocalCache,
    Remote,
}

/// Source of content-addressed trees and blobs for a single source
/// control backend.
///
/// Every method is async: a real backend talks to a remote service, and
/// nothing here may block a worker thread waiting on it. [`EmptyBackingStore`]
/// and [`FakeBackingStore`] are the two implementations carried by this
/// core; a production backend lives outside it.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Parses a string identifying a revision into a [`RootId`].
    fn parse_root_id(&self, value: &str) -> Result<RootId>;

    /// Renders a [`RootId`] back to the string form a caller would
    /// recognize (not necessarily the same bytes it was parsed from).
    fn render_root_id(&self, root: &RootId) -> String;

    /// Fetches the tree at the root of `root`.
    async fn get_root_tree(&self, root: &RootId) -> Result<Arc<Tree>>;

    /// Fetches the tree identified by `hash`, along with where it came
    /// from.
    async fn get_tree(&self, hash: &Hash) -> Result<(Arc<Tree>, Origin)>;

    /// Fetches the blob identified by `hash`, along with where it came
    /// from.
    async fn get_blob(&self, hash: &Hash) -> Result<(Arc<Blob>, Origin)>;
}
