//! The materialization overlay: a directory's current view is either
//! the unmodified [`Tree`](super::Tree) from the backing store, or a
//! locked, in-memory map once something under it has changed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::hash::Hash;
use crate::model::tree::{EntryKind, Tree};

/// One name's worth of state inside a materialized directory.
///
/// `materialized` tracks whether this particular entry has itself been
/// modified since the directory was loaded, distinct from the parent
/// [`DirContents`] having an overlay at all: a directory can gain an
/// overlay (e.g. a sibling was created) while an untouched entry within
/// it still points straight at its original source-control hash.
#[derive(Debug, Clone)]
pub struct DirEntry {
    name: String,
    hash: Option<Hash>,
    kind: EntryKind,
    materialized: bool,
}

impl DirEntry {
    /// An entry exactly as it came from the backing store.
    pub fn from_source(name: impl Into<String>, hash: Hash, kind: EntryKind) -> Self {
        Self { name: name.into(), hash: Some(hash), kind, materialized: false }
    }

    /// A newly created entry with no backing-store hash yet.
    pub fn new_materialized(name: impl Into<String>, kind: EntryKind) -> Self {
        Self { name: name.into(), hash: None, kind, materialized: true }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The backing-store hash this entry last matched, if it still has
    /// one. `None` once the entry has been modified or created locally.
    pub fn hash(&self) -> Option<Hash> {
        self.hash
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    /// Records a local modification, clearing the backing-store hash.
    pub fn mark_materialized(&mut self) {
        self.hash = None;
        self.materialized = true;
    }
}

/// The current, possibly-overlaid view of one directory's children.
///
/// Before anything under a directory is changed, `overlay` is `None`
/// and lookups fall through to the loaded [`Tree`]. The first local
/// write populates `overlay` with every entry from that tree plus the
/// change, after which the tree is never consulted again for this
/// directory.
///
/// Guarded by a `tokio::sync::RwLock` rather than a synchronous mutex:
/// readers (glob evaluation, lookups) take the read lock and may need
/// to recurse into children while holding it, and a blocking mutex
/// would make that recursion a deadlock risk the moment any step
/// suspends. Mutation never happens while a read lock from the same
/// logical operation is still held.
#[derive(Debug)]
pub struct DirContents {
    source: Option<Arc<Tree>>,
    overlay: RwLock<Option<BTreeMap<String, DirEntry>>>,
}

impl DirContents {
    /// A directory whose contents are exactly the given source tree,
    /// not yet materialized.
    pub fn from_tree(tree: Arc<Tree>) -> Self {
        Self { source: Some(tree), overlay: RwLock::new(None) }
    }

    /// A directory with no backing-store counterpart at all (created
    /// locally), materialized from the start.
    pub fn new_empty() -> Self {
        Self { source: None, overlay: RwLock::new(Some(BTreeMap::new())) }
    }

    /// True once this directory has a materialization overlay, whether
    /// because it was modified or because it never had a source tree.
    pub async fn is_materialized(&self) -> bool {
        self.overlay.read().await.is_some()
    }

    /// Returns a snapshot of every entry currently visible, merging the
    /// source tree and overlay as needed. The read lock is released
    /// before this returns.
    pub async fn entries(&self) -> Vec<DirEntry> {
        let guard = self.overlay.read().await;
        if let Some(overlay) = guard.as_ref() {
            overlay.values().cloned().collect()
        } else {
            drop(guard);
            self.source
                .as_ref()
                .map(|tree| {
                    tree.entries()
                        .iter()
                        .map(|e| DirEntry::from_source(e.name(), e.hash(), e.kind()))
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    /// Looks up a single name under the current read lock.
    pub async fn get(&self, name: &str) -> Option<DirEntry> {
        let guard = self.overlay.read().await;
        if let Some(overlay) = guard.as_ref() {
            overlay.get(name).cloned()
        } else {
            drop(guard);
            self.source
                .as_ref()
                .and_then(|tree| tree.get(name))
                .map(|e| DirEntry::from_source(e.name(), e.hash(), e.kind()))
        }
    }

    /// Materializes the directory if needed (copying the source tree's
    /// entries into the overlay) and inserts or replaces `entry`.
    pub async fn insert(&self, entry: DirEntry) {
        let mut guard = self.overlay.write().await;
        self.ensure_overlay_locked(&mut guard);
        guard.as_mut().unwrap().insert(entry.name().to_string(), entry);
    }

    /// Materializes the directory if needed and removes `name`, returning
    /// the entry that was there.
    pub async fn remove(&self, name: &str) -> Option<DirEntry> {
        let mut guard = self.overlay.write().await;
        self.ensure_overlay_locked(&mut guard);
        guard.as_mut().unwrap().remove(name)
    }

    fn ensure_overlay_locked(&self, guard: &mut Option<BTreeMap<String, DirEntry>>) {
        if guard.is_some() {
            return;
        }
        let map = self
            .source
            .as_ref()
            .map(|tree| {
                tree.entries()
                    .iter()
                    .map(|e| {
                        let entry = DirEntry::from_source(e.name(), e.hash(), e.kind());
                        (entry.name().to_string(), entry)
                    })
                    .collect()
            })
            .unwrap_or_default();
        *guard = Some(map);
    }
}

/// A directory inode: its identity, the lazily-materialized contents
/// behind it, and whichever children already have their own inode
/// resident in memory.
///
/// A child being present in `children` means the mount has already
/// walked into it during this session (and possibly materialized
/// something under it); a child absent from the map still exists
/// according to [`DirContents`], but loading it means going through the
/// backing store. This is the hybrid in-memory/backing-store graph the
/// glob evaluator walks.
#[derive(Debug)]
pub struct Inode {
    name: String,
    contents: DirContents,
    children: RwLock<HashMap<String, Arc<Inode>>>,
}

impl Inode {
    pub fn new(name: impl Into<String>, contents: DirContents) -> Self {
        Self { name: name.into(), contents, children: RwLock::new(HashMap::new()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &DirContents {
        &self.contents
    }

    /// Returns the already-resident child inode named `name`, if any.
    pub async fn child(&self, name: &str) -> Option<Arc<Inode>> {
        self.children.read().await.get(name).cloned()
    }

    /// Records that `child` is now the resident inode for `name`,
    /// displacing whatever was there before.
    pub async fn attach_child(&self, name: impl Into<String>, child: Arc<Inode>) {
        self.children.write().await.insert(name.into(), child);
    }
}
