//! Asynchronous evaluation of a compiled [`GlobNode`] trie against the
//! hybrid in-memory/backing-store directory graph, grounded on
//! `eden/fs/inodes/GlobNode.cpp::evaluate`.
//!
//! Two [`GlobRoot`] adapters cover the two container shapes the walker
//! must treat identically: [`InodeGlobRoot`] over the materialization
//! overlay (locking, may recurse through locally-created directories) and
//! [`TreeGlobRoot`] over a plain [`Tree`] (no locking, every child loads
//! through the [`ObjectStore`]).

use std::sync::Arc;

use async_trait::async_trait;
use crossbeam_queue::SegQueue;
use futures::future::{join_all, BoxFuture};

use crate::error::Result;
use crate::glob::GlobNode;
use crate::hash::{Hash, RootId};
use crate::model::{DirEntry, EntryKind, Inode, Tree, TreeEntry};
use crate::store::{FetchContext, ObjectStore};

/// One match produced by [`evaluate`]: the full path from the evaluation
/// root, the kind of object it names, and the [`RootId`] of the
/// container it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobResult {
    pub path: String,
    pub kind: EntryKind,
    pub root: RootId,
}

/// A container-agnostic view of one directory entry, produced by a
/// [`GlobRoot`] so the walker never has to know whether it came from an
/// [`Inode`]'s overlay or a backing-store [`Tree`].
#[derive(Debug, Clone)]
pub struct GlobEntry {
    pub name: String,
    pub hash: Option<Hash>,
    pub kind: EntryKind,
    pub materialized: bool,
}

impl GlobEntry {
    fn from_dir_entry(entry: &DirEntry) -> Self {
        Self {
            name: entry.name().to_string(),
            hash: entry.hash(),
            kind: entry.kind(),
            materialized: entry.is_materialized(),
        }
    }

    fn from_tree_entry(entry: &TreeEntry) -> Self {
        Self { name: entry.name().to_string(), hash: Some(entry.hash()), kind: entry.kind(), materialized: false }
    }
}

/// A writer-exclusive vector of hashes the evaluator populates so an
/// upstream prefetcher knows which file blobs to warm.
/// Backed by a lock-free queue rather than a `Mutex<Vec<_>>`: every
/// writer is a sibling glob branch running concurrently, and none of
/// them need to observe each other's pushes, only contribute to the
/// final drain.
#[derive(Default)]
pub struct PrefetchList {
    hashes: SegQueue<Hash>,
}

impl PrefetchList {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, hash: Hash) {
        self.hashes.push(hash);
    }

    /// Drains every hash pushed so far. Order is not meaningful; only
    /// the resulting *set* of hashes is promised.
    pub fn drain(&self) -> Vec<Hash> {
        let mut out = Vec::new();
        while let Some(hash) = self.hashes.pop() {
            out.push(hash);
        }
        out
    }
}

/// The adapter capability set a [`GlobNode`] walk needs from whatever
/// directory container it is evaluating against.
///
/// `lock_contents`/`lookup_entry` stand in for "take the shared hold,
/// read, release": an [`InodeGlobRoot`] actually awaits a
/// [`tokio::sync::RwLock`] read guard and copies out a snapshot before
/// returning it, so no guard is ever held across a suspension point; a
/// [`TreeGlobRoot`] has no lock at all and answers synchronously inside
/// the `async fn`. `get_or_load_child_tree` is the one method that may
/// genuinely suspend on more than a lock: for an inode root it resolves
/// (or creates) the resident child inode; a tree root never calls it,
/// since none of its entries are ever materialized.
#[async_trait]
pub trait GlobRoot: Send + Sync {
    /// The revision this container's entries are attributed to in
    /// emitted [`GlobResult`]s.
    fn root_id(&self) -> &RootId;

    /// A snapshot of every entry currently visible.
    async fn lock_contents(&self) -> Vec<GlobEntry>;

    /// A single named lookup, used for literal (non-special) pattern
    /// segments instead of a full iteration.
    async fn lookup_entry(&self, name: &str) -> Option<GlobEntry>;

    /// True if descending into `entry` must go through this root's own
    /// overlay/children rather than straight through the backing store.
    fn entry_should_load_child_tree(&self, entry: &GlobEntry) -> bool;

    /// True if a matched file entry's hash should be added to the
    /// prefetch list.
    fn entry_should_prefetch(&self, entry: &GlobEntry) -> bool;

    /// Resolves the child container for `entry`, for entries where
    /// [`entry_should_load_child_tree`](Self::entry_should_load_child_tree)
    /// is true. Never called otherwise.
    async fn get_or_load_child_tree(&self, entry: &GlobEntry) -> Result<Arc<dyn GlobRoot>>;
}

/// A [`GlobRoot`] over the materialization overlay: an [`Inode`] and its
/// [`crate::model::DirContents`].
pub struct InodeGlobRoot {
    inode: Arc<Inode>,
    root_id: RootId,
}

impl InodeGlobRoot {
    pub fn new(inode: Arc<Inode>, root_id: RootId) -> Self {
        Self { inode, root_id }
    }
}

#[async_trait]
impl GlobRoot for InodeGlobRoot {
    fn root_id(&self) -> &RootId {
        &self.root_id
    }

    async fn lock_contents(&self) -> Vec<GlobEntry> {
        self.inode.contents().entries().await.iter().map(GlobEntry::from_dir_entry).collect()
    }

    async fn lookup_entry(&self, name: &str) -> Option<GlobEntry> {
        self.inode.contents().get(name).await.as_ref().map(GlobEntry::from_dir_entry)
    }

    fn entry_should_load_child_tree(&self, entry: &GlobEntry) -> bool {
        entry.materialized
    }

    fn entry_should_prefetch(&self, entry: &GlobEntry) -> bool {
        !entry.materialized && !entry.kind.is_tree()
    }

    async fn get_or_load_child_tree(&self, entry: &GlobEntry) -> Result<Arc<dyn GlobRoot>> {
        use crate::model::DirContents;

        let child_inode = match self.inode.child(&entry.name).await {
            Some(existing) => existing,
            None => {
                // A materialized entry with no resident inode: nothing
                // under it has been walked yet. Overlay storage lives
                // outside this core, so the most it can do is hand back
                // an empty directory for the caller to populate.
                let fresh = Arc::new(Inode::new(entry.name.clone(), DirContents::new_empty()));
                self.inode.attach_child(entry.name.clone(), fresh.clone()).await;
                fresh
            }
        };
        Ok(Arc::new(InodeGlobRoot::new(child_inode, self.root_id.clone())))
    }
}

/// A [`GlobRoot`] over a plain, backing-store-resident [`Tree`]. No
/// locking, no overlay; every subtree is reached through the
/// [`ObjectStore`].
pub struct TreeGlobRoot {
    tree: Arc<Tree>,
    root_id: RootId,
}

impl TreeGlobRoot {
    pub fn new(tree: Arc<Tree>, root_id: RootId) -> Self {
        Self { tree, root_id }
    }
}

#[async_trait]
impl GlobRoot for TreeGlobRoot {
    fn root_id(&self) -> &RootId {
        &self.root_id
    }

    async fn lock_contents(&self) -> Vec<GlobEntry> {
        self.tree.entries().iter().map(GlobEntry::from_tree_entry).collect()
    }

    async fn lookup_entry(&self, name: &str) -> Option<GlobEntry> {
        self.tree.get(name).map(GlobEntry::from_tree_entry)
    }

    fn entry_should_load_child_tree(&self, _entry: &GlobEntry) -> bool {
        false
    }

    fn entry_should_prefetch(&self, entry: &GlobEntry) -> bool {
        !entry.kind.is_tree()
    }

    async fn get_or_load_child_tree(&self, _entry: &GlobEntry) -> Result<Arc<dyn GlobRoot>> {
        unreachable!("a TreeGlobRoot entry is never materialized")
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}/{name}")
    }
}

/// Waits for every launched descent, success or failure alike, before
/// returning. An "abort on first error" combinator would let the caller
/// start tearing down the `GlobNode` trie (and the `root`/`object_store`
/// it borrows) the moment one branch resolves, while sibling branches
/// launched a moment earlier still hold references into it.
async fn collect_all<'a>(futures: Vec<BoxFuture<'a, Result<Vec<GlobResult>>>>) -> Result<Vec<GlobResult>> {
    let mut results = Vec::new();
    let mut first_err = None;
    for outcome in join_all(futures).await {
        match outcome {
            Ok(mut matches) => results.append(&mut matches),
            Err(err) => {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

/// Evaluates `node` against `root`, returning every match plus (when
/// `prefetch` is supplied) the hashes of matched file entries that
/// qualify for prefetch.
pub async fn evaluate(
    node: &GlobNode,
    root: Arc<dyn GlobRoot>,
    object_store: Arc<ObjectStore>,
    ctx: FetchContext,
    prefetch: Option<Arc<PrefetchList>>,
) -> Result<Vec<GlobResult>> {
    evaluate_node(node, root, "", object_store, ctx, prefetch).await
}

fn evaluate_node<'a>(
    node: &'a GlobNode,
    root: Arc<dyn GlobRoot>,
    root_path: &str,
    object_store: Arc<ObjectStore>,
    ctx: FetchContext,
    prefetch: Option<Arc<PrefetchList>>,
) -> BoxFuture<'a, Result<Vec<GlobResult>>> {
    let root_path = root_path.to_string();
    Box::pin(async move {
        let mut results = Vec::new();
        let mut futures: Vec<BoxFuture<'a, Result<Vec<GlobResult>>>> = Vec::new();
        let mut deferred: Vec<(GlobEntry, &'a GlobNode)> = Vec::new();

        if !node.recursive_children().is_empty() {
            futures.push(evaluate_recursive(
                node.recursive_children(),
                root.clone(),
                root_path.clone(),
                String::new(),
                object_store.clone(),
                ctx.clone(),
                prefetch.clone(),
            ));
        }

        // Every ordinary child is resolved against a snapshot of the
        // directory's current entries, taken once under `root`'s shared
        // hold: no mutation, including a child load, may happen while
        // that hold is conceptually held.
        let entries = root.lock_contents().await;
        for child in node.children() {
            if !child.has_specials() {
                if let Some(entry) = root.lookup_entry(child.pattern()).await {
                    dispatch_match(
                        child,
                        &entry,
                        &root_path,
                        &root,
                        &object_store,
                        &ctx,
                        &prefetch,
                        &mut results,
                        &mut futures,
                        &mut deferred,
                    );
                }
            } else {
                for entry in &entries {
                    if child.matches(&entry.name) {
                        dispatch_match(
                            child,
                            entry,
                            &root_path,
                            &root,
                            &object_store,
                            &ctx,
                            &prefetch,
                            &mut results,
                            &mut futures,
                            &mut deferred,
                        );
                    }
                }
            }
        }
        drop(entries);

        // Deferred descents (materialized entries) are only launched
        // after the snapshot above is done with, matching the "collect
        // under the hold, launch after releasing it" rule.
        for (entry, child_node) in deferred {
            let root = root.clone();
            let object_store = object_store.clone();
            let ctx = ctx.clone();
            let prefetch = prefetch.clone();
            let child_path = join_path(&root_path, &entry.name);
            futures.push(Box::pin(async move {
                let child_root = root.get_or_load_child_tree(&entry).await?;
                evaluate_node(child_node, child_root, &child_path, object_store, ctx, prefetch).await
            }));
        }

        let mut descended = collect_all(futures).await?;
        results.append(&mut descended);
        Ok(results)
    })
}

/// Handles one matched ordinary-child entry: emits a leaf result (with
/// its prefetch hint) and/or schedules a descent into its subtree.
#[allow(clippy::too_many_arguments)]
fn dispatch_match<'a>(
    child: &'a GlobNode,
    entry: &GlobEntry,
    root_path: &str,
    root: &Arc<dyn GlobRoot>,
    object_store: &Arc<ObjectStore>,
    ctx: &FetchContext,
    prefetch: &Option<Arc<PrefetchList>>,
    results: &mut Vec<GlobResult>,
    futures: &mut Vec<BoxFuture<'a, Result<Vec<GlobResult>>>>,
    deferred: &mut Vec<(GlobEntry, &'a GlobNode)>,
) {
    if child.is_leaf() {
        results.push(GlobResult {
            path: join_path(root_path, &entry.name),
            kind: entry.kind,
            root: root.root_id().clone(),
        });
        if let (Some(list), Some(hash)) = (prefetch, entry.hash) {
            if root.entry_should_prefetch(entry) {
                list.push(hash);
            }
        }
    }

    let descends_further = !child.children().is_empty() || !child.recursive_children().is_empty();
    if !entry.kind.is_tree() || !descends_further {
        return;
    }

    if root.entry_should_load_child_tree(entry) {
        deferred.push((entry.clone(), child));
        return;
    }

    let Some(hash) = entry.hash else { return };
    let child_path = join_path(root_path, &entry.name);
    let object_store = object_store.clone();
    let ctx = ctx.clone();
    let root_id = root.root_id().clone();
    let prefetch = prefetch.clone();
    futures.push(Box::pin(async move {
        let (tree, _origin) = object_store.get_tree(&hash, &ctx).await?;
        let child_root: Arc<dyn GlobRoot> = Arc::new(TreeGlobRoot::new(tree, root_id));
        evaluate_node(child, child_root, &child_path, object_store, ctx, prefetch).await
    }))
}

/// The `**` walker: iterates every entry once, tests it against each
/// recursive child's matcher in declaration order and stops at the
/// first hit (no duplicate result per entry), then always recurses
/// into subtrees regardless of whether they themselves matched, since
/// a deeper descendant might.
fn evaluate_recursive<'a>(
    recursive_children: &'a [Box<GlobNode>],
    root: Arc<dyn GlobRoot>,
    root_path: String,
    start_of_recursive: String,
    object_store: Arc<ObjectStore>,
    ctx: FetchContext,
    prefetch: Option<Arc<PrefetchList>>,
) -> BoxFuture<'a, Result<Vec<GlobResult>>> {
    Box::pin(async move {
        let mut results = Vec::new();
        let mut futures: Vec<BoxFuture<'a, Result<Vec<GlobResult>>>> = Vec::new();

        let entries = root.lock_contents().await;
        for entry in &entries {
            let candidate = join_path(&start_of_recursive, &entry.name);

            for node in recursive_children {
                if node.matches(&candidate) {
                    results.push(GlobResult {
                        path: join_path(&root_path, &candidate),
                        kind: entry.kind,
                        root: root.root_id().clone(),
                    });
                    if let (Some(list), Some(hash)) = (&prefetch, entry.hash) {
                        if root.entry_should_prefetch(entry) {
                            list.push(hash);
                        }
                    }
                    break;
                }
            }

            if !entry.kind.is_tree() {
                continue;
            }

            if root.entry_should_load_child_tree(entry) {
                let root = root.clone();
                let entry = entry.clone();
                let root_path = root_path.clone();
                let candidate = candidate.clone();
                let object_store = object_store.clone();
                let ctx = ctx.clone();
                let prefetch = prefetch.clone();
                futures.push(Box::pin(async move {
                    let child_root = root.get_or_load_child_tree(&entry).await?;
                    evaluate_recursive(recursive_children, child_root, root_path, candidate, object_store, ctx, prefetch)
                        .await
                }));
            } else if let Some(hash) = entry.hash {
                let root_id = root.root_id().clone();
                let root_path = root_path.clone();
                let candidate = candidate.clone();
                let object_store = object_store.clone();
                let ctx = ctx.clone();
                let prefetch = prefetch.clone();
                futures.push(Box::pin(async move {
                    let (tree, _origin) = object_store.get_tree(&hash, &ctx).await?;
                    let child_root: Arc<dyn GlobRoot> = Arc::new(TreeGlobRoot::new(tree, root_id));
                    evaluate_recursive(recursive_children, child_root, root_path, candidate, object_store, ctx, prefetch)
                        .await
                }));
            }
        }
        drop(entries);

        let mut descended = collect_all(futures).await?;
        results.append(&mut descended);
        Ok(results)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glob::compile;
    use crate::model::TreeEntry;
    use crate::store::FakeBackingStore;

    fn entry(name: &str, kind: EntryKind) -> TreeEntry {
        TreeEntry::new(name, Hash::sha1(name.as_bytes()), kind).unwrap()
    }

    /// A small tree fixture — `a/b/c`, `a/b/d`, `a/e` — with every tree
    /// stored ready (so evaluation doesn't need a driving task) against
    /// a fresh [`FakeBackingStore`].
    fn fixture() -> (Arc<FakeBackingStore>, Arc<ObjectStore>, TreeGlobRoot, RootId) {
        let fake = Arc::new(FakeBackingStore::new());

        let b_tree = fake
            .put_ready_tree(vec![
                entry("c", EntryKind::RegularFile),
                entry("d", EntryKind::RegularFile),
            ])
            .unwrap();
        let a_tree = fake
            .put_ready_tree(vec![
                TreeEntry::new("b", b_tree.hash(), EntryKind::Tree).unwrap(),
                entry("e", EntryKind::RegularFile),
            ])
            .unwrap();
        let root_tree = fake
            .put_ready_tree(vec![TreeEntry::new("a", a_tree.hash(), EntryKind::Tree).unwrap()])
            .unwrap();

        let object_store = Arc::new(ObjectStore::new(fake.clone()));
        let root_id = RootId::new("rev1").unwrap();
        let root = TreeGlobRoot::new(root_tree, root_id.clone());
        (fake, object_store, root, root_id)
    }

    fn paths(results: &[GlobResult]) -> Vec<String> {
        let mut paths: Vec<String> = results.iter().map(|r| r.path.clone()).collect();
        paths.sort();
        paths
    }

    #[tokio::test]
    async fn exact_literal_path_matches_single_file() {
        let (_fake, object_store, root, _root_id) = fixture();
        let node = compile(&["a/b/c".to_string()], true).unwrap();
        let results =
            evaluate(&node, Arc::new(root), object_store, FetchContext::default(), None).await.unwrap();
        assert_eq!(paths(&results), vec!["a/b/c".to_string()]);
    }

    #[tokio::test]
    async fn recursive_wildcard_finds_nested_file() {
        let (_fake, object_store, root, _root_id) = fixture();
        let node = compile(&["a/**/c".to_string()], true).unwrap();
        let results =
            evaluate(&node, Arc::new(root), object_store, FetchContext::default(), None).await.unwrap();
        assert_eq!(paths(&results), vec!["a/b/c".to_string()]);
    }

    #[tokio::test]
    async fn wildcard_match_populates_prefetch_list() {
        let (_fake, object_store, root, _root_id) = fixture();
        let node = compile(&["a/b/*".to_string()], true).unwrap();
        let prefetch = Arc::new(PrefetchList::new());
        let results = evaluate(&node, Arc::new(root), object_store, FetchContext::default(), Some(prefetch.clone()))
            .await
            .unwrap();
        assert_eq!(paths(&results), vec!["a/b/c".to_string(), "a/b/d".to_string()]);

        let mut hashes = prefetch.drain();
        hashes.sort_by_key(|h| h.to_hex());
        let mut expected = vec![Hash::sha1(b"c"), Hash::sha1(b"d")];
        expected.sort_by_key(|h| h.to_hex());
        assert_eq!(hashes, expected);
    }

    #[tokio::test]
    async fn glob_completeness_over_whole_tree() {
        let (_fake, object_store, root, _root_id) = fixture();
        let node = compile(&["**".to_string()], true).unwrap();
        let results =
            evaluate(&node, Arc::new(root), object_store, FetchContext::default(), None).await.unwrap();
        assert_eq!(paths(&results), vec!["a".to_string(), "a/b".to_string(), "a/b/c".to_string(), "a/b/d".to_string(), "a/e".to_string()]);
    }

    #[tokio::test]
    async fn recursive_dedup_does_not_double_report() {
        let (_fake, object_store, root, _root_id) = fixture();
        // The same pattern compiled twice still only matches "a/b/c"
        // once: dedup happens within one node's recursive children.
        let node = compile(&["a/**/c".to_string(), "a/**/c".to_string()], true).unwrap();
        let results =
            evaluate(&node, Arc::new(root), object_store, FetchContext::default(), None).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn missing_component_yields_no_matches() {
        let (_fake, object_store, root, _root_id) = fixture();
        let node = compile(&["missing/*".to_string()], true).unwrap();
        let results =
            evaluate(&node, Arc::new(root), object_store, FetchContext::default(), None).await.unwrap();
        assert!(results.is_empty());
    }
}
