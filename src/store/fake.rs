//! A deterministic, in-memory [`BackingStore`] for tests.
//!
//! Grounded on `eden/fs/testharness/FakeBackingStore.cpp`: every object a
//! test wants to exist must be `put` into the store first. A `put` object
//! stays pending until the test explicitly
//! [`trigger`](FakeBackingStore::trigger_tree)s it, or until it is
//! [`put` as already ready](FakeBackingStore::put_ready_tree), in which
//! case every `get` resolves immediately. This turns otherwise
//! unobservable fetch interleaving into something a test can drive and
//! assert on directly.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash as StdHash;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::hash::{Hash, RootId};
use crate::model::{Blob, Tree, TreeEntry};
use crate::store::{BackingStore, Origin};

struct StoredEntry<V> {
    value: Arc<V>,
    ready: bool,
}

/// A single content-addressed table plus its outstanding-promise
/// bookkeeping. Shared by the tree, blob, and root-tree tables below; the
/// three differ only in key and value type.
///
/// Access counts live in their own table, independent of `objects`: the
/// original increments `accessCounts[id]` (a map that default-constructs
/// a fresh `0` entry on first touch) before it even checks whether the
/// object exists, so a pure miss still bumps the count to 1.
struct Store<K, V> {
    objects: Mutex<HashMap<K, StoredEntry<V>>>,
    pending: Mutex<HashMap<K, Vec<oneshot::Sender<Result<Arc<V>>>>>>,
    access_counts: Mutex<HashMap<K, u64>>,
}

impl<K: StdHash + Eq + Clone + Debug, V> Store<K, V> {
    fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            access_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts a new object, pending by default. Fails with
    /// [`Error::AlreadyExists`] if `key` is already present.
    fn put(&self, key: K, value: Arc<V>) -> Result<()> {
        self.put_with_ready(key, value, false)
    }

    /// Like [`put`](Self::put), but every `get` against `key` resolves
    /// immediately instead of waiting for an explicit trigger.
    fn put_ready(&self, key: K, value: Arc<V>) -> Result<()> {
        self.put_with_ready(key, value, true)
    }

    fn put_with_ready(&self, key: K, value: Arc<V>, ready: bool) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(Error::AlreadyExists(format!("{key:?} is already present")));
        }
        objects.insert(key, StoredEntry { value, ready });
        Ok(())
    }

    fn maybe_put(&self, key: K, value: Arc<V>) -> (Arc<V>, bool) {
        let mut objects = self.objects.lock().unwrap();
        if let Some(existing) = objects.get(&key) {
            (existing.value.clone(), false)
        } else {
            objects.insert(key, StoredEntry { value: value.clone(), ready: false });
            (value, true)
        }
    }

    /// Looks up `key`, bumps its access counter, and either resolves
    /// immediately (the object was made ready, reported as
    /// [`Origin::Memory`]) or waits for an explicit trigger (reported as
    /// [`Origin::Remote`]). The counter is bumped before the presence
    /// check so that a `get` against a key that was never `put` still
    /// counts as one access before it fails with [`Error::NotFound`].
    async fn get(&self, key: &K) -> Result<(Arc<V>, Origin)> {
        *self.access_counts.lock().unwrap().entry(key.clone()).or_insert(0) += 1;

        let ready_value = {
            let objects = self.objects.lock().unwrap();
            let entry = objects
                .get(key)
                .ok_or_else(|| Error::NotFound(format!("fake backing store has no {key:?}")))?;
            if entry.ready {
                Some(entry.value.clone())
            } else {
                None
            }
        };
        if let Some(value) = ready_value {
            return Ok((value, Origin::Memory));
        }

        let rx = {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().entry(key.clone()).or_default().push(tx);
            rx
        };
        let value = rx.await.map_err(|_| Error::BrokenPromise)??;
        Ok((value, Origin::Remote))
    }

    fn trigger(&self, key: &K) {
        let value = self.objects.lock().unwrap().get(key).map(|e| e.value.clone());
        let senders = self.pending.lock().unwrap().remove(key).unwrap_or_default();
        match value {
            Some(value) => {
                for tx in senders {
                    let _ = tx.send(Ok(value.clone()));
                }
            }
            None => {
                for tx in senders {
                    let _ = tx.send(Err(Error::NotFound(format!("{key:?} was never put"))));
                }
            }
        }
    }

    fn trigger_error(&self, key: &K, err: Error) {
        let senders = self.pending.lock().unwrap().remove(key).unwrap_or_default();
        for tx in senders {
            let _ = tx.send(Err(err.clone()));
        }
    }

    /// Marks an already-`put` object ready, so every future `get` resolves
    /// immediately, and completes any promises already outstanding.
    fn mark_ready(&self, key: &K) {
        let value = {
            let mut objects = self.objects.lock().unwrap();
            objects.get_mut(key).map(|e| {
                e.ready = true;
                e.value.clone()
            })
        };
        let Some(value) = value else { return };
        let senders = self.pending.lock().unwrap().remove(key).unwrap_or_default();
        for tx in senders {
            let _ = tx.send(Ok(value.clone()));
        }
    }

    /// Drops every outstanding promise without resolving it, which
    /// fails each in-flight `get` with [`Error::BrokenPromise`] the
    /// moment its sender is dropped. Senders are collected under the
    /// lock and dropped only after it is released, so a sender's drop
    /// glue can never try to re-enter this store's own lock.
    fn discard_outstanding(&self) {
        let all: Vec<_> = self.pending.lock().unwrap().drain().collect();
        drop(all);
    }

    fn access_count(&self, key: &K) -> u64 {
        self.access_counts.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn get_stored(&self, key: &K) -> Option<Arc<V>> {
        self.objects.lock().unwrap().get(key).map(|e| e.value.clone())
    }
}

/// Computes a tree's hash as SHA-1 over its sorted entries'
/// `name ∥ child-hash ∥ mode`, so that two trees with the same contents
/// always hash the same way regardless of insertion order.
fn compute_tree_hash(entries: &[TreeEntry]) -> Hash {
    use byteorder::{BigEndian, WriteBytesExt};

    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));

    let mut buf = Vec::new();
    for entry in sorted {
        let name = entry.name().as_bytes();
        buf.write_u32::<BigEndian>(name.len() as u32).unwrap();
        buf.extend_from_slice(name);
        buf.extend_from_slice(entry.hash().as_bytes());
        buf.write_u32::<BigEndian>(entry.kind().mode()).unwrap();
    }
    Hash::sha1(&buf)
}

/// A deterministic, entirely in-memory [`BackingStore`].
pub struct FakeBackingStore {
    trees: Store<Hash, Tree>,
    blobs: Store<Hash, Blob>,
    root_trees: Store<RootId, Hash>,
}

impl Default for FakeBackingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackingStore {
    pub fn new() -> Self {
        Self { trees: Store::new(), blobs: Store::new(), root_trees: Store::new() }
    }

    /// Computes a deterministic hash for `entries` and stores the tree
    /// under it, pending until [`trigger_tree`](Self::trigger_tree) or
    /// [`mark_tree_ready`](Self::mark_tree_ready) is called. Fails with
    /// [`Error::AlreadyExists`] if a tree is already stored under the
    /// same hash.
    pub fn put_tree(&self, entries: Vec<TreeEntry>) -> Result<Arc<Tree>> {
        let hash = compute_tree_hash(&entries);
        let tree = Arc::new(Tree::new(hash, entries)?);
        self.trees.put(hash, tree.clone())?;
        Ok(tree)
    }

    /// Like [`put_tree`](Self::put_tree), but the tree resolves
    /// immediately on every `get_tree` call — convenient for glob
    /// evaluation tests that don't care about fetch interleaving.
    pub fn put_ready_tree(&self, entries: Vec<TreeEntry>) -> Result<Arc<Tree>> {
        let hash = compute_tree_hash(&entries);
        let tree = Arc::new(Tree::new(hash, entries)?);
        self.trees.put_ready(hash, tree.clone())?;
        Ok(tree)
    }

    /// Like [`put_tree`](Self::put_tree), but leaves an existing tree at
    /// the same hash untouched. Returns whether a new tree was inserted.
    pub fn maybe_put_tree(&self, entries: Vec<TreeEntry>) -> Result<(Arc<Tree>, bool)> {
        let hash = compute_tree_hash(&entries);
        let tree = Arc::new(Tree::new(hash, entries)?);
        Ok(self.trees.maybe_put(hash, tree))
    }

    /// Stores `data` as a blob, pending until triggered or marked ready.
    /// Fails with [`Error::AlreadyExists`] if the same content (and
    /// therefore the same hash) is already stored.
    pub fn put_blob(&self, data: Vec<u8>) -> Result<Arc<Blob>> {
        let hash = Hash::sha1(&data);
        let blob = Arc::new(Blob::new(hash, data));
        self.blobs.put(hash, blob.clone())?;
        Ok(blob)
    }

    /// Like [`put_blob`](Self::put_blob), but resolves immediately on
    /// every `get_blob` call.
    pub fn put_ready_blob(&self, data: Vec<u8>) -> Result<Arc<Blob>> {
        let hash = Hash::sha1(&data);
        let blob = Arc::new(Blob::new(hash, data));
        self.blobs.put_ready(hash, blob.clone())?;
        Ok(blob)
    }

    pub fn maybe_put_blob(&self, data: Vec<u8>) -> (Arc<Blob>, bool) {
        let hash = Hash::sha1(&data);
        let blob = Arc::new(Blob::new(hash, data));
        self.blobs.maybe_put(hash, blob)
    }

    /// Records that `root` currently points at the tree identified by
    /// `tree_hash`. The tree itself must separately be `put_tree`d.
    pub fn put_root_tree(&self, root: RootId, tree_hash: Hash) -> Result<()> {
        self.root_trees.put(root, Arc::new(tree_hash))
    }

    /// Like [`put_root_tree`](Self::put_root_tree), ready immediately.
    pub fn put_ready_root_tree(&self, root: RootId, tree_hash: Hash) -> Result<()> {
        self.root_trees.put_ready(root, Arc::new(tree_hash))
    }

    pub fn trigger_tree(&self, hash: &Hash) {
        self.trees.trigger(hash);
    }

    pub fn trigger_tree_error(&self, hash: &Hash, err: Error) {
        self.trees.trigger_error(hash, err);
    }

    pub fn trigger_blob(&self, hash: &Hash) {
        self.blobs.trigger(hash);
    }

    pub fn trigger_blob_error(&self, hash: &Hash, err: Error) {
        self.blobs.trigger_error(hash, err);
    }

    pub fn trigger_root_tree(&self, root: &RootId) {
        self.root_trees.trigger(root);
    }

    pub fn trigger_root_tree_error(&self, root: &RootId, err: Error) {
        self.root_trees.trigger_error(root, err);
    }

    pub fn mark_tree_ready(&self, hash: &Hash) {
        self.trees.mark_ready(hash);
    }

    pub fn mark_blob_ready(&self, hash: &Hash) {
        self.blobs.mark_ready(hash);
    }

    pub fn mark_root_tree_ready(&self, root: &RootId) {
        self.root_trees.mark_ready(root);
    }

    /// Drops every outstanding promise across all three tables.
    pub fn discard_outstanding(&self) {
        self.trees.discard_outstanding();
        self.blobs.discard_outstanding();
        self.root_trees.discard_outstanding();
    }

    pub fn tree_access_count(&self, hash: &Hash) -> u64 {
        self.trees.access_count(hash)
    }

    pub fn blob_access_count(&self, hash: &Hash) -> u64 {
        self.blobs.access_count(hash)
    }

    pub fn get_stored_tree(&self, hash: &Hash) -> Option<Arc<Tree>> {
        self.trees.get_stored(hash)
    }

    pub fn get_stored_blob(&self, hash: &Hash) -> Option<Arc<Blob>> {
        self.blobs.get_stored(hash)
    }
}

#[async_trait]
impl BackingStore for FakeBackingStore {
    fn parse_root_id(&self, value: &str) -> Result<RootId> {
        RootId::new(value)
    }

    fn render_root_id(&self, root: &RootId) -> String {
        root.value().to_string()
    }

    async fn get_root_tree(&self, root: &RootId) -> Result<Arc<Tree>> {
        let (tree_hash, _origin) = self.root_trees.get(root).await?;
        let (tree, _origin) = self.trees.get(&tree_hash).await?;
        Ok(tree)
    }

    async fn get_tree(&self, hash: &Hash) -> Result<(Arc<Tree>, Origin)> {
        self.trees.get(hash).await
    }

    async fn get_blob(&self, hash: &Hash) -> Result<(Arc<Blob>, Origin)> {
        self.blobs.get(hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;

    #[tokio::test]
    async fn get_waits_for_explicit_trigger() {
        let store = Arc::new(FakeBackingStore::new());
        let blob = store.put_blob(b"hello".to_vec()).unwrap();
        let hash = blob.hash();

        let store2 = store.clone();
        let fetch = tokio::spawn(async move { store2.get_blob(&hash).await });

        tokio::task::yield_now().await;
        assert_eq!(store.blob_access_count(&hash), 1);
        store.trigger_blob(&hash);

        let (fetched, origin) = fetch.await.unwrap().unwrap();
        assert_eq!(fetched.data(), b"hello");
        assert_eq!(origin, Origin::Remote);
    }

    #[tokio::test]
    async fn ready_object_resolves_without_a_trigger() {
        let store = FakeBackingStore::new();
        let blob = store.put_ready_blob(b"hi".to_vec()).unwrap();
        let (fetched, origin) = store.get_blob(&blob.hash()).await.unwrap();
        assert_eq!(fetched.data(), b"hi");
        assert_eq!(origin, Origin::Memory);
    }

    #[tokio::test]
    async fn trigger_error_fails_the_waiter() {
        let store = Arc::new(FakeBackingStore::new());
        let blob = store.put_blob(b"x".to_vec()).unwrap();
        let hash = blob.hash();

        let store2 = store.clone();
        let fetch = tokio::spawn(async move { store2.get_blob(&hash).await });
        tokio::task::yield_now().await;
        store.trigger_blob_error(&hash, Error::Transport("disconnected".to_string()));

        assert!(matches!(fetch.await.unwrap(), Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn discard_outstanding_breaks_pending_promises() {
        let store = Arc::new(FakeBackingStore::new());
        let blob = store.put_blob(b"x".to_vec()).unwrap();
        let hash = blob.hash();

        let store2 = store.clone();
        let fetch = tokio::spawn(async move { store2.get_blob(&hash).await });
        tokio::task::yield_now().await;
        store.discard_outstanding();

        assert!(matches!(fetch.await.unwrap(), Err(Error::BrokenPromise)));
    }

    #[tokio::test]
    async fn get_without_put_fails_fast_not_found() {
        let store = FakeBackingStore::new();
        let hash = Hash::sha1(b"missing");
        let result = store.get_blob(&hash).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(store.blob_access_count(&hash), 1);
    }

    #[tokio::test]
    async fn access_count_increments_on_miss_before_not_found() {
        let store = FakeBackingStore::new();
        let hash = Hash::sha1(b"also-missing");
        assert_eq!(store.tree_access_count(&hash), 0);

        let result = store.get_tree(&hash).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(store.tree_access_count(&hash), 1);

        let result = store.get_tree(&hash).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(store.tree_access_count(&hash), 2);
    }

    #[test]
    fn tree_hash_is_order_independent() {
        let entries_a = vec![
            TreeEntry::new("a", Hash::sha1(b"a"), EntryKind::RegularFile).unwrap(),
            TreeEntry::new("b", Hash::sha1(b"b"), EntryKind::RegularFile).unwrap(),
        ];
        let entries_b = vec![
            TreeEntry::new("b", Hash::sha1(b"b"), EntryKind::RegularFile).unwrap(),
            TreeEntry::new("a", Hash::sha1(b"a"), EntryKind::RegularFile).unwrap(),
        ];
        assert_eq!(compute_tree_hash(&entries_a), compute_tree_hash(&entries_b));
    }

    #[test]
    fn maybe_put_blob_does_not_overwrite() {
        let store = FakeBackingStore::new();
        let (first, inserted_first) = store.maybe_put_blob(b"same".to_vec());
        let (second, inserted_second) = store.maybe_put_blob(b"same".to_vec());
        assert!(inserted_first);
        assert!(!inserted_second);
        assert_eq!(first.hash(), second.hash());
    }

    #[test]
    fn put_blob_rejects_double_insert() {
        let store = FakeBackingStore::new();
        store.put_blob(b"dup".to_vec()).unwrap();
        assert!(matches!(store.put_blob(b"dup".to_vec()), Err(Error::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn root_tree_resolves_through_two_independent_triggers() {
        let store = Arc::new(FakeBackingStore::new());
        let entries = vec![TreeEntry::new("f", Hash::sha1(b"f"), EntryKind::RegularFile).unwrap()];
        let tree = store.put_tree(entries).unwrap();
        let root = RootId::new("rev1").unwrap();
        store.put_root_tree(root.clone(), tree.hash()).unwrap();

        let store2 = store.clone();
        let root2 = root.clone();
        let fetch = tokio::spawn(async move { store2.get_root_tree(&root2).await });
        tokio::task::yield_now().await;

        store.trigger_root_tree(&root);
        tokio::task::yield_now().await;
        store.trigger_tree(&tree.hash());

        let fetched = fetch.await.unwrap().unwrap();
        assert_eq!(fetched.hash(), tree.hash());
    }
}
