//! The caching layer between the rest of the core and a raw
//! [`BackingStore`], grounded on `eden/fs/store/IObjectStore.h`.

use std::sync::Arc;

use moka::sync::Cache;

use crate::error::Result;
use crate::hash::{Hash, RootId};
use crate::model::{Blob, Tree};
use crate::store::{BackingStore, FetchPriority, Origin};

/// Per-request metadata threaded through a fetch: who is asking, and how
/// urgently. The cache itself does not look at either field; they exist
/// so a real backend can use them for request shaping and logging.
#[derive(Debug, Clone)]
pub struct FetchContext {
    priority: FetchPriority,
    identity: Option<String>,
}

impl FetchContext {
    pub fn new(priority: FetchPriority, identity: Option<String>) -> Self {
        Self { priority, identity }
    }

    pub fn priority(&self) -> FetchPriority {
        self.priority
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }
}

impl Default for FetchContext {
    fn default() -> Self {
        Self { priority: FetchPriority::default(), identity: None }
    }
}

/// Caches [`Tree`]s and [`Blob`]s behind a [`BackingStore`] so repeated
/// lookups of the same object never cross the backing store boundary
/// twice. Concurrent requests for the same still-uncached object are not
/// deduplicated beyond what the backing store itself does — `moka`'s
/// `get_with` handles that collapsing for us.
pub struct ObjectStore {
    backing: Arc<dyn BackingStore>,
    trees: Cache<Hash, Arc<Tree>>,
    blobs: Cache<Hash, Arc<Blob>>,
}

impl ObjectStore {
    pub fn new(backing: Arc<dyn BackingStore>) -> Self {
        Self::with_capacity(backing, 64 * 1024, 64 * 1024)
    }

    pub fn with_capacity(backing: Arc<dyn BackingStore>, tree_capacity: u64, blob_capacity: u64) -> Self {
        Self {
            backing,
            trees: Cache::new(tree_capacity),
            blobs: Cache::new(blob_capacity),
        }
    }

    /// Fetches the tree at the root of `root`. Not cached by root id,
    /// since a root maps to a tree hash that is itself cached once
    /// resolved; a second call with the same root still asks the
    /// backing store which tree it currently points at.
    pub async fn get_root_tree(&self, root: &RootId, _ctx: &FetchContext) -> Result<Arc<Tree>> {
        let tree = self.backing.get_root_tree(root).await?;
        self.trees.insert(tree.hash(), tree.clone());
        Ok(tree)
    }

    /// Fetches a tree by hash, serving from cache when possible. The
    /// returned [`Origin`] reports [`Origin::Memory`] on a cache hit;
    /// otherwise it is whatever the backing store reports for the fetch.
    pub async fn get_tree(&self, hash: &Hash, ctx: &FetchContext) -> Result<(Arc<Tree>, Origin)> {
        if let Some(tree) = self.trees.get(hash) {
            tracing::trace!(%hash, "tree cache hit");
            return Ok((tree, Origin::Memory));
        }
        tracing::debug!(%hash, priority = ?ctx.priority(), "fetching tree from backing store");
        let (tree, origin) = self.backing.get_tree(hash).await.map_err(|err| {
            tracing::warn!(%hash, %err, "tree fetch failed");
            err
        })?;
        self.trees.insert(*hash, tree.clone());
        Ok((tree, origin))
    }

    /// Fetches a blob by hash, serving from cache when possible. The
    /// returned [`Origin`] reports [`Origin::Memory`] on a cache hit;
    /// otherwise it is whatever the backing store reports for the fetch.
    pub async fn get_blob(&self, hash: &Hash, ctx: &FetchContext) -> Result<(Arc<Blob>, Origin)> {
        if let Some(blob) = self.blobs.get(hash) {
            tracing::trace!(%hash, "blob cache hit");
            return Ok((blob, Origin::Memory));
        }
        tracing::debug!(%hash, priority = ?ctx.priority(), "fetching blob from backing store");
        let (blob, origin) = self.backing.get_blob(hash).await.map_err(|err| {
            tracing::warn!(%hash, %err, "blob fetch failed");
            err
        })?;
        self.blobs.insert(*hash, blob.clone());
        Ok((blob, origin))
    }

    /// Fetches every blob in `hashes` concurrently, populating the cache
    /// as each completes. Used ahead of a bulk read to warm the cache
    /// before the caller actually needs the data.
    pub async fn prefetch_blobs(&self, hashes: &[Hash], ctx: &FetchContext) -> Vec<Result<Arc<Blob>>> {
        let mut tasks = tokio::task::JoinSet::new();
        for hash in hashes.iter().copied() {
            let _ctx = ctx.clone();
            let backing = self.backing.clone();
            let blobs = self.blobs.clone();
            tasks.spawn(async move {
                if let Some(blob) = blobs.get(&hash) {
                    return Ok(blob);
                }
                let (blob, _origin) = backing.get_blob(&hash).await?;
                blobs.insert(hash, blob.clone());
                Ok(blob)
            });
        }

        let mut results = Vec::with_capacity(hashes.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(_) => results.push(Err(crate::error::Error::BrokenPromise)),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryKind, TreeEntry};
    use crate::store::FakeBackingStore;

    fn object_store() -> (Arc<FakeBackingStore>, ObjectStore) {
        let fake = Arc::new(FakeBackingStore::new());
        let store = ObjectStore::new(fake.clone());
        (fake, store)
    }

    #[tokio::test]
    async fn get_blob_caches_after_first_fetch() {
        let (fake, store) = object_store();
        let blob = fake.put_blob(b"cached".to_vec()).unwrap();
        let hash = blob.hash();
        let ctx = FetchContext::default();

        let store = Arc::new(store);
        let store2 = store.clone();
        let fetch = tokio::spawn(async move { store2.get_blob(&hash, &ctx).await });
        tokio::task::yield_now().await;
        fake.trigger_blob(&hash);
        let (fetched, origin) = fetch.await.unwrap().unwrap();
        assert_eq!(fetched.data(), b"cached");
        assert_eq!(origin, Origin::Remote);
        assert_eq!(fake.blob_access_count(&hash), 1);

        let ctx = FetchContext::default();
        let (second, second_origin) = store.get_blob(&hash, &ctx).await.unwrap();
        assert_eq!(second.data(), b"cached");
        assert_eq!(second_origin, Origin::Memory);
        // second call hit the object store's own cache, not the backing store
        assert_eq!(fake.blob_access_count(&hash), 1);
    }

    #[tokio::test]
    async fn prefetch_blobs_populates_cache() {
        let (fake, store) = object_store();
        let first = fake.put_blob(b"one".to_vec()).unwrap();
        let second = fake.put_blob(b"two".to_vec()).unwrap();
        let hashes = vec![first.hash(), second.hash()];
        let ctx = FetchContext::default();

        let fake2 = fake.clone();
        let hashes2 = hashes.clone();
        let trigger = tokio::spawn(async move {
            tokio::task::yield_now().await;
            for hash in hashes2 {
                fake2.trigger_blob(&hash);
            }
        });

        let results = store.prefetch_blobs(&hashes, &ctx).await;
        trigger.await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn tree_entry_hash_helper_is_correct() {
        let (fake, _store) = object_store();
        let entries = vec![TreeEntry::new("a", Hash::sha1(b"a"), EntryKind::RegularFile).unwrap()];
        let tree = fake.put_tree(entries).unwrap();
        assert_eq!(fake.get_stored_tree(&tree.hash()).unwrap().hash(), tree.hash());
    }
}
