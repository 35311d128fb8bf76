//! A backing store with no content at all.
//!
//! Grounded on `eden/fs/store/EmptyBackingStore.h`: useful for tests and
//! for mounts that are expected never to need history, every fetch
//! simply fails with [`Error::NotFound`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::hash::{Hash, RootId};
use crate::model::{Blob, Tree};
use crate::store::{BackingStore, Origin};

#[derive(Debug, Default)]
pub struct EmptyBackingStore;

impl EmptyBackingStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BackingStore for EmptyBackingStore {
    fn parse_root_id(&self, value: &str) -> Result<RootId> {
        RootId::new(value)
    }

    fn render_root_id(&self, root: &RootId) -> String {
        root.value().to_string()
    }

    async fn get_root_tree(&self, root: &RootId) -> Result<Arc<Tree>> {
        Err(Error::NotFound(format!("empty backing store has no root tree for {root}")))
    }

    async fn get_tree(&self, hash: &Hash) -> Result<(Arc<Tree>, Origin)> {
        Err(Error::NotFound(format!("empty backing store has no tree {hash}")))
    }

    async fn get_blob(&self, hash: &Hash) -> Result<(Arc<Blob>, Origin)> {
        Err(Error::NotFound(format!("empty backing store has no blob {hash}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_fetch_fails_not_found() {
        let store = EmptyBackingStore::new();
        let root = RootId::new("r").unwrap();
        assert!(matches!(store.get_root_tree(&root).await, Err(Error::NotFound(_))));
        assert!(matches!(store.get_tree(&Hash::sha1(b"x")).await, Err(Error::NotFound(_))));
        assert!(matches!(store.get_blob(&Hash::sha1(b"x")).await, Err(Error::NotFound(_))));
    }

    #[test]
    fn root_id_parsing_round_trips() {
        let store = EmptyBackingStore::new();
        let root = store.parse_root_id("deadbeef").unwrap();
        assert_eq!(store.render_root_id(&root), "deadbeef");
    }
}
