//! Content-addressed, immutable [`Blob`]s and [`Tree`]s.

use num_derive::{FromPrimitive, ToPrimitive};

use crate::error::{Error, Result};
use crate::hash::Hash;

/// Immutable byte contents of a file, content-addressed by [`Hash`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    hash: Hash,
    data: Vec<u8>,
}

impl Blob {
    pub fn new(hash: Hash, data: Vec<u8>) -> Self {
        Self { hash, data }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// The kind of object a [`TreeEntry`] points to.
///
/// Derives `FromPrimitive`/`ToPrimitive` the way NFS wire-type
/// discriminants are handled elsewhere in this codebase, here used to
/// turn a kind into the POSIX-style mode byte the fake backing store
/// folds into its tree hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum EntryKind {
    RegularFile = 0,
    ExecutableFile = 1,
    Symlink = 2,
    Tree = 3,
}

impl EntryKind {
    /// Returns true if this entry points at a subtree rather than file
    /// content.
    pub fn is_tree(self) -> bool {
        matches!(self, EntryKind::Tree)
    }

    /// The POSIX-ish mode value folded into the fake backing store's
    /// deterministic tree hash: SHA-1 over concatenated
    /// `(name ∥ child-hash ∥ mode)` for every sorted entry.
    pub fn mode(self) -> u32 {
        match self {
            EntryKind::RegularFile => 0o100644,
            EntryKind::ExecutableFile => 0o100755,
            EntryKind::Symlink => 0o120000,
            EntryKind::Tree => 0o040000,
        }
    }
}

/// Checks that `name` is a valid single path component: non-empty, no
/// `/`, no `NUL`. Reuses [`Error::BadPattern`] rather than a dedicated
/// kind, since the same "not a valid path component" check also governs
/// glob compilation and the error kinds form a single closed set.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::BadPattern("path component must not be empty".to_string()));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(Error::BadPattern(format!(
            "{name:?} is not a single path component"
        )));
    }
    Ok(())
}

/// A single record within a [`Tree`]: a name, the hash of the child it
/// points to, and its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    name: String,
    hash: Hash,
    kind: EntryKind,
}

impl TreeEntry {
    pub fn new(name: impl Into<String>, hash: Hash, kind: EntryKind) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self { name, hash, kind })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_tree(&self) -> bool {
        self.kind.is_tree()
    }
}

/// An ordered, name-unique list of [`TreeEntry`], content-addressed by
/// its own [`Hash`].
///
/// Iteration order always equals ascending-by-name sort order;
/// [`Tree::new`] enforces this on construction rather than trusting the
/// caller, since it is cheap and the invariant is relied on throughout
/// the glob evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    hash: Hash,
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Builds a `Tree`, sorting `entries` by name. Fails with
    /// [`Error::AlreadyExists`] if two entries share a name — the data
    /// model requires name-uniqueness within a directory, and a second
    /// entry under a name already taken is exactly what that error kind
    /// means elsewhere in the store.
    pub fn new(hash: Hash, mut entries: Vec<TreeEntry>) -> Result<Self> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        for window in entries.windows(2) {
            if window[0].name == window[1].name {
                return Err(Error::AlreadyExists(format!(
                    "duplicate tree entry name {:?}",
                    window[0].name
                )));
            }
        }
        Ok(Self { hash, entries })
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Looks up a single entry by exact name via binary search (entries
    /// are always sorted).
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|entry| entry.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.entries[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, kind: EntryKind) -> TreeEntry {
        TreeEntry::new(name, Hash::sha1(name.as_bytes()), kind).unwrap()
    }

    #[test]
    fn sorts_entries_on_construction() {
        let entries = vec![
            entry("b", EntryKind::RegularFile),
            entry("a", EntryKind::RegularFile),
        ];
        let tree = Tree::new(Hash::sha1(b"tree"), entries).unwrap();
        let names: Vec<&str> = tree.entries().iter().map(TreeEntry::name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn rejects_duplicate_names() {
        let entries = vec![
            entry("a", EntryKind::RegularFile),
            entry("a", EntryKind::Tree),
        ];
        assert!(Tree::new(Hash::sha1(b"tree"), entries).is_err());
    }

    #[test]
    fn get_finds_entry_by_name() {
        let entries = vec![entry("a", EntryKind::RegularFile), entry("b", EntryKind::Tree)];
        let tree = Tree::new(Hash::sha1(b"tree"), entries).unwrap();
        assert!(tree.get("b").unwrap().is_tree());
        assert!(tree.get("missing").is_none());
    }

    #[test]
    fn validate_name_rejects_slash_and_empty() {
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("ok").is_ok());
    }
}
