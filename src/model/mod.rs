//! Tree entries, directory entries, and the materialization overlay.

mod dir;
mod tree;

pub use dir::{DirContents, DirEntry, Inode};
pub use tree::{validate_name, Blob, EntryKind, Tree, TreeEntry};
