//! Shared error type for the mount core.
//!
//! Every fallible operation across the snapshot codec, config loader,
//! glob engine, and backing store returns [`Result`]. The kinds below are
//! the closed set from the error handling design: input-format errors are
//! always synchronous, `not-found`/`already-exists` may be either, and
//! `transport`/`broken-promise` only ever reach a caller asynchronously.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds a mount core operation can fail with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The on-disk SNAPSHOT record failed header, length, or version
    /// validation. Carries a short explanation for `tracing` call sites.
    BadSnapshot(String),
    /// `config.toml` or `config.json` failed to parse or was missing a
    /// required key.
    BadConfig(String),
    /// A glob pattern token was not a valid path component, or the
    /// compiled matcher rejected the pattern.
    BadPattern(String),
    /// The requested object (tree, blob, or commit) does not exist in the
    /// backing store.
    NotFound(String),
    /// A `RootId` string failed the backing store's own validation.
    InvalidRoot(String),
    /// A byte string was the wrong length or contained non-hex
    /// characters for a [`crate::hash::Hash`].
    InvalidHash(String),
    /// A caller tried to insert an object that is already present under
    /// the same key.
    AlreadyExists(String),
    /// A pending fetch's completion promise was dropped before it was
    /// fulfilled (only produced by the fake backing store's
    /// `discard_outstanding` path).
    BrokenPromise,
    /// A transient failure talking to the remote backing store. Safe to
    /// retry at the caller's discretion.
    Transport(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadSnapshot(msg) => write!(f, "bad snapshot: {msg}"),
            Error::BadConfig(msg) => write!(f, "bad config: {msg}"),
            Error::BadPattern(msg) => write!(f, "bad glob pattern: {msg}"),
            Error::NotFound(msg) => write!(f, "not found: {msg}"),
            Error::InvalidRoot(msg) => write!(f, "invalid root id: {msg}"),
            Error::InvalidHash(msg) => write!(f, "invalid hash: {msg}"),
            Error::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            Error::BrokenPromise => write!(f, "broken promise: waiter dropped before completion"),
            Error::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::BadConfig(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::BadConfig(err.to_string())
    }
}

impl From<globset::Error> for Error {
    fn from(err: globset::Error) -> Self {
        Error::BadPattern(err.to_string())
    }
}
