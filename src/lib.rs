//! The on-demand content layer of a source-control-backed virtual
//! filesystem mount: snapshot/config persistence, the content-addressed
//! object model, a deterministic test backing store, and the glob
//! evaluation engine that walks it.

pub mod config;
pub mod error;
pub mod fs;
pub mod glob;
pub mod hash;
pub mod model;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
