//! The `SNAPSHOT` binary record: the parent commit a mount currently
//! points at.
//!
//! Layout (big-endian multi-byte integers):
//!
//! ```text
//! offset 0  : 4 bytes  magic "eden"
//! offset 4  : 4 bytes  uint32 version
//! offset 8  : body
//! ```
//!
//! Version 1's body is 20 or 40 raw hash bytes (a second parent, present
//! only for a merge commit, is read but never used). Version 2's body is
//! a 4-byte big-endian length followed by exactly that many bytes, taken
//! verbatim as the [`RootId`]'s string value. Only version 2 is ever
//! written; both are accepted on read.

use std::io::Write as _;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::hash::{Hash, RootId};

const MAGIC: &[u8; 4] = b"eden";
const HEADER_SIZE: usize = 8;
const VERSION_1: u32 = 1;
const VERSION_2: u32 = 2;

/// Reads and decodes the `SNAPSHOT` file at `path`, returning the parent
/// commit it records.
///
/// Fails with [`Error::BadSnapshot`] if the file is shorter than the
/// header, the magic does not match, the version is unrecognized, or a
/// version-1 body is not 20 or 40 bytes.
pub fn read(path: &Path) -> Result<RootId> {
    let contents = std::fs::read(path)
        .map_err(|e| Error::BadSnapshot(format!("cannot read {}: {e}", path.display())))?;
    match decode(&contents) {
        Ok(root) => {
            tracing::debug!(path = %path.display(), root = %root.value(), "read snapshot");
            Ok(root)
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "failed to decode snapshot");
            Err(err)
        }
    }
}

fn decode(contents: &[u8]) -> Result<RootId> {
    if contents.len() < HEADER_SIZE {
        return Err(Error::BadSnapshot(format!(
            "file is too short ({} bytes, need at least {HEADER_SIZE})",
            contents.len()
        )));
    }

    if &contents[0..4] != MAGIC {
        return Err(Error::BadSnapshot("missing 'eden' magic".to_string()));
    }

    let version = BigEndian::read_u32(&contents[4..8]);
    let body = &contents[HEADER_SIZE..];

    match version {
        VERSION_1 => decode_v1(body),
        VERSION_2 => decode_v2(body),
        other => Err(Error::BadSnapshot(format!("unsupported snapshot version {other}"))),
    }
}

fn decode_v1(body: &[u8]) -> Result<RootId> {
    use crate::hash::RAW_SIZE;

    if body.len() != RAW_SIZE && body.len() != RAW_SIZE * 2 {
        return Err(Error::BadSnapshot(format!(
            "unexpected version-1 body length ({} bytes)",
            body.len()
        )));
    }

    // SNAPSHOT v1 stores the parent as a raw hash; RootId prefers the
    // inflated hex form. A second parent, if present, is discarded: see
    // the second parent is observably and permanently lost on every round trip.
    let parent = Hash::from_slice(&body[..RAW_SIZE])?;
    RootId::new(parent.to_hex())
}

fn decode_v2(body: &[u8]) -> Result<RootId> {
    if body.len() < 4 {
        return Err(Error::BadSnapshot("version-2 body missing length prefix".to_string()));
    }
    let len = BigEndian::read_u32(&body[0..4]) as usize;
    let rest = &body[4..];
    if rest.len() != len {
        return Err(Error::BadSnapshot(format!(
            "version-2 body declares {len} bytes but {} are present",
            rest.len()
        )));
    }
    let value = String::from_utf8(rest.to_vec())
        .map_err(|e| Error::BadSnapshot(format!("root id is not valid UTF-8: {e}")))?;
    RootId::new(value)
}

/// Encodes `parent` as a version-2 `SNAPSHOT` record and atomically
/// replaces the file at `path` (write to a sibling temporary file, then
/// rename) so the file is always either the old or the new content,
/// never partial.
pub fn write(path: &Path, parent: &RootId) -> Result<()> {
    let body = parent.value().as_bytes();

    let mut buf = Vec::with_capacity(HEADER_SIZE + 4 + body.len());
    buf.extend_from_slice(MAGIC);
    let mut version_bytes = [0u8; 4];
    BigEndian::write_u32(&mut version_bytes, VERSION_2);
    buf.extend_from_slice(&version_bytes);
    let mut len_bytes = [0u8; 4];
    BigEndian::write_u32(&mut len_bytes, body.len() as u32);
    buf.extend_from_slice(&len_bytes);
    buf.extend_from_slice(body);

    write_atomic(path, &buf)?;
    tracing::debug!(path = %path.display(), root = %parent.value(), "wrote snapshot");
    Ok(())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        Error::BadSnapshot(format!("snapshot path {} has no parent directory", path.display()))
    })?;
    let mut tmp_path = dir.to_path_buf();
    tmp_path.push(format!(
        ".{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("SNAPSHOT")
    ));

    let write_result = (|| -> std::io::Result<()> {
        let mut tmp_file = std::fs::File::create(&tmp_path)?;
        tmp_file.write_all(contents)?;
        tmp_file.sync_all()?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    })();
    write_result.map_err(|e| Error::BadSnapshot(format!("cannot write {}: {e}", path.display())))
}
