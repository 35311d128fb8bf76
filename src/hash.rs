//! Content identifiers: the fixed-width [`Hash`] and the opaque [`RootId`].

use std::fmt;

use digest::Digest;
use sha1::Sha1;

use crate::error::{Error, Result};

/// Width in bytes of every [`Hash`] in this core. The backing store
/// interface is specified against this fixed width; there is no
/// pluggable hash algorithm.
pub const RAW_SIZE: usize = 20;

/// A 20-byte content identifier for a [`crate::model::Blob`] or
/// [`crate::model::Tree`].
///
/// Equality and ordering are defined on the raw binary form, per the data
/// model: two hashes with different hex casing never arise
/// because [`Hash::to_hex`] always renders lowercase, but if they did,
/// comparison would still only look at `bytes`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash {
    bytes: [u8; RAW_SIZE],
}

impl Hash {
    /// Builds a `Hash` from a raw 20-byte array. Infallible because the
    /// array's length is checked by the type system.
    pub fn from_bytes(bytes: [u8; RAW_SIZE]) -> Self {
        Self { bytes }
    }

    /// Builds a `Hash` from a byte slice, failing with
    /// [`Error::InvalidHash`] if it is not exactly [`RAW_SIZE`] bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != RAW_SIZE {
            return Err(Error::InvalidHash(format!(
                "expected {RAW_SIZE} bytes, got {}",
                slice.len()
            )));
        }
        let mut bytes = [0u8; RAW_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self { bytes })
    }

    /// Parses a lowercase or uppercase hex string into a `Hash`, failing
    /// with [`Error::InvalidHash`] on a bad length or non-hex character.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != RAW_SIZE * 2 {
            return Err(Error::InvalidHash(format!(
                "expected {} hex characters, got {}",
                RAW_SIZE * 2,
                hex.len()
            )));
        }

        let mut bytes = [0u8; RAW_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &hex[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16)
                .map_err(|_| Error::InvalidHash(format!("non-hex byte at offset {i}: {pair}")))?;
        }
        Ok(Self { bytes })
    }

    /// Returns the raw binary form.
    pub fn as_bytes(&self) -> &[u8; RAW_SIZE] {
        &self.bytes
    }

    /// Renders as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(RAW_SIZE * 2);
        for byte in &self.bytes {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// Computes the SHA-1 digest over `data` and wraps it in a `Hash`.
    pub fn sha1(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; RAW_SIZE];
        bytes.copy_from_slice(&digest);
        Self { bytes }
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// An opaque, printable identifier for a source-control revision.
///
/// The backing store owns parsing and rendering; the core
/// only ever stores and compares the string form.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RootId {
    value: String,
}

/// Upper bound on a [`RootId`]'s byte length, per the data model.
pub const ROOT_ID_MAX_LEN: u64 = u32::MAX as u64;

impl RootId {
    /// Wraps a non-empty string as a `RootId`, failing with
    /// [`Error::InvalidRoot`] if it is empty or exceeds
    /// [`ROOT_ID_MAX_LEN`] bytes.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::InvalidRoot("root id must not be empty".to_string()));
        }
        if value.len() as u64 > ROOT_ID_MAX_LEN {
            return Err(Error::InvalidRoot(format!(
                "root id of {} bytes exceeds the {} byte limit",
                value.len(),
                ROOT_ID_MAX_LEN
            )));
        }
        Ok(Self { value })
    }

    /// Returns the string form.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootId({:?})", self.value)
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let bytes = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
            0x0f, 0x10, 0x11, 0x12, 0x13, 0x14,
        ];
        let hash = Hash::from_bytes(bytes);
        let hex = hash.to_hex();
        assert_eq!(hex, "0102030405060708090a0b0c0d0e0f1011121314");
        assert_eq!(Hash::from_hex(&hex).unwrap(), hash);
    }

    #[test]
    fn from_hex_rejects_bad_length() {
        assert!(matches!(Hash::from_hex("abcd"), Err(Error::InvalidHash(_))));
    }

    #[test]
    fn from_hex_rejects_bad_alphabet() {
        let bad = "g".repeat(RAW_SIZE * 2);
        assert!(matches!(Hash::from_hex(&bad), Err(Error::InvalidHash(_))));
    }

    #[test]
    fn from_slice_rejects_bad_length() {
        assert!(matches!(Hash::from_slice(&[0u8; 19]), Err(Error::InvalidHash(_))));
    }

    #[test]
    fn sha1_is_deterministic() {
        let a = Hash::sha1(b"hello world");
        let b = Hash::sha1(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, Hash::sha1(b"hello worlds"));
    }

    #[test]
    fn ordering_is_on_raw_bytes() {
        let low = Hash::from_bytes([0u8; RAW_SIZE]);
        let mut high_bytes = [0u8; RAW_SIZE];
        high_bytes[0] = 1;
        let high = Hash::from_bytes(high_bytes);
        assert!(low < high);
    }

    #[test]
    fn root_id_rejects_empty() {
        assert!(matches!(RootId::new(""), Err(Error::InvalidRoot(_))));
    }

    #[test]
    fn root_id_round_trips_value() {
        let id = RootId::new("abc123").unwrap();
        assert_eq!(id.value(), "abc123");
    }
}
