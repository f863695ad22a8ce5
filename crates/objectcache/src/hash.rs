//! Digest: a SHA-512 content hash (64 bytes, 128 hex chars).
//!
//! Hashing is streamed through a fixed-size buffer, so arbitrarily large
//! files can be addressed without holding them in memory.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Number of bytes in a digest.
pub const DIGEST_LEN: usize = 64;

/// Hex characters used for each directory level of an object path.
const LEVEL_CHARS: usize = 2;

/// Directory levels above the object file.
const LEVELS: usize = 2;

/// A content digest - 512 bits of SHA-512.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_LEN]);

/// Errors that can occur when parsing digests.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("invalid digest length: expected 128 hex chars, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character in digest")]
    InvalidHex,
}

impl Digest {
    /// Hash an in-memory buffer.
    pub fn from_data(data: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(data);
        Self::from_hasher(hasher)
    }

    /// Hash everything the reader yields.
    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha512::new();
        io::copy(&mut reader, &mut hasher)?;
        Ok(Self::from_hasher(hasher))
    }

    /// Hash the contents of a file.
    pub fn from_file(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(io::BufReader::new(file))
    }

    fn from_hasher(hasher: Sha512) -> Self {
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }

    /// Parse a digest from its hex form.
    pub fn from_str_checked(s: &str) -> Result<Self, HashError> {
        if s.len() != DIGEST_LEN * 2 {
            return Err(HashError::InvalidLength(s.len()));
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| HashError::InvalidHex)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Relative path of the object file for this digest.
    ///
    /// The hex form is split into two directory levels of two characters
    /// each, and the remaining 124 characters name the file:
    /// `ab/cd/ef0123...`. Each directory holds at most 256 children.
    pub fn object_path(&self) -> PathBuf {
        let hex = self.to_hex();
        let mut path = PathBuf::new();
        for level in 0..LEVELS {
            path.push(&hex[level * LEVEL_CHARS..(level + 1) * LEVEL_CHARS]);
        }
        path.push(&hex[LEVELS * LEVEL_CHARS..]);
        path
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl FromStr for Digest {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_checked(s)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
