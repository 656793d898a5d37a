//! Job payloads and their fingerprints.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};

/// An opaque unit of work.
///
/// No schema is imposed on the payload; two jobs are equal iff their bytes are
/// equal. Serialization of structured work is the producer's concern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Job(Vec<u8>);

impl Job {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self(payload.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable identity of this payload, used as the lease key suffix.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.0)
    }
}

impl From<Vec<u8>> for Job {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for Job {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<&str> for Job {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for Job {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl AsRef<[u8]> for Job {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Lowercase hex SHA-224 digest of a job payload.
///
/// Only ever used as a lookup key; it is never decoded back into a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of the hex-encoded digest.
    pub const HEX_LEN: usize = 56;

    pub fn of(payload: &[u8]) -> Self {
        Self(hex::encode(Sha224::digest(payload)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
