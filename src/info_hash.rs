use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::bencode_parser::{bencode_encode, BencodeValue};

/// 20-byte SHA-1 identifier of a torrent's info dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InfoHash([u8; 20]);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum InfoHashError {
    #[error("Info hash must be 20 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Invalid hex info hash: {0}")]
    InvalidHex(String),
}

impl InfoHash {
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Hashes the canonical encoding of an info dictionary.
    pub fn compute(info: &BencodeValue) -> Self {
        Self::from_info_bytes(&bencode_encode(info))
    }

    /// Hashes an info dictionary exactly as it appears on the wire.
    pub fn from_info_bytes(encoded_info: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(encoded_info);
        Self(hasher.finalize().into())
    }

    pub fn from_hex(s: &str) -> Result<Self, InfoHashError> {
        let bytes = hex::decode(s).map_err(|e| InfoHashError::InvalidHex(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex form, as used for scrape keys and store keys.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for InfoHash {
    type Error = InfoHashError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; 20]>::try_from(bytes)
            .map(Self)
            .map_err(|_| InfoHashError::InvalidLength(bytes.len()))
    }
}

impl TryFrom<String> for InfoHash {
    type Error = InfoHashError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<InfoHash> for String {
    fn from(hash: InfoHash) -> Self {
        hash.to_hex()
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
