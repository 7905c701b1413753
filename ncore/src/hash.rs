use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::de::{self, Unexpected, Visitor};
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use thiserror::Error;

// Separate derive-key contexts, a chunk checksum and a payload fingerprint
// over the same bytes share nothing.
const CHECKSUM_CONTEXT: &str = "NDDPEF 2026-10-18 chunk checksum";
const FINGERPRINT_CONTEXT: &str = "NDDPEF 2026-10-18 payload fingerprint";

pub const CHECKSUM_LEN: usize = 8;
pub const FINGERPRINT_LEN: usize = 32;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HashError {
    #[error("checksum must be {CHECKSUM_LEN} url-safe base64 characters")]
    Checksum,
    #[error("fingerprint must be {FINGERPRINT_LEN} uppercase hex characters")]
    Fingerprint,
}

/// Identity of a chunk: 8 characters of url-safe base64 over a BLAKE3 digest.
///
/// The truncation keeps it transcribable by hand, the price is ~48 bits of
/// collision resistance. This is an integrity check against scan noise, not
/// against an adversary.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Checksum([u8; CHECKSUM_LEN]);

/// Identity of a whole payload: 128 bits of a BLAKE3 digest as uppercase hex.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN / 2]);

pub fn checksum(data: &[u8]) -> Checksum {
    let digest = blake3::derive_key(CHECKSUM_CONTEXT, data);
    let encoded = URL_SAFE_NO_PAD.encode(digest);

    let mut id = [0u8; CHECKSUM_LEN];
    id.copy_from_slice(&encoded.as_bytes()[..CHECKSUM_LEN]);
    Checksum(id)
}

pub fn fingerprint(data: &[u8]) -> Fingerprint {
    let digest = blake3::derive_key(FINGERPRINT_CONTEXT, data);

    let mut id = [0u8; FINGERPRINT_LEN / 2];
    id.copy_from_slice(&digest[..FINGERPRINT_LEN / 2]);
    Fingerprint(id)
}

fn is_checksum_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_'
}

impl FromStr for Checksum {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != CHECKSUM_LEN || !bytes.iter().all(|c| is_checksum_char(*c)) {
            return Err(HashError::Checksum);
        }

        let mut id = [0u8; CHECKSUM_LEN];
        id.copy_from_slice(bytes);
        Ok(Checksum(id))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only ever built from the url-safe alphabet
        for c in self.0.iter() {
            write!(f, "{}", *c as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self)
    }
}

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN / 2] {
        &self.0
    }
}

impl FromStr for Fingerprint {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = s.len() == FINGERPRINT_LEN
            && s.bytes().all(|c| c.is_ascii_digit() || (b'A'..=b'F').contains(&c));
        if !canonical {
            return Err(HashError::Fingerprint);
        }

        let mut id = [0u8; FINGERPRINT_LEN / 2];
        hex::decode_to_slice(s, &mut id).map_err(|_| HashError::Fingerprint)?;
        Ok(Fingerprint(id))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

// Serde impls, both travel as plain strings inside the index
impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct ChecksumVisitor;

impl<'de> Visitor<'de> for ChecksumVisitor {
    type Value = Checksum;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a string of {} url-safe base64 characters", CHECKSUM_LEN)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse()
            .map_err(|_| de::Error::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Checksum, D::Error> {
        deserializer.deserialize_str(ChecksumVisitor)
    }
}

struct FingerprintVisitor;

impl<'de> Visitor<'de> for FingerprintVisitor {
    type Value = Fingerprint;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a string of {} uppercase hex characters", FINGERPRINT_LEN)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse()
            .map_err(|_| de::Error::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Fingerprint, D::Error> {
        deserializer.deserialize_str(FingerprintVisitor)
    }
}
