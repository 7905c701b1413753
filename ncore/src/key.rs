use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use sodiumoxide::crypto::secretbox;
use thiserror::Error;
use uuid::Uuid;

const SEAL_CONTEXT: &str = "NDDPEF 2026-10-18 page seal key";

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("libsodium failed to initialize")]
    Init,
    #[error("sealed payload is shorter than its nonce")]
    Truncated,
    #[error("sealed payload failed authentication")]
    Open,
    #[error(transparent)]
    Uuid(#[from] uuid::Error),
}

pub type Result<T> = std::result::Result<T, KeyError>;

pub fn init() -> Result<()> {
    sodiumoxide::init().map_err(|_| KeyError::Init)
}

// The seal is cosmetic. The page key travels inside the index symbol, so
// whoever holds the index can open the blocks. What it buys is that the data
// blocks alone say nothing, and destroying the index destroys the document.
//
// Layout of a sealed payload:
//  [ nonce (24 bytes) | secretbox(payload) ]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageKey(Uuid);

impl PageKey {
    pub fn generate() -> Self {
        PageKey(Uuid::new_v4())
    }

    fn secret(&self) -> secretbox::Key {
        secretbox::Key(blake3::derive_key(SEAL_CONTEXT, self.0.as_bytes()))
    }

    pub fn seal(&self, data: &[u8]) -> Vec<u8> {
        let nonce = secretbox::gen_nonce();

        let mut sealed =
            Vec::with_capacity(secretbox::NONCEBYTES + data.len() + secretbox::MACBYTES);
        sealed.extend_from_slice(&nonce.0);
        sealed.extend_from_slice(&secretbox::seal(data, &nonce, &self.secret()));
        sealed
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < secretbox::NONCEBYTES {
            return Err(KeyError::Truncated);
        }

        let (nonce, data) = sealed.split_at(secretbox::NONCEBYTES);
        let nonce = secretbox::Nonce::from_slice(nonce).ok_or(KeyError::Truncated)?;

        secretbox::open(data, &nonce, &self.secret()).map_err(|_| KeyError::Open)
    }
}

impl From<Uuid> for PageKey {
    fn from(uuid: Uuid) -> Self {
        PageKey(uuid)
    }
}

impl FromStr for PageKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(PageKey(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl fmt::Debug for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PageKey").field(&"****").finish()
    }
}

#[cfg(test)]
mod test_page_key {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        init().unwrap();
        let key = PageKey::generate();
        let data = b"Hello World!";

        let sealed = key.seal(data);
        assert_ne!(&sealed[secretbox::NONCEBYTES..], &data[..]);
        assert_eq!(sealed.len(), secretbox::NONCEBYTES + data.len() + secretbox::MACBYTES);

        assert_eq!(key.open(&sealed).unwrap(), data);
    }

    #[test]
    fn reparsed_key_opens() {
        init().unwrap();
        let key = PageKey::generate();
        let sealed = key.seal(b"Hello World!");

        let reparsed: PageKey = key.to_string().parse().unwrap();
        assert_eq!(reparsed, key);
        assert_eq!(reparsed.open(&sealed).unwrap(), b"Hello World!");
    }

    #[test]
    fn wrong_key_fails() {
        init().unwrap();
        let sealed = PageKey::generate().seal(b"Hello World!");

        assert!(matches!(PageKey::generate().open(&sealed), Err(KeyError::Open)));
    }

    #[test]
    fn truncated_fails() {
        init().unwrap();
        let key = PageKey::generate();

        assert!(matches!(key.open(&[0u8; 10]), Err(KeyError::Truncated)));
    }

    #[test]
    fn tampered_fails() {
        init().unwrap();
        let key = PageKey::generate();
        let mut sealed = key.seal(b"Hello World!");
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(matches!(key.open(&sealed), Err(KeyError::Open)));
    }

    #[test]
    fn debug_hides_uuid() {
        let key = PageKey::generate();

        assert!(!format!("{:?}", key).contains(&key.to_string()));
    }

    #[test]
    fn serde_as_uuid_string() {
        let key = PageKey::generate();
        let json = serde_json::to_string(&key).unwrap();

        assert_eq!(json, format!("\"{}\"", key));
        assert_eq!(serde_json::from_str::<PageKey>(&json).unwrap(), key);
    }
}
