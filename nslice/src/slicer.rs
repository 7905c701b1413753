use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, info, warn};
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use ncore::hash::{self, Checksum, Fingerprint};
use ncore::key::{KeyError, PageKey};

use crate::pool::Pool;

pub const VERSION: u32 = 1;

// Sized so a formatted block (8 + 4 delimiters + chunk) stays well inside
// a level L symbol
pub const CHUNK_SIZE: usize = 500;
pub const MAX_FILENAME: usize = 127;

#[derive(Error, Debug)]
pub enum SliceError {
    #[error("filename exceeds {MAX_FILENAME} characters")]
    FilenameLength,
    #[error("filename must be printable ascii without braces")]
    FilenameCharset,
    #[error("chunk size must be non-zero")]
    ChunkSize,
    #[error("input data too long: {needed} characters exceed the page capacity of {budget}")]
    Capacity { needed: usize, budget: usize },
    #[error("unsupported index version: {0}")]
    Version(u32),
    #[error(transparent)]
    Transform(#[from] base64::DecodeError),
    #[error(transparent)]
    Seal(#[from] KeyError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("fingerprint mismatch: index says {expected}, data is {actual}")]
    Fingerprint {
        expected: Fingerprint,
        actual: Fingerprint,
    },
}

pub type Result<T> = std::result::Result<T, SliceError>;

/// How many blocks fit on a page and how much text each carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub rows: usize,
    pub columns: usize,
    pub chunk_size: usize,
}

impl Geometry {
    pub fn square(size: usize) -> Self {
        Geometry {
            rows: size,
            columns: size,
            chunk_size: CHUNK_SIZE,
        }
    }

    pub fn blocks(&self) -> usize {
        self.rows.saturating_mul(self.columns)
    }

    // Saturates, a page that large holds anything we could slice
    pub fn capacity(&self) -> usize {
        self.blocks().saturating_mul(self.chunk_size)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry::square(6)
    }
}

/// A piece of the transformed payload, always carrying its own checksum.
///
/// The only ways to build one either compute the checksum or verify the
/// claimed one, so a `Chunk` in hand is a verified chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    checksum: Checksum,
    text: String,
}

impl Chunk {
    pub fn new(text: String) -> Self {
        Chunk {
            checksum: hash::checksum(text.as_bytes()),
            text,
        }
    }

    pub fn verified(claimed: Checksum, text: &str) -> Option<Self> {
        let chunk = Chunk::new(text.to_string());
        if chunk.checksum == claimed {
            Some(chunk)
        } else {
            None
        }
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Index {
    pub version: u32,
    pub fingerprint: Fingerprint,
    pub checksums: Vec<Checksum>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageKey>,
}

impl Index {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A reconstructed payload, verified against its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub fingerprint: Fingerprint,
    pub data: Vec<u8>,
    pub filename: Option<String>,
}

#[derive(Debug)]
pub enum Outcome {
    Recovered(Document),
    Pending {
        fingerprint: Fingerprint,
        missing: Vec<Checksum>,
    },
    Failed {
        fingerprint: Fingerprint,
        error: SliceError,
    },
}

impl Outcome {
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Outcome::Recovered(doc) => &doc.fingerprint,
            Outcome::Pending { fingerprint, .. } => fingerprint,
            Outcome::Failed { fingerprint, .. } => fingerprint,
        }
    }
}

pub fn validate_filename(name: &str) -> Result<()> {
    if name.len() > MAX_FILENAME {
        return Err(SliceError::FilenameLength);
    }
    // Braces would split the index out of its own discovery pattern
    if !name.bytes().all(|c| (0x20..0x7f).contains(&c) && c != b'{' && c != b'}') {
        return Err(SliceError::FilenameCharset);
    }
    Ok(())
}

/// Slice `payload` into chunks and build the index binding them together.
///
/// With a `page` key the payload is sealed before it is transformed, the
/// fingerprint is always taken over the original payload.
pub fn encode(
    payload: &[u8],
    filename: Option<&str>,
    geometry: &Geometry,
    page: Option<PageKey>,
) -> Result<(Index, Vec<Chunk>)> {
    if let Some(name) = filename {
        validate_filename(name)?;
    }
    if geometry.chunk_size == 0 {
        return Err(SliceError::ChunkSize);
    }

    let fingerprint = hash::fingerprint(payload);

    let text = match &page {
        Some(key) => STANDARD.encode(key.seal(payload)),
        None => STANDARD.encode(payload),
    };

    if text.len() > geometry.capacity() {
        return Err(SliceError::Capacity {
            needed: text.len(),
            budget: geometry.capacity(),
        });
    }

    // base64 is ascii, every byte offset is a char boundary
    let chunks: Vec<Chunk> = (0..text.len())
        .step_by(geometry.chunk_size)
        .map(|start| {
            let end = start.saturating_add(geometry.chunk_size).min(text.len());
            Chunk::new(text[start..end].to_string())
        })
        .collect();

    let index = Index {
        version: VERSION,
        fingerprint,
        checksums: chunks.iter().map(|c| *c.checksum()).collect(),
        filename: filename.map(|n| n.to_string()),
        page,
    };

    info!(
        "Sliced {} bytes into {} blocks, fingerprint: {}",
        payload.len(),
        chunks.len(),
        fingerprint
    );

    Ok((index, chunks))
}

/// Rebuild the payload of one index.
///
/// `Ok(None)` means some chunks are not in the pool yet.
pub fn reconstruct(index: &Index, pool: &Pool) -> Result<Option<Document>> {
    if index.version != VERSION {
        return Err(SliceError::Version(index.version));
    }

    if !pool.is_satisfied(index) {
        return Ok(None);
    }

    let text: String = index
        .checksums
        .iter()
        .filter_map(|ck| pool.get(ck))
        .map(|chunk| chunk.text())
        .collect();

    let mut data = STANDARD.decode(text.as_bytes())?;
    if let Some(key) = &index.page {
        data = key.open(&data)?;
    }

    let actual = hash::fingerprint(&data);
    if actual != index.fingerprint {
        return Err(SliceError::Fingerprint {
            expected: index.fingerprint,
            actual,
        });
    }

    Ok(Some(Document {
        fingerprint: index.fingerprint,
        data,
        filename: index.filename.clone().filter(|n| !n.is_empty()),
    }))
}

/// Try every candidate index against the pool.
///
/// Duplicate candidates are tried once. Once a fingerprint is recovered, any
/// other candidate for the same fingerprint is dropped from the report.
pub fn decode<'a, I>(indexes: I, pool: &Pool) -> Vec<Outcome>
where
    I: IntoIterator<Item = &'a Index>,
{
    let mut seen: HashSet<&Index> = HashSet::new();
    let mut recovered: HashSet<Fingerprint> = HashSet::new();
    let mut outcomes = Vec::new();

    for index in indexes {
        if !seen.insert(index) || recovered.contains(&index.fingerprint) {
            continue;
        }

        let outcome = match reconstruct(index, pool) {
            Ok(Some(doc)) => {
                info!("Found one [{}], decoded {} bytes", doc.fingerprint, doc.data.len());
                recovered.insert(doc.fingerprint);
                Outcome::Recovered(doc)
            }
            Ok(None) => {
                let missing = pool.missing(index);
                debug!("[{}] {} blocks missing", index.fingerprint, missing.len());
                Outcome::Pending {
                    fingerprint: index.fingerprint,
                    missing,
                }
            }
            Err(error) => {
                warn!("[{}] failed in decoding: {}", index.fingerprint, error);
                Outcome::Failed {
                    fingerprint: index.fingerprint,
                    error,
                }
            }
        };
        outcomes.push(outcome);
    }

    outcomes.retain(|o| match o {
        Outcome::Recovered(_) => true,
        _ => !recovered.contains(o.fingerprint()),
    });
    outcomes
}

#[cfg(test)]
mod test_encode {
    use super::*;

    #[test]
    fn hello_world_single_chunk() {
        let geometry = Geometry {
            rows: 2,
            columns: 2,
            chunk_size: CHUNK_SIZE,
        };
        let (index, chunks) = encode(b"Hello World!", None, &geometry, None).unwrap();

        assert_eq!(index.version, 1);
        assert_eq!(index.fingerprint.to_string(), "62C370FC8B4973823B626675FC1C30C8");
        assert_eq!(index.checksums.len(), 1);
        assert_eq!(index.checksums[0].to_string(), "TmBgVA5X");
        assert_eq!(chunks[0].text(), "SGVsbG8gV29ybGQh");
    }

    #[test]
    fn splits_on_chunk_size() {
        let geometry = Geometry {
            rows: 2,
            columns: 2,
            chunk_size: 10,
        };
        // 24 bytes -> 32 base64 chars -> 10 + 10 + 10 + 2
        let (index, chunks) = encode(&[7u8; 24], None, &geometry, None).unwrap();

        assert_eq!(chunks.len(), 4);
        assert_eq!(index.checksums.len(), 4);
        assert_eq!(
            chunks.iter().map(|c| c.text().len()).collect::<Vec<_>>(),
            vec![10, 10, 10, 2]
        );
        for (ck, chunk) in index.checksums.iter().zip(chunks.iter()) {
            assert_eq!(ck, chunk.checksum());
        }
    }

    #[test]
    fn capacity_error() {
        let geometry = Geometry {
            rows: 1,
            columns: 2,
            chunk_size: 8,
        };
        // 12 bytes -> 16 chars fits, 13 bytes -> 20 chars doesn't
        assert!(encode(&[1u8; 12], None, &geometry, None).is_ok());

        match encode(&[1u8; 13], None, &geometry, None) {
            Err(SliceError::Capacity { needed, budget }) => {
                assert_eq!(needed, 20);
                assert_eq!(budget, 16);
            }
            other => panic!("expected capacity error, got {:?}", other),
        }
    }

    #[test]
    fn oversized_geometry() {
        let geometry = Geometry {
            rows: 7,
            columns: 7,
            chunk_size: usize::MAX,
        };
        assert_eq!(geometry.capacity(), usize::MAX);

        let (index, chunks) = encode(b"Hello World!", None, &geometry, None).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(index.checksums.len(), 1);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let geometry = Geometry {
            rows: 1,
            columns: 1,
            chunk_size: 0,
        };
        assert!(matches!(
            encode(b"abc", None, &geometry, None),
            Err(SliceError::ChunkSize)
        ));
    }

    #[test]
    fn filename_validation() {
        let geometry = Geometry::default();
        let long = "a".repeat(MAX_FILENAME + 1);

        assert!(encode(b"abc", Some("notes.txt"), &geometry, None).is_ok());
        assert!(matches!(
            encode(b"abc", Some(&long), &geometry, None),
            Err(SliceError::FilenameLength)
        ));
        assert!(matches!(
            encode(b"abc", Some("a{b}.txt"), &geometry, None),
            Err(SliceError::FilenameCharset)
        ));
        assert!(matches!(
            encode(b"abc", Some("tab\there"), &geometry, None),
            Err(SliceError::FilenameCharset)
        ));
    }

    #[test]
    fn empty_payload() {
        let (index, chunks) = encode(b"", None, &Geometry::default(), None).unwrap();

        assert!(chunks.is_empty());
        assert!(index.checksums.is_empty());
    }

    #[test]
    fn index_json_shape() {
        let (index, _) =
            encode(b"Hello World!", Some("hello.txt"), &Geometry::default(), None).unwrap();

        assert_eq!(
            index.to_json().unwrap(),
            r#"{"version":1,"fingerprint":"62C370FC8B4973823B626675FC1C30C8","checksums":["TmBgVA5X"],"filename":"hello.txt"}"#
        );
    }
}
