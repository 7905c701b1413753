use std::collections::HashMap;
use std::collections::HashSet;

use ncore::hash::Checksum;

use crate::slicer::{Chunk, Index};

/// Verified chunks gathered across scans, keyed by checksum.
#[derive(Debug, Default, Clone)]
pub struct Pool {
    chunks: HashMap<Checksum, Chunk>,
}

impl Pool {
    pub fn new() -> Self {
        Pool::default()
    }

    /// Returns true if the chunk was not in the pool yet.
    pub fn insert(&mut self, chunk: Chunk) -> bool {
        if self.chunks.contains_key(chunk.checksum()) {
            return false;
        }
        self.chunks.insert(*chunk.checksum(), chunk);
        true
    }

    pub fn get(&self, checksum: &Checksum) -> Option<&Chunk> {
        self.chunks.get(checksum)
    }

    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.chunks.contains_key(checksum)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn is_satisfied(&self, index: &Index) -> bool {
        index.checksums.iter().all(|ck| self.contains(ck))
    }

    /// Checksums of `index` not yet in the pool, in index order, each once.
    pub fn missing(&self, index: &Index) -> Vec<Checksum> {
        let mut seen = HashSet::new();
        index
            .checksums
            .iter()
            .filter(|ck| !self.contains(ck) && seen.insert(**ck))
            .copied()
            .collect()
    }
}

impl Extend<Chunk> for Pool {
    fn extend<T: IntoIterator<Item = Chunk>>(&mut self, iter: T) {
        for chunk in iter {
            self.insert(chunk);
        }
    }
}

impl FromIterator<Chunk> for Pool {
    fn from_iter<T: IntoIterator<Item = Chunk>>(iter: T) -> Self {
        let mut pool = Pool::new();
        pool.extend(iter);
        pool
    }
}
