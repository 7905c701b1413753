use log::debug;

use crate::block;
use crate::extract;
use crate::pool::Pool;
use crate::slicer::{self, Index, Outcome};

/// What one call to [`Session::absorb`] found.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Absorbed {
    pub blocks: usize,
    pub new_blocks: usize,
    pub indexes: usize,
    pub new_indexes: usize,
}

/// Accumulates blocks and indexes across scans until documents can be rebuilt.
#[derive(Debug, Default)]
pub struct Session {
    pool: Pool,
    indexes: Vec<Index>,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn absorb(&mut self, text: &str) -> Absorbed {
        let mut absorbed = Absorbed::default();

        for chunk in block::parse(text) {
            absorbed.blocks += 1;
            if self.pool.insert(chunk) {
                absorbed.new_blocks += 1;
            }
        }

        for index in extract::find_indexes(text) {
            absorbed.indexes += 1;
            if !self.indexes.contains(&index) {
                self.indexes.push(index);
                absorbed.new_indexes += 1;
            }
        }

        debug!("Absorbed: {:?}", absorbed);
        absorbed
    }

    pub fn reconstruct(&self) -> Vec<Outcome> {
        slicer::decode(self.indexes.iter(), &self.pool)
    }
}
