//! Slicing a payload into printable blocks and putting it back together
//!
//! A payload is turned into text (base64), cut into fixed size chunks and
//! each chunk is addressed by its checksum (see: [`ncore::hash::checksum`]).
//! The index binds the ordered list of checksums to the fingerprint of the
//! original payload. Each chunk and the index end up as one printed symbol.
//!
//! <div class="example-wrap" style="display:inline-block">
//! <pre class="compile_fail" style="white-space:normal;font:inherit;">
//!
//! **Warning**: the checksum and fingerprint are kept short so they can
//! be read off paper. They catch scan noise, they are not a cryptographic
//! integrity guarantee.
//!
//! </pre>
//! </div>
//!
//! # Block
//!
//! A chunk is carried as a single token (see: [`block::format`]):
//!
//! | Part     | Alphabet              | Description |
//! | -------- | --------------------- | ----------- |
//! | `.`      |                       | Opening delimiter |
//! | checksum | `[0-9A-Za-z_-]{8}`    | Checksum of the chunk text |
//! | `..`     |                       | Separator, can't occur in the checksum |
//! | text     | `[0-9A-Za-z+/=]+`     | The chunk text |
//! | `.`      |                       | Closing delimiter |
//!
//! # Index
//!
//! The index is a flat JSON object (see: [`slicer::Index`]):
//!
//! | Field         | Type      | Description |
//! | ------------- | --------- | ----------- |
//! | `version`     | integer   | Format version, currently `1` |
//! | `fingerprint` | string    | 32 uppercase hex chars, fingerprint of the original payload |
//! | `checksums`   | [string]  | Checksums of the chunks, in payload order |
//! | `filename`    | string    | Optional, suggested name for the recovered file |
//! | `page`        | string    | Optional, UUID of the page key when the payload is sealed |
//!
//! # Recovery
//!
//! Scanned text is noisy: blocks are found by pattern and kept only when
//! their checksum verifies, index candidates are found by pattern and kept
//! only when they parse. Verified chunks go into a [`pool::Pool`]; an index
//! whose checksums are all in the pool can be reconstructed, otherwise it is
//! pending until more pages are scanned.
pub mod block;
pub mod extract;
pub mod pool;
pub mod session;
pub mod slicer;

pub use crate::pool::Pool;
pub use crate::session::{Absorbed, Session};
pub use crate::slicer::{
    decode, encode, reconstruct, Chunk, Document, Geometry, Index, Outcome, SliceError,
};
