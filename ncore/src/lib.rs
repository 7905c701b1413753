//! Shared primitives for the NDDPEF paper format.
//!
//! - [`hash`] derives the short chunk checksum and the whole payload
//!   fingerprint.
//! - [`key`] holds the page key used by the optional (cosmetic) seal.
pub mod hash;
pub mod key;
