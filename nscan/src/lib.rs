//! Optical side of NDDPEF: laying symbols out on a page and finding them again.
//!
//! The symbology itself is external. [`SymbolEncoder`] turns bytes into a
//! symbol image and [`SymbolDecoder`] reads one back, with subprocess
//! backends behind the `qrencode` and `zbar` features.
#[cfg(feature = "qrencode")]
pub mod qrencode;

#[cfg(feature = "zbar")]
pub mod zbar;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub mod filter;
pub mod page;
pub mod recover;
pub mod segment;

use std::fmt;
use std::str::FromStr;

use image::GrayImage;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use ncore::hash::Fingerprint;

pub use crate::segment::SegmentConfig;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Font(#[from] ab_glyph::InvalidFont),
    #[error("symbol encoder failed: {0}")]
    Encoder(String),
    #[error("symbol decoder failed: {0}")]
    Decoder(String),
    #[error("page holds {capacity} blocks, got {blocks}")]
    Overflow { capacity: usize, blocks: usize },
    #[error("unknown error correction level: {0}")]
    EccLevel(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Error correction level of a symbol, as the `L`/`M`/`Q`/`H` letters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EccLevel {
    #[default]
    #[serde(rename = "L")]
    Low,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "Q")]
    Quartile,
    #[serde(rename = "H")]
    High,
}

impl EccLevel {
    pub fn as_letter(&self) -> &'static str {
        match self {
            EccLevel::Low => "L",
            EccLevel::Medium => "M",
            EccLevel::Quartile => "Q",
            EccLevel::High => "H",
        }
    }
}

impl fmt::Display for EccLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_letter())
    }
}

impl FromStr for EccLevel {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "L" | "l" => Ok(EccLevel::Low),
            "M" | "m" => Ok(EccLevel::Medium),
            "Q" | "q" => Ok(EccLevel::Quartile),
            "H" | "h" => Ok(EccLevel::High),
            _ => Err(ScanError::EccLevel(s.to_string())),
        }
    }
}

/// Knobs for scanning a page.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    #[serde(flatten)]
    pub segment: SegmentConfig,

    // 0 lets rayon decide
    pub workers: usize,
}

pub trait SymbolEncoder {
    fn encode(&self, data: &[u8], ecc: EccLevel) -> Result<GrayImage>;
}

/// Reads one symbol out of a region.
///
/// A region with nothing readable is `None`, never an error; regions are
/// decoded in parallel hence `Sync`.
pub trait SymbolDecoder: Sync {
    fn decode(&self, region: &GrayImage) -> Option<Vec<u8>>;
}

/// What gets printed, independent of how it is printed.
#[derive(Debug, Clone)]
pub struct PageMeta {
    pub title: String,
    pub fingerprint: Fingerprint,
    pub blocks: usize,
    pub filename: Option<String>,
    // When the page was made, as printed
    pub date: String,
}

#[derive(Debug, Clone)]
pub struct PageContent {
    pub meta: PageMeta,
    pub index: GrayImage,
    pub blocks: Vec<GrayImage>,
}

pub trait PageRenderer {
    type Output;

    fn render(&self, content: &PageContent) -> Result<Self::Output>;
}
