use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::Deserialize;

use clap::{Parser, Subcommand};

use nscan::{EccLevel, ScanConfig};
use nslice::Geometry;

#[derive(Parser)]
#[command(name = "NDDPEF")]
#[command(about = "Put a small file on paper as a page of symbols, and get it back from scans")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encodes a file into a printable page image
    Encode {
        /// The file to put on paper
        input: PathBuf,

        /// Page image to write, defaults to <INPUT>.nddpef.png
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Human readable title, printable ascii and at most 64 characters
        #[arg(short, long)]
        title: Option<String>,

        /// Blocks per row and column
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(5..=7))]
        size: Option<u8>,

        /// Seal the payload with a fresh page key, destroying the index
        /// destroys the document
        #[arg(long)]
        seal: bool,
    },

    /// Rebuilds files from scan results or scanned pages
    Decode {
        /// Text files of decoder output, or page images (png, jpg)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Where to write, only valid when a single document is recovered
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Prints every symbol read off page images, one per line
    Scan {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

pub const DEFAULT_CONFIG: &str = r#"
    size = 6
    chunk_size = 500
    ecc = "L"

    [scan]
        contrast = 128
        row_threshold = 0.95
        column_threshold = 0.9
        min_distance = 10
        margin = 4
        workers = 0

    [tools]
        qrencode = "qrencode"
        zbarimg = "zbarimg"

    [page]
        scale = 4
"#;

// Configuration
#[derive(Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub size: usize,
    pub chunk_size: usize,
    pub ecc: EccLevel,

    pub scan: ScanConfig,
    pub tools: Tools,
    pub page: PageConfig,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct Tools {
    pub qrencode: PathBuf,
    pub zbarimg: PathBuf,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct PageConfig {
    // Page pixels per reference pixel
    pub scale: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            size: 6,
            chunk_size: nslice::slicer::CHUNK_SIZE,
            ecc: EccLevel::Low,
            scan: ScanConfig::default(),
            tools: Tools::default(),
            page: PageConfig::default(),
        }
    }
}

impl Default for Tools {
    fn default() -> Self {
        Tools {
            qrencode: PathBuf::from("qrencode"),
            zbarimg: PathBuf::from("zbarimg"),
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        PageConfig { scale: 4 }
    }
}

impl Config {
    pub fn parse(text: &str) -> Result<Config> {
        let config: Config = toml::from_str(text).context("invalid config")?;

        ensure!((5..=7).contains(&config.size), "size must be within 5..=7, got {}", config.size);
        ensure!(config.chunk_size > 0, "chunk_size must be non-zero");
        ensure!(config.page.scale > 0, "page scale must be non-zero");
        Ok(config)
    }

    pub fn load(path: Option<&Path>) -> Result<Config> {
        match path {
            None => Config::parse(DEFAULT_CONFIG),
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("reading config {:?}", path))?;
                Config::parse(&text)
            }
        }
    }

    /// Grid for a page, `size` from the command line wins over the config.
    pub fn geometry(&self, size: Option<u8>) -> Geometry {
        let size = size.map(usize::from).unwrap_or(self.size);
        Geometry {
            rows: size,
            columns: size,
            chunk_size: self.chunk_size,
        }
    }
}
