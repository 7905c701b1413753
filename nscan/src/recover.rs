use std::path::Path;

use image::imageops;
use image::GrayImage;
use image::Luma;
use log::{info, trace, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::segment::{self, Region};
use crate::{Result, ScanConfig, SymbolDecoder};

/// Paste `image` centred on a white canvas twice its size.
///
/// Symbol readers want a quiet zone around the symbol, a tight crop rarely
/// has one.
pub fn enlarge(image: &GrayImage) -> GrayImage {
    let (w, h) = image.dimensions();
    let mut canvas = GrayImage::from_pixel(2 * w, 2 * h, Luma([255]));
    imageops::overlay(&mut canvas, image, (w / 2) as i64, (h / 2) as i64);
    canvas
}

/// Grow `region` by `margin` (clamped to the image), crop it and enlarge.
pub fn crop_region(image: &GrayImage, region: &Region, margin: u32) -> GrayImage {
    let (w, h) = image.dimensions();

    let left = region.x.saturating_sub(margin).min(w);
    let top = region.y.saturating_sub(margin).min(h);
    let right = (region.x + region.width + margin).min(w);
    let bottom = (region.y + region.height + margin).min(h);

    let cropped = imageops::crop_imm(image, left, top, right - left, bottom - top).to_image();
    enlarge(&cropped)
}

/// Segment a page and read every region, header included.
///
/// Output follows region order. Regions nothing could be read from are left
/// out, an unrecognized page gives an empty list.
pub fn scan_page<D>(image: &GrayImage, decoder: &D, config: &ScanConfig) -> Result<Vec<String>>
where
    D: SymbolDecoder + ?Sized,
{
    let layout = match segment::segment(image, &config.segment) {
        Some(layout) => layout,
        None => {
            warn!("Page not recognized, no sync marker found");
            return Ok(Vec::new());
        }
    };

    let mut regions = Vec::with_capacity(layout.regions.len() + 1);
    regions.push(layout.header);
    regions.extend(layout.regions);
    info!("Baseline at {}, {} regions", layout.baseline, regions.len());

    let pool = ThreadPoolBuilder::new().num_threads(config.workers).build()?;
    let margin = config.segment.margin;

    let decoded: Vec<Option<Vec<u8>>> = pool.install(|| {
        regions
            .par_iter()
            .map(|region| decoder.decode(&crop_region(image, region, margin)))
            .collect()
    });

    let tokens: Vec<String> = decoded
        .into_iter()
        .flatten()
        .filter_map(|raw| match String::from_utf8(raw) {
            Ok(s) => Some(s),
            Err(e) => {
                trace!("Dropping non utf-8 symbol: {}", e);
                None
            }
        })
        .collect();

    info!("{} pieces found", tokens.len());
    Ok(tokens)
}

pub fn scan_file<D, P>(path: P, decoder: &D, config: &ScanConfig) -> Result<Vec<String>>
where
    D: SymbolDecoder + ?Sized,
    P: AsRef<Path>,
{
    info!("Scanning: {:?}", path.as_ref());
    let image = image::open(path.as_ref())?.to_luma8();
    scan_page(&image, decoder, config)
}
