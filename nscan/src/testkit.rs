//! Stand-in symbology for tests.
//!
//! [`TaggedSymbols`] keeps the payloads in a shared table and prints only a
//! table slot: a 12 x 12 module square with a solid frame, the slot number
//! Manchester coded in the first two inner rows and a checkerboard elsewhere.
//! Every inner row is about half ink, like a real symbol, so the page
//! segmentation sees the same kind of profile.
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Mutex;

use image::GrayImage;
use image::Luma;
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::page;
use crate::segment::{NH, NW};
use crate::{EccLevel, Result, ScanError, SymbolDecoder, SymbolEncoder};

const MODULES: u32 = 12;
const TAG_BITS: u32 = 8;
const DARK: u8 = 128;

#[derive(Debug, Default)]
pub struct TaggedSymbols {
    table: Mutex<Vec<Vec<u8>>>,
}

impl TaggedSymbols {
    pub fn new() -> Self {
        TaggedSymbols::default()
    }
}

// Slot of inner module (x, y) in the tag, if it is part of it
fn tag_position(x: u32, y: u32) -> Option<u32> {
    if (1..=2).contains(&y) {
        let p = (y - 1) * (MODULES - 2) + (x - 1);
        if p < 2 * TAG_BITS {
            return Some(p);
        }
    }
    None
}

fn is_dark(tag: u8, x: u32, y: u32) -> bool {
    if x == 0 || y == 0 || x == MODULES - 1 || y == MODULES - 1 {
        return true;
    }

    match tag_position(x, y) {
        Some(p) => {
            let bit = (tag >> (p / 2)) & 1 == 1;
            // 1 -> dark, light; 0 -> light, dark
            bit == (p % 2 == 0)
        }
        None => (x + y) % 2 == 0,
    }
}

fn symbol(tag: u8) -> GrayImage {
    GrayImage::from_fn(MODULES, MODULES, |x, y| {
        if is_dark(tag, x, y) {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}

// Bounding boxes of connected ink, largest first
fn ink_boxes(region: &GrayImage) -> Vec<(u32, u32, u32, u32)> {
    let ink = GrayImage::from_fn(region.width(), region.height(), |x, y| {
        if region.get_pixel(x, y).0[0] < DARK {
            Luma([255])
        } else {
            Luma([0])
        }
    });
    let labels = connected_components(&ink, Connectivity::Eight, Luma([0]));

    let mut boxes: BTreeMap<u32, (u32, u32, u32, u32)> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        if label.0[0] == 0 {
            continue;
        }
        boxes
            .entry(label.0[0])
            .and_modify(|(x0, y0, x1, y1)| {
                *x0 = (*x0).min(x);
                *y0 = (*y0).min(y);
                *x1 = (*x1).max(x);
                *y1 = (*y1).max(y);
            })
            .or_insert((x, y, x, y));
    }

    let mut boxes: Vec<_> = boxes.into_values().collect();
    boxes.sort_by_key(|(x0, y0, x1, y1)| Reverse((x1 - x0 + 1) as u64 * (y1 - y0 + 1) as u64));
    boxes
}

fn read_box(region: &GrayImage, (x0, y0, x1, y1): (u32, u32, u32, u32)) -> Option<u8> {
    let (bw, bh) = (x1 - x0 + 1, y1 - y0 + 1);
    if bw < MODULES || bh < MODULES || bw.abs_diff(bh) * 10 > bw.max(bh) {
        return None;
    }

    let (mw, mh) = (bw as f64 / MODULES as f64, bh as f64 / MODULES as f64);
    let dark = |mx: u32, my: u32| {
        let px = x0 + ((mx as f64 + 0.5) * mw) as u32;
        let py = y0 + ((my as f64 + 0.5) * mh) as u32;
        region.get_pixel(px, py).0[0] < DARK
    };

    let ring = (0..MODULES).all(|i| {
        dark(i, 0) && dark(i, MODULES - 1) && dark(0, i) && dark(MODULES - 1, i)
    });
    if !ring {
        return None;
    }

    let mut tag = 0u8;
    for bit in 0..TAG_BITS {
        let p = 2 * bit;
        let at = |p: u32| (1 + p % (MODULES - 2), 1 + p / (MODULES - 2));
        let (ax, ay) = at(p);
        let (bx, by) = at(p + 1);

        match (dark(ax, ay), dark(bx, by)) {
            (true, false) => tag |= 1 << bit,
            (false, true) => {}
            _ => return None,
        }
    }
    Some(tag)
}

// The frame is solid, so a symbol is one component however much text is
// printed around it
fn read_tag(region: &GrayImage) -> Option<u8> {
    ink_boxes(region).into_iter().find_map(|b| read_box(region, b))
}

impl SymbolEncoder for TaggedSymbols {
    fn encode(&self, data: &[u8], _ecc: EccLevel) -> Result<GrayImage> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| ScanError::Encoder("tag table poisoned".to_string()))?;

        let slot = match table.iter().position(|d| d == data) {
            Some(slot) => slot,
            None => {
                table.push(data.to_vec());
                table.len() - 1
            }
        };

        let tag = u8::try_from(slot).map_err(|_| ScanError::Encoder("tag table full".to_string()))?;
        Ok(symbol(tag))
    }
}

impl SymbolDecoder for TaggedSymbols {
    fn decode(&self, region: &GrayImage) -> Option<Vec<u8>> {
        let tag = read_tag(region)?;
        self.table.lock().ok()?.get(tag as usize).cloned()
    }
}

/// A page with the sync marker and nothing else.
pub fn blank_page(scale: u32) -> GrayImage {
    let scale = scale.max(1);
    let mut canvas = GrayImage::from_pixel(NW * scale, NH * scale, Luma([255]));
    page::draw_marker(&mut canvas, scale);
    canvas
}
