use std::f64::consts::PI;

use image::imageops::{self, FilterType};
use image::GrayImage;
use log::debug;
use serde::Deserialize;
use serde::Serialize;

use crate::filter;

// Reference resolution every page is resampled to before segmenting
pub const NW: u32 = 420;
pub const NH: u32 = 594;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    // Pixels strictly above this are background
    pub contrast: u8,
    pub row_threshold: f64,
    pub column_threshold: f64,

    // Bands thinner than this (normalized pixels) are skipped
    pub min_distance: u32,

    // Grown around each region before cropping (native pixels)
    pub margin: u32,

    // Fraction of the page height searched for the sync marker
    pub baseline_zone: (f64, f64),
    pub baseline_rise: f64,
    pub baseline_drop: f64,

    // Minimum (max - min) / max of the marker statistic
    pub plateau: f64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        SegmentConfig {
            contrast: 128,
            row_threshold: 0.95,
            column_threshold: 0.9,
            min_distance: 10,
            margin: 4,
            baseline_zone: (0.15, 0.33),
            baseline_rise: 0.2,
            baseline_drop: -0.2,
            plateau: 0.5,
        }
    }
}

/// Rectangle in native image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub baseline: u32,

    // Everything above the marker zone, where the index symbol lives
    pub header: Region,

    // Candidate block regions, row by row
    pub regions: Vec<Region>,
}

/// Resample to the reference resolution, returns the x and y ratios.
pub fn normalize_image(image: &GrayImage) -> (GrayImage, f64, f64) {
    let (w, h) = image.dimensions();
    let normalized = imageops::resize(image, NW, NH, FilterType::Triangle);

    (normalized, NW as f64 / w as f64, NH as f64 / h as f64)
}

// Real DFT restricted to the upper half of the spectrum, tables computed once
// per row width.
struct Spectrum {
    n: usize,
    cos: Vec<f64>,
    sin: Vec<f64>,
}

impl Spectrum {
    fn new(n: usize) -> Self {
        let step = 2.0 * PI / n as f64;
        Spectrum {
            n,
            cos: (0..n).map(|j| (step * j as f64).cos()).collect(),
            sin: (0..n).map(|j| (step * j as f64).sin()).collect(),
        }
    }

    // Sum of |X_k| for k in [n/8, n/2]
    fn high_band(&self, row: &[u8]) -> f64 {
        let mut energy = 0.0;
        for k in (self.n / 8)..=(self.n / 2) {
            let (mut re, mut im) = (0.0, 0.0);
            for (j, x) in row.iter().enumerate() {
                let t = (k * j) % self.n;
                re += *x as f64 * self.cos[t];
                im -= *x as f64 * self.sin[t];
            }
            energy += (re * re + im * im).sqrt();
        }
        energy
    }
}

// Normalized marker energy below which a row counts as clear
const MARKER_FADE: f64 = 0.1;

fn zone_bounds(config: &SegmentConfig, height: u32) -> (u32, u32) {
    let top = ((NH as f64 * config.baseline_zone.0) as u32).min(height);
    let bottom = ((NH as f64 * config.baseline_zone.1) as u32).min(height);
    (top, bottom.max(top))
}

/// Where the sync marker sits, in normalized rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub baseline: u32,

    // First row under the baseline clear of the stripes
    pub end: u32,
}

/// Find the sync marker in a normalized image.
///
/// The marker is a band of fine vertical stripes, so rows crossing it carry
/// far more high frequency energy than the rows around it. `None` when the
/// zone holds no distinct plateau.
pub fn find_marker(normalized: &GrayImage, config: &SegmentConfig) -> Option<Marker> {
    let width = normalized.width() as usize;
    if width == 0 {
        return None;
    }

    let (top, bottom) = zone_bounds(config, normalized.height());
    let raw = normalized.as_raw();
    let spectrum = Spectrum::new(width);

    let energy: Vec<f64> = (top..bottom)
        .map(|y| {
            let start = y as usize * width;
            spectrum.high_band(&raw[start..start + width])
        })
        .collect();

    let max = energy.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = energy.iter().copied().fold(f64::INFINITY, f64::min);
    if !max.is_finite() || max <= 0.0 || (max - min) / max < config.plateau {
        debug!("No marker plateau in zone {}..{}", top, bottom);
        return None;
    }

    let energy = filter::normalize(&energy);
    let rises = filter::diff_rise_drop(&energy, config.baseline_rise, config.baseline_drop);
    let line = *rises.first()?;

    // Blurred edge rows still carry some stripe energy
    let end = (line..energy.len())
        .find(|i| energy[*i] < MARKER_FADE)
        .unwrap_or(energy.len());

    Some(Marker {
        baseline: line as u32 + top,
        end: end as u32 + top,
    })
}

// Fraction of background pixels between the outermost background pixels
fn clearance<I: IntoIterator<Item = u8>>(pixels: I, contrast: u8) -> f64 {
    let mut first = None;
    let mut last = 0;
    let mut bright = 0usize;

    for (i, p) in pixels.into_iter().enumerate() {
        if p > contrast {
            if first.is_none() {
                first = Some(i);
            }
            last = i;
            bright += 1;
        }
    }

    match first {
        Some(f) => bright as f64 / (last - f + 1) as f64,
        None => 0.0,
    }
}

/// Horizontal cut lines from row `from` down, in normalized pixels.
pub fn row_cut_lines(normalized: &GrayImage, from: u32, config: &SegmentConfig) -> Vec<u32> {
    let width = normalized.width() as usize;
    let raw = normalized.as_raw();

    let profile: Vec<f64> = (from..normalized.height())
        .map(|y| {
            let start = y as usize * width;
            clearance(raw[start..start + width].iter().copied(), config.contrast)
        })
        .collect();

    filter::schmitt_rise_drop(
        &filter::normalize(&profile),
        config.row_threshold,
        config.row_threshold,
    )
    .into_iter()
    .map(|l| l as u32 + from)
    .collect()
}

/// Vertical cut lines within the band `y0..y1`, in normalized pixels.
pub fn column_cut_lines(
    normalized: &GrayImage,
    y0: u32,
    y1: u32,
    config: &SegmentConfig,
) -> Vec<u32> {
    let width = normalized.width() as usize;
    let raw = normalized.as_raw();
    let (y0, y1) = (y0.min(y1) as usize, y0.max(y1) as usize);

    let profile: Vec<f64> = (0..width)
        .map(|x| clearance((y0..y1).map(|y| raw[y * width + x]), config.contrast))
        .collect();

    filter::schmitt_rise_drop(
        &filter::normalize(&profile),
        config.column_threshold,
        config.column_threshold,
    )
    .into_iter()
    .map(|l| l as u32)
    .collect()
}

fn with_bounds(mut lines: Vec<u32>, low: u32, high: u32) -> Vec<u32> {
    lines.push(low);
    lines.push(high);
    lines.sort_unstable();
    lines.dedup();
    lines
}

/// Locate the header and every candidate block region of a page.
///
/// `None` when the page has no recognizable sync marker.
pub fn segment(image: &GrayImage, config: &SegmentConfig) -> Option<Layout> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return None;
    }

    let (normalized, rw, rh) = normalize_image(image);
    let marker = find_marker(&normalized, config)?;
    let baseline = marker.baseline;

    // 1. Rows, profiled from below the stripes
    let rows = with_bounds(row_cut_lines(&normalized, marker.end, config), baseline, NH);
    debug!(
        "Row cut: {:?}",
        rows.iter().map(|y| (*y as f64 / rh) as u32).collect::<Vec<_>>()
    );

    // 2. Columns within each row band, then rescale to native
    let mut regions = Vec::new();
    for band in rows.windows(2) {
        let (ny0, ny1) = (band[0], band[1]);
        if ny1 - ny0 < config.min_distance {
            continue;
        }

        let columns = with_bounds(column_cut_lines(&normalized, ny0, ny1, config), 0, NW);
        debug!(
            "Column cut at {}: {:?}",
            (ny0 as f64 / rh) as u32,
            columns.iter().map(|x| (*x as f64 / rw) as u32).collect::<Vec<_>>()
        );

        for cell in columns.windows(2) {
            let (nx0, nx1) = (cell[0], cell[1]);
            if nx1 - nx0 < config.min_distance {
                continue;
            }

            let (x0, x1) = ((nx0 as f64 / rw) as u32, (nx1 as f64 / rw) as u32);
            let (y0, y1) = ((ny0 as f64 / rh) as u32, (ny1 as f64 / rh) as u32);
            regions.push(Region {
                x: x0,
                y: y0,
                width: x1.min(w) - x0.min(w),
                height: y1.min(h) - y0.min(h),
            });
        }
    }

    let (zone_top, _) = zone_bounds(config, NH);
    Some(Layout {
        baseline: (baseline as f64 / rh) as u32,
        header: Region {
            x: 0,
            y: 0,
            width: w,
            height: ((zone_top as f64 / rh) as u32).min(h),
        },
        regions,
    })
}

#[cfg(test)]
mod test_segment {
    use super::*;
    use image::Luma;

    // Solid frame with a checkered inside, roughly half ink like a real symbol
    fn draw_symbol(page: &mut GrayImage, x: u32, y: u32, side: u32) {
        let module = side / 10;
        for dy in 0..side {
            for dx in 0..side {
                let frame =
                    dx < module || dy < module || dx >= side - module || dy >= side - module;
                let checker = ((dx / module) + (dy / module)) % 2 == 0;
                if frame || checker {
                    page.put_pixel(x + dx, y + dy, Luma([0]));
                }
            }
        }
    }

    // Same geometry the raster page uses, drawn by hand
    fn synthetic_page(scale: u32, rows: u32, columns: u32) -> (GrayImage, Vec<(u32, u32)>) {
        sparse_page(scale, rows, columns, (rows * columns) as usize)
    }

    fn sparse_page(
        scale: u32,
        rows: u32,
        columns: u32,
        filled: usize,
    ) -> (GrayImage, Vec<(u32, u32)>) {
        let (w, h) = (NW * scale, NH * scale);
        let mut page = GrayImage::from_pixel(w, h, Luma([255]));

        let (my0, my1) = ((h as f64 * 0.225) as u32, (h as f64 * 0.255) as u32);
        let (mx0, mx1) = ((w as f64 * 0.03) as u32, (w as f64 * 0.97) as u32);
        for y in my0..my1 {
            for x in mx0..mx1 {
                if ((x - mx0) / (2 * scale)) % 2 == 0 {
                    page.put_pixel(x, y, Luma([0]));
                }
            }
        }

        let (gx0, gx1) = (w as f64 * 0.03, w as f64 * 0.97);
        let (gy0, gy1) = (h as f64 * 0.34, h as f64 * 0.98);
        let cw = (gx1 - gx0) / columns as f64;
        let ch = (gy1 - gy0) / rows as f64;
        let side = (cw.min(ch) * 0.85) as u32;

        let mut centres = Vec::new();
        for r in 0..rows {
            for c in 0..columns {
                if centres.len() == filled {
                    break;
                }
                let x = (gx0 + cw * c as f64 + (cw - side as f64) / 2.0) as u32;
                let y = (gy0 + ch * r as f64 + (ch - side as f64) / 2.0) as u32;
                draw_symbol(&mut page, x, y, side);
                centres.push((x + side / 2, y + side / 2));
            }
        }
        (page, centres)
    }

    #[test]
    fn clearance_profile() {
        assert_eq!(clearance([0u8, 0, 0], 128), 0.0);
        assert_eq!(clearance([255u8, 255, 255], 128), 1.0);
        assert_eq!(clearance([0u8, 255, 0, 255, 0], 128), 2.0 / 3.0);
        assert_eq!(clearance([128u8, 129], 128), 1.0);
    }

    #[test]
    fn finds_every_symbol() {
        let (page, centres) = synthetic_page(2, 6, 6);
        let layout = segment(&page, &SegmentConfig::default()).unwrap();

        // Baseline sits inside the marker band
        let height = page.height() as f64;
        let (my0, my1) = ((height * 0.225) as u32, (height * 0.255) as u32);
        assert!(
            layout.baseline >= my0 - 4 && layout.baseline <= my1 + 4,
            "baseline {}",
            layout.baseline
        );

        for (cx, cy) in centres.iter() {
            let hits = layout.regions.iter().filter(|r| r.contains(*cx, *cy)).count();
            assert_eq!(hits, 1, "symbol at {},{} in {} regions", cx, cy, hits);
        }

        // Each symbol gets its own region
        let occupied = layout
            .regions
            .iter()
            .filter(|r| centres.iter().any(|(x, y)| r.contains(*x, *y)))
            .count();
        assert_eq!(occupied, centres.len());
    }

    #[test]
    fn other_grid_sizes() {
        for (rows, columns) in [(5, 5), (7, 7), (2, 3)] {
            let (page, centres) = synthetic_page(1, rows, columns);
            let layout = segment(&page, &SegmentConfig::default()).unwrap();

            for (cx, cy) in centres.iter() {
                assert!(
                    layout.regions.iter().any(|r| r.contains(*cx, *cy)),
                    "{}x{}: symbol at {},{} missed",
                    rows,
                    columns,
                    cx,
                    cy
                );
            }
        }
    }

    #[test]
    fn sparse_pages() {
        for filled in [1, 2, 3, 4, 7, 8, 13] {
            let (page, centres) = sparse_page(2, 6, 6, filled);
            let layout = segment(&page, &SegmentConfig::default()).unwrap();

            for (cx, cy) in centres.iter() {
                let hits: Vec<_> = layout.regions.iter().filter(|r| r.contains(*cx, *cy)).collect();
                assert_eq!(hits.len(), 1, "{} filled: symbol at {},{}", filled, cx, cy);

                // The region holds the whole symbol, not a slice of it
                let side = (page.height() as f64 * 0.64 / 6.0 * 0.85) as u32;
                assert!(hits[0].height >= side && hits[0].width >= side, "{:?}", hits[0]);
            }
        }
    }

    #[test]
    fn marker_span() {
        let (page, _) = synthetic_page(1, 6, 6);
        let marker = find_marker(&page, &SegmentConfig::default()).unwrap();

        assert!(marker.baseline > zone_bounds(&SegmentConfig::default(), NH).0);
        assert!(marker.end > marker.baseline);
        assert!(marker.end <= (NH as f64 * 0.255) as u32 + 2);
    }

    #[test]
    fn deterministic() {
        let (page, _) = synthetic_page(1, 6, 6);
        let config = SegmentConfig::default();

        assert_eq!(segment(&page, &config), segment(&page, &config));
    }

    #[test]
    fn header_above_marker() {
        let (page, _) = synthetic_page(1, 6, 6);
        let layout = segment(&page, &SegmentConfig::default()).unwrap();

        assert_eq!(layout.header.y, 0);
        assert_eq!(layout.header.width, page.width());
        assert!(layout.header.height < layout.baseline);
        assert!(layout.header.height as f64 >= page.height() as f64 * 0.13);
    }

    #[test]
    fn blank_page_not_recognized() {
        let page = GrayImage::from_pixel(NW, NH, Luma([255]));

        assert_eq!(segment(&page, &SegmentConfig::default()), None);
    }

    #[test]
    fn noise_page_not_recognized() {
        // Small LCG so the noise is the same on every run
        let mut state: u32 = 0x2545_f491;
        let page = GrayImage::from_fn(NW, NH, |_, _| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            Luma([(state >> 24) as u8])
        });

        assert_eq!(segment(&page, &SegmentConfig::default()), None);
    }

    #[test]
    fn empty_image() {
        assert_eq!(segment(&GrayImage::new(0, 0), &SegmentConfig::default()), None);
    }
}
