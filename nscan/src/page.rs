use ab_glyph::{FontRef, PxScale};
use image::imageops::{self, FilterType};
use image::GrayImage;
use image::Luma;
use imageproc::drawing::{draw_text_mut, text_size};
use log::debug;

use crate::segment::{NH, NW};
use crate::{PageContent, PageMeta, PageRenderer, Result, ScanError};

static FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

// Page bands as fractions of the page height (y) or width (x)
const INDEX_Y: f64 = 0.02;
const INDEX_SIDE: f64 = 0.11;
const MARKER_Y: (f64, f64) = (0.225, 0.255);
const GRID_Y: (f64, f64) = (0.34, 0.98);
const BODY_X: (f64, f64) = (0.03, 0.97);

// Share of a grid cell a symbol may take
const FILL: f64 = 0.85;

// Gap between the index symbol and the header text, of the page width
const HEADER_GAP: f64 = 0.02;

const WHITE: Luma<u8> = Luma([255]);
const BLACK: Luma<u8> = Luma([0]);

/// Block grid geometry, in page pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    pub rows: usize,
    pub columns: usize,
    pub left: f64,
    pub top: f64,
    pub cell_width: f64,
    pub cell_height: f64,
}

/// Next free cell of a [`GridLayout`], filled row by row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub row: usize,
    pub column: usize,
}

impl GridLayout {
    pub fn new(rows: usize, columns: usize, width: u32, height: u32) -> Self {
        let left = width as f64 * BODY_X.0;
        let top = height as f64 * GRID_Y.0;

        GridLayout {
            rows,
            columns,
            left,
            top,
            cell_width: (width as f64 * BODY_X.1 - left) / columns.max(1) as f64,
            cell_height: (height as f64 * GRID_Y.1 - top) / rows.max(1) as f64,
        }
    }

    pub fn capacity(&self) -> usize {
        self.rows * self.columns
    }

    /// Every cell in fill order.
    pub fn cells(&self) -> impl Iterator<Item = Cursor> + '_ {
        let first = (self.capacity() > 0).then_some(Cursor::default());
        std::iter::successors(first, move |at| at.advance(self))
    }

    /// Top left corner of the cell under `cursor`.
    pub fn origin(&self, cursor: &Cursor) -> (f64, f64) {
        (
            self.left + self.cell_width * cursor.column as f64,
            self.top + self.cell_height * cursor.row as f64,
        )
    }
}

impl Cursor {
    pub fn advance(self, layout: &GridLayout) -> Option<Cursor> {
        let next = if self.column + 1 < layout.columns {
            Cursor {
                row: self.row,
                column: self.column + 1,
            }
        } else {
            Cursor {
                row: self.row + 1,
                column: 0,
            }
        };

        if next.row < layout.rows {
            Some(next)
        } else {
            None
        }
    }
}

// Nearest neighbour keeps module edges sharp
fn fit(symbol: &GrayImage, side: u32) -> GrayImage {
    let (w, h) = symbol.dimensions();
    if w == 0 || h == 0 || side == 0 {
        return GrayImage::new(0, 0);
    }

    let ratio = (side as f64 / w as f64).min(side as f64 / h as f64);
    let (nw, nh) = (
        ((w as f64 * ratio) as u32).max(1),
        ((h as f64 * ratio) as u32).max(1),
    );
    imageops::resize(symbol, nw, nh, FilterType::Nearest)
}

// Center `symbol` in the box at (x, y) of size (w, h)
fn place(canvas: &mut GrayImage, symbol: &GrayImage, x: f64, y: f64, w: f64, h: f64) {
    let (sw, sh) = symbol.dimensions();
    let sx = x + (w - sw as f64) / 2.0;
    let sy = y + (h - sh as f64) / 2.0;
    imageops::overlay(canvas, symbol, sx as i64, sy as i64);
}

/// Paints the sync marker: vertical stripes two scale units wide.
pub fn draw_marker(canvas: &mut GrayImage, scale: u32) {
    let (w, h) = canvas.dimensions();
    let (x0, x1) = ((w as f64 * BODY_X.0) as u32, (w as f64 * BODY_X.1) as u32);
    let (y0, y1) = ((h as f64 * MARKER_Y.0) as u32, (h as f64 * MARKER_Y.1) as u32);
    let stripe = 2 * scale.max(1);

    for y in y0..y1 {
        for x in x0..x1 {
            if ((x - x0) / stripe) % 2 == 0 {
                canvas.put_pixel(x, y, BLACK);
            }
        }
    }
}

/// Text printed beside the index symbol, one entry per line.
pub fn header_lines(meta: &PageMeta) -> Vec<String> {
    let fingerprint = meta.fingerprint.to_string();
    let groups: Vec<&str> = fingerprint
        .as_bytes()
        .chunks(8)
        .filter_map(|g| std::str::from_utf8(g).ok())
        .collect();
    let (first, second) = groups.split_at(groups.len().min(2));

    let mut lines = vec![
        format!("Title: {}", meta.title),
        format!("Total blocks: {}", meta.blocks),
        format!("Fingerprint: {}", first.join(" ")),
        format!("             {}", second.join(" ")),
        format!("Date: {}", meta.date),
    ];
    if let Some(name) = &meta.filename {
        lines.insert(2, format!("File: {}", name));
    }
    lines
}

// Lines share the box height evenly, a line too wide for the box shrinks
fn draw_header(
    canvas: &mut GrayImage,
    meta: &PageMeta,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
) -> Result<()> {
    let font = FontRef::try_from_slice(FONT)?;
    let lines = header_lines(meta);
    let pitch = h / lines.len() as f64;

    for (i, line) in lines.iter().enumerate() {
        let mut scale = PxScale::from((pitch * 0.7) as f32);
        let (width, _) = text_size(scale, &font, line);
        if width as f64 > w {
            scale = PxScale::from(scale.y * (w / width as f64) as f32);
        }

        let top = y + pitch * i as f64;
        draw_text_mut(canvas, BLACK, x as i32, top as i32, scale, &font, line);
    }
    Ok(())
}

/// White page at `scale` times the reference resolution.
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub scale: u32,
    pub rows: usize,
    pub columns: usize,
}

impl RasterPage {
    pub fn dimensions(&self) -> (u32, u32) {
        let scale = self.scale.max(1);
        (NW * scale, NH * scale)
    }
}

impl PageRenderer for RasterPage {
    type Output = GrayImage;

    fn render(&self, content: &PageContent) -> Result<GrayImage> {
        let (w, h) = self.dimensions();
        let layout = GridLayout::new(self.rows, self.columns, w, h);

        if content.blocks.len() > layout.capacity() {
            return Err(ScanError::Overflow {
                capacity: layout.capacity(),
                blocks: content.blocks.len(),
            });
        }

        debug!(
            "Rendering {:?} [{}] {} blocks, file: {:?}",
            content.meta.title,
            content.meta.fingerprint,
            content.meta.blocks,
            content.meta.filename
        );

        let mut canvas = GrayImage::from_pixel(w, h, WHITE);

        // Header
        let side = h as f64 * INDEX_SIDE;
        let (left, top) = (w as f64 * BODY_X.0, h as f64 * INDEX_Y);
        place(&mut canvas, &fit(&content.index, side as u32), left, top, side, side);

        let text_left = left + side + w as f64 * HEADER_GAP;
        let text_width = w as f64 * BODY_X.1 - text_left;
        draw_header(&mut canvas, &content.meta, text_left, top, text_width, side)?;

        draw_marker(&mut canvas, self.scale);

        // Body
        let side = (layout.cell_width.min(layout.cell_height) * FILL) as u32;
        for (block, at) in content.blocks.iter().zip(layout.cells()) {
            let (x, y) = layout.origin(&at);
            place(
                &mut canvas,
                &fit(block, side),
                x,
                y,
                layout.cell_width,
                layout.cell_height,
            );
        }

        Ok(canvas)
    }
}
