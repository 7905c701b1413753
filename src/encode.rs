use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use image::GrayImage;
use image::ImageFormat;
use log::{info, warn};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use ncore::key::{self, PageKey};
use nscan::page::RasterPage;
use nscan::qrencode::Qrencode;
use nscan::{EccLevel, PageContent, PageMeta, PageRenderer, SymbolEncoder};
use nslice::{block, slicer, Geometry};

use crate::cli::Config;

pub const MAX_TITLE: usize = 64;

fn validate_title(title: &str) -> Result<()> {
    ensure!(
        title.len() <= MAX_TITLE,
        "title exceeds {} characters",
        MAX_TITLE
    );
    ensure!(
        title.bytes().all(|c| (0x20..0x7f).contains(&c)),
        "title must be printable ascii"
    );
    Ok(())
}

/// Everything that goes on a page, up to the rendered image.
pub struct PageJob<'a> {
    pub payload: &'a [u8],
    pub filename: Option<&'a str>,
    pub title: &'a str,
    pub date: &'a str,
    pub geometry: Geometry,
    pub ecc: EccLevel,
    pub key: Option<PageKey>,
}

pub fn render_page<E, R>(job: &PageJob, encoder: &E, renderer: &R) -> Result<R::Output>
where
    E: SymbolEncoder + ?Sized,
    R: PageRenderer,
{
    validate_title(job.title)?;

    let (index, chunks) = slicer::encode(job.payload, job.filename, &job.geometry, job.key)?;

    let index_json = index.to_json()?;
    let index_symbol = encoder
        .encode(index_json.as_bytes(), job.ecc)
        .context("encoding the index symbol")?;

    let blocks = chunks
        .iter()
        .map(|chunk| encoder.encode(block::format(chunk).as_bytes(), job.ecc))
        .collect::<nscan::Result<Vec<_>>>()
        .context("encoding block symbols")?;

    let content = PageContent {
        meta: PageMeta {
            title: job.title.to_string(),
            fingerprint: index.fingerprint,
            blocks: blocks.len(),
            filename: index.filename.clone(),
            date: job.date.to_string(),
        },
        index: index_symbol,
        blocks,
    };

    Ok(renderer.render(&content)?)
}

// Only the last path component, and only when the index can carry it
fn index_filename(input: &Path) -> Option<&str> {
    let name = input.file_name()?.to_str()?;
    match slicer::validate_filename(name) {
        Ok(()) => Some(name),
        Err(e) => {
            warn!("Not recording filename {:?} in the index: {}", name, e);
            None
        }
    }
}

fn default_output(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".nddpef.png");
    PathBuf::from(name)
}

pub fn run(
    config: &Config,
    input: &Path,
    output: Option<&Path>,
    title: Option<&str>,
    size: Option<u8>,
    seal: bool,
) -> Result<()> {
    let payload = fs::read(input).with_context(|| format!("reading {:?}", input))?;

    let date = OffsetDateTime::now_utc().replace_nanosecond(0)?.format(&Rfc3339)?;

    let key = if seal {
        key::init()?;
        Some(PageKey::generate())
    } else {
        None
    };

    let job = PageJob {
        payload: &payload,
        filename: index_filename(input),
        title: title.unwrap_or(""),
        date: &date,
        geometry: config.geometry(size),
        ecc: config.ecc,
        key,
    };
    let renderer = RasterPage {
        scale: config.page.scale,
        rows: job.geometry.rows,
        columns: job.geometry.columns,
    };
    let page: GrayImage = render_page(&job, &Qrencode::new(&config.tools.qrencode), &renderer)?;

    let output = output.map(Path::to_path_buf).unwrap_or_else(|| default_output(input));
    page.save_with_format(&output, ImageFormat::Png)
        .with_context(|| format!("writing {:?}", output))?;

    info!("Page written to {:?}", output);
    Ok(())
}
