use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use thiserror::Error;

use nscan::recover;
use nscan::zbar::Zbarimg;
use nscan::{ScanConfig, SymbolDecoder};
use nslice::{Document, Outcome, Session};

use crate::cli::Config;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("--output given but {0} documents were recovered")]
    Ambiguous(usize),
    #[error("refusing to overwrite {0:?}")]
    Exists(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

fn read_input<D>(input: &Path, decoder: &D, scan: &ScanConfig) -> Result<String>
where
    D: SymbolDecoder + ?Sized,
{
    if is_image(input) {
        let tokens = recover::scan_file(input, decoder, scan)
            .with_context(|| format!("scanning {:?}", input))?;
        Ok(tokens.join("\n"))
    } else {
        // Decoder dumps are not always clean utf-8, blocks are ascii anyway
        let raw = fs::read(input).with_context(|| format!("reading {:?}", input))?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

/// Feed every input into the session, scanning images on the way.
///
/// An input that cannot be read is skipped with a warning; returns how many
/// were skipped.
pub fn absorb_inputs<D>(
    session: &mut Session,
    inputs: &[PathBuf],
    decoder: &D,
    scan: &ScanConfig,
) -> usize
where
    D: SymbolDecoder + ?Sized,
{
    let mut skipped = 0;
    for input in inputs {
        let text = match read_input(input, decoder, scan) {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping {:?}: {:#}", input, e);
                skipped += 1;
                continue;
            }
        };

        let got = session.absorb(&text);
        info!(
            "{:?}: {} blocks ({} new), {} indexes ({} new)",
            input, got.blocks, got.new_blocks, got.indexes, got.new_indexes
        );
    }
    skipped
}

// The index filename is a suggestion, never a path
fn suggested_name(doc: &Document) -> Option<&str> {
    let name = Path::new(doc.filename.as_deref()?).file_name()?.to_str()?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Places to try for `doc`, in order.
pub fn targets(doc: &Document, output: Option<&Path>, dir: &Path) -> Vec<PathBuf> {
    if let Some(output) = output {
        return vec![output.to_path_buf()];
    }

    let mut paths = Vec::new();
    if let Some(name) = suggested_name(doc) {
        paths.push(dir.join(name));
    }
    paths.push(dir.join(format!("{}.nddpef", doc.fingerprint)));
    paths
}

/// Write `doc` to the first target that does not exist yet.
pub fn write_new(doc: &Document, targets: &[PathBuf]) -> std::result::Result<PathBuf, OutputError> {
    for path in targets {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(&doc.data)?;
                return Ok(path.clone());
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!("{:?} exists, not overwriting", path);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let last = targets.last().cloned().unwrap_or_default();
    Err(OutputError::Exists(last))
}

#[derive(Debug, Default)]
pub struct Report {
    pub written: Vec<PathBuf>,
    pub unwritten: usize,
    pub pending: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub fn write_outcomes(outcomes: &[Outcome], output: Option<&Path>, dir: &Path) -> Result<Report> {
    let recovered = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Recovered(_)))
        .count();
    if output.is_some() && recovered > 1 {
        return Err(OutputError::Ambiguous(recovered).into());
    }

    let mut report = Report::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Recovered(doc) => match write_new(doc, &targets(doc, output, dir)) {
                Ok(path) => {
                    println!("Found data written to {}", path.display());
                    report.written.push(path);
                }
                Err(e) => {
                    println!("[{}] recovered but not written: {}", doc.fingerprint, e);
                    report.unwritten += 1;
                }
            },
            Outcome::Pending { fingerprint, missing } => {
                println!("[{}] {} blocks missing", fingerprint, missing.len());
                for checksum in missing {
                    println!("\t{} not found.", checksum);
                }
                report.pending += 1;
            }
            Outcome::Failed { fingerprint, error } => {
                println!("[{}] failed in decoding: {}", fingerprint, error);
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

pub fn run(config: &Config, inputs: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let decoder = Zbarimg::new(&config.tools.zbarimg);

    let mut session = Session::new();
    let skipped = absorb_inputs(&mut session, inputs, &decoder, &config.scan);

    let outcomes = session.reconstruct();
    if outcomes.is_empty() {
        println!("No index found.");
        if skipped > 0 {
            println!("{} inputs could not be read.", skipped);
        }
        return Ok(());
    }

    let mut report = write_outcomes(&outcomes, output, Path::new("."))?;
    report.skipped = skipped;
    info!(
        "{} written, {} unwritten, {} pending, {} failed, {} inputs skipped",
        report.written.len(),
        report.unwritten,
        report.pending,
        report.failed,
        report.skipped
    );
    Ok(())
}

#[cfg(test)]
mod test_decode {
    use super::*;
    use image::ImageFormat;
    use ncore::hash;
    use ncore::key::{self, PageKey};
    use nscan::page::RasterPage;
    use nscan::testkit::TaggedSymbols;
    use nscan::EccLevel;
    use nslice::{block, slicer, Geometry};
    use tempfile::tempdir;

    use crate::encode::{render_page, PageJob};

    fn document(name: Option<&str>) -> Document {
        Document {
            fingerprint: hash::fingerprint(b"data"),
            data: b"data".to_vec(),
            filename: name.map(|n| n.to_string()),
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn image_inputs() {
        assert!(is_image(Path::new("scan.png")));
        assert!(is_image(Path::new("scan.JPG")));
        assert!(is_image(Path::new("a/b/scan.jpeg")));
        assert!(!is_image(Path::new("scan.txt")));
        assert!(!is_image(Path::new("png")));
    }

    #[test]
    fn target_order() {
        let dir = Path::new("/out");
        let doc = document(Some("../../etc/passwd"));

        assert_eq!(
            targets(&doc, None, dir),
            vec![
                PathBuf::from("/out/passwd"),
                PathBuf::from(format!("/out/{}.nddpef", doc.fingerprint))
            ]
        );
        assert_eq!(
            targets(&document(None), None, dir),
            vec![PathBuf::from(format!("/out/{}.nddpef", doc.fingerprint))]
        );
        assert_eq!(
            targets(&doc, Some(Path::new("mine.bin")), dir),
            vec![PathBuf::from("mine.bin")]
        );
    }

    #[test]
    fn never_overwrites() {
        let dir = tempdir().unwrap();
        let doc = document(Some("data.txt"));
        fs::write(dir.path().join("data.txt"), b"keep me").unwrap();

        let paths = targets(&doc, None, dir.path());
        let written = write_new(&doc, &paths).unwrap();
        assert_eq!(written, dir.path().join(format!("{}.nddpef", doc.fingerprint)));
        assert_eq!(fs::read(dir.path().join("data.txt")).unwrap(), b"keep me");

        // Both taken now
        assert!(matches!(write_new(&doc, &paths), Err(OutputError::Exists(_))));
    }

    #[test]
    fn output_needs_single_document() {
        let dir = tempdir().unwrap();
        let outcomes = vec![
            Outcome::Recovered(document(Some("a"))),
            Outcome::Recovered(document(Some("b"))),
        ];

        let output = dir.path().join("x");

        assert!(write_outcomes(&outcomes, Some(output.as_path()), dir.path()).is_err());
        assert!(!dir.path().join("x").exists());
    }

    #[test]
    fn text_input_roundtrip() {
        let dir = tempdir().unwrap();
        let data = sample(1000);
        let (index, chunks) =
            slicer::encode(&data, Some("notes.bin"), &Geometry::default(), None).unwrap();
        assert_eq!(chunks.len(), 3);

        // Scan results arrive in any order, with noise, split over files
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        let noisy = format!("QR-Code:{}\nQR-Code:garbage\n", block::format(&chunks[2]));
        fs::write(&first, noisy).unwrap();
        fs::write(
            &second,
            format!(
                "{}\n{}\n{}\n",
                block::format(&chunks[1]),
                index.to_json().unwrap(),
                block::format(&chunks[0])
            ),
        )
        .unwrap();

        let symbols = TaggedSymbols::new();
        let scan = ScanConfig::default();

        let mut session = Session::new();
        absorb_inputs(&mut session, &[second.clone()], &symbols, &scan);
        let report = write_outcomes(&session.reconstruct(), None, dir.path()).unwrap();
        assert_eq!(report.pending, 1);
        assert!(report.written.is_empty());

        absorb_inputs(&mut session, &[first], &symbols, &scan);
        let report = write_outcomes(&session.reconstruct(), None, dir.path()).unwrap();
        assert_eq!(report.written, vec![dir.path().join("notes.bin")]);
        assert_eq!(fs::read(dir.path().join("notes.bin")).unwrap(), data);
    }

    #[test]
    fn bad_inputs_are_skipped() {
        let dir = tempdir().unwrap();
        let data = sample(300);
        let (index, chunks) =
            slicer::encode(&data, Some("kept.bin"), &Geometry::default(), None).unwrap();
        assert_eq!(chunks.len(), 1);

        // Blocks survive in a dump with invalid utf-8 around them
        let mut dirty = vec![0xff, 0xfe, b'\n'];
        dirty.extend_from_slice(block::format(&chunks[0]).as_bytes());
        dirty.extend_from_slice(b"\n\xc3\x28\n");

        let good = dir.path().join("index.txt");
        let dump = dir.path().join("dump.txt");
        let broken = dir.path().join("broken.png");
        fs::write(&good, index.to_json().unwrap()).unwrap();
        fs::write(&dump, dirty).unwrap();
        fs::write(&broken, b"not a png").unwrap();
        let inputs = vec![good, dir.path().join("missing.txt"), broken, dump];

        let mut session = Session::new();
        let skipped = absorb_inputs(
            &mut session,
            &inputs,
            &TaggedSymbols::new(),
            &ScanConfig::default(),
        );
        assert_eq!(skipped, 2);

        let report = write_outcomes(&session.reconstruct(), None, dir.path()).unwrap();
        assert_eq!(report.written, vec![dir.path().join("kept.bin")]);
        assert_eq!(fs::read(dir.path().join("kept.bin")).unwrap(), data);
    }

    #[test]
    fn blocked_document_does_not_stop_others() {
        let dir = tempdir().unwrap();
        let a = document(Some("a"));
        let b = Document {
            fingerprint: hash::fingerprint(b"other"),
            data: b"other".to_vec(),
            filename: Some("b".to_string()),
        };

        // Every place `a` could go is taken
        for path in targets(&a, None, dir.path()) {
            fs::write(path, b"taken").unwrap();
        }

        let outcomes = vec![Outcome::Recovered(a), Outcome::Recovered(b)];
        let report = write_outcomes(&outcomes, None, dir.path()).unwrap();

        assert_eq!(report.unwritten, 1);
        assert_eq!(report.written, vec![dir.path().join("b")]);
        assert_eq!(fs::read(dir.path().join("b")).unwrap(), b"other");
        assert_eq!(fs::read(dir.path().join("a")).unwrap(), b"taken");
    }

    fn page_roundtrip(data: &[u8], seal: bool) {
        let dir = tempdir().unwrap();
        let symbols = TaggedSymbols::new();
        let key = if seal {
            key::init().unwrap();
            Some(PageKey::generate())
        } else {
            None
        };

        let job = PageJob {
            payload: data,
            filename: Some("paper.bin"),
            title: "roundtrip",
            date: "2026-10-18T09:00:00Z",
            geometry: Geometry::default(),
            ecc: EccLevel::Low,
            key,
        };
        let renderer = RasterPage {
            scale: 2,
            rows: 6,
            columns: 6,
        };
        let page = render_page(&job, &symbols, &renderer).unwrap();
        let path = dir.path().join("page.png");
        page.save_with_format(&path, ImageFormat::Png).unwrap();

        let mut session = Session::new();
        let skipped = absorb_inputs(&mut session, &[path], &symbols, &ScanConfig::default());
        assert_eq!(skipped, 0);
        let report = write_outcomes(&session.reconstruct(), None, dir.path()).unwrap();

        assert_eq!(report.written, vec![dir.path().join("paper.bin")]);
        assert_eq!(fs::read(dir.path().join("paper.bin")).unwrap(), data);
    }

    #[test]
    fn page_image_roundtrip() {
        page_roundtrip(&sample(1500), false);
    }

    #[test]
    fn sealed_page_image_roundtrip() {
        page_roundtrip(&sample(700), true);
    }

    #[test]
    fn hello_world_page() {
        page_roundtrip(b"Hello World!", false);
    }
}
