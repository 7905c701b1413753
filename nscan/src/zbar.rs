use std::path::PathBuf;
use std::process::Command;

use image::GrayImage;
use image::ImageFormat;
use log::trace;
use tempfile::Builder;

use crate::{Result, ScanError, SymbolDecoder};

/// Decodes through the `zbarimg` executable, one temp png per region.
#[derive(Debug, Clone)]
pub struct Zbarimg {
    program: PathBuf,
}

impl Zbarimg {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Zbarimg {
            program: program.into(),
        }
    }

    fn run(&self, region: &GrayImage) -> Result<Vec<u8>> {
        let file = Builder::new().prefix("nddpef-").suffix(".png").tempfile()?;
        region.save_with_format(file.path(), ImageFormat::Png)?;

        let output = Command::new(&self.program)
            .args(["--raw", "-q"])
            .arg(file.path())
            .output()?;

        if !output.status.success() {
            return Err(ScanError::Decoder(format!("zbarimg exited with {}", output.status)));
        }

        // --raw still terminates each symbol with a newline
        let mut data = output.stdout;
        if data.last() == Some(&b'\n') {
            data.pop();
        }
        Ok(data)
    }
}

impl Default for Zbarimg {
    fn default() -> Self {
        Zbarimg::new("zbarimg")
    }
}

impl SymbolDecoder for Zbarimg {
    fn decode(&self, region: &GrayImage) -> Option<Vec<u8>> {
        match self.run(region) {
            Ok(data) if !data.is_empty() => Some(data),
            Ok(_) => None,
            Err(e) => {
                trace!("No symbol: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod test_zbar {
    use super::*;
    use image::Luma;

    #[test]
    fn missing_program_is_an_io_error() {
        let decoder = Zbarimg::new("/nonexistent/zbarimg");

        assert!(matches!(
            decoder.run(&GrayImage::from_pixel(20, 20, Luma([255]))),
            Err(ScanError::Io(_))
        ));
    }

    #[test]
    fn missing_program_is_no_symbol() {
        let decoder = Zbarimg::new("/nonexistent/zbarimg");

        assert_eq!(decoder.decode(&GrayImage::from_pixel(20, 20, Luma([255]))), None);
    }
}
