use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use image::GrayImage;
use log::debug;

use crate::{EccLevel, Result, ScanError, SymbolEncoder};

/// Encodes through the `qrencode` executable, data fed on stdin.
#[derive(Debug, Clone)]
pub struct Qrencode {
    program: PathBuf,
}

impl Qrencode {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Qrencode {
            program: program.into(),
        }
    }

    fn command(&self, ecc: EccLevel) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-o", "-", "-l", ecc.as_letter(), "-t", "PNG", "-m", "5", "-s", "3"]);
        cmd
    }
}

impl Default for Qrencode {
    fn default() -> Self {
        Qrencode::new("qrencode")
    }
}

impl SymbolEncoder for Qrencode {
    fn encode(&self, data: &[u8], ecc: EccLevel) -> Result<GrayImage> {
        let mut child = self
            .command(ecc)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Dropping stdin closes it, qrencode only starts once it sees EOF
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| ScanError::Encoder("qrencode stdin unavailable".to_string()))?;
            stdin.write_all(data)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(ScanError::Encoder(format!(
                "qrencode exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!("qrencode: {} bytes in, {} bytes png", data.len(), output.stdout.len());
        Ok(image::load_from_memory(&output.stdout)?.to_luma8())
    }
}
