use std::path::PathBuf;

use anyhow::{Context, Result};

use nscan::recover;
use nscan::zbar::Zbarimg;

use crate::cli::Config;

pub fn run(config: &Config, images: &[PathBuf]) -> Result<()> {
    let decoder = Zbarimg::new(&config.tools.zbarimg);

    let mut count = 0;
    for image in images {
        let tokens = recover::scan_file(image, &decoder, &config.scan)
            .with_context(|| format!("scanning {:?}", image))?;

        for token in tokens.iter() {
            println!("{}", token);
        }
        count += tokens.len();
    }

    eprintln!("{} pieces found.", count);
    Ok(())
}
