use anyhow::Result;
use clap::Parser;
use log::debug;

mod cli;
use crate::cli::Cli;
use crate::cli::Commands;
use crate::cli::Config;

mod decode;
mod encode;
mod scan;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse the cli
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    debug!("Config: {:?}", config);

    match &cli.command {
        Commands::Encode {
            input,
            output,
            title,
            size,
            seal,
        } => encode::run(
            &config,
            input,
            output.as_deref(),
            title.as_deref(),
            *size,
            *seal,
        ),
        Commands::Decode { inputs, output } => decode::run(&config, inputs, output.as_deref()),
        Commands::Scan { images } => scan::run(&config, images),
    }
}
