use std::process::ExitCode;

use clap::Parser;
use i2t::cli::Args;
use tracing::Level;

pub fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let level = if args.quiet() { Level::WARN } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    i2t::run(args)
}
