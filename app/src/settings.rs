use std::path::Path;

use anyhow::{Context, Result};
use i2t_core::{CaptionConfig, DevicePreference};
use tracing::debug;

use crate::cli::Args;

/// Read a TOML config file. Missing keys fall back to defaults.
pub fn load_file(path: &Path) -> Result<CaptionConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

/// Config file (if any) with command-line flags layered on top.
pub fn resolve(args: &Args) -> Result<CaptionConfig> {
    let mut config = match &args.config {
        Some(path) => load_file(path)?,
        None => CaptionConfig::default(),
    };
    if args.cpu {
        config.device = DevicePreference::Cpu;
    }
    if args.quantized {
        config.quantized = true;
    }
    if args.prompt.is_some() {
        config.prompt = args.prompt.clone();
    }
    config.hub.progress = !args.quiet();
    debug!("config: {:?}", config);
    Ok(config)
}
