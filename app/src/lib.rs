pub mod batch;
pub mod cli;
pub mod output;
pub mod settings;
pub mod show;

use std::process::ExitCode;

use anyhow::{Context, Result};
use i2t_core::{load_captioner, resource};
use tracing::error;

use cli::Args;
use output::CaptionRecord;

pub fn run(args: Args) -> Result<ExitCode> {
    let quiet = args.quiet();
    let config = settings::resolve(&args)?;
    let kind = args.model;
    let show_images = args.show && !quiet;

    if args.precache {
        resource::precache(kind, config.quantized, &config.hub)?;
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(dir) = &args.batch_dir {
        let paths = batch::discover_images(dir)?;
        if paths.is_empty() {
            println!("No supported images found in directory: {}", dir.display());
            return Ok(ExitCode::SUCCESS);
        }
        let mut service = load_captioner(kind, &config)
            .context("Failed to initialize image captioning service")?;
        let outcome = batch::caption_all(service.as_mut(), &paths, |p| {
            if show_images {
                show::show_image(p)
            }
        });
        if let Some(out) = output::batch_stdout(&outcome.records, args.format)? {
            println!("{}", out);
        }
        if outcome.failed > 0 {
            error!("{} of {} images failed", outcome.failed, paths.len());
            return Ok(ExitCode::FAILURE);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let image = args
        .image
        .as_deref()
        .context("the following arguments are required: image (unless using --precache or --batch-dir)")?;
    let mut service =
        load_captioner(kind, &config).context("Failed to initialize image captioning service")?;
    if show_images {
        show::show_image(image);
    }
    let caption = service
        .caption_image_path(image, None)
        .with_context(|| format!("failed to caption {}", image.display()))?;
    let record = CaptionRecord::new(image, kind, caption);
    println!("{}", output::render_single(&record, args.format)?);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn empty_batch_dir_exits_before_loading_a_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"no images").unwrap();
        let args = Args::try_parse_from([
            "i2t",
            "--batch-dir",
            dir.path().to_str().unwrap(),
            "--format",
            "json",
        ])
        .unwrap();
        assert!(run(args).is_ok());
    }

    #[test]
    fn missing_batch_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let args =
            Args::try_parse_from(["i2t", "--batch-dir", missing.to_str().unwrap()]).unwrap();
        assert!(run(args).is_err());
    }
}
