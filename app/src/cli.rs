use std::path::PathBuf;

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::{Parser, ValueEnum};
use i2t_core::ModelKind;

fn model_parser() -> impl TypedValueParser<Value = ModelKind> {
    PossibleValuesParser::new(ModelKind::ALL.map(|k| k.name())).try_map(|s| s.parse::<ModelKind>())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "i2t", about = "Image-to-Text Captioning (i2t)")]
pub struct Args {
    /// Path to the image file
    #[arg(required_unless_present_any = ["precache", "batch_dir"])]
    pub image: Option<PathBuf>,

    /// Which model to use
    #[arg(long, default_value = "blip", value_parser = model_parser())]
    pub model: ModelKind,

    /// Show the image before captioning
    #[arg(long)]
    pub show: bool,

    /// Download and cache the selected model, then exit
    #[arg(long)]
    pub precache: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Directory containing images to process in batch mode
    #[arg(long)]
    pub batch_dir: Option<PathBuf>,

    /// Text the caption should start with
    #[arg(long)]
    pub prompt: Option<String>,

    /// TOML file with device, generation and hub settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run on CPU even if a GPU is available
    #[arg(long)]
    pub cpu: bool,

    /// Use quantized weights (blip-large only)
    #[arg(long)]
    pub quantized: bool,
}

impl Args {
    /// Anything but plain text keeps stderr quiet.
    pub fn quiet(&self) -> bool {
        self.format != Format::Text
    }
}
