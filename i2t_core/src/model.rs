use std::fmt;
use std::str::FromStr;

use candle_transformers::models::blip::{self, VisionConfig};
use candle_transformers::models::blip_text;

/// The captioning models this tool knows how to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Blip,
    BlipLarge,
}

pub const QUANTIZED_REPO: &str = "lmz/candle-blip";
pub const QUANTIZED_LARGE_FILE: &str = "blip-image-captioning-large-q4k.gguf";

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Blip, ModelKind::BlipLarge];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Blip => "blip",
            ModelKind::BlipLarge => "blip-large",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::Blip => "BLIP",
            ModelKind::BlipLarge => "BLIP-Large",
        }
    }

    pub fn repo_id(&self) -> &'static str {
        match self {
            ModelKind::Blip => "Salesforce/blip-image-captioning-base",
            ModelKind::BlipLarge => "Salesforce/blip-image-captioning-large",
        }
    }

    /// Revision carrying `model.safetensors`.
    pub fn weights_revision(&self) -> &'static str {
        match self {
            ModelKind::Blip => "main",
            ModelKind::BlipLarge => "refs/pr/18",
        }
    }

    /// gguf weights in [`QUANTIZED_REPO`], if any were published for this model.
    pub fn quantized_file(&self) -> Option<&'static str> {
        match self {
            ModelKind::Blip => None,
            ModelKind::BlipLarge => Some(QUANTIZED_LARGE_FILE),
        }
    }

    pub fn config(&self) -> blip::Config {
        match self {
            ModelKind::Blip => blip_base_config(),
            ModelKind::BlipLarge => blip::Config::image_captioning_large(),
        }
    }
}

fn blip_base_config() -> blip::Config {
    let text_config = blip_text::Config {
        vocab_size: 30524,
        hidden_size: 768,
        encoder_hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 768,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        max_position_embeddings: 512,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-12,
        is_decoder: true,
    };
    let vision_config = VisionConfig {
        hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 512,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        image_size: 384,
        patch_size: 16,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-5,
    };

    blip::Config {
        text_config,
        vision_config,
        projection_dim: 512,
        image_text_hidden_size: 256,
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = ModelKind::ALL.iter().map(|k| k.name()).collect();
                anyhow::anyhow!("unknown model '{}', expected one of: {}", s, names.join(", "))
            })
    }
}
