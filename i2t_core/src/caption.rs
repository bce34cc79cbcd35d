use std::path::Path;

use anyhow::{Context, Error as E, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::{blip, quantized_blip};
use image::RgbImage;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::config::CaptionConfig;
use crate::device::select_device;
use crate::model::ModelKind;
use crate::processor::{self, ImageProcessor, ProcessorConfig, SEP_TOKEN_ID};
use crate::resource::{self, ModelFiles};

/// An image to caption, with an optional prompt the caption should continue.
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    image: RgbImage,
    prompt: Option<String>,
}

impl CaptionRequest {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }
}

pub trait Captioner {
    fn model(&self) -> ModelKind;

    fn generate_caption(&mut self, request: &CaptionRequest) -> Result<String>;

    fn caption_image_path(&mut self, path: &Path, prompt: Option<&str>) -> Result<String> {
        let image = processor::load_image(path)?;
        let mut request = CaptionRequest::new(image);
        if let Some(p) = prompt {
            request = request.with_prompt(p);
        }
        self.generate_caption(&request)
    }
}

enum Model {
    M(blip::BlipForConditionalGeneration),
    Q(quantized_blip::BlipForConditionalGeneration),
}

impl Model {
    fn vision_forward(&self, pixel_values: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::M(m) => m.vision_model().forward(pixel_values),
            Self::Q(m) => m.vision_model().forward(pixel_values),
        }
    }

    fn text_decoder_forward(&mut self, xs: &Tensor, img_xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::M(m) => m.text_decoder().forward(xs, img_xs),
            Self::Q(m) => m.text_decoder().forward(xs, img_xs),
        }
    }

    fn reset_kv_cache(&mut self) {
        match self {
            Self::M(m) => m.text_decoder().reset_kv_cache(),
            Self::Q(m) => m.text_decoder().reset_kv_cache(),
        }
    }
}

/// BLIP conditional-generation captioner. Weights are loaded once in [`BlipCaptioner::new`].
pub struct BlipCaptioner {
    kind: ModelKind,
    model: Model,
    tokenizer: Tokenizer,
    processor: ImageProcessor,
    device: Device,
    max_new_tokens: usize,
    seed: u64,
    temperature: Option<f64>,
    top_p: Option<f64>,
    default_prompt: Option<String>,
}

impl BlipCaptioner {
    pub fn new(kind: ModelKind, config: &CaptionConfig) -> Result<Self> {
        let files = resource::fetch(kind, config.quantized, &config.hub)?;
        Self::from_files(kind, &files, config)
    }

    pub fn from_files(kind: ModelKind, files: &ModelFiles, config: &CaptionConfig) -> Result<Self> {
        let mut device = select_device(config.device)?;
        if files.quantized && !device.is_cpu() {
            info!("quantized weights run on CPU");
            device = Device::Cpu;
        }

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow::anyhow!("failed to create tokenizer, {}", e))?;
        let processor_config =
            ProcessorConfig::from_file(&files.preprocessor)?.with_resample(config.resample);
        debug!("processor config: {:?}", processor_config);

        let blip_config = kind.config();
        let start = std::time::Instant::now();
        let model = if files.quantized {
            let vb = quantized_blip::VarBuilder::from_gguf(&files.weights, &device)?;
            Model::Q(quantized_blip::BlipForConditionalGeneration::new(&blip_config, vb)?)
        } else {
            let data = std::fs::read(&files.weights)
                .with_context(|| format!("read file err: {}", files.weights.display()))?;
            let vb = VarBuilder::from_slice_safetensors(&data, DType::F32, &device)?;
            Model::M(blip::BlipForConditionalGeneration::new(&blip_config, vb)?)
        };
        info!("loaded {} in {:?}", kind.label(), start.elapsed());

        Ok(Self {
            kind,
            model,
            tokenizer,
            processor: ImageProcessor::new(processor_config),
            device,
            max_new_tokens: config.max_new_tokens,
            seed: config.seed.unwrap_or_else(rand::random),
            temperature: config.temperature,
            top_p: config.top_p,
            default_prompt: config.prompt.clone(),
        })
    }

    fn prompt_ids(&self, prompt: Option<&str>) -> Result<Vec<u32>> {
        let Some(prompt) = prompt.filter(|p| !p.trim().is_empty()) else {
            return Ok(processor::decoder_input_ids(None));
        };
        let encoding = self.tokenizer.encode(prompt, true).map_err(E::msg)?;
        Ok(processor::decoder_input_ids(Some(encoding.get_ids())))
    }
}

impl Captioner for BlipCaptioner {
    fn model(&self) -> ModelKind {
        self.kind
    }

    fn generate_caption(&mut self, request: &CaptionRequest) -> Result<String> {
        let prompt = request.prompt().or(self.default_prompt.as_deref());
        let mut token_ids = self.prompt_ids(prompt)?;

        let start = std::time::Instant::now();
        let pixel_values = self.processor.preprocess(request.image(), &self.device)?;
        let image_embeds = self.model.vision_forward(&pixel_values)?;

        // the decoder keeps its kv cache between calls
        self.model.reset_kv_cache();
        let mut logits_processor = LogitsProcessor::new(self.seed, self.temperature, self.top_p);

        for index in 0..self.max_new_tokens {
            let context_size = if index > 0 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let input_ids = Tensor::new(&token_ids[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = self.model.text_decoder_forward(&input_ids, &image_embeds)?;
            let logits = logits.squeeze(0)?;
            let logits = logits.get(logits.dim(0)? - 1)?;
            let token = logits_processor.sample(&logits)?;
            if token == SEP_TOKEN_ID {
                break;
            }
            token_ids.push(token);
        }
        debug!("generated {} tokens in {:?}", token_ids.len(), start.elapsed());

        let caption = self.tokenizer.decode(&token_ids, true).map_err(E::msg)?;
        Ok(caption.trim().to_string())
    }
}
