use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Deserialize;

/// Decoder start token of the BLIP text model.
pub const BOS_TOKEN_ID: u32 = 30522;
pub const SEP_TOKEN_ID: u32 = 102;

const OPENAI_CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const OPENAI_CLIP_STD: [f32; 3] = [0.26862954, 0.261_302_6, 0.275_777_1];

/// Open an image file and convert it to 8-bit RGB.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let path = path.as_ref();
    let img = image::ImageReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .with_guessed_format()?
        .decode()
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(img.to_rgb8())
}

/// Resampling filters, numbered the way `preprocessor_config.json` numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "RawResample")]
pub enum Resample {
    Nearest,
    Lanczos,
    Bilinear,
    #[default]
    Bicubic,
    Box,
    Hamming,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawResample {
    Code(u8),
    Name(String),
}

impl TryFrom<RawResample> for Resample {
    type Error = String;

    fn try_from(raw: RawResample) -> Result<Self, Self::Error> {
        match raw {
            RawResample::Code(c) => Resample::from_code(c).ok_or(format!("unknown resample code {c}")),
            RawResample::Name(n) => n.parse(),
        }
    }
}

impl std::str::FromStr for Resample {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Resample::Nearest),
            "lanczos" => Ok(Resample::Lanczos),
            "bilinear" => Ok(Resample::Bilinear),
            "bicubic" => Ok(Resample::Bicubic),
            "box" => Ok(Resample::Box),
            "hamming" => Ok(Resample::Hamming),
            other => Err(format!("unknown resample filter '{other}'")),
        }
    }
}

impl Resample {
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Resample::Nearest,
            1 => Resample::Lanczos,
            2 => Resample::Bilinear,
            3 => Resample::Bicubic,
            4 => Resample::Box,
            5 => Resample::Hamming,
            _ => return None,
        })
    }

    pub fn filter(&self) -> FilterType {
        match self {
            Resample::Nearest => FilterType::Nearest,
            Resample::Lanczos => FilterType::Lanczos3,
            Resample::Bilinear => FilterType::Triangle,
            Resample::Bicubic => FilterType::CatmullRom,
            // no box or hamming kernel in `image`; closest available
            Resample::Box => FilterType::Triangle,
            Resample::Hamming => FilterType::Lanczos3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSize")]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Square(u32),
    Dims { height: u32, width: u32 },
}

impl TryFrom<RawSize> for ImageSize {
    type Error = String;

    fn try_from(raw: RawSize) -> Result<Self, Self::Error> {
        let (height, width) = match raw {
            RawSize::Square(s) => (s, s),
            RawSize::Dims { height, width } => (height, width),
        };
        if height == 0 || width == 0 {
            return Err("image size must be non-zero".to_string());
        }
        Ok(ImageSize { height, width })
    }
}

/// The subset of `preprocessor_config.json` BLIP's image processor uses.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub do_resize: bool,
    pub size: ImageSize,
    pub resample: Resample,
    pub do_rescale: bool,
    pub rescale_factor: f64,
    pub do_normalize: bool,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            do_resize: true,
            size: ImageSize {
                height: 384,
                width: 384,
            },
            resample: Resample::Bicubic,
            do_rescale: true,
            rescale_factor: 1.0 / 255.0,
            do_normalize: true,
            image_mean: OPENAI_CLIP_MEAN,
            image_std: OPENAI_CLIP_STD,
        }
    }
}

impl ProcessorConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&data).with_context(|| format!("invalid processor config {}", path.display()))
    }

    /// Replace the resampling filter when one is given.
    pub fn with_resample(mut self, resample: Option<Resample>) -> Self {
        if let Some(r) = resample {
            self.resample = r;
        }
        self
    }
}

pub struct ImageProcessor {
    config: ProcessorConfig,
}

impl ImageProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    /// Produce a `(1, 3, height, width)` f32 tensor on `device`.
    pub fn preprocess(&self, img: &RgbImage, device: &Device) -> Result<Tensor> {
        let cfg = &self.config;
        let resized;
        let img = if cfg.do_resize {
            resized = imageops::resize(img, cfg.size.width, cfg.size.height, cfg.resample.filter());
            &resized
        } else {
            img
        };
        let (width, height) = img.dimensions();
        let data = img.as_raw().clone();
        let mut t = Tensor::from_vec(data, (height as usize, width as usize, 3), &Device::Cpu)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?;
        if cfg.do_rescale {
            t = t.affine(cfg.rescale_factor, 0.)?;
        }
        if cfg.do_normalize {
            let mean = Tensor::new(&cfg.image_mean, &Device::Cpu)?.reshape((3, 1, 1))?;
            let std = Tensor::new(&cfg.image_std, &Device::Cpu)?.reshape((3, 1, 1))?;
            t = t.broadcast_sub(&mean)?.broadcast_div(&std)?;
        }
        Ok(t.unsqueeze(0)?.to_device(device)?)
    }
}

/// Turn tokenizer output (`[CLS] prompt [SEP]`) into decoder input (`[BOS] prompt`).
pub fn decoder_input_ids(prompt_ids: Option<&[u32]>) -> Vec<u32> {
    let mut ids = match prompt_ids {
        Some(ids) if !ids.is_empty() => ids.to_vec(),
        _ => return vec![BOS_TOKEN_ID],
    };
    ids[0] = BOS_TOKEN_ID;
    if ids.len() > 1 && ids.last() == Some(&SEP_TOKEN_ID) {
        ids.pop();
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blip_config_with_integer_size() {
        let json = r#"{
            "do_normalize": true,
            "do_resize": true,
            "image_mean": [0.48145466, 0.4578275, 0.40821073],
            "image_std": [0.26862954, 0.26130258, 0.27577711],
            "image_processor_type": "BlipImageProcessor",
            "processor_class": "BlipProcessor",
            "size": 384
        }"#;
        let cfg: ProcessorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.size, ImageSize { height: 384, width: 384 });
        assert_eq!(cfg.resample, Resample::Bicubic);
        assert!(cfg.do_rescale);
    }

    #[test]
    fn config_with_dims_and_resample_code() {
        let json = r#"{"size": {"height": 224, "width": 320}, "resample": 2}"#;
        let cfg: ProcessorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.size.width, 320);
        assert_eq!(cfg.resample, Resample::Bilinear);
    }

    #[test]
    fn resample_patch_overrides_only_when_set() {
        let cfg = ProcessorConfig::default().with_resample(None);
        assert_eq!(cfg.resample, Resample::Bicubic);
        let cfg = cfg.with_resample(Some(Resample::Nearest));
        assert_eq!(cfg.resample, Resample::Nearest);
    }

    #[test]
    fn resample_from_name_or_code() {
        #[derive(Deserialize)]
        struct W {
            r: Resample,
        }
        let w: W = serde_json::from_str(r#"{"r":"lanczos"}"#).unwrap();
        assert_eq!(w.r, Resample::Lanczos);
        let w: W = serde_json::from_str(r#"{"r":5}"#).unwrap();
        assert_eq!(w.r, Resample::Hamming);
        assert!(serde_json::from_str::<W>(r#"{"r":9}"#).is_err());
        assert!(serde_json::from_str::<W>(r#"{"r":"sinc"}"#).is_err());
    }

    #[test]
    fn preprocess_shape_and_normalization() {
        let img = RgbImage::from_pixel(50, 30, image::Rgb([255, 255, 255]));
        let processor = ImageProcessor::new(ProcessorConfig::default());
        let t = processor.preprocess(&img, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[1, 3, 384, 384]);
        let first = t.flatten_all().unwrap().to_vec1::<f32>().unwrap()[0];
        let expected = (1.0 - OPENAI_CLIP_MEAN[0]) / OPENAI_CLIP_STD[0];
        assert!((first - expected).abs() < 1e-4);
    }

    #[test]
    fn preprocess_without_resize_keeps_dimensions() {
        let img = RgbImage::new(8, 4);
        let cfg = ProcessorConfig {
            do_resize: false,
            do_normalize: false,
            ..Default::default()
        };
        let t = ImageProcessor::new(cfg).preprocess(&img, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[1, 3, 4, 8]);
    }

    #[test]
    fn load_image_converts_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        image::GrayImage::from_pixel(3, 2, image::Luma([128])).save(&path).unwrap();
        let img = load_image(&path).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(0, 0).0, [128, 128, 128]);
    }

    #[test]
    fn load_image_missing_file() {
        assert!(load_image("/nonexistent/definitely/missing.jpg").is_err());
    }

    #[test]
    fn decoder_ids_without_prompt() {
        assert_eq!(decoder_input_ids(None), vec![BOS_TOKEN_ID]);
        assert_eq!(decoder_input_ids(Some(&[])), vec![BOS_TOKEN_ID]);
    }

    #[test]
    fn decoder_ids_replace_cls_and_drop_sep() {
        let ids = [101, 1037, 3861, 1997, SEP_TOKEN_ID];
        assert_eq!(
            decoder_input_ids(Some(&ids)),
            vec![BOS_TOKEN_ID, 1037, 3861, 1997]
        );
    }
}
