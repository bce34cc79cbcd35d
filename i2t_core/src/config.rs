use serde::Deserialize;

use crate::device::DevicePreference;
use crate::processor::Resample;
use crate::resource::HubOptions;

pub const DEFAULT_MAX_NEW_TOKENS: usize = 512;

/// Everything that shapes how a captioner is loaded and run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    pub device: DevicePreference,
    pub quantized: bool,
    pub max_new_tokens: usize,
    pub seed: Option<u64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub resample: Option<Resample>,
    pub prompt: Option<String>,
    pub hub: HubOptions,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            device: DevicePreference::Auto,
            quantized: false,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            seed: None,
            temperature: None,
            top_p: None,
            resample: None,
            prompt: None,
            hub: HubOptions::default(),
        }
    }
}
