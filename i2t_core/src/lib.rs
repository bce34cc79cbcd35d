pub mod caption;
pub mod config;
pub mod device;
pub mod model;
pub mod processor;
pub mod resource;

pub use caption::{BlipCaptioner, CaptionRequest, Captioner};
pub use config::CaptionConfig;
pub use device::{select_device, DevicePreference};
pub use model::ModelKind;
pub use processor::{load_image, Resample};
pub use resource::HubOptions;

/// Load the service for `kind`. Fails if the model can't be fetched or loaded.
pub fn load_captioner(kind: ModelKind, config: &CaptionConfig) -> anyhow::Result<Box<dyn Captioner>> {
    let captioner = BlipCaptioner::new(kind, config)?;
    Ok(Box::new(captioner))
}
