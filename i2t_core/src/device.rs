use anyhow::{Context, Result};
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::Device;
use serde::Deserialize;
use tracing::info;

/// Which compute backend to run inference on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

/// Pick a device: CUDA, then Metal, then CPU when `Auto`.
pub fn select_device(pref: DevicePreference) -> Result<Device> {
    match pref {
        DevicePreference::Auto => {
            if cuda_is_available() {
                info!("Using CUDA GPU");
                Ok(Device::new_cuda(0)?)
            } else if metal_is_available() {
                info!("Using Metal (Apple Silicon GPU)");
                Ok(Device::new_metal(0)?)
            } else {
                info!("Using CPU");
                Ok(Device::Cpu)
            }
        }
        DevicePreference::Cpu => {
            info!("Using CPU");
            Ok(Device::Cpu)
        }
        DevicePreference::Cuda => {
            let device = Device::new_cuda(0).context("cuda device requested but unavailable")?;
            info!("Using CUDA GPU");
            Ok(device)
        }
        DevicePreference::Metal => {
            let device = Device::new_metal(0).context("metal device requested but unavailable")?;
            info!("Using Metal (Apple Silicon GPU)");
            Ok(device)
        }
    }
}
