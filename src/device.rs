//! # Device Selection
//!
//! Picks the compute device for Whisper inference from the configured
//! preference, falling back to CPU when the requested accelerator is not
//! available.

use candle_core::Device;
use tracing::{debug, info, warn};

/// Resolve a device preference string (auto, cpu, cuda, metal) to a device.
pub fn select_device(preference: &str) -> Device {
    match preference.to_lowercase().as_str() {
        "cpu" => Device::Cpu,
        "cuda" | "gpu" => cuda_device().unwrap_or_else(|| {
            warn!("CUDA requested but unavailable, falling back to CPU");
            Device::Cpu
        }),
        "metal" => metal_device().unwrap_or_else(|| {
            warn!("Metal requested but unavailable, falling back to CPU");
            Device::Cpu
        }),
        "auto" => best_device(),
        other => {
            warn!(preference = %other, "Unknown device preference, using auto detection");
            best_device()
        }
    }
}

fn best_device() -> Device {
    if let Some(device) = cuda_device() {
        info!("Selected CUDA GPU for inference");
        return device;
    }

    if let Some(device) = metal_device() {
        info!("Selected Metal GPU for inference");
        return device;
    }

    info!("Using CPU for inference");
    Device::Cpu
}

fn cuda_device() -> Option<Device> {
    match Device::new_cuda(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!(error = %e, "CUDA not available");
            None
        }
    }
}

fn metal_device() -> Option<Device> {
    match Device::new_metal(0) {
        Ok(device) => Some(device),
        Err(e) => {
            debug!(error = %e, "Metal not available");
            None
        }
    }
}
