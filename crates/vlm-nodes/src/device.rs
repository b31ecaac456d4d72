//! Device selection for local inference
//!
//! Availability comes from the backend's [`BackendCapabilities`]. The
//! fallback chain is CUDA → Metal → CPU.

use crate::backend::BackendCapabilities;
use crate::error::{Result, VlmNodeError};
use tracing::{info, warn};

/// Inference device for model execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InferenceDevice {
    /// CPU inference (always available)
    Cpu,
    /// NVIDIA CUDA GPU with device index
    Cuda(usize),
    /// Apple Metal GPU
    Metal,
}

impl InferenceDevice {
    /// Get device name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda(_) => "cuda",
            Self::Metal => "metal",
        }
    }

    /// Check if this is a GPU device
    pub fn is_gpu(&self) -> bool {
        !matches!(self, Self::Cpu)
    }
}

impl std::fmt::Display for InferenceDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{}", idx),
            Self::Metal => write!(f, "metal"),
        }
    }
}

/// Device selector with automatic fallback
pub struct DeviceSelector;

impl DeviceSelector {
    /// Select the best available device
    ///
    /// Priority: CUDA → Metal → CPU
    pub fn select_best(caps: &BackendCapabilities) -> InferenceDevice {
        if caps.cuda_devices > 0 {
            info!("CUDA device available, using GPU acceleration");
            return InferenceDevice::Cuda(0);
        }
        if caps.metal {
            info!("Metal device available, using GPU acceleration");
            return InferenceDevice::Metal;
        }
        info!("Using CPU for inference (no GPU acceleration available)");
        InferenceDevice::Cpu
    }

    /// Select device from string configuration
    ///
    /// Accepts: "auto", "cpu", "cuda", "cuda:N", "metal", "mps"
    pub fn from_config(config: &str, caps: &BackendCapabilities) -> Result<InferenceDevice> {
        match config.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::select_best(caps)),
            "cpu" => Ok(InferenceDevice::Cpu),
            s if s.starts_with("cuda") => {
                let idx = match s.split_once(':') {
                    Some((_, idx)) => idx.parse().map_err(|_| VlmNodeError::DeviceInit {
                        device: s.to_string(),
                        message: "invalid CUDA device index".to_string(),
                    })?,
                    None => 0,
                };
                if idx < caps.cuda_devices {
                    Ok(InferenceDevice::Cuda(idx))
                } else {
                    warn!(device = s, "Requested CUDA device is not available");
                    Err(VlmNodeError::DeviceInit {
                        device: s.to_string(),
                        message: "CUDA device not available".to_string(),
                    })
                }
            }
            "metal" | "mps" => {
                if caps.metal {
                    Ok(InferenceDevice::Metal)
                } else {
                    Err(VlmNodeError::DeviceInit {
                        device: config.to_string(),
                        message: "Metal device not available".to_string(),
                    })
                }
            }
            other => Err(VlmNodeError::DeviceInit {
                device: other.to_string(),
                message: format!("Unknown device: {}. Valid options: auto, cpu, cuda, metal", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpu() -> BackendCapabilities {
        BackendCapabilities {
            cuda_devices: 2,
            metal: false,
            flash_attention: true,
        }
    }

    #[test]
    fn test_cpu_always_available() {
        let device = DeviceSelector::from_config("cpu", &BackendCapabilities::default()).unwrap();
        assert_eq!(device, InferenceDevice::Cpu);
        assert!(!device.is_gpu());
    }

    #[test]
    fn test_auto_prefers_cuda_then_metal() {
        assert_eq!(DeviceSelector::select_best(&gpu()), InferenceDevice::Cuda(0));
        let mac = BackendCapabilities {
            metal: true,
            ..Default::default()
        };
        assert_eq!(DeviceSelector::from_config("auto", &mac).unwrap(), InferenceDevice::Metal);
        assert_eq!(DeviceSelector::from_config("mps", &mac).unwrap(), InferenceDevice::Metal);
        assert_eq!(
            DeviceSelector::select_best(&BackendCapabilities::default()),
            InferenceDevice::Cpu
        );
    }

    #[test]
    fn test_cuda_index() {
        assert_eq!(DeviceSelector::from_config("cuda:1", &gpu()).unwrap(), InferenceDevice::Cuda(1));
        assert!(DeviceSelector::from_config("cuda:2", &gpu()).is_err());
        assert!(DeviceSelector::from_config("cuda", &BackendCapabilities::default()).is_err());
        assert!(DeviceSelector::from_config("tpu", &gpu()).is_err());
    }

    #[test]
    fn test_device_display() {
        assert_eq!(InferenceDevice::Cpu.to_string(), "cpu");
        assert_eq!(InferenceDevice::Cuda(1).to_string(), "cuda:1");
    }
}
