use crate::error::{Error, Result};
use candle_core::Device;

/// Request for a specific device, used by pipeline builders.
#[derive(Clone, Debug, Default)]
pub enum DeviceRequest {
    /// Use CUDA or Metal if available, otherwise CPU.
    #[default]
    Default,
    /// Force CPU even if a GPU is available.
    Cpu,
    /// Select a specific CUDA device by index.
    Cuda(usize),
    /// Provide an already constructed device.
    Explicit(Device),
}

impl DeviceRequest {
    /// Resolve the request into an actual [`Device`].
    pub fn resolve(self) -> Result<Device> {
        match self {
            DeviceRequest::Default => {
                if candle_core::utils::cuda_is_available() {
                    Device::new_cuda(0)
                        .map_err(|e| Error::Device(format!("failed to open CUDA device 0: {e}")))
                } else if candle_core::utils::metal_is_available() {
                    Device::new_metal(0)
                        .map_err(|e| Error::Device(format!("failed to open Metal device 0: {e}")))
                } else {
                    Ok(Device::Cpu)
                }
            }
            DeviceRequest::Cpu => Ok(Device::Cpu),
            DeviceRequest::Cuda(i) => Device::new_cuda(i)
                .map_err(|e| Error::Device(format!("failed to open CUDA device {i}: {e}"))),
            DeviceRequest::Explicit(d) => Ok(d),
        }
    }
}

/// Short human-readable device name for logs.
pub fn device_name(device: &Device) -> String {
    match device {
        Device::Cpu => "cpu".to_string(),
        Device::Cuda(_) => "cuda".to_string(),
        Device::Metal(_) => "metal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_and_explicit_requests_resolve_to_cpu() {
        assert!(DeviceRequest::Cpu.resolve().unwrap().is_cpu());
        assert!(DeviceRequest::Explicit(Device::Cpu).resolve().unwrap().is_cpu());
    }

    #[test]
    fn default_request_always_yields_a_device() {
        let device = DeviceRequest::default().resolve().unwrap();
        assert!(device.is_cpu() || device.is_cuda() || device.is_metal());
    }

    #[cfg(not(any(feature = "cuda", feature = "metal")))]
    #[test]
    fn default_request_falls_back_to_cpu_without_gpu_support() {
        assert!(DeviceRequest::default().resolve().unwrap().is_cpu());
    }

    #[cfg(all(feature = "metal", not(feature = "cuda")))]
    #[test]
    fn default_request_uses_metal_when_built_with_it() {
        assert!(DeviceRequest::default().resolve().unwrap().is_metal());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn cuda_request_fails_without_cuda_support() {
        assert!(matches!(
            DeviceRequest::Cuda(0).resolve(),
            Err(Error::Device(_))
        ));
    }
}
