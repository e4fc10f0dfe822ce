use candle_core::Device;
use tracing::info;

/// Metal when built with the `metal` feature and `use_accel` is set, CPU otherwise.
pub fn select_device(use_accel: bool) -> Device {
    #[cfg(feature = "metal")]
    {
        if use_accel {
            if let Ok(dev) = Device::new_metal(0) { info!("device: Metal (MPS)"); return dev; }
        }
    }
    let _ = use_accel;
    info!("device: CPU");
    Device::Cpu
}
