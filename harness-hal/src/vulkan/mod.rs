//! Vulkan compute backend: `ash::Entry::load()` handles the three-phase
//! symbol resolution (global → instance → device proc-addr) internally,
//! `Arc`-wrapped `InstanceShared`/`DeviceShared` handles are shared
//! across runners, and `vk::Result` maps into the crate's error type via
//! a small `From`-like conversion. There is no render-pass, swapchain,
//! or framebuffer machinery here — a compute-only backend has no use for
//! it; the compute pipeline, descriptor pool, and command-pool lifecycle
//! follow the same small-owned-struct-with-explicit-destroy pattern used
//! throughout this module.

mod device;
mod instance;
mod pipeline;
mod runner;

pub use device::DeviceShared;
pub use instance::InstanceShared;
pub use runner::VulkanRunner;

/// Enumerate Vulkan-visible physical devices without creating a runner,
/// for the system interrogator to report device info
/// without paying for a logical device and queue.
pub fn enumerate_devices() -> ht::Result<Vec<ht::DeviceInfo>> {
    let instance = InstanceShared::create()?;
    DeviceShared::enumerate_info(&instance)
}

use ht::{ErrorCode, ErrorInfo};

/// Map a raw `ash::vk::Result` into a categorized error.
pub(crate) fn map_vk_result(result: ash::vk::Result, during: &str) -> ErrorInfo {
    let code = match result {
        ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY => ErrorCode::OutOfHostMemory,
        ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => ErrorCode::GpuOutOfMemory,
        ash::vk::Result::ERROR_DEVICE_LOST => ErrorCode::KernelExecutionFailed,
        ash::vk::Result::ERROR_INITIALIZATION_FAILED => ErrorCode::BackendInitFailed,
        _ => ErrorCode::UnknownError,
    };
    ErrorInfo::new(code, format!("Vulkan call failed during {during}: {result}"))
}

pub(crate) trait VkResultExt<T> {
    fn harness_err(self, during: &str) -> ht::Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, ash::vk::Result> {
    fn harness_err(self, during: &str) -> ht::Result<T> {
        self.map_err(|e| map_vk_result(e, during))
    }
}
