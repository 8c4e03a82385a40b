//! Instance creation and teardown.

use std::ffi::CString;
use std::sync::Arc;

use ht::{ErrorCode, ErrorInfo, Result};

use super::VkResultExt;

/// Owned instance handle plus the loader entry point it was created
/// from, shared by every device created under it.
pub struct InstanceShared {
    pub(crate) entry: ash::Entry,
    pub(crate) raw: ash::Instance,
}

impl InstanceShared {
    /// `ash::Entry::load()` itself `dlopen`s `libvulkan.so`/`vulkan-1.dll`
    /// — the global phase of the three-phase symbol resolution
    ///. No validation layers or extensions are
    /// requested in the base path; a host Vulkan implementation selected
    /// via environment variable (e.g. `VK_ICD_FILENAMES` for a headless
    /// software rasterizer) is picked up transparently by the loader.
    pub fn create() -> Result<Arc<Self>> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            ErrorInfo::new(
                ErrorCode::BackendNotAvailable,
                format!("failed to load the Vulkan loader: {e}"),
            )
        })?;

        let app_name = CString::new("harness").unwrap();
        let engine_name = CString::new("harness-hal").unwrap();
        let app_info = ash::vk::ApplicationInfo::default()
            .application_name(&app_name)
            .engine_name(&engine_name)
            .api_version(ash::vk::API_VERSION_1_1);
        let create_info = ash::vk::InstanceCreateInfo::default().application_info(&app_info);

        let raw = unsafe { entry.create_instance(&create_info, None) }
            .harness_err("vkCreateInstance")
            .map_err(|e| {
                ErrorInfo::wrapping(ErrorCode::BackendInitFailed, "failed to create Vulkan instance", e)
            })?;

        Ok(Arc::new(Self { entry, raw }))
    }
}

// SAFETY: every Vulkan command invoked through these handles is
// externally synchronized by the owning runner's `&mut self` methods.
unsafe impl Send for InstanceShared {}
unsafe impl Sync for InstanceShared {}

impl Drop for InstanceShared {
    fn drop(&mut self) {
        unsafe { self.raw.destroy_instance(None) };
    }
}
