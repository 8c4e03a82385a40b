//! Per-device record returned by both enumeration and runner queries.

use crate::backend::Backend;

/// Per-device record returned by enumeration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceInfo {
    pub index: u32,
    pub name: String,
    pub backend: Backend,
    /// `None` when no live context was available to query the real value;
    /// Never a silent stub.
    pub total_memory_bytes: Option<u64>,
    pub free_memory_bytes: Option<u64>,
    /// Backend-specific string, e.g. `"sm_8.6"` or a Vulkan driver version.
    pub compute_capability: String,
    pub max_threads_per_workgroup: u32,
    pub max_shared_memory_bytes: u32,
    pub api_version: String,
    pub multiprocessor_count: u32,
    pub clock_rate_khz: u32,
    pub memory_bandwidth_gb_s: f32,
    pub integrated: bool,
    pub supports_compute: bool,
    pub supports_graphics: bool,
}

impl DeviceInfo {
    pub fn unknown(index: u32, backend: Backend, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            backend,
            total_memory_bytes: None,
            free_memory_bytes: None,
            compute_capability: String::new(),
            max_threads_per_workgroup: 0,
            max_shared_memory_bytes: 0,
            api_version: String::new(),
            multiprocessor_count: 0,
            clock_rate_khz: 0,
            memory_bandwidth_gb_s: 0.0,
            integrated: false,
            supports_compute: true,
            supports_graphics: false,
        }
    }
}
