//! Runtime capability/availability records produced by the interrogator
//!.

use crate::device::DeviceInfo;

/// Runtime capability flags plus the sets of targets/profiles/stages a
/// runtime supports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeCapabilities {
    pub jit_compilation: bool,
    pub precompiled_kernels: bool,
    pub memory_management: bool,
    pub device_enumeration: bool,
    pub performance_counters: bool,
    pub supported_targets: Vec<String>,
    pub supported_profiles: Vec<String>,
    pub supported_stages: Vec<String>,
}

/// Per-runtime detection record.
///
/// Invariant: `available == false` implies `devices` is empty and
/// `error_message` is non-empty.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeInfo {
    pub available: bool,
    pub name: String,
    pub version: String,
    pub error_message: String,
    pub library_paths: Vec<String>,
    pub executable_paths: Vec<String>,
    pub primary_library_path: Option<String>,
    pub primary_executable_path: Option<String>,
    pub library_file_size: u64,
    pub executable_file_size: u64,
    pub library_checksum: String,
    pub executable_checksum: String,
    pub library_last_modified: String,
    pub executable_last_modified: String,
    pub capabilities: RuntimeCapabilities,
    pub devices: Vec<DeviceInfo>,
}

impl RuntimeInfo {
    pub fn unavailable(name: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            available: false,
            name: name.into(),
            version: "unknown".to_string(),
            error_message: error_message.into(),
            library_paths: Vec::new(),
            executable_paths: Vec::new(),
            primary_library_path: None,
            primary_executable_path: None,
            library_file_size: 0,
            executable_file_size: 0,
            library_checksum: String::new(),
            executable_checksum: String::new(),
            library_last_modified: String::new(),
            executable_last_modified: String::new(),
            capabilities: RuntimeCapabilities::default(),
            devices: Vec::new(),
        }
    }

    /// Checked invariant: unavailable runtimes carry no devices and a
    /// non-empty error message.
    pub fn is_well_formed(&self) -> bool {
        if self.available {
            true
        } else {
            self.devices.is_empty() && !self.error_message.is_empty()
        }
    }
}
