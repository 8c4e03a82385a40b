//! Backend identity and the small policy tables (preference order,
//! hardware requirements, minimum driver versions) used by backend
//! selection.

use std::fmt;

use crate::error::{ErrorCode, ErrorInfo, Result};

/// A concrete implementation of the runner contract for one GPU driver ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Backend {
    Cuda,
    Vulkan,
    Cpu,
}

impl Backend {
    pub const fn to_str(self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Vulkan => "vulkan",
            Self::Cpu => "cpu",
        }
    }

    pub fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cuda" | "nvidia" => Ok(Self::Cuda),
            "vulkan" => Ok(Self::Vulkan),
            "cpu" | "software" => Ok(Self::Cpu),
            other => Err(ErrorInfo::new(
                ErrorCode::InvalidArgument,
                format!("unknown backend name '{other}'"),
            )),
        }
    }

    /// All backends the harness knows about, in no particular order.
    pub const fn all() -> &'static [Backend] {
        &[Backend::Cuda, Backend::Vulkan, Backend::Cpu]
    }

    /// Preference order used when a caller does not name a backend
    /// explicitly: try hardware backends before falling back to software.
    pub const fn default_preference_order() -> &'static [Backend] {
        &[Backend::Cuda, Backend::Vulkan, Backend::Cpu]
    }

    /// Whether this backend needs specific hardware/drivers present, as
    /// opposed to always being constructible (the CPU backend).
    pub const fn requires_specific_hardware(self) -> bool {
        !matches!(self, Backend::Cpu)
    }

    /// A one-line human description of what must be installed for this
    /// backend to become available, surfaced by `info()`.
    pub const fn minimum_requirements(self) -> &'static str {
        match self {
            Self::Cuda => "NVIDIA display driver with a CUDA-capable GPU",
            Self::Vulkan => "A Vulkan 1.0+ loader and at least one compute-capable ICD",
            Self::Cpu => "none; always available",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for &b in Backend::all() {
            assert_eq!(Backend::from_str(b.to_str()).unwrap(), b);
        }
    }

    #[test]
    fn cpu_never_requires_hardware() {
        assert!(!Backend::Cpu.requires_specific_hardware());
        assert!(Backend::Cuda.requires_specific_hardware());
        assert!(Backend::Vulkan.requires_specific_hardware());
    }

    #[test]
    fn unknown_name_is_invalid_argument() {
        let err = Backend::from_str("directx").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }
}
