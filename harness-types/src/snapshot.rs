//! The interrogator's cached, immutable description of the host.

use crate::backend::Backend;
use crate::runtime::RuntimeInfo;

/// Aggregation of one [`RuntimeInfo`] per supported runtime plus host and
/// build metadata.
///
/// Invariant: immutable once produced; it is the authoritative view for
/// all later backend operations in that process unless explicitly
/// refreshed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemSnapshot {
    pub cuda: RuntimeInfo,
    pub vulkan: RuntimeInfo,
    pub shader_compiler: RuntimeInfo,
    pub timestamp: String,
    pub hostname: String,
    pub os_version: String,
    pub architecture: String,
    pub product_version: String,
    pub build_timestamp: String,
}

impl SystemSnapshot {
    pub fn runtime(&self, kind: RuntimeKind) -> &RuntimeInfo {
        match kind {
            RuntimeKind::Cuda => &self.cuda,
            RuntimeKind::Vulkan => &self.vulkan,
            RuntimeKind::ShaderCompiler => &self.shader_compiler,
        }
    }

    /// A runtime is "available" for a [`Backend`] when its backing
    /// [`RuntimeInfo`] reports availability, or unconditionally for the
    /// software CPU backend, which needs no runtime detection at all.
    pub fn backend_available(&self, backend: Backend) -> bool {
        match backend {
            Backend::Cuda => self.cuda.available,
            Backend::Vulkan => self.vulkan.available,
            Backend::Cpu => true,
        }
    }

    pub fn available_backends(&self) -> Vec<Backend> {
        Backend::all()
            .iter()
            .copied()
            .filter(|&b| self.backend_available(b))
            .collect()
    }
}

/// The runtimes the interrogator knows how to detect. Distinct from
/// [`Backend`]: the shader compiler is a runtime the interrogator tracks
/// but is not itself a dispatch backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeKind {
    Cuda,
    Vulkan,
    ShaderCompiler,
}
