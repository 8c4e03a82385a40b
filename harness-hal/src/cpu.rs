//! Software fallback backend: always constructible, no dynamic library
//! dependency, used by CI hosts without real GPU drivers and by the test
//! suite's deterministic fixtures.
//!
//! This backend does not interpret kernel bytecode — there is no
//! portable software ISA for arbitrary PTX/SPIR-V in scope here. It
//! exercises the full `Runner` contract (buffer lifetime, binding table,
//! dispatch/wait sequencing, timing) against host memory, which is
//! exactly what the contract-conformance tests in `tests` need; it is
//! not a kernel emulator.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use ht::{
    Backend, BufferRole, BufferUsage, DeviceInfo, ErrorCode, ErrorInfo, Result, TextureDesc,
    TimingSample,
};

use crate::runner::{NativeBuffer, NativeTexture, Runner};

pub struct CpuBuffer {
    role: BufferRole,
    usage: BufferUsage,
    storage: Mutex<Vec<u8>>,
}

impl NativeBuffer for CpuBuffer {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }
    fn role(&self) -> BufferRole {
        self.role
    }
    fn size_bytes(&self) -> u64 {
        self.storage.lock().unwrap().len() as u64
    }
    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn upload(&self, offset_bytes: u64, data: &[u8]) -> Result<()> {
        let mut storage = self.storage.lock().unwrap();
        let end = offset_bytes as usize + data.len();
        if end > storage.len() {
            return Err(ErrorInfo::new(ErrorCode::InvalidArgument, "upload range exceeds buffer bounds"));
        }
        storage[offset_bytes as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn download(&self, offset_bytes: u64, size_bytes: u64) -> Result<Vec<u8>> {
        let storage = self.storage.lock().unwrap();
        let end = offset_bytes as usize + size_bytes as usize;
        if end > storage.len() {
            return Err(ErrorInfo::new(ErrorCode::InvalidArgument, "download range exceeds buffer bounds"));
        }
        Ok(storage[offset_bytes as usize..end].to_vec())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct CpuTexture {
    desc: TextureDesc,
    #[allow(dead_code)]
    backing: CpuBuffer,
}

impl NativeTexture for CpuTexture {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Deterministic, always-available `Runner`. `dispatch` reports a fixed
/// near-zero timing sample rather than a real measurement, since there is
/// no device to time against.
pub struct CpuRunner {
    device: DeviceInfo,
    entry_point: Option<String>,
    parameters: Vec<u8>,
    bound_buffers: BTreeMap<u32, Arc<dyn NativeBuffer>>,
    last_timing: Option<TimingSample>,
}

impl CpuRunner {
    pub fn new() -> Self {
        let mut device = DeviceInfo::unknown(0, Backend::Cpu, "Software Fallback Device");
        device.supports_graphics = false;
        device.supports_compute = true;
        Self {
            device,
            entry_point: None,
            parameters: Vec::new(),
            bound_buffers: BTreeMap::new(),
            last_timing: None,
        }
    }
}

impl Default for CpuRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner for CpuRunner {
    fn backend_name(&self) -> &'static str {
        Backend::Cpu.to_str()
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    fn load_kernel(&mut self, bytecode: &[u8], entry_point: &str) -> Result<()> {
        if bytecode.is_empty() {
            return Err(ErrorInfo::new(ErrorCode::InvalidArgument, "empty kernel bytecode"));
        }
        if entry_point.is_empty() {
            return Err(ErrorInfo::new(ErrorCode::KernelLoadFailed, "empty entry point name"));
        }
        self.entry_point = Some(entry_point.to_string());
        Ok(())
    }

    fn set_parameters(&mut self, bytes: &[u8]) -> Result<()> {
        self.parameters = bytes.to_vec();
        Ok(())
    }

    fn set_buffer(&mut self, binding: u32, buffer: Arc<dyn NativeBuffer>) -> Result<()> {
        buffer.as_any().downcast_ref::<CpuBuffer>().ok_or_else(|| {
            ErrorInfo::new(ErrorCode::InvalidArgument, "buffer was not created by the CPU backend")
        })?;
        self.bound_buffers.insert(binding, buffer);
        Ok(())
    }

    fn set_texture(&mut self, _binding: u32, texture: Arc<dyn NativeTexture>) -> Result<()> {
        texture.as_any().downcast_ref::<CpuTexture>().ok_or_else(|| {
            ErrorInfo::new(ErrorCode::InvalidArgument, "texture was not created by the CPU backend")
        })?;
        Ok(())
    }

    fn dispatch(&mut self, _gx: u32, _gy: u32, _gz: u32) -> Result<()> {
        if self.entry_point.is_none() {
            return Err(ErrorInfo::new(ErrorCode::BackendNotAvailable, "dispatch called before load_kernel"));
        }
        self.last_timing = Some(TimingSample {
            memory_setup_ms: 0.0,
            compute_ms: 0.0,
            memory_teardown_ms: 0.0,
            total_ms: 0.0,
            is_complete: true,
        });
        Ok(())
    }

    fn wait(&mut self) -> Result<()> {
        Ok(())
    }

    fn last_timing(&self) -> Option<TimingSample> {
        self.last_timing
    }

    fn create_buffer(&mut self, size: u64, role: BufferRole, usage: BufferUsage) -> Result<Arc<dyn NativeBuffer>> {
        if size == 0 {
            return Err(ErrorInfo::new(ErrorCode::BufferCreationFailed, "buffer size must be positive"));
        }
        Ok(Arc::new(CpuBuffer {
            role,
            usage,
            storage: Mutex::new(vec![0u8; size as usize]),
        }))
    }

    fn create_texture(&mut self, desc: TextureDesc) -> Result<Arc<dyn NativeTexture>> {
        let size = desc.linear_size_bytes();
        if size == 0 {
            return Err(ErrorInfo::new(ErrorCode::TextureCreationFailed, "texture extents must be positive"));
        }
        Ok(Arc::new(CpuTexture {
            desc,
            backing: CpuBuffer {
                role: BufferRole::Storage,
                usage: BufferUsage::empty(),
                storage: Mutex::new(vec![0u8; size as usize]),
            },
        }))
    }

    fn set_global_params(&mut self, bytes: &[u8]) -> Result<()> {
        self.set_parameters(bytes)
    }

    fn supports(&self, feature: &str) -> bool {
        matches!(feature, "timestamps")
    }

    fn debug_info(&self) -> String {
        format!(
            "backend=cpu device={} entry_point={:?} bindings={} last_timing={:?}",
            self.device.name,
            self.entry_point,
            self.bound_buffers.len(),
            self.last_timing,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_before_load_kernel_is_backend_not_available() {
        let mut runner = CpuRunner::new();
        let err = runner.dispatch(1, 1, 1).unwrap_err();
        assert_eq!(err.code, ErrorCode::BackendNotAvailable);
    }

    #[test]
    fn full_contract_runs_end_to_end() {
        let mut runner = CpuRunner::new();
        runner.load_kernel(b"bytecode", "main").unwrap();
        runner.set_parameters(&[1, 2, 3, 4]).unwrap();

        let buffer = runner.create_buffer(64, BufferRole::Storage, BufferUsage::empty()).unwrap();
        buffer.upload(0, &[9u8; 16]).unwrap();
        runner.set_buffer(0, buffer.clone()).unwrap();

        runner.dispatch(1, 1, 1).unwrap();
        runner.wait().unwrap();

        let timing = runner.last_timing().unwrap();
        assert!(timing.is_complete);

        let downloaded = buffer.download(0, 16).unwrap();
        assert_eq!(downloaded, vec![9u8; 16]);
    }

    #[test]
    fn buffer_upload_past_bounds_is_rejected() {
        let mut runner = CpuRunner::new();
        let buffer = runner.create_buffer(8, BufferRole::Storage, BufferUsage::empty()).unwrap();
        let err = buffer.upload(4, &[0u8; 8]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn buffer_download_past_bounds_is_rejected() {
        let mut runner = CpuRunner::new();
        let buffer = runner.create_buffer(8, BufferRole::Storage, BufferUsage::empty()).unwrap();
        let err = buffer.download(0, 16).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn zero_size_buffer_creation_fails() {
        let mut runner = CpuRunner::new();
        let err = match runner.create_buffer(0, BufferRole::Storage, BufferUsage::empty()) {
            Err(e) => e,
            Ok(_) => panic!("expected create_buffer to fail for a zero-size buffer"),
        };
        assert_eq!(err.code, ErrorCode::BufferCreationFailed);
    }

    #[test]
    fn set_buffer_rejects_foreign_backend_buffer() {
        struct ForeignBuffer;
        impl NativeBuffer for ForeignBuffer {
            fn backend(&self) -> Backend {
                Backend::Vulkan
            }
            fn role(&self) -> BufferRole {
                BufferRole::Storage
            }
            fn size_bytes(&self) -> u64 {
                0
            }
            fn usage(&self) -> BufferUsage {
                BufferUsage::empty()
            }
            fn upload(&self, _offset_bytes: u64, _data: &[u8]) -> Result<()> {
                Ok(())
            }
            fn download(&self, _offset_bytes: u64, _size_bytes: u64) -> Result<Vec<u8>> {
                Ok(Vec::new())
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let mut runner = CpuRunner::new();
        let err = runner.set_buffer(0, Arc::new(ForeignBuffer)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn supports_recognizes_only_timestamps() {
        let runner = CpuRunner::new();
        assert!(runner.supports("timestamps"));
        assert!(!runner.supports("fp64"));
        assert!(!runner.supports("global_params"));
    }
}
