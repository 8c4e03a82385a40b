/*! Ergonomic facade over [`hc::HarnessEnvironment`] and the per-backend
 * `Runner`s in `harness-hal`: a `Harness` that owns environment state and a
 * `Kernel` handle that owns one open runner, in place of the environment/
 * runner split every lower layer works with directly.
 */
#![warn(trivial_casts, trivial_numeric_casts, unused_extern_crates)]

use std::sync::Arc;

pub use ht::{
    Backend, BufferRole, BufferUsage, DeviceInfo, ErrorCategory, ErrorCode, ErrorInfo, Result,
    RuntimeCapabilities, RuntimeInfo, SystemSnapshot, TextureDesc, TextureFlags, TextureFormat,
    TimingSample, calc_dispatch,
};
pub use hal::{NativeBuffer, NativeTexture};
pub use hc::HarnessEnvironment;

/// Owns a [`HarnessEnvironment`] and hands out [`Kernel`] handles. Most
/// programs construct exactly one of these; embedders that need isolated
/// caches (e.g. parallel test harnesses) can construct more than one
/// instead of sharing [`hc::process_env`].
pub struct Harness {
    env: HarnessEnvironment,
}

impl Harness {
    pub fn new() -> Self {
        Self { env: HarnessEnvironment::new() }
    }

    pub fn snapshot(&mut self) -> &SystemSnapshot {
        self.env.snapshot()
    }

    pub fn refresh(&mut self) {
        self.env.refresh();
    }

    pub fn is_available(&mut self, backend: Backend) -> bool {
        self.env.is_available(backend)
    }

    pub fn available_backends(&mut self) -> Vec<Backend> {
        self.env.available_backends()
    }

    pub fn devices(&mut self, backend: Backend) -> Result<Vec<DeviceInfo>> {
        self.env.devices(backend)
    }

    /// Open a runner for a specific backend and device index.
    pub fn open(&mut self, backend: Backend, device_index: usize) -> Result<Kernel> {
        let runner = self.env.create_runner(backend, device_index)?;
        Ok(Kernel { runner, backend })
    }

    /// Open device 0 of the first available backend in
    /// [`Backend::default_preference_order`].
    pub fn open_preferred(&mut self) -> Result<Kernel> {
        let available = self.available_backends();
        for &backend in Backend::default_preference_order() {
            if available.contains(&backend) {
                return self.open(backend, 0);
            }
        }
        Err(ErrorInfo::new(ErrorCode::BackendNotAvailable, "no backend is available on this system"))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// One open runner plus the backend it was opened on. Not `Sync` — see
/// [`hal::Runner`]'s own single-owning-thread contract, which this type
/// inherits unchanged.
pub struct Kernel {
    runner: Box<dyn hal::Runner>,
    backend: Backend,
}

impl Kernel {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn device_info(&self) -> &DeviceInfo {
        self.runner.device_info()
    }

    pub fn load(&mut self, bytecode: &[u8], entry_point: &str) -> Result<()> {
        self.runner.load_kernel(bytecode, entry_point)
    }

    pub fn set_parameters(&mut self, bytes: &[u8]) -> Result<()> {
        self.runner.set_parameters(bytes)
    }

    /// Deliver per-dispatch global/uniform parameters through whichever
    /// native mechanism the open backend uses — NVIDIA's constant-memory
    /// symbol write versus Vulkan's uniform-buffer binding — without the
    /// caller needing to know which. See [`hal::Runner::set_global_params`]
    /// for the asymmetry this papers over at the trait level.
    pub fn set_global_parameters(&mut self, bytes: &[u8]) -> Result<()> {
        match self.backend {
            Backend::Vulkan => self.runner.set_parameters(bytes),
            Backend::Cuda | Backend::Cpu => self.runner.set_global_params(bytes),
        }
    }

    pub fn bind_buffer(&mut self, binding: u32, buffer: Arc<dyn NativeBuffer>) -> Result<()> {
        self.runner.set_buffer(binding, buffer)
    }

    pub fn bind_texture(&mut self, binding: u32, texture: Arc<dyn NativeTexture>) -> Result<()> {
        self.runner.set_texture(binding, texture)
    }

    pub fn create_buffer(&mut self, size_bytes: u64, role: BufferRole, usage: BufferUsage) -> Result<Arc<dyn NativeBuffer>> {
        self.runner.create_buffer(size_bytes, role, usage)
    }

    pub fn create_texture(&mut self, desc: TextureDesc) -> Result<Arc<dyn NativeTexture>> {
        self.runner.create_texture(desc)
    }

    pub fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) -> Result<()> {
        self.runner.dispatch(groups_x, groups_y, groups_z)
    }

    /// Dispatch with the group counts [`calc_dispatch`] derives from an
    /// element extent, rather than raw group counts.
    pub fn dispatch_for_extent(&mut self, width: u32, height: u32, depth: u32) -> Result<()> {
        let (gx, gy, gz) = calc_dispatch(width, height, depth);
        self.dispatch(gx, gy, gz)
    }

    pub fn wait(&mut self) -> Result<()> {
        self.runner.wait()
    }

    pub fn last_timing(&self) -> Option<TimingSample> {
        self.runner.last_timing()
    }

    pub fn supports(&self, feature: &str) -> bool {
        self.runner.supports(feature)
    }

    pub fn debug_info(&self) -> String {
        self.runner.debug_info()
    }
}
