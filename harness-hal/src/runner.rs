//! The `Runner` trait and its resource-handle companions: a trait object
//! in place of a class hierarchy, with narrow `NativeBuffer`/
//! `NativeTexture` traits using `as_any()`-based downcasts instead of
//! `dynamic_cast`.

use std::any::Any;
use std::sync::Arc;

use ht::{Backend, BufferRole, BufferUsage, DeviceInfo, Result, TextureDesc, TimingSample};

/// A device-resident buffer, shared by counted reference across a
/// runner's binding table and its caller. Upload and
/// download are bounds-checked against `size_bytes` here rather than on
/// `Runner`, since the bound belongs to the buffer, not to whichever
/// runner happens to be dispatching at the time.
pub trait NativeBuffer: Any + Send + Sync {
    fn backend(&self) -> Backend;
    fn role(&self) -> BufferRole;
    fn size_bytes(&self) -> u64;
    fn usage(&self) -> BufferUsage;
    fn upload(&self, offset_bytes: u64, data: &[u8]) -> Result<()>;
    fn download(&self, offset_bytes: u64, size_bytes: u64) -> Result<Vec<u8>>;
    fn as_any(&self) -> &dyn Any;
}

/// A device-resident texture (represented as a linear buffer by the
/// compute-only backends; see [`ht::TextureDesc::linear_size_bytes`]).
pub trait NativeTexture: Any + Send + Sync {
    fn backend(&self) -> Backend;
    fn desc(&self) -> &TextureDesc;
    fn as_any(&self) -> &dyn Any;
}

/// One backend's device-bound execution context: buffer/texture lifetime,
/// kernel load, parameter binding, dispatch, and timing, behind one
/// uniform interface.
///
/// A `Runner` is bound to exactly one device for its lifetime; selecting a
/// different device means constructing a different `Runner` through the
/// backend factory in `harness-core`.
pub trait Runner: Send {
    fn backend_name(&self) -> &'static str;

    fn device_info(&self) -> &DeviceInfo;

    /// Load a compiled kernel module from backend-specific bytecode
    /// (PTX/cubin for CUDA, SPIR-V for Vulkan) and select `entry_point`.
    /// Any previously loaded module is unloaded first.
    fn load_kernel(&mut self, bytecode: &[u8], entry_point: &str) -> Result<()>;

    /// Store a copy of constant/uniform bytes for the next dispatch.
    fn set_parameters(&mut self, bytes: &[u8]) -> Result<()>;

    /// Record `buffer` at `binding` in this runner's binding table.
    /// A buffer native to a different backend is `InvalidArgument`.
    fn set_buffer(&mut self, binding: u32, buffer: Arc<dyn NativeBuffer>) -> Result<()>;

    fn set_texture(&mut self, binding: u32, texture: Arc<dyn NativeTexture>) -> Result<()>;

    /// Dispatch with explicit group counts (already run through
    /// [`ht::calc_dispatch`] by the caller, or chosen directly).
    fn dispatch(&mut self, gx: u32, gy: u32, gz: u32) -> Result<()>;

    /// Block until the most recently submitted dispatch completes.
    fn wait(&mut self) -> Result<()>;

    /// Timing for the most recently completed dispatch, or `None` before
    /// any dispatch has completed (see [`ht::TimingSample::is_complete`]
    /// for the in-flight-read open question's resolution).
    fn last_timing(&self) -> Option<TimingSample>;

    fn create_buffer(&mut self, size: u64, role: BufferRole, usage: BufferUsage) -> Result<Arc<dyn NativeBuffer>>;

    fn create_texture(&mut self, desc: TextureDesc) -> Result<Arc<dyn NativeTexture>>;

    /// Portable hook for cross-backend shader-language global parameters.
    /// On NVIDIA this writes to the named constant-memory symbol the
    /// compiler emits; on Vulkan this is a no-op, since global parameters
    /// are instead delivered through `set_buffer` into the uniform-buffer
    /// binding — a deliberate asymmetry higher-level code must honour.
    fn set_global_params(&mut self, bytes: &[u8]) -> Result<()>;

    /// Recognized tags are at minimum `"fp64"`, `"timestamps"`,
    /// `"global_params"` (true only for NVIDIA); unknown tags return
    /// `false` so callers can probe speculatively without erroring.
    fn supports(&self, feature: &str) -> bool;

    /// Multi-line human summary: backend, device, loaded module/entry,
    /// bound bindings, last timing — for the CLI's verbose mode and for
    /// tests asserting post-dispatch state without backend-private field
    /// access.
    fn debug_info(&self) -> String;
}
