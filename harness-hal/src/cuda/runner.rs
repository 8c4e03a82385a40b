//! `Runner` implementation over the resolved NVIDIA driver API.

use std::any::Any;
use std::collections::BTreeMap;
use std::ffi::{c_void, CString};
use std::sync::Arc;

use ht::{
    Backend, BufferRole, BufferUsage, DeviceInfo, ErrorCode, ErrorInfo, Result, TextureDesc,
    TimingSample,
};

use super::api::{CUcontext, CUdeviceptr, CUevent, CUfunction, CUmodule, CudaDriverApi};
use super::{map_cuda_error, SLANG_GLOBAL_PARAMS_SYMBOL};
use crate::runner::{NativeBuffer, NativeTexture, Runner};

fn check(api: &CudaDriverApi, result: i32, during: &str) -> Result<()> {
    if result == 0 {
        Ok(())
    } else {
        Err(map_cuda_error(api, result, during))
    }
}

/// Linear device allocation, tagged with the context it belongs to so a
/// buffer used against the wrong runner is diagnosed rather than silently
/// corrupting memory.
pub struct CudaBuffer {
    ptr: CUdeviceptr,
    role: BufferRole,
    size_bytes: u64,
    usage: BufferUsage,
    owning_context: CUcontext,
    api: Arc<CudaDriverApi>,
}

// SAFETY: `owning_context`/`ptr` are only ever compared or passed back
// into driver calls guarded by the runner's `&mut self`; the driver
// itself tolerates calls from any thread against a current context.
unsafe impl Send for CudaBuffer {}
unsafe impl Sync for CudaBuffer {}

impl NativeBuffer for CudaBuffer {
    fn backend(&self) -> Backend {
        Backend::Cuda
    }
    fn role(&self) -> BufferRole {
        self.role
    }
    fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn upload(&self, offset_bytes: u64, data: &[u8]) -> Result<()> {
        if offset_bytes + data.len() as u64 > self.size_bytes {
            return Err(ErrorInfo::new(ErrorCode::InvalidArgument, "upload range exceeds buffer bounds"));
        }
        check(
            &self.api,
            unsafe { (self.api.memcpy_htod)(self.ptr + offset_bytes, data.as_ptr() as *const c_void, data.len()) },
            "cuMemcpyHtoD",
        )
    }

    fn download(&self, offset_bytes: u64, size_bytes: u64) -> Result<Vec<u8>> {
        if offset_bytes + size_bytes > self.size_bytes {
            return Err(ErrorInfo::new(ErrorCode::InvalidArgument, "download range exceeds buffer bounds"));
        }
        let mut out = vec![0u8; size_bytes as usize];
        check(
            &self.api,
            unsafe { (self.api.memcpy_dtoh)(out.as_mut_ptr() as *mut c_void, self.ptr + offset_bytes, size_bytes as usize) },
            "cuMemcpyDtoH",
        )?;
        Ok(out)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for CudaBuffer {
    fn drop(&mut self) {
        unsafe { (self.api.mem_free)(self.ptr) };
    }
}

pub struct CudaTexture {
    ptr: CUdeviceptr,
    desc: TextureDesc,
    api: Arc<CudaDriverApi>,
}

unsafe impl Send for CudaTexture {}
unsafe impl Sync for CudaTexture {}

impl NativeTexture for CudaTexture {
    fn backend(&self) -> Backend {
        Backend::Cuda
    }
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for CudaTexture {
    fn drop(&mut self) {
        unsafe { (self.api.mem_free)(self.ptr) };
    }
}

fn downcast_buffer(context: CUcontext, buffer: &dyn NativeBuffer) -> Result<&CudaBuffer> {
    let cuda_buf = buffer.as_any().downcast_ref::<CudaBuffer>().ok_or_else(|| {
        ErrorInfo::new(ErrorCode::InvalidArgument, "buffer was not created by the CUDA backend")
    })?;
    if cuda_buf.owning_context != context {
        debug_assert!(false, "buffer used against a foreign CUDA context");
        return Err(ErrorInfo::new(
            ErrorCode::InvalidArgument,
            "buffer belongs to a different CUDA context than this runner",
        ));
    }
    Ok(cuda_buf)
}

/// One device context plus the currently loaded kernel module and the
/// four standing timing events.
pub struct CudaRunner {
    api: Arc<CudaDriverApi>,
    context: CUcontext,
    device: DeviceInfo,
    module: Option<CUmodule>,
    function: Option<CUfunction>,
    entry_point: Option<String>,
    bound_buffers: BTreeMap<u32, Arc<dyn NativeBuffer>>,
    evt_dispatch_start: CUevent,
    evt_dispatch_stop: CUevent,
    evt_memory_start: CUevent,
    evt_memory_stop: CUevent,
    last_timing: Option<TimingSample>,
}

impl CudaRunner {
    /// Create a context bound to `device_ordinal` and the four standing
    /// timing events.
    pub fn new(api: Arc<CudaDriverApi>, device_ordinal: i32, device: DeviceInfo) -> Result<Self> {
        let mut cu_device = 0;
        check(&api, unsafe { (api.device_get)(&mut cu_device, device_ordinal) }, "cuDeviceGet")?;

        let mut context: CUcontext = std::ptr::null_mut();
        check(&api, unsafe { (api.ctx_create)(&mut context, 0, cu_device) }, "cuCtxCreate")?;

        let make_event = |api: &CudaDriverApi| -> Result<CUevent> {
            let mut event: CUevent = std::ptr::null_mut();
            check(api, unsafe { (api.event_create)(&mut event, 0) }, "cuEventCreate")?;
            Ok(event)
        };

        let evt_dispatch_start = make_event(&api)?;
        let evt_dispatch_stop = make_event(&api)?;
        let evt_memory_start = make_event(&api)?;
        let evt_memory_stop = make_event(&api)?;

        Ok(Self {
            api,
            context,
            device,
            module: None,
            function: None,
            entry_point: None,
            bound_buffers: BTreeMap::new(),
            evt_dispatch_start,
            evt_dispatch_stop,
            evt_memory_start,
            evt_memory_stop,
            last_timing: None,
        })
    }
}

// SAFETY: a `CudaRunner` owns its context exclusively; the raw handles it
// carries are never accessed concurrently because every `Runner` method
// takes `&mut self`.
unsafe impl Send for CudaRunner {}

impl Drop for CudaRunner {
    fn drop(&mut self) {
        let api = &self.api;
        unsafe {
            (api.event_destroy)(self.evt_dispatch_start);
            (api.event_destroy)(self.evt_dispatch_stop);
            (api.event_destroy)(self.evt_memory_start);
            (api.event_destroy)(self.evt_memory_stop);
            if let Some(module) = self.module.take() {
                (api.module_unload)(module);
            }
            (api.ctx_destroy)(self.context);
        }
    }
}

impl Runner for CudaRunner {
    fn backend_name(&self) -> &'static str {
        Backend::Cuda.to_str()
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    fn load_kernel(&mut self, bytecode: &[u8], entry_point: &str) -> Result<()> {
        let mut module: CUmodule = std::ptr::null_mut();
        check(
            &self.api,
            unsafe { (self.api.module_load_data)(&mut module, bytecode.as_ptr() as *const c_void) },
            "cuModuleLoadData",
        )
        .map_err(|e| ErrorInfo::wrapping(ErrorCode::KernelLoadFailed, "failed to load PTX module", e))?;

        let entry_cstr = CString::new(entry_point).map_err(|_| {
            ErrorInfo::new(ErrorCode::InvalidArgument, "entry point name contains a NUL byte")
        })?;
        let mut function: CUfunction = std::ptr::null_mut();
        if let Err(e) = check(
            &self.api,
            unsafe { (self.api.module_get_function)(&mut function, module, entry_cstr.as_ptr()) },
            "cuModuleGetFunction",
        ) {
            unsafe { (self.api.module_unload)(module) };
            return Err(ErrorInfo::wrapping(
                ErrorCode::KernelLoadFailed,
                format!("entry point '{entry_point}' not found in module"),
                e,
            ));
        }

        if let Some(previous) = self.module.take() {
            unsafe { (self.api.module_unload)(previous) };
        }
        self.module = Some(module);
        self.function = Some(function);
        self.entry_point = Some(entry_point.to_string());
        Ok(())
    }

    fn set_parameters(&mut self, bytes: &[u8]) -> Result<()> {
        let module = self.module.ok_or_else(|| {
            ErrorInfo::new(ErrorCode::InvalidArgument, "set_parameters called before load_kernel")
        })?;
        let symbol = CString::new(SLANG_GLOBAL_PARAMS_SYMBOL).unwrap();
        let mut device_ptr: CUdeviceptr = 0;
        let mut capacity: usize = 0;
        check(
            &self.api,
            unsafe { (self.api.module_get_global)(&mut device_ptr, &mut capacity, module, symbol.as_ptr()) },
            "cuModuleGetGlobal",
        )?;
        if bytes.len() > capacity {
            return Err(ErrorInfo::new(
                ErrorCode::InvalidArgument,
                format!("parameter block of {} bytes exceeds kernel's declared capacity of {capacity} bytes", bytes.len()),
            ));
        }
        check(
            &self.api,
            unsafe { (self.api.memcpy_htod)(device_ptr, bytes.as_ptr() as *const c_void, bytes.len()) },
            "cuMemcpyHtoD (parameters)",
        )
    }

    fn set_buffer(&mut self, binding: u32, buffer: Arc<dyn NativeBuffer>) -> Result<()> {
        downcast_buffer(self.context, buffer.as_ref())?;
        self.bound_buffers.insert(binding, buffer);
        Ok(())
    }

    fn set_texture(&mut self, _binding: u32, texture: Arc<dyn NativeTexture>) -> Result<()> {
        texture.as_any().downcast_ref::<CudaTexture>().ok_or_else(|| {
            ErrorInfo::new(ErrorCode::InvalidArgument, "texture was not created by the CUDA backend")
        })?;
        Ok(())
    }

    fn dispatch(&mut self, gx: u32, gy: u32, gz: u32) -> Result<()> {
        let function = self.function.ok_or_else(|| {
            ErrorInfo::new(ErrorCode::BackendNotAvailable, "dispatch called before load_kernel")
        })?;
        check(&self.api, unsafe { (self.api.event_record)(self.evt_dispatch_start, std::ptr::null_mut()) }, "cuEventRecord")?;
        check(
            &self.api,
            unsafe {
                (self.api.launch_kernel)(
                    function, gx, gy, gz, 16, 16, 1, 0,
                    std::ptr::null_mut(), std::ptr::null_mut(), std::ptr::null_mut(),
                )
            },
            "cuLaunchKernel",
        )
        .map_err(|e| ErrorInfo::wrapping(ErrorCode::KernelExecutionFailed, "kernel launch failed", e))?;
        check(&self.api, unsafe { (self.api.event_record)(self.evt_dispatch_stop, std::ptr::null_mut()) }, "cuEventRecord")
    }

    fn wait(&mut self) -> Result<()> {
        check(&self.api, unsafe { (self.api.ctx_synchronize)() }, "cuCtxSynchronize")?;
        let mut compute_ms: f32 = 0.0;
        check(
            &self.api,
            unsafe { (self.api.event_elapsed_time)(&mut compute_ms, self.evt_dispatch_start, self.evt_dispatch_stop) },
            "cuEventElapsedTime",
        )?;
        self.last_timing = Some(TimingSample {
            memory_setup_ms: 0.0,
            compute_ms: compute_ms as f64,
            memory_teardown_ms: 0.0,
            total_ms: compute_ms as f64,
            is_complete: true,
        });
        Ok(())
    }

    fn last_timing(&self) -> Option<TimingSample> {
        self.last_timing
    }

    fn create_buffer(&mut self, size: u64, role: BufferRole, usage: BufferUsage) -> Result<Arc<dyn NativeBuffer>> {
        let mut ptr: CUdeviceptr = 0;
        check(&self.api, unsafe { (self.api.mem_alloc)(&mut ptr, size as usize) }, "cuMemAlloc")
            .map_err(|e| ErrorInfo::wrapping(ErrorCode::BufferCreationFailed, "failed to allocate device buffer", e))?;
        Ok(Arc::new(CudaBuffer {
            ptr,
            role,
            size_bytes: size,
            usage,
            owning_context: self.context,
            api: self.api.clone(),
        }))
    }

    fn create_texture(&mut self, desc: TextureDesc) -> Result<Arc<dyn NativeTexture>> {
        let size = desc.linear_size_bytes();
        let mut ptr: CUdeviceptr = 0;
        check(&self.api, unsafe { (self.api.mem_alloc)(&mut ptr, size as usize) }, "cuMemAlloc")
            .map_err(|e| ErrorInfo::wrapping(ErrorCode::TextureCreationFailed, "failed to allocate texture storage", e))?;
        Ok(Arc::new(CudaTexture { ptr, desc, api: self.api.clone() }))
    }

    fn set_global_params(&mut self, bytes: &[u8]) -> Result<()> {
        self.set_parameters(bytes)
    }

    fn supports(&self, feature: &str) -> bool {
        matches!(feature, "fp64" | "timestamps" | "global_params")
    }

    fn debug_info(&self) -> String {
        format!(
            "backend=cuda device={} entry_point={:?} bindings={} last_timing={:?}",
            self.device.name,
            self.entry_point,
            self.bound_buffers.len(),
            self.last_timing,
        )
    }
}
