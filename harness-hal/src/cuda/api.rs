//! Resolved NVIDIA driver-API symbol table.
//!
//! One `CudaDriverApi` is built per loaded `libcuda`, not per runner — the
//! teacher's cross-file raw-function-pointer globals are re-expressed here
//! as a struct of `unsafe extern "C" fn` pointers owned by the backend
//! factory, resolved once via
//! [`ht hal loader`](crate::loader::RuntimeLoader) and shared behind an
//! `Arc` by every runner the factory creates.

use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::os::raw::c_ulonglong;

use ht::{ErrorCode, ErrorInfo, Result};

use crate::loader::{LibraryHandle, RuntimeLoader};

pub type CUdevice = c_int;
pub type CUcontext = *mut c_void;
pub type CUmodule = *mut c_void;
pub type CUfunction = *mut c_void;
pub type CUdeviceptr = c_ulonglong;
pub type CUevent = *mut c_void;
pub type CUstream = *mut c_void;
pub type CUresult = c_int;

type FnInit = unsafe extern "C" fn(c_uint) -> CUresult;
type FnDeviceGetCount = unsafe extern "C" fn(*mut c_int) -> CUresult;
type FnDeviceGet = unsafe extern "C" fn(*mut CUdevice, c_int) -> CUresult;
type FnDeviceGetName = unsafe extern "C" fn(*mut c_char, c_int, CUdevice) -> CUresult;
type FnDeviceTotalMem = unsafe extern "C" fn(*mut usize, CUdevice) -> CUresult;
type FnCtxCreate = unsafe extern "C" fn(*mut CUcontext, c_uint, CUdevice) -> CUresult;
type FnCtxDestroy = unsafe extern "C" fn(CUcontext) -> CUresult;
type FnCtxSynchronize = unsafe extern "C" fn() -> CUresult;
type FnModuleLoadData = unsafe extern "C" fn(*mut CUmodule, *const c_void) -> CUresult;
type FnModuleUnload = unsafe extern "C" fn(CUmodule) -> CUresult;
type FnModuleGetFunction =
    unsafe extern "C" fn(*mut CUfunction, CUmodule, *const c_char) -> CUresult;
type FnModuleGetGlobal =
    unsafe extern "C" fn(*mut CUdeviceptr, *mut usize, CUmodule, *const c_char) -> CUresult;
type FnMemAlloc = unsafe extern "C" fn(*mut CUdeviceptr, usize) -> CUresult;
type FnMemFree = unsafe extern "C" fn(CUdeviceptr) -> CUresult;
type FnMemcpyHtoD = unsafe extern "C" fn(CUdeviceptr, *const c_void, usize) -> CUresult;
type FnMemcpyDtoH = unsafe extern "C" fn(*mut c_void, CUdeviceptr, usize) -> CUresult;
type FnLaunchKernel = unsafe extern "C" fn(
    CUfunction,
    c_uint,
    c_uint,
    c_uint,
    c_uint,
    c_uint,
    c_uint,
    c_uint,
    CUstream,
    *mut *mut c_void,
    *mut *mut c_void,
) -> CUresult;
type FnEventCreate = unsafe extern "C" fn(*mut CUevent, c_uint) -> CUresult;
type FnEventDestroy = unsafe extern "C" fn(CUevent) -> CUresult;
type FnEventRecord = unsafe extern "C" fn(CUevent, CUstream) -> CUresult;
type FnEventSynchronize = unsafe extern "C" fn(CUevent) -> CUresult;
type FnEventElapsedTime = unsafe extern "C" fn(*mut f32, CUevent, CUevent) -> CUresult;
type FnGetErrorString = unsafe extern "C" fn(CUresult, *mut *const c_char) -> CUresult;
type FnGetErrorName = unsafe extern "C" fn(CUresult, *mut *const c_char) -> CUresult;

/// Entry points resolved from `libcuda` by exact symbol name. Missing
/// critical symbols fail resolution entirely rather
/// than leaving a partially-populated table for callers to trip over.
pub struct CudaDriverApi {
    pub(crate) init: FnInit,
    pub(crate) device_get_count: FnDeviceGetCount,
    pub(crate) device_get: FnDeviceGet,
    pub(crate) device_get_name: FnDeviceGetName,
    pub(crate) device_total_mem: FnDeviceTotalMem,
    pub(crate) ctx_create: FnCtxCreate,
    pub(crate) ctx_destroy: FnCtxDestroy,
    pub(crate) ctx_synchronize: FnCtxSynchronize,
    pub(crate) module_load_data: FnModuleLoadData,
    pub(crate) module_unload: FnModuleUnload,
    pub(crate) module_get_function: FnModuleGetFunction,
    pub(crate) module_get_global: FnModuleGetGlobal,
    pub(crate) mem_alloc: FnMemAlloc,
    pub(crate) mem_free: FnMemFree,
    pub(crate) memcpy_htod: FnMemcpyHtoD,
    pub(crate) memcpy_dtoh: FnMemcpyDtoH,
    pub(crate) launch_kernel: FnLaunchKernel,
    pub(crate) event_create: FnEventCreate,
    pub(crate) event_destroy: FnEventDestroy,
    pub(crate) event_record: FnEventRecord,
    pub(crate) event_synchronize: FnEventSynchronize,
    pub(crate) event_elapsed_time: FnEventElapsedTime,
    pub(crate) get_error_string: FnGetErrorString,
    pub(crate) get_error_name: FnGetErrorName,
    _library: LibraryHandle,
}

macro_rules! resolve {
    ($loader:expr, $handle:expr, $name:literal) => {
        unsafe { $loader.typed_symbol($handle, $name) }.map_err(|e| {
            ErrorInfo::new(
                ErrorCode::BackendInitFailed,
                format!("missing required CUDA driver symbol '{}': {e}", $name),
            )
        })?
    };
}

impl CudaDriverApi {
    /// Resolve every entry point this backend needs out of an already-
    /// loaded `libcuda`, using the driver's `_v2` name where the driver
    /// historically versioned a symbol.
    pub fn resolve(loader: &RuntimeLoader, handle: LibraryHandle) -> Result<Self> {
        Ok(Self {
            init: resolve!(loader, handle, "cuInit"),
            device_get_count: resolve!(loader, handle, "cuDeviceGetCount"),
            device_get: resolve!(loader, handle, "cuDeviceGet"),
            device_get_name: resolve!(loader, handle, "cuDeviceGetName"),
            device_total_mem: resolve!(loader, handle, "cuDeviceTotalMem_v2"),
            ctx_create: resolve!(loader, handle, "cuCtxCreate_v2"),
            ctx_destroy: resolve!(loader, handle, "cuCtxDestroy_v2"),
            ctx_synchronize: resolve!(loader, handle, "cuCtxSynchronize"),
            module_load_data: resolve!(loader, handle, "cuModuleLoadData"),
            module_unload: resolve!(loader, handle, "cuModuleUnload"),
            module_get_function: resolve!(loader, handle, "cuModuleGetFunction"),
            module_get_global: resolve!(loader, handle, "cuModuleGetGlobal_v2"),
            mem_alloc: resolve!(loader, handle, "cuMemAlloc_v2"),
            mem_free: resolve!(loader, handle, "cuMemFree_v2"),
            memcpy_htod: resolve!(loader, handle, "cuMemcpyHtoD_v2"),
            memcpy_dtoh: resolve!(loader, handle, "cuMemcpyDtoH_v2"),
            launch_kernel: resolve!(loader, handle, "cuLaunchKernel"),
            event_create: resolve!(loader, handle, "cuEventCreate"),
            event_destroy: resolve!(loader, handle, "cuEventDestroy"),
            event_record: resolve!(loader, handle, "cuEventRecord"),
            event_synchronize: resolve!(loader, handle, "cuEventSynchronize"),
            event_elapsed_time: resolve!(loader, handle, "cuEventElapsedTime"),
            get_error_string: resolve!(loader, handle, "cuGetErrorString"),
            get_error_name: resolve!(loader, handle, "cuGetErrorName"),
            _library: handle,
        })
    }

    /// Human-readable description of a `CUresult`, via the driver's own
    /// error-string lookup when it resolves, falling back to the bare
    /// numeric code.
    pub(crate) unsafe fn describe_result(&self, result: CUresult) -> String {
        let mut ptr: *const c_char = std::ptr::null();
        let rc = unsafe { (self.get_error_string)(result, &mut ptr) };
        if rc == 0 && !ptr.is_null() {
            unsafe { CStr::from_ptr(ptr) }
                .to_string_lossy()
                .into_owned()
        } else {
            format!("unknown CUDA error {result}")
        }
    }
}

// SAFETY: the contained function pointers are `extern "C" fn`s resolved
// once at construction and never mutated; the driver itself is safe to
// call concurrently from multiple threads against distinct contexts.
unsafe impl Send for CudaDriverApi {}
unsafe impl Sync for CudaDriverApi {}
