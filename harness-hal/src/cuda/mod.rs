//! NVIDIA driver-API backend: a resolved symbol table over
//! `libcuda`, plus the `Runner` implementation built on top of it.

mod api;
mod runner;

pub use api::CudaDriverApi;
pub use runner::CudaRunner;

use std::ffi::CStr;
use std::os::raw::c_int;

use ht::{Backend, DeviceInfo, ErrorCode, ErrorInfo, Result};

/// The parameter symbol the shader compiler emits for a kernel's constant-
/// memory parameter block.
pub const SLANG_GLOBAL_PARAMS_SYMBOL: &str = "SLANG_globalParams";

/// Translate a raw `CUresult` code into a categorized error, using the
/// driver's own error-string entry points when available.
pub(crate) fn map_cuda_error(api: &CudaDriverApi, result: i32, during: &str) -> ErrorInfo {
    if result == 0 {
        return ErrorInfo::new(ErrorCode::UnknownError, "map_cuda_error called with success");
    }
    let detail = unsafe { api.describe_result(result) };
    ErrorInfo::new(
        ErrorCode::KernelExecutionFailed,
        format!("CUDA driver call failed during {during}: {detail} (code {result})"),
    )
}

/// Enumerate devices by loading the driver library into a throwaway
/// loader, independent of whichever loader instance the caller is
/// otherwise using. Mirrors `vulkan::enumerate_devices`'s use of a
/// short-lived instance for the same purpose: system interrogation needs
/// device names and memory sizes but not a standing context, so nothing
/// here is kept alive past this call.
pub fn enumerate_devices(library_path: &str) -> Result<Vec<DeviceInfo>> {
    let mut loader = crate::loader::RuntimeLoader::new();
    let handle = loader.load(library_path)?;
    let api = CudaDriverApi::resolve(&loader, handle)?;
    unsafe { enumerate_with_api(&api) }
}

unsafe fn enumerate_with_api(api: &CudaDriverApi) -> Result<Vec<DeviceInfo>> {
    let rc = unsafe { (api.init)(0) };
    if rc != 0 {
        return Err(map_cuda_error(api, rc, "cuInit"));
    }

    let mut count: c_int = 0;
    let rc = unsafe { (api.device_get_count)(&mut count) };
    if rc != 0 {
        return Err(map_cuda_error(api, rc, "cuDeviceGetCount"));
    }

    let mut devices = Vec::with_capacity(count.max(0) as usize);
    for ordinal in 0..count {
        let mut device: api::CUdevice = 0;
        let rc = unsafe { (api.device_get)(&mut device, ordinal) };
        if rc != 0 {
            return Err(map_cuda_error(api, rc, "cuDeviceGet"));
        }

        let mut name_buf = [0 as std::os::raw::c_char; 256];
        let name_rc = unsafe { (api.device_get_name)(name_buf.as_mut_ptr(), name_buf.len() as c_int, device) };
        let name = if name_rc == 0 {
            unsafe { CStr::from_ptr(name_buf.as_ptr()) }.to_string_lossy().into_owned()
        } else {
            format!("CUDA device {ordinal}")
        };

        let mut total_mem: usize = 0;
        let mem_rc = unsafe { (api.device_total_mem)(&mut total_mem, device) };
        let total_memory_bytes = if mem_rc == 0 { Some(total_mem as u64) } else { None };

        let mut info = DeviceInfo::unknown(ordinal as u32, Backend::Cuda, name);
        info.total_memory_bytes = total_memory_bytes;
        devices.push(info);
    }
    Ok(devices)
}
