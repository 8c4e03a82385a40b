//! Per-backend factory registry: one [`BackendFactoryImpl`] per [`Backend`],
//! constructed lazily and cached on first use by [`crate::HarnessEnvironment`].

use ht::{Backend, DeviceInfo, Result, SystemSnapshot};

/// What it takes to go from a cached snapshot to a live [`hal::Runner`] for
/// one backend. Implementations read device info out of the snapshot
/// rather than re-scanning, so driver/library detection happens exactly
/// once per process.
pub trait BackendFactoryImpl: Send {
    fn backend(&self) -> Backend;

    /// Devices this backend reports. Most implementations simply copy the
    /// device list already present in the snapshot's matching runtime
    /// entry.
    fn devices(&mut self, snapshot: &SystemSnapshot) -> Result<Vec<DeviceInfo>>;

    /// Construct a runner for `device_index` into [`Self::devices`]'s
    /// result. The driver's symbols are resolved lazily, on the runner's
    /// first construction, not at factory-creation time.
    fn create_runner(&mut self, snapshot: &SystemSnapshot, device_index: usize) -> Result<Box<dyn hal::Runner>>;
}

struct CudaFactory {
    api: Option<std::sync::Arc<hal::cuda::CudaDriverApi>>,
}

impl BackendFactoryImpl for CudaFactory {
    fn backend(&self) -> Backend {
        Backend::Cuda
    }

    fn devices(&mut self, snapshot: &SystemSnapshot) -> Result<Vec<DeviceInfo>> {
        Ok(snapshot.cuda.devices.clone())
    }

    fn create_runner(&mut self, snapshot: &SystemSnapshot, device_index: usize) -> Result<Box<dyn hal::Runner>> {
        let api = match &self.api {
            Some(api) => api.clone(),
            None => {
                let library_path = snapshot.cuda.primary_library_path.as_ref().ok_or_else(|| {
                    ht::ErrorInfo::new(ht::ErrorCode::BackendNotAvailable, "no CUDA driver library in snapshot")
                })?;
                let handle = hal::process_loader().lock().load(library_path)?;
                let api = std::sync::Arc::new(hal::cuda::CudaDriverApi::resolve(&hal::process_loader().lock(), handle)?);
                self.api = Some(api.clone());
                api
            }
        };
        let device = snapshot.cuda.devices[device_index].clone();
        let runner = hal::cuda::CudaRunner::new(api, device.index as i32, device)?;
        Ok(Box::new(runner))
    }
}

struct VulkanFactory;

impl BackendFactoryImpl for VulkanFactory {
    fn backend(&self) -> Backend {
        Backend::Vulkan
    }

    fn devices(&mut self, snapshot: &SystemSnapshot) -> Result<Vec<DeviceInfo>> {
        Ok(snapshot.vulkan.devices.clone())
    }

    fn create_runner(&mut self, _snapshot: &SystemSnapshot, device_index: usize) -> Result<Box<dyn hal::Runner>> {
        let runner = hal::vulkan::VulkanRunner::new(device_index)?;
        Ok(Box::new(runner))
    }
}

struct CpuFactory;

impl BackendFactoryImpl for CpuFactory {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }

    fn devices(&mut self, _snapshot: &SystemSnapshot) -> Result<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo::unknown(0, Backend::Cpu, "Software Fallback Device")])
    }

    fn create_runner(&mut self, _snapshot: &SystemSnapshot, _device_index: usize) -> Result<Box<dyn hal::Runner>> {
        Ok(Box::new(hal::CpuRunner::new()))
    }
}

pub(crate) fn make_factory(backend: Backend) -> Box<dyn BackendFactoryImpl> {
    match backend {
        Backend::Cuda => Box::new(CudaFactory { api: None }),
        Backend::Vulkan => Box::new(VulkanFactory),
        Backend::Cpu => Box::new(CpuFactory),
    }
}
