//! Physical device selection and logical device/queue creation.

use std::sync::Arc;

use ht::{DeviceInfo, ErrorCode, ErrorInfo, Result};

use super::instance::InstanceShared;
use super::VkResultExt;

/// Owned logical device plus the single compute queue and family index
/// runners dispatch against.
pub struct DeviceShared {
    pub(crate) instance: Arc<InstanceShared>,
    pub(crate) raw: ash::Device,
    pub(crate) physical_device: ash::vk::PhysicalDevice,
    pub(crate) queue: ash::vk::Queue,
    pub(crate) queue_family_index: u32,
}

impl DeviceShared {
    /// Enumerate physical devices, select by `device_ordinal`, pick the
    /// first queue family advertising compute capability, and create a
    /// logical device with one queue of that family at unit priority and
    /// no extra features.
    pub fn create(instance: Arc<InstanceShared>, device_ordinal: usize) -> Result<(Arc<Self>, DeviceInfo)> {
        let physical_devices = unsafe { instance.raw.enumerate_physical_devices() }
            .harness_err("vkEnumeratePhysicalDevices")?;
        let physical_device = *physical_devices.get(device_ordinal).ok_or_else(|| {
            ErrorInfo::new(
                ErrorCode::DeviceNotFound,
                format!(
                    "device ordinal {device_ordinal} out of range ({} devices enumerated)",
                    physical_devices.len()
                ),
            )
        })?;

        let queue_families =
            unsafe { instance.raw.get_physical_device_queue_family_properties(physical_device) };
        let queue_family_index = queue_families
            .iter()
            .position(|props| props.queue_flags.contains(ash::vk::QueueFlags::COMPUTE))
            .ok_or_else(|| {
                ErrorInfo::new(ErrorCode::DeviceNotFound, "no compute-capable queue family on this device")
            })? as u32;

        let queue_priorities = [1.0f32];
        let queue_create_info = ash::vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities);
        let queue_create_infos = [queue_create_info];
        let device_create_info =
            ash::vk::DeviceCreateInfo::default().queue_create_infos(&queue_create_infos);

        let raw = unsafe {
            instance
                .raw
                .create_device(physical_device, &device_create_info, None)
        }
        .harness_err("vkCreateDevice")
        .map_err(|e| ErrorInfo::wrapping(ErrorCode::BackendInitFailed, "failed to create logical device", e))?;

        let queue = unsafe { raw.get_device_queue(queue_family_index, 0) };
        let info = Self::query_info(&instance, physical_device, device_ordinal as u32);

        Ok((
            Arc::new(Self {
                instance,
                raw,
                physical_device,
                queue,
                queue_family_index,
            }),
            info,
        ))
    }

    /// Read device properties/memory heaps without creating a logical
    /// device, for enumeration-only callers (the system interrogator)
    /// that should not pay for a queue just to list devices.
    pub fn query_info(instance: &InstanceShared, physical_device: ash::vk::PhysicalDevice, ordinal: u32) -> DeviceInfo {
        let properties = unsafe { instance.raw.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.raw.get_physical_device_memory_properties(physical_device) };
        let total_memory_bytes = memory_properties.memory_heaps
            [..memory_properties.memory_heap_count as usize]
            .iter()
            .find(|heap| heap.flags.contains(ash::vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size);

        let device_name = {
            let raw_name = &properties.device_name;
            let bytes: Vec<u8> = raw_name
                .iter()
                .take_while(|&&c| c != 0)
                .map(|&c| c as u8)
                .collect();
            String::from_utf8_lossy(&bytes).into_owned()
        };

        let mut info = DeviceInfo::unknown(ordinal, ht::Backend::Vulkan, device_name);
        info.total_memory_bytes = total_memory_bytes;
        info.compute_capability = format!(
            "{}.{}.{}",
            ash::vk::api_version_major(properties.api_version),
            ash::vk::api_version_minor(properties.api_version),
            ash::vk::api_version_patch(properties.api_version),
        );
        info.api_version = info.compute_capability.clone();
        info.max_shared_memory_bytes = properties.limits.max_compute_shared_memory_size;
        info.max_threads_per_workgroup = properties.limits.max_compute_work_group_invocations;
        info.integrated = properties.device_type == ash::vk::PhysicalDeviceType::INTEGRATED_GPU;
        info
    }

    /// Enumerate physical devices visible to `instance` without creating
    /// any logical devices.
    pub fn enumerate_info(instance: &InstanceShared) -> Result<Vec<DeviceInfo>> {
        let physical_devices = unsafe { instance.raw.enumerate_physical_devices() }
            .harness_err("vkEnumeratePhysicalDevices")?;
        Ok(physical_devices
            .iter()
            .enumerate()
            .map(|(i, &pd)| Self::query_info(instance, pd, i as u32))
            .collect())
    }

    /// Find a device-local memory type whose type-bit is set in `filter`
    /// and that also carries every flag in `required`
    ///.
    pub fn find_memory_type(
        &self,
        filter: u32,
        required: ash::vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        let props = unsafe {
            self.instance
                .raw
                .get_physical_device_memory_properties(self.physical_device)
        };
        (0..props.memory_type_count)
            .find(|&i| {
                (filter & (1 << i)) != 0
                    && props.memory_types[i as usize].property_flags.contains(required)
            })
            .ok_or_else(|| {
                ErrorInfo::new(
                    ErrorCode::GpuOutOfMemory,
                    "no memory type satisfies both the type filter and required properties",
                )
            })
    }
}

unsafe impl Send for DeviceShared {}
unsafe impl Sync for DeviceShared {}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        unsafe {
            let _ = self.raw.device_wait_idle();
            self.raw.destroy_device(None);
        }
    }
}
