//! `Runner` implementation over a Vulkan compute queue.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use ht::{
    Backend, BufferRole, BufferUsage, DeviceInfo, ErrorCode, ErrorInfo, Result, TextureDesc,
    TimingSample,
};

use super::device::DeviceShared;
use super::instance::InstanceShared;
use super::pipeline::{CommandPool, ComputePipeline, BINDING_UNIFORM_PARAMS};
use super::VkResultExt;
use crate::runner::{NativeBuffer, NativeTexture, Runner};

pub struct VulkanBuffer {
    pub(crate) buffer: ash::vk::Buffer,
    memory: ash::vk::DeviceMemory,
    role: BufferRole,
    size_bytes: u64,
    usage: BufferUsage,
    device: Arc<DeviceShared>,
}

unsafe impl Send for VulkanBuffer {}
unsafe impl Sync for VulkanBuffer {}

impl NativeBuffer for VulkanBuffer {
    fn backend(&self) -> Backend {
        Backend::Vulkan
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
        unsafe {
            let ptr = self
                .device
                .raw
                .map_memory(self.memory, 0, ash::vk::WHOLE_SIZE, ash::vk::MemoryMapFlags::empty())
                .harness_err("vkMapMemory")?;
            let dst = (ptr as *mut u8).add(offset_bytes as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
            self.device.raw.unmap_memory(self.memory);
        }
        Ok(())
    }

    fn download(&self, offset_bytes: u64, size_bytes: u64) -> Result<Vec<u8>> {
        if offset_bytes + size_bytes > self.size_bytes {
            return Err(ErrorInfo::new(ErrorCode::InvalidArgument, "download range exceeds buffer bounds"));
        }
        let mut out = vec![0u8; size_bytes as usize];
        unsafe {
            let ptr = self
                .device
                .raw
                .map_memory(self.memory, 0, ash::vk::WHOLE_SIZE, ash::vk::MemoryMapFlags::empty())
                .harness_err("vkMapMemory")?;
            let src = (ptr as *const u8).add(offset_bytes as usize);
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len());
            self.device.raw.unmap_memory(self.memory);
        }
        Ok(out)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.raw.destroy_buffer(self.buffer, None);
            self.device.raw.free_memory(self.memory, None);
        }
    }
}

pub struct VulkanTexture {
    buffer: VulkanBuffer,
    desc: TextureDesc,
}

impl NativeTexture for VulkanTexture {
    fn backend(&self) -> Backend {
        Backend::Vulkan
    }
    fn desc(&self) -> &TextureDesc {
        &self.desc
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn downcast_buffer(buffer: &dyn NativeBuffer) -> Result<&VulkanBuffer> {
    buffer.as_any().downcast_ref::<VulkanBuffer>().ok_or_else(|| {
        ErrorInfo::new(ErrorCode::InvalidArgument, "buffer was not created by the Vulkan backend")
    })
}

/// One device, one compute queue, the pipeline/descriptors for the
/// currently loaded kernel, and a lazily created command pool
///.
pub struct VulkanRunner {
    instance: Arc<InstanceShared>,
    device: Arc<DeviceShared>,
    info: DeviceInfo,
    pipeline: Option<ComputePipeline>,
    command_pool: Option<CommandPool>,
    entry_point: Option<String>,
    bound_buffer_handles: BTreeMap<u32, ash::vk::Buffer>,
    // Keeps bound resources alive for as long as they're in the binding
    // table; `bound_buffer_handles` is what `update_descriptors` reads.
    bound_buffer_refs: BTreeMap<u32, Arc<dyn NativeBuffer>>,
    bound_texture_refs: BTreeMap<u32, Arc<dyn NativeTexture>>,
    params_buffer: Option<(ash::vk::Buffer, ash::vk::DeviceMemory, u64)>,
    last_timing: Option<TimingSample>,
}

impl VulkanRunner {
    pub fn new(device_ordinal: usize) -> Result<Self> {
        let instance = InstanceShared::create()?;
        let (device, info) = DeviceShared::create(instance.clone(), device_ordinal)?;
        Ok(Self {
            instance,
            device,
            info,
            pipeline: None,
            command_pool: None,
            entry_point: None,
            bound_buffer_handles: BTreeMap::new(),
            bound_buffer_refs: BTreeMap::new(),
            bound_texture_refs: BTreeMap::new(),
            params_buffer: None,
            last_timing: None,
        })
    }

    pub fn instance(&self) -> &Arc<InstanceShared> {
        &self.instance
    }

    fn create_buffer_and_memory(
        &self,
        size_bytes: u64,
        vk_usage: ash::vk::BufferUsageFlags,
    ) -> Result<(ash::vk::Buffer, ash::vk::DeviceMemory)> {
        let buffer_info = ash::vk::BufferCreateInfo::default()
            .size(size_bytes)
            .usage(vk_usage)
            .sharing_mode(ash::vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.raw.create_buffer(&buffer_info, None) }
            .harness_err("vkCreateBuffer")
            .map_err(|e| ErrorInfo::wrapping(ErrorCode::BufferCreationFailed, "failed to create buffer", e))?;

        let requirements = unsafe { self.device.raw.get_buffer_memory_requirements(buffer) };
        let memory_type = self.device.find_memory_type(
            requirements.memory_type_bits,
            ash::vk::MemoryPropertyFlags::HOST_VISIBLE | ash::vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let alloc_info = ash::vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);
        let memory = unsafe { self.device.raw.allocate_memory(&alloc_info, None) }
            .harness_err("vkAllocateMemory")
            .map_err(|e| {
                unsafe { self.device.raw.destroy_buffer(buffer, None) };
                ErrorInfo::wrapping(ErrorCode::BufferCreationFailed, "failed to allocate buffer memory", e)
            })?;
        unsafe { self.device.raw.bind_buffer_memory(buffer, memory, 0) }
            .harness_err("vkBindBufferMemory")
            .map_err(|e| {
                unsafe {
                    self.device.raw.free_memory(memory, None);
                    self.device.raw.destroy_buffer(buffer, None);
                }
                ErrorInfo::wrapping(ErrorCode::BufferCreationFailed, "failed to bind buffer memory", e)
            })?;
        Ok((buffer, memory))
    }

    fn update_descriptors(&self) -> Result<()> {
        let Some(pipeline) = &self.pipeline else {
            return Ok(());
        };
        let mut buffer_infos = Vec::new();
        let mut slots = Vec::new();
        for (&slot, &buffer) in &self.bound_buffer_handles {
            buffer_infos.push(ash::vk::DescriptorBufferInfo::default().buffer(buffer).offset(0).range(ash::vk::WHOLE_SIZE));
            slots.push(slot);
        }
        let descriptor_writes: Vec<_> = slots
            .iter()
            .zip(buffer_infos.iter())
            .map(|(&slot, info)| {
                let ty = if slot == BINDING_UNIFORM_PARAMS {
                    ash::vk::DescriptorType::UNIFORM_BUFFER
                } else {
                    ash::vk::DescriptorType::STORAGE_BUFFER
                };
                ash::vk::WriteDescriptorSet::default()
                    .dst_set(pipeline.descriptor_set)
                    .dst_binding(slot)
                    .descriptor_type(ty)
                    .buffer_info(std::slice::from_ref(info))
            })
            .collect();
        if !descriptor_writes.is_empty() {
            unsafe { self.device.raw.update_descriptor_sets(&descriptor_writes, &[]) };
        }
        Ok(())
    }
}

impl Drop for VulkanRunner {
    fn drop(&mut self) {
        // Strict reverse-order shutdown: wait idle,
        // then pipeline objects, then command pool; the logical device
        // and instance are torn down by their own `Drop` impls afterward.
        unsafe {
            let _ = self.device.raw.queue_wait_idle(self.device.queue);
        }
        if let Some((buffer, memory, _)) = self.params_buffer.take() {
            unsafe {
                self.device.raw.destroy_buffer(buffer, None);
                self.device.raw.free_memory(memory, None);
            }
        }
        if let Some(pool) = self.command_pool.take() {
            pool.destroy(&self.device.raw);
        }
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.destroy(&self.device.raw);
        }
    }
}

impl Runner for VulkanRunner {
    fn backend_name(&self) -> &'static str {
        Backend::Vulkan.to_str()
    }

    fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn load_kernel(&mut self, bytecode: &[u8], entry_point: &str) -> Result<()> {
        let pipeline = ComputePipeline::create(&self.device.raw, bytecode, entry_point)?;
        if let Some(previous) = self.pipeline.take() {
            previous.destroy(&self.device.raw);
        }
        self.pipeline = Some(pipeline);
        self.bound_buffer_handles.clear();
        self.bound_buffer_refs.clear();
        self.bound_texture_refs.clear();
        self.entry_point = Some(entry_point.to_string());
        Ok(())
    }

    fn set_parameters(&mut self, bytes: &[u8]) -> Result<()> {
        // The runner owns the constants buffer directly (binding 2); unlike
        // the NVIDIA backend there is no compiler-declared capacity symbol
        // to validate against, so the buffer is simply (re)sized to fit.
        let needs_alloc = match &self.params_buffer {
            Some((_, _, capacity)) => (bytes.len() as u64) > *capacity,
            None => true,
        };
        if needs_alloc {
            if let Some((buffer, memory, _)) = self.params_buffer.take() {
                unsafe {
                    self.device.raw.destroy_buffer(buffer, None);
                    self.device.raw.free_memory(memory, None);
                }
            }
            let (buffer, memory) = self.create_buffer_and_memory(
                bytes.len().max(1) as u64,
                ash::vk::BufferUsageFlags::UNIFORM_BUFFER,
            )?;
            self.params_buffer = Some((buffer, memory, bytes.len().max(1) as u64));
        }
        let (buffer, memory, _) = self.params_buffer.expect("allocated above");
        unsafe {
            let ptr = self
                .device
                .raw
                .map_memory(memory, 0, ash::vk::WHOLE_SIZE, ash::vk::MemoryMapFlags::empty())
                .harness_err("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
            self.device.raw.unmap_memory(memory);
        }
        let params_buffer: Arc<dyn NativeBuffer> = Arc::new(VulkanBuffer {
            buffer,
            memory,
            role: BufferRole::Uniform,
            size_bytes: bytes.len().max(1) as u64,
            usage: BufferUsage::empty(),
            device: self.device.clone(),
        });
        self.bound_buffer_handles.insert(BINDING_UNIFORM_PARAMS, buffer);
        self.bound_buffer_refs.insert(BINDING_UNIFORM_PARAMS, params_buffer);
        Ok(())
    }

    fn set_buffer(&mut self, binding: u32, buffer: Arc<dyn NativeBuffer>) -> Result<()> {
        let vk_buffer = downcast_buffer(buffer.as_ref())?.buffer;
        self.bound_buffer_handles.insert(binding, vk_buffer);
        self.bound_buffer_refs.insert(binding, buffer);
        Ok(())
    }

    fn set_texture(&mut self, binding: u32, texture: Arc<dyn NativeTexture>) -> Result<()> {
        let vk_buffer = {
            let vk_texture = texture.as_any().downcast_ref::<VulkanTexture>().ok_or_else(|| {
                ErrorInfo::new(ErrorCode::InvalidArgument, "texture was not created by the Vulkan backend")
            })?;
            vk_texture.buffer.buffer
        };
        self.bound_buffer_handles.insert(binding, vk_buffer);
        self.bound_texture_refs.insert(binding, texture);
        Ok(())
    }

    fn dispatch(&mut self, gx: u32, gy: u32, gz: u32) -> Result<()> {
        if self.pipeline.is_none() {
            return Err(ErrorInfo::new(ErrorCode::BackendNotAvailable, "dispatch called before load_kernel"));
        }
        if self.command_pool.is_none() {
            self.command_pool = Some(CommandPool::create(&self.device.raw, self.device.queue_family_index)?);
        }
        self.update_descriptors()?;

        let pipeline = self.pipeline.as_ref().unwrap();
        let pool = self.command_pool.as_ref().unwrap();
        let cmd = pool.command_buffer;

        unsafe { self.device.raw.reset_command_buffer(cmd, ash::vk::CommandBufferResetFlags::empty()) }
            .harness_err("vkResetCommandBuffer")?;

        let begin_info = ash::vk::CommandBufferBeginInfo::default()
            .flags(ash::vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.raw.begin_command_buffer(cmd, &begin_info) }.harness_err("vkBeginCommandBuffer")?;
        unsafe {
            self.device.raw.cmd_bind_pipeline(cmd, ash::vk::PipelineBindPoint::COMPUTE, pipeline.pipeline);
            self.device.raw.cmd_bind_descriptor_sets(
                cmd,
                ash::vk::PipelineBindPoint::COMPUTE,
                pipeline.pipeline_layout,
                0,
                &[pipeline.descriptor_set],
                &[],
            );
            self.device.raw.cmd_dispatch(cmd, gx, gy, gz);
        }
        unsafe { self.device.raw.end_command_buffer(cmd) }.harness_err("vkEndCommandBuffer")?;

        let fence_info = ash::vk::FenceCreateInfo::default();
        let fence = unsafe { self.device.raw.create_fence(&fence_info, None) }.harness_err("vkCreateFence")?;

        let command_buffers = [cmd];
        let submit_info = ash::vk::SubmitInfo::default().command_buffers(&command_buffers);
        let start = std::time::Instant::now();
        let submit_result = unsafe { self.device.raw.queue_submit(self.device.queue, &[submit_info], fence) }
            .harness_err("vkQueueSubmit");
        if let Err(e) = submit_result {
            unsafe { self.device.raw.destroy_fence(fence, None) };
            return Err(ErrorInfo::wrapping(ErrorCode::KernelExecutionFailed, "queue submit failed", e));
        }

        let wait_result =
            unsafe { self.device.raw.wait_for_fences(&[fence], true, u64::MAX) }.harness_err("vkWaitForFences");
        unsafe { self.device.raw.destroy_fence(fence, None) };
        wait_result.map_err(|e| ErrorInfo::wrapping(ErrorCode::KernelExecutionFailed, "dispatch fence wait failed", e))?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        self.last_timing = Some(TimingSample {
            memory_setup_ms: 0.0,
            compute_ms: elapsed_ms,
            memory_teardown_ms: 0.0,
            total_ms: elapsed_ms,
            is_complete: true,
        });
        Ok(())
    }

    fn wait(&mut self) -> Result<()> {
        // Each dispatch already waits on its own transient fence; `wait()`
        // additionally drains the queue for callers that issued raw
        // uploads/downloads outside a dispatch.
        unsafe { self.device.raw.queue_wait_idle(self.device.queue) }.harness_err("vkQueueWaitIdle")
    }

    fn last_timing(&self) -> Option<TimingSample> {
        self.last_timing
    }

    fn create_buffer(&mut self, size: u64, role: BufferRole, usage: BufferUsage) -> Result<Arc<dyn NativeBuffer>> {
        let mut vk_usage = match role {
            BufferRole::Uniform => ash::vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferRole::Storage | BufferRole::Staging => ash::vk::BufferUsageFlags::STORAGE_BUFFER,
        };
        if usage.contains(BufferUsage::TRANSFER_SRC) {
            vk_usage |= ash::vk::BufferUsageFlags::TRANSFER_SRC;
        }
        if usage.contains(BufferUsage::TRANSFER_DST) {
            vk_usage |= ash::vk::BufferUsageFlags::TRANSFER_DST;
        }
        let (buffer, memory) = self.create_buffer_and_memory(size, vk_usage)?;
        Ok(Arc::new(VulkanBuffer {
            buffer,
            memory,
            role,
            size_bytes: size,
            usage,
            device: self.device.clone(),
        }))
    }

    fn create_texture(&mut self, desc: TextureDesc) -> Result<Arc<dyn NativeTexture>> {
        let size = desc.linear_size_bytes();
        let vk_usage = ash::vk::BufferUsageFlags::STORAGE_BUFFER
            | ash::vk::BufferUsageFlags::TRANSFER_SRC
            | ash::vk::BufferUsageFlags::TRANSFER_DST;
        let (buffer, memory) = self.create_buffer_and_memory(size, vk_usage)?;
        Ok(Arc::new(VulkanTexture {
            buffer: VulkanBuffer {
                buffer,
                memory,
                role: BufferRole::Storage,
                size_bytes: size,
                usage: BufferUsage::TRANSFER_SRC | BufferUsage::TRANSFER_DST,
                device: self.device.clone(),
            },
            desc,
        }))
    }

    fn set_global_params(&mut self, _bytes: &[u8]) -> Result<()> {
        // No-op by design: Vulkan
        // delivers global parameters through `set_buffer` into the
        // uniform-buffer binding instead, via `set_parameters` above.
        Ok(())
    }

    fn supports(&self, feature: &str) -> bool {
        matches!(feature, "timestamps")
    }

    fn debug_info(&self) -> String {
        format!(
            "backend=vulkan device={} entry_point={:?} bindings={} last_timing={:?}",
            self.info.name,
            self.entry_point,
            self.bound_buffer_handles.len(),
            self.last_timing,
        )
    }
}
