//! Compute pipeline, descriptor, and command-pool objects created by
//! `load_kernel`. Each object type is a small owned struct with an
//! explicit `destroy` taking `&ash::Device`, called in strict reverse
//! order by the owning runner's `Drop`.

use std::ffi::CString;

use ht::{ErrorCode, ErrorInfo, Result};

use super::VkResultExt;

/// Binding 0/1 = storage buffers (input/output), binding 2 = uniform
/// buffer (constants); all bound at the compute stage, one descriptor
/// each.
pub const BINDING_STORAGE_INPUT: u32 = 0;
pub const BINDING_STORAGE_OUTPUT: u32 = 1;
pub const BINDING_UNIFORM_PARAMS: u32 = 2;

pub struct ComputePipeline {
    pub shader_module: ash::vk::ShaderModule,
    pub descriptor_set_layout: ash::vk::DescriptorSetLayout,
    pub pipeline_layout: ash::vk::PipelineLayout,
    pub pipeline: ash::vk::Pipeline,
    pub descriptor_pool: ash::vk::DescriptorPool,
    pub descriptor_set: ash::vk::DescriptorSet,
}

unsafe impl Send for ComputePipeline {}
unsafe impl Sync for ComputePipeline {}

impl ComputePipeline {
    pub fn create(device: &ash::Device, spirv: &[u8], entry_point: &str) -> Result<Self> {
        if spirv.len() < 4 || spirv.len() % 4 != 0 {
            return Err(ErrorInfo::new(
                ErrorCode::InvalidArgument,
                "SPIR-V bytecode must be a non-empty multiple of 4 bytes",
            ));
        }
        let words: Vec<u32> = spirv
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let module_info = ash::vk::ShaderModuleCreateInfo::default().code(&words);
        let shader_module = unsafe { device.create_shader_module(&module_info, None) }
            .harness_err("vkCreateShaderModule")
            .map_err(|e| ErrorInfo::wrapping(ErrorCode::KernelLoadFailed, "failed to create shader module", e))?;

        let bindings = [
            ash::vk::DescriptorSetLayoutBinding::default()
                .binding(BINDING_STORAGE_INPUT)
                .descriptor_type(ash::vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(ash::vk::ShaderStageFlags::COMPUTE),
            ash::vk::DescriptorSetLayoutBinding::default()
                .binding(BINDING_STORAGE_OUTPUT)
                .descriptor_type(ash::vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(ash::vk::ShaderStageFlags::COMPUTE),
            ash::vk::DescriptorSetLayoutBinding::default()
                .binding(BINDING_UNIFORM_PARAMS)
                .descriptor_type(ash::vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(ash::vk::ShaderStageFlags::COMPUTE),
        ];
        let layout_info = ash::vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let descriptor_set_layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .harness_err("vkCreateDescriptorSetLayout")
            .map_err(|e| {
                unsafe { device.destroy_shader_module(shader_module, None) };
                ErrorInfo::wrapping(ErrorCode::KernelLoadFailed, "failed to create descriptor set layout", e)
            })?;

        let set_layouts = [descriptor_set_layout];
        let pipeline_layout_info = ash::vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let pipeline_layout = unsafe { device.create_pipeline_layout(&pipeline_layout_info, None) }
            .harness_err("vkCreatePipelineLayout")
            .map_err(|e| {
                unsafe {
                    device.destroy_descriptor_set_layout(descriptor_set_layout, None);
                    device.destroy_shader_module(shader_module, None);
                }
                ErrorInfo::wrapping(ErrorCode::KernelLoadFailed, "failed to create pipeline layout", e)
            })?;

        let entry_cstr = CString::new(entry_point).map_err(|_| {
            ErrorInfo::new(ErrorCode::InvalidArgument, "entry point name contains a NUL byte")
        })?;
        let stage_info = ash::vk::PipelineShaderStageCreateInfo::default()
            .stage(ash::vk::ShaderStageFlags::COMPUTE)
            .module(shader_module)
            .name(&entry_cstr);
        let pipeline_info = ash::vk::ComputePipelineCreateInfo::default()
            .stage(stage_info)
            .layout(pipeline_layout);
        let pipeline = unsafe {
            device.create_compute_pipelines(ash::vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, e)| e)
        .harness_err("vkCreateComputePipelines")
        .map_err(|e| {
            unsafe {
                device.destroy_pipeline_layout(pipeline_layout, None);
                device.destroy_descriptor_set_layout(descriptor_set_layout, None);
                device.destroy_shader_module(shader_module, None);
            }
            ErrorInfo::wrapping(ErrorCode::KernelLoadFailed, format!("entry point '{entry_point}' failed to compile into a pipeline"), e)
        })?[0];

        let pool_sizes = [
            ash::vk::DescriptorPoolSize::default()
                .ty(ash::vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(2),
            ash::vk::DescriptorPoolSize::default()
                .ty(ash::vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1),
        ];
        let pool_info = ash::vk::DescriptorPoolCreateInfo::default()
            .flags(ash::vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let descriptor_pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .harness_err("vkCreateDescriptorPool")
            .map_err(|e| {
                unsafe {
                    device.destroy_pipeline(pipeline, None);
                    device.destroy_pipeline_layout(pipeline_layout, None);
                    device.destroy_descriptor_set_layout(descriptor_set_layout, None);
                    device.destroy_shader_module(shader_module, None);
                }
                ErrorInfo::wrapping(ErrorCode::KernelLoadFailed, "failed to create descriptor pool", e)
            })?;

        let alloc_info = ash::vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(descriptor_pool)
            .set_layouts(&set_layouts);
        let descriptor_set = unsafe { device.allocate_descriptor_sets(&alloc_info) }
            .harness_err("vkAllocateDescriptorSets")
            .map_err(|e| {
                unsafe {
                    device.destroy_descriptor_pool(descriptor_pool, None);
                    device.destroy_pipeline(pipeline, None);
                    device.destroy_pipeline_layout(pipeline_layout, None);
                    device.destroy_descriptor_set_layout(descriptor_set_layout, None);
                    device.destroy_shader_module(shader_module, None);
                }
                ErrorInfo::wrapping(ErrorCode::KernelLoadFailed, "failed to allocate descriptor set", e)
            })?[0];

        Ok(Self {
            shader_module,
            descriptor_set_layout,
            pipeline_layout,
            pipeline,
            descriptor_pool,
            descriptor_set,
        })
    }

    /// Destroy in strict reverse order of creation
    ///.
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            device.destroy_shader_module(self.shader_module, None);
        }
    }
}

pub struct CommandPool {
    pub raw: ash::vk::CommandPool,
    pub command_buffer: ash::vk::CommandBuffer,
}

unsafe impl Send for CommandPool {}
unsafe impl Sync for CommandPool {}

impl CommandPool {
    /// Lazily created on first dispatch, "reset-command-buffer" enabled,
    /// one primary command buffer.
    pub fn create(device: &ash::Device, queue_family_index: u32) -> Result<Self> {
        let pool_info = ash::vk::CommandPoolCreateInfo::default()
            .flags(ash::vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let raw = unsafe { device.create_command_pool(&pool_info, None) }
            .harness_err("vkCreateCommandPool")?;

        let alloc_info = ash::vk::CommandBufferAllocateInfo::default()
            .command_pool(raw)
            .level(ash::vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info) }
            .harness_err("vkAllocateCommandBuffers")
            .map_err(|e| {
                unsafe { device.destroy_command_pool(raw, None) };
                e
            })?[0];

        Ok(Self { raw, command_buffer })
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_command_pool(self.raw, None) };
    }
}
