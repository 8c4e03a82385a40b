//! Resource-shaped data: buffer and texture descriptors shared by every
//! backend.

/// How a buffer's contents are used by the bound kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BufferRole {
    /// Binding 2 in the Vulkan pipeline layout; constant memory on NVIDIA.
    Uniform,
    /// Bindings 0/1 in the Vulkan pipeline layout; linear device memory on
    /// NVIDIA.
    Storage,
    /// Host-visible scratch space used to stage an upload/download.
    Staging,
}

bitflags::bitflags! {
    /// Usage flags layered on top of [`BufferRole`]; backends translate
    /// these into their native usage/transfer bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 0b0001;
        const TRANSFER_DST = 0b0010;
        const HOST_VISIBLE = 0b0100;
    }
}

/// Pixel format for a [`TextureDesc`]. The compute-only core implements
/// textures as linear buffers sized `w * h * d * bytes_per_pixel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextureFormat {
    R8Unorm,
    Rgba8Unorm,
    R32Float,
    Rgba32Float,
}

impl TextureFormat {
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rgba8Unorm => 4,
            Self::R32Float => 4,
            Self::Rgba32Float => 16,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TextureFlags: u32 {
        const RENDERABLE = 0b001;
        const STORAGE_WRITABLE = 0b010;
        const GENERATE_MIPS = 0b100;
    }
}

/// Texture creation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: TextureFormat,
    pub flags: TextureFlags,
}

impl TextureDesc {
    /// Linear byte size for the compute-only texture-as-buffer
    /// representation: `w * h * d * bpp`.
    pub fn linear_size_bytes(&self) -> u64 {
        u64::from(self.width)
            * u64::from(self.height)
            * u64::from(self.depth)
            * u64::from(self.format.bytes_per_pixel())
    }
}
