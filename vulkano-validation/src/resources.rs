//! Facts about resources that descriptors refer to.
//!
//! Buffers, views, samplers and acceleration structures are owned and tracked by other parts of
//! the layer. Descriptor validation only needs a few facts about each of them (their size, usage,
//! aspects and so on), which it reads through the [`ResourceTracker`] trait. [`ResourceTable`] is
//! a simple implementation backed by hash maps, suitable for layers that do not track these
//! objects elsewhere, and for tests.

use crate::{
    macros::{vulkan_bitflags, vulkan_enum},
    DeviceSize,
};
use ash::vk;
use foldhash::HashMap;
use parking_lot::RwLock;

/// Read-only access to the resource facts that descriptor validation consumes.
///
/// A method returns `None` if the handle is not known, either because it was never created or
/// because it has been destroyed. Descriptors that refer to unknown handles are reported as
/// payload findings.
pub trait ResourceTracker: Send + Sync {
    fn buffer(&self, buffer: vk::Buffer) -> Option<BufferInfo>;

    fn buffer_view(&self, buffer_view: vk::BufferView) -> Option<BufferViewInfo>;

    fn image_view(&self, image_view: vk::ImageView) -> Option<ImageViewInfo>;

    fn sampler(&self, sampler: vk::Sampler) -> Option<SamplerInfo>;

    fn acceleration_structure(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> Option<AccelerationStructureInfo>;
}

/// Facts about a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferInfo {
    /// The size of the buffer in bytes.
    pub size: DeviceSize,

    /// The usage that the buffer was created with.
    pub usage: BufferUsage,
}

/// Facts about a buffer view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferViewInfo {
    /// The buffer that the view was created from.
    pub buffer: vk::Buffer,

    /// The usage of the view. This is the usage of `buffer`, unless the view was created with a
    /// restricted usage.
    pub usage: BufferUsage,
}

/// Facts about an image view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageViewInfo {
    /// The usage of the view.
    pub usage: ImageUsage,

    /// The aspects of the view's subresource range.
    pub aspects: ImageAspects,

    /// The sampler YCbCr conversion that the view was created with, if any.
    pub sampler_ycbcr_conversion: Option<vk::SamplerYcbcrConversion>,

    /// Whether the view's component mapping is the identity swizzle.
    pub identity_swizzle: bool,
}

impl Default for ImageViewInfo {
    #[inline]
    fn default() -> Self {
        Self {
            usage: ImageUsage::empty(),
            aspects: ImageAspects::COLOR,
            sampler_ycbcr_conversion: None,
            identity_swizzle: true,
        }
    }
}

/// Facts about a sampler.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplerInfo {
    /// The parameters that the sampler was created with.
    pub create_info: SamplerCreateInfo,
}

impl SamplerInfo {
    #[inline]
    pub fn sampler_ycbcr_conversion(&self) -> Option<vk::SamplerYcbcrConversion> {
        self.create_info.sampler_ycbcr_conversion
    }
}

/// The parameters that a sampler was created with.
///
/// Two immutable samplers are considered equal, for the purposes of layout compatibility, if
/// their create parameters are equal, even when their handles differ.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplerCreateInfo {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: [vk::SamplerAddressMode; 3],
    pub mip_lod_bias: f32,
    pub anisotropy: Option<f32>,
    pub compare: Option<vk::CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: vk::BorderColor,
    pub unnormalized_coordinates: bool,

    /// The sampler YCbCr conversion that the sampler was created with, if any.
    pub sampler_ycbcr_conversion: Option<vk::SamplerYcbcrConversion>,

    pub _ne: crate::NonExhaustive,
}

impl Default for SamplerCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            address_mode: [vk::SamplerAddressMode::CLAMP_TO_EDGE; 3],
            mip_lod_bias: 0.0,
            anisotropy: None,
            compare: None,
            min_lod: 0.0,
            max_lod: 0.0,
            border_color: vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
            unnormalized_coordinates: false,
            sampler_ycbcr_conversion: None,
            _ne: crate::NonExhaustive(()),
        }
    }
}

/// Facts about an acceleration structure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccelerationStructureInfo {
    pub ty: AccelerationStructureType,
}

vulkan_bitflags! {
    /// Describes how a buffer is going to be used.
    BufferUsage = BufferUsageFlags(u32);

    TRANSFER_SRC = TRANSFER_SRC,
    TRANSFER_DST = TRANSFER_DST,
    UNIFORM_TEXEL_BUFFER = UNIFORM_TEXEL_BUFFER,
    STORAGE_TEXEL_BUFFER = STORAGE_TEXEL_BUFFER,
    UNIFORM_BUFFER = UNIFORM_BUFFER,
    STORAGE_BUFFER = STORAGE_BUFFER,
    INDEX_BUFFER = INDEX_BUFFER,
    VERTEX_BUFFER = VERTEX_BUFFER,
    INDIRECT_BUFFER = INDIRECT_BUFFER,
    SHADER_DEVICE_ADDRESS = SHADER_DEVICE_ADDRESS,
    SAMPLER_DESCRIPTOR_BUFFER = SAMPLER_DESCRIPTOR_BUFFER_EXT,
    RESOURCE_DESCRIPTOR_BUFFER = RESOURCE_DESCRIPTOR_BUFFER_EXT,
}

vulkan_bitflags! {
    /// Describes how an image is going to be used.
    ImageUsage = ImageUsageFlags(u32);

    TRANSFER_SRC = TRANSFER_SRC,
    TRANSFER_DST = TRANSFER_DST,
    SAMPLED = SAMPLED,
    STORAGE = STORAGE,
    COLOR_ATTACHMENT = COLOR_ATTACHMENT,
    DEPTH_STENCIL_ATTACHMENT = DEPTH_STENCIL_ATTACHMENT,
    TRANSIENT_ATTACHMENT = TRANSIENT_ATTACHMENT,
    INPUT_ATTACHMENT = INPUT_ATTACHMENT,
    ATTACHMENT_FEEDBACK_LOOP = ATTACHMENT_FEEDBACK_LOOP_EXT,
}

vulkan_bitflags! {
    /// An individual data type within an image.
    ImageAspects = ImageAspectFlags(u32);

    COLOR = COLOR,
    DEPTH = DEPTH,
    STENCIL = STENCIL,
    METADATA = METADATA,
    PLANE_0 = PLANE_0,
    PLANE_1 = PLANE_1,
    PLANE_2 = PLANE_2,
}

vulkan_enum! {
    /// In-memory layout of the pixel data of an image.
    ImageLayout = ImageLayout(i32);

    Undefined = UNDEFINED,
    General = GENERAL,
    ColorAttachmentOptimal = COLOR_ATTACHMENT_OPTIMAL,
    DepthStencilAttachmentOptimal = DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    DepthStencilReadOnlyOptimal = DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    ShaderReadOnlyOptimal = SHADER_READ_ONLY_OPTIMAL,
    TransferSrcOptimal = TRANSFER_SRC_OPTIMAL,
    TransferDstOptimal = TRANSFER_DST_OPTIMAL,
    Preinitialized = PREINITIALIZED,
    DepthReadOnlyStencilAttachmentOptimal = DEPTH_READ_ONLY_STENCIL_ATTACHMENT_OPTIMAL,
    DepthAttachmentStencilReadOnlyOptimal = DEPTH_ATTACHMENT_STENCIL_READ_ONLY_OPTIMAL,
    DepthAttachmentOptimal = DEPTH_ATTACHMENT_OPTIMAL,
    DepthReadOnlyOptimal = DEPTH_READ_ONLY_OPTIMAL,
    StencilAttachmentOptimal = STENCIL_ATTACHMENT_OPTIMAL,
    StencilReadOnlyOptimal = STENCIL_READ_ONLY_OPTIMAL,
    ReadOnlyOptimal = READ_ONLY_OPTIMAL,
    AttachmentOptimal = ATTACHMENT_OPTIMAL,
    PresentSrc = PRESENT_SRC_KHR,
    SharedPresent = SHARED_PRESENT_KHR,
    AttachmentFeedbackLoopOptimal = ATTACHMENT_FEEDBACK_LOOP_OPTIMAL_EXT,
}

vulkan_enum! {
    /// The type of an acceleration structure.
    AccelerationStructureType = AccelerationStructureTypeKHR(i32);

    TopLevel = TOP_LEVEL,
    BottomLevel = BOTTOM_LEVEL,
    Generic = GENERIC,
}

/// A [`ResourceTracker`] backed by hash maps.
///
/// The owning layer inserts facts when objects are created and removes them when they are
/// destroyed.
#[derive(Debug, Default)]
pub struct ResourceTable {
    buffers: RwLock<HashMap<vk::Buffer, BufferInfo>>,
    buffer_views: RwLock<HashMap<vk::BufferView, BufferViewInfo>>,
    image_views: RwLock<HashMap<vk::ImageView, ImageViewInfo>>,
    samplers: RwLock<HashMap<vk::Sampler, SamplerInfo>>,
    acceleration_structures:
        RwLock<HashMap<vk::AccelerationStructureKHR, AccelerationStructureInfo>>,
}

impl ResourceTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_buffer(&self, buffer: vk::Buffer, info: BufferInfo) {
        self.buffers.write().insert(buffer, info);
    }

    pub fn remove_buffer(&self, buffer: vk::Buffer) {
        self.buffers.write().remove(&buffer);
    }

    pub fn insert_buffer_view(&self, buffer_view: vk::BufferView, info: BufferViewInfo) {
        self.buffer_views.write().insert(buffer_view, info);
    }

    pub fn remove_buffer_view(&self, buffer_view: vk::BufferView) {
        self.buffer_views.write().remove(&buffer_view);
    }

    pub fn insert_image_view(&self, image_view: vk::ImageView, info: ImageViewInfo) {
        self.image_views.write().insert(image_view, info);
    }

    pub fn remove_image_view(&self, image_view: vk::ImageView) {
        self.image_views.write().remove(&image_view);
    }

    pub fn insert_sampler(&self, sampler: vk::Sampler, info: SamplerInfo) {
        self.samplers.write().insert(sampler, info);
    }

    pub fn remove_sampler(&self, sampler: vk::Sampler) {
        self.samplers.write().remove(&sampler);
    }

    pub fn insert_acceleration_structure(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
        info: AccelerationStructureInfo,
    ) {
        self.acceleration_structures
            .write()
            .insert(acceleration_structure, info);
    }

    pub fn remove_acceleration_structure(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) {
        self.acceleration_structures
            .write()
            .remove(&acceleration_structure);
    }
}

impl ResourceTracker for ResourceTable {
    #[inline]
    fn buffer(&self, buffer: vk::Buffer) -> Option<BufferInfo> {
        self.buffers.read().get(&buffer).copied()
    }

    #[inline]
    fn buffer_view(&self, buffer_view: vk::BufferView) -> Option<BufferViewInfo> {
        self.buffer_views.read().get(&buffer_view).copied()
    }

    #[inline]
    fn image_view(&self, image_view: vk::ImageView) -> Option<ImageViewInfo> {
        self.image_views.read().get(&image_view).copied()
    }

    #[inline]
    fn sampler(&self, sampler: vk::Sampler) -> Option<SamplerInfo> {
        self.samplers.read().get(&sampler).cloned()
    }

    #[inline]
    fn acceleration_structure(
        &self,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) -> Option<AccelerationStructureInfo> {
        self.acceleration_structures
            .read()
            .get(&acceleration_structure)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::{BufferInfo, BufferUsage, ImageAspects, ResourceTable, ResourceTracker};
    use ash::vk::{self, Handle};

    #[test]
    fn table_insert_remove() {
        let table = ResourceTable::new();
        let buffer = vk::Buffer::from_raw(0x10);

        assert!(table.buffer(buffer).is_none());

        table.insert_buffer(
            buffer,
            BufferInfo {
                size: 1024,
                usage: BufferUsage::UNIFORM_BUFFER,
            },
        );
        assert_eq!(table.buffer(buffer).map(|info| info.size), Some(1024));

        table.remove_buffer(buffer);
        assert!(table.buffer(buffer).is_none());
    }

    #[test]
    fn bitflags_ops() {
        let usage = BufferUsage::UNIFORM_BUFFER | BufferUsage::STORAGE_BUFFER;
        assert!(usage.intersects(BufferUsage::STORAGE_BUFFER));
        assert!(!usage.contains(BufferUsage::UNIFORM_TEXEL_BUFFER));
        assert_eq!(format!("{:?}", usage), "UNIFORM_BUFFER | STORAGE_BUFFER");

        let aspects = ImageAspects::DEPTH | ImageAspects::STENCIL;
        assert_eq!(aspects - ImageAspects::STENCIL, ImageAspects::DEPTH);
        assert_eq!(vk::ImageAspectFlags::from(aspects).as_raw(), 0x6);
    }
}
