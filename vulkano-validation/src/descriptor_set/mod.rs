//! Descriptor sets and the descriptors they contain.
//!
//! This module tracks the contents of every descriptor set that an application allocates, so that
//! binding and action commands can check what the shaders will actually read.
//!
//! # Binding resources
//!
//! In parallel of the pipeline initialization, the application creates *descriptor set layouts*
//! that describe the resources a group of shaders needs, and allocates *descriptor sets* from a
//! *descriptor pool* for them. A descriptor set is a collection of bindings, each of which is an
//! array of descriptors of the same type. Descriptors are filled in by writing resources to them,
//! or copying them from another set.
//!
//! - A [`DescriptorSetLayout`] is a Vulkan object that describes the layout of descriptor sets.
//! - A [`DescriptorPool`](pool::DescriptorPool) hands out sets and keeps track of how many
//!   descriptors of each type are left.
//! - A [`DescriptorSet`] holds the contents of an allocated set, or of a push descriptor set.
//! - [`WriteDescriptorSet`](update::WriteDescriptorSet) and
//!   [`CopyDescriptorSet`](update::CopyDescriptorSet) describe changes to descriptor sets.
//!
//! The *payload* of a descriptor is the resource that was written to it. Payload checks are shared
//! between writes, action commands and GPU-assisted validation, because a resource that was
//! valid when it was written may have been destroyed by the time a shader reads it.

pub use self::layout::{
    DescriptorBindingFlags, DescriptorSetLayout, DescriptorSetLayoutBinding,
    DescriptorSetLayoutCreateFlags, DescriptorSetLayoutCreateInfo, DescriptorType,
    LayoutIncompatibility,
};
use self::{layout::LayoutBinding, pool::DescriptorPoolCreateFlags};
use crate::{
    resources::{AccelerationStructureType, BufferUsage, ImageAspects, ImageLayout, ImageUsage},
    shader::ShaderStages,
    validator::Facts,
    DeviceSize, ValidationError, Version, WHOLE_SIZE,
};
use ash::vk;
use std::sync::Arc;

pub mod layout;
pub mod pool;
pub mod template;
pub mod update;

/// The contents of an allocated descriptor set, or of a push descriptor set.
#[derive(Clone, Debug)]
pub struct DescriptorSet {
    handle: vk::DescriptorSet,
    pool: vk::DescriptorPool,
    pool_flags: DescriptorPoolCreateFlags,
    layout: Arc<DescriptorSetLayout>,
    variable_descriptor_count: u32,
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorSet {
    pub(crate) fn new(
        handle: vk::DescriptorSet,
        pool: vk::DescriptorPool,
        pool_flags: DescriptorPoolCreateFlags,
        layout: Arc<DescriptorSetLayout>,
        variable_descriptor_count: u32,
    ) -> Self {
        let variable_binding = layout.variable_descriptor_binding();
        let mut global_offset = 0;

        let bindings = layout
            .bindings()
            .iter()
            .map(|(&binding_num, layout_binding)| {
                let descriptor_count = if Some(binding_num) == variable_binding {
                    variable_descriptor_count
                } else {
                    layout_binding.descriptor_count
                };

                let binding = DescriptorBinding::new(
                    binding_num,
                    layout_binding,
                    descriptor_count,
                    global_offset,
                );
                global_offset += descriptor_count;

                binding
            })
            .collect();

        DescriptorSet {
            handle,
            pool,
            pool_flags,
            layout,
            variable_descriptor_count,
            bindings,
        }
    }

    /// Returns the contents of a push descriptor set for `layout`, which start out unwritten.
    pub(crate) fn new_push(layout: Arc<DescriptorSetLayout>) -> Self {
        Self::new(
            vk::DescriptorSet::null(),
            vk::DescriptorPool::null(),
            DescriptorPoolCreateFlags::empty(),
            layout,
            0,
        )
    }

    /// Returns the handle of the set. This is a null handle for push descriptor sets.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    /// Returns the pool that the set was allocated from.
    #[inline]
    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Returns the flags of the pool that the set was allocated from.
    #[inline]
    pub fn pool_flags(&self) -> DescriptorPoolCreateFlags {
        self.pool_flags
    }

    /// Returns the layout that the set was allocated with.
    #[inline]
    pub fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    /// Returns the variable descriptor count that the set was allocated with.
    #[inline]
    pub fn variable_descriptor_count(&self) -> u32 {
        self.variable_descriptor_count
    }

    /// Returns the bindings of the set, in increasing binding number.
    #[inline]
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Returns the binding with the given binding number.
    #[inline]
    pub fn binding(&self, binding_num: u32) -> Option<&DescriptorBinding> {
        self.binding_index(binding_num)
            .map(|index| &self.bindings[index])
    }

    pub(crate) fn binding_index(&self, binding_num: u32) -> Option<usize> {
        self.bindings
            .binary_search_by_key(&binding_num, |binding| binding.binding)
            .ok()
    }

    pub(crate) fn bindings_mut(&mut self) -> &mut [DescriptorBinding] {
        &mut self.bindings
    }

    /// Returns the number of descriptors in the set, taking the variable descriptor count into
    /// account.
    #[inline]
    pub fn total_descriptor_count(&self) -> u32 {
        self.bindings
            .last()
            .map_or(0, |binding| binding.global_offset + binding.descriptor_count)
    }

    /// Returns the index of a descriptor among all the descriptors of the set.
    pub fn global_index(&self, binding_num: u32, array_element: u32) -> Option<u32> {
        self.binding(binding_num)
            .filter(|binding| array_element < binding.descriptor_count)
            .map(|binding| binding.global_offset + array_element)
    }

    /// Returns the binding number and array element of the descriptor with the given global
    /// index.
    pub fn locate(&self, global_index: u32) -> Option<(u32, u32)> {
        let index = self
            .bindings
            .partition_point(|binding| binding.global_offset <= global_index);
        let binding = &self.bindings[index.checked_sub(1)?];
        let array_element = global_index - binding.global_offset;

        (array_element < binding.descriptor_count).then_some((binding.binding, array_element))
    }

    /// Returns the descriptor at the given position, if it has been written.
    #[inline]
    pub fn descriptor(&self, binding_num: u32, array_element: u32) -> Option<&Descriptor> {
        self.binding(binding_num)?
            .descriptors
            .get(array_element as usize)?
            .as_ref()
    }
}

/// A binding inside an allocated descriptor set.
#[derive(Clone, Debug)]
pub struct DescriptorBinding {
    binding: u32,
    descriptor_type: DescriptorType,
    descriptor_count: u32,
    stages: ShaderStages,
    binding_flags: DescriptorBindingFlags,
    immutable_samplers: Vec<vk::Sampler>,
    mutable_descriptor_types: Vec<DescriptorType>,
    global_offset: u32,
    pub(crate) descriptors: Vec<Option<Descriptor>>,
}

impl DescriptorBinding {
    fn new(
        binding: u32,
        layout_binding: &LayoutBinding,
        descriptor_count: u32,
        global_offset: u32,
    ) -> Self {
        let immutable_samplers: Vec<_> = layout_binding
            .immutable_samplers
            .iter()
            .map(|sampler| sampler.handle)
            .collect();

        // Immutable samplers of a sampler binding are part of the layout, so they count as
        // written from the start.
        let descriptors = if layout_binding.descriptor_type == DescriptorType::Sampler
            && !immutable_samplers.is_empty()
        {
            immutable_samplers
                .iter()
                .map(|&sampler| Some(Descriptor::Sampler { sampler }))
                .collect()
        } else {
            vec![None; descriptor_count as usize]
        };

        DescriptorBinding {
            binding,
            descriptor_type: layout_binding.descriptor_type,
            descriptor_count,
            stages: layout_binding.stages,
            binding_flags: layout_binding.binding_flags,
            immutable_samplers,
            mutable_descriptor_types: layout_binding.mutable_descriptor_types.clone(),
            global_offset,
            descriptors,
        }
    }

    #[inline]
    pub fn binding(&self) -> u32 {
        self.binding
    }

    #[inline]
    pub fn descriptor_type(&self) -> DescriptorType {
        self.descriptor_type
    }

    /// Returns the number of descriptors in the binding. For the variable-count binding, this is
    /// the count that the set was allocated with.
    #[inline]
    pub fn descriptor_count(&self) -> u32 {
        self.descriptor_count
    }

    #[inline]
    pub fn stages(&self) -> ShaderStages {
        self.stages
    }

    #[inline]
    pub fn binding_flags(&self) -> DescriptorBindingFlags {
        self.binding_flags
    }

    #[inline]
    pub fn immutable_samplers(&self) -> &[vk::Sampler] {
        &self.immutable_samplers
    }

    #[inline]
    pub fn has_immutable_samplers(&self) -> bool {
        !self.immutable_samplers.is_empty()
    }

    #[inline]
    pub fn mutable_descriptor_types(&self) -> &[DescriptorType] {
        &self.mutable_descriptor_types
    }

    /// Returns the index of the first descriptor of the binding among all descriptors of the set.
    #[inline]
    pub fn global_offset(&self) -> u32 {
        self.global_offset
    }

    #[inline]
    pub fn descriptors(&self) -> &[Option<Descriptor>] {
        &self.descriptors
    }

    /// Returns whether a descriptor of type `ty` can be stored in the binding.
    pub(crate) fn accepts_descriptor_type(&self, ty: DescriptorType) -> bool {
        if self.descriptor_type == DescriptorType::Mutable {
            self.mutable_descriptor_types.contains(&ty)
        } else {
            self.descriptor_type == ty
        }
    }

    /// Returns whether a descriptor is allowed to be unwritten when it is accessed.
    #[inline]
    pub(crate) fn is_partially_bound(&self) -> bool {
        self.binding_flags
            .intersects(DescriptorBindingFlags::PARTIALLY_BOUND)
    }

    /// Returns whether the binding can be updated while a command buffer that uses it is
    /// recording or pending.
    #[inline]
    pub(crate) fn is_update_after_bind(&self) -> bool {
        self.binding_flags.intersects(
            DescriptorBindingFlags::UPDATE_AFTER_BIND
                | DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING,
        )
    }
}

/// The resource that was written to a single descriptor.
#[derive(Clone, Debug, PartialEq)]
pub enum Descriptor {
    /// A sampler, for `DescriptorType::Sampler`.
    Sampler { sampler: vk::Sampler },

    /// An image view, for `DescriptorType::SampledImage`, `StorageImage` and `InputAttachment`.
    Image {
        image_view: vk::ImageView,
        image_layout: ImageLayout,
    },

    /// An image view with a sampler, for `DescriptorType::CombinedImageSampler`. The sampler is
    /// the immutable sampler of the binding, if it has one.
    ImageSampler {
        image_view: vk::ImageView,
        image_layout: ImageLayout,
        sampler: vk::Sampler,
    },

    /// A buffer view, for the texel buffer types.
    TexelBuffer { buffer_view: vk::BufferView },

    /// A range of a buffer, for the uniform and storage buffer types.
    Buffer {
        buffer: vk::Buffer,
        offset: DeviceSize,
        range: DeviceSize,
    },

    /// One byte of an inline uniform block.
    InlineUniformBlock,

    AccelerationStructure {
        acceleration_structure: vk::AccelerationStructureKHR,
    },

    /// A descriptor of a mutable binding, with the type that it was last written with.
    Mutable {
        active_type: DescriptorType,
        descriptor: Box<Descriptor>,
    },
}

impl Descriptor {
    /// Returns the type that the descriptor currently has, given the type of its binding.
    #[inline]
    pub fn active_type(&self, binding_type: DescriptorType) -> DescriptorType {
        match self {
            Descriptor::Mutable { active_type, .. } => *active_type,
            _ => binding_type,
        }
    }

    /// Returns the descriptor without its mutable wrapper.
    #[inline]
    pub fn inner(&self) -> &Descriptor {
        match self {
            Descriptor::Mutable { descriptor, .. } => descriptor.inner(),
            _ => self,
        }
    }

    /// Checks the resource of the descriptor against the requirements of `descriptor_type`,
    /// appending every problem found to `errors`.
    ///
    /// `immutable_sampler` is whether the sampler of a combined image sampler comes from the
    /// layout.
    pub(crate) fn validate_payload(
        &self,
        descriptor_type: DescriptorType,
        immutable_sampler: bool,
        facts: &Facts<'_>,
        errors: &mut Vec<Box<ValidationError>>,
    ) {
        let device = facts.device;
        let resources = facts.resources;
        let properties = device.properties();

        match (descriptor_type, self) {
            (
                _,
                Descriptor::Mutable {
                    active_type,
                    descriptor,
                },
            ) => {
                descriptor.validate_payload(*active_type, immutable_sampler, facts, errors);
            }

            (DescriptorType::Sampler, &Descriptor::Sampler { sampler }) => {
                match resources.sampler(sampler) {
                    None => errors.push(unknown_handle("sampler")),
                    Some(info) => {
                        if !immutable_sampler && info.sampler_ycbcr_conversion().is_some() {
                            errors.push(Box::new(ValidationError {
                                context: "sampler".into(),
                                problem: "has a sampler YCbCr conversion, and the descriptor \
                                    set layout was not created with immutable samplers"
                                    .into(),
                                vuids: &["VUID-VkWriteDescriptorSet-descriptorType-01946"],
                                ..Default::default()
                            }));
                        }
                    }
                }
            }

            (
                DescriptorType::CombinedImageSampler,
                &Descriptor::ImageSampler {
                    image_view,
                    image_layout,
                    sampler,
                },
            ) => {
                let image_view_info = resources.image_view(image_view);
                let sampler_info = resources.sampler(sampler);

                if image_view_info.is_none() {
                    errors.push(unknown_handle("image_view"));
                }

                if sampler_info.is_none() {
                    errors.push(unknown_handle("sampler"));
                }

                if let Some(image_view_info) = &image_view_info {
                    validate_image_view(
                        descriptor_type,
                        image_view_info.usage,
                        image_view_info.aspects,
                        image_layout,
                        facts,
                        errors,
                    );
                }

                if let (Some(image_view_info), Some(sampler_info)) = (image_view_info, sampler_info)
                {
                    let sampler_conversion = sampler_info.sampler_ycbcr_conversion();

                    if !immutable_sampler
                        && (sampler_conversion.is_some()
                            || image_view_info.sampler_ycbcr_conversion.is_some())
                    {
                        errors.push(Box::new(ValidationError {
                            problem: "the image view or the sampler has a sampler YCbCr \
                                conversion, and the descriptor set layout was not created with \
                                immutable samplers"
                                .into(),
                            vuids: &["VUID-VkWriteDescriptorSet-descriptorType-02738"],
                            ..Default::default()
                        }));
                    } else if sampler_conversion != image_view_info.sampler_ycbcr_conversion {
                        errors.push(Box::new(ValidationError {
                            problem: "the sampler YCbCr conversion of the sampler does not \
                                match that of the image view"
                                .into(),
                            vuids: &["VUID-VkWriteDescriptorSet-descriptorType-01948"],
                            ..Default::default()
                        }));
                    }

                    let planes =
                        ImageAspects::PLANE_0 | ImageAspects::PLANE_1 | ImageAspects::PLANE_2;

                    if image_view_info.aspects.intersects(planes) && sampler_conversion.is_none() {
                        errors.push(Box::new(ValidationError {
                            context: "image_view".into(),
                            problem: "has a plane aspect, but the sampler does not have a \
                                sampler YCbCr conversion"
                                .into(),
                            vuids: &["VUID-VkDescriptorImageInfo-sampler-01564"],
                            ..Default::default()
                        }));
                    }
                }
            }

            (
                DescriptorType::SampledImage
                | DescriptorType::StorageImage
                | DescriptorType::InputAttachment,
                &Descriptor::Image {
                    image_view,
                    image_layout,
                },
            ) => match resources.image_view(image_view) {
                None => errors.push(unknown_handle("image_view")),
                Some(image_view_info) => {
                    validate_image_view(
                        descriptor_type,
                        image_view_info.usage,
                        image_view_info.aspects,
                        image_layout,
                        facts,
                        errors,
                    );

                    if descriptor_type == DescriptorType::SampledImage
                        && image_view_info.sampler_ycbcr_conversion.is_some()
                    {
                        errors.push(Box::new(ValidationError {
                            context: "image_view".into(),
                            problem: "the descriptor type is `DescriptorType::SampledImage`, and \
                                the image view has a sampler YCbCr conversion"
                                .into(),
                            vuids: &["VUID-VkWriteDescriptorSet-descriptorType-01946"],
                            ..Default::default()
                        }));
                    }

                    if matches!(
                        descriptor_type,
                        DescriptorType::StorageImage | DescriptorType::InputAttachment
                    ) && !image_view_info.identity_swizzle
                    {
                        errors.push(Box::new(ValidationError {
                            context: "image_view".into(),
                            problem: "does not have an identity swizzle".into(),
                            vuids: &["VUID-VkWriteDescriptorSet-descriptorType-00336"],
                            ..Default::default()
                        }));
                    }
                }
            },

            (
                DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer,
                &Descriptor::TexelBuffer { buffer_view },
            ) => match resources.buffer_view(buffer_view) {
                None => errors.push(unknown_handle("buffer_view")),
                Some(buffer_view_info) => {
                    let (usage, usage_name, vuid): (_, _, &'static [&'static str]) =
                        if descriptor_type == DescriptorType::UniformTexelBuffer {
                            (
                                BufferUsage::UNIFORM_TEXEL_BUFFER,
                                "UNIFORM_TEXEL_BUFFER",
                                &["VUID-VkWriteDescriptorSet-descriptorType-00334"],
                            )
                        } else {
                            (
                                BufferUsage::STORAGE_TEXEL_BUFFER,
                                "STORAGE_TEXEL_BUFFER",
                                &["VUID-VkWriteDescriptorSet-descriptorType-00335"],
                            )
                        };

                    if !buffer_view_info.usage.intersects(usage) {
                        errors.push(Box::new(ValidationError {
                            context: "buffer_view".into(),
                            problem: format!(
                                "the descriptor type is `DescriptorType::{:?}`, and the buffer \
                                view was not created with the `BufferUsage::{}` usage",
                                descriptor_type, usage_name,
                            )
                            .into(),
                            vuids: vuid,
                            ..Default::default()
                        }));
                    }
                }
            },

            (
                DescriptorType::UniformBuffer
                | DescriptorType::StorageBuffer
                | DescriptorType::UniformBufferDynamic
                | DescriptorType::StorageBufferDynamic,
                &Descriptor::Buffer {
                    buffer,
                    offset,
                    range,
                },
            ) => {
                let Some(buffer_info) = resources.buffer(buffer) else {
                    errors.push(unknown_handle("buffer"));
                    return;
                };

                let is_uniform = matches!(
                    descriptor_type,
                    DescriptorType::UniformBuffer | DescriptorType::UniformBufferDynamic
                );

                if offset >= buffer_info.size {
                    errors.push(Box::new(ValidationError {
                        context: "offset".into(),
                        problem: format!(
                            "is {}, which is not less than the buffer size of {}",
                            offset, buffer_info.size,
                        )
                        .into(),
                        vuids: &["VUID-VkDescriptorBufferInfo-offset-00340"],
                        ..Default::default()
                    }));
                }

                if range != WHOLE_SIZE {
                    if range == 0 {
                        errors.push(Box::new(ValidationError {
                            context: "range".into(),
                            problem: "is zero".into(),
                            vuids: &["VUID-VkDescriptorBufferInfo-range-00341"],
                            ..Default::default()
                        }));
                    } else if offset.saturating_add(range) > buffer_info.size {
                        errors.push(Box::new(ValidationError {
                            problem: format!(
                                "`offset + range` is {}, which is greater than the buffer \
                                size of {}",
                                offset.saturating_add(range),
                                buffer_info.size,
                            )
                            .into(),
                            vuids: &["VUID-VkDescriptorBufferInfo-range-00342"],
                            ..Default::default()
                        }));
                    }
                }

                let (alignment, alignment_name, alignment_vuids): (_, _, &'static [&'static str]) =
                    if is_uniform {
                        (
                            properties.min_uniform_buffer_offset_alignment,
                            "min_uniform_buffer_offset_alignment",
                            &["VUID-VkWriteDescriptorSet-descriptorType-00327"],
                        )
                    } else {
                        (
                            properties.min_storage_buffer_offset_alignment,
                            "min_storage_buffer_offset_alignment",
                            &["VUID-VkWriteDescriptorSet-descriptorType-00328"],
                        )
                    };

                if !crate::is_aligned(offset, alignment) {
                    errors.push(Box::new(ValidationError {
                        context: "offset".into(),
                        problem: format!(
                            "is {}, which is not a multiple of the `{}` limit ({})",
                            offset, alignment_name, alignment,
                        )
                        .into(),
                        vuids: alignment_vuids,
                        ..Default::default()
                    }));
                }

                let (usage, usage_name, usage_vuids): (_, _, &'static [&'static str]) =
                    if is_uniform {
                        (
                            BufferUsage::UNIFORM_BUFFER,
                            "UNIFORM_BUFFER",
                            &["VUID-VkWriteDescriptorSet-descriptorType-00330"],
                        )
                    } else {
                        (
                            BufferUsage::STORAGE_BUFFER,
                            "STORAGE_BUFFER",
                            &["VUID-VkWriteDescriptorSet-descriptorType-00331"],
                        )
                    };

                if !buffer_info.usage.intersects(usage) {
                    errors.push(Box::new(ValidationError {
                        context: "buffer".into(),
                        problem: format!(
                            "the descriptor type is `DescriptorType::{:?}`, and the buffer was \
                            not created with the `BufferUsage::{}` usage",
                            descriptor_type, usage_name,
                        )
                        .into(),
                        vuids: usage_vuids,
                        ..Default::default()
                    }));
                }

                let effective_range = if range == WHOLE_SIZE {
                    buffer_info.size.saturating_sub(offset)
                } else {
                    range
                };

                let (max_range, max_range_name, max_range_vuids): (_, _, &'static [&'static str]) =
                    if is_uniform {
                        (
                            properties.max_uniform_buffer_range,
                            "max_uniform_buffer_range",
                            &["VUID-VkWriteDescriptorSet-descriptorType-00332"],
                        )
                    } else {
                        (
                            properties.max_storage_buffer_range,
                            "max_storage_buffer_range",
                            &["VUID-VkWriteDescriptorSet-descriptorType-00333"],
                        )
                    };

                if effective_range > max_range as DeviceSize {
                    errors.push(Box::new(ValidationError {
                        context: "range".into(),
                        problem: format!(
                            "the effective range is {}, which is greater than the `{}` limit \
                            ({})",
                            effective_range, max_range_name, max_range,
                        )
                        .into(),
                        vuids: max_range_vuids,
                        ..Default::default()
                    }));
                }
            }

            (DescriptorType::InlineUniformBlock, Descriptor::InlineUniformBlock) => (),

            (
                DescriptorType::AccelerationStructure,
                &Descriptor::AccelerationStructure {
                    acceleration_structure,
                },
            ) => match resources.acceleration_structure(acceleration_structure) {
                None => errors.push(unknown_handle("acceleration_structure")),
                Some(info) => {
                    if !matches!(
                        info.ty,
                        AccelerationStructureType::TopLevel | AccelerationStructureType::Generic
                    ) {
                        errors.push(Box::new(ValidationError {
                            context: "acceleration_structure".into(),
                            problem: "is not a top-level or generic acceleration structure".into(),
                            vuids: &[
                                "VUID-VkWriteDescriptorSetAccelerationStructureKHR-pAccelerationStructures-03579",
                            ],
                            ..Default::default()
                        }));
                    }
                }
            },

            (descriptor_type, descriptor) => {
                errors.push(Box::new(ValidationError {
                    problem: format!(
                        "the descriptor `{:?}` cannot be used with `DescriptorType::{:?}`",
                        descriptor, descriptor_type,
                    )
                    .into(),
                    ..Default::default()
                }));
            }
        }
    }
}

fn unknown_handle(context: &'static str) -> Box<ValidationError> {
    Box::new(ValidationError {
        context: context.into(),
        problem: "is not a valid handle, or the object has been destroyed".into(),
        ..Default::default()
    })
}

fn validate_image_view(
    descriptor_type: DescriptorType,
    usage: ImageUsage,
    aspects: ImageAspects,
    image_layout: ImageLayout,
    facts: &Facts<'_>,
    errors: &mut Vec<Box<ValidationError>>,
) {
    let (required_usage, usage_name, usage_vuids, layout_vuids): (
        _,
        _,
        &'static [&'static str],
        &'static [&'static str],
    ) = match descriptor_type {
        DescriptorType::SampledImage => (
            ImageUsage::SAMPLED,
            "SAMPLED",
            &["VUID-VkWriteDescriptorSet-descriptorType-00337"],
            &["VUID-VkWriteDescriptorSet-descriptorType-04149"],
        ),
        DescriptorType::CombinedImageSampler => (
            ImageUsage::SAMPLED,
            "SAMPLED",
            &["VUID-VkWriteDescriptorSet-descriptorType-00337"],
            &["VUID-VkWriteDescriptorSet-descriptorType-04150"],
        ),
        DescriptorType::InputAttachment => (
            ImageUsage::INPUT_ATTACHMENT,
            "INPUT_ATTACHMENT",
            &["VUID-VkWriteDescriptorSet-descriptorType-00338"],
            &["VUID-VkWriteDescriptorSet-descriptorType-04151"],
        ),
        _ => (
            ImageUsage::STORAGE,
            "STORAGE",
            &["VUID-VkWriteDescriptorSet-descriptorType-00339"],
            &["VUID-VkWriteDescriptorSet-descriptorType-04152"],
        ),
    };

    if !usage.intersects(required_usage) {
        errors.push(Box::new(ValidationError {
            context: "image_view".into(),
            problem: format!(
                "the descriptor type is `DescriptorType::{:?}`, and the image view was not \
                created with the `ImageUsage::{}` usage",
                descriptor_type, usage_name,
            )
            .into(),
            vuids: usage_vuids,
            ..Default::default()
        }));
    }

    if !is_allowed_image_layout(descriptor_type, image_layout, facts) {
        errors.push(Box::new(ValidationError {
            context: "image_layout".into(),
            problem: format!(
                "`ImageLayout::{:?}` is not valid with `DescriptorType::{:?}`",
                image_layout, descriptor_type,
            )
            .into(),
            vuids: layout_vuids,
            ..Default::default()
        }));
    }

    if aspects.contains(ImageAspects::DEPTH | ImageAspects::STENCIL) {
        errors.push(Box::new(ValidationError {
            context: "image_view".into(),
            problem: "has both the `ImageAspects::DEPTH` and `ImageAspects::STENCIL` aspects"
                .into(),
            vuids: &["VUID-VkDescriptorImageInfo-imageView-01976"],
            ..Default::default()
        }));
    }
}

/// Returns whether `image_layout` may be used with an image descriptor of `descriptor_type`.
///
/// The base set of layouts of each type is extended by the API version and the extensions that
/// are enabled on the device.
pub(crate) fn is_allowed_image_layout(
    descriptor_type: DescriptorType,
    image_layout: ImageLayout,
    facts: &Facts<'_>,
) -> bool {
    let device = facts.device;
    let api_version = device.api_version();
    let extensions = device.enabled_extensions();

    if descriptor_type == DescriptorType::StorageImage {
        return match image_layout {
            ImageLayout::General => true,
            ImageLayout::SharedPresent => extensions.khr_shared_presentable_image,
            _ => false,
        };
    }

    match image_layout {
        ImageLayout::General
        | ImageLayout::ShaderReadOnlyOptimal
        | ImageLayout::DepthStencilReadOnlyOptimal => true,
        ImageLayout::DepthReadOnlyStencilAttachmentOptimal
        | ImageLayout::DepthAttachmentStencilReadOnlyOptimal => {
            api_version >= Version::V1_1 || extensions.khr_maintenance2
        }
        ImageLayout::DepthReadOnlyOptimal | ImageLayout::StencilReadOnlyOptimal => {
            api_version >= Version::V1_2 || extensions.khr_separate_depth_stencil_layouts
        }
        ImageLayout::ReadOnlyOptimal => {
            api_version >= Version::V1_3 || extensions.khr_synchronization2
        }
        ImageLayout::SharedPresent => extensions.khr_shared_presentable_image,
        ImageLayout::AttachmentFeedbackLoopOptimal => {
            extensions.ext_attachment_feedback_loop_layout
                && device.enabled_features().attachment_feedback_loop_layout
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{Descriptor, DescriptorSet, DescriptorType};
    use crate::{
        descriptor_set::{
            layout::{DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo},
            pool::DescriptorPoolCreateFlags,
        },
        device::DeviceInfo,
        resources::{
            BufferInfo, BufferUsage, ImageAspects, ImageLayout, ImageUsage, ImageViewInfo,
            ResourceTable,
        },
        shader::ShaderStages,
        WHOLE_SIZE,
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    fn set_with_bindings(
        create_info: DescriptorSetLayoutCreateInfo,
        variable_descriptor_count: u32,
    ) -> DescriptorSet {
        let resources = ResourceTable::new();
        let layout = test_layout!(resources, 1, create_info);

        DescriptorSet::new(
            vk::DescriptorSet::from_raw(1),
            vk::DescriptorPool::from_raw(1),
            DescriptorPoolCreateFlags::empty(),
            Arc::new(layout),
            variable_descriptor_count,
        )
    }

    #[test]
    fn global_indices() {
        let set = set_with_bindings(
            DescriptorSetLayoutCreateInfo {
                bindings: [
                    (
                        0,
                        DescriptorSetLayoutBinding {
                            descriptor_count: 2,
                            stages: ShaderStages::FRAGMENT,
                            ..DescriptorSetLayoutBinding::descriptor_type(
                                DescriptorType::UniformBuffer,
                            )
                        },
                    ),
                    (
                        3,
                        DescriptorSetLayoutBinding {
                            descriptor_count: 4,
                            stages: ShaderStages::FRAGMENT,
                            ..DescriptorSetLayoutBinding::descriptor_type(
                                DescriptorType::SampledImage,
                            )
                        },
                    ),
                ]
                .into(),
                ..Default::default()
            },
            0,
        );

        assert_eq!(set.total_descriptor_count(), 6);
        assert_eq!(set.global_index(0, 1), Some(1));
        assert_eq!(set.global_index(3, 0), Some(2));
        assert_eq!(set.global_index(3, 4), None);
        assert_eq!(set.global_index(1, 0), None);
        assert_eq!(set.locate(0), Some((0, 0)));
        assert_eq!(set.locate(5), Some((3, 3)));
        assert_eq!(set.locate(6), None);
    }

    #[test]
    fn buffer_payload() {
        let device = DeviceInfo::default();
        let resources = ResourceTable::new();
        let buffer = vk::Buffer::from_raw(7);
        resources.insert_buffer(
            buffer,
            BufferInfo {
                size: 1024,
                usage: BufferUsage::STORAGE_BUFFER,
            },
        );
        let facts = test_facts!(device, resources);

        let mut errors = Vec::new();
        Descriptor::Buffer {
            buffer,
            offset: 256,
            range: WHOLE_SIZE,
        }
        .validate_payload(DescriptorType::StorageBuffer, false, &facts, &mut errors);
        assert!(errors.is_empty());

        // Misaligned, past the end and the wrong usage: each is reported.
        Descriptor::Buffer {
            buffer,
            offset: 100,
            range: 1000,
        }
        .validate_payload(DescriptorType::UniformBuffer, false, &facts, &mut errors);
        let vuids: Vec<_> = errors.iter().map(|err| err.vuids[0]).collect();
        assert_eq!(
            vuids,
            [
                "VUID-VkDescriptorBufferInfo-range-00342",
                "VUID-VkWriteDescriptorSet-descriptorType-00327",
                "VUID-VkWriteDescriptorSet-descriptorType-00330",
            ],
        );
    }

    #[test]
    fn image_layouts_follow_extensions() {
        let resources = ResourceTable::new();
        let image_view = vk::ImageView::from_raw(3);
        resources.insert_image_view(
            image_view,
            ImageViewInfo {
                usage: ImageUsage::SAMPLED,
                aspects: ImageAspects::DEPTH,
                ..Default::default()
            },
        );
        let descriptor = Descriptor::Image {
            image_view,
            image_layout: ImageLayout::DepthReadOnlyOptimal,
        };

        let device = DeviceInfo::default();
        let facts = test_facts!(device, resources);
        let mut errors = Vec::new();
        descriptor.validate_payload(DescriptorType::SampledImage, false, &facts, &mut errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].vuids,
            &["VUID-VkWriteDescriptorSet-descriptorType-04149"],
        );

        let device = DeviceInfo {
            api_version: crate::Version::V1_2,
            ..Default::default()
        };
        let facts = test_facts!(device, resources);
        let mut errors = Vec::new();
        descriptor.validate_payload(DescriptorType::SampledImage, false, &facts, &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn destroyed_resource() {
        let device = DeviceInfo::default();
        let resources = ResourceTable::new();
        let facts = test_facts!(device, resources);

        let mut errors = Vec::new();
        Descriptor::TexelBuffer {
            buffer_view: vk::BufferView::from_raw(9),
        }
        .validate_payload(DescriptorType::UniformTexelBuffer, false, &facts, &mut errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].context, "buffer_view");
    }
}
