//! Updates to the contents of descriptor sets.
//!
//! An update is validated in two stages. The structural stage checks that the update fits the
//! layout of the set: the binding exists, the descriptor type matches, and every binding that
//! the update spans into agrees with the first one. A structural problem stops validation of
//! that update. Once the structure is valid, the resources that are written are checked one by
//! one, and every problem is reported.
//!
//! The update is then applied to the tracked contents of the set by a separate step, so that
//! the state always reflects what the driver will see.

use super::{
    layout::{DescriptorSetLayoutCreateFlags, DescriptorType},
    pool::DescriptorPoolCreateFlags,
    Descriptor, DescriptorBinding, DescriptorSet,
};
use crate::{
    resources::{ImageLayout, ResourceTracker},
    validator::Facts,
    DeviceSize, ValidationError,
};
use ash::vk;
use smallvec::SmallVec;
use std::fmt::{Display, Error as FmtError, Formatter};

/// Represents a single write operation to the binding of a descriptor set.
#[derive(Clone, Debug)]
pub struct WriteDescriptorSet {
    /// The set to write to. This is ignored for push descriptors.
    pub dst_set: vk::DescriptorSet,

    /// The binding number to start writing at.
    pub dst_binding: u32,

    /// The array element to start writing at. For `DescriptorType::InlineUniformBlock`, this is
    /// the byte offset.
    ///
    /// The default value is `0`.
    pub dst_array_element: u32,

    /// The number of descriptors to write. For `DescriptorType::InlineUniformBlock`, this is the
    /// number of bytes.
    pub descriptor_count: u32,

    /// The type of the descriptors that are written.
    pub descriptor_type: DescriptorType,

    /// The resources to write.
    pub elements: WriteDescriptorSetElements,

    pub _ne: crate::NonExhaustive,
}

impl WriteDescriptorSet {
    /// Returns a `WriteDescriptorSet` that writes `elements`, starting at the first element of
    /// `dst_binding`. The descriptor count is derived from `elements`.
    #[inline]
    pub fn new(
        dst_set: vk::DescriptorSet,
        dst_binding: u32,
        descriptor_type: DescriptorType,
        elements: WriteDescriptorSetElements,
    ) -> Self {
        Self {
            dst_set,
            dst_binding,
            dst_array_element: 0,
            descriptor_count: elements.len() as u32,
            descriptor_type,
            elements,
            _ne: crate::NonExhaustive(()),
        }
    }

    /// Checks the write against the contents of `dst_set`.
    ///
    /// Returns an `Err` if the write is structurally invalid. Otherwise, returns the plan to
    /// apply the write, along with any problems that were found with the written resources.
    pub(crate) fn validate(
        &self,
        dst_set: &DescriptorSet,
        facts: &Facts<'_>,
    ) -> Result<ValidatedWrite, Box<ValidationError>> {
        let &Self {
            dst_set: _,
            dst_binding,
            dst_array_element,
            descriptor_count,
            descriptor_type,
            ref elements,
            _ne: _,
        } = self;

        if dst_set.layout().is_destroyed() {
            return Err(Box::new(ValidationError {
                context: "dst_set".into(),
                problem: "was allocated with a descriptor set layout that has been destroyed"
                    .into(),
                ..Default::default()
            }));
        }

        if descriptor_count == 0 {
            return Err(Box::new(ValidationError {
                context: "descriptor_count".into(),
                problem: "is zero".into(),
                vuids: &["VUID-VkWriteDescriptorSet-descriptorCount-arraylength"],
                ..Default::default()
            }));
        }

        let Some(binding_index) = dst_set.binding_index(dst_binding) else {
            return Err(Box::new(ValidationError {
                context: "dst_binding".into(),
                problem: format!(
                    "binding {} does not exist in the descriptor set layout",
                    dst_binding,
                )
                .into(),
                vuids: &["VUID-VkWriteDescriptorSet-dstBinding-00315"],
                ..Default::default()
            }));
        };
        let first_binding = &dst_set.bindings()[binding_index];

        if !first_binding.accepts_descriptor_type(descriptor_type) {
            return Err(Box::new(if first_binding.descriptor_type() == DescriptorType::Mutable {
                ValidationError {
                    context: "descriptor_type".into(),
                    problem: format!(
                        "`DescriptorType::{:?}` is not one of the mutable descriptor types of \
                        binding {}",
                        descriptor_type, dst_binding,
                    )
                    .into(),
                    vuids: &["VUID-VkWriteDescriptorSet-dstSet-04611"],
                    ..Default::default()
                }
            } else {
                ValidationError {
                    context: "descriptor_type".into(),
                    problem: format!(
                        "is `DescriptorType::{:?}`, but binding {} has type \
                        `DescriptorType::{:?}`",
                        descriptor_type,
                        dst_binding,
                        first_binding.descriptor_type(),
                    )
                    .into(),
                    vuids: &["VUID-VkWriteDescriptorSet-descriptorType-00319"],
                    ..Default::default()
                }
            }));
        }

        if !elements.matches_type(descriptor_type) {
            return Err(Box::new(ValidationError {
                context: "elements".into(),
                problem: format!(
                    "is not the kind of element that is written to a descriptor of type \
                    `DescriptorType::{:?}`",
                    descriptor_type,
                )
                .into(),
                ..Default::default()
            }));
        }

        if descriptor_type != DescriptorType::InlineUniformBlock
            && elements.len() != descriptor_count as usize
        {
            return Err(Box::new(ValidationError {
                context: "elements".into(),
                problem: format!(
                    "has {} elements, but `descriptor_count` is {}",
                    elements.len(),
                    descriptor_count,
                )
                .into(),
                ..Default::default()
            }));
        }

        if descriptor_type == DescriptorType::Sampler && first_binding.has_immutable_samplers() {
            return Err(Box::new(ValidationError {
                problem: format!(
                    "`descriptor_type` is `DescriptorType::Sampler`, but binding {} has \
                    immutable samplers",
                    dst_binding,
                )
                .into(),
                vuids: &["VUID-VkWriteDescriptorSet-descriptorType-02752"],
                ..Default::default()
            }));
        }

        let span = resolve_span(dst_set, binding_index, dst_array_element, descriptor_count)
            .map_err(|err| err.to_write_error())?;

        let descriptors = self.to_descriptors(dst_set, &span);
        let mut payload_errors = Vec::new();

        if descriptor_type == DescriptorType::InlineUniformBlock {
            self.validate_inline_uniform_block(&mut payload_errors);
        } else {
            let mut element_index = 0;

            for segment in &span {
                let binding = &dst_set.bindings()[segment.binding_index];

                for _ in 0..segment.count {
                    let mut errors = Vec::new();
                    descriptors[element_index].validate_payload(
                        descriptor_type,
                        binding.has_immutable_samplers(),
                        facts,
                        &mut errors,
                    );
                    payload_errors.extend(
                        errors
                            .into_iter()
                            .map(|err| err.add_context(format!("elements[{}]", element_index))),
                    );
                    element_index += 1;
                }
            }

            if descriptor_type == DescriptorType::CombinedImageSampler {
                validate_ycbcr_agreement(
                    dst_set,
                    &span,
                    &descriptors,
                    facts.resources,
                    &mut payload_errors,
                );
            }
        }

        Ok(ValidatedWrite {
            span,
            descriptors,
            payload_errors,
        })
    }

    fn to_descriptors(&self, dst_set: &DescriptorSet, span: &Span) -> Vec<Descriptor> {
        let mut descriptors = Vec::with_capacity(self.descriptor_count as usize);
        let mut element_index = 0;

        for segment in span {
            let binding = &dst_set.bindings()[segment.binding_index];

            for array_element in segment.first_element..segment.first_element + segment.count {
                let descriptor = match &self.elements {
                    WriteDescriptorSetElements::Image(elements) => {
                        let info = &elements[element_index];

                        match self.descriptor_type {
                            DescriptorType::Sampler => Descriptor::Sampler {
                                sampler: info.sampler,
                            },
                            DescriptorType::CombinedImageSampler => Descriptor::ImageSampler {
                                image_view: info.image_view,
                                image_layout: info.image_layout,
                                sampler: binding
                                    .immutable_samplers()
                                    .get(array_element as usize)
                                    .copied()
                                    .unwrap_or(info.sampler),
                            },
                            _ => Descriptor::Image {
                                image_view: info.image_view,
                                image_layout: info.image_layout,
                            },
                        }
                    }
                    WriteDescriptorSetElements::Buffer(elements) => {
                        let info = &elements[element_index];

                        Descriptor::Buffer {
                            buffer: info.buffer,
                            offset: info.offset,
                            range: info.range,
                        }
                    }
                    WriteDescriptorSetElements::TexelBufferView(elements) => {
                        Descriptor::TexelBuffer {
                            buffer_view: elements[element_index],
                        }
                    }
                    WriteDescriptorSetElements::InlineUniformBlock(_) => {
                        Descriptor::InlineUniformBlock
                    }
                    WriteDescriptorSetElements::AccelerationStructure(elements) => {
                        Descriptor::AccelerationStructure {
                            acceleration_structure: elements[element_index],
                        }
                    }
                };

                descriptors.push(wrap_for_binding(binding, self.descriptor_type, descriptor));
                element_index += 1;
            }
        }

        descriptors
    }

    fn validate_inline_uniform_block(&self, errors: &mut Vec<Box<ValidationError>>) {
        if self.dst_array_element % 4 != 0 {
            errors.push(Box::new(ValidationError {
                context: "dst_array_element".into(),
                problem: format!(
                    "is {}, which is not a multiple of 4, and `descriptor_type` is \
                    `DescriptorType::InlineUniformBlock`",
                    self.dst_array_element,
                )
                .into(),
                vuids: &["VUID-VkWriteDescriptorSet-descriptorType-02219"],
                ..Default::default()
            }));
        }

        if self.descriptor_count % 4 != 0 {
            errors.push(Box::new(ValidationError {
                context: "descriptor_count".into(),
                problem: format!(
                    "is {}, which is not a multiple of 4, and `descriptor_type` is \
                    `DescriptorType::InlineUniformBlock`",
                    self.descriptor_count,
                )
                .into(),
                vuids: &["VUID-VkWriteDescriptorSet-descriptorType-02220"],
                ..Default::default()
            }));
        }

        if self.elements.len() != self.descriptor_count as usize {
            errors.push(Box::new(ValidationError {
                context: "elements".into(),
                problem: format!(
                    "holds {} bytes of inline uniform block data, but `descriptor_count` is {}",
                    self.elements.len(),
                    self.descriptor_count,
                )
                .into(),
                vuids: &["VUID-VkWriteDescriptorSet-descriptorType-02221"],
                ..Default::default()
            }));
        }
    }
}

/// The resources to write to descriptors.
#[derive(Clone, Debug)]
pub enum WriteDescriptorSetElements {
    /// For `DescriptorType::Sampler`, `CombinedImageSampler`, `SampledImage`, `StorageImage`
    /// and `InputAttachment`.
    Image(Vec<DescriptorImageInfo>),

    /// For the uniform and storage buffer types.
    Buffer(Vec<DescriptorBufferInfo>),

    /// For the texel buffer types.
    TexelBufferView(Vec<vk::BufferView>),

    /// The bytes of an inline uniform block.
    InlineUniformBlock(Vec<u8>),

    AccelerationStructure(Vec<vk::AccelerationStructureKHR>),
}

impl WriteDescriptorSetElements {
    /// Returns the number of elements. For inline uniform blocks, this is the number of bytes.
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Image(elements) => elements.len(),
            Self::Buffer(elements) => elements.len(),
            Self::TexelBufferView(elements) => elements.len(),
            Self::InlineUniformBlock(data) => data.len(),
            Self::AccelerationStructure(elements) => elements.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matches_type(&self, descriptor_type: DescriptorType) -> bool {
        match self {
            Self::Image(_) => matches!(
                descriptor_type,
                DescriptorType::Sampler
                    | DescriptorType::CombinedImageSampler
                    | DescriptorType::SampledImage
                    | DescriptorType::StorageImage
                    | DescriptorType::InputAttachment
            ),
            Self::Buffer(_) => matches!(
                descriptor_type,
                DescriptorType::UniformBuffer
                    | DescriptorType::StorageBuffer
                    | DescriptorType::UniformBufferDynamic
                    | DescriptorType::StorageBufferDynamic
            ),
            Self::TexelBufferView(_) => matches!(
                descriptor_type,
                DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer
            ),
            Self::InlineUniformBlock(_) => descriptor_type == DescriptorType::InlineUniformBlock,
            Self::AccelerationStructure(_) => {
                descriptor_type == DescriptorType::AccelerationStructure
            }
        }
    }
}

/// An image view, with a layout and a sampler, as it is written to a descriptor.
///
/// Which members are used depends on the descriptor type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorImageInfo {
    pub sampler: vk::Sampler,
    pub image_view: vk::ImageView,
    pub image_layout: ImageLayout,
}

impl DescriptorImageInfo {
    /// Returns a `DescriptorImageInfo` with only a sampler.
    #[inline]
    pub fn sampler(sampler: vk::Sampler) -> Self {
        Self {
            sampler,
            image_view: vk::ImageView::null(),
            image_layout: ImageLayout::Undefined,
        }
    }

    /// Returns a `DescriptorImageInfo` with only an image view.
    #[inline]
    pub fn image_view(image_view: vk::ImageView, image_layout: ImageLayout) -> Self {
        Self {
            sampler: vk::Sampler::null(),
            image_view,
            image_layout,
        }
    }
}

/// A range of a buffer, as it is written to a descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorBufferInfo {
    pub buffer: vk::Buffer,
    pub offset: DeviceSize,

    /// The size of the range, or [`WHOLE_SIZE`](crate::WHOLE_SIZE).
    pub range: DeviceSize,
}

/// Represents a single copy operation between the bindings of two descriptor sets.
#[derive(Clone, Debug)]
pub struct CopyDescriptorSet {
    pub src_set: vk::DescriptorSet,

    /// The binding number to start copying from.
    ///
    /// The default value is `0`.
    pub src_binding: u32,

    /// The array element to start copying from.
    ///
    /// The default value is `0`.
    pub src_array_element: u32,

    pub dst_set: vk::DescriptorSet,

    /// The binding number to start copying to.
    ///
    /// The default value is `0`.
    pub dst_binding: u32,

    /// The array element to start copying to.
    ///
    /// The default value is `0`.
    pub dst_array_element: u32,

    /// The number of descriptors (array elements) to copy.
    ///
    /// The default value is `1`.
    pub descriptor_count: u32,

    pub _ne: crate::NonExhaustive,
}

impl CopyDescriptorSet {
    /// Returns a `CopyDescriptorSet` with the specified `src_set` and `dst_set`.
    #[inline]
    pub fn new(src_set: vk::DescriptorSet, dst_set: vk::DescriptorSet) -> Self {
        Self {
            src_set,
            src_binding: 0,
            src_array_element: 0,
            dst_set,
            dst_binding: 0,
            dst_array_element: 0,
            descriptor_count: 1,
            _ne: crate::NonExhaustive(()),
        }
    }

    /// Checks the copy against the contents of `src_set` and `dst_set`, which are the same set
    /// when copying within a set.
    pub(crate) fn validate(
        &self,
        src_set: &DescriptorSet,
        dst_set: &DescriptorSet,
    ) -> Result<ValidatedCopy, Box<ValidationError>> {
        let &Self {
            src_set: _,
            src_binding,
            src_array_element,
            dst_set: _,
            dst_binding,
            dst_array_element,
            descriptor_count,
            _ne: _,
        } = self;

        if src_set.layout().is_destroyed() {
            return Err(Box::new(ValidationError {
                context: "src_set".into(),
                problem: "was allocated with a descriptor set layout that has been destroyed"
                    .into(),
                ..Default::default()
            }));
        }

        if dst_set.layout().is_destroyed() {
            return Err(Box::new(ValidationError {
                context: "dst_set".into(),
                problem: "was allocated with a descriptor set layout that has been destroyed"
                    .into(),
                ..Default::default()
            }));
        }

        let Some(src_binding_index) = src_set.binding_index(src_binding) else {
            return Err(Box::new(ValidationError {
                context: "src_binding".into(),
                problem: format!(
                    "binding {} does not exist in the descriptor set layout of `src_set`",
                    src_binding,
                )
                .into(),
                vuids: &["VUID-VkCopyDescriptorSet-srcBinding-00345"],
                ..Default::default()
            }));
        };

        let Some(dst_binding_index) = dst_set.binding_index(dst_binding) else {
            return Err(Box::new(ValidationError {
                context: "dst_binding".into(),
                problem: format!(
                    "binding {} does not exist in the descriptor set layout of `dst_set`",
                    dst_binding,
                )
                .into(),
                vuids: &["VUID-VkCopyDescriptorSet-dstBinding-00347"],
                ..Default::default()
            }));
        };

        let src_span = resolve_span(
            src_set,
            src_binding_index,
            src_array_element,
            descriptor_count,
        )
        .map_err(|err| {
            err.to_copy_error(&["VUID-VkCopyDescriptorSet-srcArrayElement-00346"])
                .add_context("src_set")
        })?;

        let dst_span = resolve_span(
            dst_set,
            dst_binding_index,
            dst_array_element,
            descriptor_count,
        )
        .map_err(|err| {
            err.to_copy_error(&["VUID-VkCopyDescriptorSet-dstArrayElement-00348"])
                .add_context("dst_set")
        })?;

        let src_first = &src_set.bindings()[src_binding_index];
        let dst_first = &dst_set.bindings()[dst_binding_index];
        let src_type = src_first.descriptor_type();
        let dst_type = dst_first.descriptor_type();

        match (src_type, dst_type) {
            (DescriptorType::Mutable, _) => {
                for (index, descriptor) in span_descriptors(src_set, &src_span).enumerate() {
                    let Some(descriptor) = descriptor else {
                        continue;
                    };
                    let active_type = descriptor.active_type(src_type);

                    if !dst_first.accepts_descriptor_type(active_type) {
                        return Err(Box::new(ValidationError {
                            problem: format!(
                                "source descriptor {} has the active type \
                                `DescriptorType::{:?}`, which cannot be stored in binding {} of \
                                `dst_set`",
                                index, active_type, dst_binding,
                            )
                            .into(),
                            vuids: &["VUID-VkCopyDescriptorSet-srcSet-04613"],
                            ..Default::default()
                        }));
                    }
                }
            }
            (_, DescriptorType::Mutable) => {
                if !dst_first.accepts_descriptor_type(src_type) {
                    return Err(Box::new(ValidationError {
                        problem: format!(
                            "the descriptor type of binding {} of `src_set` is \
                            `DescriptorType::{:?}`, which is not one of the mutable descriptor \
                            types of binding {} of `dst_set`",
                            src_binding, src_type, dst_binding,
                        )
                        .into(),
                        vuids: &["VUID-VkCopyDescriptorSet-dstSet-04614"],
                        ..Default::default()
                    }));
                }
            }
            _ => {
                if src_type != dst_type {
                    return Err(Box::new(ValidationError {
                        problem: format!(
                            "the descriptor type of binding {} of `src_set` is \
                            `DescriptorType::{:?}`, but the descriptor type of binding {} of \
                            `dst_set` is `DescriptorType::{:?}`",
                            src_binding, src_type, dst_binding, dst_type,
                        )
                        .into(),
                        vuids: &["VUID-VkCopyDescriptorSet-dstBinding-02632"],
                        ..Default::default()
                    }));
                }
            }
        }

        if dst_type == DescriptorType::Sampler && dst_first.has_immutable_samplers() {
            return Err(Box::new(ValidationError {
                problem: format!(
                    "binding {} of `dst_set` is a sampler binding with immutable samplers",
                    dst_binding,
                )
                .into(),
                vuids: &["VUID-VkCopyDescriptorSet-dstBinding-02753"],
                ..Default::default()
            }));
        }

        if src_type == DescriptorType::InlineUniformBlock {
            if src_array_element % 4 != 0 {
                return Err(Box::new(ValidationError {
                    problem: "the descriptor type is `DescriptorType::InlineUniformBlock`, and \
                        `src_array_element` is not a multiple of 4"
                        .into(),
                    vuids: &["VUID-VkCopyDescriptorSet-srcBinding-02223"],
                    ..Default::default()
                }));
            }

            if dst_array_element % 4 != 0 {
                return Err(Box::new(ValidationError {
                    problem: "the descriptor type is `DescriptorType::InlineUniformBlock`, and \
                        `dst_array_element` is not a multiple of 4"
                        .into(),
                    vuids: &["VUID-VkCopyDescriptorSet-dstBinding-02224"],
                    ..Default::default()
                }));
            }

            if descriptor_count % 4 != 0 {
                return Err(Box::new(ValidationError {
                    problem: "the descriptor type is `DescriptorType::InlineUniformBlock`, and \
                        `descriptor_count` is not a multiple of 4"
                        .into(),
                    vuids: &["VUID-VkCopyDescriptorSet-srcBinding-02225"],
                    ..Default::default()
                }));
            }
        }

        let src_layout_uab = src_set
            .layout()
            .flags()
            .intersects(DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL);
        let dst_layout_uab = dst_set
            .layout()
            .flags()
            .intersects(DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL);

        if src_layout_uab && !dst_layout_uab {
            return Err(Box::new(ValidationError {
                problem: "the layout of `src_set` was created with the \
                    `DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL` flag, but the layout \
                    of `dst_set` was not"
                    .into(),
                vuids: &["VUID-VkCopyDescriptorSet-srcSet-01918"],
                ..Default::default()
            }));
        }

        if !src_layout_uab && dst_layout_uab {
            return Err(Box::new(ValidationError {
                problem: "the layout of `dst_set` was created with the \
                    `DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL` flag, but the layout \
                    of `src_set` was not"
                    .into(),
                vuids: &["VUID-VkCopyDescriptorSet-srcSet-04885"],
                ..Default::default()
            }));
        }

        let src_pool_uab = src_set
            .pool_flags()
            .intersects(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND);
        let dst_pool_uab = dst_set
            .pool_flags()
            .intersects(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND);

        if src_pool_uab && !dst_pool_uab {
            return Err(Box::new(ValidationError {
                problem: "the pool of `src_set` was created with the \
                    `DescriptorPoolCreateFlags::UPDATE_AFTER_BIND` flag, but the pool of \
                    `dst_set` was not"
                    .into(),
                vuids: &["VUID-VkCopyDescriptorSet-srcSet-01920"],
                ..Default::default()
            }));
        }

        if !src_pool_uab && dst_pool_uab {
            return Err(Box::new(ValidationError {
                problem: "the pool of `dst_set` was created with the \
                    `DescriptorPoolCreateFlags::UPDATE_AFTER_BIND` flag, but the pool of \
                    `src_set` was not"
                    .into(),
                vuids: &["VUID-VkCopyDescriptorSet-srcSet-04887"],
                ..Default::default()
            }));
        }

        if src_set
            .pool_flags()
            .intersects(DescriptorPoolCreateFlags::HOST_ONLY)
            != dst_set
                .pool_flags()
                .intersects(DescriptorPoolCreateFlags::HOST_ONLY)
        {
            return Err(Box::new(ValidationError {
                problem: "one of the pools of `src_set` and `dst_set` was created with the \
                    `DescriptorPoolCreateFlags::HOST_ONLY` flag, but the other was not"
                    .into(),
                ..Default::default()
            }));
        }

        if src_set.handle() == dst_set.handle() && descriptor_count != 0 {
            let src_start = src_set.bindings()[src_span[0].binding_index].global_offset()
                + src_span[0].first_element;
            let dst_start = dst_set.bindings()[dst_span[0].binding_index].global_offset()
                + dst_span[0].first_element;

            if src_start < dst_start + descriptor_count && dst_start < src_start + descriptor_count
            {
                return Err(Box::new(ValidationError {
                    problem: "`src_set` and `dst_set` are the same set, and the copied ranges \
                        overlap"
                        .into(),
                    vuids: &["VUID-VkCopyDescriptorSet-srcSet-00349"],
                    ..Default::default()
                }));
            }
        }

        Ok(ValidatedCopy { src_span, dst_span })
    }
}

/// A run of consecutive descriptors within one binding of a set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SpanSegment {
    pub(crate) binding_index: usize,
    pub(crate) first_element: u32,
    pub(crate) count: u32,
}

/// The descriptors touched by an update, which may span into the bindings that follow the first
/// one.
pub(crate) type Span = SmallVec<[SpanSegment; 2]>;

/// The binding attribute that differs between the first binding of an update and a binding that
/// the update spans into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SpanAttribute {
    DescriptorType,
    Stages,
    ImmutableSamplers,
    BindingFlags,
}

impl Display for SpanAttribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            SpanAttribute::DescriptorType => write!(f, "descriptor type"),
            SpanAttribute::Stages => write!(f, "shader stages"),
            SpanAttribute::ImmutableSamplers => write!(f, "use of immutable samplers"),
            SpanAttribute::BindingFlags => write!(f, "binding flags"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SpanError {
    /// A binding that the update spans into differs from the first binding.
    Inconsistent {
        binding: u32,
        attribute: SpanAttribute,
    },

    /// The update runs past the last binding of the set.
    PastEnd { last_binding: u32, remaining: u32 },
}

impl SpanError {
    fn to_write_error(self) -> Box<ValidationError> {
        match self {
            SpanError::Inconsistent { binding, attribute } => Box::new(ValidationError {
                problem: format!(
                    "the update spans into binding {}, which has a different {} than the first \
                    binding that is updated",
                    binding, attribute,
                )
                .into(),
                vuids: match attribute {
                    SpanAttribute::DescriptorType | SpanAttribute::Stages => {
                        &["VUID-VkWriteDescriptorSet-descriptorCount-00317"]
                    }
                    SpanAttribute::BindingFlags => {
                        &["VUID-VkWriteDescriptorSet-descriptorCount-00318"]
                    }
                    SpanAttribute::ImmutableSamplers => {
                        &["VUID-VkWriteDescriptorSet-descriptorCount-00320"]
                    }
                },
                ..Default::default()
            }),
            SpanError::PastEnd {
                last_binding,
                remaining,
            } => Box::new(ValidationError {
                problem: format!(
                    "the update runs past the end of the last binding ({}) of the set, with {} \
                    descriptors left over",
                    last_binding, remaining,
                )
                .into(),
                vuids: &["VUID-VkWriteDescriptorSet-dstArrayElement-00321"],
                ..Default::default()
            }),
        }
    }

    fn to_copy_error(self, past_end_vuids: &'static [&'static str]) -> Box<ValidationError> {
        match self {
            SpanError::Inconsistent { binding, attribute } => Box::new(ValidationError {
                problem: format!(
                    "the copy spans into binding {}, which has a different {} than the first \
                    binding that is copied",
                    binding, attribute,
                )
                .into(),
                ..Default::default()
            }),
            SpanError::PastEnd {
                last_binding,
                remaining,
            } => Box::new(ValidationError {
                problem: format!(
                    "the copy runs past the end of the last binding ({}) of the set, with {} \
                    descriptors left over",
                    last_binding, remaining,
                )
                .into(),
                vuids: past_end_vuids,
                ..Default::default()
            }),
        }
    }
}

/// Finds the descriptors that an update of `count` descriptors touches, starting at
/// `first_element` of the binding at `binding_index`.
///
/// Bindings with a descriptor count of zero are skipped. Every other binding that the update
/// reaches must agree with the first binding.
pub(crate) fn resolve_span(
    set: &DescriptorSet,
    binding_index: usize,
    first_element: u32,
    count: u32,
) -> Result<Span, SpanError> {
    let bindings = set.bindings();
    let first = &bindings[binding_index];
    let mut span = Span::new();
    let mut index = binding_index;
    let mut element = first_element;
    let mut remaining = count;

    while remaining != 0 {
        let binding = &bindings[index];

        if index != binding_index && binding.descriptor_count() != 0 {
            if let Some(attribute) = span_mismatch(first, binding) {
                return Err(SpanError::Inconsistent {
                    binding: binding.binding(),
                    attribute,
                });
            }
        }

        if element < binding.descriptor_count() {
            let taken = remaining.min(binding.descriptor_count() - element);
            span.push(SpanSegment {
                binding_index: index,
                first_element: element,
                count: taken,
            });
            remaining -= taken;
            element = 0;
        } else {
            element -= binding.descriptor_count();
        }

        if remaining != 0 {
            index += 1;

            if index >= bindings.len() {
                return Err(SpanError::PastEnd {
                    last_binding: binding.binding(),
                    remaining,
                });
            }
        }
    }

    Ok(span)
}

fn span_mismatch(first: &DescriptorBinding, other: &DescriptorBinding) -> Option<SpanAttribute> {
    if first.descriptor_type() != other.descriptor_type() {
        Some(SpanAttribute::DescriptorType)
    } else if first.stages() != other.stages() {
        Some(SpanAttribute::Stages)
    } else if first.has_immutable_samplers() != other.has_immutable_samplers() {
        Some(SpanAttribute::ImmutableSamplers)
    } else if first.binding_flags() != other.binding_flags() {
        Some(SpanAttribute::BindingFlags)
    } else {
        None
    }
}

fn span_descriptors<'a>(
    set: &'a DescriptorSet,
    span: &'a Span,
) -> impl Iterator<Item = Option<&'a Descriptor>> + 'a {
    span.iter().flat_map(move |segment| {
        let descriptors = &set.bindings()[segment.binding_index].descriptors;
        let start = segment.first_element as usize;

        descriptors[start..start + segment.count as usize]
            .iter()
            .map(Option::as_ref)
    })
}

fn wrap_for_binding(
    binding: &DescriptorBinding,
    active_type: DescriptorType,
    descriptor: Descriptor,
) -> Descriptor {
    let descriptor = match descriptor {
        Descriptor::Mutable { descriptor, .. } => *descriptor,
        descriptor => descriptor,
    };

    if binding.descriptor_type() == DescriptorType::Mutable {
        Descriptor::Mutable {
            active_type,
            descriptor: Box::new(descriptor),
        }
    } else {
        descriptor
    }
}

/// Checks that every sampler of each combined image sampler binding agrees on whether it
/// performs a sampler YCbCr conversion, once the write is applied.
fn validate_ycbcr_agreement(
    dst_set: &DescriptorSet,
    span: &Span,
    written: &[Descriptor],
    resources: &dyn ResourceTracker,
    errors: &mut Vec<Box<ValidationError>>,
) {
    let converts = |descriptor: &Descriptor| match descriptor.inner() {
        &Descriptor::ImageSampler { sampler, .. } => resources
            .sampler(sampler)
            .map(|info| info.sampler_ycbcr_conversion().is_some()),
        _ => None,
    };

    let mut written = written.iter();

    for segment in span {
        let binding = &dst_set.bindings()[segment.binding_index];
        let start = segment.first_element as usize;
        let end = start + segment.count as usize;

        let new = written.by_ref().take(segment.count as usize);
        let existing = binding
            .descriptors
            .iter()
            .enumerate()
            .filter(|&(index, _)| index < start || index >= end)
            .filter_map(|(_, descriptor)| descriptor.as_ref());

        let mut with_conversion = false;
        let mut without_conversion = false;

        for converts in new.chain(existing).filter_map(converts) {
            if converts {
                with_conversion = true;
            } else {
                without_conversion = true;
            }
        }

        if with_conversion && without_conversion {
            errors.push(Box::new(ValidationError {
                problem: format!(
                    "after the write, some samplers of binding {} perform a sampler YCbCr \
                    conversion and some do not",
                    binding.binding(),
                )
                .into(),
                ..Default::default()
            }));
        }
    }
}

/// A write that passed the structural checks.
#[derive(Debug)]
pub(crate) struct ValidatedWrite {
    pub(crate) span: Span,
    pub(crate) descriptors: Vec<Descriptor>,
    pub(crate) payload_errors: Vec<Box<ValidationError>>,
}

/// A copy that passed the structural checks.
#[derive(Debug)]
pub(crate) struct ValidatedCopy {
    pub(crate) src_span: Span,
    pub(crate) dst_span: Span,
}

impl ValidatedCopy {
    /// Returns the descriptors to copy, in order.
    pub(crate) fn read(
        &self,
        src_set: &DescriptorSet,
    ) -> Vec<Option<(DescriptorType, Descriptor)>> {
        span_descriptors(src_set, &self.src_span)
            .zip(self.src_span.iter().flat_map(|segment| {
                std::iter::repeat(src_set.bindings()[segment.binding_index].descriptor_type())
                    .take(segment.count as usize)
            }))
            .map(|(descriptor, binding_type)| {
                descriptor.map(|descriptor| {
                    (
                        descriptor.active_type(binding_type),
                        descriptor.inner().clone(),
                    )
                })
            })
            .collect()
    }
}

impl DescriptorSet {
    /// Applies a validated write to the contents of the set.
    pub(crate) fn record_write(&mut self, write: &ValidatedWrite) {
        let mut descriptors = write.descriptors.iter().cloned();

        for segment in &write.span {
            let binding = &mut self.bindings_mut()[segment.binding_index];
            let start = segment.first_element as usize;

            for slot in &mut binding.descriptors[start..start + segment.count as usize] {
                *slot = descriptors.next();
            }
        }
    }

    /// Applies a validated copy to the contents of the set, with `descriptors` read from the
    /// source set beforehand.
    pub(crate) fn record_copy(
        &mut self,
        copy: &ValidatedCopy,
        descriptors: Vec<Option<(DescriptorType, Descriptor)>>,
    ) {
        let mut descriptors = descriptors.into_iter();

        for segment in &copy.dst_span {
            let binding = &mut self.bindings_mut()[segment.binding_index];
            let start = segment.first_element as usize;
            let end = start + segment.count as usize;
            let wrapped: Vec<_> = descriptors
                .by_ref()
                .take(segment.count as usize)
                .map(|descriptor| {
                    descriptor.map(|(active_type, descriptor)| {
                        wrap_for_binding(binding, active_type, descriptor)
                    })
                })
                .collect();

            for (slot, descriptor) in binding.descriptors[start..end].iter_mut().zip(wrapped) {
                *slot = descriptor;
            }
        }
    }
}

/// Returns whether updating the bindings touched by `span` is allowed while the set is bound to
/// a command buffer, without invalidating it.
pub(crate) fn allowed_while_bound(set: &DescriptorSet, span: &Span) -> bool {
    span.iter()
        .all(|segment| set.bindings()[segment.binding_index].is_update_after_bind())
}

#[cfg(test)]
mod tests {
    use super::{
        CopyDescriptorSet, DescriptorBufferInfo, DescriptorImageInfo, WriteDescriptorSet,
        WriteDescriptorSetElements,
    };
    use crate::{
        descriptor_set::{
            layout::{
                DescriptorBindingFlags, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateFlags,
                DescriptorSetLayoutCreateInfo, DescriptorType,
            },
            pool::DescriptorPoolCreateFlags,
            Descriptor, DescriptorSet,
        },
        device::{DeviceFeatures, DeviceInfo},
        resources::{
            BufferInfo, BufferUsage, ImageLayout, ResourceTable, SamplerCreateInfo, SamplerInfo,
        },
        shader::ShaderStages,
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    fn binding(
        descriptor_type: DescriptorType,
        descriptor_count: u32,
        stages: ShaderStages,
    ) -> DescriptorSetLayoutBinding {
        DescriptorSetLayoutBinding {
            descriptor_count,
            stages,
            ..DescriptorSetLayoutBinding::descriptor_type(descriptor_type)
        }
    }

    fn set(
        resources: &ResourceTable,
        raw: u64,
        bindings: Vec<(u32, DescriptorSetLayoutBinding)>,
    ) -> DescriptorSet {
        set_with_flags(
            resources,
            raw,
            DescriptorSetLayoutCreateFlags::empty(),
            DescriptorPoolCreateFlags::empty(),
            bindings,
        )
    }

    fn set_with_flags(
        resources: &ResourceTable,
        raw: u64,
        layout_flags: DescriptorSetLayoutCreateFlags,
        pool_flags: DescriptorPoolCreateFlags,
        bindings: Vec<(u32, DescriptorSetLayoutBinding)>,
    ) -> DescriptorSet {
        let create_info = DescriptorSetLayoutCreateInfo {
            flags: layout_flags,
            bindings: bindings.into_iter().collect(),
            ..Default::default()
        };

        DescriptorSet::new(
            vk::DescriptorSet::from_raw(raw),
            vk::DescriptorPool::from_raw(raw),
            pool_flags,
            Arc::new(test_layout!(*resources, raw, create_info)),
            0,
        )
    }

    fn mutable_binding(types: &[DescriptorType]) -> DescriptorSetLayoutBinding {
        DescriptorSetLayoutBinding {
            mutable_descriptor_types: types.to_vec(),
            ..binding(DescriptorType::Mutable, 1, ShaderStages::FRAGMENT)
        }
    }

    fn uniform_buffers(resources: &ResourceTable, count: usize) -> WriteDescriptorSetElements {
        let buffer = vk::Buffer::from_raw(100);
        resources.insert_buffer(
            buffer,
            BufferInfo {
                size: 4096,
                usage: BufferUsage::UNIFORM_BUFFER,
            },
        );

        WriteDescriptorSetElements::Buffer(vec![
            DescriptorBufferInfo {
                buffer,
                offset: 0,
                range: 256,
            };
            count
        ])
    }

    #[test]
    fn consistent_span() {
        let device = DeviceInfo::default();
        let resources = ResourceTable::new();
        let mut set = set(
            &resources,
            1,
            vec![
                (0, binding(DescriptorType::UniformBuffer, 2, ShaderStages::FRAGMENT)),
                (1, binding(DescriptorType::UniformBuffer, 0, ShaderStages::VERTEX)),
                (2, binding(DescriptorType::UniformBuffer, 2, ShaderStages::FRAGMENT)),
            ],
        );
        let facts = test_facts!(device, resources);

        let write = WriteDescriptorSet {
            dst_array_element: 1,
            ..WriteDescriptorSet::new(
                set.handle(),
                0,
                DescriptorType::UniformBuffer,
                uniform_buffers(&resources, 3),
            )
        };

        let validated = write.validate(&set, &facts).unwrap();
        assert!(validated.payload_errors.is_empty());
        assert_eq!(validated.span.len(), 2);

        set.record_write(&validated);
        assert!(set.descriptor(0, 0).is_none());
        assert!(set.descriptor(0, 1).is_some());
        assert!(set.descriptor(2, 0).is_some());
        assert!(set.descriptor(2, 1).is_some());
    }

    #[test]
    fn inconsistent_span_names_attribute() {
        let device = DeviceInfo {
            enabled_features: DeviceFeatures {
                descriptor_binding_partially_bound: true,
                ..DeviceFeatures::empty()
            },
            ..Default::default()
        };
        let resources = ResourceTable::new();
        let elements = uniform_buffers(&resources, 2);
        let facts = test_facts!(device, resources);

        let cases = [
            (
                binding(DescriptorType::StorageBuffer, 1, ShaderStages::FRAGMENT),
                "VUID-VkWriteDescriptorSet-descriptorCount-00317",
            ),
            (
                binding(DescriptorType::UniformBuffer, 1, ShaderStages::VERTEX),
                "VUID-VkWriteDescriptorSet-descriptorCount-00317",
            ),
            (
                DescriptorSetLayoutBinding {
                    binding_flags: DescriptorBindingFlags::PARTIALLY_BOUND,
                    ..binding(DescriptorType::UniformBuffer, 1, ShaderStages::FRAGMENT)
                },
                "VUID-VkWriteDescriptorSet-descriptorCount-00318",
            ),
        ];

        for (second, vuid) in cases {
            let set = set(
                &resources,
                2,
                vec![
                    (0, binding(DescriptorType::UniformBuffer, 1, ShaderStages::FRAGMENT)),
                    (1, second),
                ],
            );
            let write = WriteDescriptorSet::new(
                set.handle(),
                0,
                DescriptorType::UniformBuffer,
                elements.clone(),
            );

            let err = write.validate(&set, &facts).unwrap_err();
            assert_eq!(err.vuids, &[vuid]);
            assert!(err.problem.contains("binding 1"));
        }

        let sampler = vk::Sampler::from_raw(10);
        resources.insert_sampler(
            sampler,
            SamplerInfo {
                create_info: SamplerCreateInfo::default(),
            },
        );

        let set = set(
            &resources,
            3,
            vec![
                (0, binding(DescriptorType::CombinedImageSampler, 1, ShaderStages::FRAGMENT)),
                (
                    1,
                    DescriptorSetLayoutBinding {
                        immutable_samplers: vec![sampler],
                        ..binding(DescriptorType::CombinedImageSampler, 1, ShaderStages::FRAGMENT)
                    },
                ),
            ],
        );
        let write = WriteDescriptorSet::new(
            set.handle(),
            0,
            DescriptorType::CombinedImageSampler,
            WriteDescriptorSetElements::Image(vec![
                DescriptorImageInfo {
                    sampler,
                    image_view: vk::ImageView::from_raw(1),
                    image_layout: ImageLayout::ShaderReadOnlyOptimal,
                };
                2
            ]),
        );

        let err = write.validate(&set, &facts).unwrap_err();
        assert_eq!(err.vuids, &["VUID-VkWriteDescriptorSet-descriptorCount-00320"]);
        assert!(err.problem.contains("binding 1"));
        assert!(err.problem.contains("immutable samplers"));
    }

    #[test]
    fn past_end() {
        let device = DeviceInfo::default();
        let resources = ResourceTable::new();
        let set = set(
            &resources,
            3,
            vec![(0, binding(DescriptorType::UniformBuffer, 2, ShaderStages::FRAGMENT))],
        );
        let facts = test_facts!(device, resources);

        let write = WriteDescriptorSet::new(
            set.handle(),
            0,
            DescriptorType::UniformBuffer,
            uniform_buffers(&resources, 3),
        );
        assert_eq!(
            write.validate(&set, &facts).unwrap_err().vuids,
            &["VUID-VkWriteDescriptorSet-dstArrayElement-00321"],
        );
    }

    #[test]
    fn inline_uniform_block_alignment() {
        let device = DeviceInfo {
            enabled_features: DeviceFeatures {
                inline_uniform_block: true,
                ..DeviceFeatures::empty()
            },
            ..Default::default()
        };
        let resources = ResourceTable::new();
        let set = set(
            &resources,
            4,
            vec![(0, binding(DescriptorType::InlineUniformBlock, 16, ShaderStages::FRAGMENT))],
        );
        let facts = test_facts!(device, resources);

        let write = |dst_array_element| WriteDescriptorSet {
            dst_array_element,
            ..WriteDescriptorSet::new(
                set.handle(),
                0,
                DescriptorType::InlineUniformBlock,
                WriteDescriptorSetElements::InlineUniformBlock(vec![0; 8]),
            )
        };

        let validated = write(2).validate(&set, &facts).unwrap();
        assert_eq!(validated.payload_errors.len(), 1);
        assert_eq!(
            validated.payload_errors[0].vuids,
            &["VUID-VkWriteDescriptorSet-descriptorType-02219"],
        );

        let validated = write(4).validate(&set, &facts).unwrap();
        assert!(validated.payload_errors.is_empty());
    }

    #[test]
    fn wrong_type() {
        let device = DeviceInfo::default();
        let resources = ResourceTable::new();
        let set = set(
            &resources,
            5,
            vec![(0, binding(DescriptorType::StorageBuffer, 1, ShaderStages::COMPUTE))],
        );
        let facts = test_facts!(device, resources);

        let write = WriteDescriptorSet::new(
            set.handle(),
            0,
            DescriptorType::UniformBuffer,
            uniform_buffers(&resources, 1),
        );
        assert_eq!(
            write.validate(&set, &facts).unwrap_err().vuids,
            &["VUID-VkWriteDescriptorSet-descriptorType-00319"],
        );

        let write = WriteDescriptorSet::new(
            set.handle(),
            0,
            DescriptorType::SampledImage,
            WriteDescriptorSetElements::Image(vec![DescriptorImageInfo::image_view(
                vk::ImageView::from_raw(1),
                ImageLayout::ShaderReadOnlyOptimal,
            )]),
        );
        assert!(write.validate(&set, &facts).is_err());
    }

    #[test]
    fn copy_between_sets() {
        let device = DeviceInfo::default();
        let resources = ResourceTable::new();
        let mut src = set(
            &resources,
            6,
            vec![(0, binding(DescriptorType::UniformBuffer, 2, ShaderStages::FRAGMENT))],
        );
        let mut dst = set(
            &resources,
            7,
            vec![(0, binding(DescriptorType::UniformBuffer, 2, ShaderStages::FRAGMENT))],
        );
        let facts = test_facts!(device, resources);

        let write = WriteDescriptorSet::new(
            src.handle(),
            0,
            DescriptorType::UniformBuffer,
            uniform_buffers(&resources, 2),
        );
        let validated = write.validate(&src, &facts).unwrap();
        src.record_write(&validated);

        let copy = CopyDescriptorSet {
            descriptor_count: 2,
            ..CopyDescriptorSet::new(src.handle(), dst.handle())
        };
        let validated = copy.validate(&src, &dst).unwrap();
        let descriptors = validated.read(&src);
        dst.record_copy(&validated, descriptors);

        assert!(matches!(
            dst.descriptor(0, 1),
            Some(Descriptor::Buffer { range: 256, .. }),
        ));
    }

    #[test]
    fn copy_overlap_within_set() {
        let resources = ResourceTable::new();
        let set = set(
            &resources,
            8,
            vec![(0, binding(DescriptorType::UniformBuffer, 4, ShaderStages::FRAGMENT))],
        );

        let copy = CopyDescriptorSet {
            src_set: set.handle(),
            dst_set: set.handle(),
            dst_array_element: 1,
            descriptor_count: 2,
            ..CopyDescriptorSet::new(set.handle(), set.handle())
        };
        assert_eq!(
            copy.validate(&set, &set).unwrap_err().vuids,
            &["VUID-VkCopyDescriptorSet-srcSet-00349"],
        );

        let copy = CopyDescriptorSet {
            dst_array_element: 2,
            descriptor_count: 2,
            ..CopyDescriptorSet::new(set.handle(), set.handle())
        };
        assert!(copy.validate(&set, &set).is_ok());
    }

    #[test]
    fn copy_overlap_across_bindings() {
        let resources = ResourceTable::new();
        let set = set(
            &resources,
            9,
            vec![
                (0, binding(DescriptorType::UniformBuffer, 2, ShaderStages::FRAGMENT)),
                (1, binding(DescriptorType::UniformBuffer, 2, ShaderStages::FRAGMENT)),
            ],
        );

        // Element 3 of binding 0 rolls over into element 1 of binding 1.
        let copy = CopyDescriptorSet {
            src_array_element: 3,
            dst_binding: 1,
            dst_array_element: 1,
            descriptor_count: 1,
            ..CopyDescriptorSet::new(set.handle(), set.handle())
        };
        assert_eq!(
            copy.validate(&set, &set).unwrap_err().vuids,
            &["VUID-VkCopyDescriptorSet-srcSet-00349"],
        );

        let copy = CopyDescriptorSet {
            src_array_element: 2,
            dst_binding: 1,
            dst_array_element: 1,
            descriptor_count: 1,
            ..CopyDescriptorSet::new(set.handle(), set.handle())
        };
        assert!(copy.validate(&set, &set).is_ok());
    }

    #[test]
    fn copy_from_mutable_checks_active_type() {
        let device = DeviceInfo::default();
        let resources = ResourceTable::new();
        let mut src = set(
            &resources,
            10,
            vec![(
                0,
                mutable_binding(&[DescriptorType::UniformBuffer, DescriptorType::StorageBuffer]),
            )],
        );
        let facts = test_facts!(device, resources);

        let write = WriteDescriptorSet::new(
            src.handle(),
            0,
            DescriptorType::UniformBuffer,
            uniform_buffers(&resources, 1),
        );
        let validated = write.validate(&src, &facts).unwrap();
        src.record_write(&validated);

        let dst = set(
            &resources,
            11,
            vec![(0, mutable_binding(&[DescriptorType::StorageBuffer]))],
        );
        let copy = CopyDescriptorSet {
            descriptor_count: 1,
            ..CopyDescriptorSet::new(src.handle(), dst.handle())
        };
        let err = copy.validate(&src, &dst).unwrap_err();
        assert_eq!(err.vuids, &["VUID-VkCopyDescriptorSet-srcSet-04613"]);
        assert!(err.problem.contains("UniformBuffer"));

        let dst = set(
            &resources,
            12,
            vec![(0, binding(DescriptorType::UniformBuffer, 1, ShaderStages::FRAGMENT))],
        );
        let copy = CopyDescriptorSet {
            descriptor_count: 1,
            ..CopyDescriptorSet::new(src.handle(), dst.handle())
        };
        assert!(copy.validate(&src, &dst).is_ok());
    }

    #[test]
    fn copy_into_mutable_checks_source_type() {
        let resources = ResourceTable::new();
        let src = set(
            &resources,
            13,
            vec![(0, binding(DescriptorType::StorageBuffer, 1, ShaderStages::FRAGMENT))],
        );

        let dst = set(
            &resources,
            14,
            vec![(0, mutable_binding(&[DescriptorType::UniformBuffer]))],
        );
        let copy = CopyDescriptorSet {
            descriptor_count: 1,
            ..CopyDescriptorSet::new(src.handle(), dst.handle())
        };
        assert_eq!(
            copy.validate(&src, &dst).unwrap_err().vuids,
            &["VUID-VkCopyDescriptorSet-dstSet-04614"],
        );

        let dst = set(
            &resources,
            15,
            vec![(
                0,
                mutable_binding(&[DescriptorType::UniformBuffer, DescriptorType::StorageBuffer]),
            )],
        );
        let copy = CopyDescriptorSet {
            descriptor_count: 1,
            ..CopyDescriptorSet::new(src.handle(), dst.handle())
        };
        assert!(copy.validate(&src, &dst).is_ok());
    }

    #[test]
    fn copy_update_after_bind_agreement() {
        let resources = ResourceTable::new();
        let uniform = || {
            vec![(
                0,
                DescriptorSetLayoutBinding {
                    binding_flags: DescriptorBindingFlags::UPDATE_AFTER_BIND,
                    ..binding(DescriptorType::UniformBuffer, 1, ShaderStages::FRAGMENT)
                },
            )]
        };
        let uab_layout = DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL;
        let uab_pool = DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        let no_layout = DescriptorSetLayoutCreateFlags::empty();
        let no_pool = DescriptorPoolCreateFlags::empty();

        let cases = [
            (
                (uab_layout, uab_pool),
                (no_layout, uab_pool),
                "VUID-VkCopyDescriptorSet-srcSet-01918",
            ),
            (
                (no_layout, uab_pool),
                (uab_layout, uab_pool),
                "VUID-VkCopyDescriptorSet-srcSet-04885",
            ),
            (
                (no_layout, uab_pool),
                (no_layout, no_pool),
                "VUID-VkCopyDescriptorSet-srcSet-01920",
            ),
            (
                (no_layout, no_pool),
                (no_layout, uab_pool),
                "VUID-VkCopyDescriptorSet-srcSet-04887",
            ),
        ];

        for ((src_layout, src_pool), (dst_layout, dst_pool), vuid) in cases {
            let src = set_with_flags(&resources, 16, src_layout, src_pool, uniform());
            let dst = set_with_flags(&resources, 17, dst_layout, dst_pool, uniform());
            let copy = CopyDescriptorSet {
                descriptor_count: 1,
                ..CopyDescriptorSet::new(src.handle(), dst.handle())
            };
            assert_eq!(copy.validate(&src, &dst).unwrap_err().vuids, &[vuid]);
        }

        let src = set_with_flags(&resources, 16, uab_layout, uab_pool, uniform());
        let dst = set_with_flags(&resources, 17, uab_layout, uab_pool, uniform());
        let copy = CopyDescriptorSet {
            descriptor_count: 1,
            ..CopyDescriptorSet::new(src.handle(), dst.handle())
        };
        assert!(copy.validate(&src, &dst).is_ok());
    }

    #[test]
    fn copy_host_only_agreement() {
        let resources = ResourceTable::new();
        let uniform = || {
            vec![(0, binding(DescriptorType::UniformBuffer, 1, ShaderStages::FRAGMENT))]
        };
        let host_only = DescriptorPoolCreateFlags::HOST_ONLY;
        let none = DescriptorPoolCreateFlags::empty();

        for (src_pool, dst_pool) in [(host_only, none), (none, host_only)] {
            let src = set_with_flags(
                &resources,
                18,
                DescriptorSetLayoutCreateFlags::empty(),
                src_pool,
                uniform(),
            );
            let dst = set_with_flags(
                &resources,
                19,
                DescriptorSetLayoutCreateFlags::empty(),
                dst_pool,
                uniform(),
            );
            let copy = CopyDescriptorSet {
                descriptor_count: 1,
                ..CopyDescriptorSet::new(src.handle(), dst.handle())
            };
            let err = copy.validate(&src, &dst).unwrap_err();
            assert!(err.problem.contains("HOST_ONLY"));
        }

        let src = set_with_flags(
            &resources,
            18,
            DescriptorSetLayoutCreateFlags::empty(),
            host_only,
            uniform(),
        );
        let dst = set_with_flags(
            &resources,
            19,
            DescriptorSetLayoutCreateFlags::empty(),
            host_only,
            uniform(),
        );
        let copy = CopyDescriptorSet {
            descriptor_count: 1,
            ..CopyDescriptorSet::new(src.handle(), dst.handle())
        };
        assert!(copy.validate(&src, &dst).is_ok());
    }
}
