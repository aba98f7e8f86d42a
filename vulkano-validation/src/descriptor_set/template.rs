//! Descriptor update templates.
//!
//! A template describes where in a block of application memory the resources for each
//! descriptor are found. Updating a set with a template decodes that memory into ordinary
//! writes, which are then validated like any other write.

use super::{
    layout::{DescriptorSetLayout, DescriptorSetLayoutCreateFlags, DescriptorType},
    update::{
        DescriptorBufferInfo, DescriptorImageInfo, WriteDescriptorSet, WriteDescriptorSetElements,
    },
};
use crate::{
    device::DeviceInfo,
    macros::vulkan_enum,
    pipeline::{layout::PipelineLayout, PipelineBindPoint},
    resources::ImageLayout,
    ValidationError,
};
use ash::vk::{self, Handle};
use bytemuck::{Pod, Zeroable};
use std::{mem::size_of, sync::Arc};

/// A registered descriptor update template.
#[derive(Debug)]
pub struct DescriptorUpdateTemplate {
    handle: vk::DescriptorUpdateTemplate,
    template_type: DescriptorUpdateTemplateType,
    entries: Vec<DescriptorUpdateTemplateEntry>,
    layout: Arc<DescriptorSetLayout>,
    pipeline_bind_point: PipelineBindPoint,
    set: u32,
}

impl DescriptorUpdateTemplate {
    pub(crate) fn new(
        handle: vk::DescriptorUpdateTemplate,
        create_info: &DescriptorUpdateTemplateCreateInfo,
        layout: Arc<DescriptorSetLayout>,
    ) -> Self {
        Self {
            handle,
            template_type: create_info.template_type,
            entries: create_info.entries.clone(),
            layout,
            pipeline_bind_point: create_info.pipeline_bind_point,
            set: create_info.set,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorUpdateTemplate {
        self.handle
    }

    #[inline]
    pub fn template_type(&self) -> DescriptorUpdateTemplateType {
        self.template_type
    }

    #[inline]
    pub fn entries(&self) -> &[DescriptorUpdateTemplateEntry] {
        &self.entries
    }

    /// Returns the descriptor set layout that the template writes to. For push descriptor
    /// templates, this is the layout of the push descriptor slot of the pipeline layout.
    #[inline]
    pub fn layout(&self) -> &Arc<DescriptorSetLayout> {
        &self.layout
    }

    #[inline]
    pub fn pipeline_bind_point(&self) -> PipelineBindPoint {
        self.pipeline_bind_point
    }

    #[inline]
    pub fn set(&self) -> u32 {
        self.set
    }

    /// Decodes `data` into the writes that the template describes, with `dst_set` as the
    /// destination of every write.
    ///
    /// `out_of_bounds_vuids` are the VUIDs reported if an entry reads past the end of `data`.
    pub(crate) fn decode(
        &self,
        dst_set: vk::DescriptorSet,
        data: &[u8],
        out_of_bounds_vuids: &'static [&'static str],
    ) -> Result<Vec<WriteDescriptorSet>, Box<ValidationError>> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                entry
                    .decode(dst_set, data, out_of_bounds_vuids)
                    .map_err(|err| err.add_context(format!("entries[{}]", index)))
            })
            .collect()
    }
}

/// Parameters to create a new `DescriptorUpdateTemplate`.
#[derive(Clone, Debug)]
pub struct DescriptorUpdateTemplateCreateInfo {
    /// Whether the template updates a descriptor set, or pushes descriptors to a command buffer.
    ///
    /// The default value is [`DescriptorUpdateTemplateType::DescriptorSet`].
    pub template_type: DescriptorUpdateTemplateType,

    /// The descriptors that are updated, and where their resources are found in the data.
    ///
    /// The default value is empty.
    pub entries: Vec<DescriptorUpdateTemplateEntry>,

    /// For `DescriptorUpdateTemplateType::DescriptorSet`, the layout of the sets that the
    /// template updates.
    ///
    /// The default value is a null handle.
    pub descriptor_set_layout: vk::DescriptorSetLayout,

    /// For `DescriptorUpdateTemplateType::PushDescriptors`, the bind point that descriptors are
    /// pushed to.
    ///
    /// The default value is [`PipelineBindPoint::Graphics`].
    pub pipeline_bind_point: PipelineBindPoint,

    /// For `DescriptorUpdateTemplateType::PushDescriptors`, the pipeline layout that
    /// descriptors are pushed with.
    ///
    /// The default value is a null handle.
    pub pipeline_layout: vk::PipelineLayout,

    /// For `DescriptorUpdateTemplateType::PushDescriptors`, the set number of the push
    /// descriptor set in `pipeline_layout`.
    ///
    /// The default value is `0`.
    pub set: u32,

    pub _ne: crate::NonExhaustive,
}

impl Default for DescriptorUpdateTemplateCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            template_type: DescriptorUpdateTemplateType::DescriptorSet,
            entries: Vec::new(),
            descriptor_set_layout: vk::DescriptorSetLayout::null(),
            pipeline_bind_point: PipelineBindPoint::Graphics,
            pipeline_layout: vk::PipelineLayout::null(),
            set: 0,
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl DescriptorUpdateTemplateCreateInfo {
    /// Validates the create info, and returns the layout of the sets that the template writes
    /// to.
    ///
    /// `set_layout` is the layout named by `descriptor_set_layout`, and `pipeline_layout` is the
    /// layout named by `pipeline_layout`, if they are known.
    pub(crate) fn validate(
        &self,
        device: &DeviceInfo,
        set_layout: Option<&Arc<DescriptorSetLayout>>,
        pipeline_layout: Option<&PipelineLayout>,
    ) -> Result<Arc<DescriptorSetLayout>, Box<ValidationError>> {
        let &Self {
            template_type,
            ref entries,
            descriptor_set_layout: _,
            pipeline_bind_point,
            pipeline_layout: _,
            set,
            _ne: _,
        } = self;

        template_type.validate_device(device).map_err(|err| {
            err.add_context("template_type")
                .set_vuids(&["VUID-VkDescriptorUpdateTemplateCreateInfo-templateType-parameter"])
        })?;

        let layout = match template_type {
            DescriptorUpdateTemplateType::DescriptorSet => {
                let Some(set_layout) = set_layout else {
                    return Err(Box::new(ValidationError {
                        context: "descriptor_set_layout".into(),
                        problem: "is not a valid descriptor set layout".into(),
                        vuids: &["VUID-VkDescriptorUpdateTemplateCreateInfo-templateType-00350"],
                        ..Default::default()
                    }));
                };

                set_layout.clone()
            }
            DescriptorUpdateTemplateType::PushDescriptors => {
                pipeline_bind_point.validate_device(device).map_err(|err| {
                    err.add_context("pipeline_bind_point").set_vuids(&[
                        "VUID-VkDescriptorUpdateTemplateCreateInfo-templateType-00351",
                    ])
                })?;

                let Some(pipeline_layout) = pipeline_layout else {
                    return Err(Box::new(ValidationError {
                        context: "pipeline_layout".into(),
                        problem: "is not a valid pipeline layout".into(),
                        vuids: &["VUID-VkDescriptorUpdateTemplateCreateInfo-templateType-00352"],
                        ..Default::default()
                    }));
                };

                let Some(set_layout) = pipeline_layout
                    .set_layout(set)
                    .filter(|layout| {
                        layout
                            .flags()
                            .intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
                    })
                else {
                    return Err(Box::new(ValidationError {
                        context: "set".into(),
                        problem: "is not the number of the push descriptor set of \
                            `pipeline_layout`"
                            .into(),
                        vuids: &["VUID-VkDescriptorUpdateTemplateCreateInfo-templateType-00353"],
                        ..Default::default()
                    }));
                };

                set_layout.clone()
            }
        };

        if layout.is_destroyed() {
            return Err(Box::new(ValidationError {
                problem: "the descriptor set layout that the template writes to has been \
                    destroyed"
                    .into(),
                ..Default::default()
            }));
        }

        for (index, entry) in entries.iter().enumerate() {
            entry
                .validate(device, &layout)
                .map_err(|err| err.add_context(format!("entries[{}]", index)))?;
        }

        Ok(layout)
    }
}

vulkan_enum! {
    #[non_exhaustive]

    /// The type of a descriptor update template.
    DescriptorUpdateTemplateType = DescriptorUpdateTemplateType(i32);

    /// The template updates descriptor sets.
    DescriptorSet = DESCRIPTOR_SET,

    /// The template pushes descriptors to a command buffer.
    PushDescriptors = PUSH_DESCRIPTORS_KHR
    RequiresOneOf([
        RequiresAllOf([APIVersion(V1_4)]),
        RequiresAllOf([DeviceExtension(khr_push_descriptor)]),
    ]),
}

/// Describes one range of descriptors updated by a template.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorUpdateTemplateEntry {
    /// The binding number to start writing at.
    pub dst_binding: u32,

    /// The array element to start writing at. For `DescriptorType::InlineUniformBlock`, this is
    /// the byte offset.
    pub dst_array_element: u32,

    /// The number of descriptors to write. For `DescriptorType::InlineUniformBlock`, this is the
    /// number of bytes.
    pub descriptor_count: u32,

    pub descriptor_type: DescriptorType,

    /// The byte offset in the data of the first resource.
    pub offset: usize,

    /// The byte distance in the data between consecutive resources. Ignored for
    /// `DescriptorType::InlineUniformBlock`.
    pub stride: usize,
}

impl DescriptorUpdateTemplateEntry {
    fn validate(
        &self,
        device: &DeviceInfo,
        layout: &DescriptorSetLayout,
    ) -> Result<(), Box<ValidationError>> {
        let &Self {
            dst_binding,
            dst_array_element,
            descriptor_count,
            descriptor_type,
            offset: _,
            stride: _,
        } = self;

        descriptor_type.validate_device(device).map_err(|err| {
            err.add_context("descriptor_type")
                .set_vuids(&["VUID-VkDescriptorUpdateTemplateEntry-descriptorType-parameter"])
        })?;

        let Some(binding) = layout.binding(dst_binding) else {
            return Err(Box::new(ValidationError {
                context: "dst_binding".into(),
                problem: format!(
                    "binding {} does not exist in the descriptor set layout",
                    dst_binding,
                )
                .into(),
                ..Default::default()
            }));
        };

        if !binding.accepts_descriptor_type(descriptor_type) {
            return Err(Box::new(ValidationError {
                context: "descriptor_type".into(),
                problem: format!(
                    "`DescriptorType::{:?}` cannot be written to binding {}",
                    descriptor_type, dst_binding,
                )
                .into(),
                ..Default::default()
            }));
        }

        if descriptor_type == DescriptorType::InlineUniformBlock {
            if dst_array_element % 4 != 0 {
                return Err(Box::new(ValidationError {
                    context: "dst_array_element".into(),
                    problem: "is not a multiple of 4".into(),
                    vuids: &["VUID-VkDescriptorUpdateTemplateEntry-descriptor-02226"],
                    ..Default::default()
                }));
            }

            if descriptor_count % 4 != 0 {
                return Err(Box::new(ValidationError {
                    context: "descriptor_count".into(),
                    problem: "is not a multiple of 4".into(),
                    vuids: &["VUID-VkDescriptorUpdateTemplateEntry-descriptor-02227"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }

    fn decode(
        &self,
        dst_set: vk::DescriptorSet,
        data: &[u8],
        out_of_bounds_vuids: &'static [&'static str],
    ) -> Result<WriteDescriptorSet, Box<ValidationError>> {
        let &Self {
            dst_binding,
            dst_array_element,
            descriptor_count,
            descriptor_type,
            offset,
            stride: _,
        } = self;

        let elements = match descriptor_type {
            DescriptorType::Sampler => WriteDescriptorSetElements::Image(
                self.read_all::<RawImageInfo>(data, out_of_bounds_vuids)?
                    .into_iter()
                    .map(|raw| DescriptorImageInfo::sampler(vk::Sampler::from_raw(raw.sampler)))
                    .collect(),
            ),
            DescriptorType::CombinedImageSampler
            | DescriptorType::SampledImage
            | DescriptorType::StorageImage
            | DescriptorType::InputAttachment => WriteDescriptorSetElements::Image(
                self.read_all::<RawImageInfo>(data, out_of_bounds_vuids)?
                    .into_iter()
                    .map(RawImageInfo::to_info)
                    .collect::<Result<_, _>>()?,
            ),
            DescriptorType::UniformBuffer
            | DescriptorType::StorageBuffer
            | DescriptorType::UniformBufferDynamic
            | DescriptorType::StorageBufferDynamic => WriteDescriptorSetElements::Buffer(
                self.read_all::<RawBufferInfo>(data, out_of_bounds_vuids)?
                    .into_iter()
                    .map(|raw| DescriptorBufferInfo {
                        buffer: vk::Buffer::from_raw(raw.buffer),
                        offset: raw.offset,
                        range: raw.range,
                    })
                    .collect(),
            ),
            DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer => {
                WriteDescriptorSetElements::TexelBufferView(
                    self.read_all::<u64>(data, out_of_bounds_vuids)?
                        .into_iter()
                        .map(vk::BufferView::from_raw)
                        .collect(),
                )
            }
            DescriptorType::InlineUniformBlock => {
                let len = descriptor_count as usize;
                let bytes = offset
                    .checked_add(len)
                    .and_then(|end| data.get(offset..end))
                    .ok_or_else(|| out_of_bounds(offset, len, data.len(), out_of_bounds_vuids))?;

                WriteDescriptorSetElements::InlineUniformBlock(bytes.to_vec())
            }
            DescriptorType::AccelerationStructure => {
                WriteDescriptorSetElements::AccelerationStructure(
                    self.read_all::<u64>(data, out_of_bounds_vuids)?
                        .into_iter()
                        .map(vk::AccelerationStructureKHR::from_raw)
                        .collect(),
                )
            }
            DescriptorType::Mutable => {
                return Err(Box::new(ValidationError {
                    context: "descriptor_type".into(),
                    problem: "is `DescriptorType::Mutable`".into(),
                    ..Default::default()
                }));
            }
        };

        Ok(WriteDescriptorSet {
            dst_array_element,
            descriptor_count,
            ..WriteDescriptorSet::new(dst_set, dst_binding, descriptor_type, elements)
        })
    }

    fn read_all<T: Pod>(
        &self,
        data: &[u8],
        out_of_bounds_vuids: &'static [&'static str],
    ) -> Result<Vec<T>, Box<ValidationError>> {
        (0..self.descriptor_count as usize)
            .map(|index| {
                let start = index
                    .checked_mul(self.stride)
                    .and_then(|relative| relative.checked_add(self.offset));
                let bytes = start.and_then(|start| {
                    start
                        .checked_add(size_of::<T>())
                        .and_then(|end| data.get(start..end))
                });

                bytes.map(bytemuck::pod_read_unaligned).ok_or_else(|| {
                    out_of_bounds(
                        start.unwrap_or(usize::MAX),
                        size_of::<T>(),
                        data.len(),
                        out_of_bounds_vuids,
                    )
                })
            })
            .collect()
    }
}

fn out_of_bounds(
    start: usize,
    len: usize,
    data_len: usize,
    vuids: &'static [&'static str],
) -> Box<ValidationError> {
    Box::new(ValidationError {
        context: "data".into(),
        problem: format!(
            "is {} bytes long, but the template reads {} bytes at offset {}",
            data_len, len, start,
        )
        .into(),
        vuids,
        ..Default::default()
    })
}

/// The memory layout of `VkDescriptorImageInfo`.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
struct RawImageInfo {
    sampler: u64,
    image_view: u64,
    image_layout: i32,
    _pad: u32,
}

unsafe impl Zeroable for RawImageInfo {}
unsafe impl Pod for RawImageInfo {}

impl RawImageInfo {
    fn to_info(self) -> Result<DescriptorImageInfo, Box<ValidationError>> {
        let image_layout = ImageLayout::try_from(vk::ImageLayout::from_raw(self.image_layout))
            .map_err(|_| {
                Box::new(ValidationError {
                    context: "data".into(),
                    problem: format!("contains the unknown image layout {}", self.image_layout)
                        .into(),
                    ..Default::default()
                })
            })?;

        Ok(DescriptorImageInfo {
            sampler: vk::Sampler::from_raw(self.sampler),
            image_view: vk::ImageView::from_raw(self.image_view),
            image_layout,
        })
    }
}

/// The memory layout of `VkDescriptorBufferInfo`.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
struct RawBufferInfo {
    buffer: u64,
    offset: u64,
    range: u64,
}

unsafe impl Zeroable for RawBufferInfo {}
unsafe impl Pod for RawBufferInfo {}

#[cfg(test)]
mod tests {
    use super::{
        DescriptorUpdateTemplate, DescriptorUpdateTemplateCreateInfo,
        DescriptorUpdateTemplateEntry, RawBufferInfo, RawImageInfo,
    };
    use crate::{
        descriptor_set::{
            layout::{DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo, DescriptorType},
            update::WriteDescriptorSetElements,
        },
        device::DeviceInfo,
        resources::{ImageLayout, ResourceTable},
    };
    use ash::vk::{self, Handle};
    use std::{mem::size_of, sync::Arc};

    const OUT_OF_BOUNDS: &[&str] = &["VUID-vkUpdateDescriptorSetWithTemplate-pData-01685"];

    fn template(entries: Vec<DescriptorUpdateTemplateEntry>) -> DescriptorUpdateTemplate {
        let resources = ResourceTable::new();
        let layout = Arc::new(test_layout!(
            resources,
            1,
            DescriptorSetLayoutCreateInfo {
                bindings: [
                    (
                        0,
                        DescriptorSetLayoutBinding {
                            descriptor_count: 2,
                            ..DescriptorSetLayoutBinding::descriptor_type(
                                DescriptorType::UniformBuffer,
                            )
                        },
                    ),
                    (
                        1,
                        DescriptorSetLayoutBinding::descriptor_type(DescriptorType::SampledImage),
                    ),
                ]
                .into_iter()
                .collect(),
                ..Default::default()
            }
        ));
        let create_info = DescriptorUpdateTemplateCreateInfo {
            entries,
            descriptor_set_layout: layout.handle(),
            ..Default::default()
        };
        create_info
            .validate(&DeviceInfo::default(), Some(&layout), None)
            .unwrap();

        DescriptorUpdateTemplate::new(
            vk::DescriptorUpdateTemplate::from_raw(1),
            &create_info,
            layout,
        )
    }

    #[test]
    fn decode_strided() {
        let stride = size_of::<RawBufferInfo>() + 8;
        let template = template(vec![
            DescriptorUpdateTemplateEntry {
                dst_binding: 0,
                dst_array_element: 0,
                descriptor_count: 2,
                descriptor_type: DescriptorType::UniformBuffer,
                offset: 0,
                stride,
            },
            DescriptorUpdateTemplateEntry {
                dst_binding: 1,
                dst_array_element: 0,
                descriptor_count: 1,
                descriptor_type: DescriptorType::SampledImage,
                offset: 2 * stride,
                stride: 0,
            },
        ]);

        let mut data = vec![0u8; 2 * stride + size_of::<RawImageInfo>()];
        for index in 0..2 {
            let raw = RawBufferInfo {
                buffer: 10 + index as u64,
                offset: 256 * index as u64,
                range: 64,
            };
            data[index * stride..index * stride + size_of::<RawBufferInfo>()]
                .copy_from_slice(bytemuck::bytes_of(&raw));
        }
        let raw = RawImageInfo {
            sampler: 0,
            image_view: 20,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL.as_raw(),
            _pad: 0,
        };
        data[2 * stride..].copy_from_slice(bytemuck::bytes_of(&raw));

        let writes = template
            .decode(vk::DescriptorSet::from_raw(5), &data, OUT_OF_BOUNDS)
            .unwrap();
        assert_eq!(writes.len(), 2);

        match &writes[0].elements {
            WriteDescriptorSetElements::Buffer(buffers) => {
                assert_eq!(buffers.len(), 2);
                assert_eq!(buffers[1].buffer, vk::Buffer::from_raw(11));
                assert_eq!(buffers[1].offset, 256);
            }
            _ => panic!(),
        }

        match &writes[1].elements {
            WriteDescriptorSetElements::Image(images) => {
                assert_eq!(images[0].image_view, vk::ImageView::from_raw(20));
                assert_eq!(images[0].image_layout, ImageLayout::ShaderReadOnlyOptimal);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn decode_out_of_bounds() {
        let template = template(vec![DescriptorUpdateTemplateEntry {
            dst_binding: 0,
            dst_array_element: 0,
            descriptor_count: 2,
            descriptor_type: DescriptorType::UniformBuffer,
            offset: 0,
            stride: size_of::<RawBufferInfo>(),
        }]);

        let data = vec![0u8; size_of::<RawBufferInfo>() + 4];
        let err = template
            .decode(vk::DescriptorSet::from_raw(5), &data, OUT_OF_BOUNDS)
            .unwrap_err();
        assert_eq!(err.vuids, OUT_OF_BOUNDS);
        assert_eq!(err.context, "entries[0].data");
    }

    #[test]
    fn entry_type_must_match() {
        let resources = ResourceTable::new();
        let layout = Arc::new(test_layout!(
            resources,
            1,
            DescriptorSetLayoutCreateInfo {
                bindings: [(
                    0,
                    DescriptorSetLayoutBinding::descriptor_type(DescriptorType::StorageBuffer),
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            }
        ));
        let create_info = DescriptorUpdateTemplateCreateInfo {
            entries: vec![DescriptorUpdateTemplateEntry {
                dst_binding: 0,
                dst_array_element: 0,
                descriptor_count: 1,
                descriptor_type: DescriptorType::UniformBuffer,
                offset: 0,
                stride: 0,
            }],
            ..Default::default()
        };

        assert!(create_info
            .validate(&DeviceInfo::default(), Some(&layout), None)
            .is_err());
        assert!(create_info
            .validate(&DeviceInfo::default(), None, None)
            .is_err());
    }
}
