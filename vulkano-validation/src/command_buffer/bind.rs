//! Validation of the commands that bind descriptors to a command buffer.

use super::{BoundSet, CommandBufferState};
use crate::{
    descriptor_set::{
        layout::{DescriptorSetLayoutCreateFlags, DescriptorType},
        pool::DescriptorPoolCreateFlags,
        update::WriteDescriptorSet,
        DescriptorSet,
    },
    device::DeviceInfo,
    finding::{Finding, FindingKind},
    pipeline::{
        layout::{PipelineLayout, PipelineLayoutCreateFlags},
        PipelineBindPoint,
    },
    resources::BufferUsage,
    shader::ShaderStages,
    validator::Facts,
    DeviceAddress, DeviceSize, Requires, RequiresAllOf, RequiresOneOf, ValidationError, Version,
    WHOLE_SIZE,
};
use ash::vk;
use foldhash::HashMap;
use smallvec::SmallVec;
use std::sync::Arc;

macro_rules! vuids {
    ($command:ident, $($id:literal),+ $(,)?) => {
        match $command {
            BindCommand::BindDescriptorSets => {
                &[$(concat!("VUID-vkCmdBindDescriptorSets-", $id)),+]
            }
            BindCommand::BindDescriptorSets2 => {
                &[$(concat!("VUID-VkBindDescriptorSetsInfoKHR-", $id)),+]
            }
        }
    };
}

/// The command that descriptor sets are bound with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BindCommand {
    BindDescriptorSets,
    BindDescriptorSets2,
}

/// The command that descriptors are pushed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PushCommand {
    PushDescriptorSet,
    PushDescriptorSetWithTemplate,
}

/// Parameters of `vkCmdBindDescriptorSets2KHR`.
#[derive(Clone, Debug)]
pub struct BindDescriptorSetsInfo {
    /// The shader stages that the sets are bound for. The sets are bound to every pipeline bind
    /// point that has one of these stages.
    ///
    /// The default value is empty, which must be overridden.
    pub stage_flags: ShaderStages,

    /// The pipeline layout that the sets are bound with.
    ///
    /// The default value is a null handle, which must be overridden.
    pub layout: vk::PipelineLayout,

    /// The set number of the first set.
    ///
    /// The default value is `0`.
    pub first_set: u32,

    /// The sets to bind.
    ///
    /// The default value is empty.
    pub descriptor_sets: Vec<vk::DescriptorSet>,

    /// The dynamic offsets of the dynamic buffer descriptors of the sets, in order.
    ///
    /// The default value is empty.
    pub dynamic_offsets: Vec<u32>,

    pub _ne: crate::NonExhaustive,
}

impl Default for BindDescriptorSetsInfo {
    #[inline]
    fn default() -> Self {
        Self {
            stage_flags: ShaderStages::empty(),
            layout: vk::PipelineLayout::null(),
            first_set: 0,
            descriptor_sets: Vec::new(),
            dynamic_offsets: Vec::new(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

/// A descriptor buffer that is bound with `vkCmdBindDescriptorBuffersEXT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorBufferBindingInfo {
    /// The device address of the descriptor buffer.
    pub address: DeviceAddress,

    /// The usage that the buffer was created with.
    pub usage: BufferUsage,
}

impl CommandBufferState {
    /// Validates and records the binding of `descriptor_sets` to `first_set` onwards.
    ///
    /// Sets that are not known are reported and skipped. Everything else is recorded, even if
    /// it is not valid.
    pub(crate) fn bind_descriptor_sets(
        &mut self,
        command: BindCommand,
        pipeline_bind_point: PipelineBindPoint,
        pipeline_layout: &Arc<PipelineLayout>,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
        sets: &HashMap<vk::DescriptorSet, DescriptorSet>,
        facts: &Facts<'_>,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        let set_layouts = pipeline_layout.set_layouts();

        if first_set as usize + descriptor_sets.len() > set_layouts.len() {
            findings.push(self.finding(
                FindingKind::Structural,
                Box::new(ValidationError {
                    problem: format!(
                        "`first_set` ({}) + the number of descriptor sets ({}) is greater than \
                        the number of set layouts in `layout` ({})",
                        first_set,
                        descriptor_sets.len(),
                        set_layouts.len(),
                    )
                    .into(),
                    vuids: vuids!(command, "firstSet-00360"),
                    ..Default::default()
                }),
            ));

            return findings;
        }

        let mut dynamic_offsets_remaining = dynamic_offsets;
        let mut bound: SmallVec<[(u32, BoundSet); 4]> = SmallVec::new();

        for (descriptor_sets_index, &handle) in descriptor_sets.iter().enumerate() {
            let set_num = first_set + descriptor_sets_index as u32;

            let Some(set) = sets.get(&handle) else {
                findings.push(self.finding(
                    FindingKind::Structural,
                    Box::new(ValidationError {
                        context: format!("descriptor_sets[{}]", descriptor_sets_index).into(),
                        problem: "is not a valid descriptor set".into(),
                        vuids: vuids!(command, "pDescriptorSets-parameter"),
                        ..Default::default()
                    }),
                ));
                continue;
            };

            let set_layout = set.layout();

            match &set_layouts[set_num as usize] {
                None => {
                    if !pipeline_layout
                        .flags()
                        .intersects(PipelineLayoutCreateFlags::INDEPENDENT_SETS)
                    {
                        findings.push(
                            self.finding(
                                FindingKind::Structural,
                                Box::new(ValidationError {
                                    problem: format!(
                                        "`layout.set_layouts()[{}]` is empty, and `layout` was \
                                        not created with \
                                        `PipelineLayoutCreateFlags::INDEPENDENT_SETS`",
                                        set_num,
                                    )
                                    .into(),
                                    vuids: vuids!(command, "pDescriptorSets-00358"),
                                    ..Default::default()
                                }),
                            )
                            .with_object(handle),
                        );
                    }
                }
                Some(pipeline_set_layout) => {
                    if !pipeline_set_layout
                        .flags()
                        .intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
                    {
                        if let Err(incompatibility) =
                            pipeline_set_layout.is_compatible_with(set_layout)
                        {
                            findings.push(
                                self.finding(
                                    FindingKind::Structural,
                                    Box::new(ValidationError {
                                        problem: format!(
                                            "`descriptor_sets[{0}]` (for set number {1}) is not \
                                            compatible with `layout.set_layouts()[{1}]`: {2}",
                                            descriptor_sets_index, set_num, incompatibility,
                                        )
                                        .into(),
                                        vuids: vuids!(command, "pDescriptorSets-00358"),
                                        ..Default::default()
                                    }),
                                )
                                .with_object(handle)
                                .with_object(pipeline_layout.handle()),
                            );
                        }
                    }
                }
            }

            if set_layout
                .flags()
                .intersects(DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER)
            {
                findings.push(
                    self.finding(
                        FindingKind::Structural,
                        Box::new(ValidationError {
                            context: format!("descriptor_sets[{}]", descriptor_sets_index).into(),
                            problem: "was allocated with a layout that was created with \
                                `DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER`"
                                .into(),
                            vuids: vuids!(command, "pDescriptorSets-08010"),
                            ..Default::default()
                        }),
                    )
                    .with_object(handle),
                );
            }

            if set
                .pool_flags()
                .intersects(DescriptorPoolCreateFlags::HOST_ONLY)
            {
                findings.push(
                    self.finding(
                        FindingKind::Structural,
                        Box::new(ValidationError {
                            context: format!("descriptor_sets[{}]", descriptor_sets_index).into(),
                            problem: "was allocated from a pool that was created with \
                                `DescriptorPoolCreateFlags::HOST_ONLY`"
                                .into(),
                            vuids: vuids!(command, "pDescriptorSets-04616"),
                            ..Default::default()
                        }),
                    )
                    .with_object(handle),
                );
            }

            // Dynamic buffer descriptors consume one offset each, in binding order.
            let required_dynamic_offset_count: usize = set
                .bindings()
                .iter()
                .filter(|binding| binding.descriptor_type().is_dynamic())
                .map(|binding| binding.descriptor_count() as usize)
                .sum();
            let supplied = dynamic_offsets_remaining.len().min(required_dynamic_offset_count);
            let (set_dynamic_offsets, rest) = dynamic_offsets_remaining.split_at(supplied);
            dynamic_offsets_remaining = rest;

            if supplied < required_dynamic_offset_count {
                findings.push(
                    self.finding(
                        FindingKind::Capacity,
                        Box::new(ValidationError {
                            problem: format!(
                                "`descriptor_sets[{}]` (for set number {}) requires {} dynamic \
                                offsets, but only {} are remaining in `dynamic_offsets`",
                                descriptor_sets_index,
                                set_num,
                                required_dynamic_offset_count,
                                supplied,
                            )
                            .into(),
                            vuids: vuids!(command, "dynamicOffsetCount-00359"),
                            ..Default::default()
                        }),
                    )
                    .with_object(handle),
                );
            } else {
                self.validate_dynamic_offsets(
                    command,
                    set,
                    descriptor_sets_index,
                    set_num,
                    set_dynamic_offsets,
                    facts,
                    &mut findings,
                );
            }

            bound.push((
                set_num,
                BoundSet::Set {
                    set: handle,
                    layout: set_layout.clone(),
                    dynamic_offsets: set_dynamic_offsets.iter().copied().collect(),
                },
            ));
        }

        if !dynamic_offsets_remaining.is_empty() {
            findings.push(self.finding(
                FindingKind::Structural,
                Box::new(ValidationError {
                    problem: format!(
                        "{} of the elements of `dynamic_offsets` do not correspond to a dynamic \
                        buffer descriptor of the bound descriptor sets",
                        dynamic_offsets_remaining.len(),
                    )
                    .into(),
                    vuids: vuids!(command, "dynamicOffsetCount-00359"),
                    ..Default::default()
                }),
            ));
        }

        let state = self.bind_point_mut(pipeline_bind_point);
        state.invalidate_descriptor_sets(pipeline_layout);

        for (set_num, bound_set) in bound {
            if let BoundSet::Set { set, .. } = &bound_set {
                self.referenced_sets.insert(*set);
            }

            self.bind_point_mut(pipeline_bind_point)
                .bind(set_num, bound_set);
        }

        findings
    }

    fn validate_dynamic_offsets(
        &self,
        command: BindCommand,
        set: &DescriptorSet,
        descriptor_sets_index: usize,
        set_num: u32,
        dynamic_offsets: &[u32],
        facts: &Facts<'_>,
        findings: &mut Vec<Finding>,
    ) {
        let properties = facts.device.properties();
        let mut dynamic_offsets = dynamic_offsets.iter();

        for binding in set.bindings() {
            let (required_alignment, alignment_name, alignment_vuids): (_, _, &'static [_]) =
                match binding.descriptor_type() {
                    DescriptorType::UniformBufferDynamic => (
                        properties.min_uniform_buffer_offset_alignment,
                        "min_uniform_buffer_offset_alignment",
                        vuids!(command, "pDynamicOffsets-01971"),
                    ),
                    DescriptorType::StorageBufferDynamic => (
                        properties.min_storage_buffer_offset_alignment,
                        "min_storage_buffer_offset_alignment",
                        vuids!(command, "pDynamicOffsets-01972"),
                    ),
                    _ => continue,
                };

            for (index, descriptor) in binding.descriptors().iter().enumerate() {
                let Some(&dynamic_offset) = dynamic_offsets.next() else {
                    return;
                };

                // A zero offset leaves the written range as it is.
                if dynamic_offset == 0 {
                    continue;
                }

                let dynamic_offset = dynamic_offset as DeviceSize;

                if !crate::is_aligned(dynamic_offset, required_alignment) {
                    findings.push(
                        self.finding(
                            FindingKind::Payload,
                            Box::new(ValidationError {
                                problem: format!(
                                    "the dynamic offset provided for `descriptor_sets[{}]` (for \
                                    set number {}) binding {} index {} is not aligned to the \
                                    `{}` device property",
                                    descriptor_sets_index,
                                    set_num,
                                    binding.binding(),
                                    index,
                                    alignment_name,
                                )
                                .into(),
                                vuids: alignment_vuids,
                                ..Default::default()
                            }),
                        )
                        .with_object(set.handle()),
                    );
                }

                let Some(descriptor) = descriptor else {
                    continue;
                };

                let &crate::descriptor_set::Descriptor::Buffer {
                    buffer,
                    offset,
                    range,
                } = descriptor.inner()
                else {
                    continue;
                };

                let Some(buffer_info) = facts.resources.buffer(buffer) else {
                    continue;
                };

                let out_of_range = if range == WHOLE_SIZE {
                    true
                } else {
                    dynamic_offset
                        .checked_add(offset)
                        .and_then(|end| end.checked_add(range))
                        .is_none_or(|end| end > buffer_info.size)
                };

                if out_of_range {
                    findings.push(
                        self.finding(
                            FindingKind::Payload,
                            Box::new(ValidationError {
                                problem: if range == WHOLE_SIZE {
                                    format!(
                                        "the dynamic offset of `descriptor_sets[{}]` (for set \
                                        number {}) for binding {} index {} is not zero, but the \
                                        descriptor was written with a range of `WHOLE_SIZE`",
                                        descriptor_sets_index,
                                        set_num,
                                        binding.binding(),
                                        index,
                                    )
                                    .into()
                                } else {
                                    format!(
                                        "the dynamic offset of `descriptor_sets[{}]` (for set \
                                        number {}) for binding {} index {}, when added to \
                                        `offset + range` of the descriptor write, is greater \
                                        than the size of the bound buffer",
                                        descriptor_sets_index,
                                        set_num,
                                        binding.binding(),
                                        index,
                                    )
                                    .into()
                                },
                                vuids: vuids!(command, "pDescriptorSets-01979"),
                                ..Default::default()
                            }),
                        )
                        .with_object(set.handle())
                        .with_object(buffer),
                    );
                }
            }
        }
    }

    /// Validates and records the pushing of `descriptor_writes` to set number `set_num`.
    pub(crate) fn push_descriptor_set(
        &mut self,
        command: PushCommand,
        pipeline_bind_point: PipelineBindPoint,
        pipeline_layout: &Arc<PipelineLayout>,
        set_num: u32,
        descriptor_writes: &[WriteDescriptorSet],
        facts: &Facts<'_>,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        let device = facts.device;

        if command == PushCommand::PushDescriptorSet
            && !(device.api_version() >= Version::V1_4
                || device.enabled_extensions().khr_push_descriptor)
        {
            findings.push(self.finding(
                FindingKind::Capability,
                Box::new(ValidationError {
                    requires_one_of: RequiresOneOf(&[
                        RequiresAllOf(&[Requires::APIVersion(Version::V1_4)]),
                        RequiresAllOf(&[Requires::DeviceExtension("khr_push_descriptor")]),
                    ]),
                    ..Default::default()
                }),
            ));

            return findings;
        }

        let (vuids_set_count, vuids_push_flag): (&'static [_], &'static [_]) = match command {
            PushCommand::PushDescriptorSet => (
                &["VUID-vkCmdPushDescriptorSetKHR-set-00364"],
                &["VUID-vkCmdPushDescriptorSetKHR-set-00365"],
            ),
            PushCommand::PushDescriptorSetWithTemplate => (
                &["VUID-vkCmdPushDescriptorSetWithTemplateKHR-set-07304"],
                &["VUID-vkCmdPushDescriptorSetWithTemplateKHR-set-07305"],
            ),
        };

        let Some(set_layout) = pipeline_layout.set_layouts().get(set_num as usize) else {
            findings.push(self.finding(
                FindingKind::Structural,
                Box::new(ValidationError {
                    problem: "`set` is not less than the number of set layouts in `layout`".into(),
                    vuids: vuids_set_count,
                    ..Default::default()
                }),
            ));

            return findings;
        };

        let Some(set_layout) = set_layout.as_ref().filter(|set_layout| {
            set_layout
                .flags()
                .intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
        }) else {
            findings.push(self.finding(
                FindingKind::Structural,
                Box::new(ValidationError {
                    problem: format!(
                        "`layout.set_layouts()[{}]` was not created with \
                        `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`",
                        set_num,
                    )
                    .into(),
                    vuids: vuids_push_flag,
                    ..Default::default()
                }),
            ));

            return findings;
        };

        // Pushing to a slot that already holds pushed descriptors of the same layout updates
        // them in place.
        let mut contents = match self.bind_point(pipeline_bind_point).set(set_num) {
            Some(BoundSet::Push { contents })
                if contents.layout().is_compatible_with(set_layout).is_ok()
                    && self.bind_point(pipeline_bind_point).pipeline_layout.as_ref()
                        == Some(pipeline_layout) =>
            {
                contents.clone()
            }
            _ => Arc::new(DescriptorSet::new_push(set_layout.clone())),
        };

        for (index, write) in descriptor_writes.iter().enumerate() {
            match write.validate(&contents, facts) {
                Ok(validated) => {
                    Arc::make_mut(&mut contents).record_write(&validated);

                    for error in validated.payload_errors {
                        findings.push(self.finding(
                            FindingKind::Payload,
                            error.add_context(format!("descriptor_writes[{}]", index)),
                        ));
                    }
                }
                Err(error) => {
                    let kind = if error.requires_one_of.is_empty() {
                        FindingKind::Structural
                    } else {
                        FindingKind::Capability
                    };
                    findings.push(self.finding(
                        kind,
                        error.add_context(format!("descriptor_writes[{}]", index)),
                    ));
                }
            }
        }

        let state = self.bind_point_mut(pipeline_bind_point);
        state.invalidate_descriptor_sets(pipeline_layout);
        state.bind(set_num, BoundSet::Push { contents });

        findings
    }

    /// Validates and records the binding of descriptor buffers.
    pub(crate) fn bind_descriptor_buffers(
        &mut self,
        binding_infos: &[DescriptorBufferBindingInfo],
        device: &DeviceInfo,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        let properties = device.properties();

        if !device.enabled_features().descriptor_buffer {
            findings.push(self.finding(
                FindingKind::Capability,
                Box::new(ValidationError {
                    requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                        "descriptor_buffer",
                    )])]),
                    vuids: &["VUID-vkCmdBindDescriptorBuffersEXT-None-08047"],
                    ..Default::default()
                }),
            ));
        }

        if binding_infos.len() > properties.max_descriptor_buffer_bindings as usize {
            findings.push(self.finding(
                FindingKind::Capacity,
                Box::new(ValidationError {
                    context: "binding_infos".into(),
                    problem: format!(
                        "has {} elements, which exceeds the `max_descriptor_buffer_bindings` \
                        limit ({})",
                        binding_infos.len(),
                        properties.max_descriptor_buffer_bindings,
                    )
                    .into(),
                    vuids: &["VUID-vkCmdBindDescriptorBuffersEXT-bufferCount-08051"],
                    ..Default::default()
                }),
            ));
        }

        for (index, binding_info) in binding_infos.iter().enumerate() {
            if !binding_info.usage.intersects(
                BufferUsage::SAMPLER_DESCRIPTOR_BUFFER | BufferUsage::RESOURCE_DESCRIPTOR_BUFFER,
            ) {
                findings.push(self.finding(
                    FindingKind::Structural,
                    Box::new(ValidationError {
                        context: format!("binding_infos[{}].usage", index).into(),
                        problem: "contains neither `BufferUsage::SAMPLER_DESCRIPTOR_BUFFER` nor \
                            `BufferUsage::RESOURCE_DESCRIPTOR_BUFFER`"
                            .into(),
                        vuids: &["VUID-VkDescriptorBufferBindingInfoEXT-usage-08122"],
                        ..Default::default()
                    }),
                ));
            }

            if !crate::is_aligned(
                binding_info.address,
                properties.descriptor_buffer_offset_alignment,
            ) {
                findings.push(self.finding(
                    FindingKind::Payload,
                    Box::new(ValidationError {
                        context: format!("binding_infos[{}].address", index).into(),
                        problem: "is not a multiple of the `descriptor_buffer_offset_alignment` \
                            device property"
                            .into(),
                        vuids: &["VUID-VkDescriptorBufferBindingInfoEXT-address-08057"],
                        ..Default::default()
                    }),
                ));
            }
        }

        self.descriptor_buffers = binding_infos.iter().copied().collect();

        findings
    }

    /// Validates and records the binding of ranges of the bound descriptor buffers to
    /// `first_set` onwards.
    pub(crate) fn set_descriptor_buffer_offsets(
        &mut self,
        pipeline_bind_point: PipelineBindPoint,
        pipeline_layout: &Arc<PipelineLayout>,
        first_set: u32,
        buffer_indices: &[u32],
        offsets: &[DeviceSize],
        device: &DeviceInfo,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        let properties = device.properties();
        let set_layouts = pipeline_layout.set_layouts();

        if buffer_indices.len() != offsets.len() {
            findings.push(self.finding(
                FindingKind::Structural,
                Box::new(ValidationError {
                    problem: "`buffer_indices` and `offsets` do not have the same length".into(),
                    ..Default::default()
                }),
            ));

            return findings;
        }

        if first_set as usize + buffer_indices.len() > set_layouts.len() {
            findings.push(self.finding(
                FindingKind::Structural,
                Box::new(ValidationError {
                    problem: "`first_set` + the length of `buffer_indices` is greater than the \
                        number of set layouts in `layout`"
                        .into(),
                    vuids: &["VUID-vkCmdSetDescriptorBufferOffsetsEXT-firstSet-08066"],
                    ..Default::default()
                }),
            ));

            return findings;
        }

        let mut bound: SmallVec<[(u32, BoundSet); 4]> = SmallVec::new();

        for (index, (&buffer_index, &offset)) in buffer_indices.iter().zip(offsets).enumerate() {
            let set_num = first_set + index as u32;

            let Some(set_layout) = set_layouts[set_num as usize].as_ref().filter(|set_layout| {
                set_layout
                    .flags()
                    .intersects(DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER)
            }) else {
                findings.push(self.finding(
                    FindingKind::Structural,
                    Box::new(ValidationError {
                        problem: format!(
                            "`layout.set_layouts()[{}]` was not created with \
                            `DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER`",
                            set_num,
                        )
                        .into(),
                        vuids: &["VUID-vkCmdSetDescriptorBufferOffsetsEXT-firstSet-09006"],
                        ..Default::default()
                    }),
                ));
                continue;
            };

            if buffer_index as usize >= self.descriptor_buffers.len() {
                findings.push(self.finding(
                    FindingKind::Structural,
                    Box::new(ValidationError {
                        context: format!("buffer_indices[{}]", index).into(),
                        problem: format!(
                            "is {}, but only {} descriptor buffers are bound",
                            buffer_index,
                            self.descriptor_buffers.len(),
                        )
                        .into(),
                        vuids: &["VUID-vkCmdSetDescriptorBufferOffsetsEXT-pBufferIndices-08065"],
                        ..Default::default()
                    }),
                ));
            }

            if !crate::is_aligned(offset, properties.descriptor_buffer_offset_alignment) {
                findings.push(self.finding(
                    FindingKind::Payload,
                    Box::new(ValidationError {
                        context: format!("offsets[{}]", index).into(),
                        problem: "is not a multiple of the `descriptor_buffer_offset_alignment` \
                            device property"
                            .into(),
                        vuids: &["VUID-vkCmdSetDescriptorBufferOffsetsEXT-pOffsets-08061"],
                        ..Default::default()
                    }),
                ));
            }

            bound.push((
                set_num,
                BoundSet::Buffer {
                    layout: set_layout.clone(),
                    buffer_index,
                    offset,
                },
            ));
        }

        let state = self.bind_point_mut(pipeline_bind_point);
        state.invalidate_descriptor_sets(pipeline_layout);

        for (set_num, bound_set) in bound {
            state.bind(set_num, bound_set);
        }

        findings
    }

    /// Validates and records the binding of the embedded immutable samplers of set number
    /// `set_num`.
    pub(crate) fn bind_descriptor_buffer_embedded_samplers(
        &mut self,
        pipeline_bind_point: PipelineBindPoint,
        pipeline_layout: &Arc<PipelineLayout>,
        set_num: u32,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();

        let Some(set_layout) = pipeline_layout.set_layouts().get(set_num as usize) else {
            findings.push(self.finding(
                FindingKind::Structural,
                Box::new(ValidationError {
                    problem: "`set` is not less than the number of set layouts in `layout`".into(),
                    vuids: &["VUID-vkCmdBindDescriptorBufferEmbeddedSamplersEXT-set-08071"],
                    ..Default::default()
                }),
            ));

            return findings;
        };

        let Some(set_layout) = set_layout.as_ref().filter(|set_layout| {
            set_layout
                .flags()
                .intersects(DescriptorSetLayoutCreateFlags::EMBEDDED_IMMUTABLE_SAMPLERS)
        }) else {
            findings.push(self.finding(
                FindingKind::Structural,
                Box::new(ValidationError {
                    problem: format!(
                        "`layout.set_layouts()[{}]` was not created with \
                        `DescriptorSetLayoutCreateFlags::EMBEDDED_IMMUTABLE_SAMPLERS`",
                        set_num,
                    )
                    .into(),
                    vuids: &["VUID-vkCmdBindDescriptorBufferEmbeddedSamplersEXT-set-08070"],
                    ..Default::default()
                }),
            ));

            return findings;
        };

        let set_layout = set_layout.clone();
        let state = self.bind_point_mut(pipeline_bind_point);
        state.invalidate_descriptor_sets(pipeline_layout);
        state.bind(set_num, BoundSet::EmbeddedSamplers { layout: set_layout });

        findings
    }
}
