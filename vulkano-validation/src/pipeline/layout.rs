//! The layout of descriptor sets and push constants used by a pipeline.
//!
//! # Layout compatibility
//!
//! When binding descriptor sets, a pipeline layout is provided. It decides which slot each set
//! is bound to. The sets can later be read by action commands, but only if the bound pipeline
//! has a layout that is *compatible* with the layout that was used to bind them.
//!
//! The following rules apply to compatibility between the layouts used in subsequent descriptor
//! set binding calls:
//!
//! - An incompatible definition of the push constant ranges invalidates all bound descriptor
//!   sets.
//! - An incompatible definition of set *N* invalidates all bound descriptor sets *N* and higher.
//! - If *N* is the highest set being assigned in a bind command, and it and all lower sets have
//!   compatible definitions, including the push constants, then descriptor sets above *N* remain
//!   valid.

use crate::{
    descriptor_set::layout::{DescriptorSetLayout, DescriptorSetLayoutCreateFlags, DescriptorType},
    device::{DeviceInfo, DeviceProperties},
    macros::{impl_id_counter, vulkan_bitflags},
    shader::{DescriptorBindingRequirements, ShaderStage, ShaderStages},
    ValidationError,
};
use ash::vk;
use foldhash::HashMap;
use std::{array, fmt::Write, num::NonZero, sync::Arc};

/// Describes the layout of descriptor sets and push constants that are made available to
/// shaders.
#[derive(Debug)]
pub struct PipelineLayout {
    handle: vk::PipelineLayout,
    id: NonZero<u64>,

    flags: PipelineLayoutCreateFlags,
    set_layouts: Vec<Option<Arc<DescriptorSetLayout>>>,
    push_constant_ranges: Vec<PushConstantRange>,
}

impl PipelineLayout {
    /// Creates a `PipelineLayout` from a validated create info, with the handles of
    /// `create_info.set_layouts` resolved into `set_layouts`.
    pub(crate) fn new(
        handle: vk::PipelineLayout,
        create_info: &PipelineLayoutCreateInfo,
        set_layouts: Vec<Option<Arc<DescriptorSetLayout>>>,
    ) -> Self {
        PipelineLayout {
            handle,
            id: Self::next_id(),
            flags: create_info.flags,
            set_layouts,
            push_constant_ranges: create_info.push_constant_ranges.clone(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    /// Returns the flags that the pipeline layout was created with.
    #[inline]
    pub fn flags(&self) -> PipelineLayoutCreateFlags {
        self.flags
    }

    /// Returns the descriptor set layouts of the pipeline layout. A slot is `None` if it was
    /// left null, which is only allowed with `PipelineLayoutCreateFlags::INDEPENDENT_SETS`.
    #[inline]
    pub fn set_layouts(&self) -> &[Option<Arc<DescriptorSetLayout>>] {
        &self.set_layouts
    }

    /// Returns the descriptor set layout of slot `set`, if it exists and is not null.
    #[inline]
    pub fn set_layout(&self, set: u32) -> Option<&Arc<DescriptorSetLayout>> {
        self.set_layouts.get(set as usize).and_then(Option::as_ref)
    }

    /// Returns the push constant ranges.
    #[inline]
    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }

    /// Returns the number of the slot whose layout has the
    /// `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR` flag, if any.
    pub fn push_descriptor_set(&self) -> Option<u32> {
        self.set_layouts
            .iter()
            .position(|layout| {
                layout.as_ref().is_some_and(|layout| {
                    layout
                        .flags()
                        .intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
                })
            })
            .map(|set| set as u32)
    }

    /// Returns whether `self` is compatible with `other` for the given number of sets.
    pub fn is_compatible_with(&self, other: &PipelineLayout, num_sets: u32) -> bool {
        if self == other {
            return true;
        }

        if self.push_constant_ranges != other.push_constant_ranges {
            return false;
        }

        let num_sets = num_sets as usize;

        let (Some(self_sets), Some(other_sets)) = (
            self.set_layouts.get(0..num_sets),
            other.set_layouts.get(0..num_sets),
        ) else {
            return false;
        };

        self_sets
            .iter()
            .zip(other_sets)
            .all(|(self_layout, other_layout)| slots_compatible(self_layout, other_layout))
    }

    /// Returns the number of the first slot at which the layouts of `self` and `other` are not
    /// compatible, or `None` if every slot that both have is compatible.
    ///
    /// If the push constant ranges differ, every slot is incompatible and `Some(0)` is
    /// returned.
    pub(crate) fn first_incompatible_set(&self, other: &PipelineLayout) -> Option<u32> {
        if self == other {
            return None;
        }

        if self.push_constant_ranges != other.push_constant_ranges {
            return Some(0);
        }

        self.set_layouts
            .iter()
            .zip(&other.set_layouts)
            .position(|(self_layout, other_layout)| !slots_compatible(self_layout, other_layout))
            .map(|set| set as u32)
    }

    /// Makes sure that `self` is a superset of the provided descriptor binding requirements.
    /// Returns an `Err` if this is not the case.
    ///
    /// `vuids` are the VUIDs of a missing binding, a type mismatch and a count mismatch, in that
    /// order.
    pub(crate) fn ensure_compatible_with_shader<'a>(
        &self,
        descriptor_requirements: impl IntoIterator<
            Item = (&'a (u32, u32), &'a DescriptorBindingRequirements),
        >,
        vuids: [&'static [&'static str]; 3],
    ) -> Result<(), Box<ValidationError>> {
        let [vuids_missing, vuids_type, vuids_count] = vuids;

        for (&(set_num, binding_num), requirements) in descriptor_requirements {
            let layout_binding = self
                .set_layout(set_num)
                .and_then(|set_layout| set_layout.binding(binding_num));

            let Some(layout_binding) = layout_binding else {
                return Err(Box::new(ValidationError {
                    problem: format!(
                        "the requirements for descriptor set {} binding {} were not met: no \
                        such binding exists in the pipeline layout",
                        set_num, binding_num,
                    )
                    .into(),
                    vuids: vuids_missing,
                    ..Default::default()
                }));
            };

            if let Err(error) = layout_binding.ensure_compatible_with_shader(requirements) {
                let vuids = if !requirements
                    .descriptor_types
                    .iter()
                    .any(|&ty| layout_binding.accepts_descriptor_type(ty))
                {
                    vuids_type
                } else if requirements
                    .descriptor_count
                    .is_some_and(|count| layout_binding.descriptor_count < count)
                {
                    vuids_count
                } else {
                    vuids_missing
                };

                return Err(Box::new(ValidationError {
                    problem: format!(
                        "the requirements for descriptor set {} binding {} were not met: {}",
                        set_num, binding_num, error.problem,
                    )
                    .into(),
                    vuids,
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

impl_id_counter!(PipelineLayout);

fn slots_compatible(
    first: &Option<Arc<DescriptorSetLayout>>,
    second: &Option<Arc<DescriptorSetLayout>>,
) -> bool {
    match (first, second) {
        (Some(first), Some(second)) => first.is_compatible_with(second).is_ok(),
        (None, None) => true,
        _ => false,
    }
}

/// Parameters to create a new `PipelineLayout`.
#[derive(Clone, Debug)]
pub struct PipelineLayoutCreateInfo {
    /// Additional properties of the pipeline layout.
    ///
    /// The default value is empty.
    pub flags: PipelineLayoutCreateFlags,

    /// The descriptor set layouts that should be part of the pipeline layout.
    ///
    /// They are provided in order of set number. A null handle leaves the slot empty, which
    /// requires `PipelineLayoutCreateFlags::INDEPENDENT_SETS`.
    ///
    /// The default value is empty.
    pub set_layouts: Vec<vk::DescriptorSetLayout>,

    /// The ranges of push constants that the pipeline will access.
    ///
    /// A shader stage can only appear in one element of the list, but it is possible to combine
    /// ranges for multiple shader stages if they are the same.
    ///
    /// The default value is empty.
    pub push_constant_ranges: Vec<PushConstantRange>,

    pub _ne: crate::NonExhaustive,
}

impl Default for PipelineLayoutCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            flags: PipelineLayoutCreateFlags::empty(),
            set_layouts: Vec::new(),
            push_constant_ranges: Vec::new(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl PipelineLayoutCreateInfo {
    /// Validates the create info, with the handles of `self.set_layouts` resolved into
    /// `set_layouts`. Null handles resolve to `None`.
    pub(crate) fn validate(
        &self,
        device: &DeviceInfo,
        set_layouts: &[Option<Arc<DescriptorSetLayout>>],
    ) -> Result<(), Box<ValidationError>> {
        let properties = device.properties();

        let &Self {
            flags,
            set_layouts: _,
            ref push_constant_ranges,
            _ne: _,
        } = self;

        flags.validate_device(device).map_err(|err| {
            err.add_context("flags")
                .set_vuids(&["VUID-VkPipelineLayoutCreateInfo-flags-parameter"])
        })?;

        if set_layouts.len() > properties.max_bound_descriptor_sets as usize {
            return Err(Box::new(ValidationError {
                context: "set_layouts".into(),
                problem: "the length exceeds the `max_bound_descriptor_sets` limit".into(),
                vuids: &["VUID-VkPipelineLayoutCreateInfo-setLayoutCount-00286"],
                ..Default::default()
            }));
        }

        struct DescriptorLimit {
            descriptor_types: &'static [DescriptorType],
            get_limit: fn(&DeviceProperties) -> u32,
            limit_name: &'static str,
            vuids: &'static [&'static str],
        }

        const PER_STAGE_DESCRIPTOR_LIMITS: [DescriptorLimit; 6] = [
            DescriptorLimit {
                descriptor_types: &[
                    DescriptorType::Sampler,
                    DescriptorType::CombinedImageSampler,
                ],
                get_limit: |p| p.max_per_stage_descriptor_samplers,
                limit_name: "max_per_stage_descriptor_samplers",
                vuids: &["VUID-VkPipelineLayoutCreateInfo-descriptorType-03016"],
            },
            DescriptorLimit {
                descriptor_types: &[
                    DescriptorType::UniformBuffer,
                    DescriptorType::UniformBufferDynamic,
                ],
                get_limit: |p| p.max_per_stage_descriptor_uniform_buffers,
                limit_name: "max_per_stage_descriptor_uniform_buffers",
                vuids: &["VUID-VkPipelineLayoutCreateInfo-descriptorType-03017"],
            },
            DescriptorLimit {
                descriptor_types: &[
                    DescriptorType::StorageBuffer,
                    DescriptorType::StorageBufferDynamic,
                ],
                get_limit: |p| p.max_per_stage_descriptor_storage_buffers,
                limit_name: "max_per_stage_descriptor_storage_buffers",
                vuids: &["VUID-VkPipelineLayoutCreateInfo-descriptorType-03018"],
            },
            DescriptorLimit {
                descriptor_types: &[
                    DescriptorType::CombinedImageSampler,
                    DescriptorType::SampledImage,
                    DescriptorType::UniformTexelBuffer,
                ],
                get_limit: |p| p.max_per_stage_descriptor_sampled_images,
                limit_name: "max_per_stage_descriptor_sampled_images",
                vuids: &["VUID-VkPipelineLayoutCreateInfo-descriptorType-06939"],
            },
            DescriptorLimit {
                descriptor_types: &[
                    DescriptorType::StorageImage,
                    DescriptorType::StorageTexelBuffer,
                ],
                get_limit: |p| p.max_per_stage_descriptor_storage_images,
                limit_name: "max_per_stage_descriptor_storage_images",
                vuids: &["VUID-VkPipelineLayoutCreateInfo-descriptorType-03020"],
            },
            DescriptorLimit {
                descriptor_types: &[DescriptorType::InputAttachment],
                get_limit: |p| p.max_per_stage_descriptor_input_attachments,
                limit_name: "max_per_stage_descriptor_input_attachments",
                vuids: &["VUID-VkPipelineLayoutCreateInfo-descriptorType-03021"],
            },
        ];

        const TOTAL_DESCRIPTOR_LIMITS: [DescriptorLimit; 2] = [
            DescriptorLimit {
                descriptor_types: &[DescriptorType::UniformBufferDynamic],
                get_limit: |p| p.max_descriptor_set_uniform_buffers_dynamic,
                limit_name: "max_descriptor_set_uniform_buffers_dynamic",
                vuids: &["VUID-VkPipelineLayoutCreateInfo-descriptorType-03030"],
            },
            DescriptorLimit {
                descriptor_types: &[DescriptorType::StorageBufferDynamic],
                get_limit: |p| p.max_descriptor_set_storage_buffers_dynamic,
                limit_name: "max_descriptor_set_storage_buffers_dynamic",
                vuids: &["VUID-VkPipelineLayoutCreateInfo-descriptorType-03032"],
            },
        ];

        let mut per_stage_descriptors: [HashMap<ShaderStage, u32>;
            PER_STAGE_DESCRIPTOR_LIMITS.len()] = array::from_fn(|_| HashMap::default());
        let mut total_descriptors = [0; TOTAL_DESCRIPTOR_LIMITS.len()];
        let mut has_push_descriptor_set = false;

        for (index, set_layout) in set_layouts.iter().enumerate() {
            let Some(set_layout) = set_layout else {
                if !flags.intersects(PipelineLayoutCreateFlags::INDEPENDENT_SETS) {
                    return Err(Box::new(ValidationError {
                        context: format!("set_layouts[{}]", index).into(),
                        problem: "is a null handle, but `flags` does not contain \
                            `PipelineLayoutCreateFlags::INDEPENDENT_SETS`"
                            .into(),
                        vuids: &["VUID-VkPipelineLayoutCreateInfo-graphicsPipelineLibrary-06753"],
                        ..Default::default()
                    }));
                }

                continue;
            };

            if set_layout.is_destroyed() {
                return Err(Box::new(ValidationError {
                    context: format!("set_layouts[{}]", index).into(),
                    problem: "has been destroyed".into(),
                    vuids: &["VUID-VkPipelineLayoutCreateInfo-pSetLayouts-parameter"],
                    ..Default::default()
                }));
            }

            if set_layout
                .flags()
                .intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
            {
                if has_push_descriptor_set {
                    return Err(Box::new(ValidationError {
                        context: "set_layouts".into(),
                        problem: "contains more than one descriptor set layout whose flags \
                            include `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`"
                            .into(),
                        vuids: &["VUID-VkPipelineLayoutCreateInfo-pSetLayouts-00293"],
                        ..Default::default()
                    }));
                }

                has_push_descriptor_set = true;
            }

            // Limits for update-after-bind layouts are not tracked.
            if set_layout
                .flags()
                .intersects(DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            {
                continue;
            }

            for layout_binding in set_layout.bindings().values() {
                for (limit, counts) in PER_STAGE_DESCRIPTOR_LIMITS
                    .iter()
                    .zip(&mut per_stage_descriptors)
                {
                    if limit
                        .descriptor_types
                        .contains(&layout_binding.descriptor_type)
                    {
                        for stage in layout_binding.stages {
                            *counts.entry(stage).or_default() += layout_binding.descriptor_count;
                        }
                    }
                }

                for (limit, count) in TOTAL_DESCRIPTOR_LIMITS
                    .iter()
                    .zip(&mut total_descriptors)
                {
                    if limit
                        .descriptor_types
                        .contains(&layout_binding.descriptor_type)
                    {
                        *count += layout_binding.descriptor_count;
                    }
                }
            }
        }

        let describe_types = |descriptor_types: &[DescriptorType]| {
            descriptor_types[1..].iter().fold(
                format!("`DescriptorType::{:?}`", descriptor_types[0]),
                |mut s, dt| {
                    let _ = write!(s, " + `DescriptorType::{:?}`", dt);
                    s
                },
            )
        };

        for (limit, counts) in PER_STAGE_DESCRIPTOR_LIMITS.iter().zip(per_stage_descriptors) {
            if let Some((max_stage, max_count)) = counts.into_iter().max_by_key(|(_, c)| *c) {
                if max_count > (limit.get_limit)(properties) {
                    return Err(Box::new(ValidationError {
                        context: "set_layouts".into(),
                        problem: format!(
                            "the combined number of {} descriptors, belonging to descriptor \
                            set layouts without the \
                            `DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL` flag, \
                            accessible to the `ShaderStage::{:?}` stage, exceeds the `{}` limit",
                            describe_types(limit.descriptor_types),
                            max_stage,
                            limit.limit_name,
                        )
                        .into(),
                        vuids: limit.vuids,
                        ..Default::default()
                    }));
                }
            }
        }

        for (limit, count) in TOTAL_DESCRIPTOR_LIMITS.iter().zip(total_descriptors) {
            if count > (limit.get_limit)(properties) {
                return Err(Box::new(ValidationError {
                    context: "set_layouts".into(),
                    problem: format!(
                        "the combined number of {} descriptors, belonging to descriptor set \
                        layouts without the \
                        `DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL` flag, \
                        accessible across all shader stages, exceeds the `{}` limit",
                        describe_types(limit.descriptor_types),
                        limit.limit_name,
                    )
                    .into(),
                    vuids: limit.vuids,
                    ..Default::default()
                }));
            }
        }

        let mut seen_stages = ShaderStages::empty();

        for (range_index, range) in push_constant_ranges.iter().enumerate() {
            range
                .validate(device)
                .map_err(|err| err.add_context(format!("push_constant_ranges[{}]", range_index)))?;

            if seen_stages.intersects(range.stages) {
                return Err(Box::new(ValidationError {
                    context: "push_constant_ranges".into(),
                    problem: "contains more than one range with the same stage".into(),
                    vuids: &["VUID-VkPipelineLayoutCreateInfo-pPushConstantRanges-00292"],
                    ..Default::default()
                }));
            }

            seen_stages |= range.stages;
        }

        Ok(())
    }
}

vulkan_bitflags! {
    #[non_exhaustive]

    /// Flags specifying additional properties of a pipeline layout.
    PipelineLayoutCreateFlags = PipelineLayoutCreateFlags(u32);

    /// The pipeline layout may be used for pipeline libraries that are linked together, and
    /// slots of the layout may be left null.
    INDEPENDENT_SETS = INDEPENDENT_SETS_EXT
    RequiresOneOf([
        RequiresAllOf([DeviceExtension(ext_graphics_pipeline_library)]),
    ]),
}

/// Description of a range of the push constants of a pipeline layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushConstantRange {
    /// The stages which can access this range. A stage can access at most one push constant
    /// range.
    ///
    /// The default value is [`ShaderStages::empty()`], which must be overridden.
    pub stages: ShaderStages,

    /// Offset in bytes from the start of the push constants to this range.
    ///
    /// The value must be a multiple of 4.
    ///
    /// The default value is `0`.
    pub offset: u32,

    /// Size in bytes of the range.
    ///
    /// The value must be a multiple of 4, and not 0.
    ///
    /// The default value is `0`, which must be overridden.
    pub size: u32,
}

impl Default for PushConstantRange {
    #[inline]
    fn default() -> Self {
        Self {
            stages: ShaderStages::empty(),
            offset: 0,
            size: 0,
        }
    }
}

impl PushConstantRange {
    pub(crate) fn validate(&self, device: &DeviceInfo) -> Result<(), Box<ValidationError>> {
        let &Self {
            stages,
            offset,
            size,
        } = self;

        if stages.is_empty() {
            return Err(Box::new(ValidationError {
                context: "stages".into(),
                problem: "is empty".into(),
                vuids: &["VUID-VkPushConstantRange-stageFlags-requiredbitmask"],
                ..Default::default()
            }));
        }

        let max_push_constants_size = device.properties().max_push_constants_size;

        if offset >= max_push_constants_size {
            return Err(Box::new(ValidationError {
                context: "offset".into(),
                problem: "is not less than the `max_push_constants_size` limit".into(),
                vuids: &["VUID-VkPushConstantRange-offset-00294"],
                ..Default::default()
            }));
        }

        if offset % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "offset".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-VkPushConstantRange-offset-00295"],
                ..Default::default()
            }));
        }

        if size == 0 {
            return Err(Box::new(ValidationError {
                context: "size".into(),
                problem: "is zero".into(),
                vuids: &["VUID-VkPushConstantRange-size-00296"],
                ..Default::default()
            }));
        }

        if size % 4 != 0 {
            return Err(Box::new(ValidationError {
                context: "size".into(),
                problem: "is not a multiple of 4".into(),
                vuids: &["VUID-VkPushConstantRange-size-00297"],
                ..Default::default()
            }));
        }

        if size > max_push_constants_size - offset {
            return Err(Box::new(ValidationError {
                problem: "`size` is greater than `max_push_constants_size` limit minus `offset`"
                    .into(),
                vuids: &["VUID-VkPushConstantRange-size-00298"],
                ..Default::default()
            }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        PipelineLayout, PipelineLayoutCreateFlags, PipelineLayoutCreateInfo, PushConstantRange,
    };
    use crate::{
        descriptor_set::layout::{
            DescriptorSetLayout, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo,
            DescriptorType,
        },
        device::{DeviceExtensions, DeviceInfo},
        resources::ResourceTable,
        shader::ShaderStages,
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    fn set_layout(raw: u64, stages: ShaderStages) -> Arc<DescriptorSetLayout> {
        let resources = ResourceTable::new();

        Arc::new(test_layout!(
            resources,
            raw,
            DescriptorSetLayoutCreateInfo {
                bindings: [(
                    0,
                    DescriptorSetLayoutBinding {
                        stages,
                        ..DescriptorSetLayoutBinding::descriptor_type(
                            DescriptorType::UniformBuffer,
                        )
                    },
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            }
        ))
    }

    fn pipeline_layout(
        raw: u64,
        set_layouts: Vec<Option<Arc<DescriptorSetLayout>>>,
        push_constant_ranges: Vec<PushConstantRange>,
    ) -> PipelineLayout {
        let create_info = PipelineLayoutCreateInfo {
            set_layouts: set_layouts
                .iter()
                .map(|layout| {
                    layout
                        .as_ref()
                        .map_or(vk::DescriptorSetLayout::null(), |layout| layout.handle())
                })
                .collect(),
            push_constant_ranges,
            ..Default::default()
        };

        PipelineLayout::new(vk::PipelineLayout::from_raw(raw), &create_info, set_layouts)
    }

    #[test]
    fn first_incompatible_set() {
        let fragment = set_layout(1, ShaderStages::FRAGMENT);
        let vertex = set_layout(2, ShaderStages::VERTEX);

        let first = pipeline_layout(
            1,
            vec![Some(fragment.clone()), Some(fragment.clone())],
            Vec::new(),
        );
        let second = pipeline_layout(2, vec![Some(fragment.clone()), Some(vertex)], Vec::new());

        assert_eq!(first.first_incompatible_set(&second), Some(1));
        assert!(first.is_compatible_with(&second, 1));
        assert!(!first.is_compatible_with(&second, 2));

        let third = pipeline_layout(
            3,
            vec![Some(fragment.clone()), Some(fragment)],
            vec![PushConstantRange {
                stages: ShaderStages::FRAGMENT,
                offset: 0,
                size: 16,
            }],
        );
        assert_eq!(first.first_incompatible_set(&third), Some(0));
    }

    #[test]
    fn null_slot_requires_independent_sets() {
        let create_info = PipelineLayoutCreateInfo {
            set_layouts: vec![vk::DescriptorSetLayout::null()],
            ..Default::default()
        };
        let err = create_info
            .validate(&DeviceInfo::default(), &[None])
            .unwrap_err();
        assert_eq!(
            err.vuids,
            &["VUID-VkPipelineLayoutCreateInfo-graphicsPipelineLibrary-06753"],
        );

        let device = DeviceInfo {
            enabled_extensions: DeviceExtensions {
                ext_graphics_pipeline_library: true,
                ..DeviceExtensions::empty()
            },
            ..Default::default()
        };
        let create_info = PipelineLayoutCreateInfo {
            flags: PipelineLayoutCreateFlags::INDEPENDENT_SETS,
            ..create_info
        };
        assert!(create_info.validate(&device, &[None]).is_ok());
    }

    #[test]
    fn per_stage_limit() {
        let resources = ResourceTable::new();
        let layout = Arc::new(test_layout!(
            resources,
            1,
            DescriptorSetLayoutCreateInfo {
                bindings: [(
                    0,
                    DescriptorSetLayoutBinding {
                        descriptor_count: 13,
                        stages: ShaderStages::COMPUTE,
                        ..DescriptorSetLayoutBinding::descriptor_type(
                            DescriptorType::UniformBuffer,
                        )
                    },
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            }
        ));

        let create_info = PipelineLayoutCreateInfo {
            set_layouts: vec![layout.handle()],
            ..Default::default()
        };
        let err = create_info
            .validate(&DeviceInfo::default(), &[Some(layout)])
            .unwrap_err();
        assert_eq!(
            err.vuids,
            &["VUID-VkPipelineLayoutCreateInfo-descriptorType-03017"],
        );
    }

    #[test]
    fn push_constant_ranges() {
        let range = PushConstantRange {
            stages: ShaderStages::VERTEX,
            offset: 2,
            size: 16,
        };
        assert_eq!(
            range.validate(&DeviceInfo::default()).unwrap_err().vuids,
            &["VUID-VkPushConstantRange-offset-00295"],
        );

        let create_info = PipelineLayoutCreateInfo {
            push_constant_ranges: vec![
                PushConstantRange {
                    stages: ShaderStages::VERTEX,
                    offset: 0,
                    size: 16,
                },
                PushConstantRange {
                    stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                    offset: 16,
                    size: 16,
                },
            ],
            ..Default::default()
        };
        assert_eq!(
            create_info
                .validate(&DeviceInfo::default(), &[])
                .unwrap_err()
                .vuids,
            &["VUID-VkPipelineLayoutCreateInfo-pPushConstantRanges-00292"],
        );
    }
}
