//! Validation of the descriptors accessed by action commands.
//!
//! When an action command is recorded, the descriptors that the shaders of the bound pipeline
//! access through a constant index are checked against the current contents of the bound sets.
//! Bindings that can still be updated after the command is recorded are checked at submission
//! instead, and descriptors accessed through an index that is only known during execution are
//! left to GPU-assisted validation.

use super::{ActionRecord, BoundSet, CommandBufferState, DeferredCheck};
use crate::{
    descriptor_set::{layout::DescriptorType, DescriptorSet},
    finding::{ActionAttribution, Finding, FindingKind},
    pipeline::PipelineBindPoint,
    validator::Facts,
    ValidationError,
};
use ash::vk;
use foldhash::HashMap;
use smallvec::SmallVec;

macro_rules! vuids {
    ($kind:ident, $($id:literal),+ $(,)?) => {
        match $kind {
            ActionKind::Draw => &[$(concat!("VUID-vkCmdDraw-", $id)),+],
            ActionKind::DrawIndexed => &[$(concat!("VUID-vkCmdDrawIndexed-", $id)),+],
            ActionKind::DrawIndirect => &[$(concat!("VUID-vkCmdDrawIndirect-", $id)),+],
            ActionKind::DrawIndexedIndirect => {
                &[$(concat!("VUID-vkCmdDrawIndexedIndirect-", $id)),+]
            }
            ActionKind::Dispatch => &[$(concat!("VUID-vkCmdDispatch-", $id)),+],
            ActionKind::DispatchIndirect => &[$(concat!("VUID-vkCmdDispatchIndirect-", $id)),+],
            ActionKind::TraceRays => &[$(concat!("VUID-vkCmdTraceRaysKHR-", $id)),+],
        }
    };
}

/// A command that executes the bound pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ActionKind {
    Draw,
    DrawIndexed,
    DrawIndirect,
    DrawIndexedIndirect,
    Dispatch,
    DispatchIndirect,
    TraceRays,
}

impl ActionKind {
    /// Returns the bind point whose pipeline the command executes.
    #[inline]
    pub fn bind_point(self) -> PipelineBindPoint {
        match self {
            ActionKind::Draw
            | ActionKind::DrawIndexed
            | ActionKind::DrawIndirect
            | ActionKind::DrawIndexedIndirect => PipelineBindPoint::Graphics,
            ActionKind::Dispatch | ActionKind::DispatchIndirect => PipelineBindPoint::Compute,
            ActionKind::TraceRays => PipelineBindPoint::RayTracing,
        }
    }
}

/// The VUIDs of a descriptor that is accessed without being valid.
pub(crate) fn unwritten_vuids(kind: ActionKind) -> &'static [&'static str] {
    vuids!(kind, "None-08114")
}

/// Checks the descriptor at `index` of binding `binding_num` of `set`, which was bound to set
/// number `set_num` and is accessed by an action command.
pub(crate) fn validate_descriptor_access(
    kind: ActionKind,
    set: &DescriptorSet,
    set_num: u32,
    binding_num: u32,
    index: u32,
    facts: &Facts<'_>,
) -> SmallVec<[(FindingKind, Box<ValidationError>); 1]> {
    let mut errors = SmallVec::new();

    let Some(binding) = set.binding(binding_num) else {
        return errors;
    };

    // Inline uniform blocks are plain bytes, there is nothing to write or check.
    if binding.descriptor_type() == DescriptorType::InlineUniformBlock {
        return errors;
    }

    match binding.descriptors().get(index as usize) {
        Some(Some(descriptor)) => {
            let mut payload_errors = Vec::new();
            descriptor.validate_payload(
                binding.descriptor_type(),
                binding.has_immutable_samplers(),
                facts,
                &mut payload_errors,
            );

            errors.extend(payload_errors.into_iter().map(|error| {
                (
                    FindingKind::Payload,
                    error.add_context(format!(
                        "descriptor_sets[{}].bindings[{}][{}]",
                        set_num, binding_num, index,
                    )),
                )
            }));
        }
        _ if binding.is_partially_bound() => (),
        Some(None) => errors.push((
            FindingKind::Payload,
            Box::new(ValidationError {
                problem: format!(
                    "the bound pipeline accesses descriptor set {} binding {} index {}, but \
                    no descriptor has been written there, and the binding does not have \
                    `DescriptorBindingFlags::PARTIALLY_BOUND`",
                    set_num, binding_num, index,
                )
                .into(),
                vuids: unwritten_vuids(kind),
                ..Default::default()
            }),
        )),
        None => errors.push((
            FindingKind::Payload,
            Box::new(ValidationError {
                problem: format!(
                    "the bound pipeline accesses descriptor set {} binding {} index {}, but \
                    the binding only has {} descriptors",
                    set_num,
                    binding_num,
                    index,
                    binding.descriptor_count(),
                )
                .into(),
                vuids: unwritten_vuids(kind),
                ..Default::default()
            }),
        )),
    }

    errors
}

impl CommandBufferState {
    /// Records an action command and checks the descriptors that it accesses through a constant
    /// index.
    ///
    /// Accesses through an index that is only known during execution can't be checked here.
    /// If `gpu_assisted` is true, they are checked once the submission completes.
    pub(crate) fn record_action(
        &mut self,
        kind: ActionKind,
        sets: &HashMap<vk::DescriptorSet, DescriptorSet>,
        facts: &Facts<'_>,
        gpu_assisted: bool,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        let action_index = self.actions.len() as u32;
        let attribution = ActionAttribution {
            command_buffer: self.handle(),
            action_index,
            debug_label: self.current_label(),
        };
        let state = self.bind_point(kind.bind_point());

        let Some(pipeline) = state.pipeline.clone() else {
            findings.push(
                self.finding(
                    FindingKind::Structural,
                    Box::new(ValidationError {
                        problem: format!(
                            "no pipeline is bound to the `PipelineBindPoint::{:?}` bind point",
                            kind.bind_point(),
                        )
                        .into(),
                        vuids: vuids!(kind, "None-08606"),
                        ..Default::default()
                    }),
                )
                .with_action(attribution.clone()),
            );

            self.actions.push(ActionRecord {
                index: action_index,
                kind,
                debug_label: attribution.debug_label,
                pipeline: None,
                sets: SmallVec::new(),
            });

            return findings;
        };

        let mut requirements: Vec<_> = pipeline.descriptor_binding_requirements().iter().collect();
        requirements.sort_unstable_by_key(|&(&key, _)| key);

        let mut action_sets: SmallVec<[(u32, vk::DescriptorSet); 4]> = SmallVec::new();
        let mut deferred_checks = Vec::new();
        let mut current_set: Option<(u32, Option<&BoundSet>)> = None;

        for (&(set_num, binding_num), binding_requirements) in requirements {
            let bound_set = match current_set {
                Some((current_num, bound_set)) if current_num == set_num => bound_set,
                _ => {
                    let bound_set = state.set(set_num).filter(|_| {
                        state.pipeline_layout.as_ref().is_some_and(|bound_layout| {
                            pipeline.layout().is_compatible_with(bound_layout, set_num + 1)
                        })
                    });

                    if bound_set.is_none() {
                        findings.push(
                            self.finding(
                                FindingKind::Structural,
                                Box::new(ValidationError {
                                    problem: format!(
                                        "the bound pipeline accesses descriptor set {}, but no \
                                        descriptor set was bound to it with a pipeline layout \
                                        that is compatible with the layout of the pipeline",
                                        set_num,
                                    )
                                    .into(),
                                    vuids: vuids!(kind, "None-08600"),
                                    ..Default::default()
                                }),
                            )
                            .with_object(pipeline.handle())
                            .with_action(attribution.clone()),
                        );
                    } else if let Some(BoundSet::Set { set, .. }) = bound_set {
                        action_sets.push((set_num, *set));
                    }

                    current_set = Some((set_num, bound_set));
                    bound_set
                }
            };

            let (set, allocated) = match bound_set {
                Some(BoundSet::Set { set, .. }) => match sets.get(set) {
                    Some(set) => (set, true),
                    None => {
                        findings.push(
                            self.finding(
                                FindingKind::Structural,
                                Box::new(ValidationError {
                                    problem: format!(
                                        "the descriptor set bound to set {} has been freed",
                                        set_num,
                                    )
                                    .into(),
                                    vuids: unwritten_vuids(kind),
                                    ..Default::default()
                                }),
                            )
                            .with_object(*set)
                            .with_action(attribution.clone()),
                        );
                        continue;
                    }
                },
                Some(BoundSet::Push { contents }) => (&**contents, false),
                // The contents of descriptor buffers are not tracked.
                Some(BoundSet::Buffer { .. } | BoundSet::EmbeddedSamplers { .. }) | None => {
                    continue
                }
            };

            let Some(binding) = set.binding(binding_num) else {
                continue;
            };

            let indices: SmallVec<[u32; 4]> = binding_requirements.static_indices().collect();

            if allocated && binding.is_update_after_bind() {
                if !indices.is_empty() {
                    deferred_checks.push(DeferredCheck {
                        action_index,
                        kind,
                        set_num,
                        set: set.handle(),
                        binding: binding_num,
                        indices,
                    });
                }
            } else {
                for index in indices {
                    for (finding_kind, error) in
                        validate_descriptor_access(kind, set, set_num, binding_num, index, facts)
                    {
                        let mut finding = self
                            .finding(finding_kind, error)
                            .with_action(attribution.clone());

                        if allocated {
                            finding = finding.with_object(set.handle());
                        }

                        findings.push(finding);
                    }
                }
            }

            if binding_requirements.has_runtime_index() && !gpu_assisted {
                #[cfg(feature = "logging")]
                log::debug!(
                    "action command {} accesses descriptor set {} binding {} through a dynamic \
                    index, which is not validated without GPU-assisted validation",
                    action_index,
                    set_num,
                    binding_num,
                );
            }
        }

        self.deferred_checks.extend(deferred_checks);
        self.actions.push(ActionRecord {
            index: action_index,
            kind,
            debug_label: attribution.debug_label,
            pipeline: Some(pipeline),
            sets: action_sets,
        });

        findings
    }
}

#[cfg(test)]
mod tests {
    use super::ActionKind;
    use crate::{
        descriptor_set::{
            layout::{
                DescriptorBindingFlags, DescriptorSetLayoutBinding,
                DescriptorSetLayoutCreateFlags, DescriptorSetLayoutCreateInfo, DescriptorType,
            },
            update::{DescriptorBufferInfo, WriteDescriptorSet, WriteDescriptorSetElements},
        },
        pipeline::PipelineBindPoint,
        resources::{BufferInfo, BufferUsage},
        shader::{ShaderStage, ShaderStages},
        tests::{binding_requirements, reflection, setup_single_set},
    };
    use ash::vk::{self, Handle};

    fn storage_buffer_layout(
        binding_flags: DescriptorBindingFlags,
    ) -> DescriptorSetLayoutCreateInfo {
        DescriptorSetLayoutCreateInfo {
            flags: if binding_flags.intersects(DescriptorBindingFlags::UPDATE_AFTER_BIND) {
                DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL
            } else {
                DescriptorSetLayoutCreateFlags::empty()
            },
            bindings: [(
                0,
                DescriptorSetLayoutBinding {
                    binding_flags,
                    descriptor_count: 4,
                    stages: ShaderStages::COMPUTE,
                    ..DescriptorSetLayoutBinding::descriptor_type(DescriptorType::StorageBuffer)
                },
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        }
    }

    fn compute_shader(indices: &[Option<u32>]) -> crate::shader::ShaderReflection {
        reflection(
            1,
            ShaderStage::Compute,
            [(
                (0, 0),
                binding_requirements(
                    DescriptorType::StorageBuffer,
                    Some(4),
                    ShaderStages::COMPUTE,
                    indices,
                ),
            )],
        )
    }

    #[test]
    fn no_pipeline_bound() {
        let (validator, _resources, collector) = test_validator!();
        let command_buffer = vk::CommandBuffer::from_raw(1);

        assert!(!validator.begin_command_buffer(command_buffer));
        assert!(validator.cmd_action(command_buffer, ActionKind::Draw));
        assert_eq!(collector.ids(), ["VUID-vkCmdDraw-None-08606"]);

        // The failed action still consumes an index.
        assert!(validator.cmd_action(command_buffer, ActionKind::Draw));
        assert_eq!(collector.findings()[1].action.as_ref().unwrap().action_index, 1);
    }

    #[test]
    fn unwritten_static_index() {
        let (validator, resources, collector) = test_validator!();
        let objects = setup_single_set(
            &validator,
            storage_buffer_layout(DescriptorBindingFlags::empty()),
            PipelineBindPoint::Compute,
            vec![compute_shader(&[Some(0), Some(2)])],
        );

        let buffer = vk::Buffer::from_raw(100);
        resources.insert_buffer(
            buffer,
            BufferInfo {
                size: 1024,
                usage: BufferUsage::STORAGE_BUFFER,
            },
        );
        assert!(!validator.update_descriptor_sets(
            &[WriteDescriptorSet::new(
                objects.set,
                0,
                DescriptorType::StorageBuffer,
                WriteDescriptorSetElements::Buffer(vec![DescriptorBufferInfo {
                    buffer,
                    offset: 0,
                    range: 64,
                }]),
            )],
            &[],
        ));

        assert!(!validator.cmd_bind_descriptor_sets(
            objects.command_buffer,
            PipelineBindPoint::Compute,
            objects.pipeline_layout,
            0,
            &[objects.set],
            &[],
        ));
        assert!(validator.cmd_action(objects.command_buffer, ActionKind::Dispatch));

        let findings = collector.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].id(), "VUID-vkCmdDispatch-None-08114");
        assert!(findings[0].message().contains("binding 0 index 2"));
    }

    #[test]
    fn partially_bound() {
        let (validator, _resources, collector) =
            test_validator!(descriptor_binding_partially_bound);
        let objects = setup_single_set(
            &validator,
            storage_buffer_layout(DescriptorBindingFlags::PARTIALLY_BOUND),
            PipelineBindPoint::Compute,
            vec![compute_shader(&[Some(1)])],
        );

        assert!(!validator.cmd_bind_descriptor_sets(
            objects.command_buffer,
            PipelineBindPoint::Compute,
            objects.pipeline_layout,
            0,
            &[objects.set],
            &[],
        ));
        assert!(!validator.cmd_action(objects.command_buffer, ActionKind::Dispatch));
        assert!(collector.is_empty());
    }

    #[test]
    fn set_not_bound() {
        let (validator, _resources, collector) = test_validator!();
        let objects = setup_single_set(
            &validator,
            storage_buffer_layout(DescriptorBindingFlags::empty()),
            PipelineBindPoint::Compute,
            vec![compute_shader(&[Some(0)])],
        );

        assert!(validator.cmd_action(objects.command_buffer, ActionKind::Dispatch));
        assert_eq!(collector.ids(), ["VUID-vkCmdDispatch-None-08600"]);
    }

    #[test]
    fn update_after_bind_is_deferred() {
        let (validator, resources, collector) =
            test_validator!(descriptor_binding_storage_buffer_update_after_bind);
        let objects = setup_single_set(
            &validator,
            storage_buffer_layout(DescriptorBindingFlags::UPDATE_AFTER_BIND),
            PipelineBindPoint::Compute,
            vec![compute_shader(&[Some(0)])],
        );

        assert!(!validator.cmd_bind_descriptor_sets(
            objects.command_buffer,
            PipelineBindPoint::Compute,
            objects.pipeline_layout,
            0,
            &[objects.set],
            &[],
        ));
        assert!(!validator.cmd_action(objects.command_buffer, ActionKind::Dispatch));
        assert!(!validator.end_command_buffer(objects.command_buffer));

        // Written after recording, before submission.
        let buffer = vk::Buffer::from_raw(100);
        resources.insert_buffer(
            buffer,
            BufferInfo {
                size: 1024,
                usage: BufferUsage::STORAGE_BUFFER,
            },
        );
        assert!(!validator.update_descriptor_sets(
            &[WriteDescriptorSet::new(
                objects.set,
                0,
                DescriptorType::StorageBuffer,
                WriteDescriptorSetElements::Buffer(vec![DescriptorBufferInfo {
                    buffer,
                    offset: 0,
                    range: 64,
                }]),
            )],
            &[],
        ));

        assert!(!validator.queue_submit(
            crate::gpu_assisted::SubmissionId(1),
            &[objects.command_buffer],
        ));
        assert!(collector.is_empty());
    }
}
