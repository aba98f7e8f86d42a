//! GPU-assisted validation of descriptors that are accessed through dynamic indices.
//!
//! Shaders that index a descriptor array with a value only known during execution are
//! instrumented ahead of time, so that every access writes a [`PostProcessRecord`] into a buffer
//! that belongs to the accessed descriptor set. Each submission moves through these stages:
//!
//! 1. *Register*: at submission, the actions of each command buffer whose pipeline is
//!    instrumented are collected into a plan, along with the descriptor sets they access.
//! 2. *Allocate* and *CopyIn*: a post-process buffer with one record slot per descriptor is
//!    allocated for each of those sets. Sets with update-after-bind bindings also get a buffer
//!    holding which descriptors are written, and each command buffer gets a lookup table of the
//!    buffer addresses, indexed by action and set number.
//! 3. *Execute*: the device runs the instrumented shaders.
//! 4. *CopyOut*: once the submission completes, the post-process buffers are read back and all
//!    buffers of the submission are freed.
//! 5. *Decode*: each accessed slot is resolved to the action, set, binding and array element
//!    that it stands for, through the shader reflection.
//! 6. *Validate*: the accessed descriptor is checked with the same rules as descriptors
//!    accessed through a constant index.
//!
//! The buffers of a submission are kept in an arena keyed by its [`SubmissionId`], and are
//! released exactly once, when the submission completes. Failures of the bookkeeping itself are
//! reported as [`FindingKind::Internal`].

use self::memory::{DeviceAllocation, DeviceMemoryService, MemoryError};
use crate::{
    command_buffer::{action::validate_descriptor_access, ActionRecord, CommandBufferState},
    descriptor_set::DescriptorSet,
    finding::{ActionAttribution, Finding, FindingKind},
    validator::Facts,
    DeviceAddress, DeviceSize, ValidationError,
};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use foldhash::{HashMap, HashSet};
use std::{mem::size_of, sync::Arc};

pub mod memory;

/// Identifies one queue submission, from the moment it is submitted until it completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(pub u64);

/// The record that instrumented shader code writes when it accesses a descriptor.
///
/// The record is written into the slot of the post-process buffer of the accessed set that
/// corresponds to the accessed descriptor: slot `n` stands for the descriptor with global index
/// `n` within the set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct PostProcessRecord {
    /// Nonzero if the descriptor was accessed.
    pub accessed: u32,

    /// The `shader_id` of the reflection of the shader that accessed the descriptor.
    pub shader_id: u32,

    /// The index of the action command, within its command buffer, that accessed the
    /// descriptor.
    pub action_index: u32,

    /// The id of the instrumented variable that the descriptor was accessed through.
    pub variable_id: u32,
}

unsafe impl Zeroable for PostProcessRecord {}
unsafe impl Pod for PostProcessRecord {}

impl PostProcessRecord {
    /// The size of a record in bytes.
    pub const SIZE: DeviceSize = size_of::<PostProcessRecord>() as DeviceSize;
}

/// What GPU-assisted validation knows about a descriptor set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DescriptorSetStatus {
    /// Whether a submission that has not completed yet has a post-process buffer for the set.
    pub instrumented: bool,

    /// Whether the set has a binding that can be updated after being bound.
    pub update_after_bind: bool,
}

pub(crate) struct GpuAssistedValidator {
    memory: Arc<dyn DeviceMemoryService>,
    descriptor_state: bool,
    submissions: HashMap<SubmissionId, SubmissionBuffers>,
}

/// The output of the *Register* stage for one command buffer.
struct CommandBufferPlan {
    command_buffer: vk::CommandBuffer,
    actions: Vec<ActionRecord>,
    lookup_width: u32,
    sets: Vec<SetPlan>,
}

struct SetPlan {
    set: vk::DescriptorSet,
    descriptor_count: u32,

    /// One element per descriptor, nonzero if it is written.
    written_state: Option<Vec<u32>>,
}

/// The output of the *Allocate* and *CopyIn* stages: the buffers of one submission.
struct SubmissionBuffers {
    command_buffers: Vec<CommandBufferBuffers>,
}

struct CommandBufferBuffers {
    command_buffer: vk::CommandBuffer,
    actions: Vec<ActionRecord>,
    lookup_table: Result<DeviceAllocation, MemoryError>,
    sets: Vec<SetBuffers>,
}

struct SetBuffers {
    set: vk::DescriptorSet,
    descriptor_count: u32,
    post_process: Result<DeviceAllocation, MemoryError>,
    descriptor_state: Option<Result<DeviceAllocation, MemoryError>>,
}

/// The output of the *CopyOut* stage for one set.
struct ReadBack {
    set: vk::DescriptorSet,
    records: Result<Vec<PostProcessRecord>, MemoryError>,
}

/// The output of the *Decode* stage: one accessed descriptor.
struct DecodedAccess<'a> {
    action: &'a ActionRecord,
    set_num: u32,
    set: vk::DescriptorSet,
    binding: u32,
    index: u32,
}

impl GpuAssistedValidator {
    pub(crate) fn new(memory: Arc<dyn DeviceMemoryService>, descriptor_state: bool) -> Self {
        GpuAssistedValidator {
            memory,
            descriptor_state,
            submissions: HashMap::default(),
        }
    }

    /// Prepares the buffers of a submission of `command_buffers`.
    ///
    /// Nothing is reported here. Allocation failures are reported when the submission
    /// completes, because that is when the accesses they would have caught are lost.
    pub(crate) fn submit(
        &mut self,
        submission: SubmissionId,
        command_buffers: &[&CommandBufferState],
        sets: &HashMap<vk::DescriptorSet, DescriptorSet>,
    ) {
        let plans: Vec<_> = command_buffers
            .iter()
            .filter_map(|command_buffer| self.register(command_buffer, sets))
            .collect();

        if plans.is_empty() {
            return;
        }

        #[cfg(feature = "logging")]
        log::trace!(
            "submission {}: allocating GPU-assisted validation buffers for {} command buffers",
            submission.0,
            plans.len(),
        );

        let buffers = SubmissionBuffers {
            command_buffers: plans.into_iter().map(|plan| self.allocate(plan)).collect(),
        };

        // A submission id is not reused before the submission it named has completed.
        if let Some(stale) = self.submissions.insert(submission, buffers) {
            self.release(stale);
        }
    }

    /// *Register*: collects the instrumented actions of `command_buffer`, and the sets they
    /// access.
    fn register(
        &self,
        command_buffer: &CommandBufferState,
        sets: &HashMap<vk::DescriptorSet, DescriptorSet>,
    ) -> Option<CommandBufferPlan> {
        let instrumented = |action: &&ActionRecord| {
            action
                .pipeline
                .as_ref()
                .is_some_and(|pipeline| pipeline.is_instrumented())
        };

        if !command_buffer.actions.iter().any(|action| instrumented(&action)) {
            return None;
        }

        let lookup_width = command_buffer
            .actions
            .iter()
            .flat_map(|action| action.sets.iter())
            .map(|&(set_num, _)| set_num + 1)
            .max()
            .unwrap_or(0);
        let mut seen = HashSet::default();
        let mut set_plans = Vec::new();

        for action in command_buffer.actions.iter().filter(instrumented) {
            for &(_, handle) in &action.sets {
                if !seen.insert(handle) {
                    continue;
                }

                let Some(set) = sets.get(&handle) else {
                    continue;
                };

                let written_state = (self.descriptor_state
                    && set
                        .bindings()
                        .iter()
                        .any(|binding| binding.is_update_after_bind()))
                .then(|| {
                    set.bindings()
                        .iter()
                        .flat_map(|binding| binding.descriptors())
                        .map(|descriptor| descriptor.is_some() as u32)
                        .collect()
                });

                set_plans.push(SetPlan {
                    set: handle,
                    descriptor_count: set.total_descriptor_count(),
                    written_state,
                });
            }
        }

        Some(CommandBufferPlan {
            command_buffer: command_buffer.handle(),
            actions: command_buffer.actions.clone(),
            lookup_width,
            sets: set_plans,
        })
    }

    /// *Allocate* and *CopyIn*: allocates the buffers of one command buffer and fills the ones
    /// that the device reads.
    fn allocate(&self, plan: CommandBufferPlan) -> CommandBufferBuffers {
        let CommandBufferPlan {
            command_buffer,
            actions,
            lookup_width,
            sets,
        } = plan;

        let sets: Vec<_> = sets
            .into_iter()
            .map(|set_plan| {
                let post_process = self.memory.allocate(
                    set_plan.descriptor_count.max(1) as DeviceSize * PostProcessRecord::SIZE,
                );
                let descriptor_state = set_plan
                    .written_state
                    .map(|written_state| {
                        self.allocate_filled(bytemuck::cast_slice(&written_state))
                    });

                SetBuffers {
                    set: set_plan.set,
                    descriptor_count: set_plan.descriptor_count,
                    post_process,
                    descriptor_state,
                }
            })
            .collect();

        let mut lookup = vec![0 as DeviceAddress; actions.len() * lookup_width as usize];

        for action in &actions {
            for &(set_num, handle) in &action.sets {
                let address = sets
                    .iter()
                    .find(|set_buffers| set_buffers.set == handle)
                    .and_then(|set_buffers| set_buffers.post_process.as_ref().ok())
                    .map_or(0, |allocation| allocation.device_address);
                lookup[(action.index * lookup_width + set_num) as usize] = address;
            }
        }

        let lookup_table = self.allocate_filled(bytemuck::cast_slice(&lookup));

        CommandBufferBuffers {
            command_buffer,
            actions,
            lookup_table,
            sets,
        }
    }

    fn allocate_filled(&self, data: &[u8]) -> Result<DeviceAllocation, MemoryError> {
        let allocation = self.memory.allocate(data.len().max(1) as DeviceSize)?;

        if let Err(err) = self.memory.write(&allocation, 0, data) {
            self.memory.free(allocation);
            return Err(err);
        }

        Ok(allocation)
    }

    /// Decodes and validates the records of a completed submission, and releases its buffers.
    ///
    /// Returns nothing if the submission is not known, or has already been processed.
    pub(crate) fn complete(
        &mut self,
        submission: SubmissionId,
        sets: &HashMap<vk::DescriptorSet, DescriptorSet>,
        facts: &Facts<'_>,
    ) -> Vec<Finding> {
        let Some(buffers) = self.submissions.remove(&submission) else {
            return Vec::new();
        };

        #[cfg(feature = "logging")]
        log::trace!("submission {}: reading back GPU-assisted validation records", submission.0);

        let mut findings = Vec::new();

        for command_buffer in buffers.command_buffers {
            let read_back = self.copy_out(&command_buffer, &mut findings);
            let accesses = decode(&command_buffer, &read_back, sets, &mut findings);

            #[cfg(feature = "logging")]
            log::debug!(
                "submission {}: command buffer {:?} accessed {} descriptors dynamically",
                submission.0,
                command_buffer.command_buffer,
                accesses.len(),
            );

            for access in accesses {
                // Checked during decoding.
                let Some(set) = sets.get(&access.set) else {
                    continue;
                };

                for (kind, error) in validate_descriptor_access(
                    access.action.kind,
                    set,
                    access.set_num,
                    access.binding,
                    access.index,
                    facts,
                ) {
                    findings.push(
                        Finding::new(kind, error)
                            .with_object(command_buffer.command_buffer)
                            .with_object(access.set)
                            .with_action(attribution(&command_buffer, access.action.index)),
                    );
                }
            }
        }

        findings
    }

    /// *CopyOut*: reads back the post-process buffers of one command buffer and frees every
    /// buffer that belongs to it.
    fn copy_out(
        &self,
        command_buffer: &CommandBufferBuffers,
        findings: &mut Vec<Finding>,
    ) -> Vec<ReadBack> {
        let mut read_back = Vec::with_capacity(command_buffer.sets.len());

        match command_buffer.lookup_table {
            Ok(allocation) => self.memory.free(allocation),
            Err(err) => findings.push(internal(
                command_buffer.command_buffer,
                format!(
                    "the lookup table of the command buffer could not be allocated: {}",
                    err,
                ),
            )),
        }

        for set_buffers in &command_buffer.sets {
            if let Some(Ok(allocation)) = set_buffers.descriptor_state {
                self.memory.free(allocation);
            }

            let records = match set_buffers.post_process {
                Ok(allocation) => {
                    let records = self
                        .memory
                        .read(
                            &allocation,
                            0,
                            set_buffers.descriptor_count as DeviceSize * PostProcessRecord::SIZE,
                        )
                        .map(|bytes| {
                            bytes
                                .chunks_exact(PostProcessRecord::SIZE as usize)
                                .map(bytemuck::pod_read_unaligned)
                                .collect()
                        });
                    self.memory.free(allocation);

                    records
                }
                Err(err) => Err(err),
            };

            read_back.push(ReadBack {
                set: set_buffers.set,
                records,
            });
        }

        read_back
    }

    fn release(&self, buffers: SubmissionBuffers) {
        for command_buffer in buffers.command_buffers {
            if let Ok(allocation) = command_buffer.lookup_table {
                self.memory.free(allocation);
            }

            for set_buffers in command_buffer.sets {
                if let Ok(allocation) = set_buffers.post_process {
                    self.memory.free(allocation);
                }

                if let Some(Ok(allocation)) = set_buffers.descriptor_state {
                    self.memory.free(allocation);
                }
            }
        }
    }

    /// Returns whether a submission that has not completed yet has a post-process buffer for
    /// `set`.
    pub(crate) fn is_instrumented(&self, set: vk::DescriptorSet) -> bool {
        self.submissions.values().any(|buffers| {
            buffers.command_buffers.iter().any(|command_buffer| {
                command_buffer
                    .sets
                    .iter()
                    .any(|set_buffers| set_buffers.set == set && set_buffers.post_process.is_ok())
            })
        })
    }

    /// Returns the post-process buffer of `set` for `command_buffer` in `submission`.
    pub(crate) fn post_process_buffer(
        &self,
        submission: SubmissionId,
        command_buffer: vk::CommandBuffer,
        set: vk::DescriptorSet,
    ) -> Option<DeviceAllocation> {
        self.command_buffer_buffers(submission, command_buffer)?
            .sets
            .iter()
            .find(|set_buffers| set_buffers.set == set)?
            .post_process
            .ok()
    }

    /// Returns the lookup table of `command_buffer` in `submission`. Entry
    /// `action_index * width + set_num` holds the device address of the post-process buffer that
    /// the action writes to for that set number, or zero.
    pub(crate) fn lookup_table(
        &self,
        submission: SubmissionId,
        command_buffer: vk::CommandBuffer,
    ) -> Option<DeviceAllocation> {
        self.command_buffer_buffers(submission, command_buffer)?
            .lookup_table
            .ok()
    }

    fn command_buffer_buffers(
        &self,
        submission: SubmissionId,
        command_buffer: vk::CommandBuffer,
    ) -> Option<&CommandBufferBuffers> {
        self.submissions
            .get(&submission)?
            .command_buffers
            .iter()
            .find(|buffers| buffers.command_buffer == command_buffer)
    }
}

impl Drop for GpuAssistedValidator {
    fn drop(&mut self) {
        for (_, buffers) in std::mem::take(&mut self.submissions) {
            self.release(buffers);
        }
    }
}

/// *Decode*: resolves each accessed slot to the descriptor that it stands for.
fn decode<'a>(
    command_buffer: &'a CommandBufferBuffers,
    read_back: &[ReadBack],
    sets: &HashMap<vk::DescriptorSet, DescriptorSet>,
    findings: &mut Vec<Finding>,
) -> Vec<DecodedAccess<'a>> {
    let mut accesses = Vec::new();
    let cb = command_buffer.command_buffer;

    for ReadBack { set, records } in read_back {
        let set = *set;

        let records = match records {
            Ok(records) => records,
            Err(err) => {
                findings.push(
                    internal(
                        cb,
                        format!(
                            "the post-process buffer of the descriptor set could not be used, \
                            its dynamic accesses were not validated: {}",
                            err,
                        ),
                    )
                    .with_object(set),
                );
                continue;
            }
        };

        let Some(set_state) = sets.get(&set) else {
            // Freeing a set that is in use is reported when it happens.
            continue;
        };

        for (slot, record) in records.iter().enumerate() {
            if record.accessed == 0 {
                continue;
            }

            match decode_record(command_buffer, set, set_state, slot as u32, record) {
                Ok(access) => accesses.push(access),
                Err(problem) => findings.push(internal(cb, problem).with_object(set)),
            }
        }
    }

    accesses
}

fn decode_record<'a>(
    command_buffer: &'a CommandBufferBuffers,
    set: vk::DescriptorSet,
    set_state: &DescriptorSet,
    slot: u32,
    record: &PostProcessRecord,
) -> Result<DecodedAccess<'a>, String> {
    let action = command_buffer
        .actions
        .get(record.action_index as usize)
        .ok_or_else(|| {
            format!(
                "record {} names action command {}, but the command buffer only has {}",
                slot,
                record.action_index,
                command_buffer.actions.len(),
            )
        })?;
    let shader = action
        .pipeline
        .iter()
        .flat_map(|pipeline| pipeline.shaders())
        .find(|shader| shader.shader_id == record.shader_id)
        .ok_or_else(|| {
            format!(
                "record {} names shader id {}, which is not part of the pipeline of action \
                command {}",
                slot, record.shader_id, record.action_index,
            )
        })?;
    let variable = shader
        .instrumented_variables
        .get(&record.variable_id)
        .ok_or_else(|| {
            format!(
                "record {} names variable id {}, which is not an instrumented variable of shader \
                id {}",
                slot, record.variable_id, record.shader_id,
            )
        })?;

    if !action
        .sets
        .iter()
        .any(|&(set_num, handle)| set_num == variable.set && handle == set)
    {
        return Err(format!(
            "record {} was written to the post-process buffer of a descriptor set that action \
            command {} did not access as set {}",
            slot, record.action_index, variable.set,
        ));
    }

    let (binding, index) = set_state
        .locate(slot)
        .filter(|&(binding, _)| binding == variable.binding)
        .ok_or_else(|| {
            format!(
                "record {} does not correspond to a descriptor of binding {}",
                slot, variable.binding,
            )
        })?;

    Ok(DecodedAccess {
        action,
        set_num: variable.set,
        set,
        binding,
        index,
    })
}

fn attribution(command_buffer: &CommandBufferBuffers, action_index: u32) -> ActionAttribution {
    ActionAttribution {
        command_buffer: command_buffer.command_buffer,
        action_index,
        debug_label: command_buffer
            .actions
            .get(action_index as usize)
            .and_then(|action| action.debug_label.clone()),
    }
}

fn internal(command_buffer: vk::CommandBuffer, problem: String) -> Finding {
    Finding::new(
        FindingKind::Internal,
        Box::new(ValidationError {
            context: "gpu_assisted".into(),
            problem: problem.into(),
            ..Default::default()
        }),
    )
    .with_object(command_buffer)
}

#[cfg(test)]
mod tests {
    use super::{PostProcessRecord, SubmissionId};
    use crate::{
        command_buffer::ActionKind,
        descriptor_set::layout::{
            DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo, DescriptorType,
        },
        gpu_assisted::memory::DeviceMemoryService,
        pipeline::PipelineBindPoint,
        shader::{InstrumentedVariable, ShaderStage, ShaderStages},
        tests::{binding_requirements, reflection, setup_single_set},
    };

    #[test]
    fn deferred_access_is_validated_once() {
        let (validator, _resources, collector, memory) = test_gpu_validator!();

        let mut shader = reflection(
            1,
            ShaderStage::Compute,
            [(
                (0, 0),
                binding_requirements(
                    DescriptorType::StorageBuffer,
                    None,
                    ShaderStages::COMPUTE,
                    &[None],
                ),
            )],
        );
        shader
            .instrumented_variables
            .insert(7, InstrumentedVariable { set: 0, binding: 0 });

        let objects = setup_single_set(
            &validator,
            DescriptorSetLayoutCreateInfo {
                bindings: [(
                    0,
                    DescriptorSetLayoutBinding {
                        descriptor_count: 4,
                        stages: ShaderStages::COMPUTE,
                        ..DescriptorSetLayoutBinding::descriptor_type(
                            DescriptorType::StorageBuffer,
                        )
                    },
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            },
            PipelineBindPoint::Compute,
            vec![shader],
        );
        let command_buffer = objects.command_buffer;

        assert!(!validator.cmd_bind_descriptor_sets(
            command_buffer,
            PipelineBindPoint::Compute,
            objects.pipeline_layout,
            0,
            &[objects.set],
            &[],
        ));
        assert!(!validator.cmd_action(command_buffer, ActionKind::Dispatch));
        assert!(!validator.cmd_action(command_buffer, ActionKind::Dispatch));
        assert!(!validator.end_command_buffer(command_buffer));

        let submission = SubmissionId(1);
        assert!(!validator.queue_submit(submission, &[command_buffer]));
        assert!(validator.descriptor_set_status(objects.set).unwrap().instrumented);

        // What the instrumented shader writes when action 1 accesses element 2.
        let buffer = validator
            .post_process_buffer(submission, command_buffer, objects.set)
            .unwrap();
        let record = PostProcessRecord {
            accessed: 1,
            shader_id: 1,
            action_index: 1,
            variable_id: 7,
        };
        memory
            .write(&buffer, 2 * PostProcessRecord::SIZE, bytemuck::bytes_of(&record))
            .unwrap();

        assert!(collector.is_empty());
        validator.submission_completed(submission);
        assert!(validator.process_completed_submissions());

        let findings = collector.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].id(), "VUID-vkCmdDispatch-None-08114");
        assert_eq!(findings[0].action.as_ref().unwrap().action_index, 1);
        assert!(findings[0].message().contains("binding 0 index 2"));

        assert_eq!(memory.live_allocations(), 0);
        assert!(!validator.descriptor_set_status(objects.set).unwrap().instrumented);

        // Completion is only processed once.
        validator.submission_completed(submission);
        assert!(!validator.process_completed_submissions());
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn unknown_variable_is_internal() {
        let (validator, _resources, collector, memory) = test_gpu_validator!();

        let mut shader = reflection(
            3,
            ShaderStage::Compute,
            [(
                (0, 0),
                binding_requirements(
                    DescriptorType::StorageBuffer,
                    None,
                    ShaderStages::COMPUTE,
                    &[None],
                ),
            )],
        );
        shader
            .instrumented_variables
            .insert(1, InstrumentedVariable { set: 0, binding: 0 });

        let objects = setup_single_set(
            &validator,
            DescriptorSetLayoutCreateInfo {
                bindings: [(
                    0,
                    DescriptorSetLayoutBinding {
                        descriptor_count: 2,
                        stages: ShaderStages::COMPUTE,
                        ..DescriptorSetLayoutBinding::descriptor_type(
                            DescriptorType::StorageBuffer,
                        )
                    },
                )]
                .into_iter()
                .collect(),
                ..Default::default()
            },
            PipelineBindPoint::Compute,
            vec![shader],
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
        assert!(!validator.queue_submit(SubmissionId(5), &[objects.command_buffer]));

        let buffer = validator
            .post_process_buffer(SubmissionId(5), objects.command_buffer, objects.set)
            .unwrap();
        let record = PostProcessRecord {
            accessed: 1,
            shader_id: 3,
            action_index: 0,
            variable_id: 9,
        };
        memory
            .write(&buffer, 0, bytemuck::bytes_of(&record))
            .unwrap();

        validator.submission_completed(SubmissionId(5));
        assert!(validator.process_completed_submissions());

        let findings = collector.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, crate::finding::FindingKind::Internal);
        assert!(findings[0].message().contains("variable id 9"));
        assert_eq!(memory.live_allocations(), 0);
    }
}
