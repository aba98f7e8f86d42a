//! The state of command buffers, as far as descriptors are concerned.
//!
//! For each of its pipeline bind points, a command buffer has a bound pipeline, the pipeline
//! layout that the last descriptor sets were bound with, and the bound descriptor sets. Bind
//! commands change this state, and action commands (draws, dispatches and ray tracing commands)
//! check the descriptors that the bound pipeline accesses against it.
//!
//! Action commands are numbered from zero within a command buffer. Findings that are raised
//! after the command buffer was submitted name the action command that caused them, along with
//! the debug label region that was active when it was recorded.

pub use self::{
    action::ActionKind,
    bind::{BindDescriptorSetsInfo, DescriptorBufferBindingInfo},
};
use crate::{
    descriptor_set::{layout::DescriptorSetLayout, DescriptorSet},
    finding::{ActionAttribution, Finding, FindingKind},
    pipeline::{layout::PipelineLayout, Pipeline, PipelineBindPoint},
    validator::Facts,
    DeviceSize, ValidationError,
};
use ash::vk;
use foldhash::{HashMap, HashSet};
use smallvec::SmallVec;
use std::sync::Arc;

pub(crate) mod action;
pub(crate) mod bind;

/// Everything that is tracked about one command buffer.
#[derive(Debug)]
pub(crate) struct CommandBufferState {
    handle: vk::CommandBuffer,
    pub(crate) status: CommandBufferStatus,
    pub(crate) bind_points: [BindPointState; PipelineBindPoint::COUNT_TRACKED],
    pub(crate) label_stack: Vec<String>,
    pub(crate) actions: Vec<ActionRecord>,

    /// Every allocated set that was bound since recording began.
    pub(crate) referenced_sets: HashSet<vk::DescriptorSet>,

    pub(crate) descriptor_buffers: SmallVec<[DescriptorBufferBindingInfo; 2]>,
    pub(crate) deferred_checks: Vec<DeferredCheck>,
}

impl CommandBufferState {
    pub(crate) fn new(handle: vk::CommandBuffer) -> Self {
        CommandBufferState {
            handle,
            status: CommandBufferStatus::Initial,
            bind_points: Default::default(),
            label_stack: Vec::new(),
            actions: Vec::new(),
            referenced_sets: HashSet::default(),
            descriptor_buffers: SmallVec::new(),
            deferred_checks: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// Returns the command buffer to the initial state, forgetting everything that was recorded.
    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.handle);
    }

    /// Resets the command buffer and starts recording.
    pub(crate) fn begin(&mut self) {
        self.reset();
        self.status = CommandBufferStatus::Recording;
    }

    pub(crate) fn end(&mut self) {
        if self.status == CommandBufferStatus::Recording {
            self.status = CommandBufferStatus::Executable;
        }
    }

    /// Marks the command buffer as invalid, because `cause` was updated or freed while the
    /// command buffer was using it.
    pub(crate) fn invalidate(&mut self, cause: vk::DescriptorSet) {
        if matches!(
            self.status,
            CommandBufferStatus::Recording | CommandBufferStatus::Executable,
        ) {
            self.status = CommandBufferStatus::Invalid { cause };
        }
    }

    #[inline]
    pub(crate) fn bind_point(&self, bind_point: PipelineBindPoint) -> &BindPointState {
        &self.bind_points[bind_point.index()]
    }

    #[inline]
    pub(crate) fn bind_point_mut(&mut self, bind_point: PipelineBindPoint) -> &mut BindPointState {
        &mut self.bind_points[bind_point.index()]
    }

    /// Returns the innermost debug label region that is currently open.
    #[inline]
    pub(crate) fn current_label(&self) -> Option<String> {
        self.label_stack.last().cloned()
    }

    /// Returns a finding about the command buffer.
    pub(crate) fn finding(&self, kind: FindingKind, error: Box<ValidationError>) -> Finding {
        Finding::new(kind, error).with_object(self.handle)
    }

    /// Returns the attribution of findings to the action command with the given index.
    pub(crate) fn attribution(&self, action_index: u32) -> ActionAttribution {
        ActionAttribution {
            command_buffer: self.handle,
            action_index,
            debug_label: self
                .actions
                .get(action_index as usize)
                .and_then(|action| action.debug_label.clone()),
        }
    }

    /// Runs the checks that were deferred to submission time, because the descriptors could
    /// still be updated after the action command was recorded.
    pub(crate) fn validate_deferred(
        &self,
        sets: &HashMap<vk::DescriptorSet, DescriptorSet>,
        facts: &Facts<'_>,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();

        for check in &self.deferred_checks {
            let Some(set) = sets.get(&check.set) else {
                findings.push(
                    self.finding(
                        FindingKind::Structural,
                        Box::new(ValidationError {
                            problem: format!(
                                "the descriptor set bound to set {} has been freed since \
                                action command {} was recorded",
                                check.set_num, check.action_index,
                            )
                            .into(),
                            vuids: action::unwritten_vuids(check.kind),
                            ..Default::default()
                        }),
                    )
                    .with_object(check.set)
                    .with_action(self.attribution(check.action_index)),
                );
                continue;
            };

            for &index in &check.indices {
                for (kind, error) in action::validate_descriptor_access(
                    check.kind,
                    set,
                    check.set_num,
                    check.binding,
                    index,
                    facts,
                ) {
                    findings.push(
                        self.finding(kind, error)
                            .with_object(check.set)
                            .with_action(self.attribution(check.action_index)),
                    );
                }
            }
        }

        findings
    }
}

/// The lifecycle of a command buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandBufferStatus {
    Initial,
    Recording,
    Executable,

    /// A descriptor set that the command buffer uses was updated or freed.
    Invalid { cause: vk::DescriptorSet },
}

/// The state of one pipeline bind point of a command buffer.
#[derive(Debug, Default)]
pub(crate) struct BindPointState {
    pub(crate) pipeline: Option<Arc<Pipeline>>,
    pub(crate) pipeline_layout: Option<Arc<PipelineLayout>>,

    /// Indexed by set number.
    pub(crate) sets: Vec<Option<BoundSet>>,
}

impl BindPointState {
    #[inline]
    pub(crate) fn set(&self, set_num: u32) -> Option<&BoundSet> {
        self.sets.get(set_num as usize)?.as_ref()
    }

    /// Switches to `pipeline_layout` for binding descriptor sets.
    ///
    /// If the push constant ranges differ, every bound set is disturbed. Otherwise, the sets
    /// from the first slot whose layout is not compatible onwards are disturbed.
    pub(crate) fn invalidate_descriptor_sets(&mut self, pipeline_layout: &Arc<PipelineLayout>) {
        let invalidate_from = match &self.pipeline_layout {
            None => Some(0),
            Some(current) if current == pipeline_layout => None,
            Some(current) => current.first_incompatible_set(pipeline_layout),
        };

        if let Some(invalidate_from) = invalidate_from {
            self.sets.truncate(invalidate_from as usize);
        }

        self.pipeline_layout = Some(pipeline_layout.clone());
    }

    pub(crate) fn bind(&mut self, set_num: u32, set: BoundSet) {
        let index = set_num as usize;

        if self.sets.len() <= index {
            self.sets.resize(index + 1, None);
        }

        self.sets[index] = Some(set);
    }
}

/// What is bound to one set number of a bind point.
#[derive(Clone, Debug)]
pub(crate) enum BoundSet {
    /// An allocated descriptor set.
    Set {
        set: vk::DescriptorSet,
        layout: Arc<DescriptorSetLayout>,
        dynamic_offsets: SmallVec<[u32; 4]>,
    },

    /// Descriptors that were pushed to the command buffer.
    Push { contents: Arc<DescriptorSet> },

    /// A range of a bound descriptor buffer.
    Buffer {
        layout: Arc<DescriptorSetLayout>,
        buffer_index: u32,
        offset: DeviceSize,
    },

    /// The embedded immutable samplers of a layout.
    EmbeddedSamplers { layout: Arc<DescriptorSetLayout> },
}

impl BoundSet {
    pub(crate) fn layout(&self) -> &Arc<DescriptorSetLayout> {
        match self {
            BoundSet::Set { layout, .. }
            | BoundSet::Buffer { layout, .. }
            | BoundSet::EmbeddedSamplers { layout } => layout,
            BoundSet::Push { contents } => contents.layout(),
        }
    }
}

/// An action command that was recorded.
#[derive(Clone, Debug)]
pub(crate) struct ActionRecord {
    pub(crate) index: u32,
    pub(crate) kind: ActionKind,
    pub(crate) debug_label: Option<String>,

    /// The pipeline that was bound, if any. Actions without a pipeline are still numbered.
    pub(crate) pipeline: Option<Arc<Pipeline>>,

    /// The allocated sets that the pipeline accesses, by set number.
    pub(crate) sets: SmallVec<[(u32, vk::DescriptorSet); 4]>,
}

/// Descriptors of an update-after-bind binding that an action command accesses, which are
/// checked when the command buffer is submitted.
#[derive(Clone, Debug)]
pub(crate) struct DeferredCheck {
    pub(crate) action_index: u32,
    pub(crate) kind: ActionKind,
    pub(crate) set_num: u32,
    pub(crate) set: vk::DescriptorSet,
    pub(crate) binding: u32,
    pub(crate) indices: SmallVec<[u32; 4]>,
}
