use crate::{
    command_buffer::{
        bind::{BindCommand, PushCommand},
        ActionKind, BindDescriptorSetsInfo, CommandBufferState, CommandBufferStatus,
        DescriptorBufferBindingInfo,
    },
    descriptor_set::{
        layout::{
            DescriptorSetLayout, DescriptorSetLayoutCreateInfo, LayoutDefinition, LayoutDictionary,
        },
        pool::{DescriptorPool, DescriptorPoolCreateInfo, DescriptorSetAllocateInfo},
        template::{
            DescriptorUpdateTemplate, DescriptorUpdateTemplateCreateInfo,
            DescriptorUpdateTemplateType,
        },
        update::{allowed_while_bound, CopyDescriptorSet, Span, WriteDescriptorSet},
        DescriptorSet,
    },
    device::DeviceInfo,
    finding::{Finding, FindingKind, FindingSink, Reporter, Severity},
    gpu_assisted::{
        memory::{DeviceAllocation, DeviceMemoryService},
        DescriptorSetStatus, GpuAssistedValidator, SubmissionId,
    },
    pipeline::{
        layout::{PipelineLayout, PipelineLayoutCreateInfo},
        Pipeline, PipelineBindPoint, PipelineCreateInfo,
    },
    resources::ResourceTracker,
    shader::ShaderReflection,
    DeviceSize, Requires, RequiresAllOf, RequiresOneOf, ValidationError,
};
use ash::vk;
use crossbeam_queue::SegQueue;
use foldhash::{HashMap, HashSet};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{borrow::Cow, sync::Arc};

/// The facts about the device and its resources that checks read.
#[derive(Clone, Copy)]
pub(crate) struct Facts<'a> {
    pub(crate) device: &'a DeviceInfo,
    pub(crate) resources: &'a dyn ResourceTracker,
}

/// Settings that control which validation is performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationSettings {
    /// Validate descriptors that shaders access through an index that is only known during
    /// execution, by instrumenting the shaders and reading back what they accessed.
    ///
    /// This requires a [`DeviceMemoryService`] and the `buffer_device_address` feature.
    ///
    /// The default value is `false`.
    pub gpu_assisted: bool,

    /// With GPU-assisted validation, also give the device a copy of which descriptors of
    /// update-after-bind sets are written at submission.
    ///
    /// The default value is `false`.
    pub gpu_assisted_descriptor_state: bool,

    /// Report findings with [`Severity::Advisory`] to the sink.
    ///
    /// The default value is `true`.
    pub report_advisory: bool,

    pub _ne: crate::NonExhaustive,
}

impl Default for ValidationSettings {
    #[inline]
    fn default() -> Self {
        Self {
            gpu_assisted: false,
            gpu_assisted_descriptor_state: false,
            report_advisory: true,
            _ne: crate::NonExhaustive(()),
        }
    }
}

/// Parameters to create a new `DescriptorValidator`.
#[derive(Clone)]
pub struct DescriptorValidatorCreateInfo {
    /// The device that the validator validates calls for.
    ///
    /// The default value is a Vulkan 1.0 device without features or extensions.
    pub device: DeviceInfo,

    /// The default value is `ValidationSettings::default()`.
    pub settings: ValidationSettings,

    /// The service that GPU-assisted validation allocates its buffers with.
    ///
    /// The default value is `None`.
    pub memory_service: Option<Arc<dyn DeviceMemoryService>>,

    pub _ne: crate::NonExhaustive,
}

impl Default for DescriptorValidatorCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            device: DeviceInfo::default(),
            settings: ValidationSettings::default(),
            memory_service: None,
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl DescriptorValidatorCreateInfo {
    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        let &Self {
            ref device,
            settings,
            ref memory_service,
            _ne: _,
        } = self;

        if settings.gpu_assisted {
            if memory_service.is_none() {
                return Err(Box::new(ValidationError {
                    problem: "`settings.gpu_assisted` is `true`, but `memory_service` is `None`"
                        .into(),
                    ..Default::default()
                }));
            }

            if !device.enabled_features().buffer_device_address {
                return Err(Box::new(ValidationError {
                    context: "settings.gpu_assisted".into(),
                    problem: "is `true`".into(),
                    requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                        "buffer_device_address",
                    )])]),
                    ..Default::default()
                }));
            }
        }

        if settings.gpu_assisted_descriptor_state && !settings.gpu_assisted {
            return Err(Box::new(ValidationError {
                problem: "`settings.gpu_assisted_descriptor_state` is `true`, but \
                    `settings.gpu_assisted` is `false`"
                    .into(),
                ..Default::default()
            }));
        }

        Ok(())
    }
}

/// The descriptor validation context of one device.
///
/// Every method that corresponds to an intercepted call returns `true` if an error was reported
/// while handling it. Advisory findings don't count. The state that the validator tracks is
/// updated even if the call was invalid, the same way the driver would see it.
pub struct DescriptorValidator {
    device: DeviceInfo,
    settings: ValidationSettings,
    resources: Arc<dyn ResourceTracker>,
    sink: Arc<dyn FindingSink>,
    state: Mutex<State>,
    completed_submissions: SegQueue<SubmissionId>,
}

#[derive(Default)]
struct State {
    layouts: HashMap<vk::DescriptorSetLayout, Arc<DescriptorSetLayout>>,
    layout_dictionary: LayoutDictionary,
    pools: HashMap<vk::DescriptorPool, DescriptorPool>,
    sets: HashMap<vk::DescriptorSet, DescriptorSet>,
    pipeline_layouts: HashMap<vk::PipelineLayout, Arc<PipelineLayout>>,
    shaders: HashMap<u32, Arc<ShaderReflection>>,
    pipelines: HashMap<vk::Pipeline, Arc<Pipeline>>,
    templates: HashMap<vk::DescriptorUpdateTemplate, DescriptorUpdateTemplate>,
    command_buffers: HashMap<vk::CommandBuffer, CommandBufferState>,
    pending: HashMap<SubmissionId, PendingSubmission>,
    gpu: Option<GpuAssistedValidator>,
}

/// A submission that has not completed yet.
struct PendingSubmission {
    command_buffers: SmallVec<[vk::CommandBuffer; 4]>,
    sets: HashSet<vk::DescriptorSet>,
}

impl State {
    fn is_set_pending(&self, set: vk::DescriptorSet) -> bool {
        self.pending
            .values()
            .any(|submission| submission.sets.contains(&set))
    }

    fn is_command_buffer_pending(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.pending
            .values()
            .any(|submission| submission.command_buffers.contains(&command_buffer))
    }

    /// Invalidates the command buffers that have `set` bound.
    fn invalidate_users_of(&mut self, set: vk::DescriptorSet) {
        for command_buffer in self.command_buffers.values_mut() {
            if command_buffer.referenced_sets.contains(&set) {
                command_buffer.invalidate(set);
            }
        }
    }

    /// Forgets `set`, which was freed, and everything that depends on it.
    fn forget_set(&mut self, set: vk::DescriptorSet) {
        self.invalidate_users_of(set);
        self.sets.remove(&set);
    }
}

impl DescriptorValidator {
    /// Creates a new `DescriptorValidator`.
    ///
    /// `resources` provides the facts about the resources that descriptors refer to, and
    /// `sink` receives every finding.
    pub fn new(
        create_info: DescriptorValidatorCreateInfo,
        resources: Arc<dyn ResourceTracker>,
        sink: Arc<dyn FindingSink>,
    ) -> Result<Self, Box<ValidationError>> {
        create_info
            .validate()
            .map_err(|err| err.add_context("create_info"))?;

        let DescriptorValidatorCreateInfo {
            device,
            settings,
            memory_service,
            _ne: _,
        } = create_info;

        let gpu = memory_service
            .filter(|_| settings.gpu_assisted)
            .map(|memory| {
                GpuAssistedValidator::new(memory, settings.gpu_assisted_descriptor_state)
            });

        Ok(DescriptorValidator {
            device,
            settings,
            resources,
            sink,
            state: Mutex::new(State {
                gpu,
                ..Default::default()
            }),
            completed_submissions: SegQueue::new(),
        })
    }

    #[inline]
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    #[inline]
    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Runs `f` under the state lock, and returns whether it reported an error.
    fn run(&self, f: impl FnOnce(&mut State, &mut Reporter<'_>, &Facts<'_>)) -> bool {
        let facts = Facts {
            device: &self.device,
            resources: &*self.resources,
        };
        let mut reporter = Reporter::new(&*self.sink, self.settings.report_advisory);
        let mut state = self.state.lock();
        f(&mut *state, &mut reporter, &facts);

        reporter.error_raised()
    }

    /* Layouts */

    pub fn create_descriptor_set_layout(
        &self,
        handle: vk::DescriptorSetLayout,
        create_info: &DescriptorSetLayoutCreateInfo,
    ) -> bool {
        self.run(|state, reporter, facts| {
            for error in create_info.validate(facts.device) {
                reporter.report(
                    finding(error.add_context("create_info")).with_object(handle),
                );
            }

            match LayoutDefinition::from_create_info(create_info, facts.resources) {
                Ok(definition) => {
                    let definition = state.layout_dictionary.intern(definition);
                    state
                        .layouts
                        .insert(handle, Arc::new(DescriptorSetLayout::new(handle, definition)));
                }
                Err(error) => {
                    reporter.report(finding(error.add_context("create_info")).with_object(handle))
                }
            }
        })
    }

    pub fn destroy_descriptor_set_layout(&self, handle: vk::DescriptorSetLayout) -> bool {
        self.run(|state, _, _| {
            if let Some(layout) = state.layouts.remove(&handle) {
                layout.mark_destroyed();
                drop(layout);
                state.layout_dictionary.prune();
            }
        })
    }

    /* Pools and sets */

    pub fn create_descriptor_pool(
        &self,
        handle: vk::DescriptorPool,
        create_info: &DescriptorPoolCreateInfo,
    ) -> bool {
        self.run(|state, reporter, facts| {
            if let Err(error) = create_info.validate(facts.device) {
                reporter.report(finding(error.add_context("create_info")).with_object(handle));
            }

            state
                .pools
                .insert(handle, DescriptorPool::new(handle, create_info));
        })
    }

    pub fn destroy_descriptor_pool(&self, handle: vk::DescriptorPool) -> bool {
        self.run(|state, reporter, _| {
            let Some(mut pool) = state.pools.remove(&handle) else {
                return;
            };

            let sets = pool.reset();

            if sets.iter().any(|&set| state.is_set_pending(set)) {
                reporter.report(
                    Finding::new(
                        FindingKind::Structural,
                        Box::new(ValidationError {
                            context: "descriptor_pool".into(),
                            problem: "has descriptor sets that are in use by a submission that \
                                has not completed yet"
                                .into(),
                            vuids: &["VUID-vkDestroyDescriptorPool-descriptorPool-00303"],
                            ..Default::default()
                        }),
                    )
                    .with_object(handle),
                );
            }

            for set in sets {
                state.forget_set(set);
            }
        })
    }

    pub fn reset_descriptor_pool(&self, handle: vk::DescriptorPool) -> bool {
        self.run(|state, reporter, _| {
            let Some(pool) = state.pools.get_mut(&handle) else {
                reporter.report(unknown_handle(
                    "descriptor_pool",
                    "descriptor pool",
                    &["VUID-vkResetDescriptorPool-descriptorPool-parameter"],
                ));
                return;
            };

            let sets = pool.reset();

            if sets.iter().any(|&set| state.is_set_pending(set)) {
                reporter.report(
                    Finding::new(
                        FindingKind::Structural,
                        Box::new(ValidationError {
                            context: "descriptor_pool".into(),
                            problem: "has descriptor sets that are in use by a submission that \
                                has not completed yet"
                                .into(),
                            vuids: &["VUID-vkResetDescriptorPool-descriptorPool-00313"],
                            ..Default::default()
                        }),
                    )
                    .with_object(handle),
                );
            }

            for set in sets {
                state.forget_set(set);
            }
        })
    }

    /// Allocates descriptor sets. `descriptor_sets` are the handles that the driver returned,
    /// one for each element of `allocate_info.set_layouts`.
    pub fn allocate_descriptor_sets(
        &self,
        allocate_info: &DescriptorSetAllocateInfo,
        descriptor_sets: &[vk::DescriptorSet],
    ) -> bool {
        self.run(|state, reporter, facts| {
            let &DescriptorSetAllocateInfo {
                descriptor_pool,
                ref set_layouts,
                ref variable_descriptor_counts,
                _ne: _,
            } = allocate_info;

            let Some(pool) = state.pools.get_mut(&descriptor_pool) else {
                reporter.report(unknown_handle(
                    "allocate_info.descriptor_pool",
                    "descriptor pool",
                    &["VUID-VkDescriptorSetAllocateInfo-descriptorPool-parameter"],
                ));
                return;
            };

            let mut layouts = Vec::with_capacity(set_layouts.len());

            for (index, handle) in set_layouts.iter().enumerate() {
                let Some(layout) = state.layouts.get(handle) else {
                    reporter.report(unknown_handle(
                        format!("allocate_info.set_layouts[{}]", index),
                        "descriptor set layout",
                        &["VUID-VkDescriptorSetAllocateInfo-pSetLayouts-parameter"],
                    ));
                    return;
                };

                layouts.push(layout.clone());
            }

            if descriptor_sets.len() != layouts.len() {
                reporter.report(Finding::new(
                    FindingKind::Structural,
                    Box::new(ValidationError {
                        problem: "the number of descriptor sets does not equal the length of \
                            `allocate_info.set_layouts`"
                            .into(),
                        ..Default::default()
                    }),
                ));
                return;
            }

            if let Err(error) = pool.validate_allocate(&layouts, variable_descriptor_counts) {
                reporter.report(
                    finding(error.add_context("allocate_info")).with_object(descriptor_pool),
                );
            }

            let recoverable = facts.device.pool_exhaustion_is_recoverable();

            if let Some(error) =
                pool.check_capacity(&layouts, variable_descriptor_counts, recoverable)
            {
                reporter.report(
                    Finding::new(FindingKind::Capacity, error)
                        .with_severity(if recoverable {
                            Severity::Advisory
                        } else {
                            Severity::Error
                        })
                        .with_object(descriptor_pool),
                );
            }

            for (index, (&handle, layout)) in descriptor_sets.iter().zip(layouts).enumerate() {
                let set = DescriptorSet::new(
                    handle,
                    descriptor_pool,
                    pool.flags(),
                    layout,
                    variable_descriptor_counts.get(index).copied().unwrap_or(0),
                );
                pool.allocate(&set);
                state.sets.insert(handle, set);
            }
        })
    }

    pub fn free_descriptor_sets(
        &self,
        descriptor_pool: vk::DescriptorPool,
        descriptor_sets: &[vk::DescriptorSet],
    ) -> bool {
        self.run(|state, reporter, _| {
            if !state.pools.contains_key(&descriptor_pool) {
                reporter.report(unknown_handle(
                    "descriptor_pool",
                    "descriptor pool",
                    &["VUID-vkFreeDescriptorSets-descriptorPool-parameter"],
                ));
                return;
            }

            for (index, &handle) in descriptor_sets.iter().enumerate() {
                if handle == vk::DescriptorSet::null() {
                    continue;
                }

                let pool = &state.pools[&descriptor_pool];

                if let Err(error) = pool.validate_free(handle) {
                    reporter.report(finding(error).with_object(handle));
                    continue;
                }

                if state.is_set_pending(handle) {
                    reporter.report(
                        Finding::new(
                            FindingKind::Structural,
                            Box::new(ValidationError {
                                context: format!("descriptor_sets[{}]", index).into(),
                                problem: "is in use by a submission that has not completed yet"
                                    .into(),
                                vuids: &["VUID-vkFreeDescriptorSets-pDescriptorSets-00309"],
                                ..Default::default()
                            }),
                        )
                        .with_object(handle),
                    );
                }

                if let Some(set) = state.sets.get(&handle) {
                    if let Some(pool) = state.pools.get_mut(&descriptor_pool) {
                        pool.free(set);
                    }
                }

                state.forget_set(handle);
            }
        })
    }

    /* Updates */

    pub fn update_descriptor_sets(
        &self,
        descriptor_writes: &[WriteDescriptorSet],
        descriptor_copies: &[CopyDescriptorSet],
    ) -> bool {
        self.run(|state, reporter, facts| {
            apply_writes(state, reporter, facts, descriptor_writes, "descriptor_writes");

            for (index, copy) in descriptor_copies.iter().enumerate() {
                let context = format!("descriptor_copies[{}]", index);

                let (Some(src_set), Some(dst_set)) =
                    (state.sets.get(&copy.src_set), state.sets.get(&copy.dst_set))
                else {
                    let which = if state.sets.contains_key(&copy.src_set) {
                        "dst_set"
                    } else {
                        "src_set"
                    };
                    reporter.report(unknown_handle(
                        format!("{}.{}", context, which),
                        "descriptor set",
                        if which == "src_set" {
                            &["VUID-VkCopyDescriptorSet-srcSet-parameter"]
                        } else {
                            &["VUID-VkCopyDescriptorSet-dstSet-parameter"]
                        },
                    ));
                    continue;
                };

                let validated = match copy.validate(src_set, dst_set) {
                    Ok(validated) => validated,
                    Err(error) => {
                        reporter.report(
                            finding(error.add_context(context))
                                .with_object(copy.src_set)
                                .with_object(copy.dst_set),
                        );
                        continue;
                    }
                };

                let descriptors = validated.read(src_set);
                check_in_use(state, reporter, copy.dst_set, &validated.dst_span);

                if let Some(dst_set) = state.sets.get_mut(&copy.dst_set) {
                    dst_set.record_copy(&validated, descriptors);
                }
            }
        })
    }

    pub fn create_descriptor_update_template(
        &self,
        handle: vk::DescriptorUpdateTemplate,
        create_info: &DescriptorUpdateTemplateCreateInfo,
    ) -> bool {
        self.run(|state, reporter, facts| {
            let set_layout = state.layouts.get(&create_info.descriptor_set_layout);
            let pipeline_layout = state.pipeline_layouts.get(&create_info.pipeline_layout);

            match create_info.validate(facts.device, set_layout, pipeline_layout.map(|l| &**l)) {
                Ok(layout) => {
                    state.templates.insert(
                        handle,
                        DescriptorUpdateTemplate::new(handle, create_info, layout),
                    );
                }
                Err(error) => {
                    reporter.report(finding(error.add_context("create_info")).with_object(handle))
                }
            }
        })
    }

    pub fn destroy_descriptor_update_template(&self, handle: vk::DescriptorUpdateTemplate) -> bool {
        self.run(|state, _, _| {
            state.templates.remove(&handle);
        })
    }

    /// Updates `descriptor_set` with the raw `data` that the template describes.
    pub fn update_descriptor_set_with_template(
        &self,
        descriptor_set: vk::DescriptorSet,
        descriptor_update_template: vk::DescriptorUpdateTemplate,
        data: &[u8],
    ) -> bool {
        self.run(|state, reporter, facts| {
            let Some(template) = state.templates.get(&descriptor_update_template) else {
                reporter.report(unknown_handle(
                    "descriptor_update_template",
                    "descriptor update template",
                    &["VUID-vkUpdateDescriptorSetWithTemplate-descriptorUpdateTemplate-parameter"],
                ));
                return;
            };

            if template.template_type() != DescriptorUpdateTemplateType::DescriptorSet {
                reporter.report(
                    Finding::new(
                        FindingKind::Structural,
                        Box::new(ValidationError {
                            context: "descriptor_update_template".into(),
                            problem: "was not created with \
                                `DescriptorUpdateTemplateType::DescriptorSet`"
                                .into(),
                            ..Default::default()
                        }),
                    )
                    .with_object(descriptor_update_template),
                );
                return;
            }

            let writes = match template.decode(
                descriptor_set,
                data,
                &["VUID-vkUpdateDescriptorSetWithTemplate-pData-01685"],
            ) {
                Ok(writes) => writes,
                Err(error) => {
                    reporter.report(
                        finding(error.add_context("descriptor_update_template"))
                            .with_object(descriptor_update_template),
                    );
                    return;
                }
            };

            apply_writes(state, reporter, facts, &writes, "descriptor_update_template.entries");
        })
    }

    /* Pipelines */

    pub fn create_pipeline_layout(
        &self,
        handle: vk::PipelineLayout,
        create_info: &PipelineLayoutCreateInfo,
    ) -> bool {
        self.run(|state, reporter, facts| {
            let mut set_layouts = Vec::with_capacity(create_info.set_layouts.len());

            for (index, set_layout) in create_info.set_layouts.iter().enumerate() {
                if *set_layout == vk::DescriptorSetLayout::null() {
                    set_layouts.push(None);
                } else if let Some(set_layout) = state.layouts.get(set_layout) {
                    set_layouts.push(Some(set_layout.clone()));
                } else {
                    reporter.report(unknown_handle(
                        format!("create_info.set_layouts[{}]", index),
                        "descriptor set layout",
                        &["VUID-VkPipelineLayoutCreateInfo-pSetLayouts-parameter"],
                    ));
                    set_layouts.push(None);
                }
            }

            if let Err(error) = create_info.validate(facts.device, &set_layouts) {
                reporter.report(finding(error.add_context("create_info")).with_object(handle));
            }

            state.pipeline_layouts.insert(
                handle,
                Arc::new(PipelineLayout::new(handle, create_info, set_layouts)),
            );
        })
    }

    pub fn destroy_pipeline_layout(&self, handle: vk::PipelineLayout) -> bool {
        self.run(|state, _, _| {
            state.pipeline_layouts.remove(&handle);
        })
    }

    /// Registers the reflection of a shader, so that pipelines can be created from it.
    ///
    /// A reflection with the same `shader_id` as an earlier one replaces it.
    pub fn register_shader(&self, reflection: Arc<ShaderReflection>) -> bool {
        self.run(|state, _, _| {
            state.shaders.insert(reflection.shader_id, reflection);
        })
    }

    pub fn create_pipeline(&self, handle: vk::Pipeline, create_info: &PipelineCreateInfo) -> bool {
        self.run(|state, reporter, facts| {
            let &PipelineCreateInfo {
                bind_point,
                ref stages,
                layout,
                _ne: _,
            } = create_info;

            if let Err(error) = bind_point.validate_device(facts.device) {
                reporter.report(
                    finding(error.add_context("create_info.bind_point")).with_object(handle),
                );
                return;
            }

            let Some(layout) = state.pipeline_layouts.get(&layout) else {
                reporter.report(
                    unknown_handle("create_info.layout", "pipeline layout", &[])
                        .with_object(handle),
                );
                return;
            };

            let mut shaders = Vec::with_capacity(stages.len());

            for (index, shader_id) in stages.iter().enumerate() {
                let Some(shader) = state.shaders.get(shader_id) else {
                    reporter.report(
                        Finding::new(
                            FindingKind::Structural,
                            Box::new(ValidationError {
                                context: format!("create_info.stages[{}]", index).into(),
                                problem: "is not the id of a registered shader".into(),
                                ..Default::default()
                            }),
                        )
                        .with_object(handle),
                    );
                    return;
                };

                shaders.push(shader.clone());
            }

            match Pipeline::new(handle, bind_point, layout.clone(), shaders) {
                Ok(pipeline) => {
                    state.pipelines.insert(handle, Arc::new(pipeline));
                }
                Err(error) => {
                    reporter.report(finding(error.add_context("create_info")).with_object(handle))
                }
            }
        })
    }

    pub fn destroy_pipeline(&self, handle: vk::Pipeline) -> bool {
        self.run(|state, _, _| {
            state.pipelines.remove(&handle);
        })
    }

    /* Command buffers */

    pub fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.run(|state, reporter, _| {
            if state.is_command_buffer_pending(command_buffer) {
                reporter.report(
                    Finding::new(
                        FindingKind::Structural,
                        Box::new(ValidationError {
                            context: "command_buffer".into(),
                            problem: "is in use by a submission that has not completed yet"
                                .into(),
                            vuids: &["VUID-vkBeginCommandBuffer-commandBuffer-00049"],
                            ..Default::default()
                        }),
                    )
                    .with_object(command_buffer),
                );
            }

            state
                .command_buffers
                .entry(command_buffer)
                .or_insert_with(|| CommandBufferState::new(command_buffer))
                .begin();
        })
    }

    pub fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.run(|state, reporter, _| {
            if let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &["VUID-vkEndCommandBuffer-commandBuffer-00059"],
            ) {
                cb_state.end();
            }
        })
    }

    pub fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.run(|state, _, _| {
            if let Some(cb_state) = state.command_buffers.get_mut(&command_buffer) {
                cb_state.reset();
            }
        })
    }

    pub fn free_command_buffers(&self, command_buffers: &[vk::CommandBuffer]) -> bool {
        self.run(|state, _, _| {
            for command_buffer in command_buffers {
                state.command_buffers.remove(command_buffer);
            }
        })
    }

    pub fn cmd_bind_pipeline(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline_bind_point: PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) -> bool {
        self.run(|state, reporter, _| {
            let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &["VUID-vkCmdBindPipeline-commandBuffer-recording"],
            ) else {
                return;
            };

            let Some(pipeline) = state.pipelines.get(&pipeline) else {
                reporter.report(
                    unknown_handle(
                        "pipeline",
                        "pipeline",
                        &["VUID-vkCmdBindPipeline-pipeline-parameter"],
                    )
                    .with_object(command_buffer),
                );
                return;
            };

            if pipeline.bind_point() != pipeline_bind_point {
                reporter.report(cb_state.finding(
                    FindingKind::Structural,
                    Box::new(ValidationError {
                        problem: format!(
                            "`pipeline_bind_point` is `PipelineBindPoint::{:?}`, but `pipeline` \
                            is a pipeline of bind point `PipelineBindPoint::{:?}`",
                            pipeline_bind_point,
                            pipeline.bind_point(),
                        )
                        .into(),
                        vuids: match pipeline_bind_point {
                            PipelineBindPoint::Compute => {
                                &["VUID-vkCmdBindPipeline-pipelineBindPoint-00777"]
                            }
                            PipelineBindPoint::Graphics => {
                                &["VUID-vkCmdBindPipeline-pipelineBindPoint-00778"]
                            }
                            PipelineBindPoint::RayTracing => {
                                &["VUID-vkCmdBindPipeline-pipelineBindPoint-02392"]
                            }
                        },
                        ..Default::default()
                    }),
                ));
                return;
            }

            cb_state.bind_point_mut(pipeline_bind_point).pipeline = Some(pipeline.clone());
        })
    }

    pub fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline_bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) -> bool {
        self.run(|state, reporter, facts| {
            let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &["VUID-vkCmdBindDescriptorSets-commandBuffer-recording"],
            ) else {
                return;
            };

            if let Err(error) = pipeline_bind_point.validate_device(facts.device) {
                reporter.report(finding(
                    error
                        .add_context("pipeline_bind_point")
                        .set_vuids(&["VUID-vkCmdBindDescriptorSets-pipelineBindPoint-parameter"]),
                ));
                return;
            }

            let Some(layout) = state.pipeline_layouts.get(&layout) else {
                reporter.report(unknown_handle(
                    "layout",
                    "pipeline layout",
                    &["VUID-vkCmdBindDescriptorSets-layout-parameter"],
                ));
                return;
            };

            for finding in cb_state.bind_descriptor_sets(
                BindCommand::BindDescriptorSets,
                pipeline_bind_point,
                layout,
                first_set,
                descriptor_sets,
                dynamic_offsets,
                &state.sets,
                facts,
            ) {
                reporter.report(finding);
            }
        })
    }

    /// Binds descriptor sets to every bind point whose pipelines can contain one of
    /// `bind_descriptor_sets_info.stage_flags`.
    pub fn cmd_bind_descriptor_sets2(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_descriptor_sets_info: &BindDescriptorSetsInfo,
    ) -> bool {
        self.run(|state, reporter, facts| {
            let &BindDescriptorSetsInfo {
                stage_flags,
                layout,
                first_set,
                ref descriptor_sets,
                ref dynamic_offsets,
                _ne: _,
            } = bind_descriptor_sets_info;

            let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &["VUID-vkCmdBindDescriptorSets2KHR-commandBuffer-recording"],
            ) else {
                return;
            };

            if stage_flags.is_empty() {
                reporter.report(finding(Box::new(ValidationError {
                    context: "bind_descriptor_sets_info.stage_flags".into(),
                    problem: "is empty".into(),
                    vuids: &["VUID-VkBindDescriptorSetsInfoKHR-stageFlags-requiredbitmask"],
                    ..Default::default()
                })));
                return;
            }

            let Some(layout) = state.pipeline_layouts.get(&layout) else {
                reporter.report(unknown_handle(
                    "bind_descriptor_sets_info.layout",
                    "pipeline layout",
                    &["VUID-VkBindDescriptorSetsInfoKHR-layout-parameter"],
                ));
                return;
            };

            let bind_points = PipelineBindPoint::from_stages(stage_flags);

            for (index, bind_point) in bind_points
                .into_iter()
                .filter(|bind_point| bind_point.validate_device(facts.device).is_ok())
                .enumerate()
            {
                let findings = cb_state.bind_descriptor_sets(
                    BindCommand::BindDescriptorSets2,
                    bind_point,
                    layout,
                    first_set,
                    descriptor_sets,
                    dynamic_offsets,
                    &state.sets,
                    facts,
                );

                // The same sets are checked for every bind point.
                if index == 0 {
                    for finding in findings {
                        reporter.report(finding);
                    }
                }
            }
        })
    }

    pub fn cmd_push_descriptor_set(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline_bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: u32,
        descriptor_writes: &[WriteDescriptorSet],
    ) -> bool {
        self.run(|state, reporter, facts| {
            let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &["VUID-vkCmdPushDescriptorSetKHR-commandBuffer-recording"],
            ) else {
                return;
            };

            if let Err(error) = pipeline_bind_point.validate_device(facts.device) {
                reporter.report(finding(
                    error
                        .add_context("pipeline_bind_point")
                        .set_vuids(&["VUID-vkCmdPushDescriptorSetKHR-pipelineBindPoint-parameter"]),
                ));
                return;
            }

            let Some(layout) = state.pipeline_layouts.get(&layout) else {
                reporter.report(unknown_handle(
                    "layout",
                    "pipeline layout",
                    &["VUID-vkCmdPushDescriptorSetKHR-layout-parameter"],
                ));
                return;
            };

            for finding in cb_state.push_descriptor_set(
                PushCommand::PushDescriptorSet,
                pipeline_bind_point,
                layout,
                set,
                descriptor_writes,
                facts,
            ) {
                reporter.report(finding);
            }
        })
    }

    pub fn cmd_push_descriptor_set_with_template(
        &self,
        command_buffer: vk::CommandBuffer,
        descriptor_update_template: vk::DescriptorUpdateTemplate,
        layout: vk::PipelineLayout,
        set: u32,
        data: &[u8],
    ) -> bool {
        self.run(|state, reporter, facts| {
            let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &["VUID-vkCmdPushDescriptorSetWithTemplateKHR-commandBuffer-recording"],
            ) else {
                return;
            };

            let Some(template) = state.templates.get(&descriptor_update_template) else {
                reporter.report(unknown_handle(
                    "descriptor_update_template",
                    "descriptor update template",
                    &["VUID-vkCmdPushDescriptorSetWithTemplateKHR-descriptorUpdateTemplate-parameter"],
                ));
                return;
            };

            if template.template_type() != DescriptorUpdateTemplateType::PushDescriptors {
                reporter.report(cb_state.finding(
                    FindingKind::Structural,
                    Box::new(ValidationError {
                        context: "descriptor_update_template".into(),
                        problem: "was not created with \
                            `DescriptorUpdateTemplateType::PushDescriptors`"
                            .into(),
                        vuids: &[
                            "VUID-vkCmdPushDescriptorSetWithTemplateKHR-descriptorUpdateTemplate-07994",
                        ],
                        ..Default::default()
                    }),
                ));
                return;
            }

            let Some(layout) = state.pipeline_layouts.get(&layout) else {
                reporter.report(unknown_handle(
                    "layout",
                    "pipeline layout",
                    &["VUID-vkCmdPushDescriptorSetWithTemplateKHR-layout-parameter"],
                ));
                return;
            };

            let writes = match template.decode(
                vk::DescriptorSet::null(),
                data,
                &["VUID-vkCmdPushDescriptorSetWithTemplateKHR-pData-01686"],
            ) {
                Ok(writes) => writes,
                Err(error) => {
                    reporter.report(
                        finding(error.add_context("descriptor_update_template"))
                            .with_object(command_buffer),
                    );
                    return;
                }
            };

            for finding in cb_state.push_descriptor_set(
                PushCommand::PushDescriptorSetWithTemplate,
                template.pipeline_bind_point(),
                layout,
                set,
                &writes,
                facts,
            ) {
                reporter.report(finding);
            }
        })
    }

    pub fn cmd_bind_descriptor_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        binding_infos: &[DescriptorBufferBindingInfo],
    ) -> bool {
        self.run(|state, reporter, facts| {
            let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &["VUID-vkCmdBindDescriptorBuffersEXT-commandBuffer-recording"],
            ) else {
                return;
            };

            for finding in cb_state.bind_descriptor_buffers(binding_infos, facts.device) {
                reporter.report(finding);
            }
        })
    }

    pub fn cmd_set_descriptor_buffer_offsets(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline_bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        buffer_indices: &[u32],
        offsets: &[DeviceSize],
    ) -> bool {
        self.run(|state, reporter, facts| {
            let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &["VUID-vkCmdSetDescriptorBufferOffsetsEXT-commandBuffer-recording"],
            ) else {
                return;
            };

            let Some(layout) = state.pipeline_layouts.get(&layout) else {
                reporter.report(unknown_handle(
                    "layout",
                    "pipeline layout",
                    &["VUID-vkCmdSetDescriptorBufferOffsetsEXT-layout-parameter"],
                ));
                return;
            };

            for finding in cb_state.set_descriptor_buffer_offsets(
                pipeline_bind_point,
                layout,
                first_set,
                buffer_indices,
                offsets,
                facts.device,
            ) {
                reporter.report(finding);
            }
        })
    }

    pub fn cmd_bind_descriptor_buffer_embedded_samplers(
        &self,
        command_buffer: vk::CommandBuffer,
        pipeline_bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        set: u32,
    ) -> bool {
        self.run(|state, reporter, _| {
            let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &["VUID-vkCmdBindDescriptorBufferEmbeddedSamplersEXT-commandBuffer-recording"],
            ) else {
                return;
            };

            let Some(layout) = state.pipeline_layouts.get(&layout) else {
                reporter.report(unknown_handle(
                    "layout",
                    "pipeline layout",
                    &["VUID-vkCmdBindDescriptorBufferEmbeddedSamplersEXT-layout-parameter"],
                ));
                return;
            };

            for finding in
                cb_state.bind_descriptor_buffer_embedded_samplers(pipeline_bind_point, layout, set)
            {
                reporter.report(finding);
            }
        })
    }

    /// Records an action command: a draw, dispatch or ray tracing command.
    pub fn cmd_action(&self, command_buffer: vk::CommandBuffer, kind: ActionKind) -> bool {
        let gpu_assisted = self.settings.gpu_assisted;

        self.run(|state, reporter, facts| {
            let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &[],
            ) else {
                return;
            };

            for finding in cb_state.record_action(kind, &state.sets, facts, gpu_assisted) {
                reporter.report(finding);
            }
        })
    }

    pub fn cmd_begin_debug_utils_label(
        &self,
        command_buffer: vk::CommandBuffer,
        label_name: impl Into<String>,
    ) -> bool {
        self.run(|state, reporter, _| {
            if let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &["VUID-vkCmdBeginDebugUtilsLabelEXT-commandBuffer-recording"],
            ) {
                cb_state.label_stack.push(label_name.into());
            }
        })
    }

    pub fn cmd_end_debug_utils_label(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.run(|state, reporter, _| {
            let Some(cb_state) = recording(
                &mut state.command_buffers,
                command_buffer,
                reporter,
                &["VUID-vkCmdEndDebugUtilsLabelEXT-commandBuffer-recording"],
            ) else {
                return;
            };

            if cb_state.label_stack.pop().is_none() {
                reporter.report(cb_state.finding(
                    FindingKind::Structural,
                    Box::new(ValidationError {
                        problem: "there is no debug label region open in the command buffer"
                            .into(),
                        vuids: &["VUID-vkCmdEndDebugUtilsLabelEXT-commandBuffer-01912"],
                        ..Default::default()
                    }),
                ));
            }
        })
    }

    /* Submission */

    /// Submits `command_buffers` for execution, as one submission identified by `submission`.
    pub fn queue_submit(
        &self,
        submission: SubmissionId,
        command_buffers: &[vk::CommandBuffer],
    ) -> bool {
        self.run(|state, reporter, facts| {
            let State {
                sets,
                command_buffers: cb_states,
                pending,
                gpu,
                ..
            } = state;

            let mut submitted = Vec::with_capacity(command_buffers.len());
            let mut pending_sets = HashSet::default();

            for (index, command_buffer) in command_buffers.iter().enumerate() {
                let Some(cb_state) = cb_states.get(command_buffer) else {
                    reporter.report(unknown_handle(
                        format!("command_buffers[{}]", index),
                        "command buffer",
                        &["VUID-VkSubmitInfo-pCommandBuffers-parameter"],
                    ));
                    continue;
                };

                match cb_state.status {
                    CommandBufferStatus::Executable => (),
                    CommandBufferStatus::Invalid { cause } => {
                        reporter.report(
                            cb_state
                                .finding(
                                    FindingKind::Structural,
                                    Box::new(ValidationError {
                                        context: format!("command_buffers[{}]", index).into(),
                                        problem: "is invalid, because a descriptor set that it \
                                            uses was updated or freed after it was recorded"
                                            .into(),
                                        vuids: &["VUID-vkQueueSubmit-pCommandBuffers-00070"],
                                        ..Default::default()
                                    }),
                                )
                                .with_object(cause),
                        );
                    }
                    CommandBufferStatus::Initial | CommandBufferStatus::Recording => {
                        reporter.report(cb_state.finding(
                            FindingKind::Structural,
                            Box::new(ValidationError {
                                context: format!("command_buffers[{}]", index).into(),
                                problem: "is not in the executable state".into(),
                                vuids: &["VUID-vkQueueSubmit-pCommandBuffers-00070"],
                                ..Default::default()
                            }),
                        ));
                        continue;
                    }
                }

                for finding in cb_state.validate_deferred(sets, facts) {
                    reporter.report(finding);
                }

                pending_sets.extend(cb_state.referenced_sets.iter().copied());
                submitted.push(cb_state);
            }

            if let Some(gpu) = gpu {
                gpu.submit(submission, &submitted, sets);
            }

            pending.insert(
                submission,
                PendingSubmission {
                    command_buffers: submitted.iter().map(|cb_state| cb_state.handle()).collect(),
                    sets: pending_sets,
                },
            );
        })
    }

    /// Notifies the validator that a submission has completed on the device.
    ///
    /// This can be called from any thread, and does not block. The submission is processed by
    /// the next call to [`process_completed_submissions`](Self::process_completed_submissions).
    pub fn submission_completed(&self, submission: SubmissionId) {
        self.completed_submissions.push(submission);
    }

    /// Processes the submissions that have completed since the last call, validating the
    /// descriptors that they accessed dynamically.
    pub fn process_completed_submissions(&self) -> bool {
        self.run(|state, reporter, facts| {
            while let Some(submission) = self.completed_submissions.pop() {
                if state.pending.remove(&submission).is_none() {
                    continue;
                }

                if let Some(gpu) = &mut state.gpu {
                    for finding in gpu.complete(submission, &state.sets, facts) {
                        reporter.report(finding);
                    }
                }
            }
        })
    }

    /// Returns what GPU-assisted validation knows about `descriptor_set`, or `None` if the set
    /// is not known.
    pub fn descriptor_set_status(
        &self,
        descriptor_set: vk::DescriptorSet,
    ) -> Option<DescriptorSetStatus> {
        let state = self.state.lock();
        let set = state.sets.get(&descriptor_set)?;

        Some(DescriptorSetStatus {
            instrumented: state
                .gpu
                .as_ref()
                .is_some_and(|gpu| gpu.is_instrumented(descriptor_set)),
            update_after_bind: set
                .bindings()
                .iter()
                .any(|binding| binding.is_update_after_bind()),
        })
    }

    /// Returns the buffer that instrumented shaders of `command_buffer` write their accesses to
    /// `descriptor_set` into, during `submission`.
    pub fn post_process_buffer(
        &self,
        submission: SubmissionId,
        command_buffer: vk::CommandBuffer,
        descriptor_set: vk::DescriptorSet,
    ) -> Option<DeviceAllocation> {
        self.state
            .lock()
            .gpu
            .as_ref()?
            .post_process_buffer(submission, command_buffer, descriptor_set)
    }

    /// Returns the table that instrumented shaders of `command_buffer` look up the addresses of
    /// the post-process buffers in, during `submission`.
    pub fn lookup_table(
        &self,
        submission: SubmissionId,
        command_buffer: vk::CommandBuffer,
    ) -> Option<DeviceAllocation> {
        self.state
            .lock()
            .gpu
            .as_ref()?
            .lookup_table(submission, command_buffer)
    }
}

/// Returns a finding for `error`, whose kind depends on whether it names a missing capability.
fn finding(error: Box<ValidationError>) -> Finding {
    let kind = if error.requires_one_of.is_empty() {
        FindingKind::Structural
    } else {
        FindingKind::Capability
    };

    Finding::new(kind, error)
}

fn unknown_handle(
    context: impl Into<Cow<'static, str>>,
    object: &str,
    vuids: &'static [&'static str],
) -> Finding {
    Finding::new(
        FindingKind::Structural,
        Box::new(ValidationError {
            context: context.into(),
            problem: format!("is not a valid {} handle", object).into(),
            vuids,
            ..Default::default()
        }),
    )
}

fn not_recording(command_buffer: vk::CommandBuffer, vuids: &'static [&'static str]) -> Finding {
    Finding::new(
        FindingKind::Structural,
        Box::new(ValidationError {
            context: "command_buffer".into(),
            problem: "is not in the recording state".into(),
            vuids,
            ..Default::default()
        }),
    )
    .with_object(command_buffer)
}

/// Returns the state of `command_buffer` if it is recording. A command buffer that was
/// invalidated while recording still records.
fn recording<'a>(
    command_buffers: &'a mut HashMap<vk::CommandBuffer, CommandBufferState>,
    command_buffer: vk::CommandBuffer,
    reporter: &mut Reporter<'_>,
    vuids: &'static [&'static str],
) -> Option<&'a mut CommandBufferState> {
    match command_buffers.get_mut(&command_buffer) {
        Some(cb_state)
            if matches!(
                cb_state.status,
                CommandBufferStatus::Recording | CommandBufferStatus::Invalid { .. },
            ) =>
        {
            Some(cb_state)
        }
        _ => {
            reporter.report(not_recording(command_buffer, vuids));
            None
        }
    }
}

/// Validates `writes` and applies the valid ones.
fn apply_writes(
    state: &mut State,
    reporter: &mut Reporter<'_>,
    facts: &Facts<'_>,
    writes: &[WriteDescriptorSet],
    context: &str,
) {
    for (index, write) in writes.iter().enumerate() {
        let context = format!("{}[{}]", context, index);

        let Some(dst_set) = state.sets.get(&write.dst_set) else {
            reporter.report(unknown_handle(
                format!("{}.dst_set", context),
                "descriptor set",
                &["VUID-VkWriteDescriptorSet-dstSet-00320"],
            ));
            continue;
        };

        let validated = match write.validate(dst_set, facts) {
            Ok(validated) => validated,
            Err(error) => {
                reporter.report(finding(error.add_context(context)).with_object(write.dst_set));
                continue;
            }
        };

        check_in_use(state, reporter, write.dst_set, &validated.span);

        if let Some(dst_set) = state.sets.get_mut(&write.dst_set) {
            dst_set.record_write(&validated);
        }

        for error in validated.payload_errors {
            reporter.report(
                Finding::new(FindingKind::Payload, error.add_context(context.clone()))
                    .with_object(write.dst_set),
            );
        }
    }
}

/// Handles an update of `set` that touches `span`, while the set may be bound to command
/// buffers.
fn check_in_use(
    state: &mut State,
    reporter: &mut Reporter<'_>,
    set: vk::DescriptorSet,
    span: &Span,
) {
    let Some(set_state) = state.sets.get(&set) else {
        return;
    };

    if allowed_while_bound(set_state, span) {
        return;
    }

    if state.is_set_pending(set) {
        reporter.report(
            Finding::new(
                FindingKind::Structural,
                Box::new(ValidationError {
                    problem: "the descriptor set is updated while it is in use by a submission \
                        that has not completed yet, and the updated bindings were not created \
                        with `DescriptorBindingFlags::UPDATE_AFTER_BIND` or \
                        `DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING`"
                        .into(),
                    vuids: &["VUID-vkUpdateDescriptorSets-None-03047"],
                    ..Default::default()
                }),
            )
            .with_object(set),
        );
    }

    state.invalidate_users_of(set);
}

#[cfg(test)]
mod tests {
    use crate::{
        command_buffer::ActionKind,
        descriptor_set::{
            layout::{
                DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo, DescriptorType,
            },
            pool::{DescriptorPoolCreateFlags, DescriptorPoolCreateInfo, DescriptorSetAllocateInfo},
            update::{DescriptorBufferInfo, WriteDescriptorSet, WriteDescriptorSetElements},
        },
        device::{DeviceFeatures, DeviceInfo},
        finding::{FindingCollector, FindingKind, Severity},
        gpu_assisted::{memory::HostMemoryService, SubmissionId},
        pipeline::{layout::PipelineLayoutCreateInfo, PipelineBindPoint},
        resources::{BufferInfo, BufferUsage, ResourceTable},
        shader::{ShaderStage, ShaderStages},
        tests::{binding_requirements, reflection, setup_single_set},
        DescriptorValidator, DescriptorValidatorCreateInfo, ValidationSettings, Version,
        WHOLE_SIZE,
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    fn uniform_buffer_layout(
        descriptor_type: DescriptorType,
        descriptor_count: u32,
    ) -> DescriptorSetLayoutCreateInfo {
        DescriptorSetLayoutCreateInfo {
            bindings: [(
                0,
                DescriptorSetLayoutBinding {
                    descriptor_count,
                    stages: ShaderStages::FRAGMENT,
                    ..DescriptorSetLayoutBinding::descriptor_type(descriptor_type)
                },
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        }
    }

    fn fragment_shader(descriptor_type: DescriptorType) -> crate::shader::ShaderReflection {
        reflection(
            1,
            ShaderStage::Fragment,
            [(
                (0, 0),
                binding_requirements(
                    descriptor_type,
                    Some(1),
                    ShaderStages::FRAGMENT,
                    &[Some(0)],
                ),
            )],
        )
    }

    fn write_uniform_buffer(
        validator: &DescriptorValidator,
        resources: &ResourceTable,
        set: vk::DescriptorSet,
        descriptor_type: DescriptorType,
        range: u64,
    ) {
        let buffer = vk::Buffer::from_raw(100);
        resources.insert_buffer(
            buffer,
            BufferInfo {
                size: 1024,
                usage: BufferUsage::UNIFORM_BUFFER,
            },
        );
        assert!(!validator.update_descriptor_sets(
            &[WriteDescriptorSet::new(
                set,
                0,
                descriptor_type,
                WriteDescriptorSetElements::Buffer(vec![DescriptorBufferInfo {
                    buffer,
                    offset: 0,
                    range,
                }]),
            )],
            &[],
        ));
    }

    #[test]
    fn create_info_validation() {
        let resources = Arc::new(ResourceTable::new());
        let collector = Arc::new(FindingCollector::new());

        let create_info = DescriptorValidatorCreateInfo {
            settings: ValidationSettings {
                gpu_assisted: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(
            DescriptorValidator::new(create_info, resources.clone(), collector.clone()).is_err()
        );

        let create_info = DescriptorValidatorCreateInfo {
            device: DeviceInfo {
                api_version: Version::V1_3,
                enabled_features: DeviceFeatures::empty(),
                ..Default::default()
            },
            settings: ValidationSettings {
                gpu_assisted: true,
                ..Default::default()
            },
            memory_service: Some(Arc::new(HostMemoryService::new())),
            ..Default::default()
        };
        let err = DescriptorValidator::new(create_info, resources, collector)
            .err()
            .unwrap();
        assert!(!err.requires_one_of.is_empty());
    }

    #[test]
    fn zero_dynamic_offset() {
        let (validator, resources, collector) = test_validator!();
        let objects = setup_single_set(
            &validator,
            uniform_buffer_layout(DescriptorType::UniformBufferDynamic, 1),
            PipelineBindPoint::Graphics,
            vec![fragment_shader(DescriptorType::UniformBufferDynamic)],
        );
        write_uniform_buffer(
            &validator,
            &resources,
            objects.set,
            DescriptorType::UniformBufferDynamic,
            WHOLE_SIZE,
        );

        let bind = |offset| {
            validator.cmd_bind_descriptor_sets(
                objects.command_buffer,
                PipelineBindPoint::Graphics,
                objects.pipeline_layout,
                0,
                &[objects.set],
                &[offset],
            )
        };

        assert!(!bind(0));
        assert!(collector.is_empty());

        // Aligned, but the descriptor covers the whole buffer.
        assert!(bind(256));
        assert_eq!(
            collector.take().iter().map(|f| f.id()).collect::<Vec<_>>(),
            ["VUID-vkCmdBindDescriptorSets-pDescriptorSets-01979"],
        );

        assert!(bind(4));
        assert_eq!(
            collector.take().iter().map(|f| f.id()).collect::<Vec<_>>(),
            [
                "VUID-vkCmdBindDescriptorSets-pDynamicOffsets-01971",
                "VUID-vkCmdBindDescriptorSets-pDescriptorSets-01979",
            ],
        );
    }

    #[test]
    fn dynamic_offset_range() {
        let (validator, resources, collector) = test_validator!();
        let objects = setup_single_set(
            &validator,
            uniform_buffer_layout(DescriptorType::UniformBufferDynamic, 1),
            PipelineBindPoint::Graphics,
            vec![fragment_shader(DescriptorType::UniformBufferDynamic)],
        );
        write_uniform_buffer(
            &validator,
            &resources,
            objects.set,
            DescriptorType::UniformBufferDynamic,
            256,
        );

        let bind = |offset| {
            validator.cmd_bind_descriptor_sets(
                objects.command_buffer,
                PipelineBindPoint::Graphics,
                objects.pipeline_layout,
                0,
                &[objects.set],
                &[offset],
            )
        };

        // 768 + 256 is exactly the size of the buffer.
        assert!(!bind(768));
        assert!(bind(1024));
        assert_eq!(
            collector.ids(),
            ["VUID-vkCmdBindDescriptorSets-pDescriptorSets-01979"],
        );
    }

    #[test]
    fn too_few_dynamic_offsets() {
        let (validator, _resources, collector) = test_validator!();
        let objects = setup_single_set(
            &validator,
            uniform_buffer_layout(DescriptorType::UniformBufferDynamic, 3),
            PipelineBindPoint::Graphics,
            vec![fragment_shader(DescriptorType::UniformBufferDynamic)],
        );

        assert!(validator.cmd_bind_descriptor_sets(
            objects.command_buffer,
            PipelineBindPoint::Graphics,
            objects.pipeline_layout,
            0,
            &[objects.set],
            &[0, 0],
        ));

        let findings = collector.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::Capacity);
        assert_eq!(
            findings[0].id(),
            "VUID-vkCmdBindDescriptorSets-dynamicOffsetCount-00359",
        );
        assert!(findings[0].message().contains("requires 3 dynamic offsets"));
    }

    #[test]
    fn too_many_dynamic_offsets() {
        let (validator, _resources, collector) = test_validator!();
        let objects = setup_single_set(
            &validator,
            uniform_buffer_layout(DescriptorType::UniformBufferDynamic, 1),
            PipelineBindPoint::Graphics,
            vec![fragment_shader(DescriptorType::UniformBufferDynamic)],
        );

        assert!(validator.cmd_bind_descriptor_sets(
            objects.command_buffer,
            PipelineBindPoint::Graphics,
            objects.pipeline_layout,
            0,
            &[objects.set],
            &[0, 0],
        ));

        let findings = collector.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::Structural);
        assert_eq!(
            findings[0].id(),
            "VUID-vkCmdBindDescriptorSets-dynamicOffsetCount-00359",
        );
    }

    #[test]
    fn bind_is_idempotent() {
        let (validator, resources, collector) = test_validator!();
        let objects = setup_single_set(
            &validator,
            uniform_buffer_layout(DescriptorType::UniformBuffer, 1),
            PipelineBindPoint::Graphics,
            vec![fragment_shader(DescriptorType::UniformBuffer)],
        );
        write_uniform_buffer(
            &validator,
            &resources,
            objects.set,
            DescriptorType::UniformBuffer,
            64,
        );

        for _ in 0..2 {
            assert!(!validator.cmd_bind_descriptor_sets(
                objects.command_buffer,
                PipelineBindPoint::Graphics,
                objects.pipeline_layout,
                0,
                &[objects.set],
                &[],
            ));
            assert!(!validator.cmd_action(objects.command_buffer, ActionKind::Draw));
        }

        assert!(collector.is_empty());
    }

    #[test]
    fn bind_out_of_range() {
        let (validator, _resources, collector) = test_validator!();
        let objects = setup_single_set(
            &validator,
            uniform_buffer_layout(DescriptorType::UniformBuffer, 1),
            PipelineBindPoint::Graphics,
            vec![fragment_shader(DescriptorType::UniformBuffer)],
        );

        assert!(validator.cmd_bind_descriptor_sets(
            objects.command_buffer,
            PipelineBindPoint::Graphics,
            objects.pipeline_layout,
            1,
            &[objects.set],
            &[],
        ));
        assert_eq!(collector.ids(), ["VUID-vkCmdBindDescriptorSets-firstSet-00360"]);
    }

    #[test]
    fn incompatible_binding_stages() {
        let (validator, _resources, collector) = test_validator!();

        let layout_create_info = |second_binding_stages| DescriptorSetLayoutCreateInfo {
            bindings: [
                (
                    0,
                    DescriptorSetLayoutBinding {
                        stages: ShaderStages::FRAGMENT,
                        ..DescriptorSetLayoutBinding::descriptor_type(
                            DescriptorType::UniformBuffer,
                        )
                    },
                ),
                (
                    1,
                    DescriptorSetLayoutBinding {
                        stages: second_binding_stages,
                        ..DescriptorSetLayoutBinding::descriptor_type(
                            DescriptorType::UniformBuffer,
                        )
                    },
                ),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        };

        let fragment_layout = vk::DescriptorSetLayout::from_raw(1);
        let vertex_layout = vk::DescriptorSetLayout::from_raw(2);
        let pool = vk::DescriptorPool::from_raw(1);
        let set = vk::DescriptorSet::from_raw(1);
        let pipeline_layout = vk::PipelineLayout::from_raw(1);
        let command_buffer = vk::CommandBuffer::from_raw(1);

        assert!(!validator.create_descriptor_set_layout(
            fragment_layout,
            &layout_create_info(ShaderStages::FRAGMENT),
        ));
        assert!(!validator.create_descriptor_set_layout(
            vertex_layout,
            &layout_create_info(ShaderStages::VERTEX),
        ));
        assert!(!validator.create_descriptor_pool(
            pool,
            &DescriptorPoolCreateInfo {
                max_sets: 1,
                pool_sizes: [(DescriptorType::UniformBuffer, 2)].into_iter().collect(),
                ..Default::default()
            },
        ));
        assert!(!validator.allocate_descriptor_sets(
            &DescriptorSetAllocateInfo::new(pool, vec![vertex_layout]),
            &[set],
        ));
        assert!(!validator.create_pipeline_layout(
            pipeline_layout,
            &PipelineLayoutCreateInfo {
                set_layouts: vec![fragment_layout, fragment_layout],
                ..Default::default()
            },
        ));
        assert!(!validator.begin_command_buffer(command_buffer));

        assert!(validator.cmd_bind_descriptor_sets(
            command_buffer,
            PipelineBindPoint::Graphics,
            pipeline_layout,
            1,
            &[set],
            &[],
        ));

        let findings = collector.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].id(),
            "VUID-vkCmdBindDescriptorSets-pDescriptorSets-00358",
        );
        assert!(findings[0].message().contains("binding 1"));
    }

    #[test]
    fn update_invalidates_bound_command_buffer() {
        let (validator, resources, collector) = test_validator!();
        let objects = setup_single_set(
            &validator,
            uniform_buffer_layout(DescriptorType::UniformBuffer, 1),
            PipelineBindPoint::Graphics,
            vec![fragment_shader(DescriptorType::UniformBuffer)],
        );
        write_uniform_buffer(
            &validator,
            &resources,
            objects.set,
            DescriptorType::UniformBuffer,
            64,
        );

        assert!(!validator.cmd_bind_descriptor_sets(
            objects.command_buffer,
            PipelineBindPoint::Graphics,
            objects.pipeline_layout,
            0,
            &[objects.set],
            &[],
        ));
        assert!(!validator.cmd_action(objects.command_buffer, ActionKind::Draw));
        assert!(!validator.end_command_buffer(objects.command_buffer));

        write_uniform_buffer(
            &validator,
            &resources,
            objects.set,
            DescriptorType::UniformBuffer,
            128,
        );
        assert!(collector.is_empty());

        assert!(validator.queue_submit(SubmissionId(1), &[objects.command_buffer]));
        assert_eq!(collector.ids(), ["VUID-vkQueueSubmit-pCommandBuffers-00070"]);
    }

    #[test]
    fn free_while_pending() {
        let (validator, _resources, collector) = test_validator!();
        let objects = setup_single_set(
            &validator,
            uniform_buffer_layout(DescriptorType::UniformBuffer, 1),
            PipelineBindPoint::Graphics,
            vec![fragment_shader(DescriptorType::UniformBuffer)],
        );
        assert!(!validator.destroy_descriptor_pool(objects.pool));

        let pool = vk::DescriptorPool::from_raw(2);
        let set = vk::DescriptorSet::from_raw(2);
        assert!(!validator.create_descriptor_pool(
            pool,
            &DescriptorPoolCreateInfo {
                flags: DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
                max_sets: 1,
                pool_sizes: [(DescriptorType::UniformBuffer, 1)].into_iter().collect(),
                ..Default::default()
            },
        ));
        assert!(!validator.allocate_descriptor_sets(
            &DescriptorSetAllocateInfo::new(pool, vec![objects.set_layout]),
            &[set],
        ));
        assert!(!validator.cmd_bind_descriptor_sets(
            objects.command_buffer,
            PipelineBindPoint::Graphics,
            objects.pipeline_layout,
            0,
            &[set],
            &[],
        ));
        assert!(!validator.end_command_buffer(objects.command_buffer));
        assert!(!validator.queue_submit(SubmissionId(1), &[objects.command_buffer]));

        assert!(validator.free_descriptor_sets(pool, &[set]));
        assert_eq!(
            collector.ids(),
            ["VUID-vkFreeDescriptorSets-pDescriptorSets-00309"],
        );
        assert!(validator.descriptor_set_status(set).is_none());

        // Once the submission has completed, the pool can be reused.
        validator.submission_completed(SubmissionId(1));
        assert!(!validator.process_completed_submissions());
        assert!(!validator.allocate_descriptor_sets(
            &DescriptorSetAllocateInfo::new(pool, vec![objects.set_layout]),
            &[set],
        ));
        assert!(!validator.free_descriptor_sets(pool, &[set]));
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn pool_exhaustion_is_advisory() {
        let (validator, _resources, collector) = test_validator!();
        let objects = setup_single_set(
            &validator,
            uniform_buffer_layout(DescriptorType::UniformBuffer, 1),
            PipelineBindPoint::Graphics,
            vec![fragment_shader(DescriptorType::UniformBuffer)],
        );

        // The pool was created with room for 4 sets, but only 1 descriptor.
        assert!(!validator.allocate_descriptor_sets(
            &DescriptorSetAllocateInfo::new(objects.pool, vec![objects.set_layout]),
            &[vk::DescriptorSet::from_raw(2)],
        ));

        let findings = collector.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].kind, FindingKind::Capacity);
        assert_eq!(findings[0].severity, Severity::Advisory);
        assert_eq!(findings[0].id(), "UNASSIGNED-DescriptorPool-OutOfDescriptors");
    }

    #[test]
    fn debug_labels() {
        let (validator, _resources, collector) = test_validator!();
        let command_buffer = vk::CommandBuffer::from_raw(1);

        assert!(!validator.begin_command_buffer(command_buffer));
        assert!(!validator.cmd_begin_debug_utils_label(command_buffer, "shadows"));
        assert!(validator.cmd_action(command_buffer, ActionKind::Draw));
        assert!(!validator.cmd_end_debug_utils_label(command_buffer));
        assert!(validator.cmd_end_debug_utils_label(command_buffer));

        let findings = collector.findings();
        assert_eq!(
            findings[0].action.as_ref().unwrap().debug_label.as_deref(),
            Some("shadows"),
        );
        assert_eq!(
            findings[1].id(),
            "VUID-vkCmdEndDebugUtilsLabelEXT-commandBuffer-01912",
        );
    }

    #[test]
    fn not_recording() {
        let (validator, _resources, collector) = test_validator!();
        let command_buffer = vk::CommandBuffer::from_raw(1);

        assert!(validator.cmd_end_debug_utils_label(command_buffer));
        assert_eq!(
            collector.ids(),
            ["VUID-vkCmdEndDebugUtilsLabelEXT-commandBuffer-recording"],
        );
    }
}
