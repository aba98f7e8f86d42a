//! Pipelines, as far as descriptor validation is concerned.
//!
//! A pipeline is registered with the shaders it was created from. Their descriptor binding
//! requirements are merged, checked against the pipeline layout once at creation, and then
//! checked against the bound descriptor sets at every action command.

use self::layout::PipelineLayout;
use crate::{
    macros::vulkan_enum,
    shader::{DescriptorBindingRequirements, ShaderReflection, ShaderStages},
    ValidationError,
};
use ash::vk;
use foldhash::HashMap;
use smallvec::SmallVec;
use std::{collections::hash_map::Entry, sync::Arc};

pub mod layout;

/// A registered pipeline.
#[derive(Debug)]
pub struct Pipeline {
    handle: vk::Pipeline,
    bind_point: PipelineBindPoint,
    layout: Arc<PipelineLayout>,
    shaders: Vec<Arc<ShaderReflection>>,
    descriptor_binding_requirements: HashMap<(u32, u32), DescriptorBindingRequirements>,
}

impl Pipeline {
    /// Creates a `Pipeline` from its shaders, checking that `layout` satisfies them.
    pub(crate) fn new(
        handle: vk::Pipeline,
        bind_point: PipelineBindPoint,
        layout: Arc<PipelineLayout>,
        shaders: Vec<Arc<ShaderReflection>>,
    ) -> Result<Self, Box<ValidationError>> {
        if shaders.is_empty() {
            return Err(Box::new(ValidationError {
                context: "stages".into(),
                problem: "is empty".into(),
                ..Default::default()
            }));
        }

        let allowed_stages = bind_point.stages();
        let mut descriptor_binding_requirements: HashMap<
            (u32, u32),
            DescriptorBindingRequirements,
        > = HashMap::default();

        for (index, shader) in shaders.iter().enumerate() {
            if !allowed_stages.contains_enum(shader.stage) {
                return Err(Box::new(ValidationError {
                    context: format!("stages[{}]", index).into(),
                    problem: format!(
                        "is a shader of stage `ShaderStage::{:?}`, which cannot be part of a \
                        pipeline with bind point `PipelineBindPoint::{:?}`",
                        shader.stage, bind_point,
                    )
                    .into(),
                    ..Default::default()
                }));
            }

            for (&key, requirements) in &shader.descriptor_binding_requirements {
                match descriptor_binding_requirements.entry(key) {
                    Entry::Vacant(entry) => {
                        entry.insert(requirements.clone());
                    }
                    Entry::Occupied(mut entry) => {
                        entry.get_mut().merge(requirements).map_err(|err| {
                            Box::new(ValidationError {
                                context: format!("stages[{}]", index).into(),
                                problem: format!(
                                    "the requirements for descriptor set {} binding {} conflict \
                                    with those of an earlier stage: {}",
                                    key.0, key.1, err,
                                )
                                .into(),
                                ..Default::default()
                            })
                        })?;
                    }
                }
            }
        }

        if bind_point == PipelineBindPoint::Compute && shaders.len() != 1 {
            return Err(Box::new(ValidationError {
                context: "stages".into(),
                problem: "does not contain exactly one shader, and the bind point is \
                    `PipelineBindPoint::Compute`"
                    .into(),
                ..Default::default()
            }));
        }

        layout
            .ensure_compatible_with_shader(
                &descriptor_binding_requirements,
                bind_point.layout_vuids(),
            )
            .map_err(|err| err.add_context("layout"))?;

        Ok(Pipeline {
            handle,
            bind_point,
            layout,
            shaders,
            descriptor_binding_requirements,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    #[inline]
    pub fn bind_point(&self) -> PipelineBindPoint {
        self.bind_point
    }

    #[inline]
    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    #[inline]
    pub fn shaders(&self) -> &[Arc<ShaderReflection>] {
        &self.shaders
    }

    /// Returns the descriptor binding requirements of all shaders of the pipeline, merged and
    /// keyed by `(set, binding)`.
    #[inline]
    pub fn descriptor_binding_requirements(
        &self,
    ) -> &HashMap<(u32, u32), DescriptorBindingRequirements> {
        &self.descriptor_binding_requirements
    }

    /// Returns whether a shader of the pipeline was instrumented to report its descriptor
    /// accesses.
    #[inline]
    pub fn is_instrumented(&self) -> bool {
        self.shaders
            .iter()
            .any(|shader| !shader.instrumented_variables.is_empty())
    }
}

/// Parameters to register a new `Pipeline`.
#[derive(Clone, Debug)]
pub struct PipelineCreateInfo {
    /// The bind point of the pipeline.
    ///
    /// The default value is [`PipelineBindPoint::Graphics`].
    pub bind_point: PipelineBindPoint,

    /// The `shader_id` of the reflection of each shader stage of the pipeline.
    ///
    /// The default value is empty, which must be overridden.
    pub stages: Vec<u32>,

    /// The layout of the pipeline.
    ///
    /// The default value is a null handle, which must be overridden.
    pub layout: vk::PipelineLayout,

    pub _ne: crate::NonExhaustive,
}

impl Default for PipelineCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            bind_point: PipelineBindPoint::Graphics,
            stages: Vec::new(),
            layout: vk::PipelineLayout::null(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

vulkan_enum! {
    #[non_exhaustive]

    /// The kind of a pipeline, and the bind point of a command buffer that it is bound to.
    PipelineBindPoint = PipelineBindPoint(i32);

    Compute = COMPUTE,

    Graphics = GRAPHICS,

    RayTracing = RAY_TRACING_KHR
    RequiresOneOf([
        RequiresAllOf([DeviceExtension(khr_ray_tracing_pipeline)]),
    ]),
}

impl PipelineBindPoint {
    /// The number of bind points that a command buffer has.
    pub(crate) const COUNT_TRACKED: usize = 3;

    /// Returns the index of the bind point within the bind point state of a command buffer.
    #[inline]
    pub(crate) fn index(self) -> usize {
        match self {
            PipelineBindPoint::Compute => 0,
            PipelineBindPoint::Graphics => 1,
            PipelineBindPoint::RayTracing => 2,
        }
    }

    /// Returns the shader stages that pipelines of this bind point can consist of.
    pub fn stages(self) -> ShaderStages {
        match self {
            PipelineBindPoint::Compute => ShaderStages::COMPUTE,
            PipelineBindPoint::Graphics => {
                ShaderStages::all_graphics() | ShaderStages::TASK | ShaderStages::MESH
            }
            PipelineBindPoint::RayTracing => ShaderStages::all_ray_tracing(),
        }
    }

    /// Returns the bind points whose pipelines can contain any of `stages`.
    pub(crate) fn from_stages(stages: ShaderStages) -> SmallVec<[PipelineBindPoint; 3]> {
        [
            PipelineBindPoint::Compute,
            PipelineBindPoint::Graphics,
            PipelineBindPoint::RayTracing,
        ]
        .into_iter()
        .filter(|bind_point| stages.intersects(bind_point.stages()))
        .collect()
    }

    fn layout_vuids(self) -> [&'static [&'static str]; 3] {
        match self {
            PipelineBindPoint::Compute => [
                &["VUID-VkComputePipelineCreateInfo-layout-07988"],
                &["VUID-VkComputePipelineCreateInfo-layout-07990"],
                &["VUID-VkComputePipelineCreateInfo-layout-07991"],
            ],
            PipelineBindPoint::Graphics => [
                &["VUID-VkGraphicsPipelineCreateInfo-layout-07988"],
                &["VUID-VkGraphicsPipelineCreateInfo-layout-07990"],
                &["VUID-VkGraphicsPipelineCreateInfo-layout-07991"],
            ],
            PipelineBindPoint::RayTracing => [
                &["VUID-VkRayTracingPipelineCreateInfoKHR-layout-07988"],
                &["VUID-VkRayTracingPipelineCreateInfoKHR-layout-07990"],
                &["VUID-VkRayTracingPipelineCreateInfoKHR-layout-07991"],
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{layout::PipelineLayoutCreateInfo, Pipeline, PipelineBindPoint};
    use crate::{
        descriptor_set::layout::{
            DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo, DescriptorType,
        },
        pipeline::layout::PipelineLayout,
        resources::ResourceTable,
        shader::{
            DescriptorBindingRequirements, DescriptorRequirements, ShaderReflection, ShaderStage,
            ShaderStages,
        },
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    fn reflection(
        shader_id: u32,
        stage: ShaderStage,
        descriptor_type: DescriptorType,
    ) -> Arc<ShaderReflection> {
        Arc::new(ShaderReflection {
            shader_id,
            stage,
            descriptor_binding_requirements: [(
                (0, 0),
                DescriptorBindingRequirements {
                    descriptor_types: vec![descriptor_type],
                    descriptor_count: Some(1),
                    stages: stage.into(),
                    descriptors: [(Some(0), DescriptorRequirements::default())]
                        .into_iter()
                        .collect(),
                },
            )]
            .into_iter()
            .collect(),
            ..Default::default()
        })
    }

    fn pipeline_layout() -> Arc<PipelineLayout> {
        let resources = ResourceTable::new();
        let set_layout = Arc::new(test_layout!(
            resources,
            1,
            DescriptorSetLayoutCreateInfo {
                bindings: [(
                    0,
                    DescriptorSetLayoutBinding {
                        stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
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
            set_layouts: vec![set_layout.handle()],
            ..Default::default()
        };

        Arc::new(PipelineLayout::new(
            vk::PipelineLayout::from_raw(1),
            &create_info,
            vec![Some(set_layout)],
        ))
    }

    #[test]
    fn merged_requirements() {
        let pipeline = Pipeline::new(
            vk::Pipeline::from_raw(1),
            PipelineBindPoint::Graphics,
            pipeline_layout(),
            vec![
                reflection(1, ShaderStage::Vertex, DescriptorType::UniformBuffer),
                reflection(2, ShaderStage::Fragment, DescriptorType::UniformBuffer),
            ],
        )
        .unwrap();

        assert_eq!(
            pipeline.descriptor_binding_requirements()[&(0, 0)].stages,
            ShaderStages::VERTEX | ShaderStages::FRAGMENT,
        );
        assert!(!pipeline.is_instrumented());
    }

    #[test]
    fn layout_must_satisfy_shaders() {
        let err = Pipeline::new(
            vk::Pipeline::from_raw(1),
            PipelineBindPoint::Graphics,
            pipeline_layout(),
            vec![reflection(1, ShaderStage::Vertex, DescriptorType::StorageBuffer)],
        )
        .unwrap_err();
        assert_eq!(err.vuids, &["VUID-VkGraphicsPipelineCreateInfo-layout-07990"]);

        let err = Pipeline::new(
            vk::Pipeline::from_raw(1),
            PipelineBindPoint::Compute,
            pipeline_layout(),
            vec![reflection(1, ShaderStage::Compute, DescriptorType::UniformBuffer)],
        )
        .unwrap_err();
        assert_eq!(err.vuids, &["VUID-VkComputePipelineCreateInfo-layout-07988"]);
    }

    #[test]
    fn bind_points_from_stages() {
        assert_eq!(
            PipelineBindPoint::from_stages(ShaderStages::FRAGMENT | ShaderStages::COMPUTE)
                .as_slice(),
            &[PipelineBindPoint::Compute, PipelineBindPoint::Graphics],
        );
    }
}
