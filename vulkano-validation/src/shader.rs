//! Shader reflection, as consumed by descriptor validation.
//!
//! Parsing SPIR-V is not done here. The layer's shader module tracking reflects each module once
//! and hands the result over as a [`ShaderReflection`]: which descriptors the shader accesses,
//! whether each access uses an index that is a constant, and the identifiers that instrumented
//! shader code writes into the GPU-assisted validation records.

use crate::{
    descriptor_set::layout::DescriptorType,
    macros::vulkan_bitflags_enum,
};
use foldhash::HashMap;
use std::{
    collections::hash_map::Entry,
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
};

/// The reflection data of one shader entry point.
#[derive(Clone, Debug)]
pub struct ShaderReflection {
    /// The identifier that instrumented code writes into the `shader_id` field of each
    /// GPU-assisted validation record. It must be unique among the shaders known to a
    /// validator.
    pub shader_id: u32,

    /// The stage of the entry point.
    pub stage: ShaderStage,

    /// The descriptors that the entry point accesses, keyed by `(set, binding)`.
    pub descriptor_binding_requirements: HashMap<(u32, u32), DescriptorBindingRequirements>,

    /// The variables that instrumented code reports when it reads a descriptor through an index
    /// that is only known at execution time, keyed by the variable id that is written into the
    /// `variable_id` field of each record.
    pub instrumented_variables: HashMap<u32, InstrumentedVariable>,

    pub _ne: crate::NonExhaustive,
}

impl Default for ShaderReflection {
    #[inline]
    fn default() -> Self {
        Self {
            shader_id: 0,
            stage: ShaderStage::Vertex,
            descriptor_binding_requirements: HashMap::default(),
            instrumented_variables: HashMap::default(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

/// A descriptor variable whose accesses are recorded by instrumented shader code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstrumentedVariable {
    pub set: u32,
    pub binding: u32,
}

/// The requirements imposed by a shader on a binding within a descriptor set layout, and on any
/// resource that is bound to that binding.
#[derive(Clone, Debug, Default)]
pub struct DescriptorBindingRequirements {
    /// The descriptor types that are allowed.
    pub descriptor_types: Vec<DescriptorType>,

    /// The number of descriptors (array elements) that the shader requires. The descriptor set
    /// layout can declare more than this, but never less.
    ///
    /// `None` means that the shader declares this as a runtime-sized array, and could potentially
    /// access every array element provided in the descriptor set.
    pub descriptor_count: Option<u32>,

    /// The shader stages that the binding must be declared for.
    pub stages: ShaderStages,

    /// The requirements for individual descriptors within a binding.
    ///
    /// Keys with `Some` hold requirements for a specific descriptor index, if it is statically
    /// known in the shader (a constant). The key `None` holds requirements for indices that are
    /// not statically known, but determined only at runtime (calculated from an input variable).
    pub descriptors: HashMap<Option<u32>, DescriptorRequirements>,
}

impl DescriptorBindingRequirements {
    /// Merges `other` into `self`, so that `self` satisfies the requirements of both.
    /// An `Err` is returned if the requirements conflict.
    pub fn merge(&mut self, other: &Self) -> Result<(), DescriptorBindingRequirementsIncompatible> {
        let Self {
            descriptor_types,
            descriptor_count,
            stages,
            descriptors,
        } = self;

        if !descriptor_types
            .iter()
            .any(|ty| other.descriptor_types.contains(ty))
        {
            return Err(DescriptorBindingRequirementsIncompatible::DescriptorType);
        }

        descriptor_types.retain(|ty| other.descriptor_types.contains(ty));

        *descriptor_count = match (*descriptor_count, other.descriptor_count) {
            (Some(first), Some(second)) => Some(first.max(second)),
            _ => None,
        };
        *stages |= other.stages;

        for (&index, other) in &other.descriptors {
            match descriptors.entry(index) {
                Entry::Vacant(entry) => {
                    entry.insert(other.clone());
                }
                Entry::Occupied(entry) => {
                    entry.into_mut().merge(other);
                }
            }
        }

        Ok(())
    }

    /// Returns whether the shader accesses any descriptor of the binding through an index that
    /// is only known at execution time.
    #[inline]
    pub fn has_runtime_index(&self) -> bool {
        self.descriptors.contains_key(&None)
    }

    /// Returns the descriptor indices that the shader accesses with a constant index.
    pub fn static_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.descriptors.keys().filter_map(|&index| index)
    }
}

/// The requirements imposed by a shader on resources bound to a descriptor.
#[derive(Clone, Debug, Default)]
pub struct DescriptorRequirements {
    /// For buffers and images, which shader stages perform read operations.
    pub memory_read: ShaderStages,

    /// For buffers and images, which shader stages perform write operations.
    pub memory_write: ShaderStages,
}

impl DescriptorRequirements {
    /// Merges `other` into `self`, so that `self` satisfies the requirements of both.
    pub fn merge(&mut self, other: &Self) {
        let Self {
            memory_read,
            memory_write,
        } = self;

        *memory_read |= other.memory_read;
        *memory_write |= other.memory_write;
    }
}

/// An error that can be returned when trying to create the intersection of two
/// `DescriptorBindingRequirements` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorBindingRequirementsIncompatible {
    /// The allowed descriptor types of the descriptors do not overlap.
    DescriptorType,
}

impl Error for DescriptorBindingRequirementsIncompatible {}

impl Display for DescriptorBindingRequirementsIncompatible {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            DescriptorBindingRequirementsIncompatible::DescriptorType => write!(
                f,
                "the allowed descriptor types of the two descriptors do not overlap",
            ),
        }
    }
}

vulkan_bitflags_enum! {
    /// A set of [`ShaderStage`] values.
    ShaderStages impl {
        /// Creates a `ShaderStages` struct with all graphics stages set to `true`.
        #[inline]
        pub const fn all_graphics() -> ShaderStages {
            ShaderStages::VERTEX
                .union(ShaderStages::TESSELLATION_CONTROL)
                .union(ShaderStages::TESSELLATION_EVALUATION)
                .union(ShaderStages::GEOMETRY)
                .union(ShaderStages::FRAGMENT)
        }

        /// Returns the stages that can be part of a ray tracing pipeline.
        #[inline]
        pub const fn all_ray_tracing() -> ShaderStages {
            ShaderStages::RAYGEN
                .union(ShaderStages::ANY_HIT)
                .union(ShaderStages::CLOSEST_HIT)
                .union(ShaderStages::MISS)
                .union(ShaderStages::INTERSECTION)
                .union(ShaderStages::CALLABLE)
        }
    },

    /// A shader stage within a pipeline.
    ShaderStage,

    = ShaderStageFlags(u32);

    VERTEX, Vertex = VERTEX,
    TESSELLATION_CONTROL, TessellationControl = TESSELLATION_CONTROL,
    TESSELLATION_EVALUATION, TessellationEvaluation = TESSELLATION_EVALUATION,
    GEOMETRY, Geometry = GEOMETRY,
    FRAGMENT, Fragment = FRAGMENT,
    COMPUTE, Compute = COMPUTE,
    RAYGEN, Raygen = RAYGEN_KHR,
    ANY_HIT, AnyHit = ANY_HIT_KHR,
    CLOSEST_HIT, ClosestHit = CLOSEST_HIT_KHR,
    MISS, Miss = MISS_KHR,
    INTERSECTION, Intersection = INTERSECTION_KHR,
    CALLABLE, Callable = CALLABLE_KHR,
    TASK, Task = TASK_EXT,
    MESH, Mesh = MESH_EXT,
}

#[cfg(test)]
mod tests {
    use super::{
        DescriptorBindingRequirements, DescriptorBindingRequirementsIncompatible,
        DescriptorRequirements, ShaderStage, ShaderStages,
    };
    use crate::descriptor_set::layout::DescriptorType;

    #[test]
    fn merge_requirements() {
        let mut first = DescriptorBindingRequirements {
            descriptor_types: vec![DescriptorType::UniformBuffer, DescriptorType::StorageBuffer],
            descriptor_count: Some(2),
            stages: ShaderStages::VERTEX,
            descriptors: [(Some(0), DescriptorRequirements::default())]
                .into_iter()
                .collect(),
        };
        let second = DescriptorBindingRequirements {
            descriptor_types: vec![DescriptorType::StorageBuffer],
            descriptor_count: Some(4),
            stages: ShaderStages::FRAGMENT,
            descriptors: [(None, DescriptorRequirements::default())]
                .into_iter()
                .collect(),
        };

        first.merge(&second).unwrap();
        assert_eq!(first.descriptor_types, vec![DescriptorType::StorageBuffer]);
        assert_eq!(first.descriptor_count, Some(4));
        assert_eq!(first.stages, ShaderStages::VERTEX | ShaderStages::FRAGMENT);
        assert!(first.has_runtime_index());
        assert_eq!(first.static_indices().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn merge_incompatible_types() {
        let mut first = DescriptorBindingRequirements {
            descriptor_types: vec![DescriptorType::SampledImage],
            ..Default::default()
        };
        let second = DescriptorBindingRequirements {
            descriptor_types: vec![DescriptorType::StorageImage],
            ..Default::default()
        };

        assert_eq!(
            first.merge(&second),
            Err(DescriptorBindingRequirementsIncompatible::DescriptorType),
        );
    }

    #[test]
    fn stages_iter() {
        let stages = ShaderStages::all_graphics();
        assert_eq!(stages.into_iter().count(), 5);
        assert!(stages.contains_enum(ShaderStage::Fragment));
        assert!(!stages.contains_enum(ShaderStage::Compute));
        assert_eq!(
            [ShaderStage::Vertex, ShaderStage::Compute]
                .into_iter()
                .collect::<ShaderStages>(),
            ShaderStages::VERTEX | ShaderStages::COMPUTE,
        );
    }
}
