//! Describes the layout of all descriptors within a descriptor set.
//!
//! When creating a new descriptor set, you must provide a *layout* object to create it from.
//!
//! Layouts are interned: two layouts that are created with structurally identical parameters
//! share the same [`LayoutDefinition`], which makes the compatibility check between them a
//! pointer comparison.

use crate::{
    device::DeviceInfo,
    macros::{impl_id_counter, vulkan_bitflags, vulkan_enum},
    resources::{ImageLayout, ResourceTracker, SamplerCreateInfo},
    shader::{DescriptorBindingRequirements, ShaderStages},
    Requires, RequiresAllOf, RequiresOneOf, ValidationError,
};
use ash::vk;
use foldhash::{HashMap, HashSet};
use smallvec::SmallVec;
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter},
    hash::{Hash, Hasher},
    num::NonZero,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Describes to the Vulkan implementation the layout of all descriptors within a descriptor set.
#[derive(Debug)]
pub struct DescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    id: NonZero<u64>,
    definition: Arc<LayoutDefinition>,
    descriptor_counts: HashMap<DescriptorType, u32>,
    destroyed: AtomicBool,
}

impl DescriptorSetLayout {
    pub(crate) fn new(handle: vk::DescriptorSetLayout, definition: Arc<LayoutDefinition>) -> Self {
        let mut descriptor_counts = HashMap::default();

        for binding in definition.bindings.values() {
            if binding.descriptor_count != 0 {
                *descriptor_counts
                    .entry(binding.descriptor_type)
                    .or_default() += binding.descriptor_count;
            }
        }

        DescriptorSetLayout {
            handle,
            id: Self::next_id(),
            definition,
            descriptor_counts,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Returns the handle of the layout.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    /// Returns the interned definition of the layout.
    #[inline]
    pub fn definition(&self) -> &Arc<LayoutDefinition> {
        &self.definition
    }

    /// Returns the flags that the descriptor set layout was created with.
    #[inline]
    pub fn flags(&self) -> DescriptorSetLayoutCreateFlags {
        self.definition.flags
    }

    /// Returns the bindings of the descriptor set layout, keyed by binding number.
    #[inline]
    pub fn bindings(&self) -> &BTreeMap<u32, LayoutBinding> {
        &self.definition.bindings
    }

    /// Returns the binding with the given binding number, if it exists.
    #[inline]
    pub fn binding(&self, binding_num: u32) -> Option<&LayoutBinding> {
        self.definition.bindings.get(&binding_num)
    }

    /// Returns the number of descriptors of each type.
    ///
    /// The map is guaranteed to not contain any elements with a count of `0`.
    #[inline]
    pub fn descriptor_counts(&self) -> &HashMap<DescriptorType, u32> {
        &self.descriptor_counts
    }

    /// Returns the sum of the descriptor counts of all bindings.
    #[inline]
    pub fn total_descriptor_count(&self) -> u32 {
        self.definition.total_descriptor_count
    }

    /// If the highest-numbered binding has a variable count, returns its binding number.
    #[inline]
    pub fn variable_descriptor_binding(&self) -> Option<u32> {
        self.definition
            .bindings
            .iter()
            .next_back()
            .filter(|(_, binding)| {
                binding
                    .binding_flags
                    .intersects(DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT)
            })
            .map(|(&binding_num, _)| binding_num)
    }

    /// If the highest-numbered binding has a variable count, returns its `descriptor_count`
    /// value, which is the maximum that can be allocated for it.
    ///
    /// Otherwise, returns 0.
    #[inline]
    pub fn variable_descriptor_count(&self) -> u32 {
        self.variable_descriptor_binding()
            .and_then(|binding_num| self.binding(binding_num))
            .map_or(0, |binding| binding.descriptor_count)
    }

    /// Returns whether `vkDestroyDescriptorSetLayout` has been called on the layout.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::Release);
    }

    /// Returns whether `self` is compatible with `other`.
    ///
    /// Two layouts are compatible if they were created with identical parameters, with
    /// immutable samplers compared by their create parameters. Layouts created with identical
    /// parameters share a [`LayoutDefinition`], in which case this is a pointer comparison.
    /// Otherwise, the definitions are compared member by member to find the first difference.
    pub fn is_compatible_with(
        &self,
        other: &DescriptorSetLayout,
    ) -> Result<(), LayoutIncompatibility> {
        if self.handle == other.handle || Arc::ptr_eq(&self.definition, &other.definition) {
            return Ok(());
        }

        Err(self
            .definition
            .find_difference(&other.definition)
            .unwrap_or(LayoutIncompatibility::Undetermined))
    }
}

impl_id_counter!(DescriptorSetLayout);

/// The structural parameters of a descriptor set layout.
///
/// Definitions are interned, so that layouts created with identical parameters share one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayoutDefinition {
    flags: DescriptorSetLayoutCreateFlags,
    bindings: BTreeMap<u32, LayoutBinding>,
    total_descriptor_count: u32,
}

impl LayoutDefinition {
    /// Builds a definition from `create_info`, looking up the create parameters of immutable
    /// samplers in `resources`.
    pub(crate) fn from_create_info(
        create_info: &DescriptorSetLayoutCreateInfo,
        resources: &dyn ResourceTracker,
    ) -> Result<Self, Box<ValidationError>> {
        let &DescriptorSetLayoutCreateInfo {
            flags,
            ref bindings,
            _ne: _,
        } = create_info;

        let mut total_descriptor_count = 0u32;
        let mut layout_bindings = BTreeMap::new();

        for (&binding_num, binding) in bindings {
            let immutable_samplers = binding
                .immutable_samplers
                .iter()
                .enumerate()
                .map(|(index, &handle)| {
                    resources
                        .sampler(handle)
                        .map(|info| ImmutableSampler {
                            handle,
                            create_info: info.create_info,
                        })
                        .ok_or_else(|| {
                            Box::new(ValidationError {
                                context: format!(
                                    "bindings[{}].immutable_samplers[{}]",
                                    binding_num, index
                                )
                                .into(),
                                problem: "is not a valid sampler handle".into(),
                                vuids: &["VUID-VkDescriptorSetLayoutBinding-descriptorType-00282"],
                                ..Default::default()
                            })
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            total_descriptor_count =
                total_descriptor_count.saturating_add(binding.descriptor_count);
            layout_bindings.insert(
                binding_num,
                LayoutBinding {
                    binding_flags: binding.binding_flags,
                    descriptor_type: binding.descriptor_type,
                    descriptor_count: binding.descriptor_count,
                    stages: binding.stages,
                    immutable_samplers,
                    mutable_descriptor_types: binding.mutable_descriptor_types.clone(),
                },
            );
        }

        Ok(LayoutDefinition {
            flags,
            bindings: layout_bindings,
            total_descriptor_count,
        })
    }

    #[inline]
    pub fn flags(&self) -> DescriptorSetLayoutCreateFlags {
        self.flags
    }

    #[inline]
    pub fn bindings(&self) -> &BTreeMap<u32, LayoutBinding> {
        &self.bindings
    }

    #[inline]
    pub fn total_descriptor_count(&self) -> u32 {
        self.total_descriptor_count
    }

    fn find_difference(&self, other: &LayoutDefinition) -> Option<LayoutIncompatibility> {
        if self.total_descriptor_count != other.total_descriptor_count {
            return Some(LayoutIncompatibility::TotalDescriptorCount {
                expected: self.total_descriptor_count,
                found: other.total_descriptor_count,
            });
        }

        let mut self_bindings = self.bindings.iter();
        let mut other_bindings = other.bindings.iter();

        loop {
            let (self_num, self_binding, other_num, other_binding) =
                match (self_bindings.next(), other_bindings.next()) {
                    (None, None) => break,
                    (Some((&self_num, _)), None) => {
                        return Some(LayoutIncompatibility::BindingNumber {
                            expected: Some(self_num),
                            found: None,
                        })
                    }
                    (None, Some((&other_num, _))) => {
                        return Some(LayoutIncompatibility::BindingNumber {
                            expected: None,
                            found: Some(other_num),
                        })
                    }
                    (Some((&self_num, self_binding)), Some((&other_num, other_binding))) => {
                        (self_num, self_binding, other_num, other_binding)
                    }
                };

            if self_num != other_num {
                return Some(LayoutIncompatibility::BindingNumber {
                    expected: Some(self_num),
                    found: Some(other_num),
                });
            }

            let binding = self_num;

            if self_binding.descriptor_count != other_binding.descriptor_count {
                return Some(LayoutIncompatibility::DescriptorCount {
                    binding,
                    expected: self_binding.descriptor_count,
                    found: other_binding.descriptor_count,
                });
            }

            if self_binding.descriptor_type != other_binding.descriptor_type {
                return Some(LayoutIncompatibility::DescriptorType {
                    binding,
                    expected: self_binding.descriptor_type,
                    found: other_binding.descriptor_type,
                });
            }

            if self_binding.stages != other_binding.stages {
                return Some(LayoutIncompatibility::Stages {
                    binding,
                    expected: self_binding.stages,
                    found: other_binding.stages,
                });
            }

            if self_binding.immutable_samplers != other_binding.immutable_samplers {
                return Some(LayoutIncompatibility::ImmutableSamplers { binding });
            }
        }

        if self.flags != other.flags {
            return Some(LayoutIncompatibility::Flags {
                expected: self.flags,
                found: other.flags,
            });
        }

        for (index, ((&binding, self_binding), other_binding)) in self
            .bindings
            .iter()
            .zip(other.bindings.values())
            .enumerate()
        {
            if self_binding.binding_flags != other_binding.binding_flags {
                return Some(LayoutIncompatibility::BindingFlags {
                    index,
                    binding,
                    expected: self_binding.binding_flags,
                    found: other_binding.binding_flags,
                });
            }
        }

        for ((&binding, self_binding), other_binding) in
            self.bindings.iter().zip(other.bindings.values())
        {
            if self_binding.mutable_descriptor_types != other_binding.mutable_descriptor_types {
                return Some(LayoutIncompatibility::MutableDescriptorTypes { binding });
            }
        }

        None
    }
}

/// The interned layout definitions of a device.
#[derive(Debug, Default)]
pub(crate) struct LayoutDictionary {
    definitions: HashSet<Arc<LayoutDefinition>>,
}

impl LayoutDictionary {
    /// Returns the shared definition that is equal to `definition`, inserting it if there is
    /// none yet.
    pub(crate) fn intern(&mut self, definition: LayoutDefinition) -> Arc<LayoutDefinition> {
        if let Some(existing) = self.definitions.get(&definition) {
            return existing.clone();
        }

        let definition = Arc::new(definition);
        self.definitions.insert(definition.clone());

        definition
    }

    /// Drops the definitions that are no longer used by any layout.
    pub(crate) fn prune(&mut self) {
        self.definitions
            .retain(|definition| Arc::strong_count(definition) > 1);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.definitions.len()
    }
}

/// The reason why two descriptor set layouts are not compatible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LayoutIncompatibility {
    /// The layouts have a different total number of descriptors.
    TotalDescriptorCount { expected: u32, found: u32 },

    /// The layouts don't have the same set of binding numbers.
    BindingNumber {
        expected: Option<u32>,
        found: Option<u32>,
    },

    /// A binding has a different descriptor count.
    DescriptorCount {
        binding: u32,
        expected: u32,
        found: u32,
    },

    /// A binding has a different descriptor type.
    DescriptorType {
        binding: u32,
        expected: DescriptorType,
        found: DescriptorType,
    },

    /// A binding has different stages.
    Stages {
        binding: u32,
        expected: ShaderStages,
        found: ShaderStages,
    },

    /// A binding has immutable samplers with different create parameters.
    ImmutableSamplers { binding: u32 },

    /// The layouts were created with different flags.
    Flags {
        expected: DescriptorSetLayoutCreateFlags,
        found: DescriptorSetLayoutCreateFlags,
    },

    /// A binding has different binding flags. `index` is the position of the binding in the
    /// binding flags array.
    BindingFlags {
        index: usize,
        binding: u32,
        expected: DescriptorBindingFlags,
        found: DescriptorBindingFlags,
    },

    /// A mutable binding has a different list of possible descriptor types.
    MutableDescriptorTypes { binding: u32 },

    /// The layouts have different definitions, but no individual difference was found.
    Undetermined,
}

impl LayoutIncompatibility {
    /// Returns the binding number that the incompatibility is about, if any.
    pub fn binding(&self) -> Option<u32> {
        match *self {
            LayoutIncompatibility::BindingNumber { expected, found } => expected.or(found),
            LayoutIncompatibility::DescriptorCount { binding, .. }
            | LayoutIncompatibility::DescriptorType { binding, .. }
            | LayoutIncompatibility::Stages { binding, .. }
            | LayoutIncompatibility::ImmutableSamplers { binding }
            | LayoutIncompatibility::BindingFlags { binding, .. }
            | LayoutIncompatibility::MutableDescriptorTypes { binding } => Some(binding),
            LayoutIncompatibility::TotalDescriptorCount { .. }
            | LayoutIncompatibility::Flags { .. }
            | LayoutIncompatibility::Undetermined => None,
        }
    }
}

impl Display for LayoutIncompatibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            LayoutIncompatibility::TotalDescriptorCount { expected, found } => write!(
                f,
                "the total descriptor count is {} instead of {}",
                found, expected,
            ),
            LayoutIncompatibility::BindingNumber { expected, found } => match (expected, found) {
                (Some(expected), Some(found)) => {
                    write!(f, "binding {} is present instead of binding {}", found, expected)
                }
                (Some(expected), None) => write!(f, "binding {} is missing", expected),
                (None, Some(found)) => write!(f, "binding {} is not expected", found),
                (None, None) => write!(f, "the binding numbers differ"),
            },
            LayoutIncompatibility::DescriptorCount {
                binding,
                expected,
                found,
            } => write!(
                f,
                "binding {} has a descriptor count of {} instead of {}",
                binding, found, expected,
            ),
            LayoutIncompatibility::DescriptorType {
                binding,
                expected,
                found,
            } => write!(
                f,
                "binding {} has descriptor type `DescriptorType::{:?}` instead of \
                `DescriptorType::{:?}`",
                binding, found, expected,
            ),
            LayoutIncompatibility::Stages {
                binding,
                expected,
                found,
            } => write!(
                f,
                "binding {} has stages `{:?}` instead of `{:?}`",
                binding, found, expected,
            ),
            LayoutIncompatibility::ImmutableSamplers { binding } => write!(
                f,
                "binding {} has immutable samplers with different create parameters",
                binding,
            ),
            LayoutIncompatibility::Flags { expected, found } => write!(
                f,
                "the layout flags are `{:?}` instead of `{:?}`",
                found, expected,
            ),
            LayoutIncompatibility::BindingFlags {
                index,
                binding,
                expected,
                found,
            } => write!(
                f,
                "binding flags element {} (binding {}) is `{:?}` instead of `{:?}`",
                index, binding, found, expected,
            ),
            LayoutIncompatibility::MutableDescriptorTypes { binding } => write!(
                f,
                "binding {} has a different list of mutable descriptor types",
                binding,
            ),
            LayoutIncompatibility::Undetermined => write!(
                f,
                "the layouts have different definitions, but no difference between them was found",
            ),
        }
    }
}

/// Parameters to create a new `DescriptorSetLayout`.
#[derive(Clone, Debug)]
pub struct DescriptorSetLayoutCreateInfo {
    /// Specifies how to create the descriptor set layout.
    pub flags: DescriptorSetLayoutCreateFlags,

    /// The bindings of the desriptor set layout. These are specified according to binding number.
    ///
    /// The default value is empty.
    pub bindings: BTreeMap<u32, DescriptorSetLayoutBinding>,

    pub _ne: crate::NonExhaustive,
}

impl Default for DescriptorSetLayoutCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            flags: DescriptorSetLayoutCreateFlags::empty(),
            bindings: BTreeMap::new(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl DescriptorSetLayoutCreateInfo {
    /// Validates the create info, returning every problem found.
    ///
    /// Problems with an individual binding don't prevent the other bindings from being checked,
    /// so that each offending binding is reported.
    pub(crate) fn validate(&self, device: &DeviceInfo) -> SmallVec<[Box<ValidationError>; 1]> {
        let mut errors = SmallVec::new();

        if let Err(err) = self.flags.validate_device(device) {
            errors.push(
                err.add_context("flags")
                    .set_vuids(&["VUID-VkDescriptorSetLayoutCreateInfo-flags-parameter"]),
            );
            return errors;
        }

        for (&binding_num, binding) in self.bindings.iter() {
            if let Err(err) = binding.validate(device) {
                errors.push(err.add_context(format!("bindings[{}]", binding_num)));
            }
        }

        if errors.is_empty() {
            if let Err(err) = self.validate_layout(device) {
                errors.push(err);
            }
        }

        errors
    }

    fn validate_layout(&self, device: &DeviceInfo) -> Result<(), Box<ValidationError>> {
        let &Self {
            flags,
            ref bindings,
            _ne: _,
        } = self;

        // VUID-VkDescriptorSetLayoutCreateInfo-binding-00279
        // Ensured because it is a map

        let mut total_descriptor_count = 0u32;
        let highest_binding_num = bindings.keys().copied().next_back();
        let mut update_after_bind_binding = None;
        let mut buffer_dynamic_binding = None;

        if flags.contains(
            DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL
                | DescriptorSetLayoutCreateFlags::HOST_ONLY_POOL,
        ) {
            return Err(Box::new(ValidationError {
                context: "flags".into(),
                problem: "contains both `DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL` \
                    and `DescriptorSetLayoutCreateFlags::HOST_ONLY_POOL`"
                    .into(),
                vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-flags-04590"],
                ..Default::default()
            }));
        }

        if flags.contains(
            DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR
                | DescriptorSetLayoutCreateFlags::HOST_ONLY_POOL,
        ) {
            return Err(Box::new(ValidationError {
                context: "flags".into(),
                problem: "contains both `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR` and \
                    `DescriptorSetLayoutCreateFlags::HOST_ONLY_POOL`"
                    .into(),
                vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-flags-04591"],
                ..Default::default()
            }));
        }

        if flags.contains(
            DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER
                | DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL,
        ) {
            return Err(Box::new(ValidationError {
                context: "flags".into(),
                problem: "contains both `DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER` and \
                    `DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL`"
                    .into(),
                vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-flags-08000"],
                ..Default::default()
            }));
        }

        if flags.intersects(DescriptorSetLayoutCreateFlags::EMBEDDED_IMMUTABLE_SAMPLERS) {
            if !flags.intersects(DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER) {
                return Err(Box::new(ValidationError {
                    context: "flags".into(),
                    problem: "contains \
                        `DescriptorSetLayoutCreateFlags::EMBEDDED_IMMUTABLE_SAMPLERS`, but not \
                        `DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER`"
                        .into(),
                    vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-flags-08001"],
                    ..Default::default()
                }));
            }

            for (&binding_num, binding) in bindings {
                if binding.descriptor_type != DescriptorType::Sampler
                    || binding.descriptor_count > 1
                    || binding.immutable_samplers.len() != binding.descriptor_count as usize
                {
                    return Err(Box::new(ValidationError {
                        problem: format!(
                            "`flags` contains \
                            `DescriptorSetLayoutCreateFlags::EMBEDDED_IMMUTABLE_SAMPLERS`, but \
                            `bindings[{}]` is not a single sampler with an immutable sampler",
                            binding_num,
                        )
                        .into(),
                        vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-flags-08002"],
                        ..Default::default()
                    }));
                }
            }
        }

        for (&binding_num, binding) in bindings.iter() {
            let &DescriptorSetLayoutBinding {
                binding_flags,
                descriptor_type,
                descriptor_count,
                stages: _,
                immutable_samplers: _,
                mutable_descriptor_types: _,
                _ne: _,
            } = binding;

            total_descriptor_count = total_descriptor_count.saturating_add(descriptor_count);

            if flags.intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR) {
                if matches!(
                    descriptor_type,
                    DescriptorType::UniformBufferDynamic
                        | DescriptorType::StorageBufferDynamic
                        | DescriptorType::InlineUniformBlock
                ) {
                    return Err(Box::new(ValidationError {
                        problem: format!(
                            "`flags` contains `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`, \
                            and `bindings[{}].descriptor_type` is \
                            `DescriptorType::UniformBufferDynamic`, \
                            `DescriptorType::StorageBufferDynamic` or \
                            `DescriptorType::InlineUniformBlock`",
                            binding_num
                        )
                        .into(),
                        vuids: &[
                            "VUID-VkDescriptorSetLayoutCreateInfo-flags-00280",
                            "VUID-VkDescriptorSetLayoutCreateInfo-flags-02208",
                        ],
                        ..Default::default()
                    }));
                }

                if binding_flags.intersects(
                    DescriptorBindingFlags::UPDATE_AFTER_BIND
                        | DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING
                        | DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
                ) {
                    return Err(Box::new(ValidationError {
                        problem: format!(
                            "`flags` contains `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`, \
                            and `bindings[{}].binding_flags` contains \
                            `DescriptorBindingFlags::UPDATE_AFTER_BIND`, \
                            `DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING` or \
                            `DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT`",
                            binding_num
                        )
                        .into(),
                        vuids: &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-flags-03003"],
                        ..Default::default()
                    }));
                }
            }

            if binding_flags.intersects(DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT)
                && Some(binding_num) != highest_binding_num
            {
                return Err(Box::new(ValidationError {
                    problem: format!(
                        "`bindings[{}].binding_flags` contains \
                        `DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT`, but {0} is not the \
                        highest binding number in `bindings`",
                        binding_num
                    )
                    .into(),
                    vuids: &[
                        "VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-pBindingFlags-03004",
                    ],
                    ..Default::default()
                }));
            }

            if binding_flags.intersects(DescriptorBindingFlags::UPDATE_AFTER_BIND) {
                if !flags.intersects(DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL) {
                    return Err(Box::new(ValidationError {
                        problem: format!(
                            "`bindings[{}].binding_flags` contains \
                            `DescriptorBindingFlags::UPDATE_AFTER_BIND`, but \
                            `flags` does not contain \
                            `DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL`",
                            binding_num
                        )
                        .into(),
                        vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-flags-03000"],
                        ..Default::default()
                    }));
                }

                update_after_bind_binding.get_or_insert(binding_num);
            }

            if descriptor_type.is_dynamic() {
                buffer_dynamic_binding.get_or_insert(binding_num);
            }
        }

        if flags.intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR)
            && total_descriptor_count > device.properties().max_push_descriptors
        {
            return Err(Box::new(ValidationError {
                problem: "`flags` contains `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`, and \
                    the total number of descriptors in `bindings` exceeds the \
                    `max_push_descriptors` limit"
                    .into(),
                vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-flags-00281"],
                ..Default::default()
            }));
        }

        if let (Some(update_after_bind_binding), Some(buffer_dynamic_binding)) =
            (update_after_bind_binding, buffer_dynamic_binding)
        {
            return Err(Box::new(ValidationError {
                problem: format!(
                    "`bindings[{}].binding_flags` contains \
                    `DescriptorBindingFlags::UPDATE_AFTER_BIND`, and \
                    `bindings[{}].descriptor_type` is \
                    `DescriptorType::UniformBufferDynamic` or \
                    `DescriptorType::StorageBufferDynamic`",
                    update_after_bind_binding, buffer_dynamic_binding
                )
                .into(),
                vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-descriptorType-03001"],
                ..Default::default()
            }));
        }

        Ok(())
    }
}

vulkan_bitflags! {
    #[non_exhaustive]

    /// Flags that control how a descriptor set layout is created.
    DescriptorSetLayoutCreateFlags = DescriptorSetLayoutCreateFlags(u32);

    /// Whether descriptor sets using this descriptor set layout must be allocated from a
    /// descriptor pool whose flags contain [`DescriptorPoolCreateFlags::UPDATE_AFTER_BIND`].
    ///
    /// This flag must be specified whenever the layout contains one or more bindings that have
    /// the [`DescriptorBindingFlags::UPDATE_AFTER_BIND`] flag.
    ///
    /// [`DescriptorPoolCreateFlags::UPDATE_AFTER_BIND`]: crate::descriptor_set::pool::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND
    UPDATE_AFTER_BIND_POOL = UPDATE_AFTER_BIND_POOL
    RequiresOneOf([
        RequiresAllOf([APIVersion(V1_2)]),
        RequiresAllOf([DeviceExtension(ext_descriptor_indexing)]),
    ]),

    /// Whether the descriptor set layout should be created for push descriptors.
    ///
    /// If set, the layout can only be used for push descriptors, and if not set, it can only
    /// be used for regular descriptor sets.
    PUSH_DESCRIPTOR = PUSH_DESCRIPTOR_KHR
    RequiresOneOf([
        RequiresAllOf([DeviceExtension(khr_push_descriptor)]),
    ]),

    /// Whether the descriptor set layout is used with descriptor buffers instead of descriptor
    /// sets allocated from a pool.
    DESCRIPTOR_BUFFER = DESCRIPTOR_BUFFER_EXT
    RequiresOneOf([
        RequiresAllOf([DeviceExtension(ext_descriptor_buffer)]),
    ]),

    /// Whether the immutable samplers of the layout are embedded, and bound with
    /// `vkCmdBindDescriptorBufferEmbeddedSamplersEXT`.
    EMBEDDED_IMMUTABLE_SAMPLERS = EMBEDDED_IMMUTABLE_SAMPLERS_EXT
    RequiresOneOf([
        RequiresAllOf([DeviceExtension(ext_descriptor_buffer)]),
    ]),

    /// Whether descriptor sets using this layout are allocated from a host-only pool, and can
    /// therefore never be bound.
    HOST_ONLY_POOL = HOST_ONLY_POOL_EXT
    RequiresOneOf([
        RequiresAllOf([DeviceExtension(ext_mutable_descriptor_type)]),
    ]),
}

/// A binding in a descriptor set layout, as it is specified at creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DescriptorSetLayoutBinding {
    /// Specifies how to create the binding.
    ///
    /// The default value is empty.
    pub binding_flags: DescriptorBindingFlags,

    /// The content and layout of each array element of a binding.
    ///
    /// There is no default value.
    pub descriptor_type: DescriptorType,

    /// How many descriptors (array elements) this binding is made of.
    ///
    /// If the binding is a single element rather than an array, then you must specify `1`.
    ///
    /// The default value is `1`.
    pub descriptor_count: u32,

    /// Which shader stages are going to access the descriptors in this binding.
    ///
    /// The default value is [`ShaderStages::empty()`], which must be overridden.
    pub stages: ShaderStages,

    /// Samplers that are included as a fixed part of the descriptor set layout. Once bound, they
    /// do not need to be provided when creating a descriptor set.
    ///
    /// The default value is empty.
    pub immutable_samplers: Vec<vk::Sampler>,

    /// If `descriptor_type` is [`DescriptorType::Mutable`], the descriptor types that the
    /// descriptors of the binding can take on.
    ///
    /// The default value is empty.
    pub mutable_descriptor_types: Vec<DescriptorType>,

    pub _ne: crate::NonExhaustive,
}

impl DescriptorSetLayoutBinding {
    /// Returns a `DescriptorSetLayoutBinding` with the given type.
    #[inline]
    pub fn descriptor_type(descriptor_type: DescriptorType) -> Self {
        Self {
            binding_flags: DescriptorBindingFlags::empty(),
            descriptor_type,
            descriptor_count: 1,
            stages: ShaderStages::empty(),
            immutable_samplers: Vec::new(),
            mutable_descriptor_types: Vec::new(),
            _ne: crate::NonExhaustive(()),
        }
    }

    pub(crate) fn validate(&self, device: &DeviceInfo) -> Result<(), Box<ValidationError>> {
        let &Self {
            binding_flags,
            descriptor_type,
            descriptor_count,
            stages: _,
            ref immutable_samplers,
            ref mutable_descriptor_types,
            _ne: _,
        } = self;

        binding_flags.validate_device(device).map_err(|err| {
            err.add_context("binding_flags").set_vuids(&[
                "VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-pBindingFlags-parameter",
            ])
        })?;

        descriptor_type.validate_device(device).map_err(|err| {
            err.add_context("descriptor_type")
                .set_vuids(&["VUID-VkDescriptorSetLayoutBinding-descriptorType-parameter"])
        })?;

        match descriptor_type {
            DescriptorType::InlineUniformBlock => {
                if !device.enabled_features().inline_uniform_block {
                    return Err(Box::new(ValidationError {
                        context: "descriptor_type".into(),
                        problem: "`DescriptorType::InlineUniformBlock`".into(),
                        requires_one_of: RequiresOneOf(&[RequiresAllOf(&[
                            Requires::DeviceFeature("inline_uniform_block"),
                        ])]),
                        vuids: &["VUID-VkDescriptorSetLayoutBinding-descriptorType-04604"],
                    }));
                }

                if descriptor_count % 4 != 0 {
                    return Err(Box::new(ValidationError {
                        problem: "`descriptor_type` is `DescriptorType::InlineUniformBlock`, and \
                            `descriptor_count` is not a multiple of 4"
                            .into(),
                        vuids: &["VUID-VkDescriptorSetLayoutBinding-descriptorType-02209"],
                        ..Default::default()
                    }));
                }

                if descriptor_count > device.properties().max_inline_uniform_block_size {
                    return Err(Box::new(ValidationError {
                        problem: "`descriptor_type` is `DescriptorType::InlineUniformBlock`, and \
                            `descriptor_count` is greater than the \
                            `max_inline_uniform_block_size` limit"
                            .into(),
                        vuids: &["VUID-VkDescriptorSetLayoutBinding-descriptorType-08004"],
                        ..Default::default()
                    }));
                }
            }
            DescriptorType::AccelerationStructure => {
                if !device.enabled_features().acceleration_structure {
                    return Err(Box::new(ValidationError {
                        context: "descriptor_type".into(),
                        problem: "`DescriptorType::AccelerationStructure`".into(),
                        requires_one_of: RequiresOneOf(&[RequiresAllOf(&[
                            Requires::DeviceFeature("acceleration_structure"),
                        ])]),
                        ..Default::default()
                    }));
                }
            }
            DescriptorType::Mutable => {
                if !device.enabled_features().mutable_descriptor_type {
                    return Err(Box::new(ValidationError {
                        context: "descriptor_type".into(),
                        problem: "`DescriptorType::Mutable`".into(),
                        requires_one_of: RequiresOneOf(&[RequiresAllOf(&[
                            Requires::DeviceFeature("mutable_descriptor_type"),
                        ])]),
                        vuids: &["VUID-VkDescriptorSetLayoutBinding-descriptorType-04605"],
                    }));
                }

                if mutable_descriptor_types.is_empty() {
                    return Err(Box::new(ValidationError {
                        problem: "`descriptor_type` is `DescriptorType::Mutable`, but \
                            `mutable_descriptor_types` is empty"
                            .into(),
                        vuids: &["VUID-VkDescriptorSetLayoutCreateInfo-pBindings-07303"],
                        ..Default::default()
                    }));
                }

                for (index, &ty) in mutable_descriptor_types.iter().enumerate() {
                    if matches!(
                        ty,
                        DescriptorType::Mutable
                            | DescriptorType::UniformBufferDynamic
                            | DescriptorType::StorageBufferDynamic
                            | DescriptorType::InlineUniformBlock
                    ) {
                        return Err(Box::new(ValidationError {
                            context: format!("mutable_descriptor_types[{}]", index).into(),
                            problem: "is `DescriptorType::Mutable`, a dynamic buffer type or \
                                `DescriptorType::InlineUniformBlock`"
                                .into(),
                            vuids: &[
                                "VUID-VkMutableDescriptorTypeListEXT-pDescriptorTypes-04601",
                                "VUID-VkMutableDescriptorTypeListEXT-pDescriptorTypes-04602",
                                "VUID-VkMutableDescriptorTypeListEXT-pDescriptorTypes-04603",
                            ],
                            ..Default::default()
                        }));
                    }

                    if mutable_descriptor_types[..index].contains(&ty) {
                        return Err(Box::new(ValidationError {
                            context: format!("mutable_descriptor_types[{}]", index).into(),
                            problem: "occurs more than once in the list".into(),
                            vuids: &["VUID-VkMutableDescriptorTypeListEXT-pDescriptorTypes-04600"],
                            ..Default::default()
                        }));
                    }
                }
            }
            _ => (),
        }

        if descriptor_type != DescriptorType::Mutable && !mutable_descriptor_types.is_empty() {
            return Err(Box::new(ValidationError {
                problem: "`mutable_descriptor_types` is not empty, but `descriptor_type` is not \
                    `DescriptorType::Mutable`"
                    .into(),
                vuids: &["VUID-VkMutableDescriptorTypeListEXT-descriptorTypeCount-04599"],
                ..Default::default()
            }));
        }

        if descriptor_count != 0 {
            if descriptor_type == DescriptorType::InputAttachment
                && !(self.stages.is_empty() || self.stages == ShaderStages::FRAGMENT)
            {
                return Err(Box::new(ValidationError {
                    problem: "`descriptor_type` is `DescriptorType::InputAttachment`, but \
                        `stages` is not either empty or equal to `ShaderStages::FRAGMENT`"
                        .into(),
                    vuids: &["VUID-VkDescriptorSetLayoutBinding-descriptorType-01510"],
                    ..Default::default()
                }));
            }
        }

        if !immutable_samplers.is_empty() {
            if descriptor_count != immutable_samplers.len() as u32 {
                return Err(Box::new(ValidationError {
                    problem: "`immutable_samplers` is not empty, but its length does not equal \
                        `descriptor_count`"
                        .into(),
                    vuids: &["VUID-VkDescriptorSetLayoutBinding-descriptorType-00282"],
                    ..Default::default()
                }));
            }

            if !matches!(
                descriptor_type,
                DescriptorType::Sampler | DescriptorType::CombinedImageSampler
            ) {
                return Err(Box::new(ValidationError {
                    problem: "`immutable_samplers` is not empty, but `descriptor_type` is not \
                        `DescriptorType::Sampler` or `DescriptorType::CombinedImageSampler`"
                        .into(),
                    vuids: &["VUID-VkDescriptorSetLayoutBinding-descriptorType-00282"],
                    ..Default::default()
                }));
            }
        }

        if binding_flags.intersects(DescriptorBindingFlags::UPDATE_AFTER_BIND) {
            let features = device.enabled_features();
            let (enabled, requires_one_of, vuids): (_, _, &'static [&'static str]) = match descriptor_type {
                DescriptorType::UniformBuffer => (
                    features.descriptor_binding_uniform_buffer_update_after_bind,
                    RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                        "descriptor_binding_uniform_buffer_update_after_bind",
                    )])]),
                    &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingUniformBufferUpdateAfterBind-03005"],
                ),
                DescriptorType::Sampler
                | DescriptorType::CombinedImageSampler
                | DescriptorType::SampledImage => (
                    features.descriptor_binding_sampled_image_update_after_bind,
                    RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                        "descriptor_binding_sampled_image_update_after_bind",
                    )])]),
                    &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingSampledImageUpdateAfterBind-03006"],
                ),
                DescriptorType::StorageImage => (
                    features.descriptor_binding_storage_image_update_after_bind,
                    RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                        "descriptor_binding_storage_image_update_after_bind",
                    )])]),
                    &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingStorageImageUpdateAfterBind-03007"],
                ),
                DescriptorType::StorageBuffer => (
                    features.descriptor_binding_storage_buffer_update_after_bind,
                    RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                        "descriptor_binding_storage_buffer_update_after_bind",
                    )])]),
                    &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingStorageBufferUpdateAfterBind-03008"],
                ),
                DescriptorType::UniformTexelBuffer => (
                    features.descriptor_binding_uniform_texel_buffer_update_after_bind,
                    RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                        "descriptor_binding_uniform_texel_buffer_update_after_bind",
                    )])]),
                    &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingUniformTexelBufferUpdateAfterBind-03009"],
                ),
                DescriptorType::StorageTexelBuffer => (
                    features.descriptor_binding_storage_texel_buffer_update_after_bind,
                    RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                        "descriptor_binding_storage_texel_buffer_update_after_bind",
                    )])]),
                    &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingStorageTexelBufferUpdateAfterBind-03010"],
                ),
                DescriptorType::InlineUniformBlock => (
                    features.descriptor_binding_inline_uniform_block_update_after_bind,
                    RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                        "descriptor_binding_inline_uniform_block_update_after_bind",
                    )])]),
                    &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingInlineUniformBlockUpdateAfterBind-02211"],
                ),
                DescriptorType::AccelerationStructure => (
                    features.descriptor_binding_acceleration_structure_update_after_bind,
                    RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                        "descriptor_binding_acceleration_structure_update_after_bind",
                    )])]),
                    &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingAccelerationStructureUpdateAfterBind-03570"],
                ),
                DescriptorType::Mutable => (true, RequiresOneOf::default(), &[]),
                DescriptorType::InputAttachment
                | DescriptorType::UniformBufferDynamic
                | DescriptorType::StorageBufferDynamic => {
                    return Err(Box::new(ValidationError {
                        problem: "`binding_flags` contains \
                            `DescriptorBindingFlags::UPDATE_AFTER_BIND`, and \
                            `descriptor_type` is `DescriptorType::InputAttachment`, \
                            `DescriptorType::UniformBufferDynamic` or \
                            `DescriptorType::StorageBufferDynamic`"
                            .into(),
                        vuids: &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-None-03011"],
                        ..Default::default()
                    }));
                }
            };

            if !enabled {
                return Err(Box::new(ValidationError {
                    problem: format!(
                        "`binding_flags` contains `DescriptorBindingFlags::UPDATE_AFTER_BIND`, \
                        and `descriptor_type` is `DescriptorType::{:?}`",
                        descriptor_type,
                    )
                    .into(),
                    requires_one_of,
                    vuids,
                    ..Default::default()
                }));
            }
        }

        if binding_flags.intersects(DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING)
            && !device
                .enabled_features()
                .descriptor_binding_update_unused_while_pending
        {
            return Err(Box::new(ValidationError {
                context: "binding_flags".into(),
                problem: "contains `DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING`".into(),
                requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                    "descriptor_binding_update_unused_while_pending",
                )])]),
                vuids: &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingUpdateUnusedWhilePending-03012"],
            }));
        }

        if binding_flags.intersects(DescriptorBindingFlags::PARTIALLY_BOUND)
            && !device.enabled_features().descriptor_binding_partially_bound
        {
            return Err(Box::new(ValidationError {
                context: "binding_flags".into(),
                problem: "contains `DescriptorBindingFlags::PARTIALLY_BOUND`".into(),
                requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                    "descriptor_binding_partially_bound",
                )])]),
                vuids: &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingPartiallyBound-03013"],
            }));
        }

        if binding_flags.intersects(DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT) {
            if !device
                .enabled_features()
                .descriptor_binding_variable_descriptor_count
            {
                return Err(Box::new(ValidationError {
                    context: "binding_flags".into(),
                    problem: "contains `DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT`".into(),
                    requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                        "descriptor_binding_variable_descriptor_count",
                    )])]),
                    vuids: &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingVariableDescriptorCount-03014"],
                }));
            }

            if descriptor_type.is_dynamic() {
                return Err(Box::new(ValidationError {
                    problem: "`binding_flags` contains \
                        `DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT`, and \
                        `descriptor_type` is `DescriptorType::UniformBufferDynamic` or \
                        `DescriptorType::StorageBufferDynamic`"
                        .into(),
                    vuids: &[
                        "VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-pBindingFlags-03015",
                    ],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

/// A binding of an interned [`LayoutDefinition`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LayoutBinding {
    pub binding_flags: DescriptorBindingFlags,
    pub descriptor_type: DescriptorType,
    pub descriptor_count: u32,
    pub stages: ShaderStages,
    pub immutable_samplers: Vec<ImmutableSampler>,
    pub mutable_descriptor_types: Vec<DescriptorType>,
}

impl LayoutBinding {
    /// Returns whether the binding has immutable samplers.
    #[inline]
    pub fn has_immutable_samplers(&self) -> bool {
        !self.immutable_samplers.is_empty()
    }

    /// Returns whether a descriptor of type `ty` can be written to the binding. For mutable
    /// bindings, this is any of the binding's mutable descriptor types.
    #[inline]
    pub fn accepts_descriptor_type(&self, ty: DescriptorType) -> bool {
        if self.descriptor_type == DescriptorType::Mutable {
            ty == DescriptorType::Mutable || self.mutable_descriptor_types.contains(&ty)
        } else {
            self.descriptor_type == ty
        }
    }

    /// Checks whether the binding satisfies the requirements of a shader.
    pub(crate) fn ensure_compatible_with_shader(
        &self,
        binding_requirements: &DescriptorBindingRequirements,
    ) -> Result<(), Box<ValidationError>> {
        let &DescriptorBindingRequirements {
            ref descriptor_types,
            descriptor_count,
            stages,
            descriptors: _,
        } = binding_requirements;

        if !descriptor_types
            .iter()
            .any(|&ty| self.accepts_descriptor_type(ty))
        {
            return Err(Box::new(ValidationError {
                problem: "the descriptor type is not one of the types allowed by the \
                    descriptor binding requirements"
                    .into(),
                ..Default::default()
            }));
        }

        if let Some(required) = descriptor_count {
            if self.descriptor_count < required {
                return Err(Box::new(ValidationError {
                    problem: "the descriptor count is less than the count required by the \
                        descriptor binding requirements"
                        .into(),
                    ..Default::default()
                }));
            }
        }

        if !self.stages.contains(stages) {
            return Err(Box::new(ValidationError {
                problem: "the stages are not a superset of the stages required by the \
                    descriptor binding requirements"
                    .into(),
                ..Default::default()
            }));
        }

        Ok(())
    }
}

/// An immutable sampler of a layout binding.
///
/// Immutable samplers are compared and hashed by their create parameters, not by their handle.
#[derive(Clone, Debug)]
pub struct ImmutableSampler {
    pub handle: vk::Sampler,
    pub create_info: SamplerCreateInfo,
}

impl PartialEq for ImmutableSampler {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.create_info == other.create_info
    }
}

impl Eq for ImmutableSampler {}

impl Hash for ImmutableSampler {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let SamplerCreateInfo {
            mag_filter,
            min_filter,
            mipmap_mode,
            address_mode,
            mip_lod_bias,
            anisotropy,
            compare,
            min_lod,
            max_lod,
            border_color,
            unnormalized_coordinates,
            sampler_ycbcr_conversion,
            _ne: _,
        } = &self.create_info;

        mag_filter.hash(state);
        min_filter.hash(state);
        mipmap_mode.hash(state);
        address_mode.hash(state);
        mip_lod_bias.to_bits().hash(state);
        anisotropy.map(f32::to_bits).hash(state);
        compare.hash(state);
        min_lod.to_bits().hash(state);
        max_lod.to_bits().hash(state);
        border_color.hash(state);
        unnormalized_coordinates.hash(state);
        sampler_ycbcr_conversion.hash(state);
    }
}

vulkan_bitflags! {
    #[non_exhaustive]

    /// Flags that control how a binding in a descriptor set layout is created.
    DescriptorBindingFlags = DescriptorBindingFlags(u32);

    /// Allows descriptors in this binding to be updated after a command buffer has already
    /// recorded a bind command containing a descriptor set with this layout, as long as the
    /// command buffer is not executing.
    UPDATE_AFTER_BIND = UPDATE_AFTER_BIND
    RequiresOneOf([
        RequiresAllOf([APIVersion(V1_2)]),
        RequiresAllOf([DeviceExtension(ext_descriptor_indexing)]),
    ]),

    /// Allows descriptors in this binding to be updated after a command buffer has already
    /// recorded a bind command, even while the command buffer is executing, as long as the
    /// descriptors are not used by the executing commands.
    UPDATE_UNUSED_WHILE_PENDING = UPDATE_UNUSED_WHILE_PENDING
    RequiresOneOf([
        RequiresAllOf([APIVersion(V1_2)]),
        RequiresAllOf([DeviceExtension(ext_descriptor_indexing)]),
    ]),

    /// Allows descriptors to be left empty or invalid, as long as they are not used by a shader.
    PARTIALLY_BOUND = PARTIALLY_BOUND
    RequiresOneOf([
        RequiresAllOf([APIVersion(V1_2)]),
        RequiresAllOf([DeviceExtension(ext_descriptor_indexing)]),
    ]),

    /// Whether the binding has a variable number of descriptors, which is specified when the
    /// descriptor set is allocated. Only the highest-numbered binding can have this flag.
    VARIABLE_DESCRIPTOR_COUNT = VARIABLE_DESCRIPTOR_COUNT
    RequiresOneOf([
        RequiresAllOf([APIVersion(V1_2)]),
        RequiresAllOf([DeviceExtension(ext_descriptor_indexing)]),
    ]),
}

vulkan_enum! {
    #[non_exhaustive]

    /// Describes what kind of resource may later be bound to a descriptor.
    DescriptorType = DescriptorType(i32);

    Sampler = SAMPLER,
    CombinedImageSampler = COMBINED_IMAGE_SAMPLER,
    SampledImage = SAMPLED_IMAGE,
    StorageImage = STORAGE_IMAGE,
    UniformTexelBuffer = UNIFORM_TEXEL_BUFFER,
    StorageTexelBuffer = STORAGE_TEXEL_BUFFER,
    UniformBuffer = UNIFORM_BUFFER,
    StorageBuffer = STORAGE_BUFFER,
    UniformBufferDynamic = UNIFORM_BUFFER_DYNAMIC,
    StorageBufferDynamic = STORAGE_BUFFER_DYNAMIC,
    InputAttachment = INPUT_ATTACHMENT,

    /// Gives read-only access to an inline array of bytes. The descriptor count of the binding
    /// is the number of bytes.
    InlineUniformBlock = INLINE_UNIFORM_BLOCK
    RequiresOneOf([
        RequiresAllOf([APIVersion(V1_3)]),
        RequiresAllOf([DeviceExtension(ext_inline_uniform_block)]),
    ]),

    AccelerationStructure = ACCELERATION_STRUCTURE_KHR
    RequiresOneOf([
        RequiresAllOf([DeviceExtension(khr_acceleration_structure)]),
    ]),

    /// Each descriptor can take on any of the types listed in the binding's
    /// `mutable_descriptor_types`. The type that a descriptor currently has is determined by the
    /// last write to it.
    Mutable = MUTABLE_EXT
    RequiresOneOf([
        RequiresAllOf([DeviceExtension(ext_mutable_descriptor_type)]),
    ]),
}

impl DescriptorType {
    /// Returns whether the type takes a dynamic offset when bound.
    #[inline]
    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            DescriptorType::UniformBufferDynamic | DescriptorType::StorageBufferDynamic
        )
    }

    pub(crate) fn default_image_layout(self) -> ImageLayout {
        match self {
            DescriptorType::CombinedImageSampler
            | DescriptorType::SampledImage
            | DescriptorType::InputAttachment => ImageLayout::ShaderReadOnlyOptimal,
            DescriptorType::StorageImage => ImageLayout::General,
            DescriptorType::Sampler
            | DescriptorType::UniformTexelBuffer
            | DescriptorType::StorageTexelBuffer
            | DescriptorType::UniformBuffer
            | DescriptorType::StorageBuffer
            | DescriptorType::UniformBufferDynamic
            | DescriptorType::StorageBufferDynamic
            | DescriptorType::InlineUniformBlock
            | DescriptorType::AccelerationStructure
            | DescriptorType::Mutable => ImageLayout::Undefined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DescriptorBindingFlags, DescriptorSetLayout, DescriptorSetLayoutBinding,
        DescriptorSetLayoutCreateFlags, DescriptorSetLayoutCreateInfo, DescriptorType,
        LayoutDefinition, LayoutDictionary, LayoutIncompatibility,
    };
    use crate::{
        device::{DeviceExtensions, DeviceFeatures, DeviceInfo},
        resources::{ResourceTable, SamplerCreateInfo, SamplerInfo},
        shader::ShaderStages,
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    fn layout(
        dictionary: &mut LayoutDictionary,
        resources: &ResourceTable,
        raw: u64,
        create_info: &DescriptorSetLayoutCreateInfo,
    ) -> DescriptorSetLayout {
        let definition = LayoutDefinition::from_create_info(create_info, resources).unwrap();
        DescriptorSetLayout::new(
            vk::DescriptorSetLayout::from_raw(raw),
            dictionary.intern(definition),
        )
    }

    fn fragment_layout(sampled_image_stages: ShaderStages) -> DescriptorSetLayoutCreateInfo {
        DescriptorSetLayoutCreateInfo {
            bindings: [
                (
                    0,
                    DescriptorSetLayoutBinding {
                        descriptor_count: 2,
                        stages: ShaderStages::FRAGMENT,
                        ..DescriptorSetLayoutBinding::descriptor_type(DescriptorType::UniformBuffer)
                    },
                ),
                (
                    1,
                    DescriptorSetLayoutBinding {
                        descriptor_count: 4,
                        stages: sampled_image_stages,
                        ..DescriptorSetLayoutBinding::descriptor_type(DescriptorType::SampledImage)
                    },
                ),
            ]
            .into(),
            ..Default::default()
        }
    }

    #[test]
    fn descriptor_counts() {
        let mut dictionary = LayoutDictionary::default();
        let resources = ResourceTable::new();
        let sl = layout(
            &mut dictionary,
            &resources,
            1,
            &fragment_layout(ShaderStages::FRAGMENT),
        );

        assert_eq!(sl.total_descriptor_count(), 6);
        assert_eq!(sl.descriptor_counts()[&DescriptorType::UniformBuffer], 2);
        assert_eq!(sl.descriptor_counts()[&DescriptorType::SampledImage], 4);
        assert_eq!(sl.variable_descriptor_binding(), None);
    }

    #[test]
    fn identical_definitions_are_interned() {
        let mut dictionary = LayoutDictionary::default();
        let resources = ResourceTable::new();
        let create_info = fragment_layout(ShaderStages::FRAGMENT);

        let first = layout(&mut dictionary, &resources, 1, &create_info);
        let second = layout(&mut dictionary, &resources, 2, &create_info);

        assert!(Arc::ptr_eq(first.definition(), second.definition()));
        assert_eq!(dictionary.len(), 1);
        assert_eq!(first.is_compatible_with(&second), Ok(()));
        assert_eq!(second.is_compatible_with(&first), Ok(()));

        drop(first);
        drop(second);
        dictionary.prune();
        assert_eq!(dictionary.len(), 0);
    }

    #[test]
    fn different_stages_name_binding() {
        let mut dictionary = LayoutDictionary::default();
        let resources = ResourceTable::new();

        let reference = layout(
            &mut dictionary,
            &resources,
            1,
            &fragment_layout(ShaderStages::FRAGMENT),
        );
        let candidate = layout(
            &mut dictionary,
            &resources,
            2,
            &fragment_layout(ShaderStages::VERTEX),
        );

        let err = reference.is_compatible_with(&candidate).unwrap_err();
        assert_eq!(
            err,
            LayoutIncompatibility::Stages {
                binding: 1,
                expected: ShaderStages::FRAGMENT,
                found: ShaderStages::VERTEX,
            },
        );
        assert_eq!(err.binding(), Some(1));
    }

    #[test]
    fn different_type_names_binding() {
        let mut dictionary = LayoutDictionary::default();
        let resources = ResourceTable::new();

        let mut create_info = fragment_layout(ShaderStages::FRAGMENT);
        let reference = layout(&mut dictionary, &resources, 1, &create_info);

        create_info.bindings.get_mut(&0).unwrap().descriptor_type = DescriptorType::StorageBuffer;
        let candidate = layout(&mut dictionary, &resources, 2, &create_info);

        let err = reference.is_compatible_with(&candidate).unwrap_err();
        assert!(matches!(
            err,
            LayoutIncompatibility::DescriptorType {
                binding: 0,
                expected: DescriptorType::UniformBuffer,
                found: DescriptorType::StorageBuffer,
            }
        ));
    }

    #[test]
    fn total_count_checked_first() {
        let mut dictionary = LayoutDictionary::default();
        let resources = ResourceTable::new();

        let mut create_info = fragment_layout(ShaderStages::FRAGMENT);
        let reference = layout(&mut dictionary, &resources, 1, &create_info);

        // Differs in both count and type; the count is reported.
        let binding = create_info.bindings.get_mut(&1).unwrap();
        binding.descriptor_count = 8;
        binding.descriptor_type = DescriptorType::StorageImage;
        let candidate = layout(&mut dictionary, &resources, 2, &create_info);

        assert_eq!(
            reference.is_compatible_with(&candidate),
            Err(LayoutIncompatibility::TotalDescriptorCount {
                expected: 6,
                found: 10,
            }),
        );
    }

    #[test]
    fn binding_flags_report_index() {
        let mut dictionary = LayoutDictionary::default();
        let resources = ResourceTable::new();

        let mut create_info = fragment_layout(ShaderStages::FRAGMENT);
        let reference = layout(&mut dictionary, &resources, 1, &create_info);

        create_info.bindings.get_mut(&1).unwrap().binding_flags =
            DescriptorBindingFlags::PARTIALLY_BOUND;
        let candidate = layout(&mut dictionary, &resources, 2, &create_info);

        assert_eq!(
            reference.is_compatible_with(&candidate),
            Err(LayoutIncompatibility::BindingFlags {
                index: 1,
                binding: 1,
                expected: DescriptorBindingFlags::empty(),
                found: DescriptorBindingFlags::PARTIALLY_BOUND,
            }),
        );
    }

    #[test]
    fn immutable_samplers_compared_by_parameters() {
        let mut dictionary = LayoutDictionary::default();
        let resources = ResourceTable::new();

        let linear = SamplerCreateInfo {
            mag_filter: vk::Filter::LINEAR,
            ..Default::default()
        };
        resources.insert_sampler(
            vk::Sampler::from_raw(10),
            SamplerInfo {
                create_info: linear.clone(),
            },
        );
        resources.insert_sampler(
            vk::Sampler::from_raw(11),
            SamplerInfo {
                create_info: linear,
            },
        );
        resources.insert_sampler(
            vk::Sampler::from_raw(12),
            SamplerInfo {
                create_info: SamplerCreateInfo::default(),
            },
        );

        let with_sampler = |raw| DescriptorSetLayoutCreateInfo {
            bindings: [(
                0,
                DescriptorSetLayoutBinding {
                    stages: ShaderStages::FRAGMENT,
                    immutable_samplers: vec![vk::Sampler::from_raw(raw)],
                    ..DescriptorSetLayoutBinding::descriptor_type(DescriptorType::Sampler)
                },
            )]
            .into(),
            ..Default::default()
        };

        let first = layout(&mut dictionary, &resources, 1, &with_sampler(10));
        let same_parameters = layout(&mut dictionary, &resources, 2, &with_sampler(11));
        let other_parameters = layout(&mut dictionary, &resources, 3, &with_sampler(12));

        assert_eq!(first.is_compatible_with(&same_parameters), Ok(()));
        assert_eq!(
            first.is_compatible_with(&other_parameters),
            Err(LayoutIncompatibility::ImmutableSamplers { binding: 0 }),
        );
    }

    #[test]
    fn capability_reported_per_binding() {
        let device = DeviceInfo {
            enabled_extensions: DeviceExtensions {
                ext_descriptor_indexing: true,
                ..DeviceExtensions::empty()
            },
            ..Default::default()
        };

        let create_info = DescriptorSetLayoutCreateInfo {
            bindings: [
                (
                    0,
                    DescriptorSetLayoutBinding {
                        binding_flags: DescriptorBindingFlags::PARTIALLY_BOUND,
                        stages: ShaderStages::FRAGMENT,
                        ..DescriptorSetLayoutBinding::descriptor_type(DescriptorType::SampledImage)
                    },
                ),
                (
                    1,
                    DescriptorSetLayoutBinding {
                        stages: ShaderStages::FRAGMENT,
                        ..DescriptorSetLayoutBinding::descriptor_type(DescriptorType::SampledImage)
                    },
                ),
                (
                    2,
                    DescriptorSetLayoutBinding {
                        binding_flags: DescriptorBindingFlags::PARTIALLY_BOUND,
                        stages: ShaderStages::FRAGMENT,
                        ..DescriptorSetLayoutBinding::descriptor_type(DescriptorType::SampledImage)
                    },
                ),
            ]
            .into(),
            ..Default::default()
        };

        let errors = create_info.validate(&device);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|err| !err.requires_one_of.is_empty()));
        assert!(errors[0].context.starts_with("bindings[0]"));
        assert!(errors[1].context.starts_with("bindings[2]"));

        let device = DeviceInfo {
            enabled_features: DeviceFeatures {
                descriptor_binding_partially_bound: true,
                ..DeviceFeatures::empty()
            },
            ..device
        };
        assert!(create_info.validate(&device).is_empty());
    }

    #[test]
    fn variable_count_must_be_highest() {
        let device = DeviceInfo {
            enabled_features: DeviceFeatures {
                descriptor_binding_variable_descriptor_count: true,
                ..DeviceFeatures::empty()
            },
            enabled_extensions: DeviceExtensions {
                ext_descriptor_indexing: true,
                ..DeviceExtensions::empty()
            },
            ..Default::default()
        };

        let create_info = DescriptorSetLayoutCreateInfo {
            bindings: [
                (
                    0,
                    DescriptorSetLayoutBinding {
                        binding_flags: DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
                        descriptor_count: 16,
                        stages: ShaderStages::FRAGMENT,
                        ..DescriptorSetLayoutBinding::descriptor_type(DescriptorType::SampledImage)
                    },
                ),
                (
                    1,
                    DescriptorSetLayoutBinding {
                        stages: ShaderStages::FRAGMENT,
                        ..DescriptorSetLayoutBinding::descriptor_type(DescriptorType::Sampler)
                    },
                ),
            ]
            .into(),
            ..Default::default()
        };

        let errors = create_info.validate(&device);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].vuids,
            &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-pBindingFlags-03004"],
        );
    }

    #[test]
    fn push_descriptor_requires_extension() {
        let create_info = DescriptorSetLayoutCreateInfo {
            flags: DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR,
            ..Default::default()
        };

        let errors = create_info.validate(&DeviceInfo::default());
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].vuids,
            &["VUID-VkDescriptorSetLayoutCreateInfo-flags-parameter"],
        );

        let device = DeviceInfo {
            enabled_extensions: DeviceExtensions {
                khr_push_descriptor: true,
                ..DeviceExtensions::empty()
            },
            ..Default::default()
        };
        assert!(create_info.validate(&device).is_empty());
    }
}
