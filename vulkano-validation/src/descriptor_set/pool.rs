//! A pool from which descriptor sets can be allocated.
//!
//! The pool keeps track of how many sets, and how many descriptors of each type, can still be
//! allocated from it. Allocation decrements the counts, freeing a set or resetting the pool
//! restores them.

use super::{
    layout::{DescriptorSetLayout, DescriptorSetLayoutCreateFlags, DescriptorType},
    DescriptorSet,
};
use crate::{device::DeviceInfo, macros::vulkan_bitflags, ValidationError};
use ash::vk;
use foldhash::{HashMap, HashSet};
use smallvec::SmallVec;
use std::{collections::hash_map::Entry, sync::Arc};

/// The bookkeeping of a descriptor pool.
#[derive(Debug)]
pub struct DescriptorPool {
    handle: vk::DescriptorPool,
    flags: DescriptorPoolCreateFlags,
    max_sets: u32,
    pool_sizes: HashMap<DescriptorType, u32>,

    remaining_sets: u32,
    remaining_descriptors: HashMap<DescriptorType, u32>,
    allocated_sets: HashSet<vk::DescriptorSet>,
}

impl DescriptorPool {
    pub(crate) fn new(handle: vk::DescriptorPool, create_info: &DescriptorPoolCreateInfo) -> Self {
        DescriptorPool {
            handle,
            flags: create_info.flags,
            max_sets: create_info.max_sets,
            pool_sizes: create_info.pool_sizes.clone(),
            remaining_sets: create_info.max_sets,
            remaining_descriptors: create_info.pool_sizes.clone(),
            allocated_sets: HashSet::default(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }

    /// Returns the flags that the descriptor pool was created with.
    #[inline]
    pub fn flags(&self) -> DescriptorPoolCreateFlags {
        self.flags
    }

    /// Returns the maximum number of sets that can be allocated from the pool.
    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    /// Returns the number of descriptors of each type that the pool was created with.
    #[inline]
    pub fn pool_sizes(&self) -> &HashMap<DescriptorType, u32> {
        &self.pool_sizes
    }

    /// Returns the number of sets that can still be allocated.
    #[inline]
    pub fn remaining_sets(&self) -> u32 {
        self.remaining_sets
    }

    /// Returns the number of descriptors of `ty` that can still be allocated.
    #[inline]
    pub fn remaining_descriptors(&self, ty: DescriptorType) -> u32 {
        self.remaining_descriptors.get(&ty).copied().unwrap_or(0)
    }

    /// Returns the sets that are currently allocated from the pool.
    #[inline]
    pub fn allocated_sets(&self) -> &HashSet<vk::DescriptorSet> {
        &self.allocated_sets
    }

    /// Checks that the given layouts can be used to allocate sets from this pool.
    ///
    /// `layouts` and `variable_descriptor_counts` are taken from the allocate info, with the
    /// layout handles already resolved.
    pub(crate) fn validate_allocate(
        &self,
        layouts: &[Arc<DescriptorSetLayout>],
        variable_descriptor_counts: &[u32],
    ) -> Result<(), Box<ValidationError>> {
        if !variable_descriptor_counts.is_empty()
            && variable_descriptor_counts.len() != layouts.len()
        {
            return Err(Box::new(ValidationError {
                problem: "`variable_descriptor_counts` is not empty, but its length does not \
                    equal the length of `set_layouts`"
                    .into(),
                vuids: &[
                    "VUID-VkDescriptorSetVariableDescriptorCountAllocateInfo-descriptorSetCount-03045",
                ],
                ..Default::default()
            }));
        }

        for (index, layout) in layouts.iter().enumerate() {
            let flags = layout.flags();

            if layout.is_destroyed() {
                return Err(Box::new(ValidationError {
                    context: format!("set_layouts[{}]", index).into(),
                    problem: "has been destroyed".into(),
                    ..Default::default()
                }));
            }

            if flags.intersects(DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR) {
                return Err(Box::new(ValidationError {
                    context: format!("set_layouts[{}].flags", index).into(),
                    problem: "contains `DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR`".into(),
                    vuids: &["VUID-VkDescriptorSetAllocateInfo-pSetLayouts-00308"],
                    ..Default::default()
                }));
            }

            if flags.intersects(DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER) {
                return Err(Box::new(ValidationError {
                    context: format!("set_layouts[{}].flags", index).into(),
                    problem: "contains `DescriptorSetLayoutCreateFlags::DESCRIPTOR_BUFFER`".into(),
                    vuids: &["VUID-VkDescriptorSetAllocateInfo-pSetLayouts-08009"],
                    ..Default::default()
                }));
            }

            if flags.intersects(DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
                && !self
                    .flags
                    .intersects(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            {
                return Err(Box::new(ValidationError {
                    problem: format!(
                        "`set_layouts[{}].flags` contains \
                        `DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL`, but the \
                        descriptor pool's flags do not contain \
                        `DescriptorPoolCreateFlags::UPDATE_AFTER_BIND`",
                        index,
                    )
                    .into(),
                    vuids: &["VUID-VkDescriptorSetAllocateInfo-pSetLayouts-03044"],
                    ..Default::default()
                }));
            }

            if flags.intersects(DescriptorSetLayoutCreateFlags::HOST_ONLY_POOL)
                && !self.flags.intersects(DescriptorPoolCreateFlags::HOST_ONLY)
            {
                return Err(Box::new(ValidationError {
                    problem: format!(
                        "`set_layouts[{}].flags` contains \
                        `DescriptorSetLayoutCreateFlags::HOST_ONLY_POOL`, but the descriptor \
                        pool's flags do not contain `DescriptorPoolCreateFlags::HOST_ONLY`",
                        index,
                    )
                    .into(),
                    vuids: &["VUID-VkDescriptorSetAllocateInfo-pSetLayouts-04610"],
                    ..Default::default()
                }));
            }

            if let Some(&variable_descriptor_count) = variable_descriptor_counts.get(index) {
                if variable_descriptor_count > layout.variable_descriptor_count() {
                    return Err(Box::new(ValidationError {
                        problem: format!(
                            "`variable_descriptor_counts[{}]` is {}, which is greater than the \
                            descriptor count of the variable-count binding of \
                            `set_layouts[{0}]` ({})",
                            index,
                            variable_descriptor_count,
                            layout.variable_descriptor_count(),
                        )
                        .into(),
                        vuids: &[
                            "VUID-VkDescriptorSetVariableDescriptorCountAllocateInfo-pSetLayouts-03046",
                        ],
                        ..Default::default()
                    }));
                }
            }
        }

        Ok(())
    }

    /// Returns a problem if the pool does not have enough room left for the allocation.
    ///
    /// The problem reports the exact number of sets or descriptors that were requested and that
    /// were available. If `recoverable` is true, the problem has an `UNASSIGNED-` identifier,
    /// since the driver is allowed to return `VK_ERROR_OUT_OF_POOL_MEMORY` in that case.
    pub(crate) fn check_capacity(
        &self,
        layouts: &[Arc<DescriptorSetLayout>],
        variable_descriptor_counts: &[u32],
        recoverable: bool,
    ) -> Option<Box<ValidationError>> {
        let requested_sets = layouts.len() as u32;

        if requested_sets > self.remaining_sets {
            return Some(Box::new(ValidationError {
                problem: format!(
                    "{} descriptor sets were requested, but only {} of the {} sets of the pool \
                    are available",
                    requested_sets, self.remaining_sets, self.max_sets,
                )
                .into(),
                vuids: if recoverable {
                    &["UNASSIGNED-DescriptorPool-OutOfSets"]
                } else {
                    &["VUID-VkDescriptorSetAllocateInfo-apiVersion-07895"]
                },
                ..Default::default()
            }));
        }

        let requested = requested_descriptor_counts(layouts, variable_descriptor_counts);
        let mut shortfalls: SmallVec<[(DescriptorType, u32, u32); 2]> = requested
            .into_iter()
            .filter_map(|(ty, count)| {
                let available = self.remaining_descriptors(ty);
                (count > available).then_some((ty, count, available))
            })
            .collect();

        if shortfalls.is_empty() {
            return None;
        }

        shortfalls.sort_by_key(|&(ty, _, _)| ty as i32);
        let problem = shortfalls
            .iter()
            .map(|(ty, count, available)| {
                format!(
                    "{} descriptors of type `DescriptorType::{:?}` were requested, but only {} \
                    are available",
                    count, ty, available,
                )
            })
            .collect::<Vec<_>>()
            .join("; ");

        Some(Box::new(ValidationError {
            problem: problem.into(),
            vuids: if recoverable {
                &["UNASSIGNED-DescriptorPool-OutOfDescriptors"]
            } else {
                &["VUID-VkDescriptorSetAllocateInfo-apiVersion-07896"]
            },
            ..Default::default()
        }))
    }

    /// Records that `set` was allocated from the pool.
    ///
    /// The counts saturate at zero, so that an allocation that was reported as exceeding the
    /// pool's capacity does not corrupt the bookkeeping.
    pub(crate) fn allocate(&mut self, set: &DescriptorSet) {
        self.remaining_sets = self.remaining_sets.saturating_sub(1);

        for (ty, count) in set_descriptor_counts(set) {
            if let Some(remaining) = self.remaining_descriptors.get_mut(&ty) {
                *remaining = remaining.saturating_sub(count);
            }
        }

        self.allocated_sets.insert(set.handle());
    }

    /// Checks that `set` can be freed back to the pool.
    pub(crate) fn validate_free(&self, set: vk::DescriptorSet) -> Result<(), Box<ValidationError>> {
        if !self
            .flags
            .intersects(DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        {
            return Err(Box::new(ValidationError {
                context: "descriptor_pool.flags".into(),
                problem: "does not contain `DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET`"
                    .into(),
                vuids: &["VUID-vkFreeDescriptorSets-descriptorPool-00312"],
                ..Default::default()
            }));
        }

        if !self.allocated_sets.contains(&set) {
            return Err(Box::new(ValidationError {
                context: "descriptor_sets".into(),
                problem: "contains a set that was not allocated from `descriptor_pool`".into(),
                vuids: &["VUID-vkFreeDescriptorSets-pDescriptorSets-parent"],
                ..Default::default()
            }));
        }

        Ok(())
    }

    /// Records that `set` was returned to the pool.
    pub(crate) fn free(&mut self, set: &DescriptorSet) {
        if !self.allocated_sets.remove(&set.handle()) {
            return;
        }

        self.remaining_sets = (self.remaining_sets + 1).min(self.max_sets);

        for (ty, count) in set_descriptor_counts(set) {
            if let (Some(remaining), Some(&size)) = (
                self.remaining_descriptors.get_mut(&ty),
                self.pool_sizes.get(&ty),
            ) {
                *remaining = (*remaining + count).min(size);
            }
        }
    }

    /// Returns all sets to the pool, and returns the handles of the sets that were allocated.
    pub(crate) fn reset(&mut self) -> Vec<vk::DescriptorSet> {
        self.remaining_sets = self.max_sets;
        self.remaining_descriptors = self.pool_sizes.clone();

        self.allocated_sets.drain().collect()
    }
}

/// Returns the number of descriptors of each type that allocating `layouts` requires.
fn requested_descriptor_counts(
    layouts: &[Arc<DescriptorSetLayout>],
    variable_descriptor_counts: &[u32],
) -> HashMap<DescriptorType, u32> {
    let mut requested = HashMap::default();

    for (index, layout) in layouts.iter().enumerate() {
        let variable_binding = layout.variable_descriptor_binding();
        let variable_descriptor_count = variable_descriptor_counts.get(index).copied().unwrap_or(0);

        for (&binding_num, binding) in layout.bindings() {
            let count = if Some(binding_num) == variable_binding {
                variable_descriptor_count
            } else {
                binding.descriptor_count
            };

            if count != 0 {
                *requested.entry(binding.descriptor_type).or_default() += count;
            }
        }
    }

    requested
}

fn set_descriptor_counts(set: &DescriptorSet) -> HashMap<DescriptorType, u32> {
    let mut counts = HashMap::default();

    for binding in set.bindings() {
        if binding.descriptor_count() != 0 {
            match counts.entry(binding.descriptor_type()) {
                Entry::Vacant(entry) => {
                    entry.insert(binding.descriptor_count());
                }
                Entry::Occupied(entry) => {
                    *entry.into_mut() += binding.descriptor_count();
                }
            }
        }
    }

    counts
}

/// Parameters to create a new `DescriptorPool`.
#[derive(Clone, Debug)]
pub struct DescriptorPoolCreateInfo {
    /// Additional properties of the descriptor pool.
    ///
    /// The default value is empty.
    pub flags: DescriptorPoolCreateFlags,

    /// The maximum number of descriptor sets that can be allocated from the pool.
    ///
    /// The default value is `0`, which must be overridden.
    pub max_sets: u32,

    /// The number of descriptors of each type to allocate for the pool.
    ///
    /// For `DescriptorType::InlineUniformBlock`, this is the number of bytes.
    ///
    /// The default value is empty, which must be overridden.
    pub pool_sizes: HashMap<DescriptorType, u32>,

    pub _ne: crate::NonExhaustive,
}

impl Default for DescriptorPoolCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            flags: DescriptorPoolCreateFlags::empty(),
            max_sets: 0,
            pool_sizes: HashMap::default(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl DescriptorPoolCreateInfo {
    pub(crate) fn validate(&self, device: &DeviceInfo) -> Result<(), Box<ValidationError>> {
        let &Self {
            flags,
            max_sets,
            ref pool_sizes,
            _ne: _,
        } = self;

        flags.validate_device(device).map_err(|err| {
            err.add_context("flags")
                .set_vuids(&["VUID-VkDescriptorPoolCreateInfo-flags-parameter"])
        })?;

        if flags.contains(
            DescriptorPoolCreateFlags::UPDATE_AFTER_BIND | DescriptorPoolCreateFlags::HOST_ONLY,
        ) {
            return Err(Box::new(ValidationError {
                context: "flags".into(),
                problem: "contains both `DescriptorPoolCreateFlags::UPDATE_AFTER_BIND` and \
                    `DescriptorPoolCreateFlags::HOST_ONLY`"
                    .into(),
                vuids: &["VUID-VkDescriptorPoolCreateInfo-flags-04607"],
                ..Default::default()
            }));
        }

        if max_sets == 0 {
            return Err(Box::new(ValidationError {
                context: "max_sets".into(),
                problem: "is zero".into(),
                vuids: &["VUID-VkDescriptorPoolCreateInfo-maxSets-00301"],
                ..Default::default()
            }));
        }

        if pool_sizes.is_empty() {
            return Err(Box::new(ValidationError {
                context: "pool_sizes".into(),
                problem: "is empty".into(),
                ..Default::default()
            }));
        }

        for (&descriptor_type, &pool_size) in pool_sizes.iter() {
            descriptor_type.validate_device(device).map_err(|err| {
                err.add_context("pool_sizes")
                    .set_vuids(&["VUID-VkDescriptorPoolSize-type-parameter"])
            })?;

            if pool_size == 0 {
                return Err(Box::new(ValidationError {
                    context: format!("pool_sizes[DescriptorType::{:?}]", descriptor_type).into(),
                    problem: "is zero".into(),
                    vuids: &["VUID-VkDescriptorPoolSize-descriptorCount-00302"],
                    ..Default::default()
                }));
            }

            if descriptor_type == DescriptorType::InlineUniformBlock && pool_size % 4 != 0 {
                return Err(Box::new(ValidationError {
                    context: format!("pool_sizes[DescriptorType::{:?}]", descriptor_type).into(),
                    problem: "is not a multiple of 4".into(),
                    vuids: &["VUID-VkDescriptorPoolSize-type-02218"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

vulkan_bitflags! {
    #[non_exhaustive]

    /// Additional properties of a descriptor pool.
    DescriptorPoolCreateFlags = DescriptorPoolCreateFlags(u32);

    /// Individual descriptor sets can be freed from the pool. Otherwise you must reset or
    /// destroy the whole pool at once.
    FREE_DESCRIPTOR_SET = FREE_DESCRIPTOR_SET,

    /// The pool can allocate descriptor sets with a layout whose flags include
    /// [`DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL`].
    ///
    /// A pool created with this flag can still allocate descriptor sets without the flag.
    /// However, descriptor copy operations are only allowed between pools of the same type; it is
    /// not possible to copy between a descriptor set whose pool has `UPDATE_AFTER_BIND`, and a
    /// descriptor set whose pool does not have this flag.
    UPDATE_AFTER_BIND = UPDATE_AFTER_BIND
    RequiresOneOf([
        RequiresAllOf([APIVersion(V1_2)]),
        RequiresAllOf([DeviceExtension(ext_descriptor_indexing)]),
    ]),

    /// The pool can only allocate descriptor sets that are updated on the host, and never bound.
    HOST_ONLY = HOST_ONLY_EXT
    RequiresOneOf([
        RequiresAllOf([DeviceExtension(ext_mutable_descriptor_type)]),
    ]),
}

/// Parameters to allocate descriptor sets from a pool.
#[derive(Clone, Debug)]
pub struct DescriptorSetAllocateInfo {
    /// The pool to allocate from.
    pub descriptor_pool: vk::DescriptorPool,

    /// The layout of each set to allocate.
    pub set_layouts: Vec<vk::DescriptorSetLayout>,

    /// The descriptor count of the variable-count binding of each set. Either empty, or one
    /// element per element of `set_layouts`.
    ///
    /// The default value is empty.
    pub variable_descriptor_counts: Vec<u32>,

    pub _ne: crate::NonExhaustive,
}

impl DescriptorSetAllocateInfo {
    /// Returns a `DescriptorSetAllocateInfo` with the given pool and layouts.
    #[inline]
    pub fn new(
        descriptor_pool: vk::DescriptorPool,
        set_layouts: Vec<vk::DescriptorSetLayout>,
    ) -> Self {
        Self {
            descriptor_pool,
            set_layouts,
            variable_descriptor_counts: Vec::new(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DescriptorPool, DescriptorPoolCreateFlags, DescriptorPoolCreateInfo};
    use crate::{
        descriptor_set::{
            layout::{
                DescriptorBindingFlags, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateFlags,
                DescriptorSetLayoutCreateInfo, DescriptorType,
            },
            DescriptorSet,
        },
        device::DeviceInfo,
        resources::ResourceTable,
        shader::ShaderStages,
    };
    use ash::vk::{self, Handle};
    use std::sync::Arc;

    fn uniform_layout(count: u32) -> DescriptorSetLayoutCreateInfo {
        DescriptorSetLayoutCreateInfo {
            bindings: [(
                0,
                DescriptorSetLayoutBinding {
                    descriptor_count: count,
                    stages: ShaderStages::all_graphics(),
                    ..DescriptorSetLayoutBinding::descriptor_type(DescriptorType::UniformBuffer)
                },
            )]
            .into(),
            ..Default::default()
        }
    }

    fn pool(
        flags: DescriptorPoolCreateFlags,
        max_sets: u32,
        uniform_buffers: u32,
    ) -> DescriptorPool {
        DescriptorPool::new(
            vk::DescriptorPool::from_raw(1),
            &DescriptorPoolCreateInfo {
                flags,
                max_sets,
                pool_sizes: [(DescriptorType::UniformBuffer, uniform_buffers)]
                    .into_iter()
                    .collect(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn create_info_validation() {
        let device = DeviceInfo::default();

        let create_info = DescriptorPoolCreateInfo {
            max_sets: 0,
            pool_sizes: [(DescriptorType::Sampler, 4)].into_iter().collect(),
            ..Default::default()
        };
        assert_eq!(
            create_info.validate(&device).unwrap_err().vuids,
            &["VUID-VkDescriptorPoolCreateInfo-maxSets-00301"],
        );

        let create_info = DescriptorPoolCreateInfo {
            max_sets: 1,
            pool_sizes: [(DescriptorType::Sampler, 4)].into_iter().collect(),
            ..Default::default()
        };
        assert!(create_info.validate(&device).is_ok());
    }

    #[test]
    fn allocate_free_round_trip() {
        let resources = ResourceTable::new();
        let layout = Arc::new(test_layout!(resources, 1, uniform_layout(3)));
        let mut pool = pool(DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET, 2, 8);

        let layouts = [layout.clone()];
        assert!(pool.validate_allocate(&layouts, &[]).is_ok());
        assert!(pool.check_capacity(&layouts, &[], false).is_none());

        let set = DescriptorSet::new(
            vk::DescriptorSet::from_raw(10),
            pool.handle(),
            pool.flags(),
            layout,
            0,
        );
        pool.allocate(&set);
        assert_eq!(pool.remaining_sets(), 1);
        assert_eq!(pool.remaining_descriptors(DescriptorType::UniformBuffer), 5);

        assert!(pool.validate_free(set.handle()).is_ok());
        pool.free(&set);
        assert_eq!(pool.remaining_sets(), 2);
        assert_eq!(pool.remaining_descriptors(DescriptorType::UniformBuffer), 8);
        assert!(pool.allocated_sets().is_empty());

        // A second free of the same set does not change the counts.
        pool.free(&set);
        assert_eq!(pool.remaining_sets(), 2);
        assert_eq!(pool.remaining_descriptors(DescriptorType::UniformBuffer), 8);
    }

    #[test]
    fn capacity_reports_exact_counts() {
        let resources = ResourceTable::new();
        let layout = Arc::new(test_layout!(resources, 1, uniform_layout(3)));
        let pool = pool(DescriptorPoolCreateFlags::empty(), 4, 5);

        let layouts = [layout.clone(), layout];
        let err = pool.check_capacity(&layouts, &[], false).unwrap();
        assert_eq!(err.vuids, &["VUID-VkDescriptorSetAllocateInfo-apiVersion-07896"]);
        assert!(err.problem.contains("6 descriptors"));
        assert!(err.problem.contains("only 5 are available"));

        let err = pool.check_capacity(&layouts, &[], true).unwrap();
        assert_eq!(err.vuids, &["UNASSIGNED-DescriptorPool-OutOfDescriptors"]);
    }

    #[test]
    fn free_requires_flag() {
        let resources = ResourceTable::new();
        let layout = Arc::new(test_layout!(resources, 1, uniform_layout(1)));
        let mut pool = pool(DescriptorPoolCreateFlags::empty(), 1, 1);

        let set = DescriptorSet::new(
            vk::DescriptorSet::from_raw(10),
            pool.handle(),
            pool.flags(),
            layout,
            0,
        );
        pool.allocate(&set);

        assert_eq!(
            pool.validate_free(set.handle()).unwrap_err().vuids,
            &["VUID-vkFreeDescriptorSets-descriptorPool-00312"],
        );
        assert_eq!(pool.reset(), vec![set.handle()]);
        assert_eq!(pool.remaining_sets(), 1);
    }

    #[test]
    fn update_after_bind_layout_needs_pool_flag() {
        let resources = ResourceTable::new();
        let mut create_info = uniform_layout(1);
        create_info.flags = DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL;
        create_info.bindings.get_mut(&0).unwrap().binding_flags =
            DescriptorBindingFlags::UPDATE_AFTER_BIND;
        let layout = Arc::new(test_layout!(resources, 1, create_info));

        let plain = pool(DescriptorPoolCreateFlags::empty(), 1, 1);
        assert_eq!(
            plain.validate_allocate(&[layout.clone()], &[]).unwrap_err().vuids,
            &["VUID-VkDescriptorSetAllocateInfo-pSetLayouts-03044"],
        );

        let update_after_bind = pool(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND, 1, 1);
        assert!(update_after_bind.validate_allocate(&[layout], &[]).is_ok());
    }
}
