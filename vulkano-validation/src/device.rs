//! Facts about the device that the validator runs against.
//!
//! The validator never talks to a device itself. The layer that owns it queries the physical
//! device once, when the logical device is created, and describes the result with a
//! [`DeviceInfo`]. Every capability-gated check and every limit check reads from it.

use crate::{DeviceSize, Version};

/// The API version, enabled features, enabled extensions and limits of a logical device.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    /// The API version that the device was created with.
    ///
    /// The default value is [`Version::V1_0`].
    pub api_version: Version,

    /// The features that were enabled when the device was created.
    ///
    /// The default value is [`DeviceFeatures::empty()`].
    pub enabled_features: DeviceFeatures,

    /// The extensions that were enabled when the device was created.
    ///
    /// The default value is [`DeviceExtensions::empty()`].
    pub enabled_extensions: DeviceExtensions,

    /// The limits of the physical device.
    ///
    /// The default value is [`DeviceProperties::default()`], which holds the minimum limits
    /// that every implementation must support.
    pub properties: DeviceProperties,

    pub _ne: crate::NonExhaustive,
}

impl Default for DeviceInfo {
    #[inline]
    fn default() -> Self {
        Self {
            api_version: Version::V1_0,
            enabled_features: DeviceFeatures::empty(),
            enabled_extensions: DeviceExtensions::empty(),
            properties: DeviceProperties::default(),
            _ne: crate::NonExhaustive(()),
        }
    }
}

impl DeviceInfo {
    #[inline]
    pub fn api_version(&self) -> Version {
        self.api_version
    }

    #[inline]
    pub fn enabled_features(&self) -> &DeviceFeatures {
        &self.enabled_features
    }

    #[inline]
    pub fn enabled_extensions(&self) -> &DeviceExtensions {
        &self.enabled_extensions
    }

    #[inline]
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Returns whether a failed pool allocation can be reported back to the application as
    /// `VK_ERROR_OUT_OF_POOL_MEMORY`, in which case running out of pool capacity is recoverable.
    #[inline]
    pub(crate) fn pool_exhaustion_is_recoverable(&self) -> bool {
        self.api_version >= Version::V1_1 || self.enabled_extensions.khr_maintenance1
    }
}

macro_rules! device_flags {
    {
        $(#[doc = $ty_doc:literal])*
        $ty:ident {
            $(
                $(#[doc = $member_doc:literal])*
                $member:ident,
            )+
        }
    } => {
        $(#[doc = $ty_doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $ty {
            $(
                $(#[doc = $member_doc])*
                pub $member: bool,
            )+
            pub _ne: crate::NonExhaustive,
        }

        impl $ty {
            #[doc = concat!("Returns a `", stringify!($ty), "` with none of the members set.")]
            #[inline]
            pub const fn empty() -> Self {
                Self {
                    $($member: false,)+
                    _ne: crate::NonExhaustive(()),
                }
            }

            /// Returns whether all members set in `other` are also set in `self`.
            #[inline]
            pub const fn contains(&self, other: &Self) -> bool {
                $((self.$member || !other.$member))&&+
            }

            /// Returns the union of `self` and `other`.
            #[inline]
            pub const fn union(&self, other: &Self) -> Self {
                Self {
                    $($member: self.$member || other.$member,)+
                    _ne: crate::NonExhaustive(()),
                }
            }
        }

        impl Default for $ty {
            #[inline]
            fn default() -> Self {
                Self::empty()
            }
        }
    };
}

device_flags! {
    /// The device features that descriptor validation depends on.
    DeviceFeatures {
        /// Enables `DescriptorType::InlineUniformBlock`.
        inline_uniform_block,
        descriptor_binding_inline_uniform_block_update_after_bind,
        descriptor_binding_uniform_buffer_update_after_bind,
        descriptor_binding_sampled_image_update_after_bind,
        descriptor_binding_storage_image_update_after_bind,
        descriptor_binding_storage_buffer_update_after_bind,
        descriptor_binding_uniform_texel_buffer_update_after_bind,
        descriptor_binding_storage_texel_buffer_update_after_bind,
        descriptor_binding_acceleration_structure_update_after_bind,
        descriptor_binding_update_unused_while_pending,
        descriptor_binding_partially_bound,
        descriptor_binding_variable_descriptor_count,
        /// Enables `DescriptorType::AccelerationStructure`.
        acceleration_structure,
        /// Enables `DescriptorType::Mutable`.
        mutable_descriptor_type,
        /// Enables the descriptor buffer binding model.
        descriptor_buffer,
        /// Required for GPU-assisted validation, which hands device addresses of its record
        /// buffers to the instrumented shaders.
        buffer_device_address,
        /// Enables `ImageLayout::AttachmentFeedbackLoopOptimal` for image descriptors.
        attachment_feedback_loop_layout,
        /// Allows sampler YCbCr conversions.
        sampler_ycbcr_conversion,
        /// Enables the `HOST_ONLY_POOL` descriptor set layout flag.
        host_only_descriptor_pool,
    }
}

device_flags! {
    /// The device extensions that descriptor validation depends on.
    DeviceExtensions {
        /// Enables push descriptors.
        khr_push_descriptor,
        /// Makes pool exhaustion recoverable.
        khr_maintenance1,
        /// Allows `ImageLayout::DepthReadOnlyStencilAttachmentOptimal` and its counterpart.
        khr_maintenance2,
        ext_descriptor_indexing,
        ext_inline_uniform_block,
        khr_acceleration_structure,
        khr_ray_tracing_pipeline,
        ext_mutable_descriptor_type,
        ext_descriptor_buffer,
        ext_graphics_pipeline_library,
        /// Allows `ImageLayout::SharedPresent` for storage images.
        khr_shared_presentable_image,
        /// Enables `ImageLayout::AttachmentFeedbackLoopOptimal`.
        ext_attachment_feedback_loop_layout,
        /// Enables the `DepthReadOnlyOptimal` and `StencilReadOnlyOptimal` layouts.
        khr_separate_depth_stencil_layouts,
        /// Enables `ImageLayout::ReadOnlyOptimal`.
        khr_synchronization2,
    }
}

/// The limits of a physical device that descriptor validation depends on.
///
/// The default value of every member is the minimum (or maximum, for alignments) that every
/// implementation is required to support.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceProperties {
    pub min_uniform_buffer_offset_alignment: DeviceSize,
    pub min_storage_buffer_offset_alignment: DeviceSize,
    pub min_texel_buffer_offset_alignment: DeviceSize,
    pub max_uniform_buffer_range: u32,
    pub max_storage_buffer_range: u32,
    pub max_bound_descriptor_sets: u32,
    pub max_push_constants_size: u32,
    pub max_push_descriptors: u32,
    pub max_inline_uniform_block_size: u32,
    pub max_per_stage_descriptor_samplers: u32,
    pub max_per_stage_descriptor_uniform_buffers: u32,
    pub max_per_stage_descriptor_storage_buffers: u32,
    pub max_per_stage_descriptor_sampled_images: u32,
    pub max_per_stage_descriptor_storage_images: u32,
    pub max_per_stage_descriptor_input_attachments: u32,
    pub max_per_stage_resources: u32,
    pub max_descriptor_set_uniform_buffers_dynamic: u32,
    pub max_descriptor_set_storage_buffers_dynamic: u32,
    pub max_descriptor_buffer_bindings: u32,
    pub descriptor_buffer_offset_alignment: DeviceSize,
    pub _ne: crate::NonExhaustive,
}

impl Default for DeviceProperties {
    #[inline]
    fn default() -> Self {
        Self {
            min_uniform_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 256,
            min_texel_buffer_offset_alignment: 256,
            max_uniform_buffer_range: 16384,
            max_storage_buffer_range: 1 << 27,
            max_bound_descriptor_sets: 4,
            max_push_constants_size: 128,
            max_push_descriptors: 32,
            max_inline_uniform_block_size: 256,
            max_per_stage_descriptor_samplers: 16,
            max_per_stage_descriptor_uniform_buffers: 12,
            max_per_stage_descriptor_storage_buffers: 4,
            max_per_stage_descriptor_sampled_images: 16,
            max_per_stage_descriptor_storage_images: 4,
            max_per_stage_descriptor_input_attachments: 4,
            max_per_stage_resources: 128,
            max_descriptor_set_uniform_buffers_dynamic: 8,
            max_descriptor_set_storage_buffers_dynamic: 4,
            max_descriptor_buffer_bindings: 1,
            descriptor_buffer_offset_alignment: 256,
            _ne: crate::NonExhaustive(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceExtensions, DeviceFeatures, DeviceInfo};
    use crate::Version;

    #[test]
    fn features_contains() {
        let enabled = DeviceFeatures {
            descriptor_binding_partially_bound: true,
            inline_uniform_block: true,
            ..DeviceFeatures::empty()
        };

        assert!(enabled.contains(&DeviceFeatures {
            inline_uniform_block: true,
            ..DeviceFeatures::empty()
        }));
        assert!(!enabled.contains(&DeviceFeatures {
            descriptor_buffer: true,
            ..DeviceFeatures::empty()
        }));
        assert!(enabled.contains(&DeviceFeatures::empty()));
    }

    #[test]
    fn pool_exhaustion_recoverable() {
        assert!(!DeviceInfo::default().pool_exhaustion_is_recoverable());

        let device = DeviceInfo {
            api_version: Version::V1_1,
            ..Default::default()
        };
        assert!(device.pool_exhaustion_is_recoverable());

        let device = DeviceInfo {
            enabled_extensions: DeviceExtensions {
                khr_maintenance1: true,
                ..DeviceExtensions::empty()
            },
            ..Default::default()
        };
        assert!(device.pool_exhaustion_is_recoverable());
    }
}
