//! Descriptor binding validation for Vulkan interposition layers.
//!
//! This crate is the part of a validation layer that is concerned with descriptors: it models
//! descriptor set layouts, tracks the descriptor sets that an application allocates and the
//! resources written into them, checks that what is bound to a command buffer is compatible with
//! what the shaders of the bound pipeline expect, and validates each update made to a descriptor
//! set.
//!
//! # Overview
//!
//! - The [`DescriptorValidator`] is the validation context. It is created once per device, and
//!   every intercepted call that touches descriptors is routed to one of its methods. Each method
//!   returns `true` if at least one error was reported during the call. The layer is advisory:
//!   the caller is expected to forward the call to the driver regardless.
//!
//! - Findings are delivered to a [`FindingSink`]. A [`Finding`] carries a stable identifier
//!   (usually a Vulkan VUID), the handles involved and a human-readable message. Findings that
//!   are produced after device execution also carry the index of the action command that caused
//!   them and the debug label region that was active at that point.
//!
//! - Facts about other objects (buffers, image views, samplers and so on) are not tracked here.
//!   They are consumed through the [`ResourceTracker`] trait, and shader reflection is consumed
//!   through [`ShaderReflection`](shader::ShaderReflection).
//!
//! - Descriptors that a shader indexes with a value that is only known during execution cannot
//!   be validated on the host. When GPU-assisted validation is enabled, the validator allocates a
//!   record buffer for every bound descriptor set at submission time, and instrumented shaders
//!   write into it which descriptors they actually accessed. The records are decoded and
//!   validated once the submission completes. See the [`gpu_assisted`] module.
//!
//! [`Finding`]: finding::Finding
//! [`FindingSink`]: finding::FindingSink
//! [`ResourceTracker`]: resources::ResourceTracker

pub use ash::vk::Handle;
use std::{
    borrow::Cow,
    error::Error,
    fmt::{Debug, Display, Error as FmtError, Formatter},
};
pub use validator::{DescriptorValidator, DescriptorValidatorCreateInfo, ValidationSettings};
pub use version::Version;

mod macros;
pub mod command_buffer;
pub mod descriptor_set;
pub mod device;
pub mod finding;
pub mod gpu_assisted;
pub mod pipeline;
pub mod resources;
pub mod shader;
mod validator;
mod version;

/// Represents memory size and offset values on a Vulkan device.
/// Analogous to the Rust `usize` type on the host.
pub use ash::vk::DeviceSize;

/// Represents device addresses, as returned by the buffer device address query.
pub use ash::vk::DeviceAddress;

/// A special value for `range` in buffer descriptors, meaning "until the end of the buffer".
pub const WHOLE_SIZE: DeviceSize = ash::vk::WHOLE_SIZE;

/// A helper type for non-exhaustive structs.
///
/// This type cannot be constructed outside this crate. Structures with a field of this type can
/// only be constructed by calling a constructor function or `Default::default()`. The effect is
/// similar to the standard Rust `#[non_exhaustive]` attribute, except that it does not prevent
/// update syntax from being used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)] // add traits as needed
pub struct NonExhaustive(pub(crate) ());

/// A violation of a rule of the Vulkan specification.
///
/// Validation functions in this crate return the first violation they find as a
/// `Box<ValidationError>`, which is then wrapped in a [`Finding`](finding::Finding) before being
/// reported.
#[derive(Clone, Default)]
pub struct ValidationError {
    /// The context in which the problem exists (e.g. a specific parameter).
    pub context: Cow<'static, str>,

    /// A description of the problem.
    pub problem: Cow<'static, str>,

    /// If applicable, settings that the user could enable to avoid the problem in the future.
    pub requires_one_of: RequiresOneOf,

    /// *Valid Usage IDs* (VUIDs) in the Vulkan specification that relate to the problem.
    pub vuids: &'static [&'static str],
}

impl ValidationError {
    fn prepend_context(&mut self, context: impl Into<String>) {
        if self.context.is_empty() {
            self.context = context.into().into();
        } else {
            self.context = format!("{}.{}", context.into(), self.context).into();
        }
    }

    pub(crate) fn add_context(mut self: Box<Self>, context: impl Into<String>) -> Box<Self> {
        self.prepend_context(context);
        self
    }

    pub(crate) fn set_vuids(mut self: Box<Self>, vuids: &'static [&'static str]) -> Box<Self> {
        self.vuids = vuids;
        self
    }
}

impl Debug for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        Display::fmt(self, f)?;

        if !self.vuids.is_empty() {
            write!(f, "\n\nVulkan VUIDs:")?;

            for vuid in self.vuids {
                write!(f, "\n    {}", vuid)?;
            }
        }

        Ok(())
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        if self.context.is_empty() {
            write!(f, "{}", self.problem)?;
        } else {
            write!(f, "{}: {}", self.context, self.problem)?;
        }

        if !self.requires_one_of.is_empty() {
            if self.context.is_empty() && self.problem.is_empty() {
                write!(f, "{}", self.requires_one_of)?;
            } else {
                write!(f, " -- {}", self.requires_one_of)?;
            }
        }

        Ok(())
    }
}

impl Error for ValidationError {}

/// Used in errors to indicate a set of alternatives that needs to be available/enabled to allow
/// a given operation.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct RequiresOneOf(pub &'static [RequiresAllOf]);

impl RequiresOneOf {
    /// Returns the number of alternatives.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether there are any alternatives.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Debug for RequiresOneOf {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        Display::fmt(self, f)
    }
}

impl Display for RequiresOneOf {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "requires one of: ")?;

        if let Some((first, rest)) = self.0.split_first() {
            if first.0.len() > 1 {
                write!(f, "({})", first)?;
            } else {
                write!(f, "{}", first)?;
            }

            for rest in rest {
                if rest.0.len() > 1 {
                    write!(f, " or ({})", rest)?;
                } else {
                    write!(f, " or {}", rest)?;
                }
            }
        }

        Ok(())
    }
}

/// Used in errors to indicate a set of requirements that all need to be available/enabled to
/// allow a given operation.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RequiresAllOf(pub &'static [Requires]);

impl Debug for RequiresAllOf {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        Display::fmt(self, f)
    }
}

impl Display for RequiresAllOf {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        if let Some((first, rest)) = self.0.split_first() {
            write!(f, "{}", first)?;

            for rest in rest {
                write!(f, " + {}", rest)?;
            }
        }

        Ok(())
    }
}

/// Something that needs to be supported or enabled to allow a particular operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requires {
    APIVersion(Version),
    DeviceFeature(&'static str),
    DeviceExtension(&'static str),
}

impl Display for Requires {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Requires::APIVersion(Version { major, minor, .. }) => {
                write!(f, "Vulkan API version {}.{}", major, minor)
            }
            Requires::DeviceFeature(device_feature) => {
                write!(f, "device feature `{}`", device_feature)
            }
            Requires::DeviceExtension(device_extension) => {
                write!(f, "device extension `{}`", device_extension)
            }
        }
    }
}

/// Returns whether `offset` is a multiple of `alignment`. An alignment of zero accepts anything.
#[inline]
pub(crate) fn is_aligned(offset: DeviceSize, alignment: DeviceSize) -> bool {
    alignment == 0 || offset % alignment == 0
}

#[cfg(test)]
mod validation_error_tests {
    use crate::{Requires, RequiresAllOf, RequiresOneOf, ValidationError};

    #[test]
    fn context_is_prepended() {
        let err = Box::new(ValidationError {
            context: "range".into(),
            problem: "is zero".into(),
            ..Default::default()
        })
        .add_context("writes[2]")
        .add_context("update_descriptor_sets");

        assert_eq!(err.context, "update_descriptor_sets.writes[2].range");
        assert_eq!(
            err.to_string(),
            "update_descriptor_sets.writes[2].range: is zero"
        );
    }

    #[test]
    fn requirements_are_displayed() {
        let err = ValidationError {
            context: "binding_flags".into(),
            problem: "contains `DescriptorBindingFlags::PARTIALLY_BOUND`".into(),
            requires_one_of: RequiresOneOf(&[RequiresAllOf(&[Requires::DeviceFeature(
                "descriptor_binding_partially_bound",
            )])]),
            vuids: &["VUID-VkDescriptorSetLayoutBindingFlagsCreateInfo-descriptorBindingPartiallyBound-03013"],
        };

        assert_eq!(
            err.to_string(),
            "binding_flags: contains `DescriptorBindingFlags::PARTIALLY_BOUND` -- requires one \
            of: device feature `descriptor_binding_partially_bound`",
        );
        assert!(format!("{:?}", err).contains("Vulkan VUIDs:"));
    }
}
