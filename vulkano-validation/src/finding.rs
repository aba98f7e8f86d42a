//! Reporting of validation findings.
//!
//! Every problem that the validator detects is turned into a [`Finding`] and handed to the
//! [`FindingSink`] that the validator was created with. Reporting never changes the outcome of
//! the intercepted call: the call is always forwarded to the driver.

use crate::ValidationError;
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt::{Display, Error as FmtError, Formatter};

/// A single problem detected by the validator.
#[derive(Clone, Debug)]
pub struct Finding {
    /// The category of the problem.
    pub kind: FindingKind,

    /// Whether the problem is an error, or only advisory.
    pub severity: Severity,

    /// The problem itself.
    pub error: Box<ValidationError>,

    /// The handles of the objects involved in the problem.
    pub objects: SmallVec<[ObjectHandle; 4]>,

    /// For problems that are detected after device execution, the action command that caused
    /// the problem.
    pub action: Option<ActionAttribution>,
}

impl Finding {
    /// Identifier used for findings that don't correspond to a valid usage rule of the Vulkan
    /// specification.
    pub const UNASSIGNED: &'static str = "UNASSIGNED-Descriptor";

    /// Returns a new `Finding` with error severity and no objects.
    #[inline]
    pub fn new(kind: FindingKind, error: Box<ValidationError>) -> Self {
        Finding {
            kind,
            severity: Severity::Error,
            error,
            objects: SmallVec::new(),
            action: None,
        }
    }

    /// Returns the stable identifier of the finding: the first VUID of the error, or an
    /// `UNASSIGNED-` identifier if the error has none.
    #[inline]
    pub fn id(&self) -> &'static str {
        self.error.vuids.first().copied().unwrap_or(Self::UNASSIGNED)
    }

    /// Returns the message of the finding.
    #[inline]
    pub fn message(&self) -> String {
        self.error.to_string()
    }

    #[inline]
    pub(crate) fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[inline]
    pub(crate) fn with_object(mut self, object: impl Into<ObjectHandle>) -> Self {
        self.objects.push(object.into());
        self
    }

    #[inline]
    pub(crate) fn with_action(mut self, action: ActionAttribution) -> Self {
        self.action = Some(action);
        self
    }

    /// Returns whether the finding sets the return value of the entry point that raised it.
    #[inline]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl Display for Finding {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "[{}] {}", self.id(), self.error)?;

        if let Some(action) = &self.action {
            write!(f, " ({})", action)?;
        }

        Ok(())
    }
}

/// The category of a [`Finding`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FindingKind {
    /// The request itself is malformed: a binding that doesn't exist, an object that has been
    /// destroyed, a range that runs past the end. Nothing else is checked for the request.
    Structural,

    /// A resource that is written or bound doesn't meet the requirements of its descriptor.
    Payload,

    /// A pool or a device limit doesn't have enough room left.
    Capacity,

    /// A flag or type was used that needs a feature or extension that is not enabled.
    Capability,

    /// The GPU-assisted bookkeeping of the validator itself is inconsistent. This does not
    /// indicate a problem in the application.
    Internal,
}

/// The severity of a [`Finding`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,

    /// A problem that the application can recover from. It does not set the return value of the
    /// entry point that raised it.
    Advisory,
}

/// A Vulkan object handle, tagged with its type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub object_type: vk::ObjectType,
    pub raw: u64,
}

impl<T> From<T> for ObjectHandle
where
    T: Handle,
{
    #[inline]
    fn from(handle: T) -> Self {
        ObjectHandle {
            object_type: T::TYPE,
            raw: handle.as_raw(),
        }
    }
}

/// Identifies the action command that a deferred finding originates from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionAttribution {
    /// The command buffer that recorded the action command.
    pub command_buffer: vk::CommandBuffer,

    /// The index of the action command within the command buffer, counting from zero.
    pub action_index: u32,

    /// The debug label region that was active when the action command was recorded.
    pub debug_label: Option<String>,
}

impl Display for ActionAttribution {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(
            f,
            "action command {} of command buffer {:#x}",
            self.action_index,
            self.command_buffer.as_raw(),
        )?;

        if let Some(label) = &self.debug_label {
            write!(f, ", in debug label region \"{}\"", label)?;
        }

        Ok(())
    }
}

/// Receives findings from a validator.
pub trait FindingSink: Send + Sync {
    fn report(&self, finding: &Finding);
}

/// A [`FindingSink`] that stores every finding it receives.
#[derive(Debug, Default)]
pub struct FindingCollector {
    findings: Mutex<Vec<Finding>>,
}

impl FindingCollector {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the findings received so far.
    #[inline]
    pub fn findings(&self) -> Vec<Finding> {
        self.findings.lock().clone()
    }

    /// Removes and returns the findings received so far.
    #[inline]
    pub fn take(&self) -> Vec<Finding> {
        std::mem::take(&mut *self.findings.lock())
    }

    /// Returns the identifiers of the findings received so far.
    pub fn ids(&self) -> Vec<&'static str> {
        self.findings.lock().iter().map(Finding::id).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.findings.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.findings.lock().is_empty()
    }
}

impl FindingSink for FindingCollector {
    #[inline]
    fn report(&self, finding: &Finding) {
        self.findings.lock().push(finding.clone());
    }
}

/// A [`FindingSink`] that forwards findings to the `log` crate.
///
/// Errors are logged with the `error` level, advisory findings with the `warn` level.
#[cfg(feature = "logging")]
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

#[cfg(feature = "logging")]
impl FindingSink for LogSink {
    fn report(&self, finding: &Finding) {
        match finding.severity {
            Severity::Error => log::error!("{}", finding),
            Severity::Advisory => log::warn!("{}", finding),
        }
    }
}

/// Collects the findings raised during one entry point and forwards them to the sink.
pub(crate) struct Reporter<'a> {
    sink: &'a dyn FindingSink,
    report_advisory: bool,
    error_raised: bool,
}

impl<'a> Reporter<'a> {
    #[inline]
    pub(crate) fn new(sink: &'a dyn FindingSink, report_advisory: bool) -> Self {
        Reporter {
            sink,
            report_advisory,
            error_raised: false,
        }
    }

    pub(crate) fn report(&mut self, finding: Finding) {
        if finding.is_error() {
            self.error_raised = true;
        } else if !self.report_advisory {
            return;
        }

        self.sink.report(&finding);
    }

    /// Returns whether an error-severity finding was reported.
    #[inline]
    pub(crate) fn error_raised(&self) -> bool {
        self.error_raised
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ActionAttribution, Finding, FindingCollector, FindingKind, ObjectHandle, Reporter,
        Severity,
    };
    use crate::ValidationError;
    use ash::vk::{self, Handle};

    #[test]
    fn finding_id() {
        let finding = Finding::new(
            FindingKind::Payload,
            Box::new(ValidationError {
                problem: "is not aligned".into(),
                vuids: &["VUID-vkCmdBindDescriptorSets-pDynamicOffsets-01971"],
                ..Default::default()
            }),
        );
        assert_eq!(
            finding.id(),
            "VUID-vkCmdBindDescriptorSets-pDynamicOffsets-01971"
        );

        let finding = Finding::new(FindingKind::Internal, Box::default());
        assert_eq!(finding.id(), Finding::UNASSIGNED);
    }

    #[test]
    fn object_handle() {
        let handle = ObjectHandle::from(vk::DescriptorSet::from_raw(42));
        assert_eq!(handle.object_type, vk::ObjectType::DESCRIPTOR_SET);
        assert_eq!(handle.raw, 42);
    }

    #[test]
    fn display_attribution() {
        let finding = Finding::new(
            FindingKind::Payload,
            Box::new(ValidationError {
                problem: "was never written".into(),
                ..Default::default()
            }),
        )
        .with_action(ActionAttribution {
            command_buffer: vk::CommandBuffer::from_raw(0x10),
            action_index: 3,
            debug_label: Some("shadows".to_owned()),
        });

        assert_eq!(
            finding.to_string(),
            "[UNASSIGNED-Descriptor] was never written (action command 3 of command buffer \
            0x10, in debug label region \"shadows\")",
        );
    }

    #[test]
    fn advisory_does_not_raise() {
        let collector = FindingCollector::new();
        let mut reporter = Reporter::new(&collector, true);

        reporter.report(
            Finding::new(FindingKind::Capacity, Box::default()).with_severity(Severity::Advisory),
        );
        assert!(!reporter.error_raised());
        assert_eq!(collector.len(), 1);

        reporter.report(Finding::new(FindingKind::Structural, Box::default()));
        assert!(reporter.error_raised());
        assert_eq!(collector.len(), 2);

        let mut reporter = Reporter::new(&collector, false);
        reporter.report(
            Finding::new(FindingKind::Capacity, Box::default()).with_severity(Severity::Advisory),
        );
        assert_eq!(collector.len(), 2);
    }
}
