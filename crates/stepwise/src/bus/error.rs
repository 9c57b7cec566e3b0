//! Error types raised by the step event bus.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::context::ContextId;
use crate::step::{FailureDetail, TestRecord};

/// Errors raised by [`StepEventBus`](crate::StepEventBus) operations.
///
/// # Variants
///
/// - [`InvalidState`][Self::InvalidState]: the call is not legal in the
///   context's current phase. The context is left untouched.
/// - [`ProtocolViolation`][Self::ProtocolViolation]: the host broke step
///   nesting. The running test has been aborted.
/// - [`Notification`][Self::Notification]: the test finished but one or more
///   observers failed while being told about it.
/// - [`StepFailed`][Self::StepFailed]: a step failed with `fail_fast`
///   enabled.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BusError {
    /// The operation is not legal in the context's current phase.
    #[error("{operation} rejected in {context}: {detail}")]
    InvalidState {
        /// Context the call was made on.
        context: ContextId,
        /// Bus operation that was rejected.
        operation: &'static str,
        /// What was wrong.
        detail: String,
    },
    /// Steps were finished out of order or a test ended with steps open.
    #[error("protocol violation in {context} during {operation}: {detail}")]
    ProtocolViolation {
        /// Context the call was made on.
        context: ContextId,
        /// Bus operation that detected the violation.
        operation: &'static str,
        /// What was wrong.
        detail: String,
    },
    /// Observers failed while being notified of a finished test.
    ///
    /// The details are boxed to keep `Result<_, BusError>` small.
    #[error(transparent)]
    Notification(Box<ObserverErrors>),
    /// A step failed and the context propagates failures immediately.
    #[error("step '{step}' failed in {context}: {detail}")]
    StepFailed {
        /// Context the step ran in.
        context: ContextId,
        /// Name of the failing step.
        step: String,
        /// Failure recorded for the step.
        detail: FailureDetail,
    },
}

impl BusError {
    /// Returns the finished test record carried by a notification failure.
    #[must_use]
    pub fn record(&self) -> Option<&TestRecord> {
        match self {
            Self::Notification(errors) => Some(errors.record()),
            _ => None,
        }
    }
}

/// Failure reported by a single observer.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// The observer returned an error value.
    #[error(transparent)]
    Failed(Box<dyn StdError + Send + Sync + 'static>),
    /// The observer panicked.
    #[error("observer panicked: {0}")]
    Panicked(String),
}

impl ObserverError {
    /// Wraps any error value.
    pub fn new(error: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Failed(error.into())
    }
}

/// Observer failure tagged with the observer that produced it.
#[derive(Debug)]
pub struct ObserverFailure {
    /// Name reported by [`StepObserver::name`](crate::StepObserver::name).
    pub observer: String,
    /// What went wrong.
    pub error: ObserverError,
}

impl fmt::Display for ObserverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.observer, self.error)
    }
}

/// Every observer failure raised while notifying one finished test.
#[derive(Debug)]
pub struct ObserverErrors {
    record: TestRecord,
    failures: Vec<ObserverFailure>,
}

impl ObserverErrors {
    pub(crate) fn new(record: TestRecord, failures: Vec<ObserverFailure>) -> Self {
        Self { record, failures }
    }

    /// Returns the record the observers were notified with.
    #[must_use]
    pub fn record(&self) -> &TestRecord {
        &self.record
    }

    /// Consumes the errors and returns the record.
    #[must_use]
    pub fn into_record(self) -> TestRecord {
        self.record
    }

    /// Returns the individual failures in notification order.
    #[must_use]
    pub fn failures(&self) -> &[ObserverFailure] {
        &self.failures
    }
}

impl fmt::Display for ObserverErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} observer(s) failed after test '{}'",
            self.failures.len(),
            self.record.name()
        )?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl StdError for ObserverErrors {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;

    #[test]
    fn invalid_state_names_the_operation() {
        let ctx = ExecutionContext::new(false);
        let err = BusError::InvalidState {
            context: ctx.id(),
            operation: "test_started",
            detail: "test 'login' is already running".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            format!(
                "test_started rejected in {}: test 'login' is already running",
                ctx.id()
            )
        );
        assert!(err.record().is_none());
    }

    #[test]
    fn observer_error_wraps_messages() {
        let err = ObserverError::new("disk full");
        assert_eq!(err.to_string(), "disk full");
        let panicked = ObserverError::Panicked("boom".to_owned());
        assert_eq!(panicked.to_string(), "observer panicked: boom");
    }
}
