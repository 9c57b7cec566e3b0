//! Step outcomes returned by step bodies.
//!
//! Pending and ignored steps are ordinary outcomes rather than errors: a
//! step body returns them, the bus records the matching status, and the
//! test carries on. Only [`StepOutcome::Failed`] and [`StepOutcome::Errored`]
//! count as failures.

use std::error::Error;

use crate::step::{FailureDetail, StepStatus};

/// Result of executing one step body.
///
/// # Examples
///
/// ```
/// use stepwise::{StepOutcome, StepStatus};
///
/// let outcome = StepOutcome::pending("waiting on the payments sandbox");
/// assert_eq!(outcome.status(), StepStatus::Pending);
/// assert!(!outcome.is_failure());
/// assert_eq!(outcome.reason(), Some("waiting on the payments sandbox"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step completed successfully.
    Passed,
    /// The step is not implemented yet.
    Pending {
        /// Why the step is pending.
        reason: String,
    },
    /// The step was deliberately not run.
    Ignored {
        /// Why the step was ignored.
        reason: String,
    },
    /// The step was not run because an earlier step failed.
    Skipped,
    /// An assertion failed.
    Failed(FailureDetail),
    /// The step raised an unexpected error.
    Errored(FailureDetail),
}

impl StepOutcome {
    /// Marks the step as pending.
    #[must_use]
    pub fn pending(reason: impl Into<String>) -> Self {
        Self::Pending {
            reason: reason.into(),
        }
    }

    /// Marks the step as ignored.
    #[must_use]
    pub fn ignored(reason: impl Into<String>) -> Self {
        Self::Ignored {
            reason: reason.into(),
        }
    }

    /// Records an assertion failure.
    #[must_use]
    pub fn failed(detail: impl Into<FailureDetail>) -> Self {
        Self::Failed(detail.into())
    }

    /// Records an unexpected error.
    #[must_use]
    pub fn errored(detail: impl Into<FailureDetail>) -> Self {
        Self::Errored(detail.into())
    }

    /// Records an unexpected error from an error value and its causes.
    #[must_use]
    pub fn from_error(error: &(dyn Error + 'static)) -> Self {
        Self::Errored(FailureDetail::from_error(error))
    }

    /// Returns the status recorded for this outcome.
    #[must_use]
    pub const fn status(&self) -> StepStatus {
        match self {
            Self::Passed => StepStatus::Success,
            Self::Pending { .. } => StepStatus::Pending,
            Self::Ignored { .. } => StepStatus::Ignored,
            Self::Skipped => StepStatus::Skipped,
            Self::Failed(_) => StepStatus::Failure,
            Self::Errored(_) => StepStatus::Error,
        }
    }

    /// Returns `true` for failed and errored outcomes.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Errored(_))
    }

    /// Returns the pending or ignored reason.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Pending { reason } | Self::Ignored { reason } => Some(reason),
            _ => None,
        }
    }

    /// Returns the failure detail for failed and errored outcomes.
    #[must_use]
    pub const fn failure(&self) -> Option<&FailureDetail> {
        match self {
            Self::Failed(detail) | Self::Errored(detail) => Some(detail),
            _ => None,
        }
    }

    pub(crate) fn into_parts(self) -> (StepStatus, Option<FailureDetail>) {
        let status = self.status();
        match self {
            Self::Failed(detail) | Self::Errored(detail) => (status, Some(detail)),
            _ => (status, None),
        }
    }
}

impl From<&str> for FailureDetail {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for FailureDetail {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl<E> From<Result<(), E>> for StepOutcome
where
    E: Error + 'static,
{
    /// Maps `Ok` to [`StepOutcome::Passed`] and `Err` to
    /// [`StepOutcome::Errored`].
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Passed,
            Err(err) => Self::from_error(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StepOutcome::Passed, StepStatus::Success, false)]
    #[case(StepOutcome::pending("todo"), StepStatus::Pending, false)]
    #[case(StepOutcome::ignored("flaky"), StepStatus::Ignored, false)]
    #[case(StepOutcome::Skipped, StepStatus::Skipped, false)]
    #[case(StepOutcome::failed("expected 3 items"), StepStatus::Failure, true)]
    #[case(StepOutcome::errored("socket closed"), StepStatus::Error, true)]
    fn outcomes_map_to_statuses(
        #[case] outcome: StepOutcome,
        #[case] status: StepStatus,
        #[case] failure: bool,
    ) {
        assert_eq!(outcome.status(), status);
        assert_eq!(outcome.is_failure(), failure);
        assert_eq!(outcome.failure().is_some(), failure);
    }

    #[test]
    fn ignored_reason_is_exposed() {
        assert_eq!(StepOutcome::ignored("flaky").reason(), Some("flaky"));
        assert_eq!(StepOutcome::Passed.reason(), None);
    }

    #[test]
    fn results_convert_to_outcomes() {
        let ok: Result<(), std::io::Error> = Ok(());
        assert_eq!(StepOutcome::from(ok), StepOutcome::Passed);

        let err: Result<(), std::io::Error> = Err(std::io::Error::other("timeout"));
        let outcome = StepOutcome::from(err);
        assert_eq!(outcome.status(), StepStatus::Error);
        assert_eq!(outcome.failure().map(FailureDetail::message), Some("timeout"));
    }
}
