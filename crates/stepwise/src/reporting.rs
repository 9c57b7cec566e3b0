//! In-memory collection of finished tests.
//!
//! [`ReportCollector`] is an observer that keeps a [`TestSummary`] for every
//! test the bus finishes. Renderers read the summaries without depending on
//! the bus directly.

use std::sync::{Mutex, MutexGuard};

use crate::bus::{ObserverError, StepObserver};
use crate::context::ContextId;
use crate::step::{StepStatus, TestRecord};

/// Condensed outcome of one finished test.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestSummary {
    name: String,
    context: ContextId,
    result: StepStatus,
    step_count: usize,
    failure: Option<String>,
}

impl TestSummary {
    /// Summarises a finished test.
    #[must_use]
    pub fn from_record(record: &TestRecord) -> Self {
        Self {
            name: record.name().to_owned(),
            context: record.context(),
            result: record.result(),
            step_count: record.all_steps().count(),
            failure: record.first_failure().map(ToString::to_string),
        }
    }

    /// Returns the test name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the context the test ran in.
    #[must_use]
    pub const fn context(&self) -> ContextId {
        self.context
    }

    /// Returns the aggregated result.
    #[must_use]
    pub const fn result(&self) -> StepStatus {
        self.result
    }

    /// Returns the number of steps, nested ones included.
    #[must_use]
    pub const fn step_count(&self) -> usize {
        self.step_count
    }

    /// Returns the first failure message, with its causes.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

/// Observer storing a summary of every finished test.
#[derive(Debug, Default)]
pub struct ReportCollector {
    summaries: Mutex<Vec<TestSummary>>,
}

impl ReportCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the collected summaries in completion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TestSummary> {
        self.lock().clone()
    }

    /// Removes and returns the collected summaries.
    pub fn drain(&self) -> Vec<TestSummary> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TestSummary>> {
        match self.summaries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl StepObserver for ReportCollector {
    fn name(&self) -> &str {
        "report collector"
    }

    fn test_finished(&self, record: &TestRecord) -> Result<(), ObserverError> {
        self.lock().push(TestSummary::from_record(record));
        Ok(())
    }
}
