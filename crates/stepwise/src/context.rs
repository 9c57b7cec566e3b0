//! Per-test execution contexts.
//!
//! An [`ExecutionContext`] is the unit of isolation: one exists for each
//! concurrently running test. It owns the test's step stack, its scoped
//! variables, and the driver-suspension flag. Contexts are `Send` so a host
//! may create them on one thread and run them on another, but they are never
//! shared; every bus and registry operation takes the context explicitly.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::bus::BusError;
use crate::outcome::StepOutcome;
use crate::step::{ScreenshotRef, Step, StepDescriptor, StepId, TestRecord};
use crate::variables::VariableStore;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an execution context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the numeric identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context-{}", self.0)
    }
}

/// Position of a context in the test lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// No test is running.
    Idle,
    /// A test has started and no step has run yet.
    TestRunning,
    /// At least one step is open.
    StepRunning,
    /// The most recent step finished and no step is open.
    StepFinished,
}

impl LifecyclePhase {
    /// Returns the lowercase label for the phase.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::TestRunning => "test running",
            Self::StepRunning => "step running",
            Self::StepFinished => "step finished",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug)]
struct ActiveTest {
    name: String,
    started_at: SystemTime,
    roots: Vec<Step>,
    open: Vec<Step>,
    next_step: u64,
}

impl ActiveTest {
    fn new(name: String) -> Self {
        Self {
            name,
            started_at: SystemTime::now(),
            roots: Vec::new(),
            open: Vec::new(),
            next_step: 1,
        }
    }

    fn has_failure(&self) -> bool {
        self.roots
            .iter()
            .chain(self.open.iter())
            .flat_map(Step::walk)
            .any(|step| step.status().is_failure())
    }
}

/// Isolated state of one running test.
///
/// Create contexts with [`StepEventBus::new_context`](crate::StepEventBus::new_context)
/// so they pick up the configured `fail_fast` flag.
#[derive(Debug)]
pub struct ExecutionContext {
    id: ContextId,
    test: Option<ActiveTest>,
    variables: VariableStore,
    driver_calls_suspended: bool,
    fail_fast: bool,
}

impl ExecutionContext {
    pub(crate) fn new(fail_fast: bool) -> Self {
        Self {
            id: ContextId::next(),
            test: None,
            variables: VariableStore::new(),
            driver_calls_suspended: false,
            fail_fast,
        }
    }

    /// Returns the context identifier.
    #[must_use]
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Returns the current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        match &self.test {
            None => LifecyclePhase::Idle,
            Some(test) if !test.open.is_empty() => LifecyclePhase::StepRunning,
            Some(test) if test.roots.is_empty() => LifecyclePhase::TestRunning,
            Some(_) => LifecyclePhase::StepFinished,
        }
    }

    /// Returns `true` while a test is running in this context.
    #[must_use]
    pub const fn test_is_running(&self) -> bool {
        self.test.is_some()
    }

    /// Returns the running test's name.
    #[must_use]
    pub fn test_name(&self) -> Option<&str> {
        self.test.as_ref().map(|test| test.name.as_str())
    }

    /// Returns the innermost open step.
    #[must_use]
    pub fn current_step(&self) -> Option<&Step> {
        self.test.as_ref()?.open.last()
    }

    /// Returns the number of open steps.
    #[must_use]
    pub fn open_steps(&self) -> usize {
        self.test.as_ref().map_or(0, |test| test.open.len())
    }

    /// Returns `true` when a step of the running test failed or errored.
    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.test.as_ref().is_some_and(ActiveTest::has_failure)
    }

    /// Returns the scoped variables.
    #[must_use]
    pub const fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Returns the scoped variables mutably.
    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    /// Returns `true` when driver calls are suspended.
    #[must_use]
    pub const fn driver_calls_suspended(&self) -> bool {
        self.driver_calls_suspended
    }

    /// Returns `true` when failing steps are propagated immediately.
    #[must_use]
    pub const fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub(crate) fn set_driver_calls_suspended(&mut self, suspended: bool) {
        self.driver_calls_suspended = suspended;
    }

    pub(crate) fn begin_test(&mut self, name: &str) -> Result<(), BusError> {
        if let Some(running) = &self.test {
            return Err(BusError::InvalidState {
                context: self.id,
                operation: "test_started",
                detail: format!("test '{}' is already running", running.name),
            });
        }
        self.test = Some(ActiveTest::new(name.to_owned()));
        Ok(())
    }

    pub(crate) fn push_step(&mut self, descriptor: StepDescriptor) -> Result<StepId, BusError> {
        let context = self.id;
        let Some(test) = self.test.as_mut() else {
            return Err(violation(context, "step_started", "no test is running"));
        };
        let id = StepId(test.next_step);
        test.next_step += 1;
        test.open.push(Step::start(id, descriptor));
        Ok(id)
    }

    pub(crate) fn pop_step(&mut self, id: StepId, outcome: StepOutcome) -> Result<&Step, BusError> {
        let context = self.id;
        let Some(test) = self.test.as_mut() else {
            return Err(violation(context, "step_finished", "no test is running"));
        };
        let top = test.open.last().map(Step::id);
        if top != Some(id) {
            let detail = match top {
                Some(top) => format!("step {id} is not the innermost open step {top}"),
                None => format!("step {id} finished with no open step"),
            };
            return Err(violation(context, "step_finished", detail));
        }
        let Some(mut step) = test.open.pop() else {
            return Err(violation(context, "step_finished", format!("step {id} vanished")));
        };
        step.close(outcome);
        let siblings = match test.open.last_mut() {
            Some(parent) => {
                parent.push_child(step);
                parent.children()
            }
            None => {
                test.roots.push(step);
                test.roots.as_slice()
            }
        };
        siblings
            .last()
            .ok_or_else(|| violation(context, "step_finished", format!("step {id} was not recorded")))
    }

    pub(crate) fn attach_screenshot(&mut self, screenshot: ScreenshotRef) -> bool {
        let Some(step) = self.test.as_mut().and_then(|test| test.open.last_mut()) else {
            return false;
        };
        step.attach_screenshot(screenshot);
        true
    }

    /// Ends the running test and clears the context's test-scoped state.
    pub(crate) fn end_test(&mut self) -> Result<TestRecord, BusError> {
        let context = self.id;
        let Some(test) = self.test.as_ref() else {
            return Err(violation(context, "test_finished", "no test is running"));
        };
        if let Some(open) = test.open.last() {
            let detail = format!(
                "{} step(s) still open, innermost is '{}'",
                test.open.len(),
                open.name()
            );
            return Err(violation(context, "test_finished", detail));
        }
        let Some(test) = self.test.take() else {
            return Err(violation(context, "test_finished", "no test is running"));
        };
        self.variables.clear();
        Ok(TestRecord::new(test.name, context, test.roots, test.started_at))
    }

    /// Drops the running test after a protocol violation.
    ///
    /// Open steps are closed as errors so nothing in the discarded tree is
    /// left running, then the context returns to idle. An idle context has
    /// no test to drop and keeps its variables.
    pub(crate) fn abort(&mut self, reason: &BusError) {
        let Some(mut test) = self.test.take() else {
            return;
        };
        while let Some(mut step) = test.open.pop() {
            step.close(StepOutcome::errored(reason.to_string()));
            match test.open.last_mut() {
                Some(parent) => parent.push_child(step),
                None => test.roots.push(step),
            }
        }
        log::warn!(
            "aborted test '{}' in {}: {reason}",
            test.name,
            self.id
        );
        self.variables.clear();
    }
}

fn violation(context: ContextId, operation: &'static str, detail: impl Into<String>) -> BusError {
    BusError::ProtocolViolation {
        context,
        operation,
        detail: detail.into(),
    }
}
