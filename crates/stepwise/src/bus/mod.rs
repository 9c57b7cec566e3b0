//! The step event bus.
//!
//! Hosts report test and step boundaries to a [`StepEventBus`], which keeps
//! each [`ExecutionContext`]'s step stack consistent and fans the events out
//! to registered [`StepObserver`]s. The observer set is a copy-on-write
//! snapshot: registration swaps in a new slice, and notification iterates a
//! cloned `Arc` without holding the lock.

mod error;
mod observer;

use std::fmt;
use std::sync::{Arc, RwLock};

use stepwise_policy::ScreenshotPreference;

use crate::config::RuntimeConfig;
use crate::context::ExecutionContext;
use crate::outcome::StepOutcome;
use crate::panic::catch;
use crate::step::{FailureDetail, ScreenshotRef, Step, StepDescriptor, StepId, TestRecord};

pub use error::{BusError, ObserverError, ObserverErrors, ObserverFailure};
pub use observer::StepObserver;

type ObserverSet = Arc<[Arc<dyn StepObserver>]>;

/// Tracks step lifecycles and notifies observers.
///
/// One bus is shared by every concurrently running test; the per-test state
/// lives in the [`ExecutionContext`] passed to each call.
///
/// # Examples
///
/// ```
/// use stepwise::{StepEventBus, StepOutcome, StepStatus};
///
/// let bus = StepEventBus::new();
/// let mut ctx = bus.new_context();
/// bus.test_started(&mut ctx, "guest checkout")?;
/// bus.run_step(&mut ctx, "the basket holds one item", |_| StepOutcome::Passed)?;
/// let record = bus.test_finished(&mut ctx)?;
/// assert_eq!(record.result(), StepStatus::Success);
/// # Ok::<(), stepwise::BusError>(())
/// ```
pub struct StepEventBus {
    observers: RwLock<ObserverSet>,
    config: Arc<RuntimeConfig>,
}

impl Default for StepEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl StepEventBus {
    /// Creates a bus with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Arc::new(RuntimeConfig::default()))
    }

    /// Creates a bus reading screenshot and fail-fast settings from `config`.
    #[must_use]
    pub fn with_config(config: Arc<RuntimeConfig>) -> Self {
        Self {
            observers: RwLock::new(Arc::from(Vec::new())),
            config,
        }
    }

    /// Returns the bus configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Registers an observer.
    ///
    /// Returns `false` when the same `Arc` is already registered. Observers
    /// are notified in registration order.
    pub fn register_listener(&self, observer: Arc<dyn StepObserver>) -> bool {
        let mut guard = match self.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.iter().any(|known| Arc::ptr_eq(known, &observer)) {
            return false;
        }
        let mut next: Vec<_> = guard.iter().cloned().collect();
        next.push(observer);
        *guard = Arc::from(next);
        true
    }

    /// Returns the number of registered observers.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.observers().len()
    }

    /// Creates a fresh context for one test thread.
    #[must_use]
    pub fn new_context(&self) -> ExecutionContext {
        ExecutionContext::new(self.config.fail_fast())
    }

    /// Starts a test in `ctx`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidState`] when a test is already running.
    /// The running test is left untouched.
    pub fn test_started(&self, ctx: &mut ExecutionContext, name: &str) -> Result<(), BusError> {
        ctx.begin_test(name)?;
        let context = ctx.id();
        log::debug!("test '{name}' started in {context}");
        for observer in self.observers().iter() {
            notify(&**observer, "test_started", |o| o.test_started(context, name));
        }
        Ok(())
    }

    /// Opens a step nested in the current one.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ProtocolViolation`] when no test is running.
    pub fn step_started(
        &self,
        ctx: &mut ExecutionContext,
        descriptor: impl Into<StepDescriptor>,
    ) -> Result<StepId, BusError> {
        let id = ctx
            .push_step(descriptor.into())
            .map_err(|err| abort(ctx, err))?;
        let context = ctx.id();
        if let Some(step) = ctx.current_step() {
            log::debug!("step {id} '{}' started in {context}", step.name());
            for observer in self.observers().iter() {
                notify(&**observer, "step_started", |o| o.step_started(context, step));
            }
        }
        Ok(id)
    }

    /// Closes the innermost open step with `outcome`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ProtocolViolation`] when `id` is not the
    /// innermost open step. The test is aborted.
    pub fn step_finished(
        &self,
        ctx: &mut ExecutionContext,
        id: StepId,
        outcome: StepOutcome,
    ) -> Result<(), BusError> {
        let context = ctx.id();
        match ctx.pop_step(id, outcome) {
            Ok(step) => {
                log::debug!("step {id} '{}' finished as {}", step.name(), step.status());
                for observer in self.observers().iter() {
                    notify(&**observer, "step_finished", |o| o.step_finished(context, step));
                }
                Ok(())
            }
            Err(err) => Err(abort(ctx, err)),
        }
    }

    /// Finishes the running test and notifies every observer.
    ///
    /// Every observer is notified even when an earlier one fails. The
    /// context is idle and its variables are cleared afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ProtocolViolation`] when no test is running, or
    /// when steps are still open, in which case the test is aborted. Returns
    /// [`BusError::Notification`] carrying the record when any observer
    /// failed or panicked.
    pub fn test_finished(&self, ctx: &mut ExecutionContext) -> Result<TestRecord, BusError> {
        let record = ctx.end_test().map_err(|err| abort(ctx, err))?;
        log::debug!(
            "test '{}' finished in {} as {}",
            record.name(),
            record.context(),
            record.result()
        );
        let mut failures = Vec::new();
        for observer in self.observers().iter() {
            let error = match catch(|| observer.test_finished(&record)) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(message) => ObserverError::Panicked(message),
            };
            log::warn!("observer {} failed after test '{}': {error}", observer.name(), record.name());
            failures.push(ObserverFailure {
                observer: observer.name().to_owned(),
                error,
            });
        }
        if failures.is_empty() {
            Ok(record)
        } else {
            Err(BusError::Notification(Box::new(ObserverErrors::new(
                record, failures,
            ))))
        }
    }

    /// Makes the driver registry hand out disabled sessions for `ctx`.
    pub fn suspend_driver_calls(&self, ctx: &mut ExecutionContext) {
        ctx.set_driver_calls_suspended(true);
    }

    /// Restores real driver sessions for `ctx`.
    pub fn resume_driver_calls(&self, ctx: &mut ExecutionContext) {
        ctx.set_driver_calls_suspended(false);
    }

    /// Asks the first screenshot-taking observer for a screenshot.
    ///
    /// The screenshot is attached to the current step. Nothing is captured
    /// while driver calls are suspended or when no observer takes
    /// screenshots.
    ///
    /// # Errors
    ///
    /// Returns the observer's error, or [`ObserverError::Panicked`] when it
    /// panicked.
    pub fn take_screenshot(
        &self,
        ctx: &mut ExecutionContext,
    ) -> Result<Option<ScreenshotRef>, ObserverError> {
        if ctx.driver_calls_suspended() {
            return Ok(None);
        }
        let Some(observer) = self
            .observers()
            .iter()
            .find(|observer| observer.takes_screenshots())
            .cloned()
        else {
            return Ok(None);
        };
        let context = ctx.id();
        let step = ctx.current_step();
        let screenshot = catch(|| observer.take_screenshot(context, step))
            .map_err(ObserverError::Panicked)??;
        if let Some(shot) = &screenshot {
            ctx.attach_screenshot(shot.clone());
        }
        Ok(screenshot)
    }

    /// Returns `true` when a screenshot at `requested` level may be taken
    /// for the current step of `ctx`.
    #[must_use]
    pub fn screenshots_allowed(
        &self,
        ctx: &ExecutionContext,
        requested: ScreenshotPreference,
    ) -> bool {
        let overrides = ctx
            .current_step()
            .map(|step| step.descriptor().screenshot_overrides())
            .unwrap_or_default();
        self.config
            .screenshot_policy()
            .are_allowed(requested, &overrides)
    }

    /// Runs a step body between `step_started` and `step_finished`.
    ///
    /// The body receives the context so it can open nested steps and use
    /// scoped variables. When an earlier step of the test failed, the body
    /// is not run and the step is recorded as skipped. A panicking body is
    /// recorded as an error; steps it left open are closed first.
    ///
    /// # Errors
    ///
    /// Propagates protocol violations. With `fail_fast` enabled, a failed or
    /// errored step is returned as [`BusError::StepFailed`] after it has been
    /// recorded.
    pub fn run_step<F>(
        &self,
        ctx: &mut ExecutionContext,
        descriptor: impl Into<StepDescriptor>,
        body: F,
    ) -> Result<StepOutcome, BusError>
    where
        F: FnOnce(&mut ExecutionContext) -> StepOutcome,
    {
        let descriptor = descriptor.into();
        let name = descriptor.name().to_owned();
        let skip = ctx.has_failure();
        let id = self.step_started(ctx, descriptor)?;
        let outcome = if skip {
            StepOutcome::Skipped
        } else {
            match catch(|| body(&mut *ctx)) {
                Ok(outcome) => outcome,
                Err(message) => {
                    let detail = FailureDetail::new(format!("step panicked: {message}"));
                    self.close_nested(ctx, id, &detail)?;
                    StepOutcome::Errored(detail)
                }
            }
        };
        self.step_finished(ctx, id, outcome.clone())?;
        if ctx.fail_fast() {
            if let Some(detail) = outcome.failure() {
                return Err(BusError::StepFailed {
                    context: ctx.id(),
                    step: name,
                    detail: detail.clone(),
                });
            }
        }
        Ok(outcome)
    }

    fn close_nested(
        &self,
        ctx: &mut ExecutionContext,
        id: StepId,
        detail: &FailureDetail,
    ) -> Result<(), BusError> {
        while let Some(top) = ctx.current_step().map(Step::id) {
            if top == id {
                break;
            }
            self.step_finished(ctx, top, StepOutcome::Errored(detail.clone()))?;
        }
        Ok(())
    }

    fn observers(&self) -> ObserverSet {
        match self.observers.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}

impl fmt::Debug for StepEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .observers()
            .iter()
            .map(|observer| observer.name().to_owned())
            .collect();
        f.debug_struct("StepEventBus")
            .field("observers", &names)
            .field("config", &self.config)
            .finish()
    }
}

fn notify(observer: &dyn StepObserver, event: &str, f: impl FnOnce(&dyn StepObserver)) {
    if let Err(message) = catch(|| f(observer)) {
        log::warn!("observer {} panicked during {event}: {message}", observer.name());
    }
}

fn abort(ctx: &mut ExecutionContext, err: BusError) -> BusError {
    if matches!(err, BusError::ProtocolViolation { .. }) {
        ctx.abort(&err);
    }
    err
}
