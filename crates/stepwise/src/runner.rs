//! Test runner applying the driver restart policy.

use std::sync::Arc;

use crate::bus::{BusError, StepEventBus};
use crate::config::RestartPolicy;
use crate::context::ExecutionContext;
use crate::driver::{CloseSummary, DriverRegistry};
use crate::step::TestRecord;

/// Runs tests against a shared bus and registry.
///
/// The runner reports test boundaries to the bus and recycles driver
/// sessions according to the configured [`RestartPolicy`]:
///
/// - `Scenario` closes a context's session after each of its tests.
/// - `Feature` closes every session in [`finish_feature`](Self::finish_feature).
/// - `Never` keeps sessions until [`shutdown`](Self::shutdown).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use stepwise::driver::{BoxError, Capabilities, DriverFactory, DriverHandle, DriverRegistry, DriverTarget};
/// use stepwise::{RuntimeConfig, StepEventBus, StepOutcome, StepStatus, TestRunner};
///
/// struct NoBrowser;
///
/// impl DriverFactory for NoBrowser {
///     fn create_session(
///         &self,
///         _target: &DriverTarget,
///         _capabilities: &Capabilities,
///         _options: Option<&str>,
///     ) -> Result<Box<dyn DriverHandle>, BoxError> {
///         Err("no browser installed".into())
///     }
/// }
///
/// let config = Arc::new(RuntimeConfig::default());
/// let runner = TestRunner::new(
///     Arc::new(StepEventBus::with_config(Arc::clone(&config))),
///     Arc::new(DriverRegistry::new(config, Arc::new(NoBrowser))),
/// );
/// let mut ctx = runner.bus().new_context();
/// let record = runner.run_test(&mut ctx, "search", |bus, ctx| {
///     bus.run_step(ctx, "type a query", |_| StepOutcome::Passed)?;
///     Ok(())
/// })?;
/// assert_eq!(record.result(), StepStatus::Success);
/// # Ok::<(), stepwise::BusError>(())
/// ```
#[derive(Debug)]
pub struct TestRunner {
    bus: Arc<StepEventBus>,
    registry: Arc<DriverRegistry>,
}

impl TestRunner {
    /// Creates a runner over a bus and registry.
    #[must_use]
    pub fn new(bus: Arc<StepEventBus>, registry: Arc<DriverRegistry>) -> Self {
        Self { bus, registry }
    }

    /// Returns the bus tests report to.
    #[must_use]
    pub fn bus(&self) -> &StepEventBus {
        &self.bus
    }

    /// Returns the driver registry.
    #[must_use]
    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Returns the restart policy from the registry's configuration.
    #[must_use]
    pub fn restart_policy(&self) -> RestartPolicy {
        self.registry.config().restart_policy()
    }

    /// Runs one test in `ctx`.
    ///
    /// `body` runs between `test_started` and `test_finished`; it usually
    /// drives steps through [`StepEventBus::run_step`]. The test is finished
    /// even when `body` returns an error, so observers still see the steps
    /// that ran.
    ///
    /// # Errors
    ///
    /// Returns the error from `body` when it failed, otherwise any error
    /// from starting or finishing the test.
    pub fn run_test<F>(
        &self,
        ctx: &mut ExecutionContext,
        name: &str,
        body: F,
    ) -> Result<TestRecord, BusError>
    where
        F: FnOnce(&StepEventBus, &mut ExecutionContext) -> Result<(), BusError>,
    {
        self.bus.test_started(ctx, name)?;
        let outcome = body(&self.bus, ctx);
        let finished = ctx
            .test_is_running()
            .then(|| self.bus.test_finished(ctx));
        self.after_test(ctx);
        match (outcome, finished) {
            (Err(err), finished) => {
                if let Some(Err(late)) = finished {
                    log::warn!("test '{name}' also failed to finish: {late}");
                }
                Err(err)
            }
            (Ok(()), Some(result)) => result,
            (Ok(()), None) => Err(BusError::InvalidState {
                context: ctx.id(),
                operation: "run_test",
                detail: format!("test '{name}' was aborted by its body"),
            }),
        }
    }

    /// Closes every session when the restart policy is `Feature`.
    ///
    /// Returns an empty summary for the other policies.
    pub fn finish_feature(&self) -> CloseSummary {
        if self.restart_policy() == RestartPolicy::Feature {
            self.registry.close_all()
        } else {
            CloseSummary::default()
        }
    }

    /// Closes every remaining session regardless of policy.
    pub fn shutdown(&self) -> CloseSummary {
        self.registry.close_all()
    }

    fn after_test(&self, ctx: &ExecutionContext) {
        if self.restart_policy() != RestartPolicy::Scenario {
            return;
        }
        if let Err(err) = self.registry.close_session(ctx) {
            log::warn!("{err}");
        }
    }
}
