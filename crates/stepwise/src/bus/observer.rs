//! Observer trait notified at test and step boundaries.

use crate::context::ContextId;
use crate::step::{ScreenshotRef, Step, TestRecord};

use super::error::ObserverError;

/// Receives lifecycle notifications from a [`StepEventBus`](crate::StepEventBus).
///
/// Every method has a no-op default so observers implement only what they
/// need. Observers are shared between threads; notifications for different
/// contexts may arrive concurrently.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use stepwise::{ObserverError, StepObserver, TestRecord};
///
/// #[derive(Default)]
/// struct Counter(AtomicUsize);
///
/// impl StepObserver for Counter {
///     fn test_finished(&self, _record: &TestRecord) -> Result<(), ObserverError> {
///         self.0.fetch_add(1, Ordering::Relaxed);
///         Ok(())
///     }
/// }
///
/// let counter = Counter::default();
/// assert!(!counter.takes_screenshots());
/// ```
pub trait StepObserver: Send + Sync {
    /// Name used when reporting this observer's failures.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// A test started in `context`.
    fn test_started(&self, _context: ContextId, _name: &str) {}

    /// A step started. Parent steps are still open.
    fn step_started(&self, _context: ContextId, _step: &Step) {}

    /// A step finished with a terminal status.
    fn step_finished(&self, _context: ContextId, _step: &Step) {}

    /// A test finished.
    ///
    /// # Errors
    ///
    /// Returned errors are collected by the bus and reported together once
    /// every observer has been notified.
    fn test_finished(&self, _record: &TestRecord) -> Result<(), ObserverError> {
        Ok(())
    }

    /// Whether this observer captures screenshots.
    fn takes_screenshots(&self) -> bool {
        false
    }

    /// Captures a screenshot of the current driver state.
    ///
    /// # Errors
    ///
    /// Returns an error when the capture failed.
    fn take_screenshot(
        &self,
        _context: ContextId,
        _step: Option<&Step>,
    ) -> Result<Option<ScreenshotRef>, ObserverError> {
        Ok(None)
    }
}
