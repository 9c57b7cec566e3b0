//! Core runtime for `stepwise`.
//!
//! This crate tracks the step lifecycle of running behaviour tests, keeps one
//! browser-driver session per concurrently running test, decides when
//! screenshots may be taken, and gives each test a scoped variable store.
//!
//! Each test thread owns an [`ExecutionContext`]. The shared
//! [`StepEventBus`] and [`DriverRegistry`] take that context explicitly on
//! every call, so there is no thread-local state to leak between tests.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use stepwise::{ReportCollector, StepEventBus, StepOutcome, StepStatus};
//!
//! let bus = StepEventBus::new();
//! let reports = Arc::new(ReportCollector::new());
//! bus.register_listener(reports.clone());
//!
//! let mut ctx = bus.new_context();
//! bus.test_started(&mut ctx, "add to basket")?;
//! bus.run_step(&mut ctx, "a product page", |ctx| {
//!     ctx.variables_mut().insert("sku", "SKU-1042".to_owned());
//!     StepOutcome::Passed
//! })?;
//! bus.run_step(&mut ctx, "the basket shows the product", |ctx| {
//!     match ctx.variables().get::<_, String>("sku") {
//!         Some(sku) if sku == "SKU-1042" => StepOutcome::Passed,
//!         other => StepOutcome::failed(format!("unexpected sku {other:?}")),
//!     }
//! })?;
//! bus.test_finished(&mut ctx)?;
//!
//! assert_eq!(reports.snapshot()[0].result(), StepStatus::Success);
//! # Ok::<(), stepwise::BusError>(())
//! ```

mod bus;
mod config;
mod context;
pub mod driver;
mod outcome;
mod panic;
mod reporting;
mod runner;
mod step;
mod variables;

pub use bus::{BusError, ObserverError, ObserverErrors, ObserverFailure, StepEventBus, StepObserver};
pub use config::{ConfigError, ENV_PREFIX, RestartPolicy, RuntimeConfig};
pub use context::{ContextId, ExecutionContext, LifecyclePhase};
pub use driver::{DriverError, DriverRegistry, DriverSession};
pub use outcome::StepOutcome;
pub use reporting::{ReportCollector, TestSummary};
pub use runner::TestRunner;
pub use step::{
    FailureDetail, ScreenshotRef, Step, StepDescriptor, StepId, StepOwner, StepStatus, TestRecord,
};
pub use stepwise_policy::{
    ScreenshotOverrides, ScreenshotPolicy, ScreenshotPreference, ScreenshotSettings, Screenshots,
};
pub use variables::{VariableKey, VariableStore};
