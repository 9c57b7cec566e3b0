//! Driver session management.
//!
//! The [`DriverRegistry`] hands each execution context its own
//! [`DriverSession`], created lazily through a [`DriverFactory`]. Remote
//! targets are checked with a [`ConnectivityProbe`] first so an unreachable
//! grid fails fast with a readable message instead of a backend timeout.

mod error;
mod factory;
mod probe;
mod registry;
mod session;

pub use error::{BoxError, DriverError, DriverErrorKind, normalize_error};
pub use factory::{DriverFactory, DriverTarget};
pub use probe::{ConnectivityProbe, TcpProbe};
pub use registry::{CapabilityRecord, CloseSummary, DriverRegistry};
pub use session::{Capabilities, DISABLED_BROWSER, DriverHandle, DriverSession, StubDriver};
