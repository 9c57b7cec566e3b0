//! Screenshot capture policy for stepwise.
//!
//! This crate holds the capture-level ordering and the layered resolver that
//! turns a method override, a class override, the global level, and the
//! legacy boolean flags into a single threshold. It has no dependencies so
//! host integrations can share the definitions without pulling in the
//! runtime.

mod preference;
mod resolver;

pub use preference::{ParsePreferenceError, ScreenshotPreference, Screenshots};
pub use resolver::{ScreenshotOverrides, ScreenshotPolicy, ScreenshotSettings};
