//! Layered resolution of the effective screenshot threshold.
//!
//! The resolver is a pure function over explicit inputs: callers pass the
//! overrides they already know about (the executing step's own declaration
//! and its declaring type) alongside the configured [`ScreenshotSettings`].

use std::collections::HashMap;

use crate::preference::ScreenshotPreference;

/// Process-wide screenshot configuration.
///
/// `level` takes precedence over the legacy boolean flags. When it is
/// `None` the flags are consulted in order: `only_save_failing` first, then
/// `verbose`, falling back to [`ScreenshotPreference::BeforeAndAfterEachStep`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScreenshotSettings {
    /// Globally configured level, if any.
    pub level: Option<ScreenshotPreference>,
    /// Legacy flag: keep only screenshots of failing steps.
    pub only_save_failing: bool,
    /// Legacy flag: capture after every browser action.
    pub verbose: bool,
    /// Levels configured per step-definition type name.
    pub class_levels: HashMap<String, ScreenshotPreference>,
}

impl ScreenshotSettings {
    /// Creates settings with a global level and no legacy flags.
    #[must_use]
    pub fn with_level(level: ScreenshotPreference) -> Self {
        Self {
            level: Some(level),
            ..Self::default()
        }
    }

    /// Returns the configured level for a step-definition type.
    #[must_use]
    pub fn class_level(&self, type_name: &str) -> Option<ScreenshotPreference> {
        self.class_levels.get(type_name).copied()
    }

    fn legacy_threshold(&self) -> ScreenshotPreference {
        if self.only_save_failing {
            ScreenshotPreference::ForFailures
        } else if self.verbose {
            ScreenshotPreference::ForEachAction
        } else {
            ScreenshotPreference::BeforeAndAfterEachStep
        }
    }
}

/// Overrides known at the point a screenshot decision is made.
///
/// # Examples
///
/// ```
/// use stepwise_policy::{ScreenshotOverrides, ScreenshotPreference};
///
/// let overrides = ScreenshotOverrides::default()
///     .with_method(ScreenshotPreference::Disabled)
///     .with_declaring_type("CheckoutSteps", None);
/// assert_eq!(overrides.method, Some(ScreenshotPreference::Disabled));
/// assert_eq!(overrides.declaring_type, Some("CheckoutSteps"));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScreenshotOverrides<'a> {
    /// Level declared on the executing step method.
    pub method: Option<ScreenshotPreference>,
    /// Level declared on the step's declaring type.
    pub class: Option<ScreenshotPreference>,
    /// Name of the step's declaring type, used for configured class levels.
    pub declaring_type: Option<&'a str>,
}

impl<'a> ScreenshotOverrides<'a> {
    /// Sets the method-level override.
    #[must_use]
    pub const fn with_method(mut self, level: ScreenshotPreference) -> Self {
        self.method = Some(level);
        self
    }

    /// Sets the declaring type and its explicit override, if any.
    #[must_use]
    pub const fn with_declaring_type(
        mut self,
        type_name: &'a str,
        class: Option<ScreenshotPreference>,
    ) -> Self {
        self.declaring_type = Some(type_name);
        self.class = class;
        self
    }
}

/// Decides whether a requested screenshot level is permitted.
///
/// # Examples
///
/// ```
/// use stepwise_policy::{
///     ScreenshotOverrides, ScreenshotPolicy, ScreenshotPreference, ScreenshotSettings,
/// };
///
/// let policy = ScreenshotPolicy::new(ScreenshotSettings::with_level(
///     ScreenshotPreference::AfterEachStep,
/// ));
/// let none = ScreenshotOverrides::default();
/// assert!(policy.are_allowed(ScreenshotPreference::BeforeAndAfterEachStep, &none));
/// assert!(!policy.are_allowed(ScreenshotPreference::ForFailures, &none));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScreenshotPolicy {
    settings: ScreenshotSettings,
}

impl ScreenshotPolicy {
    /// Creates a resolver over the given settings.
    #[must_use]
    pub fn new(settings: ScreenshotSettings) -> Self {
        Self { settings }
    }

    /// Returns the settings this resolver reads.
    #[must_use]
    pub fn settings(&self) -> &ScreenshotSettings {
        &self.settings
    }

    /// Resolves the explicit threshold, or `None` when every tier is
    /// undefined and the legacy flags apply.
    ///
    /// Precedence is method override, then class override (explicit first,
    /// then the level configured for the declaring type), then the global
    /// level.
    #[must_use]
    pub fn configured_threshold(
        &self,
        overrides: &ScreenshotOverrides<'_>,
    ) -> Option<ScreenshotPreference> {
        overrides
            .method
            .or_else(|| self.class_threshold(overrides))
            .or(self.settings.level)
    }

    /// Resolves the threshold actually applied, including the legacy chain.
    #[must_use]
    pub fn effective_threshold(&self, overrides: &ScreenshotOverrides<'_>) -> ScreenshotPreference {
        self.configured_threshold(overrides)
            .unwrap_or_else(|| self.settings.legacy_threshold())
    }

    /// Returns `true` when `requested` is at least the effective threshold.
    #[must_use]
    pub fn are_allowed(
        &self,
        requested: ScreenshotPreference,
        overrides: &ScreenshotOverrides<'_>,
    ) -> bool {
        requested.is_at_least(self.effective_threshold(overrides))
    }

    fn class_threshold(&self, overrides: &ScreenshotOverrides<'_>) -> Option<ScreenshotPreference> {
        overrides.class.or_else(|| {
            overrides
                .declaring_type
                .and_then(|name| self.settings.class_level(name))
        })
    }
}
