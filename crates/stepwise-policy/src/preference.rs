//! Screenshot capture levels and the declaration flags that select them.

use std::fmt;
use std::str::FromStr;

/// How often screenshots are captured during a test run.
///
/// Levels form a total order from least to most frequent capture. A
/// requested level is permitted when it is at least the effective
/// threshold, so `ForEachAction` is allowed under every threshold and
/// `Disabled` only when capture is disabled outright.
///
/// The "undefined" level used by configuration sources is represented as
/// `Option::<ScreenshotPreference>::None`.
///
/// # Examples
///
/// ```
/// use stepwise_policy::ScreenshotPreference;
///
/// assert!(ScreenshotPreference::ForEachAction > ScreenshotPreference::AfterEachStep);
/// assert!(ScreenshotPreference::ForFailures.is_at_least(ScreenshotPreference::Disabled));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScreenshotPreference {
    /// Never capture screenshots.
    Disabled,
    /// Capture only when a step fails.
    ForFailures,
    /// Capture once after every step.
    AfterEachStep,
    /// Capture before and after every step.
    BeforeAndAfterEachStep,
    /// Capture after every browser action.
    ForEachAction,
}

impl ScreenshotPreference {
    /// All levels in ascending order.
    pub const ALL: [Self; 5] = [
        Self::Disabled,
        Self::ForFailures,
        Self::AfterEachStep,
        Self::BeforeAndAfterEachStep,
        Self::ForEachAction,
    ];

    /// Returns `true` when `self` is at least as frequent as `threshold`.
    #[must_use]
    pub fn is_at_least(self, threshold: Self) -> bool {
        self >= threshold
    }

    /// Returns the canonical snake-case label for the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::ForFailures => "for_failures",
            Self::AfterEachStep => "after_each_step",
            Self::BeforeAndAfterEachStep => "before_and_after_each_step",
            Self::ForEachAction => "for_each_action",
        }
    }

    /// Parses a configured level, mapping `undefined` to `None`.
    ///
    /// Matching ignores case and treats `-` and spaces as `_`.
    ///
    /// # Errors
    ///
    /// Returns [`ParsePreferenceError`] when the text names no known level.
    ///
    /// # Examples
    ///
    /// ```
    /// use stepwise_policy::ScreenshotPreference;
    ///
    /// assert_eq!(
    ///     ScreenshotPreference::parse_level("FOR_FAILURES"),
    ///     Ok(Some(ScreenshotPreference::ForFailures))
    /// );
    /// assert_eq!(ScreenshotPreference::parse_level("undefined"), Ok(None));
    /// assert!(ScreenshotPreference::parse_level("sometimes").is_err());
    /// ```
    pub fn parse_level(value: &str) -> Result<Option<Self>, ParsePreferenceError> {
        let normalized: String = value
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();
        if normalized == "undefined" {
            return Ok(None);
        }
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .map(Some)
            .ok_or_else(|| ParsePreferenceError::new(value))
    }
}

impl fmt::Display for ScreenshotPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScreenshotPreference {
    type Err = ParsePreferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_level(s)?.ok_or_else(|| ParsePreferenceError::new(s))
    }
}

/// Error returned when text does not name a screenshot level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsePreferenceError {
    value: String,
}

impl ParsePreferenceError {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_owned(),
        }
    }

    /// Returns the rejected input.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ParsePreferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown screenshot level '{}', expected one of: disabled, for_failures, \
             after_each_step, before_and_after_each_step, for_each_action",
            self.value
        )
    }
}

impl std::error::Error for ParsePreferenceError {}

/// Screenshot declaration attached to a step method or step-definition type.
///
/// Mirrors the flag set a host framework exposes on its step annotations.
/// The first matching flag wins, in field order; a declaration with no flag
/// set means [`ScreenshotPreference::BeforeAndAfterEachStep`].
///
/// # Examples
///
/// ```
/// use stepwise_policy::{ScreenshotPreference, Screenshots};
///
/// let declared = Screenshots {
///     only_on_failures: true,
///     ..Screenshots::default()
/// };
/// assert_eq!(declared.level(), ScreenshotPreference::ForFailures);
/// assert_eq!(
///     Screenshots::default().level(),
///     ScreenshotPreference::BeforeAndAfterEachStep
/// );
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Screenshots {
    /// Disable capture entirely.
    pub disabled: bool,
    /// Capture only on failure.
    pub only_on_failures: bool,
    /// Capture after every browser action.
    pub for_each_action: bool,
    /// Capture after every step.
    pub after_each_step: bool,
    /// Capture before and after every step.
    pub before_and_after_each_step: bool,
}

impl Screenshots {
    /// Resolves the declared flags into a single level.
    #[must_use]
    pub const fn level(self) -> ScreenshotPreference {
        if self.disabled {
            ScreenshotPreference::Disabled
        } else if self.only_on_failures {
            ScreenshotPreference::ForFailures
        } else if self.for_each_action {
            ScreenshotPreference::ForEachAction
        } else if self.after_each_step {
            ScreenshotPreference::AfterEachStep
        } else {
            ScreenshotPreference::BeforeAndAfterEachStep
        }
    }
}

impl From<Screenshots> for ScreenshotPreference {
    fn from(value: Screenshots) -> Self {
        value.level()
    }
}
