//! Runtime configuration for stepwise.
//!
//! Configuration is read once, usually from `STEPWISE_*` environment
//! variables, and shared immutably between the bus and the registry.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use stepwise_policy::{ScreenshotPolicy, ScreenshotPreference, ScreenshotSettings};
use thiserror::Error;
use url::Url;

use crate::driver::DriverTarget;

/// Prefix shared by every configuration variable.
pub const ENV_PREFIX: &str = "STEPWISE_";

const DEFAULT_OUTPUT_DIR: &str = "target/stepwise";
const DEFAULT_DRIVER: &str = "chrome";
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable held a value that could not be interpreted.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// Full variable name.
        key: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl fmt::Display) -> Self {
        Self::InvalidValue {
            key: format!("{ENV_PREFIX}{key}"),
            value: value.to_owned(),
            reason: reason.to_string(),
        }
    }
}

/// When driver sessions are discarded and recreated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Keep sessions until the runner shuts down.
    Never,
    /// Close every session when a feature finishes.
    Feature,
    /// Close a context's session after each test.
    #[default]
    Scenario,
}

impl RestartPolicy {
    /// Returns the lowercase label for the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Feature => "feature",
            Self::Scenario => "scenario",
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestartPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "feature" | "story" => Ok(Self::Feature),
            "scenario" | "test" => Ok(Self::Scenario),
            other => Err(format!("expected never, feature or scenario, got '{other}'")),
        }
    }
}

fn parse_env_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "True" | "yes" | "YES" | "Yes" | "on" | "ON" | "On" => Some(true),
        "0" | "false" | "FALSE" | "False" | "no" | "NO" | "No" | "off" | "OFF" | "Off" => {
            Some(false)
        }
        _ => None,
    }
}

/// Immutable configuration shared by the bus, registry and runner.
///
/// # Examples
///
/// ```
/// use stepwise::{RestartPolicy, RuntimeConfig};
///
/// let config = RuntimeConfig::from_lookup(|key| match key {
///     "STEPWISE_FAIL_FAST" => Some("yes".to_owned()),
///     "STEPWISE_RESTART_BROWSER_FOR_EACH" => Some("feature".to_owned()),
///     _ => None,
/// })?;
/// assert!(config.fail_fast());
/// assert_eq!(config.restart_policy(), RestartPolicy::Feature);
/// assert_eq!(config.driver(), "chrome");
/// # Ok::<(), stepwise::ConfigError>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    output_dir: PathBuf,
    screenshots: ScreenshotPolicy,
    restart_policy: RestartPolicy,
    fail_fast: bool,
    driver: String,
    driver_options: Option<String>,
    remote_url: Option<Url>,
    probe_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            screenshots: ScreenshotPolicy::default(),
            restart_policy: RestartPolicy::default(),
            fail_fast: false,
            driver: DEFAULT_DRIVER.to_owned(),
            driver_options: None,
            remote_url: None,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl RuntimeConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first variable that
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`, which receives full variable
    /// names such as `STEPWISE_DRIVER`.
    ///
    /// Unset and blank variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first variable that
    /// cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(&format!("{ENV_PREFIX}{key}"))
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let flag = |key: &str| -> Result<bool, ConfigError> {
            read(key).map_or(Ok(false), |value| {
                parse_env_bool(&value)
                    .ok_or_else(|| ConfigError::invalid(key, &value, "expected a boolean"))
            })
        };

        let mut config = Self::default();
        if let Some(dir) = read("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        let mut settings = ScreenshotSettings {
            only_save_failing: flag("ONLY_SAVE_FAILING_SCREENSHOTS")?,
            verbose: flag("VERBOSE_SCREENSHOTS")?,
            ..ScreenshotSettings::default()
        };
        if let Some(level) = read("SCREENSHOT_LEVEL") {
            settings.level = ScreenshotPreference::parse_level(&level)
                .map_err(|err| ConfigError::invalid("SCREENSHOT_LEVEL", &level, err))?;
        }
        if let Some(classes) = read("CLASS_SCREENSHOTS") {
            settings.class_levels = parse_class_levels(&classes)?;
        }
        config.screenshots = ScreenshotPolicy::new(settings);

        if let Some(policy) = read("RESTART_BROWSER_FOR_EACH") {
            config.restart_policy = policy
                .parse()
                .map_err(|err: String| ConfigError::invalid("RESTART_BROWSER_FOR_EACH", &policy, err))?;
        }
        config.fail_fast = flag("FAIL_FAST")?;
        if let Some(driver) = read("DRIVER") {
            config.driver = driver.to_ascii_lowercase();
        }
        config.driver_options = read("DRIVER_OPTIONS");
        if let Some(remote) = read("REMOTE_URL") {
            let url = Url::parse(&remote)
                .map_err(|err| ConfigError::invalid("REMOTE_URL", &remote, err))?;
            config.remote_url = Some(url);
        }
        if let Some(timeout) = read("PROBE_TIMEOUT_MS") {
            let millis: u64 = timeout
                .parse()
                .map_err(|err| ConfigError::invalid("PROBE_TIMEOUT_MS", &timeout, err))?;
            config.probe_timeout = Duration::from_millis(millis);
        }
        Ok(config)
    }

    /// Replaces the screenshot settings.
    #[must_use]
    pub fn with_screenshots(mut self, settings: ScreenshotSettings) -> Self {
        self.screenshots = ScreenshotPolicy::new(settings);
        self
    }

    /// Replaces the restart policy.
    #[must_use]
    pub const fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Enables or disables fail-fast propagation.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Sets the local browser name.
    #[must_use]
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Sets the remote driver endpoint.
    #[must_use]
    pub fn with_remote_url(mut self, url: Url) -> Self {
        self.remote_url = Some(url);
        self
    }

    /// Sets the connectivity probe timeout.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Directory screenshot observers write into.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Screenshot resolver built from the configured settings.
    #[must_use]
    pub const fn screenshot_policy(&self) -> &ScreenshotPolicy {
        &self.screenshots
    }

    /// When sessions are recycled.
    #[must_use]
    pub const fn restart_policy(&self) -> RestartPolicy {
        self.restart_policy
    }

    /// Whether failing steps are propagated immediately.
    #[must_use]
    pub const fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Browser name requested from the driver factory.
    #[must_use]
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Raw driver options passed through to the factory.
    #[must_use]
    pub fn driver_options(&self) -> Option<&str> {
        self.driver_options.as_deref()
    }

    /// Remote driver endpoint, if configured.
    #[must_use]
    pub const fn remote_url(&self) -> Option<&Url> {
        self.remote_url.as_ref()
    }

    /// Upper bound on the remote reachability check.
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Where new sessions are created: the remote endpoint when one is
    /// configured, otherwise the local browser.
    #[must_use]
    pub fn driver_target(&self) -> DriverTarget {
        self.remote_url.as_ref().map_or_else(
            || DriverTarget::local(self.driver.as_str()),
            |url| DriverTarget::Remote(url.clone()),
        )
    }
}

fn parse_class_levels(raw: &str) -> Result<HashMap<String, ScreenshotPreference>, ConfigError> {
    let mut levels = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let Some((type_name, level)) = entry.split_once('=') else {
            return Err(ConfigError::invalid(
                "CLASS_SCREENSHOTS",
                entry,
                "expected Type=level",
            ));
        };
        let level = ScreenshotPreference::parse_level(level)
            .map_err(|err| ConfigError::invalid("CLASS_SCREENSHOTS", entry, err))?;
        if let Some(level) = level {
            levels.insert(type_name.trim().to_owned(), level);
        }
    }
    Ok(levels)
}
