//! Driver handles and the shared session wrapper.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::HashMap;

use super::error::BoxError;

/// Browser name reported by the stand-in used while driver calls are
/// suspended.
pub const DISABLED_BROWSER: &str = "disabled";

/// Backend-specific connection to a browser.
///
/// Implementations wrap a real automation client. The registry only needs
/// to identify, screenshot and close the session.
pub trait DriverHandle: Send {
    /// Remote session id, if the backend assigns one.
    fn session_id(&self) -> Option<String>;

    /// Capabilities negotiated with the backend.
    fn capabilities(&self) -> Capabilities;

    /// Captures the current page as PNG bytes.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the capture fails.
    fn screenshot(&mut self) -> Result<Vec<u8>, BoxError>;

    /// Ends the session.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the session could not be closed.
    fn close(&mut self) -> Result<(), BoxError>;
}

/// Browser name plus arbitrary capability properties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    browser_name: String,
    properties: HashMap<String, String>,
}

impl Capabilities {
    /// Creates capabilities for `browser_name` with no properties.
    #[must_use]
    pub fn new(browser_name: impl Into<String>) -> Self {
        Self {
            browser_name: browser_name.into(),
            properties: HashMap::new(),
        }
    }

    /// Adds or replaces a property.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns the browser name.
    #[must_use]
    pub fn browser_name(&self) -> &str {
        &self.browser_name
    }

    /// Returns a property value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns every property.
    #[must_use]
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }
}

/// Driver that does nothing. Handed out while driver calls are suspended.
#[derive(Clone, Copy, Debug, Default)]
pub struct StubDriver;

impl DriverHandle for StubDriver {
    fn session_id(&self) -> Option<String> {
        None
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(DISABLED_BROWSER)
    }

    fn screenshot(&mut self) -> Result<Vec<u8>, BoxError> {
        Ok(Vec::new())
    }

    fn close(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Shared handle to one driver session.
///
/// Clones refer to the same underlying driver. The handle is locked for the
/// duration of each call so steps on different threads never interleave
/// commands on one session.
#[derive(Clone)]
pub struct DriverSession {
    handle: Arc<Mutex<Box<dyn DriverHandle>>>,
    id: Option<String>,
    disabled: bool,
    capabilities: Capabilities,
}

impl DriverSession {
    /// Wraps a live driver handle.
    #[must_use]
    pub fn new(handle: Box<dyn DriverHandle>) -> Self {
        Self::wrap(handle, false)
    }

    /// Returns a non-functional stand-in session.
    #[must_use]
    pub fn disabled() -> Self {
        Self::wrap(Box::new(StubDriver), true)
    }

    fn wrap(handle: Box<dyn DriverHandle>, disabled: bool) -> Self {
        Self {
            id: handle.session_id(),
            capabilities: handle.capabilities(),
            handle: Arc::new(Mutex::new(handle)),
            disabled,
        }
    }

    /// Returns the backend session id.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns `true` for the stand-in session.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the capabilities captured when the session was created.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns `true` when both values refer to the same driver.
    #[must_use]
    pub fn same_session(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }

    /// Runs `f` with exclusive access to the driver.
    pub fn with_driver<R>(&self, f: impl FnOnce(&mut dyn DriverHandle) -> R) -> R {
        let mut guard = self.lock();
        f(&mut **guard)
    }

    /// Captures a screenshot through the driver.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the capture fails.
    pub fn screenshot(&self) -> Result<Vec<u8>, BoxError> {
        self.with_driver(|driver| driver.screenshot())
    }

    pub(crate) fn close(&self) -> Result<(), BoxError> {
        self.with_driver(|driver| driver.close())
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn DriverHandle>> {
        match self.handle.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl fmt::Debug for DriverSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverSession")
            .field("id", &self.id)
            .field("disabled", &self.disabled)
            .field("browser", &self.capabilities.browser_name)
            .finish_non_exhaustive()
    }
}
