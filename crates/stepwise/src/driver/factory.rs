//! Session creation seam implemented by driver backends.

use std::fmt;

use url::Url;

use super::error::BoxError;
use super::session::{Capabilities, DriverHandle};

/// Where a new session should be created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverTarget {
    /// A browser launched on this machine.
    Local {
        /// Browser name, for example `chrome`.
        browser: String,
    },
    /// A remote driver endpoint such as a Selenium grid.
    Remote(Url),
}

impl DriverTarget {
    /// Targets a local browser.
    #[must_use]
    pub fn local(browser: impl Into<String>) -> Self {
        Self::Local {
            browser: browser.into(),
        }
    }

    /// Returns the remote endpoint, if any.
    #[must_use]
    pub const fn remote_url(&self) -> Option<&Url> {
        match self {
            Self::Remote(url) => Some(url),
            Self::Local { .. } => None,
        }
    }
}

impl fmt::Display for DriverTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { browser } => write!(f, "local {browser}"),
            Self::Remote(url) => write!(f, "remote {url}"),
        }
    }
}

/// Creates driver sessions for the registry.
pub trait DriverFactory: Send + Sync {
    /// Opens a new session.
    ///
    /// `options` carries the raw driver options string from configuration.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the session could not be created.
    fn create_session(
        &self,
        target: &DriverTarget,
        capabilities: &Capabilities,
        options: Option<&str>,
    ) -> Result<Box<dyn DriverHandle>, BoxError>;
}
