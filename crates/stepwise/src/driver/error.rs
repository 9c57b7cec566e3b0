//! Driver errors and message normalisation.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use thiserror::Error;

/// Boxed error returned by driver backends.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Coarse category of a [`DriverError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverErrorKind {
    /// The remote driver host did not accept a connection.
    UnreachableHost,
    /// The backend failed to create a session.
    SessionCreation,
    /// The backend failed to close a session.
    Close,
}

impl DriverErrorKind {
    /// Returns the label used when the kind is reported as a cause category.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::UnreachableHost => "UnreachableHost",
            Self::SessionCreation => "SessionCreation",
            Self::Close => "Close",
        }
    }
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors raised by the [`DriverRegistry`](crate::DriverRegistry).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriverError {
    /// The connectivity probe could not reach the remote host.
    ///
    /// The message carries the first line of the probe's error.
    #[error("{host} could not be reached: {}", probe_reason(.source))]
    UnreachableHost {
        /// Host and port that were probed.
        host: String,
        /// Why the probe failed.
        #[source]
        source: io::Error,
    },
    /// The driver factory failed.
    ///
    /// `message` is already normalised with [`normalize_error`].
    #[error("{message}")]
    SessionCreation {
        /// Normalised description of the failure.
        message: String,
        /// Error returned by the factory.
        #[source]
        source: BoxError,
    },
    /// Closing a session failed.
    #[error("failed to close driver session {session}: {message}")]
    Close {
        /// Session id, or `unknown` when the backend never reported one.
        session: String,
        /// Normalised description of the failure.
        message: String,
    },
}

impl DriverError {
    /// Returns the error's category.
    #[must_use]
    pub const fn kind(&self) -> DriverErrorKind {
        match self {
            Self::UnreachableHost { .. } => DriverErrorKind::UnreachableHost,
            Self::SessionCreation { .. } => DriverErrorKind::SessionCreation,
            Self::Close { .. } => DriverErrorKind::Close,
        }
    }
}

/// Builds a one-line description of `error` and its root cause.
///
/// The result is the first line of the error's message. When the error has
/// a source chain, ` (<category> - <first line of the root cause>)` is
/// appended, where the category is the [`io::ErrorKind`] of an I/O error,
/// the [`DriverErrorKind`] of a driver error, or `Error` otherwise. A root
/// cause the message already ends with is not repeated, leaving
/// ` (<category>)`.
///
/// # Examples
///
/// ```
/// use std::io;
/// use stepwise::driver::normalize_error;
///
/// let err = io::Error::new(io::ErrorKind::TimedOut, "no answer\nafter 5s");
/// assert_eq!(normalize_error(&err), "no answer");
/// ```
#[must_use]
pub fn normalize_error(error: &(dyn StdError + 'static)) -> String {
    let headline = first_line(&error.to_string());
    let mut root = error;
    while let Some(next) = root.source() {
        root = next;
    }
    if std::ptr::addr_eq(root, error) {
        return headline;
    }
    let cause = first_line(&root.to_string());
    if headline.ends_with(&cause) {
        return format!("{headline} ({})", category(root));
    }
    format!("{headline} ({} - {cause})", category(root))
}

fn category(error: &(dyn StdError + 'static)) -> String {
    if let Some(io) = error.downcast_ref::<io::Error>() {
        return format!("{:?}", io.kind());
    }
    if let Some(driver) = error.downcast_ref::<DriverError>() {
        return driver.kind().label().to_owned();
    }
    "Error".to_owned()
}

fn probe_reason(source: &io::Error) -> String {
    first_line(&source.to_string())
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().trim_end().to_owned()
}
