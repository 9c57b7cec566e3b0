//! Per-context driver session registry.

use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::HashMap;

use crate::config::RuntimeConfig;
use crate::context::{ContextId, ExecutionContext};

use super::error::{DriverError, normalize_error};
use super::factory::{DriverFactory, DriverTarget};
use super::probe::{ConnectivityProbe, TcpProbe};
use super::session::{Capabilities, DriverSession};

/// Capabilities of every session created so far, keyed by browser name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityRecord {
    browsers: HashMap<String, Capabilities>,
}

impl CapabilityRecord {
    fn record(&mut self, capabilities: &Capabilities) {
        self.browsers.insert(
            capabilities.browser_name().to_owned(),
            capabilities.clone(),
        );
    }

    /// Returns the capabilities most recently reported for `browser`.
    #[must_use]
    pub fn get(&self, browser: &str) -> Option<&Capabilities> {
        self.browsers.get(browser)
    }

    /// Iterates over the recorded browser names.
    pub fn browsers(&self) -> impl Iterator<Item = &str> + '_ {
        self.browsers.keys().map(String::as_str)
    }

    /// Returns the number of recorded browsers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.browsers.len()
    }

    /// Returns `true` when no capabilities have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.browsers.is_empty()
    }
}

/// Outcome of [`DriverRegistry::close_all`].
#[derive(Debug, Default)]
pub struct CloseSummary {
    /// Sessions closed cleanly.
    pub closed: usize,
    /// Sessions whose close failed. They are removed from the registry all
    /// the same.
    pub failures: Vec<DriverError>,
}

impl CloseSummary {
    /// Returns `true` when every session closed cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns at most one live driver session per execution context.
///
/// The map lock is held only for lookups and updates. Probing and session
/// creation run without it, so a slow grid blocks only the context waiting
/// for it.
pub struct DriverRegistry {
    config: Arc<RuntimeConfig>,
    factory: Arc<dyn DriverFactory>,
    probe: Arc<dyn ConnectivityProbe>,
    sessions: Mutex<HashMap<ContextId, DriverSession>>,
    capabilities: Mutex<CapabilityRecord>,
}

impl DriverRegistry {
    /// Creates a registry that probes remote hosts over TCP.
    #[must_use]
    pub fn new(config: Arc<RuntimeConfig>, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            config,
            factory,
            probe: Arc::new(TcpProbe),
            sessions: Mutex::new(HashMap::new()),
            capabilities: Mutex::new(CapabilityRecord::default()),
        }
    }

    /// Replaces the connectivity probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Returns the configuration sessions are created from.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Returns the context's session, creating one on first use.
    ///
    /// While the context has driver calls suspended a disabled stand-in is
    /// returned and neither the probe nor the factory is consulted. The
    /// stand-in is not stored.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::UnreachableHost`] when a remote host fails the
    /// probe and [`DriverError::SessionCreation`] when the factory fails.
    pub fn current_session(&self, ctx: &ExecutionContext) -> Result<DriverSession, DriverError> {
        if ctx.driver_calls_suspended() {
            return Ok(DriverSession::disabled());
        }
        if let Some(session) = lock(&self.sessions).get(&ctx.id()) {
            return Ok(session.clone());
        }
        let session = self.create_session()?;
        log::info!(
            "opened {} driver session {} for {}",
            session.capabilities().browser_name(),
            session.id().unwrap_or("without id"),
            ctx.id()
        );
        let stored = lock(&self.sessions)
            .entry(ctx.id())
            .or_insert(session)
            .clone();
        Ok(stored)
    }

    /// Returns the id of the context's live session without creating one.
    #[must_use]
    pub fn current_session_id(&self, ctx: &ExecutionContext) -> Option<String> {
        lock(&self.sessions)
            .get(&ctx.id())
            .and_then(|session| session.id().map(str::to_owned))
    }

    /// Returns `true` when the context would be handed a disabled session.
    #[must_use]
    pub fn current_driver_is_disabled(&self, ctx: &ExecutionContext) -> bool {
        ctx.driver_calls_suspended()
            || lock(&self.sessions)
                .get(&ctx.id())
                .is_some_and(DriverSession::is_disabled)
    }

    /// Returns `true` when the context has a live session.
    #[must_use]
    pub fn has_session(&self, ctx: &ExecutionContext) -> bool {
        lock(&self.sessions).contains_key(&ctx.id())
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Returns a snapshot of the capabilities recorded so far.
    #[must_use]
    pub fn capabilities(&self) -> CapabilityRecord {
        lock(&self.capabilities).clone()
    }

    /// Closes and forgets the context's session.
    ///
    /// Returns `Ok(false)` when the context had no session.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Close`] when the backend fails to close. The
    /// session is forgotten regardless.
    pub fn close_session(&self, ctx: &ExecutionContext) -> Result<bool, DriverError> {
        let context = ctx.id();
        let Some(session) = lock(&self.sessions).remove(&context) else {
            return Ok(false);
        };
        close(&session)?;
        log::debug!("closed driver session for {context}");
        Ok(true)
    }

    /// Closes every session and empties the registry.
    ///
    /// Close failures are logged and collected; they never stop the
    /// remaining sessions from closing.
    pub fn close_all(&self) -> CloseSummary {
        let sessions: Vec<(ContextId, DriverSession)> = lock(&self.sessions).drain().collect();
        let mut summary = CloseSummary::default();
        for (context, session) in sessions {
            match close(&session) {
                Ok(()) => summary.closed += 1,
                Err(err) => {
                    log::warn!("could not close driver session for {context}: {err}");
                    summary.failures.push(err);
                }
            }
        }
        summary
    }

    fn create_session(&self) -> Result<DriverSession, DriverError> {
        let target = self.config.driver_target();
        if let DriverTarget::Remote(url) = &target {
            self.probe
                .probe(url, self.config.probe_timeout())
                .map_err(|source| DriverError::UnreachableHost {
                    host: host_label(url),
                    source,
                })?;
        }
        let desired = Capabilities::new(self.config.driver());
        let handle = self
            .factory
            .create_session(&target, &desired, self.config.driver_options())
            .map_err(|source| DriverError::SessionCreation {
                message: normalize_error(&*source),
                source,
            })?;
        let session = DriverSession::new(handle);
        lock(&self.capabilities).record(session.capabilities());
        Ok(session)
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("target", &self.config.driver_target())
            .field("active_sessions", &self.active_sessions())
            .finish_non_exhaustive()
    }
}

fn close(session: &DriverSession) -> Result<(), DriverError> {
    session.close().map_err(|err| DriverError::Close {
        session: session.id().unwrap_or("unknown").to_owned(),
        message: normalize_error(&*err),
    })
}

fn host_label(url: &url::Url) -> String {
    let host = url.host_str().unwrap_or_else(|| url.as_str());
    url.port_or_known_default()
        .map_or_else(|| host.to_owned(), |port| format!("{host}:{port}"))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
