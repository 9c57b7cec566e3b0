//! Fake driver backends, probes and a capturing logger shared by the
//! behavioural tests.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use stepwise::driver::{BoxError, Capabilities, ConnectivityProbe, DriverFactory, DriverHandle, DriverTarget};
use url::Url;

/// Driver handle that counts how often it was closed.
pub struct FakeHandle {
    id: String,
    browser: String,
    closes: Arc<AtomicUsize>,
    fail_close: bool,
}

impl DriverHandle for FakeHandle {
    fn session_id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(self.browser.as_str()).with("platformName", "linux")
    }

    fn screenshot(&mut self) -> Result<Vec<u8>, BoxError> {
        Ok(b"\x89PNG".to_vec())
    }

    fn close(&mut self) -> Result<(), BoxError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(Box::new(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "browser already gone",
            )));
        }
        Ok(())
    }
}

/// Factory creating [`FakeHandle`]s with sequential session ids.
#[derive(Default)]
pub struct FakeFactory {
    created: AtomicUsize,
    closes: Arc<AtomicUsize>,
    failing_closes: Mutex<Vec<usize>>,
    failure: Option<&'static str>,
}

impl FakeFactory {
    /// Factory whose every session creation fails with `message`.
    pub fn failing(message: &'static str) -> Self {
        Self {
            failure: Some(message),
            ..Self::default()
        }
    }

    /// Makes the `nth` created session (one-based) fail when closed.
    pub fn fail_close_of(self, nth: usize) -> Self {
        lock(&self.failing_closes).push(nth);
        self
    }

    /// Number of sessions created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of close calls seen so far.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl DriverFactory for FakeFactory {
    fn create_session(
        &self,
        target: &DriverTarget,
        capabilities: &Capabilities,
        _options: Option<&str>,
    ) -> Result<Box<dyn DriverHandle>, BoxError> {
        if let Some(message) = self.failure {
            return Err(Box::new(FactoryFailure {
                message,
                cause: io::Error::new(io::ErrorKind::NotFound, "chromedriver not on PATH\nsearched /usr/bin"),
            }));
        }
        let nth = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let browser = match target {
            DriverTarget::Local { browser } => browser.clone(),
            DriverTarget::Remote(_) => capabilities.browser_name().to_owned(),
        };
        Ok(Box::new(FakeHandle {
            id: format!("session-{nth}"),
            browser,
            closes: Arc::clone(&self.closes),
            fail_close: lock(&self.failing_closes).contains(&nth),
        }))
    }
}

/// Error with a multi-line message and an I/O cause.
#[derive(Debug)]
pub struct FactoryFailure {
    message: &'static str,
    cause: io::Error,
}

impl std::fmt::Display for FactoryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message)
    }
}

impl std::error::Error for FactoryFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Probe with a fixed answer that counts its calls.
pub struct FakeProbe {
    reachable: bool,
    calls: AtomicUsize,
}

impl FakeProbe {
    /// Probe that accepts every URL.
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            calls: AtomicUsize::new(0),
        }
    }

    /// Probe that refuses every URL.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of probes run.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConnectivityProbe for FakeProbe {
    fn probe(&self, url: &Url, _timeout: Duration) -> io::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reachable {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("connection refused by {url}"),
            ))
        }
    }
}

struct CapturingLogger {
    lines: Mutex<Vec<String>>,
}

impl log::Log for CapturingLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::Level::Warn
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            lock(&self.lines).push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger {
    lines: Mutex::new(Vec::new()),
};
static INIT_LOGGER: Once = Once::new();

/// Installs the capturing logger and clears previously captured lines.
///
/// Tests reading captured lines must run `#[serial]`.
pub fn capture_warnings() {
    INIT_LOGGER.call_once(|| {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(log::LevelFilter::Warn);
    });
    lock(&LOGGER.lines).clear();
}

/// Warnings logged since the last [`capture_warnings`].
pub fn captured_warnings() -> Vec<String> {
    lock(&LOGGER.lines).clone()
}

/// Parses a URL the tests know to be valid.
pub fn url(raw: &str) -> Url {
    let Ok(url) = Url::parse(raw) else {
        panic!("test url {raw} should parse");
    };
    url
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
