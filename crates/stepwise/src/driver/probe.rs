//! Reachability checks run before contacting a remote driver host.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use url::Url;

/// Checks that a remote driver endpoint accepts connections.
pub trait ConnectivityProbe: Send + Sync {
    /// Returns `Ok(())` when `url` is reachable within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error explaining why the endpoint is unreachable.
    fn probe(&self, url: &Url, timeout: Duration) -> io::Result<()>;
}

/// Probe that opens a TCP connection to the URL's host and port.
///
/// Name resolution and every connection attempt share one deadline, so a
/// probe returns within `timeout` however many addresses the host resolves
/// to. Resolution runs on a helper thread; a resolver that hangs past the
/// deadline is left to finish on its own. Addresses are tried in turn and
/// the last connection error is returned when none accepts.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpProbe;

impl ConnectivityProbe for TcpProbe {
    fn probe(&self, url: &Url, timeout: Duration) -> io::Result<()> {
        let started = Instant::now();
        let mut last_error = None;
        for addr in resolve(url, timeout)? {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(timed_out(url, timeout, last_error));
            }
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(_) => return Ok(()),
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{url} did not resolve to any address"),
            )
        }))
    }
}

fn resolve(url: &Url, timeout: Duration) -> io::Result<Vec<SocketAddr>> {
    let (tx, rx) = mpsc::channel();
    let target = url.clone();
    thread::Builder::new()
        .name("stepwise-probe-resolver".to_owned())
        .spawn(move || {
            let _ = tx.send(target.socket_addrs(|| None));
        })?;
    match rx.recv_timeout(timeout) {
        Ok(resolved) => resolved,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("resolving {url} took longer than {}ms", timeout.as_millis()),
        )),
    }
}

fn timed_out(url: &Url, timeout: Duration, last_error: Option<io::Error>) -> io::Error {
    last_error.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{url} did not accept a connection within {}ms", timeout.as_millis()),
        )
    })
}
