//! Waiting for a freshly launched server to accept connections.
//!
//! Having been spawned and serving traffic are separate events: the
//! interpreter has to start and the web framework has to bind its
//! socket. The server doesn't tell us when that happens, so we knock on
//! its port until it answers or we run out of time.

use anyhow::{Context, Result};
use slog_scope::{debug, info};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread::sleep;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often and for how long to poll. There is deliberately no
/// backoff, so the total wait is bounded by `deadline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            interval: Duration::from_millis(500),
            deadline: Duration::from_secs(60),
        }
    }
}

/// The endpoint was polled until the deadline without accepting a
/// connection.
#[derive(Error, Debug, PartialEq)]
#[error("{host}:{port} did not accept connections within {waited:?} ({attempts} attempts)")]
pub struct NotReady {
    pub host: String,
    pub port: u16,
    pub attempts: u32,
    pub waited: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ready {
    pub attempts: u32,
    pub waited: Duration,
}

/// Blocks until `host:port` accepts a TCP connection, or fails with
/// [`NotReady`] once `policy.deadline` has passed.
///
/// Failure to resolve `host` is returned right away, as it won't get
/// better by waiting.
pub fn wait_until_ready(host: &str, port: u16, policy: Policy) -> Result<Ready> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Could not resolve {}:{}", host, port))?
        .collect();
    let start = Instant::now();
    // A deadline too far out to represent is as good as none.
    let deadline = start
        .checked_add(policy.deadline)
        .unwrap_or_else(|| start + Duration::from_secs(100 * 365 * 24 * 60 * 60));
    let mut attempts = 0;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        match try_connect(&addrs, policy.interval.min(remaining)) {
            Ok(()) => {
                let waited = start.elapsed();
                info!("server is accepting connections";
                      "host" => host, "port" => port, "attempts" => attempts,
                      "waited" => ?waited);
                return Ok(Ready { attempts, waited });
            }
            Err(e) => {
                debug!("not ready yet"; "attempt" => attempts, "error" => %e);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(NotReady {
                host: host.to_string(),
                port,
                attempts,
                waited: now - start,
            }
            .into());
        }
        sleep(policy.interval.min(deadline - now));
    }
}

fn try_connect(addrs: &[SocketAddr], timeout: Duration) -> std::io::Result<()> {
    // connect_timeout rejects a zero timeout.
    let timeout = timeout.max(Duration::from_millis(1));
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(_stream) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no addresses to connect to")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn open_listener_is_ready_on_first_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let ready = wait_until_ready("127.0.0.1", port, Policy::default()).unwrap();
        assert_eq!(ready.attempts, 1);
    }

    #[test]
    fn times_out_without_listener() {
        let port = unused_port();
        let policy = Policy {
            interval: Duration::from_millis(50),
            deadline: Duration::from_millis(400),
        };
        let started = Instant::now();
        let err = wait_until_ready("127.0.0.1", port, policy).unwrap_err();
        let elapsed = started.elapsed();

        let not_ready = err.downcast_ref::<NotReady>().expect("a timeout");
        assert_eq!(not_ready.port, port);
        assert!(not_ready.attempts > 1);
        assert!(elapsed >= policy.deadline, "{:?}", elapsed);
        // One poll interval, plus some slack for the scheduler.
        assert!(
            elapsed <= policy.deadline + policy.interval + Duration::from_millis(25),
            "{:?}",
            elapsed
        );
    }

    #[test]
    fn becomes_ready_when_listener_appears() {
        let port = unused_port();
        let binder = std::thread::spawn(move || {
            sleep(Duration::from_millis(300));
            let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
            // Keep it listening for the whole wait.
            sleep(Duration::from_secs(2));
            drop(listener);
        });
        let policy = Policy {
            interval: Duration::from_millis(50),
            deadline: Duration::from_secs(10),
        };
        let ready = wait_until_ready("127.0.0.1", port, policy).unwrap();
        assert!(ready.attempts > 1);
        binder.join().unwrap();
    }

    #[test]
    fn unrepresentable_deadline_does_not_panic() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let policy = Policy {
            interval: Duration::from_millis(50),
            deadline: Duration::MAX,
        };
        let ready = wait_until_ready("127.0.0.1", port, policy).unwrap();
        assert_eq!(ready.attempts, 1);
    }

    #[test]
    fn unresolvable_host_is_not_a_timeout() {
        let err = wait_until_ready("no-such-host.invalid", 80, Policy::default()).unwrap_err();
        assert!(!err.is::<NotReady>());
    }
}
