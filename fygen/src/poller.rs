//! Background measurement polling.
//!
//! A [`Poller`] owns a worker thread that reads one measurement every
//! interval and hands the result to a callback. It stops when its
//! [`CancelToken`] fires, when the handle is dropped, or after the link is
//! reported gone.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::CancelToken;
use crate::error::{Error, Result};
use crate::port::Port;
use crate::session::DeviceSession;

/// Default polling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Granularity of the wait between polls.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Which counter to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Measurement {
    /// Frequency counter.
    Frequency,
    /// Event counter.
    Count,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frequency => f.write_str("frequency"),
            Self::Count => f.write_str("count"),
        }
    }
}

/// One measurement result.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Reading {
    /// Frequency in Hertz.
    Frequency(f64),
    /// Event count.
    Count(u64),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frequency(hz) => write!(f, "{hz:.2} Hz"),
            Self::Count(n) => write!(f, "{n}"),
        }
    }
}

/// Take one measurement.
pub fn measure<P: Port>(session: &DeviceSession<P>, measurement: Measurement) -> Result<Reading> {
    match measurement {
        Measurement::Frequency => session.read_frequency().map(Reading::Frequency),
        Measurement::Count => session.read_count().map(Reading::Count),
    }
}

/// Handle of a running poll loop.
pub struct Poller {
    token: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Start polling `measurement` every `interval`.
    ///
    /// The first reading is taken immediately. Fails with
    /// [`Error::NotConnected`] if the session is closed.
    pub fn spawn<P, F>(
        session: Arc<DeviceSession<P>>,
        measurement: Measurement,
        interval: Duration,
        mut on_reading: F,
    ) -> Result<Self>
    where
        P: Port + 'static,
        F: FnMut(Result<Reading>) + Send + 'static,
    {
        if !session.is_connected() {
            return Err(Error::NotConnected);
        }
        let token = CancelToken::new();
        let worker_token = token.clone();

        let handle = thread::Builder::new()
            .name(format!("fygen-poll-{measurement}"))
            .spawn(move || {
                debug!("Polling {measurement} every {interval:?}");
                while !worker_token.is_cancelled() {
                    let started = Instant::now();
                    let result = measure(&session, measurement);
                    let stop = matches!(result, Err(Error::LinkClosed | Error::NotConnected));
                    if worker_token.is_cancelled() {
                        break;
                    }
                    on_reading(result);
                    if stop {
                        debug!("Polling stopped: link gone");
                        break;
                    }
                    wait(&worker_token, interval.saturating_sub(started.elapsed()));
                }
                trace!("Poll loop for {measurement} exited");
            })?;

        Ok(Self {
            token,
            handle: Some(handle),
        })
    }

    /// Token that stops the loop when cancelled.
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the loop and wait for it.
    ///
    /// A poll already waiting on the device finishes first.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("Poll thread panicked");
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("cancelled", &self.token.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn wait(token: &CancelToken, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !token.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(WAIT_SLICE.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::mpsc;

    use super::*;
    use crate::port::mock::{MockHandle, MockPort};
    use crate::session::SessionConfig;

    fn session() -> (Arc<DeviceSession<MockPort>>, MockHandle) {
        let (port, handle) = MockPort::new();
        let config = SessionConfig::default()
            .with_pacing(Duration::ZERO)
            .with_reply_timeout(Duration::from_millis(500))
            .with_read_slice(Duration::from_millis(1));
        (
            Arc::new(DeviceSession::from_port(port, config).unwrap()),
            handle,
        )
    }

    #[test]
    fn test_polls_repeatedly() {
        let (session, handle) = session();
        let counter = Arc::new(Mutex::new(0u64));
        {
            let counter = Arc::clone(&counter);
            handle.respond_with(move |_| {
                let mut n = counter.lock().unwrap();
                *n += 1;
                format!("{:07}\n", *n).into_bytes()
            });
        }

        let (tx, rx) = mpsc::channel();
        let poller = Poller::spawn(
            Arc::clone(&session),
            Measurement::Count,
            Duration::from_millis(5),
            move |reading| {
                let _ = tx.send(reading);
            },
        )
        .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(first, Reading::Count(1));
        assert_eq!(second, Reading::Count(2));

        poller.stop();
        assert!(handle.lines().iter().all(|l| l == "cc"));
    }

    #[test]
    fn test_stops_after_link_closed() {
        let (session, handle) = session();
        handle.drop_link();

        let (tx, rx) = mpsc::channel();
        let poller = Poller::spawn(
            Arc::clone(&session),
            Measurement::Frequency,
            Duration::from_millis(5),
            move |reading| {
                let _ = tx.send(reading);
            },
        )
        .unwrap();

        let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(result, Err(Error::LinkClosed)));

        let start = Instant::now();
        while !poller.is_finished() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(poller.is_finished());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_malformed_reply_keeps_polling() {
        let (session, handle) = session();
        handle.respond_with(|_| b"--\n".to_vec());

        let (tx, rx) = mpsc::channel();
        let _poller = Poller::spawn(
            Arc::clone(&session),
            Measurement::Frequency,
            Duration::from_millis(5),
            move |reading| {
                let _ = tx.send(reading);
            },
        )
        .unwrap();

        for _ in 0..2 {
            let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            assert!(matches!(result, Err(Error::MalformedReply { .. })));
        }
    }

    #[test]
    fn test_spawn_requires_connection() {
        let (session, _handle) = session();
        session.disconnect();
        let result = Poller::spawn(session, Measurement::Count, DEFAULT_INTERVAL, |_| {});
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[test]
    fn test_cancel_interrupts_long_interval() {
        let (session, handle) = session();
        handle.respond_with(|_| b"1\n".to_vec());

        let poller = Poller::spawn(
            Arc::clone(&session),
            Measurement::Count,
            Duration::from_secs(60),
            |_| {},
        )
        .unwrap();
        thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        poller.token().cancel();
        poller.stop();
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
