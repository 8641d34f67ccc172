//! In-memory port for protocol tests.
//!
//! Unlike `Cursor<Vec<u8>>`, reads and writes are independent, and the test
//! keeps a [`MockHandle`] to script replies and inspect traffic after the port
//! has moved into a session.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::port::Port;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Default)]
pub(crate) struct MockState {
    /// Bytes the device will send.
    pub reads: VecDeque<u8>,
    /// Bytes already sitting in the driver's input buffer.
    pub buffered: VecDeque<u8>,
    /// Every write call, in order.
    pub writes: Vec<Vec<u8>>,
    /// Link dropped: every read/write fails with `BrokenPipe`.
    pub dropped: bool,
    /// Drop the link once this many writes have succeeded.
    pub drop_after_writes: Option<usize>,
    /// Number of `clear_buffers` calls.
    pub clears: usize,
    /// Whether `close` was called.
    pub closed: bool,
    responder: Option<Responder>,
}

/// Test-side view of a [`MockPort`].
#[derive(Clone)]
pub(crate) struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes for the session to read.
    pub fn push_reply(&self, bytes: &[u8]) {
        self.state().reads.extend(bytes.iter().copied());
    }

    /// Place bytes in the input buffer as if they had arrived earlier;
    /// `clear_buffers` discards them.
    pub fn push_buffered(&self, bytes: &[u8]) {
        self.state().buffered.extend(bytes.iter().copied());
    }

    /// Answer every write with the bytes returned by `responder`.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        self.state().responder = Some(Box::new(responder));
    }

    pub fn drop_link(&self) {
        self.state().dropped = true;
    }

    pub fn drop_after_writes(&self, count: usize) {
        self.state().drop_after_writes = Some(count);
    }

    /// All written bytes concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state().writes.concat()
    }

    /// Written ASCII command lines (without terminator).
    pub fn lines(&self) -> Vec<String> {
        self.state()
            .writes
            .iter()
            .filter(|w| w.last() == Some(&b'\n'))
            .map(|w| String::from_utf8_lossy(&w[..w.len() - 1]).into_owned())
            .collect()
    }
}

pub(crate) struct MockPort {
    state: Arc<Mutex<MockState>>,
    timeout: Duration,
}

impl MockPort {
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let port = Self {
            state: Arc::clone(&state),
            timeout: Duration::from_millis(1),
        };
        (port, MockHandle(state))
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut state = self.state();
            if state.dropped {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link dropped"));
            }
            let state = &mut *state;
            let source = if state.buffered.is_empty() {
                &mut state.reads
            } else {
                &mut state.buffered
            };
            if !source.is_empty() {
                let n = buf.len().min(source.len());
                for (slot, byte) in buf.iter_mut().zip(source.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
        }
        // Behave like a serial read with a short timeout
        thread::sleep(self.timeout);
        Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.dropped {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link dropped"));
        }
        state.writes.push(buf.to_vec());
        if state.drop_after_writes == Some(state.writes.len()) {
            state.dropped = true;
        }
        let reply = state.responder.as_mut().map(|r| r(buf));
        if let Some(reply) = reply {
            state.reads.extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn baud_rate(&self) -> u32 {
        crate::port::DEFAULT_BAUD
    }

    fn clear_buffers(&mut self) -> Result<()> {
        // Scripted replies stay queued: they stand for bytes the device sends later.
        let mut state = self.state();
        state.buffered.clear();
        state.clears += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.state().closed = true;
        Ok(())
    }
}
