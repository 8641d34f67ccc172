//! Device session: the single owner of the serial link.
//!
//! Every command goes through [`DeviceSession`], which serializes access with
//! a mutex so lines from concurrent callers are never interleaved. A caller
//! that needs several commands to reach the device back to back (a sweep
//! setup, an upload handshake) holds a [`Link`] guard for the whole sequence.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fygen::{Channel, DeviceSession, Waveform};
//!
//! # #[cfg(feature = "native")]
//! # fn main() -> fygen::Result<()> {
//! let session = DeviceSession::connect("/dev/ttyUSB0", 9600)?;
//! session.set_waveform(Channel::Main, Waveform::Sine)?;
//! session.set_frequency(Channel::Main, 1000.0)?;
//! println!("{:.2} Hz", session.read_frequency()?);
//! session.disconnect();
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "native"))]
//! # fn main() {}
//! ```

use std::fmt;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::port::{Port, READ_SLICE};
use crate::protocol::command::{self, Channel, SweepSettings, TriggerSource, Waveform};
use crate::protocol::reply;

/// Quiescence delay after every write.
pub const DEFAULT_PACING: Duration = Duration::from_millis(100);

/// Default bound on waiting for a reply line.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Line terminator appended to every command.
const TERMINATOR: u8 = b'\n';

/// Session timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Delay after each write before the next one may start.
    pub pacing: Duration,
    /// Bound on waiting for a reply line.
    pub reply_timeout: Duration,
    /// Timeout of a single blocking port read.
    pub read_slice: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            read_slice: READ_SLICE,
        }
    }
}

impl SessionConfig {
    /// Set the pacing delay.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Set the reply timeout.
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Set the read slice.
    #[must_use]
    pub fn with_read_slice(mut self, slice: Duration) -> Self {
        self.read_slice = slice;
        self
    }
}

struct LinkState<P> {
    port: P,
    /// Bytes read past the last returned line.
    pending: Vec<u8>,
}

/// An open connection to the generator.
pub struct DeviceSession<P: Port> {
    link: Mutex<Option<LinkState<P>>>,
    connected: AtomicBool,
    closing: AtomicBool,
    config: SessionConfig,
    name: String,
}

#[cfg(feature = "native")]
impl DeviceSession<crate::port::NativePort> {
    /// Open `port_name` with default timing.
    pub fn connect(port_name: &str, baud_rate: u32) -> Result<Self> {
        Self::connect_with(port_name, baud_rate, SessionConfig::default())
    }

    /// Open `port_name` with explicit timing.
    pub fn connect_with(port_name: &str, baud_rate: u32, config: SessionConfig) -> Result<Self> {
        let serial = crate::port::SerialConfig::new(port_name, baud_rate)
            .with_timeout(config.read_slice);
        let port = crate::port::NativePort::open(&serial)?;
        Self::from_port(port, config)
    }
}

impl<P: Port> DeviceSession<P> {
    /// Wrap an already open port.
    pub fn from_port(mut port: P, config: SessionConfig) -> Result<Self> {
        port.set_timeout(config.read_slice)?;
        let name = port.name().to_string();
        info!("Connected to {name} at {} baud", port.baud_rate());
        Ok(Self {
            link: Mutex::new(Some(LinkState {
                port,
                pending: Vec::new(),
            })),
            connected: AtomicBool::new(true),
            closing: AtomicBool::new(false),
            config,
            name,
        })
    }

    /// Timing parameters.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Name of the underlying port.
    pub fn port_name(&self) -> &str {
        &self.name
    }

    /// Whether the link is open.
    ///
    /// Does not wait for a caller currently holding the link.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Take exclusive use of the link, queueing behind any current holder.
    pub fn lock(&self) -> Result<Link<'_, P>> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let guard = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            return Err(Error::NotConnected);
        }
        Ok(Link {
            guard,
            session: self,
        })
    }

    /// Release the link. Safe to call any number of times.
    ///
    /// A caller holding the link on another thread fails with
    /// [`Error::LinkClosed`] at its next write or within one read slice.
    pub fn disconnect(&self) {
        self.closing.store(true, Ordering::Release);
        let mut guard = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut state) = guard.take() {
            if let Err(e) = state.port.close() {
                debug!("Error closing {}: {e}", self.name);
            }
            info!("Disconnected from {}", self.name);
        }
        self.connected.store(false, Ordering::Release);
    }

    /// Send one command line.
    pub fn send(&self, command: &str) -> Result<()> {
        self.lock()?.send(command)
    }

    /// Send one command line and wait for its reply line.
    ///
    /// Input left over from earlier exchanges, such as a reply that arrived
    /// after its query timed out, is discarded before the command is written.
    pub fn send_and_read_line(&self, command: &str, timeout: Duration) -> Result<String> {
        let mut link = self.lock()?;
        link.clear_input()?;
        link.send(command)?;
        link.read_line(timeout)
    }

    /// Read the frequency counter, in Hertz.
    pub fn read_frequency(&self) -> Result<f64> {
        let line = self.send_and_read_line(command::POLL_FREQUENCY, self.config.reply_timeout)?;
        reply::parse_frequency(command::POLL_FREQUENCY, &line)
    }

    /// Read the event counter.
    pub fn read_count(&self) -> Result<u64> {
        let line = self.send_and_read_line(command::POLL_COUNT, self.config.reply_timeout)?;
        reply::parse_count(command::POLL_COUNT, &line)
    }

    /// Reset the event counter.
    pub fn clear_count(&self) -> Result<()> {
        self.send(command::CLEAR_COUNT)
    }

    /// Read the model identification string.
    pub fn read_model(&self) -> Result<String> {
        let line = self.send_and_read_line(command::READ_MODEL, self.config.reply_timeout)?;
        Ok(line.trim().to_string())
    }

    /// Select the output waveform of a channel.
    pub fn set_waveform(&self, channel: Channel, waveform: Waveform) -> Result<()> {
        self.send(&command::set_waveform(channel, waveform)?)
    }

    /// Set a channel's frequency in Hertz.
    pub fn set_frequency(&self, channel: Channel, hz: f64) -> Result<()> {
        self.send(&command::set_frequency(channel, hz)?)
    }

    /// Set a channel's amplitude in volts.
    pub fn set_amplitude(&self, channel: Channel, volts: f64) -> Result<()> {
        self.send(&command::set_amplitude(channel, volts)?)
    }

    /// Set a channel's DC offset in volts.
    pub fn set_offset(&self, channel: Channel, volts: f64) -> Result<()> {
        self.send(&command::set_offset(channel, volts)?)
    }

    /// Set a channel's duty cycle in percent.
    pub fn set_duty_cycle(&self, channel: Channel, percent: f64) -> Result<()> {
        self.send(&command::set_duty_cycle(channel, percent)?)
    }

    /// Set the phase of CH2 relative to CH1.
    pub fn set_phase(&self, degrees: u16) -> Result<()> {
        self.send(&command::set_phase(degrees)?)
    }

    /// Select the burst trigger source.
    pub fn set_trigger_source(&self, source: TriggerSource) -> Result<()> {
        self.send(&command::set_trigger_source(source))
    }

    /// Set the number of cycles per burst.
    pub fn set_trigger_cycles(&self, cycles: u32) -> Result<()> {
        self.send(&command::set_trigger_cycles(cycles)?)
    }

    /// Program sweep limits, time and mode.
    ///
    /// All four lines are built before anything is sent, and are sent
    /// without other commands in between.
    pub fn configure_sweep(&self, settings: &SweepSettings) -> Result<()> {
        let lines = command::configure_sweep(settings)?;
        let mut link = self.lock()?;
        for line in &lines {
            link.send(line)?;
        }
        Ok(())
    }

    /// Start sweeping.
    pub fn start_sweep(&self) -> Result<()> {
        self.send(command::SWEEP_RUN)
    }

    /// Stop sweeping.
    pub fn stop_sweep(&self) -> Result<()> {
        self.send(command::SWEEP_STOP)
    }
}

impl<P: Port> Drop for DeviceSession<P> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<P: Port> fmt::Debug for DeviceSession<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("port", &self.name)
            .field("connected", &self.is_connected())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Exclusive use of the link, held until dropped.
pub struct Link<'a, P: Port> {
    guard: MutexGuard<'a, Option<LinkState<P>>>,
    session: &'a DeviceSession<P>,
}

impl<P: Port> Link<'_, P> {
    fn state(&mut self) -> Result<&mut LinkState<P>> {
        self.guard.as_mut().ok_or(Error::NotConnected)
    }

    /// Record a failure; a dropped link is released for good.
    fn fail(&mut self, err: Error) -> Error {
        if matches!(err, Error::LinkClosed) {
            if let Some(mut state) = self.guard.take() {
                let _ = state.port.close();
                self.session.connected.store(false, Ordering::Release);
                warn!("Link to {} closed", self.session.name);
            }
        }
        err
    }

    /// Fail once `disconnect` has been requested, even while we hold the link.
    fn check_open(&mut self) -> Result<()> {
        if self.session.closing.load(Ordering::Acquire) {
            return Err(self.fail(Error::LinkClosed));
        }
        Ok(())
    }

    fn pace(&self) {
        let pacing = self.session.config.pacing;
        if !pacing.is_zero() {
            trace!("Pacing {pacing:?}");
            thread::sleep(pacing);
        }
    }

    /// Write one command line, then wait the pacing delay.
    ///
    /// Does not read a reply.
    pub fn send(&mut self, command: &str) -> Result<()> {
        if command.contains(['\n', '\r']) {
            return Err(Error::InvalidArgument(format!(
                "command contains a line break: {command:?}"
            )));
        }
        self.check_open()?;
        let mut line = Vec::with_capacity(command.len() + 1);
        line.extend_from_slice(command.as_bytes());
        line.push(TERMINATOR);

        let result = self.state()?.port.write_all_bytes(&line);
        if let Err(e) = result {
            return Err(self.fail(Error::from_link_io(e)));
        }
        debug!("-> {command}");
        self.pace();
        Ok(())
    }

    /// Write raw bytes, then wait the pacing delay.
    pub fn write_paced(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_open()?;
        let result = self.state()?.port.write_all_bytes(bytes);
        if let Err(e) = result {
            return Err(self.fail(Error::from_link_io(e)));
        }
        trace!("-> {} raw byte(s)", bytes.len());
        self.pace();
        Ok(())
    }

    /// Wait for one terminated line. The terminator (and a trailing `\r`) is
    /// stripped.
    pub fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let start = Instant::now();
        loop {
            let state = self.state()?;
            if let Some(end) = state.pending.iter().position(|&b| b == TERMINATOR) {
                let mut line: Vec<u8> = state.pending.drain(..=end).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                let line = String::from_utf8_lossy(&line).into_owned();
                debug!("<- {line}");
                return Ok(line);
            }
            self.fill(start, timeout)?;
        }
    }

    /// Wait for exactly `count` bytes.
    pub fn read_exact_bytes(&mut self, count: usize, timeout: Duration) -> Result<Vec<u8>> {
        let start = Instant::now();
        loop {
            let state = self.state()?;
            if state.pending.len() >= count {
                let bytes: Vec<u8> = state.pending.drain(..count).collect();
                trace!("<- {bytes:02X?}");
                return Ok(bytes);
            }
            self.fill(start, timeout)?;
        }
    }

    /// One read slice into the pending buffer.
    fn fill(&mut self, start: Instant, timeout: Duration) -> Result<()> {
        self.check_open()?;
        if start.elapsed() >= timeout {
            // A partial reply must not prefix the next one
            self.state()?.pending.clear();
            return Err(Error::ResponseTimeout(timeout));
        }

        let mut buf = [0u8; 64];
        let state = self.state()?;
        match state.port.read(&mut buf) {
            Ok(0) => Err(self.fail(Error::LinkClosed)),
            Ok(n) => {
                trace!("Received {n} bytes");
                state.pending.extend_from_slice(&buf[..n]);
                Ok(())
            },
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(()),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(()),
            Err(e) => {
                let err = match Error::from_link_io(e) {
                    // A failed read on an open port means the device is gone
                    Error::Io(_) => Error::LinkClosed,
                    other => other,
                };
                Err(self.fail(err))
            },
        }
    }

    /// Discard unread input, on the host side and in the port driver.
    pub fn clear_input(&mut self) -> Result<()> {
        let state = self.state()?;
        state.pending.clear();
        state.port.clear_buffers()
    }
}
