//! Serial session
//!
//! A [`SerialSession`] runs one connection to one device: it opens the port,
//! shuttles bytes between the device and the operator until the device goes
//! away or the operator asks to exit, and reports why it stopped. All waiting
//! happens in a single `poll(2)` over the hot-plug monitor, the port and the
//! operator input.

use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::codec::{echo_bytes, normalize_line_endings, outgoing_byte, trace_byte, TraceSource};
use super::device::{DeviceDescriptor, DeviceSummary, HotplugAction};
use super::hotplug::{HotplugError, HotplugSource};
use super::logger::SessionLogger;
use super::poller::{wait_ready, Readiness};
use super::state_machine::{DisconnectReason, SessionState, SessionStateMachine, StateError};
use super::transport::{is_transient, write_patiently, Connector, SerialLink, SerialSettings};

/// Largest chunk read from the device at once
pub const READ_CHUNK: usize = 256;

/// Vendor whose devices never echo typed characters themselves
pub const FORCED_ECHO_VENDOR: &str = "Synthetos";

/// Session errors that end the whole run, not just the connection
#[derive(Error, Debug)]
pub enum SessionError {
    /// Waiting for readiness failed
    #[error("poll failed: {0}")]
    Poll(#[source] nix::Error),

    /// Hot-plug monitor failed
    #[error(transparent)]
    Hotplug(#[from] HotplugError),

    /// Writing to the operator display or the transcript failed
    #[error("display write failed: {0}")]
    Display(#[source] io::Error),

    /// Reading operator input failed
    #[error("operator input failed: {0}")]
    Input(#[source] io::Error),

    /// Lifecycle bookkeeping went wrong
    #[error(transparent)]
    State(#[from] StateError),
}

/// The reserved control byte that ends the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitSignal(u8);

impl ExitSignal {
    /// Control-`letter`, e.g. `control('X')` is 0x18
    pub fn control(letter: char) -> Option<Self> {
        let letter = letter.to_ascii_uppercase();
        if ('@'..='_').contains(&letter) {
            Some(Self(letter as u8 - b'@'))
        } else {
            None
        }
    }

    /// The byte that triggers exit
    pub fn byte(self) -> u8 {
        self.0
    }

    /// The letter pressed with Control
    pub fn letter(self) -> char {
        char::from(self.0 + b'@')
    }
}

impl Default for ExitSignal {
    fn default() -> Self {
        Self(0x18)
    }
}

/// Per-session behavior switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Byte that ends the monitor
    pub exit_signal: ExitSignal,
    /// Echo typed characters locally
    pub echo: bool,
    /// Print a trace line for every byte read
    pub debug: bool,
    /// Delay after each byte sent to the device
    pub tx_pace: Duration,
    /// Devices whose vendor name starts with this always get local echo
    pub echo_vendor_prefix: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            exit_signal: ExitSignal::default(),
            echo: false,
            debug: false,
            tx_pace: Duration::from_millis(2),
            echo_vendor_prefix: Some(FORCED_ECHO_VENDOR.to_string()),
        }
    }
}

impl SessionOptions {
    /// Whether local echo applies to `device`
    pub fn echo_for(&self, device: &DeviceDescriptor) -> bool {
        if self.echo {
            return true;
        }
        match (&self.echo_vendor_prefix, &device.vendor_name) {
            (Some(prefix), Some(vendor)) => vendor.starts_with(prefix.as_str()),
            _ => false,
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Connection is gone; the supervisor should wait for the next device
    Closed(DisconnectReason),
    /// Operator sent the exit signal
    ExitRequested,
}

/// Operator keystrokes, read one byte at a time
///
/// Once the input reaches end of file it is dropped from the poll set; the
/// monitor keeps running but can no longer be told to exit from here.
pub struct OperatorInput<I> {
    inner: I,
    interactive: bool,
    open: bool,
}

impl<I: Read + AsFd> OperatorInput<I> {
    /// Wrap an input stream; `interactive` is true for a terminal
    pub fn new(inner: I, interactive: bool) -> Self {
        Self {
            inner,
            interactive,
            open: true,
        }
    }

    /// Still part of the poll set
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Descriptor to poll, while open
    pub fn poll_fd(&self) -> Option<BorrowedFd<'_>> {
        self.open.then(|| self.inner.as_fd())
    }

    /// Read one byte after `readiness` reported activity
    ///
    /// An empty read is ignored; it closes the input when the descriptor
    /// also hung up, or when the input is not a terminal.
    pub fn read_byte(&mut self, readiness: Readiness) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.inner.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => {
                if readiness.hangup || !self.interactive {
                    debug!("Operator input reached end of file");
                    self.open = false;
                }
                Ok(None)
            }
            Err(ref e) if is_transient(e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Resources owned by the supervisor and lent to each session
pub struct SessionIo<'a, H, I, D: Write, S: Write> {
    /// Hot-plug monitor
    pub hotplug: &'a mut H,
    /// Operator input
    pub input: &'a mut OperatorInput<I>,
    /// Display and transcript
    pub logger: &'a mut SessionLogger<D, S>,
    /// Lifecycle state
    pub state: &'a mut SessionStateMachine,
}

/// One connection to one device
pub struct SerialSession<'a> {
    device: &'a DeviceDescriptor,
    options: &'a SessionOptions,
    echo: bool,
}

impl<'a> SerialSession<'a> {
    /// Prepare a session for a matching device
    pub fn new(device: &'a DeviceDescriptor, options: &'a SessionOptions) -> Self {
        Self {
            device,
            options,
            echo: options.echo_for(device),
        }
    }

    /// Device node of this session
    pub fn path(&self) -> &str {
        &self.device.path
    }

    /// Open the port and run until disconnect or exit
    pub fn run<C, H, I, D, S>(
        &self,
        connector: &mut C,
        settings: &SerialSettings,
        io: SessionIo<'_, H, I, D, S>,
    ) -> Result<SessionOutcome, SessionError>
    where
        C: Connector,
        H: HotplugSource,
        I: Read + AsFd,
        D: Write,
        S: Write,
    {
        let SessionIo {
            hotplug,
            input,
            logger,
            state,
        } = io;
        let path = self.path();

        state.transition(SessionState::Connecting, Some(path))?;
        logger
            .println(&format!(
                "USB Serial device{} connected @{}",
                DeviceSummary::Connected(self.device).extra_info(),
                path
            ))
            .and_then(|()| {
                logger.println(&format!(
                    "Use Control-{} to exit.",
                    self.options.exit_signal.letter()
                ))
            })
            .map_err(SessionError::Display)?;

        let mut link = match connector.open(path, settings) {
            Ok(link) => link,
            Err(e) => {
                warn!("Unable to open {}: {}", path, e);
                logger
                    .println(&format!("Unable to open port '{}'", path))
                    .map_err(SessionError::Display)?;
                let reason = DisconnectReason::OpenFailed(e.to_string());
                state.set_disconnect_reason(reason.clone());
                state.transition(SessionState::Closed, Some("open failed"))?;
                return Ok(SessionOutcome::Closed(reason));
            }
        };

        state.transition(SessionState::Open, None)?;
        info!("Session open on {} (echo {})", path, self.echo);

        let end = self.pump(&mut link, hotplug, input, logger)?;
        drop(link);

        match end {
            LoopEnd::Exit => {
                state.transition(SessionState::Closing, Some("exit requested"))?;
                state.transition(SessionState::Closed, None)?;
                info!("Exit requested while {} was open", path);
                Ok(SessionOutcome::ExitRequested)
            }
            LoopEnd::Disconnected(reason) => {
                info!("{} disconnected: {}", path, reason);
                state.set_disconnect_reason(reason.clone());
                state.transition(SessionState::Closing, Some(reason.to_string().as_str()))?;
                logger
                    .println(&format!("USB Serial device @{} disconnected.", path))
                    .and_then(|()| logger.println(""))
                    .map_err(SessionError::Display)?;
                state.transition(SessionState::Closed, None)?;
                Ok(SessionOutcome::Closed(reason))
            }
        }
    }

    fn pump<L, H, I, D, S>(
        &self,
        link: &mut L,
        hotplug: &mut H,
        input: &mut OperatorInput<I>,
        logger: &mut SessionLogger<D, S>,
    ) -> Result<LoopEnd, SessionError>
    where
        L: SerialLink,
        H: HotplugSource,
        I: Read + AsFd,
        D: Write,
        S: Write,
    {
        let mut buf = [0u8; READ_CHUNK];

        loop {
            let ready = {
                let mut fds = vec![hotplug.as_fd(), link.as_fd()];
                fds.extend(input.poll_fd());
                wait_ready(&fds).map_err(SessionError::Poll)?
            };

            if ready[0].is_ready() {
                if let Some(event) = hotplug.poll_event()? {
                    if event.action == HotplugAction::Removed && event.path == self.device.path {
                        return Ok(LoopEnd::Disconnected(DisconnectReason::Removed));
                    }
                }
            }

            if ready[1].is_ready() {
                match link.read(&mut buf) {
                    Ok(0) => {
                        return Ok(LoopEnd::Disconnected(DisconnectReason::ReadFailed(
                            "end of stream".to_string(),
                        )))
                    }
                    Ok(n) => self.show_device_output(&buf[..n], logger)?,
                    Err(ref e) if is_transient(e) => {}
                    Err(e) => {
                        return Ok(LoopEnd::Disconnected(DisconnectReason::ReadFailed(
                            e.to_string(),
                        )))
                    }
                }
            }

            let input_ready = ready.get(2).copied().unwrap_or_default();
            if input_ready.is_ready() {
                let Some(byte) = input.read_byte(input_ready).map_err(SessionError::Input)? else {
                    continue;
                };
                if self.options.debug {
                    logger
                        .println(&trace_byte(TraceSource::Stdin, byte))
                        .map_err(SessionError::Display)?;
                }
                if byte == self.options.exit_signal.byte() {
                    return Ok(LoopEnd::Exit);
                }
                if self.echo {
                    logger
                        .display(&echo_bytes(byte))
                        .map_err(SessionError::Display)?;
                }
                if let Err(e) = write_patiently(link, &[outgoing_byte(byte)]) {
                    return Ok(LoopEnd::Disconnected(DisconnectReason::WriteFailed(
                        e.to_string(),
                    )));
                }
                if !self.options.tx_pace.is_zero() {
                    thread::sleep(self.options.tx_pace);
                }
            }
        }
    }

    fn show_device_output<D: Write, S: Write>(
        &self,
        data: &[u8],
        logger: &mut SessionLogger<D, S>,
    ) -> Result<(), SessionError> {
        if self.options.debug {
            for &byte in data {
                logger
                    .println(&trace_byte(TraceSource::Serial, byte))
                    .map_err(SessionError::Display)?;
            }
        }
        logger
            .display(&normalize_line_endings(data))
            .and_then(|()| logger.log_bytes(data))
            .map_err(SessionError::Display)
    }
}

enum LoopEnd {
    Exit,
    Disconnected(DisconnectReason),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{MockConnector, TransportError};
    use std::collections::VecDeque;
    use std::os::unix::net::UnixStream;

    /// Hot-plug source woken by writing to a socket pair
    struct QueuedHotplug {
        wake: UnixStream,
        wake_peer: UnixStream,
        events: VecDeque<DeviceDescriptor>,
    }

    impl QueuedHotplug {
        fn new() -> Self {
            let (wake, wake_peer) = UnixStream::pair().unwrap();
            Self {
                wake,
                wake_peer,
                events: VecDeque::new(),
            }
        }

        fn push(&mut self, event: DeviceDescriptor) {
            self.events.push_back(event);
            self.wake_peer.write_all(&[1]).unwrap();
        }
    }

    impl AsFd for QueuedHotplug {
        fn as_fd(&self) -> BorrowedFd<'_> {
            self.wake.as_fd()
        }
    }

    impl HotplugSource for QueuedHotplug {
        fn poll_event(&mut self) -> Result<Option<DeviceDescriptor>, HotplugError> {
            let mut byte = [0u8; 1];
            self.wake.read_exact(&mut byte).map_err(HotplugError::Receive)?;
            Ok(self.events.pop_front())
        }
    }

    struct Harness {
        hotplug: QueuedHotplug,
        input: OperatorInput<UnixStream>,
        keyboard: UnixStream,
        logger: SessionLogger<Vec<u8>, Vec<u8>>,
        state: SessionStateMachine,
    }

    impl Harness {
        fn new() -> Self {
            let (input, keyboard) = UnixStream::pair().unwrap();
            Self {
                hotplug: QueuedHotplug::new(),
                input: OperatorInput::new(input, false),
                keyboard,
                logger: SessionLogger::with_sink(Vec::new(), Vec::new()),
                state: SessionStateMachine::new(),
            }
        }

        fn run(
            &mut self,
            device: &DeviceDescriptor,
            options: &SessionOptions,
            connector: &mut MockConnector,
        ) -> SessionOutcome {
            SerialSession::new(device, options)
                .run(
                    connector,
                    &SerialSettings::default(),
                    SessionIo {
                        hotplug: &mut self.hotplug,
                        input: &mut self.input,
                        logger: &mut self.logger,
                        state: &mut self.state,
                    },
                )
                .unwrap()
        }

        fn display(&self) -> String {
            String::from_utf8_lossy(self.logger.display_writer()).into_owned()
        }
    }

    fn acm0() -> DeviceDescriptor {
        DeviceDescriptor::new("/dev/ttyACM0")
            .vendor_name("Teensyduino")
            .serial_number("42")
            .action(HotplugAction::Added)
    }

    fn quiet_options() -> SessionOptions {
        SessionOptions {
            tx_pace: Duration::ZERO,
            ..SessionOptions::default()
        }
    }

    fn connector_for(link: UnixStream) -> MockConnector {
        let mut connector = MockConnector::new();
        connector
            .expect_open()
            .withf(|path, _| path.to_string() == "/dev/ttyACM0")
            .times(1)
            .return_once(move |_, _| Ok(link));
        connector
    }

    #[test]
    fn test_exit_signal() {
        assert_eq!(ExitSignal::default().byte(), 0x18);
        assert_eq!(ExitSignal::control('y').map(ExitSignal::byte), Some(0x19));
        assert_eq!(ExitSignal::control('X').map(ExitSignal::letter), Some('X'));
        assert_eq!(ExitSignal::control('1'), None);
    }

    #[test]
    fn test_forced_echo_vendor() {
        let options = SessionOptions::default();
        assert!(options.echo_for(&DeviceDescriptor::new("/dev/ttyUSB0").vendor_name("Synthetos Inc")));
        assert!(!options.echo_for(&acm0()));
        let echo = SessionOptions {
            echo: true,
            ..SessionOptions::default()
        };
        assert!(echo.echo_for(&acm0()));
    }

    #[test]
    fn test_removal_of_other_device_is_ignored() {
        let mut harness = Harness::new();
        let (link, mut device) = UnixStream::pair().unwrap();
        let mut connector = connector_for(link);

        harness.hotplug.push(
            DeviceDescriptor::new("/dev/ttyUSB7")
                .vendor_name("FTDI")
                .action(HotplugAction::Removed),
        );
        device.write_all(b"hello\n").unwrap();
        harness.keyboard.write_all(&[0x18]).unwrap();

        let outcome = harness.run(&acm0(), &quiet_options(), &mut connector);

        assert_eq!(outcome, SessionOutcome::ExitRequested);
        let display = harness.display();
        assert!(display.starts_with("USB Serial device with vendor 'Teensyduino' serial '42' connected @/dev/ttyACM0\r\n"));
        assert!(display.contains("Use Control-X to exit.\r\n"));
        assert!(display.ends_with("hello\r\n"));
        assert!(!display.contains("disconnected"));
        assert_eq!(harness.state.state(), SessionState::Closed);
    }

    #[test]
    fn test_removal_of_own_device_closes() {
        let mut harness = Harness::new();
        let (link, _device) = UnixStream::pair().unwrap();
        let mut connector = connector_for(link);

        harness
            .hotplug
            .push(acm0().action(HotplugAction::Removed));

        let outcome = harness.run(&acm0(), &quiet_options(), &mut connector);

        assert_eq!(outcome, SessionOutcome::Closed(DisconnectReason::Removed));
        assert!(harness
            .display()
            .ends_with("USB Serial device @/dev/ttyACM0 disconnected.\r\n\r\n"));
        assert_eq!(
            harness.state.path(),
            vec![
                SessionState::Waiting,
                SessionState::Connecting,
                SessionState::Open,
                SessionState::Closing,
                SessionState::Closed,
            ]
        );
    }

    #[test]
    fn test_device_hangup_closes() {
        let mut harness = Harness::new();
        let (link, device) = UnixStream::pair().unwrap();
        let mut connector = connector_for(link);
        drop(device);

        let outcome = harness.run(&acm0(), &quiet_options(), &mut connector);

        assert!(matches!(
            outcome,
            SessionOutcome::Closed(DisconnectReason::ReadFailed(_))
        ));
        assert_eq!(harness.state.disconnect_reason(), Some(&DisconnectReason::ReadFailed("end of stream".into())));
    }

    #[test]
    fn test_open_failure_returns_to_supervisor() {
        let mut harness = Harness::new();
        let mut connector = MockConnector::new();
        connector
            .expect_open()
            .times(1)
            .returning(|path, _| Err(TransportError::PermissionDenied(path.to_string())));

        let outcome = harness.run(&acm0(), &quiet_options(), &mut connector);

        assert!(matches!(
            outcome,
            SessionOutcome::Closed(DisconnectReason::OpenFailed(_))
        ));
        assert!(harness
            .display()
            .ends_with("Unable to open port '/dev/ttyACM0'\r\n"));
        assert_eq!(harness.state.state(), SessionState::Closed);
        assert_eq!(harness.state.sessions_opened(), 0);
    }

    #[test]
    fn test_keystrokes_translated_and_echoed() {
        let mut harness = Harness::new();
        let (link, mut device) = UnixStream::pair().unwrap();
        let mut connector = connector_for(link);
        let options = SessionOptions {
            echo: true,
            ..quiet_options()
        };

        harness.keyboard.write_all(b"a\r\n\x18").unwrap();
        let outcome = harness.run(&acm0(), &options, &mut connector);
        assert_eq!(outcome, SessionOutcome::ExitRequested);

        let mut sent = [0u8; 3];
        device.read_exact(&mut sent).unwrap();
        assert_eq!(&sent, b"a\r\r");
        assert!(harness.display().ends_with("a\r\n\n"));
    }

    #[test]
    fn test_debug_traces_bytes() {
        let mut harness = Harness::new();
        let (link, mut device) = UnixStream::pair().unwrap();
        let mut connector = connector_for(link);
        let options = SessionOptions {
            debug: true,
            ..quiet_options()
        };

        device.write_all(b"Z").unwrap();
        harness.keyboard.write_all(&[0x18]).unwrap();
        harness.run(&acm0(), &options, &mut connector);

        let display = harness.display();
        assert!(display.contains("Serial.Read 'Z' 0x5a\r\n"));
        assert!(display.contains("stdin.Read '.' 0x18\r\n"));
        let transcript = String::from_utf8(harness.logger.sink().unwrap().clone()).unwrap();
        assert!(transcript.contains(": Serial.Read 'Z' 0x5a\n"));
    }

    #[test]
    fn test_input_eof_keeps_session_open() {
        let mut harness = Harness::new();
        let (link, device) = UnixStream::pair().unwrap();
        let mut connector = connector_for(link);

        // Operator input closes first; the session continues until the device goes
        let (input, keyboard) = UnixStream::pair().unwrap();
        harness.input = OperatorInput::new(input, false);
        drop(keyboard);
        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            drop(device);
        });

        let outcome = harness.run(&acm0(), &quiet_options(), &mut connector);
        closer.join().unwrap();

        assert!(!harness.input.is_open());
        assert!(matches!(
            outcome,
            SessionOutcome::Closed(DisconnectReason::ReadFailed(_))
        ));
    }
}
