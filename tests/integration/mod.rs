//! Shared fixtures for the integration tests
//!
//! Everything the supervisor talks to is replaced by a socket: hot-plug
//! events travel as JSON datagrams, device links are socket pairs handed out
//! by [`QueueConnector`], and the display is a shared buffer the test can
//! watch from outside the supervisor thread.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Write};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use usb_ser_mon_core::core::hotplug::{DeviceEnumerator, HotplugError, HotplugSource};
use usb_ser_mon_core::core::transport::{Connector, SerialSettings, TransportError};
use usb_ser_mon_core::{DeviceDescriptor, HotplugAction, SessionLogger};

/// How long a test waits for the supervisor to react
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A Teensy-like device at `path`
pub fn teensy(path: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(path)
        .vendor_name("Teensyduino")
        .usb_id("16c0", "0483")
        .serial_number("1234560")
}

/// Hot-plug source fed through a datagram socket
pub struct DatagramHotplug {
    socket: UnixDatagram,
}

impl AsFd for DatagramHotplug {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.socket.as_fd()
    }
}

impl HotplugSource for DatagramHotplug {
    fn poll_event(&mut self) -> Result<Option<DeviceDescriptor>, HotplugError> {
        let mut buf = [0u8; 4096];
        let n = self.socket.recv(&mut buf).map_err(HotplugError::Receive)?;
        serde_json::from_slice(&buf[..n])
            .map(Some)
            .map_err(|e| HotplugError::Receive(io::Error::new(io::ErrorKind::InvalidData, e)))
    }
}

/// Test side of [`DatagramHotplug`]
pub struct HotplugFeed {
    socket: UnixDatagram,
}

impl HotplugFeed {
    /// Report `device` with `action`
    pub fn send(&self, device: DeviceDescriptor, action: HotplugAction) {
        let payload = serde_json::to_vec(&device.action(action)).unwrap();
        self.socket.send(&payload).unwrap();
    }

    /// Report `device` plugged in
    pub fn add(&self, device: DeviceDescriptor) {
        self.send(device, HotplugAction::Added);
    }

    /// Report `device` unplugged
    pub fn remove(&self, device: DeviceDescriptor) {
        self.send(device, HotplugAction::Removed);
    }
}

/// A connected hot-plug source and its feed
pub fn hotplug() -> (DatagramHotplug, HotplugFeed) {
    let (source, feed) = UnixDatagram::pair().unwrap();
    (DatagramHotplug { socket: source }, HotplugFeed { socket: feed })
}

/// Fixed list of present devices
pub struct FixedDevices(pub Vec<DeviceDescriptor>);

impl DeviceEnumerator for FixedDevices {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, HotplugError> {
        Ok(self.0.clone())
    }
}

/// Connector handing out queued socket links; an empty queue means the port is missing
#[derive(Clone, Default)]
pub struct QueueConnector {
    links: Arc<Mutex<VecDeque<UnixStream>>>,
    opened: Arc<Mutex<Vec<(String, u32)>>>,
}

impl QueueConnector {
    /// Queue a link for the next open; returns the device end
    pub fn plug(&self) -> UnixStream {
        let (link, device) = UnixStream::pair().unwrap();
        device.set_read_timeout(Some(TIMEOUT)).unwrap();
        self.links.lock().unwrap().push_back(link);
        device
    }

    /// Paths and baud rates opened so far
    pub fn opened(&self) -> Vec<(String, u32)> {
        self.opened.lock().unwrap().clone()
    }
}

impl Connector for QueueConnector {
    type Link = UnixStream;

    fn open(&mut self, path: &str, settings: &SerialSettings) -> Result<UnixStream, TransportError> {
        self.opened
            .lock()
            .unwrap()
            .push((path.to_string(), settings.baud_rate));
        self.links
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TransportError::PortNotFound(path.to_string()))
    }
}

/// Writer whose contents can be read from another thread
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Everything written so far, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Block until `predicate` holds for the text, panicking after [`TIMEOUT`]
    pub fn wait_until(&self, what: &str, predicate: impl Fn(&str) -> bool) -> String {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            let text = self.text();
            if predicate(&text) {
                return text;
            }
            if Instant::now() > deadline {
                panic!("timed out waiting for {}; display so far:\n{}", what, text);
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Block until `needle` has appeared `count` times
    pub fn wait_for(&self, needle: &str, count: usize) -> String {
        self.wait_until(needle, |text| text.matches(needle).count() >= count)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Logger writing the display and the transcript to shared buffers
pub fn logger() -> (SessionLogger<SharedBuffer, SharedBuffer>, SharedBuffer, SharedBuffer) {
    let display = SharedBuffer::default();
    let transcript = SharedBuffer::default();
    let logger = SessionLogger::with_sink(display.clone(), transcript.clone());
    (logger, display, transcript)
}

/// Operator keyboard: the supervisor reads `input`, the test writes to the other end
pub fn keyboard() -> (UnixStream, UnixStream) {
    UnixStream::pair().unwrap()
}
