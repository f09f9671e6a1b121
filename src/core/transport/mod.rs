//! Serial transport
//!
//! A session needs a byte stream it can read, write and hand to `poll(2)`.
//! [`Connector`] opens one for a device path; [`SerialConnector`] is the
//! real serial port implementation.

mod serial;

pub use serial::{SerialConnector, SerialDevice, SerialSettings};

use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsFd;
use thiserror::Error;

use super::poller::wait_writable;
use super::terminal::TerminalError;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Switching the device to raw mode failed
    #[error("Failed to configure port: {0}")]
    RawMode(#[from] TerminalError),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// An open, pollable byte stream to a device
pub trait SerialLink: Read + Write + AsFd {}

impl<T: Read + Write + AsFd> SerialLink for T {}

/// Opens links to devices by path
#[cfg_attr(test, mockall::automock(type Link = std::os::unix::net::UnixStream;))]
pub trait Connector {
    /// Link type produced by this connector
    type Link: SerialLink;

    /// Open `path` with the given line settings
    fn open(&mut self, path: &str, settings: &SerialSettings) -> Result<Self::Link, TransportError>;
}

/// Timeouts and interruptions, which say nothing about the device being gone
pub fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::TimedOut | ErrorKind::Interrupted | ErrorKind::WouldBlock
    )
}

/// Write all of `data`, waiting for the device to drain when a write times out
///
/// Only a hang-up or a non-transient error is reported.
pub fn write_patiently<L: SerialLink + ?Sized>(link: &mut L, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        match link.write(data) {
            Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "device accepted no data")),
            Ok(n) => data = &data[n..],
            Err(ref e) if is_transient(e) => {
                if !wait_writable(link.as_fd()).map_err(io::Error::from)? {
                    return Err(io::Error::new(ErrorKind::BrokenPipe, "device hung up"));
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
