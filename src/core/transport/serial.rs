//! Serial port transport implementation

use super::{Connector, TransportError};
use crate::core::terminal::make_raw;
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, StopBits, TTYPort};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::time::Duration;
use tracing::debug;

/// Line settings; framing is always 8N1 without flow control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout
    pub read_timeout: Duration,
}

impl SerialSettings {
    /// Settings for `baud_rate` with the default read timeout
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(1),
        }
    }
}

/// An open serial port in raw mode
pub struct SerialDevice {
    port: TTYPort,
}

impl Read for SerialDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl AsFd for SerialDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the port owns the descriptor for as long as `self` lives
        unsafe { BorrowedFd::borrow_raw(self.port.as_raw_fd()) }
    }
}

/// Opens real serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    type Link = SerialDevice;

    fn open(&mut self, path: &str, settings: &SerialSettings) -> Result<SerialDevice, TransportError> {
        let port = serialport::new(path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open_native()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(path.to_string()),
                serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(path.to_string())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        let device = SerialDevice { port };
        make_raw(&device)?;

        debug!("Opened {} at {} baud 8N1", path, settings.baud_rate);
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::write_patiently;
    use nix::pty::openpty;
    use std::fs::File;
    use std::thread;

    #[test]
    fn test_default_settings() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.read_timeout, Duration::from_millis(1));
        assert_eq!(SerialSettings::new(9600).read_timeout, settings.read_timeout);
    }

    #[test]
    fn test_full_output_buffer_waits_for_reader() {
        const TOTAL: usize = 256 * 1024;

        let pty = openpty(None, None).unwrap();
        let slave_path = std::fs::read_link(format!("/proc/self/fd/{}", pty.slave.as_raw_fd())).unwrap();
        let mut device = SerialConnector
            .open(slave_path.to_str().unwrap(), &SerialSettings::default())
            .unwrap();

        // Far more than the pty buffers, and nobody drains it for a while
        let mut master = File::from(pty.master);
        let reader = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut buf = [0u8; 4096];
            let mut received = 0;
            while received < TOTAL {
                received += master.read(&mut buf).unwrap();
            }
            received
        });

        write_patiently(&mut device, &vec![b'x'; TOTAL]).unwrap();
        assert_eq!(reader.join().unwrap(), TOTAL);
    }

    #[test]
    fn test_open_missing_port_fails() {
        let result = SerialConnector.open("/dev/does-not-exist-usb-ser-mon", &SerialSettings::default());
        assert!(result.is_err());
    }
}
