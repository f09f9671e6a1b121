//! Terminal line discipline control
//!
//! [`RawModeGuard`] switches a terminal to unbuffered, non-echoing,
//! byte-at-a-time input and puts the saved settings back when it is
//! dropped, whatever path the caller leaves by. [`make_raw`] applies the
//! same settings to the device side of a serial port, without restoring.

use nix::sys::termios::{
    self, LocalFlags, SetArg, SpecialCharacterIndices, Termios,
};
use std::os::fd::{AsFd, BorrowedFd};
use thiserror::Error;
use tracing::{debug, warn};

/// Terminal mode errors
#[derive(Error, Debug)]
pub enum TerminalError {
    /// Reading the current settings failed (not a terminal?)
    #[error("failed to read terminal settings: {0}")]
    GetAttr(#[source] nix::Error),

    /// Applying new settings failed
    #[error("failed to apply terminal settings: {0}")]
    SetAttr(#[source] nix::Error),
}

fn raw_settings(current: &Termios) -> Termios {
    let mut raw = current.clone();
    termios::cfmakeraw(&mut raw);
    raw.local_flags.remove(LocalFlags::ICANON | LocalFlags::ECHO);
    raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;
    raw
}

/// Put `fd` into raw mode: VMIN=1, VTIME=0, no echo, no canonical processing
pub fn make_raw<Fd: AsFd>(fd: Fd) -> Result<(), TerminalError> {
    let current = termios::tcgetattr(fd.as_fd()).map_err(TerminalError::GetAttr)?;
    termios::tcsetattr(fd.as_fd(), SetArg::TCSANOW, &raw_settings(&current))
        .map_err(TerminalError::SetAttr)
}

/// Raw mode held for the lifetime of the guard
pub struct RawModeGuard<F: AsFd> {
    fd: F,
    saved: Termios,
}

impl<F: AsFd> RawModeGuard<F> {
    /// Snapshot the current settings of `fd` and switch it to raw mode
    pub fn acquire(fd: F) -> Result<Self, TerminalError> {
        let saved = termios::tcgetattr(fd.as_fd()).map_err(TerminalError::GetAttr)?;
        termios::tcsetattr(fd.as_fd(), SetArg::TCSANOW, &raw_settings(&saved))
            .map_err(TerminalError::SetAttr)?;

        debug!("Terminal switched to raw mode");
        Ok(Self { fd, saved })
    }

    /// Borrow the guarded descriptor
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl<F: AsFd> Drop for RawModeGuard<F> {
    fn drop(&mut self) {
        match termios::tcsetattr(self.fd.as_fd(), SetArg::TCSANOW, &self.saved) {
            Ok(()) => debug!("Terminal settings restored"),
            Err(e) => warn!("Failed to restore terminal settings: {}", e),
        }
    }
}
