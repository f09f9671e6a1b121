//! The single wait point of the event loop

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::os::fd::BorrowedFd;

/// What `poll(2)` reported for one descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Data (or EOF) can be read without blocking
    pub readable: bool,
    /// Peer hung up or the descriptor is in error
    pub hangup: bool,
}

impl Readiness {
    /// Anything to service
    pub fn is_ready(&self) -> bool {
        self.readable || self.hangup
    }
}

/// Block until at least one of `fds` is readable or hung up
///
/// Results are in the order of `fds`. Interrupted waits are retried.
pub fn wait_ready(fds: &[BorrowedFd<'_>]) -> nix::Result<Vec<Readiness>> {
    let mut poll_fds: Vec<PollFd<'_>> = fds
        .iter()
        .map(|fd| PollFd::new(*fd, PollFlags::POLLIN))
        .collect();
    poll_blocking(&mut poll_fds)?;

    Ok(poll_fds
        .iter()
        .map(|fd| {
            let revents = fd.revents().unwrap_or(PollFlags::empty());
            Readiness {
                readable: revents.intersects(PollFlags::POLLIN | PollFlags::POLLPRI),
                hangup: hung_up(revents),
            }
        })
        .collect())
}

/// Block until `fd` can take more output; false if it hung up instead
pub fn wait_writable(fd: BorrowedFd<'_>) -> nix::Result<bool> {
    let mut poll_fds = [PollFd::new(fd, PollFlags::POLLOUT)];
    poll_blocking(&mut poll_fds)?;

    let revents = poll_fds[0].revents().unwrap_or(PollFlags::empty());
    Ok(!hung_up(revents))
}

fn poll_blocking(poll_fds: &mut [PollFd<'_>]) -> nix::Result<()> {
    loop {
        match poll(poll_fds, PollTimeout::NONE) {
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}

fn hung_up(revents: PollFlags) -> bool {
    revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL)
}
