//! Auto-connect and auto-reconnect
//!
//! [`ConnectionSupervisor`] owns everything that outlives a single
//! connection: the hot-plug monitor, operator input, the session logger and
//! the lifecycle state machine. It runs a session for a matching device that
//! is already present, then waits for matching devices to be plugged in,
//! forever, until the operator sends the exit signal.

use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::device::{DeviceDescriptor, DeviceSummary, HotplugAction};
use crate::core::hotplug::{present_matches, DeviceEnumerator, HotplugError, HotplugSource};
use crate::core::logger::SessionLogger;
use crate::core::matcher::{matches, MatchCriteria};
use crate::core::poller::wait_ready;
use crate::core::session::{
    OperatorInput, SerialSession, SessionError, SessionIo, SessionOptions, SessionOutcome,
};
use crate::core::state_machine::{SessionState, SessionStateMachine, StateError};
use crate::core::transport::{Connector, SerialSettings};

/// Auto-connect configuration
#[derive(Debug, Clone, Default)]
pub struct AutoConnectConfig {
    /// Which devices to connect to
    pub criteria: MatchCriteria,
    /// Line settings used for every connection
    pub serial: SerialSettings,
    /// Per-session behavior
    pub session: SessionOptions,
}

/// Why the supervisor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Operator sent the exit signal
    ExitRequested,
}

/// Errors that end the supervisor
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// A session failed in a way that is not a disconnect
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Hot-plug monitor or enumeration failed
    #[error(transparent)]
    Hotplug(#[from] HotplugError),

    /// Waiting for readiness failed
    #[error("poll failed: {0}")]
    Poll(#[source] nix::Error),

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

/// Runs the wait / connect / reconnect cycle
pub struct ConnectionSupervisor<C, H, I, D: Write, S: Write> {
    config: AutoConnectConfig,
    connector: C,
    hotplug: H,
    input: OperatorInput<I>,
    logger: SessionLogger<D, S>,
    state: SessionStateMachine,
}

impl<C, H, I, D, S> ConnectionSupervisor<C, H, I, D, S>
where
    C: Connector,
    H: HotplugSource,
    I: Read + AsFd,
    D: Write,
    S: Write,
{
    /// Create a supervisor around an already subscribed hot-plug source
    pub fn new(
        config: AutoConnectConfig,
        connector: C,
        hotplug: H,
        input: OperatorInput<I>,
        logger: SessionLogger<D, S>,
    ) -> Self {
        Self {
            config,
            connector,
            hotplug,
            input,
            logger,
            state: SessionStateMachine::new(),
        }
    }

    /// Lifecycle state and history
    pub fn state(&self) -> &SessionStateMachine {
        &self.state
    }

    /// Display and transcript
    pub fn logger(&self) -> &SessionLogger<D, S> {
        &self.logger
    }

    /// Give back the logger, e.g. to inspect the transcript
    pub fn into_logger(self) -> SessionLogger<D, S> {
        self.logger
    }

    /// Run until the operator exits
    ///
    /// Every matching device already present gets a session, one after the
    /// other, before waiting for hot-plug events. Devices are looked up through `enumerator` after the
    /// hot-plug source exists, so a device plugged in between the two is
    /// still reported by the source.
    pub fn run<E: DeviceEnumerator>(&mut self, enumerator: &E) -> Result<Shutdown, SupervisorError> {
        let present = present_matches(enumerator, &self.config.criteria)?;
        debug!("{} matching device(s) present at startup", present.len());

        for device in &present {
            self.reset_to_waiting()?;
            if self.run_session(device)? == SessionOutcome::ExitRequested {
                return self.shutdown();
            }
        }

        loop {
            self.reset_to_waiting()?;
            let waiting = format!(
                "Waiting for USB Serial Device{} ...",
                DeviceSummary::Expected(&self.config.criteria).extra_info()
            );
            self.logger.println(&waiting).map_err(SupervisorError::Display)?;

            if self.wait_for_device()? == WaitEnd::ExitRequested {
                return self.shutdown();
            }
        }
    }

    fn reset_to_waiting(&mut self) -> Result<(), StateError> {
        if self.state.state() == SessionState::Closed {
            self.state.transition(SessionState::Waiting, None)?;
        }
        Ok(())
    }

    fn wait_for_device(&mut self) -> Result<WaitEnd, SupervisorError> {
        loop {
            let ready = {
                let mut fds = vec![self.hotplug.as_fd()];
                fds.extend(self.input.poll_fd());
                wait_ready(&fds).map_err(SupervisorError::Poll)?
            };

            if ready[0].is_ready() {
                if let Some(device) = self.hotplug.poll_event()? {
                    if device.action == HotplugAction::Added && matches(&device, &self.config.criteria) {
                        return Ok(match self.run_session(&device)? {
                            SessionOutcome::ExitRequested => WaitEnd::ExitRequested,
                            SessionOutcome::Closed(_) => WaitEnd::SessionEnded,
                        });
                    }
                }
            }

            let input_ready = ready.get(1).copied().unwrap_or_default();
            if input_ready.is_ready() {
                let byte = self
                    .input
                    .read_byte(input_ready)
                    .map_err(SupervisorError::Input)?;
                if byte == Some(self.config.session.exit_signal.byte()) {
                    return Ok(WaitEnd::ExitRequested);
                }
            }
        }
    }

    fn run_session(&mut self, device: &DeviceDescriptor) -> Result<SessionOutcome, SupervisorError> {
        info!("Matching device at {}", device.path);
        let session = SerialSession::new(device, &self.config.session);
        let outcome = session.run(
            &mut self.connector,
            &self.config.serial,
            SessionIo {
                hotplug: &mut self.hotplug,
                input: &mut self.input,
                logger: &mut self.logger,
                state: &mut self.state,
            },
        )?;
        Ok(outcome)
    }

    fn shutdown(&mut self) -> Result<Shutdown, SupervisorError> {
        info!("Exit requested by operator");
        self.logger
            .println("")
            .and_then(|()| self.logger.finish())
            .map_err(SupervisorError::Display)?;
        Ok(Shutdown::ExitRequested)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum WaitEnd {
    SessionEnded,
    ExitRequested,
}

/// Print every USB serial device present; returns how many were found
pub fn list_devices<E, D, S>(enumerator: &E, logger: &mut SessionLogger<D, S>) -> Result<usize, SupervisorError>
where
    E: DeviceEnumerator,
    D: Write,
    S: Write,
{
    let devices = present_matches(enumerator, &MatchCriteria::default())?;

    for device in &devices {
        logger
            .println(&format!(
                "USB Serial Device{} found @{}",
                DeviceSummary::Connected(device).extra_info(),
                device.path
            ))
            .map_err(SupervisorError::Display)?;
    }
    if devices.is_empty() {
        logger
            .println("No USB Serial devices detected.")
            .map_err(SupervisorError::Display)?;
    }
    Ok(devices.len())
}
