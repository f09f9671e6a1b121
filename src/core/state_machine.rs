//! Connection State Machine
//!
//! Tracks the lifecycle of the monitored device:
//!
//! ```text
//! Waiting -> Connecting -> Open -> Closing -> Closed -> Waiting
//!                 \________________________/
//!                      (open failure)
//! ```
//!
//! Every transition is validated and recorded so the reconnect cycle can be
//! inspected after the fact.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No matching device, waiting for one to appear
    Waiting,
    /// Opening the port of a matching device
    Connecting,
    /// Port open, bytes flowing
    Open,
    /// Disconnect detected, tearing down
    Closing,
    /// Port released
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// The device node was removed
    Removed,
    /// Reading from the device failed or hit end of stream
    ReadFailed(String),
    /// Writing to the device failed
    WriteFailed(String),
    /// The port could not be opened
    OpenFailed(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Removed => write!(f, "device removed"),
            Self::ReadFailed(e) => write!(f, "read failed: {}", e),
            Self::WriteFailed(e) => write!(f, "write failed: {}", e),
            Self::OpenFailed(e) => write!(f, "open failed: {}", e),
        }
    }
}

/// Rejected transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid transition from {from:?} to {to:?}")]
pub struct StateError {
    /// State the machine was in
    pub from: SessionState,
    /// Requested state
    pub to: SessionState,
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state
    pub from: SessionState,
    /// New state
    pub to: SessionState,
    /// Timestamp
    pub timestamp: DateTime<Local>,
    /// Reason for transition
    pub reason: Option<String>,
}

/// Connection state machine
pub struct SessionStateMachine {
    state: SessionState,
    history: Vec<StateTransition>,
    max_history: usize,
    disconnect_reason: Option<DisconnectReason>,
    /// Number of times a port reached `Open`
    sessions_opened: u32,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    /// Create a new state machine in `Waiting`
    pub fn new() -> Self {
        Self {
            state: SessionState::Waiting,
            history: Vec::new(),
            max_history: 100,
            disconnect_reason: None,
            sessions_opened: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get state history, oldest first
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Sequence of states visited, starting with the initial one
    pub fn path(&self) -> Vec<SessionState> {
        let mut path = Vec::with_capacity(self.history.len() + 1);
        path.push(self.history.first().map_or(self.state, |t| t.from));
        path.extend(self.history.iter().map(|t| t.to));
        path
    }

    /// Reason the last session ended
    pub fn disconnect_reason(&self) -> Option<&DisconnectReason> {
        self.disconnect_reason.as_ref()
    }

    /// How many sessions reached `Open`
    pub fn sessions_opened(&self) -> u32 {
        self.sessions_opened
    }

    /// Transition to a new state
    pub fn transition(&mut self, new_state: SessionState, reason: Option<&str>) -> Result<(), StateError> {
        if !self.is_valid_transition(new_state) {
            return Err(StateError {
                from: self.state,
                to: new_state,
            });
        }

        debug!("State {:?} -> {:?}", self.state, new_state);

        self.history.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: Local::now(),
            reason: reason.map(String::from),
        });
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        self.state = new_state;

        match new_state {
            SessionState::Open => {
                self.sessions_opened += 1;
                self.disconnect_reason = None;
            }
            SessionState::Connecting => self.disconnect_reason = None,
            _ => {}
        }

        Ok(())
    }

    /// Record why the current session is ending
    pub fn set_disconnect_reason(&mut self, reason: DisconnectReason) {
        self.disconnect_reason = Some(reason);
    }

    fn is_valid_transition(&self, new_state: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self.state, new_state),
            (Waiting, Connecting)
                | (Connecting, Open)
                | (Connecting, Closed)
                | (Open, Closing)
                | (Closing, Closed)
                | (Closed, Waiting)
        )
    }
}
