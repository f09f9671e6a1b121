//! Core module containing the main functionality of the monitor
//!
//! This module provides:
//! - Device snapshots and matching
//! - Hot-plug notifications and enumeration (udev)
//! - Terminal raw mode
//! - Session transcript logging with timestamps
//! - Line-ending codec
//! - Serial transport
//! - Readiness polling
//! - Connection state machine
//! - The serial session loop

pub mod codec;
pub mod device;
pub mod hotplug;
pub mod logger;
pub mod matcher;
pub mod poller;
pub mod session;
pub mod state_machine;
pub mod terminal;
pub mod transport;
