//! Utilities built on top of the core session

pub mod autoconnect;
