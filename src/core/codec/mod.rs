//! Byte-level transformations between the device and the operator console
//!
//! - Line-ending normalization for device output (LF -> CRLF)
//! - Outgoing translation of operator keystrokes
//! - Per-byte debug trace lines

mod hex;
mod text;

pub use self::hex::{trace_byte, TraceSource};
pub use text::{echo_bytes, normalize_line_endings, outgoing_byte};
