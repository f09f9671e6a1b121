//! Debug trace formatting for individual bytes

use std::fmt;

/// Where a traced byte came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceSource {
    /// Received from the serial device
    Serial,
    /// Typed by the operator
    Stdin,
}

impl fmt::Display for TraceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "Serial"),
            Self::Stdin => write!(f, "stdin"),
        }
    }
}

/// `Serial.Read 'A' 0x41`; non-printable bytes show as `.`
pub fn trace_byte(source: TraceSource, byte: u8) -> String {
    let shown = if byte.is_ascii_graphic() || byte == b' ' {
        byte as char
    } else {
        '.'
    };
    format!("{}.Read '{}' 0x{:02x}", source, shown, byte)
}
