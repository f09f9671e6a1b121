//! Line-ending handling for text flowing through a session

use std::borrow::Cow;

/// Insert CR before every LF not already preceded by CR within `data`
///
/// Operates on one chunk at a time: a chunk starting with LF always gets a
/// CR, even if the previous chunk ended with one. Chunks without LF are
/// returned borrowed.
pub fn normalize_line_endings(data: &[u8]) -> Cow<'_, [u8]> {
    if !data.contains(&b'\n') {
        return Cow::Borrowed(data);
    }

    let mut output = Vec::with_capacity(data.len() + data.len() / 8 + 1);
    for (i, &byte) in data.iter().enumerate() {
        if byte == b'\n' && (i == 0 || data[i - 1] != b'\r') {
            output.push(b'\r');
        }
        output.push(byte);
    }
    Cow::Owned(output)
}

/// Byte actually sent to the device for an operator keystroke (LF goes out as CR)
pub fn outgoing_byte(byte: u8) -> u8 {
    if byte == b'\n' {
        b'\r'
    } else {
        byte
    }
}

/// Local echo of an operator keystroke; CR is followed by LF
pub fn echo_bytes(byte: u8) -> Vec<u8> {
    if byte == b'\r' {
        vec![b'\r', b'\n']
    } else {
        vec![byte]
    }
}
