//! Outbound line assembly.
//!
//! Mirrors the framer's acceptance rules from the sending side: `CR LF` and
//! bare `CR` inside parameters are normalized to `LF` before validation, the
//! name and every parameter are checked against the control-character rules,
//! and the finished frame must fit the wire cap.

use crate::error::EncodeError;
use crate::framer::MAX_FRAME_SIZE;

/// Encode one command line, terminator included.
pub fn encode_line<S: AsRef<str>>(name: &str, params: &[S]) -> Result<Vec<u8>, EncodeError> {
    let name = normalize(name);
    if name.is_empty() || name.chars().any(char::is_control) {
        return Err(EncodeError::InvalidName);
    }

    let mut line = String::with_capacity(64);
    line.push_str(&name);
    for param in params {
        let param = normalize(param.as_ref());
        if param.chars().any(|ch| ch.is_control() && ch != '\n') {
            return Err(EncodeError::InvalidParam);
        }
        line.push('\t');
        line.push_str(&param);
    }
    line.push_str("\r\n");

    let data = line.into_bytes();
    if data.len() > MAX_FRAME_SIZE {
        return Err(EncodeError::TooLong(data.len()));
    }
    Ok(data)
}

fn normalize(value: &str) -> String {
    value.replace("\r\n", "\n").replace('\r', "\n")
}
