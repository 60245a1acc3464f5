//! Frame header parser and encoder.
//!
//! Every message on the wire is wrapped in a frame:
//!
//! ```text
//! MSGN<len><body>
//! ```
//!
//! `<len>` is four ASCII characters holding the body length in decimal,
//! right-justified and padded with spaces (`" 123"`, `"8192"`).

use super::CodecError;

/// Literal that opens every frame.
pub const PREFIX: &[u8; PREFIX_LEN] = b"MSGN";

/// Length of the prefix literal.
pub const PREFIX_LEN: usize = 4;

/// Length of the ASCII length field.
pub const LENGTH_FIELD_LEN: usize = 4;

/// Full header length (prefix + length field).
pub const HEADER_LEN: usize = PREFIX_LEN + LENGTH_FIELD_LEN;

/// Largest body a frame may carry.
pub const MAX_BODY_LEN: usize = 8192;

/// Buffer size that can hold any frame.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_BODY_LEN;

/// Result of decoding a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderResult {
    /// Header is well formed and announces a body of this many bytes.
    Valid(usize),
    /// Bad prefix, malformed length field or oversized body.
    Invalid,
    /// Fewer than `HEADER_LEN` bytes were supplied.
    Incomplete,
}

/// Decode a frame header from the start of `input`.
///
/// Only the first `HEADER_LEN` bytes are inspected.
pub fn decode_header(input: &[u8]) -> HeaderResult {
    if input.len() < HEADER_LEN {
        return HeaderResult::Incomplete;
    }

    if &input[..PREFIX_LEN] != PREFIX {
        return HeaderResult::Invalid;
    }

    match parse_length(&input[PREFIX_LEN..HEADER_LEN]) {
        Some(len) if len <= MAX_BODY_LEN => HeaderResult::Valid(len),
        _ => HeaderResult::Invalid,
    }
}

/// Encode the header for a body of `body_len` bytes.
pub fn encode_header(body_len: usize) -> Result<[u8; HEADER_LEN], CodecError> {
    let mut header = [0u8; HEADER_LEN];
    write_header(body_len, &mut header)?;
    Ok(header)
}

/// Write the header for a body of `body_len` bytes into `output`.
///
/// Returns the number of bytes written (always `HEADER_LEN`).
pub fn write_header(body_len: usize, output: &mut [u8]) -> Result<usize, CodecError> {
    if body_len > MAX_BODY_LEN {
        return Err(CodecError::BodyTooLarge(body_len));
    }
    if output.len() < HEADER_LEN {
        return Err(CodecError::BufferTooSmall {
            needed: HEADER_LEN,
            available: output.len(),
        });
    }

    output[..PREFIX_LEN].copy_from_slice(PREFIX);

    let field = &mut output[PREFIX_LEN..HEADER_LEN];
    field.fill(b' ');

    // Right-justify: fill digits from the end of the field.
    let mut remaining = body_len;
    let mut pos = LENGTH_FIELD_LEN;
    loop {
        pos -= 1;
        field[pos] = b'0' + (remaining % 10) as u8;
        remaining /= 10;
        if remaining == 0 {
            break;
        }
    }

    Ok(HEADER_LEN)
}

/// Parse a space-padded, right-justified decimal field.
///
/// Leading spaces are skipped; everything after them must be a digit.
fn parse_length(field: &[u8]) -> Option<usize> {
    let digits_start = field.iter().position(|&b| b != b' ')?;
    let digits = &field[digits_start..];

    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    Some(
        digits
            .iter()
            .fold(0usize, |acc, &b| acc * 10 + (b - b'0') as usize),
    )
}
