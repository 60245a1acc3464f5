//! MSGN wire protocol.
//!
//! One frame format carries every message:
//!
//! ```text
//! Frame       := "MSGN" <len: 4 ASCII digits, space padded> <body: len bytes>
//! Request     := method name ("GET")
//! ReplyHeader := <file_size: u32 big-endian> <file name: UTF-8>
//! Reply       := Frame(ReplyHeader) <file_size raw bytes, unframed>
//! ```
//!
//! The file content after a reply header is deliberately not framed; the
//! receiver already knows its exact length from the header.

pub mod frame;
pub mod message;

pub use frame::{decode_header, encode_header, HeaderResult, HEADER_LEN, MAX_BODY_LEN};
pub use message::{Frame, Message, ReplyHeader, Request};

/// Errors produced while encoding or decoding messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Destination buffer cannot hold the encoded data.
    BufferTooSmall { needed: usize, available: usize },
    /// Body exceeds `MAX_BODY_LEN`.
    BodyTooLarge(usize),
    /// Body does not match the expected message layout.
    Malformed(&'static str),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::BufferTooSmall { needed, available } => {
                write!(f, "buffer too small: need {needed} bytes, have {available}")
            }
            CodecError::BodyTooLarge(len) => {
                write!(f, "body of {len} bytes exceeds maximum of {MAX_BODY_LEN}")
            }
            CodecError::Malformed(msg) => write!(f, "malformed message: {msg}"),
        }
    }
}

impl std::error::Error for CodecError {}
