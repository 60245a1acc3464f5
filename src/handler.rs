//! Turns a request into a reply.

use bytes::{Bytes, BytesMut};
use std::io::Read;

use crate::catalog::{CatalogError, FileSource};
use crate::protocol::{CodecError, Frame, ReplyHeader, Request};

/// A complete reply: header plus the full file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub header: ReplyHeader,
    pub body: Bytes,
}

impl Reply {
    /// Encode the framed reply header into `frame`.
    ///
    /// The file content is not framed; it follows the returned bytes
    /// verbatim on the wire.
    pub fn encode_header<'a>(&self, frame: &'a mut Frame) -> Result<&'a [u8], CodecError> {
        frame.encode(&self.header)
    }
}

/// Build the reply for `request`.
///
/// Only `GET` is served. The whole file is read into memory, and the
/// number of bytes read must match the size recorded in the catalog.
pub fn build_reply<F>(request: &Request, source: &F) -> Result<Reply, HandlerError>
where
    F: FileSource + ?Sized,
{
    if !request.is_get() {
        return Err(HandlerError::UnsupportedMethod(request.method.clone()));
    }

    let mut file = source.get_random_file()?;

    let expected =
        u32::try_from(file.size).map_err(|_| HandlerError::FileTooLarge {
            name: file.name.clone(),
            size: file.size,
        })?;

    let read_error = |source: std::io::Error| HandlerError::Read {
        name: file.name.clone(),
        source,
    };

    let mut content = BytesMut::zeroed(expected as usize);
    let filled = read_full(&mut file.reader, &mut content).map_err(read_error)?;

    // A file that grew since attach is detected by probing for one more byte.
    let mut probe = [0u8; 1];
    let grew = filled == content.len()
        && read_full(&mut file.reader, &mut probe).map_err(read_error)? > 0;

    if filled != content.len() || grew {
        return Err(HandlerError::SizeMismatch {
            name: file.name,
            expected: file.size,
            actual: if grew { None } else { Some(filled as u64) },
        });
    }

    Ok(Reply {
        header: ReplyHeader {
            file_size: expected,
            file_name: file.name,
        },
        body: content.freeze(),
    })
}

/// Read until `buf` is full or the reader hits EOF.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reasons a reply could not be built.
#[derive(Debug)]
pub enum HandlerError {
    /// Request method other than `GET`.
    UnsupportedMethod(String),
    /// Selecting or opening a file failed.
    Catalog(CatalogError),
    /// Reading the file content failed.
    Read {
        name: String,
        source: std::io::Error,
    },
    /// File size no longer matches the catalog. `actual` is `None` when
    /// the file grew past the recorded size.
    SizeMismatch {
        name: String,
        expected: u64,
        actual: Option<u64>,
    },
    /// File does not fit the 32-bit size field.
    FileTooLarge { name: String, size: u64 },
}

impl From<CatalogError> for HandlerError {
    fn from(e: CatalogError) -> Self {
        HandlerError::Catalog(e)
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::UnsupportedMethod(method) => {
                write!(f, "unsupported method '{method}'")
            }
            HandlerError::Catalog(e) => write!(f, "{e}"),
            HandlerError::Read { name, source } => {
                write!(f, "failed to read '{name}': {source}")
            }
            HandlerError::SizeMismatch {
                name,
                expected,
                actual: Some(actual),
            } => write!(
                f,
                "'{name}' changed on disk: expected {expected} bytes, read {actual}"
            ),
            HandlerError::SizeMismatch {
                name,
                expected,
                actual: None,
            } => write!(f, "'{name}' changed on disk: grew past {expected} bytes"),
            HandlerError::FileTooLarge { name, size } => {
                write!(f, "'{name}' is {size} bytes, larger than the protocol allows")
            }
        }
    }
}

impl std::error::Error for HandlerError {}
