//! Connection state machines shared by the client and server roles.
//!
//! Each connection tracks its current state and issues the next I/O step
//! only after the previous one has completed. Every I/O step races the
//! shutdown signal so a stop request surfaces as `Cancelled`.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use crate::handler::HandlerError;
use crate::protocol::CodecError;
use crate::runtime::Shutdown;

/// Server-role connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Accepted, not yet checked in.
    Idle,
    /// Waiting for the 8-byte frame header.
    ReadingFrameHeader,
    /// Waiting for a request body of this many bytes.
    ReadingRequestBody(usize),
    /// Building the reply.
    Handling,
    /// Writing the reply header frame and file content.
    WritingReply {
        /// Bytes of file content being written.
        file_size: u32,
    },
    /// Socket closed.
    Closed,
}

/// Client-role connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connecting,
    WritingRequest,
    ReadingReplyHeaderFrame,
    /// Waiting for a reply header body of this many bytes.
    ReadingReplyHeaderBody(usize),
    /// Waiting for this many bytes of file content.
    ReadingFileBody(u32),
    Saving,
    Disconnecting,
    Closed,
}

/// Why a connection ended early.
#[derive(Debug)]
pub enum ConnectionError {
    /// Stop requested while an operation was outstanding.
    Cancelled,
    /// Transport failure.
    Io(io::Error),
    /// Outbound connection could not be established.
    Connect { addr: String, source: io::Error },
    /// Frame header with bad prefix or length field.
    InvalidFrame,
    /// Peer closed after sending this many bytes of a frame header.
    TruncatedHeader(usize),
    /// Frame body did not decode into the expected message.
    Codec(CodecError),
    /// Reply could not be built.
    Handler(HandlerError),
    /// Received file name cannot be stored under the output directory.
    InvalidFileName(String),
    /// Writing a received file to disk failed.
    Save { path: PathBuf, source: io::Error },
}

impl ConnectionError {
    /// Cancellation from a deliberate shutdown; not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConnectionError::Cancelled)
    }

    /// The peer went away at a point where that is expected.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ConnectionError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        ConnectionError::Io(e)
    }
}

impl From<CodecError> for ConnectionError {
    fn from(e: CodecError) -> Self {
        ConnectionError::Codec(e)
    }
}

impl From<HandlerError> for ConnectionError {
    fn from(e: HandlerError) -> Self {
        ConnectionError::Handler(e)
    }
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Cancelled => write!(f, "operation cancelled"),
            ConnectionError::Io(e) => write!(f, "transport error: {e}"),
            ConnectionError::Connect { addr, source } => {
                write!(f, "cannot connect to {addr}: {source}")
            }
            ConnectionError::InvalidFrame => write!(f, "invalid frame header"),
            ConnectionError::TruncatedHeader(received) => {
                write!(f, "connection closed after {received} of 8 frame header bytes")
            }
            ConnectionError::Codec(e) => write!(f, "{e}"),
            ConnectionError::Handler(e) => write!(f, "cannot build reply: {e}"),
            ConnectionError::InvalidFileName(name) => {
                write!(f, "received unusable file name '{name}'")
            }
            ConnectionError::Save { path, source } => {
                write!(f, "failed to save '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

/// Run one I/O step unless shutdown wins the race.
pub(crate) async fn cancellable<F, T>(shutdown: &mut Shutdown, op: F) -> Result<T, ConnectionError>
where
    F: Future<Output = io::Result<T>>,
{
    tokio::select! {
        biased;
        _ = shutdown.wait() => Err(ConnectionError::Cancelled),
        result = op => result.map_err(ConnectionError::from),
    }
}
