//! Benchmark client.
//!
//! Opens one connection and repeats request / receive / save until the
//! requested number of files has arrived, then disconnects. There is no
//! retry: any failure ends the session.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use crate::connection::{cancellable, ClientState, ConnectionError};
use crate::protocol::{Frame, HeaderResult, ReplyHeader, Request};
use crate::runtime::Shutdown;
use crate::session::Report;

/// Outcome of a completed client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSummary {
    pub files_received: usize,
    pub bytes_received: u64,
    pub elapsed: Duration,
}

impl ClientSummary {
    pub fn report(&self) -> Report {
        Report::new(self.bytes_received, self.elapsed)
    }
}

/// Client session settings.
pub struct Client {
    addr: SocketAddr,
    output: PathBuf,
    files: usize,
    shutdown: Shutdown,
}

impl Client {
    pub fn new(
        addr: SocketAddr,
        output: impl Into<PathBuf>,
        files: usize,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            addr,
            output: output.into(),
            files,
            shutdown,
        }
    }

    /// Connect and fetch the configured number of files.
    pub async fn run(self) -> Result<ClientSummary, ConnectionError> {
        let Client {
            addr,
            output,
            files,
            mut shutdown,
        } = self;

        tokio::fs::create_dir_all(&output)
            .await
            .map_err(|source| ConnectionError::Save {
                path: output.clone(),
                source,
            })?;

        debug!(state = ?ClientState::Connecting, addr = %addr, "Connecting");
        let stream = match cancellable(&mut shutdown, TcpStream::connect(addr)).await {
            Ok(stream) => stream,
            Err(ConnectionError::Io(source)) => {
                warn!(addr = %addr, error = %source, "Connection failed");
                return Err(ConnectionError::Connect {
                    addr: addr.to_string(),
                    source,
                });
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        info!(peer = %addr, "Connection established");

        let result = ClientConnection::new(stream, output, files, shutdown)
            .run()
            .await;

        match &result {
            Ok(summary) => summary.report().log("Client report"),
            Err(e) if e.is_cancelled() => debug!("Client cancelled by shutdown"),
            Err(ConnectionError::InvalidFrame) => warn!(peer = %addr, "Frame decode error"),
            Err(e) => warn!(peer = %addr, error = %e, "Client session failed"),
        }
        result
    }
}

/// One outbound connection in the client role.
pub struct ClientConnection<S> {
    stream: S,
    output: PathBuf,
    target: usize,
    frame: Frame,
    body: Vec<u8>,
    shutdown: Shutdown,
    state: ClientState,
    received: usize,
    bytes_received: u64,
}

impl<S> ClientConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an established stream; `target` files will be requested.
    pub fn new(stream: S, output: impl Into<PathBuf>, target: usize, shutdown: Shutdown) -> Self {
        Self {
            stream,
            output: output.into(),
            target,
            frame: Frame::new(),
            body: Vec::new(),
            shutdown,
            state: ClientState::Connecting,
            received: 0,
            bytes_received: 0,
        }
    }

    pub async fn run(mut self) -> Result<ClientSummary, ConnectionError> {
        let started = Instant::now();

        self.exchange().await?;

        self.set_state(ClientState::Disconnecting);
        if let Err(e) = cancellable(&mut self.shutdown, self.stream.shutdown()).await {
            debug!(error = %e, "Error while disconnecting");
        }
        self.set_state(ClientState::Closed);

        info!(files = self.received, "Connection closed");

        Ok(ClientSummary {
            files_received: self.received,
            bytes_received: self.bytes_received,
            elapsed: started.elapsed(),
        })
    }

    async fn exchange(&mut self) -> Result<(), ConnectionError> {
        while self.received < self.target {
            self.set_state(ClientState::WritingRequest);
            let request = self.frame.encode(&Request::get())?;
            cancellable(&mut self.shutdown, self.stream.write_all(request)).await?;

            self.set_state(ClientState::ReadingReplyHeaderFrame);
            cancellable(
                &mut self.shutdown,
                self.stream.read_exact(self.frame.header_mut()),
            )
            .await?;
            let body_len = match self.frame.decode_header() {
                HeaderResult::Valid(len) => len,
                HeaderResult::Invalid | HeaderResult::Incomplete => {
                    return Err(ConnectionError::InvalidFrame)
                }
            };

            self.set_state(ClientState::ReadingReplyHeaderBody(body_len));
            cancellable(
                &mut self.shutdown,
                self.stream.read_exact(self.frame.body_mut()),
            )
            .await?;
            let header: ReplyHeader = self.frame.decode_body()?;
            let path = destination(&self.output, &header.file_name)?;

            self.set_state(ClientState::ReadingFileBody(header.file_size));
            self.body.clear();
            self.body.resize(header.file_size as usize, 0);
            cancellable(&mut self.shutdown, self.stream.read_exact(&mut self.body)).await?;

            self.set_state(ClientState::Saving);
            tokio::fs::write(&path, &self.body)
                .await
                .map_err(|source| ConnectionError::Save {
                    path: path.clone(),
                    source,
                })?;

            self.received += 1;
            self.bytes_received += u64::from(header.file_size);
            trace!(
                file = %path.display(),
                bytes = header.file_size,
                received = self.received,
                "File saved"
            );
        }
        Ok(())
    }

    fn set_state(&mut self, state: ClientState) {
        trace!(from = ?self.state, to = ?state, "State change");
        self.state = state;
    }
}

/// Where a received file is stored: its final path component inside
/// `output`. Names without one (empty, `..`, `/`) are rejected.
fn destination(output: &Path, file_name: &str) -> Result<PathBuf, ConnectionError> {
    match Path::new(file_name).file_name() {
        Some(name) => Ok(output.join(name)),
        None => Err(ConnectionError::InvalidFileName(file_name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(name: &str, content: &[u8]) -> Vec<u8> {
        let body_len = 4 + name.len();
        let mut wire = format!("MSGN{body_len:>4}").into_bytes();
        wire.extend_from_slice(&(content.len() as u32).to_be_bytes());
        wire.extend_from_slice(name.as_bytes());
        wire.extend_from_slice(content);
        wire
    }

    #[tokio::test]
    async fn test_receives_and_saves_files() {
        let out = tempfile::tempdir().unwrap();
        let stream = tokio_test::io::Builder::new()
            .write(b"MSGN   3GET")
            .read(&reply("first.txt", b"one"))
            .write(b"MSGN   3GET")
            .read(&reply("second.txt", b"second file"))
            .build();

        let summary = ClientConnection::new(stream, out.path(), 2, Shutdown::new())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.files_received, 2);
        assert_eq!(summary.bytes_received, 3 + 11);
        assert_eq!(std::fs::read(out.path().join("first.txt")).unwrap(), b"one");
        assert_eq!(
            std::fs::read(out.path().join("second.txt")).unwrap(),
            b"second file"
        );
    }

    #[tokio::test]
    async fn test_overwrites_existing_file() {
        let out = tempfile::tempdir().unwrap();
        std::fs::write(out.path().join("same.txt"), b"old content that is longer").unwrap();

        let stream = tokio_test::io::Builder::new()
            .write(b"MSGN   3GET")
            .read(&reply("same.txt", b"new"))
            .build();

        ClientConnection::new(stream, out.path(), 1, Shutdown::new())
            .run()
            .await
            .unwrap();

        assert_eq!(std::fs::read(out.path().join("same.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_zero_files_requests_nothing() {
        let out = tempfile::tempdir().unwrap();
        let stream = tokio_test::io::Builder::new().build();

        let summary = ClientConnection::new(stream, out.path(), 0, Shutdown::new())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.files_received, 0);
    }

    #[tokio::test]
    async fn test_malformed_reply_frame() {
        let out = tempfile::tempdir().unwrap();
        let stream = tokio_test::io::Builder::new()
            .write(b"MSGN   3GET")
            .read(b"MSGN9999")
            .build();

        let result = ClientConnection::new(stream, out.path(), 1, Shutdown::new())
            .run()
            .await;

        assert!(matches!(result, Err(ConnectionError::InvalidFrame)));
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_server_disconnect_mid_file() {
        let out = tempfile::tempdir().unwrap();
        let mut truncated = reply("cut.bin", b"0123456789");
        truncated.truncate(truncated.len() - 4);
        let stream = tokio_test::io::Builder::new()
            .write(b"MSGN   3GET")
            .read(&truncated)
            .build();

        let result = ClientConnection::new(stream, out.path(), 1, Shutdown::new())
            .run()
            .await;

        assert!(result.unwrap_err().is_disconnect());
        assert!(!out.path().join("cut.bin").exists());
    }

    #[tokio::test]
    async fn test_path_components_are_stripped() {
        let out = tempfile::tempdir().unwrap();
        let stream = tokio_test::io::Builder::new()
            .write(b"MSGN   3GET")
            .read(&reply("../../escape.txt", b"data"))
            .build();

        ClientConnection::new(stream, out.path(), 1, Shutdown::new())
            .run()
            .await
            .unwrap();

        assert!(out.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_reply() {
        let out = tempfile::tempdir().unwrap();
        let shutdown = Shutdown::new();
        let (client_side, mut server_side) = tokio::io::duplex(1024);

        let task = tokio::spawn(
            ClientConnection::new(client_side, out.path().to_path_buf(), 1, shutdown.clone())
                .run(),
        );

        // The request arrives, but no reply is ever sent.
        let mut request = [0u8; 11];
        server_side.read_exact(&mut request).await.unwrap();
        assert_eq!(&request, b"MSGN   3GET");

        shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_destination() {
        let out = Path::new("/out");
        assert_eq!(destination(out, "a.txt").unwrap(), Path::new("/out/a.txt"));
        assert_eq!(destination(out, "/tmp/b").unwrap(), Path::new("/out/b"));
        assert!(matches!(
            destination(out, ".."),
            Err(ConnectionError::InvalidFileName(_))
        ));
        assert!(matches!(
            destination(out, ""),
            Err(ConnectionError::InvalidFileName(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let sock = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            sock.local_addr().unwrap().port()
        };
        let out = tempfile::tempdir().unwrap();
        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

        let result = Client::new(addr, out.path(), 1, Shutdown::new()).run().await;
        assert!(matches!(result, Err(ConnectionError::Connect { .. })));
    }
}
