//! TCP server handing out random files from a catalog.
//!
//! Accepts connections, runs each one as a task that loops over
//! read-request / build-reply / write-reply, and stops once the session
//! tracker sees the last connection close or a stop signal arrives.

use bytes::Buf;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::catalog::{FileCatalog, FileSource};
use crate::connection::{cancellable, ConnectionError, ServerState};
use crate::handler::build_reply;
use crate::protocol::{Frame, HeaderResult, Request, HEADER_LEN};
use crate::runtime::Shutdown;
use crate::session::{Report, SessionGuard, SessionTracker};

/// Listen backlog.
const BACKLOG: i32 = 1024;

/// Server instance
pub struct Server {
    listener: TcpListener,
    catalog: Arc<FileCatalog>,
    tracker: Arc<SessionTracker>,
    shutdown: Shutdown,
}

impl Server {
    /// Bind the listener for an attached catalog.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(addr: SocketAddr, catalog: FileCatalog, shutdown: Shutdown) -> io::Result<Self> {
        if catalog.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no files to serve in '{}'", catalog.dir().display()),
            ));
        }

        let listener = TcpListener::from_std(create_listener(addr)?)?;
        let tracker = SessionTracker::new(shutdown.clone());

        Ok(Server {
            listener,
            catalog: Arc::new(catalog),
            tracker,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn tracker(&self) -> Arc<SessionTracker> {
        Arc::clone(&self.tracker)
    }

    /// Accept connections until shutdown, then wait for open connections
    /// to wind down. Returns the final report if a session took place.
    pub async fn run(self) -> Option<Report> {
        let Server {
            listener,
            catalog,
            tracker,
            shutdown,
        } = self;

        info!(
            address = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
            files = catalog.count(),
            "Server listening"
        );

        let mut stop = shutdown.clone();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = stop.wait() => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(peer = %peer, "Connection established");
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        // Checks in now, before the task first runs.
                        let connection = ServerConnection::new(
                            stream,
                            peer.to_string(),
                            Arc::clone(&catalog),
                            Arc::clone(&tracker),
                            shutdown.clone(),
                        );
                        connections.spawn(connection.run());
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },

                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        debug!(open = connections.len(), "Server stopping");
        while connections.join_next().await.is_some() {}

        info!("Server stopped");
        tracker.report().cloned()
    }
}

/// One accepted connection in the server role.
///
/// Fields drop in order, so the socket closes before the session checks out.
pub struct ServerConnection<S, F: ?Sized> {
    stream: S,
    peer: String,
    frame: Frame,
    source: Arc<F>,
    shutdown: Shutdown,
    state: ServerState,
    files_served: u64,
    session: SessionGuard,
}

impl<S, F> ServerConnection<S, F>
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: FileSource + ?Sized,
{
    /// Wrap an accepted stream. The connection is checked in with
    /// `tracker` here and checked out when it is dropped.
    pub fn new(
        stream: S,
        peer: String,
        source: Arc<F>,
        tracker: Arc<SessionTracker>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            stream,
            peer,
            frame: Frame::new(),
            source,
            shutdown,
            state: ServerState::Idle,
            files_served: 0,
            session: SessionGuard::checkin(tracker),
        }
    }

    /// Serve requests until the peer disconnects, an error occurs or
    /// shutdown is requested.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let result = self.serve().await;
        self.set_state(ServerState::Closed);

        match &result {
            Ok(()) => info!(
                peer = %self.peer,
                files = self.files_served,
                "Connection closed"
            ),
            Err(e) if e.is_cancelled() => debug!(
                peer = %self.peer,
                files = self.files_served,
                "Connection cancelled by shutdown"
            ),
            Err(e) if e.is_disconnect() => info!(
                peer = %self.peer,
                files = self.files_served,
                error = %e,
                "Connection closed by peer"
            ),
            Err(ConnectionError::InvalidFrame) => {
                warn!(peer = %self.peer, "Frame decode error")
            }
            Err(e) => warn!(peer = %self.peer, error = %e, "Connection error"),
        }

        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            self.set_state(ServerState::ReadingFrameHeader);
            if !self.read_frame_header().await? {
                // Peer closed between requests.
                return Ok(());
            }

            let body_len = match self.frame.decode_header() {
                HeaderResult::Valid(len) => len,
                HeaderResult::Invalid | HeaderResult::Incomplete => {
                    return Err(ConnectionError::InvalidFrame)
                }
            };

            self.set_state(ServerState::ReadingRequestBody(body_len));
            cancellable(
                &mut self.shutdown,
                self.stream.read_exact(self.frame.body_mut()),
            )
            .await?;
            let request: Request = self.frame.decode_body()?;

            self.set_state(ServerState::Handling);
            let reply = build_reply(&request, self.source.as_ref())?;
            let file_size = reply.header.file_size;

            self.set_state(ServerState::WritingReply { file_size });
            let header = reply.encode_header(&mut self.frame)?;
            let mut wire = Buf::chain(header, &reply.body[..]);
            cancellable(&mut self.shutdown, self.stream.write_all_buf(&mut wire)).await?;

            self.session.add_sent(u64::from(file_size));
            self.files_served += 1;
            trace!(
                peer = %self.peer,
                file = %reply.header.file_name,
                bytes = file_size,
                "Reply sent"
            );
        }
    }

    /// Fill the frame header. Returns `false` if the peer closed before
    /// sending any of it.
    async fn read_frame_header(&mut self) -> Result<bool, ConnectionError> {
        let mut filled = 0;
        while filled < HEADER_LEN {
            let header = &mut self.frame.header_mut()[filled..];
            let n = cancellable(&mut self.shutdown, self.stream.read(header)).await?;
            if n == 0 {
                return match filled {
                    0 => Ok(false),
                    received => Err(ConnectionError::TruncatedHeader(received)),
                };
            }
            filled += n;
        }
        Ok(true)
    }

    fn set_state(&mut self, state: ServerState) {
        trace!(peer = %self.peer, from = ?self.state, to = ?state, "State change");
        self.state = state;
    }
}

/// Create a listening socket with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}
