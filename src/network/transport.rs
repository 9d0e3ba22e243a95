//! TCP Transport
//!
//! Async byte pumps feeding the synchronous game loops.
//!
//! Each socket gets a reader task and a writer task. Readers forward
//! arrived bytes over a channel; the owning loop drains that channel in
//! `poll`, which appends the bytes to the matching [`Connection`] and
//! reports what happened as [`Event`]s. Outgoing bytes stay in each
//! connection's send buffer until `flush` hands them to the writer tasks.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::network::connection::{Connection, ConnectionId};

/// Read size per socket read.
const READ_CHUNK: usize = 4096;

/// What happened on a connection since the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A peer connected.
    Opened,
    /// The peer went away. The connection is dropped on the next poll.
    Closed,
    /// New bytes were appended to the receive buffer.
    DataReceived,
}

/// Messages from the socket tasks to the owning loop.
enum Incoming {
    Opened { id: ConnectionId, peer: Peer },
    Data { id: ConnectionId, bytes: Bytes },
    Closed { id: ConnectionId },
}

/// Loop-side half of one socket.
struct Peer {
    connection: Connection,
    writer: mpsc::UnboundedSender<Bytes>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Peer {
    /// Hand queued bytes to the writer task.
    fn flush(&mut self) {
        let outgoing = self.connection.take_outgoing();
        if outgoing.is_empty() {
            return;
        }
        if self.writer.send(outgoing).is_err() {
            debug!(id = self.connection.id(), "writer already gone, dropping outgoing bytes");
        }
    }

    /// Stop the reader; the writer ends once its channel is dropped.
    fn shut(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Task-side half of one socket's receive path.
struct ReadPump {
    id: ConnectionId,
    read: OwnedReadHalf,
    shutdown: oneshot::Receiver<()>,
    incoming: mpsc::UnboundedSender<Incoming>,
}

impl ReadPump {
    async fn run(mut self) {
        let mut buffer = BytesMut::with_capacity(READ_CHUNK);

        loop {
            buffer.reserve(READ_CHUNK);
            tokio::select! {
                result = self.read.read_buf(&mut buffer) => {
                    match result {
                        Ok(0) => break,
                        Ok(_) => {
                            let bytes = buffer.split().freeze();
                            if self.incoming.send(Incoming::Data { id: self.id, bytes }).is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            debug!(id = self.id, "read error: {}", e);
                            break;
                        }
                    }
                }
                // Fires on an explicit close and when the loop side is dropped
                _ = &mut self.shutdown => return,
            }
        }

        let _ = self.incoming.send(Incoming::Closed { id: self.id });
    }
}

async fn write_pump(id: ConnectionId, mut write: OwnedWriteHalf, mut outgoing: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(bytes) = outgoing.recv().await {
        if let Err(e) = write.write_all(&bytes).await {
            debug!(id, "write error: {}", e);
            return;
        }
    }
    let _ = write.shutdown().await;
}

/// Split a socket into a writer task and the pieces needed for its reader.
fn start_stream(
    id: ConnectionId,
    stream: TcpStream,
    incoming: mpsc::UnboundedSender<Incoming>,
) -> (Peer, ReadPump) {
    let peer_addr = stream.peer_addr().ok();
    if let Err(e) = stream.set_nodelay(true) {
        debug!(id, "set_nodelay failed: {}", e);
    }

    let (read, write) = stream.into_split();
    let (writer, outgoing) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    tokio::spawn(write_pump(id, write, outgoing));

    let connection = match peer_addr {
        Some(addr) => Connection::with_peer(id, addr),
        None => Connection::new(id),
    };

    let peer = Peer {
        connection,
        writer,
        shutdown: Some(shutdown_tx),
    };
    let pump = ReadPump {
        id,
        read,
        shutdown: shutdown_rx,
        incoming,
    };
    (peer, pump)
}

/// Wait up to `timeout` for the first message, then take whatever else is
/// already queued without waiting.
async fn drain(rx: &mut mpsc::UnboundedReceiver<Incoming>, timeout: Duration) -> Vec<Incoming> {
    let mut batch = Vec::new();

    let first = if timeout.is_zero() {
        rx.try_recv().ok()
    } else {
        tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
    };
    let Some(first) = first else {
        return batch;
    };
    batch.push(first);

    while let Ok(next) = rx.try_recv() {
        batch.push(next);
    }
    batch
}

// =============================================================================
// HUB (server side)
// =============================================================================

/// Listening socket plus every accepted connection.
pub struct Hub {
    local_addr: SocketAddr,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    peers: BTreeMap<ConnectionId, Peer>,
    /// Closed last poll, removed at the start of the next one
    closed: Vec<ConnectionId>,
    accept_task: JoinHandle<()>,
}

impl Hub {
    /// Start listening.
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (tx, incoming) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            let mut next_id: ConnectionId = 0;
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Accept error: {}", e);
                        continue;
                    }
                };

                let id = next_id;
                next_id += 1;
                debug!(id, %addr, "accepted connection");

                let (peer, pump) = start_stream(id, stream, tx.clone());
                // Opened must be queued before any of the reader's data
                if tx.send(Incoming::Opened { id, peer }).is_err() {
                    return;
                }
                tokio::spawn(pump.run());
            }
        });

        info!("Listening on {}", local_addr);

        Ok(Self {
            local_addr,
            incoming,
            peers: BTreeMap::new(),
            closed: Vec::new(),
            accept_task,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Collect events, waiting at most `timeout` for the first one.
    pub async fn poll(&mut self, timeout: Duration) -> Vec<(ConnectionId, Event)> {
        for id in self.closed.drain(..) {
            if let Some(peer) = self.peers.remove(&id) {
                peer.shut();
            }
        }

        let mut events = Vec::new();
        for incoming in drain(&mut self.incoming, timeout).await {
            match incoming {
                Incoming::Opened { id, peer } => {
                    self.peers.insert(id, peer);
                    events.push((id, Event::Opened));
                }
                Incoming::Data { id, bytes } => {
                    // Data racing an explicit close is dropped
                    if let Some(peer) = self.peers.get_mut(&id) {
                        peer.connection.receive(&bytes);
                        events.push((id, Event::DataReceived));
                    }
                }
                Incoming::Closed { id } => {
                    if self.peers.contains_key(&id) && !self.closed.contains(&id) {
                        self.closed.push(id);
                        events.push((id, Event::Closed));
                    }
                }
            }
        }
        events
    }

    /// Get a connection.
    pub fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.peers.get_mut(&id).map(|p| &mut p.connection)
    }

    /// Identifiers of all open connections.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.peers.keys().copied().collect()
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Flush and drop a connection. No `Closed` event follows.
    pub fn close(&mut self, id: ConnectionId) {
        if let Some(mut peer) = self.peers.remove(&id) {
            peer.flush();
            peer.shut();
            debug!(id, "connection closed locally");
        }
    }

    /// Hand every connection's queued bytes to its writer.
    pub fn flush(&mut self) {
        for peer in self.peers.values_mut() {
            peer.flush();
        }
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

// =============================================================================
// LINK (client side)
// =============================================================================

/// One outgoing connection.
pub struct Link {
    peer: Peer,
    incoming: mpsc::UnboundedReceiver<Incoming>,
    closed: bool,
}

impl Link {
    /// Connect to a server.
    pub async fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (tx, incoming) = mpsc::unbounded_channel();

        let (peer, pump) = start_stream(0, stream, tx);
        tokio::spawn(pump.run());

        Ok(Self {
            peer,
            incoming,
            closed: false,
        })
    }

    /// Collect events, waiting at most `timeout` for the first one.
    ///
    /// `Closed` is reported once; later polls return nothing.
    pub async fn poll(&mut self, timeout: Duration) -> Vec<Event> {
        if self.closed {
            return Vec::new();
        }

        let mut events = Vec::new();
        for incoming in drain(&mut self.incoming, timeout).await {
            match incoming {
                Incoming::Data { bytes, .. } => {
                    self.peer.connection.receive(&bytes);
                    events.push(Event::DataReceived);
                }
                Incoming::Closed { .. } => {
                    self.closed = true;
                    events.push(Event::Closed);
                }
                Incoming::Opened { .. } => {}
            }
        }
        events
    }

    /// Get the connection.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.peer.connection
    }

    /// Has the server gone away?
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Hand queued bytes to the writer.
    pub fn flush(&mut self) {
        self.peer.flush();
    }
}

// =============================================================================
// TESTS
// =============================================================================
