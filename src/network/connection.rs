//! Connection Buffers
//!
//! The byte-level view of one peer that the codecs work against: an
//! outgoing buffer that messages are appended to and the bytes that have
//! already arrived, consumed from the front one whole message at a time.

use std::net::SocketAddr;
use bytes::{Bytes, BytesMut, Buf};

/// Identifier of a connection within one transport.
pub type ConnectionId = u64;

/// Send and receive buffers of one peer.
#[derive(Debug, Default)]
pub struct Connection {
    /// Transport-assigned identifier.
    id: ConnectionId,
    /// Remote address, if known.
    peer: Option<SocketAddr>,
    /// Bytes queued for sending.
    send_buffer: BytesMut,
    /// Bytes received and not yet consumed.
    recv_buffer: BytesMut,
}

impl Connection {
    /// Create an empty connection.
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Create an empty connection for a remote address.
    pub fn with_peer(id: ConnectionId, peer: SocketAddr) -> Self {
        Self {
            id,
            peer: Some(peer),
            ..Default::default()
        }
    }

    /// Get connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Get remote address.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Append bytes to the outgoing buffer.
    pub fn send(&mut self, bytes: &[u8]) {
        self.send_buffer.extend_from_slice(bytes);
    }

    /// Bytes queued for sending.
    pub fn send_buffer(&self) -> &[u8] {
        &self.send_buffer
    }

    /// Take everything queued for sending.
    pub fn take_outgoing(&mut self) -> Bytes {
        self.send_buffer.split().freeze()
    }

    /// Bytes received and not yet consumed.
    pub fn recv_buffer(&self) -> &[u8] {
        &self.recv_buffer
    }

    /// Append bytes that arrived from the peer.
    pub fn receive(&mut self, bytes: &[u8]) {
        self.recv_buffer.extend_from_slice(bytes);
    }

    /// Drop `count` bytes from the front of the receive buffer.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.recv_buffer.len());
        self.recv_buffer.advance(count);
    }
}
