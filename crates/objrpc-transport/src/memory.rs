//! In-process socket that records everything written to it.
//!
//! There is no peer: the test (or embedding code) plays the remote side by
//! feeding [`TransportEvent`](crate::TransportEvent)s to the engine and
//! inspecting [`MemorySocket::sent`] afterwards.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{CloseStatus, Payload, Socket, SocketId, TransportError};

/// A socket backed by two in-memory logs.
#[derive(Debug)]
pub struct MemorySocket {
    id: SocketId,
    sent: Mutex<Vec<Payload>>,
    closed: Mutex<Option<(CloseStatus, String)>>,
}

impl MemorySocket {
    /// Creates a socket with the given identity.
    pub fn new(id: SocketId) -> Arc<Self> {
        Arc::new(Self {
            id,
            sent: Mutex::new(Vec::new()),
            closed: Mutex::new(None),
        })
    }

    /// Creates a socket with a fresh process-wide identity.
    pub fn open() -> Arc<Self> {
        Self::new(SocketId::next())
    }

    /// Returns a copy of every payload sent so far.
    pub fn sent(&self) -> Vec<Payload> {
        self.sent.lock().clone()
    }

    /// Drains and returns the payloads sent so far.
    pub fn take_sent(&self) -> Vec<Payload> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Returns the close status and reason, if the socket was closed.
    pub fn closed(&self) -> Option<(CloseStatus, String)> {
        self.closed.lock().clone()
    }
}

impl Socket for MemorySocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn send(&self, payload: Payload) -> Result<(), TransportError> {
        if self.closed.lock().is_some() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        self.sent.lock().push(payload);
        Ok(())
    }

    fn close(
        &self,
        status: CloseStatus,
        reason: &str,
    ) -> Result<(), TransportError> {
        let mut closed = self.closed.lock();
        if closed.is_none() {
            *closed = Some((status, reason.to_string()));
        }
        Ok(())
    }
}
