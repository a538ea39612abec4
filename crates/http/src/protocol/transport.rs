//! Write side of a connection as seen by a request.
//!
//! The connection task owns the socket; requests and responses only get a
//! [`Transport`] handle that queues bytes for it. Closing the transport tells
//! the connection to drain what is queued and shut the socket down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::protocol::SendError;

/// Frames queued from a request to its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Data(Bytes),
    Close,
}

/// A cloneable handle used to queue output on a connection.
#[derive(Debug, Clone)]
pub struct Transport {
    sender: mpsc::UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
}

/// The connection side of a [`Transport`].
pub type TransportReceiver = mpsc::UnboundedReceiver<Outbound>;

impl Transport {
    pub fn channel() -> (Transport, TransportReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Transport { sender, closed: Arc::new(AtomicBool::new(false)) }, receiver)
    }

    /// Queues bytes to be written to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::TransportClosed`] once [`close`](Self::close) was
    /// called or the connection went away.
    pub fn write(&self, data: Bytes) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::TransportClosed);
        }
        if data.is_empty() {
            return Ok(());
        }
        self.sender.send(Outbound::Data(data)).map_err(|_| SendError::TransportClosed)
    }

    /// Asks the connection to flush what is queued and close. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            // the receiver may already be gone, nothing left to close then
            let _ = self.sender.send(Outbound::Close);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.sender.is_closed()
    }
}
