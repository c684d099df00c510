use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};

/// Outbound half of a byte-message transport.
///
/// `send` hands one complete message to the transport and must not block;
/// delivery is asynchronous by construction.
pub trait MessageSink: Send + Sync + 'static {
    fn send(&self, message: Bytes) -> Result<()>;
}

impl MessageSink for mpsc::UnboundedSender<Bytes> {
    fn send(&self, message: Bytes) -> Result<()> {
        mpsc::UnboundedSender::send(self, message).map_err(|_| TransportError::Closed)
    }
}

/// A connected byte-message channel: a sink for outbound messages and a
/// receiver yielding complete inbound messages in arrival order.
pub struct MessageChannel {
    sink: Arc<dyn MessageSink>,
    inbound: mpsc::UnboundedReceiver<Bytes>,
}

impl MessageChannel {
    pub fn new(sink: Arc<dyn MessageSink>, inbound: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self { sink, inbound }
    }

    /// Send one complete message.
    pub fn send(&self, message: Bytes) -> Result<()> {
        self.sink.send(message)
    }

    /// Wait for the next inbound message. `None` once the peer is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.inbound.recv().await
    }

    /// Shared handle to the outbound half.
    pub fn sink(&self) -> Arc<dyn MessageSink> {
        Arc::clone(&self.sink)
    }

    /// Split into the outbound half and the inbound receiver.
    pub fn into_parts(self) -> (Arc<dyn MessageSink>, mpsc::UnboundedReceiver<Bytes>) {
        (self.sink, self.inbound)
    }
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("inbound_closed", &self.inbound.is_closed())
            .finish()
    }
}
