use super::messages::ServerMessage;
use bytes::Bytes;
use tokio::sync::mpsc;

/// One unit read from the client connection
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// JSON control message
    Text(String),
    /// Audio frame
    Binary(Bytes),
}

/// Instructions for the task that owns the write half of the connection
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close,
}

/// Write side of the client connection.
///
/// Messages are queued in order on an unbounded channel, so queueing never
/// waits and the writer task sends them in exactly the order they were queued.
#[derive(Debug, Clone)]
pub struct OutboundSink {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl OutboundSink {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiver a writer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Queue a message. Returns false if the connection is already gone.
    pub fn send(&self, message: ServerMessage) -> bool {
        self.tx.send(Outbound::Message(message)).is_ok()
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}
