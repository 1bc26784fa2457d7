//! Outbound boundary of the synchronization core

use log::warn;
use shared::Request;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Hands requests to whatever carries them to the server.
///
/// Sending never blocks and never fails from the core's point of view; lost
/// requests surface later as missing responses.
pub trait Transport {
    fn send(&mut self, request: Request);
}

/// Collects requests in memory. Useful for scripting a server by hand.
impl Transport for Vec<Request> {
    fn send(&mut self, request: Request) {
        self.push(request);
    }
}

/// Queues requests on a channel drained by the network loop.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: UnboundedSender<Request>,
}

impl ChannelTransport {
    /// Creates the transport and the receiver the network loop drains.
    pub fn channel() -> (Self, UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, request: Request) {
        if let Err(e) = self.tx.send(request) {
            warn!("Network loop gone, dropping request {:?}", e.0);
        }
    }
}
