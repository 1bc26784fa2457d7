//! Change notifications for presentation layers
//!
//! Every write to the slot store publishes a [`SlotEvent`]. Subscribers hold a
//! [`Subscription`] backed by an unbounded channel; dropping it unsubscribes, and
//! the bus forgets closed subscribers the next time it publishes.

use shared::SlotKey;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotEvent {
    /// A single slot was written. Fired for every write, changed or not.
    SlotChanged(SlotKey),
    /// A batch of slots was merged. Follows the per-slot events of the same batch.
    BatchChanged(Vec<SlotKey>),
}

#[derive(Debug, Default)]
pub struct NotificationBus {
    subscribers: Vec<UnboundedSender<SlotEvent>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        Subscription { rx }
    }

    /// Delivers `event` to every live subscriber, dropping the ones that went away.
    pub fn publish(&mut self, event: SlotEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().filter(|tx| !tx.is_closed()).count()
    }
}

/// Receiving end of a bus subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: UnboundedReceiver<SlotEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<SlotEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SlotEvent> {
        self.rx.try_recv().ok()
    }

    /// Takes every event queued so far.
    pub fn drain(&mut self) -> Vec<SlotEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
