//! Outbound side of the event channel
//!
//! Lobby actors never touch sockets. They hand `ServerEvent`s addressed to a
//! participant to an `EventSink`; the network layer drains the sink and takes
//! care of addressing and framing. Events pushed by one actor reach the sink
//! in the order they were emitted.

use log::error;
use shared::{PlayerId, ServerEvent};
use tokio::sync::mpsc;

/// An event on its way to one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub client_id: PlayerId,
    pub event: ServerEvent,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, client_id: PlayerId, event: ServerEvent);

    fn emit_all(&self, client_ids: &[PlayerId], event: &ServerEvent) {
        for client_id in client_ids {
            self.emit(*client_id, event.clone());
        }
    }
}

impl EventSink for mpsc::UnboundedSender<Outbound> {
    fn emit(&self, client_id: PlayerId, event: ServerEvent) {
        if let Err(e) = self.send(Outbound { client_id, event }) {
            error!("Failed to queue event for client {}: {}", client_id, e);
        }
    }
}
