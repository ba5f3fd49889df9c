//! Messaging Gateway
//!
//! The only way higher layers reach the broker. Implementations own the
//! transport; callers see publish, subscribe and link notifications.
//!
//! Link state is driven by [`LinkEvent`]s that the transport pushes into the
//! client's event queue. The client applies them through
//! [`Gateway::on_link_up`] / [`Gateway::on_link_down`] from its single
//! handler, so connection state never changes underneath a transition.

use std::collections::BTreeSet;

use crate::network::protocol::ClientFrame;

/// Connection lifecycle and inbound traffic reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A broker session is open.
    Connected,
    /// The link dropped or a connection attempt failed.
    Disconnected {
        /// Human-readable cause.
        reason: String,
    },
    /// Delivery on a subscribed destination.
    Message {
        /// Destination it arrived on.
        destination: String,
        /// Raw JSON payload.
        body: String,
    },
    /// Error frame from the broker.
    BrokerError(String),
}

/// Gateway errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// No broker session.
    #[error("not connected to broker")]
    NotConnected,

    /// Outbound queue full.
    #[error("outbound queue full")]
    Backpressure,

    /// Transport task is gone.
    #[error("transport closed")]
    Closed,

    /// Payload could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Destinations the client wants to receive.
///
/// Survives reconnects; replayed in full on every link-up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionTable {
    destinations: BTreeSet<String>,
}

impl SubscriptionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a destination. Returns whether it was new.
    pub fn insert(&mut self, destination: &str) -> bool {
        self.destinations.insert(destination.to_string())
    }

    /// Remove a destination. Returns whether it was present.
    pub fn remove(&mut self, destination: &str) -> bool {
        self.destinations.remove(destination)
    }

    /// Whether a destination is wanted.
    pub fn contains(&self, destination: &str) -> bool {
        self.destinations.contains(destination)
    }

    /// Current set.
    pub fn destinations(&self) -> &BTreeSet<String> {
        &self.destinations
    }

    /// Subscribe frames that re-establish the full set.
    pub fn replay(&self) -> Vec<ClientFrame> {
        self.destinations
            .iter()
            .map(|destination| ClientFrame::Subscribe {
                destination: destination.clone(),
            })
            .collect()
    }
}

/// Publish/subscribe access to the broker.
///
/// Implementors supply frame delivery and link state; subscription
/// bookkeeping and the reconnect replay are shared.
pub trait Gateway {
    /// Hand a frame to the transport.
    fn send_frame(&mut self, frame: ClientFrame) -> Result<(), GatewayError>;

    /// Whether a broker session is open.
    fn is_connected(&self) -> bool;

    /// Record link state.
    fn set_connected(&mut self, connected: bool);

    /// Wanted subscriptions.
    fn table(&self) -> &SubscriptionTable;

    /// Wanted subscriptions, mutably.
    fn table_mut(&mut self) -> &mut SubscriptionTable;

    /// Publish a payload. Fails while disconnected; nothing is queued.
    fn publish(&mut self, destination: &str, body: String) -> Result<(), GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        self.send_frame(ClientFrame::Send {
            destination: destination.to_string(),
            body,
        })
    }

    /// Ensure a destination is received. Idempotent; returns whether the
    /// set changed. While disconnected the wish is recorded and sent on
    /// the next link-up.
    fn subscribe(&mut self, destination: &str) -> Result<bool, GatewayError> {
        if !self.table_mut().insert(destination) {
            return Ok(false);
        }
        if self.is_connected() {
            self.send_frame(ClientFrame::Subscribe {
                destination: destination.to_string(),
            })?;
        }
        Ok(true)
    }

    /// Stop receiving a destination. Returns whether the set changed.
    fn unsubscribe(&mut self, destination: &str) -> Result<bool, GatewayError> {
        if !self.table_mut().remove(destination) {
            return Ok(false);
        }
        if self.is_connected() {
            self.send_frame(ClientFrame::Unsubscribe {
                destination: destination.to_string(),
            })?;
        }
        Ok(true)
    }

    /// Current subscription set.
    fn subscriptions(&self) -> BTreeSet<String> {
        self.table().destinations().clone()
    }

    /// A new broker session opened: re-establish every subscription.
    fn on_link_up(&mut self) -> Result<(), GatewayError> {
        self.set_connected(true);
        let frames = self.table().replay();
        for frame in frames {
            self.send_frame(frame)?;
        }
        Ok(())
    }

    /// The broker session is gone.
    fn on_link_down(&mut self) {
        self.set_connected(false);
    }

    /// Orderly goodbye. Best effort.
    fn disconnect(&mut self) -> Result<(), GatewayError> {
        if !self.is_connected() {
            return Ok(());
        }
        let result = self.send_frame(ClientFrame::Disconnect);
        self.set_connected(false);
        result
    }
}
