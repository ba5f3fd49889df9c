//! In-memory gateway.
//!
//! Records every frame instead of sending it. Used by tests and by hosts
//! that embed the engine behind their own transport.

use crate::network::gateway::{Gateway, GatewayError, SubscriptionTable};
use crate::network::protocol::ClientFrame;

/// Gateway that keeps frames in a log.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    connected: bool,
    table: SubscriptionTable,
    /// Every frame sent, tagged with the link generation it went out on.
    sent: Vec<(u32, ClientFrame)>,
    generation: u32,
    /// When set, every send fails with this error.
    refuse: Option<GatewayError>,
}

impl MemoryGateway {
    /// Create a disconnected gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gateway that is already linked.
    pub fn connected() -> Self {
        let mut gateway = Self::new();
        gateway.connected = true;
        gateway.generation = 1;
        gateway
    }

    /// Number of link-ups seen.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// All frames sent so far.
    pub fn sent(&self) -> impl Iterator<Item = &ClientFrame> {
        self.sent.iter().map(|(_, frame)| frame)
    }

    /// Frames sent on a given link generation.
    pub fn sent_on(&self, generation: u32) -> Vec<&ClientFrame> {
        self.sent
            .iter()
            .filter(|(g, _)| *g == generation)
            .map(|(_, frame)| frame)
            .collect()
    }

    /// `(destination, body)` of every published payload.
    pub fn published(&self) -> Vec<(&str, &str)> {
        self.sent()
            .filter_map(|frame| match frame {
                ClientFrame::Send { destination, body } => Some((destination.as_str(), body.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Destinations published to, in order.
    pub fn published_destinations(&self) -> Vec<&str> {
        self.published().into_iter().map(|(destination, _)| destination).collect()
    }

    /// Forget the log.
    pub fn clear(&mut self) {
        self.sent.clear();
    }

    /// Make sends fail with `error` while the link stays up, as a full or
    /// closed outbound queue would. `None` restores normal delivery.
    pub fn refuse_sends(&mut self, error: Option<GatewayError>) {
        self.refuse = error;
    }
}

impl Gateway for MemoryGateway {
    fn send_frame(&mut self, frame: ClientFrame) -> Result<(), GatewayError> {
        if !self.connected {
            return Err(GatewayError::NotConnected);
        }
        if let Some(error) = &self.refuse {
            return Err(error.clone());
        }
        self.sent.push((self.generation, frame));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_connected(&mut self, connected: bool) {
        if connected && !self.connected {
            self.generation += 1;
        }
        self.connected = connected;
    }

    fn table(&self) -> &SubscriptionTable {
        &self.table
    }

    fn table_mut(&mut self) -> &mut SubscriptionTable {
        &mut self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::ParticipantId;
    use crate::network::protocol::Channel;
    use std::collections::BTreeSet;

    fn subscribe_frames(frames: &[&ClientFrame]) -> BTreeSet<String> {
        frames
            .iter()
            .filter_map(|frame| match frame {
                ClientFrame::Subscribe { destination } => Some(destination.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_publish_requires_link() {
        let mut gateway = MemoryGateway::new();
        assert_eq!(
            gateway.publish("/app/game/find", "{}".into()),
            Err(GatewayError::NotConnected)
        );
        assert_eq!(gateway.sent().count(), 0);
    }

    #[test]
    fn test_subscriptions_recorded_while_down() {
        let mut gateway = MemoryGateway::new();
        assert_eq!(gateway.subscribe("/topic/online-count"), Ok(true));
        assert_eq!(gateway.sent().count(), 0);

        gateway.on_link_up().unwrap();
        assert_eq!(
            subscribe_frames(&gateway.sent_on(1)),
            BTreeSet::from(["/topic/online-count".to_string()])
        );
    }

    #[test]
    fn test_resubscribe_after_reconnect_is_idempotent() {
        let me = ParticipantId::new("u1");
        let mut gateway = MemoryGateway::new();
        gateway.on_link_up().unwrap();
        for channel in Channel::required(&me) {
            gateway.subscribe(&channel.destination()).unwrap();
        }
        let initial = gateway.subscriptions();

        gateway.on_link_down();
        gateway.on_link_up().unwrap();
        // A second round of subscribe calls changes nothing.
        for channel in Channel::required(&me) {
            assert_eq!(gateway.subscribe(&channel.destination()), Ok(false));
        }

        assert_eq!(gateway.subscriptions(), initial);
        assert_eq!(subscribe_frames(&gateway.sent_on(1)), initial);
        assert_eq!(subscribe_frames(&gateway.sent_on(2)), initial);
        assert_eq!(gateway.sent_on(2).len(), initial.len());
    }

    #[test]
    fn test_unsubscribe() {
        let mut gateway = MemoryGateway::connected();
        gateway.subscribe("/topic/online-players").unwrap();
        assert_eq!(gateway.unsubscribe("/topic/online-players"), Ok(true));
        assert_eq!(gateway.unsubscribe("/topic/online-players"), Ok(false));
        assert!(gateway.subscriptions().is_empty());
        assert!(matches!(
            gateway.sent().last(),
            Some(ClientFrame::Unsubscribe { .. })
        ));
    }
}
