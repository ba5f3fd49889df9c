//! Network Layer
//!
//! Broker messaging for the synchronization engine. Everything above this
//! layer talks to the broker through the [`Gateway`] trait only; the raw
//! connection never leaves `ws.rs`.

pub mod gateway;
pub mod memory;
pub mod protocol;
pub mod stomp;
pub mod ws;

pub use gateway::{Gateway, GatewayError, LinkEvent, SubscriptionTable};
pub use memory::MemoryGateway;
pub use protocol::{
    BrokerFrame, Channel, ClientFrame, GameUpdate, Intent, ProtocolError, RosterEntry, WireMove,
};
pub use stomp::{HeartBeat, StompError, StompFrame};
pub use ws::WsGateway;
