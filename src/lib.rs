//! # Matey Sync
//!
//! Game-session synchronization engine for two-player online chess. Each
//! client keeps a locally authoritative board and stays in step with its
//! opponent through a publish/subscribe broker.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        MATEY SYNC                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/             - Shared primitives                       │
//! │  ├── square.rs     - 8x8 arena squares, algebraic notation   │
//! │  ├── ids.rs        - Participant and session identifiers     │
//! │  └── hash.rs       - Position signatures (SHA-256)           │
//! │                                                              │
//! │  game/             - Board State Engine (pure, no I/O)       │
//! │  ├── board.rs      - Board state and move application        │
//! │  ├── movegen.rs    - Legal move generation                   │
//! │  ├── status.rs     - Mate, stalemate and draw detection      │
//! │  └── fen.rs        - FEN import/export                       │
//! │                                                              │
//! │  session/          - Session layer                           │
//! │  ├── machine.rs    - Lifecycle reducer                       │
//! │  └── interaction.rs- Selection controller, highlights        │
//! │                                                              │
//! │  network/          - Messaging Gateway                       │
//! │  ├── protocol.rs   - Payloads and broker frames              │
//! │  ├── stomp.rs      - STOMP 1.2 text framing                  │
//! │  ├── gateway.rs    - Gateway trait, subscription table       │
//! │  ├── ws.rs         - WebSocket transport with reconnect      │
//! │  └── memory.rs     - In-memory transport                     │
//! │                                                              │
//! │  presence.rs       - Presence Tracker                        │
//! │  client.rs         - Serialized event loop, view snapshots   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Flow
//!
//! User gestures go through the interaction controller; completed moves
//! are applied by the session machine before the intent is published.
//! Inbound deliveries are routed by channel to the session machine or the
//! presence tracker. Every event passes through [`client::GameClient::handle`]
//! one at a time, and every accepted transition produces a new snapshot.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod game;
pub mod network;
pub mod presence;
pub mod session;

// Re-export commonly used types
pub use client::{ClientCommand, ClientEvent, ClientView, GameClient, NotificationSink, TracingSink};
pub use config::{ClientConfig, ConfigError};
pub use core::{LocalIdentity, ParticipantId, SessionId, Square};
pub use error::SyncError;
pub use game::{Board, Move, MoveError, PieceKind, Side, TerminalStatus};
pub use network::{Gateway, GatewayError, MemoryGateway, WsGateway};
pub use presence::PresenceTracker;
pub use session::{InteractionController, SessionMachine, SessionState, ValidationError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
