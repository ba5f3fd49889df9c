//! Core primitives.
//!
//! Board coordinates, identifiers and position hashing shared by the game
//! engine and the wire protocol.

pub mod hash;
pub mod ids;
pub mod square;

// Re-export core types
pub use hash::{PositionHasher, PositionSignature};
pub use ids::{LocalIdentity, ParticipantId, SessionId};
pub use square::Square;
