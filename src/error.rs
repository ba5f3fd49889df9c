//! Error taxonomy.
//!
//! Each concern raises its own error next to the code that produces it;
//! [`SyncError`] groups them into the four outcomes the client reacts to.

use crate::game::board::MoveError;
use crate::network::gateway::GatewayError;
use crate::network::protocol::ProtocolError;
use crate::session::interaction::ValidationError;

/// Any failure inside the synchronization engine. None of them is fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// A local move failed legality checking.
    #[error(transparent)]
    IllegalMove(#[from] MoveError),

    /// Malformed or unexpected inbound traffic.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Transport failure.
    #[error(transparent)]
    Connection(#[from] GatewayError),

    /// Local advisory outcome; never reaches the network.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl SyncError {
    /// Short category name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::IllegalMove(_) => "illegal_move",
            SyncError::Protocol(_) => "protocol",
            SyncError::Connection(_) => "connection",
            SyncError::Validation(_) => "validation",
        }
    }

    /// Whether the error came from remote traffic and should be recorded
    /// as a fault rather than shown as local feedback.
    pub fn is_remote_fault(&self) -> bool {
        matches!(self, SyncError::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::square::sq;
    use crate::game::moves::Move;

    #[test]
    fn test_conversions_keep_category() {
        let mv = Move::new(sq("e2"), sq("e5"), None);
        let err: SyncError = MoveError::Illegal { mv }.into();
        assert_eq!(err.kind(), "illegal_move");
        assert_eq!(err.to_string(), "illegal move e2e5");

        let err: SyncError = GatewayError::NotConnected.into();
        assert_eq!(err.kind(), "connection");
        assert!(!err.is_remote_fault());

        let err: SyncError = ProtocolError::Broker("boom".into()).into();
        assert!(err.is_remote_fault());
    }
}
