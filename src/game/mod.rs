//! Board State Engine
//!
//! Pure move generation, validation and application. No I/O.
//!
//! ## Module Structure
//!
//! - `piece`: Sides and piece kinds
//! - `moves`: Moves and derived move flags
//! - `board`: Board state and move application
//! - `movegen`: Pseudo-legal generation and king-safety filtering
//! - `status`: Checkmate, stalemate and draw detection
//! - `fen`: FEN import/export

pub mod board;
pub mod fen;
pub mod movegen;
pub mod moves;
pub mod piece;
pub mod status;

// Re-export key types
pub use board::{Board, CastleWing, CastlingRights, MoveError, STARTING_FEN};
pub use fen::FenError;
pub use moves::{Move, MoveFlags};
pub use piece::{Piece, PieceKind, Side};
pub use status::TerminalStatus;
