//! Terminal Status
//!
//! Checkmate, stalemate and the automatic draw rules.

use serde::{Deserialize, Serialize};

use crate::core::square::Square;
use crate::game::board::Board;
use crate::game::piece::{PieceKind, Side};

/// Halfmove clock value at which the fifty-move rule applies.
pub const FIFTY_MOVE_PLIES: u32 = 100;

/// Occurrences of one position that end the game.
pub const REPETITION_LIMIT: usize = 3;

/// Whether and how the game on a board is over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    /// Play continues.
    None,
    /// Side to move is in check with no legal move.
    Checkmate,
    /// Side to move has no legal move and is not in check.
    Stalemate,
    /// Current position occurred three times.
    DrawByThreefoldRepetition,
    /// Neither side can deliver mate.
    DrawByInsufficientMaterial,
    /// A hundred plies without capture or pawn move.
    DrawByFiftyMove,
}

impl TerminalStatus {
    /// Whether the game has ended.
    #[inline]
    pub fn is_over(self) -> bool {
        self != TerminalStatus::None
    }

    /// Short description for notices.
    pub fn describe(self) -> &'static str {
        match self {
            TerminalStatus::None => "in progress",
            TerminalStatus::Checkmate => "checkmate",
            TerminalStatus::Stalemate => "draw by stalemate",
            TerminalStatus::DrawByThreefoldRepetition => "draw by threefold repetition",
            TerminalStatus::DrawByInsufficientMaterial => "draw by insufficient material",
            TerminalStatus::DrawByFiftyMove => "draw by fifty-move rule",
        }
    }
}

impl Board {
    /// Classify the position.
    ///
    /// Mate and stalemate take precedence over the draw rules.
    pub fn terminal_status(&self) -> TerminalStatus {
        if !self.has_any_legal_move() {
            return if self.in_check(self.side_to_move) {
                TerminalStatus::Checkmate
            } else {
                TerminalStatus::Stalemate
            };
        }
        if self.has_insufficient_material() {
            return TerminalStatus::DrawByInsufficientMaterial;
        }
        if self.repetition_count() >= REPETITION_LIMIT {
            return TerminalStatus::DrawByThreefoldRepetition;
        }
        if self.halfmove_clock >= FIFTY_MOVE_PLIES {
            return TerminalStatus::DrawByFiftyMove;
        }
        TerminalStatus::None
    }

    /// How many times the current position has occurred.
    pub fn repetition_count(&self) -> usize {
        let current = self.signature();
        self.history.iter().filter(|&&sig| sig == current).count()
    }

    /// K v K, K+minor v K, or only same-coloured bishops besides the kings.
    pub fn has_insufficient_material(&self) -> bool {
        let mut minors: Vec<(Side, PieceKind, Square)> = Vec::new();
        for square in Square::all() {
            let Some(piece) = self.piece_at(square) else {
                continue;
            };
            match piece.kind {
                PieceKind::King => {}
                PieceKind::Knight | PieceKind::Bishop => minors.push((piece.side, piece.kind, square)),
                PieceKind::Pawn | PieceKind::Rook | PieceKind::Queen => return false,
            }
        }

        match minors.as_slice() {
            [] | [_] => true,
            many => {
                let first_colour = many[0].2.is_light();
                many.iter()
                    .all(|&(_, kind, sq)| kind == PieceKind::Bishop && sq.is_light() == first_colour)
            }
        }
    }
}
