//! Moves and Move Flags

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::core::square::Square;
use crate::game::piece::PieceKind;

/// Derived facts about a move, packed into one byte.
///
/// - Bit 0: captures a piece
/// - Bit 1: kingside castle
/// - Bit 2: queenside castle
/// - Bit 3: en-passant capture
/// - Bit 4: pawn reaches the last rank
/// - Bit 5: gives check
/// - Bit 6: gives checkmate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveFlags(u8);

impl MoveFlags {
    /// No flags.
    pub const NONE: MoveFlags = MoveFlags(0);
    /// Captures a piece.
    pub const CAPTURE: MoveFlags = MoveFlags(0x01);
    /// King castles towards the h-file.
    pub const CASTLE_KINGSIDE: MoveFlags = MoveFlags(0x02);
    /// King castles towards the a-file.
    pub const CASTLE_QUEENSIDE: MoveFlags = MoveFlags(0x04);
    /// Pawn captures en passant.
    pub const EN_PASSANT: MoveFlags = MoveFlags(0x08);
    /// Pawn promotes.
    pub const PROMOTION: MoveFlags = MoveFlags(0x10);
    /// Opponent king is attacked afterwards.
    pub const CHECK: MoveFlags = MoveFlags(0x20);
    /// Opponent is checkmated afterwards.
    pub const CHECKMATE: MoveFlags = MoveFlags(0x40);

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True when every bit in `other` is set.
    #[inline]
    pub const fn contains(self, other: MoveFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits in `other`.
    #[inline]
    pub fn insert(&mut self, other: MoveFlags) {
        self.0 |= other.0;
    }

    /// Union.
    #[inline]
    pub const fn with(self, other: MoveFlags) -> MoveFlags {
        MoveFlags(self.0 | other.0)
    }

    /// Check whether no flag is set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// A move from one square to another.
///
/// Flags are derived from the board the move was generated on, so two
/// moves compare equal when origin, destination and promotion agree.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Move {
    /// Square the piece leaves.
    pub origin: Square,
    /// Square the piece lands on.
    pub dest: Square,
    /// Piece a pawn becomes on the last rank.
    pub promotion: Option<PieceKind>,
    /// Derived flags.
    #[serde(default)]
    pub flags: MoveFlags,
}

impl Move {
    /// Create an unflagged move.
    pub const fn new(origin: Square, dest: Square, promotion: Option<PieceKind>) -> Self {
        Self {
            origin,
            dest,
            promotion,
            flags: MoveFlags::NONE,
        }
    }

    /// Same move with a promotion piece filled in.
    pub fn promoting_to(self, kind: PieceKind) -> Self {
        Self {
            promotion: Some(kind),
            ..self
        }
    }

    /// Whether the move captures.
    #[inline]
    pub fn is_capture(&self) -> bool {
        self.flags.contains(MoveFlags::CAPTURE)
    }

    /// Whether the move is a promotion.
    #[inline]
    pub fn is_promotion(&self) -> bool {
        self.flags.contains(MoveFlags::PROMOTION)
    }
}

impl PartialEq for Move {
    fn eq(&self, other: &Self) -> bool {
        self.origin == other.origin && self.dest == other.dest && self.promotion == other.promotion
    }
}

impl Eq for Move {}

impl Hash for Move {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.origin.hash(state);
        self.dest.hash(state);
        self.promotion.hash(state);
    }
}

impl fmt::Display for Move {
    /// Long algebraic (`e7e8q`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.origin, self.dest)?;
        if let Some(kind) = self.promotion {
            write!(f, "{}", kind.letter())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::square::sq;

    #[test]
    fn test_flag_ops() {
        let mut flags = MoveFlags::CAPTURE;
        assert!(flags.contains(MoveFlags::CAPTURE));
        assert!(!flags.contains(MoveFlags::CHECK));
        flags.insert(MoveFlags::CHECK);
        assert!(flags.contains(MoveFlags::CAPTURE.with(MoveFlags::CHECK)));
        assert!(MoveFlags::NONE.is_empty());
        assert_eq!(flags.bits(), 0x21);
    }

    #[test]
    fn test_equality_ignores_flags() {
        let mut a = Move::new(sq("e2"), sq("e4"), None);
        let b = a;
        a.flags = MoveFlags::CHECK;
        assert_eq!(a, b);
        assert_ne!(a, Move::new(sq("e2"), sq("e3"), None));
    }

    #[test]
    fn test_display_long_algebraic() {
        let m = Move::new(sq("e7"), sq("e8"), Some(PieceKind::Queen));
        assert_eq!(m.to_string(), "e7e8q");
        assert_eq!(Move::new(sq("g1"), sq("f3"), None).to_string(), "g1f3");
    }
}
