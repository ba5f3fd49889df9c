//! Pieces and Sides

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side a piece belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Side {
    /// Moves first.
    White = 0,
    /// Moves second.
    Black = 1,
}

impl Side {
    /// The other side.
    #[inline]
    pub const fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Rank delta of a forward pawn step.
    #[inline]
    pub const fn forward(self) -> i8 {
        match self {
            Side::White => 1,
            Side::Black => -1,
        }
    }

    /// Rank on which this side's pieces start (0 or 7).
    #[inline]
    pub const fn home_rank(self) -> u8 {
        match self {
            Side::White => 0,
            Side::Black => 7,
        }
    }

    /// Rank a pawn must reach to promote.
    #[inline]
    pub const fn promotion_rank(self) -> u8 {
        match self {
            Side::White => 7,
            Side::Black => 0,
        }
    }

    /// Rank pawns start on.
    #[inline]
    pub const fn pawn_rank(self) -> u8 {
        match self {
            Side::White => 1,
            Side::Black => 6,
        }
    }

    /// Both sides, white first.
    pub const ALL: [Side; 2] = [Side::White, Side::Black];
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => f.write_str("White"),
            Side::Black => f.write_str("Black"),
        }
    }
}

/// Kind of chess piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PieceKind {
    /// Pawn
    Pawn = 0,
    /// Knight
    Knight = 1,
    /// Bishop
    Bishop = 2,
    /// Rook
    Rook = 3,
    /// Queen
    Queen = 4,
    /// King
    King = 5,
}

impl PieceKind {
    /// Kinds a pawn may promote to.
    pub const PROMOTIONS: [PieceKind; 4] = [
        PieceKind::Queen,
        PieceKind::Rook,
        PieceKind::Bishop,
        PieceKind::Knight,
    ];

    /// Lower-case letter (`p n b r q k`).
    pub const fn letter(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        }
    }

    /// Parse a letter, either case.
    pub fn from_letter(c: char) -> Option<PieceKind> {
        match c.to_ascii_lowercase() {
            'p' => Some(PieceKind::Pawn),
            'n' => Some(PieceKind::Knight),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            'q' => Some(PieceKind::Queen),
            'k' => Some(PieceKind::King),
            _ => None,
        }
    }

    /// Whether a pawn may become this kind.
    #[inline]
    pub fn is_promotion_target(self) -> bool {
        Self::PROMOTIONS.contains(&self)
    }
}

/// A piece on the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    /// What it is.
    pub kind: PieceKind,
    /// Who owns it.
    pub side: Side,
}

impl Piece {
    /// Create a piece.
    pub const fn new(kind: PieceKind, side: Side) -> Self {
        Self { kind, side }
    }

    /// FEN letter: upper-case for white, lower-case for black.
    pub fn fen_char(self) -> char {
        let c = self.kind.letter();
        match self.side {
            Side::White => c.to_ascii_uppercase(),
            Side::Black => c,
        }
    }

    /// Parse a FEN letter.
    pub fn from_fen_char(c: char) -> Option<Piece> {
        let kind = PieceKind::from_letter(c)?;
        let side = if c.is_ascii_uppercase() { Side::White } else { Side::Black };
        Some(Piece::new(kind, side))
    }

    /// Compact code for hashing (0 is reserved for empty squares).
    #[inline]
    pub const fn code(self) -> u8 {
        1 + self.kind as u8 + 6 * self.side as u8
    }
}
