//! Board State
//!
//! An 8×8 arena of optional pieces plus the side to move, castling rights,
//! en-passant target, move clocks and the position history used for
//! repetition detection.
//!
//! Boards are values: [`Board::apply_move`] returns a new board and never
//! touches `self`, so a snapshot handed to a renderer can never be observed
//! half-updated.

use std::fmt;

use crate::core::hash::{PositionHasher, PositionSignature};
use crate::core::square::{Square, BOARD_SQUARES};
use crate::game::moves::{Move, MoveFlags};
use crate::game::piece::{Piece, PieceKind, Side};

// =============================================================================
// CASTLING RIGHTS
// =============================================================================

/// Which wing a castle goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastleWing {
    /// Towards the h-file.
    Kingside,
    /// Towards the a-file.
    Queenside,
}

impl CastleWing {
    /// File the rook starts on.
    pub const fn rook_file(self) -> u8 {
        match self {
            CastleWing::Kingside => 7,
            CastleWing::Queenside => 0,
        }
    }
}

/// Castling rights as a 4-bit set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CastlingRights(u8);

impl CastlingRights {
    /// No rights.
    pub const NONE: CastlingRights = CastlingRights(0);
    /// All four rights.
    pub const ALL: CastlingRights = CastlingRights(0x0f);

    const fn bit(side: Side, wing: CastleWing) -> u8 {
        let base = match wing {
            CastleWing::Kingside => 0x01,
            CastleWing::Queenside => 0x02,
        };
        match side {
            Side::White => base,
            Side::Black => base << 2,
        }
    }

    /// Check a single right.
    #[inline]
    pub const fn has(self, side: Side, wing: CastleWing) -> bool {
        self.0 & Self::bit(side, wing) != 0
    }

    /// Grant a single right.
    #[inline]
    pub fn grant(&mut self, side: Side, wing: CastleWing) {
        self.0 |= Self::bit(side, wing);
    }

    /// Revoke a single right.
    #[inline]
    pub fn revoke(&mut self, side: Side, wing: CastleWing) {
        self.0 &= !Self::bit(side, wing);
    }

    /// Revoke whatever depends on a piece standing on `square`.
    ///
    /// Called with both ends of every move: a king or rook leaving its home
    /// square, or anything landing on a rook's home square, ends the right.
    pub fn touch(&mut self, square: Square) {
        for side in Side::ALL {
            if square.rank() != side.home_rank() {
                continue;
            }
            match square.file() {
                0 => self.revoke(side, CastleWing::Queenside),
                4 => {
                    self.revoke(side, CastleWing::Kingside);
                    self.revoke(side, CastleWing::Queenside);
                }
                7 => self.revoke(side, CastleWing::Kingside),
                _ => {}
            }
        }
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

// =============================================================================
// BOARD
// =============================================================================

/// Starting placement in FEN.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Full board state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    pub(super) squares: [Option<Piece>; BOARD_SQUARES],
    pub(super) side_to_move: Side,
    pub(super) castling: CastlingRights,
    pub(super) en_passant: Option<Square>,
    pub(super) halfmove_clock: u32,
    pub(super) fullmove_number: u32,
    /// Signatures of every position reached, oldest first. Append-only.
    pub(super) history: Vec<PositionSignature>,
    pub(super) last_move: Option<Move>,
}

impl Board {
    /// Standard starting position.
    pub fn new() -> Self {
        const BACK_RANK: [PieceKind; 8] = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King,
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];

        let mut squares = [None; BOARD_SQUARES];
        for side in Side::ALL {
            for file in 0..8u8 {
                let back = file as usize + side.home_rank() as usize * 8;
                let pawn = file as usize + side.pawn_rank() as usize * 8;
                squares[back] = Some(Piece::new(BACK_RANK[file as usize], side));
                squares[pawn] = Some(Piece::new(PieceKind::Pawn, side));
            }
        }

        Self::from_parts(squares, Side::White, CastlingRights::ALL, None, 0, 1)
    }

    /// Assemble a board and seed its history with the current position.
    pub(super) fn from_parts(
        squares: [Option<Piece>; BOARD_SQUARES],
        side_to_move: Side,
        castling: CastlingRights,
        en_passant: Option<Square>,
        halfmove_clock: u32,
        fullmove_number: u32,
    ) -> Self {
        let mut board = Self {
            squares,
            side_to_move,
            castling,
            en_passant,
            halfmove_clock,
            fullmove_number,
            history: Vec::new(),
            last_move: None,
        };
        board.history.push(board.signature());
        board
    }

    /// Piece on a square.
    #[inline]
    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.squares[square.index()]
    }

    /// Side whose turn it is.
    #[inline]
    pub fn side_to_move(&self) -> Side {
        self.side_to_move
    }

    /// Current castling rights.
    #[inline]
    pub fn castling(&self) -> CastlingRights {
        self.castling
    }

    /// Square a pawn may capture onto en passant.
    #[inline]
    pub fn en_passant(&self) -> Option<Square> {
        self.en_passant
    }

    /// Plies since the last capture or pawn move.
    #[inline]
    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    /// Starts at 1, incremented after Black moves.
    #[inline]
    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    /// Signatures of all positions reached so far, including this one.
    #[inline]
    pub fn history(&self) -> &[PositionSignature] {
        &self.history
    }

    /// The move that produced this position.
    #[inline]
    pub fn last_move(&self) -> Option<Move> {
        self.last_move
    }

    /// Square of `side`'s king.
    pub fn king_square(&self, side: Side) -> Option<Square> {
        Square::all().find(|&sq| self.piece_at(sq) == Some(Piece::new(PieceKind::King, side)))
    }

    /// Count pieces matching a predicate.
    pub fn count_pieces(&self, mut predicate: impl FnMut(Piece) -> bool) -> usize {
        self.squares.iter().flatten().filter(|&&p| predicate(p)).count()
    }

    /// Repetition signature: placement, side to move, castling rights and
    /// en-passant target.
    pub fn signature(&self) -> PositionSignature {
        let mut hasher = PositionHasher::for_position();
        for square in &self.squares {
            hasher.update_u8(square.map(Piece::code).unwrap_or(0));
        }
        hasher.update_u8(self.side_to_move as u8);
        hasher.update_u8(self.castling.bits());
        hasher.update_opt_u8(self.en_passant.map(|sq| sq.index() as u8));
        hasher.finalize()
    }

    /// Apply a legal move, returning the resulting board.
    ///
    /// The move must match an entry of `legal_moves(mv.origin)`; promotion
    /// moves must name the piece to promote to.
    pub fn apply_move(&self, mv: Move) -> Result<Board, MoveError> {
        let candidate = self
            .legal_moves(mv.origin)
            .into_iter()
            .find(|c| c.dest == mv.dest)
            .ok_or(MoveError::Illegal { mv })?;

        let resolved = if candidate.is_promotion() {
            let kind = mv.promotion.ok_or(MoveError::PromotionRequired { mv })?;
            if !kind.is_promotion_target() {
                return Err(MoveError::InvalidPromotion { mv, kind });
            }
            let mut resolved = candidate.promoting_to(kind);
            self.annotate_check(&mut resolved);
            resolved
        } else {
            // A promotion letter on an ordinary move is ignored.
            candidate
        };

        let mut next = self.make(resolved);
        next.history.push(next.signature());
        Ok(next)
    }

    /// Move pieces and update clocks without legality checks or history.
    ///
    /// Promotion moves without a piece kind promote to a queen; that only
    /// happens while probing king safety.
    pub(super) fn make(&self, mv: Move) -> Board {
        let mut next = self.clone();
        let Some(piece) = self.piece_at(mv.origin) else {
            return next;
        };
        let mover = piece.side;
        let mut captured = self.piece_at(mv.dest).is_some();

        next.squares[mv.origin.index()] = None;

        if mv.flags.contains(MoveFlags::EN_PASSANT) {
            let enemy_pawn = Piece::new(PieceKind::Pawn, mover.opponent());
            if let Some(victim) = Square::new(mv.dest.file(), mv.origin.rank()) {
                if next.squares[victim.index()] == Some(enemy_pawn) {
                    next.squares[victim.index()] = None;
                    captured = true;
                }
            }
        }

        for (flag, wing) in [
            (MoveFlags::CASTLE_KINGSIDE, CastleWing::Kingside),
            (MoveFlags::CASTLE_QUEENSIDE, CastleWing::Queenside),
        ] {
            if mv.flags.contains(flag) {
                let rank = mover.home_rank();
                let rook_to = if wing == CastleWing::Kingside { 5 } else { 3 };
                if let (Some(from), Some(to)) = (Square::new(wing.rook_file(), rank), Square::new(rook_to, rank)) {
                    next.squares[to.index()] = next.squares[from.index()].take();
                }
            }
        }

        let placed = if piece.kind == PieceKind::Pawn && mv.dest.rank() == mover.promotion_rank() {
            Piece::new(mv.promotion.unwrap_or(PieceKind::Queen), mover)
        } else {
            piece
        };
        next.squares[mv.dest.index()] = Some(placed);

        next.castling.touch(mv.origin);
        next.castling.touch(mv.dest);

        let double_step = piece.kind == PieceKind::Pawn && mv.origin.rank().abs_diff(mv.dest.rank()) == 2;
        next.en_passant = if double_step {
            Square::new(mv.origin.file(), (mv.origin.rank() + mv.dest.rank()) / 2)
        } else {
            None
        };

        if piece.kind == PieceKind::Pawn || captured {
            next.halfmove_clock = 0;
        } else {
            next.halfmove_clock += 1;
        }
        if mover == Side::Black {
            next.fullmove_number += 1;
        }
        next.side_to_move = mover.opponent();
        next.last_move = Some(mv);
        next
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Board {
    /// ASCII diagram, rank 8 at the top.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8u8).rev() {
            write!(f, "{} ", rank + 1)?;
            for file in 0..8u8 {
                let c = Square::new(file, rank)
                    .and_then(|sq| self.piece_at(sq))
                    .map(Piece::fen_char)
                    .unwrap_or('.');
                write!(f, " {c}")?;
            }
            writeln!(f)?;
        }
        write!(f, "   a b c d e f g h")
    }
}

/// Rejected move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    /// Not among the legal moves from its origin.
    #[error("illegal move {mv}")]
    Illegal {
        /// The rejected move.
        mv: Move,
    },

    /// Pawn reaches the last rank but no piece was chosen.
    #[error("move {mv} needs a promotion piece")]
    PromotionRequired {
        /// The rejected move.
        mv: Move,
    },

    /// Promotion to a king or pawn.
    #[error("cannot promote to {kind:?} in {mv}")]
    InvalidPromotion {
        /// The rejected move.
        mv: Move,
        /// The requested piece.
        kind: PieceKind,
    },
}
