//! Move Generation
//!
//! Pseudo-legal generation per piece, filtered by king safety.

use crate::core::square::Square;
use crate::game::board::{Board, CastleWing};
use crate::game::moves::{Move, MoveFlags};
use crate::game::piece::{Piece, PieceKind, Side};

const KNIGHT_STEPS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

const KING_STEPS: [(i8, i8); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

const ORTHOGONAL: [(i8, i8); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];
const DIAGONAL: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];

impl Board {
    /// Legal moves of the piece on `square`, ordered by destination.
    ///
    /// Empty when the square is empty, holds a piece of the side not to
    /// move, or the piece has nowhere to go. Promotion destinations appear
    /// once, flagged [`MoveFlags::PROMOTION`] with no piece chosen.
    pub fn legal_moves(&self, square: Square) -> Vec<Move> {
        let Some(piece) = self.piece_at(square) else {
            return Vec::new();
        };
        if piece.side != self.side_to_move {
            return Vec::new();
        }

        let mut moves: Vec<Move> = self
            .pseudo_moves(square, piece)
            .into_iter()
            .filter(|&mv| !self.make(mv).in_check(piece.side))
            .collect();

        for mv in &mut moves {
            if !mv.is_promotion() {
                self.annotate_check(mv);
            }
        }

        moves.sort_by_key(|m| m.dest);
        moves
    }

    /// Every legal move for the side to move.
    pub fn all_legal_moves(&self) -> Vec<Move> {
        Square::all().flat_map(|sq| self.legal_moves(sq)).collect()
    }

    /// Whether the side to move can move at all.
    pub fn has_any_legal_move(&self) -> bool {
        let side = self.side_to_move;
        Square::all().any(|sq| match self.piece_at(sq) {
            Some(piece) if piece.side == side => self
                .pseudo_moves(sq, piece)
                .into_iter()
                .any(|mv| !self.make(mv).in_check(side)),
            _ => false,
        })
    }

    /// Whether `side`'s king is attacked.
    pub fn in_check(&self, side: Side) -> bool {
        self.king_square(side)
            .map(|king| self.is_attacked(king, side.opponent()))
            .unwrap_or(false)
    }

    /// Set check / checkmate flags by playing the move.
    pub(super) fn annotate_check(&self, mv: &mut Move) {
        let next = self.make(*mv);
        let defender = self.side_to_move.opponent();
        if next.in_check(defender) {
            mv.flags.insert(MoveFlags::CHECK);
            if !next.has_any_legal_move() {
                mv.flags.insert(MoveFlags::CHECKMATE);
            }
        }
    }

    /// Whether any piece of `attacker` attacks `target`.
    pub fn is_attacked(&self, target: Square, attacker: Side) -> bool {
        let holds = |sq: Option<Square>, kind: PieceKind| {
            sq.and_then(|s| self.piece_at(s)) == Some(Piece::new(kind, attacker))
        };

        // A pawn of `attacker` attacks diagonally forward, so look backward.
        let back = -attacker.forward();
        if holds(target.offset(-1, back), PieceKind::Pawn) || holds(target.offset(1, back), PieceKind::Pawn) {
            return true;
        }
        if KNIGHT_STEPS
            .iter()
            .any(|&(df, dr)| holds(target.offset(df, dr), PieceKind::Knight))
        {
            return true;
        }
        if KING_STEPS
            .iter()
            .any(|&(df, dr)| holds(target.offset(df, dr), PieceKind::King))
        {
            return true;
        }

        let slider_hits = |dirs: &[(i8, i8)], kinds: [PieceKind; 2]| {
            dirs.iter().any(|&(df, dr)| {
                let mut cursor = target.offset(df, dr);
                while let Some(sq) = cursor {
                    if let Some(piece) = self.piece_at(sq) {
                        return piece.side == attacker && kinds.contains(&piece.kind);
                    }
                    cursor = sq.offset(df, dr);
                }
                false
            })
        };

        slider_hits(&ORTHOGONAL, [PieceKind::Rook, PieceKind::Queen])
            || slider_hits(&DIAGONAL, [PieceKind::Bishop, PieceKind::Queen])
    }

    /// Moves obeying piece movement, ignoring own-king safety.
    fn pseudo_moves(&self, from: Square, piece: Piece) -> Vec<Move> {
        let mut moves = Vec::new();
        match piece.kind {
            PieceKind::Pawn => self.pawn_moves(from, piece.side, &mut moves),
            PieceKind::Knight => self.step_moves(from, piece.side, &KNIGHT_STEPS, &mut moves),
            PieceKind::Bishop => self.slide_moves(from, piece.side, &DIAGONAL, &mut moves),
            PieceKind::Rook => self.slide_moves(from, piece.side, &ORTHOGONAL, &mut moves),
            PieceKind::Queen => {
                self.slide_moves(from, piece.side, &ORTHOGONAL, &mut moves);
                self.slide_moves(from, piece.side, &DIAGONAL, &mut moves);
            }
            PieceKind::King => {
                self.step_moves(from, piece.side, &KING_STEPS, &mut moves);
                self.castle_moves(from, piece.side, &mut moves);
            }
        }
        moves
    }

    fn push_target(&self, from: Square, to: Square, side: Side, moves: &mut Vec<Move>) -> bool {
        match self.piece_at(to) {
            None => {
                moves.push(Move::new(from, to, None));
                true
            }
            Some(other) if other.side != side => {
                let mut mv = Move::new(from, to, None);
                mv.flags.insert(MoveFlags::CAPTURE);
                moves.push(mv);
                false
            }
            Some(_) => false,
        }
    }

    fn step_moves(&self, from: Square, side: Side, steps: &[(i8, i8)], moves: &mut Vec<Move>) {
        for &(df, dr) in steps {
            if let Some(to) = from.offset(df, dr) {
                self.push_target(from, to, side, moves);
            }
        }
    }

    fn slide_moves(&self, from: Square, side: Side, dirs: &[(i8, i8)], moves: &mut Vec<Move>) {
        for &(df, dr) in dirs {
            let mut cursor = from.offset(df, dr);
            while let Some(to) = cursor {
                if !self.push_target(from, to, side, moves) {
                    break;
                }
                cursor = to.offset(df, dr);
            }
        }
    }

    fn pawn_moves(&self, from: Square, side: Side, moves: &mut Vec<Move>) {
        let forward = side.forward();
        let mark_promotion = |mut mv: Move| {
            if mv.dest.rank() == side.promotion_rank() {
                mv.flags.insert(MoveFlags::PROMOTION);
            }
            mv
        };

        if let Some(one) = from.offset(0, forward) {
            if self.piece_at(one).is_none() {
                moves.push(mark_promotion(Move::new(from, one, None)));
                if from.rank() == side.pawn_rank() {
                    if let Some(two) = one.offset(0, forward) {
                        if self.piece_at(two).is_none() {
                            moves.push(Move::new(from, two, None));
                        }
                    }
                }
            }
        }

        for df in [-1, 1] {
            let Some(to) = from.offset(df, forward) else {
                continue;
            };
            match self.piece_at(to) {
                Some(target) if target.side != side => {
                    let mut mv = Move::new(from, to, None);
                    mv.flags.insert(MoveFlags::CAPTURE);
                    moves.push(mark_promotion(mv));
                }
                None if self.en_passant == Some(to)
                    && to.offset(0, -forward).and_then(|v| self.piece_at(v))
                        == Some(Piece::new(PieceKind::Pawn, side.opponent())) =>
                {
                    let mut mv = Move::new(from, to, None);
                    mv.flags.insert(MoveFlags::CAPTURE.with(MoveFlags::EN_PASSANT));
                    moves.push(mv);
                }
                _ => {}
            }
        }
    }

    fn castle_moves(&self, from: Square, side: Side, moves: &mut Vec<Move>) {
        let rank = side.home_rank();
        if from.rank() != rank || from.file() != 4 {
            return;
        }
        let enemy = side.opponent();
        if self.is_attacked(from, enemy) {
            return;
        }

        for (wing, flag, empty_files, safe_files, king_to) in [
            (CastleWing::Kingside, MoveFlags::CASTLE_KINGSIDE, &[5u8, 6][..], &[5u8, 6][..], 6u8),
            (CastleWing::Queenside, MoveFlags::CASTLE_QUEENSIDE, &[1u8, 2, 3][..], &[2u8, 3][..], 2u8),
        ] {
            if !self.castling.has(side, wing) {
                continue;
            }
            let rook_home = Square::new(wing.rook_file(), rank);
            if rook_home.and_then(|sq| self.piece_at(sq)) != Some(Piece::new(PieceKind::Rook, side)) {
                continue;
            }
            let clear = empty_files
                .iter()
                .filter_map(|&f| Square::new(f, rank))
                .all(|sq| self.piece_at(sq).is_none());
            let safe = safe_files
                .iter()
                .filter_map(|&f| Square::new(f, rank))
                .all(|sq| !self.is_attacked(sq, enemy));
            if clear && safe {
                if let Some(to) = Square::new(king_to, rank) {
                    let mut mv = Move::new(from, to, None);
                    mv.flags.insert(flag);
                    moves.push(mv);
                }
            }
        }
    }
}
