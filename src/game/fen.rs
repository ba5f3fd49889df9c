//! FEN Import and Export

use crate::core::square::{Square, BOARD_SQUARES};
use crate::game::board::{Board, CastleWing, CastlingRights};
use crate::game::piece::{Piece, PieceKind, Side};

/// Malformed or impossible FEN.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    /// Wrong number of space-separated fields.
    #[error("expected 6 fields, found {0}")]
    FieldCount(usize),

    /// Placement field does not describe 8 ranks of 8 files.
    #[error("bad placement: {0}")]
    Placement(String),

    /// Side to move is not `w` or `b`.
    #[error("bad side to move: {0}")]
    SideToMove(String),

    /// Unknown castling letter.
    #[error("bad castling field: {0}")]
    Castling(String),

    /// En-passant field is not `-` or a square.
    #[error("bad en-passant square: {0}")]
    EnPassant(String),

    /// Clock field is not a number.
    #[error("bad move counter: {0}")]
    Counter(String),

    /// A side has zero or several kings.
    #[error("{side} must have exactly one king, found {count}")]
    KingCount {
        /// Offending side.
        side: Side,
        /// Kings found.
        count: usize,
    },
}

impl Board {
    /// Parse Forsyth–Edwards Notation.
    pub fn from_fen(fen: &str) -> Result<Board, FenError> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(FenError::FieldCount(fields.len()));
        }

        let squares = parse_placement(fields[0])?;

        let side_to_move = match fields[1] {
            "w" => Side::White,
            "b" => Side::Black,
            other => return Err(FenError::SideToMove(other.to_string())),
        };

        let mut castling = CastlingRights::NONE;
        if fields[2] != "-" {
            for c in fields[2].chars() {
                let (side, wing) = match c {
                    'K' => (Side::White, CastleWing::Kingside),
                    'Q' => (Side::White, CastleWing::Queenside),
                    'k' => (Side::Black, CastleWing::Kingside),
                    'q' => (Side::Black, CastleWing::Queenside),
                    _ => return Err(FenError::Castling(fields[2].to_string())),
                };
                castling.grant(side, wing);
            }
        }

        let en_passant = match fields[3] {
            "-" => None,
            name => {
                let square = Square::parse(name).ok_or_else(|| FenError::EnPassant(name.to_string()))?;
                if !en_passant_consistent(&squares, side_to_move, square) {
                    return Err(FenError::EnPassant(name.to_string()));
                }
                Some(square)
            }
        };

        let halfmove_clock = fields[4]
            .parse()
            .map_err(|_| FenError::Counter(fields[4].to_string()))?;
        let fullmove_number = fields[5]
            .parse()
            .map_err(|_| FenError::Counter(fields[5].to_string()))?;

        for side in Side::ALL {
            let king = Piece::new(PieceKind::King, side);
            let count = squares.iter().filter(|&&p| p == Some(king)).count();
            if count != 1 {
                return Err(FenError::KingCount { side, count });
            }
        }

        Ok(Board::from_parts(
            squares,
            side_to_move,
            castling,
            en_passant,
            halfmove_clock,
            fullmove_number,
        ))
    }

    /// Render as Forsyth–Edwards Notation.
    pub fn to_fen(&self) -> String {
        let mut out = String::new();
        for rank in (0..8u8).rev() {
            let mut empty = 0;
            for file in 0..8u8 {
                match Square::new(file, rank).and_then(|sq| self.piece_at(sq)) {
                    Some(piece) => {
                        if empty > 0 {
                            out.push_str(&empty.to_string());
                            empty = 0;
                        }
                        out.push(piece.fen_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                out.push_str(&empty.to_string());
            }
            if rank > 0 {
                out.push('/');
            }
        }

        out.push(' ');
        out.push(match self.side_to_move {
            Side::White => 'w',
            Side::Black => 'b',
        });

        out.push(' ');
        let rights = [
            (Side::White, CastleWing::Kingside, 'K'),
            (Side::White, CastleWing::Queenside, 'Q'),
            (Side::Black, CastleWing::Kingside, 'k'),
            (Side::Black, CastleWing::Queenside, 'q'),
        ];
        let castling: String = rights
            .iter()
            .filter(|(side, wing, _)| self.castling.has(*side, *wing))
            .map(|(_, _, c)| *c)
            .collect();
        out.push_str(if castling.is_empty() { "-" } else { &castling });

        out.push(' ');
        match self.en_passant {
            Some(sq) => out.push_str(&sq.to_string()),
            None => out.push('-'),
        }

        out.push_str(&format!(" {} {}", self.halfmove_clock, self.fullmove_number));
        out
    }
}

/// The target must sit behind an enemy pawn that just made a double step:
/// rank 6 with White to move (rank 3 with Black), the pawn in front of it
/// and its start square empty.
fn en_passant_consistent(squares: &[Option<Piece>; BOARD_SQUARES], side_to_move: Side, target: Square) -> bool {
    let mover = side_to_move.opponent();
    let target_rank = (mover.pawn_rank() as i8 + mover.forward()) as u8;
    if target.rank() != target_rank || squares[target.index()].is_some() {
        return false;
    }
    let pawn = target.offset(0, mover.forward()).and_then(|sq| squares[sq.index()]);
    let start_empty = target
        .offset(0, -mover.forward())
        .is_some_and(|sq| squares[sq.index()].is_none());
    pawn == Some(Piece::new(PieceKind::Pawn, mover)) && start_empty
}

fn parse_placement(field: &str) -> Result<[Option<Piece>; BOARD_SQUARES], FenError> {
    let bad = || FenError::Placement(field.to_string());
    let ranks: Vec<&str> = field.split('/').collect();
    if ranks.len() != 8 {
        return Err(bad());
    }

    let mut squares = [None; BOARD_SQUARES];
    for (i, text) in ranks.iter().enumerate() {
        let rank = 7 - i as u8;
        let mut file = 0u8;
        for c in text.chars() {
            if let Some(skip) = c.to_digit(10) {
                if skip == 0 || skip > 8 {
                    return Err(bad());
                }
                file += skip as u8;
            } else {
                let piece = Piece::from_fen_char(c).ok_or_else(bad)?;
                let square = Square::new(file, rank).ok_or_else(bad)?;
                squares[square.index()] = Some(piece);
                file += 1;
            }
            if file > 8 {
                return Err(bad());
            }
        }
        if file != 8 {
            return Err(bad());
        }
    }
    Ok(squares)
}
