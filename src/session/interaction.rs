//! Interaction Controller
//!
//! Turns square selections into candidate moves. Reads the active session
//! and its board; never mutates them. A completed move is handed back to
//! the caller, which routes it through the session machine.
//!
//! Marks are a separate cosmetic layer with no effect on play.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::core::square::Square;
use crate::game::moves::Move;
use crate::game::piece::{PieceKind, Side};
use crate::session::machine::GameSession;

// =============================================================================
// ERRORS
// =============================================================================

/// Local, advisory rejection. Never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// No game in progress.
    #[error("no game in progress")]
    NotActive,

    /// Opponent's turn.
    #[error("it is not your turn")]
    NotYourTurn,

    /// Broker link is down.
    #[error("Not connected to server")]
    NotConnected,

    /// Origin does not hold one of our pieces.
    #[error("no piece of yours on {0}")]
    NotYourPiece(Square),

    /// Our piece has nowhere to go.
    #[error("the piece on {0} has no legal moves")]
    NoLegalMoves(Square),

    /// Destination not reachable from the selected origin.
    #[error("cannot move to {0}")]
    IllegalDestination(Square),

    /// A promotion choice is outstanding.
    #[error("choose a promotion piece first")]
    PromotionPending,

    /// Promotion chosen with nothing pending.
    #[error("no promotion pending")]
    NoPendingPromotion,

    /// Promotion to a king or pawn.
    #[error("cannot promote to {0:?}")]
    InvalidPromotion(PieceKind),

    /// Action not available in the current session state.
    #[error("cannot {action} while {state}")]
    NotAllowed {
        /// What was attempted.
        action: &'static str,
        /// Session state name.
        state: &'static str,
    },
}

// =============================================================================
// SELECTION STATE
// =============================================================================

/// Promotion awaiting a piece choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingPromotion {
    /// Pawn's square.
    pub origin: Square,
    /// Last-rank square.
    pub dest: Square,
}

/// Transient selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Selection {
    #[default]
    Empty,
    Origin {
        square: Square,
        options: Vec<Move>,
    },
    Promotion(PendingPromotion),
}

/// Result of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Origin chosen; options are highlighted.
    Selected(Square),
    /// Selection cleared by clicking the origin again.
    Deselected,
    /// A fully specified move, ready to submit.
    Completed(Move),
    /// Waiting for [`InteractionController::choose_promotion`].
    AwaitingPromotion(PendingPromotion),
}

/// How an option square should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    /// Empty destination.
    Quiet,
    /// Destination captures.
    Capture,
}

/// Derived highlight state for a renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Highlights {
    /// Selected origin.
    pub origin: Option<Square>,
    /// Reachable destinations.
    pub options: BTreeMap<Square, OptionKind>,
    /// Promotion awaiting a choice.
    pub pending_promotion: Option<PendingPromotion>,
    /// Squares of the last applied move, either side.
    pub last_move: Option<(Square, Square)>,
    /// King of the side to move, when in check.
    pub check: Option<Square>,
    /// Cosmetic marks.
    pub marks: BTreeSet<Square>,
}

/// Selection state machine plus marks.
#[derive(Debug, Clone, Default)]
pub struct InteractionController {
    selection: Selection,
    marks: BTreeSet<Square>,
}

impl InteractionController {
    /// Create with nothing selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Primary selection on `square`.
    ///
    /// Rejections leave the selection untouched, except a click on an
    /// unreachable square which drops the current origin.
    pub fn select(&mut self, session: Option<&GameSession>, square: Square) -> Result<SelectOutcome, ValidationError> {
        let session = session.ok_or(ValidationError::NotActive)?;
        if !session.is_local_turn() {
            return Err(ValidationError::NotYourTurn);
        }

        match &self.selection {
            Selection::Promotion(_) => Err(ValidationError::PromotionPending),

            Selection::Origin { square: origin, options } => {
                let origin = *origin;
                if square == origin {
                    self.selection = Selection::Empty;
                    return Ok(SelectOutcome::Deselected);
                }

                if let Some(mv) = options.iter().find(|mv| mv.dest == square).copied() {
                    self.marks.clear();
                    if mv.is_promotion() {
                        let pending = PendingPromotion { origin, dest: square };
                        self.selection = Selection::Promotion(pending);
                        return Ok(SelectOutcome::AwaitingPromotion(pending));
                    }
                    self.selection = Selection::Empty;
                    return Ok(SelectOutcome::Completed(mv));
                }

                if owns(session, square) {
                    return self.pick_origin(session, square);
                }

                self.selection = Selection::Empty;
                Err(ValidationError::IllegalDestination(square))
            }

            Selection::Empty => self.pick_origin(session, square),
        }
    }

    fn pick_origin(&mut self, session: &GameSession, square: Square) -> Result<SelectOutcome, ValidationError> {
        if !owns(session, square) {
            return Err(ValidationError::NotYourPiece(square));
        }
        let options = session.board.legal_moves(square);
        if options.is_empty() {
            return Err(ValidationError::NoLegalMoves(square));
        }
        self.marks.clear();
        self.selection = Selection::Origin { square, options };
        Ok(SelectOutcome::Selected(square))
    }

    /// Resolve the pending promotion.
    pub fn choose_promotion(&mut self, kind: PieceKind) -> Result<Move, ValidationError> {
        let Selection::Promotion(pending) = self.selection else {
            return Err(ValidationError::NoPendingPromotion);
        };
        if !kind.is_promotion_target() {
            return Err(ValidationError::InvalidPromotion(kind));
        }
        self.selection = Selection::Empty;
        Ok(Move::new(pending.origin, pending.dest, Some(kind)))
    }

    /// Discard the pending promotion.
    pub fn cancel_promotion(&mut self) -> Result<(), ValidationError> {
        if !matches!(self.selection, Selection::Promotion(_)) {
            return Err(ValidationError::NoPendingPromotion);
        }
        self.selection = Selection::Empty;
        Ok(())
    }

    /// Pending promotion, if any.
    pub fn pending_promotion(&self) -> Option<PendingPromotion> {
        match self.selection {
            Selection::Promotion(pending) => Some(pending),
            _ => None,
        }
    }

    /// Selected origin, if any.
    pub fn origin(&self) -> Option<Square> {
        match &self.selection {
            Selection::Origin { square, .. } => Some(*square),
            Selection::Promotion(pending) => Some(pending.origin),
            Selection::Empty => None,
        }
    }

    /// Toggle a cosmetic mark. Returns whether the square is now marked.
    pub fn toggle_mark(&mut self, square: Square) -> bool {
        if self.marks.remove(&square) {
            false
        } else {
            self.marks.insert(square);
            true
        }
    }

    /// Current marks.
    pub fn marks(&self) -> &BTreeSet<Square> {
        &self.marks
    }

    /// Drop the selection. Marks stay.
    pub fn clear_selection(&mut self) {
        self.selection = Selection::Empty;
    }

    /// Drop selection and marks.
    pub fn reset(&mut self) {
        self.selection = Selection::Empty;
        self.marks.clear();
    }

    /// Project the view-level highlight state.
    pub fn highlights(&self, session: Option<&GameSession>) -> Highlights {
        let mut highlights = Highlights {
            origin: self.origin(),
            pending_promotion: self.pending_promotion(),
            marks: self.marks.clone(),
            ..Highlights::default()
        };

        if let Selection::Origin { options, .. } = &self.selection {
            for mv in options {
                let kind = if mv.is_capture() { OptionKind::Capture } else { OptionKind::Quiet };
                highlights.options.insert(mv.dest, kind);
            }
        }

        if let Some(session) = session {
            let board = &session.board;
            highlights.last_move = board.last_move().map(|mv| (mv.origin, mv.dest));
            let side = board.side_to_move();
            if board.in_check(side) {
                highlights.check = board.king_square(side);
            }
        }
        highlights
    }
}

fn owns(session: &GameSession, square: Square) -> bool {
    let side: Side = session.color;
    session.board.piece_at(square).map(|p| p.side) == Some(side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{ParticipantId, SessionId};
    use crate::core::square::sq;
    use crate::game::board::Board;
    use crate::game::piece::Piece;

    fn session(board: Board, color: Side) -> GameSession {
        GameSession {
            session_id: SessionId::new("g1"),
            local: ParticipantId::new("u1"),
            opponent: "bob".into(),
            color,
            board,
        }
    }

    #[test]
    fn test_two_phase_selection() {
        let game = session(Board::new(), Side::White);
        let mut ctl = InteractionController::new();

        assert_eq!(ctl.select(Some(&game), sq("e2")), Ok(SelectOutcome::Selected(sq("e2"))));
        let hl = ctl.highlights(Some(&game));
        assert_eq!(hl.origin, Some(sq("e2")));
        assert_eq!(hl.options.len(), 2);
        assert_eq!(hl.options.get(&sq("e4")), Some(&OptionKind::Quiet));

        match ctl.select(Some(&game), sq("e4")) {
            Ok(SelectOutcome::Completed(mv)) => assert_eq!(mv, Move::new(sq("e2"), sq("e4"), None)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ctl.origin(), None);
        assert!(ctl.highlights(Some(&game)).options.is_empty());
    }

    #[test]
    fn test_rejections_do_not_mutate() {
        let mut ctl = InteractionController::new();
        assert_eq!(ctl.select(None, sq("e2")), Err(ValidationError::NotActive));

        let theirs = session(Board::new(), Side::Black);
        assert_eq!(ctl.select(Some(&theirs), sq("e7")), Err(ValidationError::NotYourTurn));
        assert_eq!(ctl.origin(), None);

        let game = session(Board::new(), Side::White);
        assert_eq!(ctl.select(Some(&game), sq("e7")), Err(ValidationError::NotYourPiece(sq("e7"))));
        assert_eq!(ctl.select(Some(&game), sq("e4")), Err(ValidationError::NotYourPiece(sq("e4"))));
        assert_eq!(ctl.select(Some(&game), sq("a1")), Err(ValidationError::NoLegalMoves(sq("a1"))));
        assert_eq!(ctl.origin(), None);
    }

    #[test]
    fn test_reselect_and_deselect() {
        let game = session(Board::new(), Side::White);
        let mut ctl = InteractionController::new();
        ctl.select(Some(&game), sq("e2")).unwrap();
        assert_eq!(ctl.select(Some(&game), sq("g1")), Ok(SelectOutcome::Selected(sq("g1"))));
        assert_eq!(ctl.select(Some(&game), sq("g1")), Ok(SelectOutcome::Deselected));

        ctl.select(Some(&game), sq("e2")).unwrap();
        assert_eq!(
            ctl.select(Some(&game), sq("e5")),
            Err(ValidationError::IllegalDestination(sq("e5")))
        );
        assert_eq!(ctl.origin(), None);
    }

    #[test]
    fn test_promotion_flow() {
        let board = Board::from_fen("4k3/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let game = session(board, Side::White);
        let mut ctl = InteractionController::new();

        ctl.select(Some(&game), sq("a7")).unwrap();
        let pending = PendingPromotion { origin: sq("a7"), dest: sq("a8") };
        assert_eq!(ctl.select(Some(&game), sq("a8")), Ok(SelectOutcome::AwaitingPromotion(pending)));
        assert_eq!(ctl.select(Some(&game), sq("e1")), Err(ValidationError::PromotionPending));
        assert_eq!(ctl.choose_promotion(PieceKind::King), Err(ValidationError::InvalidPromotion(PieceKind::King)));

        let mv = ctl.choose_promotion(PieceKind::Queen).unwrap();
        assert_eq!(mv.promotion, Some(PieceKind::Queen));
        let next = game.board.apply_move(mv).unwrap();
        assert_eq!(next.piece_at(sq("a8")), Some(Piece::new(PieceKind::Queen, Side::White)));
        assert_eq!(ctl.choose_promotion(PieceKind::Queen), Err(ValidationError::NoPendingPromotion));
    }

    #[test]
    fn test_cancel_promotion() {
        let board = Board::from_fen("4k3/P7/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let game = session(board, Side::White);
        let mut ctl = InteractionController::new();
        assert_eq!(ctl.cancel_promotion(), Err(ValidationError::NoPendingPromotion));
        ctl.select(Some(&game), sq("a7")).unwrap();
        ctl.select(Some(&game), sq("a8")).unwrap();
        ctl.cancel_promotion().unwrap();
        assert_eq!(ctl.pending_promotion(), None);
        assert_eq!(ctl.origin(), None);
    }

    #[test]
    fn test_marks_are_independent() {
        let game = session(Board::new(), Side::White);
        let mut ctl = InteractionController::new();
        assert!(ctl.toggle_mark(sq("d5")));
        assert!(ctl.toggle_mark(sq("f5")));
        assert!(!ctl.toggle_mark(sq("f5")));
        assert_eq!(ctl.marks().len(), 1);

        // A rejected selection keeps marks; an accepted one clears them.
        let _ = ctl.select(Some(&game), sq("d7"));
        assert_eq!(ctl.marks().len(), 1);
        ctl.select(Some(&game), sq("d2")).unwrap();
        assert!(ctl.marks().is_empty());
    }

    #[test]
    fn test_highlights_show_captures_last_move_and_check() {
        let board = Board::from_fen("4k3/8/8/3p4/4P3/8/8/4K2R w K - 0 1").unwrap();
        let board = board.apply_move(Move::new(sq("h1"), sq("h8"), None)).unwrap();
        let game = session(board, Side::Black);
        let mut ctl = InteractionController::new();

        let hl = ctl.highlights(Some(&game));
        assert_eq!(hl.last_move, Some((sq("h1"), sq("h8"))));
        assert_eq!(hl.check, Some(sq("e8")));

        let board = Board::from_fen("4k3/8/8/3p4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let game = session(board, Side::White);
        ctl.select(Some(&game), sq("e4")).unwrap();
        let hl = ctl.highlights(Some(&game));
        assert_eq!(hl.options.get(&sq("d5")), Some(&OptionKind::Capture));
        assert_eq!(hl.options.get(&sq("e5")), Some(&OptionKind::Quiet));
        assert_eq!(hl.check, None);
    }
}
