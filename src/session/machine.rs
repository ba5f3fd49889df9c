//! Session State Machine
//!
//! One exhaustive reducer, [`reduce`], maps `(state, event)` to the next
//! state plus the intents to publish and the notices to show. States are
//! immutable snapshots; [`SessionMachine`] swaps an `Arc` on every accepted
//! transition so readers never observe a half-applied move.
//!
//! ```text
//!   Idle ──find──▶ Searching ──GAME_STARTED──▶ Active ──GAME_ENDED / resign──▶ Ended
//!    ▲               │                          │  ▲                              │
//!    └────cancel─────┘                          └──┘ move (local / MOVE_MADE)     │
//!    ▲                                                                            │
//!    └──────────────────────────────acknowledge──────────────────────────────────┘
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::hash::short_hex;
use crate::core::ids::{LocalIdentity, ParticipantId, SessionId};
use crate::error::SyncError;
use crate::game::board::Board;
use crate::game::moves::Move;
use crate::game::piece::Side;
use crate::network::protocol::{
    GameUpdate, Intent, MoveIntent, ParticipantRef, ProtocolError, ResignIntent, WireMove,
};
use crate::session::interaction::ValidationError;

/// Recorded faults kept for inspection.
pub const MAX_RECORDED_FAULTS: usize = 64;

// =============================================================================
// STATE
// =============================================================================

/// The game in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    /// Broker-assigned session id.
    pub session_id: SessionId,
    /// Local participant.
    pub local: ParticipantId,
    /// Opponent's display name.
    pub opponent: String,
    /// Side the local participant plays.
    pub color: Side,
    /// Current position. Owned by the session.
    pub board: Board,
}

impl GameSession {
    /// Fresh session on the starting position.
    pub fn new(session_id: SessionId, local: ParticipantId, opponent: String, color: Side) -> Self {
        Self {
            session_id,
            local,
            opponent,
            color,
            board: Board::new(),
        }
    }

    /// Whether the local participant is to move.
    pub fn is_local_turn(&self) -> bool {
        self.board.side_to_move() == self.color
    }

    /// Last applied move, either side.
    pub fn last_move(&self) -> Option<Move> {
        self.board.last_move()
    }

    fn with_board(&self, board: Board) -> Self {
        Self {
            board,
            ..self.clone()
        }
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing going on.
    #[default]
    Idle,
    /// Matchmaking requested.
    Searching,
    /// Game in progress.
    Active(GameSession),
    /// Game over, waiting for the user to acknowledge.
    Ended {
        /// Why it ended.
        reason: String,
    },
}

impl SessionState {
    /// State name for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Searching => "searching",
            SessionState::Active(_) => "active",
            SessionState::Ended { .. } => "ended",
        }
    }

    /// The active game, if any.
    pub fn session(&self) -> Option<&GameSession> {
        match self {
            SessionState::Active(session) => Some(session),
            _ => None,
        }
    }
}

// =============================================================================
// EVENTS AND OUTPUT
// =============================================================================

/// Everything that can drive a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// User asks for a game.
    FindGame,
    /// User leaves matchmaking.
    CancelSearch,
    /// Inbound game update.
    Remote(GameUpdate),
    /// User completed a move.
    LocalMove(Move),
    /// User resigns.
    Resign,
    /// User dismissed the end-of-game notice.
    Acknowledge,
}

impl SessionEvent {
    /// Event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::FindGame => "find",
            SessionEvent::CancelSearch => "cancel",
            SessionEvent::Remote(update) => update.tag(),
            SessionEvent::LocalMove(_) => "local_move",
            SessionEvent::Resign => "resign",
            SessionEvent::Acknowledge => "acknowledge",
        }
    }
}

/// Notice severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Something good happened.
    Success,
    /// Neutral information.
    Info,
    /// Transient, auto-dismissing progress notice.
    Loading,
    /// Something failed.
    Error,
}

/// User-facing notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Text to show.
    pub text: String,
}

impl Notice {
    /// Success notice.
    pub fn success(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, text: text.into() }
    }

    /// Info notice.
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, text: text.into() }
    }

    /// Loading notice.
    pub fn loading(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Loading, text: text.into() }
    }

    /// Error notice.
    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into() }
    }
}

/// Accepted transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Next state.
    pub state: SessionState,
    /// Intents to publish, in order.
    pub intents: Vec<Intent>,
    /// Notices to show.
    pub notices: Vec<Notice>,
}

impl Transition {
    fn to(state: SessionState) -> Self {
        Self {
            state,
            intents: Vec::new(),
            notices: Vec::new(),
        }
    }

    fn publish(mut self, intent: Intent) -> Self {
        self.intents.push(intent);
        self
    }

    fn notify(mut self, notice: Notice) -> Self {
        self.notices.push(notice);
        self
    }
}

/// What the reducer needs besides the state.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    /// Local participant.
    pub identity: &'a LocalIdentity,
    /// Whether the broker link is up.
    pub connected: bool,
}

// =============================================================================
// REDUCER
// =============================================================================

/// Compute the transition for `event` in `state`.
///
/// Pure: no I/O, no clock. Rejections leave the caller's state untouched.
pub fn reduce(state: &SessionState, ctx: Context<'_>, event: SessionEvent) -> Result<Transition, SyncError> {
    let me = || ParticipantRef {
        participant_id: ctx.identity.id.clone(),
    };
    let not_allowed = |action: &'static str| ValidationError::NotAllowed {
        action,
        state: state.name(),
    };

    match (state, event) {
        // ---- matchmaking -------------------------------------------------
        (SessionState::Idle | SessionState::Ended { .. }, SessionEvent::FindGame) => {
            if !ctx.connected {
                return Err(ValidationError::NotConnected.into());
            }
            Ok(Transition::to(SessionState::Searching)
                .publish(Intent::FindGame(me()))
                .notify(Notice::loading("Finding a game...")))
        }
        (_, SessionEvent::FindGame) => Err(not_allowed("find a game").into()),

        (SessionState::Searching, SessionEvent::CancelSearch) => {
            // Advisory: leave the queue locally even if the broker never hears.
            let transition = Transition::to(SessionState::Idle).notify(Notice::info("Search cancelled"));
            Ok(if ctx.connected {
                transition.publish(Intent::CancelSearch(me()))
            } else {
                transition
            })
        }
        (_, SessionEvent::CancelSearch) => Err(not_allowed("cancel a search").into()),

        // ---- game start --------------------------------------------------
        (
            SessionState::Searching | SessionState::Idle,
            SessionEvent::Remote(GameUpdate::GameStarted {
                session_id,
                opponent,
                is_first_to_move,
            }),
        ) => {
            let color = if is_first_to_move { Side::White } else { Side::Black };
            let text = format!("Game started against {opponent}! You are playing as {color}.");
            let session = GameSession::new(session_id, ctx.identity.id.clone(), opponent, color);
            Ok(Transition::to(SessionState::Active(session)).notify(Notice::success(text)))
        }

        // ---- remote move -------------------------------------------------
        (SessionState::Active(session), SessionEvent::Remote(GameUpdate::MoveMade { session_id, mv })) => {
            check_session(session, session_id.as_ref(), "MOVE_MADE")?;
            let mv = Move::from(mv);
            if session.is_local_turn() {
                return Err(ProtocolError::OutOfTurn(mv).into());
            }
            let board = session
                .board
                .apply_move(mv)
                .map_err(ProtocolError::RejectedMove)?;

            let status = board.terminal_status();
            let mut transition = Transition::to(SessionState::Active(session.with_board(board)));
            if status.is_over() {
                transition = transition.notify(Notice::info(status.describe()));
            }
            Ok(transition)
        }

        // ---- game end ----------------------------------------------------
        (SessionState::Active(session), SessionEvent::Remote(GameUpdate::GameEnded { session_id, reason })) => {
            check_session(session, session_id.as_ref(), "GAME_ENDED")?;
            let text = format!("Game ended: {reason}");
            Ok(Transition::to(SessionState::Ended { reason }).notify(Notice::info(text)))
        }
        // The broker confirms a game we already closed locally.
        (SessionState::Ended { .. }, SessionEvent::Remote(GameUpdate::GameEnded { .. })) => {
            Ok(Transition::to(state.clone()))
        }

        (_, SessionEvent::Remote(update)) => Err(ProtocolError::UnexpectedEvent {
            event: update.tag(),
            state: state.name(),
        }
        .into()),

        // ---- local move --------------------------------------------------
        (SessionState::Active(session), SessionEvent::LocalMove(mv)) => {
            if !ctx.connected {
                return Err(ValidationError::NotConnected.into());
            }
            if !session.is_local_turn() {
                return Err(ValidationError::NotYourTurn.into());
            }
            let board = session.board.apply_move(mv)?;
            let intent = Intent::Move(MoveIntent {
                session_id: session.session_id.clone(),
                participant_id: ctx.identity.id.clone(),
                mv: WireMove::from(mv),
            });
            let status = board.terminal_status();
            let mut transition = Transition::to(SessionState::Active(session.with_board(board))).publish(intent);
            if status.is_over() {
                transition = transition.notify(Notice::info(status.describe()));
            }
            Ok(transition)
        }
        (_, SessionEvent::LocalMove(_)) => Err(ValidationError::NotActive.into()),

        // ---- resignation -------------------------------------------------
        (SessionState::Active(session), SessionEvent::Resign) => {
            if !ctx.connected {
                return Err(ValidationError::NotConnected.into());
            }
            let intent = Intent::Resign(ResignIntent {
                session_id: session.session_id.clone(),
                participant_id: ctx.identity.id.clone(),
            });
            Ok(Transition::to(SessionState::Ended {
                reason: "You resigned the game".to_string(),
            })
            .publish(intent)
            .notify(Notice::info("You resigned the game")))
        }
        (_, SessionEvent::Resign) => Err(ValidationError::NotActive.into()),

        // ---- acknowledge -------------------------------------------------
        (SessionState::Ended { .. }, SessionEvent::Acknowledge) => Ok(Transition::to(SessionState::Idle)),
        (_, SessionEvent::Acknowledge) => Ok(Transition::to(state.clone())),
    }
}

fn check_session(session: &GameSession, got: Option<&SessionId>, event: &'static str) -> Result<(), ProtocolError> {
    match got {
        Some(id) if *id != session.session_id => Err(ProtocolError::StaleSession {
            event,
            expected: session.session_id.clone(),
            got: id.clone(),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// MACHINE
// =============================================================================

/// Output of an accepted transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Effects {
    /// Intents to publish.
    pub intents: Vec<Intent>,
    /// Notices to show.
    pub notices: Vec<Notice>,
}

/// Holds the current snapshot and applies the reducer.
#[derive(Debug, Default)]
pub struct SessionMachine {
    state: Arc<SessionState>,
    faults: Vec<SyncError>,
}

impl SessionMachine {
    /// Start idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    pub fn state(&self) -> Arc<SessionState> {
        Arc::clone(&self.state)
    }

    /// Current snapshot, borrowed.
    pub fn current(&self) -> &SessionState {
        &self.state
    }

    /// Protocol faults seen so far, oldest first.
    pub fn faults(&self) -> &[SyncError] {
        &self.faults
    }

    /// Apply one event. On error the state is unchanged.
    pub fn dispatch(&mut self, ctx: Context<'_>, event: SessionEvent) -> Result<Effects, SyncError> {
        let name = event.name();
        match reduce(&self.state, ctx, event) {
            Ok(transition) => {
                let from = self.state.name();
                let to = transition.state.name();
                if from != to {
                    info!(event = name, from, to, "Session transition");
                } else {
                    debug!(event = name, state = to, "Session event applied");
                }
                if let SessionState::Active(session) = &transition.state {
                    debug!(
                        session = %session.session_id,
                        position = %short_hex(&session.board.signature()),
                        "Board updated"
                    );
                }
                self.state = Arc::new(transition.state);
                Ok(Effects {
                    intents: transition.intents,
                    notices: transition.notices,
                })
            }
            Err(err) => {
                if err.is_remote_fault() {
                    warn!(event = name, state = self.state.name(), "Dropped inbound event: {}", err);
                    self.record_fault(err.clone());
                } else {
                    debug!(event = name, state = self.state.name(), "Rejected: {}", err);
                }
                Err(err)
            }
        }
    }

    /// Keep a fault for inspection. Oldest entries are discarded first.
    pub fn record_fault(&mut self, fault: SyncError) {
        if self.faults.len() == MAX_RECORDED_FAULTS {
            self.faults.remove(0);
        }
        self.faults.push(fault);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::square::sq;
    use crate::game::piece::{Piece, PieceKind};
    use crate::game::status::TerminalStatus;

    fn identity() -> LocalIdentity {
        LocalIdentity::new("u1", "alice")
    }

    fn ctx(identity: &LocalIdentity) -> Context<'_> {
        Context { identity, connected: true }
    }

    fn started(first: bool) -> SessionEvent {
        SessionEvent::Remote(GameUpdate::GameStarted {
            session_id: SessionId::new("g1"),
            opponent: "bob".into(),
            is_first_to_move: first,
        })
    }

    fn remote_move(from: &str, to: &str) -> SessionEvent {
        SessionEvent::Remote(GameUpdate::MoveMade {
            session_id: Some(SessionId::new("g1")),
            mv: WireMove::from(Move::new(sq(from), sq(to), None)),
        })
    }

    fn active_machine(first: bool) -> SessionMachine {
        let id = identity();
        let mut machine = SessionMachine::new();
        machine.dispatch(ctx(&id), SessionEvent::FindGame).unwrap();
        machine.dispatch(ctx(&id), started(first)).unwrap();
        machine
    }

    #[test]
    fn test_find_and_cancel() {
        let id = identity();
        let mut machine = SessionMachine::new();

        let effects = machine.dispatch(ctx(&id), SessionEvent::FindGame).unwrap();
        assert_eq!(*machine.current(), SessionState::Searching);
        assert_eq!(effects.intents.len(), 1);
        assert_eq!(effects.intents[0].destination(), "/app/game/find");
        assert_eq!(effects.notices[0].text, "Finding a game...");

        let err = machine.dispatch(ctx(&id), SessionEvent::FindGame).unwrap_err();
        assert!(matches!(err, SyncError::Validation(ValidationError::NotAllowed { .. })));

        let effects = machine.dispatch(ctx(&id), SessionEvent::CancelSearch).unwrap();
        assert_eq!(*machine.current(), SessionState::Idle);
        assert_eq!(effects.intents[0].destination(), "/app/game/cancel");
    }

    #[test]
    fn test_find_requires_connection() {
        let id = identity();
        let offline = Context { identity: &id, connected: false };
        let mut machine = SessionMachine::new();
        let err = machine.dispatch(offline, SessionEvent::FindGame).unwrap_err();
        assert_eq!(err, SyncError::Validation(ValidationError::NotConnected));
        assert_eq!(err.to_string(), "Not connected to server");
        assert_eq!(*machine.current(), SessionState::Idle);
    }

    #[test]
    fn test_cancel_offline_is_local_only() {
        let id = identity();
        let mut machine = SessionMachine::new();
        machine.dispatch(ctx(&id), SessionEvent::FindGame).unwrap();
        let offline = Context { identity: &id, connected: false };
        let effects = machine.dispatch(offline, SessionEvent::CancelSearch).unwrap();
        assert!(effects.intents.is_empty());
        assert_eq!(*machine.current(), SessionState::Idle);
    }

    #[test]
    fn test_game_started_from_searching() {
        for first in [true, false] {
            let machine = active_machine(first);
            let session = machine.current().session().cloned().unwrap();
            assert_eq!(session.is_local_turn(), first);
            assert_eq!(session.color, if first { Side::White } else { Side::Black });
            assert_eq!(session.board, Board::new());
            assert_eq!(session.opponent, "bob");
        }

        let id = identity();
        let mut machine = SessionMachine::new();
        machine.dispatch(ctx(&id), SessionEvent::FindGame).unwrap();
        let effects = machine.dispatch(ctx(&id), started(true)).unwrap();
        assert_eq!(
            effects.notices[0].text,
            "Game started against bob! You are playing as White."
        );
    }

    #[test]
    fn test_second_game_started_is_protocol_error() {
        let id = identity();
        let mut machine = active_machine(true);
        let before = machine.state();

        let err = machine
            .dispatch(
                ctx(&id),
                SessionEvent::Remote(GameUpdate::GameStarted {
                    session_id: SessionId::new("g2"),
                    opponent: "eve".into(),
                    is_first_to_move: false,
                }),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Protocol(ProtocolError::UnexpectedEvent { event: "GAME_STARTED", state: "active" })
        ));
        assert_eq!(machine.state(), before);
        assert_eq!(machine.faults().len(), 1);
    }

    #[test]
    fn test_remote_move_applies_and_flips_turn() {
        let id = identity();
        let mut machine = active_machine(false);
        machine.dispatch(ctx(&id), remote_move("e2", "e4")).unwrap();

        let session = machine.current().session().cloned().unwrap();
        assert!(session.is_local_turn());
        assert_eq!(session.last_move(), Some(Move::new(sq("e2"), sq("e4"), None)));
        assert!(machine.faults().is_empty());
    }

    #[test]
    fn test_illegal_remote_move_is_dropped() {
        let id = identity();
        let mut machine = active_machine(false);
        let before = machine.state();

        let err = machine.dispatch(ctx(&id), remote_move("e2", "e5")).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(ProtocolError::RejectedMove(_))));
        assert_eq!(machine.state(), before);
        assert_eq!(machine.current().name(), "active");
        assert_eq!(machine.faults(), &[err]);
    }

    #[test]
    fn test_remote_move_on_local_turn_or_stale_session() {
        let id = identity();
        let mut machine = active_machine(true);
        let err = machine.dispatch(ctx(&id), remote_move("e2", "e4")).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(ProtocolError::OutOfTurn(_))));

        let mut machine = active_machine(false);
        let stale = SessionEvent::Remote(GameUpdate::MoveMade {
            session_id: Some(SessionId::new("old")),
            mv: WireMove::from(Move::new(sq("e2"), sq("e4"), None)),
        });
        let err = machine.dispatch(ctx(&id), stale).unwrap_err();
        assert!(matches!(err, SyncError::Protocol(ProtocolError::StaleSession { .. })));
        assert_eq!(machine.faults().len(), 1);
    }

    #[test]
    fn test_local_move_publishes_after_applying() {
        let id = identity();
        let mut machine = active_machine(true);
        let mv = Move::new(sq("g1"), sq("f3"), None);
        let effects = machine.dispatch(ctx(&id), SessionEvent::LocalMove(mv)).unwrap();

        let session = machine.current().session().cloned().unwrap();
        assert!(!session.is_local_turn());
        assert_eq!(
            session.board.piece_at(sq("f3")),
            Some(Piece::new(PieceKind::Knight, Side::White))
        );
        match &effects.intents[..] {
            [Intent::Move(intent)] => {
                assert_eq!(intent.session_id, SessionId::new("g1"));
                assert_eq!(Move::from(intent.mv), mv);
            }
            other => panic!("unexpected intents {other:?}"),
        }

        // Now it is the opponent's turn.
        let err = machine
            .dispatch(ctx(&id), SessionEvent::LocalMove(Move::new(sq("e2"), sq("e4"), None)))
            .unwrap_err();
        assert_eq!(err, SyncError::Validation(ValidationError::NotYourTurn));
    }

    #[test]
    fn test_local_move_rejections_do_not_mutate() {
        let id = identity();
        let mut machine = active_machine(true);
        let before = machine.state();

        let err = machine
            .dispatch(ctx(&id), SessionEvent::LocalMove(Move::new(sq("e2"), sq("e5"), None)))
            .unwrap_err();
        assert!(matches!(err, SyncError::IllegalMove(_)));

        let offline = Context { identity: &id, connected: false };
        let err = machine
            .dispatch(offline, SessionEvent::LocalMove(Move::new(sq("e2"), sq("e4"), None)))
            .unwrap_err();
        assert_eq!(err, SyncError::Validation(ValidationError::NotConnected));

        assert_eq!(machine.state(), before);
        assert!(machine.faults().is_empty());
    }

    #[test]
    fn test_game_ended_and_acknowledge() {
        let id = identity();
        let mut machine = active_machine(true);
        let effects = machine
            .dispatch(
                ctx(&id),
                SessionEvent::Remote(GameUpdate::GameEnded {
                    session_id: None,
                    reason: "Black resigned".into(),
                }),
            )
            .unwrap();
        assert_eq!(effects.notices[0].text, "Game ended: Black resigned");
        assert_eq!(
            *machine.current(),
            SessionState::Ended { reason: "Black resigned".into() }
        );

        machine.dispatch(ctx(&id), SessionEvent::Acknowledge).unwrap();
        assert_eq!(*machine.current(), SessionState::Idle);
    }

    #[test]
    fn test_resign_then_broker_confirmation() {
        let id = identity();
        let mut machine = active_machine(false);
        let effects = machine.dispatch(ctx(&id), SessionEvent::Resign).unwrap();
        assert_eq!(effects.intents[0].destination(), "/app/game/resign");
        assert_eq!(machine.current().name(), "ended");

        let effects = machine
            .dispatch(
                ctx(&id),
                SessionEvent::Remote(GameUpdate::GameEnded {
                    session_id: Some(SessionId::new("g1")),
                    reason: "Black resigned".into(),
                }),
            )
            .unwrap();
        assert!(effects.notices.is_empty());
        assert_eq!(
            *machine.current(),
            SessionState::Ended { reason: "You resigned the game".into() }
        );
    }

    #[test]
    fn test_updates_outside_a_game_are_faults() {
        let id = identity();
        let mut machine = SessionMachine::new();
        let err = machine.dispatch(ctx(&id), remote_move("e7", "e5")).unwrap_err();
        assert!(matches!(
            err,
            SyncError::Protocol(ProtocolError::UnexpectedEvent { event: "MOVE_MADE", state: "idle" })
        ));
        let ended = SessionEvent::Remote(GameUpdate::GameEnded {
            session_id: None,
            reason: "x".into(),
        });
        assert!(machine.dispatch(ctx(&id), ended).is_err());
        assert_eq!(machine.faults().len(), 2);
        assert_eq!(*machine.current(), SessionState::Idle);
    }

    #[test]
    fn test_mating_move_announces_result() {
        let id = identity();
        let mut machine = active_machine(true);
        let moves = [("f2", "f3"), ("e7", "e5"), ("g2", "g4")];
        for (i, (from, to)) in moves.iter().enumerate() {
            let mv = Move::new(sq(from), sq(to), None);
            if i % 2 == 0 {
                machine.dispatch(ctx(&id), SessionEvent::LocalMove(mv)).unwrap();
            } else {
                machine.dispatch(ctx(&id), remote_move(from, to)).unwrap();
            }
        }
        let effects = machine.dispatch(ctx(&id), remote_move("d8", "h4")).unwrap();
        assert_eq!(effects.notices[0].text, TerminalStatus::Checkmate.describe());
        // Still active until the broker ends the game.
        assert_eq!(machine.current().name(), "active");
    }
}
