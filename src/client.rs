//! Game Client
//!
//! The single event funnel. User commands and link events share one queue
//! and are handled strictly in arrival order by [`GameClient::handle`].
//! After every event a fresh, immutable [`ClientView`] is published on a
//! watch channel for renderers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

use crate::core::ids::LocalIdentity;
use crate::core::square::Square;
use crate::error::SyncError;
use crate::game::moves::Move;
use crate::game::piece::PieceKind;
use crate::network::gateway::{Gateway, GatewayError, LinkEvent};
use crate::network::protocol::{
    Channel, GameUpdate, Intent, ParticipantRef, PresenceAnnounce, ProtocolError,
};
use crate::presence::{PresenceTracker, Roster};
use crate::session::interaction::{Highlights, InteractionController, SelectOutcome};
use crate::session::machine::{Context, Effects, Notice, NoticeLevel, SessionEvent, SessionMachine, SessionState};

// =============================================================================
// EVENTS
// =============================================================================

/// User gestures and requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Enter matchmaking.
    FindGame,
    /// Leave matchmaking.
    CancelSearch,
    /// Primary selection on a square.
    Select(Square),
    /// Resolve a pending promotion.
    Promote(PieceKind),
    /// Discard a pending promotion.
    CancelPromotion,
    /// Toggle a cosmetic mark.
    ToggleMark(Square),
    /// Resign the current game.
    Resign,
    /// Dismiss the end-of-game notice.
    Acknowledge,
    /// Ask the broker for a fresh roster.
    RequestRoster,
    /// Withdraw presence and stop.
    Shutdown,
}

/// Everything the client reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// From the user.
    Command(ClientCommand),
    /// From the transport.
    Link(LinkEvent),
}

impl From<LinkEvent> for ClientEvent {
    fn from(event: LinkEvent) -> Self {
        ClientEvent::Link(event)
    }
}

impl From<ClientCommand> for ClientEvent {
    fn from(command: ClientCommand) -> Self {
        ClientEvent::Command(command)
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Receiver of user-facing notices.
pub trait NotificationSink: Send {
    /// Show a notice.
    fn notify(&self, notice: &Notice, at: DateTime<Utc>);
}

/// Sink that writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notice: &Notice, at: DateTime<Utc>) {
        match notice.level {
            NoticeLevel::Error => warn!(at = %at.to_rfc3339(), "{}", notice.text),
            _ => info!(at = %at.to_rfc3339(), level = ?notice.level, "{}", notice.text),
        }
    }
}

// =============================================================================
// VIEW
// =============================================================================

/// Everything a renderer needs, as one immutable snapshot.
#[derive(Debug, Clone)]
pub struct ClientView {
    /// Bumped on every published view.
    pub revision: u64,
    /// Broker link state.
    pub connected: bool,
    /// Session snapshot.
    pub session: Arc<SessionState>,
    /// Selection, options, last move, marks.
    pub highlights: Highlights,
    /// Other participants.
    pub roster: Roster,
    /// Aggregate online count.
    pub online_count: Option<u64>,
    /// Most recent notice.
    pub last_notice: Option<(Notice, DateTime<Utc>)>,
}

// =============================================================================
// CLIENT
// =============================================================================

/// Wires the engine components to a gateway and a notification sink.
pub struct GameClient<G: Gateway, N: NotificationSink> {
    identity: LocalIdentity,
    gateway: G,
    sink: N,
    machine: SessionMachine,
    controller: InteractionController,
    presence: PresenceTracker,
    view_tx: watch::Sender<Arc<ClientView>>,
    revision: u64,
    last_notice: Option<(Notice, DateTime<Utc>)>,
    /// A link loss was announced and no link-up has followed yet.
    reconnecting: bool,
}

impl<G: Gateway, N: NotificationSink> GameClient<G, N> {
    /// Create a client and the receiver for its views.
    pub fn new(identity: LocalIdentity, gateway: G, sink: N) -> (Self, watch::Receiver<Arc<ClientView>>) {
        let machine = SessionMachine::new();
        let presence = PresenceTracker::new(identity.id.clone());
        let initial = ClientView {
            revision: 0,
            connected: gateway.is_connected(),
            session: machine.state(),
            highlights: Highlights::default(),
            roster: presence.roster(),
            online_count: None,
            last_notice: None,
        };
        let (view_tx, view_rx) = watch::channel(Arc::new(initial));

        let mut client = Self {
            identity,
            gateway,
            sink,
            machine,
            controller: InteractionController::new(),
            presence,
            view_tx,
            revision: 0,
            last_notice: None,
            reconnecting: false,
        };
        client.ensure_subscriptions();
        (client, view_rx)
    }

    /// The local participant.
    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// The gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Session machine, for inspection.
    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    /// Presence tracker, for inspection.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Latest view.
    pub fn view(&self) -> Arc<ClientView> {
        self.view_tx.borrow().clone()
    }

    /// Process events until the queue closes or a shutdown command arrives.
    /// Returns the gateway so the caller can close the transport.
    #[instrument(skip_all, fields(participant = %self.identity.id))]
    pub async fn run(mut self, mut events: mpsc::Receiver<ClientEvent>) -> G {
        info!("Client event loop started");
        while let Some(event) = events.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        info!("Client event loop stopped");
        self.gateway
    }

    /// Handle one event. Returns `false` once the client should stop.
    pub fn handle(&mut self, event: ClientEvent) -> bool {
        let keep_running = match event {
            ClientEvent::Command(command) => self.handle_command(command),
            ClientEvent::Link(link) => {
                self.handle_link(link);
                true
            }
        };
        self.publish_view();
        keep_running
    }

    fn handle_command(&mut self, command: ClientCommand) -> bool {
        debug!(?command, "Command");
        match command {
            ClientCommand::FindGame => self.dispatch(SessionEvent::FindGame),
            ClientCommand::CancelSearch => self.dispatch(SessionEvent::CancelSearch),
            ClientCommand::Resign => self.dispatch(SessionEvent::Resign),
            ClientCommand::Acknowledge => self.dispatch(SessionEvent::Acknowledge),

            ClientCommand::Select(square) => {
                let outcome = self.controller.select(self.machine.current().session(), square);
                match outcome {
                    Ok(SelectOutcome::Completed(mv)) => self.submit_move(mv),
                    Ok(_) => {}
                    Err(err) => self.report(err.into()),
                }
            }

            ClientCommand::Promote(kind) => match self.controller.choose_promotion(kind) {
                Ok(mv) => self.submit_move(mv),
                Err(err) => self.report(err.into()),
            },

            ClientCommand::CancelPromotion => {
                if let Err(err) = self.controller.cancel_promotion() {
                    self.report(err.into());
                }
            }

            ClientCommand::ToggleMark(square) => {
                self.controller.toggle_mark(square);
            }

            ClientCommand::RequestRoster => {
                let intent = Intent::RosterRequest(self.me());
                self.send_intent(&intent);
            }

            ClientCommand::Shutdown => {
                if self.gateway.is_connected() {
                    let intent = Intent::PresenceDisconnect(self.me());
                    self.send_intent(&intent);
                }
                if let Err(err) = self.gateway.disconnect() {
                    debug!("Disconnect not sent: {}", err);
                }
                return false;
            }
        }
        true
    }

    fn handle_link(&mut self, link: LinkEvent) {
        match link {
            LinkEvent::Connected => {
                info!("Broker link up");
                if std::mem::take(&mut self.reconnecting) {
                    self.notify(Notice::success("Reconnected to server"));
                }
                if let Err(err) = self.gateway.on_link_up() {
                    self.report(err.into());
                    return;
                }
                self.ensure_subscriptions();
                let hello = Intent::PresenceConnect(PresenceAnnounce {
                    participant_id: self.identity.id.clone(),
                    display_name: self.identity.display_name.clone(),
                });
                self.send_intent(&hello);
                let roster = Intent::RosterRequest(self.me());
                self.send_intent(&roster);
            }

            LinkEvent::Disconnected { reason } => {
                warn!(%reason, "Broker link down");
                self.gateway.on_link_down();
                // Snapshots resume on the next link-up.
                self.presence.clear();
                if !self.reconnecting {
                    self.reconnecting = true;
                    self.notify(Notice::loading("Connection lost, reconnecting..."));
                }
            }

            LinkEvent::Message { destination, body } => self.handle_delivery(&destination, &body),

            LinkEvent::BrokerError(message) => {
                self.machine.record_fault(ProtocolError::Broker(message.clone()).into());
                warn!(%message, "Broker error");
                self.notify(Notice::error("Connection error"));
            }
        }
    }

    fn handle_delivery(&mut self, destination: &str, body: &str) {
        let result = match Channel::classify(destination, &self.identity.id) {
            Some(Channel::GameUpdates(_)) => match GameUpdate::from_json(body) {
                Ok(update) => {
                    self.dispatch(SessionEvent::Remote(update));
                    return;
                }
                Err(e) => Err(ProtocolError::Malformed {
                    destination: destination.to_string(),
                    reason: e.to_string(),
                }),
            },
            Some(Channel::OnlineRoster) => self.presence.apply_roster_json(destination, body),
            Some(Channel::OnlineCount) => self.presence.apply_count_json(destination, body),
            None => Err(ProtocolError::UnknownDestination(destination.to_string())),
        };

        if let Err(err) = result {
            warn!("Dropped delivery: {}", err);
            self.machine.record_fault(err.into());
        }
    }

    /// Route an event through the session machine and carry out its effects.
    fn dispatch(&mut self, event: SessionEvent) {
        let remote = matches!(event, SessionEvent::Remote(_));
        let before = self.machine.current().session().map(|s| s.session_id.clone());
        let ctx = Context {
            identity: &self.identity,
            connected: self.gateway.is_connected(),
        };

        match self.machine.dispatch(ctx, event) {
            Ok(effects) => {
                let after = self.machine.current().session().map(|s| s.session_id.clone());
                if before != after {
                    self.controller.reset();
                } else if remote {
                    // The board moved underneath the selection.
                    self.controller.clear_selection();
                }
                self.apply(effects);
            }
            Err(err) => self.report(err),
        }
    }

    fn submit_move(&mut self, mv: Move) {
        self.dispatch(SessionEvent::LocalMove(mv));
        self.controller.clear_selection();
    }

    fn apply(&mut self, effects: Effects) {
        for intent in &effects.intents {
            if !self.send_intent(intent) {
                if let Intent::Move(sent) = intent {
                    // Already applied locally; the opponent never sees it.
                    warn!(session = %sent.session_id, mv = %Move::from(sent.mv), "Local move not delivered, boards may diverge");
                    self.notify(Notice::error("Move not delivered; the board may be out of sync"));
                }
            }
        }
        for notice in effects.notices {
            self.notify(notice);
        }
    }

    /// Publish an intent. Returns whether it was handed to the transport.
    fn send_intent(&mut self, intent: &Intent) -> bool {
        let result = intent
            .to_json()
            .map_err(|e| GatewayError::Encode(e.to_string()))
            .and_then(|body| self.gateway.publish(intent.destination(), body));
        match result {
            Ok(()) => {
                debug!(intent = intent.kind(), "Published");
                true
            }
            Err(err) => {
                error!(intent = intent.kind(), "Publish failed: {}", err);
                self.report(err.into());
                false
            }
        }
    }

    /// Subscribe every channel the client needs. Idempotent.
    fn ensure_subscriptions(&mut self) {
        for channel in Channel::required(&self.identity.id) {
            if let Err(err) = self.gateway.subscribe(&channel.destination()) {
                self.report(err.into());
            }
        }
    }

    fn report(&mut self, err: SyncError) {
        match &err {
            SyncError::Protocol(ProtocolError::RejectedMove(_) | ProtocolError::OutOfTurn(_)) => {
                self.notify(Notice::error("Opponent move rejected; the board may be out of sync"));
            }
            SyncError::Protocol(_) => {}
            SyncError::Connection(GatewayError::NotConnected) => {
                self.notify(Notice::error("Not connected to server"));
            }
            SyncError::Connection(_) => self.notify(Notice::error("Connection error")),
            SyncError::IllegalMove(e) => self.notify(Notice::error(e.to_string())),
            SyncError::Validation(e) => self.notify(Notice::error(e.to_string())),
        }
    }

    fn notify(&mut self, notice: Notice) {
        let at = Utc::now();
        self.sink.notify(&notice, at);
        self.last_notice = Some((notice, at));
    }

    fn me(&self) -> ParticipantRef {
        ParticipantRef {
            participant_id: self.identity.id.clone(),
        }
    }

    fn publish_view(&mut self) {
        self.revision += 1;
        let session = self.machine.state();
        let view = ClientView {
            revision: self.revision,
            connected: self.gateway.is_connected(),
            highlights: self.controller.highlights(session.session()),
            session,
            roster: self.presence.roster(),
            online_count: self.presence.online_count(),
            last_notice: self.last_notice.clone(),
        };
        self.view_tx.send_replace(Arc::new(view));
    }
}
