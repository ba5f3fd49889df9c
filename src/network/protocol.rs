//! Protocol Messages
//!
//! Two layers travel over the WebSocket:
//!
//! - **Broker frames** (`ClientFrame` / `BrokerFrame`): the publish/subscribe
//!   envelope, STOMP 1.2 text frames (see [`crate::network::stomp`]).
//! - **Payloads**: the JSON `body` of a `SEND` or `MESSAGE` frame. Intents go
//!   out on `/app/...` destinations; game updates, the roster and the online
//!   count come back on subscribed channels.
//!
//! Payload field names follow the broker (`userId`, `gameId`, `isWhite`, ...);
//! the neutral names (`participantId`, `sessionId`, `isFirstToMove`) are
//! accepted as aliases on input.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::ids::{ParticipantId, SessionId};
use crate::core::square::Square;
use crate::game::board::MoveError;
use crate::game::moves::Move;
use crate::game::piece::PieceKind;
use crate::network::stomp::{HeartBeat, StompError, StompFrame, HEARTBEAT};

// =============================================================================
// DESTINATIONS
// =============================================================================

/// Outbound destinations.
pub mod destinations {
    /// Announce presence.
    pub const PRESENCE_CONNECT: &str = "/app/player/connect";
    /// Withdraw presence.
    pub const PRESENCE_DISCONNECT: &str = "/app/player/disconnect";
    /// Enter matchmaking.
    pub const FIND_GAME: &str = "/app/game/find";
    /// Leave matchmaking.
    pub const CANCEL_SEARCH: &str = "/app/game/cancel";
    /// Submit a move.
    pub const MOVE: &str = "/app/game/move";
    /// Resign the current game.
    pub const RESIGN: &str = "/app/game/resign";
    /// Ask for a roster broadcast.
    pub const ROSTER_REQUEST: &str = "/app/online-users/get";
    /// Broadcast roster channel.
    pub const ONLINE_ROSTER: &str = "/topic/online-players";
    /// Broadcast online-count channel.
    pub const ONLINE_COUNT: &str = "/topic/online-count";
}

/// Inbound channels a client subscribes to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    /// Per-user game updates.
    GameUpdates(ParticipantId),
    /// Broadcast roster snapshots.
    OnlineRoster,
    /// Broadcast online count.
    OnlineCount,
}

impl Channel {
    /// Broker destination string.
    pub fn destination(&self) -> String {
        match self {
            Channel::GameUpdates(id) => format!("/user/{id}/queue/game-updates"),
            Channel::OnlineRoster => destinations::ONLINE_ROSTER.to_string(),
            Channel::OnlineCount => destinations::ONLINE_COUNT.to_string(),
        }
    }

    /// Map an inbound destination back to a channel of `local`.
    pub fn classify(destination: &str, local: &ParticipantId) -> Option<Channel> {
        match destination {
            destinations::ONLINE_ROSTER => Some(Channel::OnlineRoster),
            destinations::ONLINE_COUNT => Some(Channel::OnlineCount),
            other => {
                let updates = Channel::GameUpdates(local.clone());
                (other == updates.destination()).then_some(updates)
            }
        }
    }

    /// Channels a connected client needs.
    pub fn required(local: &ParticipantId) -> Vec<Channel> {
        vec![
            Channel::GameUpdates(local.clone()),
            Channel::OnlineRoster,
            Channel::OnlineCount,
        ]
    }
}

// =============================================================================
// MOVE PAYLOAD
// =============================================================================

/// Move as it travels on the wire: `{from, to, promotion?}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMove {
    /// Origin square.
    pub from: Square,
    /// Destination square.
    pub to: Square,
    /// Promotion letter (`q`, `r`, `b`, `n`).
    #[serde(default, skip_serializing_if = "Option::is_none", with = "promotion_letter")]
    pub promotion: Option<PieceKind>,
}

impl From<Move> for WireMove {
    fn from(mv: Move) -> Self {
        Self {
            from: mv.origin,
            to: mv.dest,
            promotion: mv.promotion,
        }
    }
}

impl From<WireMove> for Move {
    fn from(wire: WireMove) -> Self {
        Move::new(wire.from, wire.to, wire.promotion)
    }
}

mod promotion_letter {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<PieceKind>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(kind) => serializer.serialize_char(kind.letter()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<PieceKind>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(None),
            Some(text) => {
                let mut chars = text.chars();
                match (chars.next().and_then(PieceKind::from_letter), chars.next()) {
                    (Some(kind), None) => Ok(Some(kind)),
                    _ => Err(serde::de::Error::custom(format!("bad promotion letter {text:?}"))),
                }
            }
        }
    }
}

// =============================================================================
// OUTBOUND INTENTS
// =============================================================================

/// Payload naming just a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRef {
    /// Who is acting.
    #[serde(rename = "userId", alias = "participantId")]
    pub participant_id: ParticipantId,
}

/// Presence announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceAnnounce {
    /// Who connected.
    #[serde(rename = "userId", alias = "participantId")]
    pub participant_id: ParticipantId,
    /// Shown in other rosters.
    #[serde(rename = "username", alias = "displayName")]
    pub display_name: String,
}

/// Move submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveIntent {
    /// Game the move belongs to.
    #[serde(rename = "gameId", alias = "sessionId")]
    pub session_id: SessionId,
    /// Who moved.
    #[serde(rename = "playerId", alias = "participantId")]
    pub participant_id: ParticipantId,
    /// The move.
    #[serde(rename = "move")]
    pub mv: WireMove,
}

/// Resignation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResignIntent {
    /// Game being resigned.
    #[serde(rename = "gameId", alias = "sessionId")]
    pub session_id: SessionId,
    /// Who resigned.
    #[serde(rename = "playerId", alias = "participantId")]
    pub participant_id: ParticipantId,
}

/// Everything the client publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Announce presence after (re)connecting.
    PresenceConnect(PresenceAnnounce),
    /// Withdraw presence before shutdown.
    PresenceDisconnect(ParticipantRef),
    /// Enter matchmaking.
    FindGame(ParticipantRef),
    /// Leave matchmaking.
    CancelSearch(ParticipantRef),
    /// Submit a move.
    Move(MoveIntent),
    /// Resign.
    Resign(ResignIntent),
    /// Ask the broker to rebroadcast the roster.
    RosterRequest(ParticipantRef),
}

impl Intent {
    /// Destination the intent is published to.
    pub fn destination(&self) -> &'static str {
        match self {
            Intent::PresenceConnect(_) => destinations::PRESENCE_CONNECT,
            Intent::PresenceDisconnect(_) => destinations::PRESENCE_DISCONNECT,
            Intent::FindGame(_) => destinations::FIND_GAME,
            Intent::CancelSearch(_) => destinations::CANCEL_SEARCH,
            Intent::Move(_) => destinations::MOVE,
            Intent::Resign(_) => destinations::RESIGN,
            Intent::RosterRequest(_) => destinations::ROSTER_REQUEST,
        }
    }

    /// Serialize the payload body.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Intent::PresenceConnect(p) => serde_json::to_string(p),
            Intent::PresenceDisconnect(p)
            | Intent::FindGame(p)
            | Intent::CancelSearch(p)
            | Intent::RosterRequest(p) => serde_json::to_string(p),
            Intent::Move(p) => serde_json::to_string(p),
            Intent::Resign(p) => serde_json::to_string(p),
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Intent::PresenceConnect(_) => "presence-connect",
            Intent::PresenceDisconnect(_) => "presence-disconnect",
            Intent::FindGame(_) => "find-game",
            Intent::CancelSearch(_) => "cancel-search",
            Intent::Move(_) => "move",
            Intent::Resign(_) => "resign",
            Intent::RosterRequest(_) => "roster-request",
        }
    }
}

// =============================================================================
// INBOUND PAYLOADS
// =============================================================================

/// Events on the per-user game-update channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameUpdate {
    /// A game was created with us in it.
    GameStarted {
        /// New session.
        #[serde(rename = "gameId", alias = "sessionId")]
        session_id: SessionId,
        /// Opponent's display name.
        opponent: String,
        /// Whether we play the side that moves first.
        #[serde(rename = "isWhite", alias = "isFirstToMove")]
        is_first_to_move: bool,
    },

    /// The opponent moved.
    MoveMade {
        /// Session the move belongs to, when the broker includes it.
        #[serde(rename = "gameId", alias = "sessionId", default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        /// The move.
        #[serde(rename = "move")]
        mv: WireMove,
    },

    /// The game is over.
    GameEnded {
        /// Session that ended, when the broker includes it.
        #[serde(rename = "gameId", alias = "sessionId", default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        /// Human-readable reason.
        reason: String,
    },
}

impl GameUpdate {
    /// Tag name for logs and errors.
    pub fn tag(&self) -> &'static str {
        match self {
            GameUpdate::GameStarted { .. } => "GAME_STARTED",
            GameUpdate::MoveMade { .. } => "MOVE_MADE",
            GameUpdate::GameEnded { .. } => "GAME_ENDED",
        }
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// One participant in a roster broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Participant id.
    #[serde(rename = "userId", alias = "participantId")]
    pub participant_id: ParticipantId,
    /// Display name.
    #[serde(rename = "username", alias = "displayName")]
    pub display_name: String,
    /// Busy in a game.
    #[serde(rename = "inGame", default)]
    pub in_game: bool,
}

// =============================================================================
// BROKER FRAMES
// =============================================================================

/// Frames sent from client to broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Open a broker session.
    Connect {
        /// Who is connecting.
        participant_id: ParticipantId,
        /// Display name.
        display_name: String,
        /// Virtual host, usually the broker's host name.
        host: String,
        /// Heartbeat periods we offer.
        heart_beat: HeartBeat,
    },

    /// Start receiving a destination.
    Subscribe {
        /// Destination to receive.
        destination: String,
    },

    /// Stop receiving a destination.
    Unsubscribe {
        /// Destination to drop.
        destination: String,
    },

    /// Publish a payload.
    Send {
        /// Where to.
        destination: String,
        /// JSON payload.
        body: String,
    },

    /// Liveness signal.
    Heartbeat,

    /// Orderly goodbye.
    Disconnect,
}

/// Frames sent from broker to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerFrame {
    /// Session accepted.
    Connected {
        /// Heartbeat periods the broker offers.
        heart_beat: HeartBeat,
    },

    /// Delivery on a subscribed destination.
    Message {
        /// Destination it was published to.
        destination: String,
        /// JSON payload.
        body: String,
    },

    /// Liveness signal.
    Heartbeat,

    /// Broker-side failure.
    Error {
        /// Human-readable message.
        message: String,
    },
}

const JSON: &str = "application/json";

impl ClientFrame {
    /// Render as STOMP text.
    pub fn encode(&self) -> String {
        let frame = match self {
            ClientFrame::Connect {
                participant_id,
                display_name,
                host,
                heart_beat,
            } => StompFrame::new("CONNECT")
                .header("accept-version", "1.2")
                .header("host", host.as_str())
                .header("heart-beat", heart_beat.header_value())
                .header("userId", participant_id.as_str())
                .header("username", display_name.as_str()),
            // The destination doubles as the subscription id.
            ClientFrame::Subscribe { destination } => StompFrame::new("SUBSCRIBE")
                .header("id", destination.as_str())
                .header("destination", destination.as_str()),
            ClientFrame::Unsubscribe { destination } => {
                StompFrame::new("UNSUBSCRIBE").header("id", destination.as_str())
            }
            ClientFrame::Send { destination, body } => StompFrame::new("SEND")
                .header("destination", destination.as_str())
                .header("content-type", JSON)
                .with_body(body.as_str()),
            ClientFrame::Heartbeat => return HEARTBEAT.to_string(),
            ClientFrame::Disconnect => StompFrame::new("DISCONNECT"),
        };
        frame.encode()
    }

    /// Parse one WebSocket message from a client. Used by in-process
    /// brokers; a heartbeat message yields `[Heartbeat]`.
    pub fn decode(text: &str) -> Result<Vec<ClientFrame>, ProtocolError> {
        let frames = StompFrame::parse_all(text)?;
        if frames.is_empty() {
            return Ok(vec![ClientFrame::Heartbeat]);
        }
        frames
            .into_iter()
            .map(|frame| -> Result<ClientFrame, ProtocolError> {
                let need = |command: &'static str, header: &'static str| {
                    frame
                        .get(header)
                        .map(str::to_string)
                        .ok_or(StompError::MissingHeader { command, header })
                };
                Ok(match frame.command.as_str() {
                    "CONNECT" | "STOMP" => ClientFrame::Connect {
                        participant_id: ParticipantId::new(need("CONNECT", "userId")?),
                        display_name: need("CONNECT", "username")?,
                        host: frame.get("host").unwrap_or_default().to_string(),
                        heart_beat: HeartBeat::parse(frame.get("heart-beat")),
                    },
                    "SUBSCRIBE" => ClientFrame::Subscribe {
                        destination: need("SUBSCRIBE", "destination")?,
                    },
                    "UNSUBSCRIBE" => ClientFrame::Unsubscribe {
                        destination: need("UNSUBSCRIBE", "id")?,
                    },
                    "SEND" => ClientFrame::Send {
                        destination: need("SEND", "destination")?,
                        body: frame.body.clone(),
                    },
                    "DISCONNECT" => ClientFrame::Disconnect,
                    other => return Err(StompError::UnexpectedCommand(other.to_string()).into()),
                })
            })
            .collect()
    }
}

impl BrokerFrame {
    /// Render as STOMP text. Used by in-process brokers.
    pub fn encode(&self) -> String {
        let frame = match self {
            BrokerFrame::Connected { heart_beat } => StompFrame::new("CONNECTED")
                .header("version", "1.2")
                .header("heart-beat", heart_beat.header_value()),
            BrokerFrame::Message { destination, body } => StompFrame::new("MESSAGE")
                .header("destination", destination.as_str())
                .header("subscription", destination.as_str())
                .header("content-type", JSON)
                .with_body(body.as_str()),
            BrokerFrame::Heartbeat => return HEARTBEAT.to_string(),
            BrokerFrame::Error { message } => StompFrame::new("ERROR").header("message", message.as_str()),
        };
        frame.encode()
    }

    /// Parse one WebSocket message from the broker. A heartbeat message
    /// yields `[Heartbeat]`.
    pub fn decode(text: &str) -> Result<Vec<BrokerFrame>, ProtocolError> {
        let frames = StompFrame::parse_all(text)?;
        if frames.is_empty() {
            return Ok(vec![BrokerFrame::Heartbeat]);
        }
        frames
            .into_iter()
            .map(|frame| -> Result<BrokerFrame, ProtocolError> {
                match frame.command.as_str() {
                    "CONNECTED" => Ok(BrokerFrame::Connected {
                        heart_beat: HeartBeat::parse(frame.get("heart-beat")),
                    }),
                    "MESSAGE" => {
                        let destination = frame.get("destination").ok_or(StompError::MissingHeader {
                            command: "MESSAGE",
                            header: "destination",
                        })?;
                        Ok(BrokerFrame::Message {
                            destination: destination.to_string(),
                            body: frame.body.clone(),
                        })
                    }
                    "ERROR" => Ok(BrokerFrame::Error {
                        message: frame
                            .get("message")
                            .map(str::to_string)
                            .unwrap_or_else(|| frame.body.clone()),
                    }),
                    other => Err(StompError::UnexpectedCommand(other.to_string()).into()),
                }
            })
            .collect()
    }
}

// =============================================================================
// PROTOCOL ERRORS
// =============================================================================

/// Malformed or unexpected inbound traffic. The message is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Payload did not parse.
    #[error("malformed payload on {destination}: {reason}")]
    Malformed {
        /// Where it arrived.
        destination: String,
        /// Parser message.
        reason: String,
    },

    /// Delivery on a destination we never subscribed to.
    #[error("message on unknown destination {0}")]
    UnknownDestination(String),

    /// Event not allowed in the current session state.
    #[error("{event} not expected while {state}")]
    UnexpectedEvent {
        /// Event tag.
        event: &'static str,
        /// Session state name.
        state: &'static str,
    },

    /// Event for a session other than the active one.
    #[error("{event} for session {got}, active session is {expected}")]
    StaleSession {
        /// Event tag.
        event: &'static str,
        /// Active session.
        expected: SessionId,
        /// Session named by the event.
        got: SessionId,
    },

    /// Opponent move that fails legality checking.
    #[error("remote move rejected: {0}")]
    RejectedMove(MoveError),

    /// Opponent move while it is our turn.
    #[error("remote move {0} arrived on the local turn")]
    OutOfTurn(Move),

    /// Error frame from the broker.
    #[error("broker error: {0}")]
    Broker(String),

    /// Broker frame that is not valid STOMP.
    #[error("bad broker frame: {0}")]
    Framing(#[from] StompError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::square::sq;

    #[test]
    fn test_move_roundtrip_through_wire() {
        let moves = [
            Move::new(sq("e2"), sq("e4"), None),
            Move::new(sq("a7"), sq("a8"), Some(PieceKind::Knight)),
            Move::new(sq("h2"), sq("h1"), Some(PieceKind::Queen)),
        ];
        for mv in moves {
            let json = serde_json::to_string(&WireMove::from(mv)).unwrap();
            let back: WireMove = serde_json::from_str(&json).unwrap();
            assert_eq!(Move::from(back), mv);
        }
    }

    #[test]
    fn test_wire_move_shape() {
        let wire = WireMove::from(Move::new(sq("e7"), sq("e8"), Some(PieceKind::Queen)));
        let json = serde_json::to_string(&wire).unwrap();
        assert_eq!(json, r#"{"from":"e7","to":"e8","promotion":"q"}"#);

        let plain = WireMove::from(Move::new(sq("e2"), sq("e4"), None));
        assert_eq!(serde_json::to_string(&plain).unwrap(), r#"{"from":"e2","to":"e4"}"#);
    }

    #[test]
    fn test_wire_move_tolerates_broker_variants() {
        let upper: WireMove = serde_json::from_str(r#"{"from":"b7","to":"b8","promotion":"R"}"#).unwrap();
        assert_eq!(upper.promotion, Some(PieceKind::Rook));
        let empty: WireMove = serde_json::from_str(r#"{"from":"e2","to":"e4","promotion":""}"#).unwrap();
        assert_eq!(empty.promotion, None);
        let null: WireMove = serde_json::from_str(r#"{"from":"e2","to":"e4","promotion":null}"#).unwrap();
        assert_eq!(null.promotion, None);
        assert!(serde_json::from_str::<WireMove>(r#"{"from":"e2","to":"e4","promotion":"x"}"#).is_err());
        assert!(serde_json::from_str::<WireMove>(r#"{"from":"e9","to":"e4"}"#).is_err());
    }

    #[test]
    fn test_game_update_parsing() {
        let started = GameUpdate::from_json(
            r#"{"type":"GAME_STARTED","gameId":"g1","isWhite":true,"opponent":"bob"}"#,
        )
        .unwrap();
        assert_eq!(
            started,
            GameUpdate::GameStarted {
                session_id: SessionId::new("g1"),
                opponent: "bob".into(),
                is_first_to_move: true,
            }
        );

        let aliased = GameUpdate::from_json(
            r#"{"type":"GAME_STARTED","sessionId":"g2","isFirstToMove":false,"opponent":"eve"}"#,
        )
        .unwrap();
        assert!(matches!(aliased, GameUpdate::GameStarted { is_first_to_move: false, .. }));

        let moved = GameUpdate::from_json(
            r#"{"type":"MOVE_MADE","gameId":"g1","move":{"from":"e7","to":"e5"}}"#,
        )
        .unwrap();
        assert_eq!(moved.tag(), "MOVE_MADE");

        let ended = GameUpdate::from_json(r#"{"type":"GAME_ENDED","reason":"White resigned"}"#).unwrap();
        assert_eq!(
            ended,
            GameUpdate::GameEnded {
                session_id: None,
                reason: "White resigned".into(),
            }
        );
    }

    #[test]
    fn test_unknown_update_tag_rejected() {
        assert!(GameUpdate::from_json(r#"{"type":"CHAT","text":"hi"}"#).is_err());
        assert!(GameUpdate::from_json("not json").is_err());
    }

    #[test]
    fn test_intent_payloads() {
        let me = ParticipantId::new("u1");
        let find = Intent::FindGame(ParticipantRef { participant_id: me.clone() });
        assert_eq!(find.destination(), "/app/game/find");
        assert_eq!(find.to_json().unwrap(), r#"{"userId":"u1"}"#);

        let mv = Intent::Move(MoveIntent {
            session_id: SessionId::new("g1"),
            participant_id: me.clone(),
            mv: WireMove::from(Move::new(sq("g1"), sq("f3"), None)),
        });
        assert_eq!(mv.destination(), "/app/game/move");
        assert_eq!(
            mv.to_json().unwrap(),
            r#"{"gameId":"g1","playerId":"u1","move":{"from":"g1","to":"f3"}}"#
        );

        let hello = Intent::PresenceConnect(PresenceAnnounce {
            participant_id: me,
            display_name: "alice".into(),
        });
        assert_eq!(hello.to_json().unwrap(), r#"{"userId":"u1","username":"alice"}"#);
        assert_eq!(hello.kind(), "presence-connect");
    }

    #[test]
    fn test_roster_entries() {
        let roster: Vec<RosterEntry> = serde_json::from_str(
            r#"[{"userId":"a","username":"alice","inGame":true},{"participantId":"b","displayName":"bob"}]"#,
        )
        .unwrap();
        assert_eq!(roster.len(), 2);
        assert!(roster[0].in_game);
        assert!(!roster[1].in_game);
        assert_eq!(roster[1].display_name, "bob");
    }

    #[test]
    fn test_channel_classification() {
        let me = ParticipantId::new("u1");
        let updates = Channel::GameUpdates(me.clone());
        assert_eq!(updates.destination(), "/user/u1/queue/game-updates");
        assert_eq!(Channel::classify("/user/u1/queue/game-updates", &me), Some(updates));
        assert_eq!(Channel::classify("/user/u2/queue/game-updates", &me), None);
        assert_eq!(Channel::classify("/topic/online-count", &me), Some(Channel::OnlineCount));
        assert_eq!(Channel::required(&me).len(), 3);
    }

    #[test]
    fn test_client_frames_on_the_wire() {
        let hello = ClientFrame::Connect {
            participant_id: ParticipantId::new("u1"),
            display_name: "alice".into(),
            host: "localhost".into(),
            heart_beat: HeartBeat::new(4000, 4000),
        };
        assert_eq!(
            hello.encode(),
            "CONNECT\naccept-version:1.2\nhost:localhost\nheart-beat:4000,4000\nuserId:u1\nusername:alice\n\n\0"
        );
        assert_eq!(ClientFrame::decode(&hello.encode()).unwrap(), [hello]);

        let sub = ClientFrame::Subscribe {
            destination: "/topic/online-count".into(),
        };
        assert_eq!(
            sub.encode(),
            "SUBSCRIBE\nid:/topic/online-count\ndestination:/topic/online-count\n\n\0"
        );

        let send = ClientFrame::Send {
            destination: "/app/game/find".into(),
            body: r#"{"userId":"u1"}"#.into(),
        };
        assert!(send.encode().starts_with("SEND\ndestination:/app/game/find\n"));
        assert_eq!(ClientFrame::decode(&send.encode()).unwrap(), [send]);

        assert_eq!(ClientFrame::Heartbeat.encode(), "\n");
        assert_eq!(ClientFrame::decode("\n").unwrap(), [ClientFrame::Heartbeat]);
        assert_eq!(ClientFrame::Disconnect.encode(), "DISCONNECT\n\n\0");
    }

    #[test]
    fn test_broker_frames_from_the_wire() {
        let connected = BrokerFrame::decode("CONNECTED\nversion:1.2\nheart-beat:10000,10000\n\n\0").unwrap();
        assert_eq!(
            connected,
            [BrokerFrame::Connected {
                heart_beat: HeartBeat::new(10000, 10000)
            }]
        );

        let message = BrokerFrame::decode(
            "MESSAGE\ndestination:/topic/online-count\nsubscription:sub-0\nmessage-id:a-1\ncontent-length:1\n\n3\0",
        )
        .unwrap();
        assert_eq!(
            message,
            [BrokerFrame::Message {
                destination: "/topic/online-count".into(),
                body: "3".into(),
            }]
        );

        let error = BrokerFrame::decode("ERROR\nmessage:bad login\n\n\0").unwrap();
        assert_eq!(error, [BrokerFrame::Error { message: "bad login".into() }]);
        assert_eq!(BrokerFrame::decode("\n").unwrap(), [BrokerFrame::Heartbeat]);

        assert!(matches!(
            BrokerFrame::decode("RECEIPT\nreceipt-id:1\n\n\0"),
            Err(ProtocolError::Framing(StompError::UnexpectedCommand(_)))
        ));
        assert!(matches!(
            BrokerFrame::decode("MESSAGE\n\nx\0"),
            Err(ProtocolError::Framing(StompError::MissingHeader { .. }))
        ));
        assert!(matches!(
            BrokerFrame::decode(r#"{"type":"heartbeat"}"#),
            Err(ProtocolError::Framing(_))
        ));
    }
}
