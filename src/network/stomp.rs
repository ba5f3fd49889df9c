//! STOMP 1.2 Framing
//!
//! Every WebSocket text message carries one or more frames:
//!
//! ```text
//! COMMAND
//! name:value
//! name:value
//!
//! body^@
//! ```
//!
//! A message made only of end-of-line characters is a heartbeat. Header
//! values are escaped (`\\`, `\n`, `\r`, `\c`) except in `CONNECT` and
//! `CONNECTED` frames.

use std::fmt;

/// End of a frame.
pub const NUL: char = '\0';

/// Heartbeat payload.
pub const HEARTBEAT: &str = "\n";

/// Framing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StompError {
    /// Frame text ended before the NUL terminator.
    #[error("frame not terminated")]
    Unterminated,

    /// Header line without a colon.
    #[error("bad header line {0:?}")]
    BadHeader(String),

    /// Unknown escape sequence in a header.
    #[error("bad escape in header {0:?}")]
    BadEscape(String),

    /// `content-length` missing its body or not a number.
    #[error("bad content-length {0:?}")]
    ContentLength(String),

    /// Command this side does not understand.
    #[error("unexpected command {0}")]
    UnexpectedCommand(String),

    /// Required header absent.
    #[error("{command} frame without {header} header")]
    MissingHeader {
        /// Frame command.
        command: &'static str,
        /// Header name.
        header: &'static str,
    },
}

/// One frame: command, ordered headers, body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StompFrame {
    /// Command line.
    pub command: String,
    /// Headers in wire order. Repeated names keep the first value.
    pub headers: Vec<(String, String)>,
    /// Frame body.
    pub body: String,
}

impl StompFrame {
    /// Frame with no headers and an empty body.
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Self::default()
        }
    }

    /// Append a header.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Render to wire text, adding `content-length` for non-empty bodies.
    pub fn encode(&self) -> String {
        let raw = escapes_exempt(&self.command);
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            if raw {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            } else {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }

    /// Parse every frame in a message. Heartbeats yield nothing.
    pub fn parse_all(text: &str) -> Result<Vec<StompFrame>, StompError> {
        let mut frames = Vec::new();
        let mut rest = text;
        loop {
            rest = rest.trim_start_matches(['\r', '\n']);
            if rest.is_empty() {
                return Ok(frames);
            }
            let (frame, tail) = parse_one(rest)?;
            frames.push(frame);
            rest = tail;
        }
    }
}

impl fmt::Display for StompFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        if let Some(destination) = self.get("destination") {
            write!(f, " {destination}")?;
        }
        Ok(())
    }
}

fn escapes_exempt(command: &str) -> bool {
    matches!(command, "CONNECT" | "CONNECTED")
}

fn next_line(text: &str) -> Result<(&str, &str), StompError> {
    let end = text.find('\n').ok_or(StompError::Unterminated)?;
    let line = &text[..end];
    Ok((line.strip_suffix('\r').unwrap_or(line), &text[end + 1..]))
}

fn parse_one(text: &str) -> Result<(StompFrame, &str), StompError> {
    let (command, mut rest) = next_line(text)?;
    let raw = escapes_exempt(command);
    let mut frame = StompFrame::new(command);

    loop {
        let (line, tail) = next_line(rest)?;
        rest = tail;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| StompError::BadHeader(line.to_string()))?;
        let (name, value) = if raw {
            (name.to_string(), value.to_string())
        } else {
            (unescape(name)?, unescape(value)?)
        };
        frame.headers.push((name, value));
    }

    let body_len = match frame.get("content-length") {
        Some(len) => len
            .trim()
            .parse::<usize>()
            .map_err(|_| StompError::ContentLength(len.to_string()))?,
        None => rest.find(NUL).ok_or(StompError::Unterminated)?,
    };
    let body = rest
        .get(..body_len)
        .ok_or_else(|| StompError::ContentLength(body_len.to_string()))?;
    let tail = rest[body_len..].strip_prefix(NUL).ok_or(StompError::Unterminated)?;
    frame.body = body.to_string();
    Ok((frame, tail))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::BadEscape(value.to_string())),
        }
    }
    Ok(out)
}

// =============================================================================
// HEARTBEAT NEGOTIATION
// =============================================================================

/// The `heart-beat` header: `outgoing,incoming` in milliseconds, 0 meaning
/// "not at all".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// How often the sender promises to beat.
    pub outgoing_ms: u64,
    /// How often the sender wants to hear from its peer.
    pub incoming_ms: u64,
}

impl HeartBeat {
    /// Build from both intervals.
    pub fn new(outgoing_ms: u64, incoming_ms: u64) -> Self {
        Self { outgoing_ms, incoming_ms }
    }

    /// Parse `cx,cy`. Absent or malformed headers mean no heartbeats.
    pub fn parse(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.split_once(','))
            .and_then(|(out, inc)| Some(Self::new(out.trim().parse().ok()?, inc.trim().parse().ok()?)))
            .unwrap_or_default()
    }

    /// Header value.
    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing_ms, self.incoming_ms)
    }

    /// Agreed periods from our side `self` and the peer's reply:
    /// `(send every, expect traffic every)`. Zero disables a direction.
    pub fn negotiate(&self, peer: &HeartBeat) -> (u64, u64) {
        let agree = |ours: u64, theirs: u64| if ours == 0 || theirs == 0 { 0 } else { ours.max(theirs) };
        (
            agree(self.outgoing_ms, peer.incoming_ms),
            agree(self.incoming_ms, peer.outgoing_ms),
        )
    }
}
