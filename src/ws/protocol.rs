//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::snapshot::MatchSnapshot;
use crate::game::{Command, ConnectionId, Item, MatchId, Position};

/// Largest text frame the server will try to parse
pub const MAX_FRAME_BYTES: usize = 4 * 1024;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter (or rename in) the lobby
    JoinLobby { username: String },

    /// Invite another lobby user to a match
    ChallengeUser { opponent: ConnectionId },

    /// Answer a challenge received from `from`
    ChallengeResponse { from: ConnectionId, accepted: bool },

    /// Start a match against the bot
    PlayWithBot,

    RequestReshuffle { match_id: MatchId },

    PlayerReady { match_id: MatchId },

    PlayerMove {
        match_id: MatchId,
        from: Position,
        to: Position,
    },

    TieBreakChoice { match_id: MatchId, item: Item },

    RequestReplay { match_id: MatchId },

    ExitToLobby { match_id: MatchId },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

impl ClientMsg {
    /// The match-level command this message carries, if any
    pub fn match_command(&self) -> Option<(MatchId, Command)> {
        let routed = match *self {
            ClientMsg::RequestReshuffle { match_id } => (match_id, Command::Reshuffle),
            ClientMsg::PlayerReady { match_id } => (match_id, Command::Ready),
            ClientMsg::PlayerMove { match_id, from, to } => (match_id, Command::Move { from, to }),
            ClientMsg::TieBreakChoice { match_id, item } => (match_id, Command::TieChoice { item }),
            ClientMsg::RequestReplay { match_id } => (match_id, Command::Replay),
            _ => return None,
        };
        Some(routed)
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        connection_id: ConnectionId,
        server_time: u64,
    },

    /// Everyone currently in the lobby
    LobbyData { users: Vec<LobbyEntry> },

    ChallengeRequest {
        from: ConnectionId,
        from_username: String,
    },

    ChallengeDeclined { reason: String },

    /// A match was created with this connection as a participant
    MatchStarted { snapshot: MatchSnapshot },

    /// Sent after every accepted change to the match
    StateChanged { snapshot: MatchSnapshot },

    /// Both tie-break picks were `item`; pick again
    TieRoundRepeated { item: Item, snapshot: MatchSnapshot },

    /// Sent to a participant after it exits its match
    ReturnedToLobby,

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMsg::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Lobby listing row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyEntry {
    pub connection_id: ConnectionId,
    pub username: String,
    pub in_match: bool,
    pub joined_at: DateTime<Utc>,
}

/// Frames the server refuses to act on
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Frame of {0} bytes exceeds the size limit")]
    FrameTooLarge(usize),

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::FrameTooLarge(_) => "frame_too_large",
            ProtocolError::Malformed(_) => "bad_message",
        }
    }
}

/// Parse a text frame into a client message
pub fn parse_client_msg(text: &str) -> Result<ClientMsg, ProtocolError> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    Ok(serde_json::from_str(text)?)
}
