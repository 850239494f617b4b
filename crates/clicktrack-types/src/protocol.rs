//! WebSocket frames exchanged on `/ws`.
//!
//! Every frame is a JSON object tagged by `"type"`. Requests that expect a direct
//! reply carry a `request_id` chosen by the sender; the hub echoes it back.

use serde::{Deserialize, Serialize};

use crate::PlaybackSession;

/// Frames sent by devices and operators to the hub.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Clock sync; `sent_at` is the sender's local clock in ms.
    Sync { request_id: u64, sent_at: i64 },
    /// Ask for the current session without changing it.
    Resync { request_id: u64 },
    /// Start `track_id` for everyone after the lead time.
    Play { request_id: u64, track_id: String },
    /// End the live session.
    Stop,
    /// Move the live session to `target_seconds`.
    Seek { request_id: u64, target_seconds: f64 },
}

/// Frames sent by the hub.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame on every connection.
    Hello { connection_id: String },
    SyncReply {
        request_id: u64,
        coordinator_now: i64,
        echoed_sent_at: i64,
    },
    ResyncReply {
        request_id: u64,
        coordinator_now: i64,
        session: Option<PlaybackSession>,
    },
    PlayAccepted {
        request_id: u64,
        track_id: String,
        start_at: i64,
    },
    PlayRejected { request_id: u64, error: String },
    SeekAccepted { request_id: u64, start_at: i64 },
    SeekRejected { request_id: u64, error: String },
    /// Broadcast: a new session begins at `start_at`.
    Play { track_id: String, start_at: i64 },
    /// Broadcast: the session ended.
    Stop,
    /// Broadcast: the live session was re-anchored.
    Seek { track_id: String, start_at: i64 },
}

impl ServerMessage {
    /// Request id carried by direct replies, `None` for broadcasts and `hello`.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerMessage::SyncReply { request_id, .. }
            | ServerMessage::ResyncReply { request_id, .. }
            | ServerMessage::PlayAccepted { request_id, .. }
            | ServerMessage::PlayRejected { request_id, .. }
            | ServerMessage::SeekAccepted { request_id, .. }
            | ServerMessage::SeekRejected { request_id, .. } => Some(*request_id),
            ServerMessage::Hello { .. }
            | ServerMessage::Play { .. }
            | ServerMessage::Stop
            | ServerMessage::Seek { .. } => None,
        }
    }
}
