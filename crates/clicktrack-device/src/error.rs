//! Device-side failures.
//!
//! None of these are fatal: the device logs them and converges on the next resync.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// A play or resync named a track this device has not loaded.
    #[error("Track {0} not loaded yet.")]
    NotReady(String),
    /// The engine could not fetch, decode or start a track.
    #[error("failed to load track {track_id}: {reason}")]
    EngineLoadFailure { track_id: String, reason: String },
    /// A sync or resync request went unanswered.
    #[error("{kind} request {request_id} timed out")]
    SyncTimeout { kind: &'static str, request_id: u64 },
}

impl DeviceError {
    pub fn load_failure(track_id: &str, err: impl std::fmt::Display) -> Self {
        DeviceError::EngineLoadFailure {
            track_id: track_id.to_string(),
            reason: err.to_string(),
        }
    }
}
