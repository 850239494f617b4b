//! Authoritative playback session and the decisions that change it.
//!
//! `Coordinator` is a plain value: every inbound frame is turned into an optional
//! direct reply and an optional broadcast, and the hub actor performs the sends.

use std::sync::Arc;

use clicktrack_types::{ClientMessage, PlaybackSession, ServerMessage};
use thiserror::Error;

use crate::catalog::TrackCatalog;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Unknown track.")]
    UnknownTrack,
    #[error("No active playback session.")]
    NoActiveSession,
    #[error("Seek target out of range.")]
    SeekOutOfRange,
    #[error("Failed to play track.")]
    CatalogUnavailable(String),
}

/// Outcome of one inbound frame.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Dispatch {
    /// Sent only to the issuing connection.
    pub reply: Option<ServerMessage>,
    /// Sent to every registered connection, issuer included.
    pub broadcast: Option<ServerMessage>,
}

pub struct Coordinator {
    session: Option<PlaybackSession>,
    lead_time_ms: i64,
    catalog: Arc<dyn TrackCatalog>,
}

impl Coordinator {
    pub fn new(catalog: Arc<dyn TrackCatalog>, lead_time_ms: u64) -> Self {
        Self {
            session: None,
            lead_time_ms: i64::try_from(lead_time_ms).unwrap_or(i64::MAX),
            catalog,
        }
    }

    /// Validate `track_id` and replace the session with one starting after the lead time.
    pub fn play(&mut self, track_id: &str, now: i64) -> Result<PlaybackSession, CoordinatorError> {
        match self.catalog.contains(track_id) {
            Ok(true) => {}
            Ok(false) => return Err(CoordinatorError::UnknownTrack),
            Err(err) => return Err(CoordinatorError::CatalogUnavailable(format!("{err:#}"))),
        }
        let session = PlaybackSession::new(track_id, now.saturating_add(self.lead_time_ms));
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Clear the session. Idempotent.
    pub fn stop(&mut self) {
        self.session = None;
    }

    /// Re-anchor the live session so that `target_seconds` is playing at `now`.
    pub fn seek(
        &mut self,
        target_seconds: f64,
        now: i64,
    ) -> Result<PlaybackSession, CoordinatorError> {
        let session = self
            .session
            .as_mut()
            .ok_or(CoordinatorError::NoActiveSession)?;
        let start_at = seek_offset_ms(target_seconds)
            .and_then(|offset| now.checked_sub(offset))
            .ok_or(CoordinatorError::SeekOutOfRange)?;
        session.start_at = start_at;
        Ok(session.clone())
    }

    /// Current session snapshot.
    pub fn resync(&self) -> Option<PlaybackSession> {
        self.session.clone()
    }

    pub fn dispatch(&mut self, msg: ClientMessage, now: i64) -> Dispatch {
        match msg {
            ClientMessage::Sync {
                request_id,
                sent_at,
            } => Dispatch {
                reply: Some(ServerMessage::SyncReply {
                    request_id,
                    coordinator_now: now,
                    echoed_sent_at: sent_at,
                }),
                broadcast: None,
            },
            ClientMessage::Resync { request_id } => Dispatch {
                reply: Some(ServerMessage::ResyncReply {
                    request_id,
                    coordinator_now: now,
                    session: self.resync(),
                }),
                broadcast: None,
            },
            ClientMessage::Play {
                request_id,
                track_id,
            } => match self.play(&track_id, now) {
                Ok(session) => {
                    tracing::info!(
                        track_id = %session.track_id,
                        start_at = session.start_at,
                        "broadcast play"
                    );
                    Dispatch {
                        reply: Some(ServerMessage::PlayAccepted {
                            request_id,
                            track_id: session.track_id.clone(),
                            start_at: session.start_at,
                        }),
                        broadcast: Some(ServerMessage::Play {
                            track_id: session.track_id,
                            start_at: session.start_at,
                        }),
                    }
                }
                Err(err) => {
                    match &err {
                        CoordinatorError::CatalogUnavailable(cause) => {
                            tracing::warn!(track_id = %track_id, error = %cause, "catalog unavailable")
                        }
                        _ => tracing::warn!(track_id = %track_id, error = %err, "play rejected"),
                    }
                    Dispatch {
                        reply: Some(ServerMessage::PlayRejected {
                            request_id,
                            error: err.to_string(),
                        }),
                        broadcast: None,
                    }
                }
            },
            ClientMessage::Stop => {
                self.stop();
                tracing::info!("broadcast stop");
                Dispatch {
                    reply: None,
                    broadcast: Some(ServerMessage::Stop),
                }
            }
            ClientMessage::Seek {
                request_id,
                target_seconds,
            } => match self.seek(target_seconds, now) {
                Ok(session) => {
                    tracing::info!(
                        track_id = %session.track_id,
                        start_at = session.start_at,
                        target_seconds,
                        "broadcast seek"
                    );
                    Dispatch {
                        reply: Some(ServerMessage::SeekAccepted {
                            request_id,
                            start_at: session.start_at,
                        }),
                        broadcast: Some(ServerMessage::Seek {
                            track_id: session.track_id,
                            start_at: session.start_at,
                        }),
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "seek rejected");
                    Dispatch {
                        reply: Some(ServerMessage::SeekRejected {
                            request_id,
                            error: err.to_string(),
                        }),
                        broadcast: None,
                    }
                }
            },
        }
    }
}

/// Largest seek offset accepted, in ms. Keeps every `start_at` far from the
/// `i64` limits so device-side elapsed math cannot overflow.
const MAX_SEEK_MS: i64 = i64::MAX / 4;

/// Seek target in whole milliseconds, clamped to zero; NaN seeks to 0.
///
/// `None` when the target is beyond [`MAX_SEEK_MS`] (including +inf).
fn seek_offset_ms(target_seconds: f64) -> Option<i64> {
    if target_seconds.is_nan() || target_seconds <= 0.0 {
        return Some(0);
    }
    let ms = (target_seconds * 1000.0).round();
    if ms > MAX_SEEK_MS as f64 {
        return None;
    }
    Some(ms as i64)
}
