//! Shared types for the clicktrack hub and its devices.
//!
//! Holds the WebSocket protocol, the authoritative playback session value, catalog
//! payloads served over HTTP, and the millisecond clock both sides agree to use.

pub mod protocol;

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub use protocol::{ClientMessage, ServerMessage};

/// The hub's single record of what is live.
///
/// `start_at` is a coordinator-clock timestamp (ms since the Unix epoch) at which
/// elapsed playback time is defined to be zero.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PlaybackSession {
    /// Catalog id of the live track.
    pub track_id: String,
    /// Coordinator time (ms) when the track position was zero.
    pub start_at: i64,
}

impl PlaybackSession {
    pub fn new(track_id: impl Into<String>, start_at: i64) -> Self {
        Self {
            track_id: track_id.into(),
            start_at,
        }
    }

    /// Milliseconds of playback at coordinator time `now` (negative before start).
    ///
    /// Saturates at the `i64` limits instead of wrapping.
    pub fn elapsed_ms(&self, now: i64) -> i64 {
        now.saturating_sub(self.start_at)
    }
}

/// Catalog entry describing one playable track.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TrackSummary {
    /// Stable id (file stem).
    pub id: String,
    /// Display title.
    pub title: String,
    /// Hub-relative URL of the audio file.
    pub url: String,
    /// Duration from the container header, when the hub could read it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// `GET /tracks` payload.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TracksResponse {
    pub tracks: Vec<TrackSummary>,
}

/// `GET /config` payload used by operators to share the join address.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HubConfigResponse {
    /// Public HTTP base URL, without trailing slash.
    pub base_url: String,
    /// WebSocket endpoint devices connect to.
    pub ws_url: String,
    /// Port the hub is listening on.
    pub port: u16,
}

/// `GET /health` payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error body returned by HTTP handlers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorResponse {
    pub error: String,
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Millisecond time source.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Reads the system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        unix_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_negative_before_start() {
        let session = PlaybackSession::new("trackA", 3_000);
        assert_eq!(session.elapsed_ms(1_000), -2_000);
        assert_eq!(session.elapsed_ms(5_000), 2_000);
    }

    #[test]
    fn elapsed_saturates_for_extreme_anchors() {
        let ancient = PlaybackSession::new("trackA", i64::MIN + 10);
        assert_eq!(ancient.elapsed_ms(10_000), i64::MAX);
        let distant = PlaybackSession::new("trackA", i64::MAX);
        assert_eq!(distant.elapsed_ms(-10), i64::MIN);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        clock.advance(250);
        assert_eq!(clock.now_ms(), 1_250);
        clock.set(10);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn track_summary_omits_unknown_duration() {
        let track = TrackSummary {
            id: "intro".to_string(),
            title: "intro".to_string(),
            url: "/audio/intro.mp3".to_string(),
            duration_ms: None,
        };
        let json = serde_json::to_value(&track).unwrap();
        assert!(json.get("duration_ms").is_none());
    }
}
