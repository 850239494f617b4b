//! Audio playback engine seam.
//!
//! The state machine only talks to [`PlaybackEngine`]; the cpal-backed
//! implementation lives in [`cpal_engine`].

pub mod cpal_engine;
pub mod decode;
pub mod device;
pub mod resample;

use std::time::Duration;

use crate::error::DeviceError;

/// Raised by the engine outside of any call into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineEvent {
    /// Playback reached the end of the track. `generation` is the value returned by
    /// the [`PlaybackEngine::play`] call that started it.
    Ended { track_id: String, generation: u64 },
}

pub trait PlaybackEngine {
    /// Fetch and prepare `track_id` from `url` so it can start instantly later.
    fn load(&mut self, track_id: &str, url: &str) -> Result<(), DeviceError>;

    fn is_loaded(&self, track_id: &str) -> bool;

    /// Track length, when known.
    fn duration(&self, track_id: &str) -> Option<Duration>;

    /// Replace whatever is playing with `track_id` from `position`.
    ///
    /// Returns the generation tagged on this playback's `Ended` event.
    fn play(&mut self, track_id: &str, position: Duration) -> Result<u64, DeviceError>;

    /// Move the current playback without restarting it.
    fn seek(&mut self, position: Duration) -> Result<(), DeviceError>;

    /// Halt output. Harmless when nothing is playing.
    fn stop(&mut self);
}
