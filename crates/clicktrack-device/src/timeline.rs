//! Operator timeline: progress, `m:ss` rendering and the seek gesture latch.

use clicktrack_types::PlaybackSession;

/// Snapshot of the live session at a corrected coordinator time.
#[derive(Clone, Debug, PartialEq)]
pub struct Timeline {
    pub track_id: String,
    pub elapsed_ms: i64,
    pub duration_ms: Option<u64>,
}

impl Timeline {
    pub fn at(session: &PlaybackSession, corrected_now: i64, duration_ms: Option<u64>) -> Self {
        Self {
            track_id: session.track_id.clone(),
            elapsed_ms: session.elapsed_ms(corrected_now),
            duration_ms,
        }
    }

    /// Fraction played in `[0, 1]`, when the duration is known.
    pub fn progress(&self) -> Option<f64> {
        let duration = self.duration_ms.filter(|d| *d > 0)? as f64;
        Some((self.elapsed_ms as f64 / duration).clamp(0.0, 1.0))
    }

    pub fn finished(&self) -> bool {
        self.duration_ms
            .map(|d| self.elapsed_ms >= 0 && self.elapsed_ms as u64 >= d)
            .unwrap_or(false)
    }

    pub fn render(&self) -> String {
        let elapsed = format_time(self.elapsed_ms as f64 / 1000.0);
        let total = self
            .duration_ms
            .map(|d| format_time(d as f64 / 1000.0))
            .unwrap_or_else(|| "--:--".to_string());
        format!("Now playing: {} {elapsed} / {total}", self.track_id)
    }
}

/// One-line status for an optional session: the timeline, or the idle message
/// once there is no session or the track has run out.
pub fn status_line(
    session: Option<&PlaybackSession>,
    corrected_now: i64,
    duration_ms: Option<u64>,
) -> String {
    match session.map(|s| Timeline::at(s, corrected_now, duration_ms)) {
        Some(timeline) if !timeline.finished() => timeline.render(),
        _ => NOTHING_PLAYING.to_string(),
    }
}

pub const NOTHING_PLAYING: &str = "No song currently playing.";

/// `m:ss`, flooring to whole seconds. Negative and NaN render as `0:00`.
pub fn format_time(seconds: f64) -> String {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Seek target for a gesture fraction; the fraction is clamped to `[0, 1]`.
pub fn seek_target_seconds(fraction: f64, duration_ms: u64) -> f64 {
    let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
    fraction * duration_ms as f64 / 1000.0
}

/// Seek latch: one gesture at a time. The target is fixed when the gesture
/// begins and handed back once the hub has answered.
#[derive(Debug, Default)]
pub struct SeekGesture {
    target_seconds: Option<f64>,
}

impl SeekGesture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a gesture at `fraction` of the track. Returns the target in seconds,
    /// or `None` while another gesture is still in flight.
    pub fn begin(&mut self, fraction: f64, duration_ms: u64) -> Option<f64> {
        if self.target_seconds.is_some() {
            return None;
        }
        let target = seek_target_seconds(fraction, duration_ms);
        self.target_seconds = Some(target);
        Some(target)
    }

    /// End the gesture and return its target.
    pub fn release(&mut self) -> Option<f64> {
        self.target_seconds.take()
    }
}
