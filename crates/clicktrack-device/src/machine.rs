//! Device playback state machine.
//!
//! Reconciles hub broadcasts (`play`, `stop`, `seek`), resync snapshots and engine
//! events into one of three views. The machine never reads a clock itself: every
//! input carries the caller's local time in ms, and the corrected coordinator time
//! is `local_now + offset`.

use std::time::Duration;

use clicktrack_types::PlaybackSession;

use crate::engine::{EngineEvent, PlaybackEngine};
use crate::error::DeviceError;
use crate::timer::TimerSlot;

/// Deferred starts further out than this are suspicious (bad offset or clock jump).
const LARGE_DELAY_MS: i64 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackView {
    Idle,
    Scheduled { track_id: String, start_at: i64 },
    Playing { track_id: String, start_at: i64 },
}

impl PlaybackView {
    pub fn track_id(&self) -> Option<&str> {
        match self {
            PlaybackView::Idle => None,
            PlaybackView::Scheduled { track_id, .. } | PlaybackView::Playing { track_id, .. } => {
                Some(track_id.as_str())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerAction {
    StartPlayback { track_id: String, start_at: i64 },
    SettleResync,
}

/// Something the machine needs sent to the hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineRequest {
    Resync,
}

pub struct PlaybackMachine<E> {
    engine: E,
    view: PlaybackView,
    timer: TimerSlot<TimerAction>,
    offset_ms: i64,
    settle_delay_ms: i64,
    generation: Option<u64>,
}

impl<E: PlaybackEngine> PlaybackMachine<E> {
    pub fn new(engine: E, settle_delay_ms: u64) -> Self {
        Self {
            engine,
            view: PlaybackView::Idle,
            timer: TimerSlot::new(),
            offset_ms: 0,
            settle_delay_ms: i64::try_from(settle_delay_ms).unwrap_or(i64::MAX),
            generation: None,
        }
    }

    pub fn view(&self) -> &PlaybackView {
        &self.view
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn clock_offset(&self) -> i64 {
        self.offset_ms
    }

    pub fn set_clock_offset(&mut self, offset_ms: i64) {
        self.offset_ms = offset_ms;
    }

    /// Local time (ms) at which [`poll_timer`](Self::poll_timer) next has work.
    pub fn next_deadline(&self) -> Option<i64> {
        self.timer.deadline()
    }

    pub fn pending_action(&self) -> Option<&TimerAction> {
        self.timer.pending()
    }

    /// Hub broadcast: a new session starts at `session.start_at`.
    pub fn on_play(&mut self, session: PlaybackSession, local_now: i64) -> Result<(), DeviceError> {
        self.ensure_loaded(&session.track_id)?;
        self.schedule(session, local_now);
        Ok(())
    }

    /// Hub broadcast or local request: go idle.
    pub fn on_stop(&mut self) {
        if self.view != PlaybackView::Idle {
            tracing::info!("playback stopped");
        }
        self.halt();
    }

    /// Rebuild the view from a resync snapshot.
    pub fn on_resync(
        &mut self,
        session: Option<PlaybackSession>,
        local_now: i64,
    ) -> Result<(), DeviceError> {
        match session {
            None => {
                tracing::info!("No song currently playing.");
                self.halt();
                Ok(())
            }
            Some(session) => self.reconcile(session, local_now),
        }
    }

    /// Hub broadcast: the live session was re-anchored.
    ///
    /// Only applies to the track this device is tracking; otherwise ignored.
    pub fn on_seek(&mut self, session: PlaybackSession, local_now: i64) -> Result<(), DeviceError> {
        if self.view.track_id() != Some(session.track_id.as_str()) {
            tracing::debug!(track_id = %session.track_id, view = ?self.view, "ignoring seek");
            return Ok(());
        }
        self.reconcile(session, local_now)
    }

    pub fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Ended {
                track_id,
                generation,
            } => {
                let current = matches!(
                    &self.view,
                    PlaybackView::Playing { track_id: playing, .. } if *playing == track_id
                ) && self.generation == Some(generation);
                if current {
                    tracing::info!(track_id = %track_id, "Playback finished.");
                    self.halt();
                } else {
                    tracing::debug!(track_id = %track_id, generation, "stale end-of-track");
                }
            }
        }
    }

    /// Run the armed action if it is due.
    pub fn poll_timer(&mut self, local_now: i64) -> Result<Option<MachineRequest>, DeviceError> {
        match self.timer.take_due(local_now) {
            None => Ok(None),
            Some(TimerAction::StartPlayback { track_id, start_at }) => {
                self.start(PlaybackSession::new(track_id, start_at), Duration::ZERO)?;
                self.timer
                    .arm(local_now.saturating_add(self.settle_delay_ms), TimerAction::SettleResync);
                Ok(None)
            }
            Some(TimerAction::SettleResync) => Ok(Some(MachineRequest::Resync)),
        }
    }

    fn ensure_loaded(&mut self, track_id: &str) -> Result<(), DeviceError> {
        if self.engine.is_loaded(track_id) {
            return Ok(());
        }
        self.halt();
        Err(DeviceError::NotReady(track_id.to_string()))
    }

    fn halt(&mut self) {
        self.timer.cancel();
        self.engine.stop();
        self.generation = None;
        self.view = PlaybackView::Idle;
    }

    fn schedule(&mut self, session: PlaybackSession, local_now: i64) {
        self.halt();
        let deadline = session.start_at.saturating_sub(self.offset_ms);
        let delay_ms = deadline.saturating_sub(local_now).max(0);
        if delay_ms > LARGE_DELAY_MS {
            tracing::warn!(track_id = %session.track_id, delay_ms, "large delay detected");
        }
        tracing::info!(
            track_id = %session.track_id,
            start_at = session.start_at,
            delay_ms,
            "scheduled"
        );
        self.timer.arm(
            local_now.saturating_add(delay_ms),
            TimerAction::StartPlayback {
                track_id: session.track_id.clone(),
                start_at: session.start_at,
            },
        );
        self.view = PlaybackView::Scheduled {
            track_id: session.track_id,
            start_at: session.start_at,
        };
    }

    fn reconcile(&mut self, session: PlaybackSession, local_now: i64) -> Result<(), DeviceError> {
        self.ensure_loaded(&session.track_id)?;
        let elapsed_ms = session.elapsed_ms(local_now.saturating_add(self.offset_ms));
        if elapsed_ms < 0 {
            self.schedule(session, local_now);
            return Ok(());
        }

        let elapsed = Duration::from_millis(elapsed_ms as u64);
        if let Some(duration) = self.engine.duration(&session.track_id) {
            if elapsed >= duration {
                tracing::info!(track_id = %session.track_id, elapsed_ms, "Song already finished.");
                self.halt();
                return Ok(());
            }
        }

        self.timer.cancel();
        let same_playback = matches!(
            &self.view,
            PlaybackView::Playing { track_id, .. } if *track_id == session.track_id
        ) && self.generation.is_some();
        if same_playback {
            match self.engine.seek(elapsed) {
                Ok(()) => {
                    tracing::info!(track_id = %session.track_id, elapsed_ms, "seeked");
                    self.view = PlaybackView::Playing {
                        track_id: session.track_id,
                        start_at: session.start_at,
                    };
                    return Ok(());
                }
                Err(err) => tracing::debug!(error = %err, "seek failed; restarting"),
            }
        }
        self.start(session, elapsed)
    }

    fn start(&mut self, session: PlaybackSession, position: Duration) -> Result<(), DeviceError> {
        match self.engine.play(&session.track_id, position) {
            Ok(generation) => {
                tracing::info!(
                    track_id = %session.track_id,
                    position_ms = position.as_millis() as u64,
                    "started"
                );
                self.generation = Some(generation);
                self.view = PlaybackView::Playing {
                    track_id: session.track_id,
                    start_at: session.start_at,
                };
                Ok(())
            }
            Err(err) => {
                tracing::warn!(track_id = %session.track_id, error = %err, "engine failed to start");
                self.halt();
                Err(err)
            }
        }
    }
}
