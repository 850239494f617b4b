//! Round-trip clock offset estimation against the hub.
//!
//! `corrected_now = local_now + offset_ms`. The offset is recomputed on every
//! connection and defaults to zero.

/// One sync sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockEstimate {
    pub offset_ms: i64,
    pub rtt_ms: i64,
}

/// Estimate from a single `sync` exchange.
///
/// Returns `None` when the reply claims to have been received before it was sent.
pub fn estimate(sent_local: i64, received_local: i64, coordinator_now: i64) -> Option<ClockEstimate> {
    let rtt_ms = received_local - sent_local;
    if rtt_ms < 0 {
        return None;
    }
    Some(ClockEstimate {
        offset_ms: coordinator_now - (sent_local + rtt_ms / 2),
        rtt_ms,
    })
}

/// Burst sampler that keeps the lowest-RTT estimate of the current connection.
#[derive(Debug)]
pub struct ClockSync {
    offset_ms: i64,
    best: Option<ClockEstimate>,
    samples_wanted: u32,
    samples_done: u32,
}

impl ClockSync {
    pub fn new(samples_wanted: u32) -> Self {
        Self {
            offset_ms: 0,
            best: None,
            samples_wanted: samples_wanted.max(1),
            samples_done: 0,
        }
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms
    }

    pub fn corrected_now(&self, local_now: i64) -> i64 {
        local_now.saturating_add(self.offset_ms)
    }

    /// Start a new burst. The previous offset stays until a reply replaces it.
    pub fn begin_burst(&mut self) {
        self.best = None;
        self.samples_done = 0;
    }

    pub fn burst_complete(&self) -> bool {
        self.samples_done >= self.samples_wanted
    }

    /// Fold in a reply. Returns the estimate when it became the adopted one.
    pub fn record(
        &mut self,
        sent_local: i64,
        received_local: i64,
        coordinator_now: i64,
    ) -> Option<ClockEstimate> {
        self.samples_done += 1;
        let sample = match estimate(sent_local, received_local, coordinator_now) {
            Some(sample) => sample,
            None => {
                tracing::warn!(sent_local, received_local, "discarding sync reply with negative rtt");
                return None;
            }
        };
        let better = self.best.map(|best| sample.rtt_ms < best.rtt_ms).unwrap_or(true);
        if !better {
            return None;
        }
        self.best = Some(sample);
        self.offset_ms = sample.offset_ms;
        Some(sample)
    }

    /// Count a sync request that never got an answer.
    pub fn record_timeout(&mut self) {
        self.samples_done += 1;
    }
}
