//! Outstanding `sync`, `resync` and `seek` requests awaiting a reply.
//!
//! Replies are matched by `request_id`; anything unanswered past the timeout is
//! expired and reported so the caller can log it.

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingKind {
    /// Clock sync sent at local time `sent_at`.
    Sync { sent_at: i64 },
    Resync,
    Seek,
}

impl PendingKind {
    pub fn label(&self) -> &'static str {
        match self {
            PendingKind::Sync { .. } => "sync",
            PendingKind::Resync => "resync",
            PendingKind::Seek => "seek",
        }
    }
}

#[derive(Debug)]
pub struct PendingRequests {
    next_id: u64,
    pending: HashMap<u64, (PendingKind, i64)>,
    timeout_ms: i64,
}

impl PendingRequests {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
            timeout_ms: i64::try_from(timeout_ms).unwrap_or(i64::MAX),
        }
    }

    /// Register a request issued at `local_now` and return its id.
    pub fn issue(&mut self, kind: PendingKind, local_now: i64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(id, (kind, local_now));
        id
    }

    /// Claim the request a reply answers. Unknown or expired ids yield `None`.
    pub fn resolve(&mut self, request_id: u64) -> Option<PendingKind> {
        self.pending.remove(&request_id).map(|(kind, _)| kind)
    }

    /// Drop and return every request older than the timeout.
    pub fn expire(&mut self, local_now: i64) -> Vec<(u64, PendingKind)> {
        let timeout_ms = self.timeout_ms;
        let mut expired: Vec<(u64, PendingKind)> = self
            .pending
            .iter()
            .filter(|(_, (_, issued))| local_now.saturating_sub(*issued) >= timeout_ms)
            .map(|(id, (kind, _))| (*id, *kind))
            .collect();
        for (id, _) in &expired {
            self.pending.remove(id);
        }
        expired.sort_by_key(|(id, _)| *id);
        expired
    }

    /// Forget everything, e.g. after the connection dropped.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
