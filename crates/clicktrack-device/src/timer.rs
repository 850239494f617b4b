//! Single-slot deferred action.
//!
//! Arming replaces whatever was pending, so at most one action is ever outstanding.

#[derive(Debug)]
pub struct TimerSlot<A> {
    armed: Option<(i64, A)>,
}

impl<A> Default for TimerSlot<A> {
    fn default() -> Self {
        Self { armed: None }
    }
}

impl<A> TimerSlot<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `action` for local time `deadline` (ms). Returns the displaced action.
    pub fn arm(&mut self, deadline: i64, action: A) -> Option<A> {
        self.armed.replace((deadline, action)).map(|(_, a)| a)
    }

    pub fn cancel(&mut self) -> Option<A> {
        self.armed.take().map(|(_, a)| a)
    }

    pub fn deadline(&self) -> Option<i64> {
        self.armed.as_ref().map(|(d, _)| *d)
    }

    pub fn pending(&self) -> Option<&A> {
        self.armed.as_ref().map(|(_, a)| a)
    }

    /// Remove and return the action if its deadline has passed.
    pub fn take_due(&mut self, now: i64) -> Option<A> {
        match self.armed {
            Some((deadline, _)) if deadline <= now => self.cancel(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arming_replaces_pending_action() {
        let mut slot = TimerSlot::new();
        assert_eq!(slot.arm(100, "first"), None);
        assert_eq!(slot.arm(50, "second"), Some("first"));
        assert_eq!(slot.deadline(), Some(50));
        assert_eq!(slot.pending(), Some(&"second"));
    }

    #[test]
    fn take_due_respects_deadline() {
        let mut slot = TimerSlot::new();
        slot.arm(100, 7);
        assert_eq!(slot.take_due(99), None);
        assert_eq!(slot.take_due(100), Some(7));
        assert_eq!(slot.take_due(1_000), None);
        assert_eq!(slot.deadline(), None);
    }

    #[test]
    fn cancel_clears_slot() {
        let mut slot = TimerSlot::new();
        slot.arm(10, ());
        assert_eq!(slot.cancel(), Some(()));
        assert_eq!(slot.cancel(), None);
    }
}
