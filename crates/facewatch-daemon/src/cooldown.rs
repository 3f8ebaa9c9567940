//! Per-identity rate limiting of recognition events
//!
//! Owned and mutated only by the capture loop, so no synchronization is
//! needed. `now` is passed in by the caller, which keeps the gating logic
//! deterministic under test.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks the last event time per face id
#[derive(Debug)]
pub struct CooldownTable {
    period: Duration,
    last_event: HashMap<String, Instant>,
}

impl CooldownTable {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_event: HashMap::new(),
        }
    }

    /// Whether an event for `face_id` may fire at `now`
    ///
    /// Fires when no event has been recorded yet or the cooldown period
    /// has elapsed since the last one; on fire the last-event time is
    /// updated.
    pub fn should_fire(&mut self, face_id: &str, now: Instant) -> bool {
        match self.last_event.get(face_id) {
            Some(last) if now.duration_since(*last) < self.period => false,
            _ => {
                self.last_event.insert(face_id.to_string(), now);
                true
            }
        }
    }
}
