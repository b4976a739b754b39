use crate::config::GuardianConfig;
use crate::types::{PositionFix, SafeZone, SignalEvent};

/// Detects "stationary too long outside the safe zone" from an irregular
/// stream of position fixes. Event-driven: correctness does not depend on
/// any fixed fix rate.
pub struct StationaryDetector {
    movement_threshold_m: f64,
    stationary_limit_secs: f64,
    safe_zone: Option<SafeZone>,
    last_fix: Option<PositionFix>,
    stationary_since: Option<f64>,
    episodes_fired: u64,
}

impl StationaryDetector {
    pub fn new(config: &GuardianConfig) -> Self {
        StationaryDetector {
            movement_threshold_m: config.movement_threshold_m,
            stationary_limit_secs: config.stationary_limit_secs,
            safe_zone: config.safe_zone,
            last_fix: None,
            stationary_since: None,
            episodes_fired: 0,
        }
    }

    /// Feed one fix. Fires `StationaryTooLong` at most once per continuous
    /// stationary episode; the episode clock must be freshly re-established
    /// before it can fire again.
    pub fn observe(&mut self, fix: &PositionFix) -> Vec<SignalEvent> {
        let mut events = Vec::new();

        // Inside the safe zone nothing counts, and any running episode ends.
        if let Some(zone) = &self.safe_zone {
            if zone.contains(fix) {
                self.stationary_since = None;
                self.last_fix = Some(*fix);
                return events;
            }
        }

        let displacement = match &self.last_fix {
            Some(prev) => prev.distance_m(fix),
            None => {
                // First fix: nothing to compare against yet.
                self.last_fix = Some(*fix);
                return events;
            }
        };

        if displacement <= self.movement_threshold_m {
            let since = *self.stationary_since.get_or_insert(fix.timestamp);
            let elapsed = fix.timestamp - since;
            if elapsed >= self.stationary_limit_secs {
                events.push(SignalEvent::StationaryTooLong {
                    elapsed_secs: elapsed,
                    at: fix.timestamp,
                });
                self.episodes_fired += 1;
                self.stationary_since = None;
            }
        } else {
            self.stationary_since = None;
        }

        self.last_fix = Some(*fix);
        events
    }

    pub fn is_stationary(&self) -> bool {
        self.stationary_since.is_some()
    }

    pub fn episodes_fired(&self) -> u64 {
        self.episodes_fired
    }
}
