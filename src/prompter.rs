use log::{debug, info};

/// Fallback check-in cadence for walks where the wearable link never (or
/// only late) establishes itself. The interval is a quiet period after the
/// last confirmed safety, not a wall-clock grid.
pub struct PeriodicPrompter {
    interval_secs: f64,
    armed: bool,
    next_due: Option<f64>,
    prompts_issued: u64,
}

impl PeriodicPrompter {
    pub fn new(interval_secs: f64) -> Self {
        PeriodicPrompter {
            interval_secs,
            armed: false,
            next_due: None,
            prompts_issued: 0,
        }
    }

    /// Armed once by the session when the grace window elapses without any
    /// vitals sample ever arriving.
    pub fn arm(&mut self, now: f64) {
        if self.armed {
            return;
        }
        info!("periodic prompter armed, first prompt in {:.0}s", self.interval_secs);
        self.armed = true;
        self.next_due = Some(now + self.interval_secs);
    }

    /// Cancelled entirely on walk end.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.next_due = None;
    }

    /// Whether the current tick should issue a PeriodicPrompt. When the
    /// cycle cannot accept one (a check-in already pending, or escalated)
    /// the tick is skipped, never queued, and the cadence continues.
    pub fn tick(&mut self, now: f64, cycle_can_issue: bool) -> bool {
        if !self.armed {
            return false;
        }
        let due = match self.next_due {
            Some(t) if now >= t => t,
            _ => return false,
        };
        self.next_due = Some(due + self.interval_secs);
        if cycle_can_issue {
            self.prompts_issued += 1;
            true
        } else {
            debug!("periodic prompt skipped, cycle busy");
            false
        }
    }

    /// A confirmed-safe response restarts the quiet period from zero.
    pub fn on_safe_response(&mut self, now: f64) {
        if self.armed {
            self.next_due = Some(now + self.interval_secs);
        }
    }

    /// The wearable reconnected after arming. Kept as a backstop, but the
    /// deadline is pushed a full interval out so a spike-triggered check-in
    /// and a periodic prompt can never cover the same trigger window.
    pub fn on_vitals_resumed(&mut self, now: f64) {
        if self.armed {
            info!("wearable signal resumed, periodic prompter kept as backstop");
            self.next_due = Some(now + self.interval_secs);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn next_due(&self) -> Option<f64> {
        if self.armed {
            self.next_due
        } else {
            None
        }
    }

    pub fn prompts_issued(&self) -> u64 {
        self.prompts_issued
    }
}
