use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::types::{AuthFailureKind, CheckInRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleState {
    Idle,
    AwaitingResponse,
    RespondedSafe,
    /// Terminal for the cycle; only a new walk start clears it.
    Escalated,
}

/// Result of arming a check-in: the shell schedules an alarm for `deadline`
/// and must hand `generation` back when it fires.
#[derive(Clone, Copy, Debug)]
pub struct ArmedTimeout {
    pub deadline: f64,
    pub generation: u64,
}

/// The check-in lifecycle state machine. Exactly one request is live at a
/// time; the response-timeout clock armed at issue time is the sole
/// authority for escalation.
pub struct CheckInCycle {
    state: CycleState,
    live_request: Option<CheckInRequest>,
    deadline: Option<f64>,
    /// Bumped on every issue and every resolution. A timeout alarm carrying
    /// a stale generation is a cancelled alarm that fired anyway; it must
    /// find the guard closed.
    generation: u64,
    consecutive_failures: u32,
    response_timeout_secs: f64,
    issued_total: u64,
}

impl CheckInCycle {
    pub fn new(response_timeout_secs: f64) -> Self {
        CheckInCycle {
            state: CycleState::Idle,
            live_request: None,
            deadline: None,
            generation: 0,
            consecutive_failures: 0,
            response_timeout_secs,
            issued_total: 0,
        }
    }

    /// Issue a new check-in. Valid only from Idle or RespondedSafe; a signal
    /// arriving while a request is already live is dropped, not queued.
    pub fn issue(&mut self, request: CheckInRequest) -> Option<ArmedTimeout> {
        match self.state {
            CycleState::Idle | CycleState::RespondedSafe => {}
            CycleState::AwaitingResponse | CycleState::Escalated => {
                debug!(
                    "check-in {:?} dropped, cycle is {:?}",
                    request.reason, self.state
                );
                return None;
            }
        }

        // Bumping the generation invalidates any prior alarm. Unreachable
        // given the state guard above, but protects against duplicate-issue
        // bugs.
        self.generation += 1;
        let deadline = request.issued_at + self.response_timeout_secs;
        info!("check-in issued: {:?}", request.reason);
        self.state = CycleState::AwaitingResponse;
        self.deadline = Some(deadline);
        self.live_request = Some(request);
        self.issued_total += 1;

        Some(ArmedTimeout { deadline, generation: self.generation })
    }

    /// Passive "I'm safe" acknowledgement. Only accepted while a response is
    /// pending; cancels the timeout alarm and clears the failure tally.
    pub fn respond_safe(&mut self, now: f64) -> bool {
        if self.state != CycleState::AwaitingResponse {
            debug!("respond_safe ignored, cycle is {:?}", self.state);
            return false;
        }
        info!("check-in answered safe at {:.1}", now);
        self.state = CycleState::RespondedSafe;
        self.deadline = None;
        self.generation += 1;
        self.consecutive_failures = 0;
        self.live_request = None;
        true
    }

    /// Biometric confirmation is the same "user is safe" signal through a
    /// different UI path.
    pub fn auth_succeeded(&mut self, now: f64) -> bool {
        self.respond_safe(now)
    }

    /// A failed biometric attempt keeps the cycle waiting; the timeout clock
    /// keeps running untouched. Returns true when the prompt should be
    /// re-surfaced.
    pub fn auth_failed(&mut self, kind: AuthFailureKind) -> bool {
        if self.state != CycleState::AwaitingResponse {
            debug!("auth_failed({:?}) ignored, cycle is {:?}", kind, self.state);
            return false;
        }
        if kind.counts_as_failure() {
            self.consecutive_failures += 1;
            warn!(
                "authentication failed ({:?}), consecutive failures: {}",
                kind, self.consecutive_failures
            );
        } else {
            info!("authentication declined ({:?}), not counted", kind);
        }
        true
    }

    /// Alarm callback. No-op unless the cycle is still awaiting a response
    /// and the alarm belongs to the live request: a response processed first
    /// already bumped the generation, so a late-cancelled timer firing
    /// concurrently cannot escalate. Returns the escalated request.
    pub fn timeout_fires(&mut self, generation: u64, now: f64) -> Option<CheckInRequest> {
        if self.state != CycleState::AwaitingResponse || generation != self.generation {
            debug!("stale timeout alarm (gen {}) ignored", generation);
            return None;
        }
        warn!("check-in response timeout at {:.1}, escalating", now);
        self.state = CycleState::Escalated;
        self.deadline = None;
        self.generation += 1;
        self.consecutive_failures += 1;
        self.live_request.take()
    }

    /// Cancel any pending alarm without resolving the cycle (walk end).
    pub fn cancel_alarm(&mut self) {
        self.deadline = None;
        self.generation += 1;
    }

    pub fn reset_for_new_walk(&mut self, response_timeout_secs: f64) {
        self.state = CycleState::Idle;
        self.live_request = None;
        self.deadline = None;
        self.generation += 1;
        self.consecutive_failures = 0;
        self.response_timeout_secs = response_timeout_secs;
        self.issued_total = 0;
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn can_issue(&self) -> bool {
        matches!(self.state, CycleState::Idle | CycleState::RespondedSafe)
    }

    pub fn deadline(&self) -> Option<f64> {
        self.deadline
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn issued_total(&self) -> u64 {
        self.issued_total
    }

    pub fn live_request(&self) -> Option<&CheckInRequest> {
        self.live_request.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CheckInReason;

    fn request(t: f64) -> CheckInRequest {
        CheckInRequest {
            reason: CheckInReason::PeriodicPrompt,
            issued_at: t,
            source_location: None,
        }
    }

    #[test]
    fn test_issue_only_from_idle_or_responded() {
        let mut cycle = CheckInCycle::new(60.0);

        let armed = cycle.issue(request(10.0)).unwrap();
        assert_eq!(armed.deadline, 70.0);
        assert_eq!(cycle.state(), CycleState::AwaitingResponse);

        // Second issue while awaiting is dropped.
        assert!(cycle.issue(request(20.0)).is_none());
        assert_eq!(cycle.issued_total(), 1);

        assert!(cycle.respond_safe(30.0));
        assert_eq!(cycle.state(), CycleState::RespondedSafe);

        // RespondedSafe accepts the next cycle.
        assert!(cycle.issue(request(40.0)).is_some());
    }

    #[test]
    fn test_timeout_noop_after_response() {
        let mut cycle = CheckInCycle::new(60.0);
        let armed = cycle.issue(request(0.0)).unwrap();

        assert!(cycle.respond_safe(59.9));
        // The cancelled alarm fires anyway; the generation guard closes it.
        assert!(cycle.timeout_fires(armed.generation, 60.0).is_none());
        assert_eq!(cycle.state(), CycleState::RespondedSafe);
    }

    #[test]
    fn test_timeout_escalates_when_unanswered() {
        let mut cycle = CheckInCycle::new(60.0);
        let armed = cycle.issue(request(0.0)).unwrap();

        let escalated = cycle.timeout_fires(armed.generation, 60.0);
        assert!(escalated.is_some());
        assert_eq!(cycle.state(), CycleState::Escalated);

        // Escalated is terminal: nothing else is accepted.
        assert!(cycle.issue(request(70.0)).is_none());
        assert!(!cycle.respond_safe(70.0));
        assert!(cycle.timeout_fires(armed.generation, 120.0).is_none());
    }

    #[test]
    fn test_auth_failure_counting() {
        let mut cycle = CheckInCycle::new(60.0);
        cycle.issue(request(0.0)).unwrap();

        assert!(cycle.auth_failed(AuthFailureKind::Failed));
        assert_eq!(cycle.consecutive_failures(), 1);

        // Cancelling or requesting fallback is not a failure.
        assert!(cycle.auth_failed(AuthFailureKind::UserCancelled));
        assert!(cycle.auth_failed(AuthFailureKind::UserRequestedFallback));
        assert_eq!(cycle.consecutive_failures(), 1);

        assert!(cycle.auth_failed(AuthFailureKind::Failed));
        assert_eq!(cycle.consecutive_failures(), 2);

        // Cycle kept waiting the whole time.
        assert_eq!(cycle.state(), CycleState::AwaitingResponse);

        // A success clears the tally.
        assert!(cycle.auth_succeeded(30.0));
        assert_eq!(cycle.consecutive_failures(), 0);
    }

    #[test]
    fn test_stale_generation_never_escalates() {
        let mut cycle = CheckInCycle::new(60.0);
        let first = cycle.issue(request(0.0)).unwrap();
        cycle.respond_safe(10.0);
        let second = cycle.issue(request(20.0)).unwrap();

        assert_ne!(first.generation, second.generation);
        // The first request's alarm is long dead.
        assert!(cycle.timeout_fires(first.generation, 60.0).is_none());
        assert_eq!(cycle.state(), CycleState::AwaitingResponse);
        // The live one still works.
        assert!(cycle.timeout_fires(second.generation, 80.0).is_some());
    }

    #[test]
    fn test_random_interleavings_single_live_request() {
        // Pseudo-random interleavings of issue/respond/timeout must never
        // produce two simultaneous live requests or a double escalation.
        let mut seed: u64 = 0x9e3779b97f4a7c15;
        let mut rng = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        for _ in 0..200 {
            let mut cycle = CheckInCycle::new(60.0);
            let mut now = 0.0;
            let mut armed: Vec<ArmedTimeout> = Vec::new();
            let mut escalations = 0;

            for _ in 0..50 {
                now += 1.0;
                match rng() % 4 {
                    0 => {
                        if let Some(a) = cycle.issue(request(now)) {
                            assert!(cycle.live_request().is_some());
                            armed.push(a);
                        }
                    }
                    1 => {
                        cycle.respond_safe(now);
                    }
                    2 => {
                        if let Some(a) = armed.pop() {
                            if cycle.timeout_fires(a.generation, now).is_some() {
                                escalations += 1;
                            }
                        }
                    }
                    _ => {
                        cycle.auth_failed(AuthFailureKind::Failed);
                    }
                }

                // Invariant: a live request exists iff awaiting a response.
                assert_eq!(
                    cycle.live_request().is_some(),
                    cycle.state() == CycleState::AwaitingResponse
                );
            }
            assert!(escalations <= 1);
        }
    }
}
