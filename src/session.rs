// session.rs — Pure coordination core for Walk Guardian
//
// Everything in this module is independent of:
//   - tokio / async runtime
//   - the presentation layer, wearable transport, HTTP
//
// It takes signals in (fixes, vitals samples, responses, alarm firings,
// all carrying explicit timestamps) and produces effects out for the shell
// to dispatch. This means every race in the check-in lifecycle can be
// unit-tested with scripted event streams and synthetic clocks.

use log::{info, warn};

use crate::checkin::{CheckInCycle, CycleState};
use crate::config::GuardianConfig;
use crate::error::GuardianError;
use crate::escalation::EscalationCoordinator;
use crate::prompter::PeriodicPrompter;
use crate::stationary::StationaryDetector;
use crate::status::WalkStatus;
use crate::types::{
    AuthOutcome, CheckInReason, CheckInRequest, EmergencyContact, EscalationEvent, PositionFix,
    SignalEvent, VitalsSample,
};
use crate::vitals::VitalsWatchdog;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    NotStarted,
    Monitoring,
    Ended,
}

/// Side effects for the shell to dispatch. The core never blocks or
/// performs I/O.
#[derive(Clone, Debug)]
pub enum Effect {
    /// Surface the check-in prompt (also re-surfaced after a failed
    /// authentication attempt).
    PresentCheckIn(CheckInRequest),
    DismissCheckIn,
    /// Hand the composed payload to the emergency-contact channel.
    Escalate(EscalationEvent),
    /// One record-append write to the remote location log.
    RecordLocation { latitude: f64, longitude: f64, timestamp: f64 },
    /// Push the user-adjusted spike threshold out to the wearable link.
    PushSpikeThreshold(f64),
}

/// Top-level orchestrator for one walk. Single owner of session state; the
/// shell serializes all calls through one task, so no two signals can race
/// inside here.
pub struct WalkSession {
    config: GuardianConfig,
    phase: SessionPhase,
    stationary: StationaryDetector,
    vitals: VitalsWatchdog,
    cycle: CheckInCycle,
    prompter: PeriodicPrompter,
    escalation: Option<EscalationCoordinator>,
    last_known_location: Option<PositionFix>,
    grace_deadline: Option<f64>,
    vitals_check_at: Option<f64>,
    started_at: f64,
    fixes_observed: u64,
    vitals_samples: u64,
    location_permission_denied: bool,
    notification_permission_denied: bool,
}

impl WalkSession {
    pub fn new(config: GuardianConfig) -> Self {
        let stationary = StationaryDetector::new(&config);
        let vitals = VitalsWatchdog::new(&config);
        let cycle = CheckInCycle::new(config.response_timeout_secs);
        let prompter = PeriodicPrompter::new(config.prompt_interval_secs);
        WalkSession {
            config,
            phase: SessionPhase::NotStarted,
            stationary,
            vitals,
            cycle,
            prompter,
            escalation: None,
            last_known_location: None,
            grace_deadline: None,
            vitals_check_at: None,
            started_at: 0.0,
            fixes_observed: 0,
            vitals_samples: 0,
            location_permission_denied: false,
            notification_permission_denied: false,
        }
    }

    /// Start monitoring. The emergency contact is the one hard requirement;
    /// everything else degrades.
    pub fn start(
        &mut self,
        contact: Option<EmergencyContact>,
        now: f64,
    ) -> Result<(), GuardianError> {
        let contact = contact.ok_or(GuardianError::Configuration("missing-contact"))?;

        info!("walk started, contact: {}", contact.name);
        self.phase = SessionPhase::Monitoring;
        self.started_at = now;
        self.stationary = StationaryDetector::new(&self.config);
        self.vitals = VitalsWatchdog::new(&self.config);
        self.cycle.reset_for_new_walk(self.config.response_timeout_secs);
        self.prompter = PeriodicPrompter::new(self.config.prompt_interval_secs);
        self.escalation = Some(EscalationCoordinator::new(contact));
        self.grace_deadline = Some(now + self.config.grace_window_secs);
        self.vitals_check_at = Some(now + self.config.vitals_silence_secs);
        self.fixes_observed = 0;
        self.vitals_samples = 0;
        Ok(())
    }

    /// End the walk. Idempotent: all alarms are cleared so nothing can fire
    /// into a torn-down session.
    pub fn end(&mut self, _now: f64) -> Vec<Effect> {
        if self.phase != SessionPhase::Monitoring {
            return Vec::new();
        }
        info!("walk ended");
        let mut effects = Vec::new();
        if self.cycle.state() == CycleState::AwaitingResponse {
            effects.push(Effect::DismissCheckIn);
        }
        self.phase = SessionPhase::Ended;
        self.cycle.cancel_alarm();
        self.prompter.disarm();
        self.grace_deadline = None;
        self.vitals_check_at = None;
        effects
    }

    // ── Inbound signals ──────────────────────────────────────────────────

    pub fn feed_fix(&mut self, fix: &PositionFix) -> Vec<Effect> {
        // Location is tracked even outside a walk so escalation always has
        // the freshest consistent value.
        self.last_known_location = Some(*fix);
        if self.phase != SessionPhase::Monitoring {
            return Vec::new();
        }
        self.fixes_observed += 1;
        let mut effects = Vec::new();
        for event in self.stationary.observe(fix) {
            effects.extend(self.route_signal(event));
        }
        effects
    }

    pub fn feed_vitals(&mut self, sample: &VitalsSample) -> Vec<Effect> {
        if self.phase != SessionPhase::Monitoring {
            return Vec::new();
        }
        self.vitals_samples += 1;
        let first_ever = !self.vitals.has_ever_sampled();
        let mut effects = Vec::new();
        for event in self.vitals.observe(sample) {
            effects.extend(self.route_signal(event));
        }
        if first_ever {
            // Wearable link established: the grace check is moot, and any
            // armed prompter becomes a pushed-out backstop.
            self.grace_deadline = None;
            self.prompter.on_vitals_resumed(sample.timestamp());
        }
        effects
    }

    pub fn respond_safe(&mut self, now: f64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.cycle.respond_safe(now) {
            effects.push(Effect::DismissCheckIn);
            self.prompter.on_safe_response(now);
        }
        effects
    }

    pub fn auth_outcome(&mut self, outcome: &AuthOutcome) -> Vec<Effect> {
        if outcome.succeeded {
            let mut effects = Vec::new();
            if self.cycle.auth_succeeded(outcome.at) {
                effects.push(Effect::DismissCheckIn);
                self.prompter.on_safe_response(outcome.at);
            }
            return effects;
        }
        let kind = outcome.failure_kind.unwrap_or(crate::types::AuthFailureKind::Other);
        if self.cycle.auth_failed(kind) {
            // Keep waiting; the timeout clock is untouched. Re-surface the
            // prompt so the user can try again or acknowledge passively.
            if let Some(request) = self.cycle.live_request() {
                return vec![Effect::PresentCheckIn(request.clone())];
            }
        }
        Vec::new()
    }

    pub fn set_spike_threshold(&mut self, bpm: f64) -> Vec<Effect> {
        self.vitals.set_spike_threshold(bpm);
        vec![Effect::PushSpikeThreshold(bpm)]
    }

    /// Permission withheld for a signal source: the detector simply never
    /// produces events; the walk keeps going.
    pub fn note_permission_denied(&mut self, source: &str) {
        warn!("permission denied for {}, monitoring degraded", source);
        match source {
            "location" => self.location_permission_denied = true,
            _ => self.notification_permission_denied = true,
        }
    }

    // ── Alarms ───────────────────────────────────────────────────────────

    /// Response-timeout alarm callback. The generation guard makes a timer
    /// that lost the race against a response a guaranteed no-op.
    pub fn timeout_fires(&mut self, generation: u64, now: f64) -> Vec<Effect> {
        if self.phase != SessionPhase::Monitoring {
            return Vec::new();
        }
        match self.cycle.timeout_fires(generation, now) {
            Some(request) => self.escalate(request.source_location, now),
            None => Vec::new(),
        }
    }

    /// Fire any due alarms. The shell calls this whenever `next_deadline`
    /// elapses; the core re-checks every deadline against `now`, so a late
    /// or spurious wakeup is harmless.
    pub fn tick(&mut self, now: f64) -> Vec<Effect> {
        if self.phase != SessionPhase::Monitoring {
            return Vec::new();
        }
        let mut effects = Vec::new();

        // Grace window: arm the fallback cadence only if the wearable never
        // said a word.
        if let Some(deadline) = self.grace_deadline {
            if now >= deadline {
                self.grace_deadline = None;
                if !self.vitals.has_ever_sampled() {
                    self.prompter.arm(now);
                }
            }
        }

        // Periodic vitals signal check.
        if let Some(check_at) = self.vitals_check_at {
            if now >= check_at {
                self.vitals_check_at = Some(now + self.config.vitals_silence_secs);
                for event in self.vitals.check_signal(now) {
                    effects.extend(self.route_signal(event));
                }
            }
        }

        // Periodic prompt cadence.
        if self.prompter.tick(now, self.cycle.can_issue()) {
            effects.extend(self.issue_check_in(CheckInReason::PeriodicPrompt, now));
        }

        // Response timeout.
        if let Some(deadline) = self.cycle.deadline() {
            if now >= deadline {
                effects.extend(self.timeout_fires(self.cycle.generation(), now));
            }
        }

        effects
    }

    /// Earliest outstanding alarm, for the shell's sleep.
    pub fn next_deadline(&self) -> Option<f64> {
        if self.phase != SessionPhase::Monitoring {
            return None;
        }
        [
            self.cycle.deadline(),
            self.grace_deadline,
            self.vitals_check_at,
            self.prompter.next_due(),
        ]
        .into_iter()
        .flatten()
        .fold(None, |min, t| match min {
            Some(m) if m <= t => Some(m),
            _ => Some(t),
        })
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Monitoring
    }

    pub fn cycle_state(&self) -> CycleState {
        self.cycle.state()
    }

    pub fn consecutive_failed_check_ins(&self) -> u32 {
        self.cycle.consecutive_failures()
    }

    pub fn last_known_location(&self) -> Option<PositionFix> {
        self.last_known_location
    }

    pub fn escalation_attempts(&self) -> u32 {
        self.escalation.as_ref().map_or(0, |e| e.attempt_count())
    }

    /// Derived status text, a pure function of internal state. There is no
    /// separate status field to keep in sync.
    pub fn status_text(&self, now: f64) -> String {
        match self.phase {
            SessionPhase::NotStarted => "idle".to_string(),
            SessionPhase::Ended => "walk ended".to_string(),
            SessionPhase::Monitoring => match self.cycle.state() {
                CycleState::Escalated => {
                    "escalation in progress - emergency contact notified".to_string()
                }
                CycleState::AwaitingResponse => "check-in pending - please respond".to_string(),
                _ => {
                    if self.vitals.has_ever_sampled() && !self.vitals.is_silent(now) {
                        "monitoring - vitals connected".to_string()
                    } else if self.prompter.is_armed() {
                        "monitoring - periodic check-ins active".to_string()
                    } else {
                        "monitoring".to_string()
                    }
                }
            },
        }
    }

    pub fn get_snapshot(&self, now: f64) -> WalkStatus {
        WalkStatus {
            timestamp: now,
            active: self.is_active(),
            status_text: self.status_text(now),
            cycle_state: self.cycle.state(),
            uptime_secs: if self.is_active() { (now - self.started_at).max(0.0) } else { 0.0 },
            fixes_observed: self.fixes_observed,
            vitals_samples: self.vitals_samples,
            current_bpm: self.vitals.current_bpm(),
            vitals_silent: self.vitals.is_silent(now),
            check_ins_issued: self.cycle.issued_total(),
            consecutive_failed_check_ins: self.cycle.consecutive_failures(),
            prompter_armed: self.prompter.is_armed(),
            prompts_issued: self.prompter.prompts_issued(),
            escalation_in_progress: self.escalation.as_ref().map_or(false, |e| e.in_progress()),
            escalation_attempts: self.escalation_attempts(),
            last_latitude: self.last_known_location.map(|f| f.latitude),
            last_longitude: self.last_known_location.map(|f| f.longitude),
            location_permission_denied: self.location_permission_denied,
            notification_permission_denied: self.notification_permission_denied,
            stationary_episodes: self.stationary.episodes_fired(),
        }
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn route_signal(&mut self, event: SignalEvent) -> Vec<Effect> {
        match event {
            SignalEvent::StationaryTooLong { at, .. } => {
                self.issue_check_in(CheckInReason::StationaryTooLong, at)
            }
            SignalEvent::VitalsSpike { at, .. } => {
                self.issue_check_in(CheckInReason::VitalsSpike, at)
            }
            SignalEvent::VitalsNotDetected { at } => {
                self.issue_check_in(CheckInReason::VitalsNotDetected, at)
            }
            SignalEvent::SignalLost { gap_secs, at } => {
                // Informational: surfaces through status. A wearable that
                // went quiet after having reported arms the fallback
                // cadence; the never-reported case stays the grace
                // window's call so the two paths cannot both arm early.
                info!("vitals signal lost ({:.0}s gap)", gap_secs);
                if self.vitals.has_ever_sampled() {
                    self.prompter.arm(at);
                }
                Vec::new()
            }
        }
    }

    fn issue_check_in(&mut self, reason: CheckInReason, now: f64) -> Vec<Effect> {
        let request = CheckInRequest {
            reason,
            issued_at: now,
            source_location: self.last_known_location,
        };
        match self.cycle.issue(request.clone()) {
            Some(_armed) => vec![Effect::PresentCheckIn(request)],
            None => Vec::new(),
        }
    }

    fn escalate(&mut self, location: Option<PositionFix>, now: f64) -> Vec<Effect> {
        let coordinator = match self.escalation.as_mut() {
            Some(c) => c,
            None => return Vec::new(),
        };
        let event = coordinator.handle_escalation(location, self.last_known_location, now);
        let mut effects = vec![Effect::DismissCheckIn];
        if let Some(loc) = &event.location {
            effects.push(Effect::RecordLocation {
                latitude: loc.latitude,
                longitude: loc.longitude,
                timestamp: now,
            });
        }
        effects.push(Effect::Escalate(event));
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthFailureKind;

    fn contact() -> Option<EmergencyContact> {
        Some(EmergencyContact {
            name: "Ana".to_string(),
            phone_number: "+15555550100".to_string(),
        })
    }

    fn fix(t: f64) -> PositionFix {
        PositionFix { timestamp: t, latitude: 32.2, longitude: -110.9 }
    }

    /// Drive all deadlines between two instants, 1 s granularity.
    fn run_until(session: &mut WalkSession, from: f64, to: f64) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut t = from;
        while t <= to {
            effects.extend(session.tick(t));
            t += 1.0;
        }
        effects
    }

    #[test]
    fn test_start_requires_contact() {
        let mut session = WalkSession::new(GuardianConfig::default());
        let err = session.start(None, 0.0).unwrap_err();
        assert!(matches!(err, GuardianError::Configuration("missing-contact")));
        assert!(!session.is_active());

        session.start(contact(), 0.0).unwrap();
        assert!(session.is_active());
    }

    #[test]
    fn test_end_is_idempotent_and_kills_alarms() {
        let mut session = WalkSession::new(GuardianConfig::default());
        session.start(contact(), 0.0).unwrap();
        assert!(session.next_deadline().is_some());

        session.end(10.0);
        assert_eq!(session.phase(), SessionPhase::Ended);
        assert!(session.next_deadline().is_none());
        // No alarm can fire after end.
        assert!(session.tick(10_000.0).is_empty());
        // Second end is a no-op, not an error.
        assert!(session.end(20.0).is_empty());
    }

    #[test]
    fn test_signal_while_awaiting_is_dropped() {
        let mut session = WalkSession::new(GuardianConfig::default());
        session.start(contact(), 0.0).unwrap();

        let effects = session.feed_vitals(&VitalsSample::Reading { bpm: 140.0, timestamp: 5.0 });
        assert!(matches!(effects[0], Effect::PresentCheckIn(_)));
        assert_eq!(session.cycle_state(), CycleState::AwaitingResponse);

        // A second spike while awaiting produces nothing.
        let effects = session.feed_vitals(&VitalsSample::Reading { bpm: 150.0, timestamp: 6.0 });
        assert!(effects.is_empty());
    }

    #[test]
    fn test_grace_window_arms_prompter_only_without_samples() {
        let cfg = GuardianConfig::default();

        // Case 1: no samples ever.
        let mut session = WalkSession::new(cfg.clone());
        session.start(contact(), 0.0).unwrap();
        session.tick(45.0);
        assert!(session.get_snapshot(45.0).prompter_armed);

        // Case 2: one early sample suppresses arming.
        let mut session = WalkSession::new(cfg);
        session.start(contact(), 0.0).unwrap();
        session.feed_vitals(&VitalsSample::Reading { bpm: 80.0, timestamp: 10.0 });
        session.tick(45.0);
        assert!(!session.get_snapshot(45.0).prompter_armed);
    }

    #[test]
    fn test_scenario_no_vitals_two_failures_then_timeout() {
        // Scenario: no samples for the whole walk. Prompter arms at t=45,
        // first periodic check-in at t=345, user fails auth twice, lets it
        // time out at t=405: exactly one escalation, attempt 1.
        let mut session = WalkSession::new(GuardianConfig::default());
        session.start(contact(), 0.0).unwrap();
        session.feed_fix(&fix(1.0));

        let effects = run_until(&mut session, 0.0, 344.0);
        assert!(!effects.iter().any(|e| matches!(e, Effect::PresentCheckIn(_))));

        let effects = session.tick(345.0);
        let presented: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, Effect::PresentCheckIn(_)))
            .collect();
        assert_eq!(presented.len(), 1);
        if let Effect::PresentCheckIn(req) = presented[0] {
            assert_eq!(req.reason, CheckInReason::PeriodicPrompt);
        }

        // Two genuine auth failures: still awaiting, counter at 2.
        for at in [360.0, 380.0] {
            let effects = session.auth_outcome(&AuthOutcome {
                succeeded: false,
                failure_kind: Some(AuthFailureKind::Failed),
                at,
            });
            assert!(matches!(effects[0], Effect::PresentCheckIn(_)));
        }
        assert_eq!(session.consecutive_failed_check_ins(), 2);
        assert_eq!(session.cycle_state(), CycleState::AwaitingResponse);

        // Timeout at issue + 60.
        let effects = run_until(&mut session, 381.0, 405.0);
        let escalations: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Escalate(ev) => Some(ev.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].attempt_number, 1);
        assert_eq!(session.cycle_state(), CycleState::Escalated);

        // Escalated is sticky; further prompts and signals do nothing.
        let effects = run_until(&mut session, 406.0, 800.0);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Escalate(_))));
    }

    #[test]
    fn test_respond_safe_beats_timeout() {
        let mut session = WalkSession::new(GuardianConfig::default());
        session.start(contact(), 0.0).unwrap();
        session.feed_vitals(&VitalsSample::NotDetected { timestamp: 5.0 });
        assert_eq!(session.cycle_state(), CycleState::AwaitingResponse);

        let effects = session.respond_safe(30.0);
        assert!(matches!(effects[0], Effect::DismissCheckIn));
        assert_eq!(session.cycle_state(), CycleState::RespondedSafe);

        // The alarm moment passes with no escalation.
        assert!(session.tick(65.0).is_empty());
        assert_eq!(session.escalation_attempts(), 0);
    }

    #[test]
    fn test_escalation_packages_last_known_location() {
        let mut session = WalkSession::new(GuardianConfig::default());
        session.start(contact(), 0.0).unwrap();
        session.feed_fix(&fix(1.0));
        session.feed_vitals(&VitalsSample::NotDetected { timestamp: 5.0 });

        let effects = session.tick(65.0);
        let escalated = effects.iter().find_map(|e| match e {
            Effect::Escalate(ev) => Some(ev.clone()),
            _ => None,
        });
        let event = escalated.expect("timeout must escalate");
        let loc = event.location.expect("location packaged");
        assert_eq!(loc.latitude, 32.2);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::RecordLocation { .. })));
    }

    #[test]
    fn test_spike_threshold_pushed_to_wearable() {
        let mut session = WalkSession::new(GuardianConfig::default());
        session.start(contact(), 0.0).unwrap();
        let effects = session.set_spike_threshold(150.0);
        assert!(matches!(effects[0], Effect::PushSpikeThreshold(bpm) if bpm == 150.0));

        // The new threshold is live.
        assert!(session
            .feed_vitals(&VitalsSample::Reading { bpm: 140.0, timestamp: 5.0 })
            .is_empty());
    }

    #[test]
    fn test_status_text_is_pure_derivation() {
        let mut session = WalkSession::new(GuardianConfig::default());
        assert_eq!(session.status_text(0.0), "idle");

        session.start(contact(), 0.0).unwrap();
        session.feed_vitals(&VitalsSample::Reading { bpm: 80.0, timestamp: 1.0 });
        assert_eq!(session.status_text(2.0), "monitoring - vitals connected");

        session.feed_vitals(&VitalsSample::Reading { bpm: 140.0, timestamp: 3.0 });
        assert_eq!(session.status_text(4.0), "check-in pending - please respond");

        session.tick(63.0);
        assert_eq!(
            session.status_text(64.0),
            "escalation in progress - emergency contact notified"
        );

        session.end(70.0);
        assert_eq!(session.status_text(71.0), "walk ended");
    }

    #[test]
    fn test_counters_reset_on_new_walk() {
        let mut session = WalkSession::new(GuardianConfig::default());
        session.start(contact(), 0.0).unwrap();
        session.feed_vitals(&VitalsSample::NotDetected { timestamp: 1.0 });
        session.auth_outcome(&AuthOutcome {
            succeeded: false,
            failure_kind: Some(AuthFailureKind::Failed),
            at: 2.0,
        });
        session.tick(61.0);
        assert_eq!(session.cycle_state(), CycleState::Escalated);

        session.end(100.0);
        session.start(contact(), 200.0).unwrap();
        assert_eq!(session.cycle_state(), CycleState::Idle);
        assert_eq!(session.consecutive_failed_check_ins(), 0);
        assert_eq!(session.escalation_attempts(), 0);
    }
}
