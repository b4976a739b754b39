use crate::types::SafeZone;

/// All tunables for one walk session.
#[derive(Clone, Debug)]
pub struct GuardianConfig {
    // ── Stationary detection ──
    /// Displacement at or below this is "stationary" for the tick (meters).
    pub movement_threshold_m: f64,
    /// Continuous stationary time before a check-in is requested (seconds).
    pub stationary_limit_secs: f64,
    /// Optional destination geofence; inside it stationary time never counts.
    pub safe_zone: Option<SafeZone>,

    // ── Vitals watchdog ──
    /// BPM at or above this raises a spike check-in.
    pub spike_threshold_bpm: f64,
    /// A sample older than this counts as signal loss (seconds). Also the
    /// cadence of the periodic signal check.
    pub vitals_silence_secs: f64,

    // ── Check-in cycle ──
    /// Unanswered check-ins escalate after this long (seconds).
    pub response_timeout_secs: f64,

    // ── Periodic prompter ──
    /// Tolerated absence of any vitals sample after walk start (seconds).
    pub grace_window_secs: f64,
    /// Quiet period between periodic prompts (seconds). User-set, 1-30 min.
    pub prompt_interval_secs: f64,

    // ── Remote location log ──
    pub location_log_url: Option<String>,
    pub location_log_token: Option<String>,
    pub location_log_user: String,
}

impl GuardianConfig {
    pub const MIN_PROMPT_INTERVAL_SECS: f64 = 60.0;
    pub const MAX_PROMPT_INTERVAL_SECS: f64 = 1800.0;

    /// Clamp the prompt interval into the supported 1-30 minute range.
    pub fn with_prompt_interval(mut self, secs: f64) -> Self {
        self.prompt_interval_secs =
            secs.clamp(Self::MIN_PROMPT_INTERVAL_SECS, Self::MAX_PROMPT_INTERVAL_SECS);
        self
    }
}

impl Default for GuardianConfig {
    fn default() -> Self {
        GuardianConfig {
            movement_threshold_m: 25.0,
            stationary_limit_secs: 120.0,
            safe_zone: None,
            spike_threshold_bpm: 120.0,
            vitals_silence_secs: 30.0,
            response_timeout_secs: 60.0,
            grace_window_secs: 45.0,
            prompt_interval_secs: 300.0,
            location_log_url: None,
            location_log_token: None,
            location_log_user: "walker".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_interval_clamped() {
        let cfg = GuardianConfig::default().with_prompt_interval(10.0);
        assert_eq!(cfg.prompt_interval_secs, 60.0);

        let cfg = GuardianConfig::default().with_prompt_interval(7200.0);
        assert_eq!(cfg.prompt_interval_secs, 1800.0);

        let cfg = GuardianConfig::default().with_prompt_interval(600.0);
        assert_eq!(cfg.prompt_interval_secs, 600.0);
    }
}
