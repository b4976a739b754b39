use crate::config::GuardianConfig;
use crate::types::{SignalEvent, VitalsSample};

/// Watches the wearable heart-rate stream for spikes and for the stream
/// going quiet. Reports anomalies upward; never decides escalation itself.
pub struct VitalsWatchdog {
    spike_threshold_bpm: f64,
    silence_secs: f64,
    last_sample_at: Option<f64>,
    has_ever_sampled: bool,
    current_bpm: Option<f64>,
}

impl VitalsWatchdog {
    pub fn new(config: &GuardianConfig) -> Self {
        VitalsWatchdog {
            spike_threshold_bpm: config.spike_threshold_bpm,
            silence_secs: config.vitals_silence_secs,
            last_sample_at: None,
            has_ever_sampled: false,
            current_bpm: None,
        }
    }

    /// Feed one sample from the wearable link. A `NotDetected` sentinel is
    /// raised immediately, without waiting for the periodic check.
    pub fn observe(&mut self, sample: &VitalsSample) -> Vec<SignalEvent> {
        let mut events = Vec::new();
        self.last_sample_at = Some(sample.timestamp());
        self.has_ever_sampled = true;

        match sample {
            VitalsSample::Reading { bpm, timestamp } => {
                self.current_bpm = Some(*bpm);
                if *bpm >= self.spike_threshold_bpm {
                    events.push(SignalEvent::VitalsSpike { bpm: *bpm, at: *timestamp });
                }
            }
            VitalsSample::NotDetected { timestamp } => {
                self.current_bpm = None;
                events.push(SignalEvent::VitalsNotDetected { at: *timestamp });
            }
        }
        events
    }

    /// Periodic signal check, driven every `silence_secs` by the session
    /// shell independently of sample arrival.
    pub fn check_signal(&mut self, now: f64) -> Vec<SignalEvent> {
        let gap = match self.last_sample_at {
            Some(ts) => now - ts,
            None => return vec![SignalEvent::SignalLost { gap_secs: f64::INFINITY, at: now }],
        };
        if gap > self.silence_secs {
            vec![SignalEvent::SignalLost { gap_secs: gap, at: now }]
        } else {
            Vec::new()
        }
    }

    /// The user can adjust the spike threshold mid-walk; the shell pushes
    /// the same value out to the wearable link.
    pub fn set_spike_threshold(&mut self, bpm: f64) {
        self.spike_threshold_bpm = bpm;
    }

    pub fn spike_threshold(&self) -> f64 {
        self.spike_threshold_bpm
    }

    pub fn has_ever_sampled(&self) -> bool {
        self.has_ever_sampled
    }

    pub fn current_bpm(&self) -> Option<f64> {
        self.current_bpm
    }

    pub fn is_silent(&self, now: f64) -> bool {
        self.last_sample_at.map_or(true, |ts| now - ts > self.silence_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(t: f64, bpm: f64) -> VitalsSample {
        VitalsSample::Reading { bpm, timestamp: t }
    }

    #[test]
    fn test_spike_fires_at_threshold() {
        let mut wd = VitalsWatchdog::new(&GuardianConfig::default());

        let events = wd.observe(&reading(1.0, 135.0));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SignalEvent::VitalsSpike { bpm, .. } if bpm == 135.0));

        // Below threshold raises nothing.
        assert!(wd.observe(&reading(2.0, 95.0)).is_empty());
        assert!(wd.observe(&reading(3.0, 119.9)).is_empty());

        // Exactly at threshold counts.
        assert_eq!(wd.observe(&reading(4.0, 120.0)).len(), 1);
    }

    #[test]
    fn test_not_detected_bypasses_timer() {
        let mut wd = VitalsWatchdog::new(&GuardianConfig::default());
        let events = wd.observe(&VitalsSample::NotDetected { timestamp: 5.0 });
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SignalEvent::VitalsNotDetected { at } if at == 5.0));
        assert!(wd.has_ever_sampled());
    }

    #[test]
    fn test_signal_lost_when_never_sampled() {
        let mut wd = VitalsWatchdog::new(&GuardianConfig::default());
        let events = wd.check_signal(30.0);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SignalEvent::SignalLost { .. }));
        assert!(!wd.has_ever_sampled());
    }

    #[test]
    fn test_signal_lost_when_stale() {
        let mut wd = VitalsWatchdog::new(&GuardianConfig::default());
        wd.observe(&reading(10.0, 80.0));

        assert!(wd.check_signal(35.0).is_empty()); // 25 s gap, fresh enough
        assert_eq!(wd.check_signal(41.0).len(), 1); // 31 s gap
        assert!(wd.is_silent(41.0));
    }

    #[test]
    fn test_threshold_adjustment() {
        let mut wd = VitalsWatchdog::new(&GuardianConfig::default());
        wd.set_spike_threshold(150.0);
        assert!(wd.observe(&reading(1.0, 135.0)).is_empty());
        assert_eq!(wd.observe(&reading(2.0, 151.0)).len(), 1);
    }
}
