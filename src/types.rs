use geo::{point, HaversineDistance};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PositionFix {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
}

impl PositionFix {
    /// Great-circle distance to another fix, in meters.
    pub fn distance_m(&self, other: &PositionFix) -> f64 {
        let a = point!(x: self.longitude, y: self.latitude);
        let b = point!(x: other.longitude, y: other.latitude);
        a.haversine_distance(&b)
    }
}

/// Circular geofence around a destination. Stationary time inside the zone
/// never triggers a check-in.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SafeZone {
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius_m: f64,
}

impl SafeZone {
    pub fn contains(&self, fix: &PositionFix) -> bool {
        let center = point!(x: self.center_lon, y: self.center_lat);
        let p = point!(x: fix.longitude, y: fix.latitude);
        center.haversine_distance(&p) <= self.radius_m
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone_number: String,
}

/// Heart-rate sample from the wearable link. The link reports `NotDetected`
/// when the sensor cannot find a pulse at all.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum VitalsSample {
    Reading { bpm: f64, timestamp: f64 },
    NotDetected { timestamp: f64 },
}

impl VitalsSample {
    pub fn timestamp(&self) -> f64 {
        match self {
            VitalsSample::Reading { timestamp, .. } => *timestamp,
            VitalsSample::NotDetected { timestamp } => *timestamp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckInReason {
    StationaryTooLong,
    VitalsSpike,
    VitalsNotDetected,
    PeriodicPrompt,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub reason: CheckInReason,
    pub issued_at: f64,
    pub source_location: Option<PositionFix>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthFailureKind {
    Failed,
    UserCancelled,
    UserRequestedFallback,
    Unavailable,
    Other,
}

impl AuthFailureKind {
    /// Declining to use the method is not a genuine failure and must not
    /// count toward the consecutive-failure tally.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(
            self,
            AuthFailureKind::UserCancelled | AuthFailureKind::UserRequestedFallback
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub succeeded: bool,
    pub failure_kind: Option<AuthFailureKind>,
    pub at: f64,
}

/// Payload handed to the emergency-contact channel, composed once per
/// escalation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub contact: EmergencyContact,
    pub location: Option<PositionFix>,
    pub attempt_number: u32,
    pub timestamp: f64,
}

// ─── Signal events ───────────────────────────────────────────────────────────

/// Anomalies raised by the detectors, routed by WalkSession into the
/// check-in cycle. Detectors only report; they never decide escalation.
#[derive(Clone, Debug)]
pub enum SignalEvent {
    StationaryTooLong { elapsed_secs: f64, at: f64 },
    VitalsSpike { bpm: f64, at: f64 },
    VitalsNotDetected { at: f64 },
    SignalLost { gap_secs: f64, at: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fix(lat: f64, lon: f64) -> PositionFix {
        PositionFix { timestamp: 0.0, latitude: lat, longitude: lon }
    }

    #[test]
    fn test_haversine_distance_sanity() {
        // ~111.2 km per degree of latitude
        let a = fix(32.0, -110.0);
        let b = fix(33.0, -110.0);
        let d = a.distance_m(&b);
        assert_relative_eq!(d, 111_195.0, max_relative = 0.01);
    }

    #[test]
    fn test_safe_zone_membership() {
        let zone = SafeZone { center_lat: 32.2, center_lon: -110.9, radius_m: 100.0 };
        // ~50 m north of center: 1 deg lat ≈ 111,195 m
        let inside = fix(32.2 + 50.0 / 111_195.0, -110.9);
        let outside = fix(32.2 + 500.0 / 111_195.0, -110.9);
        assert!(zone.contains(&inside));
        assert!(!zone.contains(&outside));
    }

    #[test]
    fn test_cancelled_auth_does_not_count() {
        assert!(AuthFailureKind::Failed.counts_as_failure());
        assert!(AuthFailureKind::Unavailable.counts_as_failure());
        assert!(AuthFailureKind::Other.counts_as_failure());
        assert!(!AuthFailureKind::UserCancelled.counts_as_failure());
        assert!(!AuthFailureKind::UserRequestedFallback.counts_as_failure());
    }
}
