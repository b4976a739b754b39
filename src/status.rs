use serde::{Deserialize, Serialize};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::checkin::CycleState;

/// Live snapshot of one walk for the UI layer, exported as JSON by the demo
/// binary. Derived entirely from WalkSession state.
#[derive(Serialize, Deserialize, Clone)]
pub struct WalkStatus {
    pub timestamp: f64,
    pub active: bool,
    pub status_text: String,
    pub cycle_state: CycleState,
    pub uptime_secs: f64,
    // Signal counters
    pub fixes_observed: u64,
    pub vitals_samples: u64,
    pub current_bpm: Option<f64>,
    pub vitals_silent: bool,
    // Check-in lifecycle
    pub check_ins_issued: u64,
    pub consecutive_failed_check_ins: u32,
    pub prompter_armed: bool,
    pub prompts_issued: u64,
    // Escalation
    pub escalation_in_progress: bool,
    pub escalation_attempts: u32,
    // Location
    pub last_latitude: Option<f64>,
    pub last_longitude: Option<f64>,
    pub location_permission_denied: bool,
    pub notification_permission_denied: bool,
    pub stationary_episodes: u64,
}

impl WalkStatus {
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
