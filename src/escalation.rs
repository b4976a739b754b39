use anyhow::Result;
use log::{error, info, warn};
use serde_json::json;
use std::time::Duration;

use crate::config::GuardianConfig;
use crate::error::GuardianError;
use crate::types::{EmergencyContact, EscalationEvent, PositionFix};

/// Collaborator that initiates the phone call / message to the emergency
/// contact. Whether the human actually presses "send" is outside the core's
/// control and not modelled as a core failure state.
pub trait ContactChannel: Send {
    fn deliver(&mut self, event: &EscalationEvent) -> Result<(), GuardianError>;
}

/// Composes escalation payloads and hands them off. Performs no phone calls
/// or messaging itself.
pub struct EscalationCoordinator {
    contact: EmergencyContact,
    attempt_count: u32,
    in_progress: bool,
}

impl EscalationCoordinator {
    pub fn new(contact: EmergencyContact) -> Self {
        EscalationCoordinator {
            contact,
            attempt_count: 0,
            in_progress: false,
        }
    }

    /// Called exactly once per response-timeout firing. Falls back to the
    /// most recent known fix when the triggering request carried none.
    pub fn handle_escalation(
        &mut self,
        location: Option<PositionFix>,
        last_known: Option<PositionFix>,
        now: f64,
    ) -> EscalationEvent {
        self.attempt_count += 1;
        self.in_progress = true;
        let event = EscalationEvent {
            contact: self.contact.clone(),
            location: location.or(last_known),
            attempt_number: self.attempt_count,
            timestamp: now,
        };
        warn!(
            "escalating to {} ({}), attempt {}",
            event.contact.name, event.contact.phone_number, event.attempt_number
        );
        event
    }

    /// Local "escalation in progress" status for the UI, distinct from the
    /// external-channel attempt. Sticky until the walk ends.
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn contact(&self) -> &EmergencyContact {
        &self.contact
    }

    /// Human-readable location link for the composed contact message.
    pub fn location_link(location: &PositionFix) -> String {
        format!(
            "https://maps.google.com/?q={:.6},{:.6}",
            location.latitude, location.longitude
        )
    }

}

/// Human-readable message for the contact channel: contact identity plus a
/// location link when one is known.
pub fn compose_contact_message(event: &EscalationEvent) -> String {
    match &event.location {
        Some(loc) => format!(
            "Walk Guardian alert for {}: an unanswered safety check-in. Last known location: {}",
            event.contact.name,
            EscalationCoordinator::location_link(loc)
        ),
        None => format!(
            "Walk Guardian alert for {}: an unanswered safety check-in, no location available",
            event.contact.name
        ),
    }
}

// ─── Remote location log ─────────────────────────────────────────────────────

/// One record-append write per escalation. Fire-and-forget: a failed write
/// is logged, never retried, and never reverts the escalated cycle.
pub struct RemoteLocationLog {
    client: reqwest::Client,
    url: String,
    token: String,
    user: String,
}

impl RemoteLocationLog {
    pub fn from_config(config: &GuardianConfig) -> Option<Self> {
        let url = config.location_log_url.clone()?;
        let token = config.location_log_token.clone()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Some(RemoteLocationLog {
            client,
            url,
            token,
            user: config.location_log_user.clone(),
        })
    }

    pub async fn record(&self, lat: f64, lon: f64, timestamp: f64) {
        let body = json!({
            "user": self.user,
            "lat": lat,
            "lon": lon,
            "timestamp": timestamp,
        });
        let result = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                info!("location record written to remote log");
            }
            Ok(resp) => {
                error!("remote location log rejected write: HTTP {}", resp.status());
            }
            Err(e) => {
                error!("remote location log write failed: {}", e);
            }
        }
    }
}
