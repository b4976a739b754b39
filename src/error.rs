use thiserror::Error;

/// Hard failures surfaced by the coordination core. Authentication failures
/// and vitals signal loss are session states, not errors.
#[derive(Debug, Error)]
pub enum GuardianError {
    /// A walk cannot start without an emergency contact.
    #[error("configuration error: {0}")]
    Configuration(&'static str),

    /// Location or notification permission withheld. Degrades the affected
    /// detector; never blocks walk start.
    #[error("permission denied: {0}")]
    PermissionDenied(&'static str),

    /// Remote location log or contact-channel send failed. Logged only;
    /// escalation state stays Escalated and nothing is retried.
    #[error("delivery failure: {0}")]
    Delivery(String),
}
