pub mod checkin;
pub mod config;
pub mod error;
pub mod escalation;
pub mod prompter;
pub mod runtime;
pub mod session;
pub mod stationary;
pub mod status;
pub mod types;
pub mod vitals;

pub use checkin::{CheckInCycle, CycleState};
pub use config::GuardianConfig;
pub use error::GuardianError;
pub use escalation::{ContactChannel, EscalationCoordinator};
pub use prompter::PeriodicPrompter;
pub use runtime::{spawn_session, Collaborators, PromptSurface, SessionHandle, WearableLink};
pub use session::{Effect, SessionPhase, WalkSession};
pub use stationary::StationaryDetector;
pub use status::WalkStatus;
pub use types::{
    AuthFailureKind, AuthOutcome, CheckInReason, CheckInRequest, EmergencyContact,
    EscalationEvent, PositionFix, SafeZone, VitalsSample,
};
pub use vitals::VitalsWatchdog;
