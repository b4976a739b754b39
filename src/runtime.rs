// runtime.rs — tokio shell around the pure WalkSession core.
//
// All mutations flow through one spawned task: inbound signals arrive on an
// mpsc channel, alarms are a single `sleep` until the core's earliest
// deadline. Two signals can never race inside the core, and after the End
// command is processed no alarm can touch the torn-down session.

use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::GuardianConfig;
use crate::error::GuardianError;
use crate::escalation::{compose_contact_message, ContactChannel, RemoteLocationLog};
use crate::session::{Effect, WalkSession};
use crate::status::{current_timestamp, WalkStatus};
use crate::types::{AuthOutcome, CheckInRequest, EmergencyContact, PositionFix, VitalsSample};

/// Prompt/notification surface collaborator. The surface calls back through
/// the session handle (`respond_safe` / `auth_outcome`).
pub trait PromptSurface: Send {
    fn present_check_in(&mut self, request: &CheckInRequest);
    fn dismiss_check_in(&mut self);
}

/// Outgoing configuration push to the wearable link.
pub trait WearableLink: Send {
    fn push_spike_threshold(&mut self, bpm: f64);
}

enum Command {
    Fix(PositionFix),
    Vitals(VitalsSample),
    RespondSafe,
    Auth(AuthOutcome),
    SetSpikeThreshold(f64),
    PermissionDenied(String),
    Snapshot(oneshot::Sender<WalkStatus>),
    End,
}

/// Clonable handle for the signal sources and the UI layer. Sends after the
/// walk has ended are dropped silently.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub async fn observe_fix(&self, fix: PositionFix) {
        self.send(Command::Fix(fix)).await;
    }

    pub async fn observe_vitals(&self, sample: VitalsSample) {
        self.send(Command::Vitals(sample)).await;
    }

    pub async fn respond_safe(&self) {
        self.send(Command::RespondSafe).await;
    }

    pub async fn auth_outcome(&self, outcome: AuthOutcome) {
        self.send(Command::Auth(outcome)).await;
    }

    pub async fn set_spike_threshold(&self, bpm: f64) {
        self.send(Command::SetSpikeThreshold(bpm)).await;
    }

    pub async fn permission_denied(&self, source: &str) {
        self.send(Command::PermissionDenied(source.to_string())).await;
    }

    pub async fn snapshot(&self) -> Option<WalkStatus> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx)).await;
        rx.await.ok()
    }

    pub async fn end(&self) {
        self.send(Command::End).await;
    }

    async fn send(&self, command: Command) {
        if self.tx.send(command).await.is_err() {
            debug!("session task gone, command dropped");
        }
    }
}

/// Everything the shell dispatches effects to.
pub struct Collaborators {
    pub surface: Box<dyn PromptSurface>,
    pub contact_channel: Box<dyn ContactChannel>,
    pub wearable: Box<dyn WearableLink>,
}

/// Start one walk: builds the core, requires the emergency contact up
/// front, and spawns the serializing actor task.
pub fn spawn_session(
    config: GuardianConfig,
    contact: Option<EmergencyContact>,
    collaborators: Collaborators,
) -> Result<(SessionHandle, JoinHandle<()>), GuardianError> {
    let remote_log = RemoteLocationLog::from_config(&config).map(Arc::new);
    let mut session = WalkSession::new(config);
    session.start(contact, current_timestamp())?;

    let (tx, rx) = mpsc::channel(256);
    let task = tokio::spawn(session_loop(session, rx, collaborators, remote_log));
    Ok((SessionHandle { tx }, task))
}

async fn session_loop(
    mut session: WalkSession,
    mut rx: mpsc::Receiver<Command>,
    mut collaborators: Collaborators,
    remote_log: Option<Arc<RemoteLocationLog>>,
) {
    loop {
        let now = current_timestamp();
        let sleep_for = session
            .next_deadline()
            .map(|deadline| Duration::from_secs_f64((deadline - now).max(0.0)));

        tokio::select! {
            command = rx.recv() => {
                let command = match command {
                    Some(c) => c,
                    None => break, // all handles dropped
                };
                let now = current_timestamp();
                let ended = matches!(command, Command::End);
                let effects = apply(&mut session, command, now);
                dispatch(&mut collaborators, &remote_log, effects);
                if ended {
                    break;
                }
            }
            _ = sleep(sleep_for.unwrap_or(Duration::from_secs(3600))), if sleep_for.is_some() => {
                // Deadlines are re-checked against the clock inside the
                // core, so a late wakeup cannot fire a cancelled alarm.
                let effects = session.tick(current_timestamp());
                dispatch(&mut collaborators, &remote_log, effects);
            }
        }
    }
    info!("session task stopped");
}

fn apply(session: &mut WalkSession, command: Command, now: f64) -> Vec<Effect> {
    match command {
        Command::Fix(fix) => session.feed_fix(&fix),
        Command::Vitals(sample) => session.feed_vitals(&sample),
        Command::RespondSafe => session.respond_safe(now),
        Command::Auth(outcome) => session.auth_outcome(&outcome),
        Command::SetSpikeThreshold(bpm) => session.set_spike_threshold(bpm),
        Command::PermissionDenied(source) => {
            session.note_permission_denied(&source);
            Vec::new()
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(session.get_snapshot(now));
            Vec::new()
        }
        Command::End => session.end(now),
    }
}

fn dispatch(
    collaborators: &mut Collaborators,
    remote_log: &Option<Arc<RemoteLocationLog>>,
    effects: Vec<Effect>,
) {
    for effect in effects {
        match effect {
            Effect::PresentCheckIn(request) => {
                collaborators.surface.present_check_in(&request);
            }
            Effect::DismissCheckIn => {
                collaborators.surface.dismiss_check_in();
            }
            Effect::Escalate(event) => {
                info!("contact message: {}", compose_contact_message(&event));
                if let Err(e) = collaborators.contact_channel.deliver(&event) {
                    // Fire-and-forget: logged, never retried, and the
                    // escalated state stays put.
                    error!("contact channel delivery failed: {}", e);
                }
            }
            Effect::RecordLocation { latitude, longitude, timestamp } => {
                if let Some(log) = remote_log {
                    let log = Arc::clone(log);
                    tokio::spawn(async move {
                        log.record(latitude, longitude, timestamp).await;
                    });
                }
            }
            Effect::PushSpikeThreshold(bpm) => {
                collaborators.wearable.push_spike_threshold(bpm);
            }
        }
    }
}
