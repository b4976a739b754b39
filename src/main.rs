use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use log::info;
use tokio::time::{interval, sleep, Duration};

use walk_guardian_rs::escalation::compose_contact_message;
use walk_guardian_rs::status::current_timestamp;
use walk_guardian_rs::{
    spawn_session, CheckInRequest, Collaborators, ContactChannel, EmergencyContact,
    EscalationEvent, GuardianConfig, GuardianError, PositionFix, PromptSurface, SafeZone,
    SessionHandle, VitalsSample, WearableLink,
};

#[derive(Parser, Debug)]
#[command(name = "walk_guardian")]
#[command(about = "Walk-home safety guardian - simulated walk demo", long_about = None)]
struct Args {
    /// Walk duration in seconds
    #[arg(value_name = "SECONDS", default_value = "120")]
    duration: u64,

    /// Simulation profile: walking, stationary, no-vitals, spike
    #[arg(long, default_value = "walking")]
    profile: String,

    /// Heart-rate spike threshold (BPM)
    #[arg(long, default_value = "120.0")]
    spike_bpm: f64,

    /// Periodic check-in interval in minutes (1-30)
    #[arg(long, default_value = "5")]
    interval_mins: u64,

    /// Safe-zone "lat,lon,radius_m" around the destination
    #[arg(long)]
    safe_zone: Option<String>,

    /// Emergency contact name
    #[arg(long, default_value = "Ana")]
    contact_name: String,

    /// Emergency contact phone number
    #[arg(long, default_value = "+15555550100")]
    contact_phone: String,

    /// Automatically answer check-ins safe after this many seconds (0 = never)
    #[arg(long, default_value = "0")]
    auto_respond_secs: u64,

    /// Where to write the live status JSON
    #[arg(long, default_value = "walk_guardian_status.json")]
    status_path: String,
}

struct ConsoleSurface;

impl PromptSurface for ConsoleSurface {
    fn present_check_in(&mut self, request: &CheckInRequest) {
        println!(
            "[{}] CHECK-IN ({:?}) - are you safe? (respond or authenticate)",
            ts_now(),
            request.reason
        );
    }

    fn dismiss_check_in(&mut self) {
        println!("[{}] check-in dismissed", ts_now());
    }
}

struct ConsoleContactChannel;

impl ContactChannel for ConsoleContactChannel {
    fn deliver(&mut self, event: &EscalationEvent) -> Result<(), GuardianError> {
        println!("[{}] ESCALATION -> {}", ts_now(), compose_contact_message(event));
        Ok(())
    }
}

struct ConsoleWearable;

impl WearableLink for ConsoleWearable {
    fn push_spike_threshold(&mut self, bpm: f64) {
        println!("[{}] wearable spike threshold set to {:.0} BPM", ts_now(), bpm);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("[{}] Walk Guardian starting", ts_now());
    println!("  Duration: {} seconds", args.duration);
    println!("  Profile: {}", args.profile);
    println!("  Spike threshold: {:.0} BPM", args.spike_bpm);
    println!("  Check-in interval: {} min", args.interval_mins);
    println!("  Contact: {} ({})", args.contact_name, args.contact_phone);

    let mut config = GuardianConfig {
        spike_threshold_bpm: args.spike_bpm,
        ..GuardianConfig::default()
    }
    .with_prompt_interval(args.interval_mins as f64 * 60.0);

    if let Some(zone) = &args.safe_zone {
        config.safe_zone = Some(parse_safe_zone(zone)?);
        println!("  Safe zone: {:?}", config.safe_zone.unwrap());
    }

    let contact = EmergencyContact {
        name: args.contact_name.clone(),
        phone_number: args.contact_phone.clone(),
    };
    let collaborators = Collaborators {
        surface: Box::new(ConsoleSurface),
        contact_channel: Box::new(ConsoleContactChannel),
        wearable: Box::new(ConsoleWearable),
    };

    let (handle, task) = spawn_session(config, Some(contact), collaborators)?;

    // Simulated signal sources, in place of the phone's location API and
    // the wearable transport.
    let _fix_task = tokio::spawn(fix_loop(handle.clone(), args.profile.clone()));
    if args.profile != "no-vitals" {
        let _vitals_task = tokio::spawn(vitals_loop(handle.clone(), args.profile.clone()));
    }
    if args.auto_respond_secs > 0 {
        let _responder = tokio::spawn(auto_responder(handle.clone(), args.auto_respond_secs));
    }

    // Status export loop, ends the walk when the duration is up.
    let started = Utc::now();
    let mut status_tick = interval(Duration::from_secs(2));
    loop {
        status_tick.tick().await;
        if let Some(status) = handle.snapshot().await {
            println!("[{}] {}", ts_now(), status.status_text);
            let _ = status.save(&args.status_path);
        }
        let elapsed = Utc::now().signed_duration_since(started).num_seconds();
        if elapsed as u64 >= args.duration {
            break;
        }
    }

    println!("[{}] Walk duration reached, ending session", ts_now());
    if let Some(status) = handle.snapshot().await {
        println!("\n=== Final Stats ===");
        println!("Fixes observed: {}", status.fixes_observed);
        println!("Vitals samples: {}", status.vitals_samples);
        println!("Check-ins issued: {}", status.check_ins_issued);
        println!("Escalation attempts: {}", status.escalation_attempts);
        let _ = status.save(&args.status_path);
    }
    handle.end().await;
    task.await?;
    info!("done");
    Ok(())
}

/// Feeds one position fix every 5 seconds. The walking profile drifts
/// steadily; the stationary profile parks after 20 seconds.
async fn fix_loop(handle: SessionHandle, profile: String) {
    let mut ticker = interval(Duration::from_secs(5));
    let mut seq = 0u64;
    loop {
        ticker.tick().await;
        let drift = if profile == "stationary" && seq >= 4 {
            4.0 * 0.0004 // parked
        } else {
            seq as f64 * 0.0004 // ~45 m per fix
        };
        let fix = PositionFix {
            timestamp: current_timestamp(),
            latitude: 32.2319 + drift,
            longitude: -110.9501,
        };
        handle.observe_fix(fix).await;
        seq += 1;
    }
}

/// Feeds one heart-rate sample per second. The spike profile injects a
/// burst above any reasonable threshold at the 30 second mark.
async fn vitals_loop(handle: SessionHandle, profile: String) {
    let mut ticker = interval(Duration::from_secs(1));
    let mut seq = 0u64;
    loop {
        ticker.tick().await;
        let bpm = if profile == "spike" && (30..35).contains(&seq) {
            165.0
        } else {
            78.0 + (seq as f64 * 0.7).sin() * 6.0
        };
        let sample = VitalsSample::Reading { bpm, timestamp: current_timestamp() };
        handle.observe_vitals(sample).await;
        seq += 1;
    }
}

/// Stands in for the user tapping "I'm safe" a fixed delay after each
/// prompt appears.
async fn auto_responder(handle: SessionHandle, delay_secs: u64) {
    let mut ticker = interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        if let Some(status) = handle.snapshot().await {
            if status.status_text.starts_with("check-in pending") {
                sleep(Duration::from_secs(delay_secs)).await;
                handle.respond_safe().await;
            }
        }
    }
}

fn parse_safe_zone(arg: &str) -> Result<SafeZone> {
    let parts: Vec<&str> = arg.split(',').collect();
    if parts.len() != 3 {
        anyhow::bail!("safe zone must be lat,lon,radius_m");
    }
    Ok(SafeZone {
        center_lat: parts[0].trim().parse()?,
        center_lon: parts[1].trim().parse()?,
        radius_m: parts[2].trim().parse()?,
    })
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
