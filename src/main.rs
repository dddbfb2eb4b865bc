// src/main.rs

mod alert;
mod config;
mod detector;
mod overlay;
mod stream;
mod types;

use alert::sms::SmsClient;
use alert::sound::SoundAlarm;
use alert::{popup, AlertAction, SessionAlertState};
use anyhow::Result;
use config::Secrets;
use detector::{contains_fire, Detector};
use std::time::{Duration, Instant};
use stream::CameraStream;
use tracing::{debug, error, info, warn};
use types::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "fire_sentinel={},ort=warn",
            config.logging.level
        ))
        .init();

    info!("🚨 Fire detection system starting");

    let secrets = Secrets::from_env()?;

    let mut fire_detector = Detector::new(&config.models.fire, &config.inference)?;
    let mut context_detector = Detector::new(&config.models.context, &config.inference)?;
    info!("✓ Both detectors ready");

    let sms_client = SmsClient::new(&secrets)?;
    let sound_alarm = SoundAlarm::new(&config.alert.sound_path)?;

    // Fails fast: no retry at startup if the camera is unreachable.
    let mut stream = CameraStream::open(&secrets.stream_url)?;

    let mut alert_state =
        SessionAlertState::new(Duration::from_secs(config.alert.cooldown_seconds));

    info!(
        "🚨 Fire detection system running (sound cooldown: {}s)",
        config.alert.cooldown_seconds
    );

    let mut stats = SessionStats::default();

    loop {
        let frame = match stream.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                warn!("⚠️ Stream read failed or empty frame");
                stats.frames_skipped += 1;
                continue;
            }
            Err(e) => {
                warn!("⚠️ Stream read error: {}", e);
                stats.frames_skipped += 1;
                continue;
            }
        };
        stats.frames_processed += 1;

        let fire_detections = match fire_detector.detect(&frame) {
            Ok(dets) => dets,
            Err(e) => {
                debug!("Fire detector failed on frame {}: {}", stats.frames_processed, e);
                Vec::new()
            }
        };

        // Display-only model; never consulted for the alert decision.
        let context_detections = match context_detector.detect(&frame) {
            Ok(dets) => dets,
            Err(e) => {
                debug!(
                    "Context detector failed on frame {}: {}",
                    stats.frames_processed, e
                );
                Vec::new()
            }
        };

        let composite = overlay::compose(&frame, &fire_detections, &context_detections)?;
        if overlay::show_and_poll(&config.display, &composite)? {
            info!("Quit key pressed");
            break;
        }

        let fire_detected = contains_fire(&fire_detections);
        if fire_detected {
            stats.fire_frames += 1;
        }

        for action in alert_state.observe(fire_detected, Instant::now()) {
            match action {
                AlertAction::SendSms { first_fire_time } => {
                    stats.sms_attempts += 1;
                    // Awaited inline: blocks the loop for one network
                    // round-trip, at most once per session. A failure
                    // consumes the session's SMS slot (no retry).
                    if let Err(e) = sms_client.send_fire_alert(first_fire_time).await {
                        error!("❌ Failed to send SMS: {}", e);
                        stats.sms_failures += 1;
                    }
                }
                AlertAction::PlaySound => {
                    info!("🔥 FIRE DETECTED! Playing alert sound");
                    sound_alarm.play()?;
                    stats.sound_alerts += 1;
                }
                AlertAction::ShowPopup { first_fire_time } => {
                    popup::spawn_fire_popup(first_fire_time);
                    stats.popups_shown += 1;
                }
            }
        }
    }

    overlay::close_windows()?;

    info!("\n📊 Session Report:");
    info!("  Frames processed: {}", stats.frames_processed);
    info!("  Frames skipped: {}", stats.frames_skipped);
    info!("  Fire-positive frames: {}", stats.fire_frames);
    info!("  Sound alerts: {}", stats.sound_alerts);
    info!(
        "  SMS attempts: {} ({} failed)",
        stats.sms_attempts, stats.sms_failures
    );
    info!("  Popups shown: {}", stats.popups_shown);
    if let Some(first) = alert_state.first_fire_time() {
        info!(
            "  First fire detected at: {}",
            first.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

#[derive(Default)]
struct SessionStats {
    frames_processed: u64,
    frames_skipped: u64,
    fire_frames: u64,
    sound_alerts: u64,
    sms_attempts: u64,
    sms_failures: u64,
    popups_shown: u64,
}
