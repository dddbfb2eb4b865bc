// src/alert/popup.rs

use chrono::{DateTime, Local};
use rfd::{MessageDialog, MessageLevel};
use std::thread;
use tracing::info;

/// Spawn the acknowledgment popup on its own thread so the modal dialog
/// never blocks frame polling. The thread is not joined: the popup is a
/// one-shot per session and the dialog returns nothing the loop needs.
pub fn spawn_fire_popup(first_fire_time: DateTime<Local>) {
    let time_str = first_fire_time.format("%Y-%m-%d %H:%M:%S").to_string();
    info!("🔥 Showing fire alert popup (first detected {})", time_str);

    thread::spawn(move || {
        MessageDialog::new()
            .set_level(MessageLevel::Warning)
            .set_title("🔥 FIRE ALERT")
            .set_description(format!(
                "🔥 FIRE DETECTED!\n\nTime: {}\n\nPress OK to acknowledge.",
                time_str
            ))
            .show();
    });
}
