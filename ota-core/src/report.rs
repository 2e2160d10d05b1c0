/// Plain-text status messages for the messaging layer
use std::fmt::Write;

use crate::manager::{UpdateState, UpdateStatus};

/// Answer to a manual check. Lists both versions, the notes and the
/// critical flag when an update is waiting, otherwise the running version
/// and the last error.
pub fn check_result(current_version: &str, status: &UpdateStatus) -> String {
    let mut msg = String::new();

    match (status.state(), status.descriptor()) {
        (UpdateState::UpdateAvailable, Some(descriptor)) => {
            msg.push_str("Update available!\n\n");
            let _ = writeln!(msg, "Current: v{}", current_version);
            let _ = writeln!(msg, "Latest: v{}", descriptor.version_label());
            if !descriptor.release_notes().is_empty() {
                let _ = writeln!(msg, "\n{}", descriptor.release_notes());
            }
            if descriptor.is_critical() {
                msg.push_str("\nCRITICAL UPDATE\n");
            }
            msg.push_str("\nSend /install to update now");
        }
        _ => {
            msg.push_str("You're up to date!\n\n");
            let _ = write!(msg, "Version: v{}", current_version);
            if let Some(error) = status.last_error() {
                let _ = write!(msg, "\n\n{}", error);
            }
        }
    }

    msg
}

/// Notice broadcast after a scheduled check found a newer release.
pub fn announcement(current_version: &str, status: &UpdateStatus) -> Option<String> {
    if *status.state() != UpdateState::UpdateAvailable {
        return None;
    }
    let descriptor = status.descriptor()?;
    Some(format!(
        "Firmware update available!\n\nCurrent: v{}\nLatest: v{}\n\nSend /update for details",
        current_version,
        descriptor.version_label()
    ))
}

/// Sent when an install returned instead of rebooting.
pub fn install_failed(status: &UpdateStatus) -> String {
    match status.last_error() {
        Some(error) => format!("Update failed!\n\n{}", error),
        None => "Update failed!".to_string(),
    }
}
