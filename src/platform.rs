use crate::{logi, logw};
use std::path::Path;
use std::process::Command;

/// Desktop launcher for the current OS, if there is one.
pub fn viewer_program() -> Option<&'static str> {
    if cfg!(target_os = "windows") {
        Some("explorer")
    } else if cfg!(target_os = "macos") {
        Some("open")
    } else if cfg!(unix) {
        Some("xdg-open")
    } else {
        None
    }
}

/// Show a produced narration or video in the default player. Returns whether
/// a viewer was launched; failure to launch never fails the run.
pub fn preview(path: &Path) -> bool {
    if !path.is_file() {
        logw(format!("Nothing to preview at {}", path.display()));
        return false;
    }

    let Some(program) = viewer_program() else {
        logw("No desktop viewer known for this platform");
        return false;
    };

    match Command::new(program).arg(path).spawn() {
        Ok(_) => {
            logi(format!("Opened {} with {}", path.display(), program));
            true
        }
        Err(e) => {
            logw(format!("Could not launch {}: {}", program, e));
            false
        }
    }
}
