use std::path::Path;
use std::process::Command;

use tracing::warn;

#[cfg(target_os = "macos")]
fn viewer(path: &Path) -> Command {
    let mut cmd = Command::new("open");
    cmd.arg(path);
    cmd
}

#[cfg(target_os = "windows")]
fn viewer(path: &Path) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "start", ""]).arg(path);
    cmd
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn viewer(path: &Path) -> Command {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(path);
    cmd
}

/// Open `path` in the desktop's image viewer without waiting for it.
pub fn show_image(path: &Path) {
    if let Err(e) = viewer(path).spawn() {
        warn!("could not open {} in a viewer: {}", path.display(), e);
    }
}
