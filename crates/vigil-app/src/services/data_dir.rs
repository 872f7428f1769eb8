// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-aware data directory resolution.

use std::path::PathBuf;

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let base = base_dir(
        std::env::var("XDG_DATA_HOME").ok(),
        std::env::var("HOME").ok(),
    );
    let dir = base.join("vigil");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// XDG data dir, then `~/.local/share`, then `/tmp`.
fn base_dir(xdg: Option<String>, home: Option<String>) -> PathBuf {
    if let Some(xdg) = xdg.filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = home.filter(|v| !v.is_empty()) {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from("/tmp")
}
