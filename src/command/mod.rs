//! Shared helpers for all sub-commands.

pub mod actions;
pub mod install;
pub mod settings;

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Fresh directory under `base`, unique per process and call.
pub(crate) fn unique_temp_dir(base: &Path, prefix: &str) -> Result<PathBuf> {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let pid = std::process::id();
    fs::create_dir_all(base).with_context(|| format!("create temp base {}", base.display()))?;
    let dir = base.join(format!("{prefix}-{ts}-{pid}"));
    fs::create_dir(&dir).with_context(|| format!("create temp dir {}", dir.display()))?;
    Ok(dir)
}
