pub mod commands;
pub mod logging;

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use patchdiff_core::PatchdiffError;

/// Canonicalize a path if possible, falling back to the given string
/// relative to the current working directory.
pub fn canonicalize_or_current(path: &str) -> Result<PathBuf> {
    let path = Path::new(path);
    if path == Path::new(".") {
        return env::current_dir().context("Failed to get current directory");
    }
    match path.canonicalize() {
        Ok(p) => Ok(p),
        Err(_) if path.is_absolute() => Ok(path.to_path_buf()),
        Err(_) => {
            let cwd = env::current_dir().context("Failed to get current directory")?;
            Ok(cwd.join(path))
        }
    }
}

/// The typed core error somewhere in an `anyhow` chain, if any.
pub fn core_error(err: &anyhow::Error) -> Option<&PatchdiffError> {
    err.chain().find_map(|cause| cause.downcast_ref::<PatchdiffError>())
}

/// Exit code for a failed command: the core error's code, or 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    core_error(err).map_or(1, PatchdiffError::exit_code)
}

/// `error: ...` and optional `details: ...` lines for stderr.
pub fn render_error(err: &anyhow::Error) -> String {
    match core_error(err) {
        Some(core) => {
            let mut out = format!("error: {core}");
            if let Some(details) = core.details() {
                let pretty =
                    serde_json::to_string_pretty(&details).unwrap_or_else(|_| details.to_string());
                out.push_str(&format!("\ndetails: {pretty}"));
            }
            out
        }
        None => format!("error: {err:#}"),
    }
}
