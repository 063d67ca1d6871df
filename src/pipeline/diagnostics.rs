//! `last-error.log` (spec.md §6, §7): an optional diagnostic dump written
//! when the JSON Coercer exhausts its attempt budget for a file. Not
//! required for correctness — the pipeline already logs the failure via
//! `tracing` — but the full per-attempt raw-text history is too large for
//! a log line, so it is dumped to a plain file a user can open by hand.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::CoerceFailed;

/// Appends one failure record to `<config_dir>/last-error.log`. Best
/// effort: a write failure here must never mask the original
/// `CoerceFailed` the caller is already propagating.
pub fn write_last_error_log(config_dir: &Path, source_path: &Path, failed: &CoerceFailed) -> std::io::Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let log_path = config_dir.join("last-error.log");

    let mut file = OpenOptions::new().create(true).append(true).open(log_path)?;

    writeln!(file, "=== coerce failure ===")?;
    writeln!(file, "file: {}", source_path.display())?;
    writeln!(file, "time: {}", chrono::Utc::now().to_rfc3339())?;
    writeln!(file, "attempts: {}", failed.attempts.len())?;
    for attempt in &failed.attempts {
        writeln!(file, "--- attempt {} ---", attempt.attempt)?;
        writeln!(file, "error: {}", attempt.error)?;
        writeln!(file, "raw response:\n{}", attempt.raw_text)?;
    }
    writeln!(file)?;

    Ok(())
}
