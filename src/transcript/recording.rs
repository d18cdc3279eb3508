//! Capturing a whole run with `script(1)` and cleaning the result.
//!
//! The binary re-executes itself under `script -e -q -c '<cmd>' <log>` so
//! every byte written to the terminal, including the live shell session, ends
//! up in the log. The child sees [`RECORDING_ENV`] and does not wrap again.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use std::process::{Command, ExitStatus};
use tracing::{debug, info};

use super::normalize;

/// Set in the environment of a process that is already being recorded.
pub const RECORDING_ENV: &str = "INSTALL_DRIVER_RECORDING";

/// Run `argv` under `script`, writing the raw transcript to `log_path`.
///
/// Returns the exit status of the recorded command (`script -e` forwards it).
pub fn record_self(argv: &[String], log_path: &Path) -> Result<ExitStatus> {
    if argv.is_empty() {
        bail!("cannot record an empty command line");
    }

    let command_line = argv
        .iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ");
    debug!(%command_line, log = %log_path.display(), "starting recorder");

    let status = Command::new("script")
        .args(["-e", "-q", "-c"])
        .arg(&command_line)
        .arg(log_path)
        .env(RECORDING_ENV, "1")
        .status()
        .with_context(|| format!("running 'script' to record into '{}'", log_path.display()))?;

    info!(%status, "recorded run finished");
    Ok(status)
}

/// Replace a raw transcript on disk with its normalized text.
///
/// Reads `raw_path`, decodes it as UTF-8 (invalid sequences become U+FFFD),
/// normalizes it once and writes the result to `output_path`, which may be
/// the same file.
pub fn clean_log_file(raw_path: &Path, output_path: &Path) -> Result<()> {
    let bytes = fs::read(raw_path)
        .with_context(|| format!("reading raw transcript '{}'", raw_path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let cleaned = normalize(&text);
    fs::write(output_path, cleaned.as_bytes())
        .with_context(|| format!("writing install log '{}'", output_path.display()))?;
    debug!(
        raw_bytes = bytes.len(),
        clean_bytes = cleaned.len(),
        "normalized transcript"
    );
    Ok(())
}

/// Quote `arg` for `sh -c`, leaving plain words alone.
fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}
