//! Preflight checks run before any install step.
//!
//! Validates that the host has the tools a run depends on, so a missing
//! `script` or shell is reported up front instead of halfway through a disk
//! wipe.
//!
//! # Example
//!
//! ```rust
//! use install_driver::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("script") {
//!     println!("util-linux not installed");
//! }
//!
//! let tools = &[("bash", "bash"), ("script", "util-linux")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};

/// Check if a command exists on the host system's PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Recorder used to capture the whole run: (command_name, package_name).
pub const RECORDER_TOOL: (&str, &str) = ("script", "util-linux");

/// Check that specific tools are available.
///
/// # Arguments
///
/// * `tools` - Slice of (command, package) tuples
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check the tools needed to drive `shell`, plus the recorder when the run
/// is being logged.
pub fn check_session_tools(shell: &str, recording: bool) -> Result<()> {
    let program = shell.split_whitespace().next().unwrap_or(shell);
    let mut tools = vec![(program, program)];
    if recording {
        tools.push(RECORDER_TOOL);
    }
    check_required_tools(&tools)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        // 'sh' should exist on any Unix system
        assert!(command_exists("sh"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_success() {
        let tools = &[("sh", "dash"), ("cat", "coreutils")];
        assert!(check_required_tools(tools).is_ok());
    }

    #[test]
    fn test_check_required_tools_lists_all_missing() {
        let tools = &[("nonexistent_xyz", "fake-a"), ("nonexistent_abc", "fake-b")];
        let err = check_required_tools(tools).unwrap_err().to_string();
        assert!(err.contains("nonexistent_xyz (install: fake-a)"));
        assert!(err.contains("nonexistent_abc (install: fake-b)"));
    }

    #[test]
    fn test_check_session_tools_uses_program_name() {
        assert!(check_session_tools("sh -i", false).is_ok());
        assert!(check_session_tools("nonexistent_shell_xyz --norc", false).is_err());
    }
}
