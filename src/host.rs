//! Commands run directly on the host, outside the shell session.

use anyhow::{bail, Context, Result};
use std::process::Command;

/// Print `# <cmd>`, run it with `sh -c`, and fail on a non-zero exit.
pub fn run_host(cmd: &str) -> Result<()> {
    println!("# {cmd}");
    let status = Command::new("sh")
        .args(["-c", cmd])
        .status()
        .with_context(|| format!("running host command '{cmd}'"))?;
    if !status.success() {
        bail!("host command '{cmd}' failed with {status}");
    }
    Ok(())
}

/// Run `cmd` with `sh -c` and return its combined stdout and stderr,
/// without the trailing newline. The exit status is ignored.
pub fn host_output(cmd: &str) -> Result<String> {
    let output = Command::new("sh")
        .args(["-c", &format!("exec 2>&1\n{cmd}")])
        .output()
        .with_context(|| format!("running host command '{cmd}'"))?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_host_success() {
        assert!(run_host("true").is_ok());
    }

    #[test]
    fn test_run_host_failure() {
        let err = run_host("exit 4").unwrap_err();
        assert!(err.to_string().contains("exit 4"));
    }

    #[test]
    fn test_host_output_captures_both_streams() {
        assert_eq!(host_output("echo out; echo err >&2").unwrap(), "out\nerr");
    }

    #[test]
    fn test_host_output_ignores_status() {
        assert_eq!(host_output("echo partial; false").unwrap(), "partial");
    }
}
