use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use install_driver::plan::{load_plan, run_after, run_plan};
use install_driver::preflight::check_session_tools;
use install_driver::transcript::{clean_log_file, record_self, RECORDING_ENV};

fn usage() -> &'static str {
    "Usage:\n  install-driver run <plan.toml>\n  install-driver clean-log <raw_log> [output]"
}

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let installing = args.first().is_some_and(|cmd| cmd == "run");

    report(dispatch(&args), installing, &mut std::io::stderr())
}

fn report<W: Write>(result: Result<Outcome>, installing: bool, err: &mut W) -> ExitCode {
    match result {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        // The recorded run has already reported its own failure.
        Ok(Outcome::RecordedFailure) => ExitCode::FAILURE,
        Err(e) => {
            let _ = writeln!(err, "error: {e:#}");
            if installing {
                let _ = writeln!(err, "Could not complete installation, stopping.");
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

enum Outcome {
    Done,
    RecordedFailure,
}

fn dispatch(args: &[String]) -> Result<Outcome> {
    match args {
        [run, plan] if run == "run" => run_install(Path::new(plan)),
        [clean, raw] if clean == "clean-log" => clean_log(Path::new(raw), Path::new(raw)),
        [clean, raw, output] if clean == "clean-log" => clean_log(Path::new(raw), Path::new(output)),
        _ => bail!(usage()),
    }
}

fn run_install(plan_path: &Path) -> Result<Outcome> {
    let plan = load_plan(plan_path)?;
    let recorded = std::env::var_os(RECORDING_ENV).is_some();

    let Some(log) = plan.session.log.clone() else {
        check_session_tools(&plan.session.shell, false)?;
        run_plan(&plan)?;
        run_after(&plan, None)?;
        return Ok(Outcome::Done);
    };

    if recorded {
        // Already inside `script`; the parent cleans the log and runs [[after]].
        run_plan(&plan)?;
        return Ok(Outcome::Done);
    }

    check_session_tools(&plan.session.shell, true)?;
    let status = record_self(&self_command(plan_path)?, &log)?;

    clean_log_file(&log, &log)?;
    println!("[install-driver] install log written to {}", log.display());

    if !status.success() {
        return Ok(Outcome::RecordedFailure);
    }
    run_after(&plan, Some(&log))?;
    Ok(Outcome::Done)
}

/// Command line that re-runs this install inside the recorder.
fn self_command(plan_path: &Path) -> Result<Vec<String>> {
    let exe = std::env::current_exe().context("resolving install-driver executable path")?;
    let plan: PathBuf = std::fs::canonicalize(plan_path)
        .with_context(|| format!("resolving plan path '{}'", plan_path.display()))?;
    Ok(vec![
        exe.display().to_string(),
        "run".to_string(),
        plan.display().to_string(),
    ])
}

fn clean_log(raw: &Path, output: &Path) -> Result<Outcome> {
    clean_log_file(raw, output).with_context(|| {
        format!(
            "cleaning transcript '{}' into '{}'",
            raw.display(),
            output.display()
        )
    })?;
    println!("[install-driver] wrote {}", output.display());
    Ok(Outcome::Done)
}
