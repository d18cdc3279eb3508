//! Executing an install plan against a shell session.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;
use tracing::info;

use super::{expand, Confirmation, Plan, Step, LOG_VAR};
use crate::confirm::{self, yes_no};
use crate::host::{host_output, run_host};
use crate::session::{Invocation, Session, SessionBuilder, TerminalSize};

/// Run a plan from start to finish in this process: read secrets, ask every
/// confirmation, then drive the shell through each step.
///
/// `[[after]]` commands are not run here; see [`run_after`].
pub fn run_plan(plan: &Plan) -> Result<()> {
    let mut vars = plan.vars.clone();
    for secret in &plan.secrets {
        let prompt = expand(&secret.prompt, &plan.vars)?;
        let value = confirm::read_secret(&prompt, secret.confirm)
            .with_context(|| format!("reading secret '{}'", secret.name))?;
        vars.insert(secret.name.clone(), value);
    }

    let stdin = std::io::stdin();
    confirm_all(
        &plan.confirmations,
        &vars,
        &mut stdin.lock(),
        &mut std::io::stdout(),
    )?;

    let size = plan
        .session
        .size
        .or_else(TerminalSize::of_terminal)
        .unwrap_or_default();
    println!("[install-driver] starting {}", plan.session.shell);

    let mut session = SessionBuilder::new(&plan.session.shell)
        .size(size)
        .echo(plan.session.echo)
        .default_timeout(plan.session.default_timeout)
        .start()?;
    session.establish_prompt()?;

    run_steps(&mut session, &plan.steps, &vars)?;

    // The shell's own status is that of its last command; the steps have
    // already been checked one by one.
    let code = session.terminate()?;
    info!(code, "shell exited");
    println!("[install-driver] all {} steps completed", plan.steps.len());
    Ok(())
}

/// Ask every confirmation in order. The first one declined aborts.
pub fn confirm_all<R: BufRead, W: Write>(
    confirmations: &[Confirmation],
    vars: &BTreeMap<String, String>,
    input: &mut R,
    output: &mut W,
) -> Result<()> {
    for confirmation in confirmations {
        if let Some(show) = &confirmation.show {
            let cmd = expand(show, vars)?;
            writeln!(output)?;
            writeln!(output, "{}", host_output(&cmd)?)?;
            writeln!(output)?;
        }
        let message = expand(&confirmation.message, vars)?;
        if !yes_no(&message, confirmation.default, input, output)? {
            bail!("declined by operator: {message}");
        }
    }
    Ok(())
}

/// Drive `session` through `steps`, stopping at the first failure.
pub fn run_steps(
    session: &mut Session,
    steps: &[Step],
    vars: &BTreeMap<String, String>,
) -> Result<()> {
    for (i, step) in steps.iter().enumerate() {
        run_step(session, step, vars)
            .with_context(|| format!("step #{} of {} failed", i + 1, steps.len()))?;
    }
    Ok(())
}

fn run_step(session: &mut Session, step: &Step, vars: &BTreeMap<String, String>) -> Result<()> {
    match step {
        Step::Run {
            command,
            expect: pattern,
            timeout,
        } => {
            let mut invocation = Invocation::new(expand(command, vars)?);
            if let Some(pattern) = pattern {
                invocation = invocation.expect(expand(pattern, vars)?);
            }
            if let Some(timeout) = timeout {
                invocation = invocation.timeout(*timeout);
            }
            info!(command = %command, "run");
            session.execute(&invocation)?;
        }
        Step::Send(text) => {
            session.send_raw(expand(text, vars)?.as_bytes())?;
        }
        Step::Wait { pattern, timeout } => {
            let timeout = timeout.unwrap_or(session.default_timeout());
            session.expect(&expand(pattern, vars)?, timeout)?;
        }
        Step::Enter(command) => {
            info!(command = %command, "entering nested shell");
            session.enter_subshell(&expand(command, vars)?)?;
        }
        Step::Leave => {
            session.leave_subshell()?;
        }
        Step::Host(command) => {
            run_host(&expand(command, vars)?)?;
        }
        Step::Sleep(duration) => std::thread::sleep(*duration),
    }
    Ok(())
}

/// Run the plan's `[[after]]` commands on the host, with `{{log}}` bound to
/// `log` when there is one.
pub fn run_after(plan: &Plan, log: Option<&Path>) -> Result<()> {
    let mut vars = plan.vars.clone();
    if let Some(log) = log {
        vars.insert(LOG_VAR.to_string(), log.display().to_string());
    }
    for command in &plan.after {
        run_host(&expand(command, &vars)?)?;
    }
    Ok(())
}
