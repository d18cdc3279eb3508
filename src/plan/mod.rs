//! Install plans: the TOML description of one unattended install.
//!
//! ```toml
//! [session]
//! shell = "bash"
//! default_timeout_secs = 30
//! log = "install.log"
//!
//! [vars]
//! disk = "/dev/sda"
//! username = "bilbo"
//!
//! [[secret]]
//! name = "password"
//! prompt = "Choose a password for {{username}}"
//!
//! [[confirm]]
//! show = "fdisk -l {{disk}}"
//! message = "{{disk}} will be erased. Continue?"
//! default = "no"
//!
//! [[step]]
//! run = "wipefs --all {{disk}}"
//!
//! [[step]]
//! run = "fdisk {{disk}}"
//! expect = "Command (m for help)"
//!
//! [[step]]
//! run = "pacstrap /mnt base linux"
//! timeout_secs = 600
//!
//! [[after]]
//! run = "cp {{log}} /mnt/var/log/install.log"
//! ```
//!
//! Every text field may reference variables as `{{name}}`. References are
//! checked when the plan is loaded; values are filled in when a step runs,
//! after secrets have been read.

pub mod runner;

pub use runner::{confirm_all, run_after, run_plan, run_steps};

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::confirm::Answer;
use crate::session::{TerminalSize, DEFAULT_TIMEOUT};

/// Variable holding the install log path in `[[after]]` commands.
pub const LOG_VAR: &str = "log";

const DEFAULT_SHELL: &str = "bash";

#[derive(Debug, Clone)]
pub struct Plan {
    pub session: SessionSettings,
    pub vars: BTreeMap<String, String>,
    pub secrets: Vec<Secret>,
    pub confirmations: Vec<Confirmation>,
    pub steps: Vec<Step>,
    pub after: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub shell: String,
    pub default_timeout: Duration,
    pub log: Option<PathBuf>,
    pub echo: bool,
    /// Fixed terminal size; `None` follows the operator's terminal.
    pub size: Option<TerminalSize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret {
    pub name: String,
    pub prompt: String,
    pub confirm: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub message: String,
    pub default: Answer,
    /// Host command whose output is shown before asking.
    pub show: Option<String>,
}

/// One entry of `[[step]]`. Text fields are unexpanded templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Run {
        command: String,
        expect: Option<String>,
        timeout: Option<Duration>,
    },
    Send(String),
    Wait {
        pattern: String,
        timeout: Option<Duration>,
    },
    Enter(String),
    Leave,
    Host(String),
    Sleep(Duration),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanToml {
    session: Option<SessionToml>,
    #[serde(default)]
    vars: BTreeMap<String, String>,
    #[serde(default)]
    secret: Vec<SecretToml>,
    #[serde(default)]
    confirm: Vec<ConfirmToml>,
    #[serde(default)]
    step: Vec<StepToml>,
    #[serde(default)]
    after: Vec<AfterToml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SessionToml {
    shell: Option<String>,
    default_timeout_secs: Option<u64>,
    log: Option<String>,
    echo: Option<bool>,
    rows: Option<u16>,
    cols: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SecretToml {
    name: String,
    prompt: String,
    confirm: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfirmToml {
    message: String,
    default: Option<String>,
    show: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepToml {
    run: Option<String>,
    send: Option<String>,
    wait: Option<String>,
    enter: Option<String>,
    leave: Option<bool>,
    host: Option<String>,
    sleep_ms: Option<u64>,
    expect: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AfterToml {
    run: String,
}

/// Read and validate an install plan.
pub fn load_plan(path: &Path) -> Result<Plan> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading install plan '{}'", path.display()))?;
    parse_plan(&text).with_context(|| format!("invalid install plan '{}'", path.display()))
}

/// Parse and validate plan text.
pub fn parse_plan(text: &str) -> Result<Plan> {
    let parsed: PlanToml = toml::from_str(text).context("parsing TOML")?;

    let session = parse_session(parsed.session.unwrap_or_default())?;

    let mut known: BTreeSet<String> = parsed.vars.keys().cloned().collect();
    let mut secrets = Vec::with_capacity(parsed.secret.len());
    for secret in parsed.secret {
        let name = secret.name.trim().to_string();
        if name.is_empty() {
            bail!("secret with empty name");
        }
        if name == LOG_VAR || !known.insert(name.clone()) {
            bail!("secret '{}' clashes with another variable", name);
        }
        secrets.push(Secret {
            name,
            prompt: secret.prompt,
            confirm: secret.confirm.unwrap_or(true),
        });
    }

    let var_names: BTreeSet<String> = parsed.vars.keys().cloned().collect();
    for secret in &secrets {
        check_refs(&secret.prompt, &var_names)
            .with_context(|| format!("secret '{}'", secret.name))?;
    }

    let mut confirmations = Vec::with_capacity(parsed.confirm.len());
    for (i, confirm) in parsed.confirm.into_iter().enumerate() {
        let confirmation = parse_confirmation(confirm)
            .and_then(|c| {
                check_refs(&c.message, &known)?;
                if let Some(show) = &c.show {
                    check_refs(show, &known)?;
                }
                Ok(c)
            })
            .with_context(|| format!("confirm #{}", i + 1))?;
        confirmations.push(confirmation);
    }

    let mut steps = Vec::with_capacity(parsed.step.len());
    for (i, step) in parsed.step.into_iter().enumerate() {
        let step = parse_step(step)
            .and_then(|s| {
                for text in step_templates(&s) {
                    check_refs(text, &known)?;
                }
                Ok(s)
            })
            .with_context(|| format!("step #{}", i + 1))?;
        steps.push(step);
    }

    let mut after_vars = var_names;
    if session.log.is_some() {
        after_vars.insert(LOG_VAR.to_string());
    }
    let mut after = Vec::with_capacity(parsed.after.len());
    for (i, entry) in parsed.after.into_iter().enumerate() {
        check_refs(&entry.run, &after_vars).with_context(|| format!("after #{}", i + 1))?;
        after.push(entry.run);
    }

    Ok(Plan {
        session,
        vars: parsed.vars,
        secrets,
        confirmations,
        steps,
        after,
    })
}

fn parse_session(raw: SessionToml) -> Result<SessionSettings> {
    let shell = raw.shell.unwrap_or_else(|| DEFAULT_SHELL.to_string());
    if shell.trim().is_empty() {
        bail!("[session] shell must not be empty");
    }
    let default_timeout = match raw.default_timeout_secs {
        Some(0) => bail!("[session] default_timeout_secs must be greater than zero"),
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_TIMEOUT,
    };
    let size = match (raw.rows, raw.cols) {
        (Some(rows), Some(cols)) if rows > 0 && cols > 0 => Some(TerminalSize::new(rows, cols)),
        (None, None) => None,
        _ => bail!("[session] rows and cols must be given together and be non-zero"),
    };
    let log = match raw.log {
        Some(log) if log.trim().is_empty() => bail!("[session] log must not be empty"),
        Some(log) => Some(PathBuf::from(log)),
        None => None,
    };

    Ok(SessionSettings {
        shell,
        default_timeout,
        log,
        echo: raw.echo.unwrap_or(true),
        size,
    })
}

fn parse_confirmation(raw: ConfirmToml) -> Result<Confirmation> {
    let default = match raw.default.as_deref().map(|d| d.trim().to_ascii_lowercase()) {
        None => Answer::Yes,
        Some(d) if d == "yes" || d == "y" => Answer::Yes,
        Some(d) if d == "no" || d == "n" => Answer::No,
        Some(other) => bail!("unsupported default '{}' (expected 'yes' or 'no')", other),
    };
    Ok(Confirmation {
        message: raw.message,
        default,
        show: raw.show,
    })
}

fn parse_step(raw: StepToml) -> Result<Step> {
    let actions = [
        raw.run.is_some(),
        raw.send.is_some(),
        raw.wait.is_some(),
        raw.enter.is_some(),
        raw.leave.is_some(),
        raw.host.is_some(),
        raw.sleep_ms.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if actions != 1 {
        bail!(
            "expected exactly one of run, send, wait, enter, leave, host, sleep_ms; found {}",
            actions
        );
    }

    let timeout = raw.timeout_secs.map(Duration::from_secs);
    if raw.expect.is_some() && raw.run.is_none() {
        bail!("'expect' is only valid with 'run'");
    }
    if timeout.is_some() && raw.run.is_none() && raw.wait.is_none() {
        bail!("'timeout_secs' is only valid with 'run' or 'wait'");
    }
    if matches!(raw.expect.as_deref(), Some("")) {
        bail!("'expect' must not be empty");
    }

    if let Some(command) = raw.run {
        return Ok(Step::Run {
            command,
            expect: raw.expect,
            timeout,
        });
    }
    if let Some(text) = raw.send {
        return Ok(Step::Send(text));
    }
    if let Some(pattern) = raw.wait {
        if pattern.is_empty() {
            bail!("'wait' must not be empty");
        }
        return Ok(Step::Wait { pattern, timeout });
    }
    if let Some(command) = raw.enter {
        return Ok(Step::Enter(command));
    }
    if let Some(leave) = raw.leave {
        if !leave {
            bail!("'leave' must be true when present");
        }
        return Ok(Step::Leave);
    }
    if let Some(command) = raw.host {
        return Ok(Step::Host(command));
    }
    let ms = raw
        .sleep_ms
        .ok_or_else(|| anyhow!("step has no action"))?;
    Ok(Step::Sleep(Duration::from_millis(ms)))
}

fn step_templates(step: &Step) -> Vec<&str> {
    match step {
        Step::Run {
            command, expect, ..
        } => {
            let mut texts = vec![command.as_str()];
            texts.extend(expect.as_deref());
            texts
        }
        Step::Send(text) | Step::Enter(text) | Step::Host(text) => vec![text.as_str()],
        Step::Wait { pattern, .. } => vec![pattern.as_str()],
        Step::Leave | Step::Sleep(_) => Vec::new(),
    }
}

/// Names referenced as `{{name}}` in `template`, in order.
pub fn template_refs(template: &str) -> Result<Vec<&str>> {
    let mut refs = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let after_open = &rest[open + 2..];
        let close = after_open
            .find("}}")
            .ok_or_else(|| anyhow!("unterminated '{{{{' in '{}'", template))?;
        refs.push(after_open[..close].trim());
        rest = &after_open[close + 2..];
    }
    Ok(refs)
}

fn check_refs(template: &str, known: &BTreeSet<String>) -> Result<()> {
    for name in template_refs(template)? {
        if !known.contains(name) {
            bail!("unknown variable '{{{{{}}}}}'", name);
        }
    }
    Ok(())
}

/// Replace every `{{name}}` in `template` with its value.
pub fn expand(template: &str, vars: &BTreeMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let close = after_open
            .find("}}")
            .ok_or_else(|| anyhow!("unterminated '{{{{' in '{}'", template))?;
        let name = after_open[..close].trim();
        let value = vars
            .get(name)
            .ok_or_else(|| anyhow!("unknown variable '{{{{{}}}}}'", name))?;
        out.push_str(value);
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}
