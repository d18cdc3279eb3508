//! Pseudo-terminal backend using portable-pty.

use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use std::io::{self, Read, Write};
use tracing::debug;

use super::{SessionError, SessionResult, ShellChild};

/// Rows and columns of a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl TerminalSize {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Size of the terminal the driver runs in, if there is one.
    pub fn of_terminal() -> Option<Self> {
        let (cols, rows) = crossterm::terminal::size().ok()?;
        Self::from_cols_rows(cols, rows)
    }

    /// Some terminals report 0x0 when they have no real size.
    fn from_cols_rows(cols: u16, rows: u16) -> Option<Self> {
        if rows == 0 || cols == 0 {
            return None;
        }
        Some(Self { rows, cols })
    }

    fn as_pty_size(self) -> PtySize {
        PtySize {
            rows: self.rows,
            cols: self.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

/// Child shell plus the master side of its terminal.
pub(crate) struct PtyChild {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
}

impl ShellChild for PtyChild {
    fn wait(&mut self) -> io::Result<u32> {
        Ok(self.child.wait()?.exit_code())
    }

    fn resize(&mut self, size: TerminalSize) -> io::Result<()> {
        self.master
            .resize(size.as_pty_size())
            .map_err(|e| io::Error::other(e.to_string()))
    }
}

pub(crate) struct PtyParts {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub child: PtyChild,
}

/// Spawn `shell` (split on whitespace) attached to a new pseudo-terminal.
pub(crate) fn spawn(shell: &str, size: TerminalSize) -> SessionResult<PtyParts> {
    let parts: Vec<&str> = shell.split_whitespace().collect();
    let Some((program, args)) = parts.split_first() else {
        return Err(SessionError::Spawn("empty shell command".into()));
    };

    let pair = native_pty_system()
        .openpty(size.as_pty_size())
        .map_err(|e| SessionError::Spawn(format!("opening pseudo-terminal: {e}")))?;

    let mut cmd = CommandBuilder::new(program);
    cmd.args(args);
    if let Ok(cwd) = std::env::current_dir() {
        cmd.cwd(cwd);
    }

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| SessionError::Spawn(format!("spawning '{shell}': {e}")))?;
    // The slave must close in this process so the master sees EOF when the
    // shell exits.
    drop(pair.slave);

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| SessionError::Spawn(format!("cloning terminal reader: {e}")))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| SessionError::Spawn(format!("taking terminal writer: {e}")))?;

    debug!(shell, rows = size.rows, cols = size.cols, "spawned shell");

    Ok(PtyParts {
        reader,
        writer,
        child: PtyChild {
            master: pair.master,
            child,
        },
    })
}
