//! Expect-style control of an interactive shell.
//!
//! A [`Session`] owns one child shell on a pseudo-terminal. Commands go in one
//! at a time; after each one the session blocks until a literal pattern shows
//! up in the shell's output, the shell exits, or the timeout runs out.
//!
//! ```rust,ignore
//! use install_driver::session::{Invocation, Session, TerminalSize};
//! use std::time::Duration;
//!
//! let mut shell = Session::start("bash", TerminalSize::default())?;
//! shell.establish_prompt()?;
//! shell.run("timedatectl set-ntp true")?;
//! shell.execute(&Invocation::new("fdisk /dev/sda").expect("Command"))?;
//! shell.execute(&Invocation::new("w").timeout(Duration::from_secs(60)))?;
//! shell.terminate()?;
//! ```
//!
//! Output is matched raw, escape codes and all, against everything received
//! since the previous match. Newlines have no special meaning.
//!
//! Every `Err` is meant to be fatal. Nothing here retries or tries to bring
//! the shell back to a known state.

mod error;
mod invocation;
mod matcher;
#[cfg(test)]
pub(crate) mod mock;
mod pty;

pub use error::{SessionError, SessionResult};
pub use invocation::Invocation;
pub use pty::TerminalSize;

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Default time to wait for a pattern.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps the shell's existing prompt in bold red so it cannot be mistaken for
/// command output or the echo of a command line.
const PS1_COMMAND: &str = r#"export PS1="\[\e[1;31m\]$PS1\[\e[0m\]""#;

/// Terminal end-of-file character (Ctrl-D).
const EOF_CHAR: u8 = 0x04;

/// The process behind a session.
pub trait ShellChild: Send {
    /// Block until the process exits and return its exit code.
    fn wait(&mut self) -> io::Result<u32>;

    fn resize(&mut self, _size: TerminalSize) -> io::Result<()> {
        Ok(())
    }
}

/// A successful wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Which of the awaited patterns matched.
    pub pattern_index: usize,
    /// Output received before the match.
    pub before: String,
    /// The matched text.
    pub matched: String,
}

/// Builder for a pty-backed [`Session`].
pub struct SessionBuilder {
    shell: String,
    size: TerminalSize,
    echo: bool,
    default_timeout: Duration,
}

impl SessionBuilder {
    pub fn new(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
            size: TerminalSize::default(),
            echo: true,
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn size(mut self, size: TerminalSize) -> Self {
        self.size = size;
        self
    }

    /// Stream shell output to stdout as it arrives (on by default).
    pub fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn start(self) -> SessionResult<Session> {
        let parts = pty::spawn(&self.shell, self.size)?;
        let echo: Option<Box<dyn Write + Send>> = if self.echo {
            Some(Box::new(io::stdout()))
        } else {
            None
        };
        info!(shell = %self.shell, "shell session started");
        Ok(
            Session::from_parts(parts.reader, parts.writer, Box::new(parts.child), echo)
                .with_default_timeout(self.default_timeout),
        )
    }
}

/// A live interactive shell and its matching state.
pub struct Session {
    writer: Box<dyn Write + Send>,
    output: Receiver<Vec<u8>>,
    child: Box<dyn ShellChild>,
    buffer: Vec<u8>,
    prompt: Option<String>,
    saved_prompts: Vec<String>,
    default_timeout: Duration,
    eof: bool,
    last_match: Option<Match>,
}

impl Session {
    /// Spawn `shell` on a pseudo-terminal of the given size, echoing its
    /// output to stdout.
    pub fn start(shell: &str, size: TerminalSize) -> SessionResult<Self> {
        SessionBuilder::new(shell).size(size).start()
    }

    /// Assemble a session from an already running process.
    ///
    /// `reader` is drained on a background thread; every chunk is copied to
    /// `echo` (if any) as soon as it arrives.
    pub fn from_parts(
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
        child: Box<dyn ShellChild>,
        echo: Option<Box<dyn Write + Send>>,
    ) -> Self {
        Self {
            writer,
            output: spawn_reader(reader, echo),
            child,
            buffer: Vec::new(),
            prompt: None,
            saved_prompts: Vec::new(),
            default_timeout: DEFAULT_TIMEOUT,
            eof: false,
            last_match: None,
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// The prompt commands wait for, once established.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// Output received since the last successful match.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn last_match(&self) -> Option<&Match> {
        self.last_match.as_ref()
    }

    /// Replace the shell prompt with a marked one and return it.
    ///
    /// Waits for the shell's first `#` or `$`, sends the PS1 rewrite, skips the
    /// `$` in the echoed `$PS1`, then waits for the new prompt's `# ` or `$ `.
    /// The prompt is the last visible line of output (after the final `\n` or
    /// `\r`) up to and including that match.
    pub fn establish_prompt(&mut self) -> SessionResult<String> {
        let timeout = self.default_timeout;
        self.expect_any(&["#", "$"], timeout)?;
        self.send_line(PS1_COMMAND)?;
        self.expect_any(&["$"], timeout)?;
        let found = self.expect_any(&["# ", "$ "], timeout)?;

        let text = format!("{}{}", found.before, found.matched);
        let prompt = text
            .rsplit(|c: char| c == '\n' || c == '\r')
            .next()
            .unwrap_or(&text)
            .to_string();
        info!(prompt = ?prompt, "prompt established");
        self.prompt = Some(prompt.clone());
        Ok(prompt)
    }

    /// Send a command and wait for its expected pattern.
    pub fn execute(&mut self, invocation: &Invocation) -> SessionResult<Match> {
        let pattern = match invocation.expected() {
            Some(pattern) => pattern.to_string(),
            None => self.prompt.clone().ok_or(SessionError::NoPrompt)?,
        };
        let timeout = invocation
            .timeout_override()
            .unwrap_or(self.default_timeout);

        debug!(command = invocation.command(), expect = ?pattern, "execute");
        self.send_line(invocation.command())?;
        self.expect_any(&[pattern.as_str()], timeout)
    }

    /// Send a command and wait for the prompt.
    pub fn run(&mut self, command: &str) -> SessionResult<Match> {
        self.execute(&Invocation::new(command))
    }

    /// Wait for a single literal pattern.
    pub fn expect(&mut self, pattern: &str, timeout: Duration) -> SessionResult<Match> {
        self.expect_any(&[pattern], timeout)
    }

    /// Wait until any of `patterns` appears in the output.
    ///
    /// The earliest occurrence wins; ties go to the pattern listed first.
    /// Consumes the output up to the end of the match.
    pub fn expect_any(&mut self, patterns: &[&str], timeout: Duration) -> SessionResult<Match> {
        if patterns.is_empty() || patterns.iter().any(|p| p.is_empty()) {
            return Err(SessionError::EmptyPattern);
        }

        let deadline = Instant::now() + timeout;
        let mut scan_from = 0;

        loop {
            if let Some(found) = matcher::find_earliest(&self.buffer, scan_from, patterns) {
                return Ok(self.consume(found));
            }
            scan_from = matcher::resume_offset(self.buffer.len(), patterns);

            if self.eof {
                warn!(?patterns, "shell output ended before match");
                return Err(SessionError::UnexpectedExit {
                    patterns: owned(patterns),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(?patterns, ?timeout, "timed out waiting for output");
                return Err(SessionError::Timeout {
                    patterns: owned(patterns),
                    timeout,
                });
            }

            match self.output.recv_timeout(deadline - now) {
                Ok(chunk) => {
                    trace!(bytes = chunk.len(), "received output");
                    self.buffer.extend_from_slice(&chunk);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("shell output reached end of stream");
                    self.eof = true;
                }
            }
        }
    }

    /// Write bytes without waiting for anything.
    pub fn send_raw(&mut self, bytes: &[u8]) -> SessionResult<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write `text` followed by a newline, without waiting.
    pub fn send_line(&mut self, text: &str) -> SessionResult<()> {
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');
        self.send_raw(&line)
    }

    /// Send the terminal's end-of-file character.
    pub fn send_eof(&mut self) -> SessionResult<()> {
        self.send_raw(&[EOF_CHAR])
    }

    /// Start a nested shell (`su user`, `arch-chroot /mnt`, ...) and switch to
    /// its prompt. The current prompt comes back with [`Session::leave_subshell`].
    pub fn enter_subshell(&mut self, command: &str) -> SessionResult<String> {
        let previous = self.prompt.clone().ok_or(SessionError::NoPrompt)?;
        debug!(command, "entering nested shell");
        self.send_line(command)?;
        let prompt = self.establish_prompt()?;
        self.saved_prompts.push(previous);
        Ok(prompt)
    }

    /// Exit the innermost nested shell and wait for the outer prompt.
    pub fn leave_subshell(&mut self) -> SessionResult<Match> {
        let previous = self.saved_prompts.pop().ok_or(SessionError::NoSubshell)?;
        debug!("leaving nested shell");
        self.prompt = Some(previous);
        self.run("exit")
    }

    pub fn resize(&mut self, size: TerminalSize) -> SessionResult<()> {
        self.child.resize(size)?;
        Ok(())
    }

    /// Send end-of-input, wait for the shell to close its output and reap it.
    ///
    /// Returns the shell's exit code.
    pub fn terminate(mut self) -> SessionResult<u32> {
        if !self.eof {
            self.send_eof()?;
        }

        let deadline = Instant::now() + self.default_timeout;
        while !self.eof {
            let now = Instant::now();
            if now >= deadline {
                return Err(SessionError::ExitTimeout(self.default_timeout));
            }
            match self.output.recv_timeout(deadline - now) {
                Ok(chunk) => self.buffer.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => self.eof = true,
            }
        }

        let code = self.child.wait()?;
        info!(code, "shell exited");
        Ok(code)
    }

    fn consume(&mut self, found: matcher::Found) -> Match {
        let m = Match {
            pattern_index: found.index,
            before: String::from_utf8_lossy(&self.buffer[..found.start]).into_owned(),
            matched: String::from_utf8_lossy(&self.buffer[found.start..found.end]).into_owned(),
        };
        self.buffer.drain(..found.end);
        self.last_match = Some(m.clone());
        m
    }
}

fn owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

fn spawn_reader(
    mut reader: Box<dyn Read + Send>,
    mut echo: Option<Box<dyn Write + Send>>,
) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if let Some(out) = echo.as_mut() {
                        let _ = out.write_all(&buf[..n]);
                        let _ = out.flush();
                    }
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                // Linux reports EIO on the master once the shell side closes.
                Err(e) => {
                    debug!("terminal read ended: {e}");
                    break;
                }
            }
        }
    });
    rx
}
