//! In-memory stand-in for a shell on a terminal, for tests.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Session, ShellChild};

/// Prompt the fake shell shows for the default user after the PS1 rewrite.
pub(crate) const MOCK_PROMPT: &str = "\x1b[1;31mmock$ ";

/// What the fake shell prints in response to one input line.
pub(crate) enum Reply {
    Text(String),
    /// Print the text, then close the terminal.
    Hangup(String),
}

/// A tiny bash impersonation: echoes input, honours the PS1 rewrite, nests
/// on `su`, and knows a handful of commands the tests use.
pub(crate) fn fake_bash() -> impl FnMut(&str) -> Reply + Send + 'static {
    let mut users = vec!["mock".to_string()];
    let mut marked = false;
    let mut in_heredoc = false;

    move |line: &str| {
        let echo = format!("{line}\r\n");
        let user = users.last().cloned().unwrap_or_default();
        let prompt = |user: &str, marked: bool| {
            if marked {
                format!("\x1b[1;31m{user}$ \x1b[0m")
            } else {
                format!("{user}$ ")
            }
        };

        if in_heredoc {
            if line == "EOF" {
                in_heredoc = false;
                return Reply::Text(format!("{echo}{}", prompt(&user, marked)));
            }
            return Reply::Text(format!("{echo}> "));
        }

        if line.starts_with("export PS1=") {
            marked = true;
            return Reply::Text(format!("{echo}{}", prompt(&user, true)));
        }
        if line.contains("<<EOF") {
            in_heredoc = true;
            return Reply::Text(format!("{echo}> "));
        }
        if let Some(name) = line.strip_prefix("su ") {
            users.push(name.trim().to_string());
            marked = false;
            return Reply::Text(format!("{echo}{}", prompt(name.trim(), false)));
        }
        if line == "exit" {
            if users.len() > 1 {
                users.pop();
                let outer = users.last().cloned().unwrap_or_default();
                return Reply::Text(format!("{echo}exit\r\n{}", prompt(&outer, true)));
            }
            return Reply::Hangup(format!("{echo}exit\r\n"));
        }
        if line == "crash" {
            return Reply::Hangup(echo);
        }
        if line.starts_with("sleep ") {
            return Reply::Text(echo);
        }
        if line.starts_with("fdisk ") {
            return Reply::Text(format!(
                "{echo}\r\nWelcome to fdisk (util-linux 2.39).\r\n\r\nCommand (m for help): "
            ));
        }

        let output = if let Some(text) = line.strip_prefix("echo ") {
            format!("{text}\r\n")
        } else if line == "whoami" {
            format!("{user}\r\n")
        } else {
            String::new()
        };
        Reply::Text(format!("{echo}{output}{}", prompt(&user, marked)))
    }
}

/// A session whose shell answers each line through `respond`.
///
/// Returns the session and everything written to it.
pub(crate) fn scripted_session<F>(greeting: &str, respond: F) -> (Session, Arc<Mutex<Vec<u8>>>)
where
    F: FnMut(&str) -> Reply + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    tx.send(greeting.as_bytes().to_vec()).unwrap();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let writer = LineWriter {
        sent: Arc::clone(&sent),
        pending: Vec::new(),
        output: Some(tx),
        respond,
    };
    let session = Session::from_parts(
        Box::new(ChannelReader::new(rx)),
        Box::new(writer),
        Box::new(ScriptedChild { code: 0 }),
        None,
    )
    .with_default_timeout(Duration::from_secs(5));
    (session, sent)
}

/// A session that only ever prints what the test sends it. Dropping the
/// sender closes the terminal.
pub(crate) fn silent_session() -> (Session, Sender<Vec<u8>>) {
    let (tx, rx) = mpsc::channel();
    let session = Session::from_parts(
        Box::new(ChannelReader::new(rx)),
        Box::new(io::sink()),
        Box::new(ScriptedChild { code: 0 }),
        None,
    )
    .with_default_timeout(Duration::from_secs(5));
    (session, tx)
}

struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl ChannelReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            chunk: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.pos >= self.chunk.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

struct LineWriter<F> {
    sent: Arc<Mutex<Vec<u8>>>,
    pending: Vec<u8>,
    output: Option<Sender<Vec<u8>>>,
    respond: F,
}

impl<F> Write for LineWriter<F>
where
    F: FnMut(&str) -> Reply + Send,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            self.sent.lock().unwrap().push(byte);
            match byte {
                0x04 => {
                    if let Some(tx) = self.output.take() {
                        let _ = tx.send(b"exit\r\n".to_vec());
                    }
                }
                b'\n' => {
                    let line = String::from_utf8_lossy(&self.pending).into_owned();
                    self.pending.clear();
                    let Some(tx) = self.output.as_ref() else {
                        continue;
                    };
                    match (self.respond)(&line) {
                        Reply::Text(text) => {
                            let _ = tx.send(text.into_bytes());
                        }
                        Reply::Hangup(text) => {
                            let _ = tx.send(text.into_bytes());
                            self.output = None;
                        }
                    }
                }
                _ => self.pending.push(byte),
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct ScriptedChild {
    code: u32,
}

impl ShellChild for ScriptedChild {
    fn wait(&mut self) -> io::Result<u32> {
        Ok(self.code)
    }
}
