use std::time::Duration;
use thiserror::Error;

/// Ways a shell session can fail. All of them end the install.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to start shell: {0}")]
    Spawn(String),

    #[error("unexpected output or timeout: none of {patterns:?} appeared within {timeout:?}")]
    Timeout {
        patterns: Vec<String>,
        timeout: Duration,
    },

    #[error("shell exited before any of {patterns:?} appeared")]
    UnexpectedExit { patterns: Vec<String> },

    #[error("shell still running {0:?} after end-of-input")]
    ExitTimeout(Duration),

    #[error("no prompt established for this session")]
    NoPrompt,

    #[error("no nested shell to leave")]
    NoSubshell,

    #[error("cannot wait for an empty pattern")]
    EmptyPattern,

    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
