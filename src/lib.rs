//! Expect-driven shell sequencing for unattended OS installs.
//!
//! An install is a long list of privileged commands (partitioning, mkfs,
//! pacstrap, bootloader setup) typed into an interactive shell. This crate
//! provides the pieces such a run is built from:
//!
//! - **Session** - a shell on a pseudo-terminal, driven one command at a time,
//!   each command confirmed by a literal pattern in its output
//! - **Transcript** - recording the run with `script(1)` and reducing the raw
//!   capture to the text an operator actually saw
//! - **Plan** - a TOML install plan with variables, secrets, confirmations and
//!   steps, executed fail-fast against a session
//! - **Preflight checks** - host tool validation before anything runs
//!
//! # Architecture
//!
//! ```text
//! install-driver run plan.toml
//!     │
//!     ├── preflight: shell + script present?
//!     ├── recording: re-exec under `script`, then normalize the log
//!     │
//!     └── plan::run_plan (inside the recording)
//!           ├── secrets, confirmations   (before any shell exists)
//!           ├── Session::start + establish_prompt
//!           ├── steps                    (first failure ends the run)
//!           └── Session::terminate
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use install_driver::session::{Invocation, Session, TerminalSize};
//!
//! let mut shell = Session::start("bash", TerminalSize::default())?;
//! shell.establish_prompt()?;
//! shell.execute(&Invocation::new("fdisk /dev/sda").expect("Command (m for help)"))?;
//! shell.execute(&Invocation::new("w"))?;
//! shell.terminate()?;
//! ```

pub mod confirm;
pub mod host;
pub mod plan;
pub mod preflight;
pub mod session;
pub mod transcript;

pub use plan::{load_plan, Plan, Step};
pub use session::{Invocation, Match, Session, SessionError, TerminalSize};
pub use transcript::normalize;
