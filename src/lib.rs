//! termbridge - terminal I/O bridge for remote shells
//!
//! Connects a shell channel (an SSH shell, a local process, anything with a
//! duplex byte stream) to a terminal emulator surface, and turns ANSI SGR
//! output into styled text runs.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use termbridge::config::Config;
//! use termbridge::core::term::StyledTranscript;
//! use termbridge::core::{NullClient, ProcessChannel, PtySize, TerminalSession};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load();
//! let channel = Arc::new(ProcessChannel::shell("ls --color=always")?);
//! let transcript = StyledTranscript::new(config.theme(), config.session.transcript_rows);
//!
//! let (session, dispatcher) =
//!     TerminalSession::new(channel, transcript, Arc::new(NullClient), config.session)?;
//! session.start(PtySize::new(80, 24))?;
//!
//! let transcript = dispatcher.run();
//! println!("{}", transcript.text());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
