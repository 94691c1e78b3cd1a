//! Core terminal bridge components.
//!
//! - **queue**: bounded byte queue shared by one producer and one consumer
//! - **channel**: the remote shell contract and a local process adapter
//! - **session**: pump threads, lifecycle and the dispatcher
//! - **term**: ANSI SGR parsing and the styled transcript
//!
//! # Architecture
//!
//! ```text
//! TerminalSession
//! ├── ShellChannel (duplex byte stream to the shell)
//! ├── ByteQueue x2 (inbound / outbound)
//! ├── reader / writer / monitor threads
//! └── Dispatcher
//!     └── Emulator (e.g. StyledTranscript -> AnsiParser)
//! ```

pub mod channel;
pub mod queue;
pub mod session;
pub mod term;

pub use channel::{ChannelError, ChannelStreams, ProcessChannel, PtySize, ShellChannel};
pub use queue::ByteQueue;
pub use session::{
    Dispatcher, Emulator, NullClient, SessionClient, SessionError, SessionState, TerminalSession,
};
