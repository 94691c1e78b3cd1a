//! Shell channel contract
//!
//! A [`ShellChannel`] is the remote end of a terminal session: an SSH shell
//! channel, a local child process, or anything else that offers a duplex
//! byte stream plus a liveness check. [`ProcessChannel`] adapts a local
//! child process with piped stdio.

use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to open channel streams: {0}")]
    Streams(#[source] io::Error),

    #[error("Channel streams were already taken")]
    StreamsTaken,

    #[error("Failed to resize pty: {0}")]
    Resize(#[source] io::Error),

    #[error("Failed to spawn process: {0}")]
    Spawn(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Terminal dimensions in cells and pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PtySize {
    pub cols: u16,
    pub rows: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl PtySize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            cols,
            rows,
            pixel_width: 0,
            pixel_height: 0,
        }
    }

    pub fn with_pixels(mut self, pixel_width: u16, pixel_height: u16) -> Self {
        self.pixel_width = pixel_width;
        self.pixel_height = pixel_height;
        self
    }
}

/// Read and write halves of a channel
pub struct ChannelStreams {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
}

/// The remote side of a terminal session
///
/// `disconnect()` must unblock a reader parked in `read()` on the stream
/// returned by `open_streams()`, typically by making it report EOF.
pub trait ShellChannel: Send + Sync {
    /// Hand out the duplex stream. Called once, while the session initializes.
    fn open_streams(&self) -> Result<ChannelStreams>;

    /// `false` only once no more output can arrive. A remote side that has
    /// exited but still has unread output is connected.
    fn is_connected(&self) -> bool;

    /// Exit status reported by the remote side, once known
    fn exit_status(&self) -> Option<i32>;

    fn set_pty_size(&self, size: PtySize) -> Result<()>;

    /// Tear the channel down. Must be idempotent.
    fn disconnect(&self);
}

/// A local child process driven through pipes
///
/// Pipes carry no window size, so `set_pty_size` only records the size.
/// The child counts as connected until it has exited and its stdout has
/// been read to EOF.
pub struct ProcessChannel {
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<ChildStdout>>,
    stdout_drained: Arc<AtomicBool>,
    disconnected: AtomicBool,
    exit_status: Mutex<Option<i32>>,
    size: Mutex<PtySize>,
}

/// Read half that flags EOF or a dead pipe
struct DrainTracker<R> {
    inner: R,
    drained: Arc<AtomicBool>,
}

impl<R: Read> Read for DrainTracker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.drained.store(true, Ordering::SeqCst);
                Ok(0)
            }
            Err(e) if e.kind() != io::ErrorKind::Interrupted => {
                self.drained.store(true, Ordering::SeqCst);
                Err(e)
            }
            other => other,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProcessChannel {
    /// Spawn `command` with piped stdin and stdout
    pub fn spawn(command: &mut Command) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(ChannelError::Spawn)?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        tracing::debug!("Spawned process {}", child.id());

        Ok(Self {
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(stdout),
            stdout_drained: Arc::new(AtomicBool::new(false)),
            disconnected: AtomicBool::new(false),
            exit_status: Mutex::new(None),
            size: Mutex::new(PtySize::default()),
        })
    }

    /// Run a command line through the platform shell, with stderr merged
    /// into stdout
    pub fn shell(command_line: &str) -> Result<Self> {
        let merged = format!("{} 2>&1", command_line);

        #[cfg(windows)]
        let mut command = {
            let mut command = Command::new("cmd.exe");
            command.arg("/C").arg(merged);
            command
        };

        #[cfg(not(windows))]
        let mut command = {
            let mut command = Command::new("sh");
            command.arg("-c").arg(merged);
            command
        };

        Self::spawn(&mut command)
    }

    /// Last size passed to `set_pty_size`
    pub fn size(&self) -> PtySize {
        *lock(&self.size)
    }

    fn poll_exit(&self) -> Option<i32> {
        let mut exit_status = lock(&self.exit_status);
        if exit_status.is_none() {
            if let Ok(Some(status)) = lock(&self.child).try_wait() {
                *exit_status = Some(status.code().unwrap_or(-1));
            }
        }
        *exit_status
    }
}

impl ShellChannel for ProcessChannel {
    fn open_streams(&self) -> Result<ChannelStreams> {
        let stdin = lock(&self.stdin).take();
        let stdout = lock(&self.stdout).take();

        match (stdout, stdin) {
            (Some(stdout), Some(stdin)) => Ok(ChannelStreams {
                reader: Box::new(DrainTracker {
                    inner: stdout,
                    drained: self.stdout_drained.clone(),
                }),
                writer: Box::new(stdin),
            }),
            _ => Err(ChannelError::StreamsTaken),
        }
    }

    fn is_connected(&self) -> bool {
        if self.disconnected.load(Ordering::SeqCst) {
            return false;
        }
        self.poll_exit().is_none() || !self.stdout_drained.load(Ordering::SeqCst)
    }

    fn exit_status(&self) -> Option<i32> {
        self.poll_exit()
    }

    fn set_pty_size(&self, size: PtySize) -> Result<()> {
        *lock(&self.size) = size;
        Ok(())
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        if self.poll_exit().is_some() {
            return;
        }

        // Lock order is exit_status -> child, so release the child first
        let waited = {
            let mut child = lock(&self.child);
            if let Err(e) = child.kill() {
                tracing::debug!("Kill failed: {}", e);
            }
            child.wait()
        };
        match waited {
            Ok(status) => *lock(&self.exit_status) = Some(status.code().unwrap_or(-1)),
            Err(e) => tracing::debug!("Wait failed: {}", e),
        }
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_process_channel_round_trip() {
        let channel = ProcessChannel::shell("cat").unwrap();
        let mut streams = channel.open_streams().unwrap();
        assert!(matches!(
            channel.open_streams(),
            Err(ChannelError::StreamsTaken)
        ));

        streams.writer.write_all(b"ping\n").unwrap();
        drop(streams.writer);

        let mut output = String::new();
        streams.reader.read_to_string(&mut output).unwrap();
        assert_eq!(output, "ping\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_process_channel_exit_status() {
        let channel = ProcessChannel::shell("exit 3").unwrap();
        let mut streams = channel.open_streams().unwrap();

        let mut sink = Vec::new();
        streams.reader.read_to_end(&mut sink).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while channel.is_connected() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(channel.exit_status(), Some(3));
    }

    #[test]
    #[cfg(unix)]
    fn test_exited_process_stays_connected_until_drained() {
        let channel = ProcessChannel::shell("printf 'left in the pipe'").unwrap();
        let mut streams = channel.open_streams().unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while channel.exit_status().is_none() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(channel.exit_status(), Some(0));
        assert!(channel.is_connected());

        let mut output = String::new();
        streams.reader.read_to_string(&mut output).unwrap();
        assert_eq!(output, "left in the pipe");
        assert!(!channel.is_connected());
    }

    #[test]
    #[cfg(unix)]
    fn test_disconnect_kills_process() {
        let channel = ProcessChannel::shell("sleep 30").unwrap();
        assert!(channel.is_connected());

        channel.disconnect();
        channel.disconnect();
        assert!(!channel.is_connected());
        assert_eq!(channel.exit_status(), Some(-1));
    }

    #[test]
    #[cfg(unix)]
    fn test_resize_is_recorded() {
        let channel = ProcessChannel::shell("true").unwrap();
        let size = PtySize::new(120, 40).with_pixels(960, 640);
        channel.set_pty_size(size).unwrap();
        assert_eq!(channel.size(), size);
    }
}
