//! Terminal session
//!
//! Bridges a [`ShellChannel`] and an [`Emulator`]. Each running session has
//! three pump threads:
//!
//! - **reader**: channel -> inbound queue, posting `NewInput`
//! - **writer**: outbound queue -> channel
//! - **monitor**: polls channel liveness as a fallback for half-open channels
//!
//! The emulator is never touched by the pumps. It is owned by the
//! [`Dispatcher`], a single consumer that drains the inbound queue and
//! delivers notifications, so every emulator mutation happens on one thread.
//!
//! ```text
//! channel ──reader──> ByteQueue(in) ──Dispatcher──> Emulator / SessionClient
//! write() ──> ByteQueue(out) ──writer──> channel
//! ```

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::channel::{ChannelError, ChannelStreams, PtySize, ShellChannel};
use super::queue::{ByteQueue, QueueError};
use crate::config::SessionConfig;

/// Reported when the channel never delivered an exit status
pub const UNKNOWN_EXIT_STATUS: i32 = -1;

/// How long dropping a session waits for a reader still parked in `read()`
const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session cannot start from state {0:?}")]
    InvalidState(SessionState),

    #[error("Session is not running")]
    NotRunning,

    #[error("Invalid code point: {0:#x}")]
    InvalidCodePoint(u32),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;

pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Running,
    Finishing,
    Closed,
}

/// Screen model fed by the dispatcher
pub trait Emulator: Send {
    fn append(&mut self, data: &[u8]);

    fn resize(&mut self, _size: PtySize) {}

    fn reset(&mut self) {}
}

/// Receives session notifications on the dispatcher thread
pub trait SessionClient: Send + Sync {
    fn on_screen_changed(&self);

    fn on_session_finished(&self, exit_status: i32);
}

/// Client that ignores every notification
#[derive(Debug, Default)]
pub struct NullClient;

impl SessionClient for NullClient {
    fn on_screen_changed(&self) {}

    fn on_session_finished(&self, _exit_status: i32) {}
}

/// Work for the dispatcher
#[derive(Debug)]
enum DispatchMessage {
    NewInput,
    Resize(PtySize),
    Reset,
    Notice(String),
    SessionFinished(i32),
}

struct Lifecycle {
    state: SessionState,
    exit_status: i32,
}

/// State shared by the session handle, its pumps and its dispatcher
struct Shared {
    id: SessionId,
    channel: Arc<dyn ShellChannel>,
    inbound: ByteQueue,
    outbound: ByteQueue,
    lifecycle: Mutex<Lifecycle>,
    state_changed: Condvar,
    events: Mutex<Sender<DispatchMessage>>,
    client: Mutex<Arc<dyn SessionClient>>,
    config: SessionConfig,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Shared {
    fn state(&self) -> SessionState {
        lock(&self.lifecycle).state
    }

    fn is_finishing(&self) -> bool {
        matches!(self.state(), SessionState::Finishing | SessionState::Closed)
    }

    fn post(&self, message: DispatchMessage) {
        // The dispatcher may already be gone; nothing left to notify then
        let _ = lock(&self.events).send(message);
    }

    fn client(&self) -> Arc<dyn SessionClient> {
        lock(&self.client).clone()
    }

    /// Move `Initializing` to `Running` unless a finish got there first
    fn mark_running(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.state == SessionState::Initializing {
            lifecycle.state = SessionState::Running;
            self.state_changed.notify_all();
        }
    }

    /// Sleep up to `timeout`, waking early once the session is finishing
    fn wait_finishing(&self, timeout: Duration) -> bool {
        let lifecycle = lock(&self.lifecycle);
        let (lifecycle, _) = self
            .state_changed
            .wait_timeout_while(lifecycle, timeout, |lc| {
                !matches!(lc.state, SessionState::Finishing | SessionState::Closed)
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        matches!(lifecycle.state, SessionState::Finishing | SessionState::Closed)
    }

    /// Tear the session down. Only the first caller does any work.
    fn finish(&self) -> bool {
        {
            let mut lifecycle = lock(&self.lifecycle);
            match lifecycle.state {
                SessionState::Finishing | SessionState::Closed => return false,
                _ => {
                    lifecycle.state = SessionState::Finishing;
                    self.state_changed.notify_all();
                }
            }
        }

        self.outbound.close();
        self.inbound.close();
        self.channel.disconnect();

        let exit_status = self.channel.exit_status().unwrap_or(UNKNOWN_EXIT_STATUS);
        {
            let mut lifecycle = lock(&self.lifecycle);
            lifecycle.exit_status = exit_status;
            lifecycle.state = SessionState::Closed;
            self.state_changed.notify_all();
        }

        info!("Session {} finished with status {}", self.id, exit_status);
        self.post(DispatchMessage::SessionFinished(exit_status));
        true
    }
}

/// A terminal session attached to a shell channel
///
/// All methods take `&self`; the handle can be shared between a UI thread
/// sending keystrokes and whoever decides to end the session.
pub struct TerminalSession {
    shared: Arc<Shared>,
    threads: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl TerminalSession {
    /// Create an idle session and the dispatcher that will own `emulator`.
    ///
    /// Nothing runs until [`start`](Self::start) or the first
    /// [`update_size`](Self::update_size).
    pub fn new<E: Emulator>(
        channel: Arc<dyn ShellChannel>,
        emulator: E,
        client: Arc<dyn SessionClient>,
        config: SessionConfig,
    ) -> Result<(Self, Dispatcher<E>)> {
        let (tx, rx) = mpsc::channel();
        let buffer_size = config.read_buffer_size.max(1);

        let shared = Arc::new(Shared {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            channel,
            inbound: ByteQueue::new(config.queue_capacity)?,
            outbound: ByteQueue::new(config.queue_capacity)?,
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Idle,
                exit_status: 0,
            }),
            state_changed: Condvar::new(),
            events: Mutex::new(tx),
            client: Mutex::new(client),
            config,
        });

        let dispatcher = Dispatcher {
            shared: shared.clone(),
            events: rx,
            emulator,
            buffer: vec![0u8; buffer_size],
            finished: false,
        };

        let session = Self {
            shared,
            threads: Mutex::new(Vec::new()),
        };

        Ok((session, dispatcher))
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Exit status, once the session is closed
    pub fn exit_status(&self) -> Option<i32> {
        let lifecycle = lock(&self.shared.lifecycle);
        (lifecycle.state == SessionState::Closed).then_some(lifecycle.exit_status)
    }

    /// Connect the channel streams and spawn the pumps.
    ///
    /// On failure the error is shown in the emulator and the session ends.
    pub fn start(&self, size: PtySize) -> Result<()> {
        {
            let mut lifecycle = lock(&self.shared.lifecycle);
            if lifecycle.state != SessionState::Idle {
                return Err(SessionError::InvalidState(lifecycle.state));
            }
            lifecycle.state = SessionState::Initializing;
        }

        self.shared.post(DispatchMessage::Resize(size));

        match self.initialize(size) {
            Ok(()) => {
                self.shared.mark_running();
                info!(
                    "Session {} running ({}x{})",
                    self.shared.id, size.cols, size.rows
                );
                Ok(())
            }
            Err(e) => {
                warn!("Session {} failed to start: {}", self.shared.id, e);
                self.shared
                    .post(DispatchMessage::Notice(format!("\r\n[Connection error: {}]\r\n", e)));
                self.shared.finish();
                Err(e)
            }
        }
    }

    fn initialize(&self, size: PtySize) -> Result<()> {
        let ChannelStreams { reader, writer } = self.shared.channel.open_streams()?;
        self.shared.channel.set_pty_size(size)?;

        let buffer_size = self.shared.config.read_buffer_size.max(1);
        let interval = self.shared.config.monitor_interval();

        let shared = self.shared.clone();
        self.spawn("reader", move || read_pump(&shared, reader, buffer_size))?;

        let shared = self.shared.clone();
        self.spawn("writer", move || write_pump(&shared, writer, buffer_size))?;

        let shared = self.shared.clone();
        self.spawn("monitor", move || monitor_pump(&shared, interval))?;

        Ok(())
    }

    fn spawn<F>(&self, name: &'static str, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name(format!("session-{}-{}", self.shared.id, name))
            .spawn(body)
            .map_err(|source| SessionError::ThreadSpawn { name, source })?;
        lock(&self.threads).push((name, handle));
        Ok(())
    }

    /// Start the session on first use, afterwards resize the pty and the
    /// emulator
    pub fn update_size(&self, size: PtySize) -> Result<()> {
        if self.state() == SessionState::Idle {
            return self.start(size);
        }

        if let Err(e) = self.shared.channel.set_pty_size(size) {
            warn!("Session {} resize failed: {}", self.shared.id, e);
        }
        self.shared.post(DispatchMessage::Resize(size));
        Ok(())
    }

    /// Replace the notification client
    pub fn update_client(&self, client: Arc<dyn SessionClient>) {
        *lock(&self.shared.client) = client;
    }

    /// Reset the emulator
    pub fn reset(&self) {
        self.shared.post(DispatchMessage::Reset);
    }

    /// Queue input for the remote side.
    ///
    /// Blocks while the outbound queue is full; use
    /// [`try_write`](Self::try_write) on a UI thread that must not stall.
    /// Returns `false` without sending anything once the session is no
    /// longer running.
    pub fn write(&self, data: &[u8]) -> bool {
        if !self.is_running() {
            return false;
        }
        self.shared.outbound.write(data)
    }

    /// Queue input without blocking.
    ///
    /// Returns `false` and sends nothing when the session is not running or
    /// the outbound queue has no room for all of `data`.
    pub fn try_write(&self, data: &[u8]) -> bool {
        if !self.is_running() {
            return false;
        }
        self.shared.outbound.try_write(data)
    }

    /// Send one Unicode scalar value as UTF-8, optionally prefixed by ESC
    pub fn write_code_point(&self, prepend_escape: bool, code_point: u32) -> Result<()> {
        let ch = char::from_u32(code_point).ok_or(SessionError::InvalidCodePoint(code_point))?;

        let mut buffer = [0u8; 5];
        let mut len = 0;
        if prepend_escape {
            buffer[0] = 0x1B;
            len = 1;
        }
        len += ch.encode_utf8(&mut buffer[len..]).len();

        if self.write(&buffer[..len]) {
            Ok(())
        } else {
            Err(SessionError::NotRunning)
        }
    }

    /// Stop sending input. The writer flushes what is queued, then drops the
    /// channel's write half so the remote side sees EOF. Output keeps
    /// flowing until the remote side closes.
    pub fn close_input(&self) {
        self.shared.outbound.close();
    }

    /// End the session if it has not ended yet.
    ///
    /// Safe from any thread. Returns `true` only for the call that actually
    /// performed the teardown.
    pub fn finish_if_running(&self) -> bool {
        self.shared.finish()
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        self.shared.finish();

        let threads = std::mem::take(&mut *lock(&self.threads));
        for (name, handle) in threads {
            // A reader stuck in a channel that ignores disconnect is left detached
            if name == "reader" && !wait_finished(&handle, READER_JOIN_TIMEOUT) {
                debug!("Session {} reader still blocked, detaching", self.shared.id);
                continue;
            }
            let _ = handle.join();
        }
    }
}

fn wait_finished(handle: &JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}

fn read_pump(shared: &Shared, mut reader: Box<dyn Read + Send>, buffer_size: usize) {
    let mut buffer = vec![0u8; buffer_size];

    while !shared.is_finishing() {
        match reader.read(&mut buffer) {
            Ok(0) => {
                debug!("Session {} channel EOF", shared.id);
                break;
            }
            Ok(n) => {
                if !shared.inbound.write(&buffer[..n]) {
                    break;
                }
                shared.post(DispatchMessage::NewInput);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Session {} read failed: {}", shared.id, e);
                break;
            }
        }
    }

    shared.finish();
}

fn write_pump(shared: &Shared, mut writer: Box<dyn Write + Send>, buffer_size: usize) {
    let mut buffer = vec![0u8; buffer_size];

    while let Some(n) = shared.outbound.read(&mut buffer, true) {
        if let Err(e) = writer.write_all(&buffer[..n]).and_then(|()| writer.flush()) {
            debug!("Session {} write failed: {}", shared.id, e);
            shared.finish();
            break;
        }
    }
}

fn monitor_pump(shared: &Shared, interval: Duration) {
    loop {
        if !shared.channel.is_connected() {
            debug!("Session {} channel disconnected", shared.id);
            shared.finish();
            break;
        }
        if shared.wait_finishing(interval) {
            break;
        }
    }
}

/// Serialization point between the pumps and the emulator
///
/// Either hand it to a dedicated thread with [`run`](Self::run), or call
/// [`dispatch_pending`](Self::dispatch_pending) from an existing event loop.
pub struct Dispatcher<E> {
    shared: Arc<Shared>,
    events: Receiver<DispatchMessage>,
    emulator: E,
    buffer: Vec<u8>,
    finished: bool,
}

impl<E: Emulator> Dispatcher<E> {
    pub fn emulator(&self) -> &E {
        &self.emulator
    }

    pub fn emulator_mut(&mut self) -> &mut E {
        &mut self.emulator
    }

    /// True once the finished notification has been delivered
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Handle every queued message without blocking.
    ///
    /// Returns `true` if anything was processed.
    pub fn dispatch_pending(&mut self) -> bool {
        let mut processed = false;
        loop {
            match self.events.try_recv() {
                Ok(message) => {
                    self.handle(message);
                    processed = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        processed
    }

    /// Wait up to `timeout` for one message and handle it.
    ///
    /// Returns `false` if nothing arrived.
    pub fn dispatch_timeout(&mut self, timeout: Duration) -> bool {
        match self.events.recv_timeout(timeout) {
            Ok(message) => {
                self.handle(message);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Dispatch until the session has finished, then hand back the emulator
    pub fn run(mut self) -> E {
        while !self.finished {
            match self.events.recv() {
                Ok(message) => self.handle(message),
                Err(_) => break,
            }
        }
        self.emulator
    }

    fn handle(&mut self, message: DispatchMessage) {
        let client = self.shared.client();

        match message {
            DispatchMessage::NewInput => {
                if self.drain() {
                    client.on_screen_changed();
                }
            }
            DispatchMessage::Resize(size) => {
                self.emulator.resize(size);
                client.on_screen_changed();
            }
            DispatchMessage::Reset => {
                self.emulator.reset();
                client.on_screen_changed();
            }
            DispatchMessage::Notice(text) => {
                self.emulator.append(text.as_bytes());
                client.on_screen_changed();
            }
            DispatchMessage::SessionFinished(exit_status) => {
                if self.finished {
                    return;
                }
                self.finished = true;
                self.drain();
                self.emulator
                    .append(self.shared.config.exit_message.as_bytes());
                client.on_screen_changed();
                client.on_session_finished(exit_status);
            }
        }
    }

    /// Move whatever the reader has queued into the emulator
    fn drain(&mut self) -> bool {
        let mut appended = false;
        while let Some(n) = self.shared.inbound.read(&mut self.buffer, false) {
            if n == 0 {
                break;
            }
            self.emulator.append(&self.buffer[..n]);
            appended = true;
        }
        appended
    }
}
