//! Sources of native media commands.
//!
//! A [`NativeCommandSource`] owns a message pump running on its own thread.
//! Decoded commands are handed to a [`CommandHandler`] on that thread.

use crate::error::{NativeError, Result};
use overlyric_core::MediaCommand;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

const LOG_TARGET: &str = "overlyric::native::source";

/// How long `start` waits for the pump thread to report readiness.
pub(crate) const READY_TIMEOUT: Duration = Duration::from_secs(2);

/// Called on the pump thread for every decoded command. Must return quickly.
pub type CommandHandler = Arc<dyn Fn(MediaCommand) + Send + Sync>;

pub trait NativeCommandSource: Send {
    /// Register process-wide resources (the window class).
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails.
    fn register(&mut self) -> Result<()>;

    /// Create the hidden window and start the pump thread.
    ///
    /// Returns once the pump is ready to receive commands.
    ///
    /// # Errors
    ///
    /// Returns an error if the window or the thread cannot be created.
    fn start(&mut self, handler: CommandHandler) -> Result<()>;

    /// Stop the pump, join its thread within `timeout`, then release what
    /// `register` acquired. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::ShutdownTimeout`] if the thread did not stop in time.
    fn shutdown(&mut self, timeout: Duration) -> Result<()>;
}

/// Placeholder on platforms without native media-key support.
#[derive(Debug, Default)]
pub struct UnsupportedCommandSource;

impl NativeCommandSource for UnsupportedCommandSource {
    fn register(&mut self) -> Result<()> {
        Err(NativeError::Unsupported)
    }

    fn start(&mut self, _handler: CommandHandler) -> Result<()> {
        Err(NativeError::Unsupported)
    }

    fn shutdown(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

enum PumpMessage {
    Command(MediaCommand),
    Quit,
}

struct MockPump {
    join: JoinHandle<()>,
    done_rx: Receiver<()>,
}

#[derive(Default)]
struct MockState {
    register_count: AtomicUsize,
    unregister_count: AtomicUsize,
    handled: AtomicUsize,
    sender: Mutex<Option<Sender<PumpMessage>>>,
}

/// In-process stand-in for the native window.
///
/// Runs a real pump thread that blocks on a channel instead of the OS message
/// queue; [`MockCommandHandle::emit`] injects commands into it.
pub struct MockCommandSource {
    state: Arc<MockState>,
    fail_register: bool,
    registered: bool,
    pump: Option<MockPump>,
}

impl MockCommandSource {
    #[must_use]
    pub fn new() -> (Self, MockCommandHandle) {
        let state = Arc::new(MockState::default());
        (
            Self {
                state: Arc::clone(&state),
                fail_register: false,
                registered: false,
                pump: None,
            },
            MockCommandHandle { state },
        )
    }

    /// A source whose `register` fails, as when the window class is rejected.
    #[must_use]
    pub fn failing() -> (Self, MockCommandHandle) {
        let (mut source, handle) = Self::new();
        source.fail_register = true;
        (source, handle)
    }
}

impl NativeCommandSource for MockCommandSource {
    fn register(&mut self) -> Result<()> {
        if self.fail_register {
            return Err(NativeError::ClassRegistration {
                reason: "mock registration failure".to_string(),
            });
        }
        if !self.registered {
            self.state.register_count.fetch_add(1, Ordering::SeqCst);
            self.registered = true;
        }
        Ok(())
    }

    fn start(&mut self, handler: CommandHandler) -> Result<()> {
        if self.pump.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel::<PumpMessage>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<()>(1);
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let state = Arc::clone(&self.state);

        let join = std::thread::Builder::new()
            .name("overlyric-mock-pump".to_string())
            .spawn(move || {
                let _ = ready_tx.send(());
                while let Ok(PumpMessage::Command(command)) = rx.recv() {
                    handler(command);
                    state.handled.fetch_add(1, Ordering::SeqCst);
                }
                let _ = done_tx.send(());
            })
            .map_err(|e| NativeError::PumpStart {
                reason: e.to_string(),
            })?;

        ready_rx
            .recv_timeout(READY_TIMEOUT)
            .map_err(|_| NativeError::PumpStart {
                reason: "pump thread did not signal readiness".to_string(),
            })?;

        *self
            .state
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);
        self.pump = Some(MockPump { join, done_rx });
        Ok(())
    }

    fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        let sender = self
            .state
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let result = match self.pump.take() {
            Some(pump) => {
                if let Some(sender) = sender {
                    let _ = sender.send(PumpMessage::Quit);
                }
                join_with_timeout(pump.join, &pump.done_rx, timeout)
            }
            None => Ok(()),
        };

        if self.registered {
            self.registered = false;
            self.state.unregister_count.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

/// Wait up to `timeout` for the pump to report it has finished, then join it.
///
/// A pump that does not finish in time is detached.
pub(crate) fn join_with_timeout(
    join: JoinHandle<()>,
    done_rx: &Receiver<()>,
    timeout: Duration,
) -> Result<()> {
    match done_rx.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            if join.join().is_err() {
                warn!(target: LOG_TARGET, "Pump thread panicked");
            }
            debug!(target: LOG_TARGET, "Pump thread joined");
            Ok(())
        }
        Err(RecvTimeoutError::Timeout) => {
            warn!(target: LOG_TARGET, "Pump thread did not stop in time, detaching it");
            Err(NativeError::ShutdownTimeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}

/// Test-side handle to a [`MockCommandSource`].
pub struct MockCommandHandle {
    state: Arc<MockState>,
}

impl MockCommandHandle {
    /// Inject a command into the running pump. False when the pump is not running.
    #[must_use]
    pub fn emit(&self, command: MediaCommand) -> bool {
        self.state
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|sender| sender.send(PumpMessage::Command(command)).is_ok())
    }

    #[must_use]
    pub fn register_count(&self) -> usize {
        self.state.register_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn unregister_count(&self) -> usize {
        self.state.unregister_count.load(Ordering::SeqCst)
    }

    /// Commands the pump has finished handling
    #[must_use]
    pub fn handled(&self) -> usize {
        self.state.handled.load(Ordering::SeqCst)
    }
}
