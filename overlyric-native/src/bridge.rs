use crate::error::{NativeError, Result};
use crate::source::{CommandHandler, NativeCommandSource};
use overlyric_core::CommandDispatcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_TARGET: &str = "overlyric::native::bridge";

/// Lifecycle of a [`NativeMediaBridge`]. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Registered,
    Running,
    Stopped,
}

impl BridgeState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Registered => "registered",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Routes OS media keys into the [`CommandDispatcher`].
///
/// Commands are handled on the source's pump thread. The dispatcher updates
/// playback state optimistically, then forwards the command to the transport.
pub struct NativeMediaBridge {
    source: Box<dyn NativeCommandSource>,
    dispatcher: Arc<CommandDispatcher>,
    state: BridgeState,
    shutdown_timeout: Duration,
}

impl NativeMediaBridge {
    #[must_use]
    pub fn new(
        source: Box<dyn NativeCommandSource>,
        dispatcher: Arc<CommandDispatcher>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            source,
            dispatcher,
            state: BridgeState::Uninitialized,
            shutdown_timeout,
        }
    }

    #[must_use]
    pub const fn state(&self) -> BridgeState {
        self.state
    }

    /// Register the window class, create the window and start the pump.
    ///
    /// On failure whatever was acquired is released and the bridge ends up
    /// `Stopped`; nothing else in the application depends on it.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::InvalidState`] unless the bridge is uninitialized,
    /// or the source's registration/startup error.
    pub fn init(&mut self) -> Result<()> {
        if self.state != BridgeState::Uninitialized {
            return Err(NativeError::InvalidState {
                expected: BridgeState::Uninitialized.as_str(),
                actual: self.state.as_str(),
            });
        }

        if let Err(e) = self.source.register() {
            warn!(target: LOG_TARGET, "Media-key bridge unavailable: {}", e);
            self.state = BridgeState::Stopped;
            return Err(e);
        }
        self.state = BridgeState::Registered;

        let dispatcher = Arc::clone(&self.dispatcher);
        let handler: CommandHandler = Arc::new(move |command| {
            if let Err(e) = dispatcher.dispatch(command) {
                warn!(target: LOG_TARGET, "Media key {} not forwarded: {}", command, e);
            }
        });

        if let Err(e) = self.source.start(handler) {
            warn!(target: LOG_TARGET, "Media-key pump failed to start: {}", e);
            if let Err(cleanup) = self.source.shutdown(self.shutdown_timeout) {
                debug!(target: LOG_TARGET, "Cleanup after failed start: {}", cleanup);
            }
            self.state = BridgeState::Stopped;
            return Err(e);
        }

        self.state = BridgeState::Running;
        info!(target: LOG_TARGET, "Media-key bridge running");
        Ok(())
    }

    /// Stop the pump and release native resources. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`NativeError::ShutdownTimeout`] if the pump thread did not stop
    /// within the configured timeout. The bridge is `Stopped` either way.
    pub fn shutdown(&mut self) -> Result<()> {
        match self.state {
            BridgeState::Stopped => Ok(()),
            BridgeState::Uninitialized => {
                self.state = BridgeState::Stopped;
                Ok(())
            }
            BridgeState::Registered | BridgeState::Running => {
                self.state = BridgeState::Stopped;
                let result = self.source.shutdown(self.shutdown_timeout);
                info!(target: LOG_TARGET, "Media-key bridge stopped");
                result
            }
        }
    }
}

impl Drop for NativeMediaBridge {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(target: LOG_TARGET, "Media-key bridge shutdown on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockCommandSource;
    use overlyric_core::{
        CoreError, ManualClock, MediaCommand, PlaybackState, PlaybackUpdate, PositionEstimator,
        TransportControl,
    };
    use std::sync::mpsc::{self, Sender};
    use std::sync::Mutex;

    struct ChannelTransport {
        tx: Mutex<Sender<MediaCommand>>,
    }

    impl TransportControl for ChannelTransport {
        fn send(&self, command: MediaCommand) -> std::result::Result<(), CoreError> {
            let _ = self.tx.lock().unwrap().send(command);
            Ok(())
        }
    }

    fn dispatcher() -> (Arc<CommandDispatcher>, mpsc::Receiver<MediaCommand>) {
        let (tx, rx) = mpsc::channel();
        let clock = Arc::new(ManualClock::new(0));
        let state = Arc::new(PlaybackState::new());
        state.write(PlaybackUpdate {
            is_playing: Some(true),
            volume: Some(40),
            ..Default::default()
        });
        let dispatcher = CommandDispatcher::new(
            Arc::new(ChannelTransport { tx: Mutex::new(tx) }),
            state,
            Arc::new(PositionEstimator::new(clock, Duration::from_secs(2))),
            10,
        );
        (Arc::new(dispatcher), rx)
    }

    #[test]
    fn test_media_keys_reach_transport_and_state() {
        let (dispatcher, sent) = dispatcher();
        let (source, handle) = MockCommandSource::new();
        let mut bridge =
            NativeMediaBridge::new(Box::new(source), Arc::clone(&dispatcher), Duration::from_secs(1));

        bridge.init().unwrap();
        assert_eq!(bridge.state(), BridgeState::Running);

        assert!(handle.emit(MediaCommand::PlayPause));
        assert!(handle.emit(MediaCommand::VolumeUp));
        let timeout = Duration::from_secs(1);
        assert_eq!(sent.recv_timeout(timeout).unwrap(), MediaCommand::PlayPause);
        assert_eq!(sent.recv_timeout(timeout).unwrap(), MediaCommand::VolumeUp);

        // State is updated before the transport sees the command
        assert!(!dispatcher.state().is_playing());
        assert_eq!(dispatcher.state().volume(), 50);

        bridge.shutdown().unwrap();
        assert_eq!(bridge.state(), BridgeState::Stopped);
        assert_eq!(handle.handled(), 2);
    }

    #[test]
    fn test_shutdown_twice_releases_once() {
        let (dispatcher, _sent) = dispatcher();
        let (source, handle) = MockCommandSource::new();
        let mut bridge = NativeMediaBridge::new(Box::new(source), dispatcher, Duration::from_secs(1));

        bridge.init().unwrap();
        bridge.shutdown().unwrap();
        bridge.shutdown().unwrap();
        drop(bridge);

        assert_eq!(handle.unregister_count(), 1);
        assert!(!handle.emit(MediaCommand::Mute));
    }

    #[test]
    fn test_registration_failure_leaves_bridge_stopped() {
        let (dispatcher, _sent) = dispatcher();
        let (source, handle) = MockCommandSource::failing();
        let mut bridge = NativeMediaBridge::new(Box::new(source), dispatcher, Duration::from_secs(1));

        let err = bridge.init().unwrap_err();
        assert!(matches!(err, NativeError::ClassRegistration { .. }));
        assert_eq!(bridge.state(), BridgeState::Stopped);
        assert_eq!(handle.register_count(), 0);
        assert!(bridge.shutdown().is_ok());
    }

    #[test]
    fn test_init_only_from_uninitialized() {
        let (dispatcher, _sent) = dispatcher();
        let (source, _handle) = MockCommandSource::new();
        let mut bridge = NativeMediaBridge::new(Box::new(source), dispatcher, Duration::from_secs(1));

        bridge.init().unwrap();
        assert!(matches!(
            bridge.init(),
            Err(NativeError::InvalidState {
                expected: "uninitialized",
                actual: "running"
            })
        ));

        bridge.shutdown().unwrap();
        assert!(matches!(
            bridge.init(),
            Err(NativeError::InvalidState { actual: "stopped", .. })
        ));
    }

    #[test]
    fn test_shutdown_before_init() {
        let (dispatcher, _sent) = dispatcher();
        let (source, handle) = MockCommandSource::new();
        let mut bridge = NativeMediaBridge::new(Box::new(source), dispatcher, Duration::from_secs(1));

        bridge.shutdown().unwrap();
        assert_eq!(bridge.state(), BridgeState::Stopped);
        assert_eq!(handle.unregister_count(), 0);
    }
}
