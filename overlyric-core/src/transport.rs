//! Media commands and their dispatch to the transport collaborator.

use crate::error::CoreError;
use crate::playback::PlaybackState;
use crate::position::PositionEstimator;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

const LOG_TARGET: &str = "overlyric::transport";

/// The closed set of commands the overlay can issue to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaCommand {
    PlayPause,
    NextTrack,
    PreviousTrack,
    VolumeUp,
    VolumeDown,
    Mute,
}

impl MediaCommand {
    pub const ALL: [Self; 6] = [
        Self::PlayPause,
        Self::NextTrack,
        Self::PreviousTrack,
        Self::VolumeUp,
        Self::VolumeDown,
        Self::Mute,
    ];

    /// Wire name, also used as the `action` field of control responses
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PlayPause => "play-pause",
            Self::NextTrack => "next-track",
            Self::PreviousTrack => "previous-track",
            Self::VolumeUp => "volume-up",
            Self::VolumeDown => "volume-down",
            Self::Mute => "mute",
        }
    }
}

impl std::fmt::Display for MediaCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability to change playback on the underlying audio engine.
///
/// `send` is called from the native message pump and must return quickly:
/// implementations hand the command off instead of waiting for the engine.
pub trait TransportControl: Send + Sync {
    fn send(&self, command: MediaCommand) -> Result<(), CoreError>;
}

/// State after a command was applied optimistically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: MediaCommand,
    pub is_playing: bool,
    pub volume: u8,
}

/// Applies media commands to [`PlaybackState`] and forwards them to the
/// transport. Shared by the native bridge and the control server.
pub struct CommandDispatcher {
    transport: Arc<dyn TransportControl>,
    state: Arc<PlaybackState>,
    estimator: Arc<PositionEstimator>,
    volume_step: u8,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(
        transport: Arc<dyn TransportControl>,
        state: Arc<PlaybackState>,
        estimator: Arc<PositionEstimator>,
        volume_step: u8,
    ) -> Self {
        Self {
            transport,
            state,
            estimator,
            volume_step,
        }
    }

    /// Update local state for `command`, then hand it to the transport.
    ///
    /// The local update happens first and is kept even if the transport
    /// rejects the command; the next authoritative poll corrects it.
    pub fn dispatch(&self, command: MediaCommand) -> Result<CommandOutcome, CoreError> {
        let step = i16::from(self.volume_step);
        match command {
            MediaCommand::PlayPause => {
                let playing = self.state.toggle_playing();
                self.estimator.set_playing(playing);
            }
            MediaCommand::VolumeUp => {
                self.state.adjust_volume(step);
            }
            MediaCommand::VolumeDown => {
                self.state.adjust_volume(-step);
            }
            MediaCommand::Mute => {
                self.state.toggle_mute(self.volume_step);
            }
            MediaCommand::NextTrack | MediaCommand::PreviousTrack => {}
        }

        let outcome = CommandOutcome {
            command,
            is_playing: self.state.is_playing(),
            volume: self.state.volume(),
        };
        debug!(target: LOG_TARGET, "Dispatching {} -> {:?}", command, outcome);

        self.transport.send(command).inspect_err(|e| {
            warn!(target: LOG_TARGET, "Transport rejected {}: {}", command, e);
        })?;
        Ok(outcome)
    }

    #[must_use]
    pub fn state(&self) -> &Arc<PlaybackState> {
        &self.state
    }
}
