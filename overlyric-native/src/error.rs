use thiserror::Error;

/// Errors from the native media-key bridge.
///
/// All of them are confined to the bridge: the rest of the application keeps
/// running without media-key interception.
#[derive(Debug, Error)]
pub enum NativeError {
    /// The hidden window class could not be registered.
    #[error("Failed to register window class: {reason}")]
    ClassRegistration { reason: String },

    /// The hidden window could not be created.
    #[error("Failed to create message window: {reason}")]
    WindowCreation { reason: String },

    /// The message pump thread did not come up.
    #[error("Message pump failed to start: {reason}")]
    PumpStart { reason: String },

    /// The message pump did not stop within the shutdown timeout.
    #[error("Message pump did not stop within {timeout_ms}ms")]
    ShutdownTimeout { timeout_ms: u64 },

    /// An operation was called in a state that does not allow it.
    #[error("Bridge is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// No native media-key support on this platform.
    #[error("Native media keys are not supported on this platform")]
    Unsupported,
}

/// Convenience type alias for Results with `NativeError`.
pub type Result<T> = std::result::Result<T, NativeError>;
