pub mod bridge;
pub mod decode;
pub mod error;
pub mod source;
#[cfg(windows)]
pub mod win32;

pub use bridge::{BridgeState, NativeMediaBridge};
pub use error::{NativeError, Result};
pub use source::{
    CommandHandler, MockCommandHandle, MockCommandSource, NativeCommandSource,
    UnsupportedCommandSource,
};
#[cfg(windows)]
pub use win32::Win32CommandSource;

/// The media-key source for the current platform.
#[must_use]
pub fn platform_source() -> Box<dyn NativeCommandSource> {
    #[cfg(windows)]
    {
        Box::new(Win32CommandSource::new())
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedCommandSource)
    }
}
