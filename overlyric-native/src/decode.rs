//! Decoding of native media-key messages into [`MediaCommand`]s.

use overlyric_core::MediaCommand;

pub const APPCOMMAND_VOLUME_MUTE: u16 = 8;
pub const APPCOMMAND_VOLUME_DOWN: u16 = 9;
pub const APPCOMMAND_VOLUME_UP: u16 = 10;
pub const APPCOMMAND_MEDIA_NEXTTRACK: u16 = 11;
pub const APPCOMMAND_MEDIA_PREVIOUSTRACK: u16 = 12;
pub const APPCOMMAND_MEDIA_PLAY_PAUSE: u16 = 14;

/// Device bits packed into the high word of a `WM_APPCOMMAND` lParam.
const FAPPCOMMAND_MASK: u16 = 0xF000;

/// First hotkey id; ids are assigned in [`MediaCommand::ALL`] order.
pub const HOTKEY_BASE_ID: i32 = 0x4F4C;

/// Map an `APPCOMMAND_*` code to a command.
#[must_use]
pub const fn decode_app_command(code: u16) -> Option<MediaCommand> {
    match code {
        APPCOMMAND_MEDIA_PLAY_PAUSE => Some(MediaCommand::PlayPause),
        APPCOMMAND_MEDIA_NEXTTRACK => Some(MediaCommand::NextTrack),
        APPCOMMAND_MEDIA_PREVIOUSTRACK => Some(MediaCommand::PreviousTrack),
        APPCOMMAND_VOLUME_UP => Some(MediaCommand::VolumeUp),
        APPCOMMAND_VOLUME_DOWN => Some(MediaCommand::VolumeDown),
        APPCOMMAND_VOLUME_MUTE => Some(MediaCommand::Mute),
        _ => None,
    }
}

/// Extract the command code from a `WM_APPCOMMAND` lParam.
#[must_use]
pub fn app_command_from_lparam(lparam: isize) -> u16 {
    let high = (lparam >> 16) & 0xFFFF;
    u16::try_from(high).unwrap_or(0) & !FAPPCOMMAND_MASK
}

/// Decode the `WM_APPCOMMAND` lParam in one step.
#[must_use]
pub fn decode_app_command_lparam(lparam: isize) -> Option<MediaCommand> {
    decode_app_command(app_command_from_lparam(lparam))
}

/// Hotkey id registered for a command.
#[must_use]
pub fn hotkey_id(command: MediaCommand) -> i32 {
    let offset = MediaCommand::ALL
        .iter()
        .position(|c| *c == command)
        .and_then(|i| i32::try_from(i).ok())
        .unwrap_or(0);
    HOTKEY_BASE_ID + offset
}

/// Command for a `WM_HOTKEY` id, if it is one of ours.
#[must_use]
pub fn decode_hotkey(id: i32) -> Option<MediaCommand> {
    let offset = usize::try_from(id.checked_sub(HOTKEY_BASE_ID)?).ok()?;
    MediaCommand::ALL.get(offset).copied()
}
