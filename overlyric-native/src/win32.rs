//! Hidden message-only window that receives media keys on Windows.
//!
//! The window is created on the pump thread so that its messages are delivered
//! to that thread's queue. Media keys arrive either as `WM_APPCOMMAND` or, once
//! registered, as `WM_HOTKEY`.
#![allow(unsafe_code)]

use crate::decode::{decode_app_command_lparam, decode_hotkey, hotkey_id};
use crate::error::{NativeError, Result};
use crate::source::{join_with_timeout, CommandHandler, NativeCommandSource, READY_TIMEOUT};
use overlyric_core::MediaCommand;
use std::cell::RefCell;
use std::sync::mpsc::{self, Receiver};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, MOD_NOREPEAT, VIRTUAL_KEY, VK_MEDIA_NEXT_TRACK,
    VK_MEDIA_PLAY_PAUSE, VK_MEDIA_PREV_TRACK, VK_VOLUME_DOWN, VK_VOLUME_MUTE, VK_VOLUME_UP,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
    PeekMessageW, PostThreadMessageW, RegisterClassW, TranslateMessage, UnregisterClassW,
    HMENU, HWND_MESSAGE, MSG, PM_NOREMOVE, WINDOW_EX_STYLE, WINDOW_STYLE, WM_APPCOMMAND,
    WM_HOTKEY, WM_QUIT, WNDCLASSW,
};

const LOG_TARGET: &str = "overlyric::native::win32";

const CLASS_NAME: PCWSTR = w!("OverlyricMediaKeyWindow");

thread_local! {
    static HANDLER: RefCell<Option<CommandHandler>> = const { RefCell::new(None) };
}

const fn virtual_key(command: MediaCommand) -> VIRTUAL_KEY {
    match command {
        MediaCommand::PlayPause => VK_MEDIA_PLAY_PAUSE,
        MediaCommand::NextTrack => VK_MEDIA_NEXT_TRACK,
        MediaCommand::PreviousTrack => VK_MEDIA_PREV_TRACK,
        MediaCommand::VolumeUp => VK_VOLUME_UP,
        MediaCommand::VolumeDown => VK_VOLUME_DOWN,
        MediaCommand::Mute => VK_VOLUME_MUTE,
    }
}

fn deliver(command: MediaCommand) {
    debug!(target: LOG_TARGET, "Media key: {}", command);
    HANDLER.with(|handler| {
        if let Some(handler) = handler.borrow().as_ref() {
            handler(command);
        }
    });
}

unsafe extern "system" fn wndproc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    match msg {
        WM_HOTKEY => {
            if let Some(command) = i32::try_from(wparam.0).ok().and_then(decode_hotkey) {
                deliver(command);
            }
            LRESULT(0)
        }
        WM_APPCOMMAND => match decode_app_command_lparam(lparam.0) {
            Some(command) => {
                deliver(command);
                // Handled; stops the command bubbling to the shell
                LRESULT(1)
            }
            None => DefWindowProcW(hwnd, msg, wparam, lparam),
        },
        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

struct Pump {
    thread_id: u32,
    join: JoinHandle<()>,
    done_rx: Receiver<()>,
}

/// Media-key source backed by a message-only window.
#[derive(Default)]
pub struct Win32CommandSource {
    registered: bool,
    pump: Option<Pump>,
}

impl Win32CommandSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Runs on the pump thread: create the window, report readiness, pump until `WM_QUIT`.
fn pump_thread(handler: CommandHandler, ready_tx: &mpsc::SyncSender<Result<u32>>) {
    HANDLER.with(|slot| *slot.borrow_mut() = Some(handler));

    // SAFETY: plain Win32 calls on this thread; the window and hotkeys are
    // released on this same thread before it exits.
    unsafe {
        let mut msg = MSG::default();
        // Forces creation of this thread's message queue before we report ready
        let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);
        let thread_id = GetCurrentThreadId();

        let hinstance = GetModuleHandleW(None).unwrap_or_default();
        let hwnd = match CreateWindowExW(
            WINDOW_EX_STYLE::default(),
            CLASS_NAME,
            PCWSTR::null(),
            WINDOW_STYLE::default(),
            0,
            0,
            0,
            0,
            HWND_MESSAGE,
            HMENU::default(),
            hinstance,
            None,
        ) {
            Ok(hwnd) => hwnd,
            Err(e) => {
                HANDLER.with(|slot| slot.borrow_mut().take());
                let _ = ready_tx.send(Err(NativeError::WindowCreation {
                    reason: e.to_string(),
                }));
                return;
            }
        };

        let mut hotkeys = Vec::new();
        for command in MediaCommand::ALL {
            let id = hotkey_id(command);
            let vk = u32::from(virtual_key(command).0);
            match RegisterHotKey(hwnd, id, MOD_NOREPEAT, vk) {
                Ok(()) => hotkeys.push(id),
                Err(e) => {
                    warn!(target: LOG_TARGET, "Could not register hotkey for {}: {}", command, e);
                }
            }
        }

        let _ = ready_tx.send(Ok(thread_id));
        info!(
            target: LOG_TARGET,
            "Media-key window running ({} hotkeys registered)",
            hotkeys.len()
        );

        // GetMessageW returns 0 on WM_QUIT and -1 on error
        while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        for id in hotkeys {
            let _ = UnregisterHotKey(hwnd, id);
        }
        if let Err(e) = DestroyWindow(hwnd) {
            warn!(target: LOG_TARGET, "Failed to destroy media-key window: {}", e);
        }
    }

    HANDLER.with(|slot| slot.borrow_mut().take());
    debug!(target: LOG_TARGET, "Message pump exited");
}

impl NativeCommandSource for Win32CommandSource {
    fn register(&mut self) -> Result<()> {
        if self.registered {
            return Ok(());
        }

        // SAFETY: the class struct only borrows 'static data.
        let atom = unsafe {
            let hinstance = GetModuleHandleW(None).map_err(|e| NativeError::ClassRegistration {
                reason: e.to_string(),
            })?;
            let wc = WNDCLASSW {
                lpfnWndProc: Some(wndproc),
                hInstance: hinstance.into(),
                lpszClassName: CLASS_NAME,
                ..Default::default()
            };
            RegisterClassW(&wc)
        };

        if atom == 0 {
            return Err(NativeError::ClassRegistration {
                reason: windows::core::Error::from_win32().to_string(),
            });
        }
        self.registered = true;
        debug!(target: LOG_TARGET, "Registered window class");
        Ok(())
    }

    fn start(&mut self, handler: CommandHandler) -> Result<()> {
        if self.pump.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<u32>>(1);
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let join = std::thread::Builder::new()
            .name("overlyric-media-keys".to_string())
            .spawn(move || {
                pump_thread(handler, &ready_tx);
                let _ = done_tx.send(());
            })
            .map_err(|e| NativeError::PumpStart {
                reason: e.to_string(),
            })?;

        let thread_id = match ready_rx.recv_timeout(READY_TIMEOUT) {
            Ok(Ok(thread_id)) => thread_id,
            Ok(Err(e)) => {
                let _ = join.join();
                return Err(e);
            }
            Err(_) => {
                return Err(NativeError::PumpStart {
                    reason: "message pump did not signal readiness".to_string(),
                });
            }
        };

        self.pump = Some(Pump {
            thread_id,
            join,
            done_rx,
        });
        Ok(())
    }

    fn shutdown(&mut self, timeout: Duration) -> Result<()> {
        let result = match self.pump.take() {
            Some(pump) => {
                // SAFETY: posting to a thread id we obtained from that thread.
                if let Err(e) =
                    unsafe { PostThreadMessageW(pump.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) }
                {
                    warn!(target: LOG_TARGET, "Failed to post quit to message pump: {}", e);
                }
                join_with_timeout(pump.join, &pump.done_rx, timeout)
            }
            None => Ok(()),
        };

        if self.registered {
            self.registered = false;
            // SAFETY: the class was registered by this process with this name.
            let unregistered = unsafe {
                GetModuleHandleW(None)
                    .and_then(|hinstance| UnregisterClassW(CLASS_NAME, hinstance))
            };
            if let Err(e) = unregistered {
                // Fails while a detached pump still owns a window of this class
                warn!(target: LOG_TARGET, "Failed to unregister window class: {}", e);
            }
        }
        result
    }
}
