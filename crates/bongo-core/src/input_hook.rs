use crate::engine::{EngineError, InputMonitor};
use crate::types::{Edge, InputSource, MouseButton, RawInput};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use windows::Win32::Foundation::{ERROR_ACCESS_DENIED, FALSE, HINSTANCE, LPARAM, LRESULT, WPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, MsgWaitForMultipleObjects, PeekMessageW, SetWindowsHookExW,
    TranslateMessage, UnhookWindowsHookEx, HHOOK, KBDLLHOOKSTRUCT, LLKHF_EXTENDED, MSG,
    MSLLHOOKSTRUCT, PM_REMOVE, QS_ALLINPUT, WH_KEYBOARD_LL, WH_MOUSE_LL, WM_KEYDOWN, WM_KEYUP,
    WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MBUTTONUP, WM_QUIT, WM_RBUTTONDOWN,
    WM_RBUTTONUP, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_XBUTTONDOWN, WM_XBUTTONUP,
};

lazy_static::lazy_static! {
    /// Where the hook procedures deliver events. Hook procedures get no
    /// user pointer, so this has to be global.
    static ref HOOK_SINK: Mutex<Option<Sender<RawInput>>> = Mutex::new(None);
}

fn forward(raw: RawInput) {
    if let Some(tx) = HOOK_SINK.lock().as_ref() {
        let _ = tx.send(raw);
    }
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let kbd = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
        let edge = match wparam.0 as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(Edge::Down),
            WM_KEYUP | WM_SYSKEYUP => Some(Edge::Up),
            _ => None,
        };
        if let Some(edge) = edge {
            let ext = (kbd.flags.0 & LLKHF_EXTENDED.0) != 0;
            let source = InputSource::key(kbd.vkCode as u16, kbd.scanCode as u16, ext);
            forward(RawInput::new(source, edge, Instant::now()));
        }
    }
    CallNextHookEx(None, code, wparam, lparam)
}

unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let event = match wparam.0 as u32 {
            WM_LBUTTONDOWN => Some((MouseButton::Left, Edge::Down)),
            WM_LBUTTONUP => Some((MouseButton::Left, Edge::Up)),
            WM_RBUTTONDOWN => Some((MouseButton::Right, Edge::Down)),
            WM_RBUTTONUP => Some((MouseButton::Right, Edge::Up)),
            WM_MBUTTONDOWN => Some((MouseButton::Middle, Edge::Down)),
            WM_MBUTTONUP => Some((MouseButton::Middle, Edge::Up)),
            msg @ (WM_XBUTTONDOWN | WM_XBUTTONUP) => {
                let info = &*(lparam.0 as *const MSLLHOOKSTRUCT);
                // HIWORD(mouseData): 1 = XBUTTON1, 2 = XBUTTON2
                let button = if (info.mouseData >> 16) & 0xFFFF == 1 {
                    MouseButton::X1
                } else {
                    MouseButton::X2
                };
                let edge = if msg == WM_XBUTTONDOWN { Edge::Down } else { Edge::Up };
                Some((button, edge))
            }
            // Moves and wheel
            _ => None,
        };
        if let Some((button, edge)) = event {
            forward(RawInput::new(InputSource::Mouse(button), edge, Instant::now()));
        }
    }
    CallNextHookEx(None, code, wparam, lparam)
}

fn hook_error(e: windows::core::Error) -> EngineError {
    if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
        EngineError::AccessDenied
    } else {
        EngineError::Hook(e.to_string())
    }
}

/// Global low-level keyboard and mouse hooks.
///
/// Must be installed and pumped on the same thread.
#[derive(Debug, Default)]
pub struct HookMonitor {
    keyboard: Option<HHOOK>,
    mouse: Option<HHOOK>,
}

impl HookMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputMonitor for HookMonitor {
    fn install(&mut self, sink: Sender<RawInput>) -> Result<(), EngineError> {
        info!("Installing input hooks...");
        *HOOK_SINK.lock() = Some(sink);

        let keyboard =
            unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), HINSTANCE::default(), 0) }
                .map_err(hook_error);
        match keyboard {
            Ok(h) => self.keyboard = Some(h),
            Err(e) => {
                self.uninstall();
                return Err(e);
            }
        }

        let mouse =
            unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_proc), HINSTANCE::default(), 0) }
                .map_err(hook_error);
        match mouse {
            Ok(h) => self.mouse = Some(h),
            Err(e) => {
                self.uninstall();
                return Err(e);
            }
        }

        info!("Input hooks installed");
        Ok(())
    }

    fn pump(&mut self, timeout: Duration) -> bool {
        let millis = timeout.as_millis().min(u32::MAX as u128) as u32;
        let mut msg = MSG::default();
        unsafe {
            let _ = MsgWaitForMultipleObjects(None, FALSE, millis, QS_ALLINPUT);
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                if msg.message == WM_QUIT {
                    return false;
                }
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
        true
    }

    fn uninstall(&mut self) {
        for hook in [self.keyboard.take(), self.mouse.take()].into_iter().flatten() {
            if let Err(e) = unsafe { UnhookWindowsHookEx(hook) } {
                warn!("UnhookWindowsHookEx failed: {}", e);
            }
        }
        if HOOK_SINK.lock().take().is_some() {
            info!("Input hooks uninstalled");
        }
    }
}

impl Drop for HookMonitor {
    fn drop(&mut self) {
        self.uninstall();
    }
}
