use crate::shutdown::{Shutdown, GRACE_PERIOD};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;
use windows::Win32::Foundation::{BOOL, FALSE, TRUE};
use windows::Win32::System::Console::{
    SetConsoleCtrlHandler, CTRL_BREAK_EVENT, CTRL_CLOSE_EVENT, CTRL_C_EVENT, CTRL_LOGOFF_EVENT,
    CTRL_SHUTDOWN_EVENT,
};

lazy_static::lazy_static! {
    static ref SHUTDOWN: Mutex<Option<Arc<Shutdown>>> = Mutex::new(None);
}

unsafe extern "system" fn console_handler(ctrl_type: u32) -> BOOL {
    let reason = match ctrl_type {
        CTRL_C_EVENT => "Ctrl+C",
        CTRL_BREAK_EVENT => "Ctrl+Break",
        CTRL_CLOSE_EVENT => "console closed",
        CTRL_LOGOFF_EVENT => "user logoff",
        CTRL_SHUTDOWN_EVENT => "system shutdown",
        _ => return FALSE,
    };
    let Some(shutdown) = SHUTDOWN.lock().clone() else {
        return FALSE;
    };
    shutdown.request(reason);
    if ctrl_type != CTRL_C_EVENT && ctrl_type != CTRL_BREAK_EVENT {
        // The process dies when this returns; let the main thread finish.
        shutdown.wait_complete(GRACE_PERIOD);
    }
    TRUE
}

/// Route console control events to `shutdown`.
pub fn install(shutdown: &Arc<Shutdown>) {
    *SHUTDOWN.lock() = Some(Arc::clone(shutdown));
    if let Err(e) = unsafe { SetConsoleCtrlHandler(Some(console_handler), TRUE) } {
        warn!("SetConsoleCtrlHandler failed: {}", e);
    }
}
