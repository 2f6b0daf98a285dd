use crate::cli::join_args;
use anyhow::{bail, Context};
use tracing::info;
use windows::core::{w, HSTRING, PCWSTR};
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Shell::{IsUserAnAdmin, ShellExecuteW};
use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;

/// Low-level hooks on elevated windows only see input when we are
/// elevated too.
pub fn is_elevated() -> bool {
    unsafe { IsUserAnAdmin().as_bool() }
}

/// Start this executable again through the UAC prompt with the same
/// arguments. Returns once the new process has been launched.
pub fn relaunch_elevated() -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("cannot locate own executable")?;
    let params = join_args(std::env::args().skip(1));
    info!("Relaunching elevated: {} {}", exe.display(), params);

    let file = HSTRING::from(exe.to_string_lossy().as_ref());
    let params = HSTRING::from(params.as_str());
    let result = unsafe {
        ShellExecuteW(
            HWND::default(),
            w!("runas"),
            &file,
            &params,
            PCWSTR::null(),
            SW_SHOWNORMAL,
        )
    };
    // Values above 32 mean success.
    if result.0 <= 32 {
        bail!("ShellExecuteW(runas) failed with code {}", result.0);
    }
    Ok(())
}
