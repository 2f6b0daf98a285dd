use anyhow::bail;
use std::path::Path;
use std::thread;
use tracing::{info, warn};
use windows::core::{w, HSTRING, PCWSTR};
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::Shell::ShellExecuteW;
use windows::Win32::UI::WindowsAndMessaging::{
    MessageBoxW, MB_ICONINFORMATION, MB_OK, MB_SETFOREGROUND, SW_SHOWNORMAL,
};

/// Open `path` with whatever the user has associated with its type.
pub fn open_in_editor(path: &Path) -> anyhow::Result<()> {
    info!("Opening {}", path.display());
    let file = HSTRING::from(path.to_string_lossy().as_ref());
    let result = unsafe {
        ShellExecuteW(
            HWND::default(),
            w!("open"),
            &file,
            PCWSTR::null(),
            PCWSTR::null(),
            SW_SHOWNORMAL,
        )
    };
    if result.0 <= 32 {
        bail!("ShellExecuteW(open) failed with code {}", result.0);
    }
    Ok(())
}

/// Show the about box without blocking the calling thread.
pub fn show_about(config_path: &Path) {
    let text = format!(
        "{}\n\n{}\n\nSettings file:\n{}",
        bongo_core::app_title(),
        bongo_core::DESCRIPTION,
        config_path.display()
    );
    let spawned = thread::Builder::new()
        .name("about".into())
        .spawn(move || unsafe {
            MessageBoxW(
                HWND::default(),
                &HSTRING::from(text.as_str()),
                &HSTRING::from(bongo_core::APP_NAME),
                MB_OK | MB_ICONINFORMATION | MB_SETFOREGROUND,
            );
        });
    if let Err(e) = spawned {
        warn!("Could not show about box: {}", e);
    }
}
