use crate::engine::{EngineError, FrameView, Overlay};
use crate::skin::premultiplied_bgra;
use tracing::{debug, info};
use windows::core::w;
use windows::Win32::Foundation::{COLORREF, HINSTANCE, HWND, LPARAM, LRESULT, POINT, SIZE, WPARAM};
use windows::Win32::Graphics::Gdi::{
    CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, GetDC, ReleaseDC, SelectObject,
    BITMAPINFO, BITMAPINFOHEADER, BI_RGB, BLENDFUNCTION, DIB_RGB_COLORS,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, RegisterClassW, ShowWindow,
    UpdateLayeredWindow, SW_HIDE, SW_SHOWNOACTIVATE, ULW_ALPHA, WNDCLASSW, WS_EX_LAYERED,
    WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW, WS_EX_TOPMOST, WS_EX_TRANSPARENT, WS_POPUP,
};

unsafe extern "system" fn overlay_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

fn win_err(e: windows::core::Error) -> EngineError {
    EngineError::Overlay(e.to_string())
}

/// Click-through, always-on-top popup drawn with per-pixel alpha.
#[derive(Debug, Default)]
pub struct LayeredOverlay {
    hwnd: HWND,
    visible: bool,
    shown: bool,
}

impl LayeredOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_open(&self) -> bool {
        self.hwnd.0 != 0
    }
}

impl Overlay for LayeredOverlay {
    fn open(&mut self) -> Result<(), EngineError> {
        if self.is_open() {
            return Ok(());
        }
        unsafe {
            let instance: HINSTANCE = GetModuleHandleW(None).map_err(win_err)?.into();
            let class_name = w!("BongoCatOverlay");
            let wc = WNDCLASSW {
                lpfnWndProc: Some(overlay_proc),
                hInstance: instance,
                lpszClassName: class_name,
                ..Default::default()
            };
            // Fails harmlessly if the class is already registered.
            RegisterClassW(&wc);

            let ex_style =
                WS_EX_LAYERED | WS_EX_TRANSPARENT | WS_EX_TOPMOST | WS_EX_NOACTIVATE | WS_EX_TOOLWINDOW;
            let hwnd = CreateWindowExW(
                ex_style,
                class_name,
                w!("Bongo Cat"),
                WS_POPUP,
                0,
                0,
                1,
                1,
                None,
                None,
                instance,
                None,
            );
            if hwnd.0 == 0 {
                return Err(EngineError::Overlay(
                    windows::core::Error::from_win32().to_string(),
                ));
            }
            self.hwnd = hwnd;
        }
        self.visible = true;
        self.shown = false;
        info!("Overlay window created");
        Ok(())
    }

    fn present(&mut self, frame: &FrameView<'_>) -> Result<(), EngineError> {
        if !self.is_open() {
            return Err(EngineError::Overlay("window is not open".into()));
        }
        let (width, height) = frame.image.dimensions();
        let pixels = premultiplied_bgra(frame.image, frame.opacity);

        unsafe {
            let screen_dc = GetDC(None);
            let mem_dc = CreateCompatibleDC(screen_dc);

            let bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width as i32,
                    biHeight: -(height as i32), // Top-down
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0 as u32,
                    ..Default::default()
                },
                ..Default::default()
            };

            let mut bits: *mut std::ffi::c_void = std::ptr::null_mut();
            let bitmap = match CreateDIBSection(mem_dc, &bmi, DIB_RGB_COLORS, &mut bits, None, 0) {
                Ok(b) if !bits.is_null() => b,
                other => {
                    let _ = DeleteDC(mem_dc);
                    ReleaseDC(None, screen_dc);
                    return Err(match other {
                        Err(e) => win_err(e),
                        Ok(_) => EngineError::Overlay("CreateDIBSection returned no bits".into()),
                    });
                }
            };
            std::ptr::copy_nonoverlapping(pixels.as_ptr(), bits as *mut u8, pixels.len());
            let old_bitmap = SelectObject(mem_dc, bitmap);

            let pt_dst = POINT {
                x: frame.x,
                y: frame.y,
            };
            let pt_src = POINT { x: 0, y: 0 };
            let size = SIZE {
                cx: width as i32,
                cy: height as i32,
            };
            let blend = BLENDFUNCTION {
                BlendOp: 0,     // AC_SRC_OVER
                BlendFlags: 0,
                SourceConstantAlpha: 255,
                AlphaFormat: 1, // AC_SRC_ALPHA
            };
            let result = UpdateLayeredWindow(
                self.hwnd,
                screen_dc,
                Some(&pt_dst),
                Some(&size),
                mem_dc,
                Some(&pt_src),
                COLORREF(0),
                Some(&blend),
                ULW_ALPHA,
            );

            SelectObject(mem_dc, old_bitmap);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            ReleaseDC(None, screen_dc);
            result.map_err(win_err)?;
        }

        if self.visible && !self.shown {
            unsafe {
                let _ = ShowWindow(self.hwnd, SW_SHOWNOACTIVATE);
            }
            self.shown = true;
        }
        debug!("Presented {:?} frame at ({}, {})", frame.state, frame.x, frame.y);
        Ok(())
    }

    fn set_visible(&mut self, visible: bool) -> Result<(), EngineError> {
        self.visible = visible;
        if !self.is_open() {
            return Ok(());
        }
        unsafe {
            let _ = ShowWindow(self.hwnd, if visible { SW_SHOWNOACTIVATE } else { SW_HIDE });
        }
        self.shown = visible;
        Ok(())
    }

    fn close(&mut self) {
        if self.is_open() {
            unsafe {
                let _ = DestroyWindow(self.hwnd);
            }
            self.hwnd = HWND::default();
            info!("Overlay window closed");
        }
    }
}

impl Drop for LayeredOverlay {
    fn drop(&mut self) {
        self.close();
    }
}
