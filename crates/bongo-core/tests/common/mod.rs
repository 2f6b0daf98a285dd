#![allow(dead_code)]

use bongo_core::engine::{EngineError, FrameView, InputMonitor, Overlay, StatusSink};
use bongo_core::task::{CommandOutput, CommandRunner};
use bongo_core::tray::{TrayAction, TrayBackend, TrayHandler, TrayMenuModel};
use bongo_core::types::{AnimationState, EngineStatus, RawInput};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Input monitor whose sink is reachable from the test thread.
#[derive(Clone, Default)]
pub struct ScriptedMonitor {
    pub sink: Arc<Mutex<Option<Sender<RawInput>>>>,
    pub installed: Arc<Mutex<bool>>,
    pub deny: bool,
}

impl ScriptedMonitor {
    pub fn send(&self, raw: RawInput) -> bool {
        match self.sink.lock().as_ref() {
            Some(tx) => tx.send(raw).is_ok(),
            None => false,
        }
    }

    pub fn is_installed(&self) -> bool {
        *self.installed.lock()
    }
}

impl InputMonitor for ScriptedMonitor {
    fn install(&mut self, sink: Sender<RawInput>) -> Result<(), EngineError> {
        if self.deny {
            return Err(EngineError::AccessDenied);
        }
        *self.sink.lock() = Some(sink);
        *self.installed.lock() = true;
        Ok(())
    }

    fn pump(&mut self, timeout: Duration) -> bool {
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        true
    }

    fn uninstall(&mut self) {
        *self.sink.lock() = None;
        *self.installed.lock() = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayCall {
    Open,
    Present(AnimationState),
    Visible(bool),
    Close,
}

#[derive(Clone, Default)]
pub struct RecordingOverlay {
    pub calls: Arc<Mutex<Vec<OverlayCall>>>,
}

impl RecordingOverlay {
    pub fn calls(&self) -> Vec<OverlayCall> {
        self.calls.lock().clone()
    }

    pub fn presented(&self) -> Vec<AnimationState> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                OverlayCall::Present(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl Overlay for RecordingOverlay {
    fn open(&mut self) -> Result<(), EngineError> {
        self.calls.lock().push(OverlayCall::Open);
        Ok(())
    }

    fn present(&mut self, frame: &FrameView<'_>) -> Result<(), EngineError> {
        self.calls.lock().push(OverlayCall::Present(frame.state));
        Ok(())
    }

    fn set_visible(&mut self, visible: bool) -> Result<(), EngineError> {
        self.calls.lock().push(OverlayCall::Visible(visible));
        Ok(())
    }

    fn close(&mut self) {
        self.calls.lock().push(OverlayCall::Close);
    }
}

#[derive(Default)]
pub struct StatusLog {
    pub statuses: Mutex<Vec<EngineStatus>>,
    pub visibility: Mutex<Vec<bool>>,
}

impl StatusSink for StatusLog {
    fn report_status(&self, status: EngineStatus) {
        self.statuses.lock().push(status);
    }

    fn report_visibility(&self, visible: bool) {
        self.visibility.lock().push(visible);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Install(String),
    Rebuild,
    Checked(TrayAction, bool),
    Tooltip(String),
    Notify(String, String),
    Remove,
}

/// Tray backend driven by a queue of clicks.
#[derive(Clone, Default)]
pub struct FakeBackend {
    pub calls: Arc<Mutex<Vec<BackendCall>>>,
    pub clicks: Arc<Mutex<Vec<TrayAction>>>,
}

impl FakeBackend {
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub fn click(&self, action: TrayAction) {
        self.clicks.lock().push(action);
    }
}

impl TrayBackend for FakeBackend {
    fn install(&mut self, _model: &TrayMenuModel, tooltip: &str) -> anyhow::Result<()> {
        self.calls.lock().push(BackendCall::Install(tooltip.to_string()));
        Ok(())
    }

    fn rebuild(&mut self, _model: &TrayMenuModel) -> anyhow::Result<()> {
        self.calls.lock().push(BackendCall::Rebuild);
        Ok(())
    }

    fn set_checked(&mut self, action: &TrayAction, checked: bool) -> anyhow::Result<()> {
        self.calls
            .lock()
            .push(BackendCall::Checked(action.clone(), checked));
        Ok(())
    }

    fn set_tooltip(&mut self, tooltip: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .push(BackendCall::Tooltip(tooltip.to_string()));
        Ok(())
    }

    fn notify(&mut self, title: &str, body: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .push(BackendCall::Notify(title.to_string(), body.to_string()));
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Vec<TrayAction> {
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        std::mem::take(&mut *self.clicks.lock())
    }

    fn remove(&mut self) {
        self.calls.lock().push(BackendCall::Remove);
    }
}

#[derive(Default)]
pub struct CountingHandler {
    pub exits: AtomicUsize,
    pub settings: AtomicUsize,
    pub abouts: AtomicUsize,
}

impl TrayHandler for CountingHandler {
    fn exit(&self) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }

    fn show_settings(&self) {
        self.settings.fetch_add(1, Ordering::SeqCst);
    }

    fn show_about(&self) {
        self.abouts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scheduler stand-in: answers by script prefix and records every call.
#[derive(Default)]
pub struct FakeScheduler {
    pub tasks: Mutex<Vec<(String, String, bool)>>, // (name, folder, enabled)
    pub fail_mutations: Mutex<bool>,
    pub scripts: Mutex<Vec<String>>,
}

impl FakeScheduler {
    pub fn with_task(name: &str, folder: &str) -> Self {
        let s = Self::default();
        s.tasks
            .lock()
            .push((name.to_string(), folder.to_string(), true));
        s
    }

    pub fn enabled(&self, name: &str) -> Option<bool> {
        self.tasks
            .lock()
            .iter()
            .find(|t| t.0 == name)
            .map(|t| t.2)
    }
}

fn quoted_name(script: &str) -> Option<String> {
    let start = script.find("-TaskName '")? + "-TaskName '".len();
    let mut name = String::new();
    let mut chars = script[start..].chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\'' {
            name.push(c);
        } else if chars.peek() == Some(&'\'') {
            chars.next();
            name.push(c);
        } else {
            return Some(name);
        }
    }
    None
}

impl CommandRunner for FakeScheduler {
    fn run(&self, script: &str) -> io::Result<CommandOutput> {
        self.scripts.lock().push(script.to_string());
        let name = quoted_name(script).unwrap_or_default();
        let mut tasks = self.tasks.lock();
        let Some(task) = tasks.iter_mut().find(|t| t.0 == name) else {
            return Ok(CommandOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: format!("No MSFT_ScheduledTask objects found with property 'TaskName' equal to '{}'.", name),
            });
        };

        let ok = |stdout: String| CommandOutput {
            success: true,
            code: Some(0),
            stdout,
            stderr: String::new(),
        };
        if script.starts_with("Get-ScheduledTaskInfo") {
            Ok(ok(format!(
                "\r\nLastRunTime        : 1/1/2024 8:00:00 AM\r\nLastTaskResult     : 0\r\nTaskName           : {}\r\nTaskPath           : {}\r\n\r\n",
                task.0, task.1
            )))
        } else if script.starts_with("Get-ScheduledTask ") {
            let state = if task.2 { "Ready" } else { "Disabled" };
            Ok(ok(format!("\r\nTaskPath : {}\r\nState    : {}\r\n", task.1, state)))
        } else if *self.fail_mutations.lock() {
            Ok(CommandOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: "Access is denied.".to_string(),
            })
        } else if script.starts_with("Enable-ScheduledTask") {
            task.2 = true;
            Ok(ok(String::new()))
        } else if script.starts_with("Disable-ScheduledTask") {
            task.2 = false;
            Ok(ok(String::new()))
        } else {
            Err(io::Error::new(io::ErrorKind::Other, "unexpected script"))
        }
    }
}

/// Poll `f` until it holds or two seconds pass.
pub fn wait_until(mut f: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    f()
}
