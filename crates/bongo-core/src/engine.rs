use crate::animation::{Animator, Transition};
use crate::config::{keys, ConfigStore, SettingValue, Settings};
use crate::hotkey::{self, HotkeyAction, HotkeyMatcher};
use crate::paws::PawMapper;
use crate::skin::{Skin, SkinLibrary};
use crate::types::{AnimationState, Edge, EngineStatus, InputSource, RawInput};
use crate::wpm::WpmMeter;
use crossbeam_channel::{Receiver, Sender};
use image::RgbaImage;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const STATUS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The OS refused the global hook; the process needs elevation.
    #[error("access denied while installing the input hook")]
    AccessDenied,
    #[error("input hook failed: {0}")]
    Hook(String),
    #[error("overlay window failed: {0}")]
    Overlay(String),
    #[error("the animation loop is already running")]
    AlreadyRunning,
}

/// Source of global input events. Lives on the loop thread.
pub trait InputMonitor: Send {
    fn install(&mut self, sink: Sender<RawInput>) -> Result<(), EngineError>;
    /// Process pending OS messages, waiting at most `timeout` for one.
    /// Returns `false` once the OS has asked the loop to quit.
    fn pump(&mut self, timeout: Duration) -> bool;
    fn uninstall(&mut self);
}

/// Frame handed to the overlay.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub state: AnimationState,
    pub image: &'a RgbaImage,
    pub opacity: f64,
    pub x: i32,
    pub y: i32,
}

/// Always-on-top surface the cat is drawn on. Lives on the loop thread.
pub trait Overlay: Send {
    fn open(&mut self) -> Result<(), EngineError>;
    fn present(&mut self, frame: &FrameView<'_>) -> Result<(), EngineError>;
    fn set_visible(&mut self, visible: bool) -> Result<(), EngineError>;
    fn close(&mut self);
}

/// Receives engine status (the tray tooltip).
pub trait StatusSink: Send + Sync {
    fn report_status(&self, status: EngineStatus);
    fn report_visibility(&self, _visible: bool) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Setting(String, SettingValue),
    ToggleVisibility,
    TogglePause,
}

/// Loop-thread state: input mapping, animation, hotkeys and redraw tracking.
pub struct EngineCore {
    mapper: PawMapper,
    animator: Animator,
    wpm: WpmMeter,
    hotkeys: HotkeyMatcher,
    paused: bool,
    visible: bool,
    opacity: f64,
    scale: f64,
    position: (i32, i32),
    tick: Duration,
    base_skin: Skin,
    skin: Skin,
    last_press: Option<Instant>,
    dirty: bool,
    visibility_changed: bool,
    last_status: Option<(EngineStatus, Instant)>,
}

fn tick_for_fps(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

fn same_kind(a: &EngineStatus, b: &EngineStatus) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

impl EngineCore {
    pub fn new(settings: &Settings, skin: Skin, now: Instant) -> Self {
        let mut hotkeys = HotkeyMatcher::new();
        bind_hotkey(&mut hotkeys, HotkeyAction::ToggleOverlay, &settings.hotkeys.toggle_overlay);
        bind_hotkey(&mut hotkeys, HotkeyAction::TogglePause, &settings.hotkeys.toggle_pause);

        let scale = settings.display.scale;
        Self {
            mapper: PawMapper::new(settings.behavior.paw_mode, settings.behavior.track_mouse),
            animator: Animator::new(
                Duration::from_secs_f64(settings.behavior.idle_timeout_seconds),
                now,
            ),
            wpm: WpmMeter::default(),
            hotkeys,
            paused: false,
            visible: true,
            opacity: settings.display.opacity,
            scale,
            position: (settings.display.position_x, settings.display.position_y),
            tick: tick_for_fps(settings.behavior.fps),
            skin: skin.scaled(scale),
            base_skin: skin,
            last_press: None,
            dirty: true,
            visibility_changed: false,
            last_status: None,
        }
    }

    pub fn state(&self) -> AnimationState {
        self.animator.state()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick
    }

    pub fn skin(&self) -> &Skin {
        &self.skin
    }

    pub fn handle_input(&mut self, raw: &RawInput) -> Option<Transition> {
        if let Some(action) = self.hotkeys.feed(raw) {
            debug!("Hotkey {:?}", action);
            match action {
                HotkeyAction::ToggleOverlay => self.toggle_visibility(),
                // The hotkey's own modifiers are still held; keep them.
                HotkeyAction::TogglePause => self.apply_pause(!self.paused, raw.t),
            }
            return None;
        }
        if self.paused {
            return None;
        }

        let Some(ev) = self.mapper.map(raw) else {
            if raw.edge == Edge::Down {
                self.animator.touch(raw.t);
            }
            return None;
        };
        if ev.edge == Edge::Down {
            self.wpm.record(ev.t);
            self.last_press = Some(ev.t);
        }
        let tr = self.animator.on_event(&ev);
        if tr.is_some() {
            self.dirty = true;
        }
        tr
    }

    /// Run the inactivity timer.
    pub fn tick(&mut self, now: Instant) -> Option<Transition> {
        let tr = self.animator.tick(now);
        if tr.is_some() {
            self.mapper.clear();
            self.hotkeys.clear();
            self.dirty = true;
        }
        tr
    }

    pub fn toggle_visibility(&mut self) {
        self.visible = !self.visible;
        self.visibility_changed = true;
        if self.visible {
            self.dirty = true;
        }
        info!("Overlay {}", if self.visible { "shown" } else { "hidden" });
    }

    pub fn toggle_pause(&mut self, now: Instant) {
        self.set_paused(!self.paused, now);
    }

    /// Pause or resume from outside the input stream. Modifier state is
    /// dropped too, since key-ups may have been missed meanwhile.
    pub fn set_paused(&mut self, paused: bool, now: Instant) {
        self.hotkeys.clear();
        self.apply_pause(paused, now);
    }

    fn apply_pause(&mut self, paused: bool, now: Instant) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        self.mapper.clear();
        self.wpm.clear();
        self.last_press = None;
        if self.animator.reset(now).is_some() {
            self.dirty = true;
        }
        info!("Input {}", if paused { "paused" } else { "resumed" });
    }

    /// Apply one config change.
    pub fn apply_setting(&mut self, key: &str, value: &SettingValue, skins: &SkinLibrary) {
        match key {
            keys::SKIN => {
                let Some(name) = value.as_str() else { return };
                match skins.load(name) {
                    Ok(skin) => {
                        info!("Switched skin to '{}'", name);
                        self.base_skin = skin;
                        self.rescale();
                    }
                    Err(e) => warn!("Keeping skin '{}': {}", self.base_skin.name(), e),
                }
            }
            keys::SCALE => {
                if let Some(v) = value.as_f64() {
                    self.scale = v;
                    self.rescale();
                }
            }
            keys::OPACITY => {
                if let Some(v) = value.as_f64() {
                    self.opacity = v;
                    self.dirty = true;
                }
            }
            keys::POSITION_X | keys::POSITION_Y => {
                if let Some(v) = value.as_i64().and_then(|v| i32::try_from(v).ok()) {
                    if key == keys::POSITION_X {
                        self.position.0 = v;
                    } else {
                        self.position.1 = v;
                    }
                    self.dirty = true;
                }
            }
            keys::IDLE_TIMEOUT => {
                if let Some(v) = value.as_f64() {
                    self.animator.set_idle_timeout(Duration::from_secs_f64(v));
                }
            }
            keys::PAW_MODE => {
                if let Some(mode) = value.as_str().and_then(|s| s.parse().ok()) {
                    self.mapper.set_mode(mode);
                }
            }
            keys::TRACK_MOUSE => {
                if let Some(b) = value.as_bool() {
                    self.mapper.set_track_mouse(b);
                    if !b
                        && self
                            .animator
                            .release_where(InputSource::is_mouse, Instant::now())
                            .is_some()
                    {
                        self.dirty = true;
                    }
                }
            }
            keys::FPS => {
                if let Some(fps) = value.as_i64().and_then(|v| u32::try_from(v).ok()) {
                    self.tick = tick_for_fps(fps);
                }
            }
            keys::HOTKEY_OVERLAY => {
                if let Some(s) = value.as_str() {
                    bind_hotkey(&mut self.hotkeys, HotkeyAction::ToggleOverlay, s);
                }
            }
            keys::HOTKEY_PAUSE => {
                if let Some(s) = value.as_str() {
                    bind_hotkey(&mut self.hotkeys, HotkeyAction::TogglePause, s);
                }
            }
            _ => {}
        }
    }

    /// Whether the overlay needs a redraw; clears the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty) && self.visible
    }

    pub fn take_visibility_change(&mut self) -> Option<bool> {
        std::mem::take(&mut self.visibility_changed).then_some(self.visible)
    }

    pub fn frame_view(&self) -> FrameView<'_> {
        let state = self.animator.state();
        FrameView {
            state,
            image: self.skin.frame(state),
            opacity: self.opacity,
            x: self.position.0,
            y: self.position.1,
        }
    }

    pub fn status(&mut self, now: Instant) -> EngineStatus {
        if self.paused {
            return EngineStatus::Paused;
        }
        let recent = self
            .last_press
            .is_some_and(|t| now.saturating_duration_since(t) < self.animator.idle_timeout());
        if recent || self.animator.state() != AnimationState::Idle {
            EngineStatus::Typing {
                wpm: self.wpm.wpm(now),
            }
        } else {
            EngineStatus::Idle
        }
    }

    /// Status to report now, if any: on every idle/typing/paused change, and
    /// at most once per second while typing.
    pub fn take_status(&mut self, now: Instant) -> Option<EngineStatus> {
        let status = self.status(now);
        let report = match &self.last_status {
            None => true,
            Some((last, at)) => {
                !same_kind(last, &status)
                    || (matches!(status, EngineStatus::Typing { .. })
                        && now.saturating_duration_since(*at) >= STATUS_INTERVAL)
            }
        };
        if report {
            self.last_status = Some((status, now));
            Some(status)
        } else {
            None
        }
    }

    fn rescale(&mut self) {
        self.skin = self.base_skin.scaled(self.scale);
        self.dirty = true;
    }
}

fn bind_hotkey(matcher: &mut HotkeyMatcher, action: HotkeyAction, text: &str) {
    match hotkey::parse_optional(text) {
        Ok(hk) => matcher.bind(action, hk),
        Err(e) => warn!("Ignoring hotkey for {:?}: {}", action, e),
    }
}

/// Drives the cat: pumps the input monitor, advances the animation at the
/// configured frame rate and redraws the overlay.
///
/// `start_monitoring` blocks the calling thread (the main thread in the
/// application); every other method may be called from any thread.
pub struct AnimationEngine {
    config: Arc<ConfigStore>,
    skins: SkinLibrary,
    monitor: Mutex<Box<dyn InputMonitor>>,
    overlay: Mutex<Box<dyn Overlay>>,
    running: AtomicBool,
    stop: AtomicBool,
    tray: Mutex<Option<Weak<dyn StatusSink>>>,
    cmd_tx: Sender<EngineCommand>,
    cmd_rx: Receiver<EngineCommand>,
}

impl AnimationEngine {
    pub fn new(
        config: Arc<ConfigStore>,
        skins: SkinLibrary,
        monitor: Box<dyn InputMonitor>,
        overlay: Box<dyn Overlay>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            skins,
            monitor: Mutex::new(monitor),
            overlay: Mutex::new(overlay),
            running: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            tray: Mutex::new(None),
            cmd_tx,
            cmd_rx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the loop until [`stop_monitoring`](Self::stop_monitoring) is
    /// called or the OS quits the thread's message loop.
    ///
    /// A stop requested before the loop starts makes this return at once.
    pub fn start_monitoring(&self) -> Result<(), EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        let result = self.run_loop();
        self.stop.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        result
    }

    pub fn stop_monitoring(&self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            info!("Stopping animation engine");
        }
    }

    /// Register where status updates go. Only a weak reference is kept.
    pub fn set_tray_reference<S: StatusSink + 'static>(&self, sink: &Arc<S>) {
        let weak: Weak<S> = Arc::downgrade(sink);
        let weak: Weak<dyn StatusSink> = weak;
        *self.tray.lock() = Some(weak);
    }

    /// Queue a config change for the loop thread.
    pub fn on_config_change(&self, key: &str, value: &SettingValue) {
        self.send(EngineCommand::Setting(key.to_string(), value.clone()));
    }

    pub fn toggle_visibility(&self) {
        self.send(EngineCommand::ToggleVisibility);
    }

    pub fn toggle_pause(&self) {
        self.send(EngineCommand::TogglePause);
    }

    fn send(&self, cmd: EngineCommand) {
        // The receiver lives in `self`, so this cannot fail.
        let _ = self.cmd_tx.send(cmd);
    }

    fn sink(&self) -> Option<Arc<dyn StatusSink>> {
        self.tray.lock().as_ref().and_then(Weak::upgrade)
    }

    fn run_loop(&self) -> Result<(), EngineError> {
        if self.stop.load(Ordering::SeqCst) {
            debug!("Stop requested before the loop started");
            return Ok(());
        }

        let settings = self.config.snapshot();
        let skin = self.skins.load_or_default(&settings.display.skin);
        let mut core = EngineCore::new(&settings, skin, Instant::now());

        let mut monitor = self.monitor.lock();
        let mut overlay = self.overlay.lock();
        let (input_tx, input_rx) = crossbeam_channel::unbounded();

        overlay.open()?;
        if let Err(e) = monitor.install(input_tx) {
            overlay.close();
            return Err(e);
        }
        info!(
            "Animation engine running ({} fps, skin '{}')",
            settings.behavior.fps,
            core.skin().name()
        );

        while !self.stop.load(Ordering::SeqCst) {
            if !monitor.pump(core.tick_interval()) {
                info!("Message loop asked to quit");
                break;
            }

            for raw in input_rx.try_iter() {
                core.handle_input(&raw);
            }
            let now = Instant::now();
            for cmd in self.cmd_rx.try_iter() {
                match cmd {
                    EngineCommand::Setting(key, value) => {
                        core.apply_setting(&key, &value, &self.skins)
                    }
                    EngineCommand::ToggleVisibility => core.toggle_visibility(),
                    EngineCommand::TogglePause => core.toggle_pause(now),
                }
            }
            core.tick(now);

            if let Some(visible) = core.take_visibility_change() {
                if let Err(e) = overlay.set_visible(visible) {
                    warn!("Overlay visibility change failed: {}", e);
                }
                if let Some(sink) = self.sink() {
                    sink.report_visibility(visible);
                }
            }
            if core.take_dirty() {
                if let Err(e) = overlay.present(&core.frame_view()) {
                    warn!("Overlay redraw failed: {}", e);
                }
            }
            if let Some(status) = core.take_status(now) {
                if let Some(sink) = self.sink() {
                    sink.report_status(status);
                }
            }
        }

        monitor.uninstall();
        overlay.close();
        info!("Animation engine stopped");
        Ok(())
    }
}
