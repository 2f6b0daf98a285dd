use crate::config::{keys, ConfigStore, SettingValue, Settings};
use crate::engine::{AnimationEngine, StatusSink};
use crate::skin::SkinLibrary;
use crate::types::EngineStatus;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);
pub const OPACITY_STEPS: [u8; 4] = [100, 75, 50, 25];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrayAction {
    About,
    ShowSettings,
    ReloadSettings,
    ResetDefaults,
    SelectSkin(String),
    SetOpacity(u8),
    ToggleMouse,
    ToggleOverlay,
    TogglePause,
    ToggleAutostart,
    ToggleNotifications,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Normal,
    Check(bool),
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItemSpec {
    pub action: TrayAction,
    pub label: String,
    pub kind: ItemKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuNode {
    Item(MenuItemSpec),
    Separator,
    Submenu { label: String, items: Vec<MenuNode> },
}

fn item(action: TrayAction, label: impl Into<String>, kind: ItemKind) -> MenuNode {
    MenuNode::Item(MenuItemSpec {
        action,
        label: label.into(),
        kind,
    })
}

/// What the menu shows that is not stored in the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeFlags {
    pub paused: bool,
    pub visible: bool,
}

impl Default for RuntimeFlags {
    fn default() -> Self {
        Self {
            paused: false,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayMenuModel {
    pub items: Vec<MenuNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuUpdate {
    /// Same structure; only these checkmarks changed.
    Checks(Vec<(TrayAction, bool)>),
    Rebuild(TrayMenuModel),
}

/// Shape of a node with check states erased.
#[derive(Debug, PartialEq, Eq)]
enum Shape<'a> {
    Item(&'a TrayAction, &'a str, u8),
    Separator,
    Submenu(&'a str, usize),
}

impl TrayMenuModel {
    pub fn build(settings: &Settings, skins: &[String], flags: RuntimeFlags) -> Self {
        let check = ItemKind::Check;

        let skin_items = skins
            .iter()
            .map(|name| {
                item(
                    TrayAction::SelectSkin(name.clone()),
                    name.clone(),
                    check(*name == settings.display.skin),
                )
            })
            .collect();
        let opacity_items = OPACITY_STEPS
            .iter()
            .map(|&pct| {
                let selected = (settings.display.opacity - pct as f64 / 100.0).abs() < 1e-3;
                item(TrayAction::SetOpacity(pct), format!("{}%", pct), check(selected))
            })
            .collect();

        Self {
            items: vec![
                item(TrayAction::About, crate::app_title(), ItemKind::Normal),
                MenuNode::Separator,
                item(TrayAction::ShowSettings, "Settings…", ItemKind::Normal),
                item(TrayAction::ReloadSettings, "Reload settings", ItemKind::Normal),
                item(TrayAction::ResetDefaults, "Reset to defaults", ItemKind::Normal),
                MenuNode::Submenu {
                    label: "Skin".into(),
                    items: skin_items,
                },
                MenuNode::Submenu {
                    label: "Opacity".into(),
                    items: opacity_items,
                },
                MenuNode::Separator,
                item(
                    TrayAction::ToggleMouse,
                    "Track mouse",
                    check(settings.behavior.track_mouse),
                ),
                item(TrayAction::ToggleOverlay, "Show cat", check(flags.visible)),
                item(TrayAction::TogglePause, "Pause", check(flags.paused)),
                item(
                    TrayAction::ToggleAutostart,
                    "Start with Windows",
                    check(settings.startup.start_with_windows),
                ),
                item(
                    TrayAction::ToggleNotifications,
                    "Show notifications",
                    check(settings.startup.show_notifications),
                ),
                MenuNode::Separator,
                item(TrayAction::Exit, "Exit", ItemKind::Normal),
            ],
        }
    }

    /// Every check item with its state, depth first.
    pub fn checks(&self) -> Vec<(TrayAction, bool)> {
        fn walk(nodes: &[MenuNode], out: &mut Vec<(TrayAction, bool)>) {
            for node in nodes {
                match node {
                    MenuNode::Item(MenuItemSpec {
                        action,
                        kind: ItemKind::Check(on),
                        ..
                    }) => out.push((action.clone(), *on)),
                    MenuNode::Submenu { items, .. } => walk(items, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.items, &mut out);
        out
    }

    pub fn find(&self, action: &TrayAction) -> Option<&MenuItemSpec> {
        fn walk<'a>(nodes: &'a [MenuNode], action: &TrayAction) -> Option<&'a MenuItemSpec> {
            nodes.iter().find_map(|node| match node {
                MenuNode::Item(spec) if spec.action == *action => Some(spec),
                MenuNode::Submenu { items, .. } => walk(items, action),
                _ => None,
            })
        }
        walk(&self.items, action)
    }

    fn shape(&self) -> Vec<Shape<'_>> {
        fn walk<'a>(nodes: &'a [MenuNode], out: &mut Vec<Shape<'a>>) {
            for node in nodes {
                match node {
                    MenuNode::Item(spec) => {
                        let kind = match spec.kind {
                            ItemKind::Normal => 0,
                            ItemKind::Check(_) => 1,
                            ItemKind::Disabled => 2,
                        };
                        out.push(Shape::Item(&spec.action, &spec.label, kind));
                    }
                    MenuNode::Separator => out.push(Shape::Separator),
                    MenuNode::Submenu { label, items } => {
                        out.push(Shape::Submenu(label, items.len()));
                        walk(items, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.items, &mut out);
        out
    }

    /// Minimal update turning `self` into `next`, or `None` if equal.
    pub fn diff(&self, next: &TrayMenuModel) -> Option<MenuUpdate> {
        if self == next {
            return None;
        }
        if self.shape() != next.shape() {
            return Some(MenuUpdate::Rebuild(next.clone()));
        }
        let changed: Vec<_> = self
            .checks()
            .into_iter()
            .zip(next.checks())
            .filter(|(old, new)| old.1 != new.1)
            .map(|(_, new)| new)
            .collect();
        Some(MenuUpdate::Checks(changed))
    }
}

/// OS tray icon. Created and used only on the tray thread.
pub trait TrayBackend {
    fn install(&mut self, model: &TrayMenuModel, tooltip: &str) -> anyhow::Result<()>;
    fn rebuild(&mut self, model: &TrayMenuModel) -> anyhow::Result<()>;
    fn set_checked(&mut self, action: &TrayAction, checked: bool) -> anyhow::Result<()>;
    fn set_tooltip(&mut self, tooltip: &str) -> anyhow::Result<()>;
    /// Show a desktop notification from the app.
    fn notify(&mut self, title: &str, body: &str) -> anyhow::Result<()>;
    /// Wait up to `timeout` for menu clicks.
    fn poll(&mut self, timeout: Duration) -> Vec<TrayAction>;
    fn remove(&mut self);
}

pub type BackendFactory = Box<dyn FnOnce() -> anyhow::Result<Box<dyn TrayBackend>> + Send>;

/// Application-level reactions to menu items.
pub trait TrayHandler: Send + Sync {
    fn exit(&self);
    fn show_settings(&self);
    fn show_about(&self);
}

#[derive(Debug)]
enum TrayCommand {
    Checks(Vec<(TrayAction, bool)>),
    Rebuild(TrayMenuModel),
    Tooltip(String),
    Notify { title: String, body: String },
    Stop,
}

struct TrayState {
    model: TrayMenuModel,
    skins: Vec<String>,
    flags: RuntimeFlags,
    show_wpm: bool,
    tooltip: String,
}

/// Owns the tray icon thread and keeps the menu in sync with config and
/// engine state.
pub struct TrayController {
    config: Arc<ConfigStore>,
    engine: Arc<AnimationEngine>,
    skins: SkinLibrary,
    handler: Arc<dyn TrayHandler>,
    state: Mutex<TrayState>,
    cmd_tx: Sender<TrayCommand>,
    cmd_rx: Receiver<TrayCommand>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
    thread: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl TrayController {
    pub fn new(
        config: Arc<ConfigStore>,
        engine: Arc<AnimationEngine>,
        skins: SkinLibrary,
        handler: Arc<dyn TrayHandler>,
    ) -> Self {
        let settings = config.snapshot();
        let skin_names = skins.available();
        let flags = RuntimeFlags::default();
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        Self {
            state: Mutex::new(TrayState {
                model: TrayMenuModel::build(&settings, &skin_names, flags),
                skins: skin_names,
                flags,
                show_wpm: settings.display.show_wpm,
                tooltip: EngineStatus::Idle.tooltip(settings.display.show_wpm),
            }),
            config,
            engine,
            skins,
            handler,
            cmd_tx,
            cmd_rx,
            done_tx,
            done_rx,
            thread: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn model(&self) -> TrayMenuModel {
        self.state.lock().model.clone()
    }

    pub fn tooltip(&self) -> String {
        self.state.lock().tooltip.clone()
    }

    pub fn is_started(&self) -> bool {
        self.thread.lock().is_some()
    }

    /// Spawn the tray thread. The backend is created on that thread.
    pub fn start_detached(self: &Arc<Self>, factory: BackendFactory) -> anyhow::Result<()> {
        let mut thread = self.thread.lock();
        if self.stopped.load(Ordering::SeqCst) {
            debug!("Tray already stopped; not starting");
            return Ok(());
        }
        if thread.is_some() {
            anyhow::bail!("tray icon thread already started");
        }
        let me = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("tray".into())
            .spawn(move || me.run(factory))?;
        *thread = Some(handle);
        Ok(())
    }

    /// Ask the tray thread to exit and wait for it (bounded). Safe to call
    /// any number of times, before start, and from the tray thread itself.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(handle) = self.thread.lock().take() else {
            debug!("Tray stop before start");
            return;
        };
        let _ = self.cmd_tx.send(TrayCommand::Stop);

        if handle.thread().id() == thread::current().id() {
            // Called from a menu action; the loop exits after this returns.
            return;
        }
        match self.done_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(()) => {
                if handle.join().is_err() {
                    warn!("Tray thread panicked");
                }
            }
            Err(_) => warn!("Tray thread did not stop within {:?}", STOP_TIMEOUT),
        }
    }

    /// Config subscriber: push menu changes to the tray thread.
    pub fn on_config_change(&self, key: &str, value: &SettingValue) {
        let mut state = self.state.lock();
        if key == keys::SHOW_WPM {
            if let Some(b) = value.as_bool() {
                state.show_wpm = b;
            }
        }
        self.refresh(&mut state);
    }

    fn refresh(&self, state: &mut TrayState) {
        let next = TrayMenuModel::build(&self.config.snapshot(), &state.skins, state.flags);
        if let Some(update) = state.model.diff(&next) {
            state.model = next;
            let cmd = match update {
                MenuUpdate::Checks(c) => TrayCommand::Checks(c),
                MenuUpdate::Rebuild(m) => TrayCommand::Rebuild(m),
            };
            let _ = self.cmd_tx.send(cmd);
        }
    }

    fn set_flags(&self, f: impl FnOnce(&mut RuntimeFlags)) {
        let mut state = self.state.lock();
        let before = state.flags;
        f(&mut state.flags);
        if state.flags != before {
            self.refresh(&mut state);
        }
    }

    fn run(&self, factory: BackendFactory) {
        let mut backend = match factory() {
            Ok(b) => b,
            Err(e) => {
                error!("Tray icon unavailable: {:#}", e);
                let _ = self.done_tx.send(());
                return;
            }
        };
        let (model, tooltip) = {
            let state = self.state.lock();
            (state.model.clone(), state.tooltip.clone())
        };
        if let Err(e) = backend.install(&model, &tooltip) {
            error!("Failed to install tray icon: {:#}", e);
            let _ = self.done_tx.send(());
            return;
        }
        info!("Tray icon running");
        self.show_notification(
            "Bongo Cat",
            "Started successfully! Right-click the tray icon for options.",
        );

        'outer: loop {
            if self.stopped.load(Ordering::SeqCst) && self.cmd_rx.is_empty() {
                break;
            }
            let actions = backend.poll(POLL_INTERVAL);
            if !actions.is_empty() {
                for action in &actions {
                    self.dispatch(action);
                }
                // Check items toggle themselves when clicked; put them back
                // to what the model says until state catches up.
                let checks = self.state.lock().model.checks();
                for (action, on) in checks {
                    let _ = backend.set_checked(&action, on);
                }
            }
            for cmd in self.cmd_rx.try_iter() {
                let result = match cmd {
                    TrayCommand::Checks(checks) => checks
                        .iter()
                        .try_for_each(|(a, on)| backend.set_checked(a, *on)),
                    TrayCommand::Rebuild(model) => backend.rebuild(&model),
                    TrayCommand::Tooltip(text) => backend.set_tooltip(&text),
                    TrayCommand::Notify { title, body } => backend.notify(&title, &body),
                    TrayCommand::Stop => break 'outer,
                };
                if let Err(e) = result {
                    warn!("Tray update failed: {:#}", e);
                }
            }
        }

        backend.remove();
        info!("Tray icon removed");
        let _ = self.done_tx.send(());
    }

    /// Handle one menu click.
    pub fn dispatch(&self, action: &TrayAction) {
        debug!("Tray action {:?}", action);
        let settings = self.config.snapshot();
        match action {
            TrayAction::About => self.handler.show_about(),
            TrayAction::ShowSettings => self.handler.show_settings(),
            TrayAction::ReloadSettings => {
                {
                    let mut state = self.state.lock();
                    state.skins = self.skins.available();
                }
                match self.config.reload() {
                    Ok(changed) => debug!("Reload changed {:?}", changed),
                    Err(e) => warn!("Reload failed, keeping current settings: {}", e),
                }
                let mut state = self.state.lock();
                self.refresh(&mut state);
            }
            TrayAction::ResetDefaults => {
                let changed = self.config.reset_to_defaults();
                info!("Settings reset to defaults ({} changes)", changed.len());
                self.show_notification("Bongo Cat", "Settings reset to defaults");
            }
            TrayAction::SelectSkin(name) => {
                self.set(keys::SKIN, name.as_str());
            }
            TrayAction::SetOpacity(pct) => {
                self.set(keys::OPACITY, *pct as f64 / 100.0);
            }
            TrayAction::ToggleMouse => {
                self.set(keys::TRACK_MOUSE, !settings.behavior.track_mouse);
            }
            TrayAction::ToggleOverlay => self.engine.toggle_visibility(),
            TrayAction::TogglePause => self.engine.toggle_pause(),
            TrayAction::ToggleAutostart => {
                let enable = !settings.startup.start_with_windows;
                if self.set(keys::START_WITH_WINDOWS, enable) {
                    self.show_notification(
                        "Startup Setting",
                        &format!("Start with Windows {}", enabled_word(enable)),
                    );
                }
            }
            TrayAction::ToggleNotifications => {
                let enable = !settings.startup.show_notifications;
                if self.set(keys::SHOW_NOTIFICATIONS, enable) {
                    // Only visible when turning them on.
                    self.show_notification(
                        "Notifications",
                        &format!("Notifications {}", enabled_word(enable)),
                    );
                }
            }
            TrayAction::Exit => self.handler.exit(),
        }
    }

    /// Queue a notification unless the user turned them off.
    pub fn show_notification(&self, title: &str, body: &str) {
        if !self.config.snapshot().startup.show_notifications {
            debug!("Notification suppressed: {}", title);
            return;
        }
        let _ = self.cmd_tx.send(TrayCommand::Notify {
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    /// Returns whether the value was accepted.
    fn set(&self, key: &str, value: impl Into<SettingValue>) -> bool {
        match self.config.set(key, value) {
            Ok(_) => true,
            Err(e) => {
                warn!("Could not change {}: {}", key, e);
                false
            }
        }
    }
}

fn enabled_word(on: bool) -> &'static str {
    if on {
        "enabled"
    } else {
        "disabled"
    }
}

impl StatusSink for TrayController {
    fn report_status(&self, status: EngineStatus) {
        let paused = matches!(status, EngineStatus::Paused);
        self.set_flags(|f| f.paused = paused);

        let mut state = self.state.lock();
        let tooltip = status.tooltip(state.show_wpm);
        if tooltip != state.tooltip {
            state.tooltip = tooltip.clone();
            let _ = self.cmd_tx.send(TrayCommand::Tooltip(tooltip));
        }
    }

    fn report_visibility(&self, visible: bool) {
        self.set_flags(|f| f.visible = visible);
    }
}
