use anyhow::Context;
use bongo_core::tray::{
    BackendFactory, ItemKind, MenuItemSpec, MenuNode, TrayAction, TrayBackend, TrayMenuModel,
};
use notify_rust::Notification;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use tray_icon::menu::{
    CheckMenuItem, IsMenuItem, Menu, MenuEvent, MenuId, MenuItem, PredefinedMenuItem, Submenu,
};
use tray_icon::{Icon, MouseButton, TrayIcon, TrayIconBuilder, TrayIconEvent};
use windows::Win32::Foundation::FALSE;
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, MsgWaitForMultipleObjects, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
    QS_ALLINPUT,
};

const ICON_SIZE: u32 = 32;

/// Notification-area icon built on `tray-icon`. Must stay on the thread
/// that created it; that thread's message queue is pumped in `poll`.
pub struct TrayIconBackend {
    icon_dirs: Vec<PathBuf>,
    icon: Option<TrayIcon>,
    actions: HashMap<MenuId, TrayAction>,
    checks: HashMap<TrayAction, CheckMenuItem>,
}

/// `icon_dirs` are searched for a custom `tray_icon.*`.
pub fn factory(icon_dirs: Vec<PathBuf>) -> BackendFactory {
    Box::new(move || {
        Ok::<Box<dyn TrayBackend>, anyhow::Error>(Box::new(TrayIconBackend::new(icon_dirs)))
    })
}

impl TrayIconBackend {
    pub fn new(icon_dirs: Vec<PathBuf>) -> Self {
        Self {
            icon_dirs,
            icon: None,
            actions: HashMap::new(),
            checks: HashMap::new(),
        }
    }

    fn build_menu(&mut self, model: &TrayMenuModel) -> anyhow::Result<Menu> {
        self.actions.clear();
        self.checks.clear();
        let menu = Menu::new();
        for node in &model.items {
            match node {
                MenuNode::Item(spec) => menu.append(self.make_item(spec).as_ref())?,
                MenuNode::Separator => menu.append(&PredefinedMenuItem::separator())?,
                MenuNode::Submenu { label, items } => {
                    let sub = Submenu::new(label, true);
                    for child in items {
                        match child {
                            MenuNode::Item(spec) => sub.append(self.make_item(spec).as_ref())?,
                            MenuNode::Separator => sub.append(&PredefinedMenuItem::separator())?,
                            MenuNode::Submenu { label, .. } => {
                                warn!("Nested submenu '{}' not supported", label)
                            }
                        }
                    }
                    menu.append(&sub)?;
                }
            }
        }
        Ok(menu)
    }

    fn make_item(&mut self, spec: &MenuItemSpec) -> Box<dyn IsMenuItem> {
        match spec.kind {
            ItemKind::Check(on) => {
                let check = CheckMenuItem::new(&spec.label, true, on, None);
                self.actions.insert(check.id().clone(), spec.action.clone());
                self.checks.insert(spec.action.clone(), check.clone());
                Box::new(check)
            }
            ItemKind::Normal | ItemKind::Disabled => {
                let enabled = spec.kind == ItemKind::Normal;
                let plain = MenuItem::new(&spec.label, enabled, None);
                self.actions.insert(plain.id().clone(), spec.action.clone());
                Box::new(plain)
            }
        }
    }

    fn icon(&self) -> anyhow::Result<&TrayIcon> {
        self.icon.as_ref().context("tray icon is not installed")
    }
}

fn pump_messages(timeout: Duration) {
    let millis = timeout.as_millis().min(u32::MAX as u128) as u32;
    let mut msg = MSG::default();
    unsafe {
        let _ = MsgWaitForMultipleObjects(None, FALSE, millis, QS_ALLINPUT);
        while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

impl TrayBackend for TrayIconBackend {
    fn install(&mut self, model: &TrayMenuModel, tooltip: &str) -> anyhow::Result<()> {
        let image = bongo_core::skin::load_tray_icon(&self.icon_dirs, ICON_SIZE);
        let (width, height) = image.dimensions();
        let icon = Icon::from_rgba(image.into_raw(), width, height)
            .context("invalid tray icon image")?;
        let menu = self.build_menu(model)?;
        let tray = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip(tooltip)
            .with_icon(icon)
            .build()
            .context("failed to create tray icon")?;
        self.icon = Some(tray);
        Ok(())
    }

    fn rebuild(&mut self, model: &TrayMenuModel) -> anyhow::Result<()> {
        debug!("Rebuilding tray menu");
        let menu = self.build_menu(model)?;
        self.icon()?.set_menu(Some(Box::new(menu)));
        Ok(())
    }

    fn set_checked(&mut self, action: &TrayAction, checked: bool) -> anyhow::Result<()> {
        match self.checks.get(action) {
            Some(item) => item.set_checked(checked),
            None => debug!("No check item for {:?}", action),
        }
        Ok(())
    }

    fn set_tooltip(&mut self, tooltip: &str) -> anyhow::Result<()> {
        self.icon()?.set_tooltip(Some(tooltip))?;
        Ok(())
    }

    fn notify(&mut self, title: &str, body: &str) -> anyhow::Result<()> {
        Notification::new()
            .summary(title)
            .body(body)
            .show()
            .map_err(|e| anyhow::anyhow!("failed to show notification: {}", e))?;
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Vec<TrayAction> {
        pump_messages(timeout);

        let mut actions: Vec<TrayAction> = MenuEvent::receiver()
            .try_iter()
            .filter_map(|event| self.actions.get(&event.id).cloned())
            .collect();
        for event in TrayIconEvent::receiver().try_iter() {
            if let TrayIconEvent::DoubleClick {
                button: MouseButton::Left,
                ..
            } = event
            {
                actions.push(TrayAction::ToggleOverlay);
            }
        }
        actions
    }

    fn remove(&mut self) {
        // Dropping the icon removes it from the notification area.
        self.icon = None;
        self.actions.clear();
        self.checks.clear();
    }
}
