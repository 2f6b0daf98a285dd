use crate::types::{Edge, InputSource, RawInput};
use std::fmt;
use std::str::FromStr;

// Virtual-key codes for modifiers (generic, left, right).
const VK_SHIFT: [u16; 3] = [0x10, 0xA0, 0xA1];
const VK_CONTROL: [u16; 3] = [0x11, 0xA2, 0xA3];
const VK_MENU: [u16; 3] = [0x12, 0xA4, 0xA5];
const VK_WIN: [u16; 2] = [0x5B, 0x5C];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub win: bool,
}

impl Modifiers {
    pub const fn none() -> Self {
        Self {
            ctrl: false,
            shift: false,
            alt: false,
            win: false,
        }
    }

    pub const fn is_empty(self) -> bool {
        !(self.ctrl || self.shift || self.alt || self.win)
    }
}

/// A key combination such as `Ctrl+Alt+B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkey {
    pub mods: Modifiers,
    pub vk: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HotkeyParseError {
    #[error("hotkey is empty")]
    Empty,
    #[error("unknown key name '{0}'")]
    UnknownKey(String),
    #[error("hotkey '{0}' has no main key")]
    MissingKey(String),
    #[error("hotkey '{0}' has more than one main key")]
    TooManyKeys(String),
}

fn is_modifier_vk(vk: u16) -> bool {
    VK_SHIFT.contains(&vk) || VK_CONTROL.contains(&vk) || VK_MENU.contains(&vk) || VK_WIN.contains(&vk)
}

pub fn key_name_to_vk(name: &str) -> Option<u16> {
    let upper = name.trim().to_ascii_uppercase();
    let bytes = upper.as_bytes();
    if bytes.len() == 1 {
        let c = bytes[0];
        if c.is_ascii_uppercase() || c.is_ascii_digit() {
            return Some(c as u16);
        }
    }
    if let Some(n) = upper.strip_prefix('F').and_then(|n| n.parse::<u16>().ok()) {
        if (1..=24).contains(&n) {
            return Some(0x70 + n - 1);
        }
    }
    match upper.as_str() {
        "SPACE" => Some(0x20),
        "ENTER" | "RETURN" => Some(0x0D),
        "TAB" => Some(0x09),
        "ESC" | "ESCAPE" => Some(0x1B),
        "BACKSPACE" => Some(0x08),
        "INSERT" | "INS" => Some(0x2D),
        "DELETE" | "DEL" => Some(0x2E),
        "HOME" => Some(0x24),
        "END" => Some(0x23),
        "PAGEUP" | "PGUP" => Some(0x21),
        "PAGEDOWN" | "PGDN" => Some(0x22),
        "UP" => Some(0x26),
        "DOWN" => Some(0x28),
        "LEFT" => Some(0x25),
        "RIGHT" => Some(0x27),
        "PAUSE" => Some(0x13),
        "SCROLLLOCK" => Some(0x91),
        _ => None,
    }
}

pub fn vk_to_key_name(vk: u16) -> Option<String> {
    match vk {
        0x30..=0x39 | 0x41..=0x5A => Some((vk as u8 as char).to_string()),
        0x70..=0x87 => Some(format!("F{}", vk - 0x70 + 1)),
        0x20 => Some("Space".into()),
        0x0D => Some("Enter".into()),
        0x09 => Some("Tab".into()),
        0x1B => Some("Esc".into()),
        0x08 => Some("Backspace".into()),
        0x2D => Some("Insert".into()),
        0x2E => Some("Delete".into()),
        0x24 => Some("Home".into()),
        0x23 => Some("End".into()),
        0x21 => Some("PageUp".into()),
        0x22 => Some("PageDown".into()),
        0x26 => Some("Up".into()),
        0x28 => Some("Down".into()),
        0x25 => Some("Left".into()),
        0x27 => Some("Right".into()),
        0x13 => Some("Pause".into()),
        0x91 => Some("ScrollLock".into()),
        _ => None,
    }
}

impl FromStr for Hotkey {
    type Err = HotkeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(HotkeyParseError::Empty);
        }
        let mut mods = Modifiers::none();
        let mut vk = None;
        for part in s.split('+').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => mods.ctrl = true,
                "shift" => mods.shift = true,
                "alt" => mods.alt = true,
                "win" | "super" | "meta" => mods.win = true,
                _ => {
                    let code = key_name_to_vk(part)
                        .ok_or_else(|| HotkeyParseError::UnknownKey(part.to_string()))?;
                    if vk.replace(code).is_some() {
                        return Err(HotkeyParseError::TooManyKeys(s.to_string()));
                    }
                }
            }
        }
        let vk = vk.ok_or_else(|| HotkeyParseError::MissingKey(s.to_string()))?;
        Ok(Hotkey { mods, vk })
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mods.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.mods.shift {
            f.write_str("Shift+")?;
        }
        if self.mods.alt {
            f.write_str("Alt+")?;
        }
        if self.mods.win {
            f.write_str("Win+")?;
        }
        match vk_to_key_name(self.vk) {
            Some(name) => f.write_str(&name),
            None => write!(f, "0x{:02X}", self.vk),
        }
    }
}

/// Parse an optional hotkey setting; an empty string disables it.
pub fn parse_optional(s: &str) -> Result<Option<Hotkey>, HotkeyParseError> {
    if s.trim().is_empty() {
        Ok(None)
    } else {
        s.parse().map(Some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    ToggleOverlay,
    TogglePause,
}

/// Detects configured hotkeys in the raw key stream.
///
/// Modifier state is tracked from the same stream, so no OS query is needed
/// on the hook thread.
#[derive(Debug, Clone, Default)]
pub struct HotkeyMatcher {
    bindings: Vec<(Hotkey, HotkeyAction)>,
    held_mods: Vec<u16>,
    /// Bound keys that already fired and are not yet released.
    fired: Vec<u16>,
}

impl HotkeyMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, action: HotkeyAction, hotkey: Option<Hotkey>) {
        self.bindings.retain(|(_, a)| *a != action);
        if let Some(hk) = hotkey {
            self.bindings.push((hk, action));
        }
    }

    /// Forget held modifiers and keys, e.g. after key-ups were missed on
    /// the secure desktop.
    pub fn clear(&mut self) {
        self.held_mods.clear();
        self.fired.clear();
    }

    pub fn modifiers(&self) -> Modifiers {
        let held = |set: &[u16]| self.held_mods.iter().any(|vk| set.contains(vk));
        Modifiers {
            ctrl: held(&VK_CONTROL),
            shift: held(&VK_SHIFT),
            alt: held(&VK_MENU),
            win: held(&VK_WIN),
        }
    }

    /// Feed one raw event; returns the action bound to it, if any.
    /// Only the first key-down fires; auto-repeat downs are swallowed until
    /// the key is released.
    pub fn feed(&mut self, raw: &RawInput) -> Option<HotkeyAction> {
        let InputSource::Key { vk, .. } = raw.source else {
            return None;
        };
        if is_modifier_vk(vk) {
            match raw.edge {
                Edge::Down => {
                    if !self.held_mods.contains(&vk) {
                        self.held_mods.push(vk);
                    }
                }
                Edge::Up => self.held_mods.retain(|m| *m != vk),
            }
            return None;
        }
        if raw.edge == Edge::Up {
            self.fired.retain(|k| *k != vk);
            return None;
        }
        if self.fired.contains(&vk) {
            return None;
        }
        let mods = self.modifiers();
        let action = self
            .bindings
            .iter()
            .find(|(hk, _)| hk.vk == vk && hk.mods == mods)
            .map(|(_, action)| *action)?;
        self.fired.push(vk);
        Some(action)
    }
}
