use crate::types::{Edge, InputSource, MouseButton, Paw, PawEvent, RawInput};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Scancodes (set 1) on the left half of a standard keyboard.
/// Everything not listed here belongs to the right paw.
pub const LEFT_HALF_SC: &[(u16, bool)] = &[
    (0x01, false), // Esc
    (0x29, false), // `
    (0x02, false), // 1
    (0x03, false), // 2
    (0x04, false), // 3
    (0x05, false), // 4
    (0x06, false), // 5
    (0x0F, false), // Tab
    (0x10, false), // Q
    (0x11, false), // W
    (0x12, false), // E
    (0x13, false), // R
    (0x14, false), // T
    (0x3A, false), // Caps Lock
    (0x1E, false), // A
    (0x1F, false), // S
    (0x20, false), // D
    (0x21, false), // F
    (0x22, false), // G
    (0x2A, false), // Left Shift
    (0x56, false), // ISO \ (left of Z)
    (0x2C, false), // Z
    (0x2D, false), // X
    (0x2E, false), // C
    (0x2F, false), // V
    (0x30, false), // B
    (0x1D, false), // Left Ctrl (Right Ctrl is extended)
    (0x5B, true),  // Left Win
    (0x38, false), // Left Alt (Right Alt is extended)
    (0x3B, false), // F1
    (0x3C, false), // F2
    (0x3D, false), // F3
    (0x3E, false), // F4
    (0x3F, false), // F5
    (0x40, false), // F6
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PawMode {
    /// Left half of the keyboard drives the left paw.
    #[default]
    Split,
    /// Every new press switches paws.
    Alternate,
}

impl PawMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            PawMode::Split => "split",
            PawMode::Alternate => "alternate",
        }
    }
}

impl fmt::Display for PawMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PawMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "split" => Ok(PawMode::Split),
            "alternate" => Ok(PawMode::Alternate),
            other => Err(format!("unknown paw mode '{}'", other)),
        }
    }
}

pub fn key_side(sc: u16, ext: bool) -> Paw {
    if LEFT_HALF_SC.iter().any(|&(s, e)| s == sc && e == ext) {
        Paw::Left
    } else {
        Paw::Right
    }
}

pub fn button_side(button: MouseButton) -> Paw {
    match button {
        MouseButton::Left | MouseButton::X1 | MouseButton::X2 => Paw::Left,
        MouseButton::Right | MouseButton::Middle => Paw::Right,
    }
}

/// Turns raw input into paw events.
///
/// Remembers which paw each held input was assigned to, so a release always
/// lifts the same paw as its press even if the mode changed in between.
#[derive(Debug, Clone)]
pub struct PawMapper {
    mode: PawMode,
    track_mouse: bool,
    next: Paw,
    held: HashMap<InputSource, Paw>,
}

impl Default for PawMapper {
    fn default() -> Self {
        Self::new(PawMode::Split, true)
    }
}

impl PawMapper {
    pub fn new(mode: PawMode, track_mouse: bool) -> Self {
        Self {
            mode,
            track_mouse,
            next: Paw::Left,
            held: HashMap::new(),
        }
    }

    pub fn mode(&self) -> PawMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PawMode) {
        self.mode = mode;
    }

    pub fn set_track_mouse(&mut self, track: bool) {
        self.track_mouse = track;
        if !track {
            self.held.retain(|source, _| !source.is_mouse());
        }
    }

    /// Forget every held input (used when the inactivity timer fires).
    pub fn clear(&mut self) {
        self.held.clear();
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn map(&mut self, raw: &RawInput) -> Option<PawEvent> {
        if raw.source.is_mouse() && !self.track_mouse {
            return None;
        }

        let paw = match raw.edge {
            Edge::Down => {
                if self.held.contains_key(&raw.source) {
                    // Auto-repeat
                    return None;
                }
                let paw = self.assign(&raw.source);
                self.held.insert(raw.source, paw);
                paw
            }
            Edge::Up => self.held.remove(&raw.source)?,
        };

        Some(PawEvent {
            paw,
            edge: raw.edge,
            source: raw.source,
            t: raw.t,
        })
    }

    fn assign(&mut self, source: &InputSource) -> Paw {
        match self.mode {
            PawMode::Split => match *source {
                InputSource::Key { sc, ext, .. } => key_side(sc, ext),
                InputSource::Mouse(button) => button_side(button),
            },
            PawMode::Alternate => {
                let paw = self.next;
                self.next = paw.other();
                paw
            }
        }
    }
}
