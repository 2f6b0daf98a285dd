use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Which paw of the cat an input drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Paw {
    Left,
    Right,
}

impl Paw {
    pub const fn other(self) -> Self {
        match self {
            Paw::Left => Paw::Right,
            Paw::Right => Paw::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

/// Identity of a physical input, used to pair presses with releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    /// Virtual key + scancode + extended flag, as reported by the keyboard hook.
    Key { vk: u16, sc: u16, ext: bool },
    Mouse(MouseButton),
}

impl InputSource {
    pub const fn key(vk: u16, sc: u16, ext: bool) -> Self {
        InputSource::Key { vk, sc, ext }
    }

    pub const fn is_mouse(&self) -> bool {
        matches!(self, InputSource::Mouse(_))
    }
}

/// Raw event produced by the input monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInput {
    pub source: InputSource,
    pub edge: Edge,
    pub t: Instant,
}

impl RawInput {
    pub fn new(source: InputSource, edge: Edge, t: Instant) -> Self {
        Self { source, edge, t }
    }
}

/// Logical press/release of one paw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PawEvent {
    pub paw: Paw,
    pub edge: Edge,
    pub source: InputSource,
    pub t: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnimationState {
    #[default]
    Idle,
    LeftDown,
    RightDown,
    BothDown,
}

impl AnimationState {
    pub const ALL: [AnimationState; 4] = [
        AnimationState::Idle,
        AnimationState::LeftDown,
        AnimationState::RightDown,
        AnimationState::BothDown,
    ];

    pub const fn from_paws(left: bool, right: bool) -> Self {
        match (left, right) {
            (false, false) => AnimationState::Idle,
            (true, false) => AnimationState::LeftDown,
            (false, true) => AnimationState::RightDown,
            (true, true) => AnimationState::BothDown,
        }
    }

    pub const fn left_down(self) -> bool {
        matches!(self, AnimationState::LeftDown | AnimationState::BothDown)
    }

    pub const fn right_down(self) -> bool {
        matches!(self, AnimationState::RightDown | AnimationState::BothDown)
    }

    /// Frame file stem used by skins.
    pub const fn frame_name(self) -> &'static str {
        match self {
            AnimationState::Idle => "idle",
            AnimationState::LeftDown => "left",
            AnimationState::RightDown => "right",
            AnimationState::BothDown => "both",
        }
    }
}

/// Status pushed from the engine to the tray icon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineStatus {
    Idle,
    Typing { wpm: f64 },
    Paused,
}

impl EngineStatus {
    pub fn tooltip(&self, show_wpm: bool) -> String {
        match self {
            EngineStatus::Idle => "Bongo Cat - Idle".to_string(),
            EngineStatus::Typing { wpm } if show_wpm => {
                format!("Bongo Cat - Typing ({:.0} WPM)", wpm)
            }
            EngineStatus::Typing { .. } => "Bongo Cat - Typing".to_string(),
            EngineStatus::Paused => "Bongo Cat - Paused".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_paws() {
        assert_eq!(AnimationState::from_paws(false, false), AnimationState::Idle);
        assert_eq!(AnimationState::from_paws(true, false), AnimationState::LeftDown);
        assert_eq!(AnimationState::from_paws(false, true), AnimationState::RightDown);
        assert_eq!(AnimationState::from_paws(true, true), AnimationState::BothDown);
        for s in AnimationState::ALL {
            assert_eq!(AnimationState::from_paws(s.left_down(), s.right_down()), s);
        }
    }

    #[test]
    fn test_tooltip() {
        assert_eq!(EngineStatus::Idle.tooltip(true), "Bongo Cat - Idle");
        assert_eq!(
            EngineStatus::Typing { wpm: 61.6 }.tooltip(true),
            "Bongo Cat - Typing (62 WPM)"
        );
        assert_eq!(
            EngineStatus::Typing { wpm: 61.6 }.tooltip(false),
            "Bongo Cat - Typing"
        );
    }
}
