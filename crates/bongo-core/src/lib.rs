pub mod animation;
pub mod config;
pub mod engine;
pub mod hotkey;
pub mod paws;
pub mod skin;
pub mod task;
pub mod tray;
pub mod types;
pub mod wpm;

#[cfg(windows)]
pub mod input_hook;
#[cfg(windows)]
pub mod overlay_window;

pub use config::{ConfigStore, SettingValue, Settings, CONFIG_VERSION};
pub use engine::{AnimationEngine, EngineError};
pub use task::{ScheduledTask, TaskError};
pub use tray::{TrayAction, TrayController};
pub use types::{AnimationState, EngineStatus, Paw};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "Bongo Cat Typing Monitor";
pub const DESCRIPTION: &str = "An animated cat that types along with your keyboard and mouse";

pub fn app_title() -> String {
    format!("{} v{}", APP_NAME, VERSION)
}
