use crate::hotkey;
use crate::paws::PawMode;
use crate::task;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const CONFIG_VERSION: &str = "1.0";
pub const CONFIG_FILE: &str = "config.json";
pub const BACKUP_FILE: &str = "config_backup.json";

/// Dotted setting keys.
pub mod keys {
    pub const VERSION: &str = "version";
    pub const SKIN: &str = "display.skin";
    pub const OPACITY: &str = "display.opacity";
    pub const SCALE: &str = "display.scale";
    pub const POSITION_X: &str = "display.position_x";
    pub const POSITION_Y: &str = "display.position_y";
    pub const SHOW_WPM: &str = "display.show_wpm";
    pub const IDLE_TIMEOUT: &str = "behavior.idle_timeout_seconds";
    pub const PAW_MODE: &str = "behavior.paw_mode";
    pub const TRACK_MOUSE: &str = "behavior.track_mouse";
    pub const FPS: &str = "behavior.fps";
    pub const DEBUG: &str = "behavior.debug";
    pub const HOTKEY_OVERLAY: &str = "hotkeys.toggle_overlay";
    pub const HOTKEY_PAUSE: &str = "hotkeys.toggle_pause";
    pub const START_WITH_WINDOWS: &str = "startup.start_with_windows";
    pub const TASK_NAME: &str = "startup.task_name";
    pub const SHOW_NOTIFICATIONS: &str = "startup.show_notifications";

    pub const ALL: &[&str] = &[
        VERSION,
        SKIN,
        OPACITY,
        SCALE,
        POSITION_X,
        POSITION_Y,
        SHOW_WPM,
        IDLE_TIMEOUT,
        PAW_MODE,
        TRACK_MOUSE,
        FPS,
        DEBUG,
        HOTKEY_OVERLAY,
        HOTKEY_PAUSE,
        START_WITH_WINDOWS,
        TASK_NAME,
        SHOW_NOTIFICATIONS,
    ];
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or writing the settings file failed.
    #[error("config I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The settings file is not valid JSON for the schema.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown setting '{0}'")]
    UnknownKey(String),
    #[error("setting '{key}' expects a {expected} value")]
    TypeMismatch { key: String, expected: &'static str },
    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
    #[error("setting '{0}' is read-only")]
    ReadOnly(String),
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// A single setting value as seen through the dotted-key interface.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SettingValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers are accepted where a float is expected.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SettingValue::Float(f) => Some(*f),
            SettingValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Int(i) => write!(f, "{}", i),
            SettingValue::Float(x) => write!(f, "{}", x),
            SettingValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Int(v)
    }
}

impl From<i32> for SettingValue {
    fn from(v: i32) -> Self {
        SettingValue::Int(v as i64)
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        SettingValue::Float(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::Text(v.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(v: String) -> Self {
        SettingValue::Text(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub skin: String,
    pub opacity: f64,
    pub scale: f64,
    pub position_x: i32,
    pub position_y: i32,
    pub show_wpm: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            skin: "classic".to_string(),
            opacity: 1.0,
            scale: 1.0,
            position_x: 40,
            position_y: 40,
            show_wpm: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorSettings {
    pub idle_timeout_seconds: f64,
    pub paw_mode: PawMode,
    pub track_mouse: bool,
    pub fps: u32,
    pub debug: bool,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: 1.0,
            paw_mode: PawMode::Split,
            track_mouse: true,
            fps: 30,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotkeySettings {
    pub toggle_overlay: String,
    pub toggle_pause: String,
}

impl Default for HotkeySettings {
    fn default() -> Self {
        Self {
            toggle_overlay: "Ctrl+Alt+B".to_string(),
            toggle_pause: "Ctrl+Alt+P".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupSettings {
    pub start_with_windows: bool,
    pub task_name: String,
    /// Desktop notifications from the tray.
    pub show_notifications: bool,
}

impl Default for StartupSettings {
    fn default() -> Self {
        Self {
            start_with_windows: true,
            task_name: "BongoCat".to_string(),
            show_notifications: true,
        }
    }
}

/// Persisted user preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: String,
    pub display: DisplaySettings,
    pub behavior: BehaviorSettings,
    pub hotkeys: HotkeySettings,
    pub startup: StartupSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            display: DisplaySettings::default(),
            behavior: BehaviorSettings::default(),
            hotkeys: HotkeySettings::default(),
            startup: StartupSettings::default(),
        }
    }
}

fn check_range(key: &str, v: f64, lo: f64, hi: f64) -> Result<(), ConfigError> {
    if v.is_finite() && (lo..=hi).contains(&v) {
        Ok(())
    } else {
        Err(invalid(key, format!("{} is outside {}..={}", v, lo, hi)))
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.display.skin.trim().is_empty() {
            return Err(invalid(keys::SKIN, "skin name is empty"));
        }
        check_range(keys::OPACITY, self.display.opacity, 0.1, 1.0)?;
        check_range(keys::SCALE, self.display.scale, 0.25, 4.0)?;
        check_range(keys::IDLE_TIMEOUT, self.behavior.idle_timeout_seconds, 0.1, 10.0)?;
        if !(10..=120).contains(&self.behavior.fps) {
            return Err(invalid(
                keys::FPS,
                format!("{} is outside 10..=120", self.behavior.fps),
            ));
        }
        for (key, value) in [
            (keys::HOTKEY_OVERLAY, &self.hotkeys.toggle_overlay),
            (keys::HOTKEY_PAUSE, &self.hotkeys.toggle_pause),
        ] {
            hotkey::parse_optional(value).map_err(|e| invalid(key, e.to_string()))?;
        }
        if !task::is_valid_task_name(&self.startup.task_name) {
            return Err(invalid(
                keys::TASK_NAME,
                "task name must be non-empty and contain no quotes or control characters",
            ));
        }
        Ok(())
    }

    /// Read a setting by dotted key.
    pub fn get(&self, key: &str) -> Result<SettingValue, ConfigError> {
        let v = match key {
            keys::VERSION => self.version.clone().into(),
            keys::SKIN => self.display.skin.clone().into(),
            keys::OPACITY => self.display.opacity.into(),
            keys::SCALE => self.display.scale.into(),
            keys::POSITION_X => self.display.position_x.into(),
            keys::POSITION_Y => self.display.position_y.into(),
            keys::SHOW_WPM => self.display.show_wpm.into(),
            keys::IDLE_TIMEOUT => self.behavior.idle_timeout_seconds.into(),
            keys::PAW_MODE => self.behavior.paw_mode.as_str().into(),
            keys::TRACK_MOUSE => self.behavior.track_mouse.into(),
            keys::FPS => SettingValue::Int(self.behavior.fps as i64),
            keys::DEBUG => self.behavior.debug.into(),
            keys::HOTKEY_OVERLAY => self.hotkeys.toggle_overlay.clone().into(),
            keys::HOTKEY_PAUSE => self.hotkeys.toggle_pause.clone().into(),
            keys::START_WITH_WINDOWS => self.startup.start_with_windows.into(),
            keys::TASK_NAME => self.startup.task_name.clone().into(),
            keys::SHOW_NOTIFICATIONS => self.startup.show_notifications.into(),
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        };
        Ok(v)
    }

    /// Write a setting by dotted key. Only checks the value's type; call
    /// [`Settings::validate`] for range checks.
    pub fn put(&mut self, key: &str, value: &SettingValue) -> Result<(), ConfigError> {
        let mismatch = |expected| ConfigError::TypeMismatch {
            key: key.to_string(),
            expected,
        };
        let as_bool = || value.as_bool().ok_or_else(|| mismatch("boolean"));
        let as_float = || value.as_f64().ok_or_else(|| mismatch("number"));
        let as_text = || value.as_str().map(str::to_string).ok_or_else(|| mismatch("string"));
        let as_i32 = || {
            value
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .ok_or_else(|| mismatch("integer"))
        };

        match key {
            keys::VERSION => return Err(ConfigError::ReadOnly(key.to_string())),
            keys::SKIN => self.display.skin = as_text()?,
            keys::OPACITY => self.display.opacity = as_float()?,
            keys::SCALE => self.display.scale = as_float()?,
            keys::POSITION_X => self.display.position_x = as_i32()?,
            keys::POSITION_Y => self.display.position_y = as_i32()?,
            keys::SHOW_WPM => self.display.show_wpm = as_bool()?,
            keys::IDLE_TIMEOUT => self.behavior.idle_timeout_seconds = as_float()?,
            keys::PAW_MODE => {
                self.behavior.paw_mode = as_text()?.parse().map_err(|e| invalid(key, e))?
            }
            keys::TRACK_MOUSE => self.behavior.track_mouse = as_bool()?,
            keys::FPS => {
                self.behavior.fps = u32::try_from(as_i32()?).map_err(|_| invalid(key, "negative"))?
            }
            keys::DEBUG => self.behavior.debug = as_bool()?,
            keys::HOTKEY_OVERLAY => self.hotkeys.toggle_overlay = as_text()?,
            keys::HOTKEY_PAUSE => self.hotkeys.toggle_pause = as_text()?,
            keys::START_WITH_WINDOWS => self.startup.start_with_windows = as_bool()?,
            keys::TASK_NAME => self.startup.task_name = as_text()?,
            keys::SHOW_NOTIFICATIONS => self.startup.show_notifications = as_bool()?,
            other => return Err(ConfigError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Keys whose values differ between `self` and `other`, in schema order.
    pub fn changed_keys(&self, other: &Settings) -> Vec<&'static str> {
        keys::ALL
            .iter()
            .copied()
            .filter(|k| self.get(k).ok() != other.get(k).ok())
            .collect()
    }
}

pub type Subscriber = Arc<dyn Fn(&str, &SettingValue) + Send + Sync>;

/// Thread-safe settings store with change notification.
///
/// Subscribers run on the thread that made the change, after the settings
/// lock has been released, in registration order.
pub struct ConfigStore {
    path: PathBuf,
    backup_path: PathBuf,
    settings: Mutex<Settings>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ConfigStore {
    /// `%APPDATA%\BongoCat`, or `~/.config/BongoCat` elsewhere.
    pub fn default_dir() -> PathBuf {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("BongoCat")
    }

    pub fn open_default() -> Result<Self, ConfigError> {
        Self::open(Self::default_dir())
    }

    /// Load settings from `dir`, creating the file with defaults if missing.
    /// A corrupt file is left untouched and defaults are used instead.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let store = Self {
            path: dir.join(CONFIG_FILE),
            backup_path: dir.join(BACKUP_FILE),
            settings: Mutex::new(Settings::default()),
            subscribers: Mutex::new(Vec::new()),
        };

        if !store.path.exists() {
            info!("No config at {}, writing defaults", store.path.display());
            store.save()?;
            return Ok(store);
        }

        match store.read_file() {
            Ok(loaded) => {
                info!("Loaded config from {}", store.path.display());
                *store.settings.lock() = loaded;
            }
            Err(e) => {
                warn!(
                    "Ignoring config at {} ({}), using defaults",
                    store.path.display(),
                    e
                );
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn snapshot(&self) -> Settings {
        self.settings.lock().clone()
    }

    pub fn get(&self, key: &str) -> Result<SettingValue, ConfigError> {
        self.settings.lock().get(key)
    }

    pub fn subscribe(&self, f: impl Fn(&str, &SettingValue) + Send + Sync + 'static) {
        self.subscribers.lock().push(Arc::new(f));
    }

    /// Change one setting.
    ///
    /// Returns `Ok(false)` if the value was already current (no notification,
    /// no write). An invalid value leaves the configuration unchanged.
    pub fn set(&self, key: &str, value: impl Into<SettingValue>) -> Result<bool, ConfigError> {
        let value = value.into();
        let stored = {
            let mut settings = self.settings.lock();
            let mut next = settings.clone();
            next.put(key, &value)?;
            next.validate()?;
            let stored = next.get(key)?;
            if settings.get(key)? == stored {
                return Ok(false);
            }
            *settings = next;
            stored
        };
        debug!("Setting {} = {}", key, stored);

        if let Err(e) = self.save() {
            warn!("Failed to persist config: {}", e);
        }
        self.notify(key, &stored);
        Ok(true)
    }

    /// Re-read the file. Returns the keys that changed.
    pub fn reload(&self) -> Result<Vec<&'static str>, ConfigError> {
        let loaded = self.read_file()?;
        let changed = self.replace(loaded);
        info!("Reloaded config ({} changes)", changed.len());
        Ok(changed)
    }

    pub fn reset_to_defaults(&self) -> Vec<&'static str> {
        let changed = self.replace(Settings::default());
        if let Err(e) = self.save() {
            warn!("Failed to persist config: {}", e);
        }
        changed
    }

    /// Write the current settings, keeping a copy of the previous file.
    pub fn save(&self) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(&*self.settings.lock())?;
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ConfigError::Io { path, source }
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        if self.path.exists() {
            fs::copy(&self.path, &self.backup_path).map_err(io_err(&self.backup_path))?;
        }
        fs::write(&self.path, json).map_err(io_err(&self.path))
    }

    fn read_file(&self) -> Result<Settings, ConfigError> {
        let text = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut loaded: Settings = serde_json::from_str(&text)?;
        if loaded.version != CONFIG_VERSION {
            info!(
                "Config version {} differs from {}, upgrading",
                loaded.version, CONFIG_VERSION
            );
            loaded.version = CONFIG_VERSION.to_string();
        }
        loaded.validate()?;
        Ok(loaded)
    }

    fn replace(&self, next: Settings) -> Vec<&'static str> {
        let (changed, values) = {
            let mut settings = self.settings.lock();
            let changed = settings.changed_keys(&next);
            let values: Vec<_> = changed.iter().filter_map(|k| next.get(k).ok()).collect();
            *settings = next;
            (changed, values)
        };
        for (key, value) in changed.iter().zip(&values) {
            self.notify(key, value);
        }
        changed
    }

    fn notify(&self, key: &str, value: &SettingValue) {
        let subscribers = self.subscribers.lock().clone();
        for sub in subscribers {
            sub(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.get(keys::SKIN).unwrap(), SettingValue::from("classic"));
        assert_eq!(s.get(keys::FPS).unwrap(), SettingValue::Int(30));
        for key in keys::ALL {
            assert!(s.get(key).is_ok(), "missing getter for {}", key);
        }
    }

    #[test]
    fn test_put_type_checks() {
        let mut s = Settings::default();
        assert!(matches!(
            s.put(keys::OPACITY, &SettingValue::from("high")),
            Err(ConfigError::TypeMismatch { .. })
        ));
        assert!(matches!(
            s.put(keys::VERSION, &SettingValue::from("2.0")),
            Err(ConfigError::ReadOnly(_))
        ));
        assert!(matches!(
            s.put("display.colour", &SettingValue::from(true)),
            Err(ConfigError::UnknownKey(_))
        ));
        // Integers widen to floats.
        s.put(keys::SCALE, &SettingValue::Int(2)).unwrap();
        assert_eq!(s.display.scale, 2.0);
    }

    #[test]
    fn test_validate_ranges() {
        let mut s = Settings::default();
        s.display.opacity = 0.05;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.behavior.fps = 240;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.hotkeys.toggle_pause = "Ctrl+Nope".into();
        assert!(s.validate().is_err());
        s.hotkeys.toggle_pause = String::new();
        assert!(s.validate().is_ok());

        s.startup.task_name = "Bongo\"Cat".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        assert!(store.path().exists());
        assert_eq!(store.snapshot(), Settings::default());
    }

    #[test]
    fn test_invalid_set_is_reverted() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        assert!(store.set(keys::OPACITY, 3.0).is_err());
        assert_eq!(store.get(keys::OPACITY).unwrap(), SettingValue::Float(1.0));
        assert!(store.set(keys::PAW_MODE, "both").is_err());
        assert_eq!(store.snapshot(), Settings::default());
    }

    #[test]
    fn test_set_persists_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        assert!(store.set(keys::SKIN, "midnight").unwrap());
        assert!(store.backup_path().exists());

        let reopened = ConfigStore::open(dir.path()).unwrap();
        assert_eq!(reopened.snapshot().display.skin, "midnight");
    }

    #[test]
    fn test_corrupt_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "{ not json").unwrap();

        let store = ConfigStore::open(dir.path()).unwrap();
        assert_eq!(store.snapshot(), Settings::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "display": { "opacity": 0.5 }, "behavior": { "paw_mode": "alternate" } }"#,
        )
        .unwrap();

        let s = ConfigStore::open(dir.path()).unwrap().snapshot();
        assert_eq!(s.display.opacity, 0.5);
        assert_eq!(s.display.skin, "classic");
        assert_eq!(s.behavior.paw_mode, PawMode::Alternate);
    }

    #[test]
    fn test_reload_reports_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();

        let mut edited = Settings::default();
        edited.behavior.fps = 60;
        edited.display.show_wpm = false;
        fs::write(store.path(), serde_json::to_string(&edited).unwrap()).unwrap();

        let changed = store.reload().unwrap();
        assert_eq!(changed, vec![keys::SHOW_WPM, keys::FPS]);
        assert_eq!(store.snapshot(), edited);

        // A bad edit keeps the current settings.
        fs::write(store.path(), r#"{ "behavior": { "fps": 1 } }"#).unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.snapshot(), edited);
    }

    #[test]
    fn test_reset_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path()).unwrap();
        store.set(keys::SHOW_NOTIFICATIONS, false).unwrap();
        store.set(keys::OPACITY, 0.25).unwrap();

        let changed = store.reset_to_defaults();
        assert_eq!(changed, vec![keys::OPACITY, keys::SHOW_NOTIFICATIONS]);
        assert!(store.snapshot().startup.show_notifications);
        let on_disk: Settings =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(on_disk, Settings::default());
    }
}
