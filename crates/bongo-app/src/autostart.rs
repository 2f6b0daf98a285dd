use bongo_core::config::{keys, SettingValue};
use bongo_core::task::{ScheduledTask, TaskError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Keeps the autostart scheduled task in line with
/// `startup.start_with_windows`.
pub struct Autostart {
    task: Mutex<ScheduledTask>,
}

impl Autostart {
    pub fn new(task: ScheduledTask) -> Self {
        Self {
            task: Mutex::new(task),
        }
    }

    pub fn task_name(&self) -> String {
        self.task.lock().full_path()
    }

    /// Enable or disable the task unless it is already in that state.
    pub fn reconcile(&self, enabled: bool) -> Result<(), TaskError> {
        let task = self.task.lock();
        match task.state() {
            Ok(state) if state.is_enabled() == enabled => {
                debug!("Task {} already {}", task.full_path(), state);
                return Ok(());
            }
            Ok(state) => debug!("Task {} is {}", task.full_path(), state),
            Err(e) => debug!("Could not query task state: {}", e),
        }
        task.set_enabled(enabled)?;
        info!(
            "Autostart {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Config subscriber.
    pub fn on_config_change(&self, key: &str, value: &SettingValue) {
        match key {
            keys::START_WITH_WINDOWS => {
                if let Some(enabled) = value.as_bool() {
                    if let Err(e) = self.reconcile(enabled) {
                        warn!("Could not update autostart: {}", e);
                    }
                }
            }
            keys::DEBUG => {
                if let Some(debug) = value.as_bool() {
                    self.task.lock().set_debug(debug);
                }
            }
            _ => {}
        }
    }
}
