mod common;

use bongo_core::config::{keys, ConfigStore, Settings};
use bongo_core::engine::{AnimationEngine, StatusSink};
use bongo_core::skin::SkinLibrary;
use bongo_core::tray::{BackendFactory, TrayAction, TrayBackend, TrayController, TrayHandler};
use bongo_core::types::EngineStatus;
use common::{wait_until, BackendCall, CountingHandler, FakeBackend, RecordingOverlay, ScriptedMonitor};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn setup(handler: Arc<dyn TrayHandler>) -> (tempfile::TempDir, Arc<ConfigStore>, Arc<TrayController>) {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(ConfigStore::open(dir.path()).unwrap());
    let engine = Arc::new(AnimationEngine::new(
        Arc::clone(&config),
        SkinLibrary::builtin_only(),
        Box::new(ScriptedMonitor::default()),
        Box::new(RecordingOverlay::default()),
    ));
    let tray = Arc::new(TrayController::new(
        Arc::clone(&config),
        engine,
        SkinLibrary::builtin_only(),
        handler,
    ));
    {
        let tray = Arc::clone(&tray);
        config.subscribe(move |key, value| tray.on_config_change(key, value));
    }
    (dir, config, tray)
}

fn factory(backend: FakeBackend) -> BackendFactory {
    Box::new(move || Ok::<Box<dyn TrayBackend>, anyhow::Error>(Box::new(backend)))
}

fn start(tray: &Arc<TrayController>) -> FakeBackend {
    let backend = FakeBackend::default();
    tray.start_detached(factory(backend.clone())).unwrap();
    assert!(wait_until(|| !backend.calls().is_empty()));
    backend
}

#[test]
fn stop_is_idempotent_and_safe_before_start() {
    let (_dir, _config, tray) = setup(Arc::new(CountingHandler::default()));
    tray.stop();
    tray.stop();
    // Starting after a stop does nothing.
    tray.start_detached(factory(FakeBackend::default())).unwrap();
    assert!(!tray.is_started());
}

#[test]
fn stop_twice_after_start() {
    let (_dir, _config, tray) = setup(Arc::new(CountingHandler::default()));
    let backend = start(&tray);
    assert!(tray.start_detached(factory(FakeBackend::default())).is_err());

    tray.stop();
    tray.stop();
    let calls = backend.calls();
    assert_eq!(calls.first(), Some(&BackendCall::Install("Bongo Cat - Idle".into())));
    assert_eq!(calls.last(), Some(&BackendCall::Remove));
}

#[test]
fn clicks_update_config_and_checkmarks() {
    let handler = Arc::new(CountingHandler::default());
    let (_dir, config, tray) = setup(handler.clone());
    let backend = start(&tray);

    backend.click(TrayAction::ToggleMouse);
    assert!(wait_until(|| !config.snapshot().behavior.track_mouse));
    assert!(wait_until(|| backend
        .calls()
        .contains(&BackendCall::Checked(TrayAction::ToggleMouse, false))));

    backend.click(TrayAction::SelectSkin("ginger".into()));
    assert!(wait_until(|| config.snapshot().display.skin == "ginger"));

    backend.click(TrayAction::SetOpacity(50));
    assert!(wait_until(|| config.snapshot().display.opacity == 0.5));

    backend.click(TrayAction::ShowSettings);
    backend.click(TrayAction::About);
    assert!(wait_until(|| handler.settings.load(Ordering::SeqCst) == 1
        && handler.abouts.load(Ordering::SeqCst) == 1));

    // No menu rebuild for checkmark-only changes.
    assert!(!backend.calls().contains(&BackendCall::Rebuild));
    tray.stop();
}

#[test]
fn config_change_from_elsewhere_updates_checks() {
    let (_dir, config, tray) = setup(Arc::new(CountingHandler::default()));
    let backend = start(&tray);

    config.set(keys::START_WITH_WINDOWS, false).unwrap();
    assert!(wait_until(|| backend
        .calls()
        .contains(&BackendCall::Checked(TrayAction::ToggleAutostart, false))));
    tray.stop();
}

#[test]
fn status_reports_update_tooltip_and_pause_check() {
    let (_dir, _config, tray) = setup(Arc::new(CountingHandler::default()));
    let backend = start(&tray);

    tray.report_status(EngineStatus::Typing { wpm: 60.0 });
    assert!(wait_until(|| backend
        .calls()
        .contains(&BackendCall::Tooltip("Bongo Cat - Typing (60 WPM)".into()))));

    tray.report_status(EngineStatus::Paused);
    assert!(wait_until(|| backend
        .calls()
        .contains(&BackendCall::Checked(TrayAction::TogglePause, true))));
    assert_eq!(tray.tooltip(), "Bongo Cat - Paused");

    tray.report_visibility(false);
    assert!(wait_until(|| backend
        .calls()
        .contains(&BackendCall::Checked(TrayAction::ToggleOverlay, false))));
    tray.stop();
}

/// Exits by stopping the tray from inside a menu action.
struct StopOnExit(Mutex<Option<Arc<TrayController>>>);

impl TrayHandler for StopOnExit {
    fn exit(&self) {
        if let Some(tray) = self.0.lock().take() {
            tray.stop();
        }
    }

    fn show_settings(&self) {}

    fn show_about(&self) {}
}

#[test]
fn exit_from_the_tray_thread_does_not_deadlock() {
    let handler = Arc::new(StopOnExit(Mutex::new(None)));
    let (_dir, _config, tray) = setup(handler.clone());
    *handler.0.lock() = Some(Arc::clone(&tray));
    let backend = start(&tray);

    backend.click(TrayAction::Exit);
    assert!(wait_until(|| backend.calls().last() == Some(&BackendCall::Remove)));
    // Already stopped from the tray thread.
    tray.stop();
}

fn notified(backend: &FakeBackend, title: &str, body: &str) -> bool {
    backend
        .calls()
        .contains(&BackendCall::Notify(title.into(), body.into()))
}

#[test]
fn startup_and_autostart_toggle_show_notifications() {
    let (_dir, config, tray) = setup(Arc::new(CountingHandler::default()));
    let backend = start(&tray);
    assert!(wait_until(|| notified(
        &backend,
        "Bongo Cat",
        "Started successfully! Right-click the tray icon for options."
    )));

    backend.click(TrayAction::ToggleAutostart);
    assert!(wait_until(|| !config.snapshot().startup.start_with_windows));
    assert!(wait_until(|| notified(
        &backend,
        "Startup Setting",
        "Start with Windows disabled"
    )));
    tray.stop();
}

#[test]
fn notifications_toggle_silences_messages() {
    let (_dir, config, tray) = setup(Arc::new(CountingHandler::default()));
    let backend = start(&tray);

    backend.click(TrayAction::ToggleNotifications);
    assert!(wait_until(|| !config.snapshot().startup.show_notifications));
    assert!(wait_until(|| backend
        .calls()
        .contains(&BackendCall::Checked(TrayAction::ToggleNotifications, false))));

    backend.click(TrayAction::ToggleAutostart);
    assert!(wait_until(|| !config.snapshot().startup.start_with_windows));

    backend.click(TrayAction::ToggleNotifications);
    assert!(wait_until(|| notified(
        &backend,
        "Notifications",
        "Notifications enabled"
    )));
    tray.stop();

    let calls = backend.calls();
    assert!(!calls.contains(&BackendCall::Notify(
        "Notifications".into(),
        "Notifications disabled".into()
    )));
    assert!(!calls
        .iter()
        .any(|c| matches!(c, BackendCall::Notify(title, _) if title == "Startup Setting")));
}

#[test]
fn reset_defaults_restores_settings_and_menu() {
    let (_dir, config, tray) = setup(Arc::new(CountingHandler::default()));
    let backend = start(&tray);
    config.set(keys::SKIN, "midnight").unwrap();
    config.set(keys::OPACITY, 0.25).unwrap();
    config.set(keys::TRACK_MOUSE, false).unwrap();

    backend.click(TrayAction::ResetDefaults);
    assert!(wait_until(|| config.snapshot() == Settings::default()));
    assert!(wait_until(|| notified(&backend, "Bongo Cat", "Settings reset to defaults")));
    assert!(wait_until(|| {
        let checks = tray.model().checks();
        checks.contains(&(TrayAction::SelectSkin("classic".into()), true))
            && checks.contains(&(TrayAction::ToggleMouse, true))
            && checks.contains(&(TrayAction::SetOpacity(100), true))
    }));
    tray.stop();
}

