use crate::autostart::Autostart;
use crate::cli::Cli;
use crate::shutdown::{Shutdown, GRACE_PERIOD};
use crate::{desktop, elevation, signals, tray_backend};
use anyhow::Context;
use bongo_core::engine::EngineError;
use bongo_core::input_hook::HookMonitor;
use bongo_core::overlay_window::LayeredOverlay;
use bongo_core::skin::SkinLibrary;
use bongo_core::task::{CommandRunner, PowerShellRunner, ScheduledTask};
use bongo_core::tray::{TrayController, TrayHandler};
use bongo_core::{AnimationEngine, ConfigStore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What the tray menu can ask of the application.
struct AppHandler {
    shutdown: Arc<Shutdown>,
    config_path: PathBuf,
}

impl TrayHandler for AppHandler {
    fn exit(&self) {
        self.shutdown.request("exit from tray");
    }

    fn show_settings(&self) {
        if let Err(e) = desktop::open_in_editor(&self.config_path) {
            warn!("Could not open settings: {:#}", e);
        }
    }

    fn show_about(&self) {
        desktop::show_about(&self.config_path);
    }
}

struct App {
    config: Arc<ConfigStore>,
    autostart: Arc<Autostart>,
    engine: Arc<AnimationEngine>,
    tray: Arc<TrayController>,
}

impl App {
    /// Config, then task, then engine, then tray.
    fn build(shutdown: &Arc<Shutdown>) -> anyhow::Result<Self> {
        info!("Loading configuration...");
        let config =
            Arc::new(ConfigStore::open_default().context("failed to load configuration")?);
        let settings = config.snapshot();

        let task_name = &settings.startup.task_name;
        info!("Looking up autostart task '{}'...", task_name);
        let runner: Arc<dyn CommandRunner> = Arc::new(PowerShellRunner);
        let task = ScheduledTask::open(task_name, runner)
            .with_context(|| format!("autostart task '{}' is not available", task_name))?
            .with_debug(settings.behavior.debug);
        let autostart = Arc::new(Autostart::new(task));

        info!("Initializing animation engine...");
        let skins = SkinLibrary::new(ConfigStore::default_dir().join("skins"));
        let engine = Arc::new(AnimationEngine::new(
            Arc::clone(&config),
            skins.clone(),
            Box::new(HookMonitor::new()),
            Box::new(LayeredOverlay::new()),
        ));

        info!("Setting up system tray...");
        let handler = Arc::new(AppHandler {
            shutdown: Arc::clone(shutdown),
            config_path: config.path().to_path_buf(),
        });
        let tray = Arc::new(TrayController::new(
            Arc::clone(&config),
            Arc::clone(&engine),
            skins,
            handler,
        ));

        {
            let autostart = Arc::clone(&autostart);
            config.subscribe(move |key, value| autostart.on_config_change(key, value));
        }
        {
            let tray = Arc::clone(&tray);
            config.subscribe(move |key, value| tray.on_config_change(key, value));
        }
        {
            let engine = Arc::clone(&engine);
            config.subscribe(move |key, value| engine.on_config_change(key, value));
        }
        engine.set_tray_reference(&tray);
        {
            let engine = Arc::clone(&engine);
            shutdown.on_request(move || engine.stop_monitoring());
        }

        Ok(Self {
            config,
            autostart,
            engine,
            tray,
        })
    }

    /// Start the tray, then block in the engine loop.
    fn run(&self, cli: &Cli) -> ExitCode {
        let start_with_windows = self.config.snapshot().startup.start_with_windows;
        if let Err(e) = self.autostart.reconcile(start_with_windows) {
            warn!("Could not update autostart task {}: {}", self.autostart.task_name(), e);
        }

        if let Err(e) = self.tray.start_detached(tray_backend::factory(icon_dirs())) {
            error!("Failed to start tray icon: {:#}", e);
            return ExitCode::from(1);
        }

        if cli.start_minimized() {
            info!("Running in the background; right-click the tray icon for options");
        } else {
            info!("Start typing to see the cat react. Press Ctrl+C to stop");
        }

        info!("Starting animation engine on the main thread...");
        match self.engine.start_monitoring() {
            Ok(()) => ExitCode::SUCCESS,
            Err(EngineError::AccessDenied) => {
                error!("The input hook was refused even with administrator rights");
                ExitCode::from(1)
            }
            Err(e) => {
                error!("Runtime error: {}", e);
                ExitCode::from(1)
            }
        }
    }

    fn shutdown(&self, shutdown: &Shutdown) {
        shutdown.request("engine loop ended");
        shutdown.step("stop engine", || {
            self.engine.stop_monitoring();
            Ok(())
        });
        shutdown.step("stop tray", || {
            self.tray.stop();
            Ok(())
        });
        shutdown.step("save configuration", || {
            self.config.save().context("could not write settings")
        });
        shutdown.complete();
        info!("Goodbye!");
    }
}

/// `assets/` next to the executable, then in the config directory.
fn icon_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        dirs.push(exe_dir.join("assets"));
    }
    dirs.push(ConfigStore::default_dir().join("assets"));
    dirs
}

pub fn run(cli: Cli) -> ExitCode {
    info!("{}", bongo_core::app_title());

    if !elevation::is_elevated() {
        return match elevation::relaunch_elevated() {
            Ok(()) => {
                info!("Continuing in the elevated instance");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Administrator rights are required: {:#}", e);
                ExitCode::from(1)
            }
        };
    }

    let shutdown = Arc::new(Shutdown::new(GRACE_PERIOD));
    let app = match App::build(&shutdown) {
        Ok(app) => app,
        Err(e) => {
            error!("Initialization error: {:#}", e);
            return ExitCode::from(1);
        }
    };
    signals::install(&shutdown);

    let code = app.run(&cli);
    app.shutdown(&shutdown);
    code
}
