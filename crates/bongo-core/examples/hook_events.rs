//! Prints paw events from the global hooks for ten seconds.

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    use bongo_core::engine::InputMonitor;
    use bongo_core::input_hook::HookMonitor;
    use bongo_core::paws::PawMapper;
    use std::time::{Duration, Instant};

    tracing_subscriber::fmt::init();

    let (tx, rx) = crossbeam_channel::unbounded();
    let mut monitor = HookMonitor::new();
    monitor.install(tx)?;
    println!("Type or click; exiting in 10 seconds.");

    let mut mapper = PawMapper::default();
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if !monitor.pump(Duration::from_millis(30)) {
            break;
        }
        for raw in rx.try_iter() {
            if let Some(ev) = mapper.map(&raw) {
                println!("{:?} {:?} ({:?})", ev.paw, ev.edge, ev.source);
            }
        }
    }

    monitor.uninstall();
    Ok(())
}

#[cfg(not(windows))]
fn main() {
    eprintln!("hook_events needs Windows low-level hooks");
}
