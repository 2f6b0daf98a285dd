use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long the shutdown sequence may take before the process is killed.
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Exit code used when the watchdog has to force the exit.
pub const FORCED_EXIT_CODE: i32 = 1;

type Callback = Box<dyn FnOnce() + Send>;

/// One-shot shutdown coordinator shared by the main thread, the tray
/// thread and the console control handler.
///
/// The first [`request`](Self::request) runs the registered callbacks and
/// arms a watchdog. If [`complete`](Self::complete) is not called within the
/// grace period the watchdog calls the exit function.
pub struct Shutdown {
    requested: AtomicBool,
    completed: AtomicBool,
    callbacks: Mutex<Vec<Callback>>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
    grace: Duration,
    exit: Arc<dyn Fn(i32) + Send + Sync>,
}

impl Shutdown {
    pub fn new(grace: Duration) -> Self {
        Self::with_exit(grace, |code| std::process::exit(code))
    }

    pub fn with_exit(grace: Duration, exit: impl Fn(i32) + Send + Sync + 'static) -> Self {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        Self {
            requested: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
            done_tx,
            done_rx,
            grace,
            exit: Arc::new(exit),
        }
    }

    /// Run `f` on the first shutdown request. Runs at once if one has
    /// already been made.
    pub fn on_request(&self, f: impl FnOnce() + Send + 'static) {
        let mut callbacks = self.callbacks.lock();
        if self.requested.load(Ordering::SeqCst) {
            drop(callbacks);
            f();
        } else {
            callbacks.push(Box::new(f));
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns `false` if shutdown was already requested.
    pub fn request(&self, reason: &str) -> bool {
        let callbacks = {
            let mut callbacks = self.callbacks.lock();
            if self.requested.swap(true, Ordering::SeqCst) {
                debug!("Shutdown already requested; ignoring {}", reason);
                return false;
            }
            std::mem::take(&mut *callbacks)
        };
        info!("Shutdown requested ({})", reason);
        self.arm_watchdog();
        for cb in callbacks {
            cb();
        }
        true
    }

    fn arm_watchdog(&self) {
        let done_rx = self.done_rx.clone();
        let grace = self.grace;
        let exit = Arc::clone(&self.exit);
        let spawned = thread::Builder::new()
            .name("shutdown-watchdog".into())
            .spawn(move || match done_rx.recv_timeout(grace) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
                Err(RecvTimeoutError::Timeout) => {
                    error!("Shutdown did not finish within {:?}; forcing exit", grace);
                    exit(FORCED_EXIT_CODE);
                }
            });
        if let Err(e) = spawned {
            warn!("Could not start shutdown watchdog: {}", e);
        }
    }

    /// Run one shutdown step. Errors and panics are logged and do not stop
    /// the steps after it.
    pub fn step(&self, name: &str, f: impl FnOnce() -> anyhow::Result<()>) -> bool {
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => {
                debug!("Shutdown step '{}' done", name);
                true
            }
            Ok(Err(e)) => {
                warn!("Shutdown step '{}' failed: {:#}", name, e);
                false
            }
            Err(_) => {
                warn!("Shutdown step '{}' panicked", name);
                false
            }
        }
    }

    /// Mark the sequence finished and disarm the watchdog.
    pub fn complete(&self) {
        if !self.completed.swap(true, Ordering::SeqCst) {
            let _ = self.done_tx.try_send(());
            info!("Shutdown complete");
        }
    }

    /// Block until [`complete`](Self::complete) or until `timeout` passes.
    pub fn wait_complete(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_complete() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(20));
        }
        true
    }
}
