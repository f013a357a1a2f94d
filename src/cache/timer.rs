use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

struct TimerState {
    deadline: Option<Instant>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<TimerState>,
    wake: Condvar,
    fired: AtomicBool,
}

/// Restartable one-shot timer whose expiry only raises a flag
///
/// The timer thread never touches the card table or the image file. It sets
/// `fired` when the deadline passes and goes back to sleep; whoever drives
/// `process()` observes the flag and does the actual write.
pub struct DebounceTimer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl DebounceTimer {
    pub fn spawn(name: &str) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState {
                deadline: None,
                shutdown: false,
            }),
            wake: Condvar::new(),
            fired: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(worker_shared))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Start the countdown from zero, replacing any pending deadline
    pub fn arm(&self, window: Duration) {
        let mut state = self.shared.state.lock();
        state.deadline = Some(Instant::now() + window);
        self.shared.wake.notify_one();
    }

    /// Drop the pending deadline, if any
    pub fn cancel(&self) {
        let mut state = self.shared.state.lock();
        state.deadline = None;
        self.shared.wake.notify_one();
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().deadline.is_some()
    }

    pub fn has_fired(&self) -> bool {
        self.shared.fired.load(Ordering::Acquire)
    }

    pub fn clear_fired(&self) {
        self.shared.fired.store(false, Ordering::Release);
    }

    /// Raise the flag without waiting for a deadline
    pub fn force_fire(&self) {
        self.shared.fired.store(true, Ordering::Release);
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.wake.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run(shared: Arc<Shared>) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }

        let deadline = state.deadline;
        match deadline {
            None => shared.wake.wait(&mut state),
            Some(deadline) if Instant::now() >= deadline => {
                state.deadline = None;
                shared.fired.store(true, Ordering::Release);
                debug!("Write-back timer expired");
            }
            Some(deadline) => {
                shared.wake.wait_until(&mut state, deadline);
            }
        }
    }
}
